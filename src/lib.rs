mod activation;
mod error;
mod format;
mod layer;
mod network;
mod neuron;
mod seed;
mod trainer;
mod utils;

pub mod dataset;

pub use {
    activation::*,
    error::*,
    format::*,
    layer::*,
    network::*,
    neuron::*,
    seed::*,
    trainer::*,
    utils::*,
};
