use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::network::NeuralNetwork;
use crate::utils::one_hot;

/// How the effective learning rate evolves over the epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LearningRateSchedule {
    Constant,
    /// learning_rate_init / (epoch + 1)^power_t
    InvScaling,
    /// Divides the rate by 5 after two consecutive stalled epochs.
    Adaptive,
}

/// Knobs of the training loop. Deserializable so a run can be driven
/// from a YAML config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TrainOptions {
    pub hidden_layer_sizes: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: LearningRateSchedule,
    pub learning_rate_init: f64,
    pub power_t: f64,
    pub max_epochs: usize,
    /// `None` trains on-line, updating the weights after every sample.
    pub batch_size: Option<usize>,
    pub seed: Option<u32>,
    pub tol: f64,
    pub momentum: f64,
    pub early_stopping: bool,
    pub n_iter_no_change: usize,
    pub verbose: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            hidden_layer_sizes: vec![100],
            activation: Activation::ReLU,
            learning_rate: LearningRateSchedule::Constant,
            learning_rate_init: 0.001,
            power_t: 0.5,
            max_epochs: 200,
            batch_size: None,
            seed: None,
            tol: 1e-4,
            momentum: 0.9,
            early_stopping: false,
            n_iter_no_change: 10,
            verbose: false,
        }
    }
}

/// What a `fit` run did.
#[derive(Debug, Clone, Copy)]
pub struct FitReport {
    pub epochs_run: usize,
    pub final_error: f64,
    pub final_learning_rate: f64,
}

fn check_training_set(inputs: &[Vec<f64>], outputs_n: usize) -> Result<usize> {
    if inputs.is_empty() {
        return Err(Error::InvalidData("training set is empty".to_string()));
    }
    if inputs.len() != outputs_n {
        return Err(Error::InvalidData(format!(
            "input and output sizes are not consistent: input {} output {}",
            inputs.len(),
            outputs_n
        )));
    }

    let input_size = inputs[0].len();
    for (n, input) in inputs.iter().enumerate() {
        if input.len() != input_size {
            return Err(Error::InvalidData(format!(
                "all inputs do not have the same size: first {} sample {} has {}",
                input_size,
                n,
                input.len()
            )));
        }
    }
    Ok(input_size)
}

fn build_network(options: &TrainOptions, input_size: usize) -> Result<NeuralNetwork> {
    let mut net = NeuralNetwork::with_momentum(
        input_size,
        options.learning_rate_init,
        options.momentum,
        options.seed,
    );
    for &size in &options.hidden_layer_sizes {
        net.add_hidden_layer(size, options.activation, 0.0)?;
    }
    Ok(net)
}

/// The epoch/batch loop shared by both wrappers. Walks every batch with
/// forward/error/backward per sample and one weight update per batch,
/// then applies the learning-rate schedule and the stopping policy.
fn train_loop(
    net: &mut NeuralNetwork,
    inputs: &[Vec<f64>],
    expected: &[Vec<f64>],
    options: &TrainOptions,
) -> Result<FitReport> {
    let batch_size = options.batch_size.unwrap_or(1).max(1);
    let nb_batches = (inputs.len() + batch_size - 1) / batch_size;

    let mut effective_lr = options.learning_rate_init;
    let mut trailing_errors: Vec<f64> = Vec::new();
    let mut error = 0.0;
    let mut epochs_run = 0;

    let started = Instant::now();

    for epoch in 0..options.max_epochs {
        epochs_run = epoch + 1;
        error = 0.0;

        for batch in 0..nb_batches {
            let start = batch * batch_size;
            let end = (start + batch_size).min(inputs.len());

            for n in start..end {
                net.propagate_forward(&inputs[n], false)?;
                error += net.calc_error(&expected[n])?;
                net.propagate_backward(&expected[n])?;
            }

            net.update_weights();
        }

        error /= inputs.len() as f64;

        if options.verbose {
            eprintln!("epoch {} error {}", epochs_run, error);
        }

        let adaptive = options.learning_rate == LearningRateSchedule::Adaptive;

        if options.early_stopping || adaptive {
            if trailing_errors.len() < options.n_iter_no_change + 1 {
                trailing_errors.push(error);
            } else {
                trailing_errors.remove(0);
                trailing_errors.push(error);

                // The window is full: stop once no consecutive pair
                // improved by more than the tolerance.
                if !adaptive
                    && trailing_errors
                        .windows(2)
                        .all(|pair| pair[0] - pair[1] <= options.tol)
                {
                    if options.verbose {
                        eprintln!(
                            "optimization tolerance {} reached after {} epochs, stopping",
                            options.tol, epochs_run
                        );
                    }
                    break;
                }
            }

            if adaptive && trailing_errors.len() >= 3 {
                let last = trailing_errors.len() - 1;
                if (trailing_errors[last - 1] - trailing_errors[last]).abs() < options.tol
                    && (trailing_errors[last - 2] - trailing_errors[last - 1]).abs() < options.tol
                {
                    effective_lr /= 5.0;
                    net.update_learning_rate(effective_lr);
                }
            }
        }

        if options.learning_rate == LearningRateSchedule::InvScaling {
            effective_lr = options.learning_rate_init / ((epoch + 1) as f64).powf(options.power_t);
            net.update_learning_rate(effective_lr);
        }
    }

    if options.verbose {
        eprintln!(
            "training completed in {} ms, final error {}",
            started.elapsed().as_millis(),
            error
        );
    }

    Ok(FitReport {
        epochs_run,
        final_error: error,
        final_learning_rate: effective_lr,
    })
}

/// Training wrapper for a single-output regression network, in the
/// spirit of an sklearn-style MLP regressor over this engine.
#[derive(Debug)]
pub struct Regressor {
    options: TrainOptions,
    net: Option<NeuralNetwork>,
}

impl Regressor {
    pub fn new(options: TrainOptions) -> Self {
        Self { options, net: None }
    }

    pub fn fit(&mut self, inputs: &[Vec<f64>], targets: &[f64]) -> Result<FitReport> {
        let input_size = check_training_set(inputs, targets.len())?;

        let mut net = build_network(&self.options, input_size)?;
        net.add_output_regression_layer(1, self.options.activation, 0.0)?;

        let expected: Vec<Vec<f64>> = targets.iter().map(|target| vec![*target]).collect();
        let report = train_loop(&mut net, inputs, &expected, &self.options)?;

        self.net = Some(net);
        Ok(report)
    }

    pub fn predict(&mut self, input: &[f64]) -> Result<f64> {
        let net = self
            .net
            .as_mut()
            .ok_or_else(|| Error::InvalidData("fit must run before predict".to_string()))?;
        Ok(net.predict(input)?[0])
    }

    pub fn network(&self) -> Option<&NeuralNetwork> {
        self.net.as_ref()
    }
}

/// Training wrapper for label classification: derives the one-hot width
/// from the label range and trains a softmax-terminated network.
#[derive(Debug)]
pub struct Classifier {
    options: TrainOptions,
    net: Option<NeuralNetwork>,
    min_label: u8,
    max_label: u8,
}

impl Classifier {
    pub fn new(options: TrainOptions) -> Self {
        Self {
            options,
            net: None,
            min_label: 0,
            max_label: 0,
        }
    }

    pub fn fit(&mut self, inputs: &[Vec<f64>], labels: &[u8]) -> Result<FitReport> {
        let input_size = check_training_set(inputs, labels.len())?;

        self.min_label = labels.iter().min().copied().unwrap_or(0);
        self.max_label = labels.iter().max().copied().unwrap_or(0);
        let classes = (self.max_label - self.min_label) as usize + 1;

        let mut net = build_network(&self.options, input_size)?;
        net.add_output_classification_layer(classes, 0.0)?;

        let expected: Vec<Vec<f64>> = labels
            .iter()
            .map(|label| one_hot(*label, self.min_label, self.max_label))
            .collect();
        let report = train_loop(&mut net, inputs, &expected, &self.options)?;

        self.net = Some(net);
        Ok(report)
    }

    pub fn predict(&mut self, input: &[f64]) -> Result<u8> {
        let net = self
            .net
            .as_mut()
            .ok_or_else(|| Error::InvalidData("fit must run before predict".to_string()))?;
        net.predict(input)?;
        let class = net.probable_class()?;
        Ok(self.min_label + class as u8)
    }

    pub fn network(&self) -> Option<&NeuralNetwork> {
        self.net.as_ref()
    }
}
