use thiserror::Error;

use crate::layer::LayerKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while assembling, driving or persisting
/// a network. Errors are reported synchronously and nothing is retried
/// internally; after a failed mutating call the network state is
/// unspecified and the caller should discard it.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot add a {kind} layer after an output layer")]
    LayerAfterOutput { kind: LayerKind },

    #[error("layer weights are inconsistent: expected {expected} provided {provided} on neuron {neuron}")]
    WeightSizeMismatch {
        expected: usize,
        provided: usize,
        neuron: usize,
    },

    #[error("bias list is inconsistent: expected {expected} provided {provided}")]
    BiasSizeMismatch { expected: usize, provided: usize },

    #[error("{op}: network has no output layer")]
    NoOutputLayer { op: &'static str },

    #[error("{op}: size is inconsistent: expected {expected} provided {provided}")]
    SizeMismatch {
        op: &'static str,
        expected: usize,
        provided: usize,
    },

    #[error("{op} is not supported on a {kind} layer")]
    IllegalLayerOp { op: &'static str, kind: LayerKind },

    #[error("network file is ill-formed: expected {expected:?} found {found:?} at line {line}")]
    UnexpectedTag {
        expected: String,
        found: String,
        line: usize,
    },

    #[error("network file is ill-formed: cannot parse {token:?} at line {line}")]
    Malformed { token: String, line: usize },

    #[error("network file is ill-formed: unexpected end of file at line {line}")]
    UnexpectedEof { line: usize },

    #[error("network file describes a network with no layers")]
    EmptyNetwork,

    #[error("corrupted generator state: {0}")]
    GeneratorState(#[from] serde_json::Error),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
