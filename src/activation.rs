use serde::{Deserialize, Serialize};

/// The activation functions a dense layer can use. The integer ids are
/// part of the persistence format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Identity,
    Logistic,
    Tanh,
    ReLU,
    ISRLU,
}

const ISRLU_ALPHA: f64 = 0.1;

impl Activation {
    pub fn calc(self, x: f64) -> f64 {
        match self {
            Activation::Identity => x,
            Activation::Logistic => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => (x.exp() - (-x).exp()) / (x.exp() + (-x).exp()),
            Activation::ReLU => x.max(0.0),
            Activation::ISRLU => {
                if x >= 0.0 {
                    x
                } else {
                    x / (1.0 + ISRLU_ALPHA * x.powi(2)).sqrt()
                }
            }
        }
    }

    /// Local derivative evaluated on the already-activated value, not on
    /// the raw pre-activation. The backward pass only keeps activations
    /// around, so every arm must accept `calc(x)` as its argument.
    pub fn calc_derivative(self, y: f64) -> f64 {
        match self {
            Activation::Identity => 1.0,
            Activation::Logistic => y * (1.0 - y),
            Activation::Tanh => 1.0 - self.calc(y).powi(2),
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::ISRLU => {
                if y >= 0.0 {
                    1.0
                } else {
                    (1.0 / (1.0 + ISRLU_ALPHA * y.powi(2)).sqrt()).powi(3)
                }
            }
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Activation::Identity => 0,
            Activation::Logistic => 1,
            Activation::Tanh => 2,
            Activation::ReLU => 3,
            Activation::ISRLU => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Activation::Identity),
            1 => Some(Activation::Logistic),
            2 => Some(Activation::Tanh),
            3 => Some(Activation::ReLU),
            4 => Some(Activation::ISRLU),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Activation::Identity => "Identity",
            Activation::Logistic => "Logistic",
            Activation::Tanh => "Tanh",
            Activation::ReLU => "ReLU",
            Activation::ISRLU => "ISRLU",
        }
    }
}
