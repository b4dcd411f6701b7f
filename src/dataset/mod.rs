use std::path::Path;

use crate::error::{Error, Result};

mod mnist;
pub use mnist::*;

/// One training sample: an input vector and its expected output vector.
pub struct TrainPair {
    pub input: Vec<f64>,
    pub output: Vec<f64>,
}

pub trait Dataset {
    fn training_data(self) -> Vec<TrainPair>;
    fn class_name(&self, num: usize) -> Option<String>;
}

/// Decodes any image the `image` crate understands into a normalized
/// grayscale vector in [0, 1], row-major.
pub fn load_image_grayscale(path: &Path) -> Result<Vec<f64>> {
    let img = image::io::Reader::open(path)?
        .decode()
        .map_err(|e| Error::InvalidData(format!("cannot decode {}: {}", path.display(), e)))?;

    Ok(img
        .into_luma8()
        .pixels()
        .map(|p| f64::from(p.0[0]) / 255.0)
        .collect())
}
