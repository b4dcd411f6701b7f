use std::fs;
use std::io::Write;
use std::path::Path;

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::utils::one_hot;

use super::{Dataset, TrainPair};

/// idx file layout: http://yann.lecun.com/exdb/mnist
const IMAGES_MAGIC: u32 = 0x803;
const LABELS_MAGIC: u32 = 0x801;

#[derive(Debug, Clone, Copy)]
pub struct MnistAttrs {
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
}

fn read_be_u32(bytes: &[u8], pos: usize) -> Result<u32> {
    match bytes.get(pos..pos + 4) {
        Some([a, b, c, d]) => Ok(u32::from_be_bytes([*a, *b, *c, *d])),
        _ => Err(Error::InvalidData(
            "idx file seems corrupted; not large enough".to_string(),
        )),
    }
}

/// Parses an idx image file (magic 0x803): big-endian header of magic,
/// count, rows, cols, then one byte per pixel.
pub fn parse_images(bytes: &[u8]) -> Result<(MnistAttrs, Vec<Vec<u8>>)> {
    let magic = read_be_u32(bytes, 0)?;
    if magic != IMAGES_MAGIC {
        return Err(Error::InvalidData(format!(
            "not an idx image file (magic {:#x})",
            magic
        )));
    }

    let attrs = MnistAttrs {
        count: read_be_u32(bytes, 4)? as usize,
        rows: read_be_u32(bytes, 8)? as usize,
        cols: read_be_u32(bytes, 12)? as usize,
    };

    let pixels = attrs.rows * attrs.cols;
    if bytes.len() < 16 + attrs.count * pixels {
        return Err(Error::InvalidData(
            "idx image file seems corrupted; not large enough".to_string(),
        ));
    }

    let images = bytes[16..]
        .chunks_exact(pixels)
        .take(attrs.count)
        .map(|chunk| chunk.to_vec())
        .collect();

    Ok((attrs, images))
}

/// Parses an idx label file (magic 0x801): magic, count, one byte per
/// label.
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    let magic = read_be_u32(bytes, 0)?;
    if magic != LABELS_MAGIC {
        return Err(Error::InvalidData(format!(
            "not an idx label file (magic {:#x})",
            magic
        )));
    }

    let count = read_be_u32(bytes, 4)? as usize;
    if bytes.len() < 8 + count {
        return Err(Error::InvalidData(
            "idx label file seems corrupted; not large enough".to_string(),
        ));
    }

    Ok(bytes[8..8 + count].to_vec())
}

pub fn read_images<P: AsRef<Path>>(path: P) -> Result<(MnistAttrs, Vec<Vec<u8>>)> {
    parse_images(&fs::read(path)?)
}

pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    parse_labels(&fs::read(path)?)
}

/// u8 pixels to f64 vectors in [0, 1], one image at a time in parallel.
pub fn normalize(images: &[Vec<u8>]) -> Vec<Vec<f64>> {
    images
        .par_iter()
        .map(|image| image.iter().map(|pixel| f64::from(*pixel) / 255.0).collect())
        .collect()
}

/// ASCII spot-check of a range of images.
pub fn display_images(
    images: &[Vec<u8>],
    attrs: MnistAttrs,
    out: &mut dyn Write,
    begin: usize,
    end: usize,
) -> Result<()> {
    writeln!(
        out,
        "Dataset contains {} images of {}x{}",
        attrs.count, attrs.rows, attrs.cols
    )?;
    writeln!(out, "Displaying images from {} to {}", begin, end)?;

    for n in begin..end.min(images.len()) {
        writeln!(out, "--- [Image {}] ---", n)?;
        for r in 0..attrs.rows {
            for c in 0..attrs.cols {
                let pixel = images[n][c + r * attrs.cols];
                write!(out, "{}", if pixel == 0 { ' ' } else { 'x' })?;
            }
            writeln!(out)?;
        }
        writeln!(out, "------------------")?;
    }
    Ok(())
}

pub fn display_labels(
    labels: &[u8],
    out: &mut dyn Write,
    begin: usize,
    end: usize,
) -> Result<()> {
    writeln!(out, "Dataset contains {} labels", labels.len())?;
    writeln!(out, "Displaying labels from {} to {}", begin, end)?;

    for n in begin..end.min(labels.len()) {
        writeln!(out, "[Label {}] {}", n, labels[n])?;
    }
    Ok(())
}

/// A matched pair of idx image and label files, normalized and ready to
/// feed the network.
pub struct MnistDataset {
    attrs: MnistAttrs,
    images: Vec<Vec<f64>>,
    labels: Vec<u8>,
}

impl MnistDataset {
    pub fn load<P: AsRef<Path>>(images_path: P, labels_path: P) -> Result<Self> {
        let (attrs, raw_images) = read_images(images_path)?;
        let labels = read_labels(labels_path)?;

        if raw_images.len() != labels.len() {
            return Err(Error::InvalidData(format!(
                "image and label sets are inconsistent: {} images {} labels",
                raw_images.len(),
                labels.len()
            )));
        }

        Ok(Self {
            attrs,
            images: normalize(&raw_images),
            labels,
        })
    }

    pub fn attrs(&self) -> MnistAttrs {
        self.attrs
    }

    pub fn input_size(&self) -> usize {
        self.attrs.rows * self.attrs.cols
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn images(&self) -> &[Vec<f64>] {
        &self.images
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }
}

impl Dataset for MnistDataset {
    fn training_data(self) -> Vec<TrainPair> {
        self.images
            .into_iter()
            .zip(self.labels)
            .map(|(input, label)| TrainPair {
                input,
                output: one_hot(label, 0, 9),
            })
            .collect()
    }

    fn class_name(&self, num: usize) -> Option<String> {
        if num < 10 {
            Some(num.to_string())
        } else {
            None
        }
    }
}
