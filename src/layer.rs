use std::fmt;
use std::io::Write;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::format::TokenReader;
use crate::neuron::Neuron;
use crate::seed::SeedGenerator;

/// Discriminant of the layer variants; the integer ids are the
/// `LayerType` values of the persistence format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Hidden,
    Dropout,
    OutputClassification,
    OutputRegression,
}

impl LayerKind {
    pub fn id(self) -> u8 {
        match self {
            LayerKind::Hidden => 0,
            LayerKind::Dropout => 1,
            LayerKind::OutputClassification => 2,
            LayerKind::OutputRegression => 3,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(LayerKind::Hidden),
            1 => Some(LayerKind::Dropout),
            2 => Some(LayerKind::OutputClassification),
            3 => Some(LayerKind::OutputRegression),
            _ => None,
        }
    }

    pub fn is_output(self) -> bool {
        matches!(
            self,
            LayerKind::OutputClassification | LayerKind::OutputRegression
        )
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Hidden => "hidden",
            LayerKind::Dropout => "dropout",
            LayerKind::OutputClassification => "output classification",
            LayerKind::OutputRegression => "output regression",
        };
        f.write_str(name)
    }
}

/// Homogeneous collection of neurons sharing one activation function.
/// Backs both hidden layers and the regression terminal.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    afunc: Activation,
    learning_rate: f64,
    momentum: f64,
    neurons: Vec<Neuron>,
}

impl DenseLayer {
    pub fn random(
        neurons_n: usize,
        prev_layer_size: usize,
        afunc: Activation,
        learning_rate: f64,
        momentum: f64,
        seed_gen: &mut SeedGenerator,
        bias: f64,
    ) -> Self {
        let neurons = (0..neurons_n)
            .map(|_| Neuron::random(prev_layer_size, afunc, learning_rate, momentum, seed_gen, bias))
            .collect();
        Self {
            afunc,
            learning_rate,
            momentum,
            neurons,
        }
    }

    pub fn from_weights(
        layer_weights: Vec<Vec<f64>>,
        afunc: Activation,
        learning_rate: f64,
        momentum: f64,
        bias: f64,
    ) -> Self {
        let neurons = layer_weights
            .into_iter()
            .map(|weights| Neuron::from_weights(weights, afunc, learning_rate, momentum, bias))
            .collect();
        Self {
            afunc,
            learning_rate,
            momentum,
            neurons,
        }
    }

    pub fn from_weights_biases(
        layer_weights: Vec<Vec<f64>>,
        layer_biases: Vec<f64>,
        afunc: Activation,
        learning_rate: f64,
        momentum: f64,
    ) -> Self {
        let neurons = layer_weights
            .into_iter()
            .zip(layer_biases)
            .map(|(weights, bias)| Neuron::from_weights(weights, afunc, learning_rate, momentum, bias))
            .collect();
        Self {
            afunc,
            learning_rate,
            momentum,
            neurons,
        }
    }

    pub fn size(&self) -> usize {
        self.neurons.len()
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    fn propagate_forward(&mut self, inputs: &[f64]) -> Vec<f64> {
        // Inputs zeroed by a preceding dropout layer keep the gradient
        // at zero during the weight update, since gradient = delta * input.
        self.neurons
            .iter_mut()
            .map(|neuron| neuron.propagate_forward(inputs))
            .collect()
    }

    fn probable_class(&self) -> usize {
        let mut best = 0;
        for n in 1..self.neurons.len() {
            if self.neurons[n].output() > self.neurons[best].output() {
                best = n;
            }
        }
        best
    }

    fn propagate_backward_output_layer(&mut self, expected: &[f64]) {
        for (neuron, target) in self.neurons.iter_mut().zip(expected) {
            neuron.propagate_backward_output_layer(*target);
        }
    }

    fn propagate_backward_hidden_layer(&mut self, next_layer: &Layer) {
        for n in 0..self.neurons.len() {
            let sum = next_layer.sum_delta(n);
            self.neurons[n].propagate_backward_hidden_layer(
                sum,
                next_layer.is_dropout(),
                next_layer.dropout_rate(),
                next_layer.dropped(n),
            );
        }
    }

    fn sum_delta(&self, weight_n: usize) -> f64 {
        self.neurons
            .iter()
            .map(|neuron| neuron.delta() * neuron.weight(weight_n))
            .sum()
    }

    fn update_weights(&mut self) {
        for neuron in &mut self.neurons {
            neuron.update_weights();
        }
    }

    fn update_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
        for neuron in &mut self.neurons {
            neuron.update_learning_rate(learning_rate);
        }
    }

    fn input_size(&self) -> usize {
        self.neurons.first().map_or(0, Neuron::input_size)
    }

    fn inspect(&self, out: &mut dyn Write, weight_n: &mut usize) -> Result<()> {
        writeln!(
            out,
            "Neurons: {} activation: {}",
            self.neurons.len(),
            self.afunc.name()
        )?;
        for (n, neuron) in self.neurons.iter().enumerate() {
            writeln!(out, " Neuron {}", n + 1)?;
            neuron.inspect(out, weight_n)?;
        }
        Ok(())
    }

    fn save(&self, out: &mut dyn Write, kind: LayerKind, outputs: Option<&[f64]>) -> Result<()> {
        writeln!(out, "LayerType: {}", kind.id())?;
        writeln!(out, "[LayerBegin]")?;
        writeln!(out, "ActivationFunction: {}", self.afunc.id())?;
        writeln!(out, "Momentum: {}", self.momentum)?;
        writeln!(out, "LearningRate: {}", self.learning_rate)?;
        writeln!(out, "InputSize: {}", self.input_size())?;
        writeln!(out, "OutputSize: {}", self.neurons.len())?;

        if let Some(outputs) = outputs {
            write!(out, "OutputClassification:")?;
            for output in outputs {
                write!(out, " {}", output)?;
            }
            writeln!(out)?;
        }

        for neuron in &self.neurons {
            neuron.save(out)?;
        }

        writeln!(out, "[LayerEnd]")?;
        writeln!(out)?;
        Ok(())
    }
}

struct DenseHeader {
    afunc: Activation,
    momentum: f64,
    learning_rate: f64,
    output_n: usize,
}

fn read_dense_header(r: &mut TokenReader) -> Result<DenseHeader> {
    r.expect_tag("[LayerBegin]")?;

    r.expect_tag("ActivationFunction:")?;
    let afunc_id: u8 = r.parse()?;
    let afunc = Activation::from_id(afunc_id).ok_or(Error::Malformed {
        token: afunc_id.to_string(),
        line: r.line(),
    })?;

    r.expect_tag("Momentum:")?;
    let momentum: f64 = r.parse()?;
    r.expect_tag("LearningRate:")?;
    let learning_rate: f64 = r.parse()?;
    r.expect_tag("InputSize:")?;
    let _input_n: usize = r.parse()?;
    r.expect_tag("OutputSize:")?;
    let output_n: usize = r.parse()?;

    Ok(DenseHeader {
        afunc,
        momentum,
        learning_rate,
        output_n,
    })
}

fn read_dense_layer(r: &mut TokenReader) -> Result<DenseLayer> {
    let header = read_dense_header(r)?;
    let neurons = (0..header.output_n)
        .map(|_| Neuron::read(r))
        .collect::<Result<Vec<_>>>()?;
    r.expect_tag("[LayerEnd]")?;

    Ok(DenseLayer {
        afunc: header.afunc,
        learning_rate: header.learning_rate,
        momentum: header.momentum,
        neurons,
    })
}

/// Dense layer whose forward pass normalizes the raw neuron outputs with
/// a softmax; the normalized vector is cached for the loss and for
/// serialization.
#[derive(Debug, Clone)]
pub struct ClassificationLayer {
    dense: DenseLayer,
    outputs: Vec<f64>,
}

impl ClassificationLayer {
    pub fn new(dense: DenseLayer) -> Self {
        let n = dense.size();
        Self {
            dense,
            outputs: vec![0.0; n],
        }
    }

    pub fn outputs(&self) -> &[f64] {
        &self.outputs
    }

    fn propagate_forward(&mut self, inputs: &[f64]) -> Vec<f64> {
        let raw = self.dense.propagate_forward(inputs);
        let sum_exp: f64 = raw.iter().map(|output| output.exp()).sum();
        self.outputs = raw.iter().map(|output| output.exp() / sum_exp).collect();
        self.outputs.clone()
    }

    fn calc_error(&self, expected: &[f64]) -> Result<f64> {
        if expected.len() != self.outputs.len() {
            return Err(Error::SizeMismatch {
                op: "cross entropy error",
                expected: self.outputs.len(),
                provided: expected.len(),
            });
        }

        Ok(expected
            .iter()
            .zip(&self.outputs)
            .map(|(target, output)| -target * output.ln())
            .sum())
    }

    fn propagate_backward_output_layer(&mut self, expected: &[f64]) {
        let sum_expected: f64 = expected.iter().sum();

        for (n, neuron) in self.dense.neurons.iter_mut().enumerate() {
            // Reduces to output - target when the expected vector sums to 1.
            neuron.propagate_backward_classification_layer(
                -(expected[n] - self.outputs[n] * sum_expected),
            );
        }
    }

    fn read(r: &mut TokenReader) -> Result<Self> {
        let header = read_dense_header(r)?;

        r.expect_tag("OutputClassification:")?;
        let outputs = r.parse_vec(header.output_n)?;

        let neurons = (0..header.output_n)
            .map(|_| Neuron::read(r))
            .collect::<Result<Vec<_>>>()?;
        r.expect_tag("[LayerEnd]")?;

        Ok(Self {
            dense: DenseLayer {
                afunc: header.afunc,
                learning_rate: header.learning_rate,
                momentum: header.momentum,
                neurons,
            },
            outputs,
        })
    }
}

/// Weightless regularization layer. Holds the keep-mask of the last
/// training pass and caches the downstream delta sums so the previous
/// dense layer can read them through `sum_delta`.
#[derive(Debug, Clone)]
pub struct DropoutLayer {
    rate: f64,
    kept: Vec<bool>,
    sum_delta_next: Vec<f64>,
    generator: Pcg32,
}

impl DropoutLayer {
    pub fn new(rate: f64, size: usize, seed_gen: &mut SeedGenerator) -> Self {
        Self {
            rate,
            kept: vec![true; size],
            sum_delta_next: vec![0.0; size],
            generator: Pcg32::seed_from_u64(u64::from(seed_gen.seed())),
        }
    }

    pub fn size(&self) -> usize {
        self.kept.len()
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn kept(&self) -> &[bool] {
        &self.kept
    }

    /// Inverted dropout: one uniform [0,1) draw per position; survivors
    /// are rescaled by 1/(1-rate) so the expected magnitude is unchanged.
    /// With `ignore_dropout` the signal passes through untouched and the
    /// mask and generator are left alone.
    fn propagate_forward(&mut self, inputs: &[f64], ignore_dropout: bool) -> Vec<f64> {
        if ignore_dropout {
            return inputs.to_vec();
        }

        let mut outputs = Vec::with_capacity(self.kept.len());
        for n in 0..self.kept.len() {
            if self.generator.gen::<f64>() >= self.rate {
                self.kept[n] = true;
                outputs.push(inputs[n] / (1.0 - self.rate));
            } else {
                self.kept[n] = false;
                outputs.push(0.0);
            }
        }
        outputs
    }

    /// No weights and no delta of its own; only mirrors the next layer's
    /// weighted delta sums for the layer before this one.
    fn propagate_backward_hidden_layer(&mut self, next_layer: &Layer) {
        for n in 0..self.sum_delta_next.len() {
            self.sum_delta_next[n] = next_layer.sum_delta(n);
        }
    }

    fn inspect(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "Neurons: {}", self.kept.len())?;
        writeln!(out, "Dropout layer of rate {}", self.rate)?;
        Ok(())
    }

    fn save(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "LayerType: {}", LayerKind::Dropout.id())?;
        writeln!(out, "[LayerBegin]")?;
        writeln!(out, "Size: {}", self.kept.len())?;
        writeln!(out, "DropoutRate: {}", self.rate)?;
        writeln!(out, "Generator: {}", serde_json::to_string(&self.generator)?)?;

        write!(out, "Activations:")?;
        for kept in &self.kept {
            write!(out, " {}", u8::from(*kept))?;
        }
        writeln!(out)?;

        write!(out, "Deltas:")?;
        for delta in &self.sum_delta_next {
            write!(out, " {}", delta)?;
        }
        writeln!(out)?;
        writeln!(out, "[LayerEnd]")?;
        writeln!(out)?;
        Ok(())
    }

    fn read(r: &mut TokenReader) -> Result<Self> {
        r.expect_tag("[LayerBegin]")?;

        r.expect_tag("Size:")?;
        let size: usize = r.parse()?;
        r.expect_tag("DropoutRate:")?;
        let rate: f64 = r.parse()?;

        r.expect_tag("Generator:")?;
        let token = match r.next_token() {
            Some(token) => token,
            None => return Err(Error::UnexpectedEof { line: r.line() }),
        };
        let generator: Pcg32 = serde_json::from_str(token)?;

        r.expect_tag("Activations:")?;
        let mask: Vec<u8> = r.parse_vec(size)?;

        r.expect_tag("Deltas:")?;
        let sum_delta_next = r.parse_vec(size)?;

        r.expect_tag("[LayerEnd]")?;

        Ok(Self {
            rate,
            kept: mask.into_iter().map(|bit| bit != 0).collect(),
            sum_delta_next,
            generator,
        })
    }
}

/// A network layer. A closed set: dense hidden layers, weightless
/// dropout layers, and the two terminal variants.
#[derive(Debug, Clone)]
pub enum Layer {
    Hidden(DenseLayer),
    Dropout(DropoutLayer),
    OutputClassification(ClassificationLayer),
    OutputRegression(DenseLayer),
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Hidden(_) => LayerKind::Hidden,
            Layer::Dropout(_) => LayerKind::Dropout,
            Layer::OutputClassification(_) => LayerKind::OutputClassification,
            Layer::OutputRegression(_) => LayerKind::OutputRegression,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Layer::Hidden(dense) | Layer::OutputRegression(dense) => dense.size(),
            Layer::OutputClassification(classification) => classification.dense.size(),
            Layer::Dropout(dropout) => dropout.size(),
        }
    }

    /// Dense variants expose their neurons; a dropout layer has none.
    pub fn neurons(&self) -> Option<&[Neuron]> {
        match self {
            Layer::Hidden(dense) | Layer::OutputRegression(dense) => Some(dense.neurons()),
            Layer::OutputClassification(classification) => Some(classification.dense.neurons()),
            Layer::Dropout(_) => None,
        }
    }

    pub fn propagate_forward(&mut self, inputs: &[f64], ignore_dropout: bool) -> Vec<f64> {
        match self {
            Layer::Hidden(dense) | Layer::OutputRegression(dense) => {
                dense.propagate_forward(inputs)
            }
            Layer::OutputClassification(classification) => {
                classification.propagate_forward(inputs)
            }
            Layer::Dropout(dropout) => dropout.propagate_forward(inputs, ignore_dropout),
        }
    }

    pub fn probable_class(&self) -> Result<usize> {
        match self {
            Layer::Hidden(dense) | Layer::OutputRegression(dense) => Ok(dense.probable_class()),
            Layer::OutputClassification(classification) => {
                Ok(classification.dense.probable_class())
            }
            Layer::Dropout(_) => Err(Error::IllegalLayerOp {
                op: "probable class",
                kind: LayerKind::Dropout,
            }),
        }
    }

    /// Loss of a terminal layer: summed squared error for regression,
    /// total cross entropy for classification. Illegal elsewhere.
    pub fn calc_error(&self, expected: &[f64]) -> Result<f64> {
        match self {
            Layer::OutputRegression(dense) => {
                if expected.len() != dense.size() {
                    return Err(Error::SizeMismatch {
                        op: "squared error",
                        expected: dense.size(),
                        provided: expected.len(),
                    });
                }
                Ok(dense
                    .neurons
                    .iter()
                    .zip(expected)
                    .map(|(neuron, target)| neuron.squared_error(*target))
                    .sum())
            }
            Layer::OutputClassification(classification) => classification.calc_error(expected),
            Layer::Hidden(_) | Layer::Dropout(_) => Err(Error::IllegalLayerOp {
                op: "calculate error",
                kind: self.kind(),
            }),
        }
    }

    pub fn propagate_backward_output_layer(&mut self, expected: &[f64]) -> Result<()> {
        match self {
            Layer::OutputRegression(dense) => {
                dense.propagate_backward_output_layer(expected);
                Ok(())
            }
            Layer::OutputClassification(classification) => {
                classification.propagate_backward_output_layer(expected);
                Ok(())
            }
            Layer::Hidden(_) | Layer::Dropout(_) => Err(Error::IllegalLayerOp {
                op: "propagate backward",
                kind: self.kind(),
            }),
        }
    }

    pub fn propagate_backward_hidden_layer(&mut self, next_layer: &Layer) {
        match self {
            Layer::Hidden(dense) | Layer::OutputRegression(dense) => {
                dense.propagate_backward_hidden_layer(next_layer);
            }
            Layer::OutputClassification(classification) => {
                classification.dense.propagate_backward_hidden_layer(next_layer);
            }
            Layer::Dropout(dropout) => dropout.propagate_backward_hidden_layer(next_layer),
        }
    }

    /// Weighted sum of this layer's deltas seen from weight `weight_n`
    /// of the previous layer; a dropout layer forwards the sums it
    /// cached during its own backward pass.
    pub fn sum_delta(&self, weight_n: usize) -> f64 {
        match self {
            Layer::Hidden(dense) | Layer::OutputRegression(dense) => dense.sum_delta(weight_n),
            Layer::OutputClassification(classification) => {
                classification.dense.sum_delta(weight_n)
            }
            Layer::Dropout(dropout) => dropout.sum_delta_next[weight_n],
        }
    }

    pub fn is_dropout(&self) -> bool {
        matches!(self, Layer::Dropout(_))
    }

    pub fn dropout_rate(&self) -> f64 {
        match self {
            Layer::Dropout(dropout) => dropout.rate,
            _ => 0.0,
        }
    }

    /// Whether position `n` was zeroed in the last masked forward pass.
    /// Always false for dense layers.
    pub fn dropped(&self, n: usize) -> bool {
        match self {
            Layer::Dropout(dropout) => !dropout.kept[n],
            _ => false,
        }
    }

    pub fn update_weights(&mut self) {
        match self {
            Layer::Hidden(dense) | Layer::OutputRegression(dense) => dense.update_weights(),
            Layer::OutputClassification(classification) => classification.dense.update_weights(),
            Layer::Dropout(_) => {}
        }
    }

    pub fn update_learning_rate(&mut self, learning_rate: f64) {
        match self {
            Layer::Hidden(dense) | Layer::OutputRegression(dense) => {
                dense.update_learning_rate(learning_rate);
            }
            Layer::OutputClassification(classification) => {
                classification.dense.update_learning_rate(learning_rate);
            }
            Layer::Dropout(_) => {}
        }
    }

    pub fn inspect(&self, out: &mut dyn Write, weight_n: &mut usize) -> Result<()> {
        match self {
            Layer::Hidden(dense) | Layer::OutputRegression(dense) => dense.inspect(out, weight_n),
            Layer::OutputClassification(classification) => {
                classification.dense.inspect(out, weight_n)
            }
            Layer::Dropout(dropout) => dropout.inspect(out),
        }
    }

    pub fn save(&self, out: &mut dyn Write) -> Result<()> {
        match self {
            Layer::Hidden(dense) => dense.save(out, LayerKind::Hidden, None),
            Layer::OutputRegression(dense) => dense.save(out, LayerKind::OutputRegression, None),
            Layer::OutputClassification(classification) => classification.dense.save(
                out,
                LayerKind::OutputClassification,
                Some(&classification.outputs),
            ),
            Layer::Dropout(dropout) => dropout.save(out),
        }
    }

    /// Reads one layer block. The caller has already consumed the
    /// `LayerType:` tag and resolved `kind` from it.
    pub fn read(r: &mut TokenReader, kind: LayerKind) -> Result<Self> {
        match kind {
            LayerKind::Hidden => Ok(Layer::Hidden(read_dense_layer(r)?)),
            LayerKind::OutputRegression => Ok(Layer::OutputRegression(read_dense_layer(r)?)),
            LayerKind::OutputClassification => {
                Ok(Layer::OutputClassification(ClassificationLayer::read(r)?))
            }
            LayerKind::Dropout => Ok(Layer::Dropout(DropoutLayer::read(r)?)),
        }
    }
}
