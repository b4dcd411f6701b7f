use std::io::Write;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::format::TokenReader;
use crate::seed::SeedGenerator;

/// One computational unit of a dense layer. Owns its weights and the
/// momentum accumulators, and caches the most recent inputs/output/delta
/// for the following backward pass. The caches hold the last sample
/// seen, they are overwritten on every pass and never accumulated.
#[derive(Debug, Clone)]
pub struct Neuron {
    afunc: Activation,
    learning_rate: f64,
    momentum: f64,
    bias: f64,
    weights: Vec<f64>,
    weights_prev_change: Vec<f64>,
    bias_prev_change: f64,
    inputs: Vec<f64>,
    output: f64,
    delta: f64,
}

impl Neuron {
    /// New neuron with `weights_n` weights drawn uniformly from
    /// [-0.5, 0.5). One seed is taken from the shared generator and
    /// feeds a private stream, so construction order alone determines
    /// the weights.
    pub fn random(
        weights_n: usize,
        afunc: Activation,
        learning_rate: f64,
        momentum: f64,
        seed_gen: &mut SeedGenerator,
        bias: f64,
    ) -> Self {
        let mut weight_rng = Pcg32::seed_from_u64(u64::from(seed_gen.seed()));
        let weights = (0..weights_n)
            .map(|_| weight_rng.gen_range(-0.5..0.5))
            .collect();

        Self::assemble(weights, afunc, learning_rate, momentum, bias)
    }

    pub fn from_weights(
        weights: Vec<f64>,
        afunc: Activation,
        learning_rate: f64,
        momentum: f64,
        bias: f64,
    ) -> Self {
        Self::assemble(weights, afunc, learning_rate, momentum, bias)
    }

    fn assemble(
        weights: Vec<f64>,
        afunc: Activation,
        learning_rate: f64,
        momentum: f64,
        bias: f64,
    ) -> Self {
        let n = weights.len();
        Self {
            afunc,
            learning_rate,
            momentum,
            bias,
            weights,
            weights_prev_change: vec![0.0; n],
            bias_prev_change: 0.0,
            inputs: vec![0.0; n],
            output: 0.0,
            delta: 0.0,
        }
    }

    /// Weighted sum plus bias, then the activation. Stores both the
    /// inputs and the output for the backward pass. The layer guarantees
    /// `inputs.len() == weights.len()`; it is not re-checked here.
    pub fn propagate_forward(&mut self, inputs: &[f64]) -> f64 {
        self.inputs.clear();
        self.inputs.extend_from_slice(inputs);

        let mut total = self.bias;
        for (input, weight) in inputs.iter().zip(&self.weights) {
            total += input * weight;
        }

        self.output = self.afunc.calc(total);
        self.output
    }

    /// delta = -(target - output) * f'(output); regression terminals only.
    pub fn propagate_backward_output_layer(&mut self, target: f64) {
        self.delta = -(target - self.output) * self.afunc.calc_derivative(self.output);
    }

    /// The softmax-cross-entropy delta needs every sibling's output, so
    /// the classification layer computes it and hands it down.
    pub fn propagate_backward_classification_layer(&mut self, delta: f64) {
        self.delta = delta;
    }

    /// delta from the weighted delta sum of the next layer. When the next
    /// layer is a dropout layer, the stored output is first corrected for
    /// the zeroing/rescale applied downstream so the derivative matches
    /// what was actually propagated.
    pub fn propagate_backward_hidden_layer(
        &mut self,
        sum_weighted_delta_next_layer: f64,
        next_layer_is_dropout: bool,
        dropout_rate: f64,
        dropped: bool,
    ) {
        if next_layer_is_dropout {
            if dropped {
                self.output = 0.0;
            } else {
                self.output /= 1.0 - dropout_rate;
            }
        }

        self.delta = sum_weighted_delta_next_layer * self.afunc.calc_derivative(self.output);
    }

    /// Gradient-descent step with momentum over the stored delta and
    /// inputs. The only operation that mutates the weights.
    pub fn update_weights(&mut self) {
        for n in 0..self.weights.len() {
            let gradient = self.delta * self.inputs[n];
            let change = self.learning_rate * gradient + self.momentum * self.weights_prev_change[n];
            self.weights[n] -= change;
            self.weights_prev_change[n] = change;
        }

        let change = self.learning_rate * self.delta + self.momentum * self.bias_prev_change;
        self.bias -= change;
        self.bias_prev_change = change;
    }

    pub fn update_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    pub fn squared_error(&self, target: f64) -> f64 {
        (target - self.output).powi(2)
    }

    pub fn output(&self) -> f64 {
        self.output
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn weight(&self, n: usize) -> f64 {
        self.weights[n]
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn input_size(&self) -> usize {
        self.weights.len()
    }

    pub fn inspect(&self, out: &mut dyn Write, weight_n: &mut usize) -> Result<()> {
        for weight in &self.weights {
            writeln!(out, "  w{}: {}", weight_n, weight)?;
            *weight_n += 1;
        }
        writeln!(out, "  Bias: {}", self.bias)?;
        Ok(())
    }

    pub fn save(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "[NeuronBegin]")?;
        writeln!(out, "ActivationFunction: {}", self.afunc.id())?;
        writeln!(out, "Momentum: {}", self.momentum)?;
        writeln!(out, "LearningRate: {}", self.learning_rate)?;
        writeln!(out, "Connections: {}", self.weights.len())?;

        write!(out, "Weights:")?;
        for weight in &self.weights {
            write!(out, " {}", weight)?;
        }
        writeln!(out)?;
        writeln!(out, "Bias: {}", self.bias)?;

        write!(out, "WeightsPrevChange:")?;
        for change in &self.weights_prev_change {
            write!(out, " {}", change)?;
        }
        writeln!(out)?;
        writeln!(out, "BiasPrevChange: {}", self.bias_prev_change)?;

        write!(out, "Inputs:")?;
        for input in &self.inputs {
            write!(out, " {}", input)?;
        }
        writeln!(out)?;
        writeln!(out, "Output: {}", self.output)?;
        writeln!(out, "Delta: {}", self.delta)?;
        writeln!(out, "[NeuronEnd]")?;
        Ok(())
    }

    pub fn read(r: &mut TokenReader) -> Result<Self> {
        r.expect_tag("[NeuronBegin]")?;

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
        r.expect_tag("Connections:")?;
        let connections: usize = r.parse()?;

        r.expect_tag("Weights:")?;
        let weights = r.parse_vec(connections)?;
        r.expect_tag("Bias:")?;
        let bias: f64 = r.parse()?;

        let mut neuron = Self::assemble(weights, afunc, learning_rate, momentum, bias);

        r.expect_tag("WeightsPrevChange:")?;
        neuron.weights_prev_change = r.parse_vec(connections)?;
        r.expect_tag("BiasPrevChange:")?;
        neuron.bias_prev_change = r.parse()?;

        r.expect_tag("Inputs:")?;
        neuron.inputs = r.parse_vec(connections)?;
        r.expect_tag("Output:")?;
        neuron.output = r.parse()?;
        r.expect_tag("Delta:")?;
        neuron.delta = r.parse()?;

        r.expect_tag("[NeuronEnd]")?;
        Ok(neuron)
    }
}
