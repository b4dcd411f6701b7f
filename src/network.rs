use std::fs;
use std::io::Write;
use std::path::Path;

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::format::TokenReader;
use crate::layer::{ClassificationLayer, DenseLayer, DropoutLayer, Layer, LayerKind};
use crate::seed::SeedGenerator;

/// An ordered stack of layers over a fixed-width input. The network
/// owns the layer sequence and the root seed generator, enforces the
/// topology invariants on insertion, and drives forward propagation,
/// loss calculation, backward propagation and the weight updates.
#[derive(Debug)]
pub struct NeuralNetwork {
    input_size: usize,
    learning_rate: f64,
    momentum: f64,
    seed_gen: SeedGenerator,
    layers: Vec<Layer>,
}

impl NeuralNetwork {
    /// Network without momentum, seeded from OS entropy. At least one
    /// output layer has to be added before the network can be used.
    pub fn new(input_size: usize, learning_rate: f64) -> Self {
        Self::with_momentum(input_size, learning_rate, 0.0, None)
    }

    /// Full-control constructor. A fixed `seed` makes weight
    /// initialization and dropout masks reproducible run over run.
    pub fn with_momentum(
        input_size: usize,
        learning_rate: f64,
        momentum: f64,
        seed: Option<u32>,
    ) -> Self {
        Self {
            input_size,
            learning_rate,
            momentum,
            seed_gen: SeedGenerator::new(seed),
            layers: Vec::new(),
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Whether the topology is complete, i.e. the last layer is an
    /// output layer.
    pub fn has_output_layer(&self) -> bool {
        self.layers
            .last()
            .map_or(false, |layer| layer.kind().is_output())
    }

    fn check_topology_open(&self, kind: LayerKind) -> Result<()> {
        if self.has_output_layer() {
            Err(Error::LayerAfterOutput { kind })
        } else {
            Ok(())
        }
    }

    /// Width the next layer has to connect to: the last layer's output
    /// width, or the input size for the first layer.
    fn last_layer_size(&self) -> usize {
        self.layers
            .last()
            .map_or(self.input_size, |layer| layer.size())
    }

    fn check_layer_weights(&self, layer_weights: &[Vec<f64>]) -> Result<()> {
        let expected = self.last_layer_size();
        for (n, weights) in layer_weights.iter().enumerate() {
            if weights.len() != expected {
                return Err(Error::WeightSizeMismatch {
                    expected,
                    provided: weights.len(),
                    neuron: n + 1,
                });
            }
        }
        Ok(())
    }

    fn check_layer_biases(layer_weights: &[Vec<f64>], layer_biases: &[f64]) -> Result<()> {
        if layer_weights.len() != layer_biases.len() {
            return Err(Error::BiasSizeMismatch {
                expected: layer_weights.len(),
                provided: layer_biases.len(),
            });
        }
        Ok(())
    }

    pub fn add_hidden_layer(
        &mut self,
        neurons_n: usize,
        afunc: Activation,
        bias: f64,
    ) -> Result<()> {
        self.check_topology_open(LayerKind::Hidden)?;
        let prev = self.last_layer_size();
        let dense = DenseLayer::random(
            neurons_n,
            prev,
            afunc,
            self.learning_rate,
            self.momentum,
            &mut self.seed_gen,
            bias,
        );
        self.layers.push(Layer::Hidden(dense));
        Ok(())
    }

    pub fn add_hidden_layer_from_weights(
        &mut self,
        layer_weights: Vec<Vec<f64>>,
        afunc: Activation,
        bias: f64,
    ) -> Result<()> {
        self.check_topology_open(LayerKind::Hidden)?;
        self.check_layer_weights(&layer_weights)?;
        let dense = DenseLayer::from_weights(
            layer_weights,
            afunc,
            self.learning_rate,
            self.momentum,
            bias,
        );
        self.layers.push(Layer::Hidden(dense));
        Ok(())
    }

    pub fn add_hidden_layer_from_weights_biases(
        &mut self,
        layer_weights: Vec<Vec<f64>>,
        layer_biases: Vec<f64>,
        afunc: Activation,
    ) -> Result<()> {
        self.check_topology_open(LayerKind::Hidden)?;
        self.check_layer_weights(&layer_weights)?;
        Self::check_layer_biases(&layer_weights, &layer_biases)?;
        let dense = DenseLayer::from_weights_biases(
            layer_weights,
            layer_biases,
            afunc,
            self.learning_rate,
            self.momentum,
        );
        self.layers.push(Layer::Hidden(dense));
        Ok(())
    }

    pub fn add_output_regression_layer(
        &mut self,
        neurons_n: usize,
        afunc: Activation,
        bias: f64,
    ) -> Result<()> {
        self.check_topology_open(LayerKind::OutputRegression)?;
        let prev = self.last_layer_size();
        let dense = DenseLayer::random(
            neurons_n,
            prev,
            afunc,
            self.learning_rate,
            self.momentum,
            &mut self.seed_gen,
            bias,
        );
        self.layers.push(Layer::OutputRegression(dense));
        Ok(())
    }

    pub fn add_output_regression_layer_from_weights(
        &mut self,
        layer_weights: Vec<Vec<f64>>,
        afunc: Activation,
        bias: f64,
    ) -> Result<()> {
        self.check_topology_open(LayerKind::OutputRegression)?;
        self.check_layer_weights(&layer_weights)?;
        let dense = DenseLayer::from_weights(
            layer_weights,
            afunc,
            self.learning_rate,
            self.momentum,
            bias,
        );
        self.layers.push(Layer::OutputRegression(dense));
        Ok(())
    }

    pub fn add_output_regression_layer_from_weights_biases(
        &mut self,
        layer_weights: Vec<Vec<f64>>,
        layer_biases: Vec<f64>,
        afunc: Activation,
    ) -> Result<()> {
        self.check_topology_open(LayerKind::OutputRegression)?;
        self.check_layer_weights(&layer_weights)?;
        Self::check_layer_biases(&layer_weights, &layer_biases)?;
        let dense = DenseLayer::from_weights_biases(
            layer_weights,
            layer_biases,
            afunc,
            self.learning_rate,
            self.momentum,
        );
        self.layers.push(Layer::OutputRegression(dense));
        Ok(())
    }

    /// The classification terminal applies a softmax over identity
    /// pre-activations, so no activation function is taken here.
    pub fn add_output_classification_layer(&mut self, neurons_n: usize, bias: f64) -> Result<()> {
        self.check_topology_open(LayerKind::OutputClassification)?;
        let prev = self.last_layer_size();
        let dense = DenseLayer::random(
            neurons_n,
            prev,
            Activation::Identity,
            self.learning_rate,
            self.momentum,
            &mut self.seed_gen,
            bias,
        );
        self.layers
            .push(Layer::OutputClassification(ClassificationLayer::new(dense)));
        Ok(())
    }

    pub fn add_output_classification_layer_from_weights(
        &mut self,
        layer_weights: Vec<Vec<f64>>,
        bias: f64,
    ) -> Result<()> {
        self.check_topology_open(LayerKind::OutputClassification)?;
        self.check_layer_weights(&layer_weights)?;
        let dense = DenseLayer::from_weights(
            layer_weights,
            Activation::Identity,
            self.learning_rate,
            self.momentum,
            bias,
        );
        self.layers
            .push(Layer::OutputClassification(ClassificationLayer::new(dense)));
        Ok(())
    }

    pub fn add_output_classification_layer_from_weights_biases(
        &mut self,
        layer_weights: Vec<Vec<f64>>,
        layer_biases: Vec<f64>,
    ) -> Result<()> {
        self.check_topology_open(LayerKind::OutputClassification)?;
        self.check_layer_weights(&layer_weights)?;
        Self::check_layer_biases(&layer_weights, &layer_biases)?;
        let dense = DenseLayer::from_weights_biases(
            layer_weights,
            layer_biases,
            Activation::Identity,
            self.learning_rate,
            self.momentum,
        );
        self.layers
            .push(Layer::OutputClassification(ClassificationLayer::new(dense)));
        Ok(())
    }

    /// Dropout over the width of the previous layer (or of the input
    /// when it is the first layer).
    pub fn add_dropout_layer(&mut self, dropout_rate: f64) -> Result<()> {
        self.check_topology_open(LayerKind::Dropout)?;
        let size = self.last_layer_size();
        let dropout = DropoutLayer::new(dropout_rate, size, &mut self.seed_gen);
        self.layers.push(Layer::Dropout(dropout));
        Ok(())
    }

    /// Threads `inputs` through every layer in order and returns the
    /// output layer's vector. `ignore_dropout` bypasses the dropout
    /// masks for inference on a trained network.
    pub fn propagate_forward(&mut self, inputs: &[f64], ignore_dropout: bool) -> Result<Vec<f64>> {
        if !self.has_output_layer() {
            return Err(Error::NoOutputLayer {
                op: "propagate forward",
            });
        }
        if inputs.len() != self.input_size {
            return Err(Error::SizeMismatch {
                op: "propagate forward",
                expected: self.input_size,
                provided: inputs.len(),
            });
        }

        let mut outputs = inputs.to_vec();
        for layer in &mut self.layers {
            outputs = layer.propagate_forward(&outputs, ignore_dropout);
        }
        Ok(outputs)
    }

    /// Forward pass with dropout bypassed; the inference entry point.
    pub fn predict(&mut self, inputs: &[f64]) -> Result<Vec<f64>> {
        self.propagate_forward(inputs, true)
    }

    /// Index of the output neuron with the largest activation from the
    /// last forward pass.
    pub fn probable_class(&self) -> Result<usize> {
        match self.layers.last() {
            Some(last) if last.kind().is_output() => last.probable_class(),
            _ => Err(Error::NoOutputLayer {
                op: "probable class",
            }),
        }
    }

    /// Loss of the last forward pass against `expected`: mean squared
    /// error for a regression terminal, total cross entropy for a
    /// classification terminal (the asymmetry is deliberate).
    pub fn calc_error(&self, expected: &[f64]) -> Result<f64> {
        let last = self.terminal_layer("calculate error", expected)?;

        match last.kind() {
            LayerKind::OutputClassification => last.calc_error(expected),
            _ => Ok(last.calc_error(expected)? / last.size() as f64),
        }
    }

    /// Computes the delta of every neuron from the last forward pass:
    /// the terminal layer from `expected`, then every earlier layer from
    /// the weighted delta sums of the layer after it. Weights are left
    /// untouched; call `update_weights` to apply the pending deltas.
    pub fn propagate_backward(&mut self, expected: &[f64]) -> Result<()> {
        self.terminal_layer("propagate backward", expected)?;

        let last = self.layers.len() - 1;
        self.layers[last].propagate_backward_output_layer(expected)?;

        for n in (0..last).rev() {
            let (head, tail) = self.layers.split_at_mut(n + 1);
            head[n].propagate_backward_hidden_layer(&tail[0]);
        }
        Ok(())
    }

    /// Applies every neuron's pending delta, layer by layer in forward
    /// order. Each update consumes the most recently stored delta and
    /// inputs, so interleaving several backward passes before one update
    /// trains on the last sample only.
    pub fn update_weights(&mut self) {
        for layer in &mut self.layers {
            layer.update_weights();
        }
    }

    /// On-line training step: backward pass and weight update in one go.
    pub fn propagate_backward_and_update_weights(&mut self, expected: &[f64]) -> Result<()> {
        self.propagate_backward(expected)?;
        self.update_weights();
        Ok(())
    }

    /// New learning rate for the network and every neuron in it; used by
    /// the learning-rate schedules of the training wrapper.
    pub fn update_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
        for layer in &mut self.layers {
            layer.update_learning_rate(learning_rate);
        }
    }

    fn terminal_layer(&self, op: &'static str, expected: &[f64]) -> Result<&Layer> {
        let last = match self.layers.last() {
            Some(last) if last.kind().is_output() => last,
            _ => return Err(Error::NoOutputLayer { op }),
        };
        if expected.len() != last.size() {
            return Err(Error::SizeMismatch {
                op,
                expected: last.size(),
                provided: expected.len(),
            });
        }
        Ok(last)
    }

    /// Human-readable dump of the whole weight state.
    pub fn inspect(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "------")?;
        writeln!(out, "* Inputs: {}", self.input_size)?;
        writeln!(out, "------")?;

        let mut weight_n = 1;
        for layer in &self.layers {
            layer.inspect(out, &mut weight_n)?;
            writeln!(out, "------")?;
        }
        Ok(())
    }

    /// Serializes the complete network state, transients included, so a
    /// reloaded network continues bit-for-bit where this one stopped.
    pub fn save(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "[NetworkBegin]")?;
        writeln!(out, "LayerNumber: {}", self.layers.len())?;
        writeln!(out, "Momentum: {}", self.momentum)?;
        writeln!(out, "LearningRate: {}", self.learning_rate)?;
        writeln!(out, "InputSize: {}", self.input_size)?;
        writeln!(out, "SeedGenerator: {}", self.seed_gen.state_token()?)?;
        writeln!(out)?;

        for layer in &self.layers {
            layer.save(out)?;
        }

        writeln!(out, "[NetworkEnd]")?;
        Ok(())
    }

    pub fn save_to_string(&self) -> Result<String> {
        let mut bytes = Vec::new();
        self.save(&mut bytes)?;
        // The format is pure ASCII.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = fs::File::create(path)?;
        self.save(&mut file)
    }

    /// Rebuilds a network from its serialized form, validating every
    /// expected tag and failing with the line number of the first
    /// mismatch.
    pub fn load_from_str(src: &str) -> Result<Self> {
        let mut r = TokenReader::new(src);

        r.expect_tag("[NetworkBegin]")?;
        r.expect_tag("LayerNumber:")?;
        let layers_n: usize = r.parse()?;

        if layers_n == 0 {
            return Err(Error::EmptyNetwork);
        }

        r.expect_tag("Momentum:")?;
        let momentum: f64 = r.parse()?;
        r.expect_tag("LearningRate:")?;
        let learning_rate: f64 = r.parse()?;
        r.expect_tag("InputSize:")?;
        let input_size: usize = r.parse()?;

        r.expect_tag("SeedGenerator:")?;
        let token = match r.next_token() {
            Some(token) => token,
            None => return Err(Error::UnexpectedEof { line: r.line() }),
        };
        let seed_gen = SeedGenerator::from_state_token(token)?;

        let mut net = Self {
            input_size,
            learning_rate,
            momentum,
            seed_gen,
            layers: Vec::with_capacity(layers_n),
        };

        for _ in 0..layers_n {
            r.expect_tag("LayerType:")?;
            let kind_id: u8 = r.parse()?;
            let kind = LayerKind::from_id(kind_id).ok_or(Error::Malformed {
                token: kind_id.to_string(),
                line: r.line(),
            })?;
            net.layers.push(Layer::read(&mut r, kind)?);
        }

        r.expect_tag("[NetworkEnd]")?;
        Ok(net)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let src = fs::read_to_string(path)?;
        Self::load_from_str(&src)
    }
}
