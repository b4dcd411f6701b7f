use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use serde::Deserialize;

use feedforward::dataset::{load_image_grayscale, MnistDataset};
use feedforward::{
    argmax, hide_cursor, one_hot, show_cursor, Activation, NeuralNetwork, Result,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct TrainXor {
    #[clap(short, long, default_value_t = 10)]
    seed: u32,
    #[clap(short, long, default_value_t = 10000)]
    epochs: usize,
}

impl TrainXor {
    fn exec(self) -> Result<()> {
        let mut net = NeuralNetwork::with_momentum(2, 0.5, 0.9, Some(self.seed));
        net.add_hidden_layer(5, Activation::Logistic, 0.0)?;
        net.add_output_regression_layer(1, Activation::Logistic, 0.0)?;

        let training_sets: [(Vec<f64>, f64); 4] = [
            (vec![0.0, 0.0], 0.0),
            (vec![0.0, 1.0], 1.0),
            (vec![1.0, 0.0], 1.0),
            (vec![1.0, 1.0], 0.0),
        ];

        println!("training an XOR gate for {} epochs...", self.epochs);

        for _ in 0..self.epochs {
            for (input, expected) in &training_sets {
                net.propagate_forward(input, false)?;
                net.propagate_backward_and_update_weights(&[*expected])?;
            }
        }

        for (input, expected) in &training_sets {
            let output = net.predict(input)?[0];
            let line = format!(
                "{:?} -> {:.5} (expected {})",
                input, output, expected
            );
            if (output - expected).abs() < 0.1 {
                println!("{}", line.green());
            } else {
                println!("{}", line.red());
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct MnistTrainConfig {
    learning_rate: f64,
    momentum: f64,
    hidden_neurons: usize,
    hidden_activation: Activation,
    dropout_rate: f64,
    epochs: usize,
    seed: Option<u32>,
}

impl Default for MnistTrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.0001,
            momentum: 0.4,
            hidden_neurons: 128,
            hidden_activation: Activation::ReLU,
            dropout_rate: 0.5,
            epochs: 3,
            seed: None,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct TrainMnist {
    #[clap(short, long)]
    images: PathBuf,
    #[clap(short, long)]
    labels: PathBuf,
    /// Optional YAML file overriding the default hyper-parameters.
    #[clap(short, long)]
    config: Option<PathBuf>,
    model_path: PathBuf,
}

impl TrainMnist {
    fn exec(self) -> Result<()> {
        let config: MnistTrainConfig = match &self.config {
            Some(path) => serde_yaml::from_str(&std::fs::read_to_string(path)?)
                .map_err(|e| feedforward::Error::InvalidData(e.to_string()))?,
            None => MnistTrainConfig::default(),
        };

        println!("opening training set...");
        let dataset = MnistDataset::load(&self.images, &self.labels)?;
        if dataset.is_empty() {
            return Err(feedforward::Error::InvalidData(
                "training set is empty".to_string(),
            ));
        }
        let attrs = dataset.attrs();
        println!(
            "{} images of {}x{}",
            dataset.len(),
            attrs.rows,
            attrs.cols
        );

        let mut net = NeuralNetwork::with_momentum(
            dataset.input_size(),
            config.learning_rate,
            config.momentum,
            config.seed,
        );
        net.add_hidden_layer(config.hidden_neurons, config.hidden_activation, 0.0)?;
        net.add_dropout_layer(config.dropout_rate)?;
        net.add_output_regression_layer(10, Activation::Tanh, 0.0)?;

        println!(
            "training on {} images for {} epochs...",
            dataset.len(),
            config.epochs
        );
        hide_cursor();

        for epoch in 0..config.epochs {
            println!("epoch {} / {}", epoch + 1, config.epochs);
            let mut error = 0.0;

            for (n, (image, label)) in dataset.images().iter().zip(dataset.labels()).enumerate() {
                let expected = one_hot(*label, 0, 9);
                net.propagate_forward(image, false)?;
                error = net.calc_error(&expected)?;
                net.propagate_backward_and_update_weights(&expected)?;

                if n % 100 == 0 {
                    print_progress(n, dataset.len(), error);
                }
            }

            print_progress(dataset.len(), dataset.len(), error);
            println!();
        }

        show_cursor();
        net.save_to_file(&self.model_path)?;
        println!("{}", "network trained and saved".green());
        Ok(())
    }
}

fn print_progress(n: usize, total: usize, error: f64) {
    const BAR_WIDTH: usize = 50;
    let position = n * BAR_WIDTH / total;
    let bar: String = (0..BAR_WIDTH)
        .map(|i| if i < position { '=' } else { '_' })
        .collect();
    print!(
        "\r{} / {} [ {} ] {}% | error: {:.4}",
        n,
        total,
        bar,
        n * 100 / total,
        error
    );
    let _ = std::io::stdout().flush();
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct TestMnist {
    #[clap(short, long)]
    images: PathBuf,
    #[clap(short, long)]
    labels: PathBuf,
    model_path: PathBuf,
}

impl TestMnist {
    fn exec(self) -> Result<()> {
        println!("opening test set...");
        let dataset = MnistDataset::load(&self.images, &self.labels)?;
        let mut net = NeuralNetwork::load_from_file(&self.model_path)?;

        let mut correct = 0usize;
        for (image, label) in dataset.images().iter().zip(dataset.labels()) {
            let outputs = net.predict(image)?;
            if argmax(&outputs) == *label as usize {
                correct += 1;
            }
        }

        let accuracy = correct as f64 * 100.0 / dataset.len() as f64;
        let line = format!(
            "{} / {} correct ({:.2}%)",
            correct,
            dataset.len(),
            accuracy
        );
        if accuracy >= 90.0 {
            println!("{}", line.green());
        } else {
            println!("{}", line.yellow());
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Classify {
    #[clap(short, long)]
    image: PathBuf,
    model_path: PathBuf,
}

impl Classify {
    fn exec(self) -> Result<()> {
        let mut net = NeuralNetwork::load_from_file(&self.model_path)?;
        let input = load_image_grayscale(&self.image)?;

        net.predict(&input)?;
        let class = net.probable_class()?;
        println!("predicted: {}", class.to_string().bold());
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Inspect {
    model_path: PathBuf,
}

impl Inspect {
    fn exec(self) -> Result<()> {
        let net = NeuralNetwork::load_from_file(&self.model_path)?;
        net.inspect(&mut std::io::stdout())
    }
}

#[derive(Parser)]
enum SubCommand {
    TrainXor(TrainXor),
    TrainMnist(TrainMnist),
    TestMnist(TestMnist),
    Classify(Classify),
    Inspect(Inspect),
}

fn main() {
    let result = match SubCommand::parse() {
        SubCommand::TrainXor(cmd) => cmd.exec(),
        SubCommand::TrainMnist(cmd) => cmd.exec(),
        SubCommand::TestMnist(cmd) => cmd.exec(),
        SubCommand::Classify(cmd) => cmd.exec(),
        SubCommand::Inspect(cmd) => cmd.exec(),
    };

    if let Err(e) = result {
        show_cursor();
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
