//! The training wrappers against hand-driven networks: a fit with the
//! same seed and hyper-parameters must walk the exact same trajectory
//! as driving the engine by hand.

use feedforward::{
    one_hot, Activation, Classifier, LearningRateSchedule, NeuralNetwork, Regressor,
    TrainOptions,
};

const XOR_INPUTS: [[f64; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
const XOR_TARGETS: [f64; 4] = [0.0, 1.0, 1.0, 0.0];

fn xor_inputs() -> Vec<Vec<f64>> {
    XOR_INPUTS.iter().map(|input| input.to_vec()).collect()
}

fn xor_options() -> TrainOptions {
    TrainOptions {
        hidden_layer_sizes: vec![5],
        activation: Activation::Logistic,
        learning_rate: LearningRateSchedule::Constant,
        learning_rate_init: 0.5,
        max_epochs: 10000,
        seed: Some(10),
        momentum: 0.9,
        early_stopping: false,
        ..TrainOptions::default()
    }
}

#[test]
fn regressor_fit_matches_a_hand_driven_network() {
    let mut net = NeuralNetwork::with_momentum(2, 0.5, 0.9, Some(10));
    net.add_hidden_layer(5, Activation::Logistic, 0.0).unwrap();
    net.add_output_regression_layer(1, Activation::Logistic, 0.0)
        .unwrap();

    for _ in 0..10000 {
        for (input, target) in XOR_INPUTS.iter().zip(&XOR_TARGETS) {
            net.propagate_forward(input, false).unwrap();
            net.propagate_backward_and_update_weights(&[*target])
                .unwrap();
        }
    }

    let mut regressor = Regressor::new(xor_options());
    regressor.fit(&xor_inputs(), &XOR_TARGETS).unwrap();

    for input in &XOR_INPUTS {
        let by_hand = net.predict(input).unwrap()[0];
        assert_eq!(by_hand, regressor.predict(input).unwrap());
    }
}

#[test]
fn batched_fit_defers_the_update_to_the_batch_boundary() {
    let mut net = NeuralNetwork::with_momentum(2, 0.5, 0.9, Some(10));
    net.add_hidden_layer(5, Activation::Logistic, 0.0).unwrap();
    net.add_output_regression_layer(1, Activation::Logistic, 0.0)
        .unwrap();

    // One update per epoch over the whole set, by hand.
    for _ in 0..100 {
        for (input, target) in XOR_INPUTS.iter().zip(&XOR_TARGETS) {
            net.propagate_forward(input, false).unwrap();
            net.propagate_backward(&[*target]).unwrap();
        }
        net.update_weights();
    }

    let mut regressor = Regressor::new(TrainOptions {
        batch_size: Some(4),
        max_epochs: 100,
        ..xor_options()
    });
    regressor.fit(&xor_inputs(), &XOR_TARGETS).unwrap();

    for input in &XOR_INPUTS {
        let by_hand = net.predict(input).unwrap()[0];
        assert_eq!(by_hand, regressor.predict(input).unwrap());
    }
}

#[test]
fn classifier_fit_matches_a_hand_driven_network() {
    let labels: [u8; 4] = [0, 1, 1, 0];

    let mut net = NeuralNetwork::with_momentum(2, 0.1, 0.0, Some(10));
    net.add_hidden_layer(3, Activation::Logistic, 0.0).unwrap();
    net.add_hidden_layer(3, Activation::Logistic, 0.0).unwrap();
    net.add_output_classification_layer(2, 0.0).unwrap();

    for _ in 0..100 {
        for (input, label) in XOR_INPUTS.iter().zip(&labels) {
            net.propagate_forward(input, false).unwrap();
            net.propagate_backward_and_update_weights(&one_hot(*label, 0, 1))
                .unwrap();
        }
    }

    let mut classifier = Classifier::new(TrainOptions {
        hidden_layer_sizes: vec![3, 3],
        activation: Activation::Logistic,
        learning_rate_init: 0.1,
        momentum: 0.0,
        max_epochs: 100,
        seed: Some(10),
        ..TrainOptions::default()
    });
    classifier.fit(&xor_inputs(), &labels).unwrap();

    for input in &XOR_INPUTS {
        net.predict(input).unwrap();
        let by_hand = net.probable_class().unwrap();
        assert_eq!(by_hand as u8, classifier.predict(input).unwrap());
    }
}

#[test]
fn early_stopping_cuts_the_run_short() {
    let mut regressor = Regressor::new(TrainOptions {
        tol: 1e-4,
        early_stopping: true,
        n_iter_no_change: 10,
        ..xor_options()
    });
    let report = regressor.fit(&xor_inputs(), &XOR_TARGETS).unwrap();

    assert!(report.epochs_run < 10000);
}

#[test]
fn inv_scaling_decays_the_learning_rate() {
    let mut regressor = Regressor::new(TrainOptions {
        learning_rate: LearningRateSchedule::InvScaling,
        power_t: 0.5,
        max_epochs: 100,
        ..xor_options()
    });
    let report = regressor.fit(&xor_inputs(), &XOR_TARGETS).unwrap();

    assert_eq!(report.epochs_run, 100);
    assert_eq!(report.final_learning_rate, 0.5 / (100.0f64).powf(0.5));
    assert_eq!(
        report.final_learning_rate,
        regressor.network().unwrap().learning_rate()
    );
}

#[test]
fn adaptive_schedule_divides_the_rate_on_stall() {
    // A constant target converges immediately, so the error stalls and
    // the adaptive schedule has to cut the rate.
    let inputs = vec![vec![0.0], vec![1.0]];
    let targets = [0.5, 0.5];

    let mut regressor = Regressor::new(TrainOptions {
        hidden_layer_sizes: vec![3],
        activation: Activation::Logistic,
        learning_rate: LearningRateSchedule::Adaptive,
        learning_rate_init: 0.5,
        max_epochs: 200,
        seed: Some(10),
        momentum: 0.0,
        tol: 1e-4,
        ..TrainOptions::default()
    });
    let report = regressor.fit(&inputs, &targets).unwrap();

    assert!(report.final_learning_rate < 0.5);
    assert_eq!(report.epochs_run, 200);
}
