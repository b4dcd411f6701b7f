//! End-to-end training runs: XOR convergence from a fixed seed, full
//! determinism of seeded runs, and dropout behavior at the extremes.

use feedforward::{Activation, NeuralNetwork};

const XOR_SET: [([f64; 2], f64); 4] = [
    ([0.0, 0.0], 0.0),
    ([0.0, 1.0], 1.0),
    ([1.0, 0.0], 1.0),
    ([1.0, 1.0], 0.0),
];

#[test]
fn xor_converges_from_a_fixed_seed() {
    let mut net = NeuralNetwork::with_momentum(2, 0.5, 0.9, Some(10));
    net.add_hidden_layer(5, Activation::Logistic, 0.0).unwrap();
    net.add_output_regression_layer(1, Activation::Logistic, 0.0)
        .unwrap();

    for _ in 0..10000 {
        for (input, expected) in &XOR_SET {
            net.propagate_forward(input, false).unwrap();
            net.propagate_backward_and_update_weights(&[*expected])
                .unwrap();
        }
    }

    for (input, expected) in &XOR_SET {
        let output = net.predict(input).unwrap()[0];
        assert!(
            (output - expected).abs() < 0.2,
            "{input:?} -> {output}, expected {expected}"
        );
    }
}

#[test]
fn seeded_runs_are_fully_deterministic() {
    let run = || {
        let mut net = NeuralNetwork::with_momentum(2, 0.5, 0.9, Some(10));
        net.add_dropout_layer(0.3).unwrap();
        net.add_hidden_layer(5, Activation::Logistic, 0.0).unwrap();
        net.add_output_regression_layer(1, Activation::Logistic, 0.0)
            .unwrap();

        let mut outputs = Vec::new();
        for _ in 0..100 {
            for (input, expected) in &XOR_SET {
                outputs.extend(net.propagate_forward(input, false).unwrap());
                net.propagate_backward_and_update_weights(&[*expected])
                    .unwrap();
            }
        }
        (outputs, net.save_to_string().unwrap())
    };

    let (outputs_a, state_a) = run();
    let (outputs_b, state_b) = run();

    // Identical weight trajectories and identical outputs at every step.
    assert_eq!(outputs_a, outputs_b);
    assert_eq!(state_a, state_b);
}

#[test]
fn different_seeds_give_different_weights() {
    let initial_weights = |seed: u32| {
        let mut net = NeuralNetwork::with_momentum(2, 0.5, 0.0, Some(seed));
        net.add_hidden_layer(5, Activation::Logistic, 0.0).unwrap();
        net.add_output_regression_layer(1, Activation::Logistic, 0.0)
            .unwrap();
        net.save_to_string().unwrap()
    };

    assert_ne!(initial_weights(10), initial_weights(11));
}

#[test]
fn full_dropout_zeroes_the_intermediate_signal() {
    let build = |seed: u32| {
        let mut net = NeuralNetwork::with_momentum(2, 0.5, 0.0, Some(seed));
        net.add_dropout_layer(1.0).unwrap();
        net.add_hidden_layer_from_weights(
            vec![vec![0.15, 0.2], vec![0.25, 0.3]],
            Activation::Logistic,
            0.35,
        )
        .unwrap();
        net.add_output_regression_layer_from_weights(
            vec![vec![0.4, 0.45], vec![0.5, 0.55]],
            Activation::Logistic,
            0.6,
        )
        .unwrap();
        net
    };

    // With every input zeroed, the network output cannot depend on the
    // input vector at all.
    let mut net = build(18);
    let from_one_input = net.propagate_forward(&[0.05, 0.1], false).unwrap();
    let from_another = net.propagate_forward(&[0.9, -0.3], false).unwrap();
    assert_eq!(from_one_input, from_another);

    let layers = net.layers();
    assert!((0..2).all(|n| layers[0].dropped(n)));
}

#[test]
fn ignoring_dropout_reproduces_the_plain_forward_pass() {
    let mut with_dropout = NeuralNetwork::with_momentum(2, 0.5, 0.0, Some(18));
    with_dropout.add_dropout_layer(0.4).unwrap();
    with_dropout
        .add_hidden_layer_from_weights(
            vec![vec![0.15, 0.2], vec![0.25, 0.3]],
            Activation::Logistic,
            0.35,
        )
        .unwrap();
    with_dropout
        .add_output_regression_layer_from_weights(
            vec![vec![0.4, 0.45], vec![0.5, 0.55]],
            Activation::Logistic,
            0.6,
        )
        .unwrap();

    let mut plain = NeuralNetwork::new(2, 0.5);
    plain
        .add_hidden_layer_from_weights(
            vec![vec![0.15, 0.2], vec![0.25, 0.3]],
            Activation::Logistic,
            0.35,
        )
        .unwrap();
    plain
        .add_output_regression_layer_from_weights(
            vec![vec![0.4, 0.45], vec![0.5, 0.55]],
            Activation::Logistic,
            0.6,
        )
        .unwrap();

    let bypassed = with_dropout.propagate_forward(&[0.05, 0.1], true).unwrap();
    let reference = plain.propagate_forward(&[0.05, 0.1], false).unwrap();
    assert_eq!(bypassed, reference);
}
