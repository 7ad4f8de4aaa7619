//! End-to-end training scenarios for the discrete classifier.

use std::num::NonZeroUsize;

use canopy::testing::gaussian_clusters;
use canopy::{
    Classifier, DiscreteDistribution, Forest, NodeDistribution, Parallelism, TrainConfig,
    UniformParameterSampler,
};
use rand::prelude::*;

const MEANS: [[f64; 2]; 3] = [[0.0, 0.0], [5.0, 5.0], [10.0, 0.0]];
const PER_CLASS: usize = 200;

fn separable_clusters(seed: u64) -> canopy::testing::GaussianClusters {
    gaussian_clusters(&MEANS, 0.5, PER_CLASS, seed)
}

fn argmax(dist: &DiscreteDistribution) -> usize {
    dist.probabilities()
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap()
}

fn fresh_dists(n: usize, n_classes: usize) -> Vec<DiscreteDistribution> {
    (0..n).map(|_| DiscreteDistribution::new(n_classes)).collect()
}

fn train_on(
    data: &[[f64; 2]],
    labels: &[usize],
    n_trees: usize,
    n_levels: u32,
    seed: u64,
) -> Forest<Classifier, 1> {
    let features = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
        for (slot, &id) in scores.iter_mut().zip(ids) {
            *slot = data[id][params[0] as usize] as f32;
        }
    };
    let sampler = UniformParameterSampler::<1>::new(1);
    let ids: Vec<usize> = (0..labels.len()).collect();

    let config = TrainConfig::builder()
        .num_param_combos(2)
        .seed(seed)
        .build()
        .unwrap();

    let mut forest = Forest::new(Classifier::new(3), n_trees, n_levels);
    assert!(!forest.is_valid());
    forest
        .train(&ids, labels, &features, &sampler, &config)
        .unwrap();
    assert!(forest.is_valid());
    forest
}

#[test]
fn separable_clusters_reach_high_training_accuracy() {
    let data = separable_clusters(11);
    let forest = train_on(&data.features, &data.labels, 128, 10, 42);

    let features = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
        for (slot, &id) in scores.iter_mut().zip(ids) {
            *slot = data.features[id][params[0] as usize] as f32;
        }
    };

    let ids: Vec<usize> = (0..data.labels.len()).collect();
    let mut dists = fresh_dists(ids.len(), 3);
    forest.predict_dist_groupwise(&ids, &features, &mut dists, Parallelism::Parallel);

    let correct = dists
        .iter()
        .zip(data.labels.iter())
        .filter(|(dist, &label)| argmax(dist) == label)
        .count();
    let accuracy = correct as f64 / ids.len() as f64;
    assert!(accuracy >= 0.98, "training accuracy {accuracy}");
}

#[test]
fn cluster_centers_predict_their_class_confidently() {
    let data = separable_clusters(12);
    let forest = train_on(&data.features, &data.labels, 128, 10, 43);

    // Query the three exact cluster centers.
    let centers: Vec<[f64; 2]> = MEANS.to_vec();
    let features = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
        for (slot, &id) in scores.iter_mut().zip(ids) {
            *slot = centers[id][params[0] as usize] as f32;
        }
    };

    let ids: Vec<usize> = vec![0, 1, 2];
    let mut dists = fresh_dists(3, 3);
    forest.predict_dist_groupwise(&ids, &features, &mut dists, Parallelism::Sequential);

    for (c, dist) in dists.iter().enumerate() {
        assert!(
            dist.pdf(c) >= 0.9,
            "class {c} center predicted with p = {}",
            dist.pdf(c)
        );
    }
}

#[test]
fn predicted_distributions_are_normalized() {
    let data = separable_clusters(13);
    let forest = train_on(&data.features, &data.labels, 32, 8, 44);

    let features = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
        for (slot, &id) in scores.iter_mut().zip(ids) {
            *slot = data.features[id][params[0] as usize] as f32;
        }
    };

    let ids: Vec<usize> = (0..data.labels.len()).collect();
    let mut dists = fresh_dists(ids.len(), 3);
    forest.predict_dist_groupwise(&ids, &features, &mut dists, Parallelism::Parallel);

    for dist in &dists {
        let sum: f32 = dist.probabilities().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "distribution sums to {sum}");
    }
}

#[test]
fn shuffled_labels_train_to_chance_level() {
    let data = separable_clusters(14);
    let mut labels = data.labels.clone();
    labels.shuffle(&mut StdRng::seed_from_u64(5));

    let mut forest = train_on(&data.features, &labels, 64, 8, 45);

    let features = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
        for (slot, &id) in scores.iter_mut().zip(ids) {
            *slot = data.features[id][params[0] as usize] as f32;
        }
    };

    let ids: Vec<usize> = (0..labels.len()).collect();
    let mut dists = fresh_dists(ids.len(), 3);
    forest.predict_dist_groupwise(&ids, &features, &mut dists, Parallelism::Parallel);

    let correct = dists
        .iter()
        .zip(labels.iter())
        .filter(|(dist, &label)| argmax(dist) == label)
        .count();
    let accuracy = correct as f64 / ids.len() as f64;
    assert!(
        (accuracy - 1.0 / 3.0).abs() <= 0.05,
        "chance-level accuracy expected, got {accuracy}"
    );

    // Softmax smoothing at high temperature pushes the posteriors to
    // (near) uniform.
    forest.raise_node_temperature(10.0);
    forest.predict_dist_groupwise(&ids, &features, &mut dists, Parallelism::Parallel);
    for dist in &dists {
        for c in 0..3 {
            assert!(
                (dist.pdf(c) - 1.0 / 3.0).abs() < 0.05,
                "posterior not near uniform: {:?}",
                dist.probabilities()
            );
        }
    }
}

#[test]
fn groupwise_and_pointwise_prediction_agree() {
    let data = separable_clusters(15);
    let forest = train_on(&data.features, &data.labels, 48, 8, 46);

    let groupwise = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
        for (slot, &id) in scores.iter_mut().zip(ids) {
            *slot = data.features[id][params[0] as usize] as f32;
        }
    };
    let pointwise = |id: &usize, params: &[i32; 1]| data.features[*id][params[0] as usize] as f32;

    let ids: Vec<usize> = (0..data.labels.len()).step_by(7).collect();
    let mut group_dists = fresh_dists(ids.len(), 3);
    let mut single_dists = fresh_dists(ids.len(), 3);

    forest.predict_dist_groupwise(&ids, &groupwise, &mut group_dists, Parallelism::Parallel);
    forest.predict_dist_single(&ids, &pointwise, &mut single_dists, Parallelism::Parallel);

    for (g, s) in group_dists.iter().zip(single_dists.iter()) {
        for c in 0..3 {
            assert!(
                (g.pdf(c) - s.pdf(c)).abs() < 1e-6,
                "groupwise {} vs pointwise {}",
                g.pdf(c),
                s.pdf(c)
            );
        }
    }
}

#[test]
fn probability_paths_agree_and_average_leaf_pdfs() {
    let data = separable_clusters(16);
    let forest = train_on(&data.features, &data.labels, 48, 8, 47);

    let groupwise = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
        for (slot, &id) in scores.iter_mut().zip(ids) {
            *slot = data.features[id][params[0] as usize] as f32;
        }
    };
    let pointwise = |id: &usize, params: &[i32; 1]| data.features[*id][params[0] as usize] as f32;

    let ids: Vec<usize> = (0..data.labels.len()).step_by(11).collect();
    let labels: Vec<usize> = ids.iter().map(|&id| data.labels[id]).collect();

    let mut group_probs = vec![0.0f64; ids.len()];
    let mut single_probs = vec![0.0f64; ids.len()];
    forest.probability_groupwise(
        &ids,
        &labels,
        false,
        &groupwise,
        &mut group_probs,
        Parallelism::Parallel,
    );
    forest.probability_single(
        &ids,
        &labels,
        false,
        &pointwise,
        &mut single_probs,
        Parallelism::Parallel,
    );

    for (g, s) in group_probs.iter().zip(single_probs.iter()) {
        assert!((g - s).abs() < 1e-6, "groupwise {g} vs pointwise {s}");
        assert!((0.0..=1.0).contains(g), "probability out of range: {g}");
    }

    // The true-label probability should be high on separable data.
    let mean: f64 = group_probs.iter().sum::<f64>() / group_probs.len() as f64;
    assert!(mean > 0.8, "mean true-label probability {mean}");
}

#[test]
fn probability_single_label_broadcasts_one_label() {
    let data = separable_clusters(17);
    let forest = train_on(&data.features, &data.labels, 16, 6, 48);

    let groupwise = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
        for (slot, &id) in scores.iter_mut().zip(ids) {
            *slot = data.features[id][params[0] as usize] as f32;
        }
    };

    let ids: Vec<usize> = (0..60).collect();
    let mut shared = vec![0.0f64; ids.len()];
    forest.probability_groupwise(
        &ids,
        &[1usize],
        true,
        &groupwise,
        &mut shared,
        Parallelism::Sequential,
    );

    let per_id_labels = vec![1usize; ids.len()];
    let mut per_id = vec![0.0f64; ids.len()];
    forest.probability_groupwise(
        &ids,
        &per_id_labels,
        false,
        &groupwise,
        &mut per_id,
        Parallelism::Sequential,
    );

    assert_eq!(shared, per_id);
}

#[test]
fn probability_combiner_folds_into_existing_output() {
    let data = separable_clusters(18);
    let forest = train_on(&data.features, &data.labels, 16, 6, 49);

    let groupwise = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
        for (slot, &id) in scores.iter_mut().zip(ids) {
            *slot = data.features[id][params[0] as usize] as f32;
        }
    };

    let ids: Vec<usize> = (0..30).collect();
    let labels: Vec<usize> = ids.iter().map(|&id| data.labels[id]).collect();

    let mut overwrite = vec![0.0f64; ids.len()];
    forest.probability_groupwise(
        &ids,
        &labels,
        false,
        &groupwise,
        &mut overwrite,
        Parallelism::Sequential,
    );

    let mut accumulated = vec![1.5f64; ids.len()];
    forest.probability_groupwise_with(
        &ids,
        &labels,
        false,
        &groupwise,
        |acc, p| acc + p,
        &mut accumulated,
        Parallelism::Sequential,
    );

    for (acc, p) in accumulated.iter().zip(overwrite.iter()) {
        assert!((acc - (1.5 + p)).abs() < 1e-12);
    }
}

#[test]
fn fixed_seed_single_thread_training_is_deterministic() {
    let data = separable_clusters(19);

    let train_once = || {
        let features = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
            for (slot, &id) in scores.iter_mut().zip(ids) {
                *slot = data.features[id][params[0] as usize] as f32;
            }
        };
        let sampler = UniformParameterSampler::<1>::new(1);
        let ids: Vec<usize> = (0..data.labels.len()).collect();

        let config = TrainConfig::builder()
            .num_param_combos(2)
            .seed(7)
            .n_threads(NonZeroUsize::new(1).unwrap())
            .build()
            .unwrap();

        let mut forest = Forest::new(Classifier::new(3), 8, 6);
        forest
            .train(&ids, &data.labels, &features, &sampler, &config)
            .unwrap();
        forest.write_text().unwrap()
    };

    assert_eq!(train_once(), train_once());
}

#[test]
fn invalid_bag_proportion_leaves_forest_invalid() {
    let data = separable_clusters(20);
    let features = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
        for (slot, &id) in scores.iter_mut().zip(ids) {
            *slot = data.features[id][params[0] as usize] as f32;
        }
    };
    let sampler = UniformParameterSampler::<1>::new(1);
    let ids: Vec<usize> = (0..data.labels.len()).collect();

    // Bypass the builder so the invalid value reaches train() itself.
    let mut config = TrainConfig::builder().num_param_combos(2).build().unwrap();
    config.bag_proportion = 1.5;

    let mut forest = Forest::new(Classifier::new(3), 4, 4);
    let result = forest.train(&ids, &data.labels, &features, &sampler, &config);
    assert!(result.is_err());
    assert!(!forest.is_valid());
}
