//! Forest inference: distribution prediction and probability evaluation.
//!
//! Two traversal shapes are offered for every operation:
//!
//! - *Groupwise*: ids descend a tree together; the feature functor is
//!   called once per internal node on whatever ids currently sit there.
//!   Trees are routed in parallel, the final per-id aggregation is
//!   sequential.
//! - *Single* (pointwise): each id walks every tree on its own with one
//!   feature call per internal node; ids are processed in parallel.
//!
//! Both shapes visit the same leaves and therefore agree on every output
//! up to float summation order.
//!
//! The forest is immutable during inference; leaf distributions are
//! handed out by reference and aggregated into caller-provided output
//! distributions.

use rayon::prelude::*;

use crate::distribution::{NodeDistribution, OutputDistribution};
use crate::features::{GroupwiseFeatures, PointwiseFeatures};
use crate::model::ForestModel;
use crate::repr::{Forest, Tree};
use crate::utils::Parallelism;

impl<M: ForestModel, const P: usize> Forest<M, P> {
    // =========================================================================
    // Distribution prediction
    // =========================================================================

    /// Predict a full output distribution per id using groupwise feature
    /// evaluation.
    ///
    /// `out[i]` receives the normalised aggregate of the leaf
    /// distributions that `ids[i]` reaches across all trees. The caller
    /// shapes the output distributions (e.g. class count) beforehand.
    ///
    /// # Panics
    ///
    /// Panics if the forest is invalid or `out.len() != ids.len()`.
    pub fn predict_dist_groupwise<I, F, O>(
        &self,
        ids: &[I],
        features: &F,
        out: &mut [O],
        parallelism: Parallelism,
    ) where
        I: Clone + Sync,
        F: GroupwiseFeatures<I, P>,
        O: OutputDistribution<M::NodeDist> + Send,
    {
        self.check_queryable(ids.len(), out.len());

        let per_tree: Vec<Vec<&M::NodeDist>> = parallelism
            .maybe_par_map(0..self.trees.len(), |t| {
                self.find_leaves_groupwise(t, ids, features)
            });

        for (i, dist) in out.iter_mut().enumerate() {
            dist.reset();
            for leaves in &per_tree {
                dist.combine_with(leaves[i]);
            }
            dist.normalise();
        }
    }

    /// Predict a full output distribution per id using pointwise feature
    /// evaluation.
    ///
    /// Same result as [`predict_dist_groupwise`] (up to float summation
    /// order); preferable when feature evaluation has no shared per-call
    /// overhead or when ids arrive individually.
    ///
    /// [`predict_dist_groupwise`]: Forest::predict_dist_groupwise
    ///
    /// # Panics
    ///
    /// Panics if the forest is invalid or `out.len() != ids.len()`.
    pub fn predict_dist_single<I, F, O>(
        &self,
        ids: &[I],
        features: &F,
        out: &mut [O],
        parallelism: Parallelism,
    ) where
        I: Sync,
        F: PointwiseFeatures<I, P>,
        O: OutputDistribution<M::NodeDist> + Send,
    {
        self.check_queryable(ids.len(), out.len());

        let predict_one = |(i, dist): (usize, &mut O)| {
            dist.reset();
            for t in 0..self.trees.len() {
                dist.combine_with(self.find_leaf_single(t, &ids[i], features));
            }
            dist.normalise();
        };

        match parallelism {
            Parallelism::Parallel => out.par_iter_mut().enumerate().for_each(predict_one),
            Parallelism::Sequential => out.iter_mut().enumerate().for_each(predict_one),
        }
    }

    // =========================================================================
    // Probability evaluation
    // =========================================================================

    /// Evaluate the model probability of given labels, groupwise.
    ///
    /// Writes into `out[i]` the forest average
    /// `(1/T) * sum_t pdf(label_i, leaf_t(ids[i]))`. With `single_label`,
    /// `labels[0]` is shared by every id; otherwise `labels[i]` pairs with
    /// `ids[i]`.
    ///
    /// # Panics
    ///
    /// Panics if the forest is invalid or the slice lengths disagree.
    pub fn probability_groupwise<I, F>(
        &self,
        ids: &[I],
        labels: &[M::Label],
        single_label: bool,
        features: &F,
        out: &mut [f64],
        parallelism: Parallelism,
    ) where
        I: Clone + Sync,
        F: GroupwiseFeatures<I, P>,
    {
        self.probability_groupwise_with(
            ids,
            labels,
            single_label,
            features,
            |_, p| p,
            out,
            parallelism,
        );
    }

    /// [`probability_groupwise`](Forest::probability_groupwise) with a
    /// custom combiner folding the new probability into the existing
    /// output slot (e.g. `|acc, p| acc * p` to accumulate evidence).
    #[allow(clippy::too_many_arguments)]
    pub fn probability_groupwise_with<I, F, C>(
        &self,
        ids: &[I],
        labels: &[M::Label],
        single_label: bool,
        features: &F,
        combine: C,
        out: &mut [f64],
        parallelism: Parallelism,
    ) where
        I: Clone + Sync,
        F: GroupwiseFeatures<I, P>,
        C: Fn(f64, f64) -> f64,
    {
        self.check_queryable(ids.len(), out.len());
        check_labels(ids.len(), labels.len(), single_label);

        let per_tree: Vec<Vec<&M::NodeDist>> = parallelism
            .maybe_par_map(0..self.trees.len(), |t| {
                self.find_leaves_groupwise(t, ids, features)
            });

        let scale = 1.0 / self.trees.len() as f64;
        for (i, slot) in out.iter_mut().enumerate() {
            let label = if single_label { labels[0] } else { labels[i] };
            let mean: f64 = per_tree
                .iter()
                .map(|leaves| leaves[i].pdf(label) as f64)
                .sum::<f64>()
                * scale;
            *slot = combine(*slot, mean);
        }
    }

    /// Evaluate the model probability of given labels, pointwise.
    ///
    /// Same result as [`probability_groupwise`] (up to float summation
    /// order), with ids processed independently in parallel.
    ///
    /// [`probability_groupwise`]: Forest::probability_groupwise
    ///
    /// # Panics
    ///
    /// Panics if the forest is invalid or the slice lengths disagree.
    pub fn probability_single<I, F>(
        &self,
        ids: &[I],
        labels: &[M::Label],
        single_label: bool,
        features: &F,
        out: &mut [f64],
        parallelism: Parallelism,
    ) where
        I: Sync,
        F: PointwiseFeatures<I, P>,
    {
        self.probability_single_with(
            ids,
            labels,
            single_label,
            features,
            |_, p| p,
            out,
            parallelism,
        );
    }

    /// [`probability_single`](Forest::probability_single) with a custom
    /// combiner folding the new probability into the existing output slot.
    #[allow(clippy::too_many_arguments)]
    pub fn probability_single_with<I, F, C>(
        &self,
        ids: &[I],
        labels: &[M::Label],
        single_label: bool,
        features: &F,
        combine: C,
        out: &mut [f64],
        parallelism: Parallelism,
    ) where
        I: Sync,
        F: PointwiseFeatures<I, P>,
        C: Fn(f64, f64) -> f64 + Sync,
    {
        self.check_queryable(ids.len(), out.len());
        check_labels(ids.len(), labels.len(), single_label);

        let scale = 1.0 / self.trees.len() as f64;
        let evaluate_one = |(i, slot): (usize, &mut f64)| {
            let label = if single_label { labels[0] } else { labels[i] };
            let sum: f64 = (0..self.trees.len())
                .map(|t| self.find_leaf_single(t, &ids[i], features).pdf(label) as f64)
                .sum();
            *slot = combine(*slot, sum * scale);
        };

        match parallelism {
            Parallelism::Parallel => out.par_iter_mut().enumerate().for_each(evaluate_one),
            Parallelism::Sequential => out.iter_mut().enumerate().for_each(evaluate_one),
        }
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Route every id through one tree with groupwise feature calls,
    /// returning the leaf distribution reached per id (by position).
    fn find_leaves_groupwise<'f, I, F>(
        &'f self,
        tree_index: usize,
        ids: &[I],
        features: &F,
    ) -> Vec<&'f M::NodeDist>
    where
        I: Clone + Sync,
        F: GroupwiseFeatures<I, P>,
    {
        let tree = &self.trees[tree_index];
        let mut leaves: Vec<Option<&M::NodeDist>> = vec![None; ids.len()];

        // Positions (into `ids`) currently sitting at each node.
        let mut bags: Vec<Vec<u32>> = vec![Vec::new(); tree.n_nodes()];
        bags[0] = (0..ids.len() as u32).collect();

        let mut bag_ids: Vec<I> = Vec::new();
        let mut scores: Vec<f32> = Vec::new();

        for n in 0..tree.n_nodes() {
            let bag = std::mem::take(&mut bags[n]);
            if bag.is_empty() {
                continue;
            }

            let node = tree.node(n);
            if node.is_leaf() {
                let post = node.posterior().expect("leaf node carries a posterior");
                for &i in &bag {
                    leaves[i as usize] = Some(post);
                }
                continue;
            }

            bag_ids.clear();
            bag_ids.extend(bag.iter().map(|&i| ids[i as usize].clone()));
            scores.resize(bag.len(), 0.0);
            features.evaluate(&bag_ids, node.params(), &mut scores);

            let mut left = Vec::new();
            let mut right = Vec::new();
            for (&i, &score) in bag.iter().zip(scores.iter()) {
                if score < node.thresh() {
                    left.push(i);
                } else {
                    right.push(i);
                }
            }
            let left_slot = Tree::<M::NodeDist, P>::left_child(n);
            bags[left_slot] = left;
            bags[left_slot + 1] = right;
        }

        leaves
            .into_iter()
            .map(|leaf| leaf.expect("every id terminates at a leaf"))
            .collect()
    }

    /// Walk one id down one tree with pointwise feature calls.
    fn find_leaf_single<'f, I, F>(&'f self, tree_index: usize, id: &I, features: &F) -> &'f M::NodeDist
    where
        F: PointwiseFeatures<I, P>,
    {
        let tree = &self.trees[tree_index];
        let mut n = 0usize;
        loop {
            let node = tree.node(n);
            if node.is_leaf() {
                return node.posterior().expect("leaf node carries a posterior");
            }
            let score = features.evaluate(id, node.params());
            n = if score < node.thresh() {
                Tree::<M::NodeDist, P>::left_child(n)
            } else {
                Tree::<M::NodeDist, P>::right_child(n)
            };
        }
    }

    fn check_queryable(&self, n_ids: usize, n_out: usize) {
        assert!(
            self.valid,
            "inference requires a trained or loaded forest; check is_valid() after load/train"
        );
        assert_eq!(n_ids, n_out, "one output slot per id");
    }
}

fn check_labels(n_ids: usize, n_labels: usize, single_label: bool) {
    if single_label {
        assert!(n_labels >= 1, "single_label requires one label");
    } else {
        assert_eq!(n_ids, n_labels, "one label per id");
    }
}
