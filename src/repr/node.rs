//! Single tree node storage.

/// One node in a tree.
///
/// A node is either a *split* (feature parameters plus a score threshold)
/// or a *leaf* (a fitted posterior distribution). Split nodes may also
/// carry a posterior when the forest was trained with split-node
/// distributions, which is what makes depth truncation on load possible.
/// Slots whose ancestor became a leaf stay in their default state and are
/// never queried.
#[derive(Debug, Clone)]
pub struct Node<D, const P: usize> {
    pub(crate) params: [i32; P],
    pub(crate) thresh: f32,
    pub(crate) is_leaf: bool,
    pub(crate) posterior: Option<D>,
}

impl<D, const P: usize> Default for Node<D, P> {
    fn default() -> Self {
        Self {
            params: [0; P],
            thresh: 0.0,
            is_leaf: false,
            posterior: None,
        }
    }
}

impl<D, const P: usize> Node<D, P> {
    /// Whether this node is a leaf.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    /// Feature parameters of a split node.
    #[inline]
    pub fn params(&self) -> &[i32; P] {
        &self.params
    }

    /// Decision threshold of a split node.
    #[inline]
    pub fn thresh(&self) -> f32 {
        self.thresh
    }

    /// The fitted posterior, present on leaves and (optionally) on split
    /// nodes.
    #[inline]
    pub fn posterior(&self) -> Option<&D> {
        self.posterior.as_ref()
    }

    pub(crate) fn make_leaf(&mut self, posterior: D) {
        self.is_leaf = true;
        self.posterior = Some(posterior);
    }

    pub(crate) fn make_split(&mut self, params: [i32; P], thresh: f32) {
        self.params = params;
        self.thresh = thresh;
        self.is_leaf = false;
    }
}
