//! Forest storage: nodes, complete-binary-tree arrays and the ensemble.

mod forest;
mod node;
mod tree;

pub use forest::Forest;
pub use node::Node;
pub use tree::Tree;

pub(crate) use tree::{last_level_start as tree_last_level_start, slots_for_depth as tree_slots};
