//! Model persistence in a line-oriented text format.
//!
//! The format is intentionally plain text: diffable, language-neutral and
//! easy to inspect. A file holds a feature-definition header, the forest
//! topology, a model-specific header and one block of node lines per tree:
//!
//! ```text
//! # <feature-header>
//! <feature-string>
//!
//! # Trees Levels Split_Dists
//! <T> <D> <0|1>
//! # <model-specific header description>
//! <model-specific header payload>
//!
//! <per-tree blocks, one blank line between trees>
//! ```
//!
//! Within a block, nodes appear in level order. A leaf line is
//! `1 <posterior>`; a split line is `0 <p1> .. <pP> <thresh>` with the
//! posterior appended when split-node distributions were fitted. Orphan
//! slots (descendants of leaves) are elided entirely; the reader
//! reconstructs which slots they are from the leaf flags above them.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::distribution::NodeDistribution;
use crate::model::ForestModel;
use crate::repr::{tree_last_level_start, tree_slots, Forest, Tree};

// =============================================================================
// PersistError
// =============================================================================

/// Errors raised while writing or reading a persisted forest.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The file deviates from the expected format.
    #[error("parse failure at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// More trees requested than the file stores.
    #[error("requested {requested} trees but the file stores {available}")]
    TreesExceedFile { requested: usize, available: usize },

    /// A deeper truncation requested than the file stores.
    #[error("requested depth {requested} exceeds the stored depth {available}")]
    DepthExceedsFile { requested: u32, available: u32 },

    /// Depth truncation needs posteriors at split nodes, which this file
    /// does not carry.
    #[error("depth truncation requires a model stored with split-node distributions")]
    DepthTruncationUnavailable,

    /// The forest was never trained or loaded.
    #[error("cannot persist an invalid forest")]
    InvalidForest,
}

// =============================================================================
// LoadOptions
// =============================================================================

/// Optional ensemble truncation applied while loading.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Keep only the first `trees_used` trees of the stored ensemble.
    pub trees_used: Option<usize>,
    /// Cap the tree depth; split nodes at the new leaf frontier are
    /// re-interpreted as leaves using their stored posterior. Requires
    /// the file to have been written with `fit_split_nodes`.
    pub max_depth_used: Option<u32>,
}

// =============================================================================
// Writing
// =============================================================================

impl<M: ForestModel, const P: usize> Forest<M, P> {
    /// Serialize the forest to its text format.
    ///
    /// # Errors
    ///
    /// Fails with [`PersistError::InvalidForest`] when the forest was
    /// never trained or loaded.
    pub fn write_text(&self) -> Result<String, PersistError> {
        use std::fmt::Write;

        if !self.valid {
            return Err(PersistError::InvalidForest);
        }

        let mut out = String::new();
        let infallible = "writing to a String cannot fail";

        writeln!(out, "# {}", self.feature_header).expect(infallible);
        writeln!(out, "{}", self.feature_string).expect(infallible);
        writeln!(out).expect(infallible);

        writeln!(out, "# Trees Levels Split_Dists").expect(infallible);
        writeln!(
            out,
            "{} {} {}",
            self.trees.len(),
            self.n_levels,
            self.fit_split_nodes as u8
        )
        .expect(infallible);
        writeln!(out, "# {}", self.model.header_description()).expect(infallible);
        self.model.write_header(&mut out);
        writeln!(out).expect(infallible);
        writeln!(out).expect(infallible);

        for (t, tree) in self.trees.iter().enumerate() {
            if t > 0 {
                writeln!(out).expect(infallible);
            }
            write_tree_block(&mut out, tree, self.fit_split_nodes);
        }
        Ok(out)
    }

    /// Write the forest to a file in the text format.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let text = self.write_text()?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Load a forest from a file, optionally truncating trees or depth.
    ///
    /// The returned forest is valid; every failure mode leaves no forest
    /// behind.
    pub fn read_from_file(
        path: impl AsRef<Path>,
        options: LoadOptions,
    ) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path)?;
        Self::read_text(&content, options)
    }

    /// Parse a forest from its text format.
    pub fn read_text(content: &str, options: LoadOptions) -> Result<Self, PersistError> {
        let mut cursor = LineCursor::new(content);

        // Feature definition: "# <header>" then the feature string line.
        let (line_no, header_line) = cursor.expect("feature header")?;
        let feature_header = strip_comment_marker(header_line)
            .ok_or_else(|| parse_error(line_no, "expected a '#'-prefixed feature header"))?
            .to_owned();
        let (_, feature_string) = cursor.expect("feature string")?;
        let feature_string = feature_string.to_owned();
        cursor.expect_blank()?;

        // Topology: banner then "<T> <D> <split_dists>".
        let (line_no, banner) = cursor.expect("topology banner")?;
        if strip_comment_marker(banner).is_none() {
            return Err(parse_error(line_no, "expected the '# Trees Levels Split_Dists' banner"));
        }
        let (line_no, counts) = cursor.expect("topology counts")?;
        let mut tokens = counts.split_whitespace();
        let n_trees_file: usize = parse_token(&mut tokens, line_no, "tree count")?;
        let n_levels_file: u32 = parse_token(&mut tokens, line_no, "level count")?;
        let split_dists_flag: u8 = parse_token(&mut tokens, line_no, "split-distribution flag")?;
        let fit_split_nodes = match split_dists_flag {
            0 => false,
            1 => true,
            other => {
                return Err(parse_error(
                    line_no,
                    format!("split-distribution flag must be 0 or 1, got {other}"),
                ))
            }
        };

        // Model header: description (ignored) then payload.
        let (line_no, description) = cursor.expect("model header description")?;
        if strip_comment_marker(description).is_none() {
            return Err(parse_error(line_no, "expected a '#'-prefixed model header description"));
        }
        let (line_no, payload) = cursor.expect("model header payload")?;
        let model = M::read_header(&mut payload.split_whitespace())
            .map_err(|e| parse_error(line_no, e.to_string()))?;
        cursor.expect_blank()?;

        // Truncation options against the stored topology.
        let n_trees = match options.trees_used {
            Some(requested) if requested > n_trees_file => {
                return Err(PersistError::TreesExceedFile {
                    requested,
                    available: n_trees_file,
                })
            }
            Some(requested) => requested,
            None => n_trees_file,
        };
        let n_levels = match options.max_depth_used {
            Some(requested) if requested > n_levels_file => {
                return Err(PersistError::DepthExceedsFile {
                    requested,
                    available: n_levels_file,
                })
            }
            Some(requested) => {
                if requested < n_levels_file && !fit_split_nodes {
                    return Err(PersistError::DepthTruncationUnavailable);
                }
                requested
            }
            None => n_levels_file,
        };

        let mut trees = Vec::with_capacity(n_trees);
        for t in 0..n_trees {
            if t > 0 {
                cursor.expect_blank()?;
            }
            let mut tree =
                read_tree_block::<M, P>(&mut cursor, &model, n_levels_file, fit_split_nodes)?;
            if n_levels < n_levels_file {
                truncate_tree_depth(&mut tree, n_levels, cursor.line_no)?;
            }
            trees.push(tree);
        }

        let mut forest = Forest::from_parts(model, trees, n_levels, fit_split_nodes);
        forest.feature_header = feature_header;
        forest.feature_string = feature_string;
        Ok(forest)
    }
}

fn write_tree_block<D: NodeDistribution, const P: usize>(
    out: &mut String,
    tree: &Tree<D, P>,
    fit_split_nodes: bool,
) {
    use std::fmt::Write;

    let n_nodes = tree.n_nodes();
    let mut orphan = vec![false; n_nodes];

    for n in 0..n_nodes {
        let mark_children = |orphan: &mut Vec<bool>| {
            let left = Tree::<D, P>::left_child(n);
            if left < n_nodes {
                orphan[left] = true;
                orphan[left + 1] = true;
            }
        };

        if orphan[n] {
            mark_children(&mut orphan);
            continue;
        }

        let node = tree.node(n);
        if node.is_leaf() {
            out.push('1');
            out.push(' ');
            node.posterior()
                .expect("leaf node carries a posterior")
                .write_text(out);
            mark_children(&mut orphan);
        } else {
            out.push('0');
            for p in node.params() {
                write!(out, " {p}").expect("writing to a String cannot fail");
            }
            write!(out, " {}", node.thresh()).expect("writing to a String cannot fail");
            if fit_split_nodes {
                out.push(' ');
                node.posterior()
                    .expect("split node carries a posterior when fit_split_nodes is set")
                    .write_text(out);
            }
        }
        out.push('\n');
    }
}

fn read_tree_block<M: ForestModel, const P: usize>(
    cursor: &mut LineCursor<'_>,
    model: &M,
    n_levels: u32,
    fit_split_nodes: bool,
) -> Result<Tree<M::NodeDist, P>, PersistError> {
    let n_nodes = tree_slots(n_levels);
    let mut tree: Tree<M::NodeDist, P> = Tree::with_node_slots(n_nodes);
    let mut orphan = vec![false; n_nodes];

    for n in 0..n_nodes {
        let mark_children = |orphan: &mut Vec<bool>| {
            let left = Tree::<M::NodeDist, P>::left_child(n);
            if left < n_nodes {
                orphan[left] = true;
                orphan[left + 1] = true;
            }
        };

        if orphan[n] {
            mark_children(&mut orphan);
            continue;
        }

        let (line_no, line) = cursor.expect("node record")?;
        let mut tokens = line.split_whitespace();
        let leaf_flag: u8 = parse_token(&mut tokens, line_no, "leaf flag")?;

        match leaf_flag {
            1 => {
                let mut post = model.node_dist();
                post.read_text(&mut tokens)
                    .map_err(|e| parse_error(line_no, e.to_string()))?;
                tree.node_mut(n).make_leaf(post);
                mark_children(&mut orphan);
            }
            0 => {
                let mut params = [0i32; P];
                for (p, slot) in params.iter_mut().enumerate() {
                    *slot = parse_token(&mut tokens, line_no, &format!("split parameter {p}"))?;
                }
                let thresh: f32 = parse_token(&mut tokens, line_no, "split threshold")?;
                tree.node_mut(n).make_split(params, thresh);
                if fit_split_nodes {
                    let mut post = model.node_dist();
                    post.read_text(&mut tokens)
                        .map_err(|e| parse_error(line_no, e.to_string()))?;
                    tree.node_mut(n).posterior = Some(post);
                }
            }
            other => {
                return Err(parse_error(
                    line_no,
                    format!("leaf flag must be 0 or 1, got {other}"),
                ))
            }
        }

        if tokens.next().is_some() {
            return Err(parse_error(line_no, "trailing tokens after node record"));
        }
    }

    Ok(tree)
}

/// Cut a fully parsed tree down to `depth`, turning split nodes on the new
/// leaf frontier into leaves backed by their stored posterior.
fn truncate_tree_depth<D: NodeDistribution, const P: usize>(
    tree: &mut Tree<D, P>,
    depth: u32,
    line_no: usize,
) -> Result<(), PersistError> {
    tree.truncate(tree_slots(depth));

    for n in tree_last_level_start(depth)..tree.n_nodes() {
        let node = tree.node_mut(n);
        if !node.is_leaf && node.posterior.is_some() {
            node.is_leaf = true;
        }
    }

    // A frontier slot that is reachable must now be a leaf with a posterior.
    let reachable = tree.reachable();
    for n in tree_last_level_start(depth)..tree.n_nodes() {
        if reachable[n] && tree.node(n).posterior().is_none() {
            return Err(parse_error(
                line_no,
                "stored tree lacks a posterior at the truncated leaf frontier",
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Line-based parsing helpers
// =============================================================================

struct LineCursor<'a> {
    lines: std::str::Lines<'a>,
    line_no: usize,
}

impl<'a> LineCursor<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            lines: content.lines(),
            line_no: 0,
        }
    }

    fn next_line(&mut self) -> Option<(usize, &'a str)> {
        self.lines.next().map(|line| {
            self.line_no += 1;
            (self.line_no, line)
        })
    }

    fn expect(&mut self, what: &str) -> Result<(usize, &'a str), PersistError> {
        let at_line = self.line_no + 1;
        self.next_line()
            .ok_or_else(|| parse_error(at_line, format!("unexpected end of file, expected {what}")))
    }

    fn expect_blank(&mut self) -> Result<(), PersistError> {
        let (line_no, line) = self.expect("a blank separator line")?;
        if line.trim().is_empty() {
            Ok(())
        } else {
            Err(parse_error(line_no, "expected a blank separator line"))
        }
    }
}

fn strip_comment_marker(line: &str) -> Option<&str> {
    line.strip_prefix('#').map(str::trim_start)
}

fn parse_error(line: usize, message: impl Into<String>) -> PersistError {
    PersistError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_token<T: std::str::FromStr>(
    tokens: &mut dyn Iterator<Item = &str>,
    line_no: usize,
    what: &str,
) -> Result<T, PersistError> {
    let token = tokens
        .next()
        .ok_or_else(|| parse_error(line_no, format!("missing {what}")))?;
    token
        .parse::<T>()
        .map_err(|_| parse_error(line_no, format!("invalid {what}: {token:?}")))
}
