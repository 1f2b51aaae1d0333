//! Mapping - one reversible rewrite rule
//!
//! A mapping pairs a source pattern with a destination pattern. Applied to a
//! tree, it visits every node bottom-up, and wherever the source matches it
//! substitutes the node built by the destination from the same bindings.

use crate::node::{self, Kinds, Node};
use crate::ops::{IntoOp, OpRef};
use crate::path::NodePath;
use crate::state::State;
use crate::transformer::Transformer;
use crate::{Error, Result};

/// A named (source, destination) pattern pair.
#[derive(Debug, Clone)]
pub struct Mapping {
    name: String,
    src: OpRef,
    dst: OpRef,
}

impl Mapping {
    pub fn new(name: impl Into<String>, src: impl IntoOp, dst: impl IntoOp) -> Self {
        Self {
            name: name.into(),
            src: src.into_op(),
            dst: dst.into_op(),
        }
    }

    /// Name used in error messages and logs
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &OpRef {
        &self.src
    }

    pub fn destination(&self) -> &OpRef {
        &self.dst
    }

    /// The same rule with source and destination swapped.
    pub fn reverse(&self) -> Mapping {
        Mapping {
            name: self.name.clone(),
            src: self.dst.clone(),
            dst: self.src.clone(),
        }
    }

    /// Kinds of nodes the source pattern can match
    pub fn kinds(&self) -> Kinds {
        self.src.kinds()
    }

    /// Try this rule on a single node.
    ///
    /// `st` is cleared first and may be reused across calls. Returns the
    /// replacement node, or `None` if the source pattern does not match.
    pub fn apply_node(&self, st: &mut State, n: &Node) -> Result<Option<Node>> {
        st.reset();
        if !self.kinds().contains(n.kind()) {
            return Ok(None);
        }
        if !self.src.check(st, n)? {
            return Ok(None);
        }
        self.dst.construct(st, Node::Nil).map(Some)
    }

    /// Wrap an error with this rule's name and the node location.
    pub(crate) fn error_at(&self, path: &NodePath, err: Error) -> Error {
        Error::Mapping {
            name: self.name.clone(),
            path: path.clone(),
            source: Box::new(err),
        }
    }

    /// Rewrite a whole tree, making at most one substitution per node.
    ///
    /// Errors do not stop the pass: a node whose rewrite fails is kept as is
    /// and the error is returned alongside the result.
    pub fn rewrite(&self, root: &Node) -> (Node, Vec<Error>) {
        let mut errs = Vec::new();
        let mut st = State::new();
        let mut applied = 0usize;
        let out = node::apply(root, &mut |path, n| match self.apply_node(&mut st, n) {
            Ok(Some(nn)) => {
                tracing::trace!("mapping {} rewrote {}", self.name, path);
                applied += 1;
                Some(nn)
            }
            Ok(None) => None,
            Err(e) => {
                errs.push(self.error_at(path, e));
                None
            }
        });
        tracing::debug!(
            "mapping {}: {} substitution(s), {} error(s)",
            self.name,
            applied,
            errs.len()
        );
        (out.unwrap_or_else(|| root.clone()), errs)
    }
}

impl Transformer for Mapping {
    fn transform(&self, root: &Node) -> Result<Node> {
        let (out, errs) = self.rewrite(root);
        Error::collect(errs)?;
        Ok(out)
    }
}
