//! Array matchers: fixed-arity arrays and arrays with a fixed tail.

use super::{IntoOp, Op, OpRef, no_node};
use crate::node::{Kinds, Node};
use crate::state::State;
use crate::{Error, Result};
use std::sync::Arc;

/// Matches an array of exactly `ops.len()` elements, element by element.
#[derive(Debug, Clone, Default)]
pub struct ArrayPattern {
    ops: Vec<OpRef>,
}

impl ArrayPattern {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Append the elements of `other` to this pattern.
    pub fn concat(mut self, other: ArrayPattern) -> Self {
        self.ops.extend(other.ops);
        self
    }

    fn check_slice(&self, st: &mut State, items: &[Node]) -> Result<bool> {
        if items.len() != self.ops.len() {
            return Ok(false);
        }
        for (i, (op, el)) in self.ops.iter().zip(items).enumerate() {
            if !op.check(st, el).map_err(|e| Error::elem(i, e))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn construct_into(&self, st: &mut State, out: &mut Vec<Node>) -> Result<()> {
        for (i, op) in self.ops.iter().enumerate() {
            out.push(op.construct(st, Node::Nil).map_err(|e| Error::elem(i, e))?);
        }
        Ok(())
    }
}

impl Op for ArrayPattern {
    fn kinds(&self) -> Kinds {
        Kinds::ARRAY
    }

    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        match n {
            Node::Array(arr) => self.check_slice(st, arr.as_slice()),
            _ => Ok(false),
        }
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        no_node(&n)?;
        let mut out = Vec::with_capacity(self.ops.len());
        self.construct_into(st, &mut out)?;
        Ok(Node::from(out))
    }
}

impl IntoOp for ArrayPattern {
    fn into_op(self) -> OpRef {
        Arc::new(self)
    }
}

/// Array pattern with one operator per element.
pub fn arr(ops: Vec<OpRef>) -> ArrayPattern {
    ArrayPattern { ops }
}

/// Array of exactly one element.
pub fn one(op: impl IntoOp) -> ArrayPattern {
    arr(vec![op.into_op()])
}

/// Matches an array that ends with the fixed groups in `tails`; the
/// remaining prefix is handed to `head`.
///
/// An array shorter than the tails does not match. When the prefix is empty
/// `head` sees an empty array.
#[derive(Debug)]
pub struct AppendPattern {
    head: OpRef,
    tails: Vec<ArrayPattern>,
}

impl AppendPattern {
    fn tail_len(&self) -> usize {
        self.tails.iter().map(ArrayPattern::len).sum()
    }
}

impl Op for AppendPattern {
    fn kinds(&self) -> Kinds {
        Kinds::ARRAY
    }

    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        let Node::Array(arr) = n else {
            return Ok(false);
        };
        let items = arr.as_slice();
        let tail = self.tail_len();
        if tail > items.len() {
            return Ok(false);
        }

        // tail groups are matched from the end of the array
        let split = items.len() - tail;
        let mut end = items.len();
        for (i, sub) in self.tails.iter().enumerate().rev() {
            let start = end - sub.len();
            if !sub
                .check_slice(st, &items[start..end])
                .map_err(|e| Error::elem(i, e))?
            {
                return Ok(false);
            }
            end = start;
        }

        let prefix = Node::from(items[..split].to_vec());
        self.head
            .check(st, &prefix)
            .map_err(|e| Error::Append { source: Box::new(e) })
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        let head = self
            .head
            .construct(st, n)
            .map_err(|e| Error::Append { source: Box::new(e) })?;
        let mut out = match head {
            Node::Nil => Vec::new(),
            Node::Array(a) => a.as_slice().to_vec(),
            other => {
                return Err(Error::Append {
                    source: Box::new(Error::ExpectedList(other.kind())),
                });
            }
        };
        out.reserve(self.tail_len());
        for (i, sub) in self.tails.iter().enumerate() {
            sub.construct_into(st, &mut out).map_err(|e| Error::elem(i, e))?;
        }
        Ok(Node::from(out))
    }
}

impl IntoOp for AppendPattern {
    fn into_op(self) -> OpRef {
        Arc::new(self)
    }
}

/// Split an array into a prefix checked by `head` and fixed tail groups.
/// With no tails this is just `head`.
pub fn append(head: impl IntoOp, tails: Vec<ArrayPattern>) -> OpRef {
    let head = head.into_op();
    if tails.is_empty() {
        return head;
    }
    AppendPattern { head, tails }.into_op()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{each, is, var};
    use crate::arr_node;

    fn check(op: &OpRef, n: &Node) -> (Result<bool>, State) {
        let mut st = State::new();
        let res = op.check(&mut st, n);
        (res, st)
    }

    #[test]
    fn test_arr_requires_exact_length() {
        let op = arr(vec![var("a"), var("b")]).into_op();
        assert!(check(&op, &arr_node![1, 2]).0.unwrap());
        assert!(!check(&op, &arr_node![1]).0.unwrap());
        assert!(!check(&op, &arr_node![1, 2, 3]).0.unwrap());
        assert!(!check(&op, &Node::Nil).0.unwrap());
    }

    #[test]
    fn test_arr_construct() {
        let op = arr(vec![var("a"), is("x")]).into_op();
        let (res, mut st) = check(&op, &arr_node![7, "x"]);
        assert!(res.unwrap());
        assert_eq!(op.construct(&mut st, Node::Nil).unwrap(), arr_node![7, "x"]);
    }

    #[test]
    fn test_append_splits_prefix_and_tail() {
        let op = append(
            each("items", var("x")),
            vec![one(var("last")), arr(vec![is(0)])],
        );
        let inp = arr_node![1, 2, 3, 0];
        let (res, mut st) = check(&op, &inp);
        assert!(res.unwrap());
        assert_eq!(st.get_var("last"), Some(&Node::Int(3)));
        assert_eq!(
            st.get_state_var("items").and_then(|s| s.as_ref()).map(Vec::len),
            Some(2)
        );
        assert_eq!(op.construct(&mut st, Node::Nil).unwrap(), inp);
    }

    #[test]
    fn test_append_too_short_is_no_match() {
        let op = append(each("items", var("x")), vec![arr(vec![var("a"), var("b")])]);
        let (res, _) = check(&op, &arr_node![1]);
        assert!(!res.unwrap());
    }

    #[test]
    fn test_append_empty_prefix() {
        let op = append(var("head"), vec![one(is(1))]);
        let (res, mut st) = check(&op, &arr_node![1]);
        assert!(res.unwrap());
        assert_eq!(st.get_var("head"), Some(&arr_node![]));
        assert_eq!(op.construct(&mut st, Node::Nil).unwrap(), arr_node![1]);
    }

    #[test]
    fn test_append_head_must_build_list() {
        let op = append(is("x"), vec![one(is(1))]);
        let mut st = State::new();
        let err = op.construct(&mut st, Node::Nil).unwrap_err();
        assert!(matches!(err.root(), Error::ExpectedList(_)));
    }

    #[test]
    fn test_concat() {
        let pat = one(is(1)).concat(one(is(2)));
        assert_eq!(pat.len(), 2);
        assert!(check(&pat.into_op(), &arr_node![1, 2]).0.unwrap());
    }
}
