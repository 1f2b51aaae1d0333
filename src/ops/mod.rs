//! Pattern operators
//!
//! Every operator implements two capabilities against a `State`:
//! - `check`: inspect a node, bind variables, report whether the shape fits
//! - `construct`: build a node back from the bindings
//!
//! The same operator value is used on both sides of a rule, so any pattern
//! that can match a tree can also rebuild it. A shape mismatch is `Ok(false)`;
//! only genuinely inconsistent input produces an `Err`.

pub mod array;
pub mod base;
pub mod object;

pub use array::{AppendPattern, ArrayPattern, append, arr, one};
pub use base::{
    ValueFn, and, any, any_val, each, if_, int, is, lookup, lookup_op_var, lookup_var,
    not_empty, opt, quote, string, string_conv, value_conv, var,
};
pub use object::{Field, ObjectPattern, fields, join_obj, obj, part, post, pre, typed_obj};

use crate::node::{Kinds, Node, Value};
use crate::state::State;
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// A bidirectional pattern operator.
pub trait Op: fmt::Debug + Send + Sync {
    /// Kinds of nodes this operator can possibly match
    fn kinds(&self) -> Kinds {
        Kinds::ANY
    }

    /// Match `n`, binding variables into `st`.
    fn check(&self, st: &mut State, n: &Node) -> Result<bool>;

    /// Build a node from the bindings in `st`.
    ///
    /// `n` is the node built so far by an enclosing conjunction; most
    /// operators require it to be nil.
    fn construct(&self, st: &mut State, n: Node) -> Result<Node>;

    /// The object matcher behind this operator, if it is one
    fn as_object(&self) -> Option<&ObjectPattern> {
        None
    }

    /// The literal this operator pins a node to, if any
    fn literal(&self) -> Option<&Value> {
        None
    }
}

/// Shared handle to an operator
pub type OpRef = Arc<dyn Op>;

/// Conversion into a shared operator handle.
pub trait IntoOp {
    fn into_op(self) -> OpRef;
}

impl IntoOp for OpRef {
    fn into_op(self) -> OpRef {
        self
    }
}

/// Operators run at construction time receive no prior value.
pub(crate) fn no_node(n: &Node) -> Result<()> {
    if n.is_nil() {
        Ok(())
    } else {
        Err(Error::UnexpectedNode(n.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Mapping;
    use crate::transformer::Transformer;
    use crate::{arr_node, obj_node};

    fn arr_obj(key: &str, v: Node) -> Node {
        arr_node![Node::Object([(key, v)].into_iter().collect())]
    }

    // Forward rewrite must produce `exp` without touching the input, and the
    // reversed mapping must restore the input exactly.
    fn assert_roundtrip(src: OpRef, dst: OpRef, inp: Node, exp: Node) {
        let m = Mapping::new("test", src, dst);
        let snapshot = inp.deep_clone();
        let out = m.transform(&inp).unwrap();
        assert_eq!(out, exp);
        assert_eq!(inp, snapshot, "input must not be modified");

        let back = m.reverse().transform(&out).unwrap();
        assert_eq!(back, inp);
    }

    #[test]
    fn test_is() {
        assert_roundtrip(is(1), is(2), arr_obj("v", Node::Int(1)), arr_obj("v", Node::Int(2)));
    }

    #[test]
    fn test_var_all() {
        let inp = arr_obj("v", Node::Int(1));
        assert_roundtrip(var("n"), var("n"), inp.clone(), inp);
    }

    #[test]
    fn test_obj_has() {
        assert_roundtrip(
            obj([("v", is(1))]).into_op(),
            obj([("v2", is(2))]).into_op(),
            arr_obj("v", Node::Int(1)),
            arr_obj("v2", Node::Int(2)),
        );
    }

    #[test]
    fn test_has_nil() {
        assert_roundtrip(
            obj([("v", is(Value::Nil))]).into_op(),
            obj([("v2", is(2))]).into_op(),
            arr_obj("v", Node::Nil),
            arr_obj("v2", Node::Int(2)),
        );
    }

    #[test]
    fn test_obj_save() {
        assert_roundtrip(
            obj([("v", var("x"))]).into_op(),
            obj([("v2", var("x"))]).into_op(),
            arr_obj("v", Node::Int(1)),
            arr_obj("v2", Node::Int(1)),
        );
    }

    #[test]
    fn test_arr_save() {
        assert_roundtrip(
            one(obj([("v", var("x"))])).into_op(),
            one(obj([("v2", var("x"))])).into_op(),
            arr_obj("v", Node::Int(1)),
            arr_obj("v2", Node::Int(1)),
        );
    }

    #[test]
    fn test_lookup_save() {
        let table = lookup_var("x", [(Value::Int(1), Value::from("A"))]).unwrap();
        assert_roundtrip(
            obj([("v", table)]).into_op(),
            obj([("v2", var("x"))]).into_op(),
            arr_obj("v", Node::Int(1)),
            arr_obj("v2", Node::from("A")),
        );
    }

    #[test]
    fn test_no_var() {
        let m = Mapping::new("test", obj([("v", is(1))]), obj([("v2", var("x"))]));
        let err = m.transform(&arr_obj("v", Node::Int(1))).unwrap_err();
        assert!(matches!(err.errors()[0].root(), Error::VariableNotDefined(_)));
    }

    #[test]
    fn test_var_redeclared() {
        let m = Mapping::new(
            "test",
            obj([("v1", var("x")), ("v2", var("x"))]),
            obj([("v3", var("x")), ("v4", var("x"))]),
        );
        let inp = arr_node![obj_node! { "v1" => 1, "v2" => 2 }];
        let err = m.transform(&inp).unwrap_err();
        assert!(matches!(err.errors()[0].root(), Error::VariableRedeclared { .. }));
    }

    #[test]
    fn test_var_val_twice() {
        let m = Mapping::new(
            "test",
            obj([("v1", var("x")), ("v2", var("x"))]),
            obj([("v3", var("x"))]),
        );
        let inp = arr_node![obj_node! { "v1" => 1, "v2" => 1 }];
        assert_eq!(m.transform(&inp).unwrap(), arr_obj("v3", Node::Int(1)));
    }

    #[test]
    fn test_no_node_precondition() {
        let mut st = State::new();
        st.set_var("x", Node::Int(1)).unwrap();
        let err = var("x").construct(&mut st, Node::Int(5)).unwrap_err();
        assert!(matches!(err, Error::UnexpectedNode(_)));
    }
}
