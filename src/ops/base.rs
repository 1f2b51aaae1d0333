//! Base operators: literals, variables, wildcards, conjunction, lookup tables
//! and the small combinators built on top of them.

use super::{IntoOp, Op, OpRef, no_node};
use crate::node::{Kinds, Node, Value};
use crate::state::{State, SubStates};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Checks that the node is a scalar equal to a given value.
/// Construction produces that value.
pub fn is(v: impl Into<Value>) -> OpRef {
    Arc::new(Is { value: v.into() })
}

/// Shorthand for `is` with a string
pub fn string(s: &str) -> OpRef {
    is(s)
}

/// Shorthand for `is` with an integer
pub fn int(i: i64) -> OpRef {
    is(i)
}

#[derive(Debug)]
struct Is {
    value: Value,
}

impl Op for Is {
    fn kinds(&self) -> Kinds {
        Kinds::of(self.value.kind())
    }

    fn check(&self, _st: &mut State, n: &Node) -> Result<bool> {
        Ok(self.value.matches(n))
    }

    fn construct(&self, _st: &mut State, n: Node) -> Result<Node> {
        no_node(&n)?;
        Ok(Node::from(self.value.clone()))
    }

    fn literal(&self) -> Option<&Value> {
        Some(&self.value)
    }
}

/// Stores the current node in a named variable.
/// Construction replaces the node with the variable's value.
pub fn var(name: &str) -> OpRef {
    Arc::new(Var { name: name.to_string() })
}

#[derive(Debug)]
struct Var {
    name: String,
}

impl Op for Var {
    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        st.set_var(&self.name, n.clone())?;
        Ok(true)
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        no_node(&n)?;
        Ok(st.must_get_var(&self.name)?.clone())
    }
}

/// Matches any node and throws it away. Construction delegates to `create`.
pub fn any(create: impl IntoOp) -> OpRef {
    Arc::new(Any { create: create.into_op() })
}

/// Accepts any node and always constructs the given value.
pub fn any_val(v: impl Into<Value>) -> OpRef {
    any(is(v))
}

#[derive(Debug)]
struct Any {
    create: OpRef,
}

impl Op for Any {
    fn check(&self, _st: &mut State, _n: &Node) -> Result<bool> {
        Ok(true)
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        self.create.construct(st, n)
    }
}

/// Checks the node with every operator; all of them must match.
///
/// Construction feeds the result of each operator into the next one, so
/// operators that create the node's shape must come first.
pub fn and(mut ops: Vec<OpRef>) -> OpRef {
    if ops.len() == 1 {
        return ops.remove(0);
    }
    Arc::new(And { ops })
}

#[derive(Debug)]
struct And {
    ops: Vec<OpRef>,
}

impl Op for And {
    fn kinds(&self) -> Kinds {
        self.ops.iter().fold(Kinds::ANY, |k, op| k & op.kinds())
    }

    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        for (i, op) in self.ops.iter().enumerate() {
            if !op.check(st, n).map_err(|e| Error::op(i, e))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn construct(&self, st: &mut State, mut n: Node) -> Result<Node> {
        for (i, op) in self.ops.iter().enumerate() {
            n = op.construct(st, n).map_err(|e| Error::op(i, e))?;
        }
        Ok(n)
    }
}

/// Maps the current scalar through `table` and checks the result with `op`.
///
/// The reverse direction looks the constructed value up in the inverted
/// table, so the table must not map two keys to the same value.
pub fn lookup(op: impl IntoOp, table: impl IntoIterator<Item = (Value, Value)>) -> Result<OpRef> {
    let fwd: HashMap<Value, Value> = table.into_iter().collect();
    let mut rev = HashMap::with_capacity(fwd.len());
    for (k, v) in &fwd {
        if rev.insert(v.clone(), k.clone()).is_some() {
            return Err(Error::AmbiguousValue(v.to_string()));
        }
    }
    Ok(Arc::new(Lookup { op: op.into_op(), fwd, rev }))
}

/// Lookup whose result is stored in a variable
pub fn lookup_var(name: &str, table: impl IntoIterator<Item = (Value, Value)>) -> Result<OpRef> {
    lookup(var(name), table)
}

#[derive(Debug)]
struct Lookup {
    op: OpRef,
    fwd: HashMap<Value, Value>,
    rev: HashMap<Value, Value>,
}

impl Op for Lookup {
    fn kinds(&self) -> Kinds {
        Kinds::VALUES | Kinds::NIL
    }

    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        let v = n.as_value().ok_or(Error::ExpectedValue(n.kind()))?;
        let mapped = self
            .fwd
            .get(&v)
            .ok_or_else(|| Error::UnhandledValue(v.to_string()))?;
        self.op.check(st, &Node::from(mapped.clone()))
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        no_node(&n)?;
        let built = self.op.construct(st, Node::Nil)?;
        let v = built.as_value().ok_or(Error::ExpectedValue(built.kind()))?;
        let orig = self
            .rev
            .get(&v)
            .ok_or_else(|| Error::UnhandledValue(v.to_string()))?;
        Ok(Node::from(orig.clone()))
    }
}

/// A closed case analysis on a previously bound variable.
///
/// The variable's value selects which operator handles the current node.
/// A case keyed by `Value::Nil` is used as the default. The variable must be
/// bound before this operator runs; use `pre` to order object fields.
pub fn lookup_op_var(name: &str, cases: impl IntoIterator<Item = (Value, OpRef)>) -> OpRef {
    Arc::new(LookupOpVar {
        name: name.to_string(),
        cases: cases.into_iter().collect(),
    })
}

#[derive(Debug)]
struct LookupOpVar {
    name: String,
    cases: HashMap<Value, OpRef>,
}

impl LookupOpVar {
    fn select(&self, st: &State) -> Result<OpRef> {
        let vn = st.must_get_var(&self.name)?;
        let v = vn.as_value().ok_or(Error::ExpectedValue(vn.kind()))?;
        self.cases
            .get(&v)
            .or_else(|| self.cases.get(&Value::Nil))
            .cloned()
            .ok_or_else(|| Error::UnhandledValue(v.to_string()))
    }
}

impl Op for LookupOpVar {
    fn kinds(&self) -> Kinds {
        self.cases.values().fold(Kinds::NONE, |k, op| k | op.kinds())
    }

    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        let sub = self.select(st)?;
        sub.check(st, n)
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        let sub = self.select(st)?;
        sub.construct(st, n)
    }
}

/// Conversion function used by `value_conv`
pub type ValueFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Converts a scalar with `conv` before checking it with `op`; construction
/// applies `rev` to what `op` builds.
pub fn value_conv(op: impl IntoOp, conv: ValueFn, rev: ValueFn) -> OpRef {
    Arc::new(ValueConv { op: op.into_op(), conv, rev })
}

/// Like `value_conv`, but only accepts strings.
pub fn string_conv<C, R>(op: impl IntoOp, conv: C, rev: R) -> OpRef
where
    C: Fn(&str) -> Result<String> + Send + Sync + 'static,
    R: Fn(&str) -> Result<String> + Send + Sync + 'static,
{
    value_conv(op, on_strings(conv), on_strings(rev))
}

fn on_strings<F>(f: F) -> ValueFn
where
    F: Fn(&str) -> Result<String> + Send + Sync + 'static,
{
    Arc::new(move |v: &Value| match v {
        Value::String(s) => f(s).map(Value::String),
        other => Err(Error::UnexpectedType(other.kind().to_string())),
    })
}

/// Unquotes a double-quoted string literal on check and quotes it back on
/// construction.
pub fn quote(op: impl IntoOp) -> OpRef {
    string_conv(
        op,
        |s| {
            serde_json::from_str::<String>(s).map_err(|e| Error::Conversion(format!("unquote {}: {}", s, e)))
        },
        |s| serde_json::to_string(s).map_err(Error::from),
    )
}

struct ValueConv {
    op: OpRef,
    conv: ValueFn,
    rev: ValueFn,
}

impl fmt::Debug for ValueConv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueConv").field("op", &self.op).finish_non_exhaustive()
    }
}

impl Op for ValueConv {
    fn kinds(&self) -> Kinds {
        Kinds::VALUES | Kinds::NIL
    }

    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        let v = n.as_value().ok_or(Error::ExpectedValue(n.kind()))?;
        let nv = (self.conv)(&v)?;
        self.op.check(st, &Node::from(nv))
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        let built = self.op.construct(st, n)?;
        let v = built.as_value().ok_or(Error::ExpectedValue(built.kind()))?;
        Ok(Node::from((self.rev)(&v)?))
    }
}

/// Tries `then`, falling back to `els`; records which branch matched in the
/// bool variable `cond` so construction takes the same branch.
pub fn if_(cond: &str, then: impl IntoOp, els: impl IntoOp) -> OpRef {
    Arc::new(If {
        cond: cond.to_string(),
        then: then.into_op(),
        els: els.into_op(),
    })
}

#[derive(Debug)]
struct If {
    cond: String,
    then: OpRef,
    els: OpRef,
}

impl Op for If {
    fn kinds(&self) -> Kinds {
        self.then.kinds() | self.els.kinds()
    }

    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        let mut st1 = st.clone();
        let err1 = match self.then.check(&mut st1, n) {
            Ok(true) => {
                st.merge_from(st1);
                st.set_var(&self.cond, Node::Bool(true))?;
                return Ok(true);
            }
            Ok(false) => None,
            Err(e) => Some(e),
        };
        let mut st2 = st.clone();
        let err2 = match self.els.check(&mut st2, n) {
            Ok(true) => {
                st.merge_from(st2);
                st.set_var(&self.cond, Node::Bool(false))?;
                return Ok(true);
            }
            Ok(false) => None,
            Err(e) => Some(e),
        };
        match err1.or(err2) {
            Some(e) => Err(e),
            None => Ok(false),
        }
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        if bool_var(st, &self.cond)? {
            self.then.construct(st, n)
        } else {
            self.els.construct(st, n)
        }
    }
}

/// Read a flag recorded by `if_`, `opt` or an optional object field.
pub(crate) fn bool_var(st: &State, name: &str) -> Result<bool> {
    let vn = st.must_get_var(name)?;
    vn.as_value()
        .and_then(|v| v.as_bool())
        .ok_or_else(|| Error::UnexpectedType(vn.kind().to_string()))
}

/// An optional node: nil is accepted, and its existence is stored in the bool
/// variable `exists`.
pub fn opt(exists: &str, op: impl IntoOp) -> OpRef {
    Arc::new(Opt { exists: exists.to_string(), op: op.into_op() })
}

#[derive(Debug)]
struct Opt {
    exists: String,
    op: OpRef,
}

impl Op for Opt {
    fn kinds(&self) -> Kinds {
        self.op.kinds() | Kinds::NIL
    }

    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        st.set_var(&self.exists, Node::Bool(!n.is_nil()))?;
        if n.is_nil() {
            return Ok(true);
        }
        self.op.check(st, n)
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        if !bool_var(st, &self.exists)? {
            no_node(&n)?;
            return Ok(Node::Nil);
        }
        self.op.construct(st, n)
    }
}

/// Rejects nil, empty arrays and empty objects.
pub fn not_empty(op: impl IntoOp) -> OpRef {
    Arc::new(NotEmpty { op: op.into_op() })
}

fn is_empty_node(n: &Node) -> bool {
    match n {
        Node::Nil => true,
        Node::Array(a) => a.is_empty(),
        Node::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[derive(Debug)]
struct NotEmpty {
    op: OpRef,
}

impl Op for NotEmpty {
    fn kinds(&self) -> Kinds {
        self.op.kinds().without(Kinds::NIL)
    }

    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        if is_empty_node(n) {
            return Ok(false);
        }
        self.op.check(st, n)
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        let built = self.op.construct(st, n)?;
        if is_empty_node(&built) {
            return Err(Error::UnexpectedValue(built.to_string()));
        }
        Ok(built)
    }
}

/// Checks every element of an array with `op`, keeping a separate state per
/// element under the sub-state name `name`. Nil is treated as a missing array
/// and restored as nil.
pub fn each(name: &str, op: impl IntoOp) -> OpRef {
    Arc::new(Each { name: name.to_string(), op: op.into_op() })
}

#[derive(Debug)]
struct Each {
    name: String,
    op: OpRef,
}

impl Op for Each {
    fn kinds(&self) -> Kinds {
        Kinds::ARRAY | Kinds::NIL
    }

    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        let subs: SubStates = match n {
            Node::Nil => None,
            Node::Array(arr) => {
                let mut subs = Vec::with_capacity(arr.len());
                for (i, el) in arr.iter().enumerate() {
                    let mut sub = State::new();
                    if !self.op.check(&mut sub, el).map_err(|e| Error::elem(i, e))? {
                        return Ok(false);
                    }
                    subs.push(sub);
                }
                Some(subs)
            }
            _ => return Ok(false),
        };
        st.set_state_var(&self.name, subs)?;
        Ok(true)
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        no_node(&n)?;
        let subs = st
            .get_state_var(&self.name)
            .cloned()
            .ok_or_else(|| Error::VariableNotDefined(self.name.clone()))?;
        let Some(subs) = subs else {
            return Ok(Node::Nil);
        };
        let mut out = Vec::with_capacity(subs.len());
        for (i, mut sub) in subs.into_iter().enumerate() {
            out.push(self.op.construct(&mut sub, Node::Nil).map_err(|e| Error::elem(i, e))?);
        }
        Ok(Node::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Mapping;
    use crate::node::Kind;
    use crate::ops::{append, arr, obj};
    use crate::transformer::Transformer;
    use crate::{arr_node, obj_node};

    fn check(op: &OpRef, n: &Node) -> (Result<bool>, State) {
        let mut st = State::new();
        let res = op.check(&mut st, n);
        (res, st)
    }

    #[test]
    fn test_is_distinguishes_scalar_kinds() {
        let op = is(1);
        assert!(check(&op, &Node::Int(1)).0.unwrap());
        assert!(!check(&op, &Node::Uint(1)).0.unwrap());
        assert!(!check(&op, &Node::from("1")).0.unwrap());
        assert!(!check(&op, &obj_node! {}).0.unwrap());
        assert_eq!(op.kinds(), Kinds::INT);
    }

    #[test]
    fn test_any_constructs_fallback() {
        let op = any_val("default");
        assert!(check(&op, &obj_node! { "x" => 1 }).0.unwrap());
        let mut st = State::new();
        assert_eq!(op.construct(&mut st, Node::Nil).unwrap(), Node::from("default"));
    }

    #[test]
    fn test_and_orders_construction() {
        let op = and(vec![obj([("a", var("x"))]).into_op(), obj([("b", is(2))]).allow_unused(true).into_op()]);
        let mut st = State::new();
        st.set_var("x", Node::Int(1)).unwrap();
        let built = op.construct(&mut st, Node::Nil).unwrap();
        assert_eq!(built, obj_node! { "a" => 1, "b" => 2 });
    }

    #[test]
    fn test_and_requires_all() {
        let op = and(vec![var("x"), is(3)]);
        let (res, st) = check(&op, &Node::Int(3));
        assert!(res.unwrap());
        assert_eq!(st.get_var("x"), Some(&Node::Int(3)));
        assert!(!check(&op, &Node::Int(4)).0.unwrap());
    }

    #[test]
    fn test_lookup_rejects_ambiguous_table() {
        let err = lookup(var("x"), [(Value::Int(1), Value::from("a")), (Value::Int(2), Value::from("a"))])
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousValue(_)));
    }

    #[test]
    fn test_lookup_missing_key() {
        let op = lookup_var("x", [(Value::from("+"), Value::from("add"))]).unwrap();
        assert!(matches!(check(&op, &Node::from("-")).0, Err(Error::UnhandledValue(_))));
        assert!(matches!(check(&op, &obj_node! {}).0, Err(Error::ExpectedValue(Kind::Object))));

        let (res, st) = check(&op, &Node::from("+"));
        assert!(res.unwrap());
        assert_eq!(st.get_var("x"), Some(&Node::from("add")));
    }

    #[test]
    fn test_lookup_op_var_default_case() {
        let op = lookup_op_var(
            "kind",
            [(Value::from("int"), is(0)), (Value::Nil, var("rest"))],
        );
        let mut st = State::new();
        st.set_var("kind", Node::from("int")).unwrap();
        assert!(op.check(&mut st, &Node::Int(0)).unwrap());

        let mut st = State::new();
        st.set_var("kind", Node::from("str")).unwrap();
        assert!(op.check(&mut st, &Node::from("s")).unwrap());
        assert_eq!(st.get_var("rest"), Some(&Node::from("s")));

        let strict = lookup_op_var("kind", [(Value::from("int"), is(0))]);
        let mut st = State::new();
        st.set_var("kind", Node::from("str")).unwrap();
        assert!(matches!(strict.check(&mut st, &Node::Int(0)), Err(Error::UnhandledValue(_))));
    }

    #[test]
    fn test_quote_roundtrip() {
        let m = Mapping::new(
            "quote",
            obj([("lit", quote(var("s")))]),
            obj([("value", var("s"))]),
        );
        let inp = obj_node! { "lit" => "\"a\\nb\"" };
        let out = m.transform(&inp).unwrap();
        assert_eq!(out, obj_node! { "value" => "a\nb" });
        assert_eq!(m.reverse().transform(&out).unwrap(), inp);
    }

    #[test]
    fn test_if_records_branch() {
        let op = if_("is_num", is(1), var("other"));
        let (res, st) = check(&op, &Node::Int(1));
        assert!(res.unwrap());
        assert_eq!(st.get_var("is_num"), Some(&Node::Bool(true)));
        assert!(st.get_var("other").is_none());

        let (res, mut st) = check(&op, &Node::from("x"));
        assert!(res.unwrap());
        assert_eq!(st.get_var("is_num"), Some(&Node::Bool(false)));
        assert_eq!(op.construct(&mut st, Node::Nil).unwrap(), Node::from("x"));
    }

    #[test]
    fn test_opt() {
        let op = opt("has_x", var("x"));
        let (res, mut st) = check(&op, &Node::Nil);
        assert!(res.unwrap());
        assert_eq!(op.construct(&mut st, Node::Nil).unwrap(), Node::Nil);

        let (res, mut st) = check(&op, &Node::Int(7));
        assert!(res.unwrap());
        assert_eq!(op.construct(&mut st, Node::Nil).unwrap(), Node::Int(7));
    }

    #[test]
    fn test_not_empty() {
        let op = not_empty(var("x"));
        assert!(!check(&op, &Node::Nil).0.unwrap());
        assert!(!check(&op, &arr_node![]).0.unwrap());
        assert!(!check(&op, &obj_node! {}).0.unwrap());
        assert!(check(&op, &arr_node![1]).0.unwrap());

        let mut st = State::new();
        st.set_var("x", arr_node![]).unwrap();
        assert!(matches!(op.construct(&mut st, Node::Nil), Err(Error::UnexpectedValue(_))));
    }

    #[test]
    fn test_each_roundtrip() {
        let m = Mapping::new(
            "each",
            obj([("items", each("items", obj([("v", var("x"))])))]),
            obj([("list", each("items", obj([("value", var("x"))])))]),
        );
        let inp = obj_node! { "items" => arr_node![obj_node! { "v" => 1 }, obj_node! { "v" => 2 }] };
        let out = m.transform(&inp).unwrap();
        assert_eq!(
            out,
            obj_node! { "list" => arr_node![obj_node! { "value" => 1 }, obj_node! { "value" => 2 }] }
        );
        assert_eq!(m.reverse().transform(&out).unwrap(), inp);
    }

    #[test]
    fn test_each_keeps_nil_and_empty_apart() {
        let op = each("xs", var("x"));
        let (res, mut st) = check(&op, &Node::Nil);
        assert!(res.unwrap());
        assert_eq!(op.construct(&mut st, Node::Nil).unwrap(), Node::Nil);

        let (res, mut st) = check(&op, &arr_node![]);
        assert!(res.unwrap());
        assert_eq!(op.construct(&mut st, Node::Nil).unwrap(), arr_node![]);

        assert!(!check(&op, &Node::Int(1)).0.unwrap());
    }

    #[test]
    fn test_each_inside_append() {
        let op = append(each("head", var("x")), vec![arr(vec![is("end")])]);
        let (res, mut st) = check(&op, &arr_node![1, 2, "end"]);
        assert!(res.unwrap());
        assert_eq!(op.construct(&mut st, Node::Nil).unwrap(), arr_node![1, 2, "end"]);
    }
}
