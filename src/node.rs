//! Node model - the tree value every operator works on
//!
//! A `Node` is a closed sum of scalars, objects and arrays. Containers are
//! reference counted: cloning a node is cheap and unchanged subtrees are
//! shared between the input and the output of a rewrite. Writing into a
//! container that is shared copies it first, so a tree handed to the engine
//! is never modified in place.

use crate::path::NodePath;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, BitOr};
use std::sync::Arc;

/// Type tag of a node, namespaced as `ns:Name`
pub const KEY_TYPE: &str = "@type";
/// Source token of a node
pub const KEY_TOKEN: &str = "@token";
/// List of role names
pub const KEY_ROLES: &str = "@role";
/// Positional information
pub const KEY_POS: &str = "@pos";
/// Start position
pub const KEY_START: &str = "@start";
/// End position
pub const KEY_END: &str = "@end";

/// Type tag used for position objects
pub const TYPE_POSITION: &str = "uast:Position";
/// Offset field of a position object
pub const KEY_POS_OFFSET: &str = "offset";
/// Line field of a position object
pub const KEY_POS_LINE: &str = "line";
/// Column field of a position object
pub const KEY_POS_COL: &str = "col";

/// Kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Nil,
    Bool,
    Int,
    Uint,
    Float,
    String,
    Object,
    Array,
}

impl Kind {
    /// Get the string representation of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Nil => "nil",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Uint => "uint",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Object => "object",
            Kind::Array => "array",
        }
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A set of node kinds.
///
/// Operators report the kinds they are able to match, which lets a rewrite
/// skip nodes without calling `check` at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Kinds(u16);

impl Kinds {
    pub const NONE: Kinds = Kinds(0);
    pub const NIL: Kinds = Kinds::of(Kind::Nil);
    pub const BOOL: Kinds = Kinds::of(Kind::Bool);
    pub const INT: Kinds = Kinds::of(Kind::Int);
    pub const UINT: Kinds = Kinds::of(Kind::Uint);
    pub const FLOAT: Kinds = Kinds::of(Kind::Float);
    pub const STRING: Kinds = Kinds::of(Kind::String);
    pub const OBJECT: Kinds = Kinds::of(Kind::Object);
    pub const ARRAY: Kinds = Kinds::of(Kind::Array);
    /// All non-nil scalars
    pub const VALUES: Kinds = Kinds(
        Kind::Bool.bit() | Kind::Int.bit() | Kind::Uint.bit() | Kind::Float.bit() | Kind::String.bit(),
    );
    pub const ANY: Kinds = Kinds(Kinds::VALUES.0 | Kinds::NIL.0 | Kinds::OBJECT.0 | Kinds::ARRAY.0);

    pub const fn of(kind: Kind) -> Kinds {
        Kinds(kind.bit())
    }

    pub const fn union(self, other: Kinds) -> Kinds {
        Kinds(self.0 | other.0)
    }

    pub const fn intersect(self, other: Kinds) -> Kinds {
        Kinds(self.0 & other.0)
    }

    pub const fn without(self, other: Kinds) -> Kinds {
        Kinds(self.0 & !other.0)
    }

    pub fn contains(self, kind: Kind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if the set holds exactly this one kind
    pub fn is_only(self, kind: Kind) -> bool {
        self.0 == kind.bit()
    }
}

impl BitOr for Kinds {
    type Output = Kinds;

    fn bitor(self, rhs: Kinds) -> Kinds {
        self.union(rhs)
    }
}

impl BitAnd for Kinds {
    type Output = Kinds;

    fn bitand(self, rhs: Kinds) -> Kinds {
        self.intersect(rhs)
    }
}

/// A scalar node value.
///
/// Unlike `Node`, values are `Eq + Hash` so they can key lookup tables.
/// Floats compare by bit pattern.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::Uint(_) => Kind::Uint,
            Value::Float(_) => Kind::Float,
            Value::String(_) => Kind::String,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Compare against a node without allocating
    pub fn matches(&self, n: &Node) -> bool {
        match (self, n) {
            (Value::Nil, Node::Nil) => true,
            (Value::Bool(a), Node::Bool(b)) => a == b,
            (Value::Int(a), Node::Int(b)) => a == b,
            (Value::Uint(a), Node::Uint(b)) => a == b,
            (Value::Float(a), Node::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Node::String(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Nil => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Uint(u) => u.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Uint(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// A tree node.
///
/// Equality is structural. Floats compare by bit pattern as in `Value`, so a
/// NaN equals itself and `0.0` differs from `-0.0`.
#[derive(Debug, Clone, Default)]
pub enum Node {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Object(Object),
    Array(Array),
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Nil, Node::Nil) => true,
            (Node::Bool(a), Node::Bool(b)) => a == b,
            (Node::Int(a), Node::Int(b)) => a == b,
            (Node::Uint(a), Node::Uint(b)) => a == b,
            (Node::Float(a), Node::Float(b)) => a.to_bits() == b.to_bits(),
            (Node::String(a), Node::String(b)) => a == b,
            (Node::Object(a), Node::Object(b)) => a == b,
            (Node::Array(a), Node::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Node {}

impl Node {
    pub fn kind(&self) -> Kind {
        match self {
            Node::Nil => Kind::Nil,
            Node::Bool(_) => Kind::Bool,
            Node::Int(_) => Kind::Int,
            Node::Uint(_) => Kind::Uint,
            Node::Float(_) => Kind::Float,
            Node::String(_) => Kind::String,
            Node::Object(_) => Kind::Object,
            Node::Array(_) => Kind::Array,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Node::Nil)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Node::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Node::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    /// The scalar value of this node, or `None` for objects and arrays.
    pub fn as_value(&self) -> Option<Value> {
        match self {
            Node::Nil => Some(Value::Nil),
            Node::Bool(b) => Some(Value::Bool(*b)),
            Node::Int(i) => Some(Value::Int(*i)),
            Node::Uint(u) => Some(Value::Uint(*u)),
            Node::Float(f) => Some(Value::Float(*f)),
            Node::String(s) => Some(Value::String(s.clone())),
            Node::Object(_) | Node::Array(_) => None,
        }
    }

    /// Type tag of an object node, if it has a string one
    pub fn type_tag(&self) -> Option<&str> {
        self.as_object().and_then(Object::type_tag)
    }

    /// Copy the whole tree, sharing nothing with the original.
    pub fn deep_clone(&self) -> Node {
        match self {
            Node::Object(o) => Node::Object(o.deep_clone()),
            Node::Array(a) => Node::Array(a.deep_clone()),
            other => other.clone(),
        }
    }

    /// Pre-order iterator over this node and all of its descendants
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

impl From<Value> for Node {
    fn from(v: Value) -> Self {
        match v {
            Value::Nil => Node::Nil,
            Value::Bool(b) => Node::Bool(b),
            Value::Int(i) => Node::Int(i),
            Value::Uint(u) => Node::Uint(u),
            Value::Float(f) => Node::Float(f),
            Value::String(s) => Node::String(s),
        }
    }
}

impl From<bool> for Node {
    fn from(v: bool) -> Self {
        Node::Bool(v)
    }
}

impl From<i64> for Node {
    fn from(v: i64) -> Self {
        Node::Int(v)
    }
}

impl From<i32> for Node {
    fn from(v: i32) -> Self {
        Node::Int(v as i64)
    }
}

impl From<u64> for Node {
    fn from(v: u64) -> Self {
        Node::Uint(v)
    }
}

impl From<f64> for Node {
    fn from(v: f64) -> Self {
        Node::Float(v)
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Self {
        Node::String(v.to_string())
    }
}

impl From<String> for Node {
    fn from(v: String) -> Self {
        Node::String(v)
    }
}

impl From<Object> for Node {
    fn from(v: Object) -> Self {
        Node::Object(v)
    }
}

impl From<Array> for Node {
    fn from(v: Array) -> Self {
        Node::Array(v)
    }
}

impl From<Vec<Node>> for Node {
    fn from(v: Vec<Node>) -> Self {
        Node::Array(Array::from(v))
    }
}

/// An object node: unordered string keys, kept sorted for determinism.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Object(Arc<BTreeMap<String, Node>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set a field, copying the underlying map first if it is shared.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Node>) -> Option<Node> {
        Arc::make_mut(&mut self.0).insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Node> {
        if !self.0.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.0).remove(key)
    }

    pub fn type_tag(&self) -> Option<&str> {
        self.get(KEY_TYPE).and_then(Node::as_str)
    }

    /// True if both objects share the same storage
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn deep_clone(&self) -> Object {
        self.iter().map(|(k, v)| (k, v.deep_clone())).collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Node)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Node)>>(iter: I) -> Self {
        Object(Arc::new(iter.into_iter().map(|(k, v)| (k.into(), v)).collect()))
    }
}

/// An array node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Array(Arc<Vec<Node>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Node] {
        &self.0
    }

    pub fn push(&mut self, value: impl Into<Node>) {
        Arc::make_mut(&mut self.0).push(value.into());
    }

    /// Replace an element, copying the underlying vector first if it is shared.
    pub fn set(&mut self, index: usize, value: impl Into<Node>) {
        Arc::make_mut(&mut self.0)[index] = value.into();
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn deep_clone(&self) -> Array {
        self.iter().map(Node::deep_clone).collect()
    }
}

impl From<Vec<Node>> for Array {
    fn from(v: Vec<Node>) -> Self {
        Array(Arc::new(v))
    }
}

impl FromIterator<Node> for Array {
    fn from_iter<I: IntoIterator<Item = Node>>(iter: I) -> Self {
        Array(Arc::new(iter.into_iter().collect()))
    }
}

/// Pre-order iterator over a tree.
pub struct PreOrder<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        let n = self.stack.pop()?;
        match n {
            Node::Object(o) => self.stack.extend(o.0.values().rev()),
            Node::Array(a) => self.stack.extend(a.0.iter().rev()),
            _ => {}
        }
        Some(n)
    }
}

/// Rewrite a tree bottom-up.
///
/// Children are visited before their parent, so `f` always sees a node whose
/// children were already rewritten. `f` returns `Some` to replace a node.
/// A container is rebuilt only when one of its children changed; everything
/// else keeps sharing storage with `root`. Returns `None` if nothing changed.
pub fn apply<F>(root: &Node, f: &mut F) -> Option<Node>
where
    F: FnMut(&NodePath, &Node) -> Option<Node>,
{
    let mut path = NodePath::root();
    apply_at(&mut path, root, f)
}

fn apply_at<F>(path: &mut NodePath, n: &Node, f: &mut F) -> Option<Node>
where
    F: FnMut(&NodePath, &Node) -> Option<Node>,
{
    let rebuilt = match n {
        Node::Object(obj) => {
            let mut out: Option<Object> = None;
            for (k, v) in obj.iter() {
                path.push_key(k);
                let changed = apply_at(path, v, f);
                path.pop();
                if let Some(nv) = changed {
                    out.get_or_insert_with(|| obj.clone()).insert(k, nv);
                }
            }
            out.map(Node::Object)
        }
        Node::Array(arr) => {
            let mut out: Option<Array> = None;
            for (i, v) in arr.iter().enumerate() {
                path.push_index(i);
                let changed = apply_at(path, v, f);
                path.pop();
                if let Some(nv) = changed {
                    out.get_or_insert_with(|| arr.clone()).set(i, nv);
                }
            }
            out.map(Node::Array)
        }
        _ => None,
    };
    let cur = rebuilt.as_ref().unwrap_or(n);
    match f(path, cur) {
        Some(replaced) => Some(replaced),
        None => rebuilt,
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Nil => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Int(i) => serializer.serialize_i64(*i),
            Node::Uint(u) => serializer.serialize_u64(*u),
            Node::Float(f) => serializer.serialize_f64(*f),
            Node::String(s) => serializer.serialize_str(s),
            Node::Object(o) => {
                let mut map = serializer.serialize_map(Some(o.len()))?;
                for (k, v) in o.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Node::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for v in a.iter() {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
        }
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a tree node")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Nil)
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Nil)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Node, D::Error> {
        Node::deserialize(d)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::Int(v))
    }

    // integers decode as Int unless they do not fit
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        Ok(i64::try_from(v).map(Node::Int).unwrap_or(Node::Uint(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Node>()? {
            items.push(item);
        }
        Ok(Node::from(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut fields = BTreeMap::new();
        while let Some((k, v)) = map.next_entry::<String, Node>()? {
            fields.insert(k, v);
        }
        Ok(Node::Object(Object(Arc::new(fields))))
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Node, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

/// Build an object node from `key => value` pairs.
#[macro_export]
macro_rules! obj_node {
    () => { $crate::node::Node::Object($crate::node::Object::new()) };
    ($($k:expr => $v:expr),+ $(,)?) => {
        $crate::node::Node::Object(
            [$(($k, $crate::node::Node::from($v))),+].into_iter().collect::<$crate::node::Object>()
        )
    };
}

/// Build an array node from a list of values.
#[macro_export]
macro_rules! arr_node {
    ($($v:expr),* $(,)?) => {
        $crate::node::Node::from(vec![$($crate::node::Node::from($v)),*])
    };
}
