//! Object matchers
//!
//! An `ObjectPattern` is an ordered list of field operators. Fields are
//! checked and constructed in that order, which decides what variables are
//! already bound when a later field runs.

use super::base::{bool_var, is};
use super::{IntoOp, Op, OpRef};
use crate::node::{KEY_TYPE, Kinds, Node, Object, Value};
use crate::state::State;
use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// An operator on one object field.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    /// Bool variable recording whether the field exists; `None` means the
    /// field is required
    pub optional: Option<String>,
    pub op: OpRef,
}

impl Field {
    pub fn new(name: impl Into<String>, op: impl IntoOp) -> Self {
        Self {
            name: name.into(),
            optional: None,
            op: op.into_op(),
        }
    }

    /// A field that may be missing; its presence is stored in `exists`.
    pub fn optional(name: impl Into<String>, exists: &str, op: impl IntoOp) -> Self {
        Self {
            name: name.into(),
            optional: Some(exists.to_string()),
            op: op.into_op(),
        }
    }

    /// A field pinned to a literal
    pub fn is(name: impl Into<String>, v: impl Into<Value>) -> Self {
        Self::new(name, is(v))
    }

    /// A field captured into a variable
    pub fn var(name: impl Into<String>, var: &str) -> Self {
        Self::new(name, super::base::var(var))
    }
}

/// Matches objects field by field.
///
/// By default every key of a matched object must be declared by the pattern;
/// an undeclared key fails the match with `UnusedField`. A partial pattern
/// (see `part`) binds all undeclared keys to an overflow variable instead,
/// and `allow_unused(true)` ignores them.
#[derive(Debug, Clone, Default)]
pub struct ObjectPattern {
    fields: Vec<Field>,
    names: HashSet<String>,
    other: Option<String>,
    allow_unused: bool,
}

impl ObjectPattern {
    /// Build a pattern from fields in execution order.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut pat = Self::default();
        pat.extend(fields)?;
        Ok(pat)
    }

    fn extend(&mut self, fields: Vec<Field>) -> Result<()> {
        for f in &fields {
            if !self.names.insert(f.name.clone()) {
                return Err(Error::DuplicateField(f.name.clone()));
            }
        }
        self.fields.extend(fields);
        Ok(())
    }

    /// Ignore undeclared keys instead of failing with `UnusedField`.
    pub fn allow_unused(mut self, allow: bool) -> Self {
        self.allow_unused = allow;
        self
    }

    /// Replace the field with the same name, or append it.
    pub fn set_field(&mut self, field: Field) {
        if let Some(cur) = self.fields.iter_mut().find(|f| f.name == field.name) {
            *cur = field;
            return;
        }
        self.names.insert(field.name.clone());
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        if !self.names.contains(name) {
            return None;
        }
        self.fields.iter().find(|f| f.name == name)
    }

    /// Variable receiving undeclared keys, if this pattern is partial
    pub fn overflow_var(&self) -> Option<&str> {
        self.other.as_deref()
    }

    /// The type tag this pattern requires, if the `@type` field is required
    /// and pinned to a string literal.
    pub fn type_tag(&self) -> Option<&str> {
        let f = self.field(KEY_TYPE)?;
        if f.optional.is_some() {
            return None;
        }
        f.op.literal().and_then(Value::as_str)
    }
}

impl Op for ObjectPattern {
    fn kinds(&self) -> Kinds {
        Kinds::OBJECT
    }

    fn check(&self, st: &mut State, n: &Node) -> Result<bool> {
        let Node::Object(cur) = n else {
            return Ok(false);
        };
        for f in &self.fields {
            let value = cur.get(&f.name);
            if let Some(exists) = &f.optional {
                st.set_var(exists, Node::Bool(value.is_some()))
                    .map_err(|e| Error::key(&f.name, e))?;
            }
            let Some(value) = value else {
                if f.optional.is_some() {
                    continue;
                }
                return Ok(false);
            };
            if !f.op.check(st, value).map_err(|e| Error::key(&f.name, e))? {
                return Ok(false);
            }
        }

        let mut unused = cur.iter().filter(|(k, _)| !self.names.contains(*k));
        match &self.other {
            Some(other) => {
                let left: Object = unused.map(|(k, v)| (k, v.clone())).collect();
                st.set_var(other, Node::Object(left))?;
            }
            None if !self.allow_unused => {
                if let Some((k, _)) = unused.next() {
                    return Err(Error::UnusedField(k.to_string()));
                }
            }
            None => {}
        }
        Ok(true)
    }

    fn construct(&self, st: &mut State, n: Node) -> Result<Node> {
        let mut obj = match n {
            Node::Nil => Object::new(),
            Node::Object(o) => o,
            other => return Err(Error::ExpectedObject(other.kind())),
        };
        for f in &self.fields {
            if let Some(exists) = &f.optional {
                if !bool_var(st, exists).map_err(|e| Error::key(&f.name, e))? {
                    continue;
                }
            }
            if obj.contains_key(&f.name) {
                return Err(Error::DuplicateField(f.name.clone()));
            }
            let v = f.op.construct(st, Node::Nil).map_err(|e| Error::key(&f.name, e))?;
            obj.insert(f.name.as_str(), v);
        }
        if let Some(other) = &self.other {
            let left = match st.must_get_var(other)? {
                Node::Object(left) => left.clone(),
                v => return Err(Error::ExpectedObject(v.kind())),
            };
            for (k, v) in left.iter() {
                obj.insert(k, v.clone());
            }
        }
        Ok(Node::Object(obj))
    }

    fn as_object(&self) -> Option<&ObjectPattern> {
        Some(self)
    }
}

impl IntoOp for ObjectPattern {
    fn into_op(self) -> OpRef {
        Arc::new(self)
    }
}

/// Object pattern from `(field, op)` pairs. Fields run sorted by name.
pub fn obj<K, I>(ops: I) -> ObjectPattern
where
    K: Into<String>,
    I: IntoIterator<Item = (K, OpRef)>,
{
    let sorted: BTreeMap<String, OpRef> = ops.into_iter().map(|(k, op)| (k.into(), op)).collect();
    ObjectPattern {
        names: sorted.keys().cloned().collect(),
        fields: sorted.into_iter().map(|(name, op)| Field::new(name, op)).collect(),
        other: None,
        allow_unused: false,
    }
}

/// Object pattern from fields in an explicit execution order.
pub fn fields(fields: Vec<Field>) -> Result<ObjectPattern> {
    ObjectPattern::new(fields)
}

/// An object pattern with a pinned type tag, checked before the other fields.
pub fn typed_obj<K, I>(tag: &str, ops: I) -> ObjectPattern
where
    K: Into<String>,
    I: IntoIterator<Item = (K, OpRef)>,
{
    let mut pat = obj(ops);
    if pat.names.insert(KEY_TYPE.to_string()) {
        pat.fields.insert(0, Field::is(KEY_TYPE, tag));
    } else if let Some(f) = pat.fields.iter_mut().find(|f| f.name == KEY_TYPE) {
        f.op = is(tag);
    }
    pat
}

/// Make a pattern partial: undeclared keys are bound to `var` as an object
/// and merged back on construction.
pub fn part(var: &str, mut pat: ObjectPattern) -> ObjectPattern {
    pat.other = Some(var.to_string());
    pat
}

/// Run `first`, in the given order, before all fields of `pat`.
pub fn pre(first: Vec<Field>, mut pat: ObjectPattern) -> Result<ObjectPattern> {
    let rest = std::mem::take(&mut pat.fields);
    pat.names.clear();
    pat.extend(first)?;
    pat.extend(rest)?;
    Ok(pat)
}

/// Run `last`, in the given order, after all fields of `pat`.
pub fn post(mut pat: ObjectPattern, last: Vec<Field>) -> Result<ObjectPattern> {
    pat.extend(last)?;
    Ok(pat)
}

/// Merge several object patterns into one, keeping field order.
///
/// Fields must not repeat and at most one pattern may be partial. The
/// result allows unused keys if any of the parts does.
pub fn join_obj(parts: Vec<ObjectPattern>) -> Result<ObjectPattern> {
    let mut out = ObjectPattern::default();
    for p in parts {
        if let Some(other) = p.other {
            if let Some(prev) = &out.other {
                return Err(Error::DuplicateField(format!(
                    "overflow variable {} conflicts with {}",
                    other, prev
                )));
            }
            out.other = Some(other);
        }
        out.allow_unused |= p.allow_unused;
        out.extend(p.fields)?;
    }
    Ok(out)
}
