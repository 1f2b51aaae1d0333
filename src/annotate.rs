//! Helpers for describing native AST shapes and annotating them with roles.
//!
//! Roles are plain strings kept in the `@role` array of a node. The helpers
//! here build reversible patterns that keep any roles a node already had and
//! append new ones after them.

use crate::mapping::Mapping;
use crate::node::{KEY_POS_COL, KEY_POS_LINE, KEY_POS_OFFSET, KEY_ROLES, KEY_TYPE, TYPE_POSITION, Value};
use crate::ops::{
    ArrayPattern, Field, IntoOp, ObjectPattern, OpRef, append, arr, each, fields, if_, is, not_empty, obj,
    opt, part, string_conv, typed_obj, var,
};
use crate::{Error, Result};

/// A position object with its offset stored in `vr`.
pub fn pos_offset(vr: &str) -> OpRef {
    typed_obj(TYPE_POSITION, [(KEY_POS_OFFSET, var(vr))]).into_op()
}

/// A position object with line and column stored in two variables.
pub fn pos_line_col(line: &str, col: &str) -> OpRef {
    typed_obj(TYPE_POSITION, [(KEY_POS_LINE, var(line)), (KEY_POS_COL, var(col))]).into_op()
}

/// Exactly these roles, in order.
pub fn roles(roles: &[&str]) -> ArrayPattern {
    arr(roles.iter().map(|r| is(*r)).collect())
}

/// `old` followed by `roles`
pub fn append_roles(old: ArrayPattern, extra: &[&str]) -> ArrayPattern {
    if extra.is_empty() {
        return old;
    }
    old.concat(roles(extra))
}

/// A `@role` field that keeps existing roles in `vr` and appends `roles`.
///
/// With no roles to add the field is optional and only carries the
/// existing roles through.
pub fn roles_field(vr: &str, roles: &[&str]) -> Field {
    roles_field_op(vr, None, roles)
}

/// Like `roles_field`, with a custom operator producing the added roles.
pub fn roles_field_op(vr: &str, op: Option<ArrayPattern>, extra: &[&str]) -> Field {
    let exists = format!("{}_exists", vr);
    let rop = match op {
        None if extra.is_empty() => return Field::optional(KEY_ROLES, &exists, var(vr)),
        None => roles(extra),
        Some(op) => append_roles(op, extra),
    };
    Field::new(
        KEY_ROLES,
        if_(&exists, append(not_empty(var(vr)), vec![rop.clone()]), rop),
    )
}

/// A two-way mapping between a native AST shape and its normalized form.
pub fn ast_map(name: impl Into<String>, native: impl IntoOp, norm: impl IntoOp) -> Mapping {
    Mapping::new(name, native, norm)
}

/// Native side of a node of type `typ`. Existing roles are preserved and all
/// other fields are carried through.
pub fn ast_object_left(typ: &str, ast: ObjectPattern) -> Result<ObjectPattern> {
    if ast.field(KEY_ROLES).is_some() {
        return Err(Error::DuplicateField(KEY_ROLES.to_string()));
    }
    let mut ast = ast;
    if !typ.is_empty() {
        ast.set_field(Field::is(KEY_TYPE, typ));
    }
    ast.set_field(roles_field(&format!("{}_roles", typ), &[]));
    Ok(part("_", ast))
}

/// Annotated side of a node of type `typ`, with `roles` (and the output of
/// `rop`, if any) appended to the preserved roles.
pub fn ast_object_right(
    typ: &str,
    norm: ObjectPattern,
    rop: Option<ArrayPattern>,
    roles: &[&str],
) -> Result<ObjectPattern> {
    if norm.field(KEY_ROLES).is_some() {
        return Err(Error::DuplicateField(KEY_ROLES.to_string()));
    }
    let mut norm = norm;
    if !typ.is_empty() {
        norm.set_field(Field::is(KEY_TYPE, typ));
    }
    norm.set_field(roles_field_op(&format!("{}_roles", typ), rop, roles));
    Ok(part("_", norm))
}

/// Mapping for a single node type that reshapes it and appends roles.
pub fn map_ast(typ: &str, ast: ObjectPattern, norm: ObjectPattern, roles: &[&str]) -> Result<Mapping> {
    map_ast_custom(typ, ast, norm, None, roles)
}

/// Like `map_ast`, with a custom roles operator.
pub fn map_ast_custom(
    typ: &str,
    ast: ObjectPattern,
    norm: ObjectPattern,
    rop: Option<ArrayPattern>,
    roles: &[&str],
) -> Result<Mapping> {
    Ok(ast_map(
        typ,
        ast_object_left(typ, ast)?,
        ast_object_right(typ, norm, rop, roles)?,
    ))
}

/// Adds roles to an object without constraining its type. Meant for use
/// inside other object fields.
pub fn object_roles(vr: &str, roles: &[&str]) -> OpRef {
    object_roles_custom(vr, None, None, roles)
}

/// Like `object_roles`, with extra field constraints and a roles operator.
pub fn object_roles_custom(
    vr: &str,
    pat: Option<ObjectPattern>,
    rop: Option<ArrayPattern>,
    roles: &[&str],
) -> OpRef {
    let mut pat = pat.unwrap_or_default();
    pat.set_field(roles_field_op(&format!("{}_roles", vr), rop, roles));
    part(vr, pat).into_op()
}

/// `object_roles` applied to every element of an array.
pub fn each_object_roles(vr: &str, roles: &[&str]) -> OpRef {
    each(&format!("{}_arr", vr), object_roles(vr, roles))
}

/// `object_roles` on a node that may be nil.
pub fn opt_object_roles(vr: &str, roles: &[&str]) -> OpRef {
    opt(&format!("{}_set", vr), object_roles(vr, roles))
}

/// Annotate a node type with roles, and each listed field (an optional
/// object) with its own roles.
pub fn annotate_type(typ: &str, field_roles: &[(&str, &[&str])], roles: &[&str]) -> Result<Mapping> {
    let mut left = Vec::with_capacity(field_roles.len());
    let mut right = Vec::with_capacity(field_roles.len());
    for (name, extra) in field_roles {
        let vr = format!("{}_var", name);
        left.push((name.to_string(), opt_object_roles(&vr, &[])));
        right.push((name.to_string(), opt_object_roles(&vr, extra)));
    }
    map_ast(typ, obj(left), obj(right), roles)
}

/// Give nodes of type `typ` that have no roles the given ones.
///
/// This mapping is one-way: its reverse would remove roles that the input
/// may not have had.
pub fn annotate_if_no_roles(typ: &str, add: &[&str]) -> Result<Mapping> {
    let src = fields(vec![
        Field::is(KEY_TYPE, typ),
        Field::optional(KEY_ROLES, "roles_exists", is(Value::Nil)),
    ])?;
    let dst = fields(vec![Field::is(KEY_TYPE, typ), Field::new(KEY_ROLES, roles(add))])?;
    Ok(ast_map(format!("{} without roles", typ), part("_", src), part("_", dst)))
}

fn uncomment(s: &str) -> Result<String> {
    if let Some(rest) = s.strip_prefix("//") {
        return Ok(rest.to_string());
    }
    if let Some(rest) = s.strip_prefix("/*").and_then(|r| r.strip_suffix("*/")) {
        return Ok(rest.to_string());
    }
    Ok(s.to_string())
}

fn comment(s: &str) -> Result<String> {
    if s.contains('\n') {
        Ok(format!("/*{}*/", s))
    } else {
        Ok(format!("//{}", s))
    }
}

/// Strips `//` and `/* */` from a comment token stored in `vr`.
pub fn uncomment_c_like(vr: &str) -> OpRef {
    string_conv(var(vr), uncomment, comment)
}
