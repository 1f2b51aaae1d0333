//! Binding state - variables captured during one match attempt
//!
//! A `State` lives for exactly one node's check-then-construct cycle. It is
//! passed explicitly through every operator call and is never shared between
//! concurrent rewrites.

use crate::node::Node;
use crate::{Error, Result};
use std::collections::HashMap;

/// Per-element states recorded by iteration operators.
///
/// `None` records that the matched node was nil rather than an empty array,
/// so construction can restore the exact same shape.
pub type SubStates = Option<Vec<State>>;

/// Variable and sub-state bindings for one match attempt.
#[derive(Debug, Clone, Default)]
pub struct State {
    vars: HashMap<String, Node>,
    states: HashMap<String, SubStates>,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all bindings, keeping allocations for the next node
    pub fn reset(&mut self) {
        self.vars.clear();
        self.states.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.states.is_empty()
    }

    pub fn get_var(&self, name: &str) -> Option<&Node> {
        self.vars.get(name)
    }

    /// Get a variable or fail with `VariableNotDefined`
    pub fn must_get_var(&self, name: &str) -> Result<&Node> {
        self.vars
            .get(name)
            .ok_or_else(|| Error::VariableNotDefined(name.to_string()))
    }

    /// Bind a variable.
    ///
    /// Binding a name again with a structurally equal value is a no-op, which
    /// lets one variable appear in several places of a pattern. A different
    /// value fails with `VariableRedeclared`.
    pub fn set_var(&mut self, name: &str, value: Node) -> Result<()> {
        match self.vars.get(name) {
            None => {
                self.vars.insert(name.to_string(), value);
                Ok(())
            }
            Some(cur) if *cur == value => Ok(()),
            Some(cur) => Err(Error::VariableRedeclared {
                name: name.to_string(),
                old: cur.to_string(),
                new: value.to_string(),
            }),
        }
    }

    pub fn get_state_var(&self, name: &str) -> Option<&SubStates> {
        self.states.get(name)
    }

    /// Record a list of sub-states. Sub-state names are write-once.
    pub fn set_state_var(&mut self, name: &str, subs: SubStates) -> Result<()> {
        if let Some(cur) = self.states.get(name) {
            return Err(Error::VariableRedeclared {
                name: name.to_string(),
                old: describe(cur),
                new: describe(&subs),
            });
        }
        self.states.insert(name.to_string(), subs);
        Ok(())
    }

    /// Copy bindings from `other` that are not defined here yet.
    pub fn merge_from(&mut self, other: State) {
        for (k, v) in other.vars {
            self.vars.entry(k).or_insert(v);
        }
        for (k, v) in other.states {
            self.states.entry(k).or_insert(v);
        }
    }
}

fn describe(subs: &SubStates) -> String {
    match subs {
        None => "nil".to_string(),
        Some(list) => format!("{} sub-state(s)", list.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obj_node;

    #[test]
    fn test_set_var_same_value_is_noop() {
        let mut st = State::new();
        st.set_var("x", Node::Int(1)).unwrap();
        st.set_var("x", Node::Int(1)).unwrap();
        assert_eq!(st.get_var("x"), Some(&Node::Int(1)));
    }

    #[test]
    fn test_set_var_structural_equality() {
        let mut st = State::new();
        st.set_var("o", obj_node! { "a" => 1 }).unwrap();
        st.set_var("o", obj_node! { "a" => 1 }).unwrap();

        let err = st.set_var("o", obj_node! { "a" => 2 }).unwrap_err();
        assert!(matches!(err, Error::VariableRedeclared { ref name, .. } if name == "o"));
    }

    #[test]
    fn test_set_var_nan_rebinds() {
        let mut st = State::new();
        st.set_var("x", Node::Float(f64::NAN)).unwrap();
        st.set_var("x", Node::Float(f64::NAN)).unwrap();
    }

    #[test]
    fn test_set_var_signed_zero_conflicts() {
        let mut st = State::new();
        st.set_var("x", Node::Float(0.0)).unwrap();
        let err = st.set_var("x", Node::Float(-0.0)).unwrap_err();
        assert!(matches!(err, Error::VariableRedeclared { .. }));
    }

    #[test]
    fn test_must_get_var() {
        let st = State::new();
        assert!(matches!(st.must_get_var("nope"), Err(Error::VariableNotDefined(_))));
    }

    #[test]
    fn test_state_vars_are_write_once() {
        let mut st = State::new();
        st.set_state_var("items", Some(vec![State::new()])).unwrap();
        assert!(st.set_state_var("items", None).is_err());
        assert_eq!(st.get_state_var("items").and_then(|s| s.as_ref()).map(Vec::len), Some(1));
    }

    #[test]
    fn test_reset_and_merge() {
        let mut st = State::new();
        st.set_var("a", Node::Int(1)).unwrap();

        let mut other = State::new();
        other.set_var("a", Node::Int(2)).unwrap();
        other.set_var("b", Node::Int(3)).unwrap();
        st.merge_from(other);

        assert_eq!(st.get_var("a"), Some(&Node::Int(1)));
        assert_eq!(st.get_var("b"), Some(&Node::Int(3)));

        st.reset();
        assert!(st.is_empty());
    }
}
