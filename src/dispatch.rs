//! Mapping set - routes each node to the rules that can apply to it
//!
//! Rules are indexed once when the set is built:
//! - object rules that pin `@type` to a literal, grouped by that tag
//! - other object rules (catch-all)
//! - array rules
//! - everything else, which is offered every node including nil
//!
//! During a rewrite every candidate that matches is applied in registration
//! order, each one seeing the node produced by the previous one.

use crate::mapping::Mapping;
use crate::node::{self, Kind, Node};
use crate::state::State;
use crate::transformer::Transformer;
use crate::{Error, Result};
use std::collections::HashMap;

/// Accumulates mappings before the index is compiled.
#[derive(Debug, Default)]
pub struct MappingSetBuilder {
    mappings: Vec<Mapping>,
}

impl MappingSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapping; registration order is application order
    pub fn register(&mut self, mapping: Mapping) -> &mut Self {
        self.mappings.push(mapping);
        self
    }

    /// Builder-style variant of `register`
    pub fn with(mut self, mapping: Mapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Compile the index. The result is read-only and can be shared between
    /// threads.
    pub fn build(self) -> MappingSet {
        let mut set = MappingSet {
            mappings: self.mappings,
            typed: HashMap::new(),
            objects: Vec::new(),
            arrays: Vec::new(),
            others: Vec::new(),
        };
        for (i, m) in set.mappings.iter().enumerate() {
            let src = m.source();
            let kinds = src.kinds();
            if src.as_object().is_some() || kinds.is_only(Kind::Object) {
                match src.as_object().and_then(|o| o.type_tag()) {
                    Some(tag) => set.typed.entry(tag.to_string()).or_default().push(i),
                    None => set.objects.push(i),
                }
            } else if kinds.is_only(Kind::Array) {
                set.arrays.push(i);
            } else {
                set.others.push(i);
            }
        }
        tracing::debug!(
            "indexed {} mapping(s): {} type tag(s), {} catch-all object, {} array, {} other",
            set.mappings.len(),
            set.typed.len(),
            set.objects.len(),
            set.arrays.len(),
            set.others.len()
        );
        set
    }
}

impl FromIterator<Mapping> for MappingSetBuilder {
    fn from_iter<I: IntoIterator<Item = Mapping>>(iter: I) -> Self {
        Self { mappings: iter.into_iter().collect() }
    }
}

/// A compiled, immutable index over an ordered list of mappings.
#[derive(Debug, Clone)]
pub struct MappingSet {
    mappings: Vec<Mapping>,
    typed: HashMap<String, Vec<usize>>,
    objects: Vec<usize>,
    arrays: Vec<usize>,
    others: Vec<usize>,
}

impl MappingSet {
    pub fn builder() -> MappingSetBuilder {
        MappingSetBuilder::new()
    }

    /// Index a list of mappings in the given order
    pub fn new(mappings: impl IntoIterator<Item = Mapping>) -> Self {
        mappings.into_iter().collect::<MappingSetBuilder>().build()
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Indexes of the mappings to try on `n`, in registration order.
    fn candidate_indexes(&self, n: &Node) -> Candidates<'_> {
        let lists: [&[usize]; 3] = match n {
            Node::Object(o) => {
                let typed = o
                    .type_tag()
                    .and_then(|t| self.typed.get(t))
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                [typed, self.objects.as_slice(), self.others.as_slice()]
            }
            Node::Array(_) => [self.arrays.as_slice(), self.others.as_slice(), &[]],
            _ => [self.others.as_slice(), &[], &[]],
        };
        Candidates { lists }
    }

    /// Mappings that will be offered `n`, in application order
    pub fn candidates(&self, n: &Node) -> impl Iterator<Item = &Mapping> {
        self.candidate_indexes(n).map(move |i| &self.mappings[i])
    }

    /// The set with every mapping reversed, applied in reverse order.
    pub fn reverse(&self) -> MappingSet {
        MappingSet::new(self.mappings.iter().rev().map(Mapping::reverse))
    }

    /// Rewrite a whole tree bottom-up, applying every matching candidate to
    /// each node in turn.
    ///
    /// Candidates are selected once per node, from the node as it was before
    /// any of them ran. Failures are collected; a failing mapping leaves the
    /// node as the previous candidate produced it.
    pub fn rewrite(&self, root: &Node) -> (Node, Vec<Error>) {
        let mut errs = Vec::new();
        let mut st = State::new();
        let mut applied = 0usize;
        let out = node::apply(root, &mut |path, n| {
            let mut cur: Option<Node> = None;
            for i in self.candidate_indexes(n) {
                let m = &self.mappings[i];
                match m.apply_node(&mut st, cur.as_ref().unwrap_or(n)) {
                    Ok(Some(nn)) => {
                        tracing::trace!("mapping {} rewrote {}", m.name(), path);
                        applied += 1;
                        cur = Some(nn);
                    }
                    Ok(None) => {}
                    Err(e) => errs.push(m.error_at(path, e)),
                }
            }
            cur
        });
        tracing::debug!(
            "mapping set: {} substitution(s), {} error(s)",
            applied,
            errs.len()
        );
        (out.unwrap_or_else(|| root.clone()), errs)
    }
}

/// Merges the sorted index buckets of one node into a single ascending run.
struct Candidates<'a> {
    lists: [&'a [usize]; 3],
}

impl Iterator for Candidates<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let (slot, i) = self
            .lists
            .iter()
            .enumerate()
            .filter_map(|(slot, list)| list.first().map(|&i| (slot, i)))
            .min_by_key(|&(_, i)| i)?;
        self.lists[slot] = &self.lists[slot][1..];
        Some(i)
    }
}

impl Transformer for MappingSet {
    fn transform(&self, root: &Node) -> Result<Node> {
        let (out, errs) = self.rewrite(root);
        Error::collect(errs)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Value;
    use crate::ops::{each, is, obj, part, typed_obj, var};
    use crate::{arr_node, obj_node};

    fn rename(tag: &str) -> Mapping {
        Mapping::new(
            format!("rename {}", tag),
            part("rest", typed_obj(tag, [("name", var("n"))])),
            part("rest", typed_obj(tag, [("Name", var("n"))])),
        )
    }

    fn mark_named() -> Mapping {
        Mapping::new(
            "mark",
            part("rest", obj([("Name", var("n"))])),
            part("rest", obj([("Name", var("n")), ("seen", is(true))])),
        )
    }

    #[test]
    fn test_index_classification() {
        let set = MappingSet::new([
            rename("X"),
            mark_named(),
            Mapping::new("items", each("xs", var("x")), var("y")),
            Mapping::new("nil", is(Value::Nil), is("none")),
            Mapping::new("list", crate::ops::one(var("a")), var("a")),
        ]);
        assert_eq!(set.typed.get("X"), Some(&vec![0]));
        assert_eq!(set.objects, vec![1]);
        assert_eq!(set.arrays, vec![4]);
        assert_eq!(set.others, vec![2, 3]);
    }

    #[test]
    fn test_candidates_skip_other_tags() {
        let set = MappingSet::new([rename("Y"), rename("X"), mark_named()]);
        let names: Vec<&str> = set
            .candidates(&obj_node! { "@type" => "X", "name" => "a" })
            .map(Mapping::name)
            .collect();
        assert_eq!(names, vec!["rename X", "mark"]);

        let untagged: Vec<&str> = set.candidates(&obj_node! { "name" => "a" }).map(Mapping::name).collect();
        assert_eq!(untagged, vec!["mark"]);
        assert_eq!(set.candidates(&Node::Int(1)).count(), 0);
    }

    #[test]
    fn test_candidates_interleave_buckets_by_registration() {
        let mut builder = MappingSet::builder();
        builder
            .register(mark_named())
            .register(rename("X"))
            .register(Mapping::new("any", var("v"), var("v")))
            .register(rename("X").reverse());
        assert_eq!(builder.len(), 4);
        let set = builder.build();

        let names: Vec<&str> = set
            .candidates(&obj_node! { "@type" => "X", "name" => "a" })
            .map(Mapping::name)
            .collect();
        assert_eq!(names, vec!["mark", "rename X", "any", "rename X"]);

        let names: Vec<&str> = set.candidates(&arr_node![1]).map(Mapping::name).collect();
        assert_eq!(names, vec!["any"]);
    }

    #[test]
    fn test_rewrite_leaves_input_untouched() {
        let set = MappingSet::new([rename("X"), mark_named()]);
        let inp = obj_node! {
            "@type" => "File",
            "decls" => arr_node![
                obj_node! { "@type" => "X", "name" => "a" },
                obj_node! { "@type" => "Z", "Name" => "b" },
            ],
        };
        let snapshot = inp.deep_clone();
        let out = set.transform(&inp).unwrap();
        assert_ne!(out, inp);
        assert_eq!(inp, snapshot);
        assert_eq!(
            out,
            obj_node! {
                "@type" => "File",
                "decls" => arr_node![
                    obj_node! { "@type" => "X", "Name" => "a", "seen" => true },
                    obj_node! { "@type" => "Z", "Name" => "b", "seen" => true },
                ],
            }
        );
    }

    #[test]
    fn test_candidates_are_cumulative_in_order() {
        let inp = obj_node! { "@type" => "X", "name" => "a" };

        let set = MappingSet::new([rename("X"), mark_named()]);
        assert_eq!(
            set.transform(&inp).unwrap(),
            obj_node! { "@type" => "X", "Name" => "a", "seen" => true }
        );

        // the catch-all rule first: it sees no "Name" yet
        let swapped = MappingSet::new([mark_named(), rename("X")]);
        assert_eq!(swapped.transform(&inp).unwrap(), obj_node! { "@type" => "X", "Name" => "a" });
    }

    #[test]
    fn test_reverse_set() {
        let set = MappingSet::new([rename("X"), mark_named()]);
        let inp = arr_node![obj_node! { "@type" => "X", "name" => "a" }, obj_node! { "@type" => "Z" }];
        let out = set.transform(&inp).unwrap();
        assert_eq!(set.reverse().transform(&out).unwrap(), inp);
    }

    #[test]
    fn test_others_see_nil() {
        let set = MappingSet::new([Mapping::new("nil", is(Value::Nil), is("none"))]);
        let out = set.transform(&obj_node! { "a" => Node::Nil, "b" => 1 }).unwrap();
        assert_eq!(out, obj_node! { "a" => "none", "b" => 1 });
    }

    #[test]
    fn test_no_candidates_is_identity() {
        let set = MappingSet::new([rename("X")]);
        let inp = arr_node![obj_node! { "@type" => "Y", "name" => "a" }];
        let out = set.transform(&inp).unwrap();
        assert_eq!(out, inp);
    }

    #[test]
    fn test_errors_do_not_stop_the_pass() {
        let broken = Mapping::new("broken", typed_obj("X", [("name", var("n"))]), obj([("n", var("nope"))]));
        let set = MappingSet::new([broken, rename("Y")]);
        let inp = arr_node![
            obj_node! { "@type" => "X", "name" => "a" },
            obj_node! { "@type" => "Y", "name" => "b" },
        ];
        let (out, errs) = set.rewrite(&inp);
        assert_eq!(errs.len(), 1);
        assert!(matches!(&errs[0], Error::Mapping { name, .. } if name == "broken"));
        assert_eq!(
            out,
            arr_node![
                obj_node! { "@type" => "X", "name" => "a" },
                obj_node! { "@type" => "Y", "Name" => "b" },
            ]
        );
        assert!(set.transform(&inp).is_err());
    }

    #[test]
    fn test_set_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MappingSet>();

        let set = std::sync::Arc::new(MappingSet::new([rename("X")]));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let set = set.clone();
                std::thread::spawn(move || {
                    let inp = obj_node! { "@type" => "X", "name" => i as i64 };
                    set.transform(&inp).unwrap()
                })
            })
            .collect();
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.join().unwrap(), obj_node! { "@type" => "X", "Name" => i as i64 });
        }
    }
}
