//! Transformers and the staged pipeline a language driver runs.
//!
//! Anything that rewrites a whole tree implements `Transformer`: single
//! mappings, mapping sets, closures and the built-in preprocessing steps.
//! `Transforms` chains them into the stages selected by a `Mode`.

use crate::mapping::Mapping;
use crate::node::{self, KEY_END, KEY_ROLES, KEY_START, KEY_TYPE, Node};
use crate::annotate::pos_offset;
use crate::ops::{OpRef, obj, part, var};
use crate::path::NodePath;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Rewrites a whole tree.
///
/// Implementations never modify their input; unchanged subtrees of the
/// result may be shared with it.
pub trait Transformer: Send + Sync {
    fn transform(&self, root: &Node) -> Result<Node>;
}

impl<T: Transformer + ?Sized> Transformer for Box<T> {
    fn transform(&self, root: &Node) -> Result<Node> {
        (**self).transform(root)
    }
}

/// A closure applied to every node bottom-up.
///
/// The closure returns `Ok(Some(_))` to replace a node. Errors are collected
/// for the whole pass and reported under `name`.
pub struct TransformFn<F> {
    name: String,
    f: F,
}

impl<F> TransformFn<F>
where
    F: Fn(&Node) -> Result<Option<Node>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> Transformer for TransformFn<F>
where
    F: Fn(&Node) -> Result<Option<Node>> + Send + Sync,
{
    fn transform(&self, root: &Node) -> Result<Node> {
        let mut errs = Vec::new();
        let out = node::apply(root, &mut |path: &NodePath, n: &Node| match (self.f)(n) {
            Ok(replaced) => replaced,
            Err(e) => {
                errs.push(Error::Mapping {
                    name: self.name.clone(),
                    path: path.clone(),
                    source: Box::new(e),
                });
                None
            }
        });
        Error::collect(errs)?;
        Ok(out.unwrap_or_else(|| root.clone()))
    }
}

impl<F> fmt::Debug for TransformFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformFn").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Unwraps the envelope object some native parsers put around the AST.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// The input is already the root node; nothing to unwrap
    #[serde(default)]
    pub top_level_is_root_node: bool,
}

impl Transformer for ResponseMetadata {
    fn transform(&self, root: &Node) -> Result<Node> {
        if self.top_level_is_root_node {
            return Ok(root.clone());
        }
        match root {
            Node::Object(obj) if obj.len() == 1 => {
                Ok(obj.iter().next().map(|(_, v)| v.clone()).unwrap_or_default())
            }
            other => Ok(other.clone()),
        }
    }
}

/// Converts a native JSON AST into the node conventions: the native type key
/// becomes `@type`, and native offsets become `@start`/`@end` positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectToNode {
    /// Native key holding the node type
    pub internal_type_key: Option<String>,
    /// Native key holding the start offset
    pub offset_key: Option<String>,
    /// Native key holding the end offset
    pub end_offset_key: Option<String>,
    /// The input is already the root node
    pub top_level_is_root_node: bool,
}

impl ObjectToNode {
    /// The reversible mapping behind this transformer, or `None` if no native
    /// keys are configured.
    pub fn mapping(&self) -> Option<Mapping> {
        let mut native: Vec<(String, OpRef)> = Vec::new();
        let mut norm: Vec<(String, OpRef)> = Vec::new();

        if let Some(key) = &self.internal_type_key {
            native.push((key.clone(), var("itype")));
            norm.push((KEY_TYPE.to_string(), var("itype")));
        }
        if let Some(key) = &self.offset_key {
            native.push((key.clone(), var("pos_off_start")));
            norm.push((KEY_START.to_string(), pos_offset("pos_off_start")));
        }
        if let Some(key) = &self.end_offset_key {
            native.push((key.clone(), var("pos_off_end")));
            norm.push((KEY_END.to_string(), pos_offset("pos_off_end")));
        }
        if native.is_empty() {
            return None;
        }
        Some(Mapping::new(
            "ObjectToNode",
            part("other", obj(native)),
            part("other", obj(norm)),
        ))
    }
}

impl Transformer for ObjectToNode {
    fn transform(&self, root: &Node) -> Result<Node> {
        let root = match self.mapping() {
            Some(m) => m.transform(root)?,
            None => root.clone(),
        };
        ResponseMetadata {
            top_level_is_root_node: self.top_level_is_root_node,
        }
        .transform(&root)
    }
}

/// Removes repeated entries from every `@role` list, keeping the first one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolesDedup;

impl Transformer for RolesDedup {
    fn transform(&self, root: &Node) -> Result<Node> {
        let out = node::apply(root, &mut |_, n| {
            let obj = n.as_object()?;
            let roles = obj.get(KEY_ROLES)?.as_array()?;
            let mut seen = HashSet::new();
            let mut uniq = Vec::with_capacity(roles.len());
            for r in roles.iter() {
                let key = r.as_value().map(|v| v.to_string()).unwrap_or_else(|| r.to_string());
                if seen.insert(key) {
                    uniq.push(r.clone());
                }
            }
            if uniq.len() == roles.len() {
                return None;
            }
            let mut obj = obj.clone();
            obj.insert(KEY_ROLES, uniq);
            Some(Node::Object(obj))
        });
        Ok(out.unwrap_or_else(|| root.clone()))
    }
}

/// Prefixes type tags that have no namespace with `ns:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultNamespace(pub String);

impl Transformer for DefaultNamespace {
    fn transform(&self, root: &Node) -> Result<Node> {
        let out = node::apply(root, &mut |_, n| {
            let obj = n.as_object()?;
            let tag = obj.type_tag()?;
            if tag.contains(':') {
                return None;
            }
            let tagged = format!("{}:{}", self.0, tag);
            let mut obj = obj.clone();
            obj.insert(KEY_TYPE, tagged);
            Some(Node::Object(obj))
        });
        Ok(out.unwrap_or_else(|| root.clone()))
    }
}

/// How far the pipeline runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The tree as the native parser produced it
    Native,
    /// Preprocessing only
    Preprocessed,
    /// Preprocessed and annotated with roles
    Annotated,
    /// Fully normalized
    #[default]
    Semantic,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Native => "native",
            Mode::Preprocessed => "preprocessed",
            Mode::Annotated => "annotated",
            Mode::Semantic => "semantic",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(Mode::Native),
            "preprocessed" => Ok(Mode::Preprocessed),
            "annotated" => Ok(Mode::Annotated),
            "semantic" => Ok(Mode::Semantic),
            _ => Err(format!("unknown mode: {}", s)),
        }
    }
}

/// The transformation pipeline of one language driver.
///
/// Stages run in this order:
/// 1. `preprocess` (every mode except native)
/// 2. `normalize` (semantic mode)
/// 3. `annotations` (annotated and semantic modes)
/// 4. default namespace (semantic mode)
#[derive(Default)]
pub struct Transforms {
    namespace: Option<String>,
    preprocess: Vec<Box<dyn Transformer>>,
    normalize: Vec<Box<dyn Transformer>>,
    annotations: Vec<Box<dyn Transformer>>,
}

impl Transforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace applied to untagged types in semantic mode
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    pub fn preprocess(mut self, t: impl Transformer + 'static) -> Self {
        self.preprocess.push(Box::new(t));
        self
    }

    pub fn normalize(mut self, t: impl Transformer + 'static) -> Self {
        self.normalize.push(Box::new(t));
        self
    }

    pub fn annotate(mut self, t: impl Transformer + 'static) -> Self {
        self.annotations.push(Box::new(t));
        self
    }

    /// Run the stages `mode` asks for. The first failing transformer aborts
    /// the pipeline.
    pub fn run(&self, mode: Mode, root: &Node) -> Result<Node> {
        if mode == Mode::Native {
            return Ok(root.clone());
        }
        let mut cur = run_stage("preprocess", &self.preprocess, root.clone())?;
        if mode >= Mode::Semantic {
            cur = run_stage("normalize", &self.normalize, cur)?;
        }
        if mode >= Mode::Annotated {
            cur = run_stage("annotations", &self.annotations, cur)?;
        }
        if mode >= Mode::Semantic {
            if let Some(ns) = &self.namespace {
                cur = DefaultNamespace(ns.clone()).transform(&cur)?;
            }
        }
        Ok(cur)
    }
}

fn run_stage(stage: &str, list: &[Box<dyn Transformer>], mut cur: Node) -> Result<Node> {
    tracing::debug!("running {} stage: {} transformer(s)", stage, list.len());
    for t in list {
        cur = t.transform(&cur)?;
    }
    Ok(cur)
}

impl fmt::Debug for Transforms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transforms")
            .field("namespace", &self.namespace)
            .field("preprocess", &self.preprocess.len())
            .field("normalize", &self.normalize.len())
            .field("annotations", &self.annotations.len())
            .finish()
    }
}
