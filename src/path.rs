//! Node paths - stable addresses of nodes inside a tree
//!
//! Format: `$` for the root, `.name` for an object field, `[3]` for an array
//! element, and `["a.b"]` for field names that contain `.`, `[`, `]` or `"`.
//!
//! Examples:
//! - `$.body[2].left`
//! - `$["weird.key"][0]`

use crate::node::Node;
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// One step from a node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Address of a node relative to the root of a tree.
///
/// Used to report where a transformation error happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath {
    segments: Vec<PathSegment>,
}

impl NodePath {
    /// The path of the tree root
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn push_key(&mut self, key: impl Into<String>) {
        self.segments.push(PathSegment::Key(key.into()));
    }

    pub fn push_index(&mut self, index: usize) {
        self.segments.push(PathSegment::Index(index));
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.segments.pop()
    }

    /// Builder-style variant of `push_key`
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.push_key(key);
        self
    }

    /// Builder-style variant of `push_index`
    pub fn index(mut self, index: usize) -> Self {
        self.push_index(index);
        self
    }

    /// Follow the path from `root`, returning the addressed node if it exists.
    pub fn resolve<'a>(&self, root: &'a Node) -> Option<&'a Node> {
        let mut cur = root;
        for seg in &self.segments {
            cur = match (seg, cur) {
                (PathSegment::Key(k), Node::Object(obj)) => obj.get(k)?,
                (PathSegment::Index(i), Node::Array(arr)) => arr.get(*i)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Parse a path string
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix('$')
            .ok_or_else(|| Error::InvalidPath(format!("path must start with $: {}", s)))?;

        let mut path = NodePath::root();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            match c {
                '.' => {
                    let start = i + 1;
                    let mut end = rest.len();
                    while let Some(&(j, c)) = chars.peek() {
                        if c == '.' || c == '[' {
                            end = j;
                            break;
                        }
                        chars.next();
                    }
                    if start == end {
                        return Err(Error::InvalidPath(format!("empty field name in {}", s)));
                    }
                    path.push_key(&rest[start..end]);
                }
                '[' => {
                    let close = find_closing(&rest[i..])
                        .ok_or_else(|| Error::InvalidPath(format!("unclosed [ in {}", s)))?;
                    let inner = &rest[i + 1..i + close];
                    if inner.starts_with('"') {
                        let key: String = serde_json::from_str(inner)
                            .map_err(|e| Error::InvalidPath(format!("bad quoted key {}: {}", inner, e)))?;
                        path.push_key(key);
                    } else {
                        let index: usize = inner
                            .parse()
                            .map_err(|_| Error::InvalidPath(format!("invalid index: {}", inner)))?;
                        path.push_index(index);
                    }
                    // skip the consumed segment
                    while let Some(&(j, _)) = chars.peek() {
                        if j > i + close {
                            break;
                        }
                        chars.next();
                    }
                }
                _ => {
                    return Err(Error::InvalidPath(format!("unexpected {:?} in {}", c, s)));
                }
            }
        }
        Ok(path)
    }
}

// Index of the `]` closing a segment that starts with `[`, honoring quoted keys.
fn find_closing(s: &str) -> Option<usize> {
    let mut in_str = false;
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_str => escaped = true,
            '"' => in_str = !in_str,
            ']' if !in_str => return Some(i),
            _ => {}
        }
    }
    None
}

fn needs_quoting(key: &str) -> bool {
    key.is_empty() || key.contains(['.', '[', ']', '"'])
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.segments {
            match seg {
                PathSegment::Key(k) if needs_quoting(k) => {
                    let quoted = serde_json::to_string(k).map_err(|_| fmt::Error)?;
                    write!(f, "[{}]", quoted)?
                }
                PathSegment::Key(k) => write!(f, ".{}", k)?,
                PathSegment::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

impl FromStr for NodePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arr_node, obj_node};

    #[test]
    fn test_path_roundtrip() {
        let path = NodePath::root().key("body").index(2).key("@type");
        let s = path.to_string();
        assert_eq!(s, "$.body[2].@type");
        assert_eq!(NodePath::parse(&s).unwrap(), path);
    }

    #[test]
    fn test_quoted_keys() {
        let path = NodePath::root().key("a.b").index(0).key("x");
        let s = path.to_string();
        assert_eq!(s, "$[\"a.b\"][0].x");
        assert_eq!(s.parse::<NodePath>().unwrap(), path);
    }

    #[test]
    fn test_invalid_paths() {
        assert!(NodePath::parse("body").is_err());
        assert!(NodePath::parse("$.").is_err());
        assert!(NodePath::parse("$[x]").is_err());
        assert!(NodePath::parse("$[1").is_err());
        assert!(NodePath::parse("$").unwrap().is_root());
    }

    #[test]
    fn test_resolve() {
        let tree = obj_node! { "body" => arr_node![obj_node! { "name" => "x" }] };
        let path = NodePath::parse("$.body[0].name").unwrap();
        assert_eq!(path.resolve(&tree), Some(&Node::from("x")));
        assert_eq!(NodePath::parse("$.body[3]").unwrap().resolve(&tree), None);
        assert_eq!(NodePath::parse("$[0]").unwrap().resolve(&tree), None);
    }
}
