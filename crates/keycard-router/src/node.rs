//! Radix tree node implementation.
//!
//! Each node owns one path segment. Children are split by kind so that
//! matching can try static segments first, then the named segment, then
//! the trailing wildcard.

use crate::error::RouteError;
use crate::method_router::MethodRouter;
use crate::params::{decode_segment, Params};

/// Type of path segment in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Literal segment (e.g. "items")
    Static,
    /// Named segment (e.g. "{id}")
    Param(String),
    /// Trailing catch-all (e.g. "{*rest}" or "*rest")
    Wildcard(String),
}

/// A node in the route tree.
#[derive(Debug, Clone)]
pub struct Node<T> {
    /// The raw segment text this node represents
    pub segment: String,

    /// The kind of segment
    pub kind: SegmentKind,

    /// Registrations ending at this node
    pub methods: MethodRouter<T>,

    /// Static children, sorted by segment for binary search
    pub static_children: Vec<Node<T>>,

    /// Named segment child (at most one per node)
    pub param_child: Option<Box<Node<T>>>,

    /// Wildcard child (at most one per node, always a leaf)
    pub wildcard_child: Option<Box<Node<T>>>,
}

impl<T> Node<T> {
    fn new(segment: impl Into<String>, kind: SegmentKind) -> Self {
        Self {
            segment: segment.into(),
            kind,
            methods: MethodRouter::new(),
            static_children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    /// Creates the root node of a tree.
    #[must_use]
    pub fn root() -> Self {
        Self::new("", SegmentKind::Static)
    }

    /// Parses a pattern into segments.
    ///
    /// Empty segments are ignored, so `/items/` and `/items` are the same
    /// pattern.
    pub fn parse_pattern(pattern: &str) -> Result<Vec<(String, SegmentKind)>, RouteError> {
        let raw: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());

        for (i, s) in raw.iter().enumerate() {
            let kind = if let Some(inner) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if let Some(name) = inner.strip_prefix('*') {
                    SegmentKind::Wildcard(name.to_string())
                } else {
                    SegmentKind::Param(inner.to_string())
                }
            } else if let Some(name) = s.strip_prefix('*') {
                SegmentKind::Wildcard(name.to_string())
            } else if s.contains('{') || s.contains('}') {
                return Err(RouteError::invalid(pattern, format!("malformed segment '{s}'")));
            } else {
                SegmentKind::Static
            };

            match &kind {
                SegmentKind::Param(name) | SegmentKind::Wildcard(name) if name.is_empty() => {
                    return Err(RouteError::invalid(pattern, "empty parameter name"));
                }
                SegmentKind::Wildcard(_) if i + 1 != raw.len() => {
                    return Err(RouteError::invalid(
                        pattern,
                        "wildcard must be the last segment",
                    ));
                }
                _ => {}
            }

            segments.push(((*s).to_string(), kind));
        }

        Ok(segments)
    }

    /// Walks (and grows) the tree to the node for `segments`.
    ///
    /// Two patterns that put differently named parameters at the same
    /// position would bind under the wrong name, so that is rejected.
    pub fn node_for(
        &mut self,
        pattern: &str,
        segments: &[(String, SegmentKind)],
    ) -> Result<&mut Self, RouteError> {
        let Some(((segment, kind), remaining)) = segments.split_first() else {
            return Ok(self);
        };

        let child = match kind {
            SegmentKind::Static => {
                let idx = match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(segment))
                {
                    Ok(idx) => idx,
                    Err(idx) => {
                        self.static_children
                            .insert(idx, Node::new(segment.clone(), SegmentKind::Static));
                        idx
                    }
                };
                &mut self.static_children[idx]
            }
            SegmentKind::Param(name) => {
                let child = self
                    .param_child
                    .get_or_insert_with(|| Box::new(Node::new(segment.clone(), kind.clone())));
                if child.kind != *kind {
                    return Err(RouteError::invalid(
                        pattern,
                        format!("parameter '{name}' conflicts with existing '{}'", child.segment),
                    ));
                }
                child.as_mut()
            }
            SegmentKind::Wildcard(name) => {
                let child = self
                    .wildcard_child
                    .get_or_insert_with(|| Box::new(Node::new(segment.clone(), kind.clone())));
                if child.kind != *kind {
                    return Err(RouteError::invalid(
                        pattern,
                        format!("wildcard '{name}' conflicts with existing '{}'", child.segment),
                    ));
                }
                child.as_mut()
            }
        };

        child.node_for(pattern, remaining)
    }

    /// Finds the first node (by precedence) that matches `segments` and
    /// satisfies `accept`.
    ///
    /// Precedence per segment is static, then named, then wildcard. A branch
    /// that fails deeper down is abandoned and its bindings are removed.
    pub fn find<'a, F>(
        &'a self,
        segments: &[&str],
        params: &mut Params,
        accept: &F,
    ) -> Option<&'a MethodRouter<T>>
    where
        F: Fn(&MethodRouter<T>) -> bool,
    {
        let Some((segment, remaining)) = segments.split_first() else {
            return accept(&self.methods).then_some(&self.methods);
        };

        if let Some(child) = self.find_static_child(segment) {
            if let Some(found) = child.find(remaining, params, accept) {
                return Some(found);
            }
        }

        if let Some(child) = &self.param_child {
            if let SegmentKind::Param(name) = &child.kind {
                let mark = params.len();
                params.push(name.clone(), decode_segment(segment));
                if let Some(found) = child.find(remaining, params, accept) {
                    return Some(found);
                }
                params.truncate(mark);
            }
        }

        if let Some(child) = &self.wildcard_child {
            if let SegmentKind::Wildcard(name) = &child.kind {
                if accept(&child.methods) {
                    params.push(name.clone(), decode_segment(&segments.join("/")));
                    return Some(&child.methods);
                }
            }
        }

        None
    }

    fn find_static_child(&self, segment: &str) -> Option<&Self> {
        self.static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
            .ok()
            .map(|i| &self.static_children[i])
    }
}
