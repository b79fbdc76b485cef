//! Segment trie — the path half of routing.
//!
//! The tree is an arena: every [`Node`] lives in one `Vec` and refers to its
//! parent and children by [`NodeId`]. Sub-routers keep a `NodeId` into the
//! same arena instead of owning a subtree, so a registration made through any
//! router lands in the one tree dispatch walks.
//!
//! Both directions share the same path normalization:
//!
//! - the path must be non-empty and start with `/`,
//! - anything from the first `?` on is ignored,
//! - empty segments (`//`, trailing `/`) are skipped, so `/` and `//` are the root,
//! - literal segments are compared lowercased.

use tracing::warn;

use super::RouterError;
use super::route::Route;
use crate::context::Parameters;

/// Handle to a node in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a node's segment matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Literal text, stored lowercased and compared case-insensitively.
    Static,
    /// `{name}` — matches any single non-empty segment and binds it to `name`.
    Parameter,
}

/// One segment of the trie together with the routes registered at it.
#[derive(Debug)]
pub struct Node {
    segment: String,
    kind: SegmentKind,
    // Bookkeeping only: used to rebuild patterns and find enclosing mounts.
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    routes: Vec<Route>,
}

impl Node {
    fn new(segment: String, kind: SegmentKind, parent: Option<NodeId>) -> Self {
        Self {
            segment,
            kind,
            parent,
            children: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// The lowercased literal for static nodes, the parameter name otherwise.
    /// Empty for the root.
    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub(crate) fn push_route(&mut self, route: Route) -> &mut Route {
        self.routes.push(route);
        let last = self.routes.len() - 1;
        &mut self.routes[last]
    }
}

/// Arena-backed segment trie.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

// Never empty: the root is created with the tree.
#[allow(clippy::len_without_is_empty)]
impl Tree {
    /// Create a tree holding only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(String::new(), SegmentKind::Static, None)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Total number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Locate or create the node for `pattern`, relative to `from`.
    ///
    /// Existing children are reused when their (segment, kind) pair matches,
    /// so registering the same pattern twice returns the same node. A parent
    /// holds at most one parameter child: a later `{other}` at the same
    /// position reuses the first parameter node and keeps its name.
    ///
    /// # Errors
    ///
    /// [`RouterError::InvalidPattern`] when `pattern` is empty or does not
    /// start with `/`. Nothing is created in that case.
    pub fn insert(&mut self, from: NodeId, pattern: &str) -> Result<NodeId, RouterError> {
        let segments = segments(pattern).ok_or_else(|| RouterError::InvalidPattern {
            pattern: pattern.to_owned(),
        })?;

        let mut current = from;
        for raw in segments {
            let (kind, value) = classify(raw);
            current = match self.child_for_insert(current, kind, &value) {
                Some(existing) => existing,
                None => self.push_child(current, kind, value),
            };
        }
        Ok(current)
    }

    /// Match `path` against the subtree under `from`, binding parameters into
    /// `params`.
    ///
    /// At each level the children are tried in insertion order and the first
    /// structural match is taken; there is no backtracking, so a miss further
    /// down aborts the whole match. Parameter values are bound lowercased.
    pub fn find(&self, from: NodeId, path: &str, params: &mut Parameters) -> Option<NodeId> {
        let mut current = from;
        for raw in segments(path)? {
            let segment = raw.to_lowercase();
            let next = self.nodes[current.0].children.iter().copied().find(|&child| {
                let node = &self.nodes[child.0];
                match node.kind {
                    SegmentKind::Parameter => true,
                    SegmentKind::Static => node.segment == segment,
                }
            })?;

            let node = &self.nodes[next.0];
            if node.kind == SegmentKind::Parameter {
                params.insert(node.segment.clone(), segment);
            }
            current = next;
        }
        Some(current)
    }

    /// Rebuild the normalized pattern leading to `id`, e.g. `/users/{id}`.
    pub fn pattern_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.nodes[current.0];
            if node.parent.is_some() {
                parts.push(match node.kind {
                    SegmentKind::Static => node.segment.clone(),
                    SegmentKind::Parameter => format!("{{{}}}", node.segment),
                });
            }
            cursor = node.parent;
        }

        if parts.is_empty() {
            return "/".to_owned();
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// `id` followed by each of its ancestors up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |current| self.nodes[current.0].parent)
    }

    /// Depth-first walk in child insertion order, starting at the root.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    fn child_for_insert(&self, parent: NodeId, kind: SegmentKind, value: &str) -> Option<NodeId> {
        let children = &self.nodes[parent.0].children;
        match kind {
            SegmentKind::Static => children.iter().copied().find(|&child| {
                let node = &self.nodes[child.0];
                node.kind == SegmentKind::Static && node.segment == value
            }),
            SegmentKind::Parameter => {
                let existing = children
                    .iter()
                    .copied()
                    .find(|&child| self.nodes[child.0].kind == SegmentKind::Parameter)?;
                let name = &self.nodes[existing.0].segment;
                if name != value {
                    warn!(
                        existing = %name,
                        ignored = %value,
                        "parameter already declared at this position; keeping the first name"
                    );
                }
                Some(existing)
            }
        }
    }

    fn push_child(&mut self, parent: NodeId, kind: SegmentKind, value: String) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(value, kind, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }
}

/// Split a pattern or path into its non-empty segments, or `None` if it is
/// not a valid absolute path.
fn segments(pattern: &str) -> Option<impl Iterator<Item = &str>> {
    if !pattern.starts_with('/') {
        return None;
    }
    let path = pattern.split_once('?').map_or(pattern, |(path, _)| path);
    Some(path.split('/').filter(|segment| !segment.is_empty()))
}

fn classify(segment: &str) -> (SegmentKind, String) {
    match segment
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(name) => (SegmentKind::Parameter, name.to_owned()),
        None => (SegmentKind::Static, segment.to_lowercase()),
    }
}
