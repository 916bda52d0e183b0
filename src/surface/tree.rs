//! Arena-backed surface tree
//!
//! Hosts that render content themselves mirror their rendered structure into
//! a [`SurfaceTree`] and hand out [`NodeId`]s instead of live node references.

use serde::{Deserialize, Serialize};

use super::{NodeId, Surface, TextLeaf};

/// A node of a rendered surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceNode {
    /// Structural node, contributes no characters
    Element { tag: String, children: Vec<NodeId> },
    /// Text-bearing leaf
    Text(String),
}

/// Index-based tree of rendered nodes
///
/// Children appended to a text node, or to an id that does not exist, stay
/// detached and never contribute text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceTree {
    nodes: Vec<SurfaceNode>,
    root: Option<NodeId>,
}

impl SurfaceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the root element, replacing any previous root
    pub fn set_root(&mut self, tag: &str) -> NodeId {
        let id = self.push(SurfaceNode::Element {
            tag: tag.to_string(),
            children: Vec::new(),
        });
        self.root = Some(id);
        id
    }

    /// Append an element under `parent`
    pub fn element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.push(SurfaceNode::Element {
            tag: tag.to_string(),
            children: Vec::new(),
        });
        self.attach(parent, id);
        id
    }

    /// Append a text leaf under `parent`
    pub fn text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.push(SurfaceNode::Text(text.to_string()));
        self.attach(parent, id);
        id
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&SurfaceNode> {
        self.nodes.get(id.0)
    }

    fn push(&mut self, node: SurfaceNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(SurfaceNode::Element { children, .. }) = self.nodes.get_mut(parent.0) {
            children.push(child);
        }
    }
}

impl Surface for SurfaceTree {
    fn text_leaves(&self) -> Vec<TextLeaf<'_>> {
        let mut leaves = Vec::new();
        let Some(root) = self.root else {
            return leaves;
        };

        // Depth-first, children pushed in reverse to pop in document order
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match self.node(id) {
                Some(SurfaceNode::Text(text)) => leaves.push(TextLeaf { node: id, text }),
                Some(SurfaceNode::Element { children, .. }) => {
                    stack.extend(children.iter().rev().copied());
                }
                None => {}
            }
        }

        leaves
    }
}
