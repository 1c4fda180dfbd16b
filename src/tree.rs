//! Arena-backed syntax tree
//!
//! The whole tree is owned by a single `SyntaxTree` arena; nodes address each
//! other through `NodeId` indices. The parent link is a stored index used for
//! lookup only, never an ownership edge. The engine reads the tree and never
//! mutates it.

use crate::span::{Location, Span};
use std::fmt;

/// Handle to a node inside a [`SyntaxTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Node type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Method call: children are `[receiver?, selector, args.., block?]`
    Call,
    /// Selector of a call (the method name)
    Selector,
    /// Plain identifier / local variable
    Ident,
    /// Constant reference (capitalized)
    Const,
    /// Symbol literal (`:message`)
    Sym,
    /// String literal
    Str,
    /// Integer literal
    Int,
    /// Hash literal: children are `Pair` nodes
    Hash,
    /// Key/value pair inside a hash
    Pair,
    /// Braced block attached to a call: children are `[params, body..]`
    Block,
    /// Block parameter list (may span zero bytes when absent)
    Params,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Call => "call",
            NodeKind::Selector => "selector",
            NodeKind::Ident => "ident",
            NodeKind::Const => "const",
            NodeKind::Sym => "sym",
            NodeKind::Str => "str",
            NodeKind::Int => "int",
            NodeKind::Hash => "hash",
            NodeKind::Pair => "pair",
            NodeKind::Block => "block",
            NodeKind::Params => "params",
        };
        write!(f, "{}", name)
    }
}

/// One node in the arena
#[derive(Debug, Clone)]
pub struct SyntaxNode {
    /// Type tag
    pub kind: NodeKind,
    /// Identifier, selector or literal text, where applicable
    pub value: Option<String>,
    /// Source range covered by this node
    pub span: Span,
    /// Parent node (lookup-only relation)
    pub parent: Option<NodeId>,
    /// Children in document order
    pub children: Vec<NodeId>,
}

/// The arena owning every node of one parsed input unit
#[derive(Debug, Clone, Default)]
pub struct SyntaxTree {
    source: String,
    nodes: Vec<SyntaxNode>,
    roots: Vec<NodeId>,
}

impl SyntaxTree {
    /// Create an empty tree over the given source text
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// The source text this tree was parsed from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Borrow a node
    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.0]
    }

    /// Parent of a node, if any
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Children of a node in document order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Top-level nodes in document order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the arena holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Slice the source text covered by a span
    pub fn text(&self, span: Span) -> &str {
        &self.source[span.start..span.end]
    }

    /// Source text covered by a node
    pub fn node_text(&self, id: NodeId) -> &str {
        self.text(self.node(id).span)
    }

    /// Human-facing position of a node
    pub fn location(&self, id: NodeId) -> Location {
        Location::of_offset(&self.source, self.node(id).span.start)
    }

    /// Depth-first preorder iteration over every node
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            stack.extend(self.children(id).iter().rev());
            Some(id)
        })
    }

    /// Append a node; used by the parser and by tree builders in tests
    pub fn push(&mut self, kind: NodeKind, value: Option<String>, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SyntaxNode {
            kind,
            value,
            span,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Widen or correct a node's span; used by the parser once a call's
    /// trailing components are known
    pub fn set_span(&mut self, id: NodeId, span: Span) {
        self.nodes[id.0].span = span;
    }

    /// Attach a child to a parent, recording the back-reference
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Mark a node as a top-level statement
    pub fn add_root(&mut self, id: NodeId) {
        self.roots.push(id);
    }

    // Call-shape helpers. A call's children follow the document-order layout
    // `[receiver?, selector, args.., block?]`.

    /// Selector child of a call node
    pub fn call_selector(&self, id: NodeId) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.node(*c).kind == NodeKind::Selector)
    }

    /// Selector name of a call node
    pub fn selector_name(&self, id: NodeId) -> Option<&str> {
        let sel = self.call_selector(id)?;
        self.node(sel).value.as_deref()
    }

    /// Receiver child of a call node (the child preceding the selector)
    pub fn call_receiver(&self, id: NodeId) -> Option<NodeId> {
        let sel = self.call_selector(id)?;
        let children = self.children(id);
        let sel_pos = children.iter().position(|c| *c == sel)?;
        if sel_pos > 0 {
            Some(children[0])
        } else {
            None
        }
    }

    /// Argument children of a call node (after the selector, excluding any block)
    pub fn call_args(&self, id: NodeId) -> Vec<NodeId> {
        let Some(sel) = self.call_selector(id) else {
            return Vec::new();
        };
        let children = self.children(id);
        let sel_pos = match children.iter().position(|c| *c == sel) {
            Some(p) => p,
            None => return Vec::new(),
        };
        children[sel_pos + 1..]
            .iter()
            .copied()
            .filter(|c| self.node(*c).kind != NodeKind::Block)
            .collect()
    }

    /// Block child of a call node
    pub fn call_block(&self, id: NodeId) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|c| self.node(*c).kind == NodeKind::Block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_tree() -> (SyntaxTree, NodeId) {
        // obj.stub(:msg)
        let mut tree = SyntaxTree::new("obj.stub(:msg)");
        let call = tree.push(NodeKind::Call, None, Span::new(0, 14));
        let recv = tree.push(NodeKind::Ident, Some("obj".into()), Span::new(0, 3));
        let sel = tree.push(NodeKind::Selector, Some("stub".into()), Span::new(4, 8));
        let arg = tree.push(NodeKind::Sym, Some("msg".into()), Span::new(9, 13));
        tree.attach(call, recv);
        tree.attach(call, sel);
        tree.attach(call, arg);
        tree.add_root(call);
        (tree, call)
    }

    #[test]
    fn test_call_shape_helpers() {
        let (tree, call) = call_tree();
        assert_eq!(tree.selector_name(call), Some("stub"));
        let recv = tree.call_receiver(call).unwrap();
        assert_eq!(tree.node_text(recv), "obj");
        let args = tree.call_args(call);
        assert_eq!(args.len(), 1);
        assert_eq!(tree.node_text(args[0]), ":msg");
        assert!(tree.call_block(call).is_none());
    }

    #[test]
    fn test_parent_is_lookup_only() {
        let (tree, call) = call_tree();
        let recv = tree.call_receiver(call).unwrap();
        assert_eq!(tree.parent(recv), Some(call));
        assert_eq!(tree.parent(call), None);
    }

    #[test]
    fn test_preorder_iteration() {
        let (tree, call) = call_tree();
        let order: Vec<NodeId> = tree.iter().collect();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], call);
        // Children follow their parent in document order.
        let texts: Vec<&str> = order[1..].iter().map(|id| tree.node_text(*id)).collect();
        assert_eq!(texts, vec!["obj", "stub", ":msg"]);
    }

    #[test]
    fn test_receiverless_call() {
        // expect(obj)
        let mut tree = SyntaxTree::new("expect(obj)");
        let call = tree.push(NodeKind::Call, None, Span::new(0, 11));
        let sel = tree.push(NodeKind::Selector, Some("expect".into()), Span::new(0, 6));
        let arg = tree.push(NodeKind::Ident, Some("obj".into()), Span::new(7, 10));
        tree.attach(call, sel);
        tree.attach(call, arg);
        tree.add_root(call);

        assert!(tree.call_receiver(call).is_none());
        assert_eq!(tree.selector_name(call), Some("expect"));
        assert_eq!(tree.call_args(call).len(), 1);
    }
}
