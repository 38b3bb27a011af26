//! Parse-tree node model.
//!
//! Nodes live in an [`AstArena`] and are addressed by [`AstId`] handles.
//! Ownership flows strictly parent→children through the child id lists;
//! parent links are non-owning back-indices used for in-place node surgery
//! during error recovery and left-recursion growth.
//!
//! There are two leaf kinds (a matched terminal and the synthetic end-of-input
//! marker) and four composite kinds (a named nonterminal, zero-or-more,
//! one-or-more, optional). A composite's parent is assigned exactly once, when
//! the composite that contains it is built; leaf parents may be rebound,
//! because leaves get physically detached and reattached when the parser
//! replays a recursion seed or skips past malformed input.

use crate::location::Token;
use crate::rule::RuleId;

/// Opaque parse-tree node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AstId(usize);

impl AstId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw arena index.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// The closed set of node kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstKind {
    /// Synthetic end-of-input marker.
    End,
    /// A matched terminal span, tagged with the terminal rule that produced it.
    Terminal { token: Token, rule: RuleId },
    /// A named nonterminal, tagged with its rule.
    Named { rule: RuleId, children: Vec<AstId> },
    /// Zero-or-more repetition (`*`).
    Repeat { children: Vec<AstId> },
    /// One-or-more repetition (`+`).
    More { children: Vec<AstId> },
    /// Optional match (`?`); empty when the sub-rule did not match.
    Optional { children: Vec<AstId> },
}

/// A single tree node: its kind plus the non-owning parent back-reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstNode {
    kind: AstKind,
    parent: Option<AstId>,
}

impl AstNode {
    pub fn kind(&self) -> &AstKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<AstId> {
        self.parent
    }

    /// Child ids in order; empty for leaves and the end marker.
    pub fn children(&self) -> &[AstId] {
        match &self.kind {
            AstKind::End | AstKind::Terminal { .. } => &[],
            AstKind::Named { children, .. }
            | AstKind::Repeat { children }
            | AstKind::More { children }
            | AstKind::Optional { children } => children,
        }
    }

    /// The matched token, for terminal leaves.
    pub fn token(&self) -> Option<&Token> {
        match &self.kind {
            AstKind::Terminal { token, .. } => Some(token),
            _ => None,
        }
    }

    /// The producing terminal rule, for terminal leaves.
    pub fn terminal_rule(&self) -> Option<RuleId> {
        match &self.kind {
            AstKind::Terminal { rule, .. } => Some(*rule),
            _ => None,
        }
    }

    /// The named rule, for named nonterminal nodes.
    pub fn named_rule(&self) -> Option<RuleId> {
        match &self.kind {
            AstKind::Named { rule, .. } => Some(*rule),
            _ => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self.kind, AstKind::End)
    }

    fn is_leaf(&self) -> bool {
        matches!(self.kind, AstKind::End | AstKind::Terminal { .. })
    }
}

/// Arena owning every node produced during one parse.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AstArena {
    nodes: Vec<AstNode>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: AstId) -> &AstNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn alloc_end(&mut self) -> AstId {
        self.alloc(AstKind::End)
    }

    pub(crate) fn alloc_terminal(&mut self, token: Token, rule: RuleId) -> AstId {
        self.alloc(AstKind::Terminal { token, rule })
    }

    pub(crate) fn alloc_named(&mut self, rule: RuleId, children: Vec<AstId>) -> AstId {
        self.alloc_composite(AstKind::Named { rule, children })
    }

    pub(crate) fn alloc_repeat(&mut self, children: Vec<AstId>) -> AstId {
        self.alloc_composite(AstKind::Repeat { children })
    }

    pub(crate) fn alloc_more(&mut self, children: Vec<AstId>) -> AstId {
        self.alloc_composite(AstKind::More { children })
    }

    pub(crate) fn alloc_optional(&mut self, children: Vec<AstId>) -> AstId {
        self.alloc_composite(AstKind::Optional { children })
    }

    fn alloc(&mut self, kind: AstKind) -> AstId {
        let id = AstId::new(self.nodes.len());
        self.nodes.push(AstNode { kind, parent: None });
        id
    }

    fn alloc_composite(&mut self, kind: AstKind) -> AstId {
        let children: Vec<AstId> = match &kind {
            AstKind::Named { children, .. }
            | AstKind::Repeat { children }
            | AstKind::More { children }
            | AstKind::Optional { children } => children.clone(),
            AstKind::End | AstKind::Terminal { .. } => {
                unreachable!("leaf kinds are not composites")
            }
        };
        let id = self.alloc(kind);
        for child in children {
            self.bind_parent(child, id);
        }
        id
    }

    /// Assigns `parent` as `child`'s parent. Composite parents assign once;
    /// a second assignment means the engine tried to share a subtree, which
    /// no valid grammar can cause.
    fn bind_parent(&mut self, child: AstId, parent: AstId) {
        let node = &mut self.nodes[child.index()];
        if node.parent.is_some() && !node.is_leaf() {
            unreachable!("composite node attached to a second parent");
        }
        node.parent = Some(parent);
    }

    /// Replaces `old` with `new` in `old`'s parent's child list; `new`
    /// inherits the parent slot and `old` is detached.
    ///
    /// Panics if `old` has no parent: only attached nodes can be replaced.
    pub fn replace(&mut self, old: AstId, new: AstId) {
        let parent = self.nodes[old.index()]
            .parent
            .expect("replace requires a node that currently has a parent");

        let parent_node = &mut self.nodes[parent.index()];
        let children = match &mut parent_node.kind {
            AstKind::Named { children, .. }
            | AstKind::Repeat { children }
            | AstKind::More { children }
            | AstKind::Optional { children } => children,
            AstKind::End | AstKind::Terminal { .. } => {
                unreachable!("a leaf cannot be a parent")
            }
        };
        let slot = children
            .iter()
            .position(|&c| c == old)
            .expect("parent's child list must contain the replaced node");
        children[slot] = new;

        self.nodes[new.index()].parent = Some(parent);
        self.nodes[old.index()].parent = None;
    }

    /// Ordered terminal leaves under `id`: a leaf yields itself, composites
    /// yield their descendants left to right, the end marker yields nothing.
    ///
    /// Uses an explicit stack; trees from deeply recursive grammars can be
    /// deeper than the host call stack allows.
    pub fn flatten_terminals(&self, id: AstId) -> Vec<AstId> {
        let mut result = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let node = self.node(current);
            match &node.kind {
                AstKind::Terminal { .. } => result.push(current),
                AstKind::End => {}
                _ => pending.extend(node.children().iter().rev().copied()),
            }
        }
        result
    }
}
