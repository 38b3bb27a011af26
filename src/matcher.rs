//! Runtime matchers: the per-attempt counterparts of grammar rules.
//!
//! The parser driver emulates recursive descent with an explicit stack of
//! matchers and a two-method handshake instead of host-stack recursion:
//!
//! 1. `attempt(node, ...)` offers the next pending node to the top matcher.
//!    The matcher either finishes (success/fail) or schedules a child rule
//!    through the push list and answers `Continue`.
//! 2. When a child matcher finishes, the driver pops it and folds its result
//!    into the parent with `on_child_result`, which again answers
//!    continue/success/fail.
//!
//! Every outcome carries a `retry` list: nodes the matcher did not consume,
//! to be re-offered to whatever matcher runs next. This is how partially
//! consumed input travels between alternatives, and how the seed node
//! re-enters the grammar during left-recursion growth.
//!
//! Matchers are transient: one instance per stack frame, discarded when the
//! frame is popped, never shared between attempts.

use std::collections::HashMap;

use crate::ast::{AstArena, AstId, AstKind};
use crate::rule::{RuleArena, RuleId, RuleKind};

/// Verdict of one matcher step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MatchOutcome {
    /// This matcher is done; `nodes` is what it produced, `retry` is what it
    /// leaves for others.
    Success {
        nodes: Vec<AstId>,
        retry: Vec<AstId>,
    },
    /// This matcher cannot proceed; `retry` includes the offending nodes.
    Fail { retry: Vec<AstId> },
    /// A child matcher was scheduled; re-offer `retry` to it.
    Continue { retry: Vec<AstId> },
}

/// Read-only grammar context handed to matcher construction.
pub(crate) struct GrammarCtx<'a> {
    pub rules: &'a RuleArena,
    pub left_recursion_cache: &'a HashMap<RuleId, bool>,
}

/// One stack frame of the parsing virtual machine.
#[derive(Debug)]
pub(crate) enum Matcher {
    End,
    Terminal(TerminalMatcher),
    Named(NamedMatcher),
    Seq(SeqMatcher),
    Choice(ChoiceMatcher),
    Repeat(RepeatMatcher),
    More(MoreMatcher),
    Optional(OptionalMatcher),
}

impl Matcher {
    pub(crate) fn for_rule(id: RuleId, ctx: &GrammarCtx) -> Matcher {
        match ctx.rules.kind(id) {
            RuleKind::End => Matcher::End,
            RuleKind::Terminal(_) => Matcher::Terminal(TerminalMatcher { rule: id }),
            RuleKind::Named { .. } => {
                let body = ctx
                    .rules
                    .named_body(id)
                    .expect("named rules are resolved before matching starts");
                Matcher::Named(NamedMatcher {
                    rule: id,
                    body,
                    maybe_left_recursive: ctx
                        .left_recursion_cache
                        .get(&id)
                        .copied()
                        .unwrap_or(false),
                    seed: None,
                })
            }
            RuleKind::Seq(rules) => Matcher::Seq(SeqMatcher {
                rules: rules.clone(),
                next: 0,
                acc: Vec::new(),
            }),
            RuleKind::Choice(rules) => Matcher::Choice(ChoiceMatcher {
                rules: rules.clone(),
                next: 0,
            }),
            RuleKind::Repeat(rule) => Matcher::Repeat(RepeatMatcher {
                rule: *rule,
                acc: Vec::new(),
            }),
            RuleKind::OneOrMore(rule) => Matcher::More(MoreMatcher {
                rule: *rule,
                acc: Vec::new(),
            }),
            RuleKind::Optional(rule) => Matcher::Optional(OptionalMatcher { rule: *rule }),
        }
    }

    /// Offers `node` to this matcher. `left_recursion` is the driver's
    /// answer to "is the current named-rule expansion leftward?", computed
    /// from the stack right before the call.
    pub(crate) fn attempt(
        &mut self,
        node: AstId,
        pushes: &mut Vec<RuleId>,
        arena: &AstArena,
        left_recursion: bool,
    ) -> MatchOutcome {
        match self {
            Matcher::End => {
                if arena.node(node).is_end() {
                    MatchOutcome::Success {
                        nodes: Vec::new(),
                        retry: Vec::new(),
                    }
                } else {
                    MatchOutcome::Fail { retry: vec![node] }
                }
            }
            Matcher::Terminal(m) => m.attempt(node, arena),
            Matcher::Named(m) => m.attempt(node, pushes, arena, left_recursion),
            Matcher::Seq(m) => m.attempt(node, pushes),
            Matcher::Choice(m) => m.attempt(node, pushes),
            Matcher::Repeat(m) => m.attempt(node, pushes),
            Matcher::More(m) => m.attempt(node, pushes),
            Matcher::Optional(m) => m.attempt(node, pushes),
        }
    }

    /// Folds a finished child's result into this matcher's state.
    pub(crate) fn on_child_result(
        &mut self,
        result: MatchOutcome,
        pushes: &mut Vec<RuleId>,
        arena: &mut AstArena,
    ) -> MatchOutcome {
        match self {
            Matcher::End | Matcher::Terminal(_) => {
                unreachable!("leaf matchers never schedule children")
            }
            Matcher::Named(m) => m.on_child_result(result, pushes, arena),
            Matcher::Seq(m) => m.on_child_result(result),
            Matcher::Choice(m) => m.on_child_result(result),
            Matcher::Repeat(m) => m.on_child_result(result, pushes, arena),
            Matcher::More(m) => m.on_child_result(result, pushes, arena),
            Matcher::Optional(m) => m.on_child_result(result, arena),
        }
    }
}

#[derive(Debug)]
pub(crate) struct TerminalMatcher {
    pub(crate) rule: RuleId,
}

impl TerminalMatcher {
    fn attempt(&self, node: AstId, arena: &AstArena) -> MatchOutcome {
        if arena.node(node).terminal_rule() == Some(self.rule) {
            MatchOutcome::Success {
                nodes: vec![node],
                retry: Vec::new(),
            }
        } else {
            MatchOutcome::Fail { retry: vec![node] }
        }
    }
}

#[derive(Debug)]
pub(crate) struct NamedMatcher {
    pub(crate) rule: RuleId,
    body: RuleId,
    maybe_left_recursive: bool,
    /// Last successfully grown node during left-recursion elimination.
    seed: Option<AstId>,
}

impl NamedMatcher {
    fn attempt(
        &mut self,
        node: AstId,
        pushes: &mut Vec<RuleId>,
        arena: &AstArena,
        left_recursion: bool,
    ) -> MatchOutcome {
        // A node of this rule's own type re-enters as a single unit; this is
        // what lets a grown seed (or recovered subtree) be consumed whole.
        if arena.node(node).named_rule() == Some(self.rule) {
            return MatchOutcome::Success {
                nodes: vec![node],
                retry: Vec::new(),
            };
        }

        if self.maybe_left_recursive && left_recursion {
            // Expanding the body here would recurse leftward forever.
            return MatchOutcome::Fail { retry: vec![node] };
        }

        pushes.push(self.body);
        MatchOutcome::Continue { retry: vec![node] }
    }

    fn on_child_result(
        &mut self,
        result: MatchOutcome,
        pushes: &mut Vec<RuleId>,
        arena: &mut AstArena,
    ) -> MatchOutcome {
        match result {
            MatchOutcome::Success { nodes, retry } => {
                let quantified = nodes
                    .first()
                    .map_or(false, |&id| matches!(arena.node(id).kind(), AstKind::More { .. }));
                let built = arena.alloc_named(self.rule, nodes);

                if self.maybe_left_recursive && !quantified {
                    // Seed-and-grow: feed the freshly built node back into
                    // the body as its new leftmost input.
                    self.seed = Some(built);
                    pushes.push(self.body);
                    let mut requeue = vec![built];
                    requeue.extend(retry);
                    MatchOutcome::Continue { retry: requeue }
                } else {
                    MatchOutcome::Success {
                        nodes: vec![built],
                        retry,
                    }
                }
            }
            MatchOutcome::Fail { mut retry } => match self.seed.take() {
                Some(seed) => {
                    // The grow attempt failed; drop the re-offered seed from
                    // the retry list and settle for the last grown parse.
                    if !retry.is_empty() {
                        retry.remove(0);
                    }
                    MatchOutcome::Success {
                        nodes: vec![seed],
                        retry,
                    }
                }
                None => MatchOutcome::Fail { retry },
            },
            MatchOutcome::Continue { .. } => {
                unreachable!("children finish with success or fail")
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct SeqMatcher {
    rules: Vec<RuleId>,
    /// Sub-rules pushed so far.
    next: usize,
    acc: Vec<AstId>,
}

impl SeqMatcher {
    /// True once this sequence has moved past its first sub-rule; recursion
    /// reached through a later element is not leftmost.
    pub(crate) fn past_first(&self) -> bool {
        self.next > 1
    }

    fn attempt(&mut self, node: AstId, pushes: &mut Vec<RuleId>) -> MatchOutcome {
        let rule = match self.rules.get(self.next) {
            Some(&rule) => rule,
            None => unreachable!("sequence advanced past its last sub-rule"),
        };
        self.next += 1;
        pushes.push(rule);
        MatchOutcome::Continue { retry: vec![node] }
    }

    fn on_child_result(&mut self, result: MatchOutcome) -> MatchOutcome {
        match result {
            MatchOutcome::Success { nodes, retry } => {
                if self.next == self.rules.len() {
                    let mut all = std::mem::take(&mut self.acc);
                    all.extend(nodes);
                    MatchOutcome::Success { nodes: all, retry }
                } else {
                    self.acc.extend(nodes);
                    MatchOutcome::Continue { retry }
                }
            }
            MatchOutcome::Fail { retry } => {
                // Re-offer the already consumed prefix to whatever runs next.
                let mut all = std::mem::take(&mut self.acc);
                all.extend(retry);
                MatchOutcome::Fail { retry: all }
            }
            MatchOutcome::Continue { .. } => {
                unreachable!("children finish with success or fail")
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct ChoiceMatcher {
    rules: Vec<RuleId>,
    next: usize,
}

impl ChoiceMatcher {
    fn attempt(&mut self, node: AstId, pushes: &mut Vec<RuleId>) -> MatchOutcome {
        let rule = match self.rules.get(self.next) {
            Some(&rule) => rule,
            None => unreachable!("choice advanced past its last alternative"),
        };
        self.next += 1;
        pushes.push(rule);
        MatchOutcome::Continue { retry: vec![node] }
    }

    fn on_child_result(&mut self, result: MatchOutcome) -> MatchOutcome {
        let is_last = self.next == self.rules.len();
        match result {
            MatchOutcome::Fail { retry } if !is_last => {
                // Try the next alternative with the same input.
                MatchOutcome::Continue { retry }
            }
            MatchOutcome::Success { .. } | MatchOutcome::Fail { .. } => result,
            MatchOutcome::Continue { .. } => {
                unreachable!("children finish with success or fail")
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct RepeatMatcher {
    rule: RuleId,
    acc: Vec<AstId>,
}

impl RepeatMatcher {
    fn attempt(&mut self, node: AstId, pushes: &mut Vec<RuleId>) -> MatchOutcome {
        pushes.push(self.rule);
        MatchOutcome::Continue { retry: vec![node] }
    }

    fn on_child_result(
        &mut self,
        result: MatchOutcome,
        pushes: &mut Vec<RuleId>,
        arena: &mut AstArena,
    ) -> MatchOutcome {
        match result {
            MatchOutcome::Success { nodes, retry } => {
                self.acc.extend(nodes);
                pushes.push(self.rule);
                MatchOutcome::Continue { retry }
            }
            MatchOutcome::Fail { retry } => {
                // Zero or more: running out of matches is still success.
                let children = std::mem::take(&mut self.acc);
                MatchOutcome::Success {
                    nodes: vec![arena.alloc_repeat(children)],
                    retry,
                }
            }
            MatchOutcome::Continue { .. } => {
                unreachable!("children finish with success or fail")
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct MoreMatcher {
    rule: RuleId,
    acc: Vec<AstId>,
}

impl MoreMatcher {
    fn attempt(&mut self, node: AstId, pushes: &mut Vec<RuleId>) -> MatchOutcome {
        pushes.push(self.rule);
        MatchOutcome::Continue { retry: vec![node] }
    }

    fn on_child_result(
        &mut self,
        result: MatchOutcome,
        pushes: &mut Vec<RuleId>,
        arena: &mut AstArena,
    ) -> MatchOutcome {
        match result {
            MatchOutcome::Success { nodes, retry } => {
                self.acc.extend(nodes);
                pushes.push(self.rule);
                MatchOutcome::Continue { retry }
            }
            MatchOutcome::Fail { retry } => {
                if self.acc.len() <= 1 {
                    // Not enough repetitions; hand everything back.
                    let mut all = std::mem::take(&mut self.acc);
                    all.extend(retry);
                    return MatchOutcome::Fail { retry: all };
                }
                let children = std::mem::take(&mut self.acc);
                MatchOutcome::Success {
                    nodes: vec![arena.alloc_more(children)],
                    retry,
                }
            }
            MatchOutcome::Continue { .. } => {
                unreachable!("children finish with success or fail")
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct OptionalMatcher {
    rule: RuleId,
}

impl OptionalMatcher {
    fn attempt(&mut self, node: AstId, pushes: &mut Vec<RuleId>) -> MatchOutcome {
        pushes.push(self.rule);
        MatchOutcome::Continue { retry: vec![node] }
    }

    fn on_child_result(&mut self, result: MatchOutcome, arena: &mut AstArena) -> MatchOutcome {
        match result {
            MatchOutcome::Success { nodes, retry } => MatchOutcome::Success {
                nodes: vec![arena.alloc_optional(nodes)],
                retry,
            },
            MatchOutcome::Fail { retry } => MatchOutcome::Success {
                nodes: vec![arena.alloc_optional(Vec::new())],
                retry,
            },
            MatchOutcome::Continue { .. } => {
                unreachable!("children finish with success or fail")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Pos, Token};
    use crate::rule::RuleCollection;

    fn token(content: &str) -> Token {
        Token {
            content: content.to_string(),
            start: Pos::new(0, 0),
            end: Pos::new(0, content.len()),
        }
    }

    #[test]
    fn test_terminal_matcher_checks_producing_rule() {
        let collection = RuleCollection::new();
        let a = collection.pattern("a").unwrap();
        let b = collection.pattern("b").unwrap();

        let mut arena = AstArena::new();
        let leaf = arena.alloc_terminal(token("a"), a.id());

        let mut matcher = TerminalMatcher { rule: a.id() };
        assert!(matches!(
            matcher.attempt(leaf, &arena),
            MatchOutcome::Success { .. }
        ));

        let mut matcher = TerminalMatcher { rule: b.id() };
        match matcher.attempt(leaf, &arena) {
            MatchOutcome::Fail { retry } => assert_eq!(retry, vec![leaf]),
            other => panic!("expected fail, got {:?}", other),
        }
    }

    #[test]
    fn test_end_matcher_accepts_only_end_marker() {
        let collection = RuleCollection::new();
        let a = collection.pattern("a").unwrap();

        let mut arena = AstArena::new();
        let end = arena.alloc_end();
        let leaf = arena.alloc_terminal(token("a"), a.id());

        let mut pushes = Vec::new();
        let mut matcher = Matcher::End;
        assert!(matches!(
            matcher.attempt(end, &mut pushes, &arena, false),
            MatchOutcome::Success { .. }
        ));
        assert!(matches!(
            matcher.attempt(leaf, &mut pushes, &arena, false),
            MatchOutcome::Fail { .. }
        ));
        assert!(pushes.is_empty());
    }
}
