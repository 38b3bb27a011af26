//! Grammar rule algebra and the rule collection.
//!
//! Rules are immutable descriptions forming a (possibly cyclic) grammar
//! graph. They live in an arena owned by a [`RuleCollection`]; user-facing
//! [`Rule`] values are cheap cloneable handles into that arena, and every
//! combinator call (`and`, `or`, `repeat`, `one_or_more`, `optional`)
//! allocates a new rule into the same arena. Cycles are expressed through
//! [`Named`] rules, whose body is a definition slot bound exactly once via
//! [`Named::define`]. This is how a grammar refers to itself without
//! recursive value types.
//!
//! Grammar construction errors ([`GrammarError`]) are programmer mistakes
//! and fail the construction call immediately. They are disjoint from
//! input-data outcomes, which the parser always reports as data.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use regex::Regex;
use serde_json::{json, Value};

use crate::lexer::{Lexer, StreamLexer};
use crate::parser::{Parser, StreamParser};

/// Opaque rule identifier; stable for the lifetime of its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(usize);

impl RuleId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

/// Errors raised while constructing a grammar. All of them are programmer
/// mistakes and are fatal to the construction call that triggered them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// A terminal pattern matches the empty string and would never consume
    /// input.
    EmptyMatch { pattern: String },
    /// A pattern failed to compile, on its own or merged into the composite
    /// lexer alternation.
    Pattern { message: String },
    /// `define` was called twice on the same named rule.
    AlreadyDefined { name: String },
    /// A named rule reachable from the parser root was never defined.
    NotDefined { name: String },
    /// The chosen root was not created through this collection.
    UnknownRoot,
    /// The collection holds no terminal rules, so no lexer can be built.
    NoTerminals,
    /// A template grammar pattern failed to parse or referenced a missing
    /// rule slot.
    Syntax { message: String },
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::EmptyMatch { pattern } => {
                write!(f, "terminal pattern /{}/ matches the empty string", pattern)
            }
            GrammarError::Pattern { message } => write!(f, "invalid pattern: {}", message),
            GrammarError::AlreadyDefined { name } => {
                write!(f, "named rule '{}' is already defined", name)
            }
            GrammarError::NotDefined { name } => {
                write!(f, "named rule '{}' is used before being defined", name)
            }
            GrammarError::UnknownRoot => {
                write!(f, "root rule was not created through this collection")
            }
            GrammarError::NoTerminals => {
                write!(f, "collection has no terminal rules to lex with")
            }
            GrammarError::Syntax { message } => {
                write!(f, "template grammar error: {}", message)
            }
        }
    }
}

impl std::error::Error for GrammarError {}

/// Configuration for a terminal rule.
///
/// `pattern` is a regex unless `literal` is set, in which case the text is
/// matched verbatim (metacharacters escaped). Ignored terminals are lexed
/// and reported but never offered to the grammar. `name` labels the rule in
/// descriptions and error messages.
#[derive(Debug, Clone, Default)]
pub struct TerminalOptions {
    pub pattern: String,
    pub literal: bool,
    pub ignore: bool,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct TerminalDef {
    pub pattern: String,
    pub ignore: bool,
    pub name: Option<String>,
}

/// The closed set of rule kinds.
#[derive(Debug, Clone)]
pub(crate) enum RuleKind {
    Terminal(TerminalDef),
    /// Matches only the synthetic end-of-input marker; created internally
    /// when a parser is built.
    End,
    Named {
        name: String,
        body: Option<RuleId>,
    },
    Seq(Vec<RuleId>),
    Choice(Vec<RuleId>),
    Repeat(RuleId),
    OneOrMore(RuleId),
    Optional(RuleId),
}

/// Arena storage for every rule of one collection.
#[derive(Debug, Default)]
pub(crate) struct RuleArena {
    kinds: Vec<RuleKind>,
    /// Terminal rules in declaration order; this order is the lexer's
    /// tie-break contract.
    terminals: Vec<RuleId>,
    /// Rules created through the collection surface (terminals and named
    /// rules); parser roots must come from this set.
    registered: Vec<RuleId>,
}

impl RuleArena {
    pub(crate) fn alloc(&mut self, kind: RuleKind) -> RuleId {
        let id = RuleId::new(self.kinds.len());
        self.kinds.push(kind);
        id
    }

    pub(crate) fn kind(&self, id: RuleId) -> &RuleKind {
        &self.kinds[id.index()]
    }

    pub(crate) fn terminals(&self) -> &[RuleId] {
        &self.terminals
    }

    pub(crate) fn terminal_def(&self, id: RuleId) -> &TerminalDef {
        match self.kind(id) {
            RuleKind::Terminal(def) => def,
            _ => unreachable!("rule is not a terminal"),
        }
    }

    pub(crate) fn named_body(&self, id: RuleId) -> Option<RuleId> {
        match self.kind(id) {
            RuleKind::Named { body, .. } => *body,
            _ => unreachable!("rule is not a named rule"),
        }
    }

    /// Walks the grammar reachable from `root`, verifies every named rule it
    /// meets is defined, and computes the may-be-left-recursive cache for
    /// each of them.
    pub(crate) fn resolve(&self, root: RuleId) -> Result<HashMap<RuleId, bool>, GrammarError> {
        let mut pending = vec![root];
        let mut seen = HashSet::new();
        let mut named = Vec::new();

        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            match self.kind(id) {
                RuleKind::Terminal(_) | RuleKind::End => {}
                RuleKind::Named { name, body } => {
                    let body = body.ok_or_else(|| GrammarError::NotDefined {
                        name: name.clone(),
                    })?;
                    named.push((id, body));
                    pending.push(body);
                }
                RuleKind::Seq(rules) | RuleKind::Choice(rules) => pending.extend(rules),
                RuleKind::Repeat(rule) | RuleKind::OneOrMore(rule) | RuleKind::Optional(rule) => {
                    pending.push(*rule)
                }
            }
        }

        let mut cache = HashMap::new();
        for (id, body) in named {
            let mut visited = HashSet::new();
            cache.insert(id, self.leftward(body, id, &mut visited));
        }
        Ok(cache)
    }

    /// True when `target` is reachable from `id` along a leftmost path:
    /// directly, through the first element of a sequence, through any branch
    /// of a choice, through a quantifier body, or through another named rule.
    /// The visited set keeps mutual recursion that never reaches `target`
    /// from looping.
    fn leftward(&self, id: RuleId, target: RuleId, visited: &mut HashSet<RuleId>) -> bool {
        match self.kind(id) {
            RuleKind::Terminal(_) | RuleKind::End => false,
            RuleKind::Named { body, .. } => {
                if id == target {
                    return true;
                }
                if !visited.insert(id) {
                    return false;
                }
                body.map_or(false, |body| self.leftward(body, target, visited))
            }
            RuleKind::Seq(rules) => self.leftward(rules[0], target, visited),
            RuleKind::Choice(rules) => rules
                .iter()
                .any(|&rule| self.leftward(rule, target, visited)),
            RuleKind::Repeat(rule) | RuleKind::OneOrMore(rule) | RuleKind::Optional(rule) => {
                self.leftward(*rule, target, visited)
            }
        }
    }

    /// JSON description of a rule. Nested named rules are referenced by name
    /// only, which keeps cyclic grammars printable.
    pub(crate) fn describe(&self, id: RuleId, expand_named: bool) -> Value {
        match self.kind(id) {
            RuleKind::Terminal(def) => json!({
                "kind": "terminal",
                "pattern": def.pattern,
                "ignore": def.ignore,
                "name": def.name,
            }),
            RuleKind::End => json!({ "kind": "end" }),
            RuleKind::Named { name, body } => match body {
                Some(body) if expand_named => json!({
                    "kind": "named",
                    "name": name,
                    "rule": self.describe(*body, false),
                }),
                _ => json!({ "kind": "named", "name": name }),
            },
            RuleKind::Seq(rules) => json!({
                "kind": "seq",
                "rules": rules.iter().map(|&r| self.describe(r, false)).collect::<Vec<_>>(),
            }),
            RuleKind::Choice(rules) => json!({
                "kind": "choice",
                "rules": rules.iter().map(|&r| self.describe(r, false)).collect::<Vec<_>>(),
            }),
            RuleKind::Repeat(rule) => json!({
                "kind": "repeat",
                "rule": self.describe(*rule, false),
            }),
            RuleKind::OneOrMore(rule) => json!({
                "kind": "one_or_more",
                "rule": self.describe(*rule, false),
            }),
            RuleKind::Optional(rule) => json!({
                "kind": "optional",
                "rule": self.describe(*rule, false),
            }),
        }
    }
}

type SharedArena = Rc<RefCell<RuleArena>>;

/// A handle to one rule in a collection's arena. Cloning is cheap; clones
/// refer to the same rule.
#[derive(Clone)]
pub struct Rule {
    id: RuleId,
    arena: SharedArena,
}

impl Rule {
    fn new(id: RuleId, arena: SharedArena) -> Self {
        Self { id, arena }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    fn assert_same_collection(&self, other: &Rule) {
        if !Rc::ptr_eq(&self.arena, &other.arena) {
            panic!("rules from different collections cannot be combined");
        }
    }

    /// New rule matching this rule followed by `other`. Nested sequences
    /// flatten, so `a.and(&b).and(&c)` is one three-element sequence.
    pub fn and(&self, other: &Rule) -> Rule {
        self.assert_same_collection(other);
        let mut arena = self.arena.borrow_mut();
        let mut rules = match arena.kind(self.id) {
            RuleKind::Seq(rules) => rules.clone(),
            _ => vec![self.id],
        };
        match arena.kind(other.id) {
            RuleKind::Seq(others) => rules.extend(others),
            _ => rules.push(other.id),
        }
        let id = arena.alloc(RuleKind::Seq(rules));
        drop(arena);
        Rule::new(id, Rc::clone(&self.arena))
    }

    /// New rule matching this rule or, failing that, `other`. Alternatives
    /// are tried in declaration order and the first success wins. Nested
    /// choices flatten.
    pub fn or(&self, other: &Rule) -> Rule {
        self.assert_same_collection(other);
        let mut arena = self.arena.borrow_mut();
        let mut rules = match arena.kind(self.id) {
            RuleKind::Choice(rules) => rules.clone(),
            _ => vec![self.id],
        };
        match arena.kind(other.id) {
            RuleKind::Choice(others) => rules.extend(others),
            _ => rules.push(other.id),
        }
        let id = arena.alloc(RuleKind::Choice(rules));
        drop(arena);
        Rule::new(id, Rc::clone(&self.arena))
    }

    /// New rule matching this rule zero or more times (`*`).
    pub fn repeat(&self) -> Rule {
        let id = self.arena.borrow_mut().alloc(RuleKind::Repeat(self.id));
        Rule::new(id, Rc::clone(&self.arena))
    }

    /// New rule matching this rule one or more times (`+`).
    pub fn one_or_more(&self) -> Rule {
        let id = self.arena.borrow_mut().alloc(RuleKind::OneOrMore(self.id));
        Rule::new(id, Rc::clone(&self.arena))
    }

    /// New rule matching this rule zero or one time (`?`).
    pub fn optional(&self) -> Rule {
        let id = self.arena.borrow_mut().alloc(RuleKind::Optional(self.id));
        Rule::new(id, Rc::clone(&self.arena))
    }

    /// JSON description of this rule; recursive references print by name.
    pub fn describe(&self) -> Value {
        self.arena.borrow().describe(self.id, true)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("id", &self.id).finish()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// A named (recursive placeholder) rule: a grammar symbol whose body is
/// bound exactly once via [`define`](Self::define), after which the rule can
/// be used anywhere, including inside its own body.
#[derive(Clone)]
pub struct Named {
    rule: Rule,
}

impl Named {
    pub fn id(&self) -> RuleId {
        self.rule.id
    }

    /// Binds the body. Binding twice is an error; parsing an unbound named
    /// rule is an error at parser construction.
    pub fn define(&self, body: &Rule) -> Result<(), GrammarError> {
        self.rule.assert_same_collection(body);
        let mut arena = self.rule.arena.borrow_mut();
        let body_id = body.id;
        match &mut arena.kinds[self.rule.id.index()] {
            RuleKind::Named { name, body } => {
                if body.is_some() {
                    return Err(GrammarError::AlreadyDefined { name: name.clone() });
                }
                *body = Some(body_id);
                Ok(())
            }
            _ => unreachable!("named handle points at a non-named rule"),
        }
    }

    /// Binds the body from a template grammar pattern; see [`crate::bnf`].
    pub fn define_bnf(&self, pattern: &str, rules: &[Rule]) -> Result<(), GrammarError> {
        let body = crate::bnf::bnf(pattern, rules)?;
        self.define(&body)
    }
}

impl std::ops::Deref for Named {
    type Target = Rule;

    fn deref(&self) -> &Rule {
        &self.rule
    }
}

impl fmt::Debug for Named {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Named").field("id", &self.rule.id).finish()
    }
}

/// Accumulates every terminal and named rule of one grammar and hands out
/// parsers and lexers over them.
///
/// Terminal declaration order is semantic: the lexer resolves overlapping
/// matches by that order, not by match length.
#[derive(Default)]
pub struct RuleCollection {
    arena: SharedArena,
}

impl RuleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a terminal rule from full options.
    pub fn terminal(&self, options: TerminalOptions) -> Result<Rule, GrammarError> {
        let pattern = if options.literal {
            regex::escape(&options.pattern)
        } else {
            options.pattern
        };

        let compiled = Regex::new(&pattern).map_err(|e| GrammarError::Pattern {
            message: e.to_string(),
        })?;
        if compiled.is_match("") {
            return Err(GrammarError::EmptyMatch { pattern });
        }

        let mut arena = self.arena.borrow_mut();
        let id = arena.alloc(RuleKind::Terminal(TerminalDef {
            pattern,
            ignore: options.ignore,
            name: options.name,
        }));
        arena.terminals.push(id);
        arena.registered.push(id);
        drop(arena);
        Ok(Rule::new(id, Rc::clone(&self.arena)))
    }

    /// Declares a terminal matching `text` verbatim.
    pub fn literal(&self, text: &str) -> Result<Rule, GrammarError> {
        self.terminal(TerminalOptions {
            pattern: text.to_string(),
            literal: true,
            ..TerminalOptions::default()
        })
    }

    /// Declares a terminal matching a regex pattern.
    pub fn pattern(&self, pattern: &str) -> Result<Rule, GrammarError> {
        self.terminal(TerminalOptions {
            pattern: pattern.to_string(),
            ..TerminalOptions::default()
        })
    }

    /// Declares a named rule; its body must be bound later with
    /// [`Named::define`] before a parser over it is built.
    pub fn named(&self, name: &str) -> Named {
        let mut arena = self.arena.borrow_mut();
        let id = arena.alloc(RuleKind::Named {
            name: name.to_string(),
            body: None,
        });
        arena.registered.push(id);
        drop(arena);
        Named {
            rule: Rule::new(id, Rc::clone(&self.arena)),
        }
    }

    fn check_root(&self, root: &Named) -> Result<(), GrammarError> {
        let registered = Rc::ptr_eq(&self.arena, &root.rule.arena)
            && self.arena.borrow().registered.contains(&root.id());
        if registered {
            Ok(())
        } else {
            Err(GrammarError::UnknownRoot)
        }
    }

    /// Builds a synchronous parser with `root` as the grammar root.
    pub fn parser(&self, root: &Named) -> Result<Parser, GrammarError> {
        self.check_root(root)?;
        Parser::new(Rc::clone(&self.arena), root.id())
    }

    /// Builds a streaming parser with `root` as the grammar root.
    pub fn stream_parser(&self, root: &Named) -> Result<StreamParser, GrammarError> {
        self.check_root(root)?;
        StreamParser::new(Rc::clone(&self.arena), root.id())
    }

    /// Builds a synchronous lexer over this collection's terminals.
    pub fn lexer(&self) -> Result<Lexer, GrammarError> {
        Ok(Lexer::new(self.stream_lexer()?))
    }

    /// Builds a streaming lexer over this collection's terminals.
    pub fn stream_lexer(&self) -> Result<StreamLexer, GrammarError> {
        StreamLexer::new(&self.arena.borrow())
    }

    /// JSON description of every registered rule, in declaration order.
    pub fn describe(&self) -> Value {
        let arena = self.arena.borrow();
        let rules: Vec<Value> = arena
            .registered
            .iter()
            .map(|&id| arena.describe(id, true))
            .collect();
        json!({ "rules": rules })
    }
}

impl fmt::Display for RuleCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matching_terminal_is_rejected() {
        let collection = RuleCollection::new();
        assert!(matches!(
            collection.pattern("a*"),
            Err(GrammarError::EmptyMatch { .. })
        ));
        assert!(matches!(
            collection.pattern("x?"),
            Err(GrammarError::EmptyMatch { .. })
        ));
        assert!(matches!(
            collection.pattern(""),
            Err(GrammarError::EmptyMatch { .. })
        ));
        assert!(collection.pattern("a+").is_ok());
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let collection = RuleCollection::new();
        assert!(matches!(
            collection.pattern("(unclosed"),
            Err(GrammarError::Pattern { .. })
        ));
    }

    #[test]
    fn test_literal_escapes_metacharacters() {
        let collection = RuleCollection::new();
        let rule = collection.literal("+").unwrap();
        let def_pattern = {
            let arena = collection.arena.borrow();
            arena.terminal_def(rule.id()).pattern.clone()
        };
        assert_eq!(def_pattern, regex::escape("+"));
    }

    #[test]
    fn test_define_twice_fails() {
        let collection = RuleCollection::new();
        let num = collection.pattern("[0-9]+").unwrap();
        let expr = collection.named("expr");
        expr.define(&num).unwrap();
        assert!(matches!(
            expr.define(&num),
            Err(GrammarError::AlreadyDefined { .. })
        ));
    }

    #[test]
    fn test_parser_requires_defined_root() {
        let collection = RuleCollection::new();
        let _num = collection.pattern("[0-9]+").unwrap();
        let expr = collection.named("expr");
        assert!(matches!(
            collection.parser(&expr),
            Err(GrammarError::NotDefined { .. })
        ));
    }

    #[test]
    fn test_parser_rejects_foreign_root() {
        let collection = RuleCollection::new();
        let _num = collection.pattern("[0-9]+").unwrap();

        let other = RuleCollection::new();
        let num = other.pattern("[0-9]+").unwrap();
        let root = other.named("root");
        root.define(&num).unwrap();

        assert!(matches!(
            collection.parser(&root),
            Err(GrammarError::UnknownRoot)
        ));
    }

    #[test]
    #[should_panic(expected = "different collections")]
    fn test_cross_collection_combination_panics() {
        let a = RuleCollection::new().pattern("a").unwrap();
        let b = RuleCollection::new().pattern("b").unwrap();
        let _ = a.and(&b);
    }

    #[test]
    fn test_and_or_flatten() {
        let collection = RuleCollection::new();
        let a = collection.pattern("a").unwrap();
        let b = collection.pattern("b").unwrap();
        let c = collection.pattern("c").unwrap();

        let seq = a.and(&b).and(&c);
        let arena = collection.arena.borrow();
        match arena.kind(seq.id()) {
            RuleKind::Seq(rules) => assert_eq!(rules.len(), 3),
            other => panic!("expected a sequence, got {:?}", other),
        }

        drop(arena);
        let choice = a.or(&b).or(&c);
        let arena = collection.arena.borrow();
        match arena.kind(choice.id()) {
            RuleKind::Choice(rules) => assert_eq!(rules.len(), 3),
            other => panic!("expected a choice, got {:?}", other),
        }
    }

    #[test]
    fn test_left_recursion_detected_through_choice_and_seq_head() {
        let collection = RuleCollection::new();
        let num = collection.pattern("[0-9]+").unwrap();
        let minus = collection.literal("-").unwrap();
        let expr = collection.named("expr");
        // expr := expr '-' num | num
        expr.define(&expr.and(&minus).and(&num).or(&num)).unwrap();

        let arena = collection.arena.borrow();
        let cache = arena.resolve(expr.id()).unwrap();
        assert_eq!(cache.get(&expr.id()), Some(&true));
    }

    #[test]
    fn test_recursion_in_tail_position_is_not_leftward() {
        let collection = RuleCollection::new();
        let num = collection.pattern("[0-9]+").unwrap();
        let minus = collection.literal("-").unwrap();
        let expr = collection.named("expr");
        // expr := num '-' expr | num
        expr.define(&num.and(&minus).and(&expr).or(&num)).unwrap();

        let arena = collection.arena.borrow();
        let cache = arena.resolve(expr.id()).unwrap();
        assert_eq!(cache.get(&expr.id()), Some(&false));
    }

    #[test]
    fn test_left_recursion_detected_through_another_named_rule() {
        let collection = RuleCollection::new();
        let num = collection.pattern("[0-9]+").unwrap();
        let a = collection.named("a");
        let b = collection.named("b");
        a.define(&b.or(&num)).unwrap();
        b.define(&a.and(&num)).unwrap();

        let arena = collection.arena.borrow();
        let cache = arena.resolve(a.id()).unwrap();
        assert_eq!(cache.get(&a.id()), Some(&true));
        assert_eq!(cache.get(&b.id()), Some(&true));
    }

    #[test]
    fn test_mutual_recursion_analysis_terminates() {
        let collection = RuleCollection::new();
        let num = collection.pattern("[0-9]+").unwrap();
        let a = collection.named("a");
        let b = collection.named("b");
        let c = collection.named("c");
        // b and c cycle between themselves without touching a; the analysis
        // must walk into the cycle and still come back.
        a.define(&b.and(&num)).unwrap();
        b.define(&c.or(&num)).unwrap();
        c.define(&b.and(&num)).unwrap();

        let arena = collection.arena.borrow();
        let cache = arena.resolve(a.id()).unwrap();
        assert_eq!(cache.get(&a.id()), Some(&false));
    }

    #[test]
    fn test_describe_handles_cycles() {
        let collection = RuleCollection::new();
        let num = collection
            .terminal(TerminalOptions {
                pattern: "[0-9]+".to_string(),
                name: Some("num".to_string()),
                ..TerminalOptions::default()
            })
            .unwrap();
        let expr = collection.named("expr");
        expr.define(&expr.and(&num).or(&num)).unwrap();

        let description = expr.describe();
        // The nested self-reference must print by name only.
        assert_eq!(
            description["rule"]["rules"][0]["rules"][0],
            json!({ "kind": "named", "name": "expr" })
        );
    }
}
