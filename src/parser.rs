//! Parser drivers: the explicit-stack matching loop.
//!
//! The driver owns a stack of matchers (top = active frame) seeded with the
//! root rule sequenced with the end-of-input rule, and a double-ended queue
//! of pending tree nodes fed from lexer output. Each round offers the front
//! node to the top matcher and folds finished frames into their parents:
//! recursive descent run on an explicit stack, so grammar depth never
//! touches the host call stack and matching can suspend mid-construct while
//! streaming.
//!
//! Syntax errors are data: with error skipping enabled the driver records
//! the offending node, breaks the most recently built structure back into
//! its leaf tokens so consumed input is not lost, and restarts matching from
//! the grammar root against the remaining queue.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::ast::{AstArena, AstId, AstNode};
use crate::lexer::{LexEvent, StreamLexer};
use crate::location::Token;
use crate::matcher::{GrammarCtx, MatchOutcome, Matcher};
use crate::rule::{GrammarError, RuleArena, RuleId, RuleKind};

/// Callbacks for streaming parse notifications. All methods default to
/// no-ops; implement the ones you care about. Delivery is synchronous and
/// in source order, on the caller's thread.
pub trait ParseSink {
    /// A run of input no terminal rule could match.
    fn on_lex_error(&mut self, _result: &ParserResult) {}
    /// An ignore-flagged terminal matched.
    fn on_ignored(&mut self, _result: &ParserResult) {}
    /// The grammar matched the full input.
    fn on_success(&mut self, _result: &ParserResult) {}
    /// The grammar rejected the input (error skipping disabled).
    fn on_fail(&mut self, _result: &ParserResult) {}
    /// All input was processed.
    fn on_end(&mut self, _result: &ParserResult) {}
}

/// Sink that discards every notification.
pub struct NullSink;

impl ParseSink for NullSink {}

/// Outcome of one parse: the tree (present on success) plus everything
/// collected along the way. Owns the node arena the ids point into.
#[derive(Debug, Default)]
pub struct ParserResult {
    arena: AstArena,
    /// Root of the parse tree; `None` means the grammar rejected the input.
    pub tree: Option<AstId>,
    /// Leaves for tokens matched by ignore-flagged terminals.
    pub ignored: Vec<AstId>,
    /// Nodes that did not fit the grammar.
    pub error_nodes: Vec<AstId>,
    /// Token runs that did not fit any terminal rule.
    pub error_tokens: Vec<Token>,
}

impl ParserResult {
    pub fn is_success(&self) -> bool {
        self.tree.is_some()
    }

    pub fn arena(&self) -> &AstArena {
        &self.arena
    }

    pub fn node(&self, id: AstId) -> &AstNode {
        self.arena.node(id)
    }

    /// The token of a terminal leaf.
    pub fn token(&self, id: AstId) -> Option<&Token> {
        self.arena.node(id).token()
    }

    /// Ordered terminal leaves under `id`.
    pub fn flatten_terminals(&self, id: AstId) -> Vec<AstId> {
        self.arena.flatten_terminals(id)
    }

    /// Concatenated source text of the leaves under `id`.
    pub fn text(&self, id: AstId) -> String {
        self.arena
            .flatten_terminals(id)
            .iter()
            .filter_map(|&leaf| self.arena.node(leaf).token())
            .map(|t| t.content.as_str())
            .collect()
    }
}

/// Streaming parser: feed input in arbitrary chunks, receive notifications
/// through a [`ParseSink`], collect the final [`ParserResult`] from
/// [`end`](Self::end). Call [`reset`](Self::reset) between independent
/// inputs.
pub struct StreamParser {
    rules: Rc<RefCell<RuleArena>>,
    left_recursion_cache: std::collections::HashMap<RuleId, bool>,
    /// The user root sequenced with the end-of-input rule.
    root: RuleId,
    lexer: StreamLexer,
    stack: Vec<Matcher>,
    queue: VecDeque<AstId>,
    result: ParserResult,
    skip_errors: bool,
    failed: bool,
    finished: bool,
}

impl StreamParser {
    pub(crate) fn new(
        rules: Rc<RefCell<RuleArena>>,
        user_root: RuleId,
    ) -> Result<Self, GrammarError> {
        let left_recursion_cache = rules.borrow().resolve(user_root)?;

        let root = {
            let mut arena = rules.borrow_mut();
            let end = arena.alloc(RuleKind::End);
            arena.alloc(RuleKind::Seq(vec![user_root, end]))
        };

        let lexer = StreamLexer::new(&rules.borrow())?;

        let mut parser = Self {
            rules,
            left_recursion_cache,
            root,
            lexer,
            stack: Vec::new(),
            queue: VecDeque::new(),
            result: ParserResult::default(),
            skip_errors: true,
            failed: false,
            finished: false,
        };
        parser.push_root_matcher();
        Ok(parser)
    }

    /// Reinitializes queue, stack, lexer and accumulated result. Passing
    /// `Some(flag)` overrides the error-skip policy, `None` preserves it.
    pub fn reset(&mut self, skip_errors: Option<bool>) {
        if let Some(skip) = skip_errors {
            self.skip_errors = skip;
        }
        self.lexer.reset();
        self.queue.clear();
        self.stack.clear();
        self.result = ParserResult::default();
        self.failed = false;
        self.finished = false;
        self.push_root_matcher();
    }

    /// Feeds one chunk and makes every step of progress it allows.
    pub fn feed(&mut self, chunk: &str, sink: &mut dyn ParseSink) {
        if self.finished {
            return;
        }
        let events = self.lexer.feed(chunk);
        self.dispatch(events, sink);
    }

    /// Marks the input complete, drains everything still pending and returns
    /// the accumulated result.
    pub fn end(&mut self, sink: &mut dyn ParseSink) -> ParserResult {
        if !self.finished {
            let events = self.lexer.finish();
            self.dispatch(events, sink);
        }
        self.finished = true;
        sink.on_end(&self.result);
        std::mem::take(&mut self.result)
    }

    fn push_root_matcher(&mut self) {
        let rules = self.rules.borrow();
        let ctx = GrammarCtx {
            rules: &rules,
            left_recursion_cache: &self.left_recursion_cache,
        };
        self.stack.push(Matcher::for_rule(self.root, &ctx));
    }

    fn dispatch(&mut self, events: Vec<LexEvent>, sink: &mut dyn ParseSink) {
        for event in events {
            match event {
                LexEvent::Token { token, rule } => {
                    let id = self.result.arena.alloc_terminal(token, rule);
                    self.queue.push_back(id);
                    self.pump(sink);
                }
                LexEvent::Ignored { token, rule } => {
                    let id = self.result.arena.alloc_terminal(token, rule);
                    self.result.ignored.push(id);
                    sink.on_ignored(&self.result);
                }
                LexEvent::Error { token } => {
                    self.result.error_tokens.push(token);
                    sink.on_lex_error(&self.result);
                }
                LexEvent::End => {
                    let id = self.result.arena.alloc_end();
                    self.queue.push_back(id);
                    self.pump(sink);
                }
            }
        }
    }

    /// Runs the main loop until the queue runs dry or the parse concludes.
    fn pump(&mut self, sink: &mut dyn ParseSink) {
        if self.failed || self.finished {
            return;
        }

        while let Some(node) = self.queue.pop_front() {
            match self.offer(node) {
                MatchOutcome::Continue { .. } => {
                    // A fresh matcher is on top; the nodes to re-offer are
                    // already back at the queue front.
                }
                MatchOutcome::Success { nodes, retry } => {
                    self.result.tree = nodes.first().copied();
                    // Trailing material the grammar never consumed.
                    self.result.error_nodes.extend(retry);
                    self.finished = true;
                    sink.on_success(&self.result);
                    return;
                }
                MatchOutcome::Fail { mut retry } => {
                    if let Some(offender) = retry.pop() {
                        self.result.error_nodes.push(offender);
                    }
                    if !self.skip_errors {
                        self.failed = true;
                        sink.on_fail(&self.result);
                        return;
                    }
                    // Error skip: dissolve the last built structure into its
                    // leaves so already-consumed tokens are re-offered, then
                    // restart from the grammar root.
                    if let Some(last) = retry.pop() {
                        retry.extend(self.result.arena.flatten_terminals(last));
                    }
                    for node in retry.into_iter().rev() {
                        self.queue.push_front(node);
                    }
                    self.push_root_matcher();
                }
            }
        }
    }

    /// Offers one node to the matcher stack and folds finished frames into
    /// their parents until the stack settles or empties. A returned
    /// success/fail is final for the whole parse.
    fn offer(&mut self, node: AstId) -> MatchOutcome {
        let rules = self.rules.borrow();
        let ctx = GrammarCtx {
            rules: &rules,
            left_recursion_cache: &self.left_recursion_cache,
        };
        let mut pushes: Vec<RuleId> = Vec::new();

        let left_recursion = self.leftmost_expansion();
        let top = self
            .stack
            .last_mut()
            .expect("matcher stack never empties while input is pending");
        let mut outcome = top.attempt(node, &mut pushes, &self.result.arena, left_recursion);

        loop {
            for rule in pushes.drain(..) {
                self.stack.push(Matcher::for_rule(rule, &ctx));
            }
            match outcome {
                MatchOutcome::Continue { retry } => {
                    for pending in retry.into_iter().rev() {
                        self.queue.push_front(pending);
                    }
                    return MatchOutcome::Continue { retry: Vec::new() };
                }
                MatchOutcome::Success { .. } | MatchOutcome::Fail { .. } => {
                    self.stack.pop();
                    match self.stack.last_mut() {
                        None => return outcome,
                        Some(parent) => {
                            outcome = parent.on_child_result(
                                outcome,
                                &mut pushes,
                                &mut self.result.arena,
                            );
                        }
                    }
                }
            }
        }
    }

    /// Is the named matcher on top of the stack expanding leftward? Walk
    /// downward: meeting the same named rule first means yes; meeting a
    /// sequence past its first element first means the recursion consumed
    /// input and is safe.
    fn leftmost_expansion(&self) -> bool {
        let mut frames = self.stack.iter().rev();
        let top_rule = match frames.next() {
            Some(Matcher::Named(named)) => named.rule,
            _ => return false,
        };
        for frame in frames {
            match frame {
                Matcher::Named(named) if named.rule == top_rule => return true,
                Matcher::Seq(seq) if seq.past_first() => return false,
                _ => {}
            }
        }
        false
    }
}

/// Synchronous parser over complete inputs; a thin wrapper that runs the
/// streaming driver to completion.
pub struct Parser {
    stream: StreamParser,
}

impl Parser {
    pub(crate) fn new(
        rules: Rc<RefCell<RuleArena>>,
        user_root: RuleId,
    ) -> Result<Self, GrammarError> {
        Ok(Self {
            stream: StreamParser::new(rules, user_root)?,
        })
    }

    /// Parses `text`. With `skip_errors` the driver resynchronizes after
    /// syntax errors and keeps matching; without it the first syntax error
    /// ends the parse with no tree. Collected errors are reported either
    /// way.
    pub fn parse(&mut self, text: &str, skip_errors: bool) -> ParserResult {
        self.stream.reset(Some(skip_errors));
        let mut sink = NullSink;
        self.stream.feed(text, &mut sink);
        self.stream.end(&mut sink)
    }
}
