//! # gram
//!
//! A toolkit for building custom lexers and grammar-driven parsers from
//! composable rule combinators, producing a typed parse tree.
//!
//! Grammar and Rules
//!
//!     Grammars are declared at runtime against a [`RuleCollection`]:
//!     terminal rules carry regex patterns, named rules are recursive
//!     placeholders bound exactly once, and any rule combines with
//!     `and` / `or` / `repeat` / `one_or_more` / `optional`. Declaration
//!     order of terminals is semantic: the lexer resolves overlapping
//!     matches by that order, never by match length.
//!
//!     Left-recursive grammars are first-class: a rule like
//!     `expr := expr '-' num | num` parses a chain of operators into
//!     left-associative nesting via seed-and-grow elimination, with no
//!     recursion depth growth in input size.
//!
//! Matching
//!
//!     The engine is a trampolined virtual machine: an explicit stack of
//!     matchers plus a double-ended work queue of pending nodes stand in for
//!     the host call stack, so arbitrarily deep or cyclic grammars and
//!     partial input cannot overflow or block. Input arrives through an
//!     incremental lexer that merges every terminal pattern into one
//!     composite alternation and makes exactly as much progress as the
//!     buffered text allows.
//!
//!     Lexical and syntax errors are data, not failures: they are collected
//!     into the [`ParserResult`] while matching continues (error skipping)
//!     or stops (strict mode).
//!
//! Entry points
//!
//!     - [`RuleCollection::parser`] for synchronous, whole-input parsing.
//!     - [`RuleCollection::stream_parser`] for chunked input with
//!       [`ParseSink`] notifications.
//!     - [`RuleCollection::lexer`] / [`RuleCollection::stream_lexer`] for
//!       tokenization without a grammar.
//!     - [`bnf`] for compiling compact pattern strings like
//!       `( $0 | $1 )+ $2` into combinator expressions.

pub mod ast;
pub mod bnf;
pub mod lexer;
pub mod location;
mod matcher;
pub mod parser;
pub mod rule;

pub use ast::{AstArena, AstId, AstKind, AstNode};
pub use bnf::bnf;
pub use lexer::{LexEvent, LexOutput, Lexer, StreamLexer};
pub use location::{Pos, PositionTracker, Token};
pub use parser::{NullSink, ParseSink, Parser, ParserResult, StreamParser};
pub use rule::{GrammarError, Named, Rule, RuleCollection, RuleId, TerminalOptions};
