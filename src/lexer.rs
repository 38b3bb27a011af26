//! Incremental, pattern-merging lexer.
//!
//! All terminal rules of a collection are merged into one composite
//! alternation `(p_0)|(p_1)|...|(p_n)`, compiled once. Each sub-pattern's
//! numeric back-references are renumbered to account for the capture groups
//! contributed by the alternatives before it, and octal-style escapes that
//! point past a sub-pattern's own group count resolve to literal characters.
//! The top-level group index of every alternative is recorded so a match can
//! be traced back to the rule that produced it.
//!
//! Ambiguity between rules is resolved by declaration order: the first
//! alternative that participates in the match wins, never the longest match.
//! The regex engine's leftmost-first alternation semantics carry this
//! contract directly.
//!
//! The lexer is incremental: it owns a growing buffer, makes all progress
//! possible on every [`feed`](StreamLexer::feed), and suspends when the
//! remainder of the buffer might still be extended by future input. Input
//! that can never match is reported as lexical-error tokens, not failures.

use regex::Regex;

use crate::location::{PositionTracker, Token};
use crate::rule::{GrammarError, RuleArena, RuleId};

/// One classified lexer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexEvent {
    /// A terminal matched; offered to the grammar.
    Token { token: Token, rule: RuleId },
    /// A terminal with the ignore flag matched; reported but never offered.
    Ignored { token: Token, rule: RuleId },
    /// A run of input no terminal can match.
    Error { token: Token },
    /// End of the final input.
    End,
}

/// Streaming lexer over a collection's terminals.
pub struct StreamLexer {
    regex: Regex,
    /// Terminal id and ignore flag, in declaration order.
    rules: Vec<(RuleId, bool)>,
    /// Top-level capture group index of each alternative, same order.
    group_indexes: Vec<usize>,
    tracker: PositionTracker,
    buffer: String,
}

impl StreamLexer {
    pub(crate) fn new(arena: &RuleArena) -> Result<Self, GrammarError> {
        if arena.terminals().is_empty() {
            return Err(GrammarError::NoTerminals);
        }

        let mut parts = Vec::new();
        let mut rules = Vec::new();
        let mut group_indexes = Vec::new();
        let mut total_groups = 0;

        for (i, &id) in arena.terminals().iter().enumerate() {
            let def = arena.terminal_def(id);
            let own_groups = count_capture_groups(&def.pattern);
            // Groups before this alternative, plus one wrapping group per
            // preceding alternative, plus this alternative's own wrapper.
            let offset = total_groups + i + 1;
            parts.push(renumber_refs(&def.pattern, own_groups, offset));
            group_indexes.push(offset);
            rules.push((id, def.ignore));
            total_groups += own_groups;
        }

        let merged = parts
            .iter()
            .map(|p| format!("({})", p))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&merged).map_err(|e| GrammarError::Pattern {
            message: e.to_string(),
        })?;

        Ok(Self {
            regex,
            rules,
            group_indexes,
            tracker: PositionTracker::new(),
            buffer: String::new(),
        })
    }

    /// Appends a chunk and returns every event decidable with the input so
    /// far.
    pub fn feed(&mut self, chunk: &str) -> Vec<LexEvent> {
        self.drain(chunk, false)
    }

    /// Marks the input final, drains the buffer to the end and resets for
    /// the next independent input. The returned events always close with
    /// [`LexEvent::End`].
    pub fn finish(&mut self) -> Vec<LexEvent> {
        let events = self.drain("", true);
        self.reset();
        events
    }

    /// Clears buffer and position counters.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.tracker.reset();
    }

    fn drain(&mut self, chunk: &str, is_final: bool) -> Vec<LexEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        loop {
            let found = self.regex.captures(&self.buffer).map(|caps| {
                let m = caps.get(0).expect("whole-match group is always present");
                let winner = self
                    .group_indexes
                    .iter()
                    .position(|&gi| caps.get(gi).is_some());
                (m.start(), m.end() - m.start(), winner)
            });

            let Some((start, len, winner)) = found else {
                // Nothing matches. Wait for more input, or flush the rest as
                // one lexical error and end.
                if !is_final {
                    break;
                }
                if !self.buffer.is_empty() {
                    let rest = std::mem::take(&mut self.buffer);
                    events.push(LexEvent::Error {
                        token: self.tracker.advance(&rest),
                    });
                }
                events.push(LexEvent::End);
                break;
            };

            if start > 0 {
                // The scanned span is longer than the matched content: the
                // unmatched prefix is a lexical error, and the match resumes
                // at the buffer start.
                let head: String = self.buffer.drain(..start).collect();
                events.push(LexEvent::Error {
                    token: self.tracker.advance(&head),
                });
            }

            if !is_final && len == self.buffer.len() {
                // The match swallows the whole remaining buffer; more input
                // might extend it. Suspend until the next feed.
                break;
            }

            let content: String = self.buffer.drain(..len).collect();
            let token = self.tracker.advance(&content);
            let (rule, ignore) = self.rules[winner
                .expect("a composite match always belongs to one alternative")];
            events.push(if ignore {
                LexEvent::Ignored { token, rule }
            } else {
                LexEvent::Token { token, rule }
            });

            if is_final && self.buffer.is_empty() {
                events.push(LexEvent::End);
                break;
            }
        }

        events
    }
}

/// Result of tokenizing one complete input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexOutput {
    pub tokens: Vec<(Token, RuleId)>,
    pub ignored: Vec<(Token, RuleId)>,
    pub errors: Vec<Token>,
}

/// Synchronous facade over [`StreamLexer`] for single-shot inputs.
pub struct Lexer {
    stream: StreamLexer,
}

impl Lexer {
    pub(crate) fn new(stream: StreamLexer) -> Self {
        Self { stream }
    }

    pub fn tokenize(&mut self, text: &str) -> LexOutput {
        let mut output = LexOutput::default();
        let mut events = self.stream.feed(text);
        events.extend(self.stream.finish());
        for event in events {
            match event {
                LexEvent::Token { token, rule } => output.tokens.push((token, rule)),
                LexEvent::Ignored { token, rule } => output.ignored.push((token, rule)),
                LexEvent::Error { token } => output.errors.push(token),
                LexEvent::End => {}
            }
        }
        output
    }
}

/// Counts the capture groups a pattern defines. `(?` groups do not capture,
/// and parentheses inside character classes are literal.
fn count_capture_groups(pattern: &str) -> usize {
    let chars: Vec<char> = pattern.chars().collect();
    let mut count = 0;
    let mut class_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '(' if class_depth == 0 => {
                if chars.get(i + 1) != Some(&'?') {
                    count += 1;
                }
            }
            '[' => class_depth += 1,
            ']' if class_depth > 0 => class_depth -= 1,
            _ => {}
        }
        i += 1;
    }

    count
}

/// Rewrites numeric back-references for a sub-pattern merged at `offset`
/// groups into the composite. References within the pattern's own group
/// count shift by `offset`; larger ones are octal-style escapes and resolve
/// to the literal character they name.
fn renumber_refs(pattern: &str, own_groups: usize, offset: usize) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\\' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let mut run_end = i;
        while run_end < chars.len() && chars[run_end] == '\\' {
            run_end += 1;
        }
        let run = run_end - i;
        let backref_follows = run % 2 == 1
            && chars
                .get(run_end)
                .map_or(false, |c| ('1'..='9').contains(c));

        if !backref_follows {
            for _ in 0..run {
                out.push('\\');
            }
            i = run_end;
            continue;
        }

        // The final backslash of the run escapes the digits.
        for _ in 0..run - 1 {
            out.push('\\');
        }
        let mut digits_end = run_end;
        while digits_end < chars.len() && chars[digits_end].is_ascii_digit() {
            digits_end += 1;
        }
        let digits: String = chars[run_end..digits_end].iter().collect();

        match digits.parse::<usize>() {
            Ok(num) if num <= own_groups => {
                out.push('\\');
                out.push_str(&(num + offset).to_string());
            }
            _ => out.push_str(&resolve_octal(&digits)),
        }
        i = digits_end;
    }

    out
}

/// Resolves the first run of up to three octal digits to its literal
/// character; the remaining digits stay verbatim.
fn resolve_octal(digits: &str) -> String {
    let bytes = digits.as_bytes();
    let Some(start) = bytes.iter().position(|b| (b'0'..=b'7').contains(b)) else {
        return digits.to_string();
    };
    let mut end = start;
    while end < bytes.len() && end - start < 3 && (b'0'..=b'7').contains(&bytes[end]) {
        end += 1;
    }

    let code = u32::from_str_radix(&digits[start..end], 8).unwrap_or(0);
    let literal = char::from_u32(code)
        .map(|c| regex::escape(&c.to_string()))
        .unwrap_or_default();
    format!("{}{}{}", &digits[..start], literal, &digits[end..])
}
