//! Template grammar patterns.
//!
//! [`bnf`] compiles a compact pattern string into a combinator expression
//! over rules you pass in: `$N` references the Nth rule of the slice, `( )`
//! groups, `|` alternates, juxtaposition sequences, and postfix `+ * ?`
//! quantify. Whitespace is insignificant.
//!
//! ```text
//! let operator = bnf("$0 | $1 | $2 | $3", &[add, sub, mul, div])?;
//! expr.define_bnf("$0 $1 $0", &[num, operator])?;
//! ```
//!
//! The pattern language is itself a grammar built with this engine and
//! parsed by it; the module is just another client of the core parser. The
//! pattern parser is constructed lazily, once per thread, and reused for
//! every call.

use std::cell::RefCell;

use once_cell::unsync::Lazy;

use crate::ast::AstId;
use crate::parser::{Parser, ParserResult};
use crate::rule::{GrammarError, Rule, RuleCollection, RuleId, TerminalOptions};

thread_local! {
    static DSL: RefCell<Lazy<DslGrammar>> = RefCell::new(Lazy::new(DslGrammar::build));
}

/// Compiles `pattern` into a combinator expression over `rules`.
///
/// Fails with [`GrammarError::Syntax`] when the pattern does not parse or a
/// `$N` reference falls outside `rules`.
pub fn bnf(pattern: &str, rules: &[Rule]) -> Result<Rule, GrammarError> {
    DSL.with(|cell| {
        let mut guard = cell.borrow_mut();
        let dsl = &mut **guard;
        let result = dsl.parser.parse(pattern, false);
        let tree = result.tree.ok_or_else(|| GrammarError::Syntax {
            message: format!("malformed rule pattern: {:?}", pattern),
        })?;
        dsl.compile(&result, tree, rules)
    })
}

/// The pattern language's own grammar plus the rule ids needed to fold a
/// parse tree back into combinator calls.
struct DslGrammar {
    parser: Parser,
    item: RuleId,
    group: RuleId,
    operator_item: RuleId,
    and_item: RuleId,
    or_item: RuleId,
    slot: RuleId,
    plus: RuleId,
    star: RuleId,
    question: RuleId,
}

impl DslGrammar {
    fn build() -> DslGrammar {
        let collection = RuleCollection::new();
        collection
            .terminal(TerminalOptions {
                pattern: r"\s+".to_string(),
                ignore: true,
                ..TerminalOptions::default()
            })
            .unwrap();
        let slot = collection
            .terminal(TerminalOptions {
                pattern: r"\$[0-9]+".to_string(),
                name: Some("slot".to_string()),
                ..TerminalOptions::default()
            })
            .unwrap();
        let lparen = collection.literal("(").unwrap();
        let rparen = collection.literal(")").unwrap();
        let bar = collection.literal("|").unwrap();
        let plus = collection.literal("+").unwrap();
        let question = collection.literal("?").unwrap();
        let star = collection.literal("*").unwrap();
        let operator = plus.or(&question).or(&star);

        let group = collection.named("group");
        let operator_item = collection.named("operator_item");
        let and_item = collection.named("and_item");
        let or_item = collection.named("or_item");
        let item = collection.named("item");

        group.define(&lparen.and(&item).and(&rparen)).unwrap();
        operator_item.define(&item.and(&operator)).unwrap();
        and_item.define(&item.and(&item)).unwrap();
        or_item.define(&item.and(&bar).and(&item)).unwrap();
        item.define(
            &slot
                .or(&and_item)
                .or(&operator_item)
                .or(&or_item)
                .or(&group),
        )
        .unwrap();

        let parser = collection.parser(&item).unwrap();

        DslGrammar {
            parser,
            item: item.id(),
            group: group.id(),
            operator_item: operator_item.id(),
            and_item: and_item.id(),
            or_item: or_item.id(),
            slot: slot.id(),
            plus: plus.id(),
            star: star.id(),
            question: question.id(),
        }
    }

    /// Folds a pattern parse tree into combinator calls on `rules`.
    fn compile(
        &self,
        result: &ParserResult,
        id: AstId,
        rules: &[Rule],
    ) -> Result<Rule, GrammarError> {
        let node = result.node(id);

        if let Some(rule) = node.named_rule() {
            let children = node.children().to_vec();
            if rule == self.item {
                return self.compile(result, children[0], rules);
            }
            if rule == self.group {
                return self.compile(result, children[1], rules);
            }
            if rule == self.and_item {
                let left = self.compile(result, children[0], rules)?;
                let right = self.compile(result, children[1], rules)?;
                return Ok(left.and(&right));
            }
            if rule == self.or_item {
                let left = self.compile(result, children[0], rules)?;
                let right = self.compile(result, children[2], rules)?;
                return Ok(left.or(&right));
            }
            if rule == self.operator_item {
                let base = self.compile(result, children[0], rules)?;
                let operator = result.node(children[1]).terminal_rule();
                return Ok(if operator == Some(self.plus) {
                    base.one_or_more()
                } else if operator == Some(self.star) {
                    base.repeat()
                } else if operator == Some(self.question) {
                    base.optional()
                } else {
                    unreachable!("operator item holds a non-operator terminal")
                });
            }
            unreachable!("pattern grammar produced an unknown nonterminal");
        }

        if node.terminal_rule() == Some(self.slot) {
            let content = &node.token().expect("slot nodes are terminals").content;
            let index: usize = content[1..].parse().map_err(|_| GrammarError::Syntax {
                message: format!("invalid rule reference {}", content),
            })?;
            return rules.get(index).cloned().ok_or_else(|| GrammarError::Syntax {
                message: format!("rule reference {} is out of range", content),
            });
        }

        unreachable!("pattern grammar produced an unknown node")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleCollection;

    #[test]
    fn test_sequence_pattern() {
        let collection = RuleCollection::new();
        let a = collection.literal("a").unwrap();
        let b = collection.literal("b").unwrap();
        let root = collection.named("root");
        root.define_bnf("$0 $1", &[a, b]).unwrap();

        let mut parser = collection.parser(&root).unwrap();
        assert!(parser.parse("ab", true).is_success());
        assert!(!parser.parse("ba", false).is_success());
    }

    #[test]
    fn test_alternation_pattern() {
        let collection = RuleCollection::new();
        let a = collection.literal("a").unwrap();
        let b = collection.literal("b").unwrap();
        let root = collection.named("root");
        root.define_bnf("$0 | $1", &[a, b]).unwrap();

        let mut parser = collection.parser(&root).unwrap();
        assert!(parser.parse("a", true).is_success());
        assert!(parser.parse("b", true).is_success());
    }

    #[test]
    fn test_grouped_quantifier_pattern() {
        let collection = RuleCollection::new();
        let a = collection.literal("a").unwrap();
        let b = collection.literal("b").unwrap();
        let root = collection.named("root");
        root.define_bnf("( $0 | $1 )+", &[a, b]).unwrap();

        let mut parser = collection.parser(&root).unwrap();
        assert!(parser.parse("abba", true).is_success());
        assert!(!parser.parse("", false).is_success());
    }

    #[test]
    fn test_optional_pattern() {
        let collection = RuleCollection::new();
        let a = collection.literal("a").unwrap();
        let b = collection.literal("b").unwrap();
        let root = collection.named("root");
        root.define_bnf("$0 $1?", &[a, b]).unwrap();

        let mut parser = collection.parser(&root).unwrap();
        assert!(parser.parse("ab", true).is_success());
        assert!(parser.parse("a", true).is_success());
    }

    #[test]
    fn test_malformed_pattern_is_rejected() {
        let collection = RuleCollection::new();
        let a = collection.literal("a").unwrap();
        assert!(matches!(
            bnf("((($0", std::slice::from_ref(&a)),
            Err(GrammarError::Syntax { .. })
        ));
    }

    #[test]
    fn test_out_of_range_reference_is_rejected() {
        let collection = RuleCollection::new();
        let a = collection.literal("a").unwrap();
        assert!(matches!(
            bnf("$0 $5", std::slice::from_ref(&a)),
            Err(GrammarError::Syntax { .. })
        ));
    }
}
