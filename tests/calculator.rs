//! End-to-end tests over a small arithmetic grammar
//!
//! Mirrors the canonical usage of the engine: terminals for numbers and
//! operators, an `expr := num operator num` rule defined through the
//! template pattern language, and evaluation driven by walking the typed
//! parse tree.

use gram::{bnf, Named, ParseSink, Parser, ParserResult, Rule, RuleCollection, TerminalOptions};

struct Arithmetic {
    collection: RuleCollection,
    expr: Named,
}

fn arithmetic() -> Arithmetic {
    let collection = RuleCollection::new();
    collection
        .terminal(TerminalOptions {
            pattern: r"\s+".to_string(),
            ignore: true,
            ..TerminalOptions::default()
        })
        .unwrap();

    let num = collection
        .terminal(TerminalOptions {
            pattern: "[0-9]+".to_string(),
            name: Some("num".to_string()),
            ..TerminalOptions::default()
        })
        .unwrap();
    let add = collection.literal("+").unwrap();
    let sub = collection.literal("-").unwrap();
    let mul = collection.literal("*").unwrap();
    let div = collection.literal("/").unwrap();

    let operator: Rule = bnf("$0 | $1 | $2 | $3", &[add, sub, mul, div]).unwrap();

    let expr = collection.named("expr");
    expr.define_bnf("$0 $1 $2", &[num.clone(), operator, num]).unwrap();

    Arithmetic { collection, expr }
}

fn parser(arithmetic: &Arithmetic) -> Parser {
    arithmetic.collection.parser(&arithmetic.expr).unwrap()
}

/// Evaluates an `expr` node: left number, operator, right number.
fn eval(result: &ParserResult) -> i64 {
    let tree = result.tree.expect("expression should parse");
    let children = result.node(tree).children();
    assert_eq!(children.len(), 3);

    let left: i64 = result.token(children[0]).unwrap().content.parse().unwrap();
    let operator = result.token(children[1]).unwrap().content.as_str();
    let right: i64 = result.token(children[2]).unwrap().content.parse().unwrap();

    match operator {
        "+" => left + right,
        "-" => left - right,
        "*" => left * right,
        "/" => left / right,
        other => panic!("unexpected operator {:?}", other),
    }
}

#[test]
fn test_addition_evaluates() {
    let grammar = arithmetic();
    let result = parser(&grammar).parse("100 + 100", true);
    assert_eq!(eval(&result), 200);
}

#[test]
fn test_each_operator() {
    let grammar = arithmetic();
    let mut parser = parser(&grammar);
    assert_eq!(eval(&parser.parse("7 - 3", true)), 4);
    assert_eq!(eval(&parser.parse("7 * 6", true)), 42);
    assert_eq!(eval(&parser.parse("84 / 2", true)), 42);
}

#[test]
fn test_whitespace_is_collected_as_ignored() {
    let grammar = arithmetic();
    let result = parser(&grammar).parse("100 + 100", true);

    assert_eq!(result.ignored.len(), 2);
    for &id in &result.ignored {
        assert_eq!(result.token(id).unwrap().content, " ");
    }
}

#[test]
fn test_token_positions() {
    let grammar = arithmetic();
    let result = parser(&grammar).parse("100 + 100", true);
    let tree = result.tree.unwrap();
    let children = result.node(tree).children();

    let left = result.token(children[0]).unwrap();
    assert_eq!((left.start.row, left.start.col), (0, 0));
    assert_eq!((left.end.row, left.end.col), (0, 3));

    let operator = result.token(children[1]).unwrap();
    assert_eq!((operator.start.row, operator.start.col), (0, 4));

    let right = result.token(children[2]).unwrap();
    assert_eq!((right.start.row, right.start.col), (0, 6));
    assert_eq!((right.end.row, right.end.col), (0, 9));
}

#[test]
fn test_flatten_recovers_consumed_tokens() {
    let grammar = arithmetic();
    let result = parser(&grammar).parse("100 + 100", true);
    let tree = result.tree.unwrap();

    let leaves = result.flatten_terminals(tree);
    let contents: Vec<&str> = leaves
        .iter()
        .map(|&leaf| result.token(leaf).unwrap().content.as_str())
        .collect();
    assert_eq!(contents, vec!["100", "+", "100"]);

    // Flattening a leaf yields itself, so a second pass is a no-op.
    for &leaf in &leaves {
        assert_eq!(result.flatten_terminals(leaf), vec![leaf]);
    }
}

#[test]
fn test_parser_resets_between_inputs() {
    let grammar = arithmetic();
    let mut parser = parser(&grammar);
    assert_eq!(eval(&parser.parse("1 + 2", true)), 3);
    let second = parser.parse("1 + 2", true);
    assert_eq!(eval(&second), 3);
    // Positions restart at the origin on every parse.
    let tree = second.tree.unwrap();
    let first_leaf = result_first_token(&second, tree);
    assert_eq!((first_leaf.0, first_leaf.1), (0, 0));
}

fn result_first_token(result: &ParserResult, tree: gram::AstId) -> (usize, usize) {
    let leaf = result.flatten_terminals(tree)[0];
    let token = result.token(leaf).unwrap();
    (token.start.row, token.start.col)
}

#[derive(Default)]
struct CountingSink {
    success: usize,
    fail: usize,
    ignored: usize,
    lex_errors: usize,
    ends: usize,
}

impl ParseSink for CountingSink {
    fn on_lex_error(&mut self, _result: &ParserResult) {
        self.lex_errors += 1;
    }
    fn on_ignored(&mut self, _result: &ParserResult) {
        self.ignored += 1;
    }
    fn on_success(&mut self, _result: &ParserResult) {
        self.success += 1;
    }
    fn on_fail(&mut self, _result: &ParserResult) {
        self.fail += 1;
    }
    fn on_end(&mut self, _result: &ParserResult) {
        self.ends += 1;
    }
}

#[test]
fn test_streaming_chunks_split_mid_token() {
    let grammar = arithmetic();
    let mut stream = grammar.collection.stream_parser(&grammar.expr).unwrap();
    let mut sink = CountingSink::default();

    stream.feed("10", &mut sink);
    stream.feed("0 + 10", &mut sink);
    stream.feed("0", &mut sink);
    let result = stream.end(&mut sink);

    assert_eq!(sink.success, 1);
    assert_eq!(sink.fail, 0);
    assert_eq!(sink.ignored, 2);
    assert_eq!(sink.ends, 1);
    assert_eq!(eval(&result), 200);
}
