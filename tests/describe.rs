//! Rule description output tests
//!
//! Rules render a JSON description of their structure. Recursive references
//! print by name only, which keeps cyclic grammars printable.

use gram::{RuleCollection, TerminalOptions};

#[test]
fn test_terminal_description() {
    let collection = RuleCollection::new();
    let num = collection
        .terminal(TerminalOptions {
            pattern: "[0-9]+".to_string(),
            name: Some("num".to_string()),
            ..TerminalOptions::default()
        })
        .unwrap();

    insta::assert_snapshot!(
        num.to_string(),
        @r###"{"ignore":false,"kind":"terminal","name":"num","pattern":"[0-9]+"}"###
    );
}

#[test]
fn test_literal_terminal_description_shows_escaped_pattern() {
    let collection = RuleCollection::new();
    let plus = collection.literal("+").unwrap();

    insta::assert_snapshot!(
        plus.to_string(),
        @r###"{"ignore":false,"kind":"terminal","name":null,"pattern":"\\+"}"###
    );
}

#[test]
fn test_sequence_description() {
    let collection = RuleCollection::new();
    let a = collection
        .terminal(TerminalOptions {
            pattern: "a".to_string(),
            name: Some("a".to_string()),
            ..TerminalOptions::default()
        })
        .unwrap();
    let b = collection
        .terminal(TerminalOptions {
            pattern: "b".to_string(),
            name: Some("b".to_string()),
            ..TerminalOptions::default()
        })
        .unwrap();

    let seq = a.and(&b).one_or_more();
    let value = seq.describe();
    assert_eq!(value["kind"], "one_or_more");
    assert_eq!(value["rule"]["kind"], "seq");
    assert_eq!(value["rule"]["rules"][0]["name"], "a");
    assert_eq!(value["rule"]["rules"][1]["name"], "b");
}

#[test]
fn test_recursive_rule_prints_by_name() {
    let collection = RuleCollection::new();
    let num = collection.pattern("[0-9]+").unwrap();
    let minus = collection.literal("-").unwrap();
    let expr = collection.named("expr");
    expr.define(&expr.and(&minus).and(&num).or(&num)).unwrap();

    let value = expr.describe();
    assert_eq!(value["kind"], "named");
    assert_eq!(value["name"], "expr");
    // Top level expands the body once; the self-reference inside stays a
    // bare name.
    assert_eq!(value["rule"]["kind"], "choice");
    assert_eq!(value["rule"]["rules"][0]["rules"][0]["kind"], "named");
    assert!(value["rule"]["rules"][0]["rules"][0].get("rule").is_none());

    // A collection listing renders every registered rule.
    let listing = collection.describe();
    assert_eq!(listing["rules"].as_array().unwrap().len(), 3);
}
