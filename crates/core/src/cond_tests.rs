// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::MapConds;
use proptest::prelude::*;

fn conds(pairs: &[(&str, CondState)]) -> MapConds {
    let mut map = MapConds::default();
    for (name, state) in pairs {
        map.insert(name, *state);
    }
    map
}

#[test]
fn empty_expression_aggregates_on() {
    let expr = CondExpr::parse("").unwrap();
    assert!(expr.is_empty());
    assert_eq!(expr.aggregate(&MapConds::default()), CondState::On);
}

#[test]
fn unknown_condition_is_off() {
    let expr = CondExpr::parse("net/route/default").unwrap();
    assert_eq!(expr.aggregate(&MapConds::default()), CondState::Off);
}

#[yare::parameterized(
    all_on       = { "a,b", &[("a", CondState::On), ("b", CondState::On)], CondState::On },
    one_off      = { "a,b", &[("a", CondState::On), ("b", CondState::Off)], CondState::Off },
    flux_beats_off = { "a,b", &[("a", CondState::Off), ("b", CondState::Flux)], CondState::Flux },
    negated_off  = { "a,!b", &[("a", CondState::On), ("b", CondState::Off)], CondState::On },
    negated_on   = { "!b", &[("b", CondState::On)], CondState::Off },
    negated_flux = { "!b", &[("b", CondState::Flux)], CondState::Flux },
)]
fn aggregation_table(expr: &str, pairs: &[(&str, CondState)], expected: CondState) {
    let expr = CondExpr::parse(expr).unwrap();
    assert_eq!(expr.aggregate(&conds(pairs)), expected);
}

#[test]
fn state_ordering_off_flux_on() {
    assert!(CondState::Off < CondState::Flux);
    assert!(CondState::Flux < CondState::On);
}

#[test]
fn affects_is_prefix_based() {
    let expr = CondExpr::parse("net/ifup/ppp,!hook/sys/up").unwrap();
    assert!(expr.affects("net/ifup/ppp0"));
    assert!(expr.affects("net/ifup/ppp"));
    assert!(expr.affects("hook/sys/up"));
    assert!(!expr.affects("net/ifup/pp"));
    assert!(!expr.affects("net/route/default"));
}

#[test]
fn parse_rejects_empty_atoms_and_bad_chars() {
    assert_eq!(CondExpr::parse("a,,b"), Err(CondParseError::EmptyAtom));
    assert_eq!(CondExpr::parse("!"), Err(CondParseError::EmptyAtom));
    assert!(matches!(CondExpr::parse("a b"), Err(CondParseError::InvalidChar(_, ' '))));
    assert!(matches!(CondExpr::parse("a,<b>"), Err(CondParseError::InvalidChar(_, '<'))));
}

#[test]
fn display_round_trips() {
    for expr in ["", "a", "a,!b", "net/route/default,hook/sys/up", "!x/y.z:1,w"] {
        let parsed = CondExpr::parse(expr).unwrap();
        assert_eq!(parsed.to_string(), expr);
        assert_eq!(CondExpr::parse(&parsed.to_string()).unwrap(), parsed);
    }
}

#[test]
fn serde_as_string() {
    let expr = CondExpr::parse("a,!b").unwrap();
    let json = serde_json::to_string(&expr).unwrap();
    assert_eq!(json, "\"a,!b\"");
    let back: CondExpr = serde_json::from_str(&json).unwrap();
    assert_eq!(back, expr);
}

fn arb_state() -> impl Strategy<Value = CondState> {
    prop_oneof![Just(CondState::Off), Just(CondState::Flux), Just(CondState::On)]
}

proptest! {
    // Property: on iff every atom satisfied; flux dominates off; off needs a
    // missed atom with nothing in flux.
    #[test]
    fn aggregate_matches_definition(
        states in proptest::collection::vec((("[a-z]{1,6}", any::<bool>()), arb_state()), 0..6)
    ) {
        let mut map = MapConds::default();
        let mut atoms = Vec::new();
        for (i, ((name, negated), state)) in states.iter().enumerate() {
            // Disambiguate repeated names; prefix matching is not under test here.
            let name = format!("{name}{i}");
            map.insert(&name, *state);
            atoms.push((name, *negated, *state));
        }
        let expr_str = atoms
            .iter()
            .map(|(n, neg, _)| if *neg { format!("!{n}") } else { n.clone() })
            .collect::<Vec<_>>()
            .join(",");
        let expr = CondExpr::parse(&expr_str).unwrap();

        let eval = |neg: bool, s: CondState| match (neg, s) {
            (false, s) => s,
            (true, CondState::On) => CondState::Off,
            (true, CondState::Off) => CondState::On,
            (true, CondState::Flux) => CondState::Flux,
        };
        let any_flux = atoms.iter().any(|(_, n, s)| eval(*n, *s) == CondState::Flux);
        let any_off = atoms.iter().any(|(_, n, s)| eval(*n, *s) == CondState::Off);
        let expected = if any_flux {
            CondState::Flux
        } else if any_off {
            CondState::Off
        } else {
            CondState::On
        };
        prop_assert_eq!(expr.aggregate(&map), expected);
    }
}
