//! Plan compiler.
//!
//! Splits a full model utterance on top-level `;` separators, parses
//! each segment into a [`Call`], and validates every named function
//! (nested calls included) against the tool registry. Any failure
//! aborts the whole plan: a partially-valid plan hides model errors.

use thiserror::Error;

use crate::parser::{parse_call_expression, ParseError};
use crate::tools::ToolRegistry;
use crate::types::{Call, Literal, Plan};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("could not parse `{segment}`: {source}")]
    Parse {
        segment: String,
        #[source]
        source: ParseError,
    },
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
}

/// Split raw plan text on `;` separators that sit outside every string,
/// list, dict, and argument list. A `;` inside `g("a;b")` is plain text.
fn split_top_level(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth: usize = 0;

    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ';' if depth == 0 => {
                segments.push(current.clone());
                current.clear();
            }
            other => current.push(other),
        }
    }
    segments.push(current);

    segments
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn check_names(call: &Call, registry: &ToolRegistry) -> Result<(), CompileError> {
    if !registry.has_tool(&call.name) {
        return Err(CompileError::UnknownFunction(call.name.clone()));
    }
    for literal in call
        .positional
        .iter()
        .chain(call.keyword.iter().map(|(_, v)| v))
    {
        check_literal(literal, registry)?;
    }
    Ok(())
}

fn check_literal(literal: &Literal, registry: &ToolRegistry) -> Result<(), CompileError> {
    match literal {
        Literal::Call(inner) => check_names(inner, registry),
        Literal::List(items) => items.iter().try_for_each(|l| check_literal(l, registry)),
        Literal::Map(pairs) => pairs
            .iter()
            .try_for_each(|(_, l)| check_literal(l, registry)),
        _ => Ok(()),
    }
}

/// Compile raw model output into an ordered, registry-validated [`Plan`].
pub fn compile_plan(text: &str, registry: &ToolRegistry) -> Result<Plan, CompileError> {
    let mut calls = Vec::new();
    for segment in split_top_level(text) {
        let call = parse_call_expression(&segment).map_err(|source| CompileError::Parse {
            segment,
            source,
        })?;
        check_names(&call, registry)?;
        calls.push(call);
    }
    Ok(Plan::new(calls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tests::test_registry;

    #[test]
    fn test_split_ignores_semicolon_in_string() {
        let segments = split_top_level("f(1,2); g(\"a;b\")");
        assert_eq!(segments, vec!["f(1,2)", "g(\"a;b\")"]);
    }

    #[test]
    fn test_split_ignores_semicolon_in_brackets_and_escapes() {
        let segments = split_top_level("f([1, 2], \"it\\\";s\"); g()");
        assert_eq!(segments.len(), 2);
        let segments = split_top_level("f('a'); ; g('b');");
        assert_eq!(segments, vec!["f('a')", "g('b')"]);
    }

    #[test]
    fn test_compile_two_call_scenario() {
        let registry = test_registry();
        let plan = compile_plan(
            "get_latitude_longitude(\"Austin\"); get_recommendations([\"coffee\"], lat_long)",
            &registry,
        )
        .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.calls()[0].name, "get_latitude_longitude");
        assert_eq!(plan.calls()[1].name, "get_recommendations");
    }

    #[test]
    fn test_compile_unknown_function_aborts_plan() {
        let registry = test_registry();
        let err = compile_plan(
            "get_latitude_longitude(\"Austin\"); summon_dragon()",
            &registry,
        )
        .unwrap_err();
        match err {
            CompileError::UnknownFunction(name) => assert_eq!(name, "summon_dragon"),
            other => panic!("expected UnknownFunction, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_checks_nested_call_names() {
        let registry = test_registry();
        let err = compile_plan(
            "get_recommendations([\"coffee\"], summon_dragon(\"Austin\"))",
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::UnknownFunction(_)));
    }

    #[test]
    fn test_compile_parse_error_reports_segment() {
        let registry = test_registry();
        let err = compile_plan("get_latitude_longitude(\"Austin\"", &registry).unwrap_err();
        match err {
            CompileError::Parse { segment, .. } => {
                assert!(segment.contains("get_latitude_longitude"))
            }
            other => panic!("expected Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_reformats_canonically() {
        let registry = test_registry();
        let plan = compile_plan(
            "get_latitude_longitude( 'Austin' )  ;get_recommendations(['coffee'],lat_long)",
            &registry,
        )
        .unwrap();
        assert_eq!(
            plan.to_string(),
            "get_latitude_longitude(\"Austin\"); get_recommendations([\"coffee\"], lat_long)"
        );
    }
}
