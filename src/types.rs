//! Core data types used throughout placepilot.
//!
//! This module defines the call-plan data model (literals, calls, plans),
//! the tool output shapes, and the event types that flow from the
//! pipeline to its caller.

use serde_json::Value;
use std::fmt;

// --- Literals ---

/// A literal argument value inside a call expression.
///
/// This is the full value universe the model is allowed to produce:
/// plain scalars, lists, string-keyed maps, one bare identifier
/// (a model slip, evaluated to null), or a single nested call whose
/// result becomes the argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A bare identifier in argument position, e.g. the dangling
    /// `lat_long` in `get_recommendations(["coffee"], lat_long)`.
    /// Evaluates to null; never resolved against prior results.
    Symbol(String),
    List(Vec<Literal>),
    Map(Vec<(String, Literal)>),
    /// A nested call used as an argument value. The grammar allows
    /// exactly one level of nesting.
    Call(Box<Call>),
}

fn escape_str(s: &str, out: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(out, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(out, "\\\"")?,
            '\\' => write!(out, "\\\\")?,
            '\n' => write!(out, "\\n")?,
            '\t' => write!(out, "\\t")?,
            '\r' => write!(out, "\\r")?,
            other => write!(out, "{}", other)?,
        }
    }
    write!(out, "\"")
}

impl fmt::Display for Literal {
    /// Canonical rendering, in the Python-flavored syntax the model
    /// emits. Parsing the rendered text yields the same literal back.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "None"),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Literal::Str(s) => escape_str(s, f),
            Literal::Symbol(name) => write!(f, "{}", name),
            Literal::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Literal::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    escape_str(key, f)?;
                    write!(f, ": {}", value)?;
                }
                write!(f, "}}")
            }
            Literal::Call(call) => write!(f, "{}", call),
        }
    }
}

// --- Calls and plans ---

/// One parsed call expression: a function name plus its arguments.
///
/// Created by the parser, validated against the registry by the plan
/// compiler, consumed once by the executor. Immutable after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub positional: Vec<Literal>,
    pub keyword: Vec<(String, Literal)>,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        let mut first = true;
        for arg in &self.positional {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}", arg)?;
        }
        for (key, value) in &self.keyword {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}={}", key, value)?;
        }
        write!(f, ")")
    }
}

/// An ordered, validated sequence of calls compiled from one model
/// utterance. Insertion order is execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    calls: Vec<Call>,
}

impl Plan {
    pub fn new(calls: Vec<Call>) -> Self {
        Self { calls }
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl fmt::Display for Plan {
    /// The reformatted plan text shown to the user: canonical call
    /// rendering, joined by "; ".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, call) in self.calls.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", call)?;
        }
        Ok(())
    }
}

// --- Tool output ---

/// What a tool invocation produces: a plain string, one structured
/// record, or an ordered sequence of records. The executor treats all
/// three uniformly as "results to append".
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Record(Value),
    Records(Vec<Value>),
}

impl ToolOutput {
    pub fn empty() -> Self {
        ToolOutput::Records(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            ToolOutput::Text(_) | ToolOutput::Record(_) => 1,
            ToolOutput::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into the values appended to the request's result
    /// accumulator, preserving order.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            ToolOutput::Text(text) => vec![Value::String(text)],
            ToolOutput::Record(record) => vec![record],
            ToolOutput::Records(records) => records,
        }
    }

    /// The single JSON value a nested call evaluates to when used as
    /// an argument.
    pub fn into_argument(self) -> Value {
        match self {
            ToolOutput::Text(text) => Value::String(text),
            ToolOutput::Record(record) => record,
            ToolOutput::Records(records) => Value::Array(records),
        }
    }
}

// --- Execution outcomes ---

/// The per-call product of execution: the status text pair plus the
/// flattened results the call contributed.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub description: String,
    pub explanation: String,
    pub results: Vec<Value>,
}

// --- Request-scoped context ---

/// Per-request context passed explicitly to tool invocations.
///
/// Carries the caller's best-effort client IP (locale hint) so tools
/// never read shared mutable state for it.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_ip: Option<String>,
}

impl RequestContext {
    pub fn with_client_ip(ip: impl Into<String>) -> Self {
        Self {
            client_ip: Some(ip.into()),
        }
    }
}

// --- Pipeline events ---

/// A deduplicated (address, name) pair projected from the results,
/// used by callers to render map embeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevantPlace {
    pub address: String,
    pub name: String,
}

/// Final report of a completed request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub plan: String,
    pub descriptions: Vec<String>,
    pub results: Vec<Value>,
    pub summary: String,
}

/// Events streamed from the pipeline to its caller, in order.
///
/// The receiving side owns cancellation: dropping the receiver makes
/// the pipeline stop at the next step boundary.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A fragment of raw model plan text (stop marker stripped).
    PlanDelta(String),
    /// The compiled, reformatted plan.
    PlanReady(String),
    /// One dry-run description line, pre-execution.
    PlanStep { index: usize, text: String },
    /// The accumulated status line for one executing step.
    StepText { index: usize, text: String },
    /// The flattened result set after execution.
    Results(Vec<Value>),
    RelevantPlaces(Vec<RelevantPlace>),
    /// A fragment of summary text (turn-end marker stripped).
    SummaryDelta(String),
    /// The request failed before any call executed.
    Failed(String),
    Done(RequestOutcome),
}
