//! Plan execution: the dry-run describer and the step-by-step executor.
//!
//! Key concepts:
//! - **describe_plan**: best-effort preview of every call before anything
//!   runs. Never invokes a tool and never fails; a call it cannot
//!   describe gets the tool's short description instead.
//! - **Executor**: pulls one `CallOutcome` per top-level call, in plan
//!   order. A failing call degrades to an empty result; the remaining
//!   calls still run. Once a step is taken it is never replayed; a fresh
//!   run requires recompiling the plan.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::warn;

use crate::tools::{CallArgs, Tool, ToolRegistry};
use crate::types::{Call, CallOutcome, Literal, Plan, RequestContext, ToolOutput};

/// Descriptions longer than this are swapped for the dry-run preview
/// text, which is already on screen and known to fit.
const MAX_STEP_DESCRIPTION: usize = 100;

/// Convert a literal to its JSON value without invoking anything:
/// nested calls and bare identifiers both become null.
fn shallow_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null | Literal::Symbol(_) | Literal::Call(_) => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::from(*n),
        Literal::Float(x) => Value::from(*x),
        Literal::Str(s) => Value::String(s.clone()),
        Literal::List(items) => Value::Array(items.iter().map(shallow_value).collect()),
        Literal::Map(pairs) => Value::Object(
            pairs
                .iter()
                .map(|(key, value)| (key.clone(), shallow_value(value)))
                .collect(),
        ),
    }
}

fn bind_shallow(tool: &dyn Tool, call: &Call) -> Result<CallArgs> {
    let positional = call.positional.iter().map(shallow_value).collect();
    let keyword = call
        .keyword
        .iter()
        .map(|(key, value)| (key.clone(), shallow_value(value)))
        .collect();
    CallArgs::bind(tool.params(), positional, keyword)
}

/// Produce one description line per call, in order, without executing
/// anything. Idempotent: describing the same plan twice gives the same
/// lines.
pub fn describe_plan(plan: &Plan, registry: &ToolRegistry) -> Vec<String> {
    plan.calls()
        .iter()
        .map(|call| match registry.lookup(&call.name) {
            Some(tool) => bind_shallow(tool.as_ref(), call)
                .and_then(|args| tool.describe(&args))
                .unwrap_or_else(|_| tool.short_description().to_string()),
            None => call.to_string(),
        })
        .collect()
}

/// Steps through a compiled plan, producing one outcome per call.
pub struct Executor {
    plan: Plan,
    registry: Arc<ToolRegistry>,
    ctx: RequestContext,
    previews: Vec<String>,
    next: usize,
}

impl Executor {
    pub fn new(
        plan: Plan,
        registry: Arc<ToolRegistry>,
        ctx: RequestContext,
        previews: Vec<String>,
    ) -> Self {
        Self {
            plan,
            registry,
            ctx,
            previews,
            next: 0,
        }
    }

    /// Index of the next call to run.
    pub fn position(&self) -> usize {
        self.next
    }

    fn preview(&self, index: usize) -> String {
        self.previews
            .get(index)
            .cloned()
            .unwrap_or_else(|| self.plan.calls()[index].to_string())
    }

    /// Evaluate one argument literal. A nested call is invoked and its
    /// output becomes the value; everything else converts directly.
    fn evaluate<'a>(&'a self, literal: &'a Literal) -> BoxFuture<'a, Result<Value>> {
        async move {
            match literal {
                Literal::Call(call) => self.evaluate_call(call).await,
                Literal::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.evaluate(item).await?);
                    }
                    Ok(Value::Array(values))
                }
                Literal::Map(pairs) => {
                    let mut map = serde_json::Map::with_capacity(pairs.len());
                    for (key, value) in pairs {
                        map.insert(key.clone(), self.evaluate(value).await?);
                    }
                    Ok(Value::Object(map))
                }
                other => Ok(shallow_value(other)),
            }
        }
        .boxed()
    }

    /// Invoke a nested call silently; only its value is kept, no
    /// outcome is reported for it.
    async fn evaluate_call(&self, call: &Call) -> Result<Value> {
        let tool = self
            .registry
            .lookup(&call.name)
            .ok_or_else(|| anyhow!("unknown function `{}`", call.name))?;
        let args = self.bind(tool.as_ref(), call).await?;
        let output = tool.invoke(&args, &self.ctx).await?;
        Ok(output.into_argument())
    }

    async fn bind(&self, tool: &dyn Tool, call: &Call) -> Result<CallArgs> {
        let mut positional = Vec::with_capacity(call.positional.len());
        for literal in &call.positional {
            positional.push(self.evaluate(literal).await?);
        }
        let mut keyword = Vec::with_capacity(call.keyword.len());
        for (key, value) in &call.keyword {
            keyword.push((key.clone(), self.evaluate(value).await?));
        }
        CallArgs::bind(tool.params(), positional, keyword)
    }

    /// Run the next call. Returns `None` once the plan is exhausted.
    pub async fn step(&mut self) -> Option<CallOutcome> {
        let index = self.next;
        let call = self.plan.calls().get(index)?.clone();
        self.next += 1;

        let Some(tool) = self.registry.lookup(&call.name) else {
            // Compilation validates names, so this is unreachable in
            // practice; degrade the same way a failed call does.
            warn!(call = %call, "call names an unregistered function");
            return Some(CallOutcome {
                description: self.preview(index),
                explanation: String::new(),
                results: Vec::new(),
            });
        };

        let bound = self.bind(tool.as_ref(), &call).await;
        let (description, output) = match bound {
            Ok(args) => {
                let description = tool
                    .describe(&args)
                    .unwrap_or_else(|_| tool.short_description().to_string());
                let output = match tool.invoke(&args, &self.ctx).await {
                    Ok(output) => output,
                    Err(error) => {
                        warn!(call = %call, %error, "tool invocation failed");
                        ToolOutput::empty()
                    }
                };
                (description, output)
            }
            Err(error) => {
                warn!(call = %call, %error, "argument binding failed");
                (tool.short_description().to_string(), ToolOutput::empty())
            }
        };

        let description = if description.chars().count() > MAX_STEP_DESCRIPTION {
            self.preview(index)
        } else {
            description
        };

        Some(CallOutcome {
            explanation: tool.explain(&output),
            results: output.into_values(),
            description,
        })
    }
}
