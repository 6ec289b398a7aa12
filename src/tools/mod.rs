//! Tool system module.
//!
//! This module defines the `Tool` trait and `ToolRegistry` that together
//! form the tool execution framework.
//!
//! Key concepts:
//! - **Tool trait**: every tool implements this trait, providing its name,
//!   prompt signature, the pre-call description and post-call explanation
//!   templates, and an invoke method
//! - **CallArgs**: arguments already evaluated to JSON values and bound to
//!   the tool's declared parameter names
//! - **PlaceArg**: the tagged variant that normalizes place-typed inputs
//!   (a name string, a resolved record, or a record list) at the call
//!   boundary instead of ad hoc shape checks inside each tool
//! - **ToolRegistry**: built once at startup, read-only afterwards, shared
//!   by every in-flight request

pub mod current_location;
pub mod distance;
pub mod gmaps;
pub mod latitude_longitude;
pub mod nearby;
pub mod recommendations;
pub mod reviews;
pub mod sort;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::{RequestContext, ToolOutput};
use gmaps::PlacesApi;

/// Trait that all tools must implement.
///
/// A tool is one callable capability exposed to the plan model. Beyond
/// the implementation itself it carries everything the pipeline needs
/// around a call: the prompt definition and the two status templates.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique function name the model calls (e.g. "get_distance").
    fn name(&self) -> &str;

    /// Declared parameter names in order, used to bind positional
    /// arguments.
    fn params(&self) -> &[&str];

    /// Python-style signature rendered into the plan prompt.
    fn signature(&self) -> &str;

    /// Docstring rendered into the plan prompt. The model reads this to
    /// decide when and how to call the tool.
    fn docs(&self) -> &str;

    /// Constant one-line label, used for the dry-run plan preview and
    /// as the fallback when `describe` fails or runs too long.
    fn short_description(&self) -> &str;

    /// Pre-call status text computed from the call's arguments.
    fn describe(&self, args: &CallArgs) -> Result<String>;

    /// Post-call status text computed from the call's result.
    fn explain(&self, output: &ToolOutput) -> String;

    /// Execute the tool. Failures degrade that one call to an empty
    /// result; they never abort the rest of the plan.
    async fn invoke(&self, args: &CallArgs, ctx: &RequestContext) -> Result<ToolOutput>;
}

// --- Bound arguments ---

/// A call's arguments, evaluated to JSON values and keyed by the tool's
/// declared parameter names.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    values: Vec<(String, Value)>,
}

impl CallArgs {
    /// Bind evaluated positional and keyword arguments against the
    /// declared parameter list.
    pub fn bind(
        params: &[&str],
        positional: Vec<Value>,
        keyword: Vec<(String, Value)>,
    ) -> Result<Self> {
        if positional.len() > params.len() {
            bail!(
                "too many positional arguments: got {}, expected at most {}",
                positional.len(),
                params.len()
            );
        }
        let mut values: Vec<(String, Value)> = params
            .iter()
            .zip(positional)
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        for (key, value) in keyword {
            if !params.contains(&key.as_str()) {
                bail!("unknown keyword argument `{}`", key);
            }
            if values.iter().any(|(bound, _)| *bound == key) {
                bail!("argument `{}` given both positionally and by keyword", key);
            }
            values.push((key, value));
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .with_context(|| format!("missing required argument `{}`", name))
    }

    pub fn str_arg(&self, name: &str) -> Result<&str> {
        self.require(name)?
            .as_str()
            .with_context(|| format!("argument `{}` must be a string", name))
    }

    /// A list-of-strings argument; a single bare string is accepted as
    /// a one-element list.
    pub fn string_list(&self, name: &str) -> Result<Vec<String>> {
        match self.require(name)? {
            Value::String(s) => Ok(vec![s.clone()]),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .with_context(|| format!("argument `{}` must contain strings", name))
                })
                .collect(),
            _ => bail!("argument `{}` must be a string or list of strings", name),
        }
    }

    pub fn bool_arg(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Null) | None => default,
            // Non-boolean truthiness is a model slip; fall back.
            Some(_) => default,
        }
    }

    pub fn f64_arg(&self, name: &str, default: f64) -> f64 {
        self.get(name).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn opt_usize(&self, name: &str) -> Option<usize> {
        self.get(name)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }
}

// --- Place-typed arguments ---

/// Normalized place input. The model hands tools either a plain name or
/// the output of a previous place lookup (one record, or a record list);
/// all of those collapse into the two variants here.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceArg {
    Name(String),
    Details(Vec<Value>),
}

impl PlaceArg {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) if !name.is_empty() => Some(PlaceArg::Name(name.clone())),
            Value::Object(_) => Some(PlaceArg::Details(vec![value.clone()])),
            Value::Array(items) => {
                let records: Vec<Value> = items
                    .iter()
                    .filter(|item| item.is_object())
                    .cloned()
                    .collect();
                if records.is_empty() {
                    None
                } else {
                    Some(PlaceArg::Details(records))
                }
            }
            _ => None,
        }
    }

    /// A display name for the place, however it was given.
    pub fn name(&self) -> Option<String> {
        match self {
            PlaceArg::Name(name) => Some(name.clone()),
            PlaceArg::Details(records) => records
                .first()
                .and_then(|record| record.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    pub fn details(&self) -> Option<&[Value]> {
        match self {
            PlaceArg::Details(records) => Some(records),
            PlaceArg::Name(_) => None,
        }
    }
}

// --- Registry ---

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("duplicate tool name `{0}`")]
    DuplicateName(String),
}

/// Holds all registered tools and resolves call names to
/// implementations. Built once at process start; read-only and shared
/// across requests afterwards.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        if self.has_tool(tool.name()) {
            return Err(RegistryError::DuplicateName(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a ToolRegistry with all built-in tools registered against the
/// given places backend.
pub fn create_default_registry(api: Arc<dyn PlacesApi>) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(current_location::CurrentLocationTool::new(
        api.clone(),
    )))?;
    registry.register(Arc::new(sort::SortResultsTool))?;
    registry.register(Arc::new(
        latitude_longitude::LatitudeLongitudeTool::new(api.clone()),
    ))?;
    registry.register(Arc::new(distance::DistanceTool::new(api.clone())))?;
    registry.register(Arc::new(recommendations::RecommendationsTool::new(
        api.clone(),
    )))?;
    registry.register(Arc::new(nearby::NearbyPlacesTool::new(api.clone())))?;
    registry.register(Arc::new(reviews::ReviewsTool::new(api)))?;
    Ok(registry)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// A scripted tool for plan/executor/pipeline tests: returns a
    /// fixed output, or fails when constructed with `failing`.
    pub struct StubTool {
        pub name: &'static str,
        pub params: &'static [&'static str],
        pub output: ToolOutput,
        pub failing: bool,
    }

    impl StubTool {
        pub fn returning(
            name: &'static str,
            params: &'static [&'static str],
            output: ToolOutput,
        ) -> Self {
            Self {
                name,
                params,
                output,
                failing: false,
            }
        }

        pub fn failing(name: &'static str, params: &'static [&'static str]) -> Self {
            Self {
                name,
                params,
                output: ToolOutput::empty(),
                failing: true,
            }
        }
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.name
        }

        fn params(&self) -> &[&str] {
            self.params
        }

        fn signature(&self) -> &str {
            "(*args)"
        }

        fn docs(&self) -> &str {
            "Test stub."
        }

        fn short_description(&self) -> &str {
            "Working on it"
        }

        fn describe(&self, args: &CallArgs) -> Result<String> {
            Ok(format!("Calling {} with {} args", self.name, args.values.len()))
        }

        fn explain(&self, output: &ToolOutput) -> String {
            format!("Got {} results", output.len())
        }

        async fn invoke(&self, _args: &CallArgs, _ctx: &RequestContext) -> Result<ToolOutput> {
            if self.failing {
                bail!("stub failure");
            }
            Ok(self.output.clone())
        }
    }

    /// A registry with the tool names the plan tests compile against.
    pub fn test_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(StubTool::returning(
                "get_latitude_longitude",
                &["location"],
                ToolOutput::Records(vec![json!({"name": "Austin"})]),
            )))
            .unwrap();
        registry
            .register(Arc::new(StubTool::returning(
                "get_recommendations",
                &["topics", "lat_long"],
                ToolOutput::Records(vec![json!({"name": "Best Coffee"})]),
            )))
            .unwrap();
        registry
    }

    #[test]
    fn test_registry_rejects_duplicate_name() {
        let mut registry = test_registry();
        let err = registry
            .register(Arc::new(StubTool::returning(
                "get_latitude_longitude",
                &[],
                ToolOutput::empty(),
            )))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateName("get_latitude_longitude".to_string())
        );
    }

    #[test]
    fn test_registry_lookup() {
        let registry = test_registry();
        assert!(registry.lookup("get_recommendations").is_some());
        assert!(registry.lookup("summon_dragon").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_bind_positional_then_keyword() {
        let args = CallArgs::bind(
            &["topics", "lat_long"],
            vec![json!(["coffee"])],
            vec![("lat_long".to_string(), Value::Null)],
        )
        .unwrap();
        assert_eq!(args.string_list("topics").unwrap(), vec!["coffee"]);
        assert_eq!(args.get("lat_long"), Some(&Value::Null));
    }

    #[test]
    fn test_bind_rejects_unknown_and_colliding_keywords() {
        let err = CallArgs::bind(&["a"], vec![], vec![("b".to_string(), json!(1))]).unwrap_err();
        assert!(err.to_string().contains("unknown keyword"));

        let err = CallArgs::bind(
            &["a"],
            vec![json!(1)],
            vec![("a".to_string(), json!(2))],
        )
        .unwrap_err();
        assert!(err.to_string().contains("positionally and by keyword"));

        let err = CallArgs::bind(&["a"], vec![json!(1), json!(2)], vec![]).unwrap_err();
        assert!(err.to_string().contains("too many positional"));
    }

    #[test]
    fn test_place_arg_normalization() {
        assert_eq!(
            PlaceArg::from_value(&json!("Austin")),
            Some(PlaceArg::Name("Austin".to_string()))
        );

        let record = json!({"name": "Austin Airport", "rating": 4.1});
        match PlaceArg::from_value(&record) {
            Some(PlaceArg::Details(records)) => assert_eq!(records.len(), 1),
            other => panic!("expected details, got {:?}", other),
        }

        let list = json!([{"name": "Austin Airport"}]);
        let arg = PlaceArg::from_value(&list).unwrap();
        assert_eq!(arg.name().as_deref(), Some("Austin Airport"));

        assert_eq!(PlaceArg::from_value(&Value::Null), None);
        assert_eq!(PlaceArg::from_value(&json!([])), None);
        assert_eq!(PlaceArg::from_value(&json!("")), None);
    }
}
