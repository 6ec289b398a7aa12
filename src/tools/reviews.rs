//! Reviews tool: fetches reviews for named establishments.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::Value;

use super::gmaps::{resolve_place, PlacesApi};
use super::{CallArgs, Tool};
use crate::types::{RequestContext, ToolOutput};

pub struct ReviewsTool {
    api: Arc<dyn PlacesApi>,
}

impl ReviewsTool {
    pub fn new(api: Arc<dyn PlacesApi>) -> Self {
        Self { api }
    }
}

/// The optional `location` argument is only usable when it is a plain
/// string; resolved record lists and stray records are ignored.
fn location_suffix(value: Option<&Value>) -> Option<&str> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// A place-name entry may be a plain string or a record carrying a
/// `name` (possibly under a `results` wrapper).
fn entry_name(entry: &Value) -> Option<String> {
    match entry {
        Value::String(name) => Some(name.clone()),
        Value::Object(map) => {
            if let Some(nested) = map.get("results") {
                if let Some(name) = nested.get("name").and_then(Value::as_str) {
                    return Some(name.to_string());
                }
            }
            map.get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        _ => None,
    }
}

#[async_trait]
impl Tool for ReviewsTool {
    fn name(&self) -> &str {
        "get_some_reviews"
    }

    fn params(&self) -> &[&str] {
        &["place_names", "location"]
    }

    fn signature(&self) -> &str {
        "(place_names: list, location: str = None)"
    }

    fn docs(&self) -> &str {
        "Given an establishment (or place) name, return reviews about the establishment.\n\n\
         - place_names (list): The name of the establishment. This should be a physical location name. You can provide multiple inputs.\n\
         - location (str) : The location where the restaurant is located. Optional argument."
    }

    fn short_description(&self) -> &str {
        "Fetching reviews"
    }

    fn describe(&self, _args: &CallArgs) -> Result<String> {
        Ok("Fetching reviews for the requested items".to_string())
    }

    fn explain(&self, output: &ToolOutput) -> String {
        format!("Fetched {} reviews!", output.len())
    }

    async fn invoke(&self, args: &CallArgs, _ctx: &RequestContext) -> Result<ToolOutput> {
        let entries = match args.require("place_names")? {
            Value::Array(items) => items.clone(),
            Value::String(name) => vec![Value::String(name.clone())],
            _ => bail!("argument `place_names` must be a list"),
        };
        let suffix = location_suffix(args.get("location"));

        let mut all_reviews: Vec<Value> = Vec::new();
        for entry in &entries {
            let Some(mut place_name) = entry_name(entry) else {
                continue;
            };
            if entry.is_string() {
                if let Some(location) = suffix {
                    place_name = format!("{} , {}", place_name, location);
                }
            }

            let Some(details) = resolve_place(self.api.as_ref(), &place_name)
                .await?
                .into_iter()
                .next()
            else {
                continue;
            };

            let formatted_address = details
                .get("formatted_address")
                .cloned()
                .unwrap_or(Value::Null);
            let reviews = match details.get("reviews") {
                Some(Value::Array(reviews)) => reviews.clone(),
                _ => Vec::new(),
            };
            for mut review in reviews {
                if let Some(map) = review.as_object_mut() {
                    map.insert(
                        "for_location".to_string(),
                        Value::String(place_name.clone()),
                    );
                    map.insert("formatted_address".to_string(), formatted_address.clone());
                }
                all_reviews.push(review);
            }
        }

        all_reviews.shuffle(&mut rand::thread_rng());
        Ok(ToolOutput::Records(all_reviews))
    }
}

#[cfg(test)]
mod tests {
    use super::super::gmaps::tests::FakePlaces;
    use super::*;
    use serde_json::json;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    fn reviewed_place(name: &str, reviews: Value) -> Value {
        json!({
            "name": name,
            "formatted_address": format!("{} St", name),
            "reviews": reviews,
        })
    }

    fn args(place_names: Value, location: Option<Value>) -> CallArgs {
        let mut keyword = Vec::new();
        if let Some(location) = location {
            keyword.push(("location".to_string(), location));
        }
        CallArgs::bind(&["place_names", "location"], vec![place_names], keyword).unwrap()
    }

    #[test]
    fn test_reviews_are_tagged_with_place() {
        let rt = rt();
        rt.block_on(async {
            let api = FakePlaces::new().with_place(
                "Ippudo",
                reviewed_place(
                    "Ippudo Ramen",
                    json!([
                        {"author_name": "a", "text": "great"},
                        {"author_name": "b", "text": "fine"},
                    ]),
                ),
            );
            let tool = ReviewsTool::new(Arc::new(api));

            let output = tool
                .invoke(&args(json!(["Ippudo"]), None), &RequestContext::default())
                .await
                .unwrap();
            assert_eq!(output.len(), 2);
            assert_eq!(tool.explain(&output), "Fetched 2 reviews!");
            match output {
                ToolOutput::Records(reviews) => {
                    for review in reviews {
                        assert_eq!(review["for_location"], "Ippudo");
                        assert_eq!(review["formatted_address"], "Ippudo Ramen St");
                    }
                }
                other => panic!("expected records, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_string_location_appended_to_query() {
        let rt = rt();
        rt.block_on(async {
            let api = FakePlaces::new().with_place(
                "Siam Thai , San Jose",
                reviewed_place("Siam Thai Cuisine", json!([{"text": "tasty"}])),
            );
            let tool = ReviewsTool::new(Arc::new(api));

            let output = tool
                .invoke(
                    &args(json!(["Siam Thai"]), Some(json!("San Jose"))),
                    &RequestContext::default(),
                )
                .await
                .unwrap();
            assert_eq!(output.len(), 1);
        });
    }

    #[test]
    fn test_record_entries_and_unknown_places_skipped() {
        let rt = rt();
        rt.block_on(async {
            let api = FakePlaces::new().with_place(
                "Ramen Nagi",
                reviewed_place("Ramen Nagi", json!([{"text": "slurp"}])),
            );
            let tool = ReviewsTool::new(Arc::new(api));

            let output = tool
                .invoke(
                    &args(
                        json!([{"name": "Ramen Nagi"}, "Nowhere Cafe", 42]),
                        None,
                    ),
                    &RequestContext::default(),
                )
                .await
                .unwrap();
            assert_eq!(output.len(), 1);
        });
    }
}
