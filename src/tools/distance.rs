//! Distance tool: great-circle miles between two described places.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::gmaps::{haversine_km, lat_lng_of, resolve_place, PlacesApi, KM_TO_MILES};
use super::{CallArgs, PlaceArg, Tool};
use crate::types::{RequestContext, ToolOutput};

pub struct DistanceTool {
    api: Arc<dyn PlacesApi>,
}

impl DistanceTool {
    pub fn new(api: Arc<dyn PlacesApi>) -> Self {
        Self { api }
    }

    fn place_name(value: &Value, param: &str) -> Result<String> {
        match PlaceArg::from_value(value).and_then(|arg| arg.name()) {
            Some(name) => Ok(name),
            None => bail!("argument `{}` does not describe a place", param),
        }
    }
}

#[async_trait]
impl Tool for DistanceTool {
    fn name(&self) -> &str {
        "get_distance"
    }

    fn params(&self) -> &[&str] {
        &["place_1", "place_2"]
    }

    fn signature(&self) -> &str {
        "(place_1: str, place_2: str)"
    }

    fn docs(&self) -> &str {
        "Provides distance between two locations. Do NOT provide latitude longitude, but rather, provide the string descriptions.\n\n\
         Allows you to provide output from the get_recommendations API.\n\n\
         - place_1: The first location.\n\
         - place_2: The second location."
    }

    fn short_description(&self) -> &str {
        "Calculate distance"
    }

    fn describe(&self, _args: &CallArgs) -> Result<String> {
        Ok("Calculating distances".to_string())
    }

    /// The human-readable distance sentence is the last record.
    fn explain(&self, output: &ToolOutput) -> String {
        match output {
            ToolOutput::Records(records) => records
                .last()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Record(_) => String::new(),
        }
    }

    async fn invoke(&self, args: &CallArgs, _ctx: &RequestContext) -> Result<ToolOutput> {
        let place_1 = Self::place_name(args.require("place_1")?, "place_1")?;
        let place_2 = Self::place_name(args.require("place_2")?, "place_2")?;

        let details_1 = resolve_place(self.api.as_ref(), &place_1).await?;
        let Some(details_1) = details_1.into_iter().next() else {
            return Ok(ToolOutput::Text(format!(
                "No place found for `{}`. Please be more explicit.",
                place_1
            )));
        };
        let details_2 = resolve_place(self.api.as_ref(), &place_2).await?;
        let Some(details_2) = details_2.into_iter().next() else {
            return Ok(ToolOutput::Text(format!(
                "No place found for `{}`. Please be more explicit.",
                place_2
            )));
        };

        let (lat_1, lng_1) = match lat_lng_of(&details_1) {
            Some(coords) => coords,
            None => bail!("place record for `{}` has no coordinates", place_1),
        };
        let (lat_2, lng_2) = match lat_lng_of(&details_2) {
            Some(coords) => coords,
            None => bail!("place record for `{}` has no coordinates", place_2),
        };

        let miles = haversine_km(lng_1, lat_1, lng_2, lat_2) * KM_TO_MILES;
        let sentence = format!(
            "The distance between {} and {} is {:.3} miles",
            place_1, place_2, miles
        );
        Ok(ToolOutput::Records(vec![
            details_1,
            details_2,
            Value::String(sentence),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::super::gmaps::tests::{place, FakePlaces};
    use super::*;
    use serde_json::json;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    fn tool() -> DistanceTool {
        let api = FakePlaces::new()
            .with_place("San Francisco", place("San Francisco", 37.7749, -122.4194))
            .with_place("Los Angeles", place("Los Angeles", 34.0522, -118.2437));
        DistanceTool::new(Arc::new(api))
    }

    fn args(place_1: Value, place_2: Value) -> CallArgs {
        CallArgs::bind(&["place_1", "place_2"], vec![place_1, place_2], vec![]).unwrap()
    }

    #[test]
    fn test_distance_between_cities() {
        let rt = rt();
        rt.block_on(async {
            let tool = tool();
            let output = tool
                .invoke(
                    &args(json!("San Francisco"), json!("Los Angeles")),
                    &RequestContext::default(),
                )
                .await
                .unwrap();

            let explanation = tool.explain(&output);
            assert!(explanation.starts_with("The distance between San Francisco and Los Angeles"));
            assert!(explanation.ends_with("miles"));

            match output {
                ToolOutput::Records(records) => {
                    assert_eq!(records.len(), 3);
                    assert_eq!(records[0]["name"], "San Francisco");
                }
                other => panic!("expected records, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_record_argument_uses_its_name() {
        let rt = rt();
        rt.block_on(async {
            let output = tool()
                .invoke(
                    &args(
                        json!([place("San Francisco", 37.7749, -122.4194)]),
                        json!("Los Angeles"),
                    ),
                    &RequestContext::default(),
                )
                .await
                .unwrap();
            assert_eq!(output.len(), 3);
        });
    }

    #[test]
    fn test_unknown_place_returns_message() {
        let rt = rt();
        rt.block_on(async {
            let output = tool()
                .invoke(
                    &args(json!("Atlantis"), json!("Los Angeles")),
                    &RequestContext::default(),
                )
                .await
                .unwrap();
            assert_eq!(
                output,
                ToolOutput::Text(
                    "No place found for `Atlantis`. Please be more explicit.".to_string()
                )
            );
        });
    }
}
