//! Nearby-places tool: keyword search within a radius of a resolved
//! location, annotated with distances.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::gmaps::{
    haversine_km, lat_lng_of, resolve_place, PlacesApi, KM_TO_MILES, METERS_PER_MILE,
};
use super::{CallArgs, PlaceArg, Tool};
use crate::types::{RequestContext, ToolOutput};

const DEFAULT_RADIUS_MILES: f64 = 50.0;

pub struct NearbyPlacesTool {
    api: Arc<dyn PlacesApi>,
}

impl NearbyPlacesTool {
    pub fn new(api: Arc<dyn PlacesApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for NearbyPlacesTool {
    fn name(&self) -> &str {
        "find_places_near_location"
    }

    fn params(&self) -> &[&str] {
        &["type_of_place", "location", "radius_miles"]
    }

    fn signature(&self) -> &str {
        "(type_of_place: list, location: str, radius_miles: int = 50)"
    }

    fn docs(&self) -> &str {
        "Find places close to a very defined location.\n\n\
         - type_of_place (list): The type of place. This can be something like 'restaurant' or 'airport'. Make sure that it is a physical location. You can provide multiple words.\n\
         - location (str): The location for the search. This can be a city's name, region, or anything that specifies the location.\n\
         - radius_miles (int): Optional. The max distance from the described location to limit the search. Distance is specified in miles."
    }

    fn short_description(&self) -> &str {
        "Look for places"
    }

    fn describe(&self, args: &CallArgs) -> Result<String> {
        let location = match args.require("location")? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let radius = args.f64_arg("radius_miles", DEFAULT_RADIUS_MILES);
        let kinds = match args.require("type_of_place")? {
            Value::Array(items) if items.len() > 1 => {
                let joined: Vec<String> = items
                    .iter()
                    .map(|i| i.as_str().unwrap_or_default().to_string())
                    .collect();
                format!("types: {}", joined.join(", "))
            }
            Value::Array(items) => format!(
                "type: {}",
                items
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
            ),
            Value::String(s) => format!("type: {}", s),
            other => format!("type: {}", other),
        };
        Ok(format!(
            "Looking for places near {} within {} with the following {}",
            location, radius, kinds
        ))
    }

    fn explain(&self, output: &ToolOutput) -> String {
        if output.len() > 1 {
            format!("Found {} places!", output.len())
        } else {
            "Found 1 place!".to_string()
        }
    }

    async fn invoke(&self, args: &CallArgs, _ctx: &RequestContext) -> Result<ToolOutput> {
        let location = args.require("location")?;
        let resolved = match PlaceArg::from_value(location) {
            Some(PlaceArg::Details(records)) => records,
            Some(PlaceArg::Name(name)) => resolve_place(self.api.as_ref(), &name).await?,
            None => Vec::new(),
        };
        let Some(details) = resolved.into_iter().next() else {
            return Ok(ToolOutput::empty());
        };
        let anchor_name = details
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let Some((lat, lng)) = lat_lng_of(&details) else {
            return Ok(ToolOutput::empty());
        };

        let keyword = args.string_list("type_of_place")?.join(" ");
        let radius_miles = args.f64_arg("radius_miles", DEFAULT_RADIUS_MILES);
        let found = self
            .api
            .nearby_search(lat, lng, &keyword, radius_miles * METERS_PER_MILE)
            .await?;

        // Annotate with distance from the anchor, dropping the anchor
        // itself (zero distance), closest first.
        let mut annotated: Vec<(f64, Value)> = Vec::new();
        for mut place in found {
            let Some((place_lat, place_lng)) = lat_lng_of(&place) else {
                continue;
            };
            let km = haversine_km(lng, lat, place_lng, place_lat);
            if km == 0.0 {
                continue;
            }
            let miles = km * KM_TO_MILES;
            place["distance"] = Value::String(format!("{} miles from {}", miles, anchor_name));
            annotated.push((miles, place));
        }
        annotated.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(ToolOutput::Records(
            annotated.into_iter().map(|(_, place)| place).collect(),
        ))
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

    fn tool_with_nearby(nearby: Vec<Value>) -> NearbyPlacesTool {
        let mut api = FakePlaces::new().with_place("Austin", place("Austin", 30.27, -97.74));
        api.nearby_results = nearby;
        NearbyPlacesTool::new(Arc::new(api))
    }

    fn args(kinds: Value, location: Value) -> CallArgs {
        CallArgs::bind(
            &["type_of_place", "location", "radius_miles"],
            vec![kinds, location],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_annotates_and_sorts_by_distance() {
        let rt = rt();
        rt.block_on(async {
            let tool = tool_with_nearby(vec![
                place("Far Diner", 31.0, -98.5),
                place("Near Diner", 30.3, -97.75),
                place("Austin", 30.27, -97.74), // the anchor itself
            ]);
            let output = tool
                .invoke(
                    &args(json!(["restaurant"]), json!("Austin")),
                    &RequestContext::default(),
                )
                .await
                .unwrap();

            match output {
                ToolOutput::Records(records) => {
                    assert_eq!(records.len(), 2, "anchor must be dropped");
                    assert_eq!(records[0]["name"], "Near Diner");
                    assert_eq!(records[1]["name"], "Far Diner");
                    let distance = records[0]["distance"].as_str().unwrap();
                    assert!(distance.ends_with("miles from Austin"), "{}", distance);
                }
                other => panic!("expected records, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_unresolved_location_is_empty() {
        let rt = rt();
        rt.block_on(async {
            let tool = tool_with_nearby(vec![]);
            let output = tool
                .invoke(
                    &args(json!(["hostel"]), json!("Atlantis")),
                    &RequestContext::default(),
                )
                .await
                .unwrap();
            assert!(output.is_empty());
        });
    }

    #[test]
    fn test_describe_lists_types() {
        let tool = tool_with_nearby(vec![]);
        assert_eq!(
            tool.describe(&args(json!(["restaurant"]), json!("Austin")))
                .unwrap(),
            "Looking for places near Austin within 50 with the following type: restaurant"
        );
        assert_eq!(
            tool.describe(&args(json!(["bar", "cafe"]), json!("Austin")))
                .unwrap(),
            "Looking for places near Austin within 50 with the following types: bar, cafe"
        );
    }
}
