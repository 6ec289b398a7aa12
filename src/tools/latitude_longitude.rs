//! Place resolution tool: location text to a place detail record with
//! coordinates.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::gmaps::{resolve_place, PlacesApi};
use super::{CallArgs, PlaceArg, Tool};
use crate::types::{RequestContext, ToolOutput};

pub struct LatitudeLongitudeTool {
    api: Arc<dyn PlacesApi>,
}

impl LatitudeLongitudeTool {
    pub fn new(api: Arc<dyn PlacesApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for LatitudeLongitudeTool {
    fn name(&self) -> &str {
        "get_latitude_longitude"
    }

    fn params(&self) -> &[&str] {
        &["location"]
    }

    fn signature(&self) -> &str {
        "(location: str)"
    }

    fn docs(&self) -> &str {
        "Given a city name, this function provides the latitude and longitude of the specific location.\n\n\
         - location: This can be a city like 'Austin', or a place like 'Austin Airport', etc."
    }

    fn short_description(&self) -> &str {
        "Convert to coordinates"
    }

    fn describe(&self, args: &CallArgs) -> Result<String> {
        let location = args.require("location")?;
        let shown = match location {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Ok(format!(
            "Converting {} into latitude and longitude coordinates",
            shown
        ))
    }

    fn explain(&self, _output: &ToolOutput) -> String {
        "Converted!".to_string()
    }

    async fn invoke(&self, args: &CallArgs, _ctx: &RequestContext) -> Result<ToolOutput> {
        let location = args.require("location")?;
        match PlaceArg::from_value(location) {
            // Already-resolved detail records pass straight through.
            Some(PlaceArg::Details(records)) => Ok(ToolOutput::Records(records)),
            Some(PlaceArg::Name(name)) => {
                let details = resolve_place(self.api.as_ref(), &name).await?;
                Ok(ToolOutput::Records(details))
            }
            None => Ok(ToolOutput::empty()),
        }
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

    fn tool() -> LatitudeLongitudeTool {
        let api = FakePlaces::new().with_place("Austin", place("Austin", 30.27, -97.74));
        LatitudeLongitudeTool::new(Arc::new(api))
    }

    fn args_for(location: Value) -> CallArgs {
        CallArgs::bind(&["location"], vec![location], vec![]).unwrap()
    }

    #[test]
    fn test_resolves_name_to_details() {
        let rt = rt();
        rt.block_on(async {
            let output = tool()
                .invoke(&args_for(json!("Austin")), &RequestContext::default())
                .await
                .unwrap();
            match output {
                ToolOutput::Records(records) => {
                    assert_eq!(records.len(), 1);
                    assert_eq!(records[0]["name"], "Austin");
                }
                other => panic!("expected records, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_detail_list_passes_through() {
        let rt = rt();
        rt.block_on(async {
            let details = json!([place("Somewhere", 1.0, 2.0)]);
            let output = tool()
                .invoke(&args_for(details.clone()), &RequestContext::default())
                .await
                .unwrap();
            assert_eq!(output, ToolOutput::Records(vec![place("Somewhere", 1.0, 2.0)]));
        });
    }

    #[test]
    fn test_unknown_place_is_empty() {
        let rt = rt();
        rt.block_on(async {
            let output = tool()
                .invoke(&args_for(json!("Atlantis")), &RequestContext::default())
                .await
                .unwrap();
            assert!(output.is_empty());
        });
    }

    #[test]
    fn test_null_location_is_empty() {
        let rt = rt();
        rt.block_on(async {
            let output = tool()
                .invoke(&args_for(Value::Null), &RequestContext::default())
                .await
                .unwrap();
            assert!(output.is_empty());
        });
    }

    #[test]
    fn test_describe_mentions_location() {
        let description = tool().describe(&args_for(json!("Austin"))).unwrap();
        assert_eq!(
            description,
            "Converting Austin into latitude and longitude coordinates"
        );
    }
}
