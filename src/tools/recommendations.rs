//! Recommendations tool: topic search biased to a resolved coordinate.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::gmaps::{lat_lng_of, PlacesApi};
use super::{CallArgs, PlaceArg, Tool};
use crate::types::{RequestContext, ToolOutput};

pub struct RecommendationsTool {
    api: Arc<dyn PlacesApi>,
}

impl RecommendationsTool {
    pub fn new(api: Arc<dyn PlacesApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for RecommendationsTool {
    fn name(&self) -> &str {
        "get_recommendations"
    }

    fn params(&self) -> &[&str] {
        &["topics", "lat_long"]
    }

    fn signature(&self) -> &str {
        "(topics: list, lat_long: tuple)"
    }

    fn docs(&self) -> &str {
        "Returns the recommendations for a specific topic that is of interest. Remember, a topic IS NOT an establishment. For establishments, please use another function.\n\n\
         - topics (list): A list of topics of interest to pull recommendations for. Can be multiple words.\n\
         - lat_long (tuple): The lat_long of interest."
    }

    fn short_description(&self) -> &str {
        "Read recommendations"
    }

    fn describe(&self, args: &CallArgs) -> Result<String> {
        let topics = args.string_list("topics")?;
        let text = if topics.len() > 1 {
            format!("topics: {}", topics.join(", "))
        } else {
            format!("topic: {}", topics.first().cloned().unwrap_or_default())
        };
        Ok(format!(
            "Reading recommendations for the following {}",
            text
        ))
    }

    fn explain(&self, output: &ToolOutput) -> String {
        format!("Read {} recommendations", output.len())
    }

    async fn invoke(&self, args: &CallArgs, _ctx: &RequestContext) -> Result<ToolOutput> {
        let topics = args.string_list("topics")?;
        // A missing or unresolved coordinate degrades to no results
        // rather than failing the call.
        let lat_long = args.require("lat_long")?;
        let coords = PlaceArg::from_value(lat_long)
            .as_ref()
            .and_then(PlaceArg::details)
            .and_then(|records| records.first())
            .and_then(lat_lng_of);
        let Some((lat, lng)) = coords else {
            return Ok(ToolOutput::empty());
        };

        let topic = topics.join(" ");
        let results = self.api.text_search(&topic, lat, lng).await?;
        Ok(ToolOutput::Records(results))
    }
}
