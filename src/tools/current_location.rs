//! Current-location tool: IP geolocation of the requesting client.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::gmaps::PlacesApi;
use super::{CallArgs, Tool};
use crate::types::{RequestContext, ToolOutput};

/// Returned whenever geolocation is unavailable, so downstream calls
/// always have a usable location string.
pub const FALLBACK_LOCATION: &str = "San Francisco, California, US";

pub struct CurrentLocationTool {
    api: Arc<dyn PlacesApi>,
}

impl CurrentLocationTool {
    pub fn new(api: Arc<dyn PlacesApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for CurrentLocationTool {
    fn name(&self) -> &str {
        "get_current_location"
    }

    fn params(&self) -> &[&str] {
        &[]
    }

    fn signature(&self) -> &str {
        "()"
    }

    fn docs(&self) -> &str {
        "Returns the current location. ONLY use this if the user has not provided an explicit location in the query."
    }

    fn short_description(&self) -> &str {
        "Finding your city"
    }

    fn describe(&self, _args: &CallArgs) -> Result<String> {
        Ok("Finding your city".to_string())
    }

    fn explain(&self, output: &ToolOutput) -> String {
        match output {
            ToolOutput::Text(city) => format!("Found you in {}!", city),
            _ => "Found you!".to_string(),
        }
    }

    async fn invoke(&self, _args: &CallArgs, ctx: &RequestContext) -> Result<ToolOutput> {
        let location = match self.api.locate_ip(ctx.client_ip.as_deref()).await {
            Ok(location) => location,
            Err(_) => FALLBACK_LOCATION.to_string(),
        };
        Ok(ToolOutput::Text(location))
    }
}

#[cfg(test)]
mod tests {
    use super::super::gmaps::tests::FakePlaces;
    use super::*;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    #[test]
    fn test_locates_via_backend() {
        let rt = rt();
        rt.block_on(async {
            let mut api = FakePlaces::new();
            api.location = "Austin, Texas, US".to_string();
            let tool = CurrentLocationTool::new(Arc::new(api));

            let ctx = RequestContext::with_client_ip("203.0.113.9");
            let output = tool.invoke(&CallArgs::default(), &ctx).await.unwrap();
            assert_eq!(output, ToolOutput::Text("Austin, Texas, US".to_string()));
            assert_eq!(tool.explain(&output), "Found you in Austin, Texas, US!");
        });
    }

    #[test]
    fn test_describe_is_constant() {
        let api = Arc::new(FakePlaces::new());
        let tool = CurrentLocationTool::new(api);
        assert_eq!(tool.describe(&CallArgs::default()).unwrap(), "Finding your city");
    }
}
