//! Places backend boundary.
//!
//! The `PlacesApi` trait is the seam between the tools and the outside
//! world: Google Maps place lookup/search plus IP geolocation. The
//! production implementation is `GoogleMapsClient`; tests swap in an
//! in-memory fake.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

pub const KM_TO_MILES: f64 = 0.621371;
pub const METERS_PER_MILE: f64 = 1609.34;

/// Opaque external place services, one method per upstream endpoint.
#[async_trait]
pub trait PlacesApi: Send + Sync {
    /// Text query to place candidates. Empty when nothing matched.
    async fn find_place(&self, query: &str) -> Result<Vec<Value>>;

    /// Full detail record for one candidate.
    async fn place_details(&self, place_id: &str) -> Result<Value>;

    /// Free-text search biased to a coordinate.
    async fn text_search(&self, query: &str, lat: f64, lng: f64) -> Result<Vec<Value>>;

    /// Keyword search within a radius (meters) of a coordinate.
    async fn nearby_search(
        &self,
        lat: f64,
        lng: f64,
        keyword: &str,
        radius_meters: f64,
    ) -> Result<Vec<Value>>;

    /// Best-effort "City, Region, CC" for the given client IP.
    async fn locate_ip(&self, ip: Option<&str>) -> Result<String>;
}

/// Resolve a place query to its detail record, as a one-element list
/// (empty when the query matched nothing). Always uses the first
/// candidate.
pub async fn resolve_place(api: &dyn PlacesApi, query: &str) -> Result<Vec<Value>> {
    let candidates = api.find_place(query).await?;
    let place_id = match candidates
        .first()
        .and_then(|c| c.get("place_id"))
        .and_then(Value::as_str)
    {
        Some(id) => id.to_string(),
        None => return Ok(Vec::new()),
    };
    let details = api.place_details(&place_id).await?;
    Ok(vec![details])
}

/// Great-circle distance in kilometers between two points given in
/// decimal degrees, rounded to two decimals.
pub fn haversine_km(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (
        lon1.to_radians(),
        lat1.to_radians(),
        lon2.to_radians(),
        lat2.to_radians(),
    );
    let dlon = lon2 - lon1;
    let dlat = lat2 - lat1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    let r = 6371.0; // Earth radius in kilometers
    (c * r * 100.0).round() / 100.0
}

/// Pull the coordinate out of a place detail record.
pub fn lat_lng_of(record: &Value) -> Option<(f64, f64)> {
    let location = record.get("geometry")?.get("location")?;
    Some((
        location.get("lat")?.as_f64()?,
        location.get("lng")?.as_f64()?,
    ))
}

// --- Production client ---

/// Google Maps web-service client plus ip-api.com geolocation.
pub struct GoogleMapsClient {
    api_key: String,
    client: reqwest::Client,
}

const PLACES_BASE: &str = "https://maps.googleapis.com/maps/api/place";

impl GoogleMapsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("places API error ({}): {}", status, body);
        }
        response
            .json()
            .await
            .with_context(|| format!("invalid JSON from {}", url))
    }

    fn results_if_ok(body: Value, field: &str) -> Vec<Value> {
        if body.get("status").and_then(Value::as_str) != Some("OK") {
            return Vec::new();
        }
        match body.get(field) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl PlacesApi for GoogleMapsClient {
    async fn find_place(&self, query: &str) -> Result<Vec<Value>> {
        let url = format!("{}/findplacefromtext/json", PLACES_BASE);
        let body = self
            .get_json(
                &url,
                &[
                    ("input", query.to_string()),
                    ("inputtype", "textquery".to_string()),
                    ("locationbias", "ipbias".to_string()),
                    ("fields", "place_id,name,formatted_address".to_string()),
                    ("key", self.api_key.clone()),
                ],
            )
            .await?;
        Ok(Self::results_if_ok(body, "candidates"))
    }

    async fn place_details(&self, place_id: &str) -> Result<Value> {
        let url = format!("{}/details/json", PLACES_BASE);
        let body = self
            .get_json(
                &url,
                &[
                    ("place_id", place_id.to_string()),
                    ("key", self.api_key.clone()),
                ],
            )
            .await?;
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn text_search(&self, query: &str, lat: f64, lng: f64) -> Result<Vec<Value>> {
        let url = format!("{}/textsearch/json", PLACES_BASE);
        let body = self
            .get_json(
                &url,
                &[
                    ("query", query.to_string()),
                    ("location", format!("{},{}", lat, lng)),
                    ("key", self.api_key.clone()),
                ],
            )
            .await?;
        Ok(Self::results_if_ok(body, "results"))
    }

    async fn nearby_search(
        &self,
        lat: f64,
        lng: f64,
        keyword: &str,
        radius_meters: f64,
    ) -> Result<Vec<Value>> {
        let url = format!("{}/nearbysearch/json", PLACES_BASE);
        let body = self
            .get_json(
                &url,
                &[
                    ("location", format!("{},{}", lat, lng)),
                    ("keyword", keyword.to_string()),
                    ("radius", format!("{}", radius_meters)),
                    ("key", self.api_key.clone()),
                ],
            )
            .await?;
        Ok(Self::results_if_ok(body, "results"))
    }

    async fn locate_ip(&self, ip: Option<&str>) -> Result<String> {
        let url = format!("http://ip-api.com/json/{}", ip.unwrap_or(""));
        let body: Value = self
            .client
            .get(&url)
            .send()
            .await
            .context("IP geolocation request failed")?
            .json()
            .await
            .context("invalid JSON from IP geolocation")?;
        let city = body
            .get("city")
            .and_then(Value::as_str)
            .context("geolocation response missing city")?;
        let region = body
            .get("regionName")
            .and_then(Value::as_str)
            .context("geolocation response missing region")?;
        let country = body
            .get("countryCode")
            .and_then(Value::as_str)
            .context("geolocation response missing country")?;
        Ok(format!("{}, {}, {}", city, region, country))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    /// In-memory stand-in for the place services: a fixed set of known
    /// places keyed by the query substring that finds them.
    pub struct FakePlaces {
        pub places: HashMap<String, Value>,
        pub search_results: Vec<Value>,
        pub nearby_results: Vec<Value>,
        pub location: String,
    }

    impl FakePlaces {
        pub fn new() -> Self {
            Self {
                places: HashMap::new(),
                search_results: Vec::new(),
                nearby_results: Vec::new(),
                location: "San Francisco, California, US".to_string(),
            }
        }

        pub fn with_place(mut self, query: &str, details: Value) -> Self {
            self.places.insert(query.to_string(), details);
            self
        }
    }

    #[async_trait]
    impl PlacesApi for FakePlaces {
        async fn find_place(&self, query: &str) -> Result<Vec<Value>> {
            match self
                .places
                .iter()
                .find(|(known, _)| query.contains(known.as_str()))
            {
                Some((known, _)) => Ok(vec![json!({ "place_id": known })]),
                None => Ok(Vec::new()),
            }
        }

        async fn place_details(&self, place_id: &str) -> Result<Value> {
            Ok(self.places.get(place_id).cloned().unwrap_or(Value::Null))
        }

        async fn text_search(&self, _query: &str, _lat: f64, _lng: f64) -> Result<Vec<Value>> {
            Ok(self.search_results.clone())
        }

        async fn nearby_search(
            &self,
            _lat: f64,
            _lng: f64,
            _keyword: &str,
            _radius_meters: f64,
        ) -> Result<Vec<Value>> {
            Ok(self.nearby_results.clone())
        }

        async fn locate_ip(&self, _ip: Option<&str>) -> Result<String> {
            Ok(self.location.clone())
        }
    }

    pub fn place(name: &str, lat: f64, lng: f64) -> Value {
        json!({
            "name": name,
            "formatted_address": format!("{} St", name),
            "geometry": { "location": { "lat": lat, "lng": lng } },
        })
    }

    #[test]
    fn test_haversine_known_distance() {
        // San Francisco to Los Angeles, roughly 559 km.
        let km = haversine_km(-122.4194, 37.7749, -118.2437, 34.0522);
        assert!((km - 559.0).abs() < 5.0, "got {}", km);
    }

    #[test]
    fn test_haversine_zero() {
        assert_eq!(haversine_km(-97.74, 30.27, -97.74, 30.27), 0.0);
    }

    #[test]
    fn test_lat_lng_of() {
        let record = place("Austin", 30.27, -97.74);
        assert_eq!(lat_lng_of(&record), Some((30.27, -97.74)));
        assert_eq!(lat_lng_of(&json!({})), None);
    }

    #[test]
    fn test_resolve_place_via_fake() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let api = FakePlaces::new().with_place("Austin", place("Austin", 30.27, -97.74));
            let resolved = resolve_place(&api, "Austin").await.unwrap();
            assert_eq!(resolved.len(), 1);
            assert_eq!(resolved[0]["name"], "Austin");

            let missing = resolve_place(&api, "Atlantis").await.unwrap();
            assert!(missing.is_empty());
        });
    }
}
