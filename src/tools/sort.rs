//! Result-sorting tool: orders place records by distance, rating, or
//! price.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{CallArgs, Tool};
use crate::types::{RequestContext, ToolOutput};

pub struct SortResultsTool;

fn sort_key(record: &Value, key: &str) -> f64 {
    // Records without the key sort to the far end.
    record.get(key).and_then(Value::as_f64).unwrap_or(f64::INFINITY)
}

/// Sort records by `sort` ("price" is stored as "price_level"),
/// optionally keeping only the first n.
pub fn sort_records(
    mut records: Vec<Value>,
    sort: &str,
    descending: bool,
    first_n: Option<usize>,
) -> Vec<Value> {
    if sort.is_empty() {
        return records;
    }
    let key = if sort == "price" { "price_level" } else { sort };
    records.sort_by(|a, b| {
        let (ka, kb) = (sort_key(a, key), sort_key(b, key));
        if descending {
            kb.total_cmp(&ka)
        } else {
            ka.total_cmp(&kb)
        }
    });
    if let Some(n) = first_n {
        records.truncate(n);
    }
    records
}

#[async_trait]
impl Tool for SortResultsTool {
    fn name(&self) -> &str {
        "sort_results"
    }

    fn params(&self) -> &[&str] {
        &["places", "sort", "descending", "first_n"]
    }

    fn signature(&self) -> &str {
        "(places: list, sort: str, descending: bool = True, first_n: int = None)"
    }

    fn docs(&self) -> &str {
        "Sorts the results by either 'distance', 'rating' or 'price'.\n\n\
         - places (list): The output list from the recommendations.\n\
         - sort (str): If set, sorts by either 'distance' or 'rating' or 'price'. ONLY supports 'distance' or 'rating' or 'price'.\n\
         - descending (bool): If descending is set, setting this boolean to true will sort the results such that the highest values are first.\n\
         - first_n (int): If provided, only retains the first n items in the final sorted list.\n\n\
         When people ask for 'closest' or 'nearest', sort by 'distance'.\n\
         When people ask for 'cheapest' or 'most expensive', sort by 'price'.\n\
         When people ask for 'best' or 'highest rated', sort by rating."
    }

    fn short_description(&self) -> &str {
        "Sorting results"
    }

    fn describe(&self, args: &CallArgs) -> Result<String> {
        let sort = args.str_arg("sort")?;
        let direction = if args.bool_arg("descending", true) {
            "highest to lowest"
        } else {
            "lowest to highest"
        };
        Ok(format!("Sorting results by {} from {}", sort, direction))
    }

    fn explain(&self, _output: &ToolOutput) -> String {
        "Done!".to_string()
    }

    async fn invoke(&self, args: &CallArgs, _ctx: &RequestContext) -> Result<ToolOutput> {
        let places = match args.require("places")? {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            _ => bail!("argument `places` must be a list of records"),
        };
        let sort = match args.get("sort") {
            Some(Value::String(sort)) => sort.clone(),
            _ => String::new(),
        };
        let descending = args.bool_arg("descending", true);
        // first_n of zero means "no truncation", not "keep nothing".
        let first_n = args.opt_usize("first_n").filter(|&n| n > 0);
        Ok(ToolOutput::Records(sort_records(
            places, &sort, descending, first_n,
        )))
    }
}
