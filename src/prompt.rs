//! Prompt construction for the two model calls.
//!
//! The plan prompt lists every registered function as a Python-style
//! definition block and ends with the user query; the summary prompt
//! embeds an allow-list-filtered view of the accumulated results.

use serde_json::Value;

use crate::tools::ToolRegistry;

/// Marker the plan model emits when its call sequence is complete.
pub const PLAN_STOP_MARKER: &str = "<bot_end>";

/// Turn-end marker the summary model leaks into its output.
pub const SUMMARY_END_MARKER: &str = "<|end_of_turn|>";

/// The only user-visible failure text; shown when plan generation or
/// compilation fails as a whole.
pub const ERROR_MESSAGE: &str = "Sorry, I couldn't fulfill your request! Please try again :)";

/// Fields copied from structured results into the summary prompt.
/// Everything else is dropped silently.
pub const SUMMARY_ALLOWED_KEYS: &[&str] = &[
    "author_name",
    "text",
    "for_location",
    "time",
    "author_url",
    "language",
    "original_language",
    "name",
    "opening_hours",
    "rating",
    "user_ratings_total",
    "vicinity",
    "distance",
    "formatted_address",
    "price_level",
    "types",
];

/// Build the plan-generation prompt: one definition block per tool,
/// then the query with its quotes escaped.
pub fn build_plan_prompt(registry: &ToolRegistry, query: &str) -> String {
    let mut definitions = String::new();
    for tool in registry.tools() {
        definitions.push_str(&format!(
            "Function:\ndef {}{}:\n\"\"\"\n{}\n\"\"\"\n\n",
            tool.name(),
            tool.signature(),
            tool.docs()
        ));
    }
    let escaped = query.replace('\'', "\\'").replace('"', "\\\"");
    format!("{}User Query: {}<human_end>Call:", definitions, escaped)
}

fn humanize_key(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten results into the text block the summary model reads. String
/// results pass through verbatim; records become numbered blocks of
/// their allow-listed fields.
pub fn format_results(results: &[Value]) -> String {
    let mut out = String::new();
    for (idx, result) in results.iter().enumerate() {
        match result {
            Value::String(s) => {
                out.push_str(s);
                out.push('\n');
            }
            Value::Object(map) => {
                let mut item = String::new();
                for (key, value) in map {
                    if !SUMMARY_ALLOWED_KEYS.contains(&key.as_str()) {
                        continue;
                    }
                    item.push_str(&format!(
                        "\t{}: {}\n",
                        humanize_key(key),
                        render_value(value)
                    ));
                }
                out.push_str(&format!("Result {}\n{}\n", idx + 1, item));
            }
            other => {
                out.push_str(&render_value(other));
                out.push('\n');
            }
        }
    }
    out
}

/// Build the summarization prompt around the filtered results.
pub fn build_summary_prompt(
    query: &str,
    results: &[Value],
    current_location: &str,
    current_time: &str,
) -> String {
    format!(
        "GPT4 Correct User: Please answer the following query using natural language based on the search results below with no extra hallucinated content. When there is no relevant information in the search results, please do not answer extra information and answer with \"No relevant information\". Please keep your response concise. \n\
         For your reference, the current location is {current_location} and the current time is {current_time}.\n\n\
         Query: {query}\n\n\
         Search results:\n{results}\n\
         {SUMMARY_END_MARKER}GPT4 Correct Assistant: ",
        results = format_results(results),
    )
}

/// The timestamp format the summary prompt uses.
pub fn current_time_string() -> String {
    chrono::Local::now().format("%b %d, %Y %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tests::test_registry;
    use serde_json::json;

    #[test]
    fn test_plan_prompt_lists_functions_and_escapes_query() {
        let registry = test_registry();
        let prompt = build_plan_prompt(&registry, "what's \"good\" nearby?");
        assert!(prompt.contains("Function:\ndef get_latitude_longitude(*args):"));
        assert!(prompt.contains("Function:\ndef get_recommendations(*args):"));
        assert!(prompt.contains("User Query: what\\'s \\\"good\\\" nearby?<human_end>Call:"));
    }

    #[test]
    fn test_format_results_applies_allow_list() {
        let results = vec![
            json!("The distance is 3 miles"),
            json!({"name": "Cafe", "rating": 4.5, "place_id": "secret", "icon": "url"}),
        ];
        let text = format_results(&results);
        assert!(text.starts_with("The distance is 3 miles\n"));
        assert!(text.contains("Result 2\n"));
        assert!(text.contains("\tName: Cafe\n"));
        assert!(text.contains("\tRating: 4.5\n"));
        assert!(!text.contains("secret"));
        assert!(!text.contains("icon"));
    }

    #[test]
    fn test_format_results_keeps_field_order() {
        let record = json!({"rating": 4.5, "name": "Cafe", "vicinity": "Downtown"});
        let text = format_results(&[record]);
        let rating = text.find("\tRating:").unwrap();
        let name = text.find("\tName:").unwrap();
        let vicinity = text.find("\tVicinity:").unwrap();
        assert!(rating < name && name < vicinity, "{}", text);
    }

    #[test]
    fn test_humanize_key() {
        assert_eq!(humanize_key("user_ratings_total"), "User ratings total");
        assert_eq!(humanize_key("name"), "Name");
    }

    #[test]
    fn test_summary_prompt_embeds_context() {
        let prompt = build_summary_prompt(
            "good food nearby?",
            &[json!("one result")],
            "Austin, Texas, US",
            "Aug 27, 2026 12:00:00",
        );
        assert!(prompt.contains("the current location is Austin, Texas, US"));
        assert!(prompt.contains("Query: good food nearby?"));
        assert!(prompt.contains("one result"));
        assert!(prompt.ends_with("GPT4 Correct Assistant: "));
    }
}
