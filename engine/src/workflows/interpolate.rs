// Template interpolation for action configs
//
// Substitutes {{dotted.path}} tokens against the record a workflow is
// acting on. Resolution never fails: anything unresolvable renders as an
// empty string so a bad template degrades instead of aborting a step.

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").expect("valid token regex"))
}

/// Replace every `{{dotted.path}}` token in `template` with the value
/// found at that path in `record`.
pub fn interpolate(template: &str, record: &JsonValue) -> String {
    let mut result = template.to_string();

    for cap in token_regex().captures_iter(template) {
        let path = cap[1].trim();
        let rendered = resolve_path(record, path)
            .map(render_value)
            .unwrap_or_default();
        result = result.replace(&cap[0], &rendered);
    }

    result
}

/// List the token paths referenced by a template, in order of first
/// appearance. Used for authoring-time validation of action configs.
pub fn extract_variables(template: &str) -> Vec<String> {
    let mut variables = Vec::new();

    for cap in token_regex().captures_iter(template) {
        let path = cap[1].trim().to_string();
        if !variables.contains(&path) {
            variables.push(path);
        }
    }

    variables
}

/// Walk a JSON config and interpolate every string in place. Used for
/// webhook headers and bodies where templates nest inside structures.
pub fn interpolate_json(value: &JsonValue, record: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(interpolate(s, record)),
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_json(v, record)))
                .collect(),
        ),
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|v| interpolate_json(v, record)).collect())
        }
        _ => value.clone(),
    }
}

fn resolve_path<'a>(record: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = record;

    for part in path.split('.') {
        current = current.get(part)?;
    }

    Some(current)
}

fn render_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => render_string(s),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        JsonValue::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Date-typed values render human-readable; everything else passes
/// through.
fn render_string(s: &str) -> String {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
        return datetime.format("%B %-d, %Y").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.format("%B %-d, %Y").to_string();
    }

    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_substitution() {
        let record = json!({"owner": {"firstName": "Ada"}});
        assert_eq!(
            interpolate("Hello {{owner.firstName}}", &record),
            "Hello Ada"
        );
    }

    #[test]
    fn test_null_parent_renders_empty() {
        let record = json!({"owner": null});
        assert_eq!(interpolate("Hello {{owner.firstName}}", &record), "Hello ");
    }

    #[test]
    fn test_missing_path_renders_empty() {
        let record = json!({"name": "Rex"});
        assert_eq!(
            interpolate("{{species}} called {{name}}", &record),
            " called Rex"
        );
    }

    #[test]
    fn test_numbers_and_bools() {
        let record = json!({"kennel": 7, "confirmed": true});
        assert_eq!(
            interpolate("kennel {{kennel}}, confirmed: {{confirmed}}", &record),
            "kennel 7, confirmed: true"
        );
    }

    #[test]
    fn test_date_values_are_formatted() {
        let record = json!({"check_in": "2026-08-01", "updated": "2026-08-01T09:30:00+00:00"});
        assert_eq!(interpolate("{{check_in}}", &record), "August 1, 2026");
        assert_eq!(interpolate("{{updated}}", &record), "August 1, 2026");
    }

    #[test]
    fn test_arrays_join_with_commas() {
        let record = json!({"tags": ["vip", "senior", 3]});
        assert_eq!(interpolate("{{tags}}", &record), "vip, senior, 3");
    }

    #[test]
    fn test_nested_objects_render_as_json() {
        let record = json!({"owner": {"firstName": "Ada"}});
        assert_eq!(interpolate("{{owner}}", &record), r#"{"firstName":"Ada"}"#);
    }

    #[test]
    fn test_extract_variables_dedupes_in_order() {
        let variables =
            extract_variables("{{pet.name}} and {{owner.email}} and {{pet.name}}");
        assert_eq!(variables, vec!["pet.name", "owner.email"]);
    }

    #[test]
    fn test_interpolate_json_walks_structures() {
        let record = json!({"name": "Rex", "id": "abc"});
        let config = json!({
            "url": "https://hooks.example/{{id}}",
            "payload": {"pet": "{{name}}", "count": 3},
            "tags": ["{{name}}"]
        });

        let interpolated = interpolate_json(&config, &record);
        assert_eq!(interpolated["url"], "https://hooks.example/abc");
        assert_eq!(interpolated["payload"]["pet"], "Rex");
        assert_eq!(interpolated["payload"]["count"], 3);
        assert_eq!(interpolated["tags"][0], "Rex");
    }

    #[test]
    fn test_no_tokens_passes_through() {
        assert_eq!(interpolate("plain text", &json!({})), "plain text");
        assert!(extract_variables("plain text").is_empty());
    }
}
