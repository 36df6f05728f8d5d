//! Prompt - app assembly templates and reply parsing
//!
//! Atelier asks the model for a small app described as JSON: a name, a
//! title, and a list of UI components with their wiring. Models wrap JSON
//! in prose and code fences more often than not, so parsing is tolerant:
//! the first balanced JSON object found in the reply wins.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One UI component of a generated app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppComponent {
    /// Component type name, resolved through the component registry
    #[serde(rename = "type")]
    pub component_type: String,
    /// Free-form component properties
    #[serde(default)]
    pub props: serde_json::Value,
}

/// A small app as described by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedApp {
    /// Machine name, usable as a state key
    pub name: String,
    /// Window title
    pub title: String,
    /// Components to mount, in order
    pub components: Vec<AppComponent>,
    /// When the description was parsed
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Build the prompt for assembling an app from `description`.
#[must_use]
pub fn build_app_prompt(description: &str) -> String {
    format!(
        "You assemble small desktop applications from short descriptions.\n\
         Reply with a single JSON object and nothing else, shaped like:\n\
         {{\"name\": \"timer\", \"title\": \"Timer\", \"components\": \
         [{{\"type\": \"display\", \"props\": {{}}}}]}}\n\
         Component types must come from this palette: display, input, button, \
         list, chart.\n\n\
         Description: {description}"
    )
}

/// Parse a model reply into a [`GeneratedApp`].
///
/// Accepts raw JSON, fenced JSON, or JSON embedded in prose.
pub fn parse_app_reply(reply: &str) -> Result<GeneratedApp> {
    let json = extract_json_object(reply)
        .ok_or_else(|| Error::InvalidReply("no JSON object in reply".to_string()))?;
    let app: GeneratedApp = serde_json::from_str(json)
        .map_err(|e| Error::InvalidReply(format!("malformed app description: {e}")))?;
    if app.name.is_empty() {
        return Err(Error::InvalidReply("app name is empty".to_string()));
    }
    if app.components.is_empty() {
        return Err(Error::InvalidReply("app has no components".to_string()));
    }
    Ok(app)
}

/// First balanced top-level JSON object in `text`, if any.
///
/// Brace counting ignores braces inside string literals and escapes.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_carries_description() {
        let prompt = build_app_prompt("a pomodoro timer");
        assert!(prompt.contains("a pomodoro timer"));
        assert!(prompt.contains("JSON"));
    }

    #[test]
    fn test_parse_raw_json_reply() {
        let app = parse_app_reply(
            r#"{"name":"timer","title":"Timer","components":[{"type":"display"}]}"#,
        )
        .unwrap();
        assert_eq!(app.name, "timer");
        assert_eq!(app.components.len(), 1);
        assert_eq!(app.components[0].component_type, "display");
        assert_eq!(app.components[0].props, serde_json::Value::Null);
    }

    #[test]
    fn test_parse_fenced_reply_with_prose() {
        let reply = "Here is your app:\n```json\n{\"name\":\"notes\",\"title\":\"Notes\",\
                     \"components\":[{\"type\":\"input\",\"props\":{\"placeholder\":\"jot {it}\"}}]}\
                     \n```\nEnjoy!";
        let app = parse_app_reply(reply).unwrap();
        assert_eq!(app.name, "notes");
        assert_eq!(app.components[0].props, json!({"placeholder": "jot {it}"}));
    }

    #[test]
    fn test_parse_rejects_reply_without_json() {
        assert!(matches!(
            parse_app_reply("I cannot help with that."),
            Err(Error::InvalidReply(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_component_list() {
        let reply = r#"{"name":"blank","title":"Blank","components":[]}"#;
        assert!(matches!(
            parse_app_reply(reply),
            Err(Error::InvalidReply(_))
        ));
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_extraction() {
        let reply = r#"note {"name":"x","title":"{{weird}}","components":[{"type":"display"}]} end"#;
        let app = parse_app_reply(reply).unwrap();
        assert_eq!(app.title, "{{weird}}");
    }
}
