//! Plan scripts: a JSON list of steps replayed against one engine session.
//!
//! ```json
//! { "steps": [
//!     { "op": "add", "course": "CS2100", "box": "y1s1-1", "target": "cs-found-core" },
//!     { "op": "resolve", "option": "1" },
//!     { "op": "remove", "course": "CS2100", "box": "y1s1-1" },
//!     { "op": "abandon" }
//! ] }
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Script {
    #[serde(default)]
    pub preload: Vec<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Step {
    Add {
        course: String,
        #[serde(rename = "box")]
        box_id: String,
        #[serde(default)]
        target: Option<String>,
    },
    Remove {
        course: String,
        #[serde(rename = "box")]
        box_id: String,
    },
    /// Answer a decision. Without `decision` the pending one is answered.
    Resolve {
        #[serde(default)]
        decision: Option<String>,
        option: String,
    },
    Abandon,
}

impl Script {
    pub(crate) fn parse(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("invalid plan script: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_step_kind() {
        let script = Script::parse(
            r#"{ "steps": [
                { "op": "add", "course": "CS1010", "box": "b1", "target": "core" },
                { "op": "add", "course": "GEA1000", "box": "b2" },
                { "op": "resolve", "option": "0" },
                { "op": "remove", "course": "CS1010", "box": "b1" },
                { "op": "abandon" }
            ] }"#,
        )
        .unwrap();
        assert!(script.preload.is_empty());
        assert_eq!(script.steps.len(), 5);
        assert_eq!(
            script.steps[1],
            Step::Add {
                course: "GEA1000".to_string(),
                box_id: "b2".to_string(),
                target: None,
            }
        );
        assert_eq!(
            script.steps[2],
            Step::Resolve {
                decision: None,
                option: "0".to_string(),
            }
        );
        assert_eq!(script.steps[4], Step::Abandon);
    }

    #[test]
    fn unknown_op_is_an_error() {
        let err = Script::parse(r#"{ "steps": [ { "op": "swap" } ] }"#).unwrap_err();
        assert!(err.starts_with("invalid plan script"));
    }
}
