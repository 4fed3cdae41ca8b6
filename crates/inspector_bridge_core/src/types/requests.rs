use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptLocation {
    pub script_url: String,
    pub line_number: u32,
    pub column_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetBreakpointRequest {
    pub location: ScriptLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlRequest {
    pub url_regex: String,
    pub line_number: u32,
    pub column_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseOnExceptions {
    #[default]
    None,
    Uncaught,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOnCallFrameRequest {
    pub call_frame_id: String,
    pub expression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesRequest {
    pub object_id: String,
    pub own_properties: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeHeapSnapshotRequest {
    pub report_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_breakpoint_wire_shape() {
        let request = SetBreakpointRequest {
            location: ScriptLocation {
                script_url: "file:///app/main.ts".to_string(),
                line_number: 41,
                column_number: 0,
            },
            condition: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "location": {
                    "scriptUrl": "file:///app/main.ts",
                    "lineNumber": 41,
                    "columnNumber": 0
                }
            })
        );
    }

    #[test]
    fn test_optional_fields_are_only_sent_when_set() {
        let by_url = SetBreakpointByUrlRequest {
            url_regex: ".*main\\.ts$".to_string(),
            line_number: 3,
            column_number: 2,
            condition: Some("count > 10".to_string()),
        };
        let value = serde_json::to_value(&by_url).unwrap();
        assert_eq!(value["urlRegex"], ".*main\\.ts$");
        assert_eq!(value["condition"], "count > 10");

        let evaluate = EvaluateRequest {
            expression: "1 + 1".to_string(),
            context_id: None,
        };
        assert_eq!(
            serde_json::to_value(&evaluate).unwrap(),
            json!({ "expression": "1 + 1" })
        );
    }

    #[test]
    fn test_pause_on_exceptions_states() {
        assert_eq!(serde_json::to_value(PauseOnExceptions::None).unwrap(), "none");
        assert_eq!(
            serde_json::to_value(PauseOnExceptions::Uncaught).unwrap(),
            "uncaught"
        );
        assert_eq!(serde_json::to_value(PauseOnExceptions::All).unwrap(), "all");
        assert_eq!(PauseOnExceptions::default(), PauseOnExceptions::None);
    }
}
