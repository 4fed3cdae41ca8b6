use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Breakpoint {
    pub breakpoint_id: String,
    /// Where the runtime actually placed the breakpoint.
    pub location: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetBreakpointResponse {
    pub breakpoint_id: String,
    #[serde(default)]
    pub actual_location: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetBreakpointByUrlResponse {
    pub breakpoint_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EvaluateResponse {
    #[serde(default)]
    pub result: Value,
    pub exception_details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyDescriptor {
    #[serde(default)]
    pub name: String,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GetPropertiesResponse {
    #[serde(default)]
    pub result: Vec<PropertyDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnapshotProgress {
    #[serde(default)]
    pub done: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub finished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_breakpoint_response() {
        let response: SetBreakpointResponse = serde_json::from_value(json!({
            "breakpointId": "1:41:0:file:///app/main.ts",
            "actualLocation": { "scriptId": "12", "lineNumber": 41, "columnNumber": 4 }
        }))
        .unwrap();
        assert_eq!(response.breakpoint_id, "1:41:0:file:///app/main.ts");
        assert_eq!(response.actual_location["columnNumber"], 4);
    }

    #[test]
    fn test_evaluate_response_with_exception() {
        let response: EvaluateResponse = serde_json::from_value(json!({
            "result": { "type": "object", "subtype": "error" },
            "exceptionDetails": { "text": "Uncaught ReferenceError" }
        }))
        .unwrap();
        assert!(response.exception_details.is_some());

        let clean: EvaluateResponse =
            serde_json::from_value(json!({ "result": { "type": "number", "value": 2 } })).unwrap();
        assert!(clean.exception_details.is_none());
        assert_eq!(clean.result["value"], 2);
    }

    #[test]
    fn test_progress_defaults() {
        let progress: SnapshotProgress = serde_json::from_value(json!({ "done": 5 })).unwrap();
        assert_eq!(progress.done, 5);
        assert_eq!(progress.total, 0);
        assert!(!progress.finished);
    }
}
