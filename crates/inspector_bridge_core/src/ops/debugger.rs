use crate::types::{
    Breakpoint, EvaluateOnCallFrameRequest, EvaluateRequest, EvaluateResponse,
    GetPropertiesRequest, GetPropertiesResponse, PauseOnExceptions, PropertyDescriptor,
    ScriptLocation, SetBreakpointByUrlRequest, SetBreakpointByUrlResponse, SetBreakpointRequest,
    SetBreakpointResponse,
};
use crate::{CdpError, CdpSession, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

fn params<T: Serialize>(request: &T) -> Result<Option<Value>> {
    Ok(Some(serde_json::to_value(request)?))
}

pub async fn enable_debugger(session: &CdpSession) -> Result<()> {
    session.send("Debugger.enable", None).await?;
    session.send("Runtime.enable", None).await?;
    Ok(())
}

pub async fn disable_debugger(session: &CdpSession) -> Result<()> {
    session.send("Debugger.disable", None).await?;
    Ok(())
}

/// Line and column are zero-based.
pub async fn set_breakpoint(
    session: &CdpSession,
    url: &str,
    line: u32,
    column: u32,
    condition: Option<&str>,
) -> Result<Breakpoint> {
    let request = SetBreakpointRequest {
        location: ScriptLocation {
            script_url: url.to_string(),
            line_number: line,
            column_number: column,
        },
        condition: condition.map(str::to_string),
    };
    let result = session
        .send("Debugger.setBreakpoint", params(&request)?)
        .await?;
    let response: SetBreakpointResponse = serde_json::from_value(result)?;

    tracing::debug!("Breakpoint {} set at {}:{}", response.breakpoint_id, url, line);
    Ok(Breakpoint {
        breakpoint_id: response.breakpoint_id,
        location: response.actual_location,
    })
}

/// Works for scripts that have not been parsed yet.
pub async fn set_breakpoint_by_url(
    session: &CdpSession,
    url_regex: &str,
    line: u32,
    column: u32,
    condition: Option<&str>,
) -> Result<String> {
    let request = SetBreakpointByUrlRequest {
        url_regex: url_regex.to_string(),
        line_number: line,
        column_number: column,
        condition: condition.map(str::to_string),
    };
    let result = session
        .send("Debugger.setBreakpointByUrl", params(&request)?)
        .await?;
    let response: SetBreakpointByUrlResponse = serde_json::from_value(result)?;
    Ok(response.breakpoint_id)
}

pub async fn remove_breakpoint(session: &CdpSession, breakpoint_id: &str) -> Result<()> {
    session
        .send(
            "Debugger.removeBreakpoint",
            Some(json!({ "breakpointId": breakpoint_id })),
        )
        .await?;
    Ok(())
}

pub async fn pause(session: &CdpSession) -> Result<()> {
    session.send("Debugger.pause", None).await?;
    Ok(())
}

pub async fn resume(session: &CdpSession) -> Result<()> {
    session.send("Debugger.resume", None).await?;
    Ok(())
}

pub async fn step_over(session: &CdpSession) -> Result<()> {
    session.send("Debugger.stepOver", None).await?;
    Ok(())
}

pub async fn step_into(session: &CdpSession) -> Result<()> {
    session.send("Debugger.stepInto", None).await?;
    Ok(())
}

pub async fn step_out(session: &CdpSession) -> Result<()> {
    session.send("Debugger.stepOut", None).await?;
    Ok(())
}

pub async fn set_pause_on_exceptions(session: &CdpSession, state: PauseOnExceptions) -> Result<()> {
    session
        .send("Debugger.setPauseOnExceptions", Some(json!({ "state": state })))
        .await?;
    Ok(())
}

/// Frames recorded by the last `Debugger.paused` event; empty while running.
pub async fn get_call_frames(session: &CdpSession) -> Vec<Value> {
    session.call_frames().await
}

/// Evaluates on a paused call frame when `call_frame_id` is given, otherwise
/// in the global runtime context. Returns the resulting remote object.
pub async fn evaluate(
    session: &CdpSession,
    expression: &str,
    call_frame_id: Option<&str>,
    context_id: Option<i64>,
) -> Result<Value> {
    let result = match call_frame_id {
        Some(frame) => {
            let request = EvaluateOnCallFrameRequest {
                call_frame_id: frame.to_string(),
                expression: expression.to_string(),
            };
            session
                .send("Debugger.evaluateOnCallFrame", params(&request)?)
                .await?
        }
        None => {
            let request = EvaluateRequest {
                expression: expression.to_string(),
                context_id,
            };
            session.send("Runtime.evaluate", params(&request)?).await?
        }
    };

    let response: EvaluateResponse = serde_json::from_value(result)?;
    if let Some(details) = response.exception_details {
        let text = details
            .get("exception")
            .and_then(|e| e.get("description"))
            .or_else(|| details.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| details.to_string());
        return Err(CdpError::Evaluation(text));
    }
    Ok(response.result)
}

pub async fn get_properties(session: &CdpSession, object_id: &str) -> Result<Vec<PropertyDescriptor>> {
    let request = GetPropertiesRequest {
        object_id: object_id.to_string(),
        own_properties: true,
    };
    let result = session
        .send("Runtime.getProperties", params(&request)?)
        .await?;
    let response: GetPropertiesResponse = serde_json::from_value(result)?;
    Ok(response.result)
}

/// Variables visible from a paused frame, keyed by name. Inner scopes shadow
/// outer ones. Unknown frame ids yield an empty map.
pub async fn get_scope_variables(
    session: &CdpSession,
    call_frame_id: &str,
) -> Result<HashMap<String, Value>> {
    let frames = session.call_frames().await;
    let Some(frame) = frames
        .iter()
        .find(|f| f.get("callFrameId").and_then(Value::as_str) == Some(call_frame_id))
    else {
        return Ok(HashMap::new());
    };

    let object_ids: Vec<&str> = frame
        .get("scopeChain")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|scope| scope.get("object")?.get("objectId")?.as_str())
        .collect();

    let mut variables = HashMap::new();
    for object_id in object_ids {
        for property in get_properties(session, object_id).await? {
            if property.name.is_empty() {
                continue;
            }
            variables
                .entry(property.name)
                .or_insert_with(|| property.value.unwrap_or(Value::Null));
        }
    }
    Ok(variables)
}
