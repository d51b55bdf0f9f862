//! Script execution on top of the correlation engine.
//!
//! `Runtime.evaluate` answers with a *two-level* result: the response
//! envelope's `result` field holds an evaluation container whose own
//! `result` field holds the remote object, and only that object's `value`
//! is the evaluated value. Flattening a level silently loses the value,
//! so the nesting is modeled explicitly here.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::cdp::{CdpClient, ResponseEnvelope};
use crate::error::BrowserError;

/// Outer evaluation container: `envelope.result`.
#[derive(Debug, Deserialize)]
pub struct EvaluateResult {
    /// The remote object describing the evaluated value.
    pub result: RemoteObject,
    /// Present when the script threw.
    #[serde(rename = "exceptionDetails", default)]
    pub exception_details: Option<Value>,
}

/// Inner remote-object container: `envelope.result.result`.
#[derive(Debug, Deserialize)]
pub struct RemoteObject {
    #[serde(rename = "type", default)]
    pub object_type: String,
    /// The plain value, present because we evaluate with `returnByValue`.
    #[serde(default)]
    pub value: Option<Value>,
}

/// Wrap a script body in an immediately-invoked function expression so a
/// bare `return` inside it is legal.
pub fn wrap_script(body: &str) -> String {
    format!("(function() {{ {body} }})()")
}

impl CdpClient {
    /// Evaluate a script body in the page and return its value.
    ///
    /// The body runs inside an IIFE with `returnByValue` and
    /// `awaitPromise`, so it may `return` a plain structure or a promise
    /// of one. No interpretation of the value happens here; anything that
    /// prevents a plain value from coming back (envelope-level error,
    /// thrown exception, missing nested value) is an
    /// [`BrowserError::Evaluation`] carrying the raw envelope.
    pub async fn evaluate(
        &self,
        script_body: &str,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        let expression = wrap_script(script_body);
        let envelope = self
            .send_command(
                "Runtime.evaluate",
                serde_json::json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
                timeout,
            )
            .await?;

        unwrap_evaluation(envelope)
    }
}

/// Unwrap the two-level evaluation envelope into the evaluated value.
pub fn unwrap_evaluation(envelope: ResponseEnvelope) -> Result<Value, BrowserError> {
    let raw = raw_envelope(&envelope);

    if let Some(err) = &envelope.error {
        return Err(BrowserError::Evaluation {
            detail: format!("remote rejected evaluation: {} ({})", err.message, err.code),
            raw,
        });
    }

    let outer = match &envelope.result {
        Some(v) => v.clone(),
        None => {
            return Err(BrowserError::Evaluation {
                detail: "response carried neither result nor error".into(),
                raw,
            })
        }
    };

    let eval: EvaluateResult = match serde_json::from_value(outer) {
        Ok(e) => e,
        Err(e) => {
            return Err(BrowserError::Evaluation {
                detail: format!("malformed evaluation result: {e}"),
                raw,
            })
        }
    };

    if let Some(exception) = &eval.exception_details {
        let description = exception
            .get("exception")
            .and_then(|e| e.get("description"))
            .and_then(|d| d.as_str())
            .or_else(|| exception.get("text").and_then(|t| t.as_str()))
            .unwrap_or("unknown exception");
        return Err(BrowserError::Evaluation {
            detail: format!("script threw: {description}"),
            raw,
        });
    }

    match eval.result.value {
        Some(value) => Ok(value),
        None => Err(BrowserError::Evaluation {
            detail: format!(
                "evaluation produced no value (type: {})",
                eval.result.object_type
            ),
            raw,
        }),
    }
}

/// Reconstruct the envelope as JSON for diagnostics.
fn raw_envelope(envelope: &ResponseEnvelope) -> Value {
    let mut raw = serde_json::json!({ "id": envelope.id });
    if let Some(result) = &envelope.result {
        raw["result"] = result.clone();
    }
    if let Some(err) = &envelope.error {
        raw["error"] = serde_json::json!({
            "code": err.code,
            "message": err.message,
            "data": err.data,
        });
    }
    raw
}
