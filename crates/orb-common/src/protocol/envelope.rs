//! Request parsing and the result envelope.

use serde_json::{json, Value};

use super::error::{InvokeError, ParseError};
use super::fixups::{self, FixUp};
use crate::escape;

/// Denotes that the call was a success.
pub const CODE_SUCCESS: i32 = 0;

/// Denotes that an exception was raised by the invoked method.
pub const CODE_REMOTE_EXCEPTION: i32 = 490;

/// Client-side connection or transport failure. Never produced by the
/// bridge itself; reserved so both peers agree on the code space.
pub const CODE_ERR_TRANSPORT: i32 = 550;

/// Denotes that an error occurred while parsing the request.
pub const CODE_ERR_PARSE: i32 = 590;

/// Denotes that no method was found with the given name and arity.
pub const CODE_ERR_NOMETHOD: i32 = 591;

/// Denotes that an error occurred while unmarshalling the arguments.
pub const CODE_ERR_UNMARSHAL: i32 = 592;

/// Denotes that an error occurred while marshalling the result.
pub const CODE_ERR_MARSHAL: i32 = 593;

/// The error message shown when the request could not be parsed.
pub const MSG_ERR_PARSE: &str = "couldn't parse request arguments";

/// The error message shown when no method was found.
pub const MSG_ERR_NOMETHOD: &str = "method not found (session may have timed out)";

/// A decoded request, with inbound fixups already replayed against the
/// params array.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub id: Value,
    pub method: String,
    pub params: Vec<Value>,
    /// The inbound fixups, kept so the bridge can re-link native argument
    /// identity after unmarshalling.
    pub fixups: Vec<FixUp>,
}

/// Decodes a request envelope.
///
/// The `fixups` member is accepted in both wire forms and applied to the
/// request tree before `params` is extracted, so duplicate slots hold real
/// values by the time overload resolution inspects them.
pub fn parse_request(raw: &Value) -> Result<RpcRequest, ParseError> {
    let request = raw.as_object().ok_or(ParseError::NotAnObject)?;
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingMethod)?
        .to_string();
    let id = request.get("id").cloned().unwrap_or(Value::Null);

    let fixups = match request.get("fixups") {
        Some(raw_fixups) => fixups::parse_fixups(raw_fixups)?,
        None => Vec::new(),
    };

    let mut tree = raw.clone();
    fixups::apply_fixups(&mut tree, &fixups)?;

    let params = tree
        .get("params")
        .and_then(Value::as_array)
        .cloned()
        .ok_or(ParseError::MissingParams)?;

    Ok(RpcRequest {
        id,
        method,
        params,
        fixups,
    })
}

/// Container for a JSON-RPC result message: successful results, error
/// results, and remote exception results.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: Value,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Success { result: Value, fixups: Vec<FixUp> },
    Error {
        code: i32,
        msg: String,
        trace: Option<String>,
    },
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self::success_with_fixups(id, result, Vec::new())
    }

    pub fn success_with_fixups(id: Value, result: Value, fixups: Vec<FixUp>) -> Self {
        RpcResponse {
            id,
            body: ResponseBody::Success { result, fixups },
        }
    }

    pub fn error(id: Value, code: i32, msg: impl Into<String>) -> Self {
        RpcResponse {
            id,
            body: ResponseBody::Error {
                code,
                msg: msg.into(),
                trace: None,
            },
        }
    }

    /// Builds the code-490 envelope for a failed invocation, carrying the
    /// original error's message and trace text verbatim.
    pub fn remote_exception(id: Value, error: &InvokeError) -> Self {
        RpcResponse {
            id,
            body: ResponseBody::Error {
                code: CODE_REMOTE_EXCEPTION,
                msg: error.message.clone(),
                trace: error.trace.clone(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.body, ResponseBody::Success { .. })
    }

    /// The error code, `CODE_SUCCESS` for successful responses.
    pub fn error_code(&self) -> i32 {
        match &self.body {
            ResponseBody::Success { .. } => CODE_SUCCESS,
            ResponseBody::Error { code, .. } => *code,
        }
    }

    /// The result value of a successful response.
    pub fn result(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Success { result, .. } => Some(result),
            ResponseBody::Error { .. } => None,
        }
    }

    /// The fixups of a successful response.
    pub fn fixups(&self) -> &[FixUp] {
        match &self.body {
            ResponseBody::Success { fixups, .. } => fixups,
            ResponseBody::Error { .. } => &[],
        }
    }

    /// The envelope as a JSON tree. Success envelopes carry a `fixups`
    /// member only when the marshaller produced any.
    pub fn to_value(&self) -> Value {
        match &self.body {
            ResponseBody::Success { result, fixups } => {
                let mut envelope = json!({
                    "id": self.id,
                    "result": result,
                });
                if !fixups.is_empty() {
                    envelope["fixups"] = fixups::to_wire_value(fixups);
                }
                envelope
            }
            ResponseBody::Error { code, msg, trace } => {
                let mut error = json!({
                    "code": code,
                    "msg": msg,
                });
                if let Some(trace) = trace {
                    error["trace"] = Value::String(trace.clone());
                }
                json!({
                    "id": self.id,
                    "error": error,
                })
            }
        }
    }

    /// Serializes the envelope in the ASCII-clean wire encoding.
    pub fn to_wire(&self) -> serde_json::Result<String> {
        escape::to_ascii_json(&self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request_basic() {
        let raw = json!({"id": 1, "method": "svc.echo", "params": [42, "hi"]});
        let req = parse_request(&raw).expect("parse");
        assert_eq!(req.id, json!(1));
        assert_eq!(req.method, "svc.echo");
        assert_eq!(req.params, vec![json!(42), json!("hi")]);
        assert!(req.fixups.is_empty());
    }

    #[test]
    fn test_parse_request_missing_method() {
        let raw = json!({"id": 1, "params": []});
        assert!(matches!(
            parse_request(&raw),
            Err(ParseError::MissingMethod)
        ));
    }

    #[test]
    fn test_parse_request_missing_params() {
        let raw = json!({"id": 1, "method": "svc.echo"});
        assert!(matches!(
            parse_request(&raw),
            Err(ParseError::MissingParams)
        ));
        let raw = json!({"id": 1, "method": "svc.echo", "params": {"not": "an array"}});
        assert!(matches!(
            parse_request(&raw),
            Err(ParseError::MissingParams)
        ));
    }

    #[test]
    fn test_parse_request_applies_fixups() {
        let raw = json!({
            "id": 7,
            "method": "svc.pair",
            "params": [{"n": 1}, null],
            "fixups": "params[1]=params[0]",
        });
        let req = parse_request(&raw).expect("parse");
        assert_eq!(req.params[1], json!({"n": 1}));
        assert_eq!(req.fixups.len(), 1);
    }

    #[test]
    fn test_success_envelope_without_fixups() {
        let response = RpcResponse::success(json!(1), json!(42));
        assert_eq!(response.to_value(), json!({"id": 1, "result": 42}));
        assert_eq!(response.error_code(), CODE_SUCCESS);
    }

    #[test]
    fn test_success_envelope_with_fixups() {
        let fixups = fixups::parse_fixups(&json!("result[1]=result[0]")).expect("parse");
        let response = RpcResponse::success_with_fixups(json!(1), json!([{"n": 1}, null]), fixups);
        let envelope = response.to_value();
        assert_eq!(
            envelope["fixups"],
            json!([[["result", "[1]"], ["result", "[0]"]]])
        );
    }

    #[test]
    fn test_error_envelope() {
        let response = RpcResponse::error(json!(3), CODE_ERR_NOMETHOD, MSG_ERR_NOMETHOD);
        assert_eq!(
            response.to_value(),
            json!({"id": 3, "error": {"code": 591, "msg": MSG_ERR_NOMETHOD}})
        );
        assert!(!response.is_success());
    }

    #[test]
    fn test_remote_exception_envelope() {
        let error = InvokeError::with_trace("boom", "svc::explode\n  at line 3");
        let response = RpcResponse::remote_exception(json!(9), &error);
        let envelope = response.to_value();
        assert_eq!(envelope["error"]["code"], json!(CODE_REMOTE_EXCEPTION));
        assert_eq!(envelope["error"]["msg"], json!("boom"));
        assert_eq!(envelope["error"]["trace"], json!("svc::explode\n  at line 3"));
    }
}
