use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An RPC call: `{method, params?, id?}`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// Wire format: `{ id, success, result?, error?: { code, message } }`.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// JSON-RPC error numbers, used internally for routing.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Map numeric error codes to the string codes sent on the wire.
pub fn error_code_to_string(code: i32) -> &'static str {
    match code {
        PARSE_ERROR => "PARSE_ERROR",
        INVALID_REQUEST => "INVALID_REQUEST",
        METHOD_NOT_FOUND => "METHOD_NOT_FOUND",
        INVALID_PARAMS => "INVALID_PARAMS",
        INTERNAL_ERROR => "INTERNAL_ERROR",
        _ => "UNKNOWN_ERROR",
    }
}

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcError {
                code: error_code_to_string(code).to_string(),
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn method_not_found(id: Option<serde_json::Value>, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, msg)
    }

    pub fn internal_error(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR, msg)
    }

    pub fn parse_error() -> Self {
        Self::error(None, PARSE_ERROR, "Parse error")
    }
}

/// Extract a required string param from the RPC params object.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

/// Extract a required integer param.
pub fn require_i64(params: &serde_json::Value, key: &str) -> Result<i64, String> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| format!("Missing required integer parameter: {key}"))
}

/// Deserialize a typed payload from the params object (or one of its keys).
pub fn parse<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T, String> {
    serde_json::from_value(value.clone()).map_err(|e| format!("Invalid params: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rpc_request() {
        let json = r#"{"method":"todos.create","params":{"title":"milk"},"id":1}"#;
        let req: RpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "todos.create");
        assert!(req.params.is_some());
        assert_eq!(req.id, Some(serde_json::json!(1)));
    }

    #[test]
    fn params_and_id_are_optional() {
        let req: RpcRequest = serde_json::from_str(r#"{"method":"todos.list"}"#).unwrap();
        assert!(req.params.is_none());
        assert!(req.id.is_none());
    }

    #[test]
    fn success_response_serializes() {
        let resp = RpcResponse::success(Some(serde_json::json!(1)), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn null_result_is_still_sent() {
        let resp = RpcResponse::success(None, serde_json::Value::Null);
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.as_object().unwrap().contains_key("result"));
        assert!(json["result"].is_null());
    }

    #[test]
    fn error_response_serializes() {
        let resp = RpcResponse::method_not_found(Some(serde_json::json!(1)), "foo.bar");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "METHOD_NOT_FOUND");
        assert!(json["error"]["message"].as_str().unwrap().contains("foo.bar"));
        assert!(json.get("result").is_none());
    }

    #[test]
    fn error_code_maps_to_string() {
        assert_eq!(error_code_to_string(PARSE_ERROR), "PARSE_ERROR");
        assert_eq!(error_code_to_string(INVALID_REQUEST), "INVALID_REQUEST");
        assert_eq!(error_code_to_string(INVALID_PARAMS), "INVALID_PARAMS");
        assert_eq!(error_code_to_string(INTERNAL_ERROR), "INTERNAL_ERROR");
        assert_eq!(error_code_to_string(-1), "UNKNOWN_ERROR");
    }

    #[test]
    fn required_params() {
        let params = serde_json::json!({"id": "todo_1", "index": 2, "priority": 3});
        assert_eq!(require_str(&params, "id").unwrap(), "todo_1");
        assert!(require_str(&params, "priority").is_err());
        assert_eq!(require_i64(&params, "index").unwrap(), 2);
        assert!(require_i64(&params, "id").is_err());
        assert!(require_i64(&params, "missing").is_err());
    }

    #[test]
    fn typed_parse_reports_errors() {
        #[derive(Debug, Deserialize)]
        struct Payload {
            #[allow(dead_code)]
            title: String,
        }
        assert!(parse::<Payload>(&serde_json::json!({"title": "x"})).is_ok());
        let err = parse::<Payload>(&serde_json::json!({})).unwrap_err();
        assert!(err.starts_with("Invalid params"), "got: {err}");
    }
}
