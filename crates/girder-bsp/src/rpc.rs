//! JSON-RPC 2.0 message envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A JSON-RPC request id. JSON-RPC 2.0 allows both numbers and strings;
/// clients use both in the wild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(id) => write!(f, "{id}"),
            RequestId::String(id) => write!(f, "{id}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ResponseError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn ok(id: RequestId, result: impl Serialize) -> Response {
        Response {
            id,
            result: Some(serde_json::to_value(result).expect("result must serialize")),
            error: None,
        }
    }

    pub fn err(id: RequestId, code: i64, message: impl Into<String>) -> Response {
        Response {
            id,
            result: None,
            error: Some(ResponseError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// One decoded protocol message.
///
/// Untagged: a request has `id` + `method`, a notification only `method`,
/// a response `id` without `method` — the variant order below disambiguates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Notification> for Message {
    fn from(notification: Notification) -> Self {
        Message::Notification(notification)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_notification_and_response_disambiguate() {
        let request: Message = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0", "id": 1, "method": "workspace/buildTargets"
        }))
        .unwrap();
        assert!(matches!(request, Message::Request(_)));

        let notification: Message = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0", "method": "build/initialized", "params": {}
        }))
        .unwrap();
        assert!(matches!(notification, Message::Notification(_)));

        let response: Message = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0", "id": "abc", "result": {"ok": true}
        }))
        .unwrap();
        assert!(matches!(response, Message::Response(_)));
    }

    #[test]
    fn string_and_numeric_ids_both_parse() {
        let a: RequestId = serde_json::from_value(serde_json::json!(7)).unwrap();
        let b: RequestId = serde_json::from_value(serde_json::json!("seven")).unwrap();
        assert_eq!(a, RequestId::Number(7));
        assert_eq!(b, RequestId::String("seven".to_string()));
    }

    #[test]
    fn error_responses_omit_result() {
        let response = Response::err(RequestId::Number(4), -32602, "bad params");
        let json = serde_json::to_value(Message::Response(response)).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["code"], -32602);
    }
}
