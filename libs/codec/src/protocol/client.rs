//! # Client Wire Envelopes
//!
//! Every frame carries exactly one body. Field names are kept to one or two
//! characters because the same structures are written by both encodings and
//! the binary encoding stores field names as map keys.
//!
//! ```text
//! client → server                         server → client
//! {"b":{"rr":{"i":1,"n":"inc","a":[5]}}}  {"b":{"i":{"ai":..,"ci":..,"ct":..}}}
//! {"b":{"sr":{"e":"changed","s":true}}}   {"b":{"ro":{"i":1,"o":5}}}
//!                                         {"b":{"er":{"c":..,"m":..,"md":..,"ri":1}}}
//!                                         {"b":{"ev":{"n":"changed","a":[5]}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToServer {
    #[serde(rename = "b")]
    pub body: ToServerBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToServerBody {
    #[serde(rename = "rr")]
    ActionRequest(ActionRequest),
    #[serde(rename = "sr")]
    SubscriptionRequest(SubscriptionRequest),
}

/// Invoke an action; `id` is chosen by the client and echoed back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "i")]
    pub id: u64,
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "a", default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "e")]
    pub event_name: String,
    #[serde(rename = "s")]
    pub subscribe: bool,
}

impl ToServer {
    pub fn action(id: u64, name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            body: ToServerBody::ActionRequest(ActionRequest {
                id,
                name: name.into(),
                args,
            }),
        }
    }

    pub fn subscription(event_name: impl Into<String>, subscribe: bool) -> Self {
        Self {
            body: ToServerBody::SubscriptionRequest(SubscriptionRequest {
                event_name: event_name.into(),
                subscribe,
            }),
        }
    }

    /// Action id carried by the frame, if any
    pub fn action_id(&self) -> Option<u64> {
        match &self.body {
            ToServerBody::ActionRequest(req) => Some(req.id),
            ToServerBody::SubscriptionRequest(_) => None,
        }
    }
}

/// Frame sent to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToClient {
    #[serde(rename = "b")]
    pub body: ToClientBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToClientBody {
    #[serde(rename = "i")]
    Init(Init),
    #[serde(rename = "ro")]
    ActionResponse(ActionResponse),
    #[serde(rename = "er")]
    Error(ErrorFrame),
    #[serde(rename = "ev")]
    Event(Event),
}

/// Handshake reply carrying the reconnection credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Init {
    #[serde(rename = "ai")]
    pub actor_id: String,
    #[serde(rename = "ci")]
    pub connection_id: String,
    #[serde(rename = "ct")]
    pub connection_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(rename = "i")]
    pub id: u64,
    #[serde(rename = "o")]
    pub output: Value,
}

/// Structured error; `related_action_id` is set when an action call failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    #[serde(rename = "c")]
    pub code: String,
    #[serde(rename = "m")]
    pub message: String,
    #[serde(rename = "md", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(rename = "ri", default, skip_serializing_if = "Option::is_none")]
    pub related_action_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "a", default)]
    pub args: Vec<Value>,
}

impl ToClient {
    pub fn init(actor_id: &str, connection_id: &str, connection_token: &str) -> Self {
        Self {
            body: ToClientBody::Init(Init {
                actor_id: actor_id.to_string(),
                connection_id: connection_id.to_string(),
                connection_token: connection_token.to_string(),
            }),
        }
    }

    pub fn action_response(id: u64, output: Value) -> Self {
        Self {
            body: ToClientBody::ActionResponse(ActionResponse { id, output }),
        }
    }

    /// Error frame; a `null` metadata value is dropped
    pub fn error(
        code: impl Into<String>,
        message: impl Into<String>,
        metadata: Option<Value>,
        related_action_id: Option<u64>,
    ) -> Self {
        Self {
            body: ToClientBody::Error(ErrorFrame {
                code: code.into(),
                message: message.into(),
                metadata: metadata.filter(|md| !md.is_null()),
                related_action_id,
            }),
        }
    }

    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            body: ToClientBody::Event(Event {
                name: name.into(),
                args,
            }),
        }
    }
}
