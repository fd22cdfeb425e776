//! The application-level JSON-RPC envelope carried *inside* relay payloads
//! (§3 `ClientSyncJSONRPC`) — distinct from the relay's own
//! `waku_*` envelope in `relay_rpc::rpc`, which merely transports these
//! opaque hex blobs.

use {
    crate::domain::{Participant, Relay},
    relay_rpc::domain::Topic,
    serde::{Deserialize, Serialize},
};

/// `pairing_approve` request params (§4.6 responder step 4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingApprove {
    pub responder: Participant,
    pub expiry: i64,
    pub state: Option<serde_json::Value>,
}

/// `pairing_payload` request params: a carrier for a nested request sent
/// over the pairing's settled topic (§4.7 "pre-settlement" channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingPayload {
    pub request: Box<Request>,
}

/// `session_propose` request params (§4.7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPropose {
    pub topic: Topic,
    pub relay: Relay,
    pub proposer: Participant,
    pub permissions: ProposedPermissions,
}

/// The proposer-side half of [`Permissions`] before a controller key is
/// known (it's decided at approve time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedPermissions {
    pub blockchains: std::collections::HashSet<String>,
    pub jsonrpc_methods: std::collections::HashSet<String>,
}

/// `session_approve` request params (§4.7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionApprove {
    pub responder: Participant,
    pub expiry: i64,
    pub accounts: Vec<String>,
    pub state: Option<serde_json::Value>,
}

/// `session_reject` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReject {
    pub reason: String,
}

/// `session_delete` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDelete {
    pub reason: SessionDeleteReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDeleteReason {
    pub code: u32,
    pub message: String,
}

/// `session_payload` request params: a host-application JSON-RPC call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub request: AppRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

/// The opaque host-application method call carried by [`SessionPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRequest {
    pub method: String,
    pub params: serde_json::Value,
}

/// `session_update` request params. Stubbed (§9 open question): wire format
/// reserved, local state is not mutated when sent or received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub permissions: ProposedPermissions,
}

/// `session_upgrade` request params. Stubbed, see [`SessionUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpgrade {
    pub permissions: ProposedPermissions,
}

/// The method-tagged request parameter union (§3 `ClientSyncJSONRPC`).
/// Carries `PairingPing`/`SessionPing` as reserved, answerable no-ops (§9
/// open question; SPEC_FULL §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Method {
    #[serde(rename = "pairing_approve")]
    PairingApprove(PairingApprove),
    #[serde(rename = "pairing_payload")]
    PairingPayload(PairingPayload),
    #[serde(rename = "pairing_ping")]
    PairingPing(()),
    #[serde(rename = "session_propose")]
    SessionPropose(SessionPropose),
    #[serde(rename = "session_approve")]
    SessionApprove(SessionApprove),
    #[serde(rename = "session_reject")]
    SessionReject(SessionReject),
    #[serde(rename = "session_delete")]
    SessionDelete(SessionDelete),
    #[serde(rename = "session_payload")]
    SessionPayload(SessionPayload),
    #[serde(rename = "session_update")]
    SessionUpdate(SessionUpdate),
    #[serde(rename = "session_upgrade")]
    SessionUpgrade(SessionUpgrade),
    #[serde(rename = "session_ping")]
    SessionPing(()),
}

pub const JSON_RPC_VERSION: &str = "2.0";

/// The application-level JSON-RPC request envelope (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: i64,
    pub jsonrpc: String,
    #[serde(flatten)]
    pub method: Method,
}

impl Request {
    pub fn new(id: i64, method: Method) -> Self {
        Self {
            id,
            jsonrpc: JSON_RPC_VERSION.to_owned(),
            method,
        }
    }
}

/// The application-level JSON-RPC response envelope (§3): `{id, result}` or
/// `{id, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Success {
        id: i64,
        jsonrpc: String,
        result: serde_json::Value,
    },
    Error {
        id: i64,
        jsonrpc: String,
        error: ResponseError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
}

impl Response {
    pub fn success(id: i64, result: serde_json::Value) -> Self {
        Self::Success {
            id,
            jsonrpc: JSON_RPC_VERSION.to_owned(),
            result,
        }
    }

    pub fn error(id: i64, code: i32, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            jsonrpc: JSON_RPC_VERSION.to_owned(),
            error: ResponseError {
                code,
                message: message.into(),
            },
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::Success { id, .. } | Self::Error { id, .. } => *id,
        }
    }
}

/// Discriminates an inbound engine-level JSON-RPC payload, the same way the
/// relay façade (§4.4) classifies raw bytes before routing them.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Request(Request),
    Response(Response),
}

impl Payload {
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        if json.get("method").is_some() {
            serde_json::from_value(json.clone()).ok().map(Self::Request)
        } else if json.get("result").is_some() || json.get("error").is_some() {
            serde_json::from_value(json.clone()).ok().map(Self::Response)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_method_tag() {
        let req = Request::new(
            1,
            Method::SessionPing(()),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["method"], "session_ping");

        let round_tripped: Request = serde_json::from_value(json).unwrap();
        assert_eq!(round_tripped, req);
    }

    #[test]
    fn response_success_round_trips() {
        let resp = Response::success(7, serde_json::json!(true));
        let json = serde_json::to_value(&resp).unwrap();
        let round_tripped: Response = serde_json::from_value(json).unwrap();
        assert_eq!(round_tripped, resp);
        assert_eq!(round_tripped.id(), 7);
    }

    #[test]
    fn response_error_round_trips() {
        let resp = Response::error(9, -32000, "nope");
        let json = serde_json::to_value(&resp).unwrap();
        let round_tripped: Response = serde_json::from_value(json).unwrap();
        assert_eq!(round_tripped, resp);
    }

    #[test]
    fn payload_from_json_classifies_request_and_response() {
        let req = Request::new(1, Method::SessionPing(()));
        let req_json = serde_json::to_value(&req).unwrap();
        assert!(matches!(Payload::from_json(&req_json), Some(Payload::Request(_))));

        let resp = Response::success(1, serde_json::json!(true));
        let resp_json = serde_json::to_value(&resp).unwrap();
        assert!(matches!(
            Payload::from_json(&resp_json),
            Some(Payload::Response(_))
        ));
    }
}
