//! TDLib adapter (chat membership).
//!
//! Implements the `mxb-core` `ChatService` port over TDLib's JSON interface, reached through an
//! HTTP gateway that owns the TDLib client.
//!
//! # Gateway contract
//!
//! The gateway is a separate process (any thin wrapper around `td_json_client` will do) at
//! `TDLIB_GATEWAY_URL`. This crate relies on exactly one endpoint:
//!
//! - `POST {TDLIB_GATEWAY_URL}/invoke` with a JSON body that is one TDLib request object, e.g.
//!   `{"@type": "getChat", "chat_id": -1001234567890}`. Field names are TDLib's own.
//! - The response body is the TDLib answer to that request as JSON, e.g. a `chat` or
//!   `chatMembers` object. The HTTP status should be 2xx.
//! - A TDLib failure is returned as `{"@type": "error", "code": <i32>, "message": <string>}`,
//!   with either a 2xx or a 4xx/5xx status. Any other non-2xx answer, or a body that is not
//!   JSON, is treated as the gateway being unavailable.
//! - One request per HTTP call; the gateway matches the answer to the request (TDLib `@extra`
//!   is its business, not ours).
//!
//! The gateway is responsible for TDLib authorization: it must already be logged in (as the bot,
//! or as a user account that can see the target groups) before the first `/invoke` arrives. We
//! only call `getMe` at startup to confirm that. Requests used: `getMe`, `getChat`,
//! `getSupergroupMembers`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use mxb_core::{
    chat::{ChatService, MemberFilter, MemberPage, ResolvedChat},
    domain::{ChatId, SupergroupId},
    errors::Error,
    Result,
};

pub mod types;

use types::{TdChat, TdChatMembers, TdError, TdUser};

/// Failure of one gateway call, before it is mapped into the core error type.
#[derive(Debug)]
pub enum CallError {
    /// TDLib answered with an `error` object.
    Td(TdError),
    /// The gateway could not be reached or answered with a non-2xx status.
    Transport(String),
    /// The response was not the object we asked for.
    Decode(serde_json::Error),
}

impl CallError {
    fn into_error(self, method: &str) -> Error {
        match self {
            CallError::Td(e) => Error::ServiceUnavailable(format!(
                "{method}: tdlib error {}: {}",
                e.code, e.message
            )),
            CallError::Transport(msg) => Error::ServiceUnavailable(format!("{method}: {msg}")),
            CallError::Decode(e) => Error::External(format!("{method}: unexpected response: {e}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TdGatewayClient {
    base_url: String,
    http: reqwest::Client,
}

impl TdGatewayClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("tdlib gateway client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn invoke_url(&self) -> String {
        format!("{}/invoke", self.base_url)
    }

    /// Send one TDLib request and decode the answer as `T`.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        request: Value,
    ) -> std::result::Result<T, CallError> {
        tracing::trace!(
            method = request.get("@type").and_then(serde_json::Value::as_str).unwrap_or("?"),
            "tdlib request"
        );
        let resp = self
            .http
            .post(self.invoke_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| CallError::Transport(format!("gateway request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| CallError::Transport(format!("gateway read error: {e}")))?;

        // Gateways relay TDLib errors either as 2xx with an `error` object or as 4xx/5xx.
        let value: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) if status.is_success() => return Err(CallError::Decode(e)),
            Err(_) => {
                return Err(CallError::Transport(format!(
                    "gateway returned {status}: {}",
                    body.chars().take(200).collect::<String>()
                )))
            }
        };

        decode_response(value, status.is_success())
    }

    pub async fn get_me(&self) -> Result<TdUser> {
        self.invoke(json!({ "@type": "getMe" }))
            .await
            .map_err(|e| e.into_error("getMe"))
    }
}

fn decode_response<T: DeserializeOwned>(
    value: Value,
    success: bool,
) -> std::result::Result<T, CallError> {
    if value.get("@type").and_then(Value::as_str) == Some("error") {
        let err: TdError = serde_json::from_value(value).map_err(CallError::Decode)?;
        return Err(CallError::Td(err));
    }
    if !success {
        return Err(CallError::Transport(format!(
            "gateway error: {}",
            value.to_string().chars().take(200).collect::<String>()
        )));
    }
    serde_json::from_value(value).map_err(CallError::Decode)
}

pub fn get_chat_request(chat_id: ChatId) -> Value {
    json!({ "@type": "getChat", "chat_id": chat_id.0 })
}

pub fn get_supergroup_members_request(
    group_id: SupergroupId,
    filter: &MemberFilter,
    limit: u32,
    offset: Option<u32>,
) -> Value {
    let filter = match filter {
        MemberFilter::Search { query } => {
            json!({ "@type": "supergroupMembersFilterSearch", "query": query })
        }
    };
    json!({
        "@type": "getSupergroupMembers",
        "supergroup_id": group_id.0,
        "filter": filter,
        "offset": offset.unwrap_or(0),
        "limit": limit,
    })
}

/// `getChat` answers an unknown or inaccessible chat with a 400.
fn is_chat_not_found(err: &TdError) -> bool {
    err.code == 400 && err.message.to_lowercase().contains("chat not found")
}

#[async_trait]
impl ChatService for TdGatewayClient {
    async fn resolve(&self, chat_id: ChatId) -> Result<ResolvedChat> {
        match self.invoke::<TdChat>(get_chat_request(chat_id)).await {
            Ok(chat) => Ok(chat.into_resolved()),
            Err(CallError::Td(e)) if is_chat_not_found(&e) => {
                Err(Error::ChatNotFound { chat_id })
            }
            Err(e) => Err(e.into_error("getChat")),
        }
    }

    async fn list_members(
        &self,
        group_id: SupergroupId,
        filter: &MemberFilter,
        limit: u32,
        offset: Option<u32>,
    ) -> Result<MemberPage> {
        let req = get_supergroup_members_request(group_id, filter, limit, offset);
        let page: TdChatMembers = self
            .invoke(req)
            .await
            .map_err(|e| e.into_error("getSupergroupMembers"))?;
        Ok(page.into_page())
    }
}
