//! Supabase realtime (Phoenix channels) protocol messages.

use crate::{ChangeEvent, ChangeFilter, RowChange};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub(crate) const EVENT_JOIN: &str = "phx_join";
pub(crate) const EVENT_LEAVE: &str = "phx_leave";
pub(crate) const EVENT_REPLY: &str = "phx_reply";
pub(crate) const EVENT_ERROR: &str = "phx_error";
pub(crate) const EVENT_CLOSE: &str = "phx_close";
pub(crate) const EVENT_HEARTBEAT: &str = "heartbeat";
pub(crate) const EVENT_ACCESS_TOKEN: &str = "access_token";
pub(crate) const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";

const PHOENIX_TOPIC: &str = "phoenix";

/// A message on the realtime socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    /// Join a channel listening for row changes matching `filter`.
    pub fn join(topic: &str, filter: &ChangeFilter, access_token: Option<&str>, msg_ref: &str) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": filter.collection.table(),
                    "filter": filter.expression(),
                }],
            },
        });
        if let Some(token) = access_token {
            payload["access_token"] = json!(token);
        }
        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload,
            msg_ref: Some(msg_ref.to_string()),
            join_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn leave(topic: &str, msg_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    /// Push a rotated session token to an already joined channel.
    pub fn access_token(topic: &str, token: &str, msg_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_ACCESS_TOKEN.to_string(),
            payload: json!({ "access_token": token }),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Status of a `phx_reply` (`ok` or `error`).
    pub fn reply_status(&self) -> Option<&str> {
        if self.event != EVENT_REPLY {
            return None;
        }
        self.payload.get("status").and_then(Value::as_str)
    }

    /// Extracts the row change carried by a `postgres_changes` message.
    pub fn postgres_change(&self) -> Option<RowChange> {
        if self.event != EVENT_POSTGRES_CHANGES {
            return None;
        }
        let data = self.payload.get("data")?;
        let table = data.get("table")?.as_str()?.to_string();
        let event = match data.get("type")?.as_str()? {
            "INSERT" => ChangeEvent::Insert,
            "UPDATE" => ChangeEvent::Update,
            "DELETE" => ChangeEvent::Delete,
            _ => return None,
        };

        let record = match event {
            ChangeEvent::Delete => data.get("old_record"),
            _ => data.get("record"),
        }
        .cloned()
        .unwrap_or(Value::Null);

        let user_id = crate::records::owner_of(&record)
            .or_else(|| data.get("old_record").and_then(crate::records::owner_of));

        Some(RowChange {
            table,
            event,
            user_id,
            record,
        })
    }
}
