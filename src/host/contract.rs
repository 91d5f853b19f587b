//! Wire envelopes for the browser host bridge.
//!
//! One JSON object per line in each direction. The worker sends `hello` once,
//! then `command` envelopes; the browser shim sends `event` envelopes and a
//! `reply` for every command.

use crate::browser::{Tab, TabId};
use crate::runtime::BrowserEvent;
use serde::{Deserialize, Serialize};

/// Protocol version announced in the `hello` envelope.
pub const PROTOCOL_VERSION: u32 = 1;

/// Tab operation requested from the browser shim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BrowserCommand {
    /// Active tab of the focused window.
    QueryActiveTab,
    /// Look up one tab.
    GetTab { tab_id: TabId },
    /// Reload a tab.
    Reload { tab_id: TabId },
    /// Point a tab at a URL.
    Navigate { tab_id: TabId, url: String },
    /// Inject a blocking alert into the page.
    Alert { tab_id: TabId, message: String },
}

/// Worker-to-browser envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Sent once when the bridge starts.
    Hello { version: u32, machine_id: String },
    /// Request; answered by an [`Inbound::Reply`] with the same id.
    Command { id: u64, command: BrowserCommand },
}

/// Browser-to-worker envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Browser event.
    Event { event: BrowserEvent },
    /// Answer to a command.
    Reply(Reply),
}

/// Answer to one [`Outbound::Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Id of the command being answered.
    pub id: u64,
    /// Whether the browser call succeeded.
    #[serde(default)]
    pub ok: bool,
    /// Tab payload for tab queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<Tab>,
    /// Failure description when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    /// Successful reply, optionally carrying a tab.
    pub fn ok(id: u64, tab: Option<Tab>) -> Self {
        Self {
            id,
            ok: true,
            tab,
            error: None,
        }
    }

    /// Failed reply.
    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            tab: None,
            error: Some(message.into()),
        }
    }
}
