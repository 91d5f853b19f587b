//! Manager operations over the whole status collection.
//!
//! Each worker writes one document; a manager lists them, flags one for
//! review, and answers with an action the worker's enforcer picks up on its
//! next poll. Every write goes through [`CollectionStore`] so these run the
//! same against the REST client and an in-memory fake.

use crate::enforcer::FIELD_ACTION;
use crate::error::{Result, WardenError};
use crate::logger::{FIELD_ACTION_TIMESTAMP, FIELD_ID, FIELD_LINK, FIELD_TEAM_ROLE};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use tabwarden_docstore::{CollectionStore, Document, Fields};
use tracing::{debug, info};

/// Set when the document needs a manager decision; cleared by an action.
pub const FIELD_FLAG: &str = "flag";
/// Time the document was last flagged for review.
pub const FIELD_LAST_FLAGGED: &str = "last flagged";
/// Preferred role field; workers write [`FIELD_TEAM_ROLE`].
pub const FIELD_ROLE: &str = "role";
/// Reviewer notes.
pub const FIELD_REVIEW: &str = "Review";
/// Older name of [`FIELD_REVIEW`].
pub const FIELD_CONTENT_REVIEW: &str = "content review";

/// Document copied by [`add_team_member`] when no template is given.
pub const DEFAULT_TEMPLATE_ID: &str = "workerstatus";

const REVIEW_PREVIEW_CHARS: usize = 60;

/// One worker's status, as shown in the manager table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRow {
    pub doc_id: String,
    pub worker_id: String,
    pub role: String,
    pub last_flagged: Option<DateTime<Utc>>,
    pub review: String,
    pub link: String,
    pub flag: bool,
    pub action: String,
}

impl TeamRow {
    /// Build a row from a listed document. Missing fields read as empty.
    pub fn from_document(doc: &Document) -> Self {
        let fields = &doc.fields;
        let text = |name: &str| fields.string(name).unwrap_or_default().to_owned();
        let role = fields
            .string(FIELD_ROLE)
            .or_else(|| fields.string(FIELD_TEAM_ROLE))
            .unwrap_or_default()
            .to_owned();
        let review = fields
            .string(FIELD_REVIEW)
            .or_else(|| fields.string(FIELD_CONTENT_REVIEW))
            .unwrap_or_default()
            .to_owned();
        Self {
            doc_id: doc.id().unwrap_or_default().to_owned(),
            worker_id: text(FIELD_ID),
            role,
            last_flagged: fields.timestamp(FIELD_LAST_FLAGGED),
            review,
            link: text(FIELD_LINK),
            flag: fields.boolean(FIELD_FLAG).unwrap_or(false),
            action: text(FIELD_ACTION),
        }
    }

    /// Review text cut to 60 characters, with an ellipsis when cut.
    pub fn review_preview(&self) -> String {
        if self.review.chars().count() > REVIEW_PREVIEW_CHARS {
            let cut: String = self.review.chars().take(REVIEW_PREVIEW_CHARS).collect();
            format!("{cut}\u{2026}")
        } else {
            self.review.clone()
        }
    }

    /// `last flagged` as `YYYY-MM-DD HH:MM:SS (n units ago)`, or empty.
    pub fn last_flagged_label(&self, now: DateTime<Utc>) -> String {
        match self.last_flagged {
            Some(ts) => format!("{} {}", ts.format("%Y-%m-%d %H:%M:%S"), elapsed_label(ts, now)),
            None => String::new(),
        }
    }
}

/// Actions a manager can send to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerAction {
    Block,
    Warn,
    Accept,
}

impl ManagerAction {
    /// Wire value stored in the `action` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Warn => "warn",
            Self::Accept => "accept",
        }
    }
}

impl fmt::Display for ManagerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManagerAction {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "warn" => Ok(Self::Warn),
            "accept" => Ok(Self::Accept),
            other => Err(WardenError::Config(format!(
                "unknown action '{other}' (expected block, warn or accept)"
            ))),
        }
    }
}

/// Every document in the collection, newest `last flagged` first.
/// Rows never flagged sort last.
///
/// # Errors
///
/// Returns the store error if the collection cannot be listed.
pub async fn fetch_rows(store: &dyn CollectionStore) -> Result<Vec<TeamRow>> {
    let docs = store.list_documents().await?;
    let mut rows: Vec<TeamRow> = docs.iter().map(TeamRow::from_document).collect();
    rows.sort_by(|a, b| b.last_flagged.cmp(&a.last_flagged));
    debug!(count = rows.len(), "fetched team rows");
    Ok(rows)
}

/// Send `action` to a worker: sets the action, clears the flag and stamps
/// `action_timestamp` with `now`.
///
/// # Errors
///
/// Fails with a not-found store error when the document does not exist.
pub async fn write_action(
    store: &dyn CollectionStore,
    doc_id: &str,
    action: ManagerAction,
    now: DateTime<Utc>,
) -> Result<()> {
    let fields = Fields::new()
        .with_string(FIELD_ACTION, action.as_str())
        .with_bool(FIELD_FLAG, false)
        .with_timestamp(FIELD_ACTION_TIMESTAMP, now);
    store.update_document(doc_id, &fields).await?;
    info!(doc_id, %action, "action written");
    Ok(())
}

/// Flag a worker for review. `last flagged` takes the document's
/// `action_timestamp`, or `now` when it has none.
///
/// # Errors
///
/// Fails when the document cannot be read or does not exist.
pub async fn flag_for_review(
    store: &dyn CollectionStore,
    doc_id: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let current = store.read_document(doc_id).await?;
    let flagged_at = current
        .fields
        .timestamp(FIELD_ACTION_TIMESTAMP)
        .unwrap_or(now);
    let fields = Fields::new()
        .with_bool(FIELD_FLAG, true)
        .with_timestamp(FIELD_LAST_FLAGGED, flagged_at);
    store.update_document(doc_id, &fields).await?;
    info!(doc_id, %flagged_at, "flagged for review");
    Ok(flagged_at)
}

/// Create a document for a new team member by copying `template_id`.
///
/// # Errors
///
/// Fails on a blank id, a missing template, or a rejected write.
pub async fn add_team_member(
    store: &dyn CollectionStore,
    template_id: &str,
    new_id: &str,
) -> Result<()> {
    let new_id = new_id.trim();
    if new_id.is_empty() {
        return Err(WardenError::Config("team member id is required".into()));
    }
    let template = store.read_document(template_id).await?;
    store.set_document(new_id, &template.fields).await?;
    info!(template_id, new_id, "team member added");
    Ok(())
}

/// Age of `ts` relative to `now`, like `(2 minutes ago)`.
/// Future times count as zero seconds.
pub fn elapsed_label(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds().max(0);
    let (n, unit) = match secs {
        s if s < 60 => (s, "second"),
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s => (s / 86_400, "day"),
    };
    let plural = if n == 1 { "" } else { "s" };
    format!("({n} {unit}{plural} ago)")
}
