use serde::{Deserialize, Serialize};

/// Search-index projection of an imported record.
///
/// Carries no legacy shadow fields; the document id is the record's new id
/// and travels next to the document rather than inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkDocument {
    pub ip: Option<String>,
    pub author: String,
    pub approved: bool,
    pub body: String,
    pub image_id: Option<i64>,
    pub fingerprint: Option<String>,
    pub user_id: Option<i64>,
    pub hidden_from_users: bool,
    pub anonymous: bool,
    #[serde(default)]
    pub image_tag_ids: Vec<i64>,
    /// ISO-8601 UTC, millisecond precision.
    pub posted_at: Option<String>,
}
