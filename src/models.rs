use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reusable image reference with default caption texts. Many memes may
/// point at one template.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MemeTemplate {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    pub default_top_text: String,
    pub default_bottom_text: String,
}

/// A template instance customized with captions and attributed to its
/// creator. `created_at` is set once and never touched afterwards.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Meme {
    pub id: Uuid,
    #[serde(rename = "template")]
    pub template_id: Uuid,
    pub top_text: String,
    pub bottom_text: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A user's 1-5 score for a meme. At most one per (meme, user) pair;
/// re-submitting overwrites the score but keeps the identity and
/// original timestamp.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Rating {
    pub id: Uuid,
    #[serde(rename = "meme")]
    pub meme_id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid,
    pub score: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}
