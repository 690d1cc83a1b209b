use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gender {
    Male,
    Female,
    Other,
    #[default]
    PreferNotToSay,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::PreferNotToSay => "prefer-not-to-say",
        }
    }
}

impl FromStr for Gender {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            "prefer-not-to-say" => Ok(Gender::PreferNotToSay),
            _ => Err(()),
        }
    }
}

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 20;
pub const BIO_MAX: usize = 300;
pub const PASSWORD_MIN: usize = 6;

/// Returns the user-facing complaint for an unacceptable username.
pub fn check_username(username: &str) -> Result<(), &'static str> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err("Username must be between 3 and 20 characters");
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err("Username can only contain letters, numbers, and underscores");
    }
    Ok(())
}

/// Account as returned to its owner. The password hash never leaves `db::users`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub username: Option<String>,
    pub profile_pic: String,
    pub bio: String,
    pub gender: Gender,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author fields embedded in posts, comments and stories.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: Option<String>,
    pub full_name: String,
    pub profile_pic: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyView {
    pub id: String,
    pub user: UserSummary,
    pub content: String,
    pub likes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub user: UserSummary,
    pub content: String,
    pub likes: Vec<String>,
    pub replies: Vec<ReplyView>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareView {
    pub id: String,
    pub user_id: String,
    pub shared_post_id: String,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub author: UserSummary,
    pub content: Option<String>,
    pub image: Option<String>,
    pub likes: Vec<String>,
    pub comments: Vec<CommentView>,
    pub shares: Vec<ShareView>,
    pub is_shared: bool,
    pub original_post: Option<Box<PostView>>,
    pub share_caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of flipping one user's like on a post, comment or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeToggle {
    pub likes: Vec<String>,
    pub is_liked: bool,
}

impl LikeToggle {
    pub fn count(&self) -> usize {
        self.likes.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryContent {
    pub image: Option<String>,
    pub text: Option<String>,
    pub background_color: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryViewer {
    pub user: UserSummary,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryView {
    pub id: String,
    pub user: UserSummary,
    pub content: StoryContent,
    pub viewers: Vec<StoryViewer>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoryView {
    /// The one definition of "expired" used by every read and delete path.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A story as its author sees it on their profile, expired ones included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnStoryView {
    #[serde(flatten)]
    pub story: StoryView,
    pub is_expired: bool,
    /// Milliseconds until expiry, zero once expired.
    pub time_left: i64,
}

impl OwnStoryView {
    pub fn at(story: StoryView, now: DateTime<Utc>) -> Self {
        let is_expired = story.is_expired_at(now);
        let time_left = if is_expired {
            0
        } else {
            (story.expires_at - now).num_milliseconds()
        };
        Self {
            story,
            is_expired,
            time_left,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}
