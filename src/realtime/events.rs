use serde::{Deserialize, Serialize};

use crate::db::models::{CommentView, Message, PostView, ReplyView, StoryView};

/// Interest groups a channel can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Feed,
    Stories,
    Presence,
    Typing,
    /// Addressed delivery; every channel always receives it.
    Direct,
}

impl Topic {
    pub const DEFAULTS: [Topic; 5] = [
        Topic::Feed,
        Topic::Stories,
        Topic::Presence,
        Topic::Typing,
        Topic::Direct,
    ];
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRef {
    pub post_id: String,
}

/// Like state of a post after a toggle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    pub post_id: String,
    pub likes: Vec<String>,
    pub likes_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: String,
    pub comment: CommentView,
    pub comments_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReply {
    pub post_id: String,
    pub comment_id: String,
    pub reply: ReplyView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentUpdate {
    pub post_id: String,
    pub comment_id: String,
    pub likes: Vec<String>,
    pub likes_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyUpdate {
    pub post_id: String,
    pub comment_id: String,
    pub reply_id: String,
    pub likes: Vec<String>,
    pub likes_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    #[serde(default)]
    pub user_id: Option<String>,
    pub is_typing: bool,
}

/// Server-to-client push events, framed as `{"event": name, "data": payload}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<String>),
    NewPost(Box<PostView>),
    PostDeleted(PostRef),
    PostUpdate(PostUpdate),
    NewComment(Box<NewComment>),
    NewReply(Box<NewReply>),
    CommentUpdate(CommentUpdate),
    ReplyUpdate(ReplyUpdate),
    NewStory(Box<StoryView>),
    StoryDeleted(String),
    UserTyping(Typing),
    NewMessage(Message),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::OnlineUsers(_) => Topic::Presence,
            Event::NewPost(_)
            | Event::PostDeleted(_)
            | Event::PostUpdate(_)
            | Event::NewComment(_)
            | Event::NewReply(_)
            | Event::CommentUpdate(_)
            | Event::ReplyUpdate(_) => Topic::Feed,
            Event::NewStory(_) | Event::StoryDeleted(_) => Topic::Stories,
            Event::UserTyping(_) => Topic::Typing,
            Event::NewMessage(_) => Topic::Direct,
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames a client may send over its channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientFrame {
    Typing(Typing),
    Subscribe { topics: Vec<Topic> },
    Unsubscribe { topics: Vec<Topic> },
}
