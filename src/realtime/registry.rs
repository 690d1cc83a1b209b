use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;

use crate::realtime::events::Topic;

pub type ChannelId = u64;

struct Channel {
    user_id: Option<String>,
    topics: HashSet<Topic>,
    tx: UnboundedSender<String>,
}

#[derive(Default)]
struct Inner {
    next_id: ChannelId,
    channels: HashMap<ChannelId, Channel>,
    users: HashMap<String, ChannelId>,
}

/// Open push channels and the user each one belongs to. A user maps to at
/// most one channel; the latest registration wins.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

fn is_valid_user_id(user_id: &str) -> bool {
    !user_id.is_empty() && user_id != "undefined" && user_id != "null"
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new channel, subscribed to every default topic.
    pub async fn connect(&self, tx: UnboundedSender<String>) -> ChannelId {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.channels.insert(
            id,
            Channel {
                user_id: None,
                topics: Topic::DEFAULTS.into_iter().collect(),
                tx,
            },
        );
        id
    }

    pub async fn register(&self, user_id: &str, channel: ChannelId) -> bool {
        if !is_valid_user_id(user_id) {
            tracing::warn!("Ignoring registration with invalid user id {:?}", user_id);
            return false;
        }

        let mut inner = self.inner.write().await;
        let previous = match inner.channels.get_mut(&channel) {
            Some(ch) => ch.user_id.replace(user_id.to_string()),
            None => return false,
        };
        if let Some(previous) = previous.filter(|p| p != user_id) {
            if inner.users.get(&previous) == Some(&channel) {
                inner.users.remove(&previous);
            }
        }
        inner.users.insert(user_id.to_string(), channel);
        true
    }

    /// Drops a channel. Returns the user whose mapping pointed at it, if any.
    pub async fn unregister(&self, channel: ChannelId) -> Option<String> {
        let mut inner = self.inner.write().await;
        inner.channels.remove(&channel);
        let user = inner
            .users
            .iter()
            .find(|(_, ch)| **ch == channel)
            .map(|(user, _)| user.clone())?;
        inner.users.remove(&user);
        Some(user)
    }

    pub async fn resolve(&self, user_id: &str) -> Option<ChannelId> {
        self.inner.read().await.users.get(user_id).copied()
    }

    pub async fn user_of(&self, channel: ChannelId) -> Option<String> {
        self.inner
            .read()
            .await
            .channels
            .get(&channel)
            .and_then(|ch| ch.user_id.clone())
    }

    pub async fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.inner.read().await.users.keys().cloned().collect();
        users.sort();
        users
    }

    pub async fn subscribe(&self, channel: ChannelId, topics: &[Topic]) {
        if let Some(ch) = self.inner.write().await.channels.get_mut(&channel) {
            ch.topics.extend(topics.iter().copied());
        }
    }

    /// Direct delivery cannot be unsubscribed from.
    pub async fn unsubscribe(&self, channel: ChannelId, topics: &[Topic]) {
        if let Some(ch) = self.inner.write().await.channels.get_mut(&channel) {
            for topic in topics.iter().filter(|t| **t != Topic::Direct) {
                ch.topics.remove(topic);
            }
        }
    }

    pub async fn channel_count(&self) -> usize {
        self.inner.read().await.channels.len()
    }

    /// Queues `frame` on every channel subscribed to `topic`, skipping
    /// `except`. Returns the number of channels it was queued on.
    pub async fn deliver(&self, topic: Topic, frame: &str, except: Option<ChannelId>) -> usize {
        let inner = self.inner.read().await;
        let mut delivered = 0;
        for (id, ch) in &inner.channels {
            if Some(*id) == except || !ch.topics.contains(&topic) {
                continue;
            }
            if ch.tx.send(frame.to_string()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!("Channel {} closed before delivery", id);
            }
        }
        delivered
    }

    pub async fn deliver_to(&self, channel: ChannelId, frame: &str) -> bool {
        match self.inner.read().await.channels.get(&channel) {
            Some(ch) => ch.tx.send(frame.to_string()).is_ok(),
            None => false,
        }
    }
}
