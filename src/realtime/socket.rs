use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::extractors::MaybeUser;
use crate::realtime::events::{ClientFrame, Event, Typing};
use crate::realtime::registry::ChannelId;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SocketParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// GET /ws?userId=: upgrade to the push channel
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    MaybeUser(session): MaybeUser,
    Query(params): Query<SocketParams>,
    State(state): State<AppState>,
) -> Response {
    let user_id = claimed_identity(
        session.as_ref().map(|user| user.id()),
        params.user_id.as_deref(),
    );
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// The user a new channel may be bound to. Only the session's own account
/// can be claimed; the query value is a hint that must agree with it.
pub(crate) fn claimed_identity(
    session: Option<&str>,
    requested: Option<&str>,
) -> Option<String> {
    let requested = requested.filter(|id| !matches!(*id, "" | "undefined" | "null"));
    match (session, requested) {
        (Some(session), None) => Some(session.to_string()),
        (Some(session), Some(requested)) if session == requested => Some(session.to_string()),
        (Some(session), Some(requested)) => {
            tracing::warn!(
                "Session {} asked to bind channel to {}; leaving it anonymous",
                session,
                requested
            );
            None
        }
        (None, Some(requested)) => {
            tracing::info!(
                "Unauthenticated channel asked for user {}; leaving it anonymous",
                requested
            );
            None
        }
        (None, None) => None,
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Option<String>) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<String>();

    let channel = open_channel(&state, user_id.as_deref(), tx).await;
    let mut writer = tokio::spawn(forward_frames(rx, sender));

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_client_frame(&state, channel, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("Channel {} read error: {}", channel, e);
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    close_channel(&state, channel).await;
    writer.abort();
}

/// Adds a channel to the registry, binds it to `user_id` when given and
/// announces the new presence list.
pub(crate) async fn open_channel(
    state: &AppState,
    user_id: Option<&str>,
    tx: UnboundedSender<String>,
) -> ChannelId {
    let channel = state.registry.connect(tx).await;
    tracing::info!("Channel {} connected", channel);

    let registered = match user_id {
        Some(user_id) => state.registry.register(user_id, channel).await,
        None => false,
    };
    if registered {
        tracing::info!("User {:?} bound to channel {}", user_id, channel);
        publish_presence(state).await;
    }
    channel
}

pub(crate) async fn close_channel(state: &AppState, channel: ChannelId) {
    if let Some(user_id) = state.registry.unregister(channel).await {
        tracing::info!("User {} disconnected", user_id);
        publish_presence(state).await;
    }
    tracing::info!("Channel {} closed", channel);
}

/// Writes queued frames to the socket until the queue closes or a send fails.
pub(crate) async fn forward_frames<S>(mut rx: UnboundedReceiver<String>, mut sink: S)
where
    S: Sink<Message> + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if sink.send(Message::Text(frame.into())).await.is_err() {
            break;
        }
    }
}

async fn publish_presence(state: &AppState) {
    let online = state.registry.online_users().await;
    state.events.publish(Event::OnlineUsers(online)).await;
}

pub(crate) async fn handle_client_frame(state: &AppState, channel: ChannelId, text: &str) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!("Ignoring frame from channel {}: {}", channel, e);
            return;
        }
    };

    match frame {
        ClientFrame::Typing(typing) => {
            let user_id = state.registry.user_of(channel).await.or(typing.user_id);
            let event = Event::UserTyping(Typing {
                user_id,
                is_typing: typing.is_typing,
            });
            state.events.publish_except(event, channel).await;
        }
        ClientFrame::Subscribe { topics } => state.registry.subscribe(channel, &topics).await,
        ClientFrame::Unsubscribe { topics } => state.registry.unsubscribe(channel, &topics).await,
    }
}
