use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::db::stories::{self, SweptStory};
use crate::media;
use crate::realtime::Event;
use crate::state::AppState;

/// Starts the background story sweeper: once after the initial delay, then
/// on every sweep interval.
pub fn spawn_story_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let delay = state.config.stories.initial_sweep_delay();
        let interval = state.config.stories.sweep_interval();
        tracing::info!(
            "Story sweeper starting in {:?}, then every {:?}",
            delay,
            interval
        );
        tokio::time::sleep(delay).await;

        loop {
            match sweep_once(&state, Utc::now()).await {
                Ok(0) => tracing::debug!("No expired stories to sweep"),
                Ok(count) => tracing::info!("Swept {} expired stories", count),
                Err(e) => tracing::error!("Story sweep failed: {:#}", e),
            }
            tokio::time::sleep(interval).await;
        }
    })
}

/// Deletes stories expired at `now`, removes their images and announces
/// each removal. Returns how many were swept.
pub async fn sweep_once(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<usize> {
    let pool = state.db.clone();
    let swept: Vec<SweptStory> = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        Ok::<_, anyhow::Error>(stories::sweep_expired(&mut conn, now)?)
    })
    .await??;

    for story in &swept {
        if let Some(image) = story.image.as_deref() {
            media::discard_image(state.media.as_ref(), image).await;
        }
        state
            .events
            .publish(Event::StoryDeleted(story.id.clone()))
            .await;
    }
    Ok(swept.len())
}
