//! Server-sent event feeds re-queried on a fixed tick.

use crate::db::ChatRepository;
use crate::error::AppResult;
use actix_web::web::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;

/// Shortest tick a feed runs at; a zero period would panic the ticker.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Encode one SSE frame.
pub fn sse_frame<T: Serialize>(value: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    Ok(Bytes::from(format!("data: {}\n\n", json)))
}

/// Emit `query()` every `tick`, first frame after one tick.
///
/// Failed queries skip their frame. The stream ends only when dropped, which
/// happens once the client disconnects.
pub fn ticking_feed<T, F, Fut>(
    tick: Duration,
    mut query: F,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>>
where
    T: Serialize,
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let tick = tick.max(MIN_TICK);
    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    IntervalStream::new(ticker)
        .then(move |_| query())
        .filter_map(|result| async move {
            match result {
                Ok(value) => match sse_frame(&value) {
                    Ok(frame) => Some(Ok::<_, actix_web::Error>(frame)),
                    Err(e) => {
                        tracing::error!(target: "internal_error", error = %e, "failed to encode feed frame");
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "feed query failed, skipping frame");
                    None
                }
            }
        })
}

pub fn chat_list_feed(
    chat: Arc<dyn ChatRepository>,
    owner: String,
    tick: Duration,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    ticking_feed(tick, move || {
        let chat = chat.clone();
        let owner = owner.clone();
        async move { chat.list(&owner).await }
    })
}

pub fn unread_counter_feed(
    chat: Arc<dyn ChatRepository>,
    owner: String,
    tick: Duration,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    ticking_feed(tick, move || {
        let chat = chat.clone();
        let owner = owner.clone();
        async move { chat.unread_count(&owner).await }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_frame_format() {
        let frame = sse_frame(&3).unwrap();
        assert_eq!(&frame[..], b"data: 3\n\n");
    }

    #[tokio::test]
    async fn test_counter_feed_reflects_store() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_mailbox("A", &["B".into()], "x", false).await.unwrap();

        let feed = unread_counter_feed(store.clone(), "A".into(), Duration::from_millis(10));
        futures::pin_mut!(feed);

        let first = feed.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"data: 1\n\n");

        store.mark_read("A", "B").await.unwrap();
        let second = feed.next().await.unwrap().unwrap();
        assert_eq!(&second[..], b"data: 0\n\n");
    }

    #[tokio::test]
    async fn test_failed_query_skips_frame() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let feed = ticking_feed(Duration::from_millis(5), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AppError::Database("down".into()))
                } else {
                    Ok(n)
                }
            }
        });
        futures::pin_mut!(feed);

        let frame = feed.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"data: 1\n\n");
    }

    #[tokio::test]
    async fn test_list_feed_emits_json_array() {
        let store = Arc::new(MemoryStore::new());
        let feed = chat_list_feed(store, "nobody".into(), Duration::from_millis(5));
        futures::pin_mut!(feed);
        let frame = feed.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"data: []\n\n");
    }

    #[tokio::test]
    async fn test_zero_tick_is_clamped() {
        let store = Arc::new(MemoryStore::new());
        let feed = unread_counter_feed(store, "A".into(), Duration::ZERO);
        futures::pin_mut!(feed);
        let frame = feed.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"data: 0\n\n");
    }
}
