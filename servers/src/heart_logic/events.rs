//! # Live Event Relay
//!
//! Pushes the live sample stream to HTTP clients as server-sent events.
//! Each client gets its own dispatcher subscription; every interval the
//! relay drains whatever has queued up and sends it as one event whose data
//! is the batch rendered as `[a b c]`.
//!
//! A client that falls behind is evicted by the dispatcher, and its stream
//! ends. A client that goes away is unsubscribed.

use std::convert::Infallible;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use futures_util::Stream;
use lib_heartmon::core::{DispatcherHandle, Subscription, drain_available};
use lib_heartmon::render::format_samples;
use tokio::net::TcpListener;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct RelayState {
    handle: DispatcherHandle,
    interval: Duration,
    max_batch: usize,
}

impl RelayState {
    /// `max_batch` bounds one drain; keep it at the subscriber queue capacity.
    pub fn new(handle: DispatcherHandle, interval: Duration, max_batch: usize) -> Self {
        Self {
            handle,
            interval,
            max_batch: max_batch.max(1),
        }
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/events", get(events_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serves the relay until the dispatcher is told to stop.
pub async fn serve(listener: TcpListener, state: RelayState) -> io::Result<()> {
    let stop = state.handle.stop_token();
    if let Ok(addr) = listener.local_addr() {
        log::info!("Event relay listening on {}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            stop.cancelled().await;
            log::info!("Event relay shutting down.");
        })
        .await
}

async fn health_handler() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "OK")
}

async fn events_handler(State(state): State<RelayState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let feed = LiveFeed::new(&state);
    log::info!("Event client {} connected", feed.client_id);

    let events = futures_util::stream::unfold(feed, |mut feed| async move {
        let batch = feed.next_batch().await?;
        let event = Event::default().data(format_samples(&batch));
        Some((Ok::<_, Infallible>(event), feed))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// One client's view of the live stream. Dropping it unsubscribes.
struct LiveFeed {
    client_id: u64,
    handle: DispatcherHandle,
    subscription: Subscription,
    stop: CancellationToken,
    ticker: Interval,
    max_batch: usize,
    finished: bool,
}

impl LiveFeed {
    fn new(state: &RelayState) -> Self {
        let mut ticker = tokio::time::interval(state.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            client_id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            handle: state.handle.clone(),
            subscription: state.handle.subscribe(),
            stop: state.handle.stop_token(),
            ticker,
            max_batch: state.max_batch,
            finished: false,
        }
    }

    /// Waits for the next non-empty batch. `None` ends the stream.
    async fn next_batch(&mut self) -> Option<Vec<u16>> {
        while !self.finished {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => return None,
                _ = self.ticker.tick() => {}
            }

            let drained = drain_available(&mut self.subscription, self.max_batch);
            let evicted = self.subscription.is_evicted();
            if drained.closed || evicted {
                self.finished = true;
                if evicted {
                    log::warn!("Event client {} forcibly unsubscribed", self.client_id);
                }
            }
            if !drained.samples.is_empty() {
                return Some(drained.samples);
            }
        }
        None
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.handle.unsubscribe(&self.subscription);
        log::info!("Event client {} disconnected", self.client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_heartmon::core::{Dispatcher, EngineOptions};

    async fn start(options: &EngineOptions) -> (DispatcherHandle, String, tokio::task::JoinHandle<io::Result<()>>) {
        let (dispatcher, handle) = Dispatcher::new(io::sink(), options);
        tokio::spawn(dispatcher.run());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let state = RelayState::new(handle.clone(), Duration::from_millis(20), options.queue_capacity);
        let server = tokio::spawn(serve(listener, state));
        (handle, base, server)
    }

    async fn wait_for_subscribers(handle: &DispatcherHandle, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.subscriber_count() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    /// Sample values carried by the `data:` lines of an event stream chunk.
    fn samples_in(text: &str) -> Vec<u16> {
        text.lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .flat_map(|data| {
                data.trim_matches(|c| c == '[' || c == ']')
                    .split_whitespace()
                    .map(|n| n.parse::<u16>().unwrap())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_health() {
        let (handle, base, server) = start(&EngineOptions::default()).await;
        let body = reqwest::get(format!("{}/health", base)).await.unwrap().text().await.unwrap();
        assert_eq!(body, "OK");

        handle.stop();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_events_carry_samples_in_order() {
        let (handle, base, server) = start(&EngineOptions::default()).await;
        let mut response = reqwest::get(format!("{}/events", base)).await.unwrap();
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );
        wait_for_subscribers(&handle, 1).await;

        for sample in [11, 12, 13] {
            handle.ingest(sample).await.unwrap();
        }

        let mut received = Vec::new();
        while received.len() < 3 {
            let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            received.extend(samples_in(&String::from_utf8_lossy(&chunk)));
        }
        assert_eq!(received, vec![11, 12, 13]);

        // The server only notices a vanished client when a write fails.
        drop(response);
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.subscriber_count() != 0 {
                handle.ingest(1).await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        handle.stop();
        server.await.unwrap().unwrap();
    }

    async fn read_to_end(response: &mut reqwest::Response) -> Vec<u16> {
        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Ok(Some(chunk)) = response.chunk().await {
                received.extend(samples_in(&String::from_utf8_lossy(&chunk)));
            }
        })
        .await
        .unwrap();
        received
    }

    #[tokio::test]
    async fn test_slow_client_stream_ends_on_eviction() {
        let options = EngineOptions {
            queue_capacity: 4,
            ..EngineOptions::default()
        };
        let (handle, base, server) = start(&options).await;
        let mut response = reqwest::get(format!("{}/events", base)).await.unwrap();
        wait_for_subscribers(&handle, 1).await;

        // Far more than one queue's worth between two relay intervals.
        for i in 0..1000 {
            handle.ingest(i % 1024).await.unwrap();
        }
        wait_for_subscribers(&handle, 0).await;

        // Whatever was queued before the eviction is delivered, then the body ends.
        let received = read_to_end(&mut response).await;
        assert!(received.len() < 1000);
        assert!(received.iter().enumerate().all(|(i, &sample)| usize::from(sample) == i));
        assert_eq!(handle.subscriber_count(), 0);

        handle.stop();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_ends_open_streams() {
        let (handle, base, server) = start(&EngineOptions::default()).await;
        let mut response = reqwest::get(format!("{}/events", base)).await.unwrap();
        wait_for_subscribers(&handle, 1).await;

        handle.stop();
        let end = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match response.chunk().await {
                    Ok(Some(_)) => continue,
                    _ => break,
                }
            }
        })
        .await;
        assert!(end.is_ok());
        server.await.unwrap().unwrap();
    }
}
