//! # Live Detector
//!
//! Runs a `RateDetector` off a dispatcher subscription instead of a log.
//! Every interval it drains what has arrived without waiting and feeds it
//! in the same shape the log would have: a `Timestamp`, then one `HeartData`.
//!
//! If the dispatcher evicts the detector for falling behind, the gap is fed
//! as an `Error` record (which clears the window) and the detector
//! resubscribes. It never stays detached while the dispatcher runs.

use std::io::Write;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::alerter::AlarmPlayer;
use super::rate_detector::RateDetector;
use crate::core::{drain_available, DispatcherHandle};
use crate::records::Record;

/// Reported to the detector when its subscription was evicted.
pub const EVICTED_MESSAGE: &str = "live subscription evicted; samples lost";

/// # Live Detector
pub struct LiveDetector<P: AlarmPlayer, W: Write> {
    detector: RateDetector<P, W>,
    handle: DispatcherHandle,
    interval: Duration,
    max_batch: usize,
}

impl<P: AlarmPlayer, W: Write> LiveDetector<P, W> {
    /// Attaches `detector` to the dispatcher behind `handle`. `max_batch`
    /// bounds one drain; keep it at the subscriber queue capacity.
    pub fn new(detector: RateDetector<P, W>, handle: DispatcherHandle, interval: Duration, max_batch: usize) -> Self {
        Self {
            detector,
            handle,
            interval,
            max_batch: max_batch.max(1),
        }
    }

    /// # Run
    ///
    /// Feeds the detector until the dispatcher stops, then silences the
    /// alarm and hands the detector back.
    pub async fn run(mut self) -> RateDetector<P, W> {
        let stop = self.handle.stop_token();
        let mut subscription = self.handle.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let drained = drain_available(&mut subscription, self.max_batch);
            if !drained.samples.is_empty() {
                self.detector.process(&Record::now());
                self.detector.process(&Record::HeartData(drained.samples));
            }

            // A drain that hits the cap never sees the closed queue, so the
            // eviction flag is checked directly.
            let evicted = subscription.is_evicted();
            if drained.closed || evicted {
                if !evicted {
                    log::info!("Live detector subscription closed");
                    break;
                }
                log::warn!("Live detector fell behind and was evicted; resubscribing");
                self.detector.process(&Record::Error(EVICTED_MESSAGE.to_string()));
                subscription = self.handle.subscribe();
            }
        }

        self.handle.unsubscribe(&subscription);
        self.detector.finish();
        self.detector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Dispatcher, EngineOptions};
    use crate::detector::alerter::tests::CountingPlayer;
    use crate::detector::alerter::Alerter;
    use crate::detector::rate_detector::DetectorOptions;

    #[tokio::test(start_paused = true)]
    async fn test_live_samples_reach_detector() {
        let (dispatcher, handle) = Dispatcher::new(Vec::new(), &EngineOptions::default());
        let engine = tokio::spawn(dispatcher.run());

        let detector = RateDetector::new(
            &DetectorOptions::default(),
            Alerter::new(CountingPlayer::default()),
            Vec::new(),
        );
        let live = tokio::spawn(
            LiveDetector::new(detector, handle.clone(), Duration::from_millis(100), 2048).run(),
        );
        // Let the detector subscribe before samples flow.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.subscriber_count(), 1);

        for sample in [500, 500, 440, 450, 500, 500, 440, 450] {
            handle.ingest(sample).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(250)).await;

        handle.stop();
        let detector = live.await.unwrap();
        engine.await.unwrap().unwrap();

        assert_eq!(detector.window().samples().len(), 8);
        assert_eq!(detector.last_bpm(), Some(2));
        assert!(detector.last_time().is_some());
        assert_eq!(handle.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicted_detector_clears_window_and_resubscribes() {
        let options = EngineOptions {
            queue_capacity: 4,
            ..EngineOptions::default()
        };
        let (dispatcher, handle) = Dispatcher::new(Vec::new(), &options);
        let engine = tokio::spawn(dispatcher.run());

        let detector = RateDetector::new(
            &DetectorOptions::default(),
            Alerter::new(CountingPlayer::default()),
            Vec::new(),
        );
        let live = tokio::spawn(
            LiveDetector::new(detector, handle.clone(), Duration::from_millis(100), options.queue_capacity).run(),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.subscriber_count(), 1);

        // The detector only drains on its interval, so this overflows its queue.
        for _ in 0..10 {
            handle.ingest(600).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.subscriber_count(), 0);

        // One interval is enough to notice the eviction and come back.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.subscriber_count(), 1);

        handle.ingest(500).await.unwrap();
        handle.ingest(440).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        handle.stop();
        let detector = live.await.unwrap();
        engine.await.unwrap().unwrap();

        // The overflowed samples were dropped with the window.
        assert_eq!(detector.window().samples(), &[500, 440]);
    }
}
