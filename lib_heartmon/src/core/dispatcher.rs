//! # Heart Data Dispatcher
//!
//! The single point of entry for sensor samples. One task runs the
//! dispatcher loop and owns everything that loop touches: the accumulation
//! buffer, the persisted-log writer and the tick timer. Nothing in here is
//! locked except the subscriber set, which external tasks mutate through a
//! `DispatcherHandle`.
//!
//! ## Core Design Principles:
//!
//! 1.  **Ingest never waits on a subscriber**: fan-out uses `try_send`. A full
//!     queue gets its subscription evicted on the spot; capture keeps going at
//!     sensor rate no matter how many subscribers there are or how slow.
//!
//! 2.  **Batch persistence**: samples accumulate in memory and are written once
//!     per tick as a `Timestamp` record followed by `HeartData`. Empty ticks
//!     write nothing.
//!
//! 3.  **Availability over completeness**: a failed log write is logged and
//!     that tick's samples are dropped. Ingest and fan-out carry on.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::registry::{Registry, SubscriberId, Subscription, DEFAULT_QUEUE_CAPACITY};
use crate::records::{Record, RecordWriter, MAX_SAMPLES_PER_RECORD};

/// # Engine Options
///
/// Tunables for the dispatcher. The defaults match a 50-200 Hz sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineOptions {
    /// Per-subscriber queue depth in samples.
    pub queue_capacity: usize,
    /// Initial capacity of the accumulation buffer. It grows if needed.
    pub buffer_capacity: usize,
    /// Milliseconds between log flushes.
    pub tick_interval_ms: u64,
    /// Depth of the producer-to-loop channel.
    pub ingest_capacity: usize,
}

impl EngineOptions {
    /// The tick period, never zero.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            // A sizing guess; a grown buffer is reused after each tick anyway.
            buffer_capacity: 210,
            tick_interval_ms: 1000,
            ingest_capacity: 256,
        }
    }
}

/// # Dispatcher Handle
///
/// The cloneable, thread-safe face of a running dispatcher: producers send
/// samples through it and consumers subscribe through it.
#[derive(Clone)]
pub struct DispatcherHandle {
    registry: Arc<Registry>,
    incoming: mpsc::Sender<u16>,
    stop: CancellationToken,
}

impl DispatcherHandle {
    /// Registers a new subscriber queue.
    pub fn subscribe(&self) -> Subscription {
        self.registry.insert()
    }

    /// Removes a subscriber. Removing one that is already gone does nothing.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.registry.remove(subscription.id());
    }

    /// Hands a sample to the dispatcher loop. Fails only once the loop has
    /// stopped.
    pub async fn ingest(&self, sample: u16) -> Result<(), mpsc::error::SendError<u16>> {
        self.incoming.send(sample).await
    }

    /// Signals the dispatcher loop to finish.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// A token that fires when the dispatcher is told to stop.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }
}

/// # Core Dispatcher
///
/// Owns the accumulation buffer and the log writer. Drive it with `run`, or
/// call `ingest`/`tick` directly when you own the scheduling yourself.
pub struct Dispatcher<W: Write> {
    readings: Vec<u16>,
    writer: RecordWriter<W>,
    registry: Arc<Registry>,
    fanout: Vec<(SubscriberId, mpsc::Sender<u16>)>,
    incoming: mpsc::Receiver<u16>,
    stop: CancellationToken,
    tick_interval: Duration,
}

impl<W: Write> Dispatcher<W> {
    /// Creates a dispatcher persisting to `log` and the handle used to feed
    /// and subscribe to it.
    pub fn new(log: W, options: &EngineOptions) -> (Self, DispatcherHandle) {
        let registry = Arc::new(Registry::new(options.queue_capacity));
        let (tx, rx) = mpsc::channel(options.ingest_capacity.max(1));
        let stop = CancellationToken::new();

        let dispatcher = Self {
            readings: Vec::with_capacity(options.buffer_capacity),
            writer: RecordWriter::new(log),
            registry: Arc::clone(&registry),
            fanout: Vec::new(),
            incoming: rx,
            stop: stop.clone(),
            tick_interval: options.tick_interval(),
        };
        let handle = DispatcherHandle {
            registry,
            incoming: tx,
            stop,
        };
        (dispatcher, handle)
    }

    /// Registers a new subscriber queue.
    pub fn subscribe(&self) -> Subscription {
        self.registry.insert()
    }

    /// Removes a subscriber; a no-op if it is already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.registry.remove(subscription.id());
    }

    /// # Ingest
    ///
    /// Buffers the sample for the next tick, then offers it to every current
    /// subscriber. A full queue is evicted; a queue whose receiver was dropped
    /// is removed quietly.
    pub fn ingest(&mut self, sample: u16) {
        self.readings.push(sample);

        self.registry.snapshot_into(&mut self.fanout);
        for (id, sender) in self.fanout.drain(..) {
            match sender.try_send(sample) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.registry.evict(id);
                }
                Err(TrySendError::Closed(_)) => {
                    self.registry.remove(id);
                }
            }
        }
    }

    /// # Tick
    ///
    /// Persists the buffered samples as `Timestamp` + `HeartData` and flushes.
    /// Does nothing if no samples arrived since the last tick.
    pub fn tick(&mut self) {
        if self.readings.is_empty() {
            return;
        }

        if let Err(e) = self.persist() {
            log::error!("Error writing {} heart samples: {}", self.readings.len(), e);
        }
        self.readings.clear();
    }

    fn persist(&mut self) -> io::Result<()> {
        self.writer.write_timestamp()?;
        for chunk in self.readings.chunks(MAX_SAMPLES_PER_RECORD) {
            self.writer.write_record(&Record::HeartData(chunk.to_vec()))?;
        }
        self.writer.flush()
    }

    /// Samples waiting for the next tick.
    pub fn pending(&self) -> &[u16] {
        &self.readings
    }

    /// The log writer's destination.
    pub fn log(&self) -> &W {
        self.writer.get_ref()
    }

    /// # Run
    ///
    /// The dispatcher loop. Ingests samples as they arrive and ticks on a
    /// fixed interval until the handle's `stop` fires or every handle is
    /// dropped. Every sample `ingest` accepted is persisted before the log
    /// writer is handed back, including ones still queued when `stop` fired.
    pub async fn run(mut self) -> io::Result<W> {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately.
        ticker.tick().await;

        log::info!("Dispatcher started, flushing every {:?}", self.tick_interval);
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                sample = self.incoming.recv() => match sample {
                    Some(sample) => self.ingest(sample),
                    None => break,
                },
                _ = ticker.tick() => self.tick(),
            }
        }

        self.incoming.close();
        while let Ok(sample) = self.incoming.try_recv() {
            self.ingest(sample);
        }
        self.tick();
        log::info!("Dispatcher stopped");
        self.writer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordReader;
    use std::io::Cursor;
    use tokio::sync::mpsc::error::TryRecvError;

    fn records(bytes: &[u8]) -> Vec<Record> {
        RecordReader::new(Cursor::new(bytes))
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_full_subscriber_is_evicted_without_blocking() {
        let options = EngineOptions::default();
        let (mut dispatcher, _handle) = Dispatcher::new(Vec::new(), &options);
        let mut stuck = dispatcher.subscribe();
        let mut healthy = dispatcher.subscribe();

        for i in 0..=options.queue_capacity as u16 {
            dispatcher.ingest(i);
            // Keep one subscriber drained so it is never evicted.
            assert_eq!(healthy.try_recv(), Ok(i));
        }

        assert!(stuck.is_evicted());
        assert!(!healthy.is_evicted());

        // The queued samples are still readable, then the queue reports closed.
        let mut seen = 0;
        while stuck.try_recv().is_ok() {
            seen += 1;
        }
        assert_eq!(seen, options.queue_capacity);
        assert_eq!(stuck.try_recv(), Err(TryRecvError::Disconnected));

        // Later samples still reach the remaining subscriber.
        dispatcher.ingest(7);
        assert_eq!(healthy.try_recv(), Ok(7));
    }

    #[test]
    fn test_samples_arrive_in_ingest_order() {
        let (mut dispatcher, _handle) = Dispatcher::new(Vec::new(), &EngineOptions::default());
        let mut sub = dispatcher.subscribe();

        let sent: Vec<u16> = (0..1000).map(|i| (i * 37 % 1024) as u16).collect();
        for &sample in &sent {
            dispatcher.ingest(sample);
        }

        let received: Vec<u16> = std::iter::from_fn(|| sub.try_recv().ok()).collect();
        assert_eq!(received, sent);
    }

    #[test]
    fn test_empty_tick_writes_nothing() {
        let (mut dispatcher, _handle) = Dispatcher::new(Vec::new(), &EngineOptions::default());
        dispatcher.tick();
        assert!(dispatcher.log().is_empty());
    }

    #[test]
    fn test_tick_writes_timestamp_then_samples() {
        let (mut dispatcher, _handle) = Dispatcher::new(Vec::new(), &EngineOptions::default());
        for sample in [510, 505, 440] {
            dispatcher.ingest(sample);
        }
        dispatcher.tick();
        assert!(dispatcher.pending().is_empty());

        let written = records(dispatcher.log());
        assert_eq!(written.len(), 2);
        assert!(matches!(written[0], Record::Timestamp(_)));
        assert_eq!(written[1], Record::HeartData(vec![510, 505, 440]));

        // Nothing new arrived, so the next tick is silent.
        let len = dispatcher.log().len();
        dispatcher.tick();
        assert_eq!(dispatcher.log().len(), len);
    }

    #[test]
    fn test_oversized_tick_is_chunked() {
        let (mut dispatcher, _handle) = Dispatcher::new(Vec::new(), &EngineOptions::default());
        for i in 0..(MAX_SAMPLES_PER_RECORD + 5) {
            dispatcher.ingest((i % 1024) as u16);
        }
        dispatcher.tick();

        let written = records(dispatcher.log());
        assert_eq!(written.len(), 3);
        match (&written[1], &written[2]) {
            (Record::HeartData(a), Record::HeartData(b)) => {
                assert_eq!(a.len(), MAX_SAMPLES_PER_RECORD);
                assert_eq!(b.len(), 5);
            }
            other => panic!("unexpected records {other:?}"),
        }
    }

    struct FailingLog;

    impl Write for FailingLog {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn test_write_failure_does_not_stop_ingest() {
        let (mut dispatcher, _handle) = Dispatcher::new(FailingLog, &EngineOptions::default());
        let mut sub = dispatcher.subscribe();

        dispatcher.ingest(1);
        dispatcher.tick();
        assert!(dispatcher.pending().is_empty());

        dispatcher.ingest(2);
        assert_eq!(sub.try_recv(), Ok(1));
        assert_eq!(sub.try_recv(), Ok(2));
    }

    #[test]
    fn test_dropped_receiver_is_removed_quietly() {
        let (mut dispatcher, handle) = Dispatcher::new(Vec::new(), &EngineOptions::default());
        let sub = dispatcher.subscribe();
        assert_eq!(handle.subscriber_count(), 1);
        drop(sub);

        dispatcher.ingest(3);
        assert_eq!(handle.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_twice_is_harmless() {
        let (mut dispatcher, handle) = Dispatcher::new(Vec::new(), &EngineOptions::default());
        let mut sub = handle.subscribe();
        handle.unsubscribe(&sub);
        handle.unsubscribe(&sub);
        dispatcher.unsubscribe(&sub);

        dispatcher.ingest(4);
        assert_eq!(sub.try_recv(), Err(TryRecvError::Disconnected));
        assert!(!sub.is_evicted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_flushes_each_interval_and_on_stop() {
        let (dispatcher, handle) = Dispatcher::new(Vec::new(), &EngineOptions::default());
        let mut sub = handle.subscribe();
        let task = tokio::spawn(dispatcher.run());

        handle.ingest(500).await.unwrap();
        handle.ingest(440).await.unwrap();
        assert_eq!(sub.recv().await, Some(500));
        assert_eq!(sub.recv().await, Some(440));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.ingest(450).await.unwrap();
        assert_eq!(sub.recv().await, Some(450));

        handle.stop();
        let log = task.await.unwrap().unwrap();

        let written = records(&log);
        assert_eq!(written.len(), 4);
        assert!(matches!(written[0], Record::Timestamp(_)));
        assert_eq!(written[1], Record::HeartData(vec![500, 440]));
        assert!(matches!(written[2], Record::Timestamp(_)));
        assert_eq!(written[3], Record::HeartData(vec![450]));

        assert!(handle.ingest(1).await.is_err());
    }

    #[tokio::test]
    async fn test_samples_queued_before_stop_are_persisted() {
        let (dispatcher, handle) = Dispatcher::new(Vec::new(), &EngineOptions::default());
        let mut sub = handle.subscribe();

        for sample in [500, 440, 450] {
            handle.ingest(sample).await.unwrap();
        }
        handle.stop();
        let log = dispatcher.run().await.unwrap();

        let written = records(&log);
        assert_eq!(written.len(), 2);
        assert!(matches!(written[0], Record::Timestamp(_)));
        assert_eq!(written[1], Record::HeartData(vec![500, 440, 450]));

        // Subscribers still saw them.
        let received: Vec<u16> = std::iter::from_fn(|| sub.try_recv().ok()).collect();
        assert_eq!(received, vec![500, 440, 450]);
        assert!(handle.ingest(1).await.is_err());
    }
}
