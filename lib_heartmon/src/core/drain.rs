//! Non-blocking batch reads for presentation-style subscribers.
//!
//! Anything that forwards samples somewhere slow (a socket, a report) should
//! take everything queued in one go rather than one sample per send, or it
//! falls behind and gets evicted. `drain_available` never waits.

use tokio::sync::mpsc::error::TryRecvError;

use super::registry::Subscription;

/// What a single drain pass collected.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Drained {
    /// Samples in arrival order, at most the requested batch size.
    pub samples: Vec<u16>,
    /// The queue is closed and empty: the subscription is over.
    pub closed: bool,
}

/// Takes up to `max_batch` queued samples without waiting.
pub fn drain_available(subscription: &mut Subscription, max_batch: usize) -> Drained {
    let mut drained = Drained {
        samples: Vec::with_capacity(max_batch.min(64)),
        closed: false,
    };

    while drained.samples.len() < max_batch {
        match subscription.try_recv() {
            Ok(sample) => drained.samples.push(sample),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                drained.closed = true;
                break;
            }
        }
    }
    drained
}
