//! Bounded record buses
//!
//! A bus is a bounded mpsc channel with a drop-on-full producer side.
//! Samplers never wait for the consumer: when the bus is saturated the
//! record is discarded and the bus-wide drop counter goes up.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::BusError;

/// Shared count of records dropped because a bus was full
#[derive(Debug, Clone, Default)]
pub struct DropCounter(Arc<AtomicU64>);

impl DropCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Producer side of a bus; cheap to clone, one clone per sampler
#[derive(Debug)]
pub struct BusSender<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    drops: DropCounter,
}

impl<T> Clone for BusSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            drops: self.drops.clone(),
        }
    }
}

impl<T> BusSender<T> {
    /// Publish without waiting. A full bus drops `item` and counts it.
    pub fn try_publish(&self, item: T) -> Result<(), BusError> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.drops.increment();
                Err(BusError::Full(self.name))
            }
            Err(TrySendError::Closed(_)) => Err(BusError::Closed(self.name)),
        }
    }

    pub fn drop_counter(&self) -> DropCounter {
        self.drops.clone()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Create a bus holding at most `capacity` undelivered records.
///
/// `capacity` must be greater than zero.
pub fn bus<T>(name: &'static str, capacity: usize) -> (BusSender<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        BusSender {
            name,
            tx,
            drops: DropCounter::default(),
        },
        rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, task};

    #[tokio::test]
    async fn test_saturated_bus_delivers_exactly_capacity() {
        let (tx, mut rx) = bus::<u32>("metric", 8);

        let results: Vec<_> = (0..20).map(|i| tx.try_publish(i)).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 8);
        assert!(results[8..].iter().all(|r| *r == Err(BusError::Full("metric"))));
        assert_eq!(tx.drop_counter().get(), 12);

        let mut delivered = vec![];
        while let Ok(item) = rx.try_recv() {
            delivered.push(item);
        }
        assert_eq!(delivered, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_drops_shared_between_clones() {
        let (tx, _rx) = bus::<u32>("alert", 1);
        let other = tx.clone();

        tx.try_publish(1).unwrap();
        assert!(other.try_publish(2).is_err());
        assert!(tx.try_publish(3).is_err());

        assert_eq!(tx.drop_counter().get(), 2);
        assert_eq!(other.drop_counter().get(), 2);
    }

    #[tokio::test]
    async fn test_closed_bus_is_not_a_drop() {
        let (tx, rx) = bus::<u32>("metric", 4);
        drop(rx);

        assert_eq!(tx.try_publish(1), Err(BusError::Closed("metric")));
        assert_eq!(tx.drop_counter().get(), 0);
    }

    #[test]
    fn test_receiver_waits_on_empty_bus() {
        let (tx, mut rx) = bus::<u32>("metric", 4);

        let mut recv = task::spawn(rx.recv());
        assert_pending!(recv.poll());

        tx.try_publish(7).unwrap();
        assert!(recv.is_woken());
        assert_eq!(recv.poll(), std::task::Poll::Ready(Some(7)));
    }
}
