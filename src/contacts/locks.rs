//! Per-contact serialization of inbound events.
//!
//! Two events for the same contact (double taps, platform redelivery) are
//! handled one after the other; events for different contacts never wait
//! on each other.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutex, one slot per contact id.
#[derive(Default)]
pub struct ContactLocks {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

impl ContactLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other event for `contact_id` is in flight.
    pub async fn acquire(&self, contact_id: &str) -> ContactGuard<'_> {
        let slot = self
            .slots
            .entry(contact_id.to_string())
            .or_default()
            .clone();
        let guard = slot.lock_owned().await;
        ContactGuard {
            guard: Some(guard),
            locks: self,
            contact_id: contact_id.to_string(),
        }
    }

    /// Number of contacts with an event in flight or queued.
    pub fn active(&self) -> usize {
        self.slots.len()
    }
}

/// Held for the duration of one event. Frees the slot when nobody else waits.
pub struct ContactGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a ContactLocks,
    contact_id: String,
}

impl Drop for ContactGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .slots
            .remove_if(&self.contact_id, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_contact_is_serialized() {
        let locks = Arc::new(ContactLocks::new());
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let first = locks.acquire("42").await;

        let task = {
            let locks = Arc::clone(&locks);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let _guard = locks.acquire("42").await;
                order.lock().await.push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        order.lock().await.push("first");
        drop(first);

        task.await.unwrap();
        assert_eq!(*order.lock().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn different_contacts_do_not_block() {
        let locks = ContactLocks::new();
        let _a = locks.acquire("1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("2")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn slot_is_released_after_last_guard() {
        let locks = ContactLocks::new();
        {
            let _guard = locks.acquire("42").await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }
}
