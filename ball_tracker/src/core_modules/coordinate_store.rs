// THEORY:
// The `CoordinateStore` is the only mutable state shared between the detector
// thread and the async telemetry loop. It holds exactly one value: the most
// recent detection. There is no history; a newer detection simply overwrites
// the older one (last-write-wins). Both coordinates live behind one lock so a
// reader always sees a pair produced by a single detection.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Integer pixel coordinates of a detected ball centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
}

impl Coordinates {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Default)]
struct Slot {
    latest: Option<Coordinates>,
    updates: u64,
}

/// Single-slot, last-write-wins holder for the latest detection.
#[derive(Debug, Default)]
pub struct CoordinateStore {
    slot: Mutex<Slot>,
}

impl CoordinateStore {
    /// An unset store; `latest` returns `None` until the first publish.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored pair as one unit.
    pub fn publish(&self, coordinates: Coordinates) {
        let mut slot = self.slot.lock();
        slot.latest = Some(coordinates);
        slot.updates += 1;
    }

    pub fn latest(&self) -> Option<Coordinates> {
        self.slot.lock().latest
    }

    /// How many detections have been published so far.
    pub fn update_count(&self) -> u64 {
        self.slot.lock().updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_unset_and_keeps_the_last_write() {
        let store = CoordinateStore::new();
        assert_eq!(store.latest(), None);
        store.publish(Coordinates::new(1, 2));
        store.publish(Coordinates::new(3, 4));
        assert_eq!(store.latest(), Some(Coordinates::new(3, 4)));
        assert_eq!(store.update_count(), 2);
    }

    #[test]
    fn readers_never_see_a_torn_pair() {
        let store = Arc::new(CoordinateStore::new());
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..50_000 {
                    store.publish(Coordinates::new(i, -i));
                }
            })
        };
        for _ in 0..50_000 {
            if let Some(c) = store.latest() {
                assert_eq!(c.x, -c.y);
            }
        }
        writer.join().unwrap();
        assert_eq!(store.latest(), Some(Coordinates::new(49_999, -49_999)));
    }
}
