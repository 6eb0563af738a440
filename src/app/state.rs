//! The letter handed from the recognition pipeline to the render loop.
//!
//! Each slot is one `AtomicU64` holding `version << 8 | letter`, with 0 in
//! the low byte meaning no letter. A reader loads both fields in a single
//! atomic read, so it can never see the letter of one publish paired with
//! the version of another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::letters::Letter;

#[derive(Debug, Default)]
struct Slots {
    latched: AtomicU64,
    hint: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub letter: Option<Letter>,
    pub version: u64,
}

fn pack(letter: Option<Letter>, version: u64) -> u64 {
    (version << 8) | u64::from(letter.map_or(0, Letter::as_byte))
}

fn unpack(word: u64) -> Snapshot {
    Snapshot {
        letter: Letter::from_byte((word & 0xff) as u8),
        version: word >> 8,
    }
}

/// Creates a connected writer/reader pair, both starting empty at version 0.
pub fn recognition_state() -> (StatePublisher, StateReader) {
    let slots = Arc::new(Slots::default());
    (
        StatePublisher {
            slots: slots.clone(),
        },
        StateReader { slots },
    )
}

/// The only writer. Deliberately not `Clone`.
#[derive(Debug)]
pub struct StatePublisher {
    slots: Arc<Slots>,
}

impl StatePublisher {
    fn bump(slot: &AtomicU64, letter: Option<Letter>) {
        // Single writer, so load-then-store can't lose an update.
        let version = unpack(slot.load(Ordering::Relaxed)).version + 1;
        slot.store(pack(letter, version), Ordering::Release);
    }

    /// Latches a Final result and drops any pending hint. The hint is
    /// cleared first: a reader that sees the new letter never sees the
    /// hint it replaced.
    pub fn publish(&self, letter: Option<Letter>) {
        if unpack(self.slots.hint.load(Ordering::Relaxed)).letter.is_some() {
            Self::bump(&self.slots.hint, None);
        }
        Self::bump(&self.slots.latched, letter);
    }

    /// Offers a low-confidence hint. Ignored while a Final letter is
    /// latched; returns whether the hint was taken.
    pub fn publish_hint(&self, letter: Letter) -> bool {
        if unpack(self.slots.latched.load(Ordering::Relaxed)).letter.is_some() {
            return false;
        }
        if unpack(self.slots.hint.load(Ordering::Relaxed)).letter != Some(letter) {
            Self::bump(&self.slots.hint, Some(letter));
        }
        true
    }

    pub fn clear(&self) {
        self.publish(None);
    }

    pub fn reader(&self) -> StateReader {
        StateReader {
            slots: self.slots.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateReader {
    slots: Arc<Slots>,
}

impl StateReader {
    pub fn snapshot(&self) -> Snapshot {
        unpack(self.slots.latched.load(Ordering::Acquire))
    }

    pub fn current_letter(&self) -> Option<Letter> {
        self.snapshot().letter
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    pub fn hint(&self) -> Option<Letter> {
        unpack(self.slots.hint.load(Ordering::Acquire)).letter
    }
}

/// Reports a snapshot only when its version differs from the last one seen,
/// so one-shot effects fire once per result instead of every frame.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    seen: u64,
}

impl ChangeTracker {
    pub fn poll(&mut self, reader: &StateReader) -> Option<Snapshot> {
        let snapshot = reader.snapshot();
        (snapshot.version != self.seen).then(|| {
            self.seen = snapshot.version;
            snapshot
        })
    }
}
