//! Progress marker owned by the poll loop.

use crate::processor::batch::BlockRange;

/// Height of the last fully processed block.
///
/// The cursor starts uninitialized. The first observed chain height seeds it
/// one block behind the tip so the first cycle always covers the most recent
/// block. Afterwards it only moves forward, and only through
/// [`Cursor::advance_to`] once a whole range has been processed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    next: Option<u64>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes after `height`, as if it had already been processed.
    pub fn starting_after(height: u64) -> Self {
        Self {
            next: Some(height.saturating_add(1)),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.next.is_some()
    }

    /// Last processed height. `None` until the cursor has been seeded or while
    /// it sits before genesis.
    pub fn last_processed(&self) -> Option<u64> {
        self.next.and_then(|next| next.checked_sub(1))
    }

    /// Range between the cursor and `observed`, or `None` when there is nothing new.
    ///
    /// Seeds the cursor on the first call. The seed is kept even if the
    /// returned range is never processed.
    pub fn pending_range(&mut self, observed: u64) -> Option<BlockRange> {
        let from = *self.next.get_or_insert(observed);
        if observed < from {
            return None;
        }
        Some(BlockRange::new(from, observed.saturating_add(1)))
    }

    /// Marks every height up to and including `height` as processed. Never moves backwards.
    pub fn advance_to(&mut self, height: u64) {
        let candidate = height.saturating_add(1);
        match self.next {
            Some(next) if next >= candidate => {}
            _ => self.next = Some(candidate),
        }
    }
}
