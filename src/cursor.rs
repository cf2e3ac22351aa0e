//! Cursor state machine shared by every engine.
//!
//! An engine answers `find(predicate)` with a [`RecordSource`] that yields
//! matching records in the engine's natural order. [`Cursor`] wraps the
//! source and owns the lifecycle:
//!
//! ```text
//! Initialized --next--> Active --next--> ... --next--> EndOfResults
//!      \___________________next (nothing left)_______________/
//! ```
//!
//! `EndOfResults` is terminal. A cursor holds a shared borrow of its
//! dictionary, so the dictionary cannot be mutated while the cursor lives.

use crate::error::Result;
use crate::record::Record;

/// Position of a cursor in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Created with at least one candidate record, nothing returned yet.
    Initialized,
    /// The last call to `next` returned a record.
    Active,
    /// No further records. Terminal.
    EndOfResults,
}

/// Engine-side producer of matching records.
pub trait RecordSource {
    /// Returns the next matching record, or `None` once exhausted.
    fn next_record(&mut self) -> Result<Option<Record>>;
}

/// Iterator over the records matching a predicate.
pub struct Cursor<'a> {
    state: CursorState,
    source: Option<Box<dyn RecordSource + 'a>>,
    pending: Option<Record>,
}

impl<'a> Cursor<'a> {
    /// Wraps a source, prefetching one record to pick the initial state.
    pub fn new(mut source: Box<dyn RecordSource + 'a>) -> Result<Self> {
        match source.next_record()? {
            Some(first) => Ok(Self {
                state: CursorState::Initialized,
                source: Some(source),
                pending: Some(first),
            }),
            None => Ok(Self::exhausted()),
        }
    }

    /// A cursor with no results.
    pub fn exhausted() -> Self {
        Self { state: CursorState::EndOfResults, source: None, pending: None }
    }

    /// Current state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Drains the cursor into a vector.
    pub fn collect_records(self) -> Result<Vec<Record>> {
        self.collect()
    }

    /// Releases the position state. Dropping the cursor does the same.
    pub fn destroy(self) {}

    fn finish(&mut self) {
        self.state = CursorState::EndOfResults;
        self.source = None;
        self.pending = None;
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == CursorState::EndOfResults {
            return None;
        }

        if let Some(record) = self.pending.take() {
            self.state = CursorState::Active;
            return Some(Ok(record));
        }

        let source = match self.source.as_mut() {
            Some(source) => source,
            None => {
                self.finish();
                return None;
            }
        };

        match source.next_record() {
            Ok(Some(record)) => {
                self.state = CursorState::Active;
                Some(Ok(record))
            }
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                log::warn!("Cursor terminated by error: {}", e);
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").field("state", &self.state).finish()
    }
}
