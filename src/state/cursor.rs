//! Result-set cursor state machine.
//!
//! ```text
//!            fetch ok                 fetch no-data
//!   Open ─────────────▶ FetchedRow ─────────────────▶ Exhausted
//!    ▲                   │  ▲  │ fetch ok               │
//!    │                   │  └──┘                        │
//!    └───── more results ok (re-described) ◀────────────┘
//!
//!   any fetch error ─▶ Broken          any close ─▶ Closed
//! ```
//!
//! The machine decides what the driver must do next; it never calls the
//! native interface itself.

use crate::diag::Outcome;
use crate::error::{Error, Result};

/// Cursor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Columns are bound, no row fetched yet.
    Open,
    /// A row has been fetched and can be read.
    FetchedRow,
    /// The current result set has no more rows.
    Exhausted,
    /// A fetch failed; only moving to the next result set or closing is allowed.
    Broken,
    Closed,
}

/// What a `next()` call has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAction {
    /// Issue a fetch.
    Fetch,
    /// Report end-of-sequence without touching the handle.
    EndOfSequence,
}

/// What a `close()` call has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Nothing: a background cancel owns the handle, or the cursor is already closed.
    Nothing,
    /// Release the statement handle.
    ReleaseHandle,
    /// Close the cursor only; the statement stays reusable.
    CloseCursor,
}

/// Cursor state machine for one executed statement.
#[derive(Debug, Clone)]
pub struct CursorStateMachine {
    state: CursorState,
    column_count: usize,
}

impl CursorStateMachine {
    /// Start on a freshly described result set.
    pub fn new(column_count: usize) -> Self {
        Self {
            state: CursorState::Open,
            column_count,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Decide what `next()` does in the current state.
    ///
    /// A result set without columns has no rows to fetch and is exhausted
    /// right away.
    pub fn next_row(&mut self) -> Result<FetchAction> {
        match self.state {
            CursorState::Open | CursorState::FetchedRow if self.column_count == 0 => {
                self.state = CursorState::Exhausted;
                Ok(FetchAction::EndOfSequence)
            }
            CursorState::Open | CursorState::FetchedRow => Ok(FetchAction::Fetch),
            CursorState::Exhausted => Ok(FetchAction::EndOfSequence),
            CursorState::Broken => Err(Error::InvalidUsage(
                "cursor is unusable after a failed fetch".into(),
            )),
            CursorState::Closed => Err(Error::InvalidUsage("cursor is closed".into())),
        }
    }

    /// Record the outcome of a fetch.
    pub fn fetched(&mut self, outcome: Result<Outcome>) -> Result<FetchAction> {
        match outcome {
            Ok(Outcome::Success) => {
                self.state = CursorState::FetchedRow;
                Ok(FetchAction::Fetch)
            }
            Ok(Outcome::NoData) => {
                self.state = CursorState::Exhausted;
                Ok(FetchAction::EndOfSequence)
            }
            Err(e) => {
                self.state = CursorState::Broken;
                Err(e)
            }
        }
    }

    /// Check that the next result set may be requested.
    pub fn begin_next_result_set(&self) -> Result<()> {
        match self.state {
            CursorState::Closed => Err(Error::InvalidUsage("cursor is closed".into())),
            _ => Ok(()),
        }
    }

    /// Record the outcome of moving to the next result set.
    ///
    /// `columns` is only called on success: re-describing happens only when
    /// there actually is a new result set.
    pub fn next_result_set(
        &mut self,
        outcome: Result<Outcome>,
        columns: impl FnOnce() -> Result<usize>,
    ) -> Result<bool> {
        match outcome {
            Ok(Outcome::Success) => match columns() {
                Ok(count) => {
                    self.column_count = count;
                    self.state = CursorState::Open;
                    Ok(true)
                }
                Err(e) => {
                    self.state = CursorState::Broken;
                    Err(e)
                }
            },
            Ok(Outcome::NoData) => {
                self.state = CursorState::Exhausted;
                Ok(false)
            }
            Err(e) => {
                self.state = CursorState::Broken;
                Err(e)
            }
        }
    }

    /// Decide what `close()` does and move to `Closed`.
    ///
    /// `closing_in_background` wins over everything else: the canceller owns
    /// the handle and no close path may touch it.
    pub fn close(&mut self, closing_in_background: bool, statement_closed: bool) -> CloseAction {
        let action = if closing_in_background || self.state == CursorState::Closed {
            CloseAction::Nothing
        } else if statement_closed {
            CloseAction::ReleaseHandle
        } else {
            CloseAction::CloseCursor
        };
        self.state = CursorState::Closed;
        action
    }
}
