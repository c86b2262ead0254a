//! Sans-I/O state machines.
//!
//! These state machines hold the cursor logic without calling the native
//! interface. They return actions that tell the caller what to do next.

pub mod cursor;

pub use cursor::{CloseAction, CursorState, CursorStateMachine, FetchAction};
