//! The conversation loop of Parley.
//!
//! A session follows a **Ask → Dispatch → Ask again** cycle:
//!
//! 1. **Receive** a user message (text and images)
//! 2. **Send** the whole conversation and the declared tools to the model
//! 3. **If tool calls**: validate and run them, append every result next to
//!    its call, loop back to step 2
//! 4. **If text only**: hand control back to the caller
//!
//! A task ends when the model's text contains the sentinel, or after the
//! iteration budget is spent.

pub mod dispatcher;
pub mod session;
pub mod termination;

#[cfg(test)]
mod test_helpers;

pub use dispatcher::{Dispatched, ToolDispatcher};
pub use session::{Outcome, Session, SessionState, Step};
pub use termination::{TerminationDetector, Verdict};
