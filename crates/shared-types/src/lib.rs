//! Domain types and pure logic for the job application tracker.
//!
//! Nothing in this crate performs I/O. The backend fetches messages, calls the
//! classifier and talks to the spreadsheet; everything in between (normalizing
//! a message, gating senders, parsing the verdict, deduplicating) lives here.

mod application;
mod filter;
mod message;
mod snapshot;

pub use application::{JobApplicationRecord, APPLICATION_RESPONSE, NOT_AVAILABLE, OTHER};
pub use filter::{SenderFilter, DEFAULT_DENIED_SENDERS};
pub use message::{NormalizedMessage, RawHeader, RawMessage, RawPart};
pub use snapshot::ApplicationSnapshot;
