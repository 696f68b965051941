//! Event journal and replay for axon.
//!
//! One JSON-Lines file per thread under a root directory. Appends are
//! non-blocking: a background writer task per thread buffers lines and
//! flushes at a batch-size or interval boundary, whichever comes first.
//! [`Reconstructor`] folds a replayed log back into an
//! [`ExecutionFrame`](axon_types::ExecutionFrame), which is how crashed or
//! interrupted threads resume.

pub mod journal;
pub mod reconstruct;

pub use journal::{Journal, JournalConfig};
pub use reconstruct::{Reconstructor, ReplayMetadata};
