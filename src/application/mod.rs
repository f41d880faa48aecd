// Application layer - use cases and orchestration.
// Reads flow ledger -> aggregator -> views; writes flow validator -> submitter -> reload.

pub mod aggregator;
pub mod error;
pub mod feed;
pub mod service;
pub mod submitter;

pub use aggregator::*;
pub use error::*;
pub use feed::*;
pub use service::*;
pub use submitter::*;
