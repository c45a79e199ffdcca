//! Inbound email intake: webhook authentication, content hygiene, and the
//! ingestion pipeline that turns an email into a linked message and task.

pub mod content;
pub mod pipeline;
pub mod signature;

pub use content::ContentRules;
pub use pipeline::{InboundEmail, IngestOutcome, IngestPipeline, IngestStage};
pub use signature::SignedToken;
