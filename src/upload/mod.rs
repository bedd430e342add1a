pub mod firebase;
pub mod memory;
pub mod push_id;
pub mod record;
pub mod sink;
pub mod stage;

#[cfg(test)]
mod tests;

pub use firebase::FirebaseSink;
pub use memory::{FailPoint, MemorySink, SinkOp};
pub use push_id::PushIdGenerator;
pub use record::{decode_image, encode_image, format_timestamp, LogRecord, RecordFeed};
pub use sink::{ChildRef, RemoteSink, ServerValue};
pub use stage::{UploadOutcome, UploadStage};
