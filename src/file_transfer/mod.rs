//! Chunked file transfer over each link's data channel: a `file-start`
//! control record, then raw binary chunks until the announced size is reached.
pub mod control;
pub mod dispatch;
pub mod errors;
pub mod receiver;
pub mod sender;

pub use control::ControlRecord;
pub use dispatch::{broadcast_file, on_channel_message, resume_sending};
pub use errors::TransferError;
pub use receiver::{IncomingTransfer, ReceivedFile};
pub use sender::{OutboundQueue, OutgoingFile, PumpOutcome};
