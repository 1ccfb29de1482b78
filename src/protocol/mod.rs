//! Extended query wire protocol: framing, frontend encoders, backend decoder.

pub mod backend;
pub mod codec;
pub mod frontend;
pub mod types;

pub use backend::BackendMessage;
pub use types::{FormatCode, Oid, TransactionStatus};
