//! In-process request/reply bus between the HTTP tier and the repository
//! workers.
//!
//! 1. **Dispatch** (`dispatcher`): address selection, round-robin delivery,
//!    timeout
//! 2. **Correlation** (`pending`): request id -> waiting caller
//! 3. **Workers** (`worker`): sequential mailbox consumers
//! 4. **Config** (`config`): pool size, timeouts, mailbox capacity

pub mod config;
pub mod dispatcher;
pub mod pending;
pub mod worker;

pub use config::BusConfig;
pub use dispatcher::{DispatchError, Dispatcher, Mailbox};
pub use pending::{PendingReplies, PendingWait};
pub use worker::{BusWorker, FrameHandler};
