//! Destination stores for replicated change buffers.

mod client;
mod error;
mod mock;

pub use client::{collapse, TurbopufferStore, WriteBatch};
pub use error::{TpError, TpResult};
pub use mock::MockStore;
