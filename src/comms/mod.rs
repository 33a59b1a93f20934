//! Communication with the remote authority

pub mod memory;
pub mod transport;

pub use memory::MemoryTransport;
pub use transport::{BoxFuture, PushHandler, RemoteResponse, Transport};
