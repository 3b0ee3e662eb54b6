//! Remote query channel
//!
//! The asynchronous boundary to the remote query engine: the channel trait,
//! the operator-chain document it receives, and an in-memory engine.

mod channel;
mod errors;
mod memory;
mod wire;

pub use channel::{ChannelFuture, QueryHandle, RawRow, RemoteChannel};
pub use errors::{ChannelError, ChannelResult};
pub use memory::MemoryChannel;
pub use wire::{RemoteQuery, SortKey};
