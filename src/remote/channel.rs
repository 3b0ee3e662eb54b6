//! Remote query channel
//!
//! The remote engine streams a query's result one row at a time. Callers
//! own the handle returned by `open` and must `close` it exactly once.

use std::future::Future;
use std::pin::Pin;

use super::errors::ChannelResult;
use super::wire::RemoteQuery;
use crate::query::RequestContext;

/// A raw row as produced by the remote engine
pub type RawRow = serde_json::Map<String, serde_json::Value>;

/// Opaque handle of an open remote query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub u64);

/// Boxed future returned by channel operations
pub type ChannelFuture<'a, T> = Pin<Box<dyn Future<Output = ChannelResult<T>> + Send + 'a>>;

/// Row-at-a-time access to the remote query engine
pub trait RemoteChannel: Send + Sync {
    /// Starts executing `query` and returns its handle
    fn open<'a>(
        &'a self,
        query: &'a RemoteQuery,
        ctx: &'a RequestContext,
    ) -> ChannelFuture<'a, QueryHandle>;

    /// Fetches the next row, `None` once the result is exhausted
    fn next(&self, handle: QueryHandle) -> ChannelFuture<'_, Option<RawRow>>;

    /// Releases the query; the handle is invalid afterwards
    fn close(&self, handle: QueryHandle) -> ChannelFuture<'_, ()>;
}
