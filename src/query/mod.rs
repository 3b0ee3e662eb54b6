//! Query layer
//!
//! Cursors build operator chains; terminals split each chain into a remote
//! prefix and a local suffix and pull rows through the local pipeline.
//!
//! ```ignore
//! let store = EntityStore::new(channel, registry);
//! let adults = store
//!     .cursor("Person")
//!     .filter_json(&json!({"age": {"$gte": 18}}))?
//!     .sort_by([SortKey::asc("name")])
//!     .take(10)
//!     .to_array(&ctx)
//!     .await?;
//! ```

mod aggregate;
mod chain;
mod context;
mod cursor;
mod errors;
mod expr;
mod pushdown;
mod restriction;
mod sort;
mod stream;

pub use chain::{AggregateKind, Fold, Operator, OperatorNode, Predicate, Transform};
pub use context::RequestContext;
pub use cursor::{Cursor, EntityStore};
pub use errors::{QueryError, QueryResult};
pub use expr::{BinaryExpr, BinaryOp, CompiledExpr, Expr, Literal, PropertyAccess};
pub use pushdown::{PushdownPolicy, SplitPlan};
pub use restriction::{compile_filter, Restriction, MAX_FILTER_DEPTH};
pub use stream::{BoxRowStream, QueryStream, RowFuture, RowStream};
