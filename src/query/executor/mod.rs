// Query Executor Module
//
// This module is responsible for materializing query results. It implements
// the pull-based enumeration model: one element per advance, with the
// connection held only while a reader is open.

pub mod context;
pub mod coordinator;
pub mod diagnostics;
pub mod enumerable;
pub mod expression_eval;
pub mod result;
pub mod shaper;

// Export key types
pub use self::context::QueryContext;
pub use self::coordinator::ResultCoordinator;
pub use self::diagnostics::{LogQueryLogger, QueryIterationFailed, QueryLogger};
pub use self::enumerable::{EnumeratorStatus, QueryingEnumerable, QueryingEnumerator};
pub use self::result::{DataValue, QueryError, QueryResult, QueryResultSet, Row};
pub use self::shaper::{Group, GroupingShaper, Shaper, row_shaper, shaper, typed_shaper};
