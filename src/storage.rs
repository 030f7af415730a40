//! Storage Layer
//!
//! Two persistence sinks plus the inventory read path:
//! - **Relational**: DuckDB inventory. Writes go through a bounded
//!   [`MutationQueue`] drained by one thread; reads use a cloned connection.
//! - **Time-series**: round-robin files, written through
//!   [`TimeSeriesSink`] with create-or-update semantics.
//!
//! # Components
//!
//! - [`MutationSender`]: backpressured `queue(statement, args)`
//! - [`RowSource`] / [`RowReader`]: `select_rows(query, args)`
//! - [`TimeSeriesStore`] / [`RrdFileStore`]: create and update files
//! - [`StorageBuilder`] / [`StorageHandles`]: initialization and shutdown

mod actor;
mod builder;
mod duck;
mod error;
mod queue;
mod rrd;
mod schema;
mod timeseries;

pub use actor::{DrainReport, RelationalStore};
pub use builder::{StorageBuilder, StorageHandles};
pub use duck::{DuckStore, Row, RowReader, RowSource};
pub use error::{StorageError, TimeSeriesError};
pub use queue::{DEFAULT_QUEUE_CAPACITY, Mutation, MutationQueue, MutationSender, SqlArg};
pub use rrd::{RrdFile, RrdFileStore};
pub use schema::init_schema;
pub use timeseries::{
    ArchiveSpec, Consolidation, DataSourceKind, DataSourceSpec, StoreOutcome, TimeSeriesSink,
    TimeSeriesStore, TsConfig, default_archives,
};
