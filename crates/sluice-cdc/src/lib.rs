//! # sluice-cdc - MySQL binlog transaction assembly for sluice
//!
//! Consumes the decoded event stream of a MySQL replication client,
//! assembles whole transactions, transforms row mutations into
//! self-describing change records, and emits each transaction atomically to
//! a downstream producer with a monotonic checkpoint token.
//!
//! ## Architecture
//!
//! ```text
//! replication client ──> BinlogEvent ──> TransactionAssembler ──> ProducerSink
//!                                          │          │
//!                                          │          └─ SourceCheckpoint per batch
//!                                          └─ TableInfoProvider (column metadata)
//! ```
//!
//! The wire protocol, connection lifecycle, and checkpoint persistence live
//! with external collaborators; this crate owns the transaction state
//! machine and its invariants: no record is emitted outside an open
//! transaction, a rollback discards everything pending, and a commit hands
//! the producer exactly one batch.
//!
//! ## Quick Start
//!
//! ```rust
//! use sluice_cdc::{
//!     BinlogEvent, ColumnInfo, EventHeader, MemorySink, StaticTableInfo, TransactionAssembler,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sluice_cdc::Result<()> {
//! let sink = MemorySink::new();
//! let tables = StaticTableInfo::new()
//!     .with_table("shop", "orders", vec![ColumnInfo::new("id", true, 0)]);
//!
//! let mut assembler = TransactionAssembler::new(sink.clone(), tables);
//! assembler
//!     .on_event(BinlogEvent::query("BEGIN", EventHeader::new(0, 4)))
//!     .await?;
//! assembler
//!     .on_event(BinlogEvent::query("COMMIT", EventHeader::new(0, 8)))
//!     .await?;
//! assert_eq!(sink.batch_count().await, 0); // empty transactions emit nothing
//! # Ok(())
//! # }
//! ```

mod assembler;
mod checkpoint;
mod error;
mod event;
mod producer;
mod record;
mod table_info;

pub use assembler::{AssemblerConfig, AssemblerConfigBuilder, AssemblerStats, TransactionAssembler};
pub use checkpoint::SourceCheckpoint;
pub use error::{CdcError, Result};
pub use event::{
    format_source_id, BinlogEvent, ColumnValue, EventClass, EventHeader, EventPayload, RowData,
    RowsEvent, RowsVersion,
};
pub use producer::{MemorySink, ProducerSink};
pub use record::{ChangeOp, ChangeRecord, ProducerRecord};
pub use table_info::{ColumnCache, ColumnInfo, StaticTableInfo, TableInfoProvider};
