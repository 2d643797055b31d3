//! # Binlog transaction assembly
//!
//! Consumes the decoded event stream of a MySQL replication client,
//! assembles whole transactions, and emits each one as a single producer
//! batch stamped with a checkpoint token.
//!
//! ## State machine
//!
//! ```text
//!        Gtid / BEGIN                    COMMIT / XID
//! Idle ───────────────> InTxn ─────────────────────────> emit batch, Idle
//!   ▲                     │ ROLLBACK
//!   └─────────────────────┘ discard pending records
//! ```
//!
//! Rotate and format-description events update the current binlog file in
//! both states; the file name survives rollbacks and transaction
//! boundaries. Row events outside an open transaction are ignored, as are
//! commit markers without one.
//!
//! Records are emitted whole or not at all: the producer either accepts a
//! transaction's full batch or the send fails and the error is returned to
//! the caller, which owns producer shutdown and rewind to
//! [`TransactionAssembler::last_checkpoint`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use tracing::{debug, error, info, trace, warn};

use crate::checkpoint::SourceCheckpoint;
use crate::error::Result;
use crate::event::{format_source_id, BinlogEvent, EventClass, EventPayload, RowsEvent};
use crate::producer::ProducerSink;
use crate::record::{ChangeOp, ChangeRecord, ProducerRecord};
use crate::table_info::{ColumnCache, ColumnInfo, TableInfoProvider};

/// Source id reported for transactions that never saw a GTID event.
const DEFAULT_SOURCE_ID: &str = "None";

/// Assembler tuning knobs.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Destination partition for every batch
    pub destination_partition: u32,
    /// Source id used until a GTID event names one
    pub default_source_id: String,
    /// Pending-record count that triggers a warning for oversized transactions
    pub max_pending_records: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            destination_partition: 0,
            default_source_id: DEFAULT_SOURCE_ID.to_string(),
            max_pending_records: 100_000,
        }
    }
}

impl AssemblerConfig {
    /// Create a new config builder.
    pub fn builder() -> AssemblerConfigBuilder {
        AssemblerConfigBuilder::default()
    }
}

/// Builder for [`AssemblerConfig`].
#[derive(Default)]
pub struct AssemblerConfigBuilder {
    config: AssemblerConfig,
}

impl AssemblerConfigBuilder {
    /// Set the destination partition.
    pub fn destination_partition(mut self, partition: u32) -> Self {
        self.config.destination_partition = partition;
        self
    }

    /// Set the source id used before a GTID event arrives.
    pub fn default_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.config.default_source_id = source_id.into();
        self
    }

    /// Set the pending-record warning threshold.
    pub fn max_pending_records(mut self, max: usize) -> Self {
        self.config.max_pending_records = max;
        self
    }

    /// Build the config.
    pub fn build(self) -> AssemblerConfig {
        self.config
    }
}

/// Counters for assembler activity.
#[derive(Debug, Default)]
pub struct AssemblerStats {
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    records_emitted: AtomicU64,
    rows_skipped: AtomicU64,
    events_ignored: AtomicU64,
}

impl AssemblerStats {
    fn record_commit(&self, records: u64) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
        self.records_emitted.fetch_add(records, Ordering::Relaxed);
    }

    fn record_rollback(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rows_skipped(&self, rows: u64) {
        self.rows_skipped.fetch_add(rows, Ordering::Relaxed);
    }

    fn record_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Transactions closed by COMMIT or XID.
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Transactions discarded by ROLLBACK.
    pub fn transactions_rolled_back(&self) -> u64 {
        self.transactions_rolled_back.load(Ordering::Relaxed)
    }

    /// Change records handed to the producer.
    pub fn records_emitted(&self) -> u64 {
        self.records_emitted.load(Ordering::Relaxed)
    }

    /// Rows dropped for missing table or image data.
    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped.load(Ordering::Relaxed)
    }

    /// Events skipped outside a transaction or unrecognized.
    pub fn events_ignored(&self) -> u64 {
        self.events_ignored.load(Ordering::Relaxed)
    }
}

/// Assembles binlog events into per-transaction producer batches.
///
/// Driven serially by a single reader context; owns its state without
/// locking. The producer send is awaited, so commit ordering follows binlog
/// commit order.
pub struct TransactionAssembler<P, T> {
    producer: P,
    table_info: T,
    config: AssemblerConfig,
    columns: ColumnCache,
    stats: AssemblerStats,

    txn_open: bool,
    source_id: String,
    sequence: u64,
    /// table-id to `db.table`, valid for the current transaction only
    table_names: HashMap<u64, String>,
    pending: Vec<ChangeRecord>,
    last_position: u64,
    last_timestamp_ms: i64,
    current_file: String,
    last_checkpoint: Option<SourceCheckpoint>,
}

impl<P: ProducerSink, T: TableInfoProvider> TransactionAssembler<P, T> {
    /// Create an assembler with default configuration.
    pub fn new(producer: P, table_info: T) -> Self {
        Self::with_config(producer, table_info, AssemblerConfig::default())
    }

    /// Create an assembler with the given configuration.
    pub fn with_config(producer: P, table_info: T, config: AssemblerConfig) -> Self {
        let source_id = config.default_source_id.clone();
        Self {
            producer,
            table_info,
            config,
            columns: ColumnCache::new(),
            stats: AssemblerStats::default(),
            txn_open: false,
            source_id,
            sequence: 0,
            table_names: HashMap::new(),
            pending: Vec::new(),
            last_position: 0,
            last_timestamp_ms: 0,
            current_file: String::new(),
            last_checkpoint: None,
        }
    }

    /// Activity counters.
    pub fn stats(&self) -> &AssemblerStats {
        &self.stats
    }

    /// Checkpoint of the most recent successfully emitted batch, the rewind
    /// point after a producer failure.
    pub fn last_checkpoint(&self) -> Option<&SourceCheckpoint> {
        self.last_checkpoint.as_ref()
    }

    /// Binlog file the stream currently reads from.
    pub fn current_file(&self) -> &str {
        &self.current_file
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.txn_open
    }

    /// Feed one decoded binlog event through the state machine.
    ///
    /// Returns an error only when the producer rejects a batch; every other
    /// anomaly is logged and skipped without aborting the stream.
    pub async fn on_event(&mut self, event: BinlogEvent) -> Result<()> {
        trace!(
            kind = event.payload.kind_name(),
            position = event.header.position,
            "binlog event"
        );
        self.last_position = event.header.position;
        self.last_timestamp_ms = event.header.timestamp_ms;

        match event.payload.class() {
            EventClass::Rotate => {
                if let EventPayload::Rotate { next_file } = event.payload {
                    // checkpointed right after the next transaction commits
                    info!(file = %next_file, "binlog rotated");
                    self.current_file = next_file;
                }
                Ok(())
            }
            EventClass::Ignorable => {
                match event.payload {
                    EventPayload::FormatDescription { file } => {
                        info!(file = %file, "format description received");
                        self.current_file = file;
                    }
                    _ => {
                        warn!("stop event received, ignoring");
                        self.stats.record_ignored();
                    }
                }
                Ok(())
            }
            EventClass::TxnStart => {
                if let EventPayload::Gtid {
                    source_id,
                    sequence,
                } = &event.payload
                {
                    self.source_id = format_source_id(source_id);
                    self.sequence = *sequence;
                }
                if !self.txn_open {
                    debug!(sequence = self.sequence, "transaction opened");
                    self.txn_open = true;
                }
                Ok(())
            }
            EventClass::TxnEnd => {
                if self.txn_open {
                    self.end_transaction().await
                } else {
                    trace!("commit marker outside an open transaction, ignoring");
                    self.stats.record_ignored();
                    Ok(())
                }
            }
            EventClass::Rollback => {
                if self.txn_open {
                    info!(
                        sequence = self.sequence,
                        discarded = self.pending.len(),
                        "transaction rolled back"
                    );
                    self.stats.record_rollback();
                    self.reset_transaction();
                } else {
                    self.stats.record_ignored();
                }
                Ok(())
            }
            EventClass::TableMap => {
                if !self.txn_open {
                    self.stats.record_ignored();
                    return Ok(());
                }
                if let EventPayload::TableMap {
                    table_id,
                    database,
                    table,
                } = event.payload
                {
                    self.table_names
                        .insert(table_id, format!("{database}.{table}"));
                }
                Ok(())
            }
            EventClass::RowMutation(op) => {
                if !self.txn_open {
                    self.stats.record_ignored();
                    return Ok(());
                }
                if let EventPayload::WriteRows(rows)
                | EventPayload::UpdateRows(rows)
                | EventPayload::DeleteRows(rows) = event.payload
                {
                    self.shape_rows(op, rows, event.header.timestamp_ms)?;
                }
                Ok(())
            }
            EventClass::Unknown => {
                warn!(
                    kind = event.payload.kind_name(),
                    "skipping unrecognized binlog event"
                );
                self.stats.record_ignored();
                Ok(())
            }
        }
    }

    /// Join rows with column metadata and append change records to the open
    /// transaction.
    fn shape_rows(&mut self, op: ChangeOp, rows: RowsEvent, timestamp_ms: i64) -> Result<()> {
        let (database, table) = match self.table_names.get(&rows.table_id) {
            Some(full_name) => match full_name.split_once('.') {
                Some((db, tbl)) => (db.to_string(), tbl.to_string()),
                None => {
                    error!(name = %full_name, "malformed table name, skipping row event");
                    self.stats.record_rows_skipped(rows.rows.len() as u64);
                    return Ok(());
                }
            },
            None => {
                error!(
                    table_id = rows.table_id,
                    file = %self.current_file,
                    position = self.last_position,
                    "row event for unmapped table id, skipping"
                );
                self.stats.record_rows_skipped(rows.rows.len() as u64);
                return Ok(());
            }
        };

        let columns = self.column_list(&database, &table)?;
        let gtid = format!("{}:{}", self.source_id, self.sequence);
        debug!(
            file = %self.current_file,
            position = self.last_position,
            gtid = %gtid,
            "shaping row event"
        );

        for row in rows.rows {
            // UPDATE events supply only the after-image here
            let values = match op {
                ChangeOp::Delete => row.before,
                ChangeOp::Insert | ChangeOp::Update => row.after,
            };
            let Some(values) = values else {
                warn!(op = %op, "row event missing its image, skipping row");
                self.stats.record_rows_skipped(1);
                continue;
            };
            if values.len() != columns.len() {
                warn!(
                    table = %table,
                    columns = columns.len(),
                    values = values.len(),
                    "column metadata does not match row width"
                );
            }

            let mut key = Map::new();
            let mut full_row = Map::new();
            for (info, value) in columns.iter().zip(values.iter()) {
                let rendered = value.render();
                if info.is_key {
                    key.insert(info.name.clone(), Value::String(rendered.clone()));
                }
                full_row.insert(info.name.clone(), Value::String(rendered));
            }

            self.pending.push(ChangeRecord {
                op,
                gtid: gtid.clone(),
                timestamp_ms,
                database: database.clone(),
                table: table.clone(),
                key: Value::Object(key),
                value: Value::Object(full_row),
            });
        }

        if self.pending.len() > self.config.max_pending_records {
            warn!(
                pending = self.pending.len(),
                "open transaction exceeds the pending-record threshold"
            );
        }
        Ok(())
    }

    /// Read-through column lookup.
    fn column_list(&mut self, database: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        if let Some(columns) = self.columns.get(database, table) {
            return Ok(columns.to_vec());
        }
        let columns = self.table_info.column_list(database, table)?;
        debug!(database, table, count = columns.len(), "cached column metadata");
        self.columns.insert(database, table, columns.clone());
        Ok(columns)
    }

    /// Close the open transaction, emitting its records as one batch.
    async fn end_transaction(&mut self) -> Result<()> {
        debug!(
            sequence = self.sequence,
            pending = self.pending.len(),
            "ending transaction"
        );

        if self.pending.is_empty() {
            self.stats.record_commit(0);
            self.reset_transaction();
            return Ok(());
        }

        let checkpoint = SourceCheckpoint::new(
            self.source_id.clone(),
            self.sequence,
            self.current_file.clone(),
            self.last_position,
        );
        let batch = ProducerRecord {
            // TODO: support multi-partition destinations; every batch
            // currently lands on the one configured partition.
            partition: self.config.destination_partition,
            checkpoint: checkpoint.to_token(),
            records: std::mem::take(&mut self.pending),
        };
        let count = batch.records.len() as u64;

        match self.producer.send(batch).await {
            Ok(()) => {
                debug!(checkpoint = %checkpoint, records = count, "transaction batch accepted");
                self.stats.record_commit(count);
                self.last_checkpoint = Some(checkpoint);
                self.reset_transaction();
                Ok(())
            }
            Err(e) => {
                error!(
                    checkpoint = %checkpoint,
                    error = %e,
                    "transaction batch rejected, supervisor must rewind"
                );
                self.reset_transaction();
                Err(e)
            }
        }
    }

    fn reset_transaction(&mut self) {
        self.table_names.clear();
        self.pending.clear();
        self.sequence = 0;
        self.source_id = self.config.default_source_id.clone();
        self.txn_open = false;
    }
}
