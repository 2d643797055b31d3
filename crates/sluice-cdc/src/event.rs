//! Binlog event model and classification
//!
//! Events arrive from the replication client already decoded into a tagged
//! union. The assembler never touches wire bytes; it dispatches on
//! [`EventClass`], the category a payload maps to:
//!
//! - rotate and format-description events track the current binlog file
//! - GTID and `BEGIN` queries open a transaction
//! - `COMMIT` queries and XID events close one
//! - table-map events bind numeric table ids to `db.table` names
//! - row events (v1 and v2 variants) become change records
//! - anything else is logged and skipped

use crate::record::ChangeOp;

/// Fixed part of every binlog event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    /// Event timestamp in epoch milliseconds
    pub timestamp_ms: i64,
    /// Byte position of the event within the current binlog file
    pub position: u64,
}

impl EventHeader {
    pub fn new(timestamp_ms: i64, position: u64) -> Self {
        Self {
            timestamp_ms,
            position,
        }
    }
}

/// One decoded binlog event: header plus typed payload.
#[derive(Debug, Clone)]
pub struct BinlogEvent {
    pub header: EventHeader,
    pub payload: EventPayload,
}

impl BinlogEvent {
    pub fn new(header: EventHeader, payload: EventPayload) -> Self {
        Self { header, payload }
    }

    /// Rotate to a new binlog file.
    pub fn rotate(next_file: impl Into<String>, header: EventHeader) -> Self {
        Self::new(
            header,
            EventPayload::Rotate {
                next_file: next_file.into(),
            },
        )
    }

    /// Format description, carrying the name of the file it opens.
    pub fn format_description(file: impl Into<String>, header: EventHeader) -> Self {
        Self::new(header, EventPayload::FormatDescription { file: file.into() })
    }

    /// Server stop marker.
    pub fn stop(header: EventHeader) -> Self {
        Self::new(header, EventPayload::Stop)
    }

    /// GTID of the transaction that follows.
    pub fn gtid(source_id: impl Into<Vec<u8>>, sequence: u64, header: EventHeader) -> Self {
        Self::new(
            header,
            EventPayload::Gtid {
                source_id: source_id.into(),
                sequence,
            },
        )
    }

    /// Statement event (`BEGIN`, `COMMIT`, `ROLLBACK`, DDL, ...).
    pub fn query(sql: impl Into<String>, header: EventHeader) -> Self {
        Self::new(header, EventPayload::Query { sql: sql.into() })
    }

    /// XID commit marker.
    pub fn xid(xid: u64, header: EventHeader) -> Self {
        Self::new(header, EventPayload::Xid { xid })
    }

    /// Table-id to name binding for the current transaction.
    pub fn table_map(
        table_id: u64,
        database: impl Into<String>,
        table: impl Into<String>,
        header: EventHeader,
    ) -> Self {
        Self::new(
            header,
            EventPayload::TableMap {
                table_id,
                database: database.into(),
                table: table.into(),
            },
        )
    }

    pub fn write_rows(rows: RowsEvent, header: EventHeader) -> Self {
        Self::new(header, EventPayload::WriteRows(rows))
    }

    pub fn update_rows(rows: RowsEvent, header: EventHeader) -> Self {
        Self::new(header, EventPayload::UpdateRows(rows))
    }

    pub fn delete_rows(rows: RowsEvent, header: EventHeader) -> Self {
        Self::new(header, EventPayload::DeleteRows(rows))
    }
}

/// Typed binlog event payload.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Rotate to a new binlog file
    Rotate { next_file: String },

    /// Binlog format info; names the file it opens
    FormatDescription { file: String },

    /// Server stopped
    Stop,

    /// GTID for the following transaction
    Gtid { source_id: Vec<u8>, sequence: u64 },

    /// Statement event; only BEGIN/COMMIT/ROLLBACK are meaningful here
    Query { sql: String },

    /// Transaction commit
    Xid { xid: u64 },

    /// Maps a numeric table id to its database and table name
    TableMap {
        table_id: u64,
        database: String,
        table: String,
    },

    /// Row insert
    WriteRows(RowsEvent),

    /// Row update
    UpdateRows(RowsEvent),

    /// Row delete
    DeleteRows(RowsEvent),

    /// Unrecognized event type
    Unknown { event_type: u8 },
}

impl EventPayload {
    /// Short name used in log lines.
    pub fn kind_name(&self) -> &'static str {
        match self {
            EventPayload::Rotate { .. } => "ROTATE_EVENT",
            EventPayload::FormatDescription { .. } => "FORMAT_DESCRIPTION_EVENT",
            EventPayload::Stop => "STOP_EVENT",
            EventPayload::Gtid { .. } => "GTID_LOG_EVENT",
            EventPayload::Query { .. } => "QUERY_EVENT",
            EventPayload::Xid { .. } => "XID_EVENT",
            EventPayload::TableMap { .. } => "TABLE_MAP_EVENT",
            EventPayload::WriteRows(_) => "WRITE_ROWS_EVENT",
            EventPayload::UpdateRows(_) => "UPDATE_ROWS_EVENT",
            EventPayload::DeleteRows(_) => "DELETE_ROWS_EVENT",
            EventPayload::Unknown { .. } => "UNKNOWN_EVENT",
        }
    }

    /// Category the assembler dispatches on.
    ///
    /// Both v1 and v2 row event variants land on the same opcode, so a
    /// version mismatch can never change the operation a row is recorded
    /// with.
    pub fn class(&self) -> EventClass {
        match self {
            EventPayload::Rotate { .. } => EventClass::Rotate,
            EventPayload::FormatDescription { .. } | EventPayload::Stop => EventClass::Ignorable,
            EventPayload::Gtid { .. } => EventClass::TxnStart,
            EventPayload::Query { sql } => {
                if sql.eq_ignore_ascii_case("BEGIN") {
                    EventClass::TxnStart
                } else if sql.eq_ignore_ascii_case("COMMIT") {
                    EventClass::TxnEnd
                } else if sql.eq_ignore_ascii_case("ROLLBACK") {
                    EventClass::Rollback
                } else {
                    EventClass::Unknown
                }
            }
            EventPayload::Xid { .. } => EventClass::TxnEnd,
            EventPayload::TableMap { .. } => EventClass::TableMap,
            EventPayload::WriteRows(_) => EventClass::RowMutation(ChangeOp::Insert),
            EventPayload::UpdateRows(_) => EventClass::RowMutation(ChangeOp::Update),
            EventPayload::DeleteRows(_) => EventClass::RowMutation(ChangeOp::Delete),
            EventPayload::Unknown { .. } => EventClass::Unknown,
        }
    }
}

/// Event category as seen by the transaction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Rotate,
    Ignorable,
    TxnStart,
    TxnEnd,
    Rollback,
    TableMap,
    RowMutation(ChangeOp),
    Unknown,
}

/// Row event wire version. Both carry the same row images at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowsVersion {
    V1,
    V2,
}

/// Rows of one INSERT/UPDATE/DELETE event.
#[derive(Debug, Clone)]
pub struct RowsEvent {
    pub table_id: u64,
    pub version: RowsVersion,
    pub rows: Vec<RowData>,
}

impl RowsEvent {
    pub fn new(table_id: u64, version: RowsVersion, rows: Vec<RowData>) -> Self {
        Self {
            table_id,
            version,
            rows,
        }
    }
}

/// A single row image pair.
#[derive(Debug, Clone, Default)]
pub struct RowData {
    /// Row state before the mutation (UPDATE/DELETE)
    pub before: Option<Vec<ColumnValue>>,
    /// Row state after the mutation (INSERT/UPDATE)
    pub after: Option<Vec<ColumnValue>>,
}

impl RowData {
    pub fn inserted(after: Vec<ColumnValue>) -> Self {
        Self {
            before: None,
            after: Some(after),
        }
    }

    pub fn updated(before: Vec<ColumnValue>, after: Vec<ColumnValue>) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn deleted(before: Vec<ColumnValue>) -> Self {
        Self {
            before: Some(before),
            after: None,
        }
    }
}

/// Decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    SignedInt(i64),
    UnsignedInt(u64),
    Float(f32),
    Double(f64),
    Decimal(String),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(u32),
    Json(serde_json::Value),
}

impl ColumnValue {
    /// Render the value as it appears in key and row projections.
    pub fn render(&self) -> String {
        match self {
            ColumnValue::Null => "null".to_string(),
            ColumnValue::SignedInt(v) => v.to_string(),
            ColumnValue::UnsignedInt(v) => v.to_string(),
            ColumnValue::Float(v) => v.to_string(),
            ColumnValue::Double(v) => v.to_string(),
            ColumnValue::Decimal(v) => v.clone(),
            ColumnValue::String(v) => v.clone(),
            ColumnValue::Bytes(v) => String::from_utf8_lossy(v).into_owned(),
            ColumnValue::Timestamp(v) => v.to_string(),
            ColumnValue::Json(v) => v.to_string(),
        }
    }
}

/// Render a GTID source id as dash-separated hex groups of 4-2-2-2-6 bytes.
///
/// Inputs shorter than 16 bytes truncate the rendering; longer inputs are
/// cut at 16 bytes.
pub fn format_source_id(source_id: &[u8]) -> String {
    const GROUPS: [usize; 5] = [4, 2, 2, 2, 6];
    let mut out = String::with_capacity(36);
    let mut offset = 0usize;
    for (index, len) in GROUPS.iter().enumerate() {
        if index > 0 && offset < source_id.len() {
            out.push('-');
        }
        for byte in source_id.iter().skip(offset).take(*len) {
            out.push_str(&format!("{byte:02x}"));
        }
        offset += len;
    }
    out
}
