//! End-to-end transaction assembly scenarios driven through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use sluice_cdc::{
    BinlogEvent, ChangeOp, ColumnInfo, ColumnValue, EventHeader, MemorySink, Result, RowData,
    RowsEvent, RowsVersion, StaticTableInfo, TableInfoProvider, TransactionAssembler,
};

fn header(position: u64) -> EventHeader {
    EventHeader::new(1_705_000_000_000 + position as i64, position)
}

fn orders_provider() -> StaticTableInfo {
    StaticTableInfo::new().with_table(
        "d",
        "t",
        vec![
            ColumnInfo::new("c1", true, 0),
            ColumnInfo::new("c2", false, 1),
        ],
    )
}

fn one_row(table_id: u64, c1: i64, c2: &str) -> RowsEvent {
    RowsEvent::new(
        table_id,
        RowsVersion::V2,
        vec![RowData::inserted(vec![
            ColumnValue::SignedInt(c1),
            ColumnValue::String(c2.to_string()),
        ])],
    )
}

#[tokio::test]
async fn commit_emits_one_batch_with_key_and_row_projections() {
    let sink = MemorySink::new();
    let mut assembler = TransactionAssembler::new(sink.clone(), orders_provider());

    let source_id: Vec<u8> = (1..=16).collect();
    assembler
        .on_event(BinlogEvent::format_description("a", header(4)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::rotate("b", header(8)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::gtid(source_id, 42, header(100)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::table_map(7, "d", "t", header(120)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::write_rows(one_row(7, 1, "x"), header(140)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::xid(99, header(160)))
        .await
        .unwrap();

    let batches = sink.batches().await;
    assert_eq!(batches.len(), 1);

    let batch = &batches[0];
    assert_eq!(batch.partition, 0);
    assert_eq!(batch.records.len(), 1);
    assert_eq!(
        batch.checkpoint,
        "01020304-0506-0708-090a-0b0c0d0e0f10:42:b:160"
    );

    let record = &batch.records[0];
    assert_eq!(record.op, ChangeOp::Insert);
    assert_eq!(record.gtid, "01020304-0506-0708-090a-0b0c0d0e0f10:42");
    assert_eq!(record.database, "d");
    assert_eq!(record.table, "t");
    assert_eq!(record.key, json!({"c1": "1"}));
    assert_eq!(record.value, json!({"c1": "1", "c2": "x"}));
}

#[tokio::test]
async fn rollback_discards_records_and_keeps_the_current_file() {
    let sink = MemorySink::new();
    let mut assembler = TransactionAssembler::new(sink.clone(), orders_provider());

    assembler
        .on_event(BinlogEvent::format_description("a", header(4)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::rotate("b", header(8)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::gtid(vec![1u8; 16], 42, header(100)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::table_map(7, "d", "t", header(120)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::write_rows(one_row(7, 1, "x"), header(140)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::query("ROLLBACK", header(160)))
        .await
        .unwrap();

    assert_eq!(sink.batch_count().await, 0);
    assert!(!assembler.in_transaction());
    assert_eq!(assembler.current_file(), "b");
}

#[tokio::test]
async fn all_rows_of_a_transaction_land_in_one_batch_in_order() {
    let sink = MemorySink::new();
    let provider = orders_provider().with_table(
        "d",
        "audit",
        vec![ColumnInfo::new("seq", true, 0)],
    );
    let mut assembler = TransactionAssembler::new(sink.clone(), provider);

    assembler
        .on_event(BinlogEvent::gtid(vec![2u8; 16], 5, header(100)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::table_map(1, "d", "t", header(110)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::table_map(2, "d", "audit", header(120)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::write_rows(one_row(1, 1, "first"), header(130)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::write_rows(
            RowsEvent::new(
                2,
                RowsVersion::V1,
                vec![RowData::inserted(vec![ColumnValue::SignedInt(10)])],
            ),
            header(140),
        ))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::write_rows(one_row(1, 2, "second"), header(150)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::query("COMMIT", header(160)))
        .await
        .unwrap();

    let batches = sink.batches().await;
    assert_eq!(batches.len(), 1);

    // binlog order preserved across tables
    let tables: Vec<&str> = batches[0]
        .records
        .iter()
        .map(|r| r.table.as_str())
        .collect();
    assert_eq!(tables, vec!["t", "audit", "t"]);
    assert_eq!(batches[0].records[0].value["c2"], "first");
    assert_eq!(batches[0].records[2].value["c2"], "second");
}

#[tokio::test]
async fn transactions_are_emitted_in_commit_order() {
    let sink = MemorySink::new();
    let mut assembler = TransactionAssembler::new(sink.clone(), orders_provider());

    assembler
        .on_event(BinlogEvent::format_description("binlog.000001", header(4)))
        .await
        .unwrap();

    for (sequence, base) in [(1u64, 100u64), (2, 200)] {
        assembler
            .on_event(BinlogEvent::gtid(vec![3u8; 16], sequence, header(base)))
            .await
            .unwrap();
        assembler
            .on_event(BinlogEvent::table_map(7, "d", "t", header(base + 10)))
            .await
            .unwrap();
        assembler
            .on_event(BinlogEvent::write_rows(
                one_row(7, sequence as i64, "x"),
                header(base + 20),
            ))
            .await
            .unwrap();
        assembler
            .on_event(BinlogEvent::xid(sequence, header(base + 30)))
            .await
            .unwrap();
    }

    let batches = sink.batches().await;
    assert_eq!(batches.len(), 2);
    assert!(batches[0].checkpoint.ends_with(":binlog.000001:130"));
    assert!(batches[1].checkpoint.ends_with(":binlog.000001:230"));
}

#[tokio::test]
async fn table_map_bindings_do_not_leak_across_transactions() {
    let sink = MemorySink::new();
    let mut assembler = TransactionAssembler::new(sink.clone(), orders_provider());

    assembler
        .on_event(BinlogEvent::gtid(vec![4u8; 16], 1, header(100)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::table_map(7, "d", "t", header(110)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::xid(1, header(120)))
        .await
        .unwrap();

    // same table id in the next transaction without a fresh table map
    assembler
        .on_event(BinlogEvent::gtid(vec![4u8; 16], 2, header(200)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::write_rows(one_row(7, 1, "x"), header(210)))
        .await
        .unwrap();
    assembler
        .on_event(BinlogEvent::xid(2, header(220)))
        .await
        .unwrap();

    // the row was skipped, so nothing was emitted
    assert_eq!(sink.batch_count().await, 0);
    assert_eq!(assembler.stats().rows_skipped(), 1);
}

/// Provider wrapper that counts lookups, for asserting read-through caching.
#[derive(Clone)]
struct CountingProvider {
    inner: StaticTableInfo,
    calls: Arc<AtomicUsize>,
}

impl TableInfoProvider for CountingProvider {
    fn column_list(&self, database: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.column_list(database, table)
    }
}

#[tokio::test]
async fn column_metadata_is_fetched_once_per_table() {
    let sink = MemorySink::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = CountingProvider {
        inner: orders_provider(),
        calls: calls.clone(),
    };
    let mut assembler = TransactionAssembler::new(sink.clone(), provider);

    for sequence in 1..=3u64 {
        let base = sequence * 100;
        assembler
            .on_event(BinlogEvent::gtid(vec![5u8; 16], sequence, header(base)))
            .await
            .unwrap();
        assembler
            .on_event(BinlogEvent::table_map(7, "d", "t", header(base + 10)))
            .await
            .unwrap();
        assembler
            .on_event(BinlogEvent::write_rows(
                one_row(7, sequence as i64, "x"),
                header(base + 20),
            ))
            .await
            .unwrap();
        assembler
            .on_event(BinlogEvent::xid(sequence, header(base + 30)))
            .await
            .unwrap();
    }

    assert_eq!(sink.batch_count().await, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
