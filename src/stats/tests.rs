use super::*;
use crate::store::IndexFamily;
use chrono::TimeZone;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn sample(usage: u64, cache: Option<f64>) -> ResourceSample {
    let mut submetrics = BTreeMap::new();
    if let Some(cache) = cache {
        submetrics.insert("cache".to_string(), cache);
    }
    ResourceSample {
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("should be a valid timestamp"),
        memory_usage: Some(usage),
        memory_limit: Some(1_000_000),
        submetrics,
    }
}

fn record(
    family: IndexFamily,
    search_time: f64,
    target_rank: Option<usize>,
    samples: Vec<ResourceSample>,
) -> MeasurementRecord {
    MeasurementRecord {
        index: IndexConfiguration::new(family),
        num_of_rows: Some(120),
        search_time,
        target_rank,
        keyword: "how do I reset".to_string(),
        target: target_rank.map(|_| RecallTarget::new("manual.pdf", 4)),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("should be a valid timestamp"),
        samples,
    }
}

#[test]
fn window_file_names() {
    assert_eq!(Window::Before.file_name(None), "before_search.csv");
    assert_eq!(
        Window::During.file_name(Some("finance")),
        "during_search_finance.csv"
    );
    assert_eq!(Window::After.stem(), "after_search");
}

#[test]
fn rows_follow_stable_column_order() {
    let record = record(
        IndexFamily::Hnsw,
        0.25,
        Some(3),
        vec![sample(500, Some(12.0))],
    );
    let rows = record.rows();
    assert_eq!(rows.len(), 1);

    let columns: Vec<&str> = rows[0].iter().map(|(column, _)| column.as_str()).collect();
    assert_eq!(
        columns,
        vec![
            "index_type",
            "hnsw_m",
            "hnsw_ef_construction",
            "hnsw_ef_search",
            "ivfflat_lists",
            "ivfflat_probes",
            "search_time",
            "target_rank",
            "num_of_rows",
            "keyword",
            "filepath",
            "page",
            "timestamp",
            "sampled_at",
            "usage",
            "limit",
            "cache",
        ]
    );
    assert_eq!(rows[0][0].1, "hnsw");
    assert_eq!(rows[0][7].1, "3");
    assert_eq!(rows[0][10].1, "manual.pdf");
    assert_eq!(rows[0][11].1, "4");
    assert_eq!(rows[0][12].1, "2024-05-01T12:00:00.000Z");
}

#[test]
fn record_without_samples_keeps_one_row() {
    let rows = record(IndexFamily::None, 0.1, None, Vec::new()).rows();

    assert_eq!(rows.len(), 1);
    let cells: BTreeMap<&str, &str> = rows[0]
        .iter()
        .map(|(column, value)| (column.as_str(), value.as_str()))
        .collect();
    assert_eq!(cells["target_rank"], "");
    assert_eq!(cells["filepath"], "");
    assert_eq!(cells["usage"], "");
    assert_eq!(cells["search_time"], "0.1");
}

#[test]
fn push_row_pads_new_columns() {
    let mut table = CsvTable::with_headers(["a", "b"]);
    table.push_row(&[
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "2".to_string()),
    ]);
    table.push_row(&[
        ("a".to_string(), "3".to_string()),
        ("c".to_string(), "4".to_string()),
    ]);

    assert_eq!(table.headers, vec!["a", "b", "c"]);
    assert_eq!(table.rows[0], vec!["1", "2", ""]);
    assert_eq!(table.rows[1], vec!["3", "", "4"]);
}

#[test]
fn reader_strips_byte_order_mark() {
    let input = "\u{feff}index_type,search_time\nhnsw,0.5\n";
    let table = CsvTable::from_reader(input.as_bytes()).expect("table should parse");

    assert_eq!(table.column("index_type"), Some(0));
    assert_eq!(table.get(0, "search_time"), Some("0.5"));
}

#[test]
fn appending_never_drops_columns() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("nested").join("during_search.csv");

    let first = record(IndexFamily::Hnsw, 0.2, Some(1), vec![sample(100, Some(1.0))]);
    let second = record(IndexFamily::Hnsw, 0.4, None, vec![sample(300, None)]);

    assert_eq!(writer::append_record(&path, &first).expect("append should succeed"), 1);
    assert_eq!(writer::append_record(&path, &second).expect("append should succeed"), 2);

    let table = CsvTable::read(&path)
        .expect("read should succeed")
        .expect("file should exist");
    assert!(table.column("cache").is_some());
    assert_eq!(table.get(0, "cache"), Some("1"));
    assert_eq!(table.get(1, "cache"), Some(""));
    assert_eq!(table.get(1, "usage"), Some("300"));
}

#[test]
fn wide_rows_keep_their_extra_cells() {
    let mut table = CsvTable::from_reader("a,b\n1,2,3\n".as_bytes()).expect("table should parse");
    assert_eq!(table.headers, vec!["a", "b", "column_3"]);

    table.push_row(&[("a".to_string(), "x".to_string())]);
    assert_eq!(table.rows, vec![vec!["1", "2", "3"], vec!["x", "", ""]]);

    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("during_search.csv");
    std::fs::write(&path, "a,column_3\n1,2,3,4\n").expect("should write csv");

    let rows = CsvTable::append_to_file(&path, &[vec![("a".to_string(), "5".to_string())]])
        .expect("append should succeed");
    assert_eq!(rows, 2);

    let table = CsvTable::read(&path)
        .expect("read should succeed")
        .expect("file should exist");
    assert_eq!(table.headers, vec!["a", "column_3", "column_3_", "column_4"]);
    assert_eq!(table.rows[0], vec!["1", "2", "3", "4"]);
    assert_eq!(table.get(1, "a"), Some("5"));
}

#[test]
fn missing_file_reads_as_none() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = CsvTable::read(&temp_dir.path().join("absent.csv")).expect("read should succeed");
    assert!(result.is_none());
    assert!(aggregate_file(&temp_dir.path().join("absent.csv")).is_err());
}

#[test]
fn aggregation_groups_by_configuration() {
    let records = vec![
        record(
            IndexFamily::Hnsw,
            0.1,
            Some(2),
            vec![sample(100, None), sample(300, None)],
        ),
        record(IndexFamily::Hnsw, 0.3, None, vec![sample(500, None)]),
        record(IndexFamily::Ivfflat, 0.123_456, Some(4), Vec::new()),
    ];

    let stats = aggregate_records(&records);
    assert_eq!(stats.len(), 2);

    let hnsw = stats
        .iter()
        .find(|stat| stat.key.index_type() == "hnsw")
        .expect("hnsw group should exist");
    assert_eq!(hnsw.count, 3);
    assert_eq!(hnsw.mean_search_time, Some(round_to((0.1 + 0.1 + 0.3) / 3.0, 4)));
    assert_eq!(hnsw.mean_target_rank, Some(2.0));
    assert_eq!(hnsw.mean_usage, Some(300.0));
    assert_eq!(hnsw.first_usage.as_deref(), Some("100"));
    assert_eq!(hnsw.first_num_of_rows.as_deref(), Some("120"));

    let ivfflat = stats
        .iter()
        .find(|stat| stat.key.index_type() == "ivfflat")
        .expect("ivfflat group should exist");
    assert_eq!(ivfflat.count, 1);
    assert_eq!(ivfflat.mean_search_time, Some(0.1235));
    assert_eq!(ivfflat.mean_usage, None);
}

#[test]
fn appended_then_aggregated_matches_direct_aggregation() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("after_search.csv");

    let records = vec![
        record(IndexFamily::None, 0.0412, Some(1), vec![sample(10, Some(2.5))]),
        record(IndexFamily::Hnsw, 0.0021, Some(101), vec![sample(20, None)]),
        record(IndexFamily::Hnsw, 0.0033, None, Vec::new()),
        record(
            IndexFamily::Ivfflat,
            0.0107,
            Some(7),
            vec![sample(40, Some(1.0)), sample(60, Some(3.0))],
        ),
    ];

    for record in &records {
        writer::append_record(&path, record).expect("append should succeed");
    }

    let from_file = aggregate_file(&path).expect("aggregation should succeed");
    assert_eq!(from_file, aggregate_records(&records));

    let again = aggregate_file(&path).expect("aggregation should succeed");
    assert_eq!(from_file, again);
}

#[test]
fn summaries_are_written_beside_input() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("during_search_finance.csv");

    for (family, time) in [
        (IndexFamily::Hnsw, 0.2),
        (IndexFamily::Hnsw, 0.4),
        (IndexFamily::None, 1.0),
    ] {
        writer::append_record(&path, &record(family, time, Some(5), vec![sample(64, None)]))
            .expect("append should succeed");
    }
    let original = std::fs::read_to_string(&path).expect("input should be readable");

    let (per_row, summary) = write_summaries(&path).expect("summaries should be written");
    assert_eq!(
        per_row.file_name().and_then(|n| n.to_str()),
        Some("during_search_finance_with_averages.csv")
    );
    assert_eq!(
        summary.file_name().and_then(|n| n.to_str()),
        Some("during_search_finance_with_averages_one.csv")
    );

    let per_row = CsvTable::read(&per_row)
        .expect("read should succeed")
        .expect("file should exist");
    assert_eq!(per_row.rows.len(), 3);
    assert_eq!(per_row.get(0, "avg_search_time"), Some("0.3"));
    assert_eq!(per_row.get(2, "avg_search_time"), Some("1"));

    let summary = CsvTable::read(&summary)
        .expect("read should succeed")
        .expect("file should exist");
    assert_eq!(summary.rows.len(), 2);
    assert_eq!(summary.get(0, "index_type"), Some("hnsw"));
    assert_eq!(summary.get(0, "count"), Some("2"));
    assert_eq!(summary.get(0, "avg_target_rank"), Some("5"));
    assert_eq!(summary.get(1, "index_type"), Some("none"));

    assert_eq!(
        std::fs::read_to_string(&path).expect("input should be readable"),
        original
    );
}

#[tokio::test]
async fn writer_appends_each_window() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let writer = MeasurementWriter::new(temp_dir.path());

    let base = record(IndexFamily::Ivfflat, 0.05, Some(1), vec![sample(1, None)]);
    let records = Window::ALL
        .iter()
        .map(|window| (*window, base.clone()))
        .collect();
    writer
        .append_windows(records, Some("legal"))
        .await
        .expect("append should succeed");

    for window in Window::ALL {
        assert!(temp_dir.path().join(window.file_name(Some("legal"))).exists());
    }
}

#[tokio::test]
async fn concurrent_appends_keep_every_row() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let writer = MeasurementWriter::new(temp_dir.path());

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8_u64 {
        let writer = writer.clone();
        tasks.spawn(async move {
            let record = record(IndexFamily::None, 0.01, None, vec![sample(i, None)]);
            writer.append("before_search.csv", record).await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("task should join").expect("append should succeed");
    }

    let table = CsvTable::read(&temp_dir.path().join("before_search.csv"))
        .expect("read should succeed")
        .expect("file should exist");
    assert_eq!(table.rows.len(), 8);
}
