mod common;

use chat_digest::chunker::{ChunkPlan, InputFormatError, read_dataset, split_file, write_chunks};
use common::{HEADER, chat_row, write_chat_csv};

#[test]
fn plan_covers_rows_exactly_once() {
    for (rows, bound) in [(0, 10), (1, 10), (10, 10), (11, 10), (2500, 1000), (7, 3), (5, 1)] {
        let plan = ChunkPlan::with_bound(rows, bound);
        assert_eq!(plan.total(), rows.div_ceil(bound), "rows={rows} bound={bound}");

        let mut next = 1;
        for (i, r) in plan.chunks.iter().enumerate() {
            assert_eq!(r.index, i + 1);
            assert_eq!(r.start_row, next);
            assert!(r.len() >= 1 && r.len() <= bound);
            next = r.end_row + 1;
        }
        assert_eq!(next, rows + 1);
    }
}

#[test]
fn splits_2500_rows_into_three_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("log.csv");
    write_chat_csv(&input, 2500);

    let dataset = read_dataset(&input, b',').unwrap();
    assert_eq!(dataset.row_count(), 2500);

    let plan = ChunkPlan::with_bound(dataset.row_count(), 1000);
    let chunks = write_chunks(&dataset, &plan, &dir.path().join("chunks"), b',').unwrap();

    assert_eq!(chunks.len(), 3);
    assert_eq!(
        chunks.iter().map(|c| c.rows).collect::<Vec<_>>(),
        vec![1000, 1000, 500]
    );

    let mut rows = Vec::new();
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.index, i + 1);
        assert_eq!(c.total, 3);
        assert_eq!(
            c.path.file_name().unwrap().to_str().unwrap(),
            format!("chunk_{}_of_3.csv", i + 1)
        );

        let back = read_dataset(&c.path, b',').unwrap();
        assert_eq!(back.header, dataset.header);
        assert_eq!(back.row_count(), c.rows);
        rows.extend(back.rows);
    }
    assert_eq!(rows, dataset.rows);
    assert_eq!(rows[2499].iter().collect::<Vec<_>>(), chat_row(2499));
}

#[test]
fn exact_multiple_has_no_trailing_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("log.csv");
    write_chat_csv(&input, 2000);

    let dataset = read_dataset(&input, b',').unwrap();
    let plan = ChunkPlan::with_bound(dataset.row_count(), 1000);
    let chunks = write_chunks(&dataset, &plan, dir.path(), b',').unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.rows == 1000 && c.total == 2));
}

#[test]
fn header_only_input_yields_no_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("log.csv");
    write_chat_csv(&input, 0);

    let dataset = read_dataset(&input, b',').unwrap();
    assert_eq!(dataset.header.iter().collect::<Vec<_>>(), HEADER);
    let plan = ChunkPlan::with_bound(dataset.row_count(), 1000);
    assert!(write_chunks(&dataset, &plan, dir.path(), b',').unwrap().is_empty());
}

#[test]
fn empty_file_has_no_header() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.csv");
    std::fs::write(&input, "").unwrap();

    let err = read_dataset(&input, b',').unwrap_err();
    assert!(matches!(err, InputFormatError::MissingHeader { .. }));
}

#[test]
fn missing_file_is_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_dataset(&dir.path().join("nope.csv"), b',').unwrap_err();
    assert!(matches!(err, InputFormatError::Unreadable { .. }));
}

#[test]
fn invalid_utf8_is_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("latin1.csv");
    std::fs::write(&input, b"author,content\nbob,caf\xe9\n").unwrap();

    let err = read_dataset(&input, b',').unwrap_err();
    assert!(matches!(err, InputFormatError::Unreadable { .. }));
}

#[test]
fn quoted_fields_survive_chunking() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("log.csv");
    std::fs::write(
        &input,
        "author,content\nann,\"hi, all\"\nbob,\"line one\nline two\"\ncid,\"say \"\"gg\"\"\"\n",
    )
    .unwrap();

    let dataset = read_dataset(&input, b',').unwrap();
    assert_eq!(dataset.row_count(), 3);

    let plan = ChunkPlan::with_bound(3, 2);
    let chunks = write_chunks(&dataset, &plan, &dir.path().join("chunks"), b',').unwrap();
    let second = read_dataset(&chunks[0].path, b',').unwrap();
    assert_eq!(&second.rows[1][1], "line one\nline two");
    let last = read_dataset(&chunks[1].path, b',').unwrap();
    assert_eq!(&last.rows[0][1], "say \"gg\"");
}

#[test]
fn tab_delimited_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("log.tsv");
    std::fs::write(&input, "author\tcontent\nann\thello, world\nbob\tbye\n").unwrap();

    let dataset = read_dataset(&input, b'\t').unwrap();
    assert_eq!(dataset.header.len(), 2);
    let plan = ChunkPlan::with_bound(dataset.row_count(), 1);
    let chunks = write_chunks(&dataset, &plan, dir.path(), b'\t').unwrap();
    let raw = std::fs::read_to_string(&chunks[0].path).unwrap();
    assert!(raw.starts_with("author\tcontent"));

    let back = read_dataset(&chunks[0].path, b'\t').unwrap();
    assert_eq!(back.rows, dataset.rows[..1]);
}

#[test]
fn split_file_matches_the_pipeline_split() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("log.csv");
    common::write_chat_csv(&input, 25);

    let mut cfg = common::test_config();
    cfg.input.max_rows_per_chunk = 10;

    let (plan, chunks) = split_file(&cfg, &input, &dir.path().join("cli")).unwrap();
    assert_eq!(plan.row_count, 25);
    assert_eq!(plan.total(), 3);

    let pipeline = chat_digest::pipeline::Pipeline::new(&cfg, common::ScriptedInferencer::sequence(vec![]));
    let from_pipeline = pipeline.split_input(&input, &dir.path().join("pipeline")).unwrap();

    let shape = |c: &[chat_digest::chunker::ChunkRef]| {
        c.iter().map(|c| (c.index, c.total, c.rows)).collect::<Vec<_>>()
    };
    assert_eq!(shape(&chunks), shape(&from_pipeline));
    assert_eq!(shape(&chunks), vec![(1, 3, 10), (2, 3, 10), (3, 3, 5)]);
}
