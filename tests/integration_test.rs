//! Integration Tests for sheetfeed
//!
//! End-to-end tests for the parse -> map -> create/append pipeline,
//! exercising the public API against real files on disk.

use std::fs;
use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx};
use tempfile::TempDir;

use sheetfeed::{
    AppendFailureKind, ColumnMapping, Direction, IngestorBuilder, MappingDocument, RowPatternKind,
    RowSelector, SpreadsheetWriter, TextRecordParser,
};

// Helper module for reading back generated spreadsheets
mod fixtures {
    use super::*;

    /// Read a single cell from the first worksheet of an xlsx file
    pub fn read_cell(path: &Path, row: u32, col: u32) -> Option<Data> {
        let mut workbook: Xlsx<_> = open_workbook(path).ok()?;
        let sheet = workbook.sheet_names().first()?.to_string();
        let range = workbook.worksheet_range(&sheet).ok()?;
        range.get_value((row, col)).cloned()
    }

    /// Read a column of string values, stopping at the first missing cell
    pub fn read_string_column(path: &Path, col: u32, rows: u32) -> Vec<String> {
        let mut values = Vec::new();
        for row in 0..rows {
            match read_cell(path, row, col) {
                Some(Data::String(s)) => values.push(s),
                Some(Data::Float(f)) => values.push(f.to_string()),
                _ => break,
            }
        }
        values
    }
}

#[test]
fn test_mapping_round_trip_into_fresh_sheet() {
    // Mapping into a fresh sheet and re-reading the written cells must
    // reproduce exactly the mapped values at the expected coordinates.
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("report.txt");
    let target = dir.path().join("out.xlsx");
    fs::write(&input, "alpha  1.5\nbeta  2.5\ngamma  3.5\n").unwrap();

    let ingestor = IngestorBuilder::new().build().unwrap();
    let mappings = vec![
        ColumnMapping::vertical(0, 0, 0),
        ColumnMapping::vertical(1, 0, 3),
    ];
    let result = ingestor.convert_file(&input, &mappings, &target).unwrap();
    assert!(result.success);
    assert_eq!(result.rows_added, 3);
    assert_eq!(result.row_offset, 0);

    assert_eq!(
        fixtures::read_cell(&target, 0, 0),
        Some(Data::String("alpha".to_string()))
    );
    assert_eq!(
        fixtures::read_cell(&target, 2, 0),
        Some(Data::String("gamma".to_string()))
    );
    assert_eq!(fixtures::read_cell(&target, 0, 3), Some(Data::Float(1.5)));
    assert_eq!(fixtures::read_cell(&target, 2, 3), Some(Data::Float(3.5)));
}

#[test]
fn test_appending_sequential_files_lands_contiguously() {
    // Appending three two-row files to an initially empty target yields
    // exactly six rows in file-processing order, each file's block
    // starting at the previous total row count.
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("session.xlsx");
    let ingestor = IngestorBuilder::new().build().unwrap();
    let mappings = vec![ColumnMapping::vertical(0, 0, 0)];

    for (i, rows) in [
        ("file1_row1\nfile1_row2\n", 0u32),
        ("file2_row1\nfile2_row2\n", 2),
        ("file3_row1\nfile3_row2\n", 4),
    ]
    .iter()
    .enumerate()
    {
        let input = dir.path().join(format!("file{}.txt", i + 1));
        fs::write(&input, rows.0).unwrap();

        if i == 0 {
            let result = ingestor.convert_file(&input, &mappings, &target).unwrap();
            assert_eq!(result.row_offset, rows.1);
        } else {
            let result = ingestor.append_file(&input, &mappings, &target);
            assert!(result.success);
            assert_eq!(result.row_offset, rows.1);
            assert_eq!(result.rows_added, 2);
        }
    }

    let values = fixtures::read_string_column(&target, 0, 6);
    assert_eq!(
        values,
        vec![
            "file1_row1",
            "file1_row2",
            "file2_row1",
            "file2_row2",
            "file3_row1",
            "file3_row2"
        ]
    );
    // No seventh row
    assert_eq!(fixtures::read_cell(&target, 6, 0), None);
}

#[test]
fn test_append_offset_after_sparse_sheet() {
    // Offset must be last occupied row index + 1, regardless of blank
    // rows interspersed earlier in the sheet.
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("sparse.xlsx");

    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.write_string(0, 0, "top").unwrap();
    worksheet.write_string(9, 2, "bottom").unwrap();
    workbook.save(&target).unwrap();

    let writer = SpreadsheetWriter::new();
    let table = TextRecordParser::new().parse_str("x\ny\n").unwrap();
    let mappings = vec![ColumnMapping::vertical(0, 0, 0)];
    let result = writer.append(&table, &mappings, &target);

    assert!(result.success);
    assert_eq!(result.row_offset, 10);
    assert_eq!(result.rows_added, 2);
    assert_eq!(
        fixtures::read_cell(&target, 10, 0),
        Some(Data::String("x".to_string()))
    );
    // Pre-existing sparse content is preserved byte-for-byte as values
    assert_eq!(
        fixtures::read_cell(&target, 0, 0),
        Some(Data::String("top".to_string()))
    );
    assert_eq!(
        fixtures::read_cell(&target, 9, 2),
        Some(Data::String("bottom".to_string()))
    );
}

#[test]
fn test_title_never_duplicated_across_appends() {
    // A title written once on sheet creation must never appear a second
    // time after any number of subsequent appends with the same mapping.
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("titled.xlsx");
    let ingestor = IngestorBuilder::new().build().unwrap();
    let mappings = vec![ColumnMapping::vertical(0, 1, 0).with_title("Measured")];

    let input = dir.path().join("r1.txt");
    fs::write(&input, "1.0\n2.0\n").unwrap();
    ingestor.convert_file(&input, &mappings, &target).unwrap();

    for i in 0..3 {
        let input = dir.path().join(format!("r{}.txt", i + 2));
        fs::write(&input, format!("{}.5\n", i + 3)).unwrap();
        let result = ingestor.append_file(&input, &mappings, &target);
        assert!(result.success);
    }

    let mut workbook: Xlsx<_> = open_workbook(&target).unwrap();
    let range = workbook.worksheet_range("Sheet1").unwrap();
    let title_count = range
        .rows()
        .flatten()
        .filter(|cell| matches!(cell, Data::String(s) if s == "Measured"))
        .count();
    assert_eq!(title_count, 1);
}

#[test]
fn test_append_with_title_anchor_leaves_no_gap() {
    // Regression contract: a mapping whose data anchor is row 1 (title
    // at row 0) must append its next block directly at the offset, not
    // at anchor + offset.
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("nogap.xlsx");
    let ingestor = IngestorBuilder::new().build().unwrap();
    let mappings = vec![ColumnMapping::vertical(0, 1, 0).with_title("T")];

    let first = dir.path().join("first.txt");
    fs::write(&first, "a\nb\n").unwrap();
    ingestor.convert_file(&first, &mappings, &target).unwrap();

    let second = dir.path().join("second.txt");
    fs::write(&second, "c\n").unwrap();
    let result = ingestor.append_file(&second, &mappings, &target);
    assert!(result.success);
    // Title row 0 + data rows 1,2 -> next block starts at row 3
    assert_eq!(result.row_offset, 3);

    assert_eq!(
        fixtures::read_cell(&target, 3, 0),
        Some(Data::String("c".to_string()))
    );
    // Row 4 must not exist: no gap row was introduced before the block
    assert_eq!(fixtures::read_cell(&target, 4, 0), None);
}

#[test]
fn test_append_failure_taxonomy_surfaced_not_thrown() {
    let dir = TempDir::new().unwrap();
    let ingestor = IngestorBuilder::new().build().unwrap();
    let mappings = vec![ColumnMapping::vertical(0, 0, 0)];
    let input = dir.path().join("r.txt");
    fs::write(&input, "v\n").unwrap();

    // Non-existent target: classified failure, message names the problem
    let missing = dir.path().join("never_created.xlsx");
    let result = ingestor.append_file(&input, &mappings, &missing);
    assert!(!result.success);
    assert_eq!(result.failure, Some(AppendFailureKind::FileNotFound));
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .contains("does not exist"));

    // Malformed target: classified failure, file left untouched
    let broken = dir.path().join("broken.xlsx");
    fs::write(&broken, "plain text, not a workbook").unwrap();
    let result = ingestor.append_file(&input, &mappings, &broken);
    assert!(!result.success);
    assert_eq!(result.failure, Some(AppendFailureKind::MalformedTarget));
    assert_eq!(
        fs::read(&broken).unwrap(),
        b"plain text, not a workbook".to_vec()
    );
}

#[test]
fn test_mapping_document_drives_conversion() {
    // Load a versioned mapping file from disk and run a conversion
    // with the mappings it defines.
    let dir = TempDir::new().unwrap();
    let mapping_path = dir.path().join("mapping.json");
    fs::write(
        &mapping_path,
        r#"{
            "schemaVersion": "2.0",
            "fileSlots": [{"slot": 1, "description": "inspection export"}],
            "mappings": [
                {"sourceColumn": "A", "targetCell": "B2", "direction": "vertical",
                 "title": "Part"},
                {"sourceColumn": 1, "targetCell": "C2", "direction": "vertical",
                 "rowPattern": {"type": "odd", "start": 0}}
            ]
        }"#,
    )
    .unwrap();

    let document = MappingDocument::load(&mapping_path).unwrap();
    assert_eq!(document.mappings.len(), 2);
    assert_eq!(document.mappings[0].direction, Direction::Vertical);
    assert_eq!(
        document.mappings[1].row_selector,
        RowSelector::Generated {
            kind: RowPatternKind::Odd,
            start: 0
        }
    );

    let input = dir.path().join("report.txt");
    fs::write(&input, "p1  10\np2  20\np3  30\n").unwrap();
    let target = dir.path().join("out.xlsx");

    let ingestor = IngestorBuilder::new().build().unwrap();
    let result = ingestor
        .convert_file(&input, &document.mappings, &target)
        .unwrap();
    assert!(result.success);

    // Title one cell above the B2 anchor
    assert_eq!(
        fixtures::read_cell(&target, 0, 1),
        Some(Data::String("Part".to_string()))
    );
    assert_eq!(
        fixtures::read_cell(&target, 1, 1),
        Some(Data::String("p1".to_string()))
    );
    // Odd pattern selects source rows 0 and 2, written compactly
    assert_eq!(fixtures::read_cell(&target, 1, 2), Some(Data::Float(10.0)));
    assert_eq!(fixtures::read_cell(&target, 2, 2), Some(Data::Float(30.0)));
}

#[test]
fn test_legacy_mapping_file_upgrade_drives_conversion() {
    let dir = TempDir::new().unwrap();
    let mapping_path = dir.path().join("legacy.json");
    fs::write(
        &mapping_path,
        r#"[{"sourceColumn": 0, "startCell": "A1", "direction": "horizontal"}]"#,
    )
    .unwrap();

    let document = MappingDocument::load(&mapping_path).unwrap();
    assert_eq!(document.schema_version, "2.0");
    assert_eq!(document.file_slots.len(), 1);

    let input = dir.path().join("report.txt");
    fs::write(&input, "a  x\nb  y\nc  z\n").unwrap();
    let target = dir.path().join("out.xlsx");

    let ingestor = IngestorBuilder::new().build().unwrap();
    ingestor
        .convert_file(&input, &document.mappings, &target)
        .unwrap();

    // Horizontal: values march to the right along row 0
    assert_eq!(
        fixtures::read_cell(&target, 0, 0),
        Some(Data::String("a".to_string()))
    );
    assert_eq!(
        fixtures::read_cell(&target, 0, 1),
        Some(Data::String("b".to_string()))
    );
    assert_eq!(
        fixtures::read_cell(&target, 0, 2),
        Some(Data::String("c".to_string()))
    );
}

#[test]
fn test_grouped_block_report_end_to_end() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("cmm.txt");
    fs::write(
        &input,
        "Circle_1 (ID: C001)\n  X = 10.001 10.000 0.001\n  Y = 5.502 5.500 0.002\n\
         Line_2 (ID: L002)\n  Length = 24.995 25.000 -0.005\n",
    )
    .unwrap();

    let ingestor = IngestorBuilder::new().build().unwrap();
    // Column 1 is the label, column 2 the first measured value
    let mappings = vec![
        ColumnMapping::vertical(1, 0, 0),
        ColumnMapping::vertical(2, 0, 1),
    ];
    let target = dir.path().join("out.xlsx");
    let result = ingestor.convert_file(&input, &mappings, &target).unwrap();
    assert_eq!(result.rows_added, 3);

    assert_eq!(
        fixtures::read_cell(&target, 0, 0),
        Some(Data::String("X".to_string()))
    );
    assert_eq!(
        fixtures::read_cell(&target, 2, 0),
        Some(Data::String("Length".to_string()))
    );
    assert_eq!(
        fixtures::read_cell(&target, 0, 1),
        Some(Data::Float(10.001))
    );
    assert_eq!(
        fixtures::read_cell(&target, 2, 1),
        Some(Data::Float(24.995))
    );
}
