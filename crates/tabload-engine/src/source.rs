//! Delimited-text source reader
//!
//! Reads a file as bytes, picks the first encoding that decodes cleanly,
//! detects the delimiter from the first line and hands the records after the
//! configured header line to the coercion pipeline as a [`RawTable`].

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::dataset::RawTable;
use crate::error::{EngineError, Result};

/// Delimiters considered by auto-detection, in tie-break order
pub const CANDIDATE_DELIMITERS: [u8; 4] = [b';', b',', b'\t', b'|'];

/// Used when none of the candidates appears on the first line
pub const DEFAULT_DELIMITER: u8 = b';';

/// Text encodings tried in order until one decodes without errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Latin1,
    Iso8859_1,
    Cp1252,
}

impl SourceEncoding {
    pub const FALLBACK_ORDER: [SourceEncoding; 4] = [
        SourceEncoding::Utf8,
        SourceEncoding::Latin1,
        SourceEncoding::Iso8859_1,
        SourceEncoding::Cp1252,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Latin1 => "latin-1",
            SourceEncoding::Iso8859_1 => "iso-8859-1",
            SourceEncoding::Cp1252 => "cp1252",
        }
    }

    /// Decode strictly; `None` on the first invalid byte sequence
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            SourceEncoding::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(bytes).ok().map(str::to_owned)
            }
            // Every byte maps to the code point with the same value
            SourceEncoding::Latin1 | SourceEncoding::Iso8859_1 => {
                Some(bytes.iter().map(|&b| char::from(b)).collect())
            }
            SourceEncoding::Cp1252 => encoding_rs::WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
        }
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How to read a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    /// 1-based line holding the header
    pub header_row: usize,
    /// Fixed delimiter; detected from the first line when `None`
    pub delimiter: Option<u8>,
    pub encodings: Vec<SourceEncoding>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            header_row: 1,
            delimiter: None,
            encodings: SourceEncoding::FALLBACK_ORDER.to_vec(),
        }
    }
}

/// A decoded and split source file
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub encoding: SourceEncoding,
    pub delimiter: u8,
    pub table: RawTable,
    /// 1-based line numbers of records dropped for having the wrong width
    pub skipped_lines: Vec<u64>,
}

/// Pick the candidate that occurs most often on `first_line`
pub fn detect_delimiter(first_line: &str) -> u8 {
    let mut best = DEFAULT_DELIMITER;
    let mut best_count = 0;
    for candidate in CANDIDATE_DELIMITERS {
        let count = first_line.bytes().filter(|&b| b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Printable name for a delimiter byte, for logs
pub fn delimiter_name(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        other => char::from(other).to_string(),
    }
}

/// Try each encoding in turn
pub fn decode_with_fallback(
    bytes: &[u8],
    encodings: &[SourceEncoding],
) -> Option<(String, SourceEncoding)> {
    encodings
        .iter()
        .find_map(|&encoding| encoding.decode(bytes).map(|text| (text, encoding)))
}

/// Split decoded text into a header and data records.
///
/// Records shorter than the header are padded with empty cells, which
/// coercion turns into nulls. Returns the table and the 1-based lines of
/// records that had more fields than the header and were dropped.
pub fn parse_records(
    text: &str,
    delimiter: u8,
    header_row: usize,
) -> std::result::Result<(RawTable, Vec<u64>), String> {
    if header_row == 0 {
        return Err("header row is 1-based; 0 is not a valid line".to_string());
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    let mut skipped = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        let line = record.position().map(|p| p.line()).unwrap_or(index as u64 + 1);

        let Some(expected) = header.as_ref().map(Vec::len) else {
            if index + 1 == header_row {
                header = Some(record.iter().map(|cell| cell.trim().to_string()).collect());
            }
            continue;
        };

        if record.len() > expected {
            warn!(line, found = record.len(), expected, "Skipping malformed record");
            skipped.push(line);
            continue;
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(expected, String::new());
        rows.push(row);
    }

    let header = header.ok_or_else(|| format!("no header found at line {}", header_row))?;
    Ok((RawTable::new(header, rows), skipped))
}

/// Read and split a delimited file
pub fn read_source(path: impl AsRef<Path>, options: &SourceOptions) -> Result<SourceFile> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| EngineError::source_file(path, e))?;

    let (text, encoding) = decode_with_fallback(&bytes, &options.encodings).ok_or_else(|| {
        EngineError::source_file(path, "none of the configured encodings could decode the file")
    })?;

    let delimiter = options
        .delimiter
        .unwrap_or_else(|| detect_delimiter(text.lines().next().unwrap_or_default()));

    let (table, skipped_lines) = parse_records(&text, delimiter, options.header_row)
        .map_err(|reason| EngineError::source_file(path, reason))?;

    debug!(
        path = %path.display(),
        encoding = encoding.label(),
        delimiter = %delimiter_name(delimiter),
        rows = table.len(),
        "Source read"
    );

    Ok(SourceFile {
        path: path.to_path_buf(),
        encoding,
        delimiter,
        table,
        skipped_lines,
    })
}

/// Target table for a file in folder mode: the stem up to the first `_` or `.`, lower-cased
pub fn table_name_for_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.split(&['_', '.'][..]).next()?.trim();
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_lowercase())
    }
}

/// Every `*.csv` file directly inside `dir`, sorted by name
pub fn list_source_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::source_file(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| EngineError::source_file(dir, e))?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c"), b';');
        assert_eq!(detect_delimiter("a,b,c;d"), b',');
        assert_eq!(detect_delimiter("a\tb\tc"), b'\t');
        assert_eq!(detect_delimiter("a|b"), b'|');
        assert_eq!(detect_delimiter("single"), DEFAULT_DELIMITER);
        assert_eq!(detect_delimiter(""), DEFAULT_DELIMITER);
        // ties go to the earlier candidate
        assert_eq!(detect_delimiter("a,b;c"), b';');
    }

    #[test]
    fn test_encoding_fallback() {
        let utf8 = "mês;valor".as_bytes();
        let (text, encoding) = decode_with_fallback(utf8, &SourceEncoding::FALLBACK_ORDER).unwrap();
        assert_eq!(encoding, SourceEncoding::Utf8);
        assert_eq!(text, "mês;valor");

        // "mês" in latin-1: 0xEA is not valid UTF-8 on its own
        let latin1 = b"m\xEAs;valor";
        let (text, encoding) =
            decode_with_fallback(latin1, &SourceEncoding::FALLBACK_ORDER).unwrap();
        assert_eq!(encoding, SourceEncoding::Latin1);
        assert_eq!(text, "mês;valor");
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let text = SourceEncoding::Utf8.decode(b"\xEF\xBB\xBFa;b").unwrap();
        assert_eq!(text, "a;b");
    }

    #[test]
    fn test_cp1252_alone() {
        let text = decode_with_fallback(b"\x80 5", &[SourceEncoding::Cp1252])
            .unwrap()
            .0;
        assert_eq!(text, "€ 5");
        assert!(decode_with_fallback(b"\xFF", &[SourceEncoding::Utf8]).is_none());
    }

    #[test]
    fn test_parse_records_header_row_and_bad_lines() {
        let text = "report title\nmesref;tipo;valor\n2025-01;util;10\ntoo;many;fields;here\n2025-02;sab;20\n";
        let (table, skipped) = parse_records(text, b';', 2).unwrap();

        assert_eq!(table.width(), 3);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1], vec!["2025-02", "sab", "20"]);
        assert_eq!(skipped, vec![4]);
    }

    #[test]
    fn test_parse_records_pads_short_lines() {
        let (table, skipped) = parse_records("a;b;c\n1;2\n3;4;5\n6;7;8;9\n", b';', 1).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], vec!["1", "2", ""]);
        assert_eq!(table.rows[1], vec!["3", "4", "5"]);
        assert_eq!(skipped, vec![4]);
    }

    #[test]
    fn test_parse_records_missing_header() {
        assert!(parse_records("a;b\n", b';', 5).is_err());
        assert!(parse_records("a;b\n", b';', 0).is_err());
    }

    #[test]
    fn test_read_source_detects_everything() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"dia,hora1\n01/02/2025,04:30\n").unwrap();

        let source = read_source(file.path(), &SourceOptions::default()).unwrap();
        assert_eq!(source.delimiter, b',');
        assert_eq!(source.encoding, SourceEncoding::Utf8);
        assert_eq!(source.table.rows, vec![vec!["01/02/2025", "04:30"]]);
        assert!(source.skipped_lines.is_empty());
    }

    #[test]
    fn test_read_source_missing_file() {
        let err = read_source("/definitely/not/here.csv", &SourceOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::Source { .. }));
    }

    #[test]
    fn test_table_name_for_path() {
        assert_eq!(
            table_name_for_path(Path::new("/data/TAB01_2025.csv")).as_deref(),
            Some("tab01")
        );
        assert_eq!(table_name_for_path(Path::new("tab03.csv")).as_deref(), Some("tab03"));
        assert_eq!(table_name_for_path(Path::new("_x.csv")), None);
    }

    #[test]
    fn test_list_source_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["tab02_a.CSV", "tab01_b.csv", "notes.txt"] {
            std::fs::write(dir.path().join(name), "a;b\n").unwrap();
        }

        let files = list_source_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["tab01_b.csv", "tab02_a.CSV"]);
    }
}
