use crate::error::{Result, TableError};
use crate::table::Table;
use csv::{ReaderBuilder, WriterBuilder};
use encoding_rs::{Encoding, UTF_8};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const DETECT_SAMPLE_BYTES: usize = 64 * 1024;
const DETECT_SAMPLE_LINES: usize = 20;
const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

#[derive(Clone, Debug, PartialEq)]
pub struct ParseSettings {
    pub delimiter: u8,
    pub quote: u8,
    pub has_headers: bool,
    pub encoding: &'static Encoding,
}

#[derive(Clone, Debug, Default)]
pub struct ParseOverrides {
    pub delimiter: Option<u8>,
    pub quote: Option<u8>,
    pub has_headers: Option<bool>,
    pub encoding: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ParseInfo {
    pub delimiter: String,
    pub quote: String,
    pub has_headers: bool,
    pub encoding: String,
}

pub fn default_parse_settings() -> ParseSettings {
    ParseSettings {
        delimiter: b',',
        quote: b'"',
        has_headers: true,
        encoding: UTF_8,
    }
}

/// Guess encoding and delimiter from the head of the file.
pub fn detect_parse_settings(bytes: &[u8]) -> ParseSettings {
    let sample = &bytes[..bytes.len().min(DETECT_SAMPLE_BYTES)];
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(sample, sample.len() == bytes.len());
    let encoding = detector.guess(None, true);

    let (text, _, _) = encoding.decode(sample);
    let defaults = default_parse_settings();
    let delimiter = sniff_delimiter(&text, defaults.quote).unwrap_or(defaults.delimiter);

    ParseSettings {
        delimiter,
        encoding,
        ..defaults
    }
}

fn count_outside_quotes(line: &str, delimiter: u8, quote: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for byte in line.bytes() {
        if byte == quote {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

fn sniff_delimiter(text: &str, quote: u8) -> Option<u8> {
    let mut lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(DETECT_SAMPLE_LINES + 1)
        .collect();
    // The last sampled line may be cut off by the sample boundary.
    if lines.len() > DETECT_SAMPLE_LINES {
        lines.pop();
    }
    let first = lines.first()?;

    let mut best: Option<(u8, usize)> = None;
    for &candidate in &DELIMITER_CANDIDATES {
        let count = count_outside_quotes(first, candidate, quote);
        if count == 0 {
            continue;
        }
        let consistent = lines
            .iter()
            .all(|line| count_outside_quotes(line, candidate, quote) == count);
        if !consistent {
            continue;
        }
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((candidate, count));
        }
    }

    best.map(|(delimiter, _)| delimiter).or_else(|| {
        // Nothing consistent; settle for the most frequent candidate on the header line.
        DELIMITER_CANDIDATES
            .iter()
            .map(|&candidate| (candidate, count_outside_quotes(first, candidate, quote)))
            .filter(|(_, count)| *count > 0)
            .max_by_key(|(_, count)| *count)
            .map(|(delimiter, _)| delimiter)
    })
}

pub fn apply_parse_overrides(
    detected: &ParseSettings,
    overrides: Option<ParseOverrides>,
) -> Result<ParseSettings> {
    let mut settings = detected.clone();
    let Some(overrides) = overrides else {
        return Ok(settings);
    };
    if let Some(delimiter) = overrides.delimiter {
        settings.delimiter = delimiter;
    }
    if let Some(quote) = overrides.quote {
        settings.quote = quote;
    }
    if let Some(has_headers) = overrides.has_headers {
        settings.has_headers = has_headers;
    }
    if let Some(label) = overrides.encoding {
        settings.encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or(TableError::UnknownEncoding(label))?;
    }
    Ok(settings)
}

fn printable_byte(byte: u8) -> String {
    match byte {
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}

pub fn parse_info_from_settings(settings: &ParseSettings) -> ParseInfo {
    ParseInfo {
        delimiter: printable_byte(settings.delimiter),
        quote: printable_byte(settings.quote),
        has_headers: settings.has_headers,
        encoding: settings.encoding.name().to_string(),
    }
}

pub fn decode_source(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::warn!(
            encoding = actual.name(),
            "input contained malformed sequences; replaced with U+FFFD"
        );
    }
    text.into_owned()
}

/// Drop the first `count` raw bytes of the file, ahead of any BOM detection.
pub fn skip_initial_bytes(bytes: &[u8], count: usize) -> &[u8] {
    bytes.get(count..).unwrap_or_default()
}

pub fn parse_table(text: &str, settings: &ParseSettings) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(settings.delimiter)
        .quote(settings.quote)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in rdr.records() {
        let record = record?;
        records.push(record.iter().map(str::to_string).collect::<Vec<String>>());
    }

    if records.is_empty() {
        return Err(TableError::MissingHeader);
    }

    if settings.has_headers {
        let headers = records.remove(0);
        return Ok(Table::new(headers, records));
    }

    let width = records.iter().map(Vec::len).max().unwrap_or(0);
    let headers = (1..=width).map(|n| format!("column_{n}")).collect();
    Ok(Table::new(headers, records))
}

/// Decode and parse a file's contents after skipping `skip_bytes` leading bytes.
pub fn load_table_from_bytes(
    bytes: &[u8],
    settings: &ParseSettings,
    skip_bytes: usize,
) -> Result<Table> {
    let text = decode_source(skip_initial_bytes(bytes, skip_bytes), settings.encoding);
    let table = parse_table(&text, settings)?;
    tracing::info!(
        columns = table.headers.len(),
        rows = table.rows.len(),
        skip_bytes,
        "loaded table"
    );
    Ok(table)
}

pub fn write_table<W: Write>(writer: W, table: &Table, delimiter: u8) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .flexible(true)
        .delimiter(delimiter)
        .from_writer(writer);
    wtr.write_record(&table.headers)?;
    for row in &table.rows {
        wtr.write_record(row)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn save_table(path: &Path, table: &Table, delimiter: u8) -> Result<()> {
    let file = File::create(path).map_err(|err| TableError::io(path, err))?;
    write_table(BufWriter::new(file), table, delimiter)?;
    tracing::info!(path = %path.display(), rows = table.rows.len(), "saved table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detects_semicolon_delimiter() {
        let settings = detect_parse_settings(b"name;age\nann;31\nbob;27\n");
        assert_eq!(settings.delimiter, b';');
        assert!(settings.has_headers);
    }

    #[test]
    fn detection_ignores_delimiters_inside_quotes() {
        let settings = detect_parse_settings(b"name,note\n\"a;b\",x\n\"c;d\",y\n");
        assert_eq!(settings.delimiter, b',');
    }

    #[test]
    fn detection_falls_back_to_comma() {
        let settings = detect_parse_settings(b"single\nvalue\n");
        assert_eq!(settings.delimiter, b',');
    }

    #[test]
    fn detects_latin1_encoding() {
        // "café" in windows-1252 is not valid UTF-8.
        let bytes = b"name,place\nann,caf\xe9\nbob,na\xefve\n";
        let settings = detect_parse_settings(bytes);
        assert_ne!(settings.encoding, UTF_8);
        let text = decode_source(bytes, settings.encoding);
        assert!(text.starts_with("name,place\nann,caf"));
        assert!(!text.contains('\u{FFFD}'));
    }

    #[test]
    fn overrides_replace_detected_values() {
        let detected = default_parse_settings();
        let settings = apply_parse_overrides(
            &detected,
            Some(ParseOverrides {
                delimiter: Some(b'|'),
                has_headers: Some(false),
                encoding: Some("latin1".to_string()),
                ..Default::default()
            }),
        )
        .expect("valid overrides");
        assert_eq!(settings.delimiter, b'|');
        assert!(!settings.has_headers);
        assert_eq!(settings.encoding.name(), "windows-1252");
        assert_eq!(settings.quote, b'"');
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let err = apply_parse_overrides(
            &default_parse_settings(),
            Some(ParseOverrides {
                encoding: Some("klingon".to_string()),
                ..Default::default()
            }),
        )
        .expect_err("unknown label");
        assert!(matches!(err, TableError::UnknownEncoding(label) if label == "klingon"));
    }

    #[test]
    fn parse_info_renders_tab() {
        let mut settings = default_parse_settings();
        settings.delimiter = b'\t';
        let info = parse_info_from_settings(&settings);
        assert_eq!(info.delimiter, "\\t");
        assert_eq!(info.encoding, "UTF-8");
    }

    #[test]
    fn parses_header_and_ragged_rows() {
        let table = parse_table("a,b,c\n1,2,3\n4,5\n", &default_parse_settings()).expect("parse");
        assert_eq!(table.headers, row(&["a", "b", "c"]));
        assert_eq!(table.rows, vec![row(&["1", "2", "3"]), row(&["4", "5"])]);
    }

    #[test]
    fn headerless_files_get_generated_names() {
        let mut settings = default_parse_settings();
        settings.has_headers = false;
        let table = parse_table("1,2\n3,4,5\n", &settings).expect("parse");
        assert_eq!(table.headers, row(&["column_1", "column_2", "column_3"]));
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn empty_input_has_no_header() {
        let err = parse_table("", &default_parse_settings()).expect_err("empty");
        assert!(matches!(err, TableError::MissingHeader));
    }

    #[test]
    fn skip_counts_raw_bytes() {
        assert_eq!(skip_initial_bytes(b"##a,b", 2), b"a,b");
        assert_eq!(skip_initial_bytes(b"abc", 0), b"abc");
        assert_eq!(skip_initial_bytes(b"abc", 10), b"");
    }

    #[test]
    fn skip_then_parse_drops_preamble() {
        let table = load_table_from_bytes(b"##a,b\n1,2\n", &default_parse_settings(), 2)
            .expect("load");
        assert_eq!(table.headers, row(&["a", "b"]));
    }

    #[test]
    fn skipping_three_bytes_removes_only_the_bom() {
        let bytes = b"\xef\xbb\xbfname,age\nann,31\n";
        let table = load_table_from_bytes(bytes, &default_parse_settings(), 3).expect("load");
        assert_eq!(table.headers, row(&["name", "age"]));
        assert_eq!(table.rows, vec![row(&["ann", "31"])]);
    }

    #[test]
    fn write_table_quotes_when_needed() {
        let table = Table::new(row(&["name", "note"]), vec![row(&["ann", "a,b"])]);
        let mut out = Vec::new();
        write_table(&mut out, &table, b',').expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), "name,note\nann,\"a,b\"\n");
    }

    #[test]
    fn bom_prefixed_file_loads_without_skip() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"\xef\xbb\xbfid,name\n1,ann\n").expect("write");
        file.flush().expect("flush");

        let bytes = crate::csv_mmap::read_source(file.path()).expect("read");
        let table = load_table_from_bytes(&bytes, &default_parse_settings(), 0).expect("load");
        assert_eq!(table.headers, row(&["id", "name"]));
        assert_eq!(table.rows, vec![row(&["1", "ann"])]);
    }

    #[test]
    fn save_table_writes_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.csv");
        let table = Table::new(row(&["a"]), vec![row(&["1"])]);
        save_table(&path, &table, b',').expect("save");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "a\n1\n");
    }
}
