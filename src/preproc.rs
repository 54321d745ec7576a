//! Sidecar pre-processing file.
//!
//! Each record is `description, kind, args...`. Recognised kinds:
//!
//! * `skipInitialNChars, N` - skip the first N raw bytes of the data file before decoding.
//! * `removeNCharsFromCol, N, COL, FROM_START` - strip N characters from column
//!   COL of every row, from the start when FROM_START is `True`, else from the end.

use crate::error::{Result, TableError};
use csv::{ReaderBuilder, StringRecord};
use rayon::prelude::*;
use std::path::Path;

pub const DEFAULT_PREPROC_FILE: &str = "preproc.csv";

const SKIP_INITIAL_CHARS: &str = "skipInitialNChars";
const REMOVE_CHARS_FROM_COL: &str = "removeNCharsFromCol";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    SkipInitialBytes(usize),
    RemoveChars {
        count: usize,
        column: usize,
        from_start: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreprocPlan {
    pub descriptions: Vec<String>,
    pub directives: Vec<Directive>,
}

impl PreprocPlan {
    /// Raw bytes to skip at the head of the data file; the last directive wins.
    pub fn skip(&self) -> usize {
        self.directives
            .iter()
            .rev()
            .find_map(|directive| match directive {
                Directive::SkipInitialBytes(count) => Some(*count),
                _ => None,
            })
            .unwrap_or(0)
    }

    pub fn summary(&self) -> String {
        let mut message = String::from("Detected pre-processing file with changes:\n");
        for description in &self.descriptions {
            message.push('-');
            message.push_str(description);
            message.push('\n');
        }
        message
    }

    pub fn apply(&self, rows: &mut [Vec<String>]) {
        apply_directives(rows, &self.directives);
    }
}

fn field<'r>(record: &'r StringRecord, idx: usize, name: &str, line: u64) -> Result<&'r str> {
    record.get(idx).ok_or_else(|| TableError::Directive {
        line,
        message: format!("missing {name}"),
    })
}

fn number_field(record: &StringRecord, idx: usize, name: &str, line: u64) -> Result<usize> {
    let raw = field(record, idx, name, line)?;
    raw.trim().parse::<usize>().map_err(|err| TableError::Directive {
        line,
        message: format!("{name} `{raw}` is not a non-negative integer: {err}"),
    })
}

fn parse_directive(record: &StringRecord, line: u64) -> Result<Option<Directive>> {
    let kind = field(record, 1, "directive kind", line)?;
    let directive = match kind.trim() {
        SKIP_INITIAL_CHARS => Directive::SkipInitialBytes(number_field(record, 2, "N", line)?),
        REMOVE_CHARS_FROM_COL => Directive::RemoveChars {
            count: number_field(record, 2, "N", line)?,
            column: number_field(record, 3, "column", line)?,
            from_start: field(record, 4, "FROM_START flag", line)? == "True",
        },
        other => {
            tracing::warn!(line, kind = other, "ignoring unknown pre-processing directive");
            return Ok(None);
        }
    };
    Ok(Some(directive))
}

pub fn parse_preproc(text: &str) -> Result<PreprocPlan> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut plan = PreprocPlan::default();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|pos| pos.line()).unwrap_or(0);
        let Some(description) = record.get(0) else {
            continue;
        };
        plan.descriptions.push(description.to_string());
        if let Some(directive) = parse_directive(&record, line)? {
            plan.directives.push(directive);
        }
    }
    Ok(plan)
}

/// `Ok(None)` when the sidecar file does not exist.
pub fn read_preproc_file(path: &Path) -> Result<Option<PreprocPlan>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(TableError::io(path, err)),
    };
    let plan = parse_preproc(&text)?;
    tracing::info!(
        path = %path.display(),
        directives = plan.directives.len(),
        skip = plan.skip(),
        "read pre-processing file"
    );
    Ok(Some(plan))
}

pub fn apply_directives(rows: &mut [Vec<String>], directives: &[Directive]) {
    for directive in directives {
        if let Directive::RemoveChars {
            count,
            column,
            from_start,
        } = *directive
        {
            remove_n_chars_from_col(rows, count, column, from_start);
        }
    }
}

/// Strip `count` characters from one column of every row. Rows without that column are left alone.
pub fn remove_n_chars_from_col(
    rows: &mut [Vec<String>],
    count: usize,
    column: usize,
    from_start: bool,
) {
    if count == 0 {
        return;
    }
    rows.par_iter_mut().for_each(|row| {
        let Some(cell) = row.get_mut(column) else {
            return;
        };
        let len = cell.chars().count();
        if count >= len {
            cell.clear();
            return;
        }
        let keep_from = if from_start { count } else { len - count };
        let boundary = cell
            .char_indices()
            .nth(keep_from)
            .map(|(idx, _)| idx)
            .unwrap_or(cell.len());
        if from_start {
            cell.drain(..boundary);
        } else {
            cell.truncate(boundary);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn parses_both_directive_kinds() {
        let plan = parse_preproc(
            "Skip preamble,skipInitialNChars,3\n\
             Strip prefix,removeNCharsFromCol,2,1,True\n\
             Strip suffix,removeNCharsFromCol,1,0,False\n",
        )
        .expect("parse");
        assert_eq!(
            plan.descriptions,
            vec!["Skip preamble", "Strip prefix", "Strip suffix"]
        );
        assert_eq!(
            plan.directives,
            vec![
                Directive::SkipInitialBytes(3),
                Directive::RemoveChars {
                    count: 2,
                    column: 1,
                    from_start: true
                },
                Directive::RemoveChars {
                    count: 1,
                    column: 0,
                    from_start: false
                },
            ]
        );
        assert_eq!(plan.skip(), 3);
    }

    #[test]
    fn last_skip_directive_wins() {
        let plan = parse_preproc("a,skipInitialNChars,3\nb,skipInitialNChars,7\n").expect("parse");
        assert_eq!(plan.skip(), 7);
        assert_eq!(PreprocPlan::default().skip(), 0);
    }

    #[test]
    fn unknown_kinds_are_listed_but_ignored() {
        let plan = parse_preproc("Upper-case names,upperCaseCol,0\n").expect("parse");
        assert_eq!(plan.descriptions, vec!["Upper-case names"]);
        assert!(plan.directives.is_empty());
    }

    #[test]
    fn malformed_numbers_report_the_line() {
        let err = parse_preproc("ok,skipInitialNChars,1\nbad,removeNCharsFromCol,x,0,True\n")
            .expect_err("bad count");
        assert!(matches!(err, TableError::Directive { line: 2, .. }), "{err}");
    }

    #[test]
    fn short_records_are_rejected() {
        let err = parse_preproc("only a description\n").expect_err("no kind");
        assert!(matches!(err, TableError::Directive { line: 1, .. }));
    }

    #[test]
    fn summary_lists_each_description() {
        let plan = parse_preproc("Skip preamble,skipInitialNChars,3\nTrim,removeNCharsFromCol,1,0,True\n")
            .expect("parse");
        assert_eq!(
            plan.summary(),
            "Detected pre-processing file with changes:\n-Skip preamble\n-Trim\n"
        );
    }

    #[test]
    fn removes_from_start_and_end() {
        let mut data = rows(&[&["ID-001", "abc"], &["ID-002", "xyz"]]);
        remove_n_chars_from_col(&mut data, 3, 0, true);
        remove_n_chars_from_col(&mut data, 1, 1, false);
        assert_eq!(data, rows(&[&["001", "ab"], &["002", "xy"]]));
    }

    #[test]
    fn removal_is_character_based_and_saturates() {
        let mut data = rows(&[&["ééé"], &["ab"], &[""]]);
        remove_n_chars_from_col(&mut data, 2, 0, false);
        assert_eq!(data, rows(&[&["é"], &[""], &[""]]));
    }

    #[test]
    fn zero_count_and_missing_columns_leave_rows_untouched() {
        let mut data = rows(&[&["abc"], &["abc", "def"]]);
        remove_n_chars_from_col(&mut data, 0, 0, false);
        remove_n_chars_from_col(&mut data, 1, 1, true);
        assert_eq!(data, rows(&[&["abc"], &["abc", "ef"]]));
    }

    #[test]
    fn apply_runs_directives_in_order() {
        let plan = parse_preproc(
            "a,removeNCharsFromCol,1,0,True\nb,removeNCharsFromCol,1,0,True\nc,skipInitialNChars,9\n",
        )
        .expect("parse");
        let mut data = rows(&[&["xxvalue"]]);
        plan.apply(&mut data);
        assert_eq!(data, rows(&[&["value"]]));
    }

    #[test]
    fn missing_sidecar_is_not_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let plan = read_preproc_file(&dir.path().join(DEFAULT_PREPROC_FILE)).expect("read");
        assert!(plan.is_none());
    }
}
