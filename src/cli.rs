use crate::csv_handler::{
    apply_parse_overrides, detect_parse_settings, load_table_from_bytes, parse_info_from_settings,
    save_table, skip_initial_bytes, write_table, ParseInfo, ParseOverrides,
};
use crate::csv_mmap::read_source;
use crate::filter::{CompareOp, Predicate};
use crate::logging;
use crate::preproc::{read_preproc_file, PreprocPlan, DEFAULT_PREPROC_FILE};
use crate::selection::{format_header, format_rows, Selection};
use crate::table::{Table, TableView};
use anyhow::{bail, Context};
use clap::{ArgAction, Parser, ValueEnum};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PreprocMode {
    /// Show the detected changes and ask before applying them
    Ask,
    Apply,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    /// Unquoted comma-joined rows, as copied to the clipboard
    Text,
    Json,
}

/// Open a CSV file, optionally pre-process, filter and sort it, then save or print the result.
#[derive(Debug, Parser)]
#[command(name = "csv-tools", version, about)]
pub struct Cli {
    /// CSV file to open
    pub file: PathBuf,

    /// Sidecar pre-processing file
    #[arg(long, env = "CSV_TOOLS_PREPROC", default_value = DEFAULT_PREPROC_FILE)]
    pub preproc: PathBuf,

    #[arg(long, value_enum, default_value_t = PreprocMode::Ask)]
    pub preproc_mode: PreprocMode,

    /// Field delimiter (detected when omitted)
    #[arg(long)]
    pub delimiter: Option<char>,

    #[arg(long)]
    pub quote: Option<char>,

    /// Treat the first row as data and generate column names
    #[arg(long)]
    pub no_headers: bool,

    /// Input encoding label, e.g. `utf-8` or `latin1` (detected when omitted)
    #[arg(long)]
    pub encoding: Option<String>,

    /// Keep rows where COLUMN OP VALUE holds; OP is one of = < > <= >=
    #[arg(
        long = "where",
        num_args = 3,
        value_names = ["COLUMN", "OP", "VALUE"],
        action = ArgAction::Append,
        allow_hyphen_values = true
    )]
    pub filters: Vec<String>,

    /// Sort by COLUMN; repeating the same column flips the direction
    #[arg(long = "sort", value_name = "COLUMN")]
    pub sort: Vec<String>,

    /// Only emit these display rows (zero-based)
    #[arg(long = "select", value_name = "INDEX")]
    pub select: Vec<usize>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Emit only the header line
    #[arg(long)]
    pub header_only: bool,

    /// Save to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print detected and effective parse settings as JSON and exit
    #[arg(long)]
    pub info: bool,

    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, serde::Serialize)]
pub struct CsvMetadata {
    pub headers: Vec<String>,
    pub detected: ParseInfo,
    pub effective: ParseInfo,
    pub rows: usize,
    pub preproc: Option<Vec<String>>,
}

fn ascii_byte(value: char, what: &str) -> anyhow::Result<u8> {
    if !value.is_ascii() {
        bail!("{what} must be a single ASCII character, got `{value}`");
    }
    Ok(value as u8)
}

impl Cli {
    fn overrides(&self) -> anyhow::Result<ParseOverrides> {
        Ok(ParseOverrides {
            delimiter: self
                .delimiter
                .map(|c| ascii_byte(c, "delimiter"))
                .transpose()?,
            quote: self.quote.map(|c| ascii_byte(c, "quote")).transpose()?,
            has_headers: self.no_headers.then_some(false),
            encoding: self.encoding.clone(),
        })
    }

    fn predicates(&self, table: &Table) -> anyhow::Result<Vec<Predicate>> {
        self.filters
            .chunks(3)
            .map(|triple| {
                let [column, op, value] = triple else {
                    bail!("--where takes COLUMN OP VALUE");
                };
                let column = table.column_index(column)?;
                let op: CompareOp = op.parse()?;
                Ok(Predicate::new(column, op, value.clone()))
            })
            .collect()
    }
}

fn confirm_preproc(plan: &PreprocPlan, mode: PreprocMode, interactive: bool) -> anyhow::Result<bool> {
    match mode {
        PreprocMode::Apply => Ok(true),
        PreprocMode::Skip => Ok(false),
        PreprocMode::Ask => {
            if !interactive {
                tracing::warn!("stdin is not a terminal; applying pre-processing without asking");
                return Ok(true);
            }
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!("{}Apply changes?", plan.summary()))
                .default(true)
                .interact()?;
            Ok(confirmed)
        }
    }
}

/// What the sidecar file contributes to one load.
#[derive(Debug, Default)]
struct Preprocessing {
    skip: usize,
    apply: bool,
    plan: Option<PreprocPlan>,
}

fn resolve_preproc(
    path: &Path,
    mode: PreprocMode,
    confirm: impl FnOnce(&PreprocPlan) -> anyhow::Result<bool>,
) -> anyhow::Result<Preprocessing> {
    if mode == PreprocMode::Skip {
        tracing::debug!(path = %path.display(), "pre-processing file ignored");
        return Ok(Preprocessing::default());
    }
    let Some(plan) = read_preproc_file(path)? else {
        return Ok(Preprocessing::default());
    };
    let apply = confirm(&plan)?;
    // Declining only withholds the column changes; the byte skip still holds.
    Ok(Preprocessing {
        skip: plan.skip(),
        apply,
        plan: Some(plan),
    })
}

/// Object keys for JSON rows: the header name, or `column_N` when it is missing or already taken.
fn json_keys(headers: &[String], width: usize) -> Vec<String> {
    let mut taken = HashSet::<String>::new();
    (0..width.max(headers.len()))
        .map(|idx| {
            let mut key = match headers.get(idx) {
                Some(name) if !taken.contains(name) => name.clone(),
                _ => format!("column_{}", idx + 1),
            };
            while taken.contains(&key) {
                key.push('_');
            }
            taken.insert(key.clone());
            key
        })
        .collect()
}

fn rows_as_json(headers: &[String], rows: &[&Vec<String>]) -> serde_json::Value {
    let width = rows.iter().map(|row| row.len()).max().unwrap_or(0);
    let keys = json_keys(headers, width);
    let objects = rows
        .iter()
        .map(|row| {
            let object: serde_json::Map<String, serde_json::Value> = keys
                .iter()
                .zip(row.iter())
                .map(|(key, cell)| (key.clone(), serde_json::Value::String(cell.clone())))
                .collect();
            serde_json::Value::Object(object)
        })
        .collect();
    serde_json::Value::Array(objects)
}

/// Run the whole open/pre-process/filter/sort/emit pipeline, writing to `out` unless `--output` is set.
pub fn execute(cli: &Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let preprocessing = resolve_preproc(&cli.preproc, cli.preproc_mode, |plan| {
        confirm_preproc(plan, cli.preproc_mode, std::io::stdin().is_terminal())
    })?;

    let bytes = read_source(&cli.file)?;
    let detected = detect_parse_settings(skip_initial_bytes(&bytes, preprocessing.skip));
    let settings = apply_parse_overrides(&detected, Some(cli.overrides()?))?;

    let mut table = load_table_from_bytes(&bytes, &settings, preprocessing.skip)
        .with_context(|| format!("failed to load {}", cli.file.display()))?;
    if let (Some(plan), true) = (&preprocessing.plan, preprocessing.apply) {
        plan.apply(&mut table.rows);
    }

    if cli.info {
        let metadata = CsvMetadata {
            headers: table.headers.clone(),
            detected: parse_info_from_settings(&detected),
            effective: parse_info_from_settings(&settings),
            rows: table.len(),
            preproc: preprocessing.plan.map(|plan| plan.descriptions),
        };
        serde_json::to_writer_pretty(&mut *out, &metadata)?;
        writeln!(out)?;
        return Ok(());
    }

    for predicate in cli.predicates(&table)? {
        table = table.filtered(&predicate);
    }

    let mut view = TableView::new(table);
    for column in &cli.sort {
        let column = view.table().column_index(column)?;
        view.sort_by_column(column);
    }

    let selection = Selection::from_positions(cli.select.clone());
    if let (Some(path), OutputFormat::Csv, false) = (&cli.output, cli.format, cli.header_only) {
        save_table(path, &view.to_table(&selection), b',')?;
        return Ok(());
    }

    let mut writer: Box<dyn Write + '_> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(out),
    };

    if cli.header_only {
        write!(writer, "{}", format_header(view.headers()))?;
    } else {
        match cli.format {
            OutputFormat::Csv => write_table(&mut writer, &view.to_table(&selection), b',')?,
            OutputFormat::Text => {
                let rows = view.selected_rows(&selection);
                if !rows.is_empty() {
                    writeln!(writer, "{}", format_rows(rows.iter().copied()))?;
                }
            }
            OutputFormat::Json => {
                let rows = view.selected_rows(&selection);
                serde_json::to_writer_pretty(&mut writer, &rows_as_json(view.headers(), &rows))?;
                writeln!(writer)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_path = logging::init_with(cli.log_file.clone(), logging::level_from_verbosity(cli.verbose))?;
    tracing::debug!(log = %log_path.display(), ?cli, "starting");

    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    execute(&cli, &mut lock).inspect_err(|err| tracing::error!("{err:#}"))
}
