mod cli;
pub mod csv_handler;
pub mod csv_mmap;
pub mod error;
pub mod filter;
pub mod logging;
pub mod preproc;
pub mod selection;
pub mod sort;
pub mod table;

pub use cli::{execute, run, Cli, CsvMetadata, OutputFormat, PreprocMode};
pub use error::{Result, TableError};
pub use filter::{CompareOp, ComparisonMode, Predicate};
pub use selection::Selection;
pub use sort::{SortDirection, SortState};
pub use table::{Table, TableView};
