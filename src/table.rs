use crate::error::{Result, TableError};
use crate::filter::{filter_rows, Predicate};
use crate::selection::Selection;
use crate::sort::{sort_order_from, SortDirection, SortState};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// A header row plus the data rows beneath it, held entirely in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve a column by exact header name, then by zero-based index.
    pub fn column_index(&self, column: &str) -> Result<usize> {
        if let Some(idx) = self.headers.iter().position(|header| header == column) {
            return Ok(idx);
        }
        match column.trim().parse::<usize>() {
            Ok(idx) if idx < self.headers.len() => Ok(idx),
            _ => Err(TableError::UnknownColumn(column.to_string())),
        }
    }

    /// New table with the same header and only the matching rows.
    pub fn filtered(&self, predicate: &Predicate) -> Table {
        let rows = filter_rows(&self.rows, predicate);
        tracing::info!(
            column = %self.headers.get(predicate.column).map(String::as_str).unwrap_or(""),
            op = %predicate.op,
            value = %predicate.value,
            matched = rows.len(),
            total = self.rows.len(),
            "filter applied"
        );
        Table::new(self.headers.clone(), rows)
    }
}

/// The displayed ordering of a table.
#[derive(Clone, Debug)]
pub struct TableView {
    table: Table,
    order: Vec<usize>,
    sort: Option<SortState>,
    // Direction each column's header will sort in on its next click.
    next_direction: HashMap<usize, SortDirection>,
}

impl TableView {
    pub fn new(table: Table) -> Self {
        let order = (0..table.rows.len()).collect();
        Self {
            table,
            order,
            sort: None,
            next_direction: HashMap::new(),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn headers(&self) -> &[String] {
        &self.table.headers
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn sort_state(&self) -> Option<SortState> {
        self.sort
    }

    /// Header click. Each column starts ascending and remembers its own
    /// direction, flipping it on every click regardless of clicks elsewhere.
    pub fn sort_by_column(&mut self, column: usize) -> SortState {
        let direction = self
            .next_direction
            .get(&column)
            .copied()
            .unwrap_or(SortDirection::Ascending);
        self.next_direction.insert(column, direction.toggle());
        let started = Instant::now();
        self.order = sort_order_from(&self.table.rows, &self.order, column, direction);
        let state = SortState { column, direction };
        self.sort = Some(state);
        tracing::info!(
            column,
            ?direction,
            rows = self.order.len(),
            ms = started.elapsed().as_millis() as u64,
            "sort applied"
        );
        state
    }

    pub fn clear_sort(&mut self) {
        self.order = (0..self.table.rows.len()).collect();
        self.sort = None;
        self.next_direction.clear();
    }

    pub fn rows(&self) -> impl Iterator<Item = &Vec<String>> + '_ {
        self.order.iter().map(move |&idx| &self.table.rows[idx])
    }

    pub fn selected_rows(&self, selection: &Selection) -> Vec<&Vec<String>> {
        match selection {
            Selection::All => self.rows().collect(),
            Selection::Rows(positions) => positions
                .iter()
                .copied()
                .collect::<BTreeSet<usize>>()
                .into_iter()
                .filter_map(|pos| self.order.get(pos))
                .map(|&idx| &self.table.rows[idx])
                .collect(),
        }
    }

    /// Materialise the current display order as a standalone table.
    pub fn to_table(&self, selection: &Selection) -> Table {
        let rows = self.selected_rows(selection).into_iter().cloned().collect();
        Table::new(self.table.headers.clone(), rows)
    }
}
