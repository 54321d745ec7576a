use crate::filter::parse_number;
use rayon::prelude::*;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SortState {
    pub column: usize,
    pub direction: SortDirection,
}

enum SortKeys<'a> {
    Numeric(Vec<f64>),
    Lexical(Vec<&'a str>),
}

fn sort_keys<'a>(data: &'a [Vec<String>], column: usize, order: &[usize]) -> SortKeys<'a> {
    let cells: Vec<&str> = order
        .iter()
        .map(|&idx| data[idx].get(column).map(String::as_str).unwrap_or(""))
        .collect();
    let numbers: Option<Vec<f64>> = cells.par_iter().map(|cell| parse_number(cell)).collect();
    match numbers {
        Some(numbers) => SortKeys::Numeric(numbers),
        None => SortKeys::Lexical(cells),
    }
}

/// Stable re-ordering of `order` (indices into `data`) by one column.
///
/// Keys compare as floats when every key parses, otherwise as strings. Missing
/// cells sort as the empty string. Ties keep their relative position in both
/// directions.
pub fn sort_order_from(
    data: &[Vec<String>],
    order: &[usize],
    column: usize,
    direction: SortDirection,
) -> Vec<usize> {
    let keys = sort_keys(data, column, order);
    let mut positions: Vec<usize> = (0..order.len()).collect();
    let compare = |a: &usize, b: &usize| -> Ordering {
        let ordering = match &keys {
            SortKeys::Numeric(numbers) => numbers[*a].total_cmp(&numbers[*b]),
            SortKeys::Lexical(cells) => cells[*a].cmp(cells[*b]),
        };
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    };
    positions.par_sort_by(compare);
    positions.into_iter().map(|pos| order[pos]).collect()
}

pub fn sort_order(data: &[Vec<String>], column: usize, direction: SortDirection) -> Vec<usize> {
    let identity: Vec<usize> = (0..data.len()).collect();
    sort_order_from(data, &identity, column, direction)
}
