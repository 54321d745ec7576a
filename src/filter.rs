use crate::error::TableError;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompareOp {
    Eq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl CompareOp {
    pub const ALL: [CompareOp; 5] = [
        CompareOp::Eq,
        CompareOp::Lt,
        CompareOp::Gt,
        CompareOp::Lte,
        CompareOp::Gte,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Lte => "<=",
            CompareOp::Gte => ">=",
        }
    }

    /// `None` means the operands are unordered (NaN), which satisfies nothing.
    fn holds(self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return false;
        };
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Lte => ordering != Ordering::Greater,
            CompareOp::Gte => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for CompareOp {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        CompareOp::ALL
            .into_iter()
            .find(|op| op.symbol() == trimmed)
            .ok_or_else(|| TableError::UnknownOperator(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonMode {
    Numeric,
    Lexical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: usize,
    pub op: CompareOp,
    pub value: String,
}

impl Predicate {
    pub fn new(column: usize, op: CompareOp, value: impl Into<String>) -> Self {
        Self {
            column,
            op,
            value: value.into(),
        }
    }
}

/// Lenient float parse: surrounding whitespace, exponents, `inf` and `nan` are accepted.
pub fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

pub fn comparison_mode(data: &[Vec<String>], column: usize, value: &str) -> ComparisonMode {
    if parse_number(value).is_none() {
        return ComparisonMode::Lexical;
    }
    let all_numeric = data
        .par_iter()
        .filter_map(|row| row.get(column))
        .all(|cell| parse_number(cell).is_some());
    if all_numeric {
        ComparisonMode::Numeric
    } else {
        ComparisonMode::Lexical
    }
}

pub fn filter_indices(data: &[Vec<String>], predicate: &Predicate) -> Vec<usize> {
    let mode = comparison_mode(data, predicate.column, &predicate.value);
    let target = parse_number(&predicate.value);
    tracing::debug!(
        column = predicate.column,
        op = %predicate.op,
        value = %predicate.value,
        ?mode,
        "filtering rows"
    );

    data.par_iter()
        .enumerate()
        .filter_map(|(idx, row)| {
            let cell = row.get(predicate.column)?;
            let ordering = match (mode, target) {
                (ComparisonMode::Numeric, Some(target)) => {
                    parse_number(cell).and_then(|number| number.partial_cmp(&target))
                }
                _ => Some(cell.as_str().cmp(predicate.value.as_str())),
            };
            if predicate.op.holds(ordering) {
                Some(idx)
            } else {
                None
            }
        })
        .collect()
}

pub fn filter_rows(data: &[Vec<String>], predicate: &Predicate) -> Vec<Vec<String>> {
    filter_indices(data, predicate)
        .into_iter()
        .map(|idx| data[idx].clone())
        .collect()
}
