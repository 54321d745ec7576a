/// Rows picked from a view, by display position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    All,
    Rows(Vec<usize>),
}

impl Selection {
    pub fn from_positions(positions: Vec<usize>) -> Self {
        if positions.is_empty() {
            Selection::All
        } else {
            Selection::Rows(positions)
        }
    }
}

/// Clipboard text for a selection: comma-joined fields, one row per line, no quoting.
pub fn format_rows<'a, I, R>(rows: I) -> String
where
    I: IntoIterator<Item = &'a R>,
    R: AsRef<[String]> + 'a + ?Sized,
{
    rows.into_iter()
        .map(|row| row.as_ref().join(","))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_header(headers: &[String]) -> String {
    format!("{}\n", headers.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rows_are_joined_without_quoting() {
        let rows = vec![row(&["ann", "a,b"]), row(&["bob", "7"])];
        assert_eq!(format_rows(&rows), "ann,a,b\nbob,7");
    }

    #[test]
    fn empty_selection_copies_nothing() {
        let rows: Vec<Vec<String>> = Vec::new();
        assert_eq!(format_rows(&rows), "");
    }

    #[test]
    fn header_ends_with_newline() {
        assert_eq!(format_header(&row(&["id", "name"])), "id,name\n");
    }

    #[test]
    fn no_positions_means_everything() {
        assert_eq!(Selection::from_positions(Vec::new()), Selection::All);
        assert_eq!(
            Selection::from_positions(vec![2, 0]),
            Selection::Rows(vec![2, 0])
        );
    }
}
