//! Plain-text tables in the "presto" layout:
//!
//! ```text
//!  Type      |   Count
//! -----------+---------
//!  Tracks    |       1
//!  Waypoints |       0
//! ```
//!
//! Numbers are right-aligned, text left-aligned.

use std::fmt;

/// One table cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn number(value: impl fmt::Display) -> Self {
        Cell::Number(value.to_string())
    }

    /// A number, or an empty cell.
    pub fn optional(value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(v) => Cell::number(v),
            None => Cell::text(""),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Cell::Text(s) | Cell::Number(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Short rows are padded with empty cells.
    pub fn push(&mut self, mut row: Vec<Cell>) {
        row.resize(self.headers.len().max(row.len()), Cell::text(""));
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        let columns = self
            .rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0);

        (0..columns)
            .map(|col| {
                let header = self.headers.get(col).map_or(0, |h| h.chars().count());
                self.rows
                    .iter()
                    .filter_map(|row| row.get(col))
                    .map(|cell| cell.as_str().chars().count())
                    .fold(header, usize::max)
            })
            .collect()
    }
}

fn line(cells: impl Iterator<Item = String>) -> String {
    let joined: Vec<String> = cells.map(|c| format!(" {} ", c)).collect();
    joined.join("|").trim_end().to_string()
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();

        let header = line(widths.iter().enumerate().map(|(col, w)| {
            let text = self.headers.get(col).map_or("", String::as_str);
            format!("{:<w$}", text, w = *w)
        }));
        writeln!(f, "{}", header)?;

        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        write!(f, "{}", rule.join("+"))?;

        for row in &self.rows {
            let cells = widths.iter().enumerate().map(|(col, w)| match row.get(col) {
                Some(Cell::Number(n)) => format!("{:>w$}", n, w = *w),
                Some(Cell::Text(t)) => format!("{:<w$}", t, w = *w),
                None => " ".repeat(*w),
            });
            write!(f, "\n{}", line(cells))?;
        }

        Ok(())
    }
}
