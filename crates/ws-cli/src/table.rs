// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal column-aligned text table for list commands. No borders,
//! no wrapping — just padded columns, matching the plain style the
//! rest of this CLI's text output uses.

use crate::color;

pub enum Align {
    Left,
    Right,
}

pub struct Column {
    pub header: String,
    pub align: Align,
    pub max_width: Option<usize>,
    muted: bool,
}

impl Column {
    pub fn left(header: impl Into<String>) -> Self {
        Self { header: header.into(), align: Align::Left, max_width: None, muted: false }
    }

    pub fn right(header: impl Into<String>) -> Self {
        Self { header: header.into(), align: Align::Right, max_width: None, muted: false }
    }

    /// A muted column is still left-aligned but rendered in the
    /// context color — used for identifiers the reader skims past.
    pub fn muted(header: impl Into<String>) -> Self {
        Self { header: header.into(), align: Align::Left, max_width: None, muted: true }
    }

    pub fn with_max(mut self, max_width: usize) -> Self {
        self.max_width = Some(max_width);
        self
    }
}

fn truncate(cell: &str, max_width: Option<usize>) -> String {
    match max_width {
        Some(max) if cell.chars().count() > max && max > 1 => {
            format!("{}…", cell.chars().take(max - 1).collect::<String>())
        }
        _ => cell.to_string(),
    }
}

pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    pub fn render(&self) -> String {
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let truncated: Vec<String> =
                    self.rows.iter().map(|row| truncate(row.get(i).map(String::as_str).unwrap_or(""), col.max_width)).collect();
                truncated.iter().map(|s| s.chars().count()).max().unwrap_or(0).max(col.header.chars().count())
            })
            .collect();

        let mut out = String::new();
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            out.push_str(&color::header(&pad(&col.header, widths[i], &col.align)));
        }
        out.push('\n');

        for row in &self.rows {
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    out.push_str("  ");
                }
                let cell = truncate(row.get(i).map(String::as_str).unwrap_or(""), col.max_width);
                let padded = pad(&cell, widths[i], &col.align);
                out.push_str(&if col.muted { color::muted(&padded) } else { padded });
            }
            out.push('\n');
        }
        out
    }
}

fn pad(text: &str, width: usize, align: &Align) -> String {
    match align {
        Align::Left => format!("{text:<width$}"),
        Align::Right => format!("{text:>width$}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn aligns_columns_to_widest_cell() {
        std::env::set_var("NO_COLOR", "1");
        let mut table = Table::new(vec![Column::left("NAME"), Column::right("COUNT")]);
        table.row(vec!["a".into(), "1".into()]);
        table.row(vec!["longer-name".into(), "200".into()]);
        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], format!("{:<11}  {:>5}", "NAME", "COUNT"));
        assert_eq!(lines[1], format!("{:<11}  {:>5}", "a", "1"));
        assert_eq!(lines[2], format!("{:<11}  {:>5}", "longer-name", "200"));
        std::env::remove_var("NO_COLOR");
    }

    #[test]
    #[serial]
    fn truncates_cells_past_max_width() {
        std::env::set_var("NO_COLOR", "1");
        let mut table = Table::new(vec![Column::left("ID").with_max(4)]);
        table.row(vec!["abcdefgh".into()]);
        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], format!("{:<4}", "ID"));
        assert_eq!(lines[1], "abc…");
        std::env::remove_var("NO_COLOR");
    }
}
