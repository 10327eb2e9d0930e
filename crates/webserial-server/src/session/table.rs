//! Boxed text tables for command output.

use std::fmt::Write;

use webserial_core::terminal::ansi::CRLF;

#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows shorter than the header are padded with empty cells.
    pub fn row(&mut self, mut cells: Vec<String>) -> &mut Self {
        cells.resize(self.headers.len(), String::new());
        self.rows.push(cells);
        self
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                self.rows
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(h.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let mut sep = String::from("+");
        for w in &widths {
            sep.push_str(&"-".repeat(w + 2));
            sep.push('+');
        }
        sep.push_str(CRLF);

        let mut out = sep.clone();
        render_row(&mut out, &self.headers, &widths);
        out.push_str(&sep);
        for row in &self.rows {
            render_row(&mut out, row, &widths);
        }
        out.push_str(&sep);
        out
    }
}

fn render_row(out: &mut String, cells: &[String], widths: &[usize]) {
    out.push('|');
    for (cell, width) in cells.iter().zip(widths) {
        let _ = write!(out, " {cell:<width$} |");
    }
    out.push_str(CRLF);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_boxed() {
        let mut table = Table::new(&["ID", "Device"]);
        table.row(vec!["1".into(), "/dev/ttyUSB0".into()]);
        let expected = "\
+----+--------------+\r\n\
| ID | Device       |\r\n\
+----+--------------+\r\n\
| 1  | /dev/ttyUSB0 |\r\n\
+----+--------------+\r\n";
        assert_eq!(table.render(), expected);
    }

    #[test]
    fn empty_table_has_header() {
        let table = Table::new(&["A"]);
        assert_eq!(table.render(), "+---+\r\n| A |\r\n+---+\r\n+---+\r\n");
    }

    #[test]
    fn short_rows_padded() {
        let mut table = Table::new(&["A", "B"]);
        table.row(vec!["x".into()]);
        assert!(table.render().contains("| x |   |"));
    }
}
