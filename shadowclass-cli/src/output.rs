use comfy_table::{presets, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

use crate::app::GlobalOptions;

/// Print `data` as JSON (if `--json`) or call `display_fn` for human-readable output.
pub fn print_output<T: Serialize>(
    data: &T,
    opts: &GlobalOptions,
    display_fn: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(data)?;
        println!("{json}");
    } else {
        display_fn(data);
    }
    Ok(())
}

/// Column alignment for tabular output.
#[derive(Clone, Copy)]
pub enum Align {
    Left,
    Right,
}

/// Whitespace-aligned columns without borders, sized to the widest entry.
pub struct TabWriter {
    table: Table,
}

impl TabWriter {
    /// Create a table with the given `(header, alignment)` columns.
    pub fn new(columns: &[(&str, Align)]) -> Self {
        let mut table = Table::new();
        table
            .load_preset(presets::NOTHING)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(columns.iter().map(|(name, _)| *name).collect::<Vec<_>>());

        // Two spaces between columns, none at the outer edges.
        let last = columns.len().saturating_sub(1);
        for (i, (_, align)) in columns.iter().enumerate() {
            let cell_align = match align {
                Align::Left => CellAlignment::Left,
                Align::Right => CellAlignment::Right,
            };
            if let Some(col) = table.column_mut(i) {
                col.set_cell_alignment(cell_align);
                let pad_left = if i == 0 { 0 } else { 1 };
                let pad_right = if i == last { 0 } else { 1 };
                col.set_padding((pad_left, pad_right));
            }
        }

        Self { table }
    }

    /// Add a row. Values are given in column order.
    pub fn row(&mut self, values: Vec<String>) {
        self.table.add_row(values);
    }

    fn lines(&self) -> Vec<String> {
        self.table
            .to_string()
            .lines()
            .map(|line| line.trim_end().to_string())
            .collect()
    }

    /// Print the table to stdout.
    pub fn print(&self) {
        for line in self.lines() {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_aligned_columns_line_up_at_the_edge() {
        let mut table = TabWriter::new(&[("OUTCOME", Align::Left), ("FILES", Align::Right)]);
        table.row(vec!["transformed".to_string(), "7".to_string()]);
        table.row(vec!["copied".to_string(), "12".to_string()]);

        let lines = table.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("transformed"));
        assert!(lines[1].ends_with(" 7"));
        assert!(lines[2].ends_with("12"));
        assert_eq!(lines[1].len(), lines[2].len());
        assert_eq!(lines[0].len(), lines[1].len());
    }
}
