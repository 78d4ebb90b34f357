//! Plain-text dump of the resolved configuration.
//!
//! One row per key, columns left-aligned and padded to the widest cell of the
//! column, cells joined by one space, rows in key order.

/// Render rows of cells as padded columns.
///
/// Every row must have the same number of cells.
pub fn format_columns(rows: &[Vec<String>]) -> String {
    let columns = rows.first().map(Vec::len).unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in rows {
        debug_assert_eq!(row.len(), columns);
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        out.push_str(&cells.join(" "));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_columns_padded_to_widest() {
        let out = format_columns(&[row(&["answer", "42"]), row(&["hello", "world"])]);
        assert_eq!(out, "answer 42   \nhello  world\n");
    }

    #[test]
    fn test_empty() {
        assert_eq!(format_columns(&[]), "");
    }

    #[test]
    fn test_width_counts_chars_not_bytes() {
        let out = format_columns(&[row(&["é", "x"]), row(&["ab", "y"])]);
        assert_eq!(out, "é  x\nab y\n");
    }
}
