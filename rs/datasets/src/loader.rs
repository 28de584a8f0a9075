use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ndarray::Array2;

/// Reads a numeric CSV file into a (rows, columns) matrix. A first line that doesn't parse as
/// numbers is treated as a header and skipped.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Array2<f64>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_csv(&content).with_context(|| format!("Malformed CSV file {}", path.display()))
}

fn parse_row(line: &str) -> Option<Vec<f64>> {
    line.split(',')
        .map(|field| field.trim().parse::<f64>().ok())
        .collect()
}

fn parse_csv(content: &str) -> Result<Array2<f64>> {
    let mut num_columns = None;
    let mut values = Vec::new();
    let mut num_rows = 0;
    for (line_idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = match parse_row(line) {
            Some(row) => row,
            None if line_idx == 0 => continue,
            None => return Err(anyhow!("Non-numeric value on line {}", line_idx + 1)),
        };
        match num_columns {
            None => num_columns = Some(row.len()),
            Some(expected) if expected != row.len() => {
                return Err(anyhow!(
                    "Line {} has {} columns, expected {}",
                    line_idx + 1,
                    row.len(),
                    expected
                ));
            }
            _ => {}
        }
        values.extend(row);
        num_rows += 1;
    }

    let num_columns = num_columns.ok_or_else(|| anyhow!("No data rows"))?;
    Ok(Array2::from_shape_vec((num_rows, num_columns), values)?)
}
