use crate::error::Result;
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Render the first `max_rows` rows as a markdown table.
pub fn render_table<T>(rows: &[T], max_rows: usize) -> Option<String>
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return None;
    }
    Some(Table::new(slice).with(Style::markdown()).to_string())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    match render_table(rows, max_rows) {
        Some(table) => println!("{}\n", table),
        None => println!("(no rows)\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelRow;

    fn row(metric: &str) -> ModelRow {
        ModelRow {
            metric: metric.to_string(),
            samples: 3,
            r_squared: "0.5000".to_string(),
            reported_accuracy: "50.0".to_string(),
            accuracy_source: "fitted".to_string(),
        }
    }

    #[test]
    fn renders_markdown_preview_with_limit() {
        let rows = vec![row("Congestion"), row("Green"), row("Coverage")];
        let table = render_table(&rows, 2).unwrap();
        assert!(table.contains("| Metric"));
        assert!(table.contains("Congestion"));
        assert!(!table.contains("Coverage"));
        assert!(render_table::<ModelRow>(&[], 2).is_none());
    }

    #[test]
    fn writes_csv_with_renamed_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.csv");
        write_csv(&path, &[row("Congestion")]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Metric,Samples,RSquared,ReportedAccuracy,AccuracySource"));

        let json = dir.path().join("models.json");
        write_json(&json, &[row("Congestion")]).unwrap();
        let back: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(back[0]["Metric"], "Congestion");
    }
}
