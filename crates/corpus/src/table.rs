//! A small string table for concatenating per-composer CSV files.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const COMPOSER_COLUMN: &str = "composer";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Values of one column, in row order.
    pub fn values<'a>(&'a self, index: usize) -> impl Iterator<Item = &'a str> + 'a {
        self.rows.iter().map(move |row| row.get(index).map(String::as_str).unwrap_or(""))
    }

    /// Distinct composer labels, sorted.
    pub fn composers(&self) -> Vec<String> {
        let Some(index) = self.column(COMPOSER_COLUMN) else {
            return Vec::new();
        };
        self.values(index)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Append rows under `headers`, widening the table with any new columns.
    pub fn append(&mut self, headers: &[String], rows: impl IntoIterator<Item = Vec<String>>) {
        let mapping: Vec<usize> = headers
            .iter()
            .map(|h| match self.column(h) {
                Some(i) => i,
                None => {
                    self.headers.push(h.clone());
                    self.headers.len() - 1
                }
            })
            .collect();

        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
        for row in rows {
            let mut out = vec![String::new(); width];
            for (value, &column) in row.into_iter().zip(&mapping) {
                out[column] = value;
            }
            self.rows.push(out);
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", path.display()))?
            .iter()
            .map(String::from)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("Bad record in {}", path.display()))?;
            rows.push(record.iter().map(String::from).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        if !self.headers.is_empty() {
            writer.write_record(&self.headers)?;
        }
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn csv_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        tracing::warn!("Cannot list {}, treating it as empty", dir.display());
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    files
}

/// Concatenate every CSV in `dir`, labelling rows with a `composer` column
/// taken from the file stem. An empty or missing directory gives an empty table.
pub fn aggregate(dir: &Path) -> Table {
    let mut table = Table::default();
    for path in csv_files(dir) {
        let composer = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let part = match Table::read(&path) {
            Ok(part) => part,
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };

        let mut headers = part.headers;
        // A column from the file itself would collide with the label
        let own = headers.iter().position(|h| h == COMPOSER_COLUMN);
        if let Some(i) = own {
            headers.remove(i);
        }
        headers.push(COMPOSER_COLUMN.to_string());

        let rows = part.rows.into_iter().map(|mut row| {
            if let Some(i) = own {
                if i < row.len() {
                    row.remove(i);
                }
            }
            row.resize(headers.len() - 1, String::new());
            row.push(composer.clone());
            row
        });
        table.append(&headers, rows);
        tracing::debug!("Aggregated {}", path.display());
    }

    tracing::info!(
        "Aggregated {} rows from {} ({} composers)",
        table.len(),
        dir.display(),
        table.composers().len()
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn s(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn empty_directory_gives_empty_table() {
        let dir = TempDir::new().unwrap();
        let table = aggregate(dir.path());
        assert!(table.is_empty());
        assert!(table.headers.is_empty());
        assert!(table.composers().is_empty());
    }

    #[test]
    fn missing_directory_gives_empty_table() {
        let dir = TempDir::new().unwrap();
        assert!(aggregate(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn labels_rows_by_file_stem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Bach.csv"),
            "filename,total_counts\na.mid,10\nb.mid,12\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("Chopin.csv"),
            "filename,total_counts,avg_velocity\nc.mid,7,64\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let table = aggregate(dir.path());

        assert_eq!(table.headers, s(&["filename", "total_counts", "composer", "avg_velocity"]));
        assert_eq!(
            table.rows,
            vec![
                s(&["a.mid", "10", "Bach", ""]),
                s(&["b.mid", "12", "Bach", ""]),
                s(&["c.mid", "7", "Chopin", "64"]),
            ]
        );
        assert_eq!(table.composers(), s(&["Bach", "Chopin"]));
    }

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/all.csv");
        let mut table = Table::default();
        table.append(&s(&["x", "composer"]), vec![s(&["1", "Bach"])]);

        table.write(&path).unwrap();
        assert_eq!(Table::read(&path).unwrap(), table);
    }
}
