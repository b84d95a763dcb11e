//! Exploratory HTML reports over an aggregated feature table.
//!
//! One report per composer compares that composer's rows against everyone
//! else column by column; a final report describes the whole table.

use crate::table::{Table, COMPOSER_COLUMN};
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Summary of the numeric values in one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub count: usize,
    pub missing: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl ColumnStats {
    /// `None` when no value parses as a number.
    pub fn compute<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut numbers = Vec::new();
        let mut missing = 0;
        for value in values {
            match value.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => numbers.push(v),
                _ => missing += 1,
            }
        }
        if numbers.is_empty() {
            return None;
        }

        numbers.sort_by(|a, b| a.total_cmp(b));
        let n = numbers.len() as f64;
        let mean = numbers.iter().sum::<f64>() / n;
        let var = numbers.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let mid = numbers.len() / 2;
        let median = if numbers.len() % 2 == 0 {
            (numbers[mid - 1] + numbers[mid]) / 2.0
        } else {
            numbers[mid]
        };

        Some(Self {
            count: numbers.len(),
            missing,
            mean,
            std: var.sqrt(),
            min: numbers[0],
            max: numbers[numbers.len() - 1],
            median,
        })
    }
}

/// Columns where every non-empty value is a number.
fn numeric_columns(table: &Table) -> Vec<usize> {
    (0..table.headers.len())
        .filter(|&i| table.headers[i] != COMPOSER_COLUMN)
        .filter(|&i| {
            let mut seen = false;
            let all_numeric = table.values(i).filter(|v| !v.trim().is_empty()).all(|v| {
                seen = true;
                v.trim().parse::<f64>().is_ok()
            });
            seen && all_numeric
        })
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn fmt_stat(value: f64) -> String {
    format!("{:.4}", value)
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>body{{font-family:sans-serif;margin:2em}}table{{border-collapse:collapse}}\
         td,th{{border:1px solid #ccc;padding:4px 8px;text-align:right}}\
         th:first-child,td:first-child{{text-align:left}}</style>\n</head>\n<body>\n\
         <h1>{title}</h1>\n{body}</body>\n</html>\n",
        title = escape(title),
    )
}

fn stats_cells(stats: Option<&ColumnStats>) -> String {
    match stats {
        Some(s) => format!(
            "<td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>",
            s.count,
            fmt_stat(s.mean),
            fmt_stat(s.std),
            fmt_stat(s.min),
            fmt_stat(s.median),
            fmt_stat(s.max)
        ),
        None => "<td>0</td><td colspan=\"5\">no values</td>".to_string(),
    }
}

/// One-vs-rest comparison for `composer`.
pub fn composer_report(table: &Table, composer: &str) -> String {
    let label = table.column(COMPOSER_COLUMN);
    let is_target: Vec<bool> = match label {
        Some(i) => table.values(i).map(|v| v == composer).collect(),
        None => vec![false; table.len()],
    };
    let target_rows = is_target.iter().filter(|t| **t).count();

    let mut body = String::new();
    let _ = writeln!(
        body,
        "<p>{} rows for {}, {} rows for all other composers.</p>",
        target_rows,
        escape(composer),
        table.len() - target_rows
    );
    body.push_str(
        "<table>\n<tr><th>column</th><th>group</th><th>count</th><th>mean</th><th>std</th>\
         <th>min</th><th>median</th><th>max</th></tr>\n",
    );

    for column in numeric_columns(table) {
        let split = |want: bool| {
            ColumnStats::compute(
                table
                    .values(column)
                    .zip(&is_target)
                    .filter(move |(_, t)| **t == want)
                    .map(|(v, _)| v),
            )
        };
        let target = split(true);
        let rest = split(false);
        let name = escape(&table.headers[column]);

        let _ = writeln!(
            body,
            "<tr><th rowspan=\"2\">{}</th><td>{}</td>{}</tr>\n<tr><td>rest</td>{}</tr>",
            name,
            escape(composer),
            stats_cells(target.as_ref()),
            stats_cells(rest.as_ref())
        );
    }
    body.push_str("</table>\n");

    page(&format!("EDA: {} vs rest", composer), &body)
}

/// Whole-table report: row counts per composer plus per-column statistics.
pub fn overview_report(table: &Table) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "<p>{} rows, {} columns.</p>",
        table.len(),
        table.headers.len()
    );

    if let Some(label) = table.column(COMPOSER_COLUMN) {
        body.push_str("<h2>Rows per composer</h2>\n<table>\n<tr><th>composer</th><th>rows</th></tr>\n");
        for composer in table.composers() {
            let rows = table.values(label).filter(|v| *v == composer).count();
            let _ = writeln!(body, "<tr><td>{}</td><td>{}</td></tr>", escape(&composer), rows);
        }
        body.push_str("</table>\n");
    }

    body.push_str(
        "<h2>Numeric columns</h2>\n<table>\n<tr><th>column</th><th>count</th><th>mean</th>\
         <th>std</th><th>min</th><th>median</th><th>max</th><th>missing</th></tr>\n",
    );
    let numeric = numeric_columns(table);
    for &column in &numeric {
        let stats = ColumnStats::compute(table.values(column));
        let missing = stats.as_ref().map(|s| s.missing).unwrap_or(table.len());
        let _ = writeln!(
            body,
            "<tr><td>{}</td>{}<td>{}</td></tr>",
            escape(&table.headers[column]),
            stats_cells(stats.as_ref()),
            missing
        );
    }
    body.push_str("</table>\n");

    let categorical: Vec<usize> = (0..table.headers.len())
        .filter(|i| !numeric.contains(i))
        .collect();
    if !categorical.is_empty() {
        body.push_str(
            "<h2>Categorical columns</h2>\n<table>\n<tr><th>column</th><th>distinct</th></tr>\n",
        );
        for column in categorical {
            let mut distinct: Vec<&str> = table.values(column).collect();
            distinct.sort_unstable();
            distinct.dedup();
            let _ = writeln!(
                body,
                "<tr><td>{}</td><td>{}</td></tr>",
                escape(&table.headers[column]),
                distinct.len()
            );
        }
        body.push_str("</table>\n");
    }

    page("EDA: all composers", &body)
}

/// Write `eda_<composer>.html` for every composer and `eda_all.html` into `dir`.
pub fn write_reports(table: &Table, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    for composer in table.composers() {
        let path = dir.join(format!("eda_{}.html", composer));
        match std::fs::write(&path, composer_report(table, &composer)) {
            Ok(()) => written.push(path),
            Err(e) => tracing::warn!("Failed to write report for {}: {}", composer, e),
        }
    }

    let path = dir.join("eda_all.html");
    std::fs::write(&path, overview_report(table))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    written.push(path);

    tracing::info!("Wrote {} reports to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Table {
        let mut table = Table::default();
        let headers: Vec<String> = ["filename", "total_counts", "composer"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = [
            ["a.mid", "10", "Bach"],
            ["b.mid", "20", "Bach"],
            ["c.mid", "40", "Chopin"],
        ]
        .into_iter()
        .map(|r| r.iter().map(|s| s.to_string()).collect());
        table.append(&headers, rows);
        table
    }

    #[test]
    fn stats_skip_non_numbers() {
        let stats = ColumnStats::compute(["1", "3", "", "x", "2"]).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.missing, 2);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.median, 2.0);
        assert_eq!((stats.min, stats.max), (1.0, 3.0));
        assert!(ColumnStats::compute(["a", "b"]).is_none());
    }

    #[test]
    fn numeric_detection_excludes_labels() {
        assert_eq!(numeric_columns(&sample()), vec![1]);
    }

    #[test]
    fn composer_report_splits_one_vs_rest() {
        let html = composer_report(&sample(), "Bach");
        assert!(html.contains("2 rows for Bach, 1 rows for all other composers"));
        // Bach mean 15, rest mean 40
        assert!(html.contains("<td>15.0000</td>"));
        assert!(html.contains("<td>40.0000</td>"));
    }

    #[test]
    fn writes_one_report_per_composer_plus_overview() {
        let dir = TempDir::new().unwrap();
        let written = write_reports(&sample(), dir.path()).unwrap();
        assert_eq!(
            written,
            vec![
                dir.path().join("eda_Bach.html"),
                dir.path().join("eda_Chopin.html"),
                dir.path().join("eda_all.html"),
            ]
        );
        let overview = std::fs::read_to_string(dir.path().join("eda_all.html")).unwrap();
        assert!(overview.contains("<td>Chopin</td><td>1</td>"));
    }

    #[test]
    fn empty_table_still_gets_an_overview() {
        let dir = TempDir::new().unwrap();
        let written = write_reports(&Table::default(), dir.path()).unwrap();
        assert_eq!(written, vec![dir.path().join("eda_all.html")]);
    }

    #[test]
    fn labels_are_escaped() {
        assert_eq!(escape("<b>&\""), "&lt;b&gt;&amp;&quot;");
    }
}
