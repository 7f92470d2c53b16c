//! Reporting Formatter - deterministic rendering of structured results
//!
//! No model or network calls. Currency-like and percentage columns are
//! recognised from the configured name suffixes.

use crate::config::{ReportStyle, ReportingConfig};
use crate::execution::result::{Scalar, StructuredResult};
use itertools::Itertools;
use tracing::warn;

/// Column name of the one-cell result produced by the reporting capability.
pub const REPORT_COLUMN: &str = "report";

/// `part / whole * 100`, or `None` when the ratio is undefined.
pub fn share(part: f64, whole: f64) -> Option<f64> {
    if whole == 0.0 || !whole.is_finite() || !part.is_finite() {
        return None;
    }
    let pct = part / whole * 100.0;
    pct.is_finite().then_some(pct)
}

/// Percentage text with two decimals, `"n/a"` when the whole is zero.
pub fn percentage(part: f64, whole: f64) -> String {
    match share(part, whole) {
        Some(pct) => format!("{:.2}%", pct),
        None => "n/a".to_string(),
    }
}

/// Column hints supplied by configuration; the formatter does not infer them.
#[derive(Debug, Clone)]
pub struct ColumnHints {
    currency_suffixes: Vec<String>,
    percent_suffixes: Vec<String>,
}

impl ColumnHints {
    pub fn new(currency_suffixes: &[String], percent_suffixes: &[String]) -> Self {
        let lower = |suffixes: &[String]| suffixes.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>();
        Self {
            currency_suffixes: lower(currency_suffixes),
            percent_suffixes: lower(percent_suffixes),
        }
    }

    pub fn is_currency(&self, column: &str) -> bool {
        ends_with_any(column, &self.currency_suffixes)
    }

    pub fn is_percent(&self, column: &str) -> bool {
        ends_with_any(column, &self.percent_suffixes)
    }
}

fn ends_with_any(column: &str, suffixes: &[String]) -> bool {
    let column = column.to_lowercase();
    suffixes.iter().any(|s| column.ends_with(s.as_str()))
}

#[derive(Debug, Clone)]
pub struct ReportFormatter {
    hints: ColumnHints,
    preview_rows: usize,
}

impl ReportFormatter {
    pub fn new(config: &ReportingConfig) -> Self {
        Self {
            hints: ColumnHints::new(&config.currency_suffixes, &config.percent_suffixes),
            preview_rows: config.preview_rows.max(1),
        }
    }

    pub fn hints(&self) -> &ColumnHints {
        &self.hints
    }

    pub fn format(&self, results: &[StructuredResult], style: ReportStyle) -> String {
        if results.is_empty() {
            return "No results were produced.".to_string();
        }
        results
            .iter()
            .map(|result| match report_text(result) {
                Some(text) => text.to_string(),
                None => match style {
                    ReportStyle::Table => self.table(result),
                    ReportStyle::Prose => self.prose(result),
                    ReportStyle::Csv => self.csv(result).unwrap_or_else(|e| {
                        warn!("CSV rendering failed, using table: {}", e);
                        self.table(result)
                    }),
                },
            })
            .join("\n\n")
    }

    pub fn format_value(&self, column: &str, value: &Scalar) -> String {
        if self.hints.is_percent(column) {
            // Shares are stored already scaled; a null share had a zero whole.
            return match value.as_f64() {
                Some(pct) => percentage(pct, 100.0),
                None if value.is_null() => "n/a".to_string(),
                None => value.to_string(),
            };
        }
        match value {
            Scalar::Null => "-".to_string(),
            Scalar::Integer(_) | Scalar::Real(_) | Scalar::Text(_) if self.hints.is_currency(column) => {
                match value.as_f64() {
                    Some(amount) => format!("{:.2}", amount),
                    None => value.to_string(),
                }
            }
            Scalar::Real(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            other => other.to_string(),
        }
    }

    fn table(&self, result: &StructuredResult) -> String {
        if result.columns.is_empty() {
            return "No columns returned.".to_string();
        }
        let mut out = String::new();
        out.push_str(&format!("| {} |\n", result.columns.join(" | ")));
        out.push_str(&format!(
            "|{}|\n",
            result.columns.iter().map(|_| "---").join("|")
        ));
        for row in result.rows.iter().take(self.preview_rows) {
            let cells = result
                .columns
                .iter()
                .zip(row)
                .map(|(col, v)| self.format_value(col, v).replace('|', "\\|"))
                .join(" | ");
            out.push_str(&format!("| {} |\n", cells));
        }
        out.push_str(&self.footer(result));
        out.trim_end().to_string()
    }

    fn prose(&self, result: &StructuredResult) -> String {
        if result.rows.is_empty() {
            return "No rows matched.".to_string();
        }
        if result.rows.len() == 1 && result.columns.len() == 1 {
            return format!(
                "{}: {}",
                result.columns[0],
                self.format_value(&result.columns[0], &result.rows[0][0])
            );
        }
        let mut lines = vec![format!(
            "{} row{}:",
            result.row_count,
            if result.row_count == 1 { "" } else { "s" }
        )];
        for row in result.rows.iter().take(self.preview_rows) {
            let fields = result
                .columns
                .iter()
                .zip(row)
                .map(|(col, v)| format!("{}: {}", col, self.format_value(col, v)))
                .join(", ");
            lines.push(format!("- {}", fields));
        }
        let footer = self.footer(result);
        if !footer.is_empty() {
            lines.push(footer.trim_end().to_string());
        }
        lines.join("\n")
    }

    fn csv(&self, result: &StructuredResult) -> Result<String, Box<dyn std::error::Error>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&result.columns)?;
        for row in &result.rows {
            writer.write_record(
                result
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(col, v)| match v {
                        Scalar::Null if !self.hints.is_percent(col) => String::new(),
                        _ => self.format_value(col, v),
                    }),
            )?;
        }
        let bytes = writer.into_inner().map_err(|e| e.to_string())?;
        Ok(String::from_utf8(bytes)?.trim_end().to_string())
    }

    fn footer(&self, result: &StructuredResult) -> String {
        let mut notes = Vec::new();
        if result.rows.len() > self.preview_rows {
            notes.push(format!(
                "... {} more rows not shown",
                result.rows.len() - self.preview_rows
            ));
        }
        if result.truncated {
            notes.push(format!("(result capped at {} rows)", result.row_count));
        }
        notes.join("\n")
    }
}

/// Text of a reporting-capability result, rendered verbatim.
pub fn report_text(result: &StructuredResult) -> Option<&str> {
    match (result.columns.as_slice(), result.rows.as_slice()) {
        ([col], [row]) if col == REPORT_COLUMN => match row.first() {
            Some(Scalar::Text(text)) => Some(text.as_str()),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatter() -> ReportFormatter {
        ReportFormatter::new(&ReportingConfig::default())
    }

    fn revenue() -> StructuredResult {
        StructuredResult::new(
            vec!["CategoryName".to_string(), "TotalRevenue".to_string(), "TotalOrders".to_string()],
            vec![
                vec![Scalar::Text("Beverages".to_string()), Scalar::Real(418.0), Scalar::Integer(2)],
                vec![Scalar::Text("Condiments".to_string()), Scalar::Real(330.555), Scalar::Integer(2)],
            ],
            3,
        )
    }

    #[test]
    fn test_percentage_zero_whole() {
        assert_eq!(percentage(5.0, 0.0), "n/a");
        assert_eq!(percentage(0.0, 0.0), "n/a");
        assert_eq!(percentage(1.0, f64::INFINITY), "n/a");
        assert_eq!(percentage(1.0, 4.0), "25.00%");
    }

    #[test]
    fn test_currency_columns_rounded() {
        let f = formatter();
        assert_eq!(f.format_value("TotalRevenue", &Scalar::Real(330.555)), "330.56");
        assert_eq!(f.format_value("UnitPrice", &Scalar::Integer(18)), "18.00");
        assert_eq!(f.format_value("TotalOrders", &Scalar::Integer(2)), "2");
        assert_eq!(f.format_value("Discount", &Scalar::Real(0.15)), "0.15");
    }

    #[test]
    fn test_currency_text_rounded() {
        let f = formatter();
        assert_eq!(f.format_value("UnitPrice", &Scalar::Text("21.3456".to_string())), "21.35");
        assert_eq!(f.format_value("UnitPrice", &Scalar::Text("call us".to_string())), "call us");
    }

    #[test]
    fn test_share_columns_rendered_as_percentages() {
        let f = formatter();
        assert_eq!(f.format_value("RevenueShare", &Scalar::Real(41.5)), "41.50%");
        assert_eq!(f.format_value("RevenueShare", &Scalar::Null), "n/a");
    }

    #[test]
    fn test_zero_revenue_share_is_not_applicable() {
        let zero = StructuredResult::new(
            vec!["Country".to_string(), "TotalRevenue".to_string(), "RevenueShare".to_string()],
            vec![vec![Scalar::Text("UK".to_string()), Scalar::Real(0.0), Scalar::Null]],
            0,
        );
        let f = formatter();
        let table = f.format(std::slice::from_ref(&zero), ReportStyle::Table);
        assert!(table.contains("| UK | 0.00 | n/a |"), "{}", table);
        assert!(f.format(std::slice::from_ref(&zero), ReportStyle::Prose).contains("RevenueShare: n/a"));
        assert!(f.format(&[zero], ReportStyle::Csv).contains("UK,0.00,n/a"));
    }

    #[test]
    fn test_table_style() {
        let text = formatter().format(&[revenue()], ReportStyle::Table);
        assert!(text.starts_with("| CategoryName | TotalRevenue | TotalOrders |"));
        assert!(text.contains("| Beverages | 418.00 | 2 |"));
    }

    #[test]
    fn test_prose_single_value() {
        let result = StructuredResult::single("count", Scalar::Integer(77));
        assert_eq!(formatter().format(&[result], ReportStyle::Prose), "count: 77");
    }

    #[test]
    fn test_csv_style() {
        let text = formatter().format(&[revenue()], ReportStyle::Csv);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("CategoryName,TotalRevenue,TotalOrders"));
        assert_eq!(lines.next(), Some("Beverages,418.00,2"));
    }

    #[test]
    fn test_preview_cap_noted() {
        let rows = (0..15).map(|i| vec![Scalar::Integer(i)]).collect();
        let text = formatter().format(
            &[StructuredResult::new(vec!["n".to_string()], rows, 0)],
            ReportStyle::Prose,
        );
        assert!(text.contains("5 more rows not shown"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(formatter().format(&[], ReportStyle::Table), "No results were produced.");
    }

    #[test]
    fn test_report_cell_rendered_verbatim() {
        let report = StructuredResult::single(REPORT_COLUMN, Scalar::Text("done".to_string()));
        assert_eq!(formatter().format(&[report], ReportStyle::Table), "done");
    }
}
