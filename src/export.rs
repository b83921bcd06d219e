// 📤 Export - comparison grid → spreadsheet CSV
//
// Cells are written exactly as the grid displays them, so the sheet an
// analyst opens matches what they were looking at.

use crate::query::ComparisonGrid;
use anyhow::{Context, Result};
use std::io::Write;

/// Write the grid as CSV: a header, then each section title followed by its rows
pub fn export_csv<W: Write>(grid: &ComparisonGrid, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let width = grid.banks.len() + 3;

    let mut header = vec!["Metric".to_string()];
    header.extend(grid.banks.iter().map(|b| b.display_name().to_string()));
    header.push("Unit".to_string());
    header.push("Currency".to_string());
    wtr.write_record(&header).context("Failed to write export header")?;

    for (section, rows) in grid.sections() {
        let mut title = vec![String::new(); width];
        title[0] = section.title().to_string();
        wtr.write_record(&title)
            .with_context(|| format!("Failed to write section {}", section.title()))?;

        for row in rows {
            let mut line = vec![row.metric.clone()];
            line.extend(row.displayed());
            line.push(row.unit.clone());
            line.push(grid.display_currency.code().to_string());
            wtr.write_record(&line)
                .with_context(|| format!("Failed to write row {}", row.metric))?;
        }
    }

    wtr.flush().context("Failed to flush export")?;
    Ok(())
}

/// Export to an in-memory string
pub fn export_csv_string(grid: &ComparisonGrid) -> Result<String> {
    let mut buf = Vec::new();
    export_csv(grid, &mut buf)?;
    String::from_utf8(buf).context("Export produced invalid UTF-8")
}

/// Suggested download name, e.g. "peer-comparison-2025-1H-group.csv"
pub fn export_filename(grid: &ComparisonGrid) -> String {
    format!(
        "peer-comparison-{}-{}.csv",
        grid.period.replace(' ', "-"),
        grid.segment.code().to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::metric::{CET1_RATIO, OPERATING_EXPENSES};
    use crate::entities::{Bank, Currency, StandardizedSegment};
    use crate::model::ExtractionRecord;
    use crate::pipeline::NormalizationPipeline;
    use crate::query::{ComparisonQuery, DisplayRates};

    fn create_test_grid(currency: Currency) -> ComparisonGrid {
        let records = vec![
            ExtractionRecord::new(Bank::BocHk, "2025 1H", OPERATING_EXPENSES, "Group Total", "(18,018)", "m", "HKD", "doc-1", 8),
            ExtractionRecord::new(Bank::BocHk, "2025 1H", CET1_RATIO, "Group Total", "23.69", "%", "HKD", "doc-1", 14),
        ];
        let points = NormalizationPipeline::hong_kong_default().normalize_batch(&records).points;
        let query = ComparisonQuery::new("2025 1H", StandardizedSegment::Group, currency)
            .with_banks(&[Bank::BocHk, Bank::HangSeng]);
        ComparisonGrid::build(&query, &points, &DisplayRates::default()).unwrap()
    }

    #[test]
    fn test_export_matches_display() {
        let grid = create_test_grid(Currency::USD);
        let csv = export_csv_string(&grid).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Metric,BOC Hong Kong,Hang Seng Bank,Unit,Currency");
        assert_eq!(lines[1], "Profit & Loss,,,,");
        assert!(lines.contains(&"Operating Expenses,\"-$2,306.3m\",-,m,USD"));
        assert!(lines.contains(&"Common Equity Tier 1,23.69%,-,%,USD"));
        assert!(lines.contains(&"Balance Sheet & Ratios,,,,"));

        // header + 2 section titles + one line per catalogue metric
        assert_eq!(lines.len(), 3 + grid.rows.len());
    }

    #[test]
    fn test_export_filename() {
        let grid = create_test_grid(Currency::HKD);
        assert_eq!(export_filename(&grid), "peer-comparison-2025-1H-group.csv");
    }
}
