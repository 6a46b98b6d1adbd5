//! Tabular formats: Excel workbooks and CSV

use calamine::{Reader, Xlsx};
use std::io::Cursor;

use super::render_table;
use crate::error::{Error, Result};
use crate::ingestion::RawElement;

/// One table element per non-empty sheet, positioned by sheet index
pub fn parse_xlsx(data: &[u8]) -> Result<Vec<RawElement>> {
    let mut workbook = calamine::open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(data))
        .map_err(|e: calamine::XlsxError| Error::parse("xlsx", e.to_string()))?;

    let mut elements = Vec::new();
    for (index, sheet_name) in workbook.sheet_names().to_vec().into_iter().enumerate() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| Error::parse("xlsx", format!("Sheet {}: {}", sheet_name, e)))?;

        let text = render_table(
            range
                .rows()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>()),
        );
        if text.is_empty() {
            tracing::debug!("Skipping empty sheet {}", sheet_name);
            continue;
        }

        elements.push(
            RawElement::table(text)
                .at(index as u32 + 1)
                .with_meta("sheet_name", sheet_name),
        );
    }

    Ok(elements)
}

/// The whole file as one table element at position 1
pub fn parse_csv(data: &[u8]) -> Result<Vec<RawElement>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(data);

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| Error::parse("csv", format!("Malformed row {}: {}", line + 1, e)))?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let text = render_table(rows);
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![RawElement::table(text).at(1)])
}
