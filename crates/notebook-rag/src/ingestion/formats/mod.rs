//! Per-format parsers
//!
//! Each parser turns raw bytes into [`RawElement`](super::RawElement)s in
//! document order. Formats with native pagination set positions themselves;
//! the rest leave them empty for bucketing.

pub mod image;
pub mod markup;
pub mod notebook;
pub mod office;
pub mod pdf;
pub mod spreadsheet;

/// Join table rows with ` | ` between cells, skipping blank rows
pub(crate) fn render_table<I, R, C>(rows: I) -> String
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = C>,
    C: AsRef<str>,
{
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| cell.as_ref().trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .map(|cells| cells.join(" | "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of whitespace into single spaces
pub(crate) fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}
