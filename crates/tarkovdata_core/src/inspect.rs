//! Quick look at a wiki page's table layout, used when a parser stops matching.

use anyhow::Result;

use crate::fetch::PageFetcher;
use crate::table::HtmlTable;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInspection {
    pub table_count: usize,
    pub headers: Vec<String>,
    /// Texts of the first row with data cells, in column order.
    pub first_row: Vec<String>,
}

pub fn inspect_page(html: &str) -> Result<PageInspection> {
    let tables = HtmlTable::parse_all(html)?;
    let Some(first) = tables.first() else {
        return Ok(PageInspection::default());
    };
    let first_row = first
        .data_rows()
        .first()
        .map(|row| row.cells.iter().map(|cell| cell.text.clone()).collect())
        .unwrap_or_default();
    Ok(PageInspection {
        table_count: tables.len(),
        headers: first.headers(),
        first_row,
    })
}

pub fn fetch_and_inspect<F: PageFetcher>(fetcher: &mut F, url: &str) -> Result<PageInspection> {
    let html = fetcher.fetch_page(url)?;
    inspect_page(&html)
}
