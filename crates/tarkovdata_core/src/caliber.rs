use std::collections::HashSet;

use anyhow::Result;
use tracing::info;

use crate::config::DataConfig;
use crate::fetch::PageFetcher;
use crate::table::HtmlTable;

pub const AMMUNITION_PAGE: &str = "Ammunition";

/// Wiki caliber names and the identifiers the ammunition database uses for them.
const KNOWN_CALIBERS: &[(&str, &str)] = &[
    ("7.62x25mm Tokarev", "Caliber762x25TT"),
    ("9x18mm Makarov", "Caliber9x18PM"),
    ("9x19mm Parabellum", "Caliber9x19PARA"),
    ("9x21mm Gyurza", "Caliber9x21"),
    (".357 Magnum", "Caliber9x33R"),
    (".45 ACP", "Caliber1143x23ACP"),
    (".50 Action Express", "Caliber50AE"),
    ("20x1mm", "Caliber20x1mm"),
    ("4.6x30mm HK", "Caliber46x30"),
    ("5.7x28mm FN", "Caliber57x28"),
    ("5.45x39mm", "Caliber545x39"),
    ("5.56x45mm NATO", "Caliber556x45NATO"),
    ("6.8x51mm", "Caliber68x51"),
    (".300 Blackout", "Caliber762x35"),
    ("7.62x39mm", "Caliber762x39"),
    ("7.62x51mm NATO", "Caliber762x51"),
    (".308 Marlin Express", "Caliber308Marlin"),
    ("7.62x54mmR", "Caliber762x54R"),
    (".338 Lapua Magnum", "Caliber86x70"),
    ("9x39mm", "Caliber9x39"),
    ("9.3x64mm", "Caliber93x64"),
    (".366 TKM", "Caliber366TKM"),
    ("12.7x55mm", "Caliber127x55"),
    (".50 BMG", "Caliber50BMG"),
    ("12.7x108mm", "Caliber127x108"),
    ("12/70", "Caliber12g"),
    ("20/70", "Caliber20g"),
    ("23x75mmR", "Caliber23x75"),
    ("30x29mm", "Caliber30x29"),
    ("40x46mm", "Caliber40x46"),
    ("40x53mm", "Caliber40mmRU"),
    ("26x75mm", "Caliber26x75"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaliberInfo {
    pub name: String,
    pub wiki_url: String,
    pub caliber_id: String,
}

/// Known wiki names map to fixed identifiers; anything else keeps only its ASCII
/// alphanumerics, which makes the fallback idempotent.
pub fn normalize_caliber(name: &str) -> String {
    KNOWN_CALIBERS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, id)| (*id).to_string())
        .unwrap_or_else(|| {
            name.chars()
                .filter(|ch| ch.is_ascii_alphanumeric())
                .collect()
        })
}

/// Caliber links from the Ammunition overview page: rows with at least two data cells whose
/// second cell links to a wiki article. Duplicates (by caliber id) keep the first occurrence.
pub fn parse_caliber_list(html: &str, wiki_base_url: &str) -> Result<Vec<CaliberInfo>> {
    let base = wiki_base_url.trim_end_matches('/');
    let mut seen = HashSet::new();
    let mut calibers = Vec::new();

    for table in HtmlTable::parse_all(html)? {
        for row in &table.rows {
            let data_cells = row.data_cells().collect::<Vec<_>>();
            if data_cells.len() < 2 {
                continue;
            }
            let cell = data_cells[1];
            let (Some(href), Some(name)) = (cell.link_href.as_deref(), cell.link_text.as_deref())
            else {
                continue;
            };
            if name.is_empty() || href.contains("redlink") || !href.starts_with("/wiki/") {
                continue;
            }
            let caliber_id = normalize_caliber(name);
            if !seen.insert(caliber_id.clone()) {
                continue;
            }
            calibers.push(CaliberInfo {
                name: name.to_string(),
                wiki_url: format!("{base}{href}"),
                caliber_id,
            });
        }
    }
    Ok(calibers)
}

pub fn fetch_caliber_list<F: PageFetcher>(
    fetcher: &mut F,
    config: &DataConfig,
) -> Result<Vec<CaliberInfo>> {
    let url = config.page_url(AMMUNITION_PAGE);
    let html = fetcher.fetch_page(&url)?;
    let calibers = parse_caliber_list(&html, &config.wiki_url())?;
    info!(count = calibers.len(), "parsed caliber list");
    Ok(calibers)
}
