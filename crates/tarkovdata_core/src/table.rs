//! HTML table extraction for wiki pages. Columns are looked up by header text through
//! [`ColumnMap`], so a page layout change shows up as a missing column.

use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Header,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub kind: CellKind,
    pub span: usize,
    pub text: String,
    /// Text with `<br>`, list items and paragraphs kept as separate lines.
    pub lines: Vec<String>,
    pub link_text: Option<String>,
    pub link_href: Option<String>,
    pub image_alt: Option<String>,
}

impl Cell {
    /// Link text when the cell holds a non-empty link, otherwise the cell text.
    pub fn label(&self) -> &str {
        match self.link_text.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => &self.text,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    pub cells: Vec<Cell>,
}

impl TableRow {
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .map(|cell| cell.text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn header_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells
            .iter()
            .filter(|cell| cell.kind == CellKind::Header)
    }

    pub fn data_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|cell| cell.kind == CellKind::Data)
    }

    /// Cells overlapping logical columns `start..start + width`.
    pub fn cells_in(&self, start: usize, width: usize) -> impl Iterator<Item = &Cell> {
        let end = start + width;
        let mut next_slot = 0;
        self.cells.iter().filter(move |cell| {
            let first = next_slot;
            next_slot += cell.span;
            first < end && first + cell.span > start
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlTable {
    pub rows: Vec<TableRow>,
}

impl HtmlTable {
    /// Every `<table>` in document order. Rows of nested tables belong to the nested table only.
    pub fn parse_all(html: &str) -> Result<Vec<HtmlTable>> {
        let document = Html::parse_document(html);
        let table_selector = selector("table")?;
        let row_selector = selector("tr")?;
        let link_selector = selector("a")?;
        let image_selector = selector("img")?;

        let mut tables = Vec::new();
        for table in document.select(&table_selector) {
            let mut rows = Vec::new();
            for row in table.select(&row_selector) {
                if nearest_table(row).map(|node| node.id()) != Some(table.id()) {
                    continue;
                }
                let cells = row
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter_map(|cell| {
                        let kind = match cell.value().name() {
                            "th" => CellKind::Header,
                            "td" => CellKind::Data,
                            _ => return None,
                        };
                        Some(read_cell(cell, kind, &link_selector, &image_selector))
                    })
                    .collect::<Vec<_>>();
                rows.push(TableRow { cells });
            }
            tables.push(HtmlTable { rows });
        }
        Ok(tables)
    }

    pub fn first(html: &str) -> Result<Option<HtmlTable>> {
        Ok(Self::parse_all(html)?.into_iter().next())
    }

    pub fn header_row(&self) -> Option<&TableRow> {
        self.rows.first()
    }

    pub fn headers(&self) -> Vec<String> {
        self.header_row()
            .map(|row| row.cells.iter().map(|cell| cell.text.clone()).collect())
            .unwrap_or_default()
    }

    pub fn data_rows(&self) -> &[TableRow] {
        self.rows.get(1..).unwrap_or(&[])
    }

    pub fn columns<C: ColumnSpec>(&self) -> ColumnMap<C> {
        self.header_row()
            .map(ColumnMap::from_header_row)
            .unwrap_or_else(|| ColumnMap::from_headers(&[]))
    }
}

pub fn document_text(html: &str) -> String {
    let document = Html::parse_document(html);
    collapse_whitespace(&document.root_element().text().collect::<String>())
}

/// A set of columns a dataset expects, each recognised by one or more header spellings.
pub trait ColumnSpec: Copy + Eq + 'static {
    const ALL: &'static [Self];
    /// Normalized header spellings (lowercase, alphanumerics separated by single spaces).
    fn aliases(self) -> &'static [&'static str];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnSlot<C> {
    column: C,
    start: usize,
    width: usize,
}

#[derive(Debug, Clone)]
pub struct ColumnMap<C: ColumnSpec> {
    slots: Vec<ColumnSlot<C>>,
}

impl<C: ColumnSpec> ColumnMap<C> {
    pub fn from_headers(headers: &[String]) -> Self {
        Self::from_spans(headers.iter().map(|header| (header.as_str(), 1)))
    }

    /// Header cells with `colspan` cover several logical columns.
    pub fn from_header_row(row: &TableRow) -> Self {
        Self::from_spans(row.cells.iter().map(|cell| (cell.text.as_str(), cell.span)))
    }

    // Exact header matches win; otherwise the first header starting with an alias.
    fn from_spans<'h>(spans: impl IntoIterator<Item = (&'h str, usize)>) -> Self {
        let mut headers = Vec::new();
        let mut start = 0;
        for (text, width) in spans {
            headers.push((normalize_header(text), start, width.max(1)));
            start += width.max(1);
        }

        let mut slots = Vec::new();
        for &column in C::ALL {
            let aliases = column.aliases();
            let exact = headers
                .iter()
                .find(|(header, _, _)| aliases.iter().any(|alias| header == alias));
            let found = exact.or_else(|| {
                headers.iter().find(|(header, _, _)| {
                    aliases
                        .iter()
                        .any(|alias| header.starts_with(&format!("{alias} ")))
                })
            });
            if let Some(&(_, start, width)) = found {
                slots.push(ColumnSlot {
                    column,
                    start,
                    width,
                });
            }
        }
        Self { slots }
    }

    fn slot(&self, column: C) -> Option<ColumnSlot<C>> {
        self.slots.iter().copied().find(|slot| slot.column == column)
    }

    pub fn position(&self, column: C) -> Option<usize> {
        self.slot(column).map(|slot| slot.start)
    }

    pub fn contains(&self, column: C) -> bool {
        self.position(column).is_some()
    }

    pub fn missing(&self) -> Vec<C> {
        C::ALL
            .iter()
            .copied()
            .filter(|column| !self.contains(*column))
            .collect()
    }

    /// The cell under `column`. For a spanning header this is the first cell with a label.
    pub fn cell<'r>(&self, row: &'r TableRow, column: C) -> Option<&'r Cell> {
        let slot = self.slot(column)?;
        row.cells_in(slot.start, slot.width)
            .find(|cell| !cell.label().is_empty())
            .or_else(|| row.cells_in(slot.start, slot.width).next())
    }

    pub fn text<'r>(&self, row: &'r TableRow, column: C) -> &'r str {
        self.cell(row, column)
            .map(|cell| cell.text.as_str())
            .unwrap_or("")
    }
}

pub fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|error| anyhow!("invalid selector `{css}`: {error:?}"))
}

fn nearest_table(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "table")
}

fn read_cell(
    cell: ElementRef<'_>,
    kind: CellKind,
    link_selector: &Selector,
    image_selector: &Selector,
) -> Cell {
    let mut raw = String::new();
    collect_text(cell, &mut raw);
    let lines = raw
        .split('\n')
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();
    let link = cell.select(link_selector).next();
    let span = cell
        .value()
        .attr("colspan")
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .max(1);

    Cell {
        kind,
        span,
        text: collapse_whitespace(&raw),
        lines,
        link_text: link.map(|link| collapse_whitespace(&link.text().collect::<String>())),
        link_href: link.and_then(|link| link.value().attr("href").map(ToString::to_string)),
        image_alt: cell
            .select(image_selector)
            .next()
            .and_then(|image| image.value().attr("alt").map(ToString::to_string)),
    }
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if name == "br" {
                out.push('\n');
                continue;
            }
            let is_block = matches!(name, "li" | "p" | "div" | "ul" | "ol" | "tr");
            if is_block {
                out.push('\n');
            }
            collect_text(child_element, out);
            if is_block {
                out.push('\n');
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Col {
        Name,
        Damage,
        ArmorDamage,
        Speed,
    }

    impl ColumnSpec for Col {
        const ALL: &'static [Self] = &[Col::Name, Col::Damage, Col::ArmorDamage, Col::Speed];

        fn aliases(self) -> &'static [&'static str] {
            match self {
                Col::Name => &["name"],
                Col::Damage => &["damage"],
                Col::ArmorDamage => &["armor damage"],
                Col::Speed => &["projectile speed", "velocity"],
            }
        }
    }

    #[test]
    fn parse_all_reads_headers_cells_and_links() {
        let html = r#"
            <table>
              <tr><th>Icon</th><th>Name</th><th>Damage</th></tr>
              <tr>
                <th><img alt="icon.png" src="x"></th>
                <th><a href="/wiki/Round">Round  one</a></th>
                <td>45 (x8)</td>
              </tr>
            </table>"#;
        let tables = HtmlTable::parse_all(html).expect("parse");
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.headers(), vec!["Icon", "Name", "Damage"]);
        assert_eq!(table.data_rows().len(), 1);

        let row = &table.data_rows()[0];
        assert_eq!(row.header_cells().count(), 2);
        assert_eq!(row.data_cells().count(), 1);
        assert_eq!(row.cells[0].image_alt.as_deref(), Some("icon.png"));
        assert_eq!(row.cells[1].label(), "Round one");
        assert_eq!(row.cells[1].link_href.as_deref(), Some("/wiki/Round"));
        assert_eq!(row.cells[2].text, "45 (x8)");
    }

    #[test]
    fn nested_table_rows_are_not_attributed_to_the_outer_table() {
        let html = r#"
            <table>
              <tr><th>Outer</th></tr>
              <tr><td><table><tr><td>inner</td></tr></table></td></tr>
            </table>"#;
        let tables = HtmlTable::parse_all(html).expect("parse");
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[1].rows.len(), 1);
        assert_eq!(tables[1].rows[0].cells[0].text, "inner");
    }

    #[test]
    fn cell_lines_split_on_breaks_and_list_items() {
        let html = "<table><tr><td>1 Bolts<br>Level 2 Generator<ul><li>Skier LL2</li></ul></td></tr></table>";
        let table = HtmlTable::first(html).expect("parse").expect("table");
        assert_eq!(
            table.rows[0].cells[0].lines,
            vec!["1 Bolts", "Level 2 Generator", "Skier LL2"]
        );
    }

    #[test]
    fn column_map_prefers_exact_header_over_prefix() {
        let headers = vec![
            "Name".to_string(),
            "Armor damage %".to_string(),
            "Damage".to_string(),
            "Projectile speed (m/s)".to_string(),
        ];
        let columns = ColumnMap::<Col>::from_headers(&headers);
        assert_eq!(columns.position(Col::Name), Some(0));
        assert_eq!(columns.position(Col::ArmorDamage), Some(1));
        assert_eq!(columns.position(Col::Damage), Some(2));
        assert_eq!(columns.position(Col::Speed), Some(3));
        assert!(columns.missing().is_empty());
    }

    #[test]
    fn spanning_header_covers_the_icon_and_name_cells() {
        let html = r#"
            <table>
              <tr><th colspan="2">Name</th><th>Damage</th><th>Armor damage %</th></tr>
              <tr>
                <th><img alt="icon"></th><th><a>5.56x45mm M855</a></th><td>45</td><td>37</td>
              </tr>
              <tr><td colspan="2">Tracer rounds</td><td>40</td><td>33</td></tr>
            </table>"#;
        let table = HtmlTable::first(html).expect("parse").expect("table");
        assert_eq!(table.rows[0].cells[0].span, 2);

        let columns = table.columns::<Col>();
        assert_eq!(columns.position(Col::Name), Some(0));
        assert_eq!(columns.position(Col::Damage), Some(2));
        assert_eq!(columns.position(Col::ArmorDamage), Some(3));

        let first = &table.data_rows()[0];
        assert_eq!(columns.cell(first, Col::Name).map(Cell::label), Some("5.56x45mm M855"));
        assert_eq!(columns.text(first, Col::Damage), "45");
        assert_eq!(columns.text(first, Col::ArmorDamage), "37");

        let merged = &table.data_rows()[1];
        assert_eq!(columns.text(merged, Col::Name), "Tracer rounds");
        assert_eq!(columns.text(merged, Col::Damage), "40");
    }

    #[test]
    fn missing_column_yields_empty_text() {
        let columns = ColumnMap::<Col>::from_headers(&["Name".to_string()]);
        let row = TableRow::default();
        assert_eq!(columns.text(&row, Col::Damage), "");
        assert_eq!(columns.missing(), vec![Col::Damage, Col::ArmorDamage, Col::Speed]);
    }

    #[test]
    fn normalize_header_collapses_punctuation() {
        assert_eq!(normalize_header(" Light Bleed % "), "light bleed");
        assert_eq!(normalize_header("Projectile speed (m/s)"), "projectile speed m s");
    }

    #[test]
    fn document_text_includes_body_text() {
        let text = document_text("<html><body><h2>Air   Filtering Unit</h2></body></html>");
        assert!(text.contains("Air Filtering Unit"));
    }
}
