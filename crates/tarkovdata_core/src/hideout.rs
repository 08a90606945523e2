use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::DataConfig;
use crate::fetch::PageFetcher;
use crate::record::Record;
use crate::table::{ColumnMap, ColumnSpec, HtmlTable, document_text};
use crate::values::{parse_grouped_int, parse_leading_int};

pub const HIDEOUT_PAGE: &str = "Hideout";

pub const HIDEOUT_STATIONS: &[&str] = &[
    "Air Filtering Unit",
    "Bitcoin farm",
    "Booze generator",
    "Cultist Circle",
    "Defective Wall",
    "Gear Rack",
    "Generator",
    "Gym",
    "Hall of Fame",
    "Heating",
    "Illumination",
    "Intelligence Center",
    "Lavatory",
    "Library",
    "Medstation",
    "Nutrition Unit",
    "Rest Space",
    "Scav Case",
    "Security",
    "Shooting range",
    "Solar power",
    "Stash",
    "Vents",
    "Water collector",
    "Weapon Rack",
    "Workbench",
    "Christmas Tree",
];

/// `stations` and `modules` are split out for editing. Every other key, and the position of
/// both arrays, is kept from the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Record", into = "Record")]
pub struct HideoutDatabase {
    pub stations: Vec<Record>,
    pub modules: Vec<Record>,
    layout: Record,
}

impl TryFrom<Record> for HideoutDatabase {
    type Error = anyhow::Error;

    fn try_from(mut layout: Record) -> Result<Self> {
        let stations = take_records(&mut layout, "stations")?;
        let modules = take_records(&mut layout, "modules")?;
        Ok(Self {
            stations,
            modules,
            layout,
        })
    }
}

impl From<HideoutDatabase> for Record {
    fn from(database: HideoutDatabase) -> Self {
        let HideoutDatabase {
            stations,
            modules,
            mut layout,
        } = database;
        for (key, records) in [("stations", stations), ("modules", modules)] {
            if layout.contains(key) || !records.is_empty() {
                layout.set(key, records.into_iter().map(Value::from).collect::<Vec<_>>());
            }
        }
        layout
    }
}

fn take_records(layout: &mut Record, key: &str) -> Result<Vec<Record>> {
    match layout.take(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(Record::try_from)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("invalid entry in hideout `{key}`")),
        Some(_) => bail!("hideout `{key}` is not an array"),
    }
}

pub fn station_name(station: &Record) -> &str {
    station
        .object("locales")
        .and_then(|locales| locales.get("en"))
        .and_then(Value::as_str)
        .unwrap_or("")
}

pub fn module_level(module: &Record) -> Option<u32> {
    module
        .i64("level")
        .and_then(|level| u32::try_from(level).ok())
}

pub fn module_requirements(module: &Record) -> &[Value] {
    module
        .get("require")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    Module,
    Trader,
    Skill,
    Item,
}

impl RequirementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Trader => "trader",
            Self::Skill => "skill",
            Self::Item => "item",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequirement {
    pub kind: RequirementKind,
    pub name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiStation {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiModule {
    pub name: String,
    pub level: u32,
    pub requirements: Vec<ParsedRequirement>,
    pub bonuses: String,
    pub construction_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WikiHideout {
    pub stations: Vec<WikiStation>,
    pub modules: Vec<WikiModule>,
}

pub struct RequirementParser {
    found_in_raid: Regex,
    module: Regex,
    trader: Regex,
    skill: Regex,
    item: Regex,
}

impl RequirementParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            found_in_raid: Regex::new(r"(?i)\s*found in raid\s*")
                .context("invalid found-in-raid pattern")?,
            module: Regex::new(r"(?i)^Level\s+(\d+)\s+(.+)").context("invalid module pattern")?,
            trader: Regex::new(r"(?i)^(.+?)\s+(?:LL|Loyalty Level)\s*(\d+)")
                .context("invalid trader pattern")?,
            skill: Regex::new(r"(?i)^(.+?)\s+Level\s+(\d+)").context("invalid skill pattern")?,
            item: Regex::new(r"^([\d,]+)\s+(.+)").context("invalid item pattern")?,
        })
    }

    /// `Level 3 Generator` → module, `Skier LL3` → trader, `Endurance Level 2` → skill,
    /// `25,000 Dollars` → item. Anything else is dropped.
    pub fn parse_line(&self, line: &str) -> Option<ParsedRequirement> {
        let cleaned = self.found_in_raid.replace_all(line, " ");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return None;
        }

        if let Some(captures) = self.module.captures(cleaned) {
            return Some(ParsedRequirement {
                kind: RequirementKind::Module,
                name: captures[2].trim().to_string(),
                quantity: parse_leading_int(&captures[1]),
            });
        }
        if let Some(captures) = self.trader.captures(cleaned) {
            return Some(ParsedRequirement {
                kind: RequirementKind::Trader,
                name: captures[1].trim().to_string(),
                quantity: parse_leading_int(&captures[2]),
            });
        }
        if let Some(captures) = self.skill.captures(cleaned) {
            let name = captures[1].trim();
            if !name.contains("LL") && !HIDEOUT_STATIONS.contains(&name) {
                return Some(ParsedRequirement {
                    kind: RequirementKind::Skill,
                    name: name.to_string(),
                    quantity: parse_leading_int(&captures[2]),
                });
            }
        }
        if let Some(captures) = self.item.captures(cleaned) {
            return Some(ParsedRequirement {
                kind: RequirementKind::Item,
                name: captures[2].trim().to_string(),
                quantity: parse_grouped_int(&captures[1]).unwrap_or(0),
            });
        }
        debug!(line = cleaned, "unrecognised requirement line");
        None
    }

    pub fn parse_lines<'a, I>(&self, lines: I) -> Vec<ParsedRequirement>
    where
        I: IntoIterator<Item = &'a String>,
    {
        lines
            .into_iter()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleColumn {
    Level,
    Requirements,
    Bonuses,
    ConstructionTime,
}

impl ColumnSpec for ModuleColumn {
    const ALL: &'static [Self] = &[
        Self::Level,
        Self::Requirements,
        Self::Bonuses,
        Self::ConstructionTime,
    ];

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Level => &["level"],
            Self::Requirements => &["requirements", "requirement"],
            Self::Bonuses => &["function", "bonuses", "bonus", "effect"],
            Self::ConstructionTime => &["construction time", "time"],
        }
    }
}

/// Known stations whose name appears anywhere in the page text.
pub fn parse_stations(html: &str) -> Vec<WikiStation> {
    let text = document_text(html);
    HIDEOUT_STATIONS
        .iter()
        .filter(|station| text.contains(**station))
        .map(|station| WikiStation {
            name: (*station).to_string(),
        })
        .collect()
}

/// Module upgrade tables: the first row names a known station and the second row carries
/// `Level` and `Requirements` headers. Data rows follow.
pub fn parse_modules(html: &str) -> Result<Vec<WikiModule>> {
    let parser = RequirementParser::new()?;
    let mut modules = Vec::new();

    for table in HtmlTable::parse_all(html)? {
        let Some(first_row) = table.rows.first() else {
            continue;
        };
        let first_text = first_row.text();
        let Some(station) = HIDEOUT_STATIONS
            .iter()
            .find(|station| first_text.contains(**station))
        else {
            continue;
        };
        let Some(header_row) = table.rows.get(1) else {
            continue;
        };
        let columns = ColumnMap::<ModuleColumn>::from_header_row(header_row);
        if !columns.contains(ModuleColumn::Level) || !columns.contains(ModuleColumn::Requirements) {
            continue;
        }

        for row in table.rows.iter().skip(2) {
            let level = parse_leading_int(columns.text(row, ModuleColumn::Level));
            if level < 1 {
                continue;
            }
            let Some(requirements_cell) = columns.cell(row, ModuleColumn::Requirements) else {
                debug!(station, level, "module row without requirements cell");
                continue;
            };
            modules.push(WikiModule {
                name: (*station).to_string(),
                level: u32::try_from(level).unwrap_or(u32::MAX),
                requirements: parser.parse_lines(&requirements_cell.lines),
                bonuses: columns.text(row, ModuleColumn::Bonuses).to_string(),
                construction_time: columns
                    .text(row, ModuleColumn::ConstructionTime)
                    .to_string(),
            });
        }
    }
    Ok(modules)
}

pub fn fetch_hideout<F: PageFetcher>(fetcher: &mut F, config: &DataConfig) -> Result<WikiHideout> {
    let html = fetcher.fetch_page(&config.page_url(HIDEOUT_PAGE))?;
    let hideout = WikiHideout {
        stations: parse_stations(&html),
        modules: parse_modules(&html)?,
    };
    info!(
        stations = hideout.stations.len(),
        modules = hideout.modules.len(),
        "parsed hideout page"
    );
    Ok(hideout)
}
