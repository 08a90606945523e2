use std::io::Write;

use anyhow::{Result, bail};
use serde_json::Value;
use tracing::{debug, info};

use crate::apply::{ApplyOptions, ApplyOutcome, DatasetWrite, finish};
use crate::config::DataConfig;
use crate::confirm::Confirm;
use crate::diff::{ChangeKind, DatasetDiff, diff_records, display_value};
use crate::fetch::PageFetcher;
use crate::record::Record;
use crate::runtime::{LEVELS_FILE, ResolvedPaths};
use crate::store::{self, JsonStyle};
use crate::table::{ColumnSpec, HtmlTable};
use crate::values::{parse_grouped_int, parse_leading_int};

pub const EXPERIENCE_PAGE: &str = "Experience";

pub type LevelsDatabase = Record;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelData {
    pub level: u32,
    pub exp: i64,
    pub total: i64,
    pub group: String,
}

/// Levels 1-4 are group 1, then every five levels start a new group.
pub fn level_group(level: u32) -> String {
    if level < 5 {
        "1".to_string()
    } else {
        (level / 5 + 1).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelColumn {
    Level,
    Experience,
    Total,
}

impl ColumnSpec for LevelColumn {
    const ALL: &'static [Self] = &[Self::Level, Self::Experience, Self::Total];

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Level => &["level", "lvl"],
            Self::Experience => &["experience", "exp", "experience to next level"],
            Self::Total => &["total experience", "total", "total exp"],
        }
    }
}

/// First table with level and total columns. Missing per-level experience is derived from
/// the difference between consecutive totals.
pub fn parse_level_table(html: &str) -> Result<Vec<LevelData>> {
    for table in HtmlTable::parse_all(html)? {
        let columns = table.columns::<LevelColumn>();
        if !columns.contains(LevelColumn::Level) || !columns.contains(LevelColumn::Total) {
            continue;
        }

        let mut levels = Vec::new();
        let mut previous_total = 0;
        for row in table.data_rows() {
            let level = parse_leading_int(columns.text(row, LevelColumn::Level));
            let Ok(level) = u32::try_from(level) else {
                continue;
            };
            if level < 1 {
                debug!(row = %row.text(), "skipping level row");
                continue;
            }
            let total = parse_number(columns.text(row, LevelColumn::Total));
            let exp = if columns.contains(LevelColumn::Experience) {
                parse_number(columns.text(row, LevelColumn::Experience))
            } else {
                total - previous_total
            };
            previous_total = total;
            levels.push(LevelData {
                level,
                exp,
                total,
                group: level_group(level),
            });
        }
        if !levels.is_empty() {
            return Ok(levels);
        }
    }
    Ok(Vec::new())
}

fn parse_number(text: &str) -> i64 {
    let trimmed = text.trim();
    let token = trimmed.split_whitespace().next().unwrap_or("");
    parse_grouped_int(token).unwrap_or_else(|| parse_leading_int(trimmed))
}

pub fn fetch_levels<F: PageFetcher>(
    fetcher: &mut F,
    config: &DataConfig,
) -> Result<Vec<LevelData>> {
    let html = fetcher.fetch_page(&config.page_url(EXPERIENCE_PAGE))?;
    let levels = parse_level_table(&html)?;
    if levels.is_empty() {
        bail!("no level data found on the {EXPERIENCE_PAGE} page");
    }
    info!(count = levels.len(), "parsed level table");
    Ok(levels)
}

/// Follows the wiki's level order. Existing entries are patched in place, so fields other
/// than `exp`, `total` and `group` survive; levels missing from the wiki are dropped.
pub fn levels_to_database(current: &LevelsDatabase, levels: &[LevelData]) -> LevelsDatabase {
    let mut fresh = Record::new();
    for level in levels {
        let key = level.level.to_string();
        let mut entry = match current.get(&key) {
            Some(Value::Object(fields)) => Record::from(fields.clone()),
            _ => Record::new(),
        };
        entry.set("exp", level.exp);
        entry.set("total", level.total);
        entry.set("group", level.group.as_str());
        fresh.set(&key, entry);
    }
    fresh
}

#[derive(Debug, Clone)]
pub struct LevelsSyncPlan {
    pub fresh: LevelsDatabase,
    pub diff: DatasetDiff,
}

impl LevelsSyncPlan {
    pub fn has_changes(&self) -> bool {
        !self.diff.is_empty()
    }

    pub fn summary_lines(&self, current: &LevelsDatabase) -> Vec<String> {
        let mut lines = Vec::new();
        for change in &self.diff.changes {
            match change.kind {
                ChangeKind::Added => lines.push(format!(
                    "+ Level {}: {}",
                    change.key,
                    describe_level(&self.fresh, &change.key)
                )),
                ChangeKind::Modified => {
                    lines.push(format!("~ Level {}:", change.key));
                    for field in &change.fields {
                        lines.push(format!("    {field}"));
                    }
                }
                ChangeKind::Removed => lines.push(format!(
                    "- Level {}: {}",
                    change.key,
                    describe_level(current, &change.key)
                )),
            }
        }
        lines
    }
}

fn describe_level(database: &LevelsDatabase, key: &str) -> String {
    let Some(entry) = database.object(key) else {
        return String::new();
    };
    format!(
        "exp={}, total={}, group={}",
        display_value(entry.get("exp")),
        display_value(entry.get("total")),
        display_value(entry.get("group"))
    )
}

/// An empty table is refused rather than emptying the file.
pub fn plan_levels_sync(current: &LevelsDatabase, levels: &[LevelData]) -> Result<LevelsSyncPlan> {
    if levels.is_empty() {
        bail!("refusing to sync levels from an empty table");
    }
    let fresh = levels_to_database(current, levels);
    let diff = diff_records(level_entries(current), level_entries(&fresh))?;
    Ok(LevelsSyncPlan { fresh, diff })
}

fn level_entries(database: &LevelsDatabase) -> Vec<(String, &Value)> {
    database
        .as_map()
        .iter()
        .map(|(key, entry)| (key.clone(), entry))
        .collect()
}

/// A missing `levels.json` counts as empty.
pub fn sync_levels<F: PageFetcher>(
    paths: &ResolvedPaths,
    config: &DataConfig,
    fetcher: &mut F,
    confirm: &mut dyn Confirm,
    options: ApplyOptions,
    out: &mut dyn Write,
) -> Result<ApplyOutcome> {
    let path = paths.data_file(LEVELS_FILE);
    let current: LevelsDatabase = if path.exists() {
        store::load_json(&path)?
    } else {
        LevelsDatabase::new()
    };
    let levels = fetch_levels(fetcher, config)?;
    let plan = plan_levels_sync(&current, &levels)?;

    writeln!(out, "wiki levels: {}", plan.fresh.len())?;
    writeln!(
        out,
        "changes: {} added, {} modified, {} removed",
        plan.diff.added, plan.diff.modified, plan.diff.removed
    )?;
    for line in plan.summary_lines(&current) {
        writeln!(out, "{line}")?;
    }

    finish(
        DatasetWrite {
            path: &path,
            style: JsonStyle::FOUR_SPACES,
            question: "Do you want to apply these changes?".to_string(),
        },
        &plan.fresh,
        plan.has_changes(),
        options,
        confirm,
        out,
    )
}
