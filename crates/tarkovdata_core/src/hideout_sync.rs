//! Hideout sync. Station names and new stations/modules are applied; requirement
//! differences are only reported because the file stores item ids where the wiki shows
//! item names.

use std::collections::HashSet;
use std::io::Write;

use anyhow::Result;
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

use crate::apply::{ApplyOptions, ApplyOutcome, DatasetWrite, finish};
use crate::config::DataConfig;
use crate::confirm::Confirm;
use crate::diff::{FieldChange, field_changes};
use crate::fetch::PageFetcher;
use crate::hideout::{
    HideoutDatabase, ParsedRequirement, WikiHideout, WikiModule, WikiStation, fetch_hideout,
    module_level, module_requirements, station_name,
};
use crate::record::{Record, set_field};
use crate::runtime::{HIDEOUT_FILE, ResolvedPaths};
use crate::store::{self, JsonStyle};

#[derive(Debug, Clone, PartialEq)]
pub struct StationUpdate {
    pub index: usize,
    pub station_id: Option<i64>,
    pub name: String,
    pub changes: Vec<FieldChange>,
    pub updated: Record,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementNote {
    pub module: String,
    pub level: u32,
    pub local_count: usize,
    pub wiki_count: usize,
    /// `-`/`+` prefixed lines, local first.
    pub diff_lines: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HideoutSyncPlan {
    pub wiki_stations: usize,
    pub wiki_modules: usize,
    pub station_updates: Vec<StationUpdate>,
    pub new_stations: Vec<Record>,
    pub new_modules: Vec<Record>,
    pub requirement_notes: Vec<RequirementNote>,
    pub missing_modules: Vec<(String, u32)>,
}

impl HideoutSyncPlan {
    /// Notes and missing modules don't count as changes.
    pub fn has_changes(&self) -> bool {
        !self.station_updates.is_empty()
            || !self.new_stations.is_empty()
            || !self.new_modules.is_empty()
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for update in &self.station_updates {
            let id = update
                .station_id
                .map_or_else(|| "?".to_string(), |id| id.to_string());
            lines.push(format!("~ station {id} ({}):", update.name));
            for change in &update.changes {
                lines.push(format!("    {change}"));
            }
        }
        for station in &self.new_stations {
            let id = station.get("id").cloned().unwrap_or(Value::Null);
            lines.push(format!("+ station {id} ({})", station_name(station)));
        }
        for module in &self.new_modules {
            lines.push(format!(
                "+ module {} level {}",
                module.str("module"),
                module_level(module).unwrap_or(0)
            ));
        }
        for note in &self.requirement_notes {
            lines.push(format!(
                "! {} level {}: {} local requirements, {} on the wiki",
                note.module, note.level, note.local_count, note.wiki_count
            ));
            for line in &note.diff_lines {
                lines.push(format!("    {line}"));
            }
        }
        for (module, level) in &self.missing_modules {
            lines.push(format!("? {module} level {level} is not on the wiki"));
        }
        lines
    }
}

pub fn plan_hideout_sync(
    database: &HideoutDatabase,
    wiki: &WikiHideout,
) -> Result<HideoutSyncPlan> {
    let mut plan = HideoutSyncPlan {
        wiki_stations: wiki.stations.len(),
        wiki_modules: wiki.modules.len(),
        ..HideoutSyncPlan::default()
    };

    let mut next_id = database
        .stations
        .iter()
        .filter_map(|station| station.i64("id"))
        .max()
        .map_or(0, |id| id + 1);
    for wiki_station in &wiki.stations {
        match find_station(database, &wiki_station.name) {
            Some(index) => {
                let existing = &database.stations[index];
                if let Some(update) = station_update(index, existing, wiki_station)? {
                    plan.station_updates.push(update);
                }
            }
            None => {
                plan.new_stations.push(new_station(next_id, wiki_station));
                next_id += 1;
            }
        }
    }

    for wiki_module in &wiki.modules {
        match find_module(database, &wiki_module.name, wiki_module.level) {
            Some(existing) => {
                if module_requirements(existing).len() != wiki_module.requirements.len() {
                    let note = requirement_note(existing, wiki_module);
                    plan.requirement_notes.push(note);
                }
            }
            None => plan.new_modules.push(
                Record::new()
                    .with("module", wiki_module.name.as_str())
                    .with("level", wiki_module.level)
                    .with("require", Vec::<Value>::new()),
            ),
        }
    }

    let wiki_keys = wiki
        .modules
        .iter()
        .map(|module| (module.name.to_lowercase(), module.level))
        .collect::<HashSet<_>>();
    plan.missing_modules = database
        .modules
        .iter()
        .filter_map(|module| Some((module.str("module"), module_level(module)?)))
        .filter(|(name, level)| !wiki_keys.contains(&(name.to_lowercase(), *level)))
        .map(|(name, level)| (name.to_string(), level))
        .collect();

    Ok(plan)
}

pub fn apply_hideout_plan(database: &mut HideoutDatabase, plan: &HideoutSyncPlan) {
    for update in &plan.station_updates {
        if let Some(station) = database.stations.get_mut(update.index) {
            *station = update.updated.clone();
        }
    }
    database.stations.extend(plan.new_stations.iter().cloned());
    database.modules.extend(plan.new_modules.iter().cloned());
}

pub fn sync_hideout<F: PageFetcher>(
    paths: &ResolvedPaths,
    config: &DataConfig,
    fetcher: &mut F,
    confirm: &mut dyn Confirm,
    options: ApplyOptions,
    out: &mut dyn Write,
) -> Result<ApplyOutcome> {
    let path = paths.data_file(HIDEOUT_FILE);
    let mut database: HideoutDatabase = store::load_json(&path)?;
    let wiki = fetch_hideout(fetcher, config)?;
    let plan = plan_hideout_sync(&database, &wiki)?;

    writeln!(
        out,
        "wiki: {} stations, {} modules",
        plan.wiki_stations, plan.wiki_modules
    )?;
    for line in plan.summary_lines() {
        writeln!(out, "{line}")?;
    }

    apply_hideout_plan(&mut database, &plan);
    finish(
        DatasetWrite {
            path: &path,
            style: JsonStyle::FOUR_SPACES,
            question: format!("Apply these updates to {HIDEOUT_FILE}?"),
        },
        &database,
        plan.has_changes(),
        options,
        confirm,
        out,
    )
}

fn find_station(database: &HideoutDatabase, name: &str) -> Option<usize> {
    let name = name.to_lowercase();
    database
        .stations
        .iter()
        .position(|station| station_name(station).to_lowercase() == name)
}

fn find_module<'a>(database: &'a HideoutDatabase, name: &str, level: u32) -> Option<&'a Record> {
    let name = name.to_lowercase();
    database.modules.iter().find(|module| {
        module.str("module").to_lowercase() == name && module_level(module) == Some(level)
    })
}

/// Only the English locale follows the wiki; the page carries no station description.
fn station_update(
    index: usize,
    existing: &Record,
    wiki: &WikiStation,
) -> Result<Option<StationUpdate>> {
    let mut updated = existing.clone();
    let locales = updated.object_mut("locales")?;
    if !set_field(locales, "en", Value::from(wiki.name.as_str())) {
        return Ok(None);
    }
    Ok(Some(StationUpdate {
        index,
        station_id: existing.i64("id"),
        name: station_name(existing).to_string(),
        changes: field_changes(&existing.to_value(), &updated.to_value()),
        updated,
    }))
}

fn new_station(id: i64, wiki: &WikiStation) -> Record {
    let portrait = wiki.name.split_whitespace().collect::<Vec<_>>().join("_");
    Record::new()
        .with("id", id)
        .with("locales", Record::new().with("en", wiki.name.as_str()))
        .with("function", "")
        .with("imgSource", format!("/img/{portrait}_Portrait.png"))
        .with("disabled", false)
}

fn requirement_note(existing: &Record, wiki: &WikiModule) -> RequirementNote {
    let requirements = module_requirements(existing);
    let local = requirements
        .iter()
        .map(render_requirement)
        .collect::<Vec<_>>()
        .join("\n");
    let remote = wiki
        .requirements
        .iter()
        .map(render_parsed_requirement)
        .collect::<Vec<_>>()
        .join("\n");
    RequirementNote {
        module: existing.str("module").to_string(),
        level: wiki.level,
        local_count: requirements.len(),
        wiki_count: wiki.requirements.len(),
        diff_lines: line_diff(&local, &remote),
    }
}

fn line_diff(local: &str, remote: &str) -> Vec<String> {
    let diff = TextDiff::from_lines(local, remote);
    diff.iter_all_changes()
        .filter_map(|change| {
            let sign = match change.tag() {
                ChangeTag::Delete => "-",
                ChangeTag::Insert => "+",
                ChangeTag::Equal => return None,
            };
            Some(format!("{sign} {}", change.value().trim_end()))
        })
        .collect()
}

fn render_requirement(requirement: &Value) -> String {
    let field = |key: &str| match requirement.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    format!("{} {} x{}", field("type"), field("name"), field("quantity"))
}

fn render_parsed_requirement(requirement: &ParsedRequirement) -> String {
    format!(
        "{} {} x{}",
        requirement.kind.as_str(),
        requirement.name,
        requirement.quantity
    )
}
