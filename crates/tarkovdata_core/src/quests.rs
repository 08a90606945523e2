//! Quest storyline migration: trader-gated quests require the storyline objective that
//! unlocks their trader instead of a generic storyline flag.

use std::io::Write;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::apply::{ApplyOptions, ApplyOutcome, DatasetWrite, finish};
use crate::confirm::Confirm;
use crate::record::{Record, set_field};
use crate::runtime::{QUESTS_FILE, ResolvedPaths};
use crate::store::{self, JsonStyle};

pub const TRADER_STORYLINE_OBJECTIVES: &[(i64, &str)] = &[
    (0, "tour_obj_12"),
    (1, "tour_obj_2"),
    (2, "tour_obj_5"),
    (3, "tour_obj_15"),
    (4, "tour_obj_9"),
    (5, "tour_obj_4"),
];

pub type Quest = Record;

#[derive(Debug, Clone, PartialEq)]
pub struct StorylineChange {
    pub quest_id: String,
    pub title: String,
    pub giver: i64,
    pub objective: String,
    pub removed_storyline: Option<Value>,
    pub previous_objective: Option<String>,
}

pub fn storyline_objective_for(giver: i64) -> Option<&'static str> {
    TRADER_STORYLINE_OBJECTIVES
        .iter()
        .find(|(trader, _)| *trader == giver)
        .map(|(_, objective)| *objective)
}

/// Only `require.storyline` and `require.storylineObjective` are touched. A quest that is
/// already migrated is left alone, so a second run reports nothing.
pub fn migrate_storylines(quests: &mut [Quest]) -> Result<Vec<StorylineChange>> {
    let mut changes = Vec::new();
    for quest in quests.iter_mut() {
        let Some(giver) = quest.i64("giver") else {
            continue;
        };
        let Some(objective) = storyline_objective_for(giver) else {
            continue;
        };
        let quest_id = match quest.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let title = quest.str("title").to_string();

        let require = quest
            .object_mut("require")
            .with_context(|| format!("quest {quest_id} has a malformed require"))?;
        let previous_objective = require
            .get("storylineObjective")
            .and_then(Value::as_str)
            .map(str::to_string);
        let removed_storyline = require.shift_remove("storyline");
        let objective_changed = set_field(require, "storylineObjective", Value::from(objective));
        if removed_storyline.is_none() && !objective_changed {
            continue;
        }
        changes.push(StorylineChange {
            quest_id,
            title,
            giver,
            objective: objective.to_string(),
            removed_storyline,
            previous_objective,
        });
    }
    Ok(changes)
}

pub fn migrate_quest_storylines(
    paths: &ResolvedPaths,
    confirm: &mut dyn Confirm,
    options: ApplyOptions,
    out: &mut dyn Write,
) -> Result<ApplyOutcome> {
    let path = paths.data_file(QUESTS_FILE);
    let mut quests: Vec<Quest> = store::load_json(&path)?;
    let changes = migrate_storylines(&mut quests)?;

    for change in &changes {
        let previous = change.previous_objective.as_deref().unwrap_or("<none>");
        writeln!(
            out,
            "~ quest {} ({}) giver {}: storylineObjective {previous} → {}",
            change.quest_id, change.title, change.giver, change.objective
        )?;
    }
    writeln!(out, "quests updated: {}", changes.len())?;

    finish(
        DatasetWrite {
            path: &path,
            style: JsonStyle::TWO_SPACES,
            question: format!("Write {} updated quests to {QUESTS_FILE}?", changes.len()),
        },
        &quests,
        !changes.is_empty(),
        options,
        confirm,
        out,
    )
}
