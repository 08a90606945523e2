//! Ammunition sync: wiki rows per caliber, proposed database, diff, confirmed write.

use std::collections::HashSet;
use std::io::Write;

use anyhow::Result;
use tracing::{info, warn};

use crate::ammo::{
    AmmoDatabase, Ammunition, WikiAmmoRow, ammo_names, apply_wiki_row, fetch_caliber_ammo,
    find_by_name, load_ammo_database, new_ammunition,
};
use crate::apply::{ApplyOptions, ApplyOutcome, DatasetWrite, finish};
use crate::caliber::{CaliberInfo, fetch_caliber_list};
use crate::config::DataConfig;
use crate::confirm::Confirm;
use crate::diff::{ChangeKind, DatasetDiff, diff_records};
use crate::fetch::PageFetcher;
use crate::runtime::{AMMUNITION_FILE, ResolvedPaths};
use crate::store::JsonStyle;

#[derive(Debug, Clone, PartialEq)]
pub struct FailedCaliber {
    pub caliber: CaliberInfo,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct AmmoSyncPlan {
    pub calibers: usize,
    pub failed: Vec<FailedCaliber>,
    pub wiki_rows: usize,
    pub proposed: AmmoDatabase,
    pub diff: DatasetDiff,
}

impl AmmoSyncPlan {
    pub fn has_changes(&self) -> bool {
        !self.diff.is_empty()
    }

    pub fn summary_lines(&self, current: &AmmoDatabase) -> Vec<String> {
        let mut lines = Vec::new();
        for change in &self.diff.changes {
            match change.kind {
                ChangeKind::Added => {
                    let name = self.proposed.get(&change.key).map_or("", display_name);
                    lines.push(format!("+ {name} ({})", change.key));
                }
                ChangeKind::Modified => {
                    let name = current.get(&change.key).map_or("", display_name);
                    lines.push(format!("~ {} - {name}:", change.key));
                    for field in &change.fields {
                        lines.push(format!("    {field}"));
                    }
                }
                ChangeKind::Removed => {
                    let name = current.get(&change.key).map_or("", display_name);
                    lines.push(format!("- {name} ({})", change.key));
                }
            }
        }
        lines
    }
}

#[derive(Debug, Clone)]
pub enum AmmoSyncOutcome {
    Planned(AmmoSyncPlan),
    Cancelled,
}

/// A failed caliber asks whether to continue; declining cancels the whole plan.
pub fn plan_ammunition_sync<F, C>(
    database: &AmmoDatabase,
    calibers: &[CaliberInfo],
    fetcher: &mut F,
    confirm: &mut C,
) -> Result<AmmoSyncOutcome>
where
    F: PageFetcher,
    C: Confirm + ?Sized,
{
    let mut fetched = Vec::new();
    let mut failed = Vec::new();
    for caliber in calibers {
        match fetch_caliber_ammo(fetcher, caliber) {
            Ok(rows) => fetched.push((caliber.clone(), rows)),
            Err(error) => {
                let error = format!("{error:#}");
                warn!(caliber = %caliber.name, %error, "caliber fetch failed");
                failed.push(FailedCaliber {
                    caliber: caliber.clone(),
                    error,
                });
                if !confirm.confirm("Continue with other calibers?")? {
                    return Ok(AmmoSyncOutcome::Cancelled);
                }
            }
        }
    }

    let plan = build_plan(database, calibers.len(), &fetched, failed)?;
    info!(
        added = plan.diff.added,
        modified = plan.diff.modified,
        removed = plan.diff.removed,
        "ammunition plan ready"
    );
    Ok(AmmoSyncOutcome::Planned(plan))
}

pub fn build_plan(
    database: &AmmoDatabase,
    calibers: usize,
    fetched: &[(CaliberInfo, Vec<WikiAmmoRow>)],
    failed: Vec<FailedCaliber>,
) -> Result<AmmoSyncPlan> {
    let mut proposed = database.clone();
    let mut wiki_names = HashSet::new();
    let mut wiki_rows = 0;

    for (caliber, rows) in fetched {
        for row in rows {
            wiki_rows += 1;
            wiki_names.insert(row.name.clone());
            let matched = find_by_name(&proposed, &row.name).map(|(key, _)| key.clone());
            match matched.and_then(|key| proposed.get_mut(&key)) {
                Some(record) => apply_wiki_row(record, row, &caliber.caliber_id)?,
                None => {
                    let mut record = new_ammunition(row, &caliber.caliber_id);
                    let id = unique_id(&proposed, record.str("id"));
                    record.set("id", id.as_str());
                    proposed.insert(id, record);
                }
            }
        }
    }

    // With a failed caliber, its records would all look absent from the wiki.
    let fetched_calibers = fetched
        .iter()
        .map(|(caliber, _)| caliber.caliber_id.as_str())
        .collect::<HashSet<_>>();
    let removable = |ammo: &Ammunition| {
        !wiki_names.contains(ammo.str("name"))
            && (failed.is_empty() || fetched_calibers.contains(ammo.str("caliber")))
    };
    let to_remove = database
        .iter()
        .filter(|(_, ammo)| removable(ammo))
        .map(|(key, _)| key.clone())
        .collect::<Vec<_>>();
    for key in &to_remove {
        proposed.shift_remove(key);
    }

    let diff = diff_records(
        database.iter().map(|(key, ammo)| (key.clone(), ammo)),
        proposed.iter().map(|(key, ammo)| (key.clone(), ammo)),
    )?;

    Ok(AmmoSyncPlan {
        calibers,
        failed,
        wiki_rows,
        proposed,
        diff,
    })
}

/// A generated id already in use gets a numeric suffix instead of replacing that record.
fn unique_id(database: &AmmoDatabase, id: &str) -> String {
    if !database.contains_key(id) {
        return id.to_string();
    }
    let mut suffix = 2;
    while database.contains_key(&format!("{id}_{suffix}")) {
        suffix += 1;
    }
    let unique = format!("{id}_{suffix}");
    warn!(id, unique, "generated ammunition id already in use");
    unique
}

fn display_name(ammo: &Ammunition) -> &str {
    ammo_names(ammo).0
}

pub fn sync_ammunition<F: PageFetcher>(
    paths: &ResolvedPaths,
    config: &DataConfig,
    fetcher: &mut F,
    confirm: &mut dyn Confirm,
    options: ApplyOptions,
    out: &mut dyn Write,
) -> Result<ApplyOutcome> {
    let path = paths.data_file(AMMUNITION_FILE);
    let database = load_ammo_database(&path)?;
    writeln!(out, "Loaded {} ammunition records", database.len())?;

    let calibers = fetch_caliber_list(fetcher, config)?;
    if calibers.is_empty() {
        writeln!(out, "No calibers found on the wiki; nothing to do")?;
        return Ok(ApplyOutcome::NoChanges);
    }
    if !confirm.confirm(&format!("Found {} calibers. Continue?", calibers.len()))? {
        writeln!(out, "Cancelled")?;
        return Ok(ApplyOutcome::Cancelled);
    }

    let plan = match plan_ammunition_sync(&database, &calibers, fetcher, &mut *confirm)? {
        AmmoSyncOutcome::Planned(plan) => plan,
        AmmoSyncOutcome::Cancelled => {
            writeln!(out, "Cancelled")?;
            return Ok(ApplyOutcome::Cancelled);
        }
    };

    writeln!(
        out,
        "calibers: {} fetched, {} failed",
        plan.calibers - plan.failed.len(),
        plan.failed.len()
    )?;
    for failed in &plan.failed {
        writeln!(out, "  failed: {} ({})", failed.caliber.name, failed.error)?;
    }
    writeln!(out, "wiki rows: {}", plan.wiki_rows)?;
    writeln!(
        out,
        "changes: {} added, {} modified, {} removed",
        plan.diff.added, plan.diff.modified, plan.diff.removed
    )?;
    for line in plan.summary_lines(&database) {
        writeln!(out, "{line}")?;
    }

    finish(
        DatasetWrite {
            path: &path,
            style: JsonStyle::TWO_SPACES,
            question: format!("Apply these updates to {AMMUNITION_FILE}?"),
        },
        &plan.proposed,
        plan.has_changes(),
        options,
        confirm,
        out,
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::ammo::ballistic;
    use crate::caliber::AMMUNITION_PAGE;
    use crate::confirm::{AssumeYes, ScriptedConfirm};
    use crate::fetch::testing::StaticPages;
    use crate::record::Record;
    use crate::store::WriteOutcome;

    fn caliber(name: &str, id: &str) -> CaliberInfo {
        CaliberInfo {
            name: name.to_string(),
            wiki_url: format!("https://wiki.example/wiki/{}", name.replace(' ', "_")),
            caliber_id: id.to_string(),
        }
    }

    fn record(id: &str, name: &str, caliber: &str, damage: i64) -> Ammunition {
        Record::try_from(json!({
            "id": id,
            "name": name,
            "shortName": name.rsplit(' ').next().unwrap_or(name),
            "weight": 0.01,
            "caliber": caliber,
            "ballistics": {
                "damage": damage,
                "penetrationPower": 20,
                "accuracy": 0,
                "recoil": 0
            }
        }))
        .expect("object")
    }

    fn page(rows: &[(&str, &str, &str)]) -> String {
        let body = rows
            .iter()
            .map(|(name, damage, pen)| {
                format!("<tr><th></th><th>{name}</th><td>{damage}</td><td>{pen}</td></tr>")
            })
            .collect::<String>();
        let header = "<tr><th>Icon</th><th>Name</th><th>Damage</th><th>Penetration power</th></tr>";
        format!("<table>{header}{body}</table>")
    }

    fn database() -> AmmoDatabase {
        [
            record("a1", "5.56x45mm M855", "Caliber556x45NATO", 45),
            record("a2", "5.56x45mm Warmageddon", "Caliber556x45NATO", 88),
            record("b1", "7.62x39mm PS", "Caliber762x39", 57),
        ]
        .into_iter()
        .map(|ammo| (ammo.str("id").to_string(), ammo))
        .collect()
    }

    #[test]
    fn plan_updates_adds_and_removes() {
        let nato = caliber("5.56x45mm NATO", "Caliber556x45NATO");
        let short = caliber("7.62x39mm", "Caliber762x39");
        let mut pages = StaticPages::default()
            .with_page(
                &nato.wiki_url,
                &page(&[("5.56x45mm M855", "49", "31"), ("5.56x45mm SOST", "47", "37")]),
            )
            .with_page(&short.wiki_url, &page(&[("7.62x39mm PS", "57", "20")]));
        let mut confirm = ScriptedConfirm::new(&[]);

        let outcome = plan_ammunition_sync(
            &database(),
            &[nato, short],
            &mut pages,
            &mut confirm,
        )
        .expect("plan");
        let AmmoSyncOutcome::Planned(plan) = outcome else {
            panic!("expected a plan");
        };

        assert!(confirm.asked.is_empty());
        assert_eq!(plan.wiki_rows, 3);
        assert_eq!(plan.diff.added, 1);
        assert_eq!(plan.diff.modified, 1);
        assert_eq!(plan.diff.removed, 1);

        let modified = plan.diff.get("a1").expect("a1 modified");
        let fields = modified
            .fields
            .iter()
            .map(|field| field.field.as_str())
            .collect::<Vec<_>>();
        assert_eq!(fields, vec!["ballistics.damage", "ballistics.penetrationPower"]);
        assert_eq!(plan.diff.keys(ChangeKind::Removed).collect::<Vec<_>>(), vec!["a2"]);
        assert!(plan.proposed.contains_key("Caliber556x45NATO_5_56x45mm_sost"));
        assert!(!plan.proposed.contains_key("a2"));
        assert_eq!(plan.proposed.get_index(0).map(|(key, _)| key.as_str()), Some("a1"));
    }

    #[test]
    fn failed_caliber_asks_and_restricts_removal() {
        let nato = caliber("5.56x45mm NATO", "Caliber556x45NATO");
        let short = caliber("7.62x39mm", "Caliber762x39");
        let mut pages = StaticPages::default().with_page(
            &short.wiki_url,
            &page(&[("7.62x39mm PS", "57", "20")]),
        );
        let mut confirm = ScriptedConfirm::new(&[true]);

        let outcome = plan_ammunition_sync(&database(), &[nato, short], &mut pages, &mut confirm)
            .expect("plan");
        let AmmoSyncOutcome::Planned(plan) = outcome else {
            panic!("expected a plan");
        };
        assert_eq!(confirm.asked, vec!["Continue with other calibers?"]);
        assert_eq!(plan.failed.len(), 1);
        assert!(plan.failed[0].error.contains("HTTP 404"));
        assert!(plan.diff.is_empty());
        assert_eq!(plan.proposed.len(), 3);
    }

    #[test]
    fn declining_after_failure_cancels() {
        let nato = caliber("5.56x45mm NATO", "Caliber556x45NATO");
        let mut pages = StaticPages::default();
        let mut confirm = ScriptedConfirm::new(&[false]);
        let outcome = plan_ammunition_sync(&database(), &[nato], &mut pages, &mut confirm)
            .expect("plan");
        assert!(matches!(outcome, AmmoSyncOutcome::Cancelled));
    }

    #[test]
    fn up_to_date_database_has_no_changes() {
        let fetched = vec![
            (
                caliber("5.56x45mm NATO", "Caliber556x45NATO"),
                vec![
                    WikiAmmoRow {
                        name: "5.56x45mm M855".to_string(),
                        damage: 45,
                        penetration: 20,
                        ..WikiAmmoRow::default()
                    },
                    WikiAmmoRow {
                        name: "5.56x45mm Warmageddon".to_string(),
                        damage: 88,
                        ..WikiAmmoRow::default()
                    },
                ],
            ),
            (
                caliber("7.62x39mm", "Caliber762x39"),
                vec![WikiAmmoRow {
                    name: "7.62x39mm PS".to_string(),
                    damage: 57,
                    ..WikiAmmoRow::default()
                }],
            ),
        ];
        let current = database();
        let plan = build_plan(&current, 2, &fetched, Vec::new()).expect("plan");
        assert!(!plan.has_changes());
        assert!(plan.summary_lines(&current).is_empty());
    }

    #[test]
    fn matched_sparse_record_only_changes_the_fields_that_differ() {
        let current: AmmoDatabase = [(
            "x".to_string(),
            Record::try_from(json!({
                "id": "x",
                "name": "9x19mm PSO gzh",
                "caliber": "Caliber9x19PARA",
                "ballistics": {"damage": 59}
            }))
            .expect("object"),
        )]
        .into_iter()
        .collect();
        let fetched = vec![(
            caliber("9x19mm Parabellum", "Caliber9x19PARA"),
            vec![WikiAmmoRow {
                name: "9x19mm PSO gzh".to_string(),
                damage: 59,
                accuracy_modifier: "+5".to_string(),
                ..WikiAmmoRow::default()
            }],
        )];

        let plan = build_plan(&current, 1, &fetched, Vec::new()).expect("plan");
        let change = plan.diff.get("x").expect("x modified");
        let fields = change
            .fields
            .iter()
            .map(|field| field.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            fields,
            vec!["ballistics.accuracy: <none> → 5", "ballistics.recoil: <none> → 0"]
        );
        let written = serde_json::to_string(&plan.proposed["x"]).expect("json");
        let expected = json!({
            "id": "x",
            "name": "9x19mm PSO gzh",
            "caliber": "Caliber9x19PARA",
            "ballistics": {"damage": 59, "accuracy": 5, "recoil": 0}
        });
        assert_eq!(written, expected.to_string());
    }

    #[test]
    fn generated_id_collision_gets_a_suffix() {
        let mut current = database();
        let taken = record(
            "Caliber556x45NATO_5_56x45mm_sost",
            "5.56x45mm SOST (old)",
            "Caliber556x45NATO",
            47,
        );
        current.insert(taken.str("id").to_string(), taken);
        let fetched = vec![(
            caliber("5.56x45mm NATO", "Caliber556x45NATO"),
            vec![
                WikiAmmoRow {
                    name: "5.56x45mm SOST".to_string(),
                    damage: 47,
                    ..WikiAmmoRow::default()
                },
                WikiAmmoRow {
                    name: "5.56x45mm SOST (old)".to_string(),
                    damage: 47,
                    ..WikiAmmoRow::default()
                },
            ],
        )];

        let plan = build_plan(&current, 1, &fetched, Vec::new()).expect("plan");
        let added = plan.diff.keys(ChangeKind::Added).collect::<Vec<_>>();
        assert_eq!(added, vec!["Caliber556x45NATO_5_56x45mm_sost_2"]);
        assert_eq!(
            plan.proposed["Caliber556x45NATO_5_56x45mm_sost_2"].str("id"),
            "Caliber556x45NATO_5_56x45mm_sost_2"
        );
        assert_eq!(
            plan.proposed["Caliber556x45NATO_5_56x45mm_sost"].str("name"),
            "5.56x45mm SOST (old)"
        );
    }

    const AMMUNITION_JSON: &str = r#"{
  "a1": {
    "id": "a1",
    "name": "5.56x45mm M855",
    "caliber": "Caliber556x45NATO",
    "ballistics": {
      "damage": 45
    }
  }
}"#;

    fn sync_fixture() -> (tempfile::TempDir, ResolvedPaths, DataConfig, StaticPages) {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_root(temp.path());
        fs::create_dir_all(&paths.data_dir).expect("data dir");
        fs::write(paths.data_file(AMMUNITION_FILE), AMMUNITION_JSON).expect("write");

        let config = DataConfig::default();
        let list = r#"<table>
            <tr><th>Icon</th><th>Caliber</th></tr>
            <tr><td></td><td><a href="/wiki/5.56x45mm_NATO">5.56x45mm NATO</a></td></tr>
        </table>"#;
        let pages = StaticPages::default()
            .with_page(&config.page_url(AMMUNITION_PAGE), list)
            .with_page(
                &config.page_url("5.56x45mm_NATO"),
                &page(&[("5.56x45mm M855", "49", "31")]),
            );
        (temp, paths, config, pages)
    }

    #[test]
    fn declining_the_write_leaves_the_file_byte_identical() {
        let (_temp, paths, config, mut pages) = sync_fixture();
        let mut confirm = ScriptedConfirm::new(&[true, false]);
        let mut out = Vec::new();

        let outcome = sync_ammunition(
            &paths,
            &config,
            &mut pages,
            &mut confirm,
            ApplyOptions::default(),
            &mut out,
        )
        .expect("sync");
        assert_eq!(outcome, ApplyOutcome::Cancelled);
        assert_eq!(
            confirm.asked,
            vec![
                "Found 1 calibers. Continue?",
                "Apply these updates to ammunition.json?"
            ]
        );
        let on_disk = fs::read_to_string(paths.data_file(AMMUNITION_FILE)).expect("read");
        assert_eq!(on_disk, AMMUNITION_JSON);
        let report = String::from_utf8(out).expect("utf8");
        assert!(report.contains("~ a1 - 5.56x45mm M855:"));
        assert!(report.contains("ballistics.damage: 45 → 49"));
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let (_temp, paths, config, mut pages) = sync_fixture();
        let mut confirm = ScriptedConfirm::new(&[true]);
        let mut out = Vec::new();

        let outcome = sync_ammunition(
            &paths,
            &config,
            &mut pages,
            &mut confirm,
            ApplyOptions { dry_run: true },
            &mut out,
        )
        .expect("sync");
        assert_eq!(outcome, ApplyOutcome::DryRun);
        assert_eq!(confirm.asked.len(), 1);
        let on_disk = fs::read_to_string(paths.data_file(AMMUNITION_FILE)).expect("read");
        assert_eq!(on_disk, AMMUNITION_JSON);
    }

    #[test]
    fn assume_yes_writes_the_updated_record_in_place() {
        let (_temp, paths, config, mut pages) = sync_fixture();
        let mut out = Vec::new();

        let outcome = sync_ammunition(
            &paths,
            &config,
            &mut pages,
            &mut AssumeYes,
            ApplyOptions::default(),
            &mut out,
        )
        .expect("sync");
        assert_eq!(outcome, ApplyOutcome::Saved(WriteOutcome::Written));

        let database = load_ammo_database(&paths.data_file(AMMUNITION_FILE)).expect("reload");
        let record = &database["a1"];
        assert_eq!(ballistic(record, "damage"), Some(49.0));
        assert_eq!(ballistic(record, "penetrationPower"), Some(31.0));
        let keys = record.as_map().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["id", "name", "caliber", "ballistics"]);
    }
}
