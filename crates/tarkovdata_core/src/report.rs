//! Read-only comparison of the ammunition file against the wiki.

use std::collections::{BTreeSet, HashSet};

use anyhow::Result;
use tracing::warn;

use crate::ammo::{AmmoDatabase, fetch_caliber_ammo, has_ballistics};
use crate::caliber::CaliberInfo;
use crate::fetch::PageFetcher;

#[derive(Debug, Clone, PartialEq)]
pub struct CaliberCoverage {
    pub caliber: CaliberInfo,
    pub wiki_count: usize,
    pub missing: Vec<String>,
}

impl CaliberCoverage {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingReport {
    pub total_in_file: usize,
    /// Records without a name or without ballistics.
    pub empty_entries: usize,
    pub calibers_in_file: BTreeSet<String>,
    pub calibers_on_wiki: BTreeSet<String>,
    pub missing_calibers: Vec<String>,
    pub total_on_wiki: usize,
    pub coverage: Vec<CaliberCoverage>,
    pub failed: Vec<(String, String)>,
}

impl MissingReport {
    pub fn complete_entries(&self) -> usize {
        self.total_in_file - self.empty_entries
    }

    pub fn missing_from_file(&self) -> impl Iterator<Item = &str> {
        self.coverage
            .iter()
            .flat_map(|entry| entry.missing.iter().map(String::as_str))
    }
}

/// Builds the report. A caliber page that cannot be fetched is logged and skipped.
pub fn report_missing<F: PageFetcher>(
    database: &AmmoDatabase,
    calibers: &[CaliberInfo],
    fetcher: &mut F,
) -> Result<MissingReport> {
    let mut report = MissingReport {
        total_in_file: database.len(),
        ..MissingReport::default()
    };
    for ammo in database.values() {
        let caliber = ammo.str("caliber");
        if !caliber.is_empty() {
            report.calibers_in_file.insert(caliber.to_string());
        }
        if ammo.str("name").is_empty() || !has_ballistics(ammo) {
            report.empty_entries += 1;
        }
    }
    let file_names = database
        .values()
        .map(|ammo| ammo.str("name"))
        .filter(|name| !name.is_empty())
        .collect::<HashSet<_>>();

    for caliber in calibers {
        report.calibers_on_wiki.insert(caliber.caliber_id.clone());
        let rows = match fetch_caliber_ammo(fetcher, caliber) {
            Ok(rows) => rows,
            Err(error) => {
                let error = format!("{error:#}");
                warn!(caliber = %caliber.name, %error, "skipping caliber");
                report
                    .failed
                    .push((caliber.name.clone(), error));
                continue;
            }
        };
        report.total_on_wiki += rows.len();
        report.coverage.push(CaliberCoverage {
            caliber: caliber.clone(),
            wiki_count: rows.len(),
            missing: rows
                .iter()
                .filter(|row| !file_names.contains(row.name.as_str()))
                .map(|row| row.name.clone())
                .collect(),
        });
    }

    report.missing_calibers = report
        .calibers_on_wiki
        .iter()
        .filter(|id| !report.calibers_in_file.contains(*id))
        .cloned()
        .collect();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fetch::testing::StaticPages;

    #[test]
    fn report_counts_gaps_and_skips_failed_calibers() {
        let database: AmmoDatabase = serde_json::from_value(json!({
            "a": {
                "id": "a",
                "name": "9x19mm PSO gzh",
                "caliber": "Caliber9x19PARA",
                "ballistics": {"damage": 59}
            },
            "b": {"id": "b", "name": "", "caliber": "Caliber9x19PARA", "ballistics": {}},
            "c": {"id": "c", "name": "Orphan round", "caliber": "Caliber9x18PM"}
        }))
        .expect("database");
        let para = CaliberInfo {
            name: "9x19mm Parabellum".to_string(),
            wiki_url: "https://wiki.example/wiki/9x19mm_Parabellum".to_string(),
            caliber_id: "Caliber9x19PARA".to_string(),
        };
        let tokarev = CaliberInfo {
            name: "7.62x25mm Tokarev".to_string(),
            wiki_url: "https://wiki.example/wiki/7.62x25mm_Tokarev".to_string(),
            caliber_id: "Caliber762x25TT".to_string(),
        };
        let html = "<table><tr><th>Icon</th><th>Name</th><th>Damage</th></tr>\
            <tr><th></th><th>9x19mm PSO gzh</th><td>59</td></tr>\
            <tr><th></th><th>9x19mm Luger CCI</th><td>70</td></tr></table>";
        let mut pages = StaticPages::default().with_page(&para.wiki_url, html);

        let report = report_missing(&database, &[para, tokarev], &mut pages).expect("report");
        assert_eq!(report.total_in_file, 3);
        assert_eq!(report.empty_entries, 2);
        assert_eq!(report.complete_entries(), 1);
        assert_eq!(report.total_on_wiki, 2);
        assert_eq!(
            report.missing_from_file().collect::<Vec<_>>(),
            vec!["9x19mm Luger CCI"]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.missing_calibers, vec!["Caliber762x25TT"]);
        assert_eq!(report.calibers_in_file.len(), 2);
    }
}
