//! The confirm-then-write step at the end of every sync and migrate command.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::confirm::Confirm;
use crate::runtime::normalize_for_display;
use crate::store::{self, JsonStyle, WriteOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    NoChanges,
    DryRun,
    Cancelled,
    Saved(WriteOutcome),
}

impl ApplyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoChanges => "no changes",
            Self::DryRun => "dry run",
            Self::Cancelled => "cancelled",
            Self::Saved(outcome) => outcome.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetWrite<'a> {
    pub path: &'a Path,
    pub style: JsonStyle,
    pub question: String,
}

/// Nothing is written without changes, on a dry run, or when the question is declined.
pub fn finish<T: Serialize>(
    target: DatasetWrite<'_>,
    value: &T,
    has_changes: bool,
    options: ApplyOptions,
    confirm: &mut dyn Confirm,
    out: &mut dyn Write,
) -> Result<ApplyOutcome> {
    let display = normalize_for_display(target.path);
    if !has_changes {
        writeln!(out, "No changes")?;
        return Ok(ApplyOutcome::NoChanges);
    }
    if options.dry_run {
        writeln!(out, "Dry run; {display} left untouched")?;
        return Ok(ApplyOutcome::DryRun);
    }
    if !confirm.confirm(&target.question)? {
        writeln!(out, "Cancelled")?;
        return Ok(ApplyOutcome::Cancelled);
    }
    let outcome = store::write_json_atomic(target.path, value, target.style)?;
    writeln!(out, "{display}: {}", outcome.as_str())?;
    Ok(ApplyOutcome::Saved(outcome))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::confirm::{AssumeYes, ScriptedConfirm};

    const ORIGINAL: &str = "{\n  \"b\": 1,\n  \"a\": 2\n}";

    fn target(path: &Path) -> DatasetWrite<'_> {
        DatasetWrite {
            path,
            style: JsonStyle::TWO_SPACES,
            question: "Apply these updates to data.json?".to_string(),
        }
    }

    #[test]
    fn declined_question_leaves_file_untouched() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data.json");
        fs::write(&path, ORIGINAL).expect("write");
        let mut confirm = ScriptedConfirm::new(&[false]);
        let mut out = Vec::new();

        let outcome = finish(
            target(&path),
            &json!({"b": 3}),
            true,
            ApplyOptions::default(),
            &mut confirm,
            &mut out,
        )
        .expect("finish");
        assert_eq!(outcome, ApplyOutcome::Cancelled);
        assert_eq!(confirm.asked, vec!["Apply these updates to data.json?"]);
        assert_eq!(fs::read_to_string(&path).expect("read"), ORIGINAL);
        assert!(String::from_utf8(out).expect("utf8").contains("Cancelled"));
    }

    #[test]
    fn dry_run_never_asks_or_writes() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data.json");
        fs::write(&path, ORIGINAL).expect("write");
        let mut confirm = ScriptedConfirm::new(&[]);
        let mut out = Vec::new();

        let outcome = finish(
            target(&path),
            &json!({"b": 3}),
            true,
            ApplyOptions { dry_run: true },
            &mut confirm,
            &mut out,
        )
        .expect("finish");
        assert_eq!(outcome, ApplyOutcome::DryRun);
        assert!(confirm.asked.is_empty());
        assert_eq!(fs::read_to_string(&path).expect("read"), ORIGINAL);
    }

    #[test]
    fn approved_question_writes_with_style() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data.json");
        fs::write(&path, ORIGINAL).expect("write");
        let mut out = Vec::new();

        let outcome = finish(
            target(&path),
            &json!({"b": 3}),
            true,
            ApplyOptions::default(),
            &mut AssumeYes,
            &mut out,
        )
        .expect("finish");
        assert_eq!(outcome, ApplyOutcome::Saved(WriteOutcome::Written));
        assert_eq!(fs::read_to_string(&path).expect("read"), "{\n  \"b\": 3\n}");
    }

    #[test]
    fn no_changes_skips_the_question() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data.json");
        let mut confirm = ScriptedConfirm::new(&[]);
        let mut out = Vec::new();

        let outcome = finish(
            target(&path),
            &json!({}),
            false,
            ApplyOptions::default(),
            &mut confirm,
            &mut out,
        )
        .expect("finish");
        assert_eq!(outcome, ApplyOutcome::NoChanges);
        assert!(confirm.asked.is_empty());
        assert!(!path.exists());
    }
}
