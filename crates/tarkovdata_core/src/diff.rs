//! Keyed record comparison shared by every sync command.

use std::collections::HashSet;
use std::fmt;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} → {}",
            self.field,
            display_value(self.old.as_ref()),
            display_value(self.new.as_ref())
        )
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordChange {
    pub key: String,
    pub kind: ChangeKind,
    pub fields: Vec<FieldChange>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DatasetDiff {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub changes: Vec<RecordChange>,
}

impl DatasetDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn keys(&self, kind: ChangeKind) -> impl Iterator<Item = &str> {
        self.changes
            .iter()
            .filter(move |change| change.kind == kind)
            .map(|change| change.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&RecordChange> {
        self.changes.iter().find(|change| change.key == key)
    }
}

/// Changes are grouped added, modified, removed; each group keeps its source order.
pub fn diff_records<'a, V, C, F>(current: C, fresh: F) -> Result<DatasetDiff>
where
    V: Serialize + 'a,
    C: IntoIterator<Item = (String, &'a V)>,
    F: IntoIterator<Item = (String, &'a V)>,
{
    let current = serialize_entries(current)?;
    let fresh = serialize_entries(fresh)?;
    let fresh_keys = fresh
        .iter()
        .map(|(key, _)| key.as_str())
        .collect::<HashSet<_>>();

    let mut changes = Vec::new();
    for (key, value) in &fresh {
        match current.iter().find(|(candidate, _)| candidate == key) {
            None => changes.push(RecordChange {
                key: key.clone(),
                kind: ChangeKind::Added,
                fields: Vec::new(),
            }),
            Some((_, old)) => {
                let fields = field_changes(old, value);
                if !fields.is_empty() {
                    changes.push(RecordChange {
                        key: key.clone(),
                        kind: ChangeKind::Modified,
                        fields,
                    });
                }
            }
        }
    }
    for (key, _) in &current {
        if !fresh_keys.contains(key.as_str()) {
            changes.push(RecordChange {
                key: key.clone(),
                kind: ChangeKind::Removed,
                fields: Vec::new(),
            });
        }
    }

    changes.sort_by_key(|change| change_order(change.kind));
    let count = |kind| changes.iter().filter(|change| change.kind == kind).count();
    Ok(DatasetDiff {
        added: count(ChangeKind::Added),
        modified: count(ChangeKind::Modified),
        removed: count(ChangeKind::Removed),
        changes,
    })
}

/// Objects are walked recursively; arrays and scalars are compared whole.
pub fn field_changes(old: &Value, new: &Value) -> Vec<FieldChange> {
    let mut out = Vec::new();
    collect_changes("", Some(old), Some(new), &mut out);
    out
}

fn collect_changes(
    path: &str,
    old: Option<&Value>,
    new: Option<&Value>,
    out: &mut Vec<FieldChange>,
) {
    match (old, new) {
        (Some(Value::Object(old_fields)), Some(Value::Object(new_fields))) => {
            for (name, old_value) in old_fields {
                collect_changes(
                    &join_path(path, name),
                    Some(old_value),
                    new_fields.get(name),
                    out,
                );
            }
            for (name, new_value) in new_fields {
                if !old_fields.contains_key(name) {
                    collect_changes(&join_path(path, name), None, Some(new_value), out);
                }
            }
        }
        (old, new) => {
            let equal = match (old, new) {
                (Some(left), Some(right)) => values_equal(left, right),
                (None, None) => true,
                _ => false,
            };
            if !equal {
                out.push(FieldChange {
                    field: if path.is_empty() {
                        "(value)".to_string()
                    } else {
                        path.to_string()
                    },
                    old: old.cloned(),
                    new: new.cloned(),
                });
            }
        }
    }
}

pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => match (left.as_f64(), right.as_f64()) {
            (Some(left), Some(right)) => left == right,
            _ => left == right,
        },
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right)
                    .all(|(left, right)| values_equal(left, right))
        }
        (Value::Object(left), Value::Object(right)) => objects_equal(left, right),
        _ => left == right,
    }
}

fn objects_equal(left: &Map<String, Value>, right: &Map<String, Value>) -> bool {
    left.len() == right.len()
        && left.iter().all(|(name, value)| {
            right
                .get(name)
                .is_some_and(|other| values_equal(value, other))
        })
}

fn serialize_entries<'a, V, I>(entries: I) -> Result<Vec<(String, Value)>>
where
    V: Serialize + 'a,
    I: IntoIterator<Item = (String, &'a V)>,
{
    entries
        .into_iter()
        .map(|(key, value)| {
            let value = serde_json::to_value(value)
                .with_context(|| format!("failed to serialize record {key}"))?;
            Ok((key, value))
        })
        .collect()
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn change_order(kind: ChangeKind) -> u8 {
    match kind {
        ChangeKind::Added => 0,
        ChangeKind::Modified => 1,
        ChangeKind::Removed => 2,
    }
}

pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None => "<none>".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}
