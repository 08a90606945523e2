//! Rebuilds the denormalized export directory from the data directory.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use tracing::info;

use crate::runtime::ResolvedPaths;
use crate::store::{self, JsonStyle, WriteOutcome};

type Transform = fn(Value) -> Result<Value>;

pub struct ExportTarget {
    pub source: &'static str,
    pub output: &'static str,
    transform: Transform,
}

pub const EXPORT_TARGETS: &[ExportTarget] = &[
    ExportTarget {
        source: "achievements.json",
        output: "achievements.json",
        transform: values_export,
    },
    ExportTarget {
        source: "ammunition.json",
        output: "ammunition.json",
        transform: values_export,
    },
    ExportTarget {
        source: "hideout.json",
        output: "hideout.json",
        transform: identity_export,
    },
    ExportTarget {
        source: "item_presets.json",
        output: "itemPresets.json",
        transform: values_export,
    },
    ExportTarget {
        source: "items.en.json",
        output: "items.json",
        transform: items_export,
    },
    ExportTarget {
        source: "levels.json",
        output: "levels.json",
        transform: levels_export,
    },
    ExportTarget {
        source: "maps.json",
        output: "maps.json",
        transform: maps_export,
    },
    ExportTarget {
        source: "quests.json",
        output: "quests.json",
        transform: identity_export,
    },
    ExportTarget {
        source: "storyline.json",
        output: "storyline.json",
        transform: storyline_export,
    },
    ExportTarget {
        source: "traders.json",
        output: "traders.json",
        transform: traders_export,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub source: &'static str,
    pub output: &'static str,
    /// Sequence length, or key count for object outputs.
    pub entries: usize,
    pub outcome: WriteOutcome,
}

/// Builds one keyed element: the key under `key_field`, then the source fields, then
/// `extras` overriding same-named source fields. The key always wins.
pub fn keyed_element(
    key_field: &str,
    key: Value,
    value: &Value,
    extras: &Map<String, Value>,
) -> Value {
    let mut element = Map::new();
    element.insert(key_field.to_string(), key);
    if let Value::Object(fields) = value {
        for (name, field) in fields {
            if name != key_field {
                element.insert(name.clone(), field.clone());
            }
        }
    }
    for (name, field) in extras {
        if name != key_field {
            element.insert(name.clone(), field.clone());
        }
    }
    Value::Object(element)
}

pub fn map_to_sequence(
    map: &Map<String, Value>,
    key_field: &str,
    extras: &Map<String, Value>,
) -> Vec<Value> {
    map.iter()
        .map(|(key, value)| keyed_element(key_field, Value::String(key.clone()), value, extras))
        .collect()
}

/// `{ level: <number>, ...entry }` per key, ascending by level.
pub fn levels_to_sequence(levels: &Map<String, Value>) -> Result<Vec<Value>> {
    let mut numbered = levels
        .iter()
        .map(|(key, entry)| {
            let level = key
                .trim()
                .parse::<u64>()
                .with_context(|| format!("level key `{key}` is not a number"))?;
            Ok((level, entry))
        })
        .collect::<Result<Vec<_>>>()?;
    numbered.sort_by_key(|(level, _)| *level);
    Ok(numbered
        .into_iter()
        .map(|(level, entry)| keyed_element("level", Value::from(level), entry, &Map::new()))
        .collect())
}

fn expect_object(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("{what} must be a JSON object"),
    }
}

fn identity_export(value: Value) -> Result<Value> {
    Ok(value)
}

fn values_export(value: Value) -> Result<Value> {
    let map = expect_object(value, "keyed dataset")?;
    Ok(Value::Array(map.into_iter().map(|(_, value)| value).collect()))
}

fn items_export(value: Value) -> Result<Value> {
    Ok(value
        .pointer("/data/items")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new())))
}

fn levels_export(value: Value) -> Result<Value> {
    let map = expect_object(value, "levels")?;
    Ok(Value::Array(levels_to_sequence(&map)?))
}

fn maps_export(value: Value) -> Result<Value> {
    let map = expect_object(value, "maps")?;
    let elements = map
        .iter()
        .map(|(key, value)| {
            let mut extras = Map::new();
            extras.insert(
                "numericId".to_string(),
                value.get("id").cloned().unwrap_or(Value::Null),
            );
            keyed_element("id", Value::String(key.clone()), value, &extras)
        })
        .collect();
    Ok(Value::Array(elements))
}

fn storyline_export(value: Value) -> Result<Value> {
    let mut storyline = expect_object(value, "storyline")?;
    let chapters = match storyline.remove("chapters") {
        Some(Value::Object(chapters)) => map_to_sequence(&chapters, "key", &Map::new()),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => bail!("storyline chapters must be a JSON object"),
    };
    let mut output = Map::new();
    output.insert(
        "storylines".to_string(),
        storyline
            .remove("storylines")
            .unwrap_or_else(|| Value::Array(Vec::new())),
    );
    output.insert("chapters".to_string(), Value::Array(chapters));
    Ok(Value::Object(output))
}

fn traders_export(value: Value) -> Result<Value> {
    let map = expect_object(value, "traders")?;
    Ok(Value::Array(map_to_sequence(&map, "key", &Map::new())))
}

fn entry_count(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 1,
    }
}

/// Transforms every target. Any missing or malformed source aborts before later targets run.
pub fn build_export(paths: &ResolvedPaths) -> Result<Vec<ExportedFile>> {
    let mut exported = Vec::new();
    for target in EXPORT_TARGETS {
        let source_path = paths.data_file(target.source);
        let source = store::load_json_value(&source_path)?;
        let output = (target.transform)(source)
            .with_context(|| format!("failed to reshape {}", target.source))?;
        let output_path = paths.export_dir.join(target.output);
        let outcome = store::write_json_atomic(&output_path, &output, JsonStyle::EXPORT)?;
        info!(
            source = target.source,
            output = target.output,
            outcome = outcome.as_str(),
            "exported"
        );
        exported.push(ExportedFile {
            source: target.source,
            output: target.output,
            entries: entry_count(&output),
            outcome,
        });
    }
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn map_to_sequence_keeps_every_key_and_lets_extras_override() {
        let source = object(json!({
            "prapor": {"name": "Prapor", "tier": 1},
            "skier": {"name": "Skier", "tier": 2, "key": "shadowed"}
        }));
        let extras = object(json!({"tier": 9, "exported": true}));
        let sequence = map_to_sequence(&source, "key", &extras);

        assert_eq!(sequence.len(), source.len());
        assert_eq!(
            sequence[0],
            json!({"key": "prapor", "name": "Prapor", "tier": 9, "exported": true})
        );
        assert_eq!(sequence[1]["key"], json!("skier"));
        assert_eq!(sequence[1]["tier"], json!(9));
        for element in &sequence {
            assert!(element.get("key").is_some());
            assert_eq!(element["exported"], json!(true));
        }
    }

    #[test]
    fn levels_are_sorted_numerically() {
        let levels = object(json!({
            "10": {"exp": 12519},
            "2": {"exp": 1000},
            "1": {"exp": 0}
        }));
        let sequence = levels_to_sequence(&levels).expect("levels");
        let order = sequence
            .iter()
            .map(|entry| entry["level"].as_u64().expect("level"))
            .collect::<Vec<_>>();
        assert_eq!(order, vec![1, 2, 10]);
        assert_eq!(sequence[1], json!({"level": 2, "exp": 1000}));

        let bad = object(json!({"one": {}}));
        assert!(levels_to_sequence(&bad).is_err());
    }

    #[test]
    fn maps_keep_key_as_id_and_expose_numeric_id() {
        let maps = maps_export(json!({"customs": {"id": 3, "name": "Customs"}})).expect("maps");
        assert_eq!(maps, json!([{"id": "customs", "name": "Customs", "numericId": 3}]));
    }

    #[test]
    fn storyline_and_items_reshape() {
        let storyline = storyline_export(json!({
            "storylines": [{"id": "tour"}],
            "chapters": {"c1": {"title": "One"}}
        }))
        .expect("storyline");
        assert_eq!(
            storyline,
            json!({"storylines": [{"id": "tour"}], "chapters": [{"key": "c1", "title": "One"}]})
        );
        assert_eq!(
            storyline_export(json!({})).expect("empty"),
            json!({"storylines": [], "chapters": []})
        );
        assert_eq!(items_export(json!({"data": {"items": [1, 2]}})).expect("items"), json!([1, 2]));
        assert_eq!(items_export(json!({"errors": []})).expect("items"), json!([]));
    }

    #[test]
    fn build_export_writes_every_target() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_root(temp.path());
        fs::create_dir_all(&paths.data_dir).expect("data dir");
        let sources = [
            ("achievements.json", json!({"a": {"name": "A"}})),
            ("ammunition.json", json!({"x": {"id": "x"}, "y": {"id": "y"}})),
            ("hideout.json", json!({"stations": [], "modules": []})),
            ("item_presets.json", json!({})),
            ("items.en.json", json!({"data": {"items": [{"id": "i"}]}})),
            ("levels.json", json!({"2": {"exp": 1000}, "1": {"exp": 0}})),
            ("maps.json", json!({"factory": {"id": 1}})),
            ("quests.json", json!([{"id": 1}])),
            ("storyline.json", json!({"storylines": [], "chapters": {}})),
            ("traders.json", json!({"prapor": {"name": "Prapor"}})),
        ];
        for (name, value) in &sources {
            fs::write(paths.data_file(name), value.to_string()).expect("write source");
        }

        let exported = build_export(&paths).expect("export");
        assert_eq!(exported.len(), EXPORT_TARGETS.len());
        assert!(exported.iter().all(|file| file.outcome == WriteOutcome::Written));

        let ammunition =
            fs::read_to_string(paths.export_dir.join("ammunition.json")).expect("read");
        assert!(ammunition.ends_with("]\n"));
        let levels: Value =
            store::load_json_value(&paths.export_dir.join("levels.json")).expect("levels");
        assert_eq!(levels[0]["level"], json!(1));
        assert!(paths.export_dir.join("itemPresets.json").exists());

        let again = build_export(&paths).expect("export again");
        assert!(again.iter().all(|file| file.outcome == WriteOutcome::Unchanged));
    }

    #[test]
    fn missing_source_aborts_export() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_root(temp.path());
        let error = build_export(&paths).expect_err("missing sources");
        assert!(error.to_string().contains("achievements.json"));
    }
}
