//! Ammunition records and the per-caliber wiki table parser.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::caliber::CaliberInfo;
use crate::fetch::PageFetcher;
use crate::record::{Record, number_value, rename_key, set_field};
use crate::store;
use crate::table::{ColumnMap, ColumnSpec, HtmlTable, TableRow};
use crate::values::{parse_leading_int, parse_modifier, parse_percentage};

pub type Ammunition = Record;
pub type AmmoDatabase = IndexMap<String, Ammunition>;

pub const NEW_AMMO_WEIGHT: f64 = 0.012;
pub const NEW_AMMO_STACK_MAX_SIZE: u64 = 50;
pub const NEW_AMMO_RICOCHET_CHANCE: f64 = 0.1;
pub const NEW_AMMO_PENETRATION_CHANCE: f64 = 0.2;
const MAX_PLAUSIBLE_DAMAGE: i64 = 300;

const DRIFTED_BALLISTIC_FIELDS: [(&str, &str); 2] = [
    ("lightBleedingDelta", "lightBleedDelta"),
    ("heavyBleedingDelta", "heavyBleedDelta"),
];

pub fn ammo_names(ammo: &Ammunition) -> (&str, &str) {
    (ammo.str("name"), ammo.str("shortName"))
}

pub fn has_ballistics(ammo: &Ammunition) -> bool {
    ammo.object("ballistics").is_some()
}

pub fn ballistic(ammo: &Ammunition, field: &str) -> Option<f64> {
    ammo.object("ballistics")
        .and_then(|ballistics| ballistics.get(field))
        .and_then(Value::as_f64)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WikiAmmoRow {
    pub icon: String,
    pub name: String,
    pub damage: i64,
    pub penetration: i64,
    pub armor_damage: i64,
    pub fragmentation: String,
    pub accuracy_modifier: String,
    pub recoil_modifier: String,
    pub light_bleed_modifier: String,
    pub heavy_bleed_modifier: String,
    pub durability_burn: String,
    pub velocity: i64,
    pub traders: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmmoColumn {
    Icon,
    Name,
    Damage,
    Penetration,
    ArmorDamage,
    Accuracy,
    Recoil,
    LightBleed,
    HeavyBleed,
    Fragmentation,
    DurabilityBurn,
    Velocity,
    Traders,
}

impl ColumnSpec for AmmoColumn {
    const ALL: &'static [Self] = &[
        Self::Icon,
        Self::Name,
        Self::Damage,
        Self::Penetration,
        Self::ArmorDamage,
        Self::Accuracy,
        Self::Recoil,
        Self::LightBleed,
        Self::HeavyBleed,
        Self::Fragmentation,
        Self::DurabilityBurn,
        Self::Velocity,
        Self::Traders,
    ];

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Icon => &["icon", "image"],
            Self::Name => &["name"],
            Self::Damage => &["damage", "flesh damage"],
            Self::Penetration => &["penetration power", "penetration", "pen"],
            Self::ArmorDamage => &["armor damage", "armour damage"],
            Self::Accuracy => &["accuracy"],
            Self::Recoil => &["recoil"],
            Self::LightBleed => &["light bleed", "light bleeding", "lightbleed"],
            Self::HeavyBleed => &["heavy bleed", "heavy bleeding", "heavybleed"],
            Self::Fragmentation => &["fragmentation chance", "fragmentation", "frag chance"],
            Self::DurabilityBurn => &["durability burn"],
            Self::Velocity => &["projectile speed", "projectilespeed", "velocity", "speed"],
            Self::Traders => &["sold by", "source", "traders"],
        }
    }
}

/// Rows without a name of at least three characters or with damage outside `1..=300` are
/// skipped.
pub fn parse_ammo_table(html: &str) -> Result<Vec<WikiAmmoRow>> {
    let Some(table) = HtmlTable::first(html)? else {
        warn!("no table found on caliber page");
        return Ok(Vec::new());
    };
    let columns = table.columns::<AmmoColumn>();
    if !columns.contains(AmmoColumn::Name) || !columns.contains(AmmoColumn::Damage) {
        warn!(headers = ?table.headers(), "ammo table lacks name or damage column");
        return Ok(Vec::new());
    }
    let missing = columns.missing();
    if !missing.is_empty() {
        debug!(?missing, "ammo table columns not present");
    }

    let rows = table
        .data_rows()
        .iter()
        .filter_map(|row| parse_ammo_row(&columns, row))
        .collect::<Vec<_>>();
    Ok(rows)
}

fn parse_ammo_row(columns: &ColumnMap<AmmoColumn>, row: &TableRow) -> Option<WikiAmmoRow> {
    let name = columns.cell(row, AmmoColumn::Name)?.label().to_string();
    if name.chars().count() < 3 {
        debug!(name, "skipping ammo row with short name");
        return None;
    }
    let damage = parse_leading_int(columns.text(row, AmmoColumn::Damage));
    if !(1..=MAX_PLAUSIBLE_DAMAGE).contains(&damage) {
        debug!(name, damage, "skipping ammo row with implausible damage");
        return None;
    }
    let text = |column| columns.text(row, column).to_string();

    Some(WikiAmmoRow {
        icon: columns
            .cell(row, AmmoColumn::Icon)
            .and_then(|cell| cell.image_alt.clone())
            .unwrap_or_default(),
        damage,
        penetration: parse_leading_int(columns.text(row, AmmoColumn::Penetration)),
        armor_damage: parse_leading_int(columns.text(row, AmmoColumn::ArmorDamage)),
        fragmentation: text(AmmoColumn::Fragmentation),
        accuracy_modifier: text(AmmoColumn::Accuracy),
        recoil_modifier: text(AmmoColumn::Recoil),
        light_bleed_modifier: text(AmmoColumn::LightBleed),
        heavy_bleed_modifier: text(AmmoColumn::HeavyBleed),
        durability_burn: text(AmmoColumn::DurabilityBurn),
        velocity: parse_leading_int(columns.text(row, AmmoColumn::Velocity)),
        traders: text(AmmoColumn::Traders),
        name,
    })
}

pub fn fetch_caliber_ammo<F: PageFetcher>(
    fetcher: &mut F,
    caliber: &CaliberInfo,
) -> Result<Vec<WikiAmmoRow>> {
    let html = fetcher
        .fetch_page(&caliber.wiki_url)
        .with_context(|| format!("failed to fetch ammunition for {}", caliber.name))?;
    let rows = parse_ammo_table(&html)?;
    info!(caliber = %caliber.name, count = rows.len(), "parsed ammunition rows");
    Ok(rows)
}

pub fn load_ammo_database(path: &Path) -> Result<AmmoDatabase> {
    let mut raw = store::load_json_value(path)?;
    let drifted = unify_ballistics_schema(&mut raw);
    if drifted > 0 {
        warn!(
            records = drifted,
            "bleed fields will be written as lightBleedDelta/heavyBleedDelta"
        );
    }
    serde_json::from_value(raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Renames drifted ballistic keys where they stand and returns how many records had any.
/// When both spellings are present the canonical one is kept.
pub fn unify_ballistics_schema(database: &mut Value) -> usize {
    let Some(records) = database.as_object_mut() else {
        return 0;
    };
    let mut drifted_records = 0;
    for record in records.values_mut() {
        let Some(ballistics) = record
            .get_mut("ballistics")
            .and_then(Value::as_object_mut)
        else {
            continue;
        };
        let mut drifted = false;
        for (old, canonical) in DRIFTED_BALLISTIC_FIELDS {
            drifted |= rename_key(ballistics, old, canonical);
        }
        if drifted {
            drifted_records += 1;
        }
    }
    drifted_records
}

/// Name and caliber always follow the wiki. Damage, penetration, armor damage and speed
/// only when the wiki value is non-zero, fragmentation only when positive, accuracy and
/// recoil always. Fields not touched here are left as they are in the file.
pub fn apply_wiki_row(record: &mut Ammunition, row: &WikiAmmoRow, caliber_id: &str) -> Result<()> {
    record.set("name", row.name.as_str());
    record.set("caliber", caliber_id);

    let ballistics = record.object_mut("ballistics")?;
    let counts = [
        ("damage", row.damage),
        ("penetrationPower", row.penetration),
        ("armorDamage", row.armor_damage),
        ("initialSpeed", row.velocity),
    ];
    for (field, value) in counts {
        if value != 0 {
            set_field(ballistics, field, Value::from(value));
        }
    }
    let fragmentation = parse_percentage(&row.fragmentation);
    if fragmentation > 0.0 {
        set_field(ballistics, "fragmentationChance", number_value(fragmentation));
    }
    let accuracy = parse_modifier(&row.accuracy_modifier);
    set_field(ballistics, "accuracy", number_value(accuracy));
    let recoil = parse_modifier(&row.recoil_modifier);
    set_field(ballistics, "recoil", number_value(recoil));
    Ok(())
}

/// `<caliberId>_<name lowercased, anything outside [a-z0-9] replaced by _>`.
pub fn new_ammo_id(caliber_id: &str, name: &str) -> String {
    let slug = name
        .to_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    format!("{caliber_id}_{slug}")
}

pub fn new_ammunition(row: &WikiAmmoRow, caliber_id: &str) -> Ammunition {
    let short_name = row
        .name
        .split(' ')
        .next_back()
        .filter(|word| !word.is_empty())
        .unwrap_or(&row.name);
    let ballistics = Record::new()
        .with("damage", row.damage)
        .with("armorDamage", row.armor_damage)
        .with(
            "fragmentationChance",
            number_value(parse_percentage(&row.fragmentation)),
        )
        .with("ricochetChance", NEW_AMMO_RICOCHET_CHANCE)
        .with("penetrationChance", NEW_AMMO_PENETRATION_CHANCE)
        .with("penetrationPower", row.penetration)
        .with("penetrationPowerDeviation", 0)
        .with("accuracy", number_value(parse_modifier(&row.accuracy_modifier)))
        .with("recoil", number_value(parse_modifier(&row.recoil_modifier)))
        .with("initialSpeed", row.velocity)
        .with(
            "lightBleedDelta",
            number_value(parse_percentage(&row.light_bleed_modifier)),
        )
        .with(
            "heavyBleedDelta",
            number_value(parse_percentage(&row.heavy_bleed_modifier)),
        )
        .with("durabilityBurnFactor", 0)
        .with("heatFactor", 0);

    Record::new()
        .with("id", new_ammo_id(caliber_id, &row.name))
        .with("name", row.name.as_str())
        .with("shortName", short_name)
        .with("weight", NEW_AMMO_WEIGHT)
        .with("caliber", caliber_id)
        .with("stackMaxSize", NEW_AMMO_STACK_MAX_SIZE)
        .with("tracer", false)
        .with("tracerColor", "red")
        .with("ammoType", "bullet")
        .with("projectileCount", 1)
        .with("ballistics", ballistics)
}

pub fn find_by_name<'a>(
    database: &'a AmmoDatabase,
    name: &str,
) -> Option<(&'a String, &'a Ammunition)> {
    database.iter().find(|(_, ammo)| {
        let (full, short) = ammo_names(ammo);
        full == name || short == name
    })
}
