//! Data models for normalized monster data.
//!
//! The `*Record` types are the fixed-shape outputs of the field parsers, one
//! per side relation. The remaining types are the shapes the query layer
//! rebuilds from the stored relations.

use crate::error::{BestiaryError, Result};
use crate::table::{Relational, Value};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;

/// Movement types, in column order.
pub const SPEED_TYPES: [&str; 5] = ["walk", "swim", "fly", "climb", "burrow"];

/// Special senses, in column order.
pub const SENSE_TYPES: [&str; 4] = ["darkvision", "tremorsense", "blindsight", "truesight"];

/// Ability abbreviations as they appear in saving throw cells and columns.
pub const ABILITIES: [&str; 6] = ["str", "dex", "con", "int", "wis", "cha"];

/// Skill column keys. Multi-word skills use underscores.
pub const SKILLS: [&str; 20] = [
    "intimidation",
    "perception",
    "investigation",
    "acrobatics",
    "animal_handling",
    "religion",
    "insight",
    "survival",
    "arcana",
    "medicine",
    "history",
    "sleight_of_hand",
    "innate_spellcasting",
    "athletics",
    "death_burst",
    "nature",
    "persuasion",
    "stealth",
    "performance",
    "deception",
];

/// Damage and condition keys of the damage modifier relation.
///
/// Several entries are misspellings or near-duplicates ("lightining",
/// "paralyezd", "nonsilvered " with a trailing space) carried over from the
/// historical sheet. They are distinct columns and must stay verbatim.
pub const DAMAGE_KEYS: [&str; 41] = [
    "cold",
    "nonadamantine",
    "spell",
    "acid",
    "frightened grappled",
    "stunned",
    "charmed",
    "exhaustion",
    "thunder",
    "lightining",
    "grappled",
    "frightened",
    "unconscious",
    "paralyzed",
    "nonsilvered",
    "trainde",
    "deafened",
    "necrotic",
    "prone",
    "psychic",
    "darkness",
    "fire",
    "force",
    "magicalpiercing",
    "poisoned",
    "blinded",
    "slashing",
    "temp",
    "paralyezd",
    "poison",
    "nonsilvered ",
    "petrified",
    "magical",
    "pyschic",
    "exhuastion",
    "bludgeoning",
    "trained",
    "lightning",
    "piercing",
    "radiant",
    "nonmagical",
];

fn flag(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedRecord {
    pub walk: i64,
    pub swim: i64,
    pub fly: i64,
    pub climb: i64,
    pub burrow: i64,
}

impl SpeedRecord {
    /// Set the speed for a movement type. Returns false for unknown types.
    pub fn set(&mut self, kind: &str, value: i64) -> bool {
        let slot = match kind {
            "walk" => &mut self.walk,
            "swim" => &mut self.swim,
            "fly" => &mut self.fly,
            "climb" => &mut self.climb,
            "burrow" => &mut self.burrow,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn get(&self, kind: &str) -> Option<i64> {
        match kind {
            "walk" => Some(self.walk),
            "swim" => Some(self.swim),
            "fly" => Some(self.fly),
            "climb" => Some(self.climb),
            "burrow" => Some(self.burrow),
            _ => None,
        }
    }
}

impl Relational for SpeedRecord {
    fn cells(&self) -> Vec<(String, Value)> {
        SPEED_TYPES
            .iter()
            .map(|kind| (kind.to_string(), Value::Integer(self.get(kind).unwrap_or(0))))
            .collect()
    }
}

/// Sense ranges in feet; 0 means the sense is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenseRecord {
    pub darkvision: i64,
    pub tremorsense: i64,
    pub blindsight: i64,
    pub truesight: i64,
}

impl SenseRecord {
    pub fn set(&mut self, sense: &str, range: i64) -> bool {
        let slot = match sense {
            "darkvision" => &mut self.darkvision,
            "tremorsense" => &mut self.tremorsense,
            "blindsight" => &mut self.blindsight,
            "truesight" => &mut self.truesight,
            _ => return false,
        };
        *slot = range;
        true
    }

    pub fn get(&self, sense: &str) -> Option<i64> {
        match sense {
            "darkvision" => Some(self.darkvision),
            "tremorsense" => Some(self.tremorsense),
            "blindsight" => Some(self.blindsight),
            "truesight" => Some(self.truesight),
            _ => None,
        }
    }

    /// Names of the senses with a non-zero range.
    pub fn active(&self) -> BTreeSet<String> {
        SENSE_TYPES
            .iter()
            .filter(|sense| self.get(sense).unwrap_or(0) != 0)
            .map(|sense| sense.to_string())
            .collect()
    }
}

impl Relational for SenseRecord {
    fn cells(&self) -> Vec<(String, Value)> {
        SENSE_TYPES
            .iter()
            .map(|sense| (sense.to_string(), Value::Integer(self.get(sense).unwrap_or(0))))
            .collect()
    }
}

/// Saving throw proficiencies keyed by ability abbreviation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavingThrowRecord {
    flags: [bool; 6],
}

impl SavingThrowRecord {
    pub fn set(&mut self, ability: &str) -> bool {
        match ABILITIES.iter().position(|a| *a == ability) {
            Some(idx) => {
                self.flags[idx] = true;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, ability: &str) -> Option<bool> {
        ABILITIES
            .iter()
            .position(|a| *a == ability)
            .map(|idx| self.flags[idx])
    }
}

impl Relational for SavingThrowRecord {
    fn cells(&self) -> Vec<(String, Value)> {
        ABILITIES
            .iter()
            .zip(self.flags)
            .map(|(ability, set)| (ability.to_string(), flag(set)))
            .collect()
    }
}

/// Skill proficiency flags over the fixed skill set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkillRecord {
    flags: [bool; 20],
}

impl SkillRecord {
    pub fn set(&mut self, skill: &str) -> bool {
        match SKILLS.iter().position(|s| *s == skill) {
            Some(idx) => {
                self.flags[idx] = true;
                true
            }
            None => false,
        }
    }

    pub fn has(&self, skill: &str) -> bool {
        SKILLS
            .iter()
            .position(|s| *s == skill)
            .is_some_and(|idx| self.flags[idx])
    }

    /// Skills flagged as proficient, in column order.
    pub fn proficient(&self) -> Vec<&'static str> {
        SKILLS
            .iter()
            .zip(self.flags)
            .filter(|(_, set)| *set)
            .map(|(skill, _)| *skill)
            .collect()
    }
}

impl Serialize for SkillRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SKILLS.len()))?;
        for (skill, set) in SKILLS.iter().zip(self.flags) {
            map.serialize_entry(skill, &u8::from(set))?;
        }
        map.end()
    }
}

impl Relational for SkillRecord {
    fn cells(&self) -> Vec<(String, Value)> {
        SKILLS
            .iter()
            .zip(self.flags)
            .map(|(skill, set)| (skill.to_string(), flag(set)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageModifier {
    Resistance,
    Immunity,
    Weakness,
}

impl DamageModifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DamageModifier::Resistance => "resistance",
            DamageModifier::Immunity => "immunity",
            DamageModifier::Weakness => "weakness",
        }
    }

    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "resistance" => Some(DamageModifier::Resistance),
            "immunity" => Some(DamageModifier::Immunity),
            "weakness" => Some(DamageModifier::Weakness),
            _ => None,
        }
    }
}

/// Per-key damage modifiers; `None` means no modifier for that key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageModifierRecord {
    modifiers: [Option<DamageModifier>; 41],
}

impl Default for DamageModifierRecord {
    fn default() -> Self {
        Self {
            modifiers: [None; 41],
        }
    }
}

impl DamageModifierRecord {
    pub fn set(&mut self, key: &str, modifier: DamageModifier) -> bool {
        match DAMAGE_KEYS.iter().position(|k| *k == key) {
            Some(idx) => {
                self.modifiers[idx] = Some(modifier);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<DamageModifier> {
        DAMAGE_KEYS
            .iter()
            .position(|k| *k == key)
            .and_then(|idx| self.modifiers[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<DamageModifier>)> + '_ {
        DAMAGE_KEYS.iter().copied().zip(self.modifiers.iter().copied())
    }
}

impl Relational for DamageModifierRecord {
    fn cells(&self) -> Vec<(String, Value)> {
        self.iter()
            .map(|(key, modifier)| {
                let value = match modifier {
                    Some(m) => Value::Text(m.as_str().to_string()),
                    None => Value::Null,
                };
                (key.to_string(), value)
            })
            .collect()
    }
}

/// Sparse language record; every known language is stored as a flag of 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageRecord {
    pub languages: BTreeSet<String>,
}

impl LanguageRecord {
    pub fn insert(&mut self, language: impl Into<String>) {
        self.languages.insert(language.into());
    }

    pub fn contains(&self, language: &str) -> bool {
        self.languages.contains(language)
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

impl Relational for LanguageRecord {
    fn cells(&self) -> Vec<(String, Value)> {
        self.languages
            .iter()
            .map(|language| (language.clone(), Value::Integer(1)))
            .collect()
    }
}

// Query-layer shapes

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalStats {
    pub size: String,
    #[serde(rename = "type")]
    pub monster_type: String,
    pub tags: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    pub lawfulness: String,
    pub goodness: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    pub armor_class: i64,
    pub hit_points: i64,
    pub speed: SpeedRecord,
}

/// Ability score modifier: `floor((score - 10) / 2)`.
pub fn calculate_modifier(score: i64) -> i64 {
    (score - 10).div_euclid(2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScore(pub i64);

impl AbilityScore {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn modifier(&self) -> i64 {
        calculate_modifier(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: AbilityScore,
    pub dexterity: AbilityScore,
    pub constitution: AbilityScore,
    pub intelligence: AbilityScore,
    pub wisdom: AbilityScore,
    pub charisma: AbilityScore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingThrows {
    pub strength: bool,
    pub dexterity: bool,
    pub constitution: bool,
    pub intelligence: bool,
    pub wisdom: bool,
    pub charisma: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageModifiers {
    pub immunities: BTreeSet<String>,
    pub resistances: BTreeSet<String>,
    pub vulnerabilities: BTreeSet<String>,
}

impl From<&DamageModifierRecord> for DamageModifiers {
    fn from(record: &DamageModifierRecord) -> Self {
        let mut out = DamageModifiers::default();
        for (key, modifier) in record.iter() {
            let bucket = match modifier {
                Some(DamageModifier::Immunity) => &mut out.immunities,
                Some(DamageModifier::Resistance) => &mut out.resistances,
                Some(DamageModifier::Weakness) => &mut out.vulnerabilities,
                None => continue,
            };
            bucket.insert(key.to_string());
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Senses {
    /// Wisdom modifier of the monster.
    pub passive_perception: i64,
    pub ranges: SenseRecord,
}

/// Every attribute group of one monster, as rebuilt from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonsterSheet {
    pub id: i64,
    pub physical_stats: PhysicalStats,
    pub alignment: Alignment,
    pub base_stats: BaseStats,
    pub ability_scores: AbilityScores,
    pub saving_throws: SavingThrows,
    pub skills: SkillRecord,
    pub damage_modifiers: DamageModifiers,
    pub senses: Senses,
    pub languages: LanguageRecord,
}

impl MonsterSheet {
    /// Assemble a sheet, rejecting values that cannot describe a playable
    /// monster: the `-1` "unknown" sentinel in armor class or hit points, and
    /// negative speeds.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i64,
        physical_stats: PhysicalStats,
        alignment: Alignment,
        base_stats: BaseStats,
        ability_scores: AbilityScores,
        saving_throws: SavingThrows,
        skills: SkillRecord,
        damage_modifiers: DamageModifiers,
        senses: Senses,
        languages: LanguageRecord,
    ) -> Result<Self> {
        if base_stats.armor_class < 0 {
            return Err(BestiaryError::Parse(format!(
                "monster {} has unknown armor class",
                id
            )));
        }
        if base_stats.hit_points < 0 {
            return Err(BestiaryError::Parse(format!(
                "monster {} has unknown hit points",
                id
            )));
        }
        if let Some(kind) = SPEED_TYPES
            .iter()
            .find(|kind| base_stats.speed.get(kind).unwrap_or(0) < 0)
        {
            return Err(BestiaryError::Parse(format!(
                "monster {} has a negative {} speed",
                id, kind
            )));
        }

        Ok(Self::from_parts(
            id,
            physical_stats,
            alignment,
            base_stats,
            ability_scores,
            saving_throws,
            skills,
            damage_modifiers,
            senses,
            languages,
        ))
    }

    /// Assemble a sheet as stored, keeping `-1` wherever a value was unknown
    /// at ingest.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: i64,
        physical_stats: PhysicalStats,
        alignment: Alignment,
        base_stats: BaseStats,
        ability_scores: AbilityScores,
        saving_throws: SavingThrows,
        skills: SkillRecord,
        damage_modifiers: DamageModifiers,
        senses: Senses,
        languages: LanguageRecord,
    ) -> Self {
        Self {
            id,
            physical_stats,
            alignment,
            base_stats,
            ability_scores,
            saving_throws,
            skills,
            damage_modifiers,
            senses,
            languages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_modifier() {
        assert_eq!(calculate_modifier(1), -5);
        assert_eq!(calculate_modifier(8), -1);
        assert_eq!(calculate_modifier(9), -1);
        assert_eq!(calculate_modifier(10), 0);
        assert_eq!(calculate_modifier(15), 2);
        assert_eq!(calculate_modifier(25), 7);
    }

    #[test]
    fn test_damage_modifiers_from_record() {
        let mut record = DamageModifierRecord::default();
        record.set("acid", DamageModifier::Immunity);
        record.set("cold", DamageModifier::Weakness);

        let mods = DamageModifiers::from(&record);
        assert_eq!(mods.immunities, BTreeSet::from(["acid".to_string()]));
        assert_eq!(mods.vulnerabilities, BTreeSet::from(["cold".to_string()]));
        assert!(mods.resistances.is_empty());
    }

    #[test]
    fn test_damage_keys_keep_trailing_space_variant() {
        assert!(DAMAGE_KEYS.contains(&"nonsilvered"));
        assert!(DAMAGE_KEYS.contains(&"nonsilvered "));
        let mut record = DamageModifierRecord::default();
        assert!(record.set("nonsilvered ", DamageModifier::Resistance));
        assert_eq!(record.get("nonsilvered"), None);
    }

    #[test]
    fn test_skill_record_cells_are_fixed_shape() {
        let mut record = SkillRecord::default();
        record.set("stealth");
        let cells = record.cells();
        assert_eq!(cells.len(), SKILLS.len());
        assert!(cells.contains(&("stealth".to_string(), Value::Integer(1))));
        assert!(cells.contains(&("arcana".to_string(), Value::Integer(0))));
        assert!(!record.set("juggling"));
    }

    #[test]
    fn test_sheet_rejects_sentinel_hit_points() {
        let base_stats = BaseStats {
            armor_class: 15,
            hit_points: -1,
            speed: SpeedRecord::default(),
        };
        let scores = AbilityScores {
            strength: AbilityScore(8),
            dexterity: AbilityScore(14),
            constitution: AbilityScore(10),
            intelligence: AbilityScore(10),
            wisdom: AbilityScore(8),
            charisma: AbilityScore(8),
        };
        let result = MonsterSheet::new(
            0,
            PhysicalStats {
                size: "small".to_string(),
                monster_type: "humanoid".to_string(),
                tags: "goblinoid".to_string(),
            },
            Alignment {
                lawfulness: "neutral".to_string(),
                goodness: "evil".to_string(),
            },
            base_stats,
            scores,
            SavingThrows::default(),
            SkillRecord::default(),
            DamageModifiers::default(),
            Senses {
                passive_perception: -1,
                ranges: SenseRecord::default(),
            },
            LanguageRecord::default(),
        );
        assert!(result.is_err());
    }
}
