//! Lookups that rebuild one attribute group of a monster from the stored
//! relations. Each is the inverse of one column transform; a missing row is
//! reported as [`BestiaryError::NotFound`], never as a default record.

use crate::database::Database;
use crate::error::{BestiaryError, Result};
use crate::models::{
    AbilityScore, AbilityScores, Alignment, BaseStats, DAMAGE_KEYS, DamageModifier,
    DamageModifierRecord, DamageModifiers, LanguageRecord, MonsterSheet, PhysicalStats, SKILLS,
    SavingThrows, Senses, SenseRecord, SkillRecord, SpeedRecord, calculate_modifier,
};
use crate::pipeline::relation;
use crate::table::Value;
use rusqlite::{OptionalExtension, Row, params};

fn not_found(relation: &str, id: i64) -> BestiaryError {
    BestiaryError::NotFound {
        relation: relation.to_string(),
        id,
    }
}

fn flag(row: &Row, column: &str) -> rusqlite::Result<bool> {
    Ok(row.get::<_, i64>(column)? != 0)
}

impl Database {
    /// Run a single-row lookup by id against `relation`.
    fn fetch_by_id<T, F>(&self, relation: &str, sql: &str, id: i64, map: F) -> Result<T>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.connection()?;
        conn.query_row(sql, params![id], map)
            .optional()?
            .ok_or_else(|| not_found(relation, id))
    }

    pub fn physical_stats_by_id(&self, id: i64) -> Result<PhysicalStats> {
        self.fetch_by_id(
            relation::MONSTER,
            r#"SELECT size, "type", tags FROM monster WHERE id = ?"#,
            id,
            |row| {
                Ok(PhysicalStats {
                    size: row.get(0)?,
                    monster_type: row.get(1)?,
                    tags: row.get(2)?,
                })
            },
        )
    }

    pub fn alignment_by_id(&self, id: i64) -> Result<Alignment> {
        self.fetch_by_id(
            relation::MONSTER,
            "SELECT lawfulness, goodness FROM monster WHERE id = ?",
            id,
            |row| {
                Ok(Alignment {
                    lawfulness: row.get(0)?,
                    goodness: row.get(1)?,
                })
            },
        )
    }

    /// Armor class and hit points from the main relation, joined with speeds.
    pub fn base_stats_by_id(&self, id: i64) -> Result<BaseStats> {
        self.fetch_by_id(
            relation::MONSTER,
            "SELECT m.ac, m.hp, s.walk, s.swim, s.fly, s.climb, s.burrow
             FROM monster m
             JOIN speed s ON s.monster_id = m.id
             WHERE m.id = ?",
            id,
            |row| {
                Ok(BaseStats {
                    armor_class: row.get(0)?,
                    hit_points: row.get(1)?,
                    speed: SpeedRecord {
                        walk: row.get(2)?,
                        swim: row.get(3)?,
                        fly: row.get(4)?,
                        climb: row.get(5)?,
                        burrow: row.get(6)?,
                    },
                })
            },
        )
    }

    pub fn ability_scores_by_id(&self, id: i64) -> Result<AbilityScores> {
        self.fetch_by_id(
            relation::MONSTER,
            r#"SELECT "str", "dex", "con", "int", "wis", "cha" FROM monster WHERE id = ?"#,
            id,
            |row| {
                Ok(AbilityScores {
                    strength: AbilityScore(row.get(0)?),
                    dexterity: AbilityScore(row.get(1)?),
                    constitution: AbilityScore(row.get(2)?),
                    intelligence: AbilityScore(row.get(3)?),
                    wisdom: AbilityScore(row.get(4)?),
                    charisma: AbilityScore(row.get(5)?),
                })
            },
        )
    }

    pub fn saving_throws_by_id(&self, id: i64) -> Result<SavingThrows> {
        self.fetch_by_id(
            relation::SAVING_THROW,
            "SELECT * FROM saving_throw WHERE id = ?",
            id,
            |row| {
                Ok(SavingThrows {
                    strength: flag(row, "str")?,
                    dexterity: flag(row, "dex")?,
                    constitution: flag(row, "con")?,
                    intelligence: flag(row, "int")?,
                    wisdom: flag(row, "wis")?,
                    charisma: flag(row, "cha")?,
                })
            },
        )
    }

    pub fn skills_by_id(&self, id: i64) -> Result<SkillRecord> {
        self.fetch_by_id(
            relation::SKILLS,
            "SELECT * FROM skills WHERE id = ?",
            id,
            |row| {
                let mut record = SkillRecord::default();
                for skill in SKILLS {
                    if flag(row, skill)? {
                        record.set(skill);
                    }
                }
                Ok(record)
            },
        )
    }

    /// Damage keys re-bucketed by the modifier stored against them.
    pub fn damage_modifiers_by_id(&self, id: i64) -> Result<DamageModifiers> {
        let record = self.fetch_by_id(
            relation::DAMAGE_MOD,
            "SELECT * FROM damage_mod WHERE id = ?",
            id,
            |row| {
                let mut record = DamageModifierRecord::default();
                for key in DAMAGE_KEYS {
                    let stored: Option<String> = row.get(key)?;
                    match stored.as_deref().map(DamageModifier::from_stored) {
                        Some(Some(modifier)) => {
                            record.set(key, modifier);
                        }
                        Some(None) => {
                            tracing::warn!("Ignoring unknown damage modifier {:?} on '{}'", stored, key);
                        }
                        None => {}
                    }
                }
                Ok(record)
            },
        )?;
        Ok(DamageModifiers::from(&record))
    }

    /// Sense ranges, with passive perception taken as the wisdom modifier.
    pub fn senses_by_id(&self, id: i64) -> Result<Senses> {
        self.fetch_by_id(
            relation::SENSE,
            "SELECT s.darkvision, s.tremorsense, s.blindsight, s.truesight, m.wis
             FROM sense s
             JOIN monster m ON m.id = s.monster_id
             WHERE s.id = ?",
            id,
            |row| {
                Ok(Senses {
                    ranges: SenseRecord {
                        darkvision: row.get(0)?,
                        tremorsense: row.get(1)?,
                        blindsight: row.get(2)?,
                        truesight: row.get(3)?,
                    },
                    passive_perception: calculate_modifier(row.get(4)?),
                })
            },
        )
    }

    /// Languages flagged for the monster. The column set is whatever the
    /// last ingest produced.
    pub fn languages_by_id(&self, id: i64) -> Result<LanguageRecord> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT * FROM language WHERE id = ?")?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let record = stmt
            .query_row(params![id], |row| {
                let mut record = LanguageRecord::default();
                for (idx, column) in columns.iter().enumerate() {
                    if column == "id" || column == relation::FOREIGN_KEY {
                        continue;
                    }
                    if let Value::Integer(1) = row.get::<_, Value>(idx)? {
                        record.insert(column.clone());
                    }
                }
                Ok(record)
            })
            .optional()?;
        record.ok_or_else(|| not_found(relation::LANGUAGE, id))
    }

    /// Every attribute group of one monster. Unknown values stay `-1`.
    pub fn monster_sheet_by_id(&self, id: i64) -> Result<MonsterSheet> {
        Ok(MonsterSheet::from_parts(
            id,
            self.physical_stats_by_id(id)?,
            self.alignment_by_id(id)?,
            self.base_stats_by_id(id)?,
            self.ability_scores_by_id(id)?,
            self.saving_throws_by_id(id)?,
            self.skills_by_id(id)?,
            self.damage_modifiers_by_id(id)?,
            self.senses_by_id(id)?,
            self.languages_by_id(id)?,
        ))
    }
}
