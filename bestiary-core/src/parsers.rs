//! Field parsers for raw monster sheet cells.
//!
//! Each parser takes one raw cell and returns a fixed-shape record. Absent
//! or malformed input yields the record's default; unrecognized tokens are
//! dropped. The one exception is [`parse_saving_throws`], which rejects
//! unrecognized tokens instead of dropping them.

use crate::error::{BestiaryError, Result};
use crate::models::{
    Alignment, DamageModifier, DamageModifierRecord, LanguageRecord, SavingThrowRecord,
    SenseRecord, SkillRecord, SpeedRecord,
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"[A-Za-z]{2,}").expect("valid word regex");
    static ref NUMBER_RE: Regex = Regex::new(r"[0-9]+").expect("valid number regex");
    // Alternation order matters: the leftmost alternative that matches wins.
    static ref MODIFIER_RE: Regex =
        Regex::new(r"res|immun|weak|immmun|immu|immmu").expect("valid modifier regex");
    static ref TAG_RE: Regex = Regex::new(r"\((.*?)\)").expect("valid tag regex");
}

/// Integer value of the cell, or `-1` when it cannot be determined.
pub fn parse_int(input: Option<&str>) -> i64 {
    input
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(-1)
}

/// Normalize a sheet header: drop periods, spaces become underscores, lowercase.
pub fn normalize_header(header: &str) -> String {
    header.trim().replace('.', "").replace(' ', "_").to_lowercase()
}

fn first_word(segment: &str) -> Option<String> {
    WORD_RE.find(segment).map(|m| m.as_str().to_lowercase())
}

fn first_number(segment: &str) -> Option<i64> {
    NUMBER_RE
        .find(segment)
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Parse a speeds cell such as `"30, fly 60, swim 30"`.
///
/// A segment without a word is the walking speed. Segments naming anything
/// other than the five movement types are discarded, and a movement type
/// without a number is recorded as 0.
pub fn parse_speeds(input: Option<&str>) -> SpeedRecord {
    let mut record = SpeedRecord::default();
    let Some(input) = input else {
        return record;
    };

    for segment in input.split(',') {
        if segment.trim().is_empty() {
            continue;
        }
        let kind = first_word(segment).unwrap_or_else(|| "walk".to_string());
        let speed = first_number(segment).unwrap_or(0);
        if !record.set(&kind, speed) {
            tracing::trace!("Dropping unknown speed segment '{}'", segment.trim());
        }
    }
    record
}

/// Parse a senses cell such as `"darkvision 60 ft., tremorsense 30 ft."`.
///
/// A sense is only recorded when its segment also carries a range; a bare
/// sense word leaves that sense at 0.
pub fn parse_senses(input: &str) -> SenseRecord {
    let mut record = SenseRecord::default();

    for segment in input.split(',') {
        let Some(word) = first_word(segment) else {
            continue;
        };
        let key = match word.as_str() {
            "darkvision" | "darkivision" => "darkvision",
            "blindsight" => "blindsight",
            "truesight" => "truesight",
            "tremorsense" => "tremorsense",
            _ => continue,
        };
        if let Some(range) = first_number(segment) {
            record.set(key, range);
        }
    }
    record
}

/// Parse a comma-separated skill list. Unknown skills are dropped.
pub fn parse_skills(input: Option<&str>) -> SkillRecord {
    let mut record = SkillRecord::default();
    let Some(input) = input else {
        return record;
    };

    for token in input.split(',') {
        let mut skill = token.trim().to_lowercase();
        if skill == "intimation" {
            skill = "intimidation".to_string();
        }
        let key = skill.replace(' ', "_");
        if !record.set(&key) && !key.is_empty() {
            tracing::trace!("Dropping unknown skill '{}'", key);
        }
    }
    record
}

/// Parse a saving throw list such as `"Dex, Wis"`.
///
/// `temp` is a placeholder and ignored. Any other token that is not one of
/// the six ability abbreviations is an error.
pub fn parse_saving_throws(input: Option<&str>) -> Result<SavingThrowRecord> {
    let mut record = SavingThrowRecord::default();
    let Some(input) = input else {
        return Ok(record);
    };

    for token in input.to_lowercase().split(',') {
        let ability = token.trim();
        if ability.is_empty() || ability == "temp" {
            continue;
        }
        if !record.set(ability) {
            return Err(BestiaryError::UnknownSavingThrow(ability.to_string()));
        }
    }
    Ok(record)
}

/// Parse a damage modifier cell such as `"rescold, immunpoison, weakfire"`.
///
/// The modifier prefix is removed from each segment and the remainder must
/// be one of the fixed damage keys. Segments with an unknown key or no
/// prefix are dropped.
pub fn parse_damage_modifiers(input: Option<&str>) -> DamageModifierRecord {
    let mut record = DamageModifierRecord::default();
    let Some(input) = input else {
        return record;
    };

    for segment in input.split(',') {
        let segment = segment.trim().to_lowercase();
        let Some(prefix) = MODIFIER_RE.find(&segment) else {
            continue;
        };
        let modifier = match prefix.as_str() {
            "res" => DamageModifier::Resistance,
            "weak" => DamageModifier::Weakness,
            _ => DamageModifier::Immunity,
        };
        let key = MODIFIER_RE.replace_all(&segment, "");
        if !record.set(&key, modifier) {
            tracing::trace!("Dropping unknown damage type '{}'", key);
        }
    }
    record
}

/// Parse a language list. The first word of each segment, lowercased, is a
/// language.
pub fn parse_languages(input: Option<&str>) -> LanguageRecord {
    let mut record = LanguageRecord::default();
    let Some(input) = input else {
        return record;
    };

    for segment in input.split(',') {
        if let Some(language) = first_word(segment) {
            record.insert(language);
        }
    }
    record
}

/// Split `"humanoid (goblinoid)"` into type `"humanoid"` and tags `"goblinoid"`.
///
/// Only the first parenthesized group becomes the tags; every group is
/// removed from the type.
pub fn split_type(input: &str) -> (String, String) {
    let tags = TAG_RE
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_lowercase())
        .unwrap_or_default();
    let monster_type = TAG_RE.replace_all(input, "").trim().to_lowercase();
    (monster_type, tags)
}

/// One alignment axis: the same grammar over a different vocabulary.
struct Axis {
    /// Every category, as a comma-joined list.
    all: &'static str,
    /// Single-character code at this axis' position in a two-letter code.
    codes: &'static [(char, &'static str)],
    phrases: &'static [(&'static str, &'static str)],
    any: &'static [(&'static str, &'static str)],
    not: &'static [(&'static str, &'static str)],
    position: usize,
}

const LAWFULNESS: Axis = Axis {
    all: "chaotic, neutral, lawful",
    codes: &[('n', "neutral"), ('l', "lawful"), ('c', "chaotic")],
    phrases: &[
        ("any", "chaotic, neutral, lawful"),
        ("cg or ne", "chaotic, neutral"),
        ("ng/ne", "neutral"),
        ("unaligned", "unaligned"),
    ],
    any: &[("chaotic", "chaotic"), ("lawful", "lawful")],
    not: &[("chaotic", "lawful, neutral"), ("lawful", "chaotic, neutral")],
    position: 0,
};

const GOODNESS: Axis = Axis {
    all: "good, neutral, evil",
    codes: &[('n', "neutral"), ('g', "good"), ('e', "evil")],
    phrases: &[
        ("any", "good, neutral, evil"),
        ("cg or ne", "good, evil"),
        ("ng/ne", "good, evil"),
        ("unaligned", "unaligned"),
    ],
    any: &[("good", "good"), ("evil", "evil")],
    not: &[
        ("good", "neutral, evil"),
        ("neutral", "good, evil"),
        ("evil", "good, neutral"),
    ],
    position: 1,
};

fn lookup(table: &[(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

impl Axis {
    fn parse(&self, raw: &str) -> String {
        let text = raw.trim().to_lowercase();
        let chars: Vec<char> = text.chars().collect();

        match chars.len() {
            1 => "unaligned".to_string(),
            2 => self
                .codes
                .iter()
                .find(|(code, _)| *code == chars[self.position])
                .map(|(_, value)| value.to_string())
                .unwrap_or_default(),
            _ => self.parse_phrase(&text),
        }
    }

    fn parse_phrase(&self, text: &str) -> String {
        if let Some(value) = lookup(self.phrases, text) {
            return value.to_string();
        }

        let mut words = text.split(' ');
        let quantifier = words.next().unwrap_or("");
        let category = words.next().unwrap_or("");
        let table = match quantifier {
            "any" => self.any,
            "not" => self.not,
            _ => return String::new(),
        };
        lookup(table, category).unwrap_or(self.all).to_string()
    }
}

/// Lawfulness axis of an alignment cell.
pub fn parse_lawfulness(input: &str) -> String {
    LAWFULNESS.parse(input)
}

/// Goodness axis of an alignment cell.
pub fn parse_goodness(input: &str) -> String {
    GOODNESS.parse(input)
}

pub fn parse_alignment(input: &str) -> Alignment {
    Alignment {
        lawfulness: parse_lawfulness(input),
        goodness: parse_goodness(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_speeds_named_segments() {
        let speeds = parse_speeds(Some("walk 30, fly 60, climb 10"));
        assert_eq!(
            speeds,
            SpeedRecord {
                walk: 30,
                swim: 0,
                fly: 60,
                climb: 10,
                burrow: 0,
            }
        );
    }

    #[test]
    fn test_parse_speeds_bare_number_is_walk() {
        let speeds = parse_speeds(Some("30"));
        assert_eq!(speeds.walk, 30);
        assert_eq!(speeds.fly, 0);

        let speeds = parse_speeds(Some("40, burrow 20"));
        assert_eq!(speeds.walk, 40);
        assert_eq!(speeds.burrow, 20);
    }

    #[test]
    fn test_parse_speeds_unknown_and_missing() {
        let speeds = parse_speeds(Some("hover 30, swim"));
        assert_eq!(speeds, SpeedRecord::default());
        assert_eq!(parse_speeds(None), SpeedRecord::default());
    }

    #[test]
    fn test_parse_senses() {
        let senses = parse_senses("darkvision 60, tremorsense 30");
        assert_eq!(senses.darkvision, 60);
        assert_eq!(senses.tremorsense, 30);
        assert_eq!(senses.blindsight, 0);

        assert_eq!(parse_senses("darkivision 60").darkvision, 60);
        assert_eq!(parse_senses("Blindsight 10 ft. (blind beyond)").blindsight, 10);
    }

    #[test]
    fn test_parse_senses_word_without_range_is_dropped() {
        assert_eq!(parse_senses("darkvision"), SenseRecord::default());
        assert_eq!(parse_senses("passive perception 12"), SenseRecord::default());
    }

    #[test]
    fn test_parse_skills_corrects_typo_and_drops_unknown() {
        let skills = parse_skills(Some("Perception, Stealth, Intimation, Juggling"));
        assert!(skills.has("perception"));
        assert!(skills.has("stealth"));
        assert!(skills.has("intimidation"));
        assert_eq!(skills.proficient().len(), 3);
    }

    #[test]
    fn test_parse_skills_multi_word() {
        let skills = parse_skills(Some("Animal Handling, sleight of hand"));
        assert!(skills.has("animal_handling"));
        assert!(skills.has("sleight_of_hand"));
        assert_eq!(parse_skills(None), SkillRecord::default());
    }

    #[test]
    fn test_parse_saving_throws() {
        let saves = parse_saving_throws(Some("Dex, WIS, temp")).unwrap();
        assert_eq!(saves.get("dex"), Some(true));
        assert_eq!(saves.get("wis"), Some(true));
        assert_eq!(saves.get("str"), Some(false));
        assert_eq!(parse_saving_throws(None).unwrap(), SavingThrowRecord::default());
    }

    #[test]
    fn test_parse_saving_throws_rejects_unknown_token() {
        let err = parse_saving_throws(Some("str, strength")).unwrap_err();
        assert!(matches!(err, BestiaryError::UnknownSavingThrow(t) if t == "strength"));
    }

    #[test]
    fn test_parse_damage_modifiers() {
        let mods = parse_damage_modifiers(Some("rescold, immunpoison, weakfire, immmunacid"));
        assert_eq!(mods.get("cold"), Some(DamageModifier::Resistance));
        assert_eq!(mods.get("poison"), Some(DamageModifier::Immunity));
        assert_eq!(mods.get("fire"), Some(DamageModifier::Weakness));
        assert_eq!(mods.get("acid"), Some(DamageModifier::Immunity));
        assert_eq!(mods.get("thunder"), None);
    }

    #[test]
    fn test_parse_damage_modifiers_short_immunity_prefixes() {
        let mods = parse_damage_modifiers(Some("immuacid, immmucold"));
        assert_eq!(mods.get("acid"), Some(DamageModifier::Immunity));
        assert_eq!(mods.get("cold"), Some(DamageModifier::Immunity));
        assert_eq!(mods.iter().filter(|(_, m)| m.is_some()).count(), 2);
    }

    #[test]
    fn test_parse_damage_modifiers_drops_unmatched() {
        let mods = parse_damage_modifiers(Some("resbananas, cold, immunparalyezd"));
        assert_eq!(mods.get("cold"), None);
        assert_eq!(mods.get("paralyezd"), Some(DamageModifier::Immunity));
        assert_eq!(mods.iter().filter(|(_, m)| m.is_some()).count(), 1);
    }

    #[test]
    fn test_parse_languages() {
        let langs = parse_languages(Some("Common, Goblin, telepathy 120 ft."));
        assert!(langs.contains("common"));
        assert!(langs.contains("goblin"));
        assert!(langs.contains("telepathy"));
        assert!(parse_languages(Some("—")).is_empty());
        assert!(parse_languages(None).is_empty());
    }

    #[test]
    fn test_parse_int_sentinel() {
        assert_eq!(parse_int(Some("15")), 15);
        assert_eq!(parse_int(Some(" 7 ")), 7);
        assert_eq!(parse_int(Some("7 (2d6)")), -1);
        assert_eq!(parse_int(None), -1);
    }

    #[test]
    fn test_split_type() {
        assert_eq!(
            split_type("Humanoid (Orc)"),
            ("humanoid".to_string(), "orc".to_string())
        );
        assert_eq!(split_type("beast"), ("beast".to_string(), String::new()));
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Sav. Throws"), "sav_throws");
        assert_eq!(normalize_header("HP"), "hp");
        assert_eq!(normalize_header("Additional Info"), "additional_info");
    }

    #[test]
    fn test_alignment_codes() {
        assert_eq!(parse_lawfulness("cg"), "chaotic");
        assert_eq!(parse_goodness("cg"), "good");
        assert_eq!(parse_lawfulness("NE"), "neutral");
        assert_eq!(parse_goodness("NE"), "evil");
        assert_eq!(parse_lawfulness("n"), "unaligned");
        assert_eq!(parse_goodness("n"), "unaligned");
    }

    #[test]
    fn test_alignment_phrases() {
        assert_eq!(parse_goodness("any evil"), "evil");
        assert_eq!(parse_lawfulness("any evil"), "chaotic, neutral, lawful");
        assert_eq!(parse_goodness("not good"), "neutral, evil");
        assert_eq!(parse_goodness("not evil"), "good, neutral");
        assert_eq!(parse_goodness("not neutral"), "good, evil");
        assert_eq!(parse_lawfulness("not lawful"), "chaotic, neutral");
        assert_eq!(parse_lawfulness("CG or NE"), "chaotic, neutral");
        assert_eq!(parse_goodness("cg or ne"), "good, evil");
        assert_eq!(parse_lawfulness("ng/ne"), "neutral");
        assert_eq!(parse_goodness("any"), "good, neutral, evil");
        assert_eq!(parse_lawfulness("not"), "chaotic, neutral, lawful");
    }

    #[test]
    fn test_alignment_unrecognized() {
        let alignment = parse_alignment("unaligned");
        assert_eq!(alignment.lawfulness, "unaligned");
        assert_eq!(alignment.goodness, "unaligned");
        assert_eq!(parse_lawfulness("sometimes evil"), "");
        assert_eq!(parse_lawfulness("xg"), "");
    }
}
