//! Column transform pipeline.
//!
//! Stages run in a fixed order over the raw sheet. Each column transform
//! fans its column out into a side relation that is written to the sink
//! immediately; the main table keeps only the columns not yet normalized and
//! is written last.
//!
//! Sink writes are not transactional across relations. When a stage fails,
//! relations written by earlier stages of the same run stay replaced while
//! later ones keep their contents from the previous run.

use crate::config::PipelineConfig;
use crate::database::TableSink;
use crate::error::{BestiaryError, Result};
use crate::parsers::{
    normalize_header, parse_damage_modifiers, parse_goodness, parse_int, parse_languages,
    parse_lawfulness, parse_saving_throws, parse_senses, parse_skills, parse_speeds, split_type,
};
use crate::table::{Relational, Table, Value, apply_transform};
use serde::Serialize;

/// Names of the output relations and of the shared foreign key.
pub mod relation {
    pub const MONSTER: &str = "monster";
    pub const SPEED: &str = "speed";
    pub const SKILLS: &str = "skills";
    pub const DAMAGE_MOD: &str = "damage_mod";
    pub const SENSE: &str = "sense";
    pub const SAVING_THROW: &str = "saving_throw";
    pub const LANGUAGE: &str = "language";

    pub const FOREIGN_KEY: &str = "monster_id";

    pub const ALL: [&str; 7] = [
        MONSTER,
        SPEED,
        SKILLS,
        DAMAGE_MOD,
        SENSE,
        SAVING_THROW,
        LANGUAGE,
    ];
}

/// Pipeline stages, in execution order.
pub const STAGES: [&str; 12] = [
    "normalize headers",
    "size",
    "type",
    "alignment",
    "integers",
    "speeds",
    "skills",
    "damage modifiers",
    "senses",
    "saving throws",
    "languages",
    "monster",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub rows_read: usize,
    /// Template rows removed by the size filter.
    pub rows_filtered: usize,
    /// Relations written, in write order, with their row counts.
    pub relations: Vec<(String, usize)>,
}

/// Run every stage over `raw` and write the resulting relations to `sink`.
pub fn run<S: TableSink>(raw: Table, config: &PipelineConfig, sink: &mut S) -> Result<RunReport> {
    run_with_progress(raw, config, sink, |_| {})
}

/// Like [`run`], calling `on_stage` with the name of each stage before it starts.
pub fn run_with_progress<S, P>(
    raw: Table,
    config: &PipelineConfig,
    sink: &mut S,
    mut on_stage: P,
) -> Result<RunReport>
where
    S: TableSink,
    P: FnMut(&str),
{
    let mut report = RunReport {
        rows_read: raw.len(),
        ..RunReport::default()
    };
    let mut stages = STAGES.iter();
    let mut next_stage = || {
        if let Some(&stage) = stages.next() {
            tracing::info!("Stage: {}", stage);
            on_stage(stage);
        }
    };

    next_stage();
    let mut main = normalize_headers(raw);
    main.set_name(relation::MONSTER);

    next_stage();
    report.rows_filtered = filter_sizes(&mut main)?;

    next_stage();
    split_types(&mut main)?;

    next_stage();
    derive_alignment(&mut main)?;

    next_stage();
    coerce_integers(&mut main, &config.integer_columns)?;

    next_stage();
    let main = fan_out(main, "speeds", relation::SPEED, sink, &mut report, |cell| {
        Ok(parse_speeds(cell))
    })?;

    next_stage();
    let main = fan_out(main, "skills", relation::SKILLS, sink, &mut report, |cell| {
        Ok(parse_skills(cell))
    })?;

    next_stage();
    let main = fan_out(main, "wri", relation::DAMAGE_MOD, sink, &mut report, |cell| {
        Ok(parse_damage_modifiers(cell))
    })?;

    next_stage();
    require_non_null(&main, "senses")?;
    let main = fan_out(main, "senses", relation::SENSE, sink, &mut report, |cell| {
        Ok(cell.map(parse_senses).unwrap_or_default())
    })?;

    next_stage();
    let main = fan_out(
        main,
        "sav_throws",
        relation::SAVING_THROW,
        sink,
        &mut report,
        parse_saving_throws,
    )?;

    next_stage();
    let mut main = fan_out(main, "languages", relation::LANGUAGE, sink, &mut report, |cell| {
        Ok(parse_languages(cell))
    })?;

    next_stage();
    for column in &config.dropped_columns {
        if main.has_column(column) {
            main.drop_column(column)?;
        } else {
            tracing::debug!("Column '{}' not present, nothing to drop", column);
        }
    }
    main.rename_column("monster_size", "size")?;
    main.rename_column("races", "tags")?;
    let ids: Vec<Value> = main.ids().map(Value::Integer).collect();
    main.set_column(relation::FOREIGN_KEY, ids)?;
    flush(sink, &main, &mut report)?;

    tracing::info!(
        "Pipeline wrote {} relations from {} rows ({} filtered)",
        report.relations.len(),
        report.rows_read,
        report.rows_filtered
    );
    Ok(report)
}

fn normalize_headers(raw: Table) -> Table {
    let columns: Vec<String> = raw
        .columns()
        .iter()
        .map(|c| match normalize_header(c).as_str() {
            "size" => "monster_size".to_string(),
            other => other.to_string(),
        })
        .collect();

    let mut table = Table::new(raw.name(), columns);
    for row in raw.rows() {
        table.push_row(row.id, row.values.clone());
    }
    table
}

fn require_non_null(table: &Table, column: &str) -> Result<()> {
    let idx = table.require_column(column)?;
    match table.rows().iter().find(|row| row.values[idx].is_null()) {
        Some(row) => Err(BestiaryError::NullCell {
            column: column.to_string(),
            row_id: row.id,
        }),
        None => Ok(()),
    }
}

/// Lowercase a required text column in place.
fn lowercase_column(table: &mut Table, column: &str) -> Result<()> {
    table.map_column(column, |row_id, value| match value.as_text() {
        Some(text) => Ok(Value::Text(text.to_lowercase())),
        None => Err(BestiaryError::NullCell {
            column: column.to_string(),
            row_id,
        }),
    })
}

/// Lowercase sizes and drop template rows. Returns the number of rows dropped.
fn filter_sizes(main: &mut Table) -> Result<usize> {
    lowercase_column(main, "monster_size")?;
    let idx = main.require_column("monster_size")?;

    let before = main.len();
    main.retain_rows(|row| {
        let keep = row.values[idx].as_text() != Some("varies");
        if !keep {
            tracing::debug!("Dropping template row {}", row.id);
        }
        keep
    });
    Ok(before - main.len())
}

fn split_types(main: &mut Table) -> Result<()> {
    require_non_null(main, "type")?;
    let types = main.column_values("type")?;

    let mut monster_types = Vec::with_capacity(types.len());
    let mut races = Vec::with_capacity(types.len());
    for value in types {
        let (monster_type, tags) = split_type(value.as_text().unwrap_or(""));
        monster_types.push(Value::Text(monster_type));
        races.push(Value::Text(tags));
    }

    main.set_column("type", monster_types)?;
    main.set_column("races", races)
}

fn derive_alignment(main: &mut Table) -> Result<()> {
    lowercase_column(main, "align")?;
    let aligns = main.column_values("align")?;

    let (lawfulness, goodness): (Vec<Value>, Vec<Value>) = aligns
        .iter()
        .map(|value| {
            let text = value.as_text().unwrap_or("");
            (
                Value::Text(parse_lawfulness(text)),
                Value::Text(parse_goodness(text)),
            )
        })
        .unzip();

    main.set_column("lawfulness", lawfulness)?;
    main.set_column("goodness", goodness)
}

fn coerce_integers(main: &mut Table, columns: &[String]) -> Result<()> {
    for column in columns {
        main.map_column(column, |_, value| {
            let parsed = match value {
                Value::Integer(i) => *i,
                other => parse_int(other.as_text()),
            };
            Ok(Value::Integer(parsed))
        })?;
    }
    Ok(())
}

fn flush<S: TableSink>(sink: &mut S, table: &Table, report: &mut RunReport) -> Result<()> {
    sink.write(table).map_err(|e| BestiaryError::Sink {
        relation: table.name().to_string(),
        source: Box::new(e),
    })?;
    tracing::info!("Wrote relation '{}' ({} rows)", table.name(), table.len());
    report.relations.push((table.name().to_string(), table.len()));
    Ok(())
}

fn fan_out<S, R, F>(
    main: Table,
    column: &str,
    relation: &str,
    sink: &mut S,
    report: &mut RunReport,
    parse: F,
) -> Result<Table>
where
    S: TableSink,
    R: Relational + Send,
    F: Fn(Option<&str>) -> Result<R> + Sync,
{
    let (side, main) = apply_transform(main, column, relation, relation::FOREIGN_KEY, parse)?;
    flush(sink, &side, report)?;
    Ok(main)
}
