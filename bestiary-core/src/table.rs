//! In-memory tabular data and the column transform primitive.
//!
//! A [`Table`] is a named list of columns plus rows keyed by a stable row
//! identifier (the row's position in the source sheet). Column transforms
//! consume one raw column of the main table and fan it out into a side table
//! that carries the row identifier both as its own `id` and as an explicit
//! foreign key column.

use crate::error::{BestiaryError, Result};
use rayon::prelude::*;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::collections::HashMap;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
}

impl Value {
    /// Text content of the cell; `None` for nulls and integers.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map(Value::Text).unwrap_or(Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(i) => Ok(Value::Integer(i)),
            ValueRef::Real(f) => Ok(Value::Text(f.to_string())),
            ValueRef::Text(_) | ValueRef::Blob(_) => {
                String::column_result(value).map(Value::Text)
            }
        }
    }
}

/// A parsed record that can be laid out as table cells.
pub trait Relational {
    /// Ordered `(column, value)` pairs for this record.
    fn cells(&self) -> Vec<(String, Value)>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: i64,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.rows.iter().map(|row| row.id)
    }

    /// Append a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, id: i64, mut values: Vec<Value>) {
        values.resize(self.columns.len(), Value::Null);
        self.rows.push(Row { id, values });
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| BestiaryError::MissingColumn(name.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell at `column` for the row with identifier `id`.
    pub fn cell(&self, id: i64, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows
            .iter()
            .find(|row| row.id == id)
            .map(|row| &row.values[idx])
    }

    /// Values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|row| &row.values[idx]).collect())
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        let idx = self.require_column(from)?;
        self.columns[idx] = to.to_string();
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Result<()> {
        let idx = self.require_column(name)?;
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.values.remove(idx);
        }
        Ok(())
    }

    /// Add a column, or overwrite it if it already exists.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(BestiaryError::Parse(format!(
                "column '{}' has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        let idx = match self.column_index(name) {
            Some(idx) => idx,
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.values.push(Value::Null);
                }
                self.columns.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.values[idx] = value;
        }
        Ok(())
    }

    /// Replace every value of a column in place. `f` receives the row id.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<()>
    where
        F: FnMut(i64, &Value) -> Result<Value>,
    {
        let idx = self.require_column(name)?;
        for row in &mut self.rows {
            row.values[idx] = f(row.id, &row.values[idx])?;
        }
        Ok(())
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// Build a side table from per-row records.
    ///
    /// Columns are the union of the records' columns in first-seen order; a
    /// record lacking a column gets a null there. The row id is appended as
    /// the `foreign_key` column.
    pub fn from_records(
        name: impl Into<String>,
        foreign_key: &str,
        records: Vec<(i64, Vec<(String, Value)>)>,
    ) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (_, cells) in &records {
            for (column, _) in cells {
                if column == "id" || column == foreign_key {
                    continue;
                }
                if !positions.contains_key(column) {
                    positions.insert(column.clone(), columns.len());
                    columns.push(column.clone());
                }
            }
        }

        let fk_idx = columns.len();
        columns.push(foreign_key.to_string());

        let mut table = Table::new(name, columns);
        for (id, cells) in records {
            let mut values = vec![Value::Null; fk_idx + 1];
            for (column, value) in cells {
                if let Some(&pos) = positions.get(&column) {
                    values[pos] = value;
                }
            }
            values[fk_idx] = Value::Integer(id);
            table.rows.push(Row { id, values });
        }
        table
    }
}

/// Apply a field parser to one column of `main`.
///
/// The parser runs exactly once per row on that row's raw cell. Its outputs
/// become the side table `relation`, keyed by the source row id and carrying
/// it again as `foreign_key`. The consumed column is removed from the
/// returned main table.
pub fn apply_transform<R, F>(
    mut main: Table,
    column: &str,
    relation: &str,
    foreign_key: &str,
    parse: F,
) -> Result<(Table, Table)>
where
    R: Relational + Send,
    F: Fn(Option<&str>) -> Result<R> + Sync,
{
    let idx = main.require_column(column)?;

    // Collect every outcome before failing so the first failing row in
    // table order is the one reported.
    let outcomes: Vec<Result<(i64, Vec<(String, Value)>)>> = main
        .rows
        .par_iter()
        .map(|row| {
            let record = parse(row.values[idx].as_text()).map_err(|e| BestiaryError::Transform {
                column: column.to_string(),
                row_id: row.id,
                source: Box::new(e),
            })?;
            Ok((row.id, record.cells()))
        })
        .collect();
    let records = outcomes.into_iter().collect::<Result<Vec<_>>>()?;

    let side = Table::from_records(relation, foreign_key, records);
    main.drop_column(column)?;

    tracing::debug!(
        "Split column '{}' into relation '{}' ({} rows, {} columns)",
        column,
        relation,
        side.len(),
        side.columns().len()
    );

    Ok((side, main))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn sample() -> Table {
        let mut table = Table::new("monster", vec!["name".to_string(), "note".to_string()]);
        table.push_row(0, vec![text("Goblin"), text("a")]);
        table.push_row(3, vec![text("Orc"), Value::Null]);
        table
    }

    struct Len(usize);

    impl Relational for Len {
        fn cells(&self) -> Vec<(String, Value)> {
            vec![("len".to_string(), Value::Integer(self.0 as i64))]
        }
    }

    #[test]
    fn test_push_row_pads_short_rows() {
        let mut table = Table::new("t", vec!["a".to_string(), "b".to_string()]);
        table.push_row(0, vec![text("x")]);
        assert_eq!(table.rows()[0].values, vec![text("x"), Value::Null]);
    }

    #[test]
    fn test_apply_transform_keys_side_table_by_row_id() {
        let (side, main) = apply_transform(sample(), "note", "note_len", "monster_id", |cell| {
            Ok(Len(cell.map(str::len).unwrap_or(0)))
        })
        .unwrap();

        assert_eq!(side.name(), "note_len");
        assert_eq!(side.columns(), &["len".to_string(), "monster_id".to_string()]);
        assert_eq!(side.ids().collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(side.cell(3, "monster_id"), Some(&Value::Integer(3)));
        assert_eq!(side.cell(3, "len"), Some(&Value::Integer(0)));

        assert!(!main.has_column("note"));
        assert_eq!(main.cell(3, "name"), Some(&text("Orc")));
    }

    #[test]
    fn test_apply_transform_reports_failing_row() {
        let result = apply_transform(sample(), "note", "x", "monster_id", |cell| match cell {
            Some(_) => Ok(Len(1)),
            None => Err(BestiaryError::Parse("empty".to_string())),
        });

        match result {
            Err(BestiaryError::Transform { column, row_id, .. }) => {
                assert_eq!(column, "note");
                assert_eq!(row_id, 3);
            }
            other => panic!("expected transform error, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_transform_reports_first_failing_row() {
        let mut table = Table::new("monster", vec!["note".to_string()]);
        for id in 0..200 {
            let value = if id % 3 == 0 { Value::Null } else { text("ok") };
            table.push_row(id + 10, vec![value]);
        }

        for _ in 0..5 {
            let result = apply_transform(table.clone(), "note", "x", "monster_id", |cell| match cell {
                Some(_) => Ok(Len(1)),
                None => Err(BestiaryError::Parse("empty".to_string())),
            });
            assert!(matches!(result, Err(BestiaryError::Transform { row_id: 10, .. })));
        }
    }

    #[test]
    fn test_apply_transform_missing_column() {
        let result = apply_transform(sample(), "speeds", "speed", "monster_id", |_| Ok(Len(0)));
        assert!(matches!(result, Err(BestiaryError::MissingColumn(c)) if c == "speeds"));
    }

    #[test]
    fn test_from_records_unions_dynamic_columns() {
        let records = vec![
            (0, vec![("common".to_string(), Value::Integer(1))]),
            (1, vec![
                ("common".to_string(), Value::Integer(1)),
                ("orc".to_string(), Value::Integer(1)),
            ]),
            (2, vec![]),
        ];
        let table = Table::from_records("language", "monster_id", records);

        assert_eq!(table.columns(), &["common", "orc", "monster_id"]);
        assert_eq!(table.cell(0, "orc"), Some(&Value::Null));
        assert_eq!(table.cell(1, "orc"), Some(&Value::Integer(1)));
        assert_eq!(table.cell(2, "common"), Some(&Value::Null));
    }

    #[test]
    fn test_from_records_skips_reserved_columns() {
        let records = vec![(5, vec![
            ("id".to_string(), Value::Integer(1)),
            ("monster_id".to_string(), Value::Integer(1)),
            ("elvish".to_string(), Value::Integer(1)),
        ])];
        let table = Table::from_records("language", "monster_id", records);
        assert_eq!(table.columns(), &["elvish", "monster_id"]);
        assert_eq!(table.cell(5, "monster_id"), Some(&Value::Integer(5)));
    }

    #[test]
    fn test_set_and_drop_column() {
        let mut table = sample();
        table
            .set_column("hp", vec![Value::Integer(7), Value::Integer(15)])
            .unwrap();
        assert_eq!(table.cell(0, "hp"), Some(&Value::Integer(7)));

        table.drop_column("name").unwrap();
        assert_eq!(table.columns(), &["note", "hp"]);
        assert!(table.drop_column("name").is_err());
    }

    #[test]
    fn test_retain_rows_keeps_ids() {
        let mut table = sample();
        table.retain_rows(|row| row.id != 0);
        assert_eq!(table.ids().collect::<Vec<_>>(), vec![3]);
    }
}
