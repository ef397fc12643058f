use crate::error::{BestiaryError, Result};
use crate::table::{Table, Value};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, params_from_iter};
use std::collections::BTreeMap;

const INSERT_BATCH_LOG: usize = 1000;

/// Destination for materialized tables.
///
/// `write` replaces the whole relation named after the table: no merge, no
/// append. Writes to different relations are independent, so a failure part
/// way through a pipeline run can leave earlier relations already replaced.
pub trait TableSink {
    fn write(&mut self, table: &Table) -> Result<()>;
}

/// Keeps written tables in memory, keyed by relation name.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: BTreeMap<String, Table>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, relation: &str) -> Option<&Table> {
        self.tables.get(relation)
    }

    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn into_tables(self) -> BTreeMap<String, Table> {
        self.tables
    }
}

impl TableSink for MemorySink {
    fn write(&mut self, table: &Table) -> Result<()> {
        self.tables.insert(table.name().to_string(), table.clone());
        Ok(())
    }
}

/// SQLite store for the normalized relations.
///
/// The handle owns a connection pool; connections close when it is dropped.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn new(path: &std::path::Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(BestiaryError::Pool)?;

        tracing::debug!("Opened database {}", path.display());
        Ok(Self { pool })
    }

    /// A private in-memory database. The pool holds a single connection so
    /// that every caller sees the same data.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(BestiaryError::Pool)?;
        Ok(Self { pool })
    }

    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(BestiaryError::Pool)
    }

    /// Drop and recreate the relation named after `table`, then load its rows.
    /// The replacement of a single relation is atomic.
    pub fn replace_table(&self, table: &Table) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        let name = quote_identifier(table.name());
        tx.execute(&format!("DROP TABLE IF EXISTS {}", name), ())?;
        tx.execute(&create_table_sql(table)?, ())?;

        for column in table.columns().iter().filter(|c| c.ends_with("_id")) {
            tx.execute(
                &format!(
                    "CREATE INDEX {} ON {}({})",
                    quote_identifier(&format!("idx_{}_{}", table.name(), column)),
                    name,
                    quote_identifier(column)
                ),
                (),
            )?;
        }

        let mut column_list = vec![quote_identifier("id")];
        column_list.extend(table.columns().iter().map(|c| quote_identifier(c)));
        let placeholders: Vec<String> = (1..=column_list.len()).map(|i| format!("?{}", i)).collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            name,
            column_list.join(", "),
            placeholders.join(", ")
        );

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(&insert_sql)?;
            for row in table.rows() {
                let id = Value::Integer(row.id);
                stmt.execute(params_from_iter(std::iter::once(&id).chain(row.values.iter())))?;
                inserted += 1;
                if inserted % INSERT_BATCH_LOG == 0 {
                    tracing::trace!("{}: inserted {} rows", table.name(), inserted);
                }
            }
        }

        tx.commit()?;
        tracing::debug!("Replaced relation '{}' with {} rows", table.name(), inserted);
        Ok(inserted)
    }

    /// Whether a relation exists in the store.
    pub fn has_relation(&self, relation: &str) -> Result<bool> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [relation],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Read a whole relation back into a [`Table`], ordered by id.
    pub fn load_table(&self, relation: &str) -> Result<Table> {
        let conn = self.connection()?;
        read_table(&conn, relation)
    }
}

impl TableSink for Database {
    fn write(&mut self, table: &Table) -> Result<()> {
        self.replace_table(table).map(|_| ())
    }
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// INTEGER when every non-null value is an integer and at least one value is
/// present; TEXT otherwise.
fn column_sql_type(table: &Table, idx: usize) -> &'static str {
    let mut saw_integer = false;
    for row in table.rows() {
        match &row.values[idx] {
            Value::Null => {}
            Value::Integer(_) => saw_integer = true,
            Value::Text(_) => return "TEXT",
        }
    }
    if saw_integer { "INTEGER" } else { "TEXT" }
}

fn create_table_sql(table: &Table) -> Result<String> {
    let mut columns = vec![format!("{} INTEGER PRIMARY KEY", quote_identifier("id"))];
    for (idx, column) in table.columns().iter().enumerate() {
        if column.eq_ignore_ascii_case("id") {
            return Err(BestiaryError::Parse(format!(
                "relation '{}' has a data column named '{}', which is reserved for the row id",
                table.name(),
                column
            )));
        }
        columns.push(format!(
            "{} {}",
            quote_identifier(column),
            column_sql_type(table, idx)
        ));
    }
    Ok(format!(
        "CREATE TABLE {} (\n    {}\n)",
        quote_identifier(table.name()),
        columns.join(",\n    ")
    ))
}

fn read_table(conn: &Connection, relation: &str) -> Result<Table> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {} ORDER BY {}",
        quote_identifier(relation),
        quote_identifier("id")
    ))?;
    let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let id_idx = names
        .iter()
        .position(|c| c == "id")
        .ok_or_else(|| BestiaryError::MissingColumn(format!("{}.id", relation)))?;

    let columns: Vec<String> = names
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != id_idx)
        .map(|(_, c)| c.clone())
        .collect();
    let mut table = Table::new(relation, columns);

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(id_idx)?;
        let mut values = Vec::with_capacity(names.len() - 1);
        for idx in (0..names.len()).filter(|idx| *idx != id_idx) {
            values.push(row.get::<_, Value>(idx)?);
        }
        table.push_row(id, values);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side_table() -> Table {
        let mut table = Table::new(
            "damage_mod",
            vec![
                "cold".to_string(),
                "nonsilvered ".to_string(),
                "monster_id".to_string(),
            ],
        );
        table.push_row(
            0,
            vec![
                Value::Text("resistance".to_string()),
                Value::Null,
                Value::Integer(0),
            ],
        );
        table.push_row(4, vec![Value::Null, Value::Null, Value::Integer(4)]);
        table
    }

    #[test]
    fn test_replace_table_round_trip() {
        let db = Database::in_memory().unwrap();
        let table = side_table();
        assert_eq!(db.replace_table(&table).unwrap(), 2);

        let loaded = db.load_table("damage_mod").unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_replace_table_discards_previous_relation() {
        let db = Database::in_memory().unwrap();
        db.replace_table(&side_table()).unwrap();

        let mut smaller = Table::new("damage_mod", vec!["acid".to_string()]);
        smaller.push_row(9, vec![Value::Text("immunity".to_string())]);
        db.replace_table(&smaller).unwrap();

        let loaded = db.load_table("damage_mod").unwrap();
        assert_eq!(loaded.columns(), &["acid"]);
        assert_eq!(loaded.ids().collect::<Vec<_>>(), vec![9]);
    }

    #[test]
    fn test_column_types_are_inferred() {
        let db = Database::in_memory().unwrap();
        db.replace_table(&side_table()).unwrap();

        let conn = db.connection().unwrap();
        let mut stmt = conn
            .prepare("SELECT name, type FROM pragma_table_info('damage_mod')")
            .unwrap();
        let types: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();

        assert!(types.contains(&("id".to_string(), "INTEGER".to_string())));
        assert!(types.contains(&("cold".to_string(), "TEXT".to_string())));
        assert!(types.contains(&("nonsilvered ".to_string(), "TEXT".to_string())));
        assert!(types.contains(&("monster_id".to_string(), "INTEGER".to_string())));
    }

    #[test]
    fn test_reserved_id_column_is_rejected() {
        let db = Database::in_memory().unwrap();
        let mut table = Table::new("monster", vec!["ID".to_string()]);
        table.push_row(0, vec![Value::Integer(1)]);
        assert!(db.replace_table(&table).is_err());
        assert!(!db.has_relation("monster").unwrap());
    }

    #[test]
    fn test_memory_sink_replaces_by_name() {
        let mut sink = MemorySink::new();
        sink.write(&side_table()).unwrap();
        sink.write(&Table::new("damage_mod", vec![])).unwrap();

        assert_eq!(sink.relations().collect::<Vec<_>>(), vec!["damage_mod"]);
        assert!(sink.get("damage_mod").unwrap().is_empty());
    }

    #[test]
    fn test_on_disk_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bestiary.sqlite");
        {
            let mut db = Database::new(&path).unwrap();
            db.write(&side_table()).unwrap();
        }
        let db = Database::new(&path).unwrap();
        assert!(db.has_relation("damage_mod").unwrap());
        assert_eq!(db.load_table("damage_mod").unwrap().len(), 2);
    }
}
