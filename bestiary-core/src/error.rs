use thiserror::Error;

#[derive(Error, Debug)]
pub enum BestiaryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Null value in non-nullable column '{column}' (row {row_id})")]
    NullCell { column: String, row_id: i64 },

    #[error("Unrecognized saving throw: '{0}'")]
    UnknownSavingThrow(String),

    #[error("Transform of column '{column}' failed at row {row_id}: {source}")]
    Transform {
        column: String,
        row_id: i64,
        #[source]
        source: Box<BestiaryError>,
    },

    #[error("Failed to write relation '{relation}': {source}")]
    Sink {
        relation: String,
        #[source]
        source: Box<BestiaryError>,
    },

    #[error("Not found: no row {id} in '{relation}'")]
    NotFound { relation: String, id: i64 },
}

impl BestiaryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BestiaryError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, BestiaryError>;
