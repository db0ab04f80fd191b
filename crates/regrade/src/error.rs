use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("migration {version} has no revert")]
    IrreversibleMigration { version: String },

    #[error("reverting migration {version} discards data: {note}")]
    LossyRevert { version: String, note: String },

    #[error("finalization blocked: {description} ({blocked_rows} rows still pending)")]
    FinalizationBlocked {
        description: String,
        blocked_rows: u64,
    },
}
