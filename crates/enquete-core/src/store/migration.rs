use crate::error::{EnqueteError, Result};

use super::SqliteSurveyStore;

const MIGRATION_SCHEMA_SQL: &str = r"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS survey_sessions (
        id TEXT PRIMARY KEY,
        current_step INTEGER NOT NULL DEFAULT 0,
        completed INTEGER NOT NULL DEFAULT 0,
        user_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT
    );

    CREATE TABLE IF NOT EXISTS survey_responses (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL REFERENCES survey_sessions(id),
        question_id TEXT NOT NULL,
        answer TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(session_id, question_id)
    );

    CREATE INDEX IF NOT EXISTS idx_survey_responses_session_updated
    ON survey_responses(session_id, updated_at);

    CREATE TABLE IF NOT EXISTS accounts (
        user_id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        full_name TEXT,
        password_salt TEXT NOT NULL,
        password_digest TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS signed_in_state (
        slot INTEGER PRIMARY KEY CHECK (slot = 0),
        user_id TEXT NOT NULL REFERENCES accounts(user_id),
        signed_in_at TEXT NOT NULL
    );
";

impl SqliteSurveyStore {
    pub fn migrate(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| EnqueteError::mutex_poisoned("sqlite"))?;
        conn.execute_batch(MIGRATION_SCHEMA_SQL)?;
        drop(conn);
        Ok(())
    }
}
