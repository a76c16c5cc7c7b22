use std::path::Path;
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::{EnqueteError, Result};
use crate::models::{AnswerValue, SessionPatch, SurveyResponse, SurveySession, UpsertResponse};

mod accounts;
mod migration;

#[cfg(test)]
mod tests;

/// Durable store contract consumed by the survey flow. `SqliteSurveyStore`
/// is the shipped implementation; tests wrap it to inject failures.
pub trait SurveyStore: Send + Sync {
    fn create_session(&self) -> Result<SurveySession>;
    fn get_session(&self, id: &str) -> Result<Option<SurveySession>>;
    fn update_session(&self, id: &str, patch: &SessionPatch) -> Result<SurveySession>;
    /// Responses ordered by `updated_at` ascending.
    fn list_responses(&self, session_id: &str) -> Result<Vec<SurveyResponse>>;
    fn upsert_response(&self, request: &UpsertResponse) -> Result<SurveyResponse>;
}

#[derive(Clone)]
pub struct SqliteSurveyStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteSurveyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSurveyStore").finish_non_exhaustive()
    }
}

impl SqliteSurveyStore {
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| EnqueteError::mutex_poisoned("sqlite"))?;
        f(&conn)
    }

    fn with_tx<T>(&self, f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| EnqueteError::mutex_poisoned("sqlite"))?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        drop(conn);
        Ok(value)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        #[cfg(unix)]
        harden_sqlite_permissions(path)?;
        Ok(store)
    }
}

impl SurveyStore for SqliteSurveyStore {
    fn create_session(&self) -> Result<SurveySession> {
        let now = Utc::now();
        let session = SurveySession {
            id: Uuid::new_v4().to_string(),
            current_step: 0,
            completed: false,
            user_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.with_conn(|conn| {
            conn.execute(
                r"
                INSERT INTO survey_sessions(id, current_step, completed, user_id, created_at, updated_at, completed_at)
                VALUES (?1, 0, 0, NULL, ?2, ?2, NULL)
                ",
                params![session.id, now.to_rfc3339()],
            )?;
            Ok(())
        })?;
        Ok(session)
    }

    fn get_session(&self, id: &str) -> Result<Option<SurveySession>> {
        self.with_conn(|conn| fetch_session(conn, id))
    }

    fn update_session(&self, id: &str, patch: &SessionPatch) -> Result<SurveySession> {
        self.with_tx(|tx| {
            let Some(current) = fetch_session(tx, id)? else {
                return Err(EnqueteError::NotFound(format!("session {id}")));
            };

            if current.completed {
                if patch_is_noop(&current, patch) {
                    return Ok(current);
                }
                return Err(EnqueteError::Conflict(format!(
                    "session {id} is completed and can no longer change"
                )));
            }

            if let Some(user_id) = &patch.user_id
                && let Some(existing) = &current.user_id
                && existing != user_id
            {
                return Err(EnqueteError::Conflict(format!(
                    "session {id} is already linked to a different user"
                )));
            }

            if patch.completed == Some(false) && current.completed {
                return Err(EnqueteError::Conflict(format!(
                    "session {id} cannot be reopened"
                )));
            }

            let now = Utc::now();
            let next_step = patch.current_step.unwrap_or(current.current_step);
            let next_completed = patch.completed.unwrap_or(current.completed);
            let next_user = patch.user_id.clone().or_else(|| current.user_id.clone());
            let completed_at = if next_completed && !current.completed {
                Some(now)
            } else {
                current.completed_at
            };

            tx.execute(
                r"
                UPDATE survey_sessions
                SET current_step = ?2,
                    completed = ?3,
                    user_id = ?4,
                    updated_at = ?5,
                    completed_at = ?6
                WHERE id = ?1
                ",
                params![
                    id,
                    usize_to_i64_saturating(next_step),
                    i64::from(next_completed),
                    next_user,
                    now.to_rfc3339(),
                    completed_at.map(|at| at.to_rfc3339()),
                ],
            )?;

            fetch_session(tx, id)?
                .ok_or_else(|| EnqueteError::Internal(format!("session {id} vanished mid-update")))
        })
    }

    fn list_responses(&self, session_id: &str) -> Result<Vec<SurveyResponse>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT id, session_id, question_id, answer, created_at, updated_at
                FROM survey_responses
                WHERE session_id = ?1
                ORDER BY updated_at ASC
                ",
            )?;
            let rows = stmt.query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?;

            let mut responses = Vec::new();
            for row in rows {
                responses.push(response_from_columns(row?)?);
            }
            Ok(responses)
        })
    }

    fn upsert_response(&self, request: &UpsertResponse) -> Result<SurveyResponse> {
        self.with_tx(|tx| {
            let Some(session) = fetch_session(tx, &request.session_id)? else {
                return Err(EnqueteError::NotFound(format!(
                    "session {}",
                    request.session_id
                )));
            };
            if session.completed {
                return Err(EnqueteError::Conflict(format!(
                    "session {} is completed and rejects new answers",
                    request.session_id
                )));
            }

            let now = Utc::now().to_rfc3339();
            let answer_json = serde_json::to_string(&request.answer)?;
            tx.execute(
                r"
                INSERT INTO survey_responses(id, session_id, question_id, answer, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                ON CONFLICT(session_id, question_id) DO UPDATE SET
                  answer = excluded.answer,
                  updated_at = excluded.updated_at
                ",
                params![
                    Uuid::new_v4().to_string(),
                    request.session_id,
                    request.question_id,
                    answer_json,
                    now,
                ],
            )?;

            fetch_response(tx, &request.session_id, &request.question_id)?.ok_or_else(|| {
                EnqueteError::Internal(format!(
                    "response for session {} question {} vanished mid-upsert",
                    request.session_id, request.question_id
                ))
            })
        })
    }
}

fn patch_is_noop(current: &SurveySession, patch: &SessionPatch) -> bool {
    patch
        .current_step
        .is_none_or(|step| step == current.current_step)
        && patch
            .completed
            .is_none_or(|completed| completed == current.completed)
        && patch
            .user_id
            .as_deref()
            .is_none_or(|user_id| current.user_id.as_deref() == Some(user_id))
}

fn fetch_session(conn: &Connection, id: &str) -> Result<Option<SurveySession>> {
    let row = conn
        .query_row(
            r"
            SELECT id, current_step, completed, user_id, created_at, updated_at, completed_at
            FROM survey_sessions
            WHERE id = ?1
            ",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((id, current_step, completed, user_id, created_at, updated_at, completed_at)) = row
    else {
        return Ok(None);
    };

    Ok(Some(SurveySession {
        id,
        current_step: i64_to_usize_saturating(current_step),
        completed: completed != 0,
        user_id,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
    }))
}

fn fetch_response(
    conn: &Connection,
    session_id: &str,
    question_id: &str,
) -> Result<Option<SurveyResponse>> {
    let row = conn
        .query_row(
            r"
            SELECT id, session_id, question_id, answer, created_at, updated_at
            FROM survey_responses
            WHERE session_id = ?1 AND question_id = ?2
            ",
            params![session_id, question_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    row.map(response_from_columns).transpose()
}

type ResponseColumns = (String, String, String, String, String, String);

fn response_from_columns(columns: ResponseColumns) -> Result<SurveyResponse> {
    let (id, session_id, question_id, answer, created_at, updated_at) = columns;
    Ok(SurveyResponse {
        id,
        session_id,
        question_id,
        answer: serde_json::from_str::<AnswerValue>(&answer)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| EnqueteError::Internal(format!("invalid stored timestamp {raw:?}: {err}")))
}

fn usize_to_i64_saturating(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn i64_to_usize_saturating(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

#[cfg(unix)]
fn harden_sqlite_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for suffix in ["", "-wal", "-shm"] {
        let mut os = path.as_os_str().to_os_string();
        os.push(suffix);
        let candidate = PathBuf::from(os);
        if !candidate.exists() {
            continue;
        }
        let mut permissions = std::fs::metadata(&candidate)?.permissions();
        permissions.set_mode(0o600);
        std::fs::set_permissions(&candidate, permissions)?;
    }
    Ok(())
}
