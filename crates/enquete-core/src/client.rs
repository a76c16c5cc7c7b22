use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::auth::{IdentityGate, LocalAccountGate};
use crate::cache::ResumeCache;
use crate::catalog;
use crate::config::AppConfig;
use crate::error::{EnqueteError, Result};
use crate::flow::{FlowContext, SurveyFlow, SystemClock};
use crate::journal::Journal;
use crate::models::{
    AnswerEntry, AnswerValue, CompletionReceipt, Credentials, Identity, SessionPatch,
    StatusSnapshot, SurveySummary,
};
use crate::store::{SqliteSurveyStore, SurveyStore};

/// Application facade wiring the store, resume cache, account gate and
/// journal under one root directory. Every CLI command goes through here.
#[derive(Clone)]
pub struct Enquete {
    store: SqliteSurveyStore,
    cache: ResumeCache,
    gate: LocalAccountGate,
    journal: Journal,
    config: AppConfig,
}

impl std::fmt::Debug for Enquete {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enquete").finish_non_exhaustive()
    }
}

impl Enquete {
    pub fn new(root_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(root_dir, AppConfig::from_env())
    }

    pub fn with_config(root_dir: impl Into<PathBuf>, config: AppConfig) -> Result<Self> {
        let root = root_dir.into();
        fs::create_dir_all(&root)?;
        let store = SqliteSurveyStore::open(root.join("enquete.sqlite3"))?;
        let gate = LocalAccountGate::new(store.clone());
        let cache = ResumeCache::new(root.join("resume.json"));
        let journal = if config.journal_enabled {
            Journal::new(root.join("journal.jsonl"))
        } else {
            Journal::disabled()
        };
        Ok(Self {
            store,
            cache,
            gate,
            journal,
            config,
        })
    }

    /// Cold-starts a survey flow: resumes the cached session when the store
    /// still knows it, creates a fresh one otherwise.
    pub fn survey(&self) -> Result<SurveyFlow> {
        SurveyFlow::start(FlowContext {
            store: Arc::new(self.store.clone()),
            cache: self.cache.clone(),
            gate: Arc::new(self.gate.clone()),
            catalog: catalog::questions(),
            journal: self.journal.clone(),
            clock: Arc::new(SystemClock),
            debounce_ms: self.config.debounce_ms,
        })
    }

    /// Completes the cached pending session with the currently signed-in
    /// identity, without an active flow instance. This is the out-of-band
    /// path taken after an interrupted sign-up: the resume slot still points
    /// at the session, the account now exists, nothing else is in flight.
    pub fn finalize_pending(&self) -> Result<Option<CompletionReceipt>> {
        let started = Instant::now();
        let Some(entry) = self.cache.load()? else {
            return Ok(None);
        };
        let Some(session) = self.store.get_session(&entry.session_id)? else {
            let _ = self.cache.clear();
            self.journal.log_warning(
                "finalize_pending",
                started,
                Some(&entry.session_id),
                None,
                "stale resume slot discarded",
            );
            return Ok(None);
        };
        if session.completed {
            let _ = self.cache.clear();
            return Ok(None);
        }
        let Some(identity) = self.gate.current_identity()? else {
            return Err(EnqueteError::AuthFailed(
                "no signed-in identity to finalize with".to_string(),
            ));
        };

        let result = self.finalize_session(&session.id, &identity.user_id);
        match &result {
            Ok(receipt) => self.journal.log_status(
                "finalize_pending",
                "ok",
                started,
                Some(&session.id),
                None,
                Some(serde_json::json!({ "user_id": receipt.user_id })),
            ),
            Err(err) => self
                .journal
                .log_error("finalize_pending", started, Some(&session.id), None, err),
        }
        result.map(Some)
    }

    fn finalize_session(&self, session_id: &str, user_id: &str) -> Result<CompletionReceipt> {
        self.store
            .update_session(session_id, &SessionPatch::link(user_id))?;
        let completed = self
            .store
            .update_session(session_id, &SessionPatch::complete())?;
        self.cache.clear()?;
        Ok(CompletionReceipt {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            completed_at: completed.completed_at.unwrap_or(completed.updated_at),
        })
    }

    /// Session summary joined with the catalog, in catalog order, for the
    /// post-completion results view. Answers are returned as stored.
    pub fn results(&self, session_id: &str) -> Result<SurveySummary> {
        let Some(session) = self.store.get_session(session_id)? else {
            return Err(EnqueteError::NotFound(format!("session {session_id}")));
        };
        let responses = self.store.list_responses(session_id)?;
        let by_question: BTreeMap<&str, &AnswerValue> = responses
            .iter()
            .map(|response| (response.question_id.as_str(), &response.answer))
            .collect();
        let entries = catalog::questions()
            .iter()
            .filter_map(|question| {
                by_question.get(question.id).map(|answer| AnswerEntry {
                    question_id: question.id.to_string(),
                    section: question.section.to_string(),
                    prompt: question.prompt.to_string(),
                    answer: (*answer).clone(),
                })
            })
            .collect();
        Ok(SurveySummary {
            session,
            total_questions: catalog::total_questions(),
            entries,
        })
    }

    /// Snapshot of the resume slot and the session it references, without
    /// starting a flow or mutating anything.
    pub fn resume_state(&self) -> Result<StatusSnapshot> {
        let cache = self.cache.load()?;
        let session = match &cache {
            Some(entry) => self.store.get_session(&entry.session_id)?,
            None => None,
        };
        let answered = match &session {
            Some(session) => self.store.list_responses(&session.id)?.len(),
            None => 0,
        };
        Ok(StatusSnapshot {
            cache,
            session,
            answered,
            total_questions: catalog::total_questions(),
        })
    }

    /// Abandons local progress by clearing the resume slot. The remote
    /// session is left in place and stays reachable by id.
    pub fn reset(&self) -> Result<bool> {
        self.cache.clear()
    }

    pub fn authenticate(&self, credentials: &Credentials) -> Result<Identity> {
        self.gate.complete_signup_or_signin(credentials)
    }

    pub fn current_identity(&self) -> Result<Option<Identity>> {
        self.gate.current_identity()
    }

    pub fn sign_out(&self) -> Result<bool> {
        self.gate.sign_out()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::models::AuthMode;

    use super::*;

    fn app(temp: &tempfile::TempDir) -> Enquete {
        let config = AppConfig {
            debounce_ms: 0,
            journal_enabled: true,
        };
        Enquete::with_config(temp.path(), config).expect("open app")
    }

    fn signup(app: &Enquete, email: &str) -> Identity {
        app.authenticate(&Credentials {
            mode: AuthMode::SignUp,
            email: email.to_string(),
            password: "motdepasse".to_string(),
            full_name: None,
        })
        .expect("sign up")
    }

    #[test]
    fn survey_resumes_through_the_facade() {
        let temp = tempdir().expect("tempdir");
        let app = app(&temp);

        let session_id;
        {
            let mut flow = app.survey().expect("start");
            session_id = flow.session_id().to_string();
            flow.record_answer("q1", "Une maison").expect("q1");
            flow.advance().expect("advance");
        }

        let flow = app.survey().expect("restart");
        assert!(flow.was_restored());
        assert_eq!(flow.session_id(), session_id);
        assert_eq!(flow.current_step(), 1);
        assert_eq!(flow.answer("q1"), Some(&AnswerValue::from("Une maison")));
    }

    #[test]
    fn finalize_pending_completes_the_cached_session() {
        let temp = tempdir().expect("tempdir");
        let app = app(&temp);

        let session_id = {
            let flow = app.survey().expect("start");
            flow.session_id().to_string()
        };

        // No identity yet: the pending session cannot be finalized.
        let err = app.finalize_pending().expect_err("no identity");
        assert_eq!(err.code(), "AUTH_FAILED");

        let identity = signup(&app, "user@example.com");
        let receipt = app
            .finalize_pending()
            .expect("finalize")
            .expect("receipt present");
        assert_eq!(receipt.session_id, session_id);
        assert_eq!(receipt.user_id, identity.user_id);

        let summary = app.results(&session_id).expect("results");
        assert!(summary.session.completed);
        assert_eq!(summary.session.user_id, Some(identity.user_id));

        // Slot cleared: nothing pending anymore.
        assert!(app.finalize_pending().expect("idempotent").is_none());
        assert!(app.resume_state().expect("status").cache.is_none());
    }

    #[test]
    fn finalize_pending_discards_a_stale_slot() {
        let temp = tempdir().expect("tempdir");
        let app = app(&temp);
        ResumeCache::new(temp.path().join("resume.json"))
            .save("ghost-session", 2)
            .expect("stale slot");

        assert!(app.finalize_pending().expect("finalize").is_none());
        assert!(app.resume_state().expect("status").cache.is_none());
    }

    #[test]
    fn results_follow_catalog_order() {
        let temp = tempdir().expect("tempdir");
        let app = app(&temp);

        let mut flow = app.survey().expect("start");
        // Recorded out of order on purpose.
        flow.record_answer("q6", vec!["Aucun problème".to_string()])
            .expect("q6");
        flow.record_answer("q1", "Un appartement").expect("q1");
        let session_id = flow.session_id().to_string();

        let summary = app.results(&session_id).expect("results");
        assert_eq!(summary.total_questions, 7);
        let order: Vec<&str> = summary
            .entries
            .iter()
            .map(|entry| entry.question_id.as_str())
            .collect();
        assert_eq!(order, vec!["q1", "q6"]);

        let err = app.results("missing").expect_err("unknown session");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn resume_state_reports_progress() {
        let temp = tempdir().expect("tempdir");
        let app = app(&temp);

        let empty = app.resume_state().expect("status");
        assert!(empty.cache.is_none());
        assert!(empty.session.is_none());
        assert_eq!(empty.answered, 0);

        let mut flow = app.survey().expect("start");
        flow.record_answer("q1", "Une maison").expect("q1");
        flow.advance().expect("advance");

        let status = app.resume_state().expect("status");
        assert_eq!(
            status.cache.as_ref().map(|entry| entry.current_step),
            Some(1)
        );
        assert_eq!(status.answered, 1);
        assert_eq!(status.total_questions, 7);

        assert!(app.reset().expect("reset"));
        assert!(app.resume_state().expect("status").cache.is_none());
    }
}
