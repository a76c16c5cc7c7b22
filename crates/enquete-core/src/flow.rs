use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::auth::IdentityGate;
use crate::cache::ResumeCache;
use crate::catalog::{self, Question};
use crate::error::{EnqueteError, Result};
use crate::journal::Journal;
use crate::models::{AnswerValue, ResumeEntry, SessionPatch, SurveySession};
use crate::store::SurveyStore;

mod answers;
mod completion;
mod debounce;


pub use completion::{FinishOutcome, FlowStage};
pub use debounce::{Clock, SystemClock};

use debounce::TextDebouncer;

/// Everything a flow needs, handed over explicitly at construction. The
/// flow never reaches for process-wide state.
pub struct FlowContext {
    pub store: Arc<dyn SurveyStore>,
    pub cache: ResumeCache,
    pub gate: Arc<dyn IdentityGate>,
    pub catalog: &'static [Question],
    pub journal: Journal,
    pub clock: Arc<dyn Clock>,
    pub debounce_ms: u64,
}

/// One attempt at the questionnaire: owns the authoritative
/// `(session_id, current_step)` pair, the in-memory answers, and the
/// completion state machine. Constructed through [`SurveyFlow::start`],
/// which reconciles the resume cache against the durable store.
pub struct SurveyFlow {
    store: Arc<dyn SurveyStore>,
    cache: ResumeCache,
    gate: Arc<dyn IdentityGate>,
    catalog: &'static [Question],
    journal: Journal,
    clock: Arc<dyn Clock>,
    session_id: String,
    current_step: usize,
    stage: FlowStage,
    restored: bool,
    answers: BTreeMap<String, AnswerValue>,
    other_notes: BTreeMap<String, String>,
    debounce: TextDebouncer,
}

impl std::fmt::Debug for SurveyFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurveyFlow")
            .field("session_id", &self.session_id)
            .field("current_step", &self.current_step)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

impl SurveyFlow {
    /// Cold start: resume the cached session when the store still knows it,
    /// otherwise create a fresh one. Only session creation itself is fatal;
    /// every other failure degrades to a fresh session.
    pub fn start(ctx: FlowContext) -> Result<Self> {
        let started = Instant::now();
        let FlowContext {
            store,
            cache,
            gate,
            catalog,
            journal,
            clock,
            debounce_ms,
        } = ctx;

        if catalog.is_empty() {
            return Err(EnqueteError::Validation(
                "question catalog is empty".to_string(),
            ));
        }

        let cached = match cache.load() {
            Ok(entry) => entry,
            Err(err) => {
                journal.log_warning(
                    "start_survey",
                    started,
                    None,
                    None,
                    &format!("resume slot unreadable: {err}"),
                );
                None
            }
        };

        if let Some(entry) = cached {
            match resume_session(store.as_ref(), &entry) {
                Ok(Some(session)) => {
                    let (answers, other_notes) =
                        load_answers(store.as_ref(), &journal, &entry.session_id, started);
                    let current_step = entry.current_step.min(catalog.len() - 1);
                    journal.log_status(
                        "start_survey",
                        "ok",
                        started,
                        Some(&entry.session_id),
                        None,
                        Some(serde_json::json!({
                            "restored": true,
                            "cached_step": entry.current_step,
                            "remote_step": session.current_step,
                        })),
                    );
                    return Ok(Self {
                        store,
                        cache,
                        gate,
                        catalog,
                        journal,
                        clock,
                        session_id: entry.session_id,
                        current_step,
                        stage: FlowStage::Collecting,
                        restored: true,
                        answers,
                        other_notes,
                        debounce: TextDebouncer::new(debounce_ms),
                    });
                }
                Ok(None) => {
                    let _ = cache.clear();
                    journal.log_warning(
                        "start_survey",
                        started,
                        Some(&entry.session_id),
                        None,
                        "stale resume slot discarded",
                    );
                }
                Err(err) => {
                    let _ = cache.clear();
                    journal.log_warning(
                        "start_survey",
                        started,
                        Some(&entry.session_id),
                        None,
                        &format!("cached session unavailable: {err}"),
                    );
                }
            }
        }

        let session = store.create_session()?;
        if let Err(err) = cache.save(&session.id, 0) {
            journal.log_warning(
                "start_survey",
                started,
                Some(&session.id),
                None,
                &format!("resume slot save failed: {err}"),
            );
        }
        journal.log_status(
            "start_survey",
            "ok",
            started,
            Some(&session.id),
            None,
            Some(serde_json::json!({ "restored": false })),
        );

        Ok(Self {
            store,
            cache,
            gate,
            catalog,
            journal,
            clock,
            session_id: session.id,
            current_step: 0,
            stage: FlowStage::Collecting,
            restored: false,
            answers: BTreeMap::new(),
            other_notes: BTreeMap::new(),
            debounce: TextDebouncer::new(debounce_ms),
        })
    }

    /// Moves to the next question. Requires the current question to be
    /// answered; at the last question the completion path is the only way
    /// forward. The new step is persisted best-effort.
    pub fn advance(&mut self) -> Result<usize> {
        self.ensure_collecting()?;
        if !self.is_answered() {
            return Err(EnqueteError::Validation(format!(
                "question {} is not answered yet",
                self.current_question().id
            )));
        }
        if self.current_step + 1 >= self.catalog.len() {
            return Err(EnqueteError::Validation(
                "already at the last question; use finish to complete".to_string(),
            ));
        }
        self.current_step += 1;
        self.persist_step("advance");
        Ok(self.current_step)
    }

    /// Moves back one question. Going back never changes recorded answers;
    /// re-advancing overwrites through the upsert rather than duplicating.
    pub fn retreat(&mut self) -> Result<usize> {
        self.ensure_collecting()?;
        if self.current_step == 0 {
            return Err(EnqueteError::Validation(
                "already at the first question".to_string(),
            ));
        }
        self.current_step -= 1;
        self.persist_step("retreat");
        Ok(self.current_step)
    }

    fn persist_step(&self, operation: &str) {
        let started = Instant::now();
        if let Err(err) = self
            .store
            .update_session(&self.session_id, &SessionPatch::step(self.current_step))
        {
            self.journal.log_warning(
                operation,
                started,
                Some(&self.session_id),
                None,
                &format!("step save failed: {err}"),
            );
        }
        if let Err(err) = self.cache.save(&self.session_id, self.current_step) {
            self.journal.log_warning(
                operation,
                started,
                Some(&self.session_id),
                None,
                &format!("resume slot save failed: {err}"),
            );
        }
    }

    fn ensure_collecting(&self) -> Result<()> {
        match self.stage {
            FlowStage::Collecting => Ok(()),
            FlowStage::AwaitingAuth => Err(EnqueteError::Conflict(
                "survey is awaiting authentication".to_string(),
            )),
            FlowStage::Finalizing => Err(EnqueteError::Conflict(
                "survey is finalizing".to_string(),
            )),
            FlowStage::Completed => Err(EnqueteError::Conflict(
                "session is completed".to_string(),
            )),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn stage(&self) -> FlowStage {
        self.stage
    }

    /// True when this flow picked up an earlier session instead of creating
    /// a fresh one. Consumed by the presentation layer for a transient
    /// notice; carries no further contract.
    pub fn was_restored(&self) -> bool {
        self.restored
    }

    pub fn catalog(&self) -> &'static [Question] {
        self.catalog
    }

    pub fn current_question(&self) -> &'static Question {
        &self.catalog[self.current_step]
    }

    pub fn answer(&self, question_id: &str) -> Option<&AnswerValue> {
        self.answers.get(question_id)
    }

    pub fn other_note(&self, question_id: &str) -> Option<&str> {
        self.other_notes.get(question_id).map(String::as_str)
    }

    pub fn progress_percent(&self) -> f64 {
        let total = self.catalog.len();
        ((self.current_step + 1) as f64 / total as f64) * 100.0
    }

    pub fn estimated_minutes_remaining(&self) -> u32 {
        let estimate = catalog::estimated_minutes();
        let total = u32::try_from(self.catalog.len()).unwrap_or(u32::MAX);
        let step = u32::try_from(self.current_step).unwrap_or(u32::MAX);
        estimate.saturating_sub(step.saturating_mul(estimate) / total.max(1))
    }
}

fn resume_session(
    store: &dyn SurveyStore,
    entry: &ResumeEntry,
) -> Result<Option<SurveySession>> {
    let Some(session) = store.get_session(&entry.session_id)? else {
        return Ok(None);
    };
    // A terminal session must not be re-adopted; completing conceptually
    // destroys the resume slot.
    if session.completed {
        return Ok(None);
    }
    Ok(Some(session))
}

fn load_answers(
    store: &dyn SurveyStore,
    journal: &Journal,
    session_id: &str,
    started: Instant,
) -> (BTreeMap<String, AnswerValue>, BTreeMap<String, String>) {
    let responses = match store.list_responses(session_id) {
        Ok(responses) => responses,
        Err(err) => {
            journal.log_warning(
                "start_survey",
                started,
                Some(session_id),
                None,
                &format!("existing answers unavailable: {err}"),
            );
            return (BTreeMap::new(), BTreeMap::new());
        }
    };

    let mut answers = BTreeMap::new();
    let mut other_notes = BTreeMap::new();
    for response in responses {
        let (decoded, qualifier) = catalog::decode_answer(&response.answer);
        if let Some(text) = qualifier {
            other_notes.insert(response.question_id.clone(), text);
        }
        answers.insert(response.question_id, decoded);
    }
    (answers, other_notes)
}
