use std::time::Instant;

use crate::catalog::{self, Question, QuestionKind};
use crate::error::{EnqueteError, Result};
use crate::models::{AnswerValue, UpsertResponse};

use super::SurveyFlow;

impl SurveyFlow {
    /// Records a choice answer with an immediate durable upsert. The raw
    /// selection is what gets written; a qualifier for the sentinel option
    /// is applied separately by [`SurveyFlow::record_other_qualifier`].
    pub fn record_answer(
        &mut self,
        question_id: &str,
        value: impl Into<AnswerValue>,
    ) -> Result<()> {
        self.ensure_collecting()?;
        let value = value.into();
        let question = self.find_question(question_id)?;
        validate_selection(question, &value)?;
        self.answers.insert(question_id.to_string(), value.clone());
        self.upsert_answer("record_answer", question_id, value)
    }

    /// Records a free-text answer. Memory updates immediately so the UI
    /// stays responsive; the durable write waits for the quiet window and
    /// only the last value of a burst is persisted.
    pub fn record_text_answer(&mut self, question_id: &str, value: &str) -> Result<()> {
        self.ensure_collecting()?;
        let question = self.find_question(question_id)?;
        if question.kind != QuestionKind::Text {
            return Err(EnqueteError::Validation(format!(
                "question {question_id} does not take free text"
            )));
        }
        self.answers
            .insert(question_id.to_string(), AnswerValue::from(value));
        let now = self.clock.now_ms();
        self.debounce.schedule(question_id, value, now);
        Ok(())
    }

    /// Re-derives and immediately persists the answer with the sentinel
    /// substituted by `"Autre: " + text`. No debounce: losing the qualifier
    /// to fast navigation is worse than the extra writes. Without a current
    /// selection there is nothing to qualify, so nothing is written.
    pub fn record_other_qualifier(&mut self, question_id: &str, text: &str) -> Result<()> {
        self.ensure_collecting()?;
        self.find_question(question_id)?;
        self.other_notes
            .insert(question_id.to_string(), text.to_string());
        let Some(selection) = self.answers.get(question_id) else {
            return Ok(());
        };
        let encoded = catalog::apply_qualifier(selection, text);
        self.upsert_answer("record_other_qualifier", question_id, encoded)
    }

    /// Flushes debounced writes whose quiet window has elapsed.
    pub fn pump(&mut self) {
        let now = self.clock.now_ms();
        let due = self.debounce.take_due(now);
        self.flush_text(due);
    }

    /// Flushes every pending debounced write regardless of deadline. Called
    /// by `finish()` and on clean presentation-layer exit.
    pub fn settle(&mut self) {
        let due = self.debounce.drain();
        self.flush_text(due);
    }

    pub fn pending_text_writes(&self) -> usize {
        self.debounce.pending_count()
    }

    /// Whether the current question satisfies the answered predicate:
    /// text answers trimmed non-empty, multi-selects non-empty, single
    /// choices present.
    pub fn is_answered(&self) -> bool {
        let question = self.current_question();
        let Some(answer) = self.answers.get(question.id) else {
            return false;
        };
        match question.kind {
            QuestionKind::Text => answer.as_scalar().is_some_and(|v| !v.trim().is_empty()),
            QuestionKind::Multiple => answer.as_list().is_some_and(|l| !l.is_empty()),
            QuestionKind::Single => answer.as_scalar().is_some_and(|v| !v.is_empty()),
        }
    }

    fn find_question(&self, question_id: &str) -> Result<&'static Question> {
        self.catalog
            .iter()
            .find(|question| question.id == question_id)
            .ok_or_else(|| EnqueteError::Validation(format!("unknown question {question_id}")))
    }

    // Flush failures are journaled only; memory keeps the value and the
    // next edit retries.
    fn flush_text(&mut self, due: Vec<(String, String)>) {
        for (question_id, value) in due {
            let started = Instant::now();
            let request = UpsertResponse {
                session_id: self.session_id.clone(),
                question_id: question_id.clone(),
                answer: AnswerValue::from(value),
            };
            match self.store.upsert_response(&request) {
                Ok(_) => self.journal.log_status(
                    "flush_text",
                    "ok",
                    started,
                    Some(&self.session_id),
                    Some(&question_id),
                    None,
                ),
                Err(err) => self.journal.log_error(
                    "flush_text",
                    started,
                    Some(&self.session_id),
                    Some(&question_id),
                    &err,
                ),
            }
        }
    }

    fn upsert_answer(
        &self,
        operation: &str,
        question_id: &str,
        answer: AnswerValue,
    ) -> Result<()> {
        let started = Instant::now();
        let request = UpsertResponse {
            session_id: self.session_id.clone(),
            question_id: question_id.to_string(),
            answer,
        };
        match self.store.upsert_response(&request) {
            Ok(_) => {
                self.journal.log_status(
                    operation,
                    "ok",
                    started,
                    Some(&self.session_id),
                    Some(question_id),
                    None,
                );
                Ok(())
            }
            Err(err) => {
                self.journal.log_error(
                    operation,
                    started,
                    Some(&self.session_id),
                    Some(question_id),
                    &err,
                );
                Err(err)
            }
        }
    }
}

fn validate_selection(question: &Question, value: &AnswerValue) -> Result<()> {
    match (question.kind, value) {
        (QuestionKind::Single, AnswerValue::Scalar(choice)) => {
            if question.options.iter().any(|option| *option == choice.as_str()) {
                Ok(())
            } else {
                Err(EnqueteError::Validation(format!(
                    "{choice:?} is not an option of question {}",
                    question.id
                )))
            }
        }
        (QuestionKind::Multiple, AnswerValue::List(choices)) => {
            if choices.is_empty() {
                return Err(EnqueteError::Validation(format!(
                    "question {} needs at least one selected option",
                    question.id
                )));
            }
            if let Some(stray) = choices
                .iter()
                .find(|choice| !question.options.iter().any(|option| *option == choice.as_str()))
            {
                return Err(EnqueteError::Validation(format!(
                    "{stray:?} is not an option of question {}",
                    question.id
                )));
            }
            Ok(())
        }
        _ => Err(EnqueteError::Validation(format!(
            "answer shape does not match the {} question {}",
            question.kind.as_str(),
            question.id
        ))),
    }
}
