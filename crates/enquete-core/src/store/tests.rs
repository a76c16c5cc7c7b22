use tempfile::tempdir;

use crate::models::{AnswerValue, SessionPatch, UpsertResponse};

use super::*;

fn open_store(temp: &tempfile::TempDir) -> SqliteSurveyStore {
    SqliteSurveyStore::open(temp.path().join("enquete.sqlite3")).expect("open store")
}

fn upsert(store: &SqliteSurveyStore, session_id: &str, question_id: &str, answer: AnswerValue) {
    store
        .upsert_response(&UpsertResponse {
            session_id: session_id.to_string(),
            question_id: question_id.to_string(),
            answer,
        })
        .expect("upsert response");
}

#[test]
fn create_and_get_session_round_trip() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);

    let created = store.create_session().expect("create session");
    assert_eq!(created.current_step, 0);
    assert!(!created.completed);
    assert!(created.user_id.is_none());
    assert!(created.completed_at.is_none());

    let fetched = store
        .get_session(&created.id)
        .expect("get session")
        .expect("session present");
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.current_step, 0);

    assert!(store.get_session("missing").expect("get missing").is_none());
}

#[test]
fn upsert_keeps_one_row_per_question_with_latest_value() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let session = store.create_session().expect("create session");

    upsert(&store, &session.id, "q1", AnswerValue::from("Une maison"));
    upsert(&store, &session.id, "q1", AnswerValue::from("Un appartement"));

    let responses = store.list_responses(&session.id).expect("list responses");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].question_id, "q1");
    assert_eq!(responses[0].answer, AnswerValue::from("Un appartement"));
}

#[test]
fn responses_are_listed_oldest_update_first() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let session = store.create_session().expect("create session");

    let pause = || std::thread::sleep(std::time::Duration::from_millis(2));

    upsert(&store, &session.id, "q1", AnswerValue::from("Une maison"));
    pause();
    upsert(&store, &session.id, "q2", AnswerValue::from("Une succession"));
    pause();
    // Rewriting q1 moves it behind q2 in update order.
    upsert(&store, &session.id, "q1", AnswerValue::from("Un immeuble"));

    let order: Vec<String> = store
        .list_responses(&session.id)
        .expect("list responses")
        .into_iter()
        .map(|response| response.question_id)
        .collect();
    assert_eq!(order, vec!["q2".to_string(), "q1".to_string()]);
}

#[test]
fn upsert_requires_an_existing_active_session() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);

    let err = store
        .upsert_response(&UpsertResponse {
            session_id: "missing".to_string(),
            question_id: "q1".to_string(),
            answer: AnswerValue::from("Une maison"),
        })
        .expect_err("missing session rejected");
    assert_eq!(err.code(), "NOT_FOUND");
}

#[test]
fn update_session_persists_step_changes() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let session = store.create_session().expect("create session");

    let updated = store
        .update_session(&session.id, &SessionPatch::step(4))
        .expect("update step");
    assert_eq!(updated.current_step, 4);

    let err = store
        .update_session("missing", &SessionPatch::step(1))
        .expect_err("missing session rejected");
    assert_eq!(err.code(), "NOT_FOUND");
}

#[test]
fn linking_is_idempotent_and_monotonic() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let session = store.create_session().expect("create session");

    let linked = store
        .update_session(&session.id, &SessionPatch::link("u1"))
        .expect("first link");
    assert_eq!(linked.user_id.as_deref(), Some("u1"));

    let relinked = store
        .update_session(&session.id, &SessionPatch::link("u1"))
        .expect("same link is a no-op");
    assert_eq!(relinked.user_id.as_deref(), Some("u1"));

    let err = store
        .update_session(&session.id, &SessionPatch::link("u2"))
        .expect_err("different user rejected");
    assert_eq!(err.code(), "CONFLICT");
}

#[test]
fn completion_is_terminal_and_stamped_once() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let session = store.create_session().expect("create session");

    store
        .update_session(&session.id, &SessionPatch::link("u1"))
        .expect("link");
    let completed = store
        .update_session(&session.id, &SessionPatch::complete())
        .expect("complete");
    assert!(completed.completed);
    let stamped_at = completed.completed_at.expect("completed_at stamped");

    // Idempotent re-completion leaves the stamp alone.
    let again = store
        .update_session(&session.id, &SessionPatch::complete())
        .expect("re-complete is a no-op");
    assert_eq!(again.completed_at, Some(stamped_at));

    // Same-value link stays a no-op after completion.
    store
        .update_session(&session.id, &SessionPatch::link("u1"))
        .expect("same link after completion");

    let err = store
        .update_session(&session.id, &SessionPatch::step(2))
        .expect_err("step change rejected");
    assert_eq!(err.code(), "CONFLICT");

    let err = store
        .update_session(
            &session.id,
            &SessionPatch {
                completed: Some(false),
                ..SessionPatch::default()
            },
        )
        .expect_err("reopening rejected");
    assert_eq!(err.code(), "CONFLICT");

    let err = store
        .upsert_response(&UpsertResponse {
            session_id: session.id.clone(),
            question_id: "q1".to_string(),
            answer: AnswerValue::from("late"),
        })
        .expect_err("late answer rejected");
    assert_eq!(err.code(), "CONFLICT");
    assert!(store.list_responses(&session.id).expect("list").is_empty());
}

#[test]
fn list_answers_decode_from_stored_json() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);
    let session = store.create_session().expect("create session");

    upsert(
        &store,
        &session.id,
        "q6",
        AnswerValue::List(vec![
            "Problèmes d'humidité".to_string(),
            "Autre: fuite toiture".to_string(),
        ]),
    );

    let responses = store.list_responses(&session.id).expect("list responses");
    assert_eq!(
        responses[0].answer,
        AnswerValue::List(vec![
            "Problèmes d'humidité".to_string(),
            "Autre: fuite toiture".to_string(),
        ])
    );
}

#[test]
fn account_creation_and_lookup() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);

    let identity = store
        .create_account("user@example.com", Some("User"), "salt", "digest")
        .expect("create account");
    assert_eq!(identity.email, "user@example.com");

    let err = store
        .create_account("user@example.com", None, "salt2", "digest2")
        .expect_err("duplicate email rejected");
    assert_eq!(err.code(), "CONFLICT");

    let row = store
        .find_account("user@example.com")
        .expect("find account")
        .expect("account present");
    assert_eq!(row.user_id, identity.user_id);
    assert_eq!(row.password_salt, "salt");

    assert!(store.find_account("nobody@example.com").expect("find").is_none());
}

#[test]
fn signed_in_slot_holds_one_identity() {
    let temp = tempdir().expect("tempdir");
    let store = open_store(&temp);

    assert!(store.signed_in_identity().expect("empty slot").is_none());
    assert!(!store.clear_signed_in().expect("clear empty slot"));

    let first = store
        .create_account("a@example.com", None, "s1", "d1")
        .expect("account a");
    let second = store
        .create_account("b@example.com", None, "s2", "d2")
        .expect("account b");

    store.set_signed_in(&first.user_id).expect("sign in a");
    store.set_signed_in(&second.user_id).expect("sign in b replaces a");

    let current = store
        .signed_in_identity()
        .expect("read slot")
        .expect("identity present");
    assert_eq!(current.user_id, second.user_id);

    assert!(store.clear_signed_in().expect("sign out"));
    assert!(store.signed_in_identity().expect("slot cleared").is_none());
}

#[cfg(unix)]
#[test]
fn open_hardens_database_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("enquete.sqlite3");
    let store = SqliteSurveyStore::open(&db_path).expect("open store");
    let _ = store.create_session().expect("create session");

    let mode = std::fs::metadata(&db_path)
        .expect("metadata")
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(mode, 0o600);
}
