use uuid::Uuid;

use crate::error::{EnqueteError, Result};
use crate::models::{AuthMode, Credentials, Identity};
use crate::store::SqliteSurveyStore;

/// External authentication collaborator consumed by the completion gate.
/// The flow only ever asks two things: who is signed in now, and run a
/// sign-up/sign-in exchange to produce an identity.
pub trait IdentityGate: Send + Sync {
    fn current_identity(&self) -> Result<Option<Identity>>;
    fn complete_signup_or_signin(&self, credentials: &Credentials) -> Result<Identity>;
}

const MIN_PASSWORD_LEN: usize = 6;

/// Account gate backed by the survey database: salted digests in an
/// `accounts` table plus a single signed-in slot.
#[derive(Debug, Clone)]
pub struct LocalAccountGate {
    store: SqliteSurveyStore,
}

impl LocalAccountGate {
    pub fn new(store: SqliteSurveyStore) -> Self {
        Self { store }
    }

    /// Returns whether an identity was signed in.
    pub fn sign_out(&self) -> Result<bool> {
        self.store.clear_signed_in()
    }

    fn sign_up(&self, credentials: &Credentials) -> Result<Identity> {
        let email = validate_credentials(credentials)?;
        let salt = Uuid::new_v4().to_string();
        let digest = digest_password(&salt, &credentials.password);
        let identity =
            self.store
                .create_account(email, credentials.full_name.as_deref(), &salt, &digest)?;
        self.store.set_signed_in(&identity.user_id)?;
        Ok(identity)
    }

    fn sign_in(&self, credentials: &Credentials) -> Result<Identity> {
        let email = credentials.email.trim();
        let Some(account) = self.store.find_account(email)? else {
            return Err(bad_credentials());
        };
        if digest_password(&account.password_salt, &credentials.password)
            != account.password_digest
        {
            return Err(bad_credentials());
        }
        self.store.set_signed_in(&account.user_id)?;
        Ok(Identity {
            user_id: account.user_id,
            email: account.email,
        })
    }
}

impl IdentityGate for LocalAccountGate {
    fn current_identity(&self) -> Result<Option<Identity>> {
        self.store.signed_in_identity()
    }

    fn complete_signup_or_signin(&self, credentials: &Credentials) -> Result<Identity> {
        match credentials.mode {
            AuthMode::SignUp => self.sign_up(credentials),
            AuthMode::SignIn => self.sign_in(credentials),
        }
    }
}

fn bad_credentials() -> EnqueteError {
    EnqueteError::AuthFailed("unknown email or wrong password".to_string())
}

fn validate_credentials(credentials: &Credentials) -> Result<&str> {
    let email = credentials.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(EnqueteError::Validation(
            "a valid email address is required".to_string(),
        ));
    }
    if credentials.password.len() < MIN_PASSWORD_LEN {
        return Err(EnqueteError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(email)
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().to_hex().to_string()
}
