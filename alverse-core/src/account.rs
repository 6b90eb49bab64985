//! Sign-in, sign-up and logout against the hosted service.
//!
//! Each successful flow caches the player's identity in the durable local store
//! so the engine bridge can answer `getUserInfo` without a network call.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{AuthUser, Backend, BackendError, SignUpRequest, UserProfile};
use crate::clock::Clock;
use crate::storage::{CachedIdentity, KeyValueStore, StorageError};

const LOG_TARGET: &str = "alverse::account";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Passwords do not match!")]
    PasswordMismatch,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Fields of the sign-up form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub school_name: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpReport {
    pub identity: CachedIdentity,
    /// The account exists but the e-mail must be confirmed before signing in.
    pub confirmation_pending: bool,
}

/// Username for a new OAuth profile: provider full name, then name, then the e-mail local part.
#[must_use]
pub fn oauth_username(user: &AuthUser) -> String {
    let metadata = &user.user_metadata;
    [metadata.full_name.as_deref(), metadata.name.as_deref()]
        .into_iter()
        .flatten()
        .find(|name| !name.is_empty())
        .map_or_else(
            || {
                user.email
                    .split('@')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            },
            str::to_string,
        )
}

pub struct AccountService<B, S, C> {
    backend: B,
    local: S,
    clock: C,
}

impl<B, S, C> AccountService<B, S, C>
where
    B: Backend,
    S: KeyValueStore,
    C: Clock,
{
    pub const fn new(backend: B, local: S, clock: C) -> Self {
        Self {
            backend,
            local,
            clock,
        }
    }

    /// Password sign-in followed by a profile lookup. A missing profile is tolerated.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are rejected or the cache cannot be written.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<CachedIdentity, AccountError> {
        let session = self.backend.sign_in(email, password).await?;
        let profile = match self.backend.fetch_profile(&session.user.id).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(target: LOG_TARGET, "Profile lookup failed, continuing without it: {err}");
                None
            }
        };
        if profile.is_none() {
            warn!(target: LOG_TARGET, "No profile row for {}", session.user.id);
        }

        let identity = CachedIdentity {
            email: Some(email.to_string()),
            user_id: Some(session.user.id),
            username: profile.map(|p| p.username),
        };
        identity.save(&self.local)?;
        info!(target: LOG_TARGET, "Signed in {email}");
        Ok(identity)
    }

    /// Create an account and its profile row.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::PasswordMismatch`] before contacting the service
    /// when the confirmation differs, or the service error if sign-up fails.
    pub async fn sign_up(&self, form: &SignUpForm) -> Result<SignUpReport, AccountError> {
        if form.password != form.password_confirm {
            return Err(AccountError::PasswordMismatch);
        }

        let school_name = Some(form.school_name.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let request = SignUpRequest {
            email: form.email.clone(),
            password: form.password.clone(),
            username: form.username.clone(),
            school_name: school_name.clone(),
        };
        let outcome = self.backend.sign_up(&request).await?;

        let profile = UserProfile {
            uid: outcome.user.id.clone(),
            username: form.username.clone(),
            email: form.email.clone(),
            school_name,
            is_active: true,
            created_at: self.clock.now(),
        };
        if let Err(err) = self.backend.insert_profile(&profile).await {
            error!(target: LOG_TARGET, "Error creating user record: {err}");
        }

        let identity = CachedIdentity {
            email: Some(form.email.clone()),
            user_id: Some(outcome.user.id),
            username: Some(form.username.clone()),
        };
        identity.save(&self.local)?;
        Ok(SignUpReport {
            identity,
            confirmation_pending: outcome.confirmation_pending,
        })
    }

    /// Finish a provider redirect: get or create the profile for the live session.
    ///
    /// Returns `None` when no session is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read or the cache cannot be written.
    pub async fn complete_oauth(&self) -> Result<Option<CachedIdentity>, AccountError> {
        let Some(session) = self.backend.current_session().await? else {
            return Ok(None);
        };
        let user = session.user;

        let existing = match self.backend.fetch_profile(&user.id).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(target: LOG_TARGET, "Profile lookup failed: {err}");
                None
            }
        };
        let username = if let Some(profile) = existing {
            profile.username
        } else {
            let username = oauth_username(&user);
            let profile = UserProfile {
                uid: user.id.clone(),
                username: username.clone(),
                email: user.email.clone(),
                school_name: None,
                is_active: true,
                created_at: self.clock.now(),
            };
            if let Err(err) = self.backend.insert_profile(&profile).await {
                error!(target: LOG_TARGET, "Error creating user profile: {err}");
            }
            username
        };

        let identity = CachedIdentity {
            email: Some(user.email),
            user_id: Some(user.id),
            username: Some(username),
        };
        identity.save(&self.local)?;
        Ok(Some(identity))
    }

    /// Sign out and wipe the local cache. A service failure is logged, the cache is cleared regardless.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local store cannot be cleared.
    pub async fn logout(&self) -> Result<(), AccountError> {
        if let Err(err) = self.backend.sign_out().await {
            error!(target: LOG_TARGET, "Failed to sign out: {err}");
        }
        self.local.clear()?;
        Ok(())
    }
}
