use std::fmt;

use anyhow::Result;
use log::*;

use crate::model::storage::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::model::Credentials;
use crate::store::CredentialStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Anonymous => f.write_str("ANONYMOUS"),
            SessionState::Authenticated => f.write_str("AUTHENTICATED"),
        }
    }
}

/// In-memory view of the persisted credentials. Every mutation is written
/// through to the store before it is reflected here, so a restart sees the
/// same state. Tokens are never checked for shape or expiry.
pub struct Session {
    store: Box<dyn CredentialStore>,
    credentials: Credentials,
}

impl Session {
    /// Picks up whatever a previous run left in the store.
    pub fn restore(store: Box<dyn CredentialStore>) -> Session {
        let credentials = Credentials {
            access_token: store.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty()),
            refresh_token: store.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty()),
        };
        let session = Session { store, credentials };
        debug!("Restored session in state {}", session.state());
        session
    }

    pub fn set_credentials(&mut self, access_token: &str, refresh_token: &str) -> Result<()> {
        self.store.update(&[
            (ACCESS_TOKEN_KEY, Some(access_token)),
            (REFRESH_TOKEN_KEY, Some(refresh_token)),
        ])?;
        self.credentials = Credentials::new(access_token, refresh_token);
        info!("Session authenticated with token {}", mask_token(access_token));
        Ok(())
    }

    pub fn clear_credentials(&mut self) -> Result<()> {
        self.store.update(&[(ACCESS_TOKEN_KEY, None), (REFRESH_TOKEN_KEY, None)])?;
        self.credentials = Credentials::default();
        info!("Session cleared");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.access_token.is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.is_authenticated() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.credentials.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.credentials.refresh_token.as_deref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("access_token", &self.access_token().map(mask_token))
            .finish()
    }
}

/// Shows only the ends of a token, enough to tell two apart in logs.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "***".to_owned();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
