use std::fmt;

use crate::api::ApiError;
use crate::form::FieldErrors;
use crate::library::LibraryError;
use crate::model::ErrorDetail;

pub const LOGIN_FAILED: &str = "Login failed. Please check your credentials.";
pub const SIGNUP_FAILED: &str = "Signup failed.";
pub const SIGNUP_OK: &str = "Signup successful!";
pub const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
}

/// One-shot message shown to the user after an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

impl Notification {
    pub fn success(message: &str) -> Notification {
        Notification {
            level: Level::Success,
            message: message.to_owned(),
        }
    }

    pub fn error(message: &str) -> Notification {
        Notification {
            level: Level::Error,
            message: message.to_owned(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookAction {
    Create,
    Update,
    Delete,
}

impl BookAction {
    fn verb(self) -> &'static str {
        match self {
            BookAction::Create => "create",
            BookAction::Update => "update",
            BookAction::Delete => "delete",
        }
    }

    fn past(self) -> &'static str {
        match self {
            BookAction::Create => "created",
            BookAction::Update => "updated",
            BookAction::Delete => "deleted",
        }
    }
}

pub fn book_done(action: BookAction) -> Notification {
    Notification::success(&format!("Book {} successfully!", action.past()))
}

pub fn book_failed(action: BookAction) -> Notification {
    Notification::error(&format!("Failed to {} book", action.verb()))
}

/// A rejected token reads as an expired session. Anything else is the
/// action's own failure message.
pub fn book_action_failed(action: BookAction, err: &LibraryError) -> Notification {
    match err.api() {
        Some(ApiError::Status { status: 401, endpoint, .. }) if endpoint.is_protected() => {
            Notification::error(SESSION_EXPIRED)
        }
        _ => book_failed(action),
    }
}

/// Every login failure reads the same, whatever the server said.
pub fn login_failed(_err: &LibraryError) -> Notification {
    Notification::error(LOGIN_FAILED)
}

/// How a failed form submission is shown: either against its fields, or as
/// a single notification. Never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormFailure {
    Fields(FieldErrors),
    Notice(Notification),
}

pub fn signup_failed(err: &LibraryError) -> FormFailure {
    let api = match err.api() {
        Some(api) => api,
        None => return FormFailure::Notice(describe(err)),
    };
    match (api.status(), api.payload().map(|p| &p.detail)) {
        (Some(422), Some(ErrorDetail::Validation(issues))) => {
            let fields = FieldErrors::from_validation(issues);
            if fields.is_empty() {
                FormFailure::Notice(Notification::error(SIGNUP_FAILED))
            } else {
                FormFailure::Fields(fields)
            }
        }
        (Some(422), _) => FormFailure::Notice(Notification::error(SIGNUP_FAILED)),
        (Some(_), Some(ErrorDetail::Message(detail))) => {
            FormFailure::Notice(Notification::error(detail))
        }
        (Some(_), _) => FormFailure::Notice(Notification::error(SIGNUP_FAILED)),
        (None, _) => FormFailure::Notice(describe(err)),
    }
}

/// Generic rendering for anything that is not a form submission.
pub fn describe(err: &LibraryError) -> Notification {
    match err {
        LibraryError::Api(api) => describe_api(api),
        LibraryError::Session(e) => Notification::error(&format!("Could not save the session: {:#}", e)),
        LibraryError::NoRefreshToken => Notification::error(SESSION_EXPIRED),
    }
}

fn describe_api(err: &ApiError) -> Notification {
    match err {
        ApiError::Transport { .. } => Notification::error("Could not reach the library server"),
        ApiError::Decode { .. } => Notification::error("The library server sent an unexpected response"),
        ApiError::Status { status: 401, endpoint, .. } if endpoint.is_protected() => {
            Notification::error(SESSION_EXPIRED)
        }
        ApiError::Status { status, payload, .. } => match payload.message() {
            Some(detail) => Notification::error(detail),
            None => Notification::error(&format!("Request failed (HTTP {})", status)),
        },
    }
}
