//! Client-side form checks, run before anything is sent.
//!
//! Each form validates into either the request payload or a [`FieldErrors`]
//! map keyed by field name. Server-side 422 answers are folded into the same
//! map with [`FieldErrors::from_validation`], so both kinds of failure render
//! the same way.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use itertools::Itertools;
use regex::Regex;

use crate::model::{BookDraft, BookPatch, ValidationIssue};

static ISBN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{10}(\d{3})?$").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later messages for the same field replace earlier ones.
    pub fn insert(&mut self, field: &str, message: &str) {
        self.0.insert(field.to_owned(), message.to_owned());
    }

    /// Keys each issue by `loc[1]`. Issues without a field name are skipped.
    pub fn from_validation(issues: &[ValidationIssue]) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for issue in issues {
            if let Some(field) = issue.field() {
                errors.insert(field, &issue.msg);
            }
        }
        errors
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(f, m)| (f.as_str(), m.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.iter().map(|(field, msg)| format!("{}: {}", field, msg)).join("; "))
    }
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if blank(&self.username) {
            errors.insert("username", "Please input your username!");
        }
        if self.password.is_empty() {
            errors.insert("password", "Please input your password!");
        }
        errors.into_result(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm: String,
}

impl SignupForm {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if blank(&self.username) {
            errors.insert("username", "Please input your username!");
        }
        if !EMAIL.is_match(self.email.trim()) {
            errors.insert("email", "Please input a valid email!");
        }
        if self.password.is_empty() {
            errors.insert("password", "Please input your password!");
        }
        if self.confirm.is_empty() {
            errors.insert("confirm", "Please confirm your password!");
        } else if self.confirm != self.password {
            errors.insert("confirm", "Passwords do not match!");
        }
        errors.into_result(())
    }
}

/// Raw input of the create/edit book dialog. `None` means the field was left alone.
#[derive(Debug, Clone, Default)]
pub struct BookForm {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publication_date: Option<String>,
    pub isbn: Option<String>,
    pub cover_image: Option<PathBuf>,
}

struct Checked {
    publication_date: Option<NaiveDate>,
    isbn: Option<String>,
    cover_image: Option<String>,
}

impl BookForm {
    /// For creation: title and author are mandatory.
    pub fn into_draft(self, today: NaiveDate) -> Result<BookDraft, FieldErrors> {
        let mut errors = FieldErrors::new();
        let title = self.title.clone().filter(|t| !blank(t));
        let author = self.author.clone().filter(|a| !blank(a));
        if title.is_none() {
            errors.insert("title", "Please input the title!");
        }
        if author.is_none() {
            errors.insert("author", "Please input the author!");
        }
        let checked = self.check_optional(today, &mut errors);
        errors.into_result(BookDraft {
            title: title.unwrap_or_default().trim().to_owned(),
            author: author.unwrap_or_default().trim().to_owned(),
            publication_date: checked.publication_date,
            isbn: checked.isbn,
            cover_image: checked.cover_image,
        })
    }

    /// For edits: only supplied fields are checked and sent, but a supplied
    /// title or author still can't be blank.
    pub fn into_patch(self, today: NaiveDate) -> Result<BookPatch, FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.title.as_deref().map_or(false, blank) {
            errors.insert("title", "Please input the title!");
        }
        if self.author.as_deref().map_or(false, blank) {
            errors.insert("author", "Please input the author!");
        }
        let checked = self.check_optional(today, &mut errors);
        errors.into_result(BookPatch {
            title: self.title.map(|t| t.trim().to_owned()),
            author: self.author.map(|a| a.trim().to_owned()),
            publication_date: checked.publication_date,
            isbn: checked.isbn,
            cover_image: checked.cover_image,
        })
    }

    fn check_optional(&self, today: NaiveDate, errors: &mut FieldErrors) -> Checked {
        let publication_date = match self.publication_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
                Ok(date) if date > today => {
                    errors.insert("publication_date", "Publication date cannot be in the future");
                    None
                }
                Ok(date) => Some(date),
                Err(_) => {
                    errors.insert("publication_date", "Please use the YYYY-MM-DD format");
                    None
                }
            },
        };
        let isbn = match self.isbn.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) if ISBN.is_match(raw) => Some(raw.to_owned()),
            Some(_) => {
                errors.insert("isbn", "Please enter a valid ISBN number (10 or 13 digits)");
                None
            }
        };
        let cover_image = match &self.cover_image {
            None => None,
            Some(path) => match encode_cover(path) {
                Ok(url) => Some(url),
                Err(message) => {
                    errors.insert("cover_image", &message);
                    None
                }
            },
        };
        Checked {
            publication_date,
            isbn,
            cover_image,
        }
    }
}

/// Reads a picture into a `data:` URL, the form the API stores covers in.
pub fn encode_cover(path: &Path) -> Result<String, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("Could not read {}: {}", path.display(), e))?;
    Ok(format!("data:{};base64,{}", mime_for(path), STANDARD.encode(bytes)))
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
