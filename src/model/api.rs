use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Server assigned book identifier. The API hands out strings, but older
/// deployments used integer keys, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BookId(String);

impl BookId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for BookId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(id) => BookId(id),
            Raw::Number(id) => BookId(id.to_string()),
        })
    }
}

impl From<&str> for BookId {
    fn from(id: &str) -> Self {
        BookId(id.to_owned())
    }
}

impl From<String> for BookId {
    fn from(id: String) -> Self {
        BookId(id)
    }
}

impl From<u64> for BookId {
    fn from(id: u64) -> Self {
        BookId(id.to_string())
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Answer of the login, signup and refresh-token endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub isbn: Option<String>,
    /// Base64 data URL of the cover picture
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default, deserialize_with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
}

/// Body of `POST /books`. Absent optional fields go over the wire as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BookDraft {
    pub title: String,
    pub author: String,
    pub publication_date: Option<NaiveDate>,
    pub isbn: Option<String>,
    pub cover_image: Option<String>,
}

/// Body of `PUT /books/{id}`. Only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BookPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

impl BookPatch {
    pub fn is_empty(&self) -> bool {
        self == &BookPatch::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
}

impl Pagination {
    pub fn page_count(&self) -> u64 {
        match (self.total_pages, self.limit) {
            (Some(pages), _) => pages,
            (None, 0) => 0,
            (None, limit) => self.total.div_ceil(u64::from(limit)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookPage {
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl BookPage {
    pub fn empty(page: u32, limit: u32) -> Self {
        BookPage {
            books: vec![],
            pagination: Pagination {
                total: 0,
                page,
                limit,
                total_pages: Some(0),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibrarySummary {
    pub total_books: u64,
    #[serde(default)]
    pub recent_additions: Vec<Book>,
}

/// One entry of a 422 `detail` array, e.g. `{"loc": ["body", "email"], "msg": "invalid"}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidationIssue {
    #[serde(default)]
    pub loc: Vec<Value>,
    pub msg: String,
}

impl ValidationIssue {
    /// The form field this issue belongs to: the second `loc` segment.
    pub fn field(&self) -> Option<&str> {
        self.loc.get(1).and_then(Value::as_str).filter(|f| !f.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ErrorDetail {
    #[default]
    Missing,
    Message(String),
    Validation(Vec<ValidationIssue>),
    Other(Value),
}

/// Whatever the server said alongside a non-2xx status
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorPayload {
    pub detail: ErrorDetail,
    pub body: String,
}

impl ErrorPayload {
    pub fn from_body(body: &str) -> ErrorPayload {
        let detail = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(mut fields)) => match fields.remove("detail") {
                None | Some(Value::Null) => ErrorDetail::Missing,
                Some(Value::String(message)) => ErrorDetail::Message(message),
                Some(issues @ Value::Array(_)) => {
                    match serde_json::from_value::<Vec<ValidationIssue>>(issues.clone()) {
                        Ok(issues) => ErrorDetail::Validation(issues),
                        Err(_) => ErrorDetail::Other(issues),
                    }
                }
                Some(other) => ErrorDetail::Other(other),
            },
            _ => ErrorDetail::Missing,
        };
        ErrorPayload {
            detail,
            body: body.to_owned(),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match &self.detail {
            ErrorDetail::Message(m) => Some(m),
            _ => None,
        }
    }
}

mod timestamp {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{Deserialize, Deserializer};

    // The backend emits naive ISO timestamps, sometimes with an offset attached
    pub fn lenient<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.and_then(|raw| {
            raw.parse::<NaiveDateTime>()
                .ok()
                .or_else(|| DateTime::parse_from_rfc3339(&raw).ok().map(|t| t.naive_utc()))
        }))
    }
}
