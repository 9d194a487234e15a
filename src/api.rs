use std::fmt;

use log::*;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::model::api::{LoginRequest, RefreshRequest, SignupRequest};
use crate::model::{
    Book, BookDraft, BookId, BookPage, BookPatch, ErrorDetail, ErrorPayload, LibrarySummary,
    TokenPair,
};

/// Every remote capability the client knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    Signup,
    RefreshToken,
    ListBooks,
    GetBook,
    SearchBooks,
    LibrarySummary,
    CreateBook,
    UpdateBook,
    DeleteBook,
}

impl Endpoint {
    pub const ALL: [Endpoint; 10] = [
        Endpoint::Login,
        Endpoint::Signup,
        Endpoint::RefreshToken,
        Endpoint::ListBooks,
        Endpoint::GetBook,
        Endpoint::SearchBooks,
        Endpoint::LibrarySummary,
        Endpoint::CreateBook,
        Endpoint::UpdateBook,
        Endpoint::DeleteBook,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Login => "login",
            Endpoint::Signup => "signup",
            Endpoint::RefreshToken => "refresh-token",
            Endpoint::ListBooks => "list-books",
            Endpoint::GetBook => "get-book",
            Endpoint::SearchBooks => "search-books",
            Endpoint::LibrarySummary => "library-summary",
            Endpoint::CreateBook => "create-book",
            Endpoint::UpdateBook => "update-book",
            Endpoint::DeleteBook => "delete-book",
        }
    }

    /// Login and signup are the only calls that never carry a bearer token.
    pub fn sends_bearer(self) -> bool {
        !matches!(self, Endpoint::Login | Endpoint::Signup)
    }

    /// A 401 here means the session token was rejected, not that the user
    /// typed the wrong password.
    pub fn is_protected(self) -> bool {
        !matches!(self, Endpoint::Login | Endpoint::Signup | Endpoint::RefreshToken)
    }

    pub fn mutates_books(self) -> bool {
        matches!(self, Endpoint::CreateBook | Endpoint::UpdateBook | Endpoint::DeleteBook)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{endpoint} request failed: {source}")]
    Transport {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} failed with HTTP {status}{}", describe(.payload))]
    Status {
        endpoint: Endpoint,
        status: u16,
        payload: ErrorPayload,
    },
    #[error("{endpoint} returned an unexpected body: {source}")]
    Decode {
        endpoint: Endpoint,
        #[source]
        source: serde_json::Error,
    },
}

fn describe(payload: &ErrorPayload) -> String {
    match &payload.detail {
        ErrorDetail::Message(m) => format!(": {}", m),
        ErrorDetail::Validation(issues) => format!(": {} validation issue(s)", issues.len()),
        _ => String::new(),
    }
}

impl ApiError {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            ApiError::Transport { endpoint, .. }
            | ApiError::Status { endpoint, .. }
            | ApiError::Decode { endpoint, .. } => *endpoint,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&ErrorPayload> {
        match self {
            ApiError::Status { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// 401 or 403
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    pub fn is_validation(&self) -> bool {
        self.status() == Some(422)
    }
}

/// Thin typed wrapper over the library REST API. Holds no session state:
/// callers hand in the current access token per call.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: Url) -> ApiClient {
        ApiClient {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let body = LoginRequest {
            username: username.to_owned(),
            password: password.to_owned(),
        };
        let request = self.request(Endpoint::Login, Method::POST, &["login"], None).json(&body);
        let response = send(Endpoint::Login, request).await?;
        decode(Endpoint::Login, response).await
    }

    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Result<TokenPair, ApiError> {
        let body = SignupRequest {
            username: username.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let request = self.request(Endpoint::Signup, Method::POST, &["signup"], None).json(&body);
        let response = send(Endpoint::Signup, request).await?;
        decode(Endpoint::Signup, response).await
    }

    pub async fn refresh(&self, token: Option<&str>, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_owned(),
        };
        let request = self
            .request(Endpoint::RefreshToken, Method::POST, &["refresh-token"], token)
            .json(&body);
        let response = send(Endpoint::RefreshToken, request).await?;
        decode(Endpoint::RefreshToken, response).await
    }

    /// One page of the catalog. The server answers an empty page with 404,
    /// which comes back here as a page with no books.
    pub async fn list_books(&self, token: Option<&str>, page: u32, limit: u32) -> Result<BookPage, ApiError> {
        let request = self
            .request(Endpoint::ListBooks, Method::GET, &["books"], token)
            .query(&[("page", page), ("limit", limit)]);
        match send(Endpoint::ListBooks, request).await {
            Ok(response) => decode(Endpoint::ListBooks, response).await,
            Err(ApiError::Status { status: 404, .. }) => {
                debug!("Page {} (limit {}) is empty", page, limit);
                Ok(BookPage::empty(page, limit))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_book(&self, token: Option<&str>, id: &BookId) -> Result<Book, ApiError> {
        let request = self.request(Endpoint::GetBook, Method::GET, &["books", id.as_str()], token);
        let response = send(Endpoint::GetBook, request).await?;
        decode(Endpoint::GetBook, response).await
    }

    pub async fn search_books(&self, token: Option<&str>, query: &str) -> Result<Vec<Book>, ApiError> {
        let request = self
            .request(Endpoint::SearchBooks, Method::GET, &["books", "search"], token)
            .query(&[("search_query", query)]);
        let response = send(Endpoint::SearchBooks, request).await?;
        decode(Endpoint::SearchBooks, response).await
    }

    pub async fn library_summary(&self, token: Option<&str>) -> Result<LibrarySummary, ApiError> {
        let request = self.request(Endpoint::LibrarySummary, Method::GET, &["library-summary"], token);
        let response = send(Endpoint::LibrarySummary, request).await?;
        decode(Endpoint::LibrarySummary, response).await
    }

    pub async fn create_book(&self, token: Option<&str>, draft: &BookDraft) -> Result<Book, ApiError> {
        let request = self
            .request(Endpoint::CreateBook, Method::POST, &["books"], token)
            .json(draft);
        let response = send(Endpoint::CreateBook, request).await?;
        decode(Endpoint::CreateBook, response).await
    }

    pub async fn update_book(&self, token: Option<&str>, id: &BookId, patch: &BookPatch) -> Result<Book, ApiError> {
        let request = self
            .request(Endpoint::UpdateBook, Method::PUT, &["books", id.as_str()], token)
            .json(patch);
        let response = send(Endpoint::UpdateBook, request).await?;
        decode(Endpoint::UpdateBook, response).await
    }

    pub async fn delete_book(&self, token: Option<&str>, id: &BookId) -> Result<(), ApiError> {
        let request = self.request(Endpoint::DeleteBook, Method::DELETE, &["books", id.as_str()], token);
        send(Endpoint::DeleteBook, request).await?;
        Ok(())
    }

    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // http(s) URLs always have a path to extend
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, endpoint: Endpoint, method: Method, segments: &[&str], token: Option<&str>) -> RequestBuilder {
        let url = self.url(segments);
        let bearer = token.filter(|_| endpoint.sends_bearer());
        debug!("{} {} (bearer: {})", method, url.path(), bearer.is_some());
        let request = self.http.request(method, url);
        match bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn send(endpoint: Endpoint, request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request
        .send()
        .await
        .map_err(|source| ApiError::Transport { endpoint, source })?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!("{} answered {}", endpoint, status);
        return Err(ApiError::Status {
            endpoint,
            status: status.as_u16(),
            payload: ErrorPayload::from_body(&body),
        });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(endpoint: Endpoint, response: Response) -> Result<T, ApiError> {
    let body = response
        .text()
        .await
        .map_err(|source| ApiError::Transport { endpoint, source })?;
    serde_json::from_str(&body).map_err(|source| ApiError::Decode { endpoint, source })
}
