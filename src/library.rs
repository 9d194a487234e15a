use log::*;
use thiserror::Error;

use crate::api::{ApiClient, ApiError};
use crate::cache::{BookQuery, Cached, Tag, TagCache};
use crate::model::{Book, BookDraft, BookId, BookPage, BookPatch, LibrarySummary, TokenPair};
use crate::session::Session;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Session(#[from] anyhow::Error),
    #[error("no refresh token stored, log in again")]
    NoRefreshToken,
}

impl LibraryError {
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            LibraryError::Api(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;

/// The client-side half of the catalog: remote calls, a tag-invalidated read
/// cache, and the session whose token rides along on every protected call.
#[derive(Debug)]
pub struct Library {
    api: ApiClient,
    session: Session,
    cache: TagCache<BookQuery, Cached>,
    keep_session_on_unauthorized: bool,
}

impl Library {
    pub fn new(api: ApiClient, session: Session) -> Library {
        Library {
            api,
            session,
            cache: TagCache::new(),
            keep_session_on_unauthorized: false,
        }
    }

    /// By default a 401 on a protected call logs the user out. This turns that off.
    pub fn keep_session_on_unauthorized(mut self, keep: bool) -> Library {
        self.keep_session_on_unauthorized = keep;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn cache(&self) -> &TagCache<BookQuery, Cached> {
        &self.cache
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let tokens = self.api.login(username, password).await?;
        self.adopt(tokens)
    }

    pub async fn signup(&mut self, username: &str, email: &str, password: &str) -> Result<()> {
        let tokens = self.api.signup(username, email, password).await?;
        self.adopt(tokens)
    }

    /// Explicit refresh-token exchange. Never run on its own.
    pub async fn refresh(&mut self) -> Result<()> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or(LibraryError::NoRefreshToken)?
            .to_owned();
        let result = self.api.refresh(self.session.access_token(), &refresh_token).await;
        let tokens = self.observe(result)?;
        self.adopt(tokens)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.session.clear_credentials()?;
        self.cache.clear();
        Ok(())
    }

    pub async fn list_books(&mut self, page: u32, limit: u32) -> Result<BookPage> {
        let key = BookQuery::Page { page, limit };
        if let Some(Cached::Page(cached)) = self.cache.get(&key) {
            return Ok(cached.clone());
        }
        let result = self.api.list_books(self.session.access_token(), page, limit).await;
        let fetched = self.observe(result)?;
        self.cache.insert(key, Cached::Page(fetched.clone()), &[Tag::Book]);
        Ok(fetched)
    }

    pub async fn search_books(&mut self, query: &str) -> Result<Vec<Book>> {
        let key = BookQuery::Search(query.to_owned());
        if let Some(Cached::Search(cached)) = self.cache.get(&key) {
            return Ok(cached.clone());
        }
        let result = self.api.search_books(self.session.access_token(), query).await;
        let fetched = self.observe(result)?;
        self.cache.insert(key, Cached::Search(fetched.clone()), &[Tag::Book]);
        Ok(fetched)
    }

    pub async fn summary(&mut self) -> Result<LibrarySummary> {
        let key = BookQuery::Summary;
        if let Some(Cached::Summary(cached)) = self.cache.get(&key) {
            return Ok(cached.clone());
        }
        let result = self.api.library_summary(self.session.access_token()).await;
        let fetched = self.observe(result)?;
        self.cache.insert(key, Cached::Summary(fetched.clone()), &[Tag::Book]);
        Ok(fetched)
    }

    pub async fn get_book(&mut self, id: &BookId) -> Result<Book> {
        let result = self.api.get_book(self.session.access_token(), id).await;
        Ok(self.observe(result)?)
    }

    pub async fn create_book(&mut self, draft: &BookDraft) -> Result<Book> {
        let result = self.api.create_book(self.session.access_token(), draft).await;
        let created = self.observe(result)?;
        self.cache.invalidate(&[Tag::Book]);
        Ok(created)
    }

    pub async fn update_book(&mut self, id: &BookId, patch: &BookPatch) -> Result<Book> {
        let result = self.api.update_book(self.session.access_token(), id, patch).await;
        let updated = self.observe(result)?;
        self.cache.invalidate(&[Tag::Book]);
        Ok(updated)
    }

    pub async fn delete_book(&mut self, id: &BookId) -> Result<()> {
        let result = self.api.delete_book(self.session.access_token(), id).await;
        self.observe(result)?;
        self.cache.invalidate(&[Tag::Book]);
        Ok(())
    }

    /// Forces the next read of anything book-related to go to the server.
    pub fn invalidate_books(&mut self) -> usize {
        self.cache.invalidate(&[Tag::Book])
    }

    fn adopt(&mut self, tokens: TokenPair) -> Result<()> {
        self.session
            .set_credentials(&tokens.access_token, &tokens.refresh_token)?;
        // Cached pages belong to whoever was logged in before
        self.cache.clear();
        Ok(())
    }

    // A rejected token on a protected call ends the session
    fn observe<T>(&mut self, result: std::result::Result<T, ApiError>) -> Result<T> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if err.status() == Some(401)
            && err.endpoint().is_protected()
            && self.session.is_authenticated()
            && !self.keep_session_on_unauthorized
        {
            warn!("{} rejected the session token, logging out", err.endpoint());
            self.session.clear_credentials()?;
            self.cache.clear();
        }
        Err(err.into())
    }
}
