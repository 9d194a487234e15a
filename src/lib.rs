pub mod api;
pub mod cache;
pub mod config;
pub mod form;
pub mod guard;
pub mod library;
pub mod model;
pub mod notify;
pub mod session;
pub mod store;
pub mod view;

pub use api::{ApiClient, ApiError, Endpoint};
pub use cache::{BookQuery, Tag, TagCache};
pub use config::Config;
pub use form::{BookForm, FieldErrors, LoginForm, SignupForm};
pub use guard::{Redirect, Route};
pub use library::{Library, LibraryError};
pub use model::{Book, BookDraft, BookId, BookPage, BookPatch, Credentials, Pagination};
pub use notify::{BookAction, FormFailure, Notification};
pub use session::{Session, SessionState};
pub use store::{CredentialStore, FileStore, MemoryStore};
