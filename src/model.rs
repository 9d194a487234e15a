// Wire shapes exchanged with the library API, and what we keep on disk between runs
pub mod api;
pub mod storage;

pub use api::{
    Book, BookDraft, BookId, BookPage, BookPatch, ErrorDetail, ErrorPayload, LibrarySummary,
    Pagination, TokenPair, ValidationIssue,
};
pub use storage::Credentials;
