//! End-to-end behaviour of the client against a mock library API.

use bookcase::guard::{self, Route};
use bookcase::notify::{self, BookAction, FormFailure};
use bookcase::{
    ApiClient, BookDraft, BookId, BookPatch, CredentialStore, FileStore, Library, MemoryStore,
    Session,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "access-token-0123456789";

fn library(server: &MockServer, token: Option<&str>) -> Library {
    let mut store = MemoryStore::default();
    if let Some(token) = token {
        store.set("accessToken", token).unwrap();
        store.set("refreshToken", "refresh-token").unwrap();
    }
    let api = ApiClient::new(Url::parse(&server.uri()).unwrap());
    Library::new(api, Session::restore(Box::new(store)))
}

fn book(id: u64, title: &str) -> Value {
    json!({"id": id, "title": title, "author": "Octavia E. Butler",
           "publication_date": "1993-10-01", "isbn": null, "cover_image": null})
}

fn page(books: Vec<Value>, total: u64) -> Value {
    json!({"books": books, "pagination": {"total": total, "page": 1, "limit": 10}})
}

fn draft() -> BookDraft {
    BookDraft {
        title: "Kindred".into(),
        author: "Octavia E. Butler".into(),
        ..Default::default()
    }
}

async fn mount_list(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn auth_headers(requests: &[wiremock::Request]) -> Vec<(String, Option<String>)> {
    requests
        .iter()
        .map(|r| {
            (
                r.url.path().to_owned(),
                r.headers
                    .get("authorization")
                    .map(|v| v.to_str().unwrap().to_owned()),
            )
        })
        .collect()
}

#[tokio::test]
async fn bearer_rides_on_everything_but_login_and_signup() {
    let server = MockServer::start().await;
    let tokens = json!({"access_token": TOKEN, "refresh_token": "r", "token_type": "bearer"});
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens.clone()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens))
        .mount(&server)
        .await;
    mount_list(&server, page(vec![], 0)).await;
    Mock::given(method("POST"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(book(1, "Kindred")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/books/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(book(1, "Kindred")))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/books/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    // Already logged in: login and signup still must not send the old token
    let mut library = library(&server, Some(TOKEN));
    library.login("reader", "secret").await.unwrap();
    library.signup("reader", "reader@example.com", "secret").await.unwrap();
    library.list_books(1, 10).await.unwrap();
    library.create_book(&draft()).await.unwrap();
    let patch = BookPatch {
        title: Some("Kindred".into()),
        ..Default::default()
    };
    library.update_book(&BookId::from(1), &patch).await.unwrap();
    library.delete_book(&BookId::from(1)).await.unwrap();

    let bearer = Some(format!("Bearer {}", TOKEN));
    let seen = auth_headers(&server.received_requests().await.unwrap());
    assert_eq!(
        seen,
        vec![
            ("/login".to_owned(), None),
            ("/signup".to_owned(), None),
            ("/books".to_owned(), bearer.clone()),
            ("/books".to_owned(), bearer.clone()),
            ("/books/1".to_owned(), bearer.clone()),
            ("/books/1".to_owned(), bearer),
        ]
    );
}

#[tokio::test]
async fn no_token_means_no_authorization_header() {
    let server = MockServer::start().await;
    mount_list(&server, page(vec![], 0)).await;

    let mut library = library(&server, None);
    library.list_books(1, 10).await.unwrap();

    let seen = auth_headers(&server.received_requests().await.unwrap());
    assert_eq!(seen, vec![("/books".to_owned(), None)]);
}

#[tokio::test]
async fn list_sends_page_and_limit_and_is_cached_per_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books"))
        .and(query_param("page", "1"))
        .and(query_param("limit", "10"))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![book(1, "Kindred")], 1)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/books"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![book(1, "Kindred")], 1)))
        .expect(1)
        .mount(&server)
        .await;

    let mut library = library(&server, Some(TOKEN));
    let first = library.list_books(1, 10).await.unwrap();
    let second = library.list_books(1, 10).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.books[0].title, "Kindred");
    library.list_books(1, 20).await.unwrap();
    assert_eq!(library.cache().len(), 2);
}

#[tokio::test]
async fn every_mutation_forces_a_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![book(1, "Kindred")], 1)))
        // initial read, then one after each of the three mutations
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/books"))
        .and(body_json(json!({"title": "Kindred", "author": "Octavia E. Butler",
                              "publication_date": null, "isbn": null, "cover_image": null})))
        .respond_with(ResponseTemplate::new(201).set_body_json(book(2, "Kindred")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/books/2"))
        .and(body_json(json!({"isbn": "0807083690"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(book(2, "Kindred")))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/books/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detail": "Book deleted successfully"})))
        .mount(&server)
        .await;

    let mut library = library(&server, Some(TOKEN));
    let id = BookId::from(2);
    let patch = BookPatch {
        isbn: Some("0807083690".into()),
        ..Default::default()
    };

    library.list_books(1, 10).await.unwrap();
    let created = library.create_book(&draft()).await.unwrap();
    assert_eq!(created.id, id);
    assert!(library.cache().is_empty());
    library.list_books(1, 10).await.unwrap();
    library.update_book(&id, &patch).await.unwrap();
    library.list_books(1, 10).await.unwrap();
    library.delete_book(&id).await.unwrap();
    library.list_books(1, 10).await.unwrap();
}

#[tokio::test]
async fn deleted_book_disappears_from_the_next_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![book(4, "Kindred"), book(5, "Dawn")], 2)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![book(4, "Kindred")], 1)))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/books/5"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut library = library(&server, Some(TOKEN));
    let before = library.list_books(1, 10).await.unwrap();
    assert!(before.books.iter().any(|b| b.id == BookId::from(5)));

    library.delete_book(&BookId::from(5)).await.unwrap();
    let after = library.list_books(1, 10).await.unwrap();
    assert!(after.books.iter().all(|b| b.id != BookId::from(5)));
    assert_eq!(after.pagination.total, 1);
}

#[tokio::test]
async fn failed_delete_keeps_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![book(5, "Dawn")], 1)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/books/5"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "Server error"})))
        .mount(&server)
        .await;

    let mut library = library(&server, Some(TOKEN));
    library.list_books(1, 10).await.unwrap();

    let err = library.delete_book(&BookId::from(5)).await.unwrap_err();
    assert_eq!(err.api().and_then(|e| e.status()), Some(500));
    let notice = notify::book_action_failed(BookAction::Delete, &err);
    assert!(notice.is_error());
    assert_eq!(notice.message, "Failed to delete book");

    assert_eq!(library.cache().len(), 1);
    let cached = library.list_books(1, 10).await.unwrap();
    assert_eq!(cached.books[0].id, BookId::from(5));
    assert!(library.session().is_authenticated());
}

#[tokio::test]
async fn empty_page_comes_back_as_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "No books found"})))
        .mount(&server)
        .await;

    let mut library = library(&server, Some(TOKEN));
    let empty = library.list_books(3, 20).await.unwrap();
    assert!(empty.books.is_empty());
    assert_eq!(empty.pagination.total, 0);
    assert_eq!(empty.pagination.page, 3);
}

#[tokio::test]
async fn signup_validation_errors_land_on_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signup"))
        .and(body_json(json!({"username": "reader", "email": "bad", "password": "secret"})))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({"detail": [{"loc": ["body", "email"], "msg": "invalid"}]})),
        )
        .mount(&server)
        .await;

    let mut library = library(&server, None);
    let err = library.signup("reader", "bad", "secret").await.unwrap_err();
    match notify::signup_failed(&err) {
        FormFailure::Fields(fields) => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields.get("email"), Some("invalid"));
        }
        FormFailure::Notice(n) => panic!("expected field errors, got notice {:?}", n),
    }
    assert!(!library.session().is_authenticated());
}

#[tokio::test]
async fn signup_conflict_is_a_single_notice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signup"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Email already registered"})),
        )
        .mount(&server)
        .await;

    let mut library = library(&server, None);
    let err = library.signup("reader", "reader@example.com", "secret").await.unwrap_err();
    match notify::signup_failed(&err) {
        FormFailure::Notice(n) => assert_eq!(n.message, "Email already registered"),
        FormFailure::Fields(f) => panic!("expected a notice, got fields {:?}", f),
    }
}

#[tokio::test]
async fn login_persists_tokens_across_restart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(json!({"username": "reader", "password": "secret"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": TOKEN, "refresh_token": "r-1"})),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("credentials.json");
    let api = ApiClient::new(Url::parse(&server.uri()).unwrap());

    {
        let session = Session::restore(Box::new(FileStore::open(&path).unwrap()));
        assert_eq!(guard::resolve(Route::Home, &session), Route::Login);
        let mut library = Library::new(api.clone(), session);
        library.login("reader", "secret").await.unwrap();
    }

    let session = Session::restore(Box::new(FileStore::open(&path).unwrap()));
    assert!(session.is_authenticated());
    assert_eq!(session.access_token(), Some(TOKEN));
    assert_eq!(guard::resolve(Route::Home, &session), Route::Home);
}

#[tokio::test]
async fn bad_password_leaves_session_alone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid username or password"})),
        )
        .mount(&server)
        .await;

    let mut library = library(&server, Some(TOKEN));
    let err = library.login("reader", "wrong").await.unwrap_err();
    assert!(err.api().unwrap().is_auth_failure());
    assert_eq!(notify::login_failed(&err).message, notify::LOGIN_FAILED);
    assert_eq!(library.session().access_token(), Some(TOKEN));
}

#[tokio::test]
async fn rejected_token_ends_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Not authenticated"})))
        .mount(&server)
        .await;

    let mut library = library(&server, Some(TOKEN));
    let err = library.list_books(1, 10).await.unwrap_err();
    assert_eq!(notify::describe(&err).message, notify::SESSION_EXPIRED);
    assert!(!library.session().is_authenticated());
    assert_eq!(library.session().store().get("accessToken"), None);
    assert_eq!(guard::resolve(Route::Home, library.session()), Route::Login);
}

#[tokio::test]
async fn rejected_token_can_be_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/library-summary"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"detail": "Forbidden"})))
        .mount(&server)
        .await;

    let mut library = library(&server, Some(TOKEN)).keep_session_on_unauthorized(true);
    assert!(library.list_books(1, 10).await.is_err());
    assert!(library.session().is_authenticated());

    // 403 never logs out
    let mut library = self::library(&server, Some(TOKEN));
    assert!(library.summary().await.is_err());
    assert!(library.session().is_authenticated());
}

#[tokio::test]
async fn refresh_swaps_in_new_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refresh-token"))
        .and(body_json(json!({"refresh_token": "refresh-token"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "fresh-access", "refresh_token": "refresh-token"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut library = library(&server, Some(TOKEN));
    library.refresh().await.unwrap();
    assert_eq!(library.session().access_token(), Some("fresh-access"));

    let mut anonymous = self::library(&server, None);
    assert!(anonymous.refresh().await.is_err());
}

#[tokio::test]
async fn search_and_summary_are_invalidated_too() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books/search"))
        .and(query_param("search_query", "butler"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([book(1, "Kindred")])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/library-summary"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"total_books": 1, "recent_additions": [book(1, "Kindred")]})),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(book(2, "Dawn")))
        .mount(&server)
        .await;

    let mut library = library(&server, Some(TOKEN));
    assert_eq!(library.search_books("butler").await.unwrap().len(), 1);
    assert_eq!(library.summary().await.unwrap().total_books, 1);
    library.search_books("butler").await.unwrap();
    library.summary().await.unwrap();

    library.create_book(&draft()).await.unwrap();
    library.search_books("butler").await.unwrap();
    library.summary().await.unwrap();
}

#[tokio::test]
async fn get_book_is_never_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books/abc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"id": "abc-1", "title": "Parable of the Sower", "author": "Octavia E. Butler"}),
        ))
        .expect(2)
        .mount(&server)
        .await;

    let mut library = library(&server, Some(TOKEN));
    let id = BookId::from("abc-1");
    assert_eq!(library.get_book(&id).await.unwrap().title, "Parable of the Sower");
    library.get_book(&id).await.unwrap();
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    let server = MockServer::start().await;
    mount_list(&server, json!({"books": "nope"})).await;

    let mut library = library(&server, Some(TOKEN));
    let err = library.list_books(1, 10).await.unwrap_err();
    assert!(matches!(err.api(), Some(bookcase::ApiError::Decode { .. })));
    assert!(library.cache().is_empty());
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    // Grab a free port and release it so nothing is listening there
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let api = ApiClient::new(Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap());
    let mut library = Library::new(api, Session::restore(Box::new(MemoryStore::default())));
    let err = library.list_books(1, 10).await.unwrap_err();
    assert!(matches!(err.api(), Some(bookcase::ApiError::Transport { .. })));
    assert_eq!(err.api().unwrap().status(), None);
}
