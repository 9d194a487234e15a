use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use log::*;
use structopt::StructOpt;

use bookcase::config::{self, Config};
use bookcase::form::{BookForm, FieldErrors, LoginForm, SignupForm};
use bookcase::guard::{self, Route};
use bookcase::notify::{self, BookAction, FormFailure, Notification};
use bookcase::session::mask_token;
use bookcase::{view, ApiClient, BookId, FileStore, Library, Session};

#[derive(Debug, StructOpt)]
#[structopt(name = "bookcase", about = "Manage your personal library catalog")]
struct Opt {
    /// Root of the library API, e.g. http://localhost:8000/api/v1
    #[structopt(long, env = "BOOKCASE_BASE_URL")]
    base_url: Option<String>,
    /// Where the session tokens are kept
    #[structopt(long, env = "BOOKCASE_CREDENTIALS")]
    credentials: Option<String>,
    /// Don't log out when the server rejects the stored token
    #[structopt(long)]
    keep_session_on_401: bool,
    #[structopt(short, long)]
    verbose: bool,
    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Log in and remember the session
    Login {
        #[structopt(short, long)]
        username: Option<String>,
        #[structopt(short, long)]
        password: Option<String>,
    },
    /// Create an account and log into it
    Signup {
        #[structopt(short, long)]
        username: Option<String>,
        #[structopt(short, long)]
        email: Option<String>,
        #[structopt(short, long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show whether a session is stored
    Status,
    /// Trade the stored refresh token for a new access token
    Refresh,
    /// Print one page of books
    List {
        #[structopt(long, default_value = "1")]
        page: u32,
        #[structopt(long, default_value = "10")]
        limit: u32,
    },
    /// Page through books interactively
    Browse {
        #[structopt(long, default_value = "10")]
        limit: u32,
    },
    /// Print a single book
    Show { id: String },
    /// Find books matching a query
    Search { query: String },
    /// Totals and recent additions
    Summary,
    /// Add a book
    Add(BookArgs),
    /// Change some fields of a book
    Edit {
        id: String,
        #[structopt(flatten)]
        fields: BookArgs,
    },
    /// Remove a book
    Delete {
        id: String,
        /// Skip the confirmation question
        #[structopt(short, long)]
        yes: bool,
    },
}

#[derive(Debug, StructOpt)]
struct BookArgs {
    #[structopt(long)]
    title: Option<String>,
    #[structopt(long)]
    author: Option<String>,
    /// YYYY-MM-DD
    #[structopt(long = "published")]
    publication_date: Option<String>,
    #[structopt(long)]
    isbn: Option<String>,
    /// Image file to use as the cover
    #[structopt(long = "cover", parse(from_os_str))]
    cover_image: Option<PathBuf>,
}

impl From<BookArgs> for BookForm {
    fn from(args: BookArgs) -> Self {
        BookForm {
            title: args.title,
            author: args.author,
            publication_date: args.publication_date,
            isbn: args.isbn,
            cover_image: args.cover_image,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Failed,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let opt = Opt::from_args();
    init_logging(opt.verbose);
    let code = match run(opt).await {
        Ok(Outcome::Done) => 0,
        Ok(Outcome::Failed) => 1,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };
    std::process::exit(code)
}

fn init_logging(verbose: bool) {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(if verbose { LevelFilter::Debug } else { LevelFilter::Warn });
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

async fn run(opt: Opt) -> Result<Outcome> {
    let config = Config::new(
        opt.base_url.as_deref(),
        opt.credentials.as_deref(),
        opt.keep_session_on_401,
    )?;
    debug!("Using API at {} and credentials in {:?}", config.base_url, config.credentials_path);
    let store = FileStore::open(&config.credentials_path)?;
    let session = Session::restore(Box::new(store));
    let mut library = Library::new(ApiClient::new(config.base_url.clone()), session)
        .keep_session_on_unauthorized(config.keep_session_on_unauthorized);

    match opt.cmd {
        Command::Login { username, password } => login(&mut library, username, password).await,
        Command::Signup { username, email, password } => signup(&mut library, username, email, password).await,
        Command::Logout => {
            library.logout()?;
            show(&Notification::success("Logged out"));
            Ok(Outcome::Done)
        }
        Command::Status => {
            let session = library.session();
            println!("{}", session.state());
            if let Some(token) = session.access_token() {
                println!("token: {}", mask_token(token));
            }
            println!("api: {}", config.base_url);
            Ok(Outcome::Done)
        }
        Command::Refresh => match library.refresh().await {
            Ok(()) => {
                show(&Notification::success("Session refreshed"));
                Ok(Outcome::Done)
            }
            Err(e) => Ok(failed(notify::describe(&e), &e)),
        },
        cmd => {
            if !guarded(&library) {
                return Ok(Outcome::Failed);
            }
            protected(&mut library, cmd).await
        }
    }
}

async fn protected(library: &mut Library, cmd: Command) -> Result<Outcome> {
    match cmd {
        Command::List { page, limit } => {
            let page = config::check_page(page)?;
            let limit = config::check_page_size(limit)?;
            match library.list_books(page, limit).await {
                Ok(books) => {
                    println!("{}", view::render_page(&books));
                    Ok(Outcome::Done)
                }
                Err(e) => Ok(failed(notify::describe(&e), &e)),
            }
        }
        Command::Browse { limit } => browse(library, config::check_page_size(limit)?).await,
        Command::Show { id } => match library.get_book(&BookId::from(id)).await {
            Ok(book) => {
                println!("{}", view::render_book(&book));
                Ok(Outcome::Done)
            }
            Err(e) => Ok(failed(notify::describe(&e), &e)),
        },
        Command::Search { query } => match library.search_books(&query).await {
            Ok(books) if books.is_empty() => {
                println!("No books available.");
                Ok(Outcome::Done)
            }
            Ok(books) => {
                println!("{}", view::book_table(&books));
                Ok(Outcome::Done)
            }
            Err(e) => Ok(failed(notify::describe(&e), &e)),
        },
        Command::Summary => match library.summary().await {
            Ok(summary) => {
                println!("{}", view::render_summary(&summary));
                Ok(Outcome::Done)
            }
            Err(e) => Ok(failed(notify::describe(&e), &e)),
        },
        Command::Add(args) => {
            let draft = match BookForm::from(args).into_draft(today()) {
                Ok(draft) => draft,
                Err(errors) => return Ok(invalid(&errors)),
            };
            match library.create_book(&draft).await {
                Ok(book) => {
                    show(&notify::book_done(BookAction::Create));
                    println!("{}", view::render_book(&book));
                    Ok(Outcome::Done)
                }
                Err(e) => Ok(failed(notify::book_action_failed(BookAction::Create, &e), &e)),
            }
        }
        Command::Edit { id, fields } => {
            let patch = match BookForm::from(fields).into_patch(today()) {
                Ok(patch) => patch,
                Err(errors) => return Ok(invalid(&errors)),
            };
            if patch.is_empty() {
                bail!("Nothing to update, pass at least one field");
            }
            match library.update_book(&BookId::from(id), &patch).await {
                Ok(book) => {
                    show(&notify::book_done(BookAction::Update));
                    println!("{}", view::render_book(&book));
                    Ok(Outcome::Done)
                }
                Err(e) => Ok(failed(notify::book_action_failed(BookAction::Update, &e), &e)),
            }
        }
        Command::Delete { id, yes } => {
            if !yes && !confirm("Are you sure to delete this book?")? {
                return Ok(Outcome::Done);
            }
            delete(library, &BookId::from(id)).await
        }
        // Session commands are handled before the guard
        _ => Ok(Outcome::Done),
    }
}

async fn login(library: &mut Library, username: Option<String>, password: Option<String>) -> Result<Outcome> {
    let form = LoginForm {
        username: or_prompt(username, "Username")?,
        password: or_prompt_secret(password, "Password")?,
    };
    if let Err(errors) = form.validate() {
        return Ok(invalid(&errors));
    }
    match library.login(form.username.trim(), &form.password).await {
        Ok(()) => {
            show(&Notification::success(&format!("Logged in as {}", form.username.trim())));
            Ok(Outcome::Done)
        }
        Err(e) => Ok(failed(notify::login_failed(&e), &e)),
    }
}

async fn signup(
    library: &mut Library,
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
) -> Result<Outcome> {
    let username = or_prompt(username, "Username")?;
    let email = or_prompt(email, "Email")?;
    let (password, confirm) = match password {
        Some(p) => (p.clone(), p),
        None => (prompt_secret("Password")?, prompt_secret("Confirm Password")?),
    };
    let form = SignupForm { username, email, password, confirm };
    if let Err(errors) = form.validate() {
        return Ok(invalid(&errors));
    }
    match library.signup(form.username.trim(), form.email.trim(), &form.password).await {
        Ok(()) => {
            show(&Notification::success(notify::SIGNUP_OK));
            Ok(Outcome::Done)
        }
        Err(e) => {
            warn!("Signup failed: {}", e);
            match notify::signup_failed(&e) {
                FormFailure::Fields(errors) => Ok(invalid(&errors)),
                FormFailure::Notice(n) => {
                    show(&n);
                    Ok(Outcome::Failed)
                }
            }
        }
    }
}

async fn delete(library: &mut Library, id: &BookId) -> Result<Outcome> {
    match library.delete_book(id).await {
        Ok(()) => {
            show(&notify::book_done(BookAction::Delete));
            Ok(Outcome::Done)
        }
        Err(e) => Ok(failed(notify::book_action_failed(BookAction::Delete, &e), &e)),
    }
}

#[derive(Debug, PartialEq)]
enum BrowseAction {
    Next,
    Prev,
    Size(u32),
    Show(BookId),
    Delete(BookId),
    Reload,
    Quit,
    Unknown,
}

fn parse_browse(line: &str) -> BrowseAction {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (None, _) | (Some("n"), None) | (Some("next"), None) => BrowseAction::Next,
        (Some("p"), None) | (Some("prev"), None) => BrowseAction::Prev,
        (Some("s"), Some(n)) | (Some("size"), Some(n)) => match n.parse() {
            Ok(n) => BrowseAction::Size(n),
            Err(_) => BrowseAction::Unknown,
        },
        (Some("v"), Some(id)) | (Some("view"), Some(id)) | (Some("show"), Some(id)) => {
            BrowseAction::Show(BookId::from(id))
        }
        (Some("d"), Some(id)) | (Some("delete"), Some(id)) => BrowseAction::Delete(BookId::from(id)),
        (Some("r"), None) | (Some("reload"), None) => BrowseAction::Reload,
        (Some("q"), None) | (Some("quit"), None) => BrowseAction::Quit,
        _ => BrowseAction::Unknown,
    }
}

async fn browse(library: &mut Library, mut limit: u32) -> Result<Outcome> {
    let mut page = config::DEFAULT_PAGE;
    let mut pages = 1;
    loop {
        // The session can end mid-way (logout on a rejected token)
        if !guarded(library) {
            return Ok(Outcome::Failed);
        }
        match library.list_books(page, limit).await {
            Ok(books) => {
                pages = books.pagination.page_count().max(1);
                println!("{}", view::render_page(&books));
            }
            Err(e) => {
                failed(notify::describe(&e), &e);
            }
        }
        let line = match read_line("[n]ext [p]rev [s]ize N [v]iew ID [d]elete ID [r]eload [q]uit")? {
            Some(line) => line,
            None => return Ok(Outcome::Done),
        };
        match parse_browse(&line) {
            BrowseAction::Next if u64::from(page) < pages => page += 1,
            BrowseAction::Next => println!("Already on the last page"),
            BrowseAction::Prev if page > 1 => page -= 1,
            BrowseAction::Prev => println!("Already on the first page"),
            BrowseAction::Size(n) => match config::check_page_size(n) {
                Ok(n) => {
                    limit = n;
                    page = config::DEFAULT_PAGE;
                }
                Err(e) => eprintln!("{}", e),
            },
            BrowseAction::Show(id) => match library.get_book(&id).await {
                Ok(book) => println!("{}", view::render_book(&book)),
                Err(e) => {
                    failed(notify::describe(&e), &e);
                }
            },
            BrowseAction::Delete(id) => {
                if confirm("Are you sure to delete this book?")? {
                    delete(library, &id).await?;
                }
            }
            BrowseAction::Reload => {
                library.invalidate_books();
            }
            BrowseAction::Quit => return Ok(Outcome::Done),
            BrowseAction::Unknown => eprintln!("Unknown command: {}", line.trim()),
        }
    }
}

fn guarded(library: &Library) -> bool {
    match guard::resolve(Route::Home, library.session()) {
        Route::Home => true,
        to => {
            eprintln!("Not logged in. Run `bookcase login` first (redirected to {}).", to);
            false
        }
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

fn show(notification: &Notification) {
    if notification.is_error() {
        eprintln!("{}", notification);
    } else {
        println!("{}", notification);
    }
}

fn failed(notification: Notification, cause: &dyn std::error::Error) -> Outcome {
    warn!("{}", cause);
    show(&notification);
    Outcome::Failed
}

fn invalid(errors: &FieldErrors) -> Outcome {
    eprintln!("Please fix the following:\n{}", view::render_field_errors(errors));
    Outcome::Failed
}

fn or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None => prompt(label),
    }
}

fn prompt(label: &str) -> Result<String> {
    Ok(read_line(label)?.unwrap_or_default())
}

fn or_prompt_secret(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None => prompt_secret(label),
    }
}

// Typed without echo
fn prompt_secret(label: &str) -> Result<String> {
    Ok(rpassword::prompt_password(format!("{}: ", label))?)
}

fn confirm(question: &str) -> Result<bool> {
    let answer = read_line(&format!("{} [y/N]", question))?.unwrap_or_default();
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

// None on end of input
fn read_line(label: &str) -> Result<Option<String>> {
    eprint!("{}: ", label);
    io::stderr().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_owned()))
}
