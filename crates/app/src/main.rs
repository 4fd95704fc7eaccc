use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use exam_core::model::{SessionId, TestId, TestListing, TestStatus};
use services::{
    ApiConfig, HttpTestClient, IntentError, Phase, Redirect, SessionIntent, SessionManager,
    SessionView, TestApi,
};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidTestId { raw: String },
    InvalidSessionId { raw: String },
    InvalidDbUrl { raw: String },
    MissingTestId,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTestId { raw } => write!(f, "invalid --test-id value: {raw}"),
            ArgsError::InvalidSessionId { raw } => {
                write!(f, "invalid --session-id value: {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingTestId => write!(f, "take requires --test-id"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- take [--test-id <id>] [--session-id <id>] [--db <sqlite_url>]");
    eprintln!("                           [--api <base_url>] [--token <token>]");
    eprintln!("  cargo run -p app -- list [--api <base_url>] [--token <token>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:exam.sqlite3");
    eprintln!("  --api http://localhost:8000/api");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_API_BASE_URL, EXAM_API_TOKEN, EXAM_DB_URL, EXAM_TEST_ID, EXAM_LOG");
    eprintln!();
    eprintln!("While taking a test:");
    eprintln!("  <label or number>  select an option      next    submit the answer");
    eprintln!("  finish             finish now            reload  retry after a failure");
    eprintln!("  quit               leave (progress is kept)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Take,
    List,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "take" => Some(Self::Take),
            "list" => Some(Self::List),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    api_url: Option<String>,
    token: Option<String>,
    test_id: Option<TestId>,
    session_id: Option<SessionId>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("EXAM_DB_URL")
            .ok()
            .map_or_else(default_db_url, normalize_sqlite_url);
        let mut test_id = std::env::var("EXAM_TEST_ID")
            .ok()
            .and_then(|value| value.parse::<TestId>().ok());
        let mut api_url = None;
        let mut token = None;
        let mut session_id = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--api" => api_url = Some(require_value(args, "--api")?),
                "--token" => token = Some(require_value(args, "--token")?),
                "--test-id" => {
                    let value = require_value(args, "--test-id")?;
                    let parsed = value
                        .parse::<TestId>()
                        .map_err(|_| ArgsError::InvalidTestId { raw: value.clone() })?;
                    test_id = Some(parsed);
                }
                "--session-id" => {
                    let value = require_value(args, "--session-id")?;
                    let parsed = value
                        .parse::<SessionId>()
                        .map_err(|_| ArgsError::InvalidSessionId { raw: value.clone() })?;
                    session_id = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            api_url,
            token,
            test_id,
            session_id,
        })
    }

    fn api_config(&self) -> Result<ApiConfig, Box<dyn std::error::Error>> {
        let from_env = ApiConfig::from_env()?;
        let token = self
            .token
            .clone()
            .or_else(|| from_env.token().map(str::to_string));
        let config = match &self.api_url {
            Some(url) => ApiConfig::new(url)?,
            None => from_env,
        };
        Ok(config.with_token(token))
    }
}

fn default_db_url() -> String {
    normalize_sqlite_url("sqlite:exam.sqlite3".into())
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("EXAM_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

//
// ─── RENDERING ─────────────────────────────────────────────────────────────────
//

fn render_question(view: &SessionView) {
    let Some(question) = &view.question else {
        return;
    };
    println!();
    println!("{}    time left {}", view.progress_label(), view.remaining_label());
    println!("{}", question.text());
    for (position, option) in question.options().iter().enumerate() {
        let marker = if view.selected == Some(option.id) { '*' } else { ' ' };
        let label = if option.label.is_empty() {
            (position + 1).to_string()
        } else {
            option.label.clone()
        };
        println!(" {marker} {label}) {}", option.text);
    }
    println!("[{}]", view.submit_label());
}

fn render_time(view: &SessionView) {
    let secs = view.remaining_seconds;
    if view.is_low_time() && (secs % 10 == 0 || secs <= 5) {
        println!("!! {} left", view.remaining_label());
    } else if secs % 60 == 0 && secs > 0 {
        println!("{} left", view.remaining_label());
    }
}

fn render_outcome(view: &SessionView) {
    if let Some(completion) = &view.completion {
        println!();
        println!("{}", completion.summary_line());
    }
    if let Some(failure) = &view.failure {
        println!();
        println!("{failure}");
        match view.redirect {
            None => println!("Type 'reload' to try again or 'quit' to leave."),
            Some(Redirect::ToLogin) => println!("Sign in again and restart with a fresh --token."),
            Some(Redirect::ToResult { session_id }) => {
                println!("Your result is stored under session {session_id}.");
            }
            Some(Redirect::ToTestList { .. }) => {}
        }
    }
}

fn render_listing(listing: &TestListing) {
    let status = match listing.status {
        TestStatus::NotStarted => "not started".to_string(),
        TestStatus::InProgress => match listing.resumable_session() {
            Some(session_id) => format!("in progress (session {session_id})"),
            None => "in progress".to_string(),
        },
        TestStatus::Completed => match listing.result {
            Some(result) => format!(
                "completed {}/{} ({}%)",
                result.correct_answers(),
                result.total_questions(),
                result.score()
            ),
            None => "completed".to_string(),
        },
    };
    println!(
        "{:>4}  {:<32} {:>3} questions  {:>3} min  {}",
        listing.id(),
        listing.definition.title,
        listing.definition.total_questions,
        listing.definition.time_limit_secs / 60,
        status
    );
}

async fn print_test_list(api: &dyn TestApi) -> Result<(), Box<dyn std::error::Error>> {
    let tests = api.list_tests().await?;
    if tests.is_empty() {
        println!("No tests are assigned to you.");
    }
    for listing in &tests {
        render_listing(listing);
    }
    Ok(())
}

//
// ─── EXAM LOOP ─────────────────────────────────────────────────────────────────
//

enum Input {
    Intent(SessionIntent),
    Reload,
    Quit,
    Help,
}

fn parse_input(line: &str, view: &SessionView) -> Option<Input> {
    let word = line.trim();
    match word.to_ascii_lowercase().as_str() {
        "" => None,
        "next" | "n" | "submit" => Some(Input::Intent(SessionIntent::Submit)),
        "finish" | "f" => Some(Input::Intent(SessionIntent::RequestFinish)),
        "reload" | "r" => Some(Input::Reload),
        "quit" | "q" | "exit" => Some(Input::Quit),
        "help" | "?" => Some(Input::Help),
        _ => {
            let options = view.question.as_ref()?.options();
            let by_label = options
                .iter()
                .find(|option| option.label.eq_ignore_ascii_case(word));
            let by_position = word
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|index| options.get(index));
            by_label
                .or(by_position)
                .map(|option| Input::Intent(SessionIntent::Select(option.id)))
        }
    }
}

/// Whether the shell can still do something with this session.
fn is_over(view: &SessionView) -> bool {
    match view.phase {
        Phase::Finished => true,
        Phase::Failed => view.redirect.is_some(),
        _ => false,
    }
}

/// One tick per second. Seconds missed while a request is in flight are
/// delivered in a burst afterwards, so the countdown keeps pace with the server.
fn countdown_ticker() -> tokio::time::Interval {
    tokio::time::interval(Duration::from_secs(1))
}

async fn take_test(
    manager: &mut SessionManager,
    api: &dyn TestApi,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = countdown_ticker();
    ticker.tick().await;

    manager.initialize().await?;
    let mut shown = (Phase::Uninitialized, 0, None);

    loop {
        let view = manager.view();
        let key = (view.phase, view.current_index, view.selected);
        if key != shown {
            match view.phase {
                Phase::AwaitingAnswer => render_question(&view),
                Phase::Finished | Phase::Failed => render_outcome(&view),
                _ => {}
            }
            shown = key;
        }
        if is_over(&view) {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                manager.tick().await;
                let view = manager.view();
                if view.phase == Phase::AwaitingAnswer {
                    render_time(&view);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("input closed, leaving the exam");
                    manager.dispose();
                    return Ok(());
                };
                let Some(input) = parse_input(&line, &view) else {
                    if !line.trim().is_empty() {
                        println!("Unrecognized input. Type 'help' for commands.");
                    }
                    continue;
                };
                let outcome = match input {
                    Input::Intent(intent) => manager.dispatch(intent).await.map(|_| ()),
                    Input::Reload => manager.reload().await.map(|_| ()),
                    Input::Help => {
                        print_usage();
                        Ok(())
                    }
                    Input::Quit => {
                        println!("Progress saved. Run 'take' again to continue.");
                        manager.dispose();
                        return Ok(());
                    }
                };
                if let Err(err) = outcome {
                    report_refusal(&err);
                }
            }
        }
    }

    if let Some(Redirect::ToTestList { after }) = manager.view().redirect {
        tokio::time::sleep(after).await;
        println!();
        print_test_list(api).await?;
    }
    Ok(())
}

fn report_refusal(err: &IntentError) {
    debug!(error = %err, "intent refused");
    match err {
        IntentError::NoSelection => println!("Select an option first."),
        other => println!("{other}"),
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Take,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Take,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let parsed = Args::parse(&mut argv.into_iter()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let config = parsed.api_config()?;
    info!(base_url = config.base_url(), "using test service");
    let api: Arc<dyn TestApi> = Arc::new(HttpTestClient::new(config)?);

    match cmd {
        Command::List => print_test_list(api.as_ref()).await,
        Command::Take => {
            let test_id = parsed.test_id.ok_or(ArgsError::MissingTestId)?;

            // Open + migrate SQLite here so core/services stay storage agnostic.
            prepare_sqlite_file(&parsed.db_url)?;
            let storage = Storage::sqlite(&parsed.db_url).await?;

            let mut manager = SessionManager::new(test_id, Arc::clone(&api), storage.checkpoints)
                .with_session_hint(parsed.session_id);
            take_test(&mut manager, api.as_ref()).await
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
