use clap::Parser;
use colored::*;
use counsellor::actions::ActionOutcome;
use counsellor::constants::RECENT_TODOS_LIMIT;
use counsellor::db::{init_db, DbPool};
use counsellor::main_helper::{
    CatalogCommand, ChatArgs, Command, CompletionArg, GatewaySettings, ProfileCommand, ServeArgs,
    TodoCommand, UniversityCommand,
};
use counsellor::models::{
    parse_due_date, Category, CompletionFilter, NewTodo, NewUniversity, Priority, ProfileDetails,
    Stage, TodoFilter, UniversityFilter,
};
use counsellor::session::{ChatSession, SendState, SessionEvent};
use counsellor::store::shortlist::ShortlistToggle;
use counsellor::store::{catalog, profiles, shortlist, todos};
use counsellor::transport::{build_stream_client, ChatTransport};
use counsellor::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Interactive commands keep stderr clean; everything still lands in the log files.
    let quiet = !matches!(args.command, Command::Serve(_));
    let _guards = match counsellor::logging::init_tracing(&args.log_dir, quiet) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args).await {
        tracing::error!("Command failed: {}", e);
        eprintln!("{} {}", "error:".red().bold(), e.to_string().red());
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let db = init_db(&args.database).await?;
    let connect_timeout = Duration::from_secs(args.connect_timeout_secs);

    match args.command {
        Command::Serve(serve_args) => serve(db, serve_args, connect_timeout).await,
        Command::Chat(chat_args) => {
            let user = require_user(args.user)?;
            chat(db, &user, chat_args, connect_timeout).await
        }
        Command::Profile(cmd) => profile(db, &require_user(args.user)?, cmd).await,
        Command::Universities(cmd) => universities(db, &require_user(args.user)?, cmd).await,
        Command::Todos(cmd) => todo_command(db, &require_user(args.user)?, cmd).await,
        Command::Catalog(CatalogCommand::Import { file }) => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let records: Vec<NewUniversity> = serde_json::from_str(&raw)?;
            let n = catalog::import_universities(&db, records).await?;
            println!("{} {} universities from {}", "Imported".green().bold(), n, file.display());
            Ok(())
        }
    }
}

fn require_user(user: Option<String>) -> Result<String> {
    match user.filter(|u| !u.trim().is_empty()) {
        Some(u) => Ok(u),
        None => Err(CounsellorError::Validation(
            "no user selected; pass --user or set COUNSELLOR_USER_ID".into(),
        )
        .into()),
    }
}

async fn serve(db: DbPool, args: ServeArgs, connect_timeout: Duration) -> Result<()> {
    let settings = GatewaySettings::from(&args);
    if settings.upstream_key.is_none() {
        tracing::warn!("AI_GATEWAY_API_KEY is not set; counsellor requests will fail until it is");
    }

    let state = Arc::new(AppState {
        client: build_stream_client(connect_timeout)?,
        settings: Arc::new(settings),
        db,
    });
    let app = counsellor::gateway::router(state, args.max_body_size);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Counsellor gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

/// --- CHAT ---

async fn chat(db: DbPool, user_id: &str, args: ChatArgs, connect_timeout: Duration) -> Result<()> {
    let transport = ChatTransport::new(build_stream_client(connect_timeout)?, args.endpoint, args.api_key);
    let mut session = ChatSession::start(db, transport, user_id).await?;

    let (turn_tx, mut turn_rx) = mpsc::channel::<()>(4);
    tokio::spawn(render_events(session.subscribe(), turn_tx));

    if let Some(welcome) = session.messages().first() {
        println!("{}\n", welcome.content.cyan());
    }

    if let Some(message) = args.message {
        send_and_wait(&mut session, &message, &mut turn_rx).await?;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", "you>".bold());
        let _ = std::io::Write::flush(&mut std::io::stdout());
        let line = match lines.next_line().await? {
            Some(l) => l,
            None => break,
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            text => send_and_wait(&mut session, text, &mut turn_rx).await?,
        }
    }
    Ok(())
}

async fn send_and_wait(session: &mut ChatSession, text: &str, turn_rx: &mut mpsc::Receiver<()>) -> Result<()> {
    let report = session.send(text).await?;
    // The renderer signals once it has drained this turn's events. A lagged renderer may have
    // lost the final state change, so the wait is bounded.
    let _ = tokio::time::timeout(Duration::from_secs(2), turn_rx.recv()).await;
    if report.state == SendState::Error {
        tracing::warn!("Turn ended with an error");
    }
    Ok(())
}

/// How much of the streaming reply has reached the terminal.
#[derive(Debug, Default)]
struct ReplyCursor {
    current: Option<String>,
    printed: usize,
}

impl ReplyCursor {
    fn start(&mut self, id: String) {
        self.current = Some(id);
        self.printed = 0;
    }

    fn finish(&mut self) {
        self.current = None;
    }

    /// Unprinted tail of `content`, and whether this update adopted a reply the cursor had not
    /// seen start (a lagged receiver can miss `MessageAdded`).
    fn advance<'a>(&mut self, id: &str, content: &'a str) -> Option<(bool, &'a str)> {
        let adopted = match self.current.as_deref() {
            Some(cur) if cur == id => false,
            Some(_) => return None,
            None => {
                self.start(id.to_string());
                true
            }
        };
        let tail = content.get(self.printed..)?;
        self.printed = content.len();
        Some((adopted, tail))
    }
}

async fn render_events(mut rx: broadcast::Receiver<SessionEvent>, turn_done: mpsc::Sender<()>) {
    let mut cursor = ReplyCursor::default();
    let prompt = format!("{} ", "counsellor>".bold().cyan());
    let mut stdout = tokio::io::stdout();

    loop {
        let event = match rx.recv().await {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Renderer lagged by {} events", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            SessionEvent::MessageAdded(m) if m.role == Role::Assistant && !m.content.is_empty() => {
                let _ = stdout
                    .write_all(format!("{}\n", m.content.red()).as_bytes())
                    .await;
            }
            SessionEvent::MessageAdded(m) if m.role == Role::Assistant => {
                let _ = stdout.write_all(prompt.as_bytes()).await;
                cursor.start(m.id);
            }
            SessionEvent::MessageUpdated { id, content } => {
                if let Some((adopted, tail)) = cursor.advance(&id, &content) {
                    if adopted {
                        let _ = stdout.write_all(prompt.as_bytes()).await;
                    }
                    let _ = stdout.write_all(tail.as_bytes()).await;
                }
            }
            SessionEvent::ActionApplied(outcome) => {
                let notice = match outcome {
                    ActionOutcome::Shortlisted(e) => format!("shortlisted {}", e.university_id),
                    ActionOutcome::Locked(e) => format!("locked {}", e.university_id),
                    ActionOutcome::TodoCreated(t) => format!("added task \"{}\"", t.title),
                };
                let _ = stdout
                    .write_all(format!("\n  {} {}\n", "✓".green(), notice.green()).as_bytes())
                    .await;
            }
            SessionEvent::StateChanged(SendState::Done) | SessionEvent::StateChanged(SendState::Error) => {
                let _ = stdout.write_all(b"\n").await;
                cursor.finish();
                let _ = turn_done.send(()).await;
            }
            _ => {}
        }
        let _ = stdout.flush().await;
    }
}

/// --- PROFILE ---

async fn profile(db: DbPool, user_id: &str, cmd: ProfileCommand) -> Result<()> {
    match cmd {
        ProfileCommand::Show => {
            let p = profiles::require_profile(&db, user_id).await?;
            let strength = p.strength();
            println!("{} <{}>", p.full_name.bold(), p.email);
            for stage in Stage::ALL {
                let marker = if stage < p.current_stage {
                    "●".green()
                } else if stage == p.current_stage {
                    "◉".yellow()
                } else {
                    "○".dimmed()
                };
                println!("  {} {}: {}", marker, stage, stage.description());
            }
            println!(
                "  academics: {}  exams: {}  sop: {}",
                strength.academics, strength.exams, strength.sop
            );
            if !p.can_access_dashboard() {
                println!("{}", "Onboarding not completed yet.".yellow());
                return Ok(());
            }

            let recent = todos::list_recent(&db, user_id, RECENT_TODOS_LIMIT).await?;
            if !recent.is_empty() {
                println!("{}", "Recent tasks".bold());
                for t in recent {
                    let check = if t.completed { "[x]".green() } else { "[ ]".normal() };
                    println!("  {} {}", check, t.title);
                }
            }
            Ok(())
        }
        ProfileCommand::Create { email, name } => {
            let p = profiles::create_profile(&db, user_id, &email, &name).await?;
            println!("{} profile for {}", "Created".green().bold(), p.full_name);
            Ok(())
        }
        ProfileCommand::Onboard { file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let details: ProfileDetails = serde_json::from_str(&raw)?;
            let p = profiles::complete_onboarding(&db, user_id, &details).await?;
            println!("{} now at stage {}", "Onboarding complete:".green().bold(), p.current_stage);
            Ok(())
        }
        ProfileCommand::Edit { file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let patch: serde_json::Value = serde_json::from_str(&raw)?;
            let current = profiles::require_profile(&db, user_id).await?;
            let details = current.details.with_patch(&patch)?;
            let p = profiles::update_details(&db, user_id, &details).await?;
            println!("{} profile for {}", "Updated".green().bold(), p.full_name);
            Ok(())
        }
    }
}

/// --- UNIVERSITIES ---

async fn universities(db: DbPool, user_id: &str, cmd: UniversityCommand) -> Result<()> {
    match cmd {
        UniversityCommand::List {
            search,
            country,
            category,
        } => {
            let category = match category {
                Some(c) => Some(c.parse::<Category>()?),
                None => None,
            };
            let filter = UniversityFilter {
                search,
                country,
                category,
            };
            for u in catalog::list_universities(&db, &filter).await? {
                let rank = u.ranking.map(|r| format!("#{}", r)).unwrap_or_else(|| "-".into());
                let cat = u.category.map(|c| c.as_str()).unwrap_or("-");
                println!("{:>5}  {}  {} ({})  [{}]", rank, u.id.dimmed(), u.name.bold(), u.country, cat);
            }
            Ok(())
        }
        UniversityCommand::Shortlisted => {
            for s in shortlist::list_shortlist(&db, user_id).await? {
                let status = if s.entry.is_locked() {
                    "locked".green().bold()
                } else {
                    "shortlisted".normal()
                };
                let risk = s.entry.risk_level.map(|r| r.as_str()).unwrap_or("-");
                let fit = s.entry.fit_score.map(|f| f.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{}  {} ({})  risk={} fit={}",
                    status, s.universities.name, s.universities.country, risk, fit
                );
            }
            Ok(())
        }
        UniversityCommand::Toggle { university_id } => {
            match shortlist::toggle_shortlist(&db, user_id, &university_id).await? {
                ShortlistToggle::Added(_) => println!("{} {}", "Shortlisted".green().bold(), university_id),
                ShortlistToggle::Removed => println!("{} {}", "Removed".yellow().bold(), university_id),
            }
            Ok(())
        }
        UniversityCommand::Lock { university_id } => {
            let entry = shortlist::toggle_lock(&db, user_id, &university_id).await?;
            if entry.is_locked() {
                println!("{} {}", "Locked".green().bold(), university_id);
            } else {
                println!("{} {}", "Unlocked".yellow().bold(), university_id);
            }
            Ok(())
        }
    }
}

/// --- TODOS ---

async fn todo_command(db: DbPool, user_id: &str, cmd: TodoCommand) -> Result<()> {
    match cmd {
        TodoCommand::List { status, category } => {
            let completion = match status {
                CompletionArg::All => CompletionFilter::All,
                CompletionArg::Pending => CompletionFilter::Pending,
                CompletionArg::Completed => CompletionFilter::Completed,
            };
            let filter = TodoFilter {
                completion,
                category,
            };
            for t in todos::list_todos(&db, user_id, &filter).await? {
                let check = if t.completed { "[x]".green() } else { "[ ]".normal() };
                let priority = t.priority.map(|p| p.as_str()).unwrap_or("-");
                let due = t.due_date.map(|d| d.to_string()).unwrap_or_default();
                println!("{} {}  {} ({}) {}", check, t.id.dimmed(), t.title, priority, due);
            }
            Ok(())
        }
        TodoCommand::Add {
            title,
            description,
            category,
            priority,
            due,
            university,
        } => {
            let due_date = match due {
                Some(raw) => match parse_due_date(&raw) {
                    Some(d) => Some(d),
                    None => {
                        return Err(CounsellorError::Validation(format!("invalid due date: {}", raw)).into())
                    }
                },
                None => None,
            };
            let new = NewTodo {
                title,
                description,
                category,
                priority: priority.parse::<Priority>()?,
                due_date,
                university_id: university,
            };
            let t = todos::create_todo(&db, user_id, &new).await?;
            println!("{} {}", "Added".green().bold(), t.title);
            Ok(())
        }
        TodoCommand::Toggle { id } => {
            let t = todos::toggle_completed(&db, user_id, &id).await?;
            let state = if t.completed { "completed" } else { "reopened" };
            println!("{} {}", state.green().bold(), t.title);
            Ok(())
        }
        TodoCommand::Delete { id } => {
            todos::delete_todo(&db, user_id, &id).await?;
            println!("{} {}", "Deleted".yellow().bold(), id);
            Ok(())
        }
    }
}
