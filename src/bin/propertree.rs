use std::path::Path;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use http::Method;
use propertree_client::client::{Body, FormPart};
use propertree_client::config::settings::ClientConfig;
use propertree_client::observability::metrics;
use propertree_client::session::{CredentialStore, FileBackend, NoticeLevel, SessionEvent, SessionEvents};
use propertree_client::utils::config_loader;
use propertree_client::utils::logging;
use propertree_client::utils::logging::LogLevel;
use propertree_client::{ApiClient, AuthService, RequestDescriptor};
use serde_json::Value;
use tokio::sync::broadcast::Receiver;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "propertree.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    /// print prometheus metrics to stderr before exiting
    #[arg(long)]
    dump_metrics: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and persist the session
    Login {
        email: String,
        #[arg(long, env = "PROPERTREE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Drop the persisted session
    Logout,
    /// Show the cached identity
    Whoami,
    /// Send an authenticated request, e.g. `request GET /bookings/`
    Request {
        method: String,
        path: String,
        /// JSON body
        #[arg(long, conflicts_with_all = ["field", "file"])]
        data: Option<String>,
        /// query parameter `key=value`, repeatable
        #[arg(short, long, value_parser = parse_pair)]
        query: Vec<(String, String)>,
        /// multipart text field `name=value`, repeatable
        #[arg(long, value_parser = parse_pair)]
        field: Vec<(String, String)>,
        /// multipart file field `name=path`, repeatable
        #[arg(long, value_parser = parse_pair)]
        file: Vec<(String, String)>,
    },
    /// Switch the signed-in user to the landlord role
    BecomeHost,
    /// Ask for a password reset email
    ForgotPassword { email: String },
    ChangePassword {
        #[arg(long, env = "PROPERTREE_OLD_PASSWORD", hide_env_values = true)]
        old: String,
        #[arg(long, env = "PROPERTREE_NEW_PASSWORD", hide_env_values = true)]
        new: String,
    },
    /// Renew the access token now
    Refresh,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, init logging
    // -------------------------------

    let args = Args::parse();
    let client_config = config_loader::run(&args.config).await?;
    logging::run(&client_config, args.log_level)?;

    // -------------------------------
    // 2. Restore session, build client
    // -------------------------------

    let events = SessionEvents::new();
    let mut receiver = events.subscribe();
    let auth = build_auth(&client_config, events)?;

    // -------------------------------
    // 3. Run command
    // -------------------------------

    let outcome = run_command(&auth, args.command).await;
    log_session_events(&mut receiver);

    if args.dump_metrics {
        eprintln!("{}", metrics::render().await);
    }

    let output = outcome?;
    if !output.is_null() {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}

fn build_auth(client_config: &ClientConfig, events: SessionEvents) -> Result<AuthService> {
    let session_path = client_config.session.resolved_path();
    let store = CredentialStore::open(FileBackend::new(&session_path))
        .with_context(|| format!("cannot open session at {}", session_path.display()))?;
    let client = ApiClient::new(&client_config.api, store, events)?;
    info!("using api {}", client_config.api.base_url);
    Ok(AuthService::new(client))
}

async fn run_command(auth: &AuthService, command: Command) -> Result<Value> {
    let value = match command {
        Command::Login { email, password } => {
            let user = auth.login(&email, &password).await?;
            serde_json::to_value(user)?
        }
        Command::Logout => {
            auth.logout().await;
            Value::Null
        }
        Command::Whoami => match auth.current_user().await {
            Some(user) => serde_json::to_value(user)?,
            None => return Err(anyhow!("not signed in")),
        },
        Command::Request { method, path, data, query, field, file } => {
            let method: Method = method.to_uppercase().parse().context("invalid http method")?;
            let mut request = RequestDescriptor::new(method, path);
            for (key, value) in query {
                request = request.query(key, value);
            }
            if let Some(body) = build_body(data, field, file).await? {
                request = request.body(body);
            }
            auth.api().send(request).await?.into_body()
        }
        Command::BecomeHost => serde_json::to_value(auth.become_host().await?)?,
        Command::ForgotPassword { email } => auth.forgot_password(&email).await?,
        Command::ChangePassword { old, new } => auth.change_password(&old, &new).await?,
        Command::Refresh => {
            auth.refresh_token().await?;
            Value::Null
        }
    };
    Ok(value)
}

async fn build_body(
    data: Option<String>,
    fields: Vec<(String, String)>,
    files: Vec<(String, String)>,
) -> Result<Option<Body>> {
    if let Some(raw) = data {
        let json: Value = serde_json::from_str(&raw).context("--data is not valid JSON")?;
        return Ok(Some(Body::Json(json)));
    }
    if fields.is_empty() && files.is_empty() {
        return Ok(None);
    }

    let mut parts: Vec<FormPart> = fields.into_iter().map(|(name, value)| FormPart::text(name, value)).collect();
    for (name, path) in files {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("cannot read {}", path))?;
        let file_name = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        parts.push(FormPart::file(name, file_name, bytes));
    }
    Ok(Some(Body::Multipart(parts)))
}

/// Stand-in for the application shell: notices go to the log, expiry asks
/// the user to sign in again.
fn log_session_events(receiver: &mut Receiver<SessionEvent>) {
    while let Ok(event) = receiver.try_recv() {
        match event {
            SessionEvent::Notice(notice) if notice.level == NoticeLevel::Success => info!("{}", notice.message),
            SessionEvent::Notice(notice) => error!("{}", notice.message),
            SessionEvent::SignedIn { user } => info!("signed in as {} ({:?})", user.email, user.role),
            SessionEvent::SignedOut => info!("signed out"),
            SessionEvent::SessionExpired { redirect_to, at } => {
                warn!("session expired at {}, run `propertree login` ({})", at.to_rfc3339(), redirect_to)
            }
        }
    }
}
