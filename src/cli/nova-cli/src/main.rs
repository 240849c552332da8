//! Nova CLI - Sign in, inspect and follow portal sessions.
//!
//! Each named session is a SQLite file under the data directory, so
//! separate invocations behave like reloads of the same browser session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nova_auth::{
    IdTokenDecoder, IdentitySession, JwtDecoderConfig, JwtIdentitySession,
    StaticIdentitySession, UserInfoClient,
};
use nova_identity::{home_path, ClaimsDocument, GroupSet, InsecureDisplayNameRule, PortalKind};
use nova_session::{
    GuardDecision, PortalProvider, RouteGuard, SessionConfig, SessionRecord, SessionStore,
    SignInFlow,
};
use nova_storage_sqlite::{HistoryEntry, SqliteBackend};

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "nova")]
#[command(about = "Nova portals - resolve portal identity and follow session state")]
#[command(version)]
struct Cli {
    /// Directory holding session databases
    #[arg(long, default_value = ".nova", env = "NOVA_DATA_DIR")]
    data_dir: PathBuf,

    /// Session name
    #[arg(long, default_value = "default", env = "NOVA_SESSION")]
    session: String,

    /// Provider polling period in seconds
    #[arg(long, default_value = "5", env = "NOVA_POLL_INTERVAL")]
    poll_interval: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Complete a sign-in and persist the resolved portal
    SignIn(SignInArgs),
    /// Show the stored session
    Status {
        /// Also print the write history
        #[arg(long)]
        history: bool,
    },
    /// Check access to a portal
    Guard {
        /// Requested portal (admin, employee, customer)
        portal: PortalKind,
        /// Check as a signed-out user
        #[arg(long)]
        signed_out: bool,
    },
    /// Print where the home route redirects
    Home,
    /// Follow a portal's identifier until interrupted
    Watch {
        /// Portal to follow (admin, employee, customer)
        portal: PortalKind,
    },
    /// Sign the active portal out
    SignOut,
}

#[derive(Args)]
#[command(group(clap::ArgGroup::new("token").required(true).args(["claims", "id_token"])))]
struct SignInArgs {
    /// JSON file with already decoded token claims
    #[arg(long)]
    claims: Option<PathBuf>,

    /// JSON file with the user-info document
    #[arg(long, requires = "claims")]
    user_info: Option<PathBuf>,

    /// Raw ID token (JWT)
    #[arg(long, env = "NOVA_ID_TOKEN")]
    id_token: Option<String>,

    /// HS256 secret; enables signature, issuer and audience checks
    #[arg(long, env = "NOVA_JWT_SECRET", requires_all = ["issuer", "audience"])]
    jwt_secret: Option<String>,

    /// Expected token issuer
    #[arg(long, env = "NOVA_JWT_ISSUER")]
    issuer: Option<String>,

    /// Expected token audience
    #[arg(long, env = "NOVA_JWT_AUDIENCE")]
    audience: Option<String>,

    /// User-info endpoint URL
    #[arg(long, env = "NOVA_USERINFO_ENDPOINT", requires_all = ["id_token", "access_token"])]
    user_info_endpoint: Option<String>,

    /// Access token for the user-info endpoint
    #[arg(long, env = "NOVA_ACCESS_TOKEN")]
    access_token: Option<String>,

    /// Groups to assume when the token carries none (comma separated)
    #[arg(long, env = "NOVA_FALLBACK_GROUPS", value_delimiter = ',')]
    fallback_groups: Vec<String>,

    /// INSECURE: grant GROUP to users whose display name is NAME (NAME=GROUP)
    #[arg(long, env = "NOVA_INSECURE_DISPLAY_NAME")]
    insecure_display_name_fallback: Option<String>,
}

// ============================================================================
// Output Types
// ============================================================================

#[derive(Serialize)]
struct StatusOutput<'a> {
    session: &'a str,
    database: &'a Path,
    home: &'static str,
    #[serde(flatten)]
    record: SessionRecord,
}

// ============================================================================
// Helpers
// ============================================================================

async fn open_store(cli: &Cli) -> Result<(SessionStore, SqliteBackend)> {
    let backend = SqliteBackend::open(&cli.data_dir, &cli.session)
        .await
        .with_context(|| format!("Failed to open session '{}'", cli.session))?
        .with_actor(format!("nova-cli:{}", std::process::id()));

    let store = SessionStore::new(Arc::new(backend.clone()));
    Ok((store, backend))
}

fn session_config(cli: &Cli, args: Option<&SignInArgs>) -> Result<SessionConfig> {
    let mut config = SessionConfig {
        poll_interval: Duration::from_secs(cli.poll_interval),
        ..SessionConfig::default()
    };

    let Some(args) = args else {
        return Ok(config);
    };

    config.fallback_groups = args
        .fallback_groups
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .collect::<GroupSet>();

    if let Some(rule) = &args.insecure_display_name_fallback {
        let (display_name, group) = rule
            .split_once('=')
            .context("Insecure display-name fallback must be NAME=GROUP")?;
        config.insecure_display_name = Some(InsecureDisplayNameRule {
            display_name: display_name.to_string(),
            group: group.to_string(),
        });
    }

    Ok(config)
}

fn read_claims(path: &Path) -> Result<ClaimsDocument> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    ClaimsDocument::from_json(&text).with_context(|| format!("Invalid claims in {}", path.display()))
}

fn identity_session(args: &SignInArgs) -> Result<Box<dyn IdentitySession>> {
    if let Some(path) = &args.claims {
        let mut session = StaticIdentitySession::signed_in(read_claims(path)?);
        if let Some(path) = &args.user_info {
            session = session.with_user_info(read_claims(path)?);
        }
        return Ok(Box::new(session));
    }

    let Some(token) = &args.id_token else {
        bail!("Either --claims or --id-token is required");
    };

    let decoder = match (&args.jwt_secret, &args.issuer, &args.audience) {
        (Some(secret), Some(issuer), Some(audience)) => IdTokenDecoder::verified(&JwtDecoderConfig {
            jwt_secret: secret.clone(),
            issuer: issuer.clone(),
            audience: audience.clone(),
        }),
        (Some(_), _, _) => bail!("--jwt-secret needs --issuer and --audience"),
        _ => IdTokenDecoder::payload_only(),
    };

    let mut session = JwtIdentitySession::new(token.clone(), decoder);
    if let (Some(endpoint), Some(access_token)) = (&args.user_info_endpoint, &args.access_token) {
        let client = UserInfoClient::new(endpoint.clone())
            .context("Failed to create user-info client")?;
        session = session.with_user_info(client, access_token.clone());
    }
    Ok(Box::new(session))
}

fn print_history(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("No writes recorded");
        return;
    }

    println!("History:");
    for entry in entries {
        println!(
            "  {:>10}  {:<6} {:<18} v{:<3} {:<20} {}",
            entry.timestamp,
            entry.operation,
            entry.key,
            entry.version,
            entry.value.as_deref().unwrap_or("-"),
            entry.actor.as_deref().unwrap_or("-"),
        );
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

async fn cmd_sign_in(cli: &Cli, args: &SignInArgs) -> Result<()> {
    let config = session_config(cli, Some(args))?;
    let (store, _) = open_store(cli).await?;
    let session = identity_session(args)?;

    let flow = SignInFlow::new(store, &config);
    let Some(outcome) = flow.complete(session.as_ref()).await? else {
        bail!("Identity session is not signed in");
    };

    println!("Signed in:");
    println!("  Portal:     {}", outcome.portal);
    println!("  Identifier: {}", outcome.identifier);
    println!("  Groups:     {}", outcome.groups);
    println!(
        "  Source:     {}",
        outcome.group_source.unwrap_or("none (default portal)")
    );
    println!("  Home:       {}", outcome.portal.base_path());

    Ok(())
}

async fn cmd_status(cli: &Cli, history: bool) -> Result<()> {
    let (store, backend) = open_store(cli).await?;
    let record = store.record().await;

    let output = StatusOutput {
        session: &cli.session,
        database: backend.db_path(),
        home: home_path(record.active_portal),
        record,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    if history {
        let entries = backend
            .history(None)
            .await
            .context("Failed to read session history")?;
        print_history(&entries);
    }

    Ok(())
}

async fn cmd_guard(cli: &Cli, portal: PortalKind, signed_out: bool) -> Result<()> {
    let (store, _) = open_store(cli).await?;
    let guard = RouteGuard::new(store);

    match guard.check(portal, !signed_out).await {
        GuardDecision::Allow => println!("allow {}", portal.base_path()),
        GuardDecision::Redirect(path) => println!("redirect {path}"),
    }

    Ok(())
}

async fn cmd_home(cli: &Cli) -> Result<()> {
    let (store, _) = open_store(cli).await?;
    println!("{}", home_path(store.active_portal().await));
    Ok(())
}

async fn cmd_watch(cli: &Cli, portal: PortalKind) -> Result<()> {
    let config = session_config(cli, None)?;
    let (store, _) = open_store(cli).await?;

    let provider = PortalProvider::mount(portal, &store, &config).await;
    let mut handle = provider.handle();
    println!("{portal}: {}", handle.current());

    loop {
        tokio::select! {
            changed = handle.changed() => {
                changed?;
                println!("{portal}: {}", handle.current());
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for interrupt")?;
                break;
            },
        }
    }

    provider.unmount().await;
    Ok(())
}

async fn cmd_sign_out(cli: &Cli) -> Result<()> {
    let config = session_config(cli, None)?;
    let (store, _) = open_store(cli).await?;

    match SignInFlow::new(store, &config).sign_out().await? {
        Some(portal) => println!("Signed out of {portal}"),
        None => println!("No active portal"),
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::SignIn(args) => cmd_sign_in(&cli, args).await,
        Commands::Status { history } => cmd_status(&cli, *history).await,
        Commands::Guard { portal, signed_out } => cmd_guard(&cli, *portal, *signed_out).await,
        Commands::Home => cmd_home(&cli).await,
        Commands::Watch { portal } => cmd_watch(&cli, *portal).await,
        Commands::SignOut => cmd_sign_out(&cli).await,
    }
}
