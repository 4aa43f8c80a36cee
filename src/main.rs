use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tabcaller::caller::{AuthorizedCaller, CallerSettings};
use tabcaller::config::{AppConfig, ConfigError, default_code_path};
use tabcaller::error::{CallerError, ErrorCode};
use tabcaller::host::LoopbackHost;
use tabcaller::host::loopback::ConsentPrompt;
use tabcaller::identity::cache::TokenCache;
use tabcaller::identity::{IdentityClient, IdentityError, PublicClientApplication};
use tabcaller::remote::{FunctionClient, RemoteError};
use tabcaller::view::Panel;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("could not load env file {path}: {message}")]
    EnvFile { path: String, message: String },
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Identity(#[from] IdentityError),
    #[error("{0}")]
    Remote(#[from] RemoteError),
    #[error("[{code}] {message}")]
    Caller { code: &'static str, message: String },
}

impl From<CallerError> for CliError {
    fn from(err: CallerError) -> Self {
        Self::Caller { code: err.error_code(), message: err.to_string() }
    }
}

#[derive(Parser, Debug)]
#[command(name = "tabcaller", about = "Authorize and call an Azure Function on behalf of a Microsoft 365 user")]
struct Cli {
    /// Load environment variables from this file before reading configuration.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Function to call.
    #[arg(long, env = "TAB_API_NAME")]
    api_name: Option<String>,

    /// Account hint for the consent page.
    #[arg(long, env = "TAB_LOGIN_HINT")]
    login_hint: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Authorize (consenting if needed) and call the function.
    #[default]
    Call,
    /// Acquire a token silently and print it.
    Token,
    /// Print the consent URL.
    ConsentUrl,
    /// List cached accounts.
    Accounts,
    /// Forget every cached account and token.
    SignOut,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .map_err(|e| CliError::EnvFile { path: path.display().to_string(), message: e.to_string() })?;
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let mut config = AppConfig::from_env()?;
    if let Some(api_name) = cli.api_name {
        if config.code_path == default_code_path(&config.api_name) {
            config.code_path = default_code_path(&api_name);
        }
        config.api_name = api_name;
    }
    if let Some(hint) = cli.login_hint {
        config.login_hint = Some(hint);
    }

    match cli.command.unwrap_or_default() {
        Command::Call => run_call(&config).await,
        Command::Token => run_token(&config).await,
        Command::ConsentUrl => run_consent_url(&config).await,
        Command::Accounts => run_accounts(&config).await,
        Command::SignOut => run_sign_out(&config).await,
    }
}

async fn identity_client(config: &AppConfig) -> Result<Arc<PublicClientApplication>, CliError> {
    let cache = TokenCache::load(&config.cache_path).await?;
    let client = PublicClientApplication::new(&config.client_id, config.authority(), cache, config.timeouts)?;
    Ok(Arc::new(client))
}

async fn build_caller(config: &AppConfig) -> Result<AuthorizedCaller, CliError> {
    let identity = identity_client(config).await?;
    let host = LoopbackHost::new(config.callback_addr).with_announcer(Arc::new(announce));
    let remote = FunctionClient::new(&config.functions_base_url(), &config.api_name, config.timeouts)?;
    Ok(AuthorizedCaller::new(
        CallerSettings::from_config(config),
        identity,
        Arc::new(host),
        Arc::new(remote),
    ))
}

fn announce(prompt: &ConsentPrompt) {
    eprintln!("Consent required. Open this page in a browser ({}x{}):", prompt.width, prompt.height);
    eprintln!("  {}", prompt.url);
    eprintln!("Waiting for the login page to report back on {}", prompt.callback_url);
}

async fn run_call(config: &AppConfig) -> Result<(), CliError> {
    let caller = build_caller(config).await?;
    let panel = Panel { code_path: config.code_path.clone(), docs_url: config.docs_url.clone() };

    let outcome = caller.run().await;
    println!("{}", panel.render(&caller.result()));
    outcome.map(|_| ()).map_err(CliError::from)
}

async fn run_token(config: &AppConfig) -> Result<(), CliError> {
    let caller = build_caller(config).await?;
    let token = caller.acquire_token_silent().await?;
    eprintln!(
        "account: {} (expires_on {}, from_cache {})",
        token.account.username, token.expires_on, token.from_cache
    );
    println!("{}", token.access_token);
    Ok(())
}

async fn run_consent_url(config: &AppConfig) -> Result<(), CliError> {
    let caller = build_caller(config).await?;
    println!("{}", caller.consent_url());
    Ok(())
}

async fn run_accounts(config: &AppConfig) -> Result<(), CliError> {
    let identity = identity_client(config).await?;
    let active = identity.active_account().map(|a| a.home_account_id);
    for account in identity.accounts() {
        let marker = if active.as_deref() == Some(account.home_account_id.as_str()) { "*" } else { " " };
        println!("{marker} {}\t{}", account.username, account.home_account_id);
    }
    Ok(())
}

async fn run_sign_out(config: &AppConfig) -> Result<(), CliError> {
    let identity = identity_client(config).await?;
    identity.clear().await?;
    println!("signed out");
    Ok(())
}
