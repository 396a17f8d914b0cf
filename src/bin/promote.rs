//! CLI for promoting application versions into GitOps environments.

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser, ValueEnum};
use gitops_promote::prelude::*;
use gitops_promote::telemetry::init_tracing;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

#[derive(Parser)]
#[command(name = "promote")]
#[command(author, version, about = "Promote an application version into GitOps environments", long_about = None)]
#[command(disable_version_flag = true)]
#[command(group(ArgGroup::new("target").required(true).args(["env", "all_auto"])))]
struct Cli {
    /// Application to promote
    #[arg(short, long)]
    app: String,

    /// Version to promote (defaults to the version stream's latest)
    #[arg(short, long, default_value = "")]
    version: String,

    /// Environment to promote into
    #[arg(short, long)]
    env: Option<String>,

    /// Promote into every environment with an automatic strategy
    #[arg(long)]
    all_auto: bool,

    /// Promote as another instance of the application
    #[arg(long)]
    alias: Option<String>,

    /// Do not request auto-merge or wait for pull requests to merge
    #[arg(long)]
    no_poll: bool,

    /// Never prompt for confirmation
    #[arg(short, long)]
    batch_mode: bool,

    /// Environment registry file
    #[arg(long, default_value = "environments.yaml")]
    environments: PathBuf,

    /// Version stream directory
    #[arg(long, default_value = "versions")]
    versions_dir: PathBuf,

    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Token for the git remote and the pull request host
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: String,

    /// How to authenticate git clones and pushes
    #[arg(long, value_enum, default_value_t = GitAuthMode::Token)]
    git_auth: GitAuthMode,

    /// SSH private key for --git-auth ssh (defaults to ~/.ssh/id_ed25519 or id_rsa)
    #[arg(long)]
    ssh_key: Option<PathBuf>,

    /// Passphrase of the SSH private key
    #[arg(long, env = "SSH_KEY_PASSPHRASE", hide_env_values = true)]
    ssh_passphrase: Option<String>,

    /// GitHub Enterprise API base URL
    #[arg(long, env = "GITHUB_API_URL")]
    github_api_url: Option<String>,

    /// Maximum seconds to wait for a pull request to merge
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Log debug output
    #[arg(long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum GitAuthMode {
    /// Use the host token over HTTPS
    Token,
    /// Use an SSH key
    Ssh,
    /// Use git's configured credential helper
    Helper,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(
        cli.log_json,
        if cli.verbose { Level::DEBUG } else { Level::INFO },
    );

    let report = run(&cli).await?;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else {
        print!("{}", report);
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<PromotionReport> {
    let mut config = match &cli.config {
        Some(path) if path.extension().is_some_and(|e| e == "json") => {
            PromoteConfig::from_json(path).context("Failed to load config")?
        }
        Some(path) => PromoteConfig::from_yaml(path).context("Failed to load config")?,
        None => PromoteConfig::default(),
    };
    if let Some(timeout) = cli.timeout {
        let interval = config.poll_interval();
        config = config.with_polling(interval, Duration::from_secs(timeout));
    }

    let host = match &cli.github_api_url {
        Some(url) => GitHubHost::with_enterprise(cli.token.clone(), url),
        None => GitHubHost::new(cli.token.clone()),
    }
    .context("Failed to create GitHub client")?
    .with_auto_merge_label(config.auto_merge_label.clone());
    let engine = Promote::new()
        .registry(Arc::new(FileEnvironmentRegistry::new(&cli.environments)))
        .version_stream(Arc::new(FileVersionStream::new(&cli.versions_dir)))
        .git(Arc::new(Git2Client::new(git_auth(cli)?)))
        .host(Arc::new(host))
        .config(config)
        .build()
        .context("Invalid configuration")?;

    let mut request = match &cli.env {
        Some(env) => PromotionRequest::to_environment(&cli.app, env),
        None => PromotionRequest::to_all_automatic(&cli.app),
    }
    .version(&cli.version)
    .no_poll(cli.no_poll)
    .batch_mode(cli.batch_mode);
    if let Some(alias) = &cli.alias {
        request = request.alias(alias);
    }

    if !request.batch_mode {
        confirm_manual(&engine, &request).await?;
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling promotion");
            on_interrupt.cancel();
        }
    });

    engine
        .promote(request, cancel)
        .await
        .context("Promotion failed")
}

fn git_auth(cli: &Cli) -> Result<GitAuth> {
    let auth = match cli.git_auth {
        GitAuthMode::Token => GitAuth::token(cli.token.clone()),
        GitAuthMode::Helper => GitAuth::CredentialHelper,
        GitAuthMode::Ssh => match &cli.ssh_key {
            Some(path) => GitAuth::ssh_key(path),
            None => GitAuth::ssh_default().context("Failed to find an SSH key")?,
        },
    };
    Ok(match &cli.ssh_passphrase {
        Some(passphrase) => auth.with_passphrase(passphrase),
        None => auth,
    })
}

async fn confirm_manual(engine: &PromoteEngine, request: &PromotionRequest) -> Result<()> {
    let manual: Vec<Environment> = engine
        .target_environments(&request.target)
        .await
        .context("Failed to look up environments")?
        .into_iter()
        .filter(|e| e.promotion_strategy == PromotionStrategy::Manual)
        .collect();

    for env in manual {
        print!(
            "Promote {} to {} ({})? [y/N] ",
            request.application, env.name, env.namespace
        );
        std::io::stdout().flush()?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            bail!("Promotion to {} aborted", env.name);
        }
    }
    Ok(())
}
