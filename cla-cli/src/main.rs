use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use cla_core::{
    gather_unsigned, reconcile, AttachAction, CommentOutcome, PullRequestEvent, ReconcileReport,
    RemovalOutcome, RepoRef, UserSignature,
};
use cla_server::config::{DATABASE_FILE, DEFAULT_API_URL, DEFAULT_PRIVATE_KEY_PATH};
use cla_server::{GitHubApp, InstallationClient, SqliteSignatureStore};

/// CLA bot: check or reconcile the CLA state of one pull request
#[derive(Parser, Debug)]
#[command(name = "cla-bot")]
#[command(about = "Check or reconcile the CLA state of a pull request", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the pull request authors who have not signed (changes nothing)
    Check(PullRequestArgs),
    /// Run a full reconciliation: status, labels and comment
    Reconcile(ReconcileArgs),
}

#[derive(Args, Debug)]
struct AppArgs {
    /// GitHub App ID
    #[arg(long, env = "GITHUB_APP_ID")]
    app_id: u64,

    /// GitHub App private key (PEM); `\n` escapes are expanded
    #[arg(long, env = "GITHUB_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// File to read the private key from when --private-key is not given
    #[arg(long, env = "GITHUB_PRIVATE_KEY_PATH", default_value = DEFAULT_PRIVATE_KEY_PATH)]
    private_key_path: PathBuf,

    /// CLA version authors must have signed
    #[arg(long, env = "CLA_VERSION")]
    cla_version: String,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Directory holding the signature database
    #[arg(long, env = "STATE_DIR", default_value = ".")]
    state_dir: PathBuf,
}

#[derive(Args, Debug)]
struct PullRequestArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Repository owner
    #[arg(long)]
    owner: String,

    /// Repository name
    #[arg(long)]
    repo: String,

    /// Pull request number
    #[arg(long)]
    pr: u64,

    /// Installation of the app on the repository
    #[arg(long)]
    installation_id: u64,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    #[command(flatten)]
    target: PullRequestArgs,

    /// Commit to publish statuses on (defaults to the pull request's current head)
    #[arg(long)]
    head_sha: Option<String>,
}

impl AppArgs {
    fn private_key(&self) -> Result<String> {
        match &self.private_key {
            Some(key) => Ok(key.replace("\\n", "\n")),
            None => std::fs::read_to_string(&self.private_key_path).with_context(|| {
                format!(
                    "Failed to read private key from {}",
                    self.private_key_path.display()
                )
            }),
        }
    }

    fn open_store(&self) -> Result<SqliteSignatureStore> {
        let path = self.state_dir.join(DATABASE_FILE);
        SqliteSignatureStore::new(&path)
            .with_context(|| format!("Failed to open signature database {}", path.display()))
    }
}

impl PullRequestArgs {
    fn repo_ref(&self) -> RepoRef {
        RepoRef::new(&self.owner, &self.repo)
    }

    async fn client(&self) -> Result<InstallationClient> {
        let app = GitHubApp::new(
            self.app.app_id,
            self.app.private_key()?,
            &self.app.api_url,
        )?;
        app.installation_client(self.installation_id)
            .await
            .context("Failed to authenticate as the app installation")
    }
}

fn format_unsigned(
    repo: &RepoRef,
    pr: u64,
    cla_version: &str,
    unsigned: &[UserSignature],
) -> String {
    if unsigned.is_empty() {
        return format!(
            "All authors on {}#{} have signed CLA version {}",
            repo, pr, cla_version
        );
    }

    let mut out = format!(
        "{} author(s) on {}#{} have not signed CLA version {}:",
        unsigned.len(),
        repo,
        pr,
        cla_version
    );
    for signature in unsigned {
        out.push_str("\n  @");
        out.push_str(&signature.user.login);
        if let Some(email) = &signature.user.email {
            out.push_str(&format!(" <{}>", email));
        }
    }
    out
}

fn format_report(report: &ReconcileReport) -> String {
    let decision = if report.decision.is_all_signed() {
        "all authors signed".to_string()
    } else {
        let logins: Vec<String> = report
            .decision
            .unsigned()
            .iter()
            .map(|s| format!("@{}", s.user.login))
            .collect();
        format!("unsigned: {}", logins.join(", "))
    };

    let label = format!(
        "'{}' ({}, {})",
        report.labels.label,
        if report.labels.created { "created" } else { "existing" },
        match report.labels.attach {
            AttachAction::Attach => "attached",
            AttachAction::AlreadyAttached => "already attached",
        }
    );

    let opposite = match report.labels.opposite {
        RemovalOutcome::Removed => "removed",
        RemovalOutcome::AlreadyAbsent => "not present",
    };

    let comment = match report.comment {
        CommentOutcome::Posted => "posted",
        CommentOutcome::AlreadyPresent => "already present",
        CommentOutcome::NotNeeded => "not needed",
    };

    format!(
        "decision: {}\nlabel:    {}\nopposite: {}\ncomment:  {}\nstatus:   {}",
        decision,
        label,
        opposite,
        comment,
        report.decision.final_status().state
    )
}

async fn run_check(args: PullRequestArgs) -> Result<()> {
    let client = args.client().await?;
    let store = args.app.open_store()?;
    let repo = args.repo_ref();

    let unsigned = gather_unsigned(&client, &store, &repo, args.pr, &args.app.cla_version)
        .await
        .context("Failed to gather commit authors")?;

    println!(
        "{}",
        format_unsigned(&repo, args.pr, &args.app.cla_version, &unsigned)
    );
    Ok(())
}

async fn run_reconcile(args: ReconcileArgs) -> Result<()> {
    let target = &args.target;
    let client = target.client().await?;
    let store = target.app.open_store()?;
    let repo = target.repo_ref();

    let head_sha = match args.head_sha {
        Some(sha) => sha,
        None => {
            let sha = client
                .pull_request_head_sha(&repo, target.pr)
                .await
                .context("Failed to fetch the pull request head")?;
            info!("Using current head {} of {}#{}", sha, repo, target.pr);
            sha
        }
    };

    let event = PullRequestEvent::new(repo, target.pr, head_sha, target.installation_id);
    let report = reconcile(&client, &store, &event, &target.app.cla_version)
        .await
        .context("Reconciliation failed")?;

    println!("{}", format_report(&report));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => run_check(args).await,
        Commands::Reconcile(args) => run_reconcile(args).await,
    }
}
