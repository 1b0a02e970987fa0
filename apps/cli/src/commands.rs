//! CLI command definitions, routing, and tracing setup.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use questionhub_core::{NewQuestion, QuestionService, RebuildPolicy, hash_graph};
use questionhub_queue::JobBackend;
use questionhub_shared::{
    AppConfig, HashToken, QueryGraph, RandomIdGenerator, UserContext, init_config, load_config,
};
use questionhub_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// QuestionHub — store biomedical questions and orchestrate their answering.
#[derive(Parser)]
#[command(
    name = "questionhub",
    version,
    about = "Store graph-shaped questions, enqueue answering, and report live job status.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Database path (overrides `defaults.db_path`).
    #[arg(long, env = "QUESTIONHUB_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Print the content hash of a machine question.
    Hash {
        /// JSON file holding a question or a bare machine question.
        file: PathBuf,
    },

    /// Build a question (id and hash) without storing or submitting it.
    Convert {
        /// JSON file holding the question.
        file: PathBuf,

        /// Email of the owning user.
        #[arg(long)]
        user: String,
    },

    /// Store a question and enqueue answering for it.
    Submit {
        /// JSON file holding the question.
        file: PathBuf,

        /// Email of the submitting user.
        #[arg(long)]
        user: String,

        /// `true` to refresh the knowledge graph and retry if answering fails.
        /// Defaults to `defaults.rebuild_cache`.
        #[arg(long)]
        rebuild_cache: Option<String>,
    },

    /// List stored questions with their latest answers and running tasks.
    List {
        /// Only questions owned by this user.
        #[arg(long)]
        user: Option<String>,
    },

    /// Show the answer-set history of a question hash.
    Answers {
        /// Question hash.
        hash: String,
    },

    /// Show running tasks for question hashes.
    Status {
        /// Question hashes.
        #[arg(required = true)]
        hashes: Vec<String>,
    },

    /// Inspect or revoke queued jobs.
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// User management.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Job subcommands.
#[derive(Subcommand)]
pub(crate) enum JobsAction {
    /// List every stored job, continuations included.
    List,
    /// Show one job.
    Show {
        /// Job id.
        id: String,
    },
    /// Mark a job revoked; its continuations will never run.
    Revoke {
        /// Job id.
        id: String,
    },
}

/// User subcommands.
#[derive(Subcommand)]
pub(crate) enum UserAction {
    /// Register a user.
    Add {
        /// Email address.
        email: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "questionhub=info",
        1 => "questionhub=debug",
        _ => "questionhub=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so command output stays pipeable.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Hash { file } => cmd_hash(&file),
        Command::Convert { file, user } => cmd_convert(db, &file, &user).await,
        Command::Submit {
            file,
            user,
            rebuild_cache,
        } => cmd_submit(db, &file, &user, rebuild_cache.as_deref()).await,
        Command::List { user } => cmd_list(db, user.as_deref()).await,
        Command::Answers { hash } => cmd_answers(db, &hash).await,
        Command::Status { hashes } => cmd_status(db, hashes).await,
        Command::Jobs { action } => match action {
            JobsAction::List => cmd_jobs_list(db).await,
            JobsAction::Show { id } => cmd_jobs_show(db, &id).await,
            JobsAction::Revoke { id } => cmd_jobs_revoke(db, &id).await,
        },
        Command::User { action } => match action {
            UserAction::Add { email } => cmd_user_add(db, &email).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

/// Config, storage, and a question service whose queue is the database's job table.
struct Context {
    config: AppConfig,
    storage: Arc<Storage>,
    service: QuestionService,
}

impl Context {
    async fn open(db: Option<PathBuf>) -> Result<Self> {
        Self::open_with(db, false).await
    }

    /// Reporting commands read an existing database without writing to it.
    async fn open_for_reading(db: Option<PathBuf>) -> Result<Self> {
        Self::open_with(db, true).await
    }

    async fn open_with(db: Option<PathBuf>, read_only: bool) -> Result<Self> {
        let config = load_config()?;
        let path = db.unwrap_or_else(|| PathBuf::from(&config.defaults.db_path));
        let storage = if read_only && path.exists() {
            Storage::open_readonly(&path).await
        } else {
            Storage::open(&path).await
        };
        let storage =
            Arc::new(storage.wrap_err_with(|| format!("opening database {}", path.display()))?);
        let service = QuestionService::new(
            storage.clone(),
            storage.clone(),
            config.queue.clone(),
            Arc::new(RandomIdGenerator),
        );
        Ok(Self {
            config,
            storage,
            service,
        })
    }

    async fn user(&self, email: &str) -> Result<UserContext> {
        let user = self
            .storage
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| eyre!("unknown user '{email}' (register with `questionhub user add`)"))?;
        Ok(UserContext::from(&user))
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).wrap_err_with(|| format!("parsing {}", path.display()))
}

fn read_question(path: &Path) -> Result<NewQuestion> {
    let value = read_json(path)?;
    serde_json::from_value(value).wrap_err_with(|| format!("{} is not a question", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_hash(file: &Path) -> Result<()> {
    let value = read_json(file)?;
    let machine_question = value.get("machine_question").unwrap_or(&value);
    let graph = QueryGraph::from_machine_question(machine_question)?;
    println!("{}", hash_graph(&graph)?);
    Ok(())
}

async fn cmd_convert(db: Option<PathBuf>, file: &Path, email: &str) -> Result<()> {
    let ctx = Context::open(db).await?;
    let user = ctx.user(email).await?;
    let question = ctx.service.convert(read_question(file)?, user.user_id)?;
    print_json(&question)
}

async fn cmd_submit(
    db: Option<PathBuf>,
    file: &Path,
    email: &str,
    rebuild_cache: Option<&str>,
) -> Result<()> {
    let ctx = Context::open(db).await?;
    let user = ctx.user(email).await?;
    let policy = match rebuild_cache {
        Some(value) => RebuildPolicy::from_header(Some(value)),
        None => RebuildPolicy::from(ctx.config.defaults.rebuild_cache),
    };

    let id = ctx.service.create(read_question(file)?, &user, policy).await?;
    info!(%id, ?policy, "question submitted");
    println!("{id}");
    Ok(())
}

async fn cmd_list(db: Option<PathBuf>, email: Option<&str>) -> Result<()> {
    let ctx = Context::open_for_reading(db).await?;
    let questions = match email {
        Some(email) => {
            let user = ctx.user(email).await?;
            ctx.service.list_for_user(user.user_id).await?
        }
        None => ctx.service.list().await?,
    };
    print_json(&questions)
}

async fn cmd_answers(db: Option<PathBuf>, hash: &str) -> Result<()> {
    let ctx = Context::open_for_reading(db).await?;
    let answers = ctx.service.answers(&HashToken::new(hash)).await?;
    print_json(&answers)
}

async fn cmd_jobs_list(db: Option<PathBuf>) -> Result<()> {
    let ctx = Context::open_for_reading(db).await?;
    for job in ctx.storage.list_jobs().await? {
        println!("{}\t{}\t{}\t{}", job.id, job.state, job.name, job.record().args);
    }
    Ok(())
}

async fn cmd_jobs_show(db: Option<PathBuf>, id: &str) -> Result<()> {
    let ctx = Context::open_for_reading(db).await?;
    let job = ctx
        .storage
        .get_job(id)
        .await?
        .ok_or_else(|| eyre!("unknown job '{id}'"))?;
    print_json(&job)
}

async fn cmd_jobs_revoke(db: Option<PathBuf>, id: &str) -> Result<()> {
    let ctx = Context::open(db).await?;
    ctx.storage.revoke(id).await?;
    println!("Job {id} revoked");
    Ok(())
}

async fn cmd_status(db: Option<PathBuf>, hashes: Vec<String>) -> Result<()> {
    let ctx = Context::open_for_reading(db).await?;
    let hashes: BTreeSet<HashToken> = hashes.into_iter().map(HashToken::new).collect();
    let summary = ctx.service.status().summarize(&hashes).await?;

    for (hash, labels) in &summary {
        let labels: Vec<&str> = labels.iter().map(|l| l.as_str()).collect();
        println!("{hash}\t{}", labels.join(", "));
    }
    Ok(())
}

async fn cmd_user_add(db: Option<PathBuf>, email: &str) -> Result<()> {
    let ctx = Context::open(db).await?;
    if ctx.storage.get_user_by_email(email).await?.is_some() {
        return Err(eyre!("user '{email}' already exists"));
    }
    let user = ctx.storage.insert_user(email).await?;
    println!("User {} registered with id {}", user.email, user.id);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn submit_parses_rebuild_flag() {
        let cli = Cli::try_parse_from([
            "questionhub",
            "--db",
            "/tmp/q.db",
            "submit",
            "q.json",
            "--user",
            "ann@example.com",
            "--rebuild-cache",
            "false",
        ])
        .expect("parse");
        assert_eq!(cli.db.as_deref(), Some(Path::new("/tmp/q.db")));
        match cli.command {
            Command::Submit {
                user,
                rebuild_cache,
                ..
            } => {
                assert_eq!(user, "ann@example.com");
                assert_eq!(rebuild_cache.as_deref(), Some("false"));
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn list_filters_by_user_and_jobs_take_an_id() {
        let cli = Cli::try_parse_from(["questionhub", "list", "--user", "ann@example.com"])
            .expect("parse");
        assert!(matches!(cli.command, Command::List { user: Some(ref u) } if u == "ann@example.com"));

        let cli = Cli::try_parse_from(["questionhub", "jobs", "revoke", "j1"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::Jobs { action: JobsAction::Revoke { ref id } } if id == "j1"
        ));
        assert!(Cli::try_parse_from(["questionhub", "jobs", "show"]).is_err());
    }

    #[test]
    fn status_requires_a_hash() {
        assert!(Cli::try_parse_from(["questionhub", "status"]).is_err());
    }
}
