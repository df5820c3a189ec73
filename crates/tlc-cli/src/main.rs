//! TLC - tag-driven release gating CLI
//!
//! The `tlc` command drives releases through the gating pipeline.
//!
//! ## Commands
//!
//! - `release`: start, gate, preview, review and promote tagged releases
//! - `audit`: inspect, verify and export the hash-chained audit ledger
//! - `config`: validate or print the resolved pipeline configuration

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, Level};

use tlc_core::audit::{AuditLedger, AuditQuery, ExportFormat, ExportOptions};
use tlc_core::metrics::METRICS;
use tlc_core::policy::{load_from_path, read_raw, validate, ReleaseConfig};
use tlc_core::{
    resolve_commit_for_tag, Actor, ManagerOptions, OperationResult, PipelineError,
    ReleaseManager, ReleaseService, Role, TracingNotifier,
};
use tlc_gates::CommandGateRunner;
use tlc_state::fakes::{MemoryAuditStore, MemoryReleaseStore};
use tlc_state::{
    AuditStore, ReleaseStore, SurrealAuditStore, SurrealHandle, SurrealReleaseStore,
};

/// Configuration files picked up from the working directory when
/// `--config` is not given.
const DEFAULT_CONFIG_FILES: [&str; 2] = ["tlc.toml", "tlc.json"];

#[derive(Parser)]
#[command(name = "tlc")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tag-driven release gating pipeline (TLC)", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline configuration (.toml or .json)
    #[arg(short, long, global = true, env = "TLC_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the local database
    #[arg(long, global = true, env = "TLC_DATA_DIR", default_value = ".tlc")]
    data_dir: PathBuf,

    /// Keep releases and the ledger in memory for this invocation only
    #[arg(long, global = true)]
    memory: bool,

    /// Acting user recorded in the audit ledger
    #[arg(long, global = true, env = "TLC_USER", default_value = "tlc-cli")]
    user: String,

    /// Role used for authorization (admin, qa, developer, viewer)
    #[arg(long, global = true, env = "TLC_ROLE", default_value = "viewer")]
    role: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tagged releases
    Release {
        #[command(subcommand)]
        action: ReleaseAction,
    },

    /// Inspect and export the audit ledger
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },

    /// Check the pipeline configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ReleaseAction {
    /// Register a release for a version tag
    Start {
        /// Version tag (e.g. v1.2.0-rc.1)
        tag: String,
        /// Commit SHA; resolved from the git tag (or HEAD) when omitted
        #[arg(long)]
        commit: Option<String>,
        /// Repository used to resolve the commit
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Run the tier's gates right away
        #[arg(long)]
        run_gates: bool,
        /// Do not deploy a preview automatically when gates pass
        #[arg(long)]
        no_auto_preview: bool,
    },
    /// Run the automated gates of a pending release
    RunGates {
        tag: String,
        /// Do not deploy a preview automatically when gates pass
        #[arg(long)]
        no_auto_preview: bool,
    },
    /// Re-run the gates that failed
    Retry {
        tag: String,
        /// Do not deploy a preview automatically when gates pass
        #[arg(long)]
        no_auto_preview: bool,
    },
    /// Show one release
    Status { tag: String },
    /// List releases, newest version first
    List,
    /// Deploy a preview environment
    Deploy { tag: String },
    /// Accept a deployed release
    Accept { tag: String },
    /// Reject a release
    Reject {
        tag: String,
        /// Why the release was rejected
        #[arg(long)]
        reason: String,
    },
    /// Promote an accepted release candidate to its stable tag
    Promote { tag: String },
}

#[derive(Subcommand)]
enum AuditAction {
    /// Show every ledger entry for a tag
    Trail { tag: String },
    /// Latest event per tag
    Summary,
    /// Filter ledger entries
    Query {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Verify the checksum chain
    Verify,
    /// Export ledger entries (json, csv, cef, splunk)
    Export {
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,
        #[command(flatten)]
        filter: FilterArgs,
        /// Splunk `host` field
        #[arg(long)]
        host: Option<String>,
        /// Splunk `index` field
        #[arg(long)]
        index: Option<String>,
        /// Write the export to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a configuration file and list every problem
    Validate {
        /// File to check (defaults to --config or ./tlc.toml)
        path: Option<PathBuf>,
    },
    /// Print the resolved configuration
    Show,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    #[arg(long)]
    tag: Option<String>,
    /// Only entries recorded by this user
    #[arg(long = "by-user")]
    user: Option<String>,
    #[arg(long)]
    event: Option<String>,
    /// Inclusive lower bound (RFC 3339)
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    /// Inclusive upper bound (RFC 3339)
    #[arg(long)]
    to: Option<DateTime<Utc>>,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    offset: Option<usize>,
}

impl FilterArgs {
    fn into_query(self) -> AuditQuery {
        AuditQuery {
            from: self.from,
            to: self.to,
            user: self.user,
            tag: self.tag,
            event: self.event,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tlc_core::init_tracing(cli.log_json, level);

    let json = cli.json;
    let result = run(cli).await?;
    METRICS.flush();

    let rendered = render(&result, json);
    if result.success || json {
        println!("{rendered}");
    } else {
        eprintln!("{rendered}");
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run(cli: Cli) -> Result<OperationResult> {
    let config_path = cli.config.clone().or_else(discover_config);

    let command = match cli.command {
        Commands::Config { action } => return Ok(cmd_config(action, config_path.as_deref())),
        other => other,
    };

    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => return Ok(OperationResult::failed(&e)),
    };

    let options = ManagerOptions {
        auto_preview: !skips_auto_preview(&command),
    };
    let (releases, audit) = open_stores(cli.memory, &cli.data_dir).await?;
    let runner = Arc::new(CommandGateRunner::from_config(&config));
    let service = build_service(config, releases, audit, runner, options);

    let actor = Actor::new(cli.user, Role::from(cli.role));
    Ok(dispatch(&service, &actor, command).await)
}

fn discover_config() -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

fn load_config(path: Option<&Path>) -> tlc_core::Result<ReleaseConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            load_from_path(path)
        }
        None => Ok(ReleaseConfig::default()),
    }
}

fn skips_auto_preview(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Release {
            action: ReleaseAction::Start {
                no_auto_preview: true,
                ..
            } | ReleaseAction::RunGates {
                no_auto_preview: true,
                ..
            } | ReleaseAction::Retry {
                no_auto_preview: true,
                ..
            }
        }
    )
}

async fn open_stores(
    memory: bool,
    data_dir: &Path,
) -> Result<(Arc<dyn ReleaseStore>, Arc<dyn AuditStore>)> {
    if memory {
        return Ok((
            Arc::new(MemoryReleaseStore::new()),
            Arc::new(MemoryAuditStore::new()),
        ));
    }

    let handle = SurrealHandle::setup_from_env(&data_dir.join("db"))
        .await
        .context("Failed to connect to TLC database")?;
    Ok((
        Arc::new(SurrealReleaseStore::new(handle.clone())),
        Arc::new(SurrealAuditStore::new(handle)),
    ))
}

fn build_service(
    config: ReleaseConfig,
    releases: Arc<dyn ReleaseStore>,
    audit: Arc<dyn AuditStore>,
    runner: Arc<CommandGateRunner>,
    options: ManagerOptions,
) -> ReleaseService {
    let ledger = Arc::new(AuditLedger::new(audit));
    let manager = ReleaseManager::new(Arc::new(config), releases, ledger, runner)
        .with_notifier(Arc::new(TracingNotifier))
        .with_options(options);
    ReleaseService::new(Arc::new(manager))
}

async fn dispatch(service: &ReleaseService, actor: &Actor, command: Commands) -> OperationResult {
    match command {
        Commands::Release { action } => cmd_release(service, actor, action).await,
        Commands::Audit { action } => cmd_audit(service, actor, action).await,
        Commands::Config { .. } => OperationResult::failed(&PipelineError::Format(
            "config commands do not open the pipeline".to_string(),
        )),
    }
}

// ========== Release Commands ==========

async fn cmd_release(service: &ReleaseService, actor: &Actor, action: ReleaseAction) -> OperationResult {
    match action {
        ReleaseAction::Start {
            tag,
            commit,
            repo,
            run_gates,
            ..
        } => {
            let commit = match commit {
                Some(commit) => commit,
                None => match resolve_commit_for_tag(&repo, &tag) {
                    Ok(sha) => sha,
                    Err(e) => return OperationResult::failed(&e),
                },
            };
            service.start(actor, &tag, &commit, run_gates).await
        }
        ReleaseAction::RunGates { tag, .. } => service.run_gates(actor, &tag).await,
        ReleaseAction::Retry { tag, .. } => service.retry(actor, &tag).await,
        ReleaseAction::Status { tag } => service.get(actor, &tag).await,
        ReleaseAction::List => service.list(actor).await,
        ReleaseAction::Deploy { tag } => service.deploy(actor, &tag).await,
        ReleaseAction::Accept { tag } => service.accept(actor, &tag).await,
        ReleaseAction::Reject { tag, reason } => service.reject(actor, &tag, &reason).await,
        ReleaseAction::Promote { tag } => service.promote(actor, &tag).await,
    }
}

// ========== Audit Commands ==========

async fn cmd_audit(service: &ReleaseService, actor: &Actor, action: AuditAction) -> OperationResult {
    match action {
        AuditAction::Trail { tag } => service.trail(actor, &tag).await,
        AuditAction::Summary => service.summary(actor).await,
        AuditAction::Query { filter } => service.query(actor, &filter.into_query()).await,
        AuditAction::Verify => service.verify(actor).await,
        AuditAction::Export {
            format,
            filter,
            host,
            index,
            output,
        } => {
            let options = ExportOptions {
                format,
                filter: filter.into_query(),
                host,
                index,
            };
            let result = service.export(actor, &options).await;
            match output {
                Some(path) if result.success => write_export(result, &path),
                _ => result,
            }
        }
    }
}

fn write_export(result: OperationResult, path: &Path) -> OperationResult {
    let body = result
        .data
        .as_ref()
        .and_then(Value::as_str)
        .unwrap_or_default();
    if let Err(e) = std::fs::write(path, body) {
        return OperationResult::failed(&PipelineError::Io(e));
    }
    OperationResult::ok(
        format!("{} to {}", result.message, path.display()),
        json!({ "path": path.display().to_string(), "bytes": body.len() }),
    )
}

// ========== Config Commands ==========

fn cmd_config(action: ConfigAction, config_path: Option<&Path>) -> OperationResult {
    match action {
        ConfigAction::Validate { path } => {
            let Some(path) = path.as_deref().or(config_path) else {
                return OperationResult::failed(&PipelineError::Format(
                    "no configuration file given and none found in the current directory"
                        .to_string(),
                ));
            };
            let raw = match read_raw(path) {
                Ok(raw) => raw,
                Err(e) => return OperationResult::failed(&e),
            };
            let report = validate(&raw);
            let data = json!({ "path": path.display().to_string(), "valid": report.valid, "errors": report.errors });
            if report.valid {
                OperationResult::ok(format!("{} is valid", path.display()), data)
            } else {
                let error = PipelineError::Format(format!(
                    "{} has {} problem(s)",
                    path.display(),
                    report.errors.len()
                ));
                OperationResult {
                    data: Some(data),
                    ..OperationResult::failed(&error)
                }
            }
        }
        ConfigAction::Show => match load_config(config_path) {
            Ok(config) => match serde_json::to_value(&config) {
                Ok(data) => OperationResult::ok("resolved configuration", data),
                Err(e) => OperationResult::failed(&e.into()),
            },
            Err(e) => OperationResult::failed(&e),
        },
    }
}

// ========== Output ==========

fn render(result: &OperationResult, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(result)
            .unwrap_or_else(|e| format!("{{\"success\":false,\"message\":\"{e}\"}}"));
    }

    let mut out = if result.success {
        result.message.clone()
    } else {
        match result.error_kind {
            Some(kind) => format!("error[{kind}]: {}", result.message),
            None => format!("error: {}", result.message),
        }
    };

    match &result.data {
        Some(Value::String(text)) => {
            out.push('\n');
            out.push_str(text);
        }
        Some(data @ (Value::Array(_) | Value::Object(_))) => {
            if let Ok(pretty) = serde_json::to_string_pretty(data) {
                out.push('\n');
                out.push_str(&pretty);
            }
        }
        _ => {}
    }
    out
}
