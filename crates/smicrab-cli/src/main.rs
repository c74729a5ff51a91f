//! `smicrab` - command-line client for SMICRAB analyses

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use smicrab_core::{
    ActionResponse, Analysis, AnalysisId, AnalyzeStatus, SaveParametersRequest, StatusView,
    UserId,
};
use smicrab_sync::{
    CredentialSource, EnvCredentials, LiveAnalysis, MutationOutcome, SmicrabClient,
    StaticCredentials, SyncConfig,
};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let id = || {
        Arg::new("id")
            .required(true)
            .value_parser(value_parser!(AnalysisId))
            .help("Analysis id")
    };
    let user = || {
        Arg::new("user")
            .required(true)
            .value_parser(value_parser!(UserId))
            .help("User id")
    };

    Command::new("smicrab")
        .version(env!("CARGO_PKG_VERSION"))
        .about("SMICRAB analysis lifecycle client")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("api-url")
                .long("api-url")
                .global(true)
                .help("Backend base URL (overrides config and SMICRAB_API_URL)"),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .global(true)
                .help("Bearer token (defaults to SMICRAB_TOKEN)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print responses and logs as JSON"),
        )
        .subcommand(
            Command::new("status")
                .about("Show the status of an analysis")
                .arg(id())
                .arg(
                    Arg::new("fresh")
                        .long("fresh")
                        .action(ArgAction::SetTrue)
                        .help("Bypass the cache"),
                ),
        )
        .subcommand(
            Command::new("watch")
                .about("Poll an analysis until it completes or fails")
                .arg(id())
                .arg(
                    Arg::new("interval-ms")
                        .long("interval-ms")
                        .value_parser(value_parser!(u64).range(1..))
                        .help("Polling interval in milliseconds"),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("List analyses owned by a user")
                .arg(user()),
        )
        .subcommand(
            Command::new("create")
                .about("Create a pending analysis")
                .arg(user()),
        )
        .subcommand(
            Command::new("configure")
                .about("Save analysis parameters from a JSON file")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Parameters payload"),
                ),
        )
        .subcommand(Command::new("run").about("Run a configured analysis").arg(id()))
        .subcommand(Command::new("delete").about("Delete an analysis").arg(id()))
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    // A subscriber may already be installed when embedded
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

fn load_config(matches: &ArgMatches) -> Result<SyncConfig> {
    let path = matches.get_one::<PathBuf>("config");
    let mut config = SyncConfig::load(path.map(PathBuf::as_path))
        .with_context(|| match path {
            Some(path) => format!("failed to load {}", path.display()),
            None => "failed to load configuration".to_string(),
        })?;
    if let Some(url) = matches.get_one::<String>("api-url") {
        config = config.with_api_url(url.as_str());
        config.validate()?;
    }
    Ok(config)
}

fn credentials(matches: &ArgMatches) -> Arc<dyn CredentialSource> {
    match matches.get_one::<String>("token") {
        Some(token) => Arc::new(StaticCredentials::bearer(token.as_str())),
        None => Arc::new(EnvCredentials::new()),
    }
}

/// One-line summary of an analysis
fn describe(analysis: &Analysis) -> String {
    let mut line = format!("{}  {}", analysis.id, analysis.status);
    match StatusView::for_analysis(analysis) {
        StatusView::InProgress { module } => {
            let _ = write!(line, "  [{module}]");
        }
        StatusView::Failure { message, kind } => {
            let _ = write!(line, "  {}: {message}", kind.title());
        }
        _ => {}
    }
    if let Some(model) = analysis.model_type {
        let _ = write!(line, "  {model:?}");
    }
    line
}

struct Output {
    json: bool,
}

impl Output {
    /// Print a response; returns whether it succeeded
    fn response<T: Serialize>(
        &self,
        response: &ActionResponse<T>,
        summary: impl FnOnce(&T) -> String,
    ) -> Result<bool> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(response)?);
            return Ok(response.success);
        }

        match (&response.data, response.success) {
            (Some(data), true) => println!("{}", summary(data)),
            _ => {
                let message = response.message.as_deref().unwrap_or("request failed");
                eprintln!("error: {message}");
                for error in &response.errors {
                    eprintln!("  {error}");
                }
            }
        }
        Ok(response.success)
    }

    fn analysis(&self, analysis: &Analysis) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(analysis)?);
        } else {
            println!("{}", describe(analysis));
        }
        Ok(())
    }
}

fn owned(response: ActionResponse<Arc<Analysis>>) -> ActionResponse<Analysis> {
    response.map(|analysis| (*analysis).clone())
}

async fn watch_analysis(live: &LiveAnalysis, out: &Output) -> Result<bool> {
    let mut updates = live.subscribe();
    let loaded = live.load().await;
    if !loaded.success {
        return out.response(&owned(loaded), describe);
    }
    // A poll may already have delivered past the loaded snapshot
    let latest = updates.borrow_and_update().clone().or(loaded.data);
    if let Some(analysis) = &latest {
        out.analysis(analysis)?;
    }

    if keep_following(latest.as_deref(), live.is_polling()) {
        follow(live, &mut updates, out).await?;
    }
    live.stop();
    // Exit status reflects the final state
    Ok(live
        .snapshot()
        .is_some_and(|a| a.status == AnalyzeStatus::Completed))
}

fn keep_following(latest: Option<&Analysis>, polling: bool) -> bool {
    polling && !latest.is_some_and(Analysis::is_terminal)
}

async fn follow(
    live: &LiveAnalysis,
    updates: &mut watch::Receiver<Option<Arc<Analysis>>>,
    out: &Output,
) -> Result<()> {
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(analysis) = latest {
                    out.analysis(&analysis)?;
                    if analysis.is_terminal() {
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(id = %live.id(), "interrupted");
                break;
            }
        }
    }
    Ok(())
}

fn mutation<T: Serialize>(
    out: &Output,
    outcome: &MutationOutcome<T>,
    summary: impl FnOnce(&T) -> String,
) -> Result<bool> {
    debug!(refetch = ?outcome.refetch, "mutation finished");
    out.response(&outcome.response, summary)
}

async fn dispatch(matches: &ArgMatches, client: &SmicrabClient, out: &Output) -> Result<bool> {
    match matches.subcommand() {
        Some(("status", args)) => {
            let id = args.get_one::<AnalysisId>("id").context("missing id")?;
            let response = client
                .fetcher()
                .status_response(id, &client.auth_context(), args.get_flag("fresh"))
                .await;
            out.response(&owned(response), describe)
        }
        Some(("watch", args)) => {
            let id = args.get_one::<AnalysisId>("id").context("missing id")?;
            let client = match args.get_one::<u64>("interval-ms") {
                Some(ms) => client.clone().with_poll_interval(Duration::from_millis(*ms)),
                None => client.clone(),
            };
            watch_analysis(&client.live(*id), out).await
        }
        Some(("list", args)) => {
            let user = args.get_one::<UserId>("user").context("missing user")?;
            let response = client.coordinator().list_for_user(*user).await;
            out.response(&response, |analyses| {
                if analyses.is_empty() {
                    return "no analyses".to_string();
                }
                analyses.iter().map(describe).collect::<Vec<_>>().join("\n")
            })
        }
        Some(("create", args)) => {
            let user = args.get_one::<UserId>("user").context("missing user")?;
            let outcome = client.coordinator().create(*user).await;
            mutation(out, &outcome, describe)
        }
        Some(("configure", args)) => {
            let path = args.get_one::<PathBuf>("file").context("missing file")?;
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let request: SaveParametersRequest = serde_json::from_str(&raw)
                .with_context(|| format!("invalid parameters in {}", path.display()))?;
            let outcome = client.coordinator().save_configuration(&request).await;
            mutation(out, &outcome, describe)
        }
        Some(("run", args)) => {
            let id = args.get_one::<AnalysisId>("id").context("missing id")?;
            let outcome = client.coordinator().run(*id).await;
            mutation(out, &outcome, |started| {
                format!("{}  {}  {}", started.analysis_id, started.status, started.message)
            })
        }
        Some(("delete", args)) => {
            let id = args.get_one::<AnalysisId>("id").context("missing id")?;
            let outcome = client.coordinator().delete(*id).await;
            mutation(out, &outcome, |deleted| {
                let mut line = format!("{}  {}", deleted.analysis_id, deleted.message);
                if deleted.container_stopped {
                    line.push_str("  (container stopped)");
                }
                line
            })
        }
        _ => Ok(false),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let matches = cli().get_matches();
    let out = Output {
        json: matches.get_flag("json"),
    };
    init_logging(out.json);

    let config = load_config(&matches)?;
    debug!(api_url = %config.base_url(), "configuration loaded");
    let client = SmicrabClient::connect(&config, credentials(&matches))?;

    let succeeded = dispatch(&matches, &client, &out).await?;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smicrab_core::ModuleName;
    use smicrab_test_utils::analysis_with_status;

    #[test]
    fn test_cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn test_parses_status_with_global_flags() {
        let id = AnalysisId::new();
        let matches = cli()
            .try_get_matches_from([
                "smicrab",
                "status",
                &id.to_string(),
                "--fresh",
                "--json",
                "--api-url",
                "http://backend:8000",
            ])
            .unwrap();

        assert!(matches.get_flag("json"));
        assert_eq!(
            matches.get_one::<String>("api-url").map(String::as_str),
            Some("http://backend:8000")
        );
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "status");
        assert_eq!(args.get_one::<AnalysisId>("id"), Some(&id));
        assert!(args.get_flag("fresh"));
    }

    #[test]
    fn test_rejects_malformed_id_and_zero_interval() {
        assert!(cli().try_get_matches_from(["smicrab", "run", "not-a-uuid"]).is_err());
        let id = AnalysisId::new().to_string();
        assert!(cli()
            .try_get_matches_from(["smicrab", "watch", &id, "--interval-ms", "0"])
            .is_err());
    }

    #[test]
    fn test_describe_in_progress_and_failure() {
        let mut analysis = analysis_with_status(AnalyzeStatus::InProgress);
        analysis.current_module = ModuleName::EstimateModule;
        assert!(describe(&analysis).ends_with("in_progress  [estimate_module]"));

        let mut failed = analysis_with_status(AnalyzeStatus::Error);
        failed.error_message = Some("Out of memory".into());
        assert!(describe(&failed).ends_with("error  Memory Limit Exceeded: Out of memory"));
    }

    #[test]
    fn test_watch_stops_on_terminal_snapshot_seen_before_following() {
        let running = analysis_with_status(AnalyzeStatus::InProgress);
        let completed = analysis_with_status(AnalyzeStatus::Completed);

        assert!(keep_following(Some(&running), true));
        // Terminal update raced the load while the poller had not retired yet
        assert!(!keep_following(Some(&completed), true));
        assert!(!keep_following(Some(&running), false));
        assert!(keep_following(None, true));
    }
}
