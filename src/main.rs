//! Subflow CLI
//!
//! Entry point for the `subflow` command-line tool.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use subflow::config::{host_config_path, REPO_CONFIG_PATH};
use subflow::linked::LinkedOutcome;
use subflow::reconcile::ReconcileEvent;
use subflow::workflow::{builtin, WorkflowDraft};
use subflow::{
    Actor, CancellationToken, ClientSession, EffectiveConfig, EngineConfig, ExecuteOptions, JobLinkedDriver,
    JobPoller, LogNotifier, MemoryStore, Resolution, StaticScopes, TransitionApi, TransitionExecutor, VersionStore,
    Workflow, WorkflowRegistry,
};
use subflow_runner::{FailureInjection, RunnerConfig, RunnerState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Venue the CLI assigns the workflow under test to.
const CLI_VENUE: &str = "cli";

#[derive(Parser)]
#[command(name = "subflow")]
#[command(about = "Submission workflow engine", version)]
struct Cli {
    /// Path to repo config file (default: .subflow/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate workflow definition files
    Validate {
        /// Workflow files (.toml or .json)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Resolve the transition between two states
    Resolve {
        /// Built-in workflow name or path to a workflow file
        #[arg(long, short = 'w')]
        workflow: String,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },

    /// List user-triggered transitions available from a state
    Transitions {
        /// Built-in workflow name or path to a workflow file
        #[arg(long, short = 'w')]
        workflow: String,

        #[arg(long)]
        from: String,
    },

    /// Drive a submission version through a sequence of target states
    Simulate {
        /// Built-in workflow name or path to a workflow file
        #[arg(long, short = 'w')]
        workflow: String,

        /// Target states, in order (e.g., "IN_REVIEW,PUBLISHED")
        #[arg(long, value_delimiter = ',', required = true)]
        to: Vec<String>,

        /// Make every job fail
        #[arg(long)]
        fail_job: bool,

        /// Simulated job duration in milliseconds
        #[arg(long, default_value_t = 200)]
        job_ms: u64,

        /// Drive transitions through a client session and print its events
        #[arg(long)]
        client: bool,
    },

    /// Print the effective configuration with provenance
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { files, json } => run_validate(&files, json),
        Commands::Resolve { workflow, from, to } => run_resolve(&workflow, &from, &to),
        Commands::Transitions { workflow, from } => run_transitions(&workflow, &from),
        Commands::Simulate {
            workflow,
            to,
            fail_job,
            job_ms,
            client,
        } => run_simulate(cli.config, &workflow, &to, fail_job, job_ms, client),
        Commands::Config => run_config(cli.config),
    }
}

fn run_validate(files: &[PathBuf], json_output: bool) {
    let mut reports = Vec::new();
    let mut failed = false;

    for path in files {
        let report = match WorkflowDraft::from_path(path) {
            Ok(draft) => {
                let violations: Vec<String> = draft.validate().iter().map(|v| v.to_string()).collect();
                json!({
                    "path": path.display().to_string(),
                    "name": draft.name(),
                    "valid": violations.is_empty(),
                    "violations": violations,
                })
            }
            Err(e) => json!({
                "path": path.display().to_string(),
                "valid": false,
                "error": e.to_string(),
            }),
        };
        failed |= report["valid"] != json!(true);
        reports.push(report);
    }

    if json_output {
        print_json(&reports);
    } else {
        for report in &reports {
            let path = report["path"].as_str().unwrap_or_default();
            if report["valid"] == json!(true) {
                println!("ok    {}", path);
                continue;
            }
            println!("FAIL  {}", path);
            if let Some(error) = report["error"].as_str() {
                println!("      {}", error);
            }
            for violation in report["violations"].as_array().into_iter().flatten() {
                println!("      {}", violation.as_str().unwrap_or_default());
            }
        }
    }

    if failed {
        process::exit(1);
    }
}

fn run_resolve(workflow_arg: &str, from: &str, to: &str) {
    let workflow = load_workflow_or_exit(workflow_arg);
    if !workflow.has_state(from) {
        eprintln!("Unknown state '{}' in workflow {}", from, workflow.name);
        process::exit(1);
    }

    match subflow::resolve(&workflow, from, to) {
        Resolution::Found(transition) => print_json(transition),
        Resolution::NotFound => {
            eprintln!("No transition from {} to {}", from, to);
            process::exit(1);
        }
        Resolution::Ambiguous(candidates) => {
            let names: Vec<_> = candidates.iter().map(|t| t.name.as_str()).collect();
            eprintln!("Ambiguous transition from {} to {}: {}", from, to, names.join(", "));
            process::exit(2);
        }
    }
}

fn run_transitions(workflow_arg: &str, from: &str) {
    let workflow = load_workflow_or_exit(workflow_arg);
    let Some(state) = workflow.state(from) else {
        eprintln!("Unknown state '{}' in workflow {}", from, workflow.name);
        process::exit(1);
    };

    let available: Vec<_> = workflow
        .available_transitions(from)
        .into_iter()
        .map(|t| {
            json!({
                "name": t.name,
                "target": t.target_state_name,
                "label": t.labels.action,
                "requiredScopes": t.required_scopes,
                "requiresJob": t.requires_job,
            })
        })
        .collect();

    print_json(&json!({
        "workflow": workflow.name,
        "state": state.name,
        "terminal": workflow.is_terminal(from),
        "transitions": available,
    }));
}

fn run_simulate(
    config_path: Option<PathBuf>,
    workflow_arg: &str,
    targets: &[String],
    fail_job: bool,
    job_ms: u64,
    client: bool,
) {
    let engine = match load_config(config_path).and_then(|c| c.engine().map_err(|e| e.to_string())) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };
    let workflow = load_workflow_or_exit(workflow_arg);
    let workflow_name = workflow.name.clone();

    let registry = match WorkflowRegistry::builder()
        .add_workflow(workflow)
        .assign(CLI_VENUE, workflow_name)
        .build_strict()
    {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Workflow rejected: {}", e);
            process::exit(1);
        }
    };

    let runner = RunnerState::new(RunnerConfig::with_delay(Duration::from_millis(job_ms)));
    if fail_job {
        runner.set_failure_injection(FailureInjection {
            force_outcome: Some(subflow_protocol::JobStatus::Failed),
            ..FailureInjection::default()
        });
    }

    let store = MemoryStore::new();
    let actor = Actor::new("cli");
    let executor = TransitionExecutor::new(
        Arc::new(registry),
        Arc::new(store.clone()),
        Arc::new(StaticScopes::new().admin(&actor.id)),
        Arc::new(LogNotifier),
        Arc::new(runner),
    );

    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!(error = %e, "could not install interrupt handler");
    }

    let version = match executor.create_version("simulated", CLI_VENUE) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let (events, mut exit_code) = if client {
        simulate_client(&engine, executor, &actor, &version.id, targets, token)
    } else {
        (Vec::new(), simulate_server(&engine, executor, &actor, &version.id, targets, &token))
    };

    match store.get(&version.id) {
        Ok(final_version) => print_json(&json!({
            "version": final_version,
            "activity": store.activity().list(&final_version.submission_id),
            "events": events,
        })),
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code = 1;
        }
    }
    process::exit(exit_code);
}

/// Execute each target and drive linked jobs with the server-side driver.
fn simulate_server(
    engine: &EngineConfig,
    executor: TransitionExecutor,
    actor: &Actor,
    version_id: &str,
    targets: &[String],
    token: &CancellationToken,
) -> i32 {
    let driver = driver_for(engine, executor.clone());
    for target in targets {
        if token.is_cancelled() {
            return 130;
        }
        let outcome = match executor.execute(actor, version_id, target, &ExecuteOptions::default()) {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("{} -> {}: {}", version_id, target, e);
                return 1;
            }
        };
        let Some(job_id) = outcome.job_id else {
            continue;
        };
        match driver.observe(token, &job_id) {
            Ok(report) => match report.outcome {
                LinkedOutcome::Applied(v) => info!(status = %v.status, "job-linked transition applied"),
                LinkedOutcome::Abandoned { reason, .. } => {
                    eprintln!("{} -> {}: abandoned ({:?})", version_id, target, reason);
                    return 1;
                }
                LinkedOutcome::Superseded | LinkedOutcome::StillPending => return 1,
            },
            Err(e) => {
                eprintln!("{} -> {}: {}", version_id, target, e);
                return 1;
            }
        }
    }
    0
}

/// Request each target through a client session, collecting its events.
fn simulate_client(
    engine: &EngineConfig,
    executor: TransitionExecutor,
    actor: &Actor,
    version_id: &str,
    targets: &[String],
    token: CancellationToken,
) -> (Vec<ReconcileEvent>, i32) {
    let poller = JobPoller::new(engine.poller_config(), engine.default_budget());
    let api = TransitionApi::new(executor);
    let mut session = match ClientSession::open(api, actor.clone(), version_id, poller) {
        Ok(session) => session.with_token(token.clone()),
        Err(e) => {
            eprintln!("Error: {}", e);
            return (Vec::new(), 1);
        }
    };

    let mut exit_code = 0;
    for target in targets {
        if token.is_cancelled() {
            exit_code = 130;
            break;
        }
        let failed = match session.request(target) {
            Ok(events) => events.iter().any(|e| {
                matches!(
                    e,
                    ReconcileEvent::RolledBack { .. } | ReconcileEvent::JobFailed { .. } | ReconcileEvent::PollingFailed { .. }
                )
            }),
            Err(e) => {
                eprintln!("{} -> {}: {}", version_id, target, e);
                true
            }
        };
        if failed {
            exit_code = 1;
            break;
        }
        if let Err(e) = session.refresh() {
            warn!(error = %e, "refresh failed");
        }
    }
    (session.events().to_vec(), exit_code)
}

fn run_config(config_path: Option<PathBuf>) {
    match load_config(config_path) {
        Ok(config) => match config.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    }
}

fn driver_for(engine: &EngineConfig, executor: TransitionExecutor) -> JobLinkedDriver {
    engine
        .job_type_budgets()
        .into_iter()
        .fold(
            JobLinkedDriver::new(executor, engine.poller_config(), engine.default_budget()),
            |driver, (job_type, budget)| driver.with_job_type_budget(job_type, budget),
        )
}

fn load_config(config_path: Option<PathBuf>) -> Result<EffectiveConfig, String> {
    let repo = config_path.unwrap_or_else(|| PathBuf::from(REPO_CONFIG_PATH));
    let host = host_config_path();
    EffectiveConfig::build(host.as_deref(), Some(&repo), None).map_err(|e| e.to_string())
}

/// A built-in workflow by name, or a workflow file.
fn load_workflow(arg: &str) -> Result<Workflow, String> {
    if let Some(wf) = builtin::all().into_iter().find(|wf| wf.name == arg) {
        return Ok(wf);
    }
    let path = Path::new(arg);
    if !path.exists() {
        return Err(format!("'{}' is neither a built-in workflow nor a file", arg));
    }
    let draft = WorkflowDraft::from_path(path).map_err(|e| e.to_string())?;
    draft.into_workflow().map_err(|e| e.to_string())
}

fn load_workflow_or_exit(arg: &str) -> Workflow {
    load_workflow(arg).unwrap_or_else(|e| {
        eprintln!("Error loading workflow: {}", e);
        process::exit(1);
    })
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}
