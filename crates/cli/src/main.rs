use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command};
use relay_engine::{
    DisabledTextGenerator, ExecutionRequest, ExecutionStore, ExecutorOptions, ExecutorServices, HttpTextGenerator,
    InMemoryExecutionStore, JsonlExecutionStore, PreflightGate, TextGenerator, WorkflowExecutor, parse_workflow_file,
};
use relay_mcp::config::{load_config_from_path, resolve_config_path};
use relay_mcp::{
    CredentialInjector, CredentialStore, InMemoryCredentialStore, KeyringCredentialStore, LogManager, ProviderRegistry,
    RmcpConnector, SchemaAdapter,
};
use relay_types::{ExecutionEvent, WorkflowStatus};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("run", sub)) => run_workflow_cmd(&matches, sub).await,
        Some(("providers", sub)) => list_providers_cmd(&matches, sub),
        Some(("operations", sub)) => list_operations_cmd(&matches, sub).await,
        Some(("check-auth", sub)) => check_auth_cmd(&matches, sub).await,
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn cli() -> Command {
    let user = Arg::new("user")
        .long("user")
        .short('u')
        .env("RELAY_USER")
        .action(ArgAction::Set)
        .help("User whose credentials are used");
    let credentials = Arg::new("credentials")
        .long("credentials")
        .action(ArgAction::Set)
        .value_parser(clap::value_parser!(PathBuf))
        .help("JSON file of credentials; the system keychain is used when omitted");

    Command::new("relay")
        .about("Run workflows across MCP tool providers")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Provider configuration file (defaults to RELAY_CONFIG_PATH or the user config dir)"),
        )
        .subcommand(
            Command::new("run")
                .about("Execute a workflow file")
                .arg(Arg::new("workflow").required(true).value_parser(clap::value_parser!(PathBuf)))
                .arg(user.clone().required(true))
                .arg(credentials.clone())
                .arg(
                    Arg::new("skip-auth-check")
                        .long("skip-auth-check")
                        .action(ArgAction::SetTrue)
                        .help("Run even when providers lack verified credentials"),
                )
                .arg(
                    Arg::new("store-dir")
                        .long("store-dir")
                        .action(ArgAction::Set)
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Directory receiving one JSONL journal per execution"),
                ),
        )
        .subcommand(
            Command::new("providers")
                .about("List configured providers")
                .arg(Arg::new("category").long("category").action(ArgAction::Set)),
        )
        .subcommand(
            Command::new("operations")
                .about("Discover the operations a provider offers")
                .arg(Arg::new("provider").required(true))
                .arg(user.clone())
                .arg(credentials.clone()),
        )
        .subcommand(
            Command::new("check-auth")
                .about("Report providers in a workflow that lack verified credentials")
                .arg(Arg::new("workflow").required(true).value_parser(clap::value_parser!(PathBuf)))
                .arg(user.required(true))
                .arg(credentials),
        )
}

fn load_registry(root: &ArgMatches) -> Result<Arc<ProviderRegistry>> {
    let path = resolve_config_path(root.get_one::<PathBuf>("config").map(PathBuf::as_path));
    let config = load_config_from_path(&path).with_context(|| format!("could not load provider configuration from {}", path.display()))?;
    let registry = ProviderRegistry::from_config(&config)?;
    for (name, reason) in registry.disabled() {
        warn!(provider = %name, reason = %reason, "provider disabled");
    }
    Ok(Arc::new(registry))
}

fn credential_store(sub: &ArgMatches) -> Result<Arc<dyn CredentialStore>> {
    Ok(match sub.get_one::<PathBuf>("credentials") {
        Some(path) => Arc::new(InMemoryCredentialStore::from_path(path)?),
        None => Arc::new(KeyringCredentialStore),
    })
}

fn text_generator() -> Result<Arc<dyn TextGenerator>> {
    Ok(match HttpTextGenerator::from_env()? {
        Some(generator) => Arc::new(generator),
        None => {
            info!("no text generation endpoint configured; goals resolve by keyword and summaries are local");
            Arc::new(DisabledTextGenerator)
        }
    })
}

async fn run_workflow_cmd(root: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let workflow_path = sub.get_one::<PathBuf>("workflow").context("workflow path is required")?;
    let user = sub.get_one::<String>("user").context("--user is required")?;
    let workflow = parse_workflow_file(workflow_path)?;

    let options = ExecutorOptions::default();
    let log_manager = Arc::new(LogManager::new());
    let connections = Arc::new(options.connection_manager(Arc::new(RmcpConnector::new(Arc::clone(&log_manager))), log_manager));
    let store: Arc<dyn ExecutionStore> = match sub.get_one::<PathBuf>("store-dir") {
        Some(directory) => Arc::new(JsonlExecutionStore::new(directory.clone())),
        None => Arc::new(InMemoryExecutionStore::new()),
    };
    let services = ExecutorServices {
        registry: load_registry(root)?,
        connections: Arc::clone(&connections),
        credentials: credential_store(sub)?,
        generator: text_generator()?,
        store,
    };
    let executor = WorkflowExecutor::new(services, options);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; no further steps will start");
            interrupt.cancel();
        }
    });

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<ExecutionEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            if let Some(line) = describe_event(&event) {
                eprintln!("{line}");
            }
        }
    });

    info!(workflow = workflow.name.as_deref().unwrap_or("unnamed"), steps = workflow.steps.len(), "running workflow");
    let request = ExecutionRequest::new(user.clone(), workflow.steps).skip_auth_check(sub.get_flag("skip-auth-check"));
    let outcome = executor.execute(request, Some(sender), cancel).await;
    let _ = printer.await;
    connections.shutdown().await;

    let result = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.status == WorkflowStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn describe_event(event: &ExecutionEvent) -> Option<String> {
    Some(match event {
        ExecutionEvent::ExecutionStart { execution_id, total_steps, .. } => format!("▶ {execution_id}: {total_steps} step(s)"),
        ExecutionEvent::StatusUpdate { message } => format!("  {message}"),
        ExecutionEvent::StepStart { step_number, provider, target, .. } => format!("[{step_number}] {provider}: {target}"),
        ExecutionEvent::StepComplete { step_number, operation, duration_ms, .. } => {
            format!("[{step_number}] ✓ {operation} ({duration_ms} ms)")
        }
        ExecutionEvent::StepError { step_number, error, critical, .. } => {
            let marker = if *critical { " (critical)" } else { "" };
            format!("[{step_number}] ✗{marker} {}", relay_util::redact_sensitive(error))
        }
        ExecutionEvent::SummaryChunk { text } => text.clone(),
        ExecutionEvent::WorkflowComplete { status, .. } => format!("■ workflow {status}"),
        ExecutionEvent::Error { message } => format!("error: {message}"),
        ExecutionEvent::GeneratingSummary | ExecutionEvent::TaskComplete { .. } => return None,
    })
}

fn list_providers_cmd(root: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let registry = load_registry(root)?;
    let providers = match sub.get_one::<String>("category") {
        Some(category) => registry.list_by_category(category),
        None => registry.providers().collect(),
    };
    if providers.is_empty() {
        println!("No providers configured");
        return Ok(());
    }
    for descriptor in providers {
        let auth = if descriptor.auth_required { "auth required" } else { "no auth" };
        println!(
            "{}\t{}\t{}\t{auth}",
            descriptor.name,
            descriptor.launch.transport(),
            descriptor.category.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn list_operations_cmd(root: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let provider = sub.get_one::<String>("provider").context("provider is required")?;
    let registry = load_registry(root)?;
    let descriptor = registry.lookup(provider)?;

    let user = sub.get_one::<String>("user").map(String::as_str).unwrap_or_default();
    let launch = CredentialInjector::new(credential_store(sub)?).resolve(descriptor, user).await;
    let log_manager = Arc::new(LogManager::new());
    let connections = ExecutorOptions::default().connection_manager(Arc::new(RmcpConnector::new(Arc::clone(&log_manager))), log_manager);
    let adapter = SchemaAdapter::new(Arc::clone(&registry), Arc::new(DisabledTextGenerator));

    let discovered = match connections.acquire(&descriptor.name, &launch).await {
        Ok(handle) => adapter.discover(descriptor, &handle).await.map_err(|error| anyhow!(error)),
        Err(error) => Err(anyhow!(error)),
    };
    connections.shutdown().await;

    for operation in discovered?.iter() {
        println!("{}\t{}", operation.operation_name, operation.description.as_deref().unwrap_or(""));
        for (name, parameter) in &operation.parameters {
            let required = if parameter.required { ", required" } else { "" };
            println!("    {name} ({}{required})", parameter.kind.as_str());
        }
    }
    Ok(())
}

async fn check_auth_cmd(root: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let workflow_path = sub.get_one::<PathBuf>("workflow").context("workflow path is required")?;
    let user = sub.get_one::<String>("user").context("--user is required")?;
    let workflow = parse_workflow_file(workflow_path)?;

    let gate = PreflightGate::new(load_registry(root)?, CredentialInjector::new(credential_store(sub)?));
    let missing = gate.missing_credentials(&workflow.steps, user).await;
    if missing.is_empty() {
        println!("All required credentials are verified for {user}");
        return Ok(());
    }
    println!("Missing verified credentials for {user}: {}", missing.join(", "));
    std::process::exit(1);
}
