use anyhow::{Context, Result};
use stagebuild::cli::output::{format_execution_event, format_run_summary, style, INFO};
use stagebuild::cli::Cli;
use stagebuild::execution::{
    BuildSteps, CommandRunner, Orchestrator, ProcessRunner, ScriptLocator, VsWhereLocator,
};
use stagebuild::reporting::{ActionsSink, LogSink, ReportingSink};
use stagebuild::tools::{HttpProfileFetcher, UtilityScripts};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose || cli.ci { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let exit_code = run(cli).await?;
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32> {
    let layout = cli.load_layout()?;
    let config = cli.pipeline_config(layout);

    println!(
        "{} Build root: {}",
        INFO,
        style(config.layout.root.display()).bold()
    );

    let sink: Arc<dyn ReportingSink> = if config.ci {
        Arc::new(ActionsSink::stdout())
    } else {
        Arc::new(LogSink)
    };

    let runner: Arc<dyn CommandRunner> = match &cli.toolchain_script {
        Some(script) => Arc::new(ProcessRunner::new(ScriptLocator::new(script))),
        None => Arc::new(ProcessRunner::new(VsWhereLocator::with_default_path())),
    };
    let tools = Arc::new(UtilityScripts::from_layout(&config.layout));
    let profiles = Arc::new(
        HttpProfileFetcher::new(&config.layout.pgo_profile_url, config.ssl_verification)
            .context("Failed to set up the profile downloader")?,
    );

    let steps = BuildSteps::new(config.clone(), runner, tools, profiles, sink.clone());
    let mut orchestrator = Orchestrator::new(config, steps, sink);
    orchestrator.add_event_handler(|event| println!("{}", format_execution_event(event)));

    println!();
    let report = orchestrator.run_pipeline().await;
    println!("\n{}", format_run_summary(&report));

    Ok(report.exit_code)
}
