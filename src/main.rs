use reposcope::cli::commands::{CliArgs, Commands};
use reposcope::cli::handlers::{
    handle_agent, handle_analyze, handle_health, handle_tools, handle_validate_workflow,
};
use reposcope::util::{init_logging, parse_level, LoggingConfig};
use reposcope::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("reposcope v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Analyze(analyze_args) => handle_analyze(analyze_args, args.quiet).await,
        Commands::Agent(agent_args) => handle_agent(agent_args, args.quiet).await,
        Commands::ValidateWorkflow(validate_args) => handle_validate_workflow(validate_args).await,
        Commands::Tools(tools_args) => handle_tools(tools_args).await,
        Commands::Health(health_args) => handle_health(health_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("REPOSCOPE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    let use_json = env::var("REPOSCOPE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        ..LoggingConfig::default()
    });
}
