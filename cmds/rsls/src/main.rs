use anyhow::Result;
use clap::{Parser, Subcommand};
use rsls::commands::{self, util::BrokenPipeGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rsls")]
#[command(about = "Serverless deployment reconciler", long_about = None)]
#[command(version)]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Show whether the declared deployment differs from the recorded one
	Plan(commands::plan::PlanArgs),

	/// Reconcile the declared deployment, deploying when something changed
	Deploy(commands::deploy::DeployArgs),

	/// Reconfirm that the deployed stack still exists on the remote target
	Status(commands::status::StatusArgs),

	/// Remove the deployment and clear the recorded identity
	Remove(commands::remove::RemoveArgs),

	/// Run the tool's packaging step without deploying
	Package(commands::package::PackageArgs),
}

/// Initialize tracing with logfmt output format
fn init_logger(level: &str) {
	let level = match level.to_lowercase().as_str() {
		"trace" => "trace",
		"debug" => "debug",
		"info" => "info",
		"warn" | "warning" => "warn",
		"error" => "error",
		_ => "info",
	};

	let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_logfmt::layer())
		.init();
}

/// Extract log level from command
fn get_log_level(cmd: &Commands) -> &str {
	match cmd {
		Commands::Plan(args) => &args.log_level,
		Commands::Deploy(args) => &args.log_level,
		Commands::Status(args) => &args.log_level,
		Commands::Remove(args) => &args.log_level,
		Commands::Package(args) => &args.log_level,
	}
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	init_logger(get_log_level(&cli.command));

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Plan(args) => commands::plan::run(args, stdout),
		Commands::Deploy(args) => commands::deploy::run(args, stdout),
		Commands::Status(args) => commands::status::run(args, stdout),
		Commands::Remove(args) => commands::remove::run(args, stdout),
		Commands::Package(args) => commands::package::run(args, stdout),
	}
}
