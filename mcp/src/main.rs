use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resgraph_mcp_runtime::{McpCommands, RuntimeConfig, run};

#[derive(Parser)]
#[command(
    name = "resgraph-mcp",
    version,
    about = "Azure Resource Graph MCP server over stdio"
)]
struct Cli {
    #[command(flatten)]
    runtime: RuntimeConfig,

    #[command(subcommand)]
    command: McpCommands,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resgraph_mcp_runtime=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let code = run(cli.runtime, cli.command).await;
    std::process::exit(code);
}
