use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use greeter_client::{DEFAULT_NAMES, DEFAULT_SERVER_URL, run_demo};
use greeter_mcp::{HttpMcpClient, HttpMcpClientOptions};
use greeter_otel::TracingInitOptions;
use url::Url;

#[derive(Debug, Parser)]
#[command(
    name = "greeter-client",
    version,
    about = "Connects to the Greeting Server and calls `greet`"
)]
struct Args {
    /// MCP streamable HTTP endpoint.
    #[arg(long, env = "GREETER_MCP_URL", default_value = DEFAULT_SERVER_URL)]
    url: Url,

    /// Name to greet; repeat for several calls.
    #[arg(long = "name", default_values_t = DEFAULT_NAMES.map(String::from))]
    names: Vec<String>,

    /// Per-request timeout.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    greeter_otel::init_tracing(TracingInitOptions {
        service_name: "greeter-client",
        service_version: env!("CARGO_PKG_VERSION"),
        default_env_filter: "warn",
    })?;

    let args = Args::parse();
    let client = HttpMcpClient::new(HttpMcpClientOptions {
        endpoint: args.url,
        timeout: Duration::from_secs(args.timeout_secs),
    })
    .context("build mcp client")?;

    let mut out = std::io::stdout();
    tokio::select! {
        res = run_demo(&client, &args.names, &mut out) => {
            let outcome = res.context("write to stdout")?;
            tracing::debug!(?outcome, "demo finished");
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n\nClient stopped.");
        }
    }

    Ok(())
}
