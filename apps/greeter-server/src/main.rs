use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use greeter_otel::TracingInitOptions;
use greeter_server::{
    DEFAULT_HTTP_ADDR, DEFAULT_HTTP_PATH, DEFAULT_SESSION_IDLE_TIMEOUT, HttpState,
    greeting_handler, run_stdio, serve_http, server_config,
};
use tokio::io::BufReader;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// MCP streamable HTTP (POST + event-stream responses).
    StreamableHttp,
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
}

#[derive(Debug, Parser)]
#[command(
    name = "greeter-server",
    version,
    about = "MCP server exposing a single `greet` tool"
)]
struct Args {
    #[arg(long, env = "GREETER_TRANSPORT", value_enum, default_value_t = Transport::StreamableHttp)]
    transport: Transport,

    /// Listen address for the streamable HTTP transport.
    #[arg(long, env = "GREETER_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    http_addr: SocketAddr,

    /// HTTP path of the MCP endpoint.
    #[arg(long, env = "GREETER_HTTP_PATH", default_value = DEFAULT_HTTP_PATH)]
    http_path: String,

    /// Require `notifications/initialized` before tools can be listed or called.
    #[arg(long, env = "GREETER_STRICT_LIFECYCLE", default_value_t = false)]
    strict_lifecycle: bool,

    /// Drop HTTP sessions idle for longer than this many seconds.
    #[arg(
        long,
        env = "GREETER_SESSION_IDLE_SECS",
        default_value_t = DEFAULT_SESSION_IDLE_TIMEOUT.as_secs()
    )]
    session_idle_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    greeter_otel::init_tracing(TracingInitOptions {
        service_name: "greeter-server",
        service_version: env!("CARGO_PKG_VERSION"),
        default_env_filter: "info,hyper=warn",
    })?;

    let args = Args::parse();
    let cfg = server_config(args.strict_lifecycle);
    let handler = greeting_handler();

    match args.transport {
        Transport::Stdio => {
            let stdin = BufReader::new(tokio::io::stdin());
            run_stdio(cfg, handler, stdin, tokio::io::stdout()).await?;
        }
        Transport::StreamableHttp => {
            let listener = tokio::net::TcpListener::bind(args.http_addr)
                .await
                .with_context(|| format!("bind {}", args.http_addr))?;
            let st = HttpState::new(cfg, handler)
                .with_idle_timeout(Duration::from_secs(args.session_idle_secs));
            serve_http(listener, &args.http_path, st, shutdown_signal()).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    info!("interrupt received, shutting down");
}
