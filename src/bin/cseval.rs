//! cseval service binary.
//!
//! Usage:
//!   cseval                         # Serve /eval, /il and /health
//!   cseval --eval "1 + 1"          # Evaluate once and print the JSON result
//!   cseval --il "return 1;"        # Print the disassembly of a fragment

use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use cseval::eval::{DisassemblyEngine, EngineConfig, ScriptEngine};
use cseval::server::{shutdown_signal, Environment, EvalServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "cseval")]
#[command(about = "Evaluates untrusted script snippets over HTTP")]
#[command(version)]
struct Args {
    /// Server bind address
    #[arg(short, long, env = "CSEVAL_BIND_ADDR", default_value = "127.0.0.1:5000")]
    bind_addr: String,

    /// Hosting environment; production arms the lifecycle guard
    #[arg(long, env = "CSEVAL_ENVIRONMENT", value_enum, default_value = "development")]
    environment: Environment,

    /// Log level
    #[arg(long, env = "CSEVAL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Seconds a guarded request may run
    #[arg(long, env = "CSEVAL_REQUEST_TIMEOUT_SECS", default_value = "30")]
    request_timeout_secs: u64,

    /// Seconds a finished response may take to drain
    #[arg(long, env = "CSEVAL_DRAIN_GRACE_SECS", default_value = "5")]
    drain_grace_secs: u64,

    /// Maximum request body size in bytes
    #[arg(long, env = "CSEVAL_MAX_BODY_SIZE", default_value = "1048576")]
    max_body_size: usize,

    /// Console output kept per evaluation, in bytes
    #[arg(long, env = "CSEVAL_MAX_CONSOLE_OUTPUT", default_value = "1048576")]
    max_console_output: usize,

    /// Evaluate the given code once, print the result and exit
    #[arg(short, long, conflicts_with = "il")]
    eval: Option<String>,

    /// Disassemble the given fragment, print the listing and exit
    #[arg(long)]
    il: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level)).init();

    // scripts that probe the home directory see a scratch location
    let home = std::env::temp_dir();
    std::env::set_var("HOME", &home);
    log::debug!("HOME set to {}", home.display());

    let engine = EngineConfig::default().with_max_console_output(args.max_console_output);

    if let Some(code) = args.eval {
        let json = ScriptEngine::new(engine).evaluate_to_json(&code);
        let mut stdout = std::io::stdout();
        stdout.write_all(&json).context("writing result")?;
        writeln!(stdout)?;
        return Ok(());
    }
    if let Some(fragment) = args.il {
        print!("{}", DisassemblyEngine.disassemble(&fragment).render());
        return Ok(());
    }

    let config = ServerConfig::new()
        .with_bind_addr_str(&args.bind_addr)?
        .with_environment(args.environment)
        .with_request_timeout(Duration::from_secs(args.request_timeout_secs))
        .with_drain_grace(Duration::from_secs(args.drain_grace_secs))
        .with_max_body_size(args.max_body_size)
        .with_engine(engine);

    log::info!("Starting cseval...");
    log::info!("  Bind address: {}", config.bind_addr);
    log::info!("  Environment: {:?}", config.environment);
    log::info!("  Request timeout: {}s", args.request_timeout_secs);
    log::info!("  Drain grace: {}s", args.drain_grace_secs);
    log::info!("  Max body size: {} bytes", args.max_body_size);

    EvalServer::with_config(config)
        .serve_with_shutdown(shutdown_signal())
        .await
        .context("server failed")?;
    Ok(())
}
