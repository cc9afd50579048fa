use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::process::Command as TokioCommand;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bifrost")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the tools over SSE + HTTP POST
    Serve {
        /// Optional path to a bifrost config file (.json or .toml)
        #[arg(long, env = "BIFROST_CONFIG_PATH")]
        config: Option<PathBuf>,
        /// Override workspace root (defaults to the current directory)
        #[arg(long)]
        workspace_root: Option<PathBuf>,
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
        /// Start the language server eagerly (reduces first-tool-call latency)
        #[arg(long)]
        warmup: bool,
    },
    /// Serve the tools as newline-delimited JSON-RPC over stdio
    Stdio {
        /// Optional path to a bifrost config file (.json or .toml)
        #[arg(long, env = "BIFROST_CONFIG_PATH")]
        config: Option<PathBuf>,
        /// Override workspace root (defaults to the current directory)
        #[arg(long)]
        workspace_root: Option<PathBuf>,
        /// Start the language server eagerly
        #[arg(long)]
        warmup: bool,
    },
    /// Print the effective configuration and the tool list
    Doctor {
        /// Optional path to a bifrost config file (.json or .toml)
        #[arg(long, env = "BIFROST_CONFIG_PATH")]
        config: Option<PathBuf>,
        /// Override workspace root (defaults to the current directory)
        #[arg(long)]
        workspace_root: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bifrost=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Serve {
            config,
            workspace_root,
            port,
            warmup,
        } => {
            bifrost_mcp::run_http_with_options(bifrost_mcp::ServeOptions {
                config_path: config,
                workspace_root,
                port,
                warmup,
            })
            .await
        }
        Command::Stdio {
            config,
            workspace_root,
            warmup,
        } => {
            bifrost_mcp::run_stdio_with_options(bifrost_mcp::ServeOptions {
                config_path: config,
                workspace_root,
                port: None,
                warmup,
            })
            .await
        }
        Command::Doctor {
            config,
            workspace_root,
        } => doctor(config, workspace_root).await,
    }
}

async fn doctor(config: Option<PathBuf>, workspace_root: Option<PathBuf>) -> Result<()> {
    let loaded = bifrost_core::config::load_config(config.as_deref(), workspace_root.as_deref())?;
    println!("config_source: {:?}", loaded.source);
    println!("workspace_root: {}", loaded.workspace_root.display());

    let settings = bifrost_core::config::resolve_settings(&loaded.config, &loaded.workspace_root);
    println!("project_name: {}", settings.project_name);
    println!("description: {}", settings.description);
    println!("base_path: {:?}", settings.base_path);
    println!("listen: {}:{}", settings.host, settings.port);
    println!("heartbeat_secs: {}", settings.heartbeat_interval.as_secs());
    println!(
        "call_hierarchy: detect_cycles={} max_call_level={}",
        settings.detect_cycles, settings.max_call_level
    );

    let mut failures = Vec::<String>::new();
    match settings.provider.as_ref() {
        None => {
            println!("provider: <not configured>");
            eprintln!("doctor_hint: set provider.command to enable the language server backed tools.");
        }
        Some(p) => {
            println!("provider.command: {:?}", p.command);
            println!("provider.args: {:?}", p.args);
            println!("provider.language_id: {:?}", p.language_id);
            println!("provider.root_dir: {}", p.root_dir.display());
            println!(
                "provider.timeouts_ms: initialize={} request={}",
                p.initialize_timeout.as_millis(),
                p.request_timeout.as_millis()
            );

            match TokioCommand::new(&p.command).arg("--version").output().await {
                Ok(output) => {
                    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    if !stdout.is_empty() {
                        println!("provider.version: {stdout}");
                    } else if !stderr.is_empty() {
                        println!("provider.version: {stderr}");
                    } else {
                        println!("provider.version: <unknown>");
                    }
                }
                Err(err) => {
                    eprintln!("doctor_error: command={} error={err}", p.command);
                    eprintln!("doctor_hint: make sure the language server is installed and on PATH.");
                    failures.push(format!("language server not runnable: {}", p.command));
                }
            }
        }
    }

    let registry = bifrost_mcp::ToolRegistry::new();
    println!("tools.count: {}", registry.tools().len());
    for name in registry.names() {
        println!("tool: {name}");
    }

    if !failures.is_empty() {
        anyhow::bail!("doctor failed: {}", failures.join("; "));
    }
    Ok(())
}
