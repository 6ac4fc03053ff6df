//! KYC handoff daemon: runs the server, or drives a session from the
//! initiating side against a running one.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use kyc_client::{HandoffClient, PollConfig, PollOutcome, StatusPoller, DEFAULT_REQUEST_TIMEOUT};
use kyc_server::{init_logging, KycServer, ServerConfig};
use kyc_types::{SessionId, Timestamp};
use kyc_utils::{format_duration, format_remaining, init_tracing};

#[derive(Parser)]
#[command(name = "kyc-daemon", about = "Cross-device KYC handoff server and tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the handoff server until SIGINT or SIGTERM.
    Serve(ServeArgs),
    /// Print the effective server configuration as TOML.
    Config(ServeArgs),
    /// Open a session on a running server and wait for it to finish.
    Issue {
        /// Reference to the application being verified.
        #[arg(long)]
        subject: String,

        #[arg(long, default_value = "http://localhost:7080", env = "KYC_SERVER")]
        server: String,

        /// Issue the locator under this origin instead of the server's own.
        #[arg(long)]
        base_url: Option<String>,

        /// Write the QR code as SVG to this path.
        #[arg(long)]
        qr_out: Option<PathBuf>,

        /// Seconds between status polls.
        #[arg(long, default_value_t = 2)]
        poll_interval: u64,

        /// Print the locator and exit without waiting.
        #[arg(long)]
        no_wait: bool,
    },
    /// Show a session's current status.
    Status {
        session_id: String,

        #[arg(long, default_value = "http://localhost:7080", env = "KYC_SERVER")]
        server: String,
    },
}

/// Server settings. A config file is the base; flags and env vars override it.
#[derive(Args)]
struct ServeArgs {
    /// Path to a TOML configuration file.
    #[arg(long, env = "KYC_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for session storage.
    #[arg(long, env = "KYC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, env = "KYC_RPC_PORT")]
    rpc_port: Option<u16>,

    /// Enable the WebSocket push server.
    #[arg(long, env = "KYC_ENABLE_WEBSOCKET")]
    websocket: bool,

    #[arg(long, env = "KYC_WS_PORT")]
    websocket_port: Option<u16>,

    /// Origin under which locator URLs are issued.
    #[arg(long, env = "KYC_BASE_ORIGIN")]
    base_origin: Option<String>,

    /// External verification scorer endpoint.
    #[arg(long, env = "KYC_SCORER_URL")]
    scorer_url: Option<String>,

    #[arg(long, env = "KYC_SESSION_TTL")]
    session_ttl_secs: Option<u64>,

    /// Admit desktop browsers to the capture steps. Development only.
    #[arg(long, env = "KYC_ALLOW_DESKTOP")]
    allow_desktop: bool,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "KYC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "KYC_LOG_FORMAT")]
    log_format: Option<String>,
}

impl ServeArgs {
    fn resolve(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        config.enable_websocket |= self.websocket;
        if let Some(port) = self.websocket_port {
            config.websocket_port = port;
        }
        if let Some(origin) = self.base_origin {
            config.base_origin = origin;
        }
        if let Some(url) = self.scorer_url {
            config.scorer_url = Some(url);
        }
        if let Some(ttl) = self.session_ttl_secs {
            config.session_ttl_secs = ttl;
        }
        if self.allow_desktop {
            config.require_mobile_device = false;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        config.validate()?;
        Ok(config)
    }
}

fn load_config_file(path: &Path) -> anyhow::Result<ServerConfig> {
    ServerConfig::from_toml_file(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let config = args.resolve()?;
            init_logging(config.log_format()?, &config.log_level)?;
            tracing::info!(
                "Starting KYC handoff server (RPC:{}, WS:{}, origin {})",
                config.rpc_port,
                if config.enable_websocket {
                    config.websocket_port.to_string()
                } else {
                    "off".into()
                },
                config.base_origin,
            );
            if !config.require_mobile_device {
                tracing::warn!("desktop browsers are admitted to capture steps");
            }
            KycServer::new(config)?.run_until_signal().await?;
            tracing::info!("KYC daemon exited cleanly");
            Ok(ExitCode::SUCCESS)
        }
        Command::Config(args) => {
            print!("{}", args.resolve()?.to_toml_string());
            Ok(ExitCode::SUCCESS)
        }
        Command::Issue {
            subject,
            server,
            base_url,
            qr_out,
            poll_interval,
            no_wait,
        } => {
            init_tracing("warn");
            issue(&server, &subject, base_url.as_deref(), qr_out.as_deref(), poll_interval, no_wait)
                .await
        }
        Command::Status { session_id, server } => {
            init_tracing("warn");
            let session_id = SessionId::parse(&session_id)?;
            let client = HandoffClient::new(&server, DEFAULT_REQUEST_TIMEOUT)?;
            let status = client.status(&session_id).await?;
            println!("session:  {}", status.session_id);
            println!("status:   {}", status.status);
            println!("expires:  {}", format_remaining(status.expires_at, Timestamp::now()));
            if let Some(result) = &status.result {
                println!("verified: {} ({:.1}% confidence)", result.verified, result.confidence);
            }
            if let Some(reason) = &status.failure_reason {
                println!("reason:   {reason}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn issue(
    server: &str,
    subject: &str,
    base_url: Option<&str>,
    qr_out: Option<&Path>,
    poll_interval: u64,
    no_wait: bool,
) -> anyhow::Result<ExitCode> {
    let client = HandoffClient::new(server, DEFAULT_REQUEST_TIMEOUT)?;
    let created = client.create_session(subject, base_url).await?;

    println!("session:  {}", created.session_id);
    println!("open:     {}", created.locator_url);
    println!("{}", created.qr_code_data.instructions);
    if let Some(path) = qr_out {
        let svg = client.qr_svg(&created.session_id).await?;
        std::fs::write(path, svg)
            .with_context(|| format!("failed to write QR code to {}", path.display()))?;
        println!("qr:       {}", path.display());
    }
    println!("expires:  in {}", format_duration(created.expires_in_secs));

    if no_wait {
        return Ok(ExitCode::SUCCESS);
    }

    let poller = StatusPoller::new(
        Arc::new(client),
        PollConfig {
            interval: Duration::from_secs(poll_interval.max(1)),
            countdown: Duration::from_secs(created.expires_in_secs),
        },
    );
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let outcome = poller.run(&created.session_id, cancel).await?;

    match outcome {
        PollOutcome::Completed(result) => {
            println!("verified ({:.1}% confidence)", result.confidence);
            Ok(ExitCode::SUCCESS)
        }
        PollOutcome::Failed { reason, result } => {
            match reason {
                Some(reason) => println!("failed: {reason}"),
                None => println!("failed"),
            }
            if let Some(result) = result {
                println!("confidence {:.1}%", result.confidence);
            }
            Ok(ExitCode::from(2))
        }
        PollOutcome::Expired | PollOutcome::TimedOut => {
            println!("session expired before verification finished, issue a new one");
            Ok(ExitCode::from(3))
        }
        PollOutcome::Cancelled => {
            println!("stopped waiting; the session stays open until it expires");
            Ok(ExitCode::from(130))
        }
    }
}
