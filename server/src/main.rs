use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mcphub_server::InboundTransport as LibInboundTransport;

#[derive(Parser, Debug)]
#[command(name = "mcphub", version, about = "Aggregating MCP hub server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the configured upstreams and start serving.
    Serve(ServeArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InboundTransport {
    Stdio,
    Http,
    Sse,
}

impl From<InboundTransport> for LibInboundTransport {
    fn from(value: InboundTransport) -> Self {
        match value {
            InboundTransport::Stdio => LibInboundTransport::Stdio,
            InboundTransport::Http => LibInboundTransport::Http,
            InboundTransport::Sse => LibInboundTransport::Sse,
        }
    }
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Path to the hub's JSON configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Protocol the hub listens on for inbound client connections.
    #[arg(long, value_enum, default_value_t = InboundTransport::Stdio)]
    transport: InboundTransport,

    /// Bind host for the http/sse transports.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind port for the http/sse transports.
    #[arg(long, default_value_t = 8877, value_parser = clap::value_parser!(u16).range(1..=65535))]
    port: u16,

    #[arg(long)]
    verbose: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(args: &ServeArgs) -> anyhow::Result<()> {
    use std::os::unix::fs::OpenOptionsExt as _;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let default_level = if args.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let file = args.log_file.as_ref().and_then(|path| {
        match std::fs::OpenOptions::new().create(true).append(true).mode(0o600).open(path) {
            Ok(file) => Some(file),
            Err(err) => {
                eprintln!("warning: failed to open log file {} ({err}), falling back to stderr", path.display());
                None
            }
        }
    });

    match file {
        Some(file) => {
            registry.with(tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false)).init();
        }
        // stdio transport speaks MCP over stdout; logs must never land there.
        None => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false))
                .init();
            if args.log_file.is_some() {
                tracing::warn!("could not open configured log file; falling back to stderr");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            init_tracing(&args)?;
            mcphub_server::run::serve(args.config, args.transport.into(), &args.host, args.port).await
        }
    }
}
