mod cmd;
mod exit;
mod logging;
mod output;
mod tree;

use clap::Parser;
use lanewire_frame::{FrameConfig, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_NODES};

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "lanewire", version, about = "Tree-structured messages over Unix sockets")]
struct Cli {
    /// Output format for received messages.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Largest accepted message payload in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_MESSAGE_SIZE, global = true)]
    max_message_size: usize,

    /// Largest accepted node count per message.
    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_MAX_NODES,
        value_parser = parse_max_nodes,
        global = true
    )]
    max_nodes: usize,

    #[command(subcommand)]
    command: Command,
}

/// Upper bound for `--max-nodes`: 16 Mi nodes, 64 MiB of layout.
const MAX_NODES_CAP: usize = 1 << 24;

fn parse_max_nodes(value: &str) -> Result<usize, String> {
    let nodes: usize = value.parse().map_err(|err| format!("{err}"))?;
    if nodes == 0 || nodes > MAX_NODES_CAP {
        return Err(format!("must be between 1 and {MAX_NODES_CAP}"));
    }
    Ok(nodes)
}

impl Cli {
    fn frame_config(&self) -> FrameConfig {
        FrameConfig::default()
            .with_max_message_size(self.max_message_size)
            .with_max_nodes(self.max_nodes)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let config = cli.frame_config();
    let result = cmd::run(cli.command, format, config);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
