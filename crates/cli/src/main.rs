use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "orderflow")]
#[command(about = "Order lifecycle engine utilities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the human-readable timeline from an exported audit log
    Timeline {
        /// JSON file holding an array of audit log entries
        #[arg(long)]
        log: String,

        /// Only report this order (all orders in the file otherwise)
        #[arg(long)]
        order: Option<String>,

        /// Override the grouping window (milliseconds between consecutive entries)
        #[arg(long)]
        gap_millis: Option<i64>,

        /// Engine config file supplying the grouping window
        #[arg(long = "config")]
        config_path: Option<String>,

        /// Print events as JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the effective engine configuration (file, then environment overrides)
    Config {
        #[arg(long)]
        file: Option<String>,
    },
}

fn main() -> Result<()> {
    orderflow_observability::init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Timeline {
            log,
            order,
            gap_millis,
            config_path,
            json,
        } => {
            let config = commands::load_config(config_path.as_deref())?;
            let args = commands::TimelineArgs {
                log_path: log,
                order: order.as_deref().map(commands::parse_order_id).transpose()?,
                gap_millis: gap_millis.unwrap_or(config.timeline_gap_millis),
                json,
            };
            let output = commands::timeline(&args)?;
            print!("{output}");
        }
        Commands::Config { file } => {
            let config = commands::load_config(file.as_deref())?;
            println!("{}", commands::render_config(&config)?);
        }
    }

    Ok(())
}
