use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "aging-queue")]
#[command(about = "Priority queue with aging for walk-in services")]
pub struct CliConfig {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "aging-queue.toml")]
    pub config: String,

    /// Override the data directory from the configuration
    #[arg(long)]
    pub data_dir: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List the service catalog
    Services,
    /// Join a service's queue
    Join {
        service: String,
        entrant: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        priority: Option<String>,
    },
    /// Add a walk-in without an account
    WalkIn {
        service: String,
        name: String,
        #[arg(short, long, default_value = "low")]
        priority: String,
        #[arg(long)]
        contact: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Leave a queue
    Leave { service: String, entrant: String },
    /// Serve whoever ranks first
    Serve { service: String },
    /// Remove an entrant without recording history
    Remove { service: String, entrant: String },
    /// Swap places with the ranked neighbor (up or down)
    Boost {
        service: String,
        entrant: String,
        #[arg(default_value = "up")]
        direction: String,
    },
    /// Swap places with the entrant ranked first
    Top { service: String, entrant: String },
    /// Change an entrant's priority tier
    Priority {
        service: String,
        entrant: String,
        tier: String,
    },
    /// Show the current ranking
    Rank { service: String },
    /// Show where an entrant stands
    Status { entrant: String },
    /// Show completed visits
    History {
        #[arg(long)]
        entrant: Option<String>,
    },
    /// Show notifications, newest first
    Notifications {
        #[arg(long)]
        mark_read: bool,
    },
}
