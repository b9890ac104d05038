use clap::{ArgAction, Args, Parser, Subcommand};

use crate::engine::classify::{Category, Thresholds};
use crate::engine::feed::ScanDepth;

#[derive(Debug, Parser)]
#[command(
    name = "mailsweep",
    version,
    about = "Find and trash inbox clutter by sender"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "default",
        help = "Profile name to use"
    )]
    pub profile: String,
    #[arg(long, global = true, help = "Emit JSON output")]
    pub json: bool,
    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Verbose logging")]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan the mailbox and report cleanup candidates by category.
    Scan(ScanCommandArgs),
    /// Summarize the mailbox by sender.
    Stats(StatsArgs),
    /// Move selected candidates to trash.
    Clean(CleanArgs),
    /// Show or initialize the profile settings file.
    Config(ConfigArgs),
}

/// Flags shared by every command that scans the mailbox.
#[derive(Debug, Clone, Default, Args)]
pub struct ScanArgs {
    #[arg(long, value_enum, help = "How many recent messages to scan")]
    pub depth: Option<ScanDepth>,
    #[arg(long, help = "Gmail search query")]
    pub q: Option<String>,
    #[arg(long, help = "Unread messages needed to flag a sender that was never opened")]
    pub never_opened: Option<usize>,
    #[arg(long, help = "Read rate below which a sender counts as rarely opened (0-1)")]
    pub rarely_opened: Option<f64>,
    #[arg(long, help = "Message count at which a sender counts as bulk")]
    pub bulk_sender: Option<usize>,
    #[arg(long, help = "Age in days after which unread mail counts as old")]
    pub old_days: Option<i64>,
}

impl ScanArgs {
    pub fn apply_thresholds(&self, thresholds: &mut Thresholds) {
        if let Some(value) = self.never_opened {
            thresholds.never_opened = value;
        }
        if let Some(value) = self.rarely_opened {
            thresholds.rarely_opened_rate = value;
        }
        if let Some(value) = self.bulk_sender {
            thresholds.bulk_sender = value;
        }
        if let Some(value) = self.old_days {
            thresholds.old_email_days = value;
        }
    }
}

#[derive(Debug, Args)]
pub struct ScanCommandArgs {
    #[command(flatten)]
    pub scan: ScanArgs,
    #[arg(long, default_value_t = 15, help = "Senders listed per category")]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub scan: ScanArgs,
    #[arg(long, default_value_t = 10, help = "Senders listed by volume")]
    pub top: usize,
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    #[command(flatten)]
    pub scan: ScanArgs,
    #[arg(long = "category", value_enum, action = ArgAction::Append, help = "Trash a whole category (repeatable)")]
    pub categories: Vec<Category>,
    #[arg(long = "sender", action = ArgAction::Append, help = "Trash flagged mail from a sender (repeatable)")]
    pub senders: Vec<String>,
    #[arg(long, help = "Trash every flagged message")]
    pub all: bool,
    #[arg(long, short = 'y', help = "Skip the confirmation prompt")]
    pub yes: bool,
    #[arg(long, help = "Show what would move to trash without touching the mailbox")]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective settings.
    Show,
    /// Write the default settings file if none exists.
    Init {
        #[arg(long, help = "Overwrite an existing settings file")]
        force: bool,
    },
}
