//! tabsync command-line tool
//!
//! Plans and deploys table migrations from a declared-schema manifest against
//! a PostgreSQL database or an offline catalog snapshot.

mod commands;
mod formatter;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use std::path::PathBuf;
use tabsync_core::{AdminCredential, PlannerConfig, RunnerConfig};

/// tabsync command-line tool
#[derive(Parser, Debug)]
#[command(name = "tabsync")]
#[command(version, about = "Plan and deploy table migrations")]
pub struct Args {
    /// Declared-schema manifest (JSON)
    #[arg(short = 'm', long, env = "TABSYNC_MANIFEST", default_value = "tabsync.json")]
    pub manifest: PathBuf,

    /// PostgreSQL connection string
    #[arg(short = 'd', long, env = "TABSYNC_DATABASE_URL", conflicts_with = "snapshot")]
    pub database_url: Option<String>,

    /// Offline catalog snapshot (JSON) used instead of a live database
    #[arg(short = 's', long)]
    pub snapshot: Option<PathBuf>,

    /// Role used for schema changes
    #[arg(long, env = "TABSYNC_ADMIN_USER")]
    pub admin_user: Option<String>,

    /// Password for the schema-change role
    #[arg(long, env = "TABSYNC_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Ignore declared rename hints
    #[arg(long)]
    pub no_rename_hints: bool,

    /// Output format
    #[arg(long, default_value = "text", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the next plan for entities without executing it
    Plan {
        /// Entities to plan (all declared entities if omitted)
        entities: Vec<String>,
    },

    /// Execute the next plan for one entity
    Apply {
        /// Entity to migrate
        entity: String,

        /// Fingerprint of the reviewed plan; refuse if the fresh plan differs
        #[arg(long)]
        expect: Option<String>,
    },

    /// Deploy entities until the error count stops falling
    Deploy {
        /// Entities to deploy (all declared entities if omitted)
        entities: Vec<String>,

        /// Run index follow-up statements after deploying
        #[arg(long)]
        reindex: bool,

        /// Plan every entity without executing anything
        #[arg(long)]
        dry_run: bool,

        /// Record the run in a journal at this path
        #[arg(long)]
        journal: Option<PathBuf>,

        /// Stop after this many rounds
        #[arg(long)]
        max_rounds: Option<u32>,
    },

    /// Run index follow-up statements for up-to-date entities
    Reindex {
        /// Entities to reindex (all declared entities if omitted)
        entities: Vec<String>,
    },

    /// Drop an entity's primary and history tables
    Drop {
        /// Entity to drop
        entity: String,

        /// Execute the drop instead of only showing it
        #[arg(long)]
        yes: bool,
    },

    /// List recorded deployment runs
    Journal {
        /// Journal path
        #[arg(long, default_value = ".tabsync-journal")]
        path: PathBuf,

        /// Show only the most recent runs
        #[arg(long)]
        limit: Option<usize>,
    },
}

impl Args {
    /// Planner configuration from the global flags.
    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig::default().with_rename_hints(!self.no_rename_hints)
    }

    /// The admin credential; empty when none was given.
    pub fn credential(&self) -> AdminCredential {
        AdminCredential::new(self.admin_password.clone().unwrap_or_default())
    }
}

impl Command {
    /// Runner configuration for `deploy`; defaults for every other command.
    pub fn runner_config(&self) -> RunnerConfig {
        match self {
            Command::Deploy {
                reindex,
                dry_run,
                max_rounds,
                ..
            } => {
                let config = RunnerConfig::default()
                    .with_reindex(*reindex)
                    .with_dry_run(*dry_run);
                match max_rounds {
                    Some(rounds) => config.with_max_rounds(*rounds),
                    None => config,
                }
            }
            _ => RunnerConfig::default(),
        }
    }
}

fn main() {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tabsync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = commands::run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deploy() {
        let args = Args::try_parse_from([
            "tabsync",
            "--snapshot",
            "live.json",
            "deploy",
            "--dry-run",
            "--max-rounds",
            "3",
            "invoice",
        ])
        .unwrap();

        let config = args.command.runner_config();
        assert!(config.dry_run);
        assert!(!config.reindex);
        assert_eq!(config.max_rounds, Some(3));
        assert_eq!(args.snapshot, Some(PathBuf::from("live.json")));
        assert!(matches!(args.command, Command::Deploy { ref entities, .. } if entities == &["invoice"]));
    }

    #[test]
    fn test_snapshot_conflicts_with_database_url() {
        let result = Args::try_parse_from([
            "tabsync",
            "--snapshot",
            "live.json",
            "--database-url",
            "host=localhost",
            "plan",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_planner_config_from_flags() {
        let args =
            Args::try_parse_from(["tabsync", "--no-rename-hints", "apply", "invoice"]).unwrap();
        assert!(!args.planner_config().rename_hints);
        assert!(matches!(args.command, Command::Apply { expect: None, .. }));
    }
}
