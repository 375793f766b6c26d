//! Subcommand execution.

use crate::formatter::{create_formatter, Formatter};
use crate::{Args, Command};
use std::error::Error;
use std::path::Path;
use tabsync_core::{
    BatchConvergenceRunner, CatalogStore, DeclaredSchemaProvider,
    DeploymentJournal, ManifestProvider, MemoryCatalog, MigrationPlan, MigrationPlanner,
};
use tabsync_pg::{PgCatalog, PgConfig};
use tracing::{info, warn};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Run the parsed command line.
pub fn run(args: Args) -> CliResult<()> {
    let formatter = create_formatter(args.format);

    // The journal is read without a catalog or manifest.
    if let Command::Journal { path, limit } = &args.command {
        return list_journal(path, *limit, &*formatter);
    }

    let catalog = open_catalog(&args)?;
    let provider = ManifestProvider::from_path(&args.manifest)?;
    let planner = MigrationPlanner::with_config(&*catalog, &provider, args.planner_config());
    let credential = args.credential();

    match &args.command {
        Command::Plan { entities } => {
            let entities = select(entities, &provider)?;
            let plans = entities
                .iter()
                .map(|entity| planner.plan(entity))
                .collect::<Result<Vec<_>, _>>()?;
            println!("{}", formatter.format_plans(&plans));
        }

        Command::Apply { entity, expect } => {
            let plan = match expect {
                Some(fingerprint) => planner.execute_reviewed(entity, fingerprint, &credential)?,
                None => {
                    let plan = planner.plan(entity)?;
                    plan.ensure_resolved()?;
                    warn_destructive(&plan);
                    planner.execute(&plan, &credential)?;
                    plan
                }
            };
            info!(entity = %entity, statements = plan.operations.len(), "plan applied");
            println!("{}", formatter.format_plans(std::slice::from_ref(&plan)));
        }

        Command::Deploy {
            entities, journal, ..
        } => {
            let journal = journal.as_deref().map(open_journal).transpose()?;
            let mut runner = BatchConvergenceRunner::new(planner, args.command.runner_config());
            if let Some((_, journal)) = &journal {
                runner = runner.with_journal(journal);
            }

            let report = if entities.is_empty() {
                runner.run_all(&credential)?
            } else {
                runner.run(entities, &credential)?
            };
            if let Some((_, journal)) = &journal {
                journal.flush()?;
            }

            println!("{}", formatter.format_report(&report));
            report.into_result()?;
        }

        Command::Reindex { entities } => {
            let entities = select(entities, &provider)?;
            let mut plans = Vec::new();
            for entity in &entities {
                let plan = planner.plan(entity)?;
                plan.ensure_resolved()?;
                if !plan.classification.is_up_to_date() {
                    warn!(entity = %entity, classification = %plan.classification, "not up to date, skipping reindex");
                    continue;
                }
                if !plan.follow_up.is_empty() {
                    planner.execute_follow_up(&plan, &credential)?;
                    plans.push(plan);
                }
            }
            println!("{}", formatter.format_plans(&plans));
        }

        Command::Drop { entity, yes } => {
            let plan = planner.drop_plan(entity)?;
            if *yes {
                planner.execute(&plan, &credential)?;
                info!(entity = %entity, "entity dropped");
            } else {
                eprintln!("Not executed; re-run with --yes to drop");
            }
            println!("{}", formatter.format_plans(std::slice::from_ref(&plan)));
        }

        Command::Journal { .. } => {}
    }

    Ok(())
}

/// The live catalog, or an in-memory one loaded from a snapshot.
fn open_catalog(args: &Args) -> CliResult<Box<dyn CatalogStore>> {
    if let Some(path) = &args.snapshot {
        let json = std::fs::read_to_string(path)?;
        return Ok(Box::new(MemoryCatalog::from_json(&json)?));
    }

    let url = args
        .database_url
        .as_deref()
        .ok_or("no catalog given; pass --database-url or --snapshot")?;
    let mut config = PgConfig::new(url);
    if let Some(user) = &args.admin_user {
        config = config.with_admin_user(user);
    }
    Ok(Box::new(PgCatalog::connect(config)?))
}

/// The sled database must outlive the journal's tree.
fn open_journal(path: &Path) -> CliResult<(sled::Db, DeploymentJournal)> {
    let db = sled::open(path)?;
    let journal = DeploymentJournal::open(&db)?;
    Ok((db, journal))
}

fn list_journal(path: &Path, limit: Option<usize>, formatter: &dyn Formatter) -> CliResult<()> {
    let (_db, journal) = open_journal(path)?;
    let mut runs = journal.list()?;
    if let Some(limit) = limit {
        let skip = runs.len().saturating_sub(limit);
        runs.drain(..skip);
    }
    println!("{}", formatter.format_runs(&runs));
    Ok(())
}

/// The given entities, or every declared entity when none were named.
fn select(entities: &[String], provider: &ManifestProvider) -> CliResult<Vec<String>> {
    if entities.is_empty() {
        Ok(provider.entities()?)
    } else {
        Ok(entities.to_vec())
    }
}

fn warn_destructive(plan: &MigrationPlan) {
    if plan.is_destructive() {
        warn!(entity = %plan.entity, "plan drops columns or tables");
    }
}
