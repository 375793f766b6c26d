//! Batch convergence over many entities.
//!
//! Entities are deployed in declaration order, round after round. An entity
//! that deploys leaves the working set; one that fails stays for the next
//! round. Cross-entity dependencies, such as a foreign key to a table created
//! later in the same round, resolve themselves on a later round.
//!
//! The stop rule lives in [`next_transition`] and is a pure function of the
//! round counts, so it can be tested without a catalog.

use super::error::MigrationError;
use super::journal::{generate_run_id, DeploymentJournal, RunRecord};
use super::plan::{MigrationPlan, PlanClassification};
use super::planner::MigrationPlanner;
use crate::catalog::AdminCredential;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, instrument, warn};

/// Batch runner configuration.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Run index follow-up statements after an entity is up to date.
    pub reindex: bool,
    /// Only plan; execute nothing.
    pub dry_run: bool,
    /// Hard cap on the number of rounds.
    pub max_rounds: Option<u32>,
}

impl RunnerConfig {
    /// Enable or disable reindexing.
    pub fn with_reindex(mut self, reindex: bool) -> Self {
        self.reindex = reindex;
        self
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Cap the number of rounds.
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }
}

/// Counts for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RoundStats {
    /// Round number, starting at 1.
    pub round: u32,
    /// Entities that succeeded and changed something.
    pub deployed: usize,
    /// Entities that failed.
    pub errors: usize,
}

/// Outcome of one entity within a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityResult {
    /// The entity.
    pub entity: String,
    /// Whether anything was executed (or would be, in a dry run).
    pub changed: bool,
    /// Failure message, if the entity failed.
    pub error: Option<String>,
}

impl EntityResult {
    /// A successful entity.
    pub fn deployed(entity: impl Into<String>, changed: bool) -> Self {
        Self {
            entity: entity.into(),
            changed,
            error: None,
        }
    }

    /// A failed entity.
    pub fn failed(entity: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            changed: false,
            error: Some(error.into()),
        }
    }
}

/// Why a batch run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No errors remain.
    Converged,
    /// The error count did not change from the previous round.
    Stalled,
    /// A single entity keeps failing.
    SingleFailure,
    /// The configured round cap was reached.
    RoundLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopReason::Converged => "converged",
            StopReason::Stalled => "stalled",
            StopReason::SingleFailure => "single_failure",
            StopReason::RoundLimit => "round_limit",
        };
        f.write_str(name)
    }
}

/// What to do after a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Run another round.
    Continue,
    /// Stop the run.
    Stop(StopReason),
}

/// Decide whether another round should run.
///
/// Stops when no errors remain. From the second round on, also stops when the
/// error count equals the previous round's or is exactly one. The first
/// round always continues on errors, since a failure may depend on an entity
/// processed later in the same round.
pub fn next_transition(
    round: u32,
    errors: usize,
    previous_errors: Option<usize>,
    max_rounds: Option<u32>,
) -> Transition {
    if errors == 0 {
        return Transition::Stop(StopReason::Converged);
    }
    if round > 1 {
        if previous_errors == Some(errors) {
            return Transition::Stop(StopReason::Stalled);
        }
        if errors == 1 {
            return Transition::Stop(StopReason::SingleFailure);
        }
    }
    if max_rounds.is_some_and(|max| round >= max) {
        return Transition::Stop(StopReason::RoundLimit);
    }
    Transition::Continue
}

/// Working set and round history of a batch run.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceState {
    /// Entities not yet deployed, in declaration order.
    pub working_set: Vec<String>,
    /// Rounds completed so far.
    pub round: u32,
    /// Counts per completed round.
    pub rounds: Vec<RoundStats>,
    /// Last failure per entity still in the working set.
    pub failures: BTreeMap<String, String>,
}

impl ConvergenceState {
    /// Start with every entity in the working set.
    pub fn new(entities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            working_set: entities.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Fold one round of results into the state and decide what comes next.
    pub fn apply_round(
        mut self,
        results: Vec<EntityResult>,
        max_rounds: Option<u32>,
    ) -> (Self, Transition) {
        self.round += 1;
        let mut stats = RoundStats {
            round: self.round,
            ..RoundStats::default()
        };

        for result in results {
            match result.error {
                None => {
                    self.working_set.retain(|e| *e != result.entity);
                    self.failures.remove(&result.entity);
                    if result.changed {
                        stats.deployed += 1;
                    }
                }
                Some(message) => {
                    stats.errors += 1;
                    self.failures.insert(result.entity, message);
                }
            }
        }

        let previous = self.rounds.last().map(|r| r.errors);
        self.rounds.push(stats);
        let transition = next_transition(self.round, stats.errors, previous, max_rounds);
        (self, transition)
    }

    /// Entities deployed across all rounds.
    pub fn deployed(&self) -> usize {
        self.rounds.iter().map(|r| r.deployed).sum()
    }

    /// Errors in the last completed round.
    pub fn last_errors(&self) -> usize {
        self.rounds.last().map(|r| r.errors).unwrap_or(0)
    }
}

/// Result of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run ID, hex encoded.
    pub run_id: String,
    /// Entities deployed with changes.
    pub deployed: usize,
    /// Errors in the final round.
    pub remaining_errors: usize,
    /// Entities still failing.
    pub remaining: Vec<String>,
    /// Last failure per remaining entity.
    pub failures: BTreeMap<String, String>,
    /// Counts per round.
    pub rounds: Vec<RoundStats>,
    /// Why the run stopped.
    pub stop_reason: StopReason,
    /// Plans computed in dry-run mode.
    pub planned: Vec<MigrationPlan>,
}

impl RunReport {
    /// Whether every entity succeeded.
    pub fn is_converged(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Turn a report with failing entities into an error.
    pub fn into_result(self) -> Result<Self, MigrationError> {
        if self.is_converged() {
            Ok(self)
        } else {
            Err(MigrationError::ConvergenceExhausted {
                remaining: self.remaining.len(),
                errors: self.remaining_errors,
            })
        }
    }
}

/// Drives the planner across a set of entities until the error count stabilises.
pub struct BatchConvergenceRunner<'a> {
    planner: MigrationPlanner<'a>,
    config: RunnerConfig,
    journal: Option<&'a DeploymentJournal>,
}

impl<'a> BatchConvergenceRunner<'a> {
    /// Create a runner.
    pub fn new(planner: MigrationPlanner<'a>, config: RunnerConfig) -> Self {
        Self {
            planner,
            config,
            journal: None,
        }
    }

    /// Record runs in a journal.
    pub fn with_journal(mut self, journal: &'a DeploymentJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Run over every declared entity.
    pub fn run_all(&self, credential: &AdminCredential) -> Result<RunReport, MigrationError> {
        let entities = self
            .planner
            .schema()
            .entities()
            .map_err(|source| MigrationError::declared("*", source))?;
        self.run(&entities, credential)
    }

    /// Run over the given entities.
    ///
    /// Per-entity failures never abort the run; they are reported. Only
    /// journal failures are returned as errors.
    #[instrument(skip(self, entities, credential), fields(entities = entities.len(), dry_run = self.config.dry_run))]
    pub fn run(
        &self,
        entities: &[String],
        credential: &AdminCredential,
    ) -> Result<RunReport, MigrationError> {
        let run_id = generate_run_id();
        let mut record = RunRecord::new(run_id, entities.len(), self.config.dry_run);
        self.persist(&record)?;

        let mut state = ConvergenceState::new(entities.iter().cloned());
        let mut planned = Vec::new();

        let stop_reason = loop {
            let mut results = Vec::with_capacity(state.working_set.len());
            for entity in &state.working_set {
                let result = if self.config.dry_run {
                    self.plan_only(entity, &mut planned)
                } else {
                    self.deploy_one(entity, credential)
                };
                results.push(result);
            }

            let (next, transition) = state.apply_round(results, self.config.max_rounds);
            state = next;

            if let Some(stats) = state.rounds.last() {
                info!(
                    round = stats.round,
                    deployed = stats.deployed,
                    errors = stats.errors,
                    "round complete"
                );
                record.record_round(stats.round, stats.deployed, stats.errors);
                self.persist(&record)?;
            }

            match transition {
                Transition::Continue => continue,
                Transition::Stop(reason) => break reason,
            }
        };

        record.finish(
            stop_reason.to_string(),
            state
                .failures
                .iter()
                .map(|(entity, message)| (entity.clone(), message.clone())),
        );
        self.persist(&record)?;
        if let Some(journal) = self.journal {
            journal.flush()?;
        }

        if state.working_set.is_empty() {
            info!(deployed = state.deployed(), rounds = state.round, "batch converged");
        } else {
            warn!(
                remaining = state.working_set.len(),
                errors = state.last_errors(),
                reason = %stop_reason,
                "batch stopped with failures"
            );
        }

        Ok(RunReport {
            run_id: record.run_id_hex(),
            deployed: state.deployed(),
            remaining_errors: state.last_errors(),
            remaining: state.working_set,
            failures: state.failures,
            rounds: state.rounds,
            stop_reason,
            planned,
        })
    }

    fn deploy_one(&self, entity: &str, credential: &AdminCredential) -> EntityResult {
        match self.planner.deploy(entity, credential, self.config.reindex) {
            Ok(outcome) => EntityResult::deployed(entity, outcome.changed()),
            Err(err) => {
                warn!(entity = %entity, error = %err, "entity failed");
                EntityResult::failed(entity, err.to_string())
            }
        }
    }

    fn plan_only(&self, entity: &str, planned: &mut Vec<MigrationPlan>) -> EntityResult {
        match self.planner.plan(entity) {
            Ok(plan) if plan.classification == PlanClassification::Unresolved => {
                let trace = plan.error_trace.clone().unwrap_or_default();
                planned.push(plan);
                EntityResult::failed(entity, trace)
            }
            Ok(plan) => {
                let changed = !plan.is_empty();
                planned.push(plan);
                EntityResult::deployed(entity, changed)
            }
            Err(err) => EntityResult::failed(entity, err.to_string()),
        }
    }

    fn persist(&self, record: &RunRecord) -> Result<(), MigrationError> {
        match self.journal {
            Some(journal) => journal.save(record),
            None => Ok(()),
        }
    }
}
