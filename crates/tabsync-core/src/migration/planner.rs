//! Single-entity planning and execution.
//!
//! The planner classifies an entity against the live catalog and produces the
//! statements for the next step:
//!
//! ```text
//! NO_SCHEMA -> NO_TABLE -> NEEDS_ALTER -> UP_TO_DATE_REINDEXABLE -> UP_TO_DATE
//! ```
//!
//! Plans are computed from a fresh catalog read every time. Executing a plan
//! stops at the first failing statement; the statements before it stay applied
//! and the next plan is computed from that partially migrated state.

use super::diff::ColumnDiffEngine;
use super::error::MigrationError;
use super::foreign_key::ForeignKeyReconciler;
use super::inheritance::{mirrors, HistoryRepair, InheritanceSynchronizer, LiveLineage};
use super::plan::{AlterOperation, MigrationPlan, OperationKind, PlanClassification, RenameWarning};
use crate::catalog::{AdminCredential, CatalogStore, LiveColumn, QualifiedName, TableIdentity};
use crate::ddl;
use crate::declared::{DeclaredSchemaProvider, EntityDef};
use crate::error::CatalogError;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Planner configuration.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Consult declared rename hints before matching renames by type.
    pub rename_hints: bool,
    /// Read constraints referencing a table when a plan drops its columns.
    pub dependent_warnings: bool,
    /// Most plans a single deploy executes before giving up.
    pub max_passes: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            rename_hints: true,
            dependent_warnings: true,
            max_passes: 8,
        }
    }
}

impl PlannerConfig {
    /// Enable or disable rename hints.
    pub fn with_rename_hints(mut self, enabled: bool) -> Self {
        self.rename_hints = enabled;
        self
    }

    /// Enable or disable dependent-constraint warnings.
    pub fn with_dependent_warnings(mut self, enabled: bool) -> Self {
        self.dependent_warnings = enabled;
        self
    }

    /// Set the pass limit for a single deploy.
    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes.max(1);
        self
    }
}

/// Result of deploying one entity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployOutcome {
    /// The entity.
    pub entity: String,
    /// Classification after the last plan.
    pub classification: Option<PlanClassification>,
    /// Every statement executed, in order.
    pub executed: Vec<String>,
    /// Reviewer notes collected from the executed plans.
    pub warnings: Vec<String>,
    /// Ambiguous renames resolved along the way.
    pub rename_warnings: Vec<RenameWarning>,
}

impl DeployOutcome {
    /// Whether anything was executed.
    pub fn changed(&self) -> bool {
        !self.executed.is_empty()
    }
}

/// Plans and executes migrations for single entities.
pub struct MigrationPlanner<'a> {
    catalog: &'a dyn CatalogStore,
    schema: &'a dyn DeclaredSchemaProvider,
    config: PlannerConfig,
}

impl<'a> MigrationPlanner<'a> {
    /// Create a planner with the default configuration.
    pub fn new(catalog: &'a dyn CatalogStore, schema: &'a dyn DeclaredSchemaProvider) -> Self {
        Self::with_config(catalog, schema, PlannerConfig::default())
    }

    /// Create a planner with a custom configuration.
    pub fn with_config(
        catalog: &'a dyn CatalogStore,
        schema: &'a dyn DeclaredSchemaProvider,
        config: PlannerConfig,
    ) -> Self {
        Self {
            catalog,
            schema,
            config,
        }
    }

    /// The declared schema this planner reads.
    pub fn schema(&self) -> &'a dyn DeclaredSchemaProvider {
        self.schema
    }

    /// Plan the next step for an entity.
    ///
    /// A catalog read failure yields an `UNRESOLVED` plan carrying the error
    /// trace. Only a missing or broken declaration is returned as an error.
    pub fn plan(&self, entity: &str) -> Result<MigrationPlan, MigrationError> {
        let definition = self.definition(entity)?;
        match self.plan_entity(&definition) {
            Ok(plan) => Ok(plan),
            Err(err @ MigrationError::CatalogRead { .. }) => {
                warn!(entity = %entity, error = %err, "planning aborted");
                Ok(MigrationPlan::unresolved(
                    entity,
                    definition.identity.name().clone(),
                    err,
                ))
            }
            Err(err) => Err(err),
        }
    }

    /// Plan the next step for an already loaded definition.
    pub fn plan_entity(&self, definition: &EntityDef) -> Result<MigrationPlan, MigrationError> {
        let entity = definition.id.as_str();
        let table = &definition.identity;
        let name = table.name();
        let read = |source: CatalogError| MigrationError::catalog_read(entity, source);

        if definition.is_view() {
            if !self.catalog.view_exists(name).map_err(read)? {
                return Err(MigrationError::ViewMissing {
                    entity: entity.to_string(),
                    view: name.to_string(),
                });
            }
            debug!(entity = %entity, "view present");
            return Ok(MigrationPlan::new(entity, name.clone(), PlanClassification::UpToDate));
        }

        if !self.catalog.schema_exists(table.schema()).map_err(read)? {
            debug!(entity = %entity, schema = table.schema(), "schema missing");
            let create = AlterOperation::verbatim(
                OperationKind::CreateSchema,
                name,
                ddl::create_schema_statement(table.schema()),
            );
            return Ok(
                MigrationPlan::new(entity, name.clone(), PlanClassification::NoSchema)
                    .with_operations(vec![create]),
            );
        }

        if !self.catalog.table_exists(name).map_err(read)? {
            debug!(entity = %entity, "table missing");
            let mut create = AlterOperation::verbatim(
                OperationKind::CreateTable,
                name,
                ddl::create_table_statement(table, &definition.columns),
            );
            // The same call creates the history twin.
            create.mirror = true;
            return Ok(
                MigrationPlan::new(entity, name.clone(), PlanClassification::NoTable)
                    .with_operations(vec![create]),
            );
        }

        let history = table.history();
        let history_exists = self.catalog.table_exists(history.name()).map_err(read)?;
        let lineage = LiveLineage {
            primary_parent: self.catalog.parent_table(name).map_err(read)?,
            history_parent: if history_exists {
                self.catalog.parent_table(history.name()).map_err(read)?
            } else {
                None
            },
        };

        let mut engine = ColumnDiffEngine::new();
        if self.config.rename_hints {
            engine = engine.with_rename_hints(definition.rename_hints.clone());
        }
        let own = self
            .own_columns(table, lineage.primary_parent.as_ref())
            .map_err(read)?;
        let diff = engine.diff(name, &definition.columns, &own);
        let mut drops_columns = diff.drops_columns();

        // The twin is diffed on its own so a half-applied mirror is repaired.
        let repair = if history_exists {
            let history_own = self
                .own_columns(&history, lineage.history_parent.as_ref())
                .map_err(read)?;
            let history_diff = engine.diff(history.name(), &definition.columns, &history_own);
            if mirrors(&diff.operations, &history_diff.operations) {
                HistoryRepair::Mirror
            } else {
                warn!(entity = %entity, history = %history.name(), "history table diverged from primary");
                drops_columns |= history_diff.drops_columns();
                HistoryRepair::Diverged(history_diff.operations)
            }
        } else {
            warn!(entity = %entity, history = %history.name(), "history table missing");
            HistoryRepair::Missing(AlterOperation::verbatim(
                OperationKind::CreateHistory,
                history.name(),
                ddl::create_table_statement(&history, &definition.columns),
            ))
        };

        let mut operations =
            InheritanceSynchronizer::new().sync(table, diff.operations, repair, &lineage);
        let live_keys = self.catalog.foreign_key_constraints(name).map_err(read)?;
        operations.extend(ForeignKeyReconciler::new().reconcile(
            name,
            &definition.foreign_keys,
            &live_keys,
        ));

        if operations.is_empty() {
            if definition.indexes.is_empty() {
                debug!(entity = %entity, "up to date");
                return Ok(MigrationPlan::new(entity, name.clone(), PlanClassification::UpToDate));
            }
            debug!(entity = %entity, indexes = definition.indexes.len(), "up to date, reindexable");
            let mut plan =
                MigrationPlan::new(entity, name.clone(), PlanClassification::UpToDateReindexable);
            plan.follow_up = definition
                .indexes
                .iter()
                .map(|statement| AlterOperation::verbatim(OperationKind::Reindex, name, statement.as_str()))
                .collect();
            return Ok(plan);
        }

        let mut plan = MigrationPlan::new(entity, name.clone(), PlanClassification::NeedsAlter)
            .with_operations(operations);
        plan.rename_warnings = diff.rename_warnings;
        plan.warnings
            .extend(plan.rename_warnings.iter().map(ToString::to_string));

        if drops_columns && self.config.dependent_warnings {
            let dependents = self.catalog.dependent_constraints(name).map_err(read)?;
            if !dependents.is_empty() {
                let names: Vec<&str> = dependents.iter().map(|c| c.name.as_str()).collect();
                warn!(entity = %entity, dependents = ?names, "column drop cascades to dependent constraints");
                plan.warnings.push(format!(
                    "dropping columns of {} with CASCADE may drop dependent constraints: {}",
                    name,
                    names.join(", ")
                ));
            }
        }

        debug!(entity = %entity, operations = plan.operations.len(), "needs alter");
        Ok(plan)
    }

    /// Execute a plan's mandatory operations. Returns the number executed.
    pub fn execute(
        &self,
        plan: &MigrationPlan,
        credential: &AdminCredential,
    ) -> Result<usize, MigrationError> {
        plan.ensure_resolved()?;
        self.run_operations(&plan.entity, &plan.operations, None, credential)
    }

    /// Execute a plan's optional follow-up operations. Returns the number executed.
    pub fn execute_follow_up(
        &self,
        plan: &MigrationPlan,
        credential: &AdminCredential,
    ) -> Result<usize, MigrationError> {
        plan.ensure_resolved()?;
        self.run_operations(&plan.entity, &plan.follow_up, None, credential)
    }

    /// Re-plan and execute only if the fresh plan matches a reviewed fingerprint.
    pub fn execute_reviewed(
        &self,
        entity: &str,
        expected_fingerprint: &str,
        credential: &AdminCredential,
    ) -> Result<MigrationPlan, MigrationError> {
        let plan = self.plan(entity)?;
        let actual = plan.fingerprint();
        if actual != expected_fingerprint {
            return Err(MigrationError::PlanChanged {
                expected: expected_fingerprint.to_string(),
                actual,
            });
        }
        self.execute(&plan, credential)?;
        Ok(plan)
    }

    /// Bring one entity fully up to date.
    ///
    /// Plans, executes and re-plans until the entity is up to date. An alter
    /// may take several passes, for example when a detached parent leaves its
    /// columns behind. Fails when a pass falls back to an earlier state or
    /// yields the same plan again, or after `max_passes` plans. Follow-up
    /// index statements run only when `reindex` is set.
    pub fn deploy(
        &self,
        entity: &str,
        credential: &AdminCredential,
        reindex: bool,
    ) -> Result<DeployOutcome, MigrationError> {
        let definition = self.definition(entity)?;
        let mut outcome = DeployOutcome {
            entity: entity.to_string(),
            ..DeployOutcome::default()
        };

        let mut plan = self.plan_entity(&definition)?;
        let mut passes = 0;
        while !plan.classification.is_up_to_date() {
            passes += 1;
            self.run_operations(entity, &plan.operations, Some(&definition), credential)?;
            outcome
                .executed
                .extend(plan.operations.iter().map(|op| op.statement.clone()));
            outcome.warnings.append(&mut plan.warnings);
            outcome.rename_warnings.append(&mut plan.rename_warnings);

            let next = self.plan_entity(&definition)?;
            let regressed = next.classification < plan.classification;
            let repeated = next.classification == plan.classification
                && next.statements() == plan.statements();
            let exhausted = passes >= self.config.max_passes;
            if !next.classification.is_up_to_date() && (regressed || repeated || exhausted) {
                return Err(MigrationError::Stalled {
                    entity: entity.to_string(),
                    classification: next.classification.to_string(),
                });
            }
            plan = next;
        }

        if reindex && !plan.follow_up.is_empty() {
            self.run_operations(entity, &plan.follow_up, Some(&definition), credential)?;
            outcome
                .executed
                .extend(plan.follow_up.iter().map(|op| op.statement.clone()));
        }

        outcome.classification = Some(plan.classification);
        if outcome.changed() {
            info!(entity = %entity, statements = outcome.executed.len(), "entity deployed");
        }
        Ok(outcome)
    }

    /// Plan dropping an entity's primary and history tables.
    pub fn drop_plan(&self, entity: &str) -> Result<MigrationPlan, MigrationError> {
        let definition = self.definition(entity)?;
        let name = definition.identity.name();
        let read = |source: CatalogError| MigrationError::catalog_read(entity, source);

        if definition.is_view() {
            let mut plan = MigrationPlan::new(entity, name.clone(), PlanClassification::UpToDate);
            plan.warnings.push(format!("{} is a view and is not dropped", name));
            return Ok(plan);
        }

        let mut operations = Vec::with_capacity(2);
        for table in [name.clone(), definition.identity.history().name().clone()] {
            if self.catalog.table_exists(&table).map_err(read)? {
                operations.push(AlterOperation::verbatim(
                    OperationKind::DropTable,
                    &table,
                    ddl::drop_table_statement(&table),
                ));
            }
        }

        if operations.is_empty() {
            return Ok(MigrationPlan::new(entity, name.clone(), PlanClassification::UpToDate));
        }

        let mut plan = MigrationPlan::new(entity, name.clone(), PlanClassification::NeedsAlter)
            .with_operations(operations);
        let dependents = self.catalog.dependent_constraints(name).map_err(read)?;
        if !dependents.is_empty() {
            let names: Vec<&str> = dependents.iter().map(|c| c.name.as_str()).collect();
            plan.warnings.push(format!(
                "{} is referenced by: {}",
                name,
                names.join(", ")
            ));
        }
        Ok(plan)
    }

    fn definition(&self, entity: &str) -> Result<EntityDef, MigrationError> {
        self.schema
            .entity(entity)
            .map_err(|source| MigrationError::declared(entity, source))
    }

    /// Live columns of `table` minus those inherited from declared or live ancestors.
    fn own_columns(
        &self,
        table: &TableIdentity,
        live_parent: Option<&QualifiedName>,
    ) -> Result<Vec<LiveColumn>, CatalogError> {
        let live = self.catalog.column_details(table.name())?;

        let mut ancestors: Vec<&QualifiedName> =
            table.ancestors().map(|ancestor| ancestor.name()).collect();
        if let Some(parent) = live_parent {
            if !ancestors.contains(&parent) {
                ancestors.push(parent);
            }
        }

        let mut inherited = HashSet::new();
        for ancestor in ancestors {
            for column in self.catalog.column_details(ancestor)? {
                inherited.insert(column.key());
            }
        }

        Ok(live
            .into_iter()
            .filter(|column| !inherited.contains(&column.key()))
            .collect())
    }

    fn run_operations(
        &self,
        entity: &str,
        operations: &[AlterOperation],
        definition: Option<&EntityDef>,
        credential: &AdminCredential,
    ) -> Result<usize, MigrationError> {
        for (step_index, op) in operations.iter().enumerate() {
            let result = match op.kind {
                OperationKind::CreateSchema => {
                    self.catalog.create_schema(op.target.schema(), credential)
                }
                OperationKind::CreateTable => {
                    let loaded;
                    let definition = match definition {
                        Some(definition) => definition,
                        None => {
                            loaded = self.definition(entity)?;
                            &loaded
                        }
                    };
                    self.catalog.create_table(definition, credential)
                }
                _ => self.catalog.execute_sql(&op.statement, credential),
            };

            if let Err(err) = result {
                let reason = match err {
                    CatalogError::Execution { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!(entity = %entity, step = step_index, statement = %op.statement, %reason, "statement failed");
                return Err(MigrationError::PlanExecution {
                    entity: entity.to_string(),
                    step_index,
                    statement: op.statement.clone(),
                    reason,
                });
            }
            debug!(entity = %entity, step = step_index, kind = %op.kind, "statement executed");
        }
        Ok(operations.len())
    }
}
