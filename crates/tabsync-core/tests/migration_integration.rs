//! Integration tests for planning and batch deployment against the in-memory catalog.

use tabsync_core::catalog::{
    AdminCredential, CatalogStore, ColumnSpec, MemoryCatalog, QualifiedName, TableIdentity,
};
use tabsync_core::declared::{EntityDef, ManifestProvider};
use tabsync_core::migration::{
    BatchConvergenceRunner, DeploymentJournal, MigrationError, MigrationPlanner, OperationKind,
    PlanClassification, RunnerConfig, StopReason,
};

const FK_LINE_INVOICE: &str = "ALTER TABLE sales.line ADD CONSTRAINT fk_line_invoice \
                               FOREIGN KEY (invoice) REFERENCES sales.invoice(id)";

fn credential() -> AdminCredential {
    AdminCredential::new("admin")
}

fn name(s: &str) -> QualifiedName {
    QualifiedName::parse(s).unwrap()
}

fn invoice_pair(catalog: MemoryCatalog, columns: &[(&str, &str)]) -> MemoryCatalog {
    catalog
        .with_table("sales.invoice", columns)
        .with_table("sales.h_invoice", columns)
}

/// Three entities where the first declared one references a table created later.
fn order_entities() -> ManifestProvider {
    let line = EntityDef::table("sales.line", TableIdentity::new("sales", "line"))
        .with_column(ColumnSpec::new("invoice", "bigint"))
        .with_foreign_key(FK_LINE_INVOICE);
    let invoice = EntityDef::table("sales.invoice", TableIdentity::new("sales", "invoice"))
        .with_column(ColumnSpec::new("id", "bigint"));
    let party = EntityDef::table("sales.party", TableIdentity::new("sales", "party"))
        .with_column(ColumnSpec::new("name", "text"));
    ManifestProvider::from_entities([line, invoice, party])
}

#[test]
fn test_type_change_is_mirrored_onto_history() {
    let catalog = invoice_pair(MemoryCatalog::new(), &[("amount", "numeric(10,2)")]);
    let entity = EntityDef::table("sales.invoice", TableIdentity::new("sales", "invoice"))
        .with_column(ColumnSpec::new("Amount", "numeric(18,6)"));
    let schema = ManifestProvider::from_entities([entity]);
    let planner = MigrationPlanner::new(&catalog, &schema);

    let plan = planner.plan("sales.invoice").unwrap();
    assert_eq!(plan.classification, PlanClassification::NeedsAlter);
    assert_eq!(
        plan.script(),
        "ALTER TABLE sales.invoice ALTER COLUMN amount TYPE numeric(18,6) USING 0;\n\
         ALTER TABLE sales.h_invoice ALTER COLUMN amount TYPE numeric(18,6) USING 0;"
    );

    planner.execute(&plan, &credential()).unwrap();
    for table in ["sales.invoice", "sales.h_invoice"] {
        let columns = catalog.column_details(&name(table)).unwrap();
        assert_eq!(columns[0].column_type, "numeric(18,6)");
    }
    assert_eq!(
        planner.plan("sales.invoice").unwrap().classification,
        PlanClassification::UpToDate
    );
}

#[test]
fn test_same_typed_column_is_renamed_not_rebuilt() {
    let catalog = invoice_pair(MemoryCatalog::new(), &[("old_total", "numeric(10,2)")]);
    let entity = EntityDef::table("sales.invoice", TableIdentity::new("sales", "invoice"))
        .with_column(ColumnSpec::new("total", "numeric(10,2)"));
    let schema = ManifestProvider::from_entities([entity]);
    let planner = MigrationPlanner::new(&catalog, &schema);

    let plan = planner.plan("sales.invoice").unwrap();
    assert_eq!(
        plan.statements(),
        vec![
            "ALTER TABLE sales.invoice RENAME COLUMN old_total TO total",
            "ALTER TABLE sales.h_invoice RENAME COLUMN old_total TO total",
        ]
    );
    assert!(plan
        .operations
        .iter()
        .all(|op| op.kind == OperationKind::RenameColumn));
}

#[test]
fn test_missing_schema_yields_single_statement_plan() {
    let catalog = MemoryCatalog::new();
    let entity = EntityDef::table("sales.invoice", TableIdentity::new("sales", "invoice"));
    let schema = ManifestProvider::from_entities([entity]);
    let planner = MigrationPlanner::new(&catalog, &schema);

    let plan = planner.plan("sales.invoice").unwrap();
    assert_eq!(plan.classification, PlanClassification::NoSchema);
    assert_eq!(plan.operations.len(), 1);
    assert_eq!(plan.operations[0].kind, OperationKind::CreateSchema);
}

#[test]
fn test_reparenting_moves_both_chains() {
    let catalog = MemoryCatalog::new()
        .with_table("sales.document", &[("no", "bigint")])
        .with_table("sales.h_document", &[("no", "bigint")])
        .with_table("sales.billable_document", &[("no", "bigint")])
        .with_table("sales.h_billable_document", &[("no", "bigint")]);
    let catalog = invoice_pair(catalog, &[("amount", "numeric(18,6)")])
        .with_parent("sales.invoice", "sales.document")
        .with_parent("sales.h_invoice", "sales.h_document");

    let entity = EntityDef::table(
        "sales.invoice",
        TableIdentity::new("sales", "invoice")
            .with_parent(TableIdentity::new("sales", "billable_document")),
    )
    .with_column(ColumnSpec::new("amount", "numeric(18,6)"));
    let schema = ManifestProvider::from_entities([entity]);
    let planner = MigrationPlanner::new(&catalog, &schema);

    let plan = planner.plan("sales.invoice").unwrap();
    assert_eq!(
        plan.statements(),
        vec![
            "ALTER TABLE sales.invoice NO INHERIT sales.document",
            "ALTER TABLE sales.invoice INHERIT sales.billable_document",
            "ALTER TABLE sales.h_invoice NO INHERIT sales.h_document",
            "ALTER TABLE sales.h_invoice INHERIT sales.h_billable_document",
        ]
    );

    let outcome = planner.deploy("sales.invoice", &credential(), false).unwrap();
    assert_eq!(outcome.executed.len(), 4);
    assert_eq!(
        catalog.parent_table(&name("sales.h_invoice")).unwrap(),
        Some(name("sales.h_billable_document"))
    );
}

#[test]
fn test_reparenting_drops_columns_left_by_old_parent() {
    let catalog = MemoryCatalog::new()
        .with_table("sales.document", &[("no", "bigint"), ("legacy", "boolean")])
        .with_table("sales.h_document", &[("no", "bigint"), ("legacy", "boolean")])
        .with_table("sales.billable_document", &[("no", "bigint")])
        .with_table("sales.h_billable_document", &[("no", "bigint")]);
    let catalog = invoice_pair(catalog, &[("amount", "numeric(18,6)")])
        .with_parent("sales.invoice", "sales.document")
        .with_parent("sales.h_invoice", "sales.h_document");

    let entity = EntityDef::table(
        "sales.invoice",
        TableIdentity::new("sales", "invoice")
            .with_parent(TableIdentity::new("sales", "billable_document")),
    )
    .with_column(ColumnSpec::new("amount", "numeric(18,6)"));
    let schema = ManifestProvider::from_entities([entity]);
    let planner = MigrationPlanner::new(&catalog, &schema);

    let outcome = planner.deploy("sales.invoice", &credential(), false).unwrap();
    assert_eq!(outcome.classification, Some(PlanClassification::UpToDate));
    assert_eq!(
        &outcome.executed[4..],
        &[
            "ALTER TABLE sales.invoice DROP COLUMN legacy CASCADE",
            "ALTER TABLE sales.h_invoice DROP COLUMN legacy CASCADE",
        ]
    );
    for table in ["sales.invoice", "sales.h_invoice"] {
        let columns: Vec<String> = catalog
            .column_details(&name(table))
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(columns, vec!["no", "amount"]);
    }
}

#[test]
fn test_foreign_keys_converge_and_stay_idempotent() {
    let catalog = MemoryCatalog::new()
        .with_table("sales.invoice", &[("id", "bigint")])
        .with_table("sales.h_invoice", &[("id", "bigint")])
        .with_table("sales.line", &[("invoice", "bigint")])
        .with_table("sales.h_line", &[("invoice", "bigint")])
        .with_foreign_key(
            "sales.line",
            "fk_line_stale",
            "FOREIGN KEY (invoice) REFERENCES sales.invoice(id)",
        );
    let schema = order_entities();
    let planner = MigrationPlanner::new(&catalog, &schema);

    let plan = planner.plan("sales.line").unwrap();
    assert_eq!(
        plan.statements(),
        vec![
            FK_LINE_INVOICE,
            "ALTER TABLE sales.line DROP CONSTRAINT IF EXISTS fk_line_stale",
        ]
    );

    planner.execute(&plan, &credential()).unwrap();
    let again = planner.plan("sales.line").unwrap();
    assert!(again.is_empty());
    assert_eq!(again.classification, PlanClassification::UpToDate);
}

#[test]
fn test_partial_failure_then_smaller_plan() {
    let catalog = invoice_pair(MemoryCatalog::new(), &[("legacy_flag", "boolean")]);
    let entity = EntityDef::table("sales.invoice", TableIdentity::new("sales", "invoice"))
        .with_column(ColumnSpec::new("currency", "text"));
    let schema = ManifestProvider::from_entities([entity]);
    let planner = MigrationPlanner::new(&catalog, &schema);

    catalog.fail_statements_containing("sales.invoice add column");
    let plan = planner.plan("sales.invoice").unwrap();
    assert_eq!(plan.operations.len(), 4);

    let err = planner.execute(&plan, &credential()).unwrap_err();
    assert!(matches!(err, MigrationError::PlanExecution { step_index: 2, .. }));

    catalog.clear_failures();
    let retry = planner.plan("sales.invoice").unwrap();
    assert_eq!(
        retry.statements(),
        vec![
            "ALTER TABLE sales.invoice ADD COLUMN currency text NOT NULL DEFAULT ''",
            "ALTER TABLE sales.h_invoice ADD COLUMN currency text NOT NULL DEFAULT ''",
        ]
    );
}

#[test]
fn test_dropping_referenced_columns_warns() {
    let catalog = invoice_pair(MemoryCatalog::new(), &[("id", "bigint"), ("legacy", "text")])
        .with_table("sales.line", &[("invoice", "bigint")])
        .with_foreign_key(
            "sales.line",
            "fk_line_invoice",
            "FOREIGN KEY (invoice) REFERENCES sales.invoice(id)",
        );
    let entity = EntityDef::table("sales.invoice", TableIdentity::new("sales", "invoice"))
        .with_column(ColumnSpec::new("id", "bigint"));
    let schema = ManifestProvider::from_entities([entity]);
    let planner = MigrationPlanner::new(&catalog, &schema);

    let plan = planner.plan("sales.invoice").unwrap();
    assert!(plan.is_destructive());
    assert_eq!(plan.warnings.len(), 1);
    assert!(plan.warnings[0].contains("fk_line_invoice"));
}

#[test]
fn test_batch_resolves_forward_reference_in_second_round() {
    let catalog = MemoryCatalog::new();
    let schema = order_entities();
    let runner = BatchConvergenceRunner::new(
        MigrationPlanner::new(&catalog, &schema),
        RunnerConfig::default(),
    );

    let report = runner.run_all(&credential()).unwrap();
    assert_eq!(report.stop_reason, StopReason::Converged);
    assert_eq!(report.rounds.len(), 2);
    assert_eq!(report.rounds[0].errors, 1);
    assert_eq!(report.rounds[0].deployed, 2);
    assert_eq!(report.rounds[1].errors, 0);
    assert_eq!(report.deployed, 3);
    assert!(report.is_converged());

    let fks = catalog.foreign_key_constraints(&name("sales.line")).unwrap();
    assert_eq!(fks.len(), 1);
}

#[test]
fn test_batch_stops_when_errors_stabilise() {
    let catalog = MemoryCatalog::new();
    let broken = |id: &str, table: &str| {
        EntityDef::table(id, TableIdentity::new("sales", table))
            .with_column(ColumnSpec::new("x", "bigint"))
            .with_foreign_key(format!(
                "ALTER TABLE sales.{table} ADD CONSTRAINT fk_{table}_ghost \
                 FOREIGN KEY (x) REFERENCES sales.ghost(id)"
            ))
    };
    let schema = ManifestProvider::from_entities([broken("a", "a"), broken("b", "b")]);
    let runner = BatchConvergenceRunner::new(
        MigrationPlanner::new(&catalog, &schema),
        RunnerConfig::default(),
    );

    let report = runner.run_all(&credential()).unwrap();
    assert_eq!(report.stop_reason, StopReason::Stalled);
    assert_eq!(report.remaining, vec!["a", "b"]);
    assert_eq!(report.failures.len(), 2);
    assert!(matches!(
        report.into_result(),
        Err(MigrationError::ConvergenceExhausted { remaining: 2, errors: 2 })
    ));
}

#[test]
fn test_dry_run_executes_nothing() {
    let catalog = MemoryCatalog::new();
    let schema = order_entities();
    let runner = BatchConvergenceRunner::new(
        MigrationPlanner::new(&catalog, &schema),
        RunnerConfig::default().with_dry_run(true),
    );

    let report = runner.run_all(&credential()).unwrap();
    assert!(catalog.executed().is_empty());
    assert_eq!(report.planned.len(), 3);
    assert!(report
        .planned
        .iter()
        .all(|plan| plan.classification == PlanClassification::NoSchema));
}

#[test]
fn test_runs_are_journaled() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let journal = DeploymentJournal::open(&db).unwrap();

    let catalog = MemoryCatalog::new();
    let schema = order_entities();
    let runner = BatchConvergenceRunner::new(
        MigrationPlanner::new(&catalog, &schema),
        RunnerConfig::default(),
    )
    .with_journal(&journal);

    let report = runner.run_all(&credential()).unwrap();

    let runs = journal.list().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id_hex(), report.run_id);
    assert_eq!(runs[0].rounds.len(), 2);
    assert_eq!(runs[0].stop_reason.as_deref(), Some("converged"));
    assert!(runs[0].failures.is_empty());
}

#[test]
fn test_manifest_and_snapshot_round_trip_through_planner() {
    let manifest = r#"{
        "entities": [{
            "id": "sales.invoice",
            "schema": "sales",
            "table": "invoice",
            "columns": [
                {"name": "Total", "type": "numeric(10,2)"},
                {"name": "Currency", "type": "text"}
            ],
            "rename_hints": {"Total": "old_total"}
        }]
    }"#;
    let snapshot = r#"{
        "schemas": ["sales"],
        "tables": {
            "sales.invoice": {"columns": [{"name": "old_total", "type": "numeric(10,2)"}]},
            "sales.h_invoice": {"columns": [{"name": "old_total", "type": "numeric(10,2)"}]}
        }
    }"#;

    let catalog = MemoryCatalog::from_json(snapshot).unwrap();
    let schema = ManifestProvider::from_json(manifest).unwrap();
    let planner = MigrationPlanner::new(&catalog, &schema);

    let outcome = planner.deploy("sales.invoice", &credential(), false).unwrap();
    assert_eq!(outcome.executed.len(), 4);
    let columns: Vec<String> = catalog
        .column_details(&name("sales.h_invoice"))
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(columns, vec!["total", "currency"]);
}
