//! Deployment journal.
//!
//! Records batch runs (rounds, counts and per-entity failures) in a sled tree
//! so past deployments can be listed and inspected.

use super::error::MigrationError;
use rkyv::{Archive, Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a unique run ID.
///
/// The first eight bytes are the start timestamp, so keys sort by time. The
/// rest hash the timestamp with the process id and a per-process sequence.
pub fn generate_run_id() -> [u8; 16] {
    let ts = current_timestamp();
    let seq = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut hasher = blake3::Hasher::new();
    hasher.update(&ts.to_be_bytes());
    hasher.update(&std::process::id().to_be_bytes());
    hasher.update(&seq.to_be_bytes());
    let hash = hasher.finalize();

    let mut id = [0u8; 16];
    id[0..8].copy_from_slice(&ts.to_be_bytes());
    id[8..16].copy_from_slice(&hash.as_bytes()[..8]);
    id
}

/// Counts for one round of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Round number, starting at 1.
    pub round: u32,
    /// Entities that changed and succeeded.
    pub deployed: u64,
    /// Entities that failed.
    pub errors: u64,
}

/// Last failure recorded for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The entity.
    pub entity: String,
    /// Error message.
    pub message: String,
}

/// One recorded batch run.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run ID.
    pub run_id: [u8; 16],
    /// When the run started (microseconds since epoch).
    pub started_at: u64,
    /// When the run finished (microseconds since epoch).
    pub finished_at: Option<u64>,
    /// Number of entities in the initial working set.
    pub entity_count: u64,
    /// Whether statements were only planned.
    pub dry_run: bool,
    /// Per-round counts.
    pub rounds: Vec<RoundRecord>,
    /// Entities still failing when the run stopped.
    pub failures: Vec<FailureRecord>,
    /// Why the run stopped.
    pub stop_reason: Option<String>,
}

impl RunRecord {
    /// Start a new run record.
    pub fn new(run_id: [u8; 16], entity_count: usize, dry_run: bool) -> Self {
        Self {
            run_id,
            started_at: current_timestamp(),
            finished_at: None,
            entity_count: entity_count as u64,
            dry_run,
            rounds: Vec::new(),
            failures: Vec::new(),
            stop_reason: None,
        }
    }

    /// Append a round.
    pub fn record_round(&mut self, round: u32, deployed: usize, errors: usize) {
        self.rounds.push(RoundRecord {
            round,
            deployed: deployed as u64,
            errors: errors as u64,
        });
    }

    /// Mark the run as finished.
    pub fn finish(
        &mut self,
        stop_reason: impl Into<String>,
        failures: impl IntoIterator<Item = (String, String)>,
    ) {
        self.finished_at = Some(current_timestamp());
        self.stop_reason = Some(stop_reason.into());
        self.failures = failures
            .into_iter()
            .map(|(entity, message)| FailureRecord { entity, message })
            .collect();
    }

    /// Whether the run has finished.
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Total entities deployed across all rounds.
    pub fn deployed(&self) -> u64 {
        self.rounds.iter().map(|r| r.deployed).sum()
    }

    /// Run ID as hex.
    pub fn run_id_hex(&self) -> String {
        hex::encode(self.run_id)
    }

    /// Serialize the record to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MigrationError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| MigrationError::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MigrationError> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| MigrationError::Deserialization(e.to_string()))
    }
}

/// Persistent store of run records.
pub struct DeploymentJournal {
    tree: sled::Tree,
}

impl DeploymentJournal {
    /// Tree name for run records.
    pub const TREE_NAME: &'static str = "deployment:journal";

    /// Open or create the journal.
    pub fn open(db: &sled::Db) -> Result<Self, MigrationError> {
        let tree = db.open_tree(Self::TREE_NAME)?;
        Ok(Self { tree })
    }

    /// Save a run record.
    pub fn save(&self, record: &RunRecord) -> Result<(), MigrationError> {
        self.tree
            .insert(Self::run_key(&record.run_id), record.to_bytes()?)?;
        Ok(())
    }

    /// Load a run record.
    pub fn load(&self, run_id: &[u8; 16]) -> Result<Option<RunRecord>, MigrationError> {
        match self.tree.get(Self::run_key(run_id))? {
            Some(bytes) => Ok(Some(RunRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete a run record.
    pub fn delete(&self, run_id: &[u8; 16]) -> Result<(), MigrationError> {
        self.tree.remove(Self::run_key(run_id))?;
        Ok(())
    }

    /// All run records, oldest first.
    pub fn list(&self) -> Result<Vec<RunRecord>, MigrationError> {
        let mut records = Vec::new();
        for result in self.tree.scan_prefix(b"run:") {
            let (_, value) = result?;
            records.push(RunRecord::from_bytes(&value)?);
        }
        records.sort_by_key(|r| r.started_at);
        Ok(records)
    }

    /// The most recent run, if any.
    pub fn latest(&self) -> Result<Option<RunRecord>, MigrationError> {
        Ok(self.list()?.pop())
    }

    /// Flush changes to disk.
    pub fn flush(&self) -> Result<(), MigrationError> {
        self.tree.flush()?;
        Ok(())
    }

    fn run_key(id: &[u8; 16]) -> Vec<u8> {
        let mut key = Vec::with_capacity(20);
        key.extend_from_slice(b"run:");
        key.extend_from_slice(id);
        key
    }
}
