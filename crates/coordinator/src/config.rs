use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

const DEFAULT_DATADIR: &str = "sync-committee-data";
const DEFAULT_DB_RETRY_COUNT: u16 = 5;
const DEFAULT_STORED_BATCHES_LIMIT: u32 = 100;
const DEFAULT_DB_THREADS: usize = 4;

const DEFAULT_POLLING_INTERVAL_MS: u64 = 1_000;
const DEFAULT_FETCH_PAGE_SIZE: u32 = 20;
const DEFAULT_MAX_BLOBS_IN_TX: usize = 6;

const DEFAULT_TASK_CHECK_INTERVAL_MS: u64 = 60_000;
const DEFAULT_TASK_EXECUTION_TIMEOUT_MS: u64 = 3_600_000;

const DEFAULT_RESUME_DELAY_MS: u64 = 600_000;
const DEFAULT_RESUME_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_MS: u64 = 300_000;

const DEFAULT_PROPOSING_INTERVAL_MS: u64 = 10_000;
const DEFAULT_LAG_TRACKER_INTERVAL_MS: u64 = 300_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// The data directory where database contents reside.
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,
    /// For optimistic transactions, how many times to retry if a write fails.
    #[serde(default = "default_db_retry_count")]
    pub db_retry_count: u16,
    /// Maximum number of batches kept in storage until they are proposed.
    #[serde(default = "default_stored_batches_limit")]
    pub stored_batches_limit: u32,
    /// Size of the thread pool storage operations run on.
    #[serde(default = "default_db_threads")]
    pub db_threads: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            datadir: default_datadir(),
            db_retry_count: DEFAULT_DB_RETRY_COUNT,
            stored_batches_limit: DEFAULT_STORED_BATCHES_LIMIT,
            db_threads: DEFAULT_DB_THREADS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchingConfig {
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    /// How many blocks to request at once from the chain.
    #[serde(default = "default_fetch_page_size")]
    pub fetch_page_size: u32,
    #[serde(default = "default_max_blobs_in_tx")]
    pub max_blobs_in_tx: usize,
}

impl FetchingConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

impl Default for FetchingConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            fetch_page_size: DEFAULT_FETCH_PAGE_SIZE,
            max_blobs_in_tx: DEFAULT_MAX_BLOBS_IN_TX,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_task_check_interval_ms")]
    pub task_check_interval_ms: u64,
    /// Running tasks older than this are handed out again.
    #[serde(default = "default_task_execution_timeout_ms")]
    pub task_execution_timeout_ms: u64,
}

impl SchedulerConfig {
    pub fn task_check_interval(&self) -> Duration {
        Duration::from_millis(self.task_check_interval_ms)
    }

    pub fn task_execution_timeout(&self) -> Duration {
        Duration::from_millis(self.task_execution_timeout_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_check_interval_ms: DEFAULT_TASK_CHECK_INTERVAL_MS,
            task_execution_timeout_ms: DEFAULT_TASK_EXECUTION_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetConfig {
    /// Pause kept after a successful reset before components resume.
    #[serde(default = "default_resume_delay_ms")]
    pub resume_delay_ms: u64,
    #[serde(default = "default_resume_timeout_ms")]
    pub resume_timeout_ms: u64,
    #[serde(default = "default_graceful_shutdown_timeout_ms")]
    pub graceful_shutdown_timeout_ms: u64,
}

impl ResetConfig {
    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }

    pub fn resume_timeout(&self) -> Duration {
        Duration::from_millis(self.resume_timeout_ms)
    }

    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_shutdown_timeout_ms)
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            resume_delay_ms: DEFAULT_RESUME_DELAY_MS,
            resume_timeout_ms: DEFAULT_RESUME_TIMEOUT_MS,
            graceful_shutdown_timeout_ms: DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposerConfig {
    #[serde(default = "default_proposing_interval_ms")]
    pub proposing_interval_ms: u64,
    /// Use a rollup contract stub instead of talking to L1.
    #[serde(default)]
    pub disable_l1: bool,
}

impl ProposerConfig {
    pub fn proposing_interval(&self) -> Duration {
        Duration::from_millis(self.proposing_interval_ms)
    }
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            proposing_interval_ms: DEFAULT_PROPOSING_INTERVAL_MS,
            disable_l1: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LagTrackerConfig {
    #[serde(default = "default_lag_tracker_interval_ms")]
    pub interval_ms: u64,
}

impl LagTrackerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for LagTrackerConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_LAG_TRACKER_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncCommitteeConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetching: FetchingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub reset: ResetConfig,
    #[serde(default)]
    pub proposer: ProposerConfig,
    #[serde(default)]
    pub lag_tracker: LagTrackerConfig,
}

impl SyncCommitteeConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

fn default_datadir() -> PathBuf {
    DEFAULT_DATADIR.into()
}

fn default_db_retry_count() -> u16 {
    DEFAULT_DB_RETRY_COUNT
}

fn default_db_threads() -> usize {
    DEFAULT_DB_THREADS
}

fn default_stored_batches_limit() -> u32 {
    DEFAULT_STORED_BATCHES_LIMIT
}

fn default_polling_interval_ms() -> u64 {
    DEFAULT_POLLING_INTERVAL_MS
}

fn default_fetch_page_size() -> u32 {
    DEFAULT_FETCH_PAGE_SIZE
}

fn default_max_blobs_in_tx() -> usize {
    DEFAULT_MAX_BLOBS_IN_TX
}

fn default_task_check_interval_ms() -> u64 {
    DEFAULT_TASK_CHECK_INTERVAL_MS
}

fn default_task_execution_timeout_ms() -> u64 {
    DEFAULT_TASK_EXECUTION_TIMEOUT_MS
}

fn default_resume_delay_ms() -> u64 {
    DEFAULT_RESUME_DELAY_MS
}

fn default_resume_timeout_ms() -> u64 {
    DEFAULT_RESUME_TIMEOUT_MS
}

fn default_graceful_shutdown_timeout_ms() -> u64 {
    DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_MS
}

fn default_proposing_interval_ms() -> u64 {
    DEFAULT_PROPOSING_INTERVAL_MS
}

fn default_lag_tracker_interval_ms() -> u64 {
    DEFAULT_LAG_TRACKER_INTERVAL_MS
}
