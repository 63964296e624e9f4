//! Shared setup for the end-to-end tests: a full coordinator service on a
//! temporary RocksDB, fed by an in-memory chain and rollup contract.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use synccommittee_common::{
    clock::{Clock, ManualClock},
    logging::{self, LoggerConfig},
};
use synccommittee_coordinator::{
    config::SyncCommitteeConfig,
    service::{ServiceDatabases, SyncCommitteeService},
    test_utils::{InMemoryRollup, TestChainFetcher},
};
use synccommittee_primitives::{
    ids::{BatchId, ExecutorId},
    task::{Task, TaskResult},
};
use synccommittee_rocksdb::{test_utils::get_rocksdb_tmp_instance, BatchDb, TaskDb};
use synccommittee_tasks::TaskManager;
use synccommittee_test_utils::chain::TestChain;
use tokio::runtime::Handle;

pub(crate) const EXECUTOR: ExecutorId = ExecutorId::new(1);

pub(crate) struct TestEnv {
    pub(crate) chain: TestChainFetcher,
    pub(crate) rollup: InMemoryRollup,
    pub(crate) batch_db: Arc<BatchDb>,
    pub(crate) task_db: Arc<TaskDb>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) service: SyncCommitteeService,
    // keeps the executor's channels alive
    pub(crate) manager: TaskManager,
}

impl TestEnv {
    pub(crate) fn new(child_shards: u32, config: SyncCommitteeConfig) -> Self {
        let _ = logging::init(LoggerConfig::with_base_name("sync-committee-tests"));

        let (db, ops) = get_rocksdb_tmp_instance().expect("temporary database");
        let clock = Arc::new(ManualClock::new(1_000));
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let batch_db = Arc::new(BatchDb::new(
            db.clone(),
            ops,
            config.storage.stored_batches_limit,
            dyn_clock.clone(),
        ));
        let task_db = Arc::new(TaskDb::new(db, ops, dyn_clock.clone()));
        let dbs = ServiceDatabases {
            batch_db: batch_db.clone(),
            task_db: task_db.clone(),
        };

        let chain = TestChainFetcher::new(TestChain::new(child_shards));
        let rollup = InMemoryRollup::new();
        let manager = TaskManager::new(Handle::current());

        let service = SyncCommitteeService::new(
            &config,
            dbs,
            Arc::new(chain.clone()),
            Arc::new(rollup.clone()),
            manager.executor(),
            dyn_clock,
        );

        Self {
            chain,
            rollup,
            batch_db,
            task_db,
            clock,
            service,
            manager,
        }
    }

    /// Config with short reset delays so suspended components come back
    /// within a test.
    pub(crate) fn fast_config() -> SyncCommitteeConfig {
        let mut config = SyncCommitteeConfig::default();
        config.reset.resume_delay_ms = 20;
        config.reset.resume_timeout_ms = 1_000;
        config
    }

    /// Grows every shard and produces `n` main shard blocks.
    pub(crate) fn produce_main_blocks(&self, n: usize, blocks_per_shard: usize) {
        self.chain.with_chain(|c| {
            for _ in 0..n {
                c.next_segments(blocks_per_shard);
            }
        });
    }

    pub(crate) async fn aggregate(&self) {
        self.service.aggregator().run_iteration().await;
    }

    pub(crate) async fn propose(&self) {
        self.service.proposer().run_iteration().await;
    }

    pub(crate) async fn take_task(&self) -> Option<Task> {
        self.service
            .scheduler()
            .get_task(EXECUTOR)
            .await
            .expect("task request")
    }

    /// Takes every available task and reports it as proved.
    pub(crate) async fn prove_all(&self) -> Vec<BatchId> {
        let scheduler = self.service.scheduler();
        let mut proved = Vec::new();
        while let Some(task) = self.take_task().await {
            let result = TaskResult::success(task.id, EXECUTOR, Default::default(), Vec::new());
            scheduler
                .set_task_result(result)
                .await
                .expect("task result accepted");
            proved.push(task.batch_id);
        }
        proved
    }

    pub(crate) fn shutdown(self) {
        self.manager.shutdown_signal().send();
    }
}

/// Polls `cond` until it holds or a few seconds pass.
pub(crate) async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}
