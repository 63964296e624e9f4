//! Wiring of the coordinator components into one service.

use std::{sync::Arc, time::Duration};

use synccommittee_common::clock::{Clock, SystemClock};
use synccommittee_db::traits::{BatchDatabase, TaskDatabase};
use synccommittee_rocksdb::{open_rocksdb_database, BatchDb, DbOpsConfig, TaskDb};
use synccommittee_storage::{
    ops::{batch, task},
    ops_pool, BatchDbOps, TaskDbOps,
};
use synccommittee_tasks::{PanickedTaskError, TaskExecutor, TaskManager};
use tracing::*;

use crate::{
    aggregator::{Aggregator, AGGREGATOR_NAME},
    config::SyncCommitteeConfig,
    fetch::BlockFetcher,
    handler::TaskOutcomeHandler,
    l1::{NoopRollupContract, RollupContract},
    lag_tracker::LagTracker,
    proposer::{Proposer, PROPOSER_NAME},
    reset::{StateResetLauncher, StateResetter},
    scheduler::TaskScheduler,
    worker::{PausableComponent, SuspendableWorker},
};

/// Storage handles the service runs on.
#[derive(Clone)]
pub struct ServiceDatabases {
    pub batch_db: Arc<dyn BatchDatabase>,
    pub task_db: Arc<dyn TaskDatabase>,
}

impl ServiceDatabases {
    /// Opens the RocksDB store under the configured data directory.
    pub fn open(config: &SyncCommitteeConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let storage = &config.storage;
        let db = open_rocksdb_database(&storage.datadir)?;
        let ops = DbOpsConfig::new(storage.db_retry_count);

        Ok(Self {
            batch_db: Arc::new(BatchDb::new(
                db.clone(),
                ops,
                storage.stored_batches_limit,
                clock.clone(),
            )),
            task_db: Arc::new(TaskDb::new(db, ops, clock)),
        })
    }

    /// Async handles over both stores, sharing one pool of `num_threads`.
    pub fn into_ops(self, num_threads: usize) -> (Arc<BatchDbOps>, Arc<TaskDbOps>) {
        let pool = ops_pool(num_threads);
        let batch_ops = batch::Context::new(self.batch_db).into_ops(pool.clone());
        let task_ops = task::Context::new(self.task_db).into_ops(pool);
        (Arc::new(batch_ops), Arc::new(task_ops))
    }
}

pub struct SyncCommitteeService {
    aggregator: Arc<Aggregator>,
    proposer: Arc<Proposer>,
    scheduler: Arc<TaskScheduler>,
    lag_tracker: Arc<LagTracker>,
    reset_launcher: Arc<StateResetLauncher>,
    shutdown_timeout: Duration,
}

impl SyncCommitteeService {
    pub fn new(
        config: &SyncCommitteeConfig,
        dbs: ServiceDatabases,
        fetcher: Arc<dyn BlockFetcher>,
        rollup: Arc<dyn RollupContract>,
        executor: TaskExecutor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rollup: Arc<dyn RollupContract> = if config.proposer.disable_l1 {
            warn!("L1 interaction is disabled");
            Arc::new(NoopRollupContract)
        } else {
            rollup
        };
        let (batch_ops, task_ops) = dbs.into_ops(config.storage.db_threads);

        let aggregator_worker = Arc::new(SuspendableWorker::new(
            AGGREGATOR_NAME,
            config.fetching.polling_interval(),
        ));
        let proposer_worker = Arc::new(SuspendableWorker::new(
            PROPOSER_NAME,
            config.proposer.proposing_interval(),
        ));

        let resetter = StateResetter::new(
            batch_ops.clone(),
            task_ops.clone(),
            rollup.clone(),
            fetcher.clone(),
        );
        let components = vec![
            aggregator_worker.clone() as Arc<dyn PausableComponent>,
            proposer_worker.clone() as Arc<dyn PausableComponent>,
        ];
        let reset_launcher = Arc::new(StateResetLauncher::new(
            resetter,
            components,
            executor,
            config.reset.clone(),
        ));

        let aggregator = Arc::new(Aggregator::new(
            fetcher.clone(),
            batch_ops.clone(),
            task_ops.clone(),
            rollup.clone(),
            reset_launcher.clone(),
            aggregator_worker,
            clock,
            &config.fetching,
        ));
        let proposer = Arc::new(Proposer::new(
            batch_ops.clone(),
            fetcher.clone(),
            rollup,
            proposer_worker,
        ));

        let handler = Arc::new(TaskOutcomeHandler::new(
            batch_ops.clone(),
            reset_launcher.clone(),
        ));
        let scheduler = Arc::new(TaskScheduler::new(
            task_ops,
            handler,
            config.scheduler.clone(),
        ));
        let lag_tracker = Arc::new(LagTracker::new(
            fetcher,
            batch_ops,
            config.lag_tracker.clone(),
        ));

        Self {
            aggregator,
            proposer,
            scheduler,
            lag_tracker,
            reset_launcher,
            shutdown_timeout: config.reset.graceful_shutdown_timeout(),
        }
    }

    /// Opens the store from `config` and builds the service on top of it.
    pub fn open(
        config: &SyncCommitteeConfig,
        fetcher: Arc<dyn BlockFetcher>,
        rollup: Arc<dyn RollupContract>,
        executor: TaskExecutor,
    ) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let dbs = ServiceDatabases::open(config, clock.clone())?;
        Ok(Self::new(config, dbs, fetcher, rollup, executor, clock))
    }

    /// API handed to proof executors.
    pub fn scheduler(&self) -> Arc<TaskScheduler> {
        self.scheduler.clone()
    }

    pub fn aggregator(&self) -> Arc<Aggregator> {
        self.aggregator.clone()
    }

    pub fn proposer(&self) -> Arc<Proposer> {
        self.proposer.clone()
    }

    pub fn reset_launcher(&self) -> Arc<StateResetLauncher> {
        self.reset_launcher.clone()
    }

    /// Starts every background component on `executor`. They stop on its
    /// shutdown signal.
    pub fn spawn(&self, executor: &TaskExecutor) {
        let aggregator = self.aggregator.clone();
        executor.spawn_critical_async_with_shutdown(AGGREGATOR_NAME, |shutdown| async move {
            aggregator.run(&shutdown).await;
        });

        let proposer = self.proposer.clone();
        executor.spawn_critical_async_with_shutdown(PROPOSER_NAME, |shutdown| async move {
            proposer.run(&shutdown).await;
        });

        let scheduler = self.scheduler.clone();
        executor.spawn_critical_async_with_shutdown("task-scheduler", |shutdown| async move {
            scheduler.run(&shutdown).await;
        });

        let lag_tracker = self.lag_tracker.clone();
        executor.spawn_critical_async_with_shutdown("lag-tracker", |shutdown| async move {
            lag_tracker.run(&shutdown).await;
        });

        info!("sync committee service started");
    }

    /// Spawns the components on `manager` and blocks until one of them panics
    /// or shutdown is requested. Must be called outside the manager's runtime.
    pub fn run(&self, manager: TaskManager) -> Result<(), PanickedTaskError> {
        self.spawn(&manager.executor());
        let res = manager.monitor(Some(self.shutdown_timeout));
        info!("sync committee service stopped");
        res
    }
}
