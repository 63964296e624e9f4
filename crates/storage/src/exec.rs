//! DB operation executor logic.
//!
//! This manages the indirection to spawn async requests onto a threadpool and execute blocking
//! calls locally.

use synccommittee_db::{DbError, DbResult};
use threadpool::ThreadPool;
use tokio::sync::oneshot;
use tracing::*;

/// Builds the pool store operations are executed on.
pub fn ops_pool(num_threads: usize) -> ThreadPool {
    threadpool::Builder::new()
        .num_threads(num_threads.max(1))
        .thread_name("synccommittee-db".to_owned())
        .build()
}

/// Executes `op` on the provided thread pool and returns the result over.
pub(crate) async fn exec_async<R, F>(pool: &ThreadPool, op: F) -> DbResult<R>
where
    F: FnOnce() -> DbResult<R> + Send + 'static,
    R: Send + 'static,
{
    let (resp_tx, resp_rx) = oneshot::channel();

    pool.execute(move || {
        let res = op();
        if resp_tx.send(res).is_err() {
            warn!("failed to send response");
        }
    });

    match resp_rx.await {
        Ok(v) => v,
        // the op panicked and took the sender down with it
        Err(e) => Err(DbError::Other(format!("db worker failed: {e}"))),
    }
}

/// Generates an ops handle over a context, with an `_async` and a `_blocking`
/// variant of every listed operation. Each operation must have a matching free
/// function taking the context as its first argument.
macro_rules! inst_ops {
    {
        ($base:ident, $ctx:ty) {
            $($iname:ident($($aname:ident: $aty:ty),*) => $ret:ty;)*
        }
    } => {
        #[derive(Clone)]
        pub struct $base {
            pool: threadpool::ThreadPool,
            ctx: std::sync::Arc<$ctx>,
        }

        impl std::fmt::Debug for $base {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($base))
                    .field("pool_threads", &self.pool.max_count())
                    .finish()
            }
        }

        paste::paste! {
            impl $base {
                pub fn new(pool: threadpool::ThreadPool, ctx: std::sync::Arc<$ctx>) -> Self {
                    Self { pool, ctx }
                }

                $(
                    pub async fn [<$iname _async>](&self, $($aname: $aty),*) -> DbResult<$ret> {
                        let ctx = self.ctx.clone();
                        $crate::exec::exec_async(&self.pool, move || $iname(&ctx, $($aname),*)).await
                    }

                    pub fn [<$iname _blocking>](&self, $($aname: $aty),*) -> DbResult<$ret> {
                        $iname(&self.ctx, $($aname),*)
                    }
                )*
            }
        }
    }
}

pub(crate) use inst_ops;
