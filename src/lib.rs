pub mod api;
pub mod config;
pub mod core;
pub mod events;
pub mod executor;
pub mod lock;
pub mod queue;
pub mod scheduler;
pub mod storage;
pub mod worker;

pub use config::{PollerConfig, WorkerConfig, POLLER_LOCK_KEY, WORK_QUEUE};
pub use crate::core::job::{Job, JobStatus, Transition, TransitionError};
pub use crate::core::types::JobId;
pub use events::{Event, EventBus, EventHandler};
pub use executor::{ExecutionError, ExecutorRegistry, HttpExecutor, JobExecutor};
pub use lock::{DistributedLock, InMemoryLock, LockError};
pub use queue::{InMemoryQueue, QueueError, WorkQueue};
pub use scheduler::{Poller, PollerHandle};
pub use storage::{InMemoryStore, JobStore, SqliteStore, StorageError};
pub use worker::{WorkerPool, WorkerPoolHandle};

#[cfg(feature = "redis")]
pub use lock::RedisLock;
#[cfg(feature = "redis")]
pub use queue::RedisQueue;
