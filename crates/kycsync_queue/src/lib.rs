pub mod backoff;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
mod store;
pub mod worker;

pub use backoff::backoff_delay;
pub use clock::{Clock, FixedClock, IdGenerator, SequentialIds, SystemClock, UuidV7Ids};
pub use config::QueueConfig;
pub use error::SyncError;
pub use events::SyncEvent;
pub use manager::{Collaborators, SyncQueueManager};
pub use worker::{FlushTrigger, FlushWorker};
