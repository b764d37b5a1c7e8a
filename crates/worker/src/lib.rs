mod arbiter;
pub mod config;
pub mod error;
mod install;
pub mod lease;
mod state;
mod store;
mod warmup;
mod worker;

pub use crate::config::EngineConfig;
pub use crate::store::{ASSETS, PAGES, REVISION_HEADER};
pub use crate::warmup::WarmOutcome;
pub use crate::worker::{SiteWorker, WorkerMessage};
