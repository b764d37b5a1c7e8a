pub mod cache;
pub mod error;
pub mod fetch;
pub mod kv;
mod models;

pub use crate::cache::ContentCache;
pub use crate::fetch::Fetcher;
pub use crate::kv::KvStore;
pub use crate::models::{Request, RequestMode, Response};
use std::sync::Arc;

pub type FetcherHandle = Arc<dyn Fetcher + Send + Sync>;
pub type KvHandle = Arc<dyn KvStore + Send + Sync>;
pub type CacheHandle = Arc<dyn ContentCache + Send + Sync>;
