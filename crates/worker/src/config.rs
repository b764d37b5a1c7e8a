//! Engine configuration.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables baked into the worker at build time.
///
/// The site build patches `manifest_url` and `build_hash` into the deployed
/// worker; everything else ships with defaults. Hosts embedding the engine
/// outside a browser can override any field through `STASH_`-prefixed
/// environment variables via [`EngineConfig::from_env`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Absolute URL of the manifest document published by the build.
    pub manifest_url: String,
    /// Hash of the manifest generation this worker was built against.
    pub build_hash: String,
    /// Warm-up lease time-to-live, in seconds.
    pub lease_ttl_secs: u64,
    /// Ceiling on each navigation network attempt, in seconds.
    pub nav_timeout_secs: u64,
    /// Delay between queue worker startups, in milliseconds.
    pub stagger_ms: u64,
    /// Site-relative path of the dedicated not-found page.
    pub not_found_path: String,
    /// Prefix for every key the engine writes to the KV store.
    pub key_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manifest_url: String::new(),
            build_hash: String::from("dev"),
            lease_ttl_secs: 30,
            nav_timeout_secs: 8,
            stagger_ms: 3,
            not_found_path: String::from("/404.html"),
            key_prefix: String::from("stash"),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `STASH_`-prefixed environment variables.
    pub fn from_env() -> Result<Self> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("STASH_"))
            .extract()
            .or_raise(|| ErrorKind::Config)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn nav_timeout(&self) -> Duration {
        Duration::from_secs(self.nav_timeout_secs)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }
}
