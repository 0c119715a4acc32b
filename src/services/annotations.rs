//! Declarative method annotations
//!
//! A producer declares a static table of `(method, annotation)` pairs, e.g.
//! `("fetch_wait_times", "@cache|5")`. The table is parsed once when the
//! destination is constructed and never changes afterwards. Calls routed
//! through `Annotations::invoke` pick up the declared behaviour.
//!
//! Annotation grammar: `@<command>[|<arg>...]`. Supported commands:
//! - `cache|<minutes>` - memoize the result per method + arguments

use crate::error::SyncError;
use crate::io::cache::{self, Cache};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Cross-cutting behaviour attached to a method
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    /// Memoize results in the destination cache for `ttl`
    Cache { ttl: Duration },
}

impl Behavior {
    /// Parse one annotation. Unknown commands and malformed arguments yield `None`.
    pub fn parse(annotation: &str) -> Option<Self> {
        let body = annotation.trim().strip_prefix('@')?;
        let mut parts = body.split('|').map(str::trim);
        let command = parts.next()?;
        let args: Vec<&str> = parts.collect();

        match command {
            "cache" => {
                let minutes: f64 = args.first()?.parse().ok()?;
                if !minutes.is_finite() || minutes <= 0.0 {
                    return None;
                }
                // A zero TTL would mean "never expires" to the cache
                let ttl = Duration::try_from_secs_f64(minutes * 60.0)
                    .ok()
                    .filter(|ttl| !ttl.is_zero())?;
                Some(Behavior::Cache { ttl })
            }
            _ => None,
        }
    }
}

/// Cache key for a memoized call: the method name, followed by the
/// JSON-encoded argument list when there are arguments
pub fn cache_key(method: &str, args: &[Value]) -> Result<String, serde_json::Error> {
    if args.is_empty() {
        return Ok(method.to_string());
    }
    Ok(format!("{method}{}", serde_json::to_string(args)?))
}

/// Immutable method → behaviour bindings for one destination
#[derive(Debug, Default)]
pub struct Annotations {
    bindings: FxHashMap<String, Behavior>,
}

impl Annotations {
    /// Build bindings from a declaration table.
    ///
    /// Only the first annotation for each method is considered; if that one
    /// is unknown or malformed the method stays unwrapped.
    pub fn from_table(table: &[(&str, &str)]) -> Self {
        let mut seen = FxHashSet::default();
        let mut bindings = FxHashMap::default();

        for (method, annotation) in table {
            if !seen.insert(*method) {
                continue;
            }
            match Behavior::parse(annotation) {
                Some(behavior) => {
                    debug!(method = %method, annotation = %annotation, "annotation_bound");
                    bindings.insert(method.to_string(), behavior);
                }
                None => warn!(method = %method, annotation = %annotation, "annotation_ignored"),
            }
        }

        Self { bindings }
    }

    pub fn behavior(&self, method: &str) -> Option<&Behavior> {
        self.bindings.get(method)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Call `f` with whatever behaviour `method` is annotated with
    pub async fn invoke<T, F, Fut>(
        &self,
        cache: &dyn Cache,
        method: &str,
        args: &[Value],
        f: F,
    ) -> Result<T, SyncError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        match self.bindings.get(method) {
            Some(Behavior::Cache { ttl }) => {
                let key = cache_key(method, args)?;
                cache::wrap(cache, &key, *ttl, f).await
            }
            None => f().await,
        }
    }
}
