// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! TTL-gated memoization of expensive metric computations.
//!
//! The two caches use different lock disciplines:
//! - [`SingleValueCache`] holds its lock while the compute future runs. Concurrent misses queue
//!   behind the in-flight computation and then read the entry it stored, so the wrapped
//!   computation runs once per TTL window.
//! - [`KeyedCache`] releases its lock while computing so that a slow key never blocks an
//!   unrelated one. Concurrent misses on the same key each compute; the newest result wins.
//!
//! A failing computation never corrupts a cache: the previous entry is served as degraded
//! service, and only when there is none does the caller get [`CacheError::Unavailable`].

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::CacheError;

const SINGLE_VALUE_KEY: &str = "value";

/// A computed value and the instant it was computed at. Entries are replaced wholesale, never
/// mutated in place, so readers always see a value together with its own timestamp.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub computed_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, computed_at: Instant) -> Self {
        Self { value, computed_at }
    }

    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.computed_at) < ttl
    }
}

/// Memoizes a single value for a TTL.
#[derive(Debug)]
pub struct SingleValueCache<T> {
    entry: tokio::sync::Mutex<Option<CacheEntry<T>>>,
    ttl: Duration,
}

impl<T: Clone> SingleValueCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: tokio::sync::Mutex::new(None),
            ttl,
        }
    }

    /// Returns the cached value if it is younger than the effective TTL (`ttl` if given, the
    /// cache default otherwise), or runs `compute` and stores its result.
    pub async fn get_or_compute<F, Fut>(&self, compute: F, ttl: Option<Duration>) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut entry = self.entry.lock().await;
        let now = Instant::now();
        if let Some(cached) = fresh_value(entry.as_ref(), now, ttl.unwrap_or(self.ttl)) {
            return cached;
        }

        let value = compute().await;
        *entry = Some(CacheEntry::new(value.clone(), now));
        value
    }

    /// Like [`SingleValueCache::get_or_compute`] for computations that can fail. On failure the
    /// stale entry, if any, is returned and left untouched.
    pub async fn try_get_or_compute<F, Fut, E>(
        &self,
        compute: F,
        ttl: Option<Duration>,
    ) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut entry = self.entry.lock().await;
        let now = Instant::now();
        if let Some(cached) = fresh_value(entry.as_ref(), now, ttl.unwrap_or(self.ttl)) {
            return Ok(cached);
        }

        match compute().await {
            Ok(value) => {
                *entry = Some(CacheEntry::new(value.clone(), now));
                Ok(value)
            }
            Err(err) => degrade(SINGLE_VALUE_KEY, entry.as_ref(), err),
        }
    }

    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }
}

/// Memoizes values by name. Every key shares the cache's lock and clock but may be looked up
/// with its own TTL.
#[derive(Debug)]
pub struct KeyedCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    default_ttl: Duration,
}

impl<T: Clone> KeyedCache<T> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F, ttl: Option<Duration>) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let now = Instant::now();
        if let Some(cached) = self.fresh(key, now, ttl) {
            return cached;
        }

        let value = compute().await;
        self.store(key, value.clone(), now);
        value
    }

    pub async fn try_get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        compute: F,
        ttl: Option<Duration>,
    ) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let now = Instant::now();
        if let Some(cached) = self.fresh(key, now, ttl) {
            return Ok(cached);
        }

        match compute().await {
            Ok(value) => {
                self.store(key, value.clone(), now);
                Ok(value)
            }
            Err(err) => degrade(key, self.lock().get(key), err),
        }
    }

    /// Drops `key`, or every entry when `key` is `None`.
    pub fn invalidate(&self, key: Option<&str>) {
        let mut entries = self.lock();
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
    }

    fn fresh(&self, key: &str, now: Instant, ttl: Option<Duration>) -> Option<T> {
        fresh_value(
            self.lock().get(key),
            now,
            ttl.unwrap_or(self.default_ttl),
        )
    }

    fn store(&self, key: &str, value: T, computed_at: Instant) {
        let mut entries = self.lock();
        // a slower, older computation must not replace a newer one
        if entries
            .get(key)
            .is_some_and(|existing| existing.computed_at > computed_at)
        {
            debug!("Discarding superseded computation for {key}");
            return;
        }
        entries.insert(key.to_string(), CacheEntry::new(value, computed_at));
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn fresh_value<T: Clone>(entry: Option<&CacheEntry<T>>, now: Instant, ttl: Duration) -> Option<T> {
    entry
        .filter(|entry| entry.is_fresh(now, ttl))
        .map(|entry| entry.value.clone())
}

fn degrade<T: Clone, E: Display>(
    key: &str,
    stale: Option<&CacheEntry<T>>,
    err: E,
) -> Result<T, CacheError> {
    match stale {
        Some(entry) => {
            warn!("Recomputing {key} failed, serving stale value: {err}");
            Ok(entry.value.clone())
        }
        None => {
            warn!("Recomputing {key} failed with nothing cached: {err}");
            Err(CacheError::Unavailable {
                key: key.to_string(),
                reason: err.to_string(),
            })
        }
    }
}
