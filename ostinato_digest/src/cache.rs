// Bounded digest cache.
//
// Digest computation is expensive relative to a single craft pass, so
// results are shared across workers: a bounded map with oldest-write
// eviction, hard expiry after write, and refresh-ahead after a shorter
// interval so steady readers rarely stall on recomputation. Concurrent
// misses on one key share a single in-flight computation through a
// condvar flight slot; every waiter receives the one computed `Arc<V>`,
// and a failed computation propagates its error to every waiter without
// leaving an entry behind.
//
// Within the refresh window exactly one caller recomputes while the
// stale value keeps serving everyone else; if that recomputation fails,
// the stale value is served and the failure logged, since a still-valid
// entry beats an error. Lock poisoning surfaces as
// `DigestError::Poisoned` rather than unwinding a craft worker.

use crate::error::DigestError;
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Entries older than this are gone.
    pub expiry: Duration,
    /// Entries older than this are served while one caller recomputes.
    pub refresh_after: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_entries: 16,
            expiry: Duration::from_secs(300),
            refresh_after: Duration::from_secs(240),
        }
    }
}

struct CacheEntry<V> {
    value: Arc<V>,
    written: Instant,
    write_index: u64,
    refreshing: bool,
}

/// Shared slot for one in-flight computation. `done` stays `None` until
/// the computing thread publishes, then every waiter clones the result.
struct Flight<V> {
    done: Mutex<Option<Result<Arc<V>, DigestError>>>,
    arrived: Condvar,
}

impl<V> Flight<V> {
    fn new() -> Self {
        Flight {
            done: Mutex::new(None),
            arrived: Condvar::new(),
        }
    }
}

struct CacheState<V> {
    entries: BTreeMap<String, CacheEntry<V>>,
    flights: BTreeMap<String, Arc<Flight<V>>>,
    write_counter: u64,
}

pub struct DigestCache<V> {
    config: CacheConfig,
    state: Mutex<CacheState<V>>,
}

impl<V> DigestCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        DigestCache {
            config,
            state: Mutex::new(CacheState {
                entries: BTreeMap::new(),
                flights: BTreeMap::new(),
                write_counter: 0,
            }),
        }
    }

    /// Return the cached value for `key`, computing it at most once per
    /// miss across all threads.
    pub fn get_or_compute<F>(&self, key: &str, compute: F) -> Result<Arc<V>, DigestError>
    where
        F: FnOnce() -> Result<V, DigestError>,
    {
        let flight = {
            let mut state = self.state.lock().map_err(|_| DigestError::Poisoned)?;
            if let Some(entry) = state.entries.get_mut(key) {
                let age = entry.written.elapsed();
                if age < self.config.expiry {
                    if age >= self.config.refresh_after && !entry.refreshing {
                        entry.refreshing = true;
                        let stale = entry.value.clone();
                        drop(state);
                        return self.refresh(key, stale, compute);
                    }
                    return Ok(entry.value.clone());
                }
                state.entries.remove(key);
            }
            match state.flights.get(key) {
                Some(flight) => flight.clone(),
                None => {
                    let flight = Arc::new(Flight::new());
                    state.flights.insert(key.to_string(), flight.clone());
                    drop(state);
                    return self.fill(key, &flight, compute);
                }
            }
        };
        await_flight(&flight)
    }

    pub fn len(&self) -> Result<usize, DigestError> {
        let state = self.state.lock().map_err(|_| DigestError::Poisoned)?;
        Ok(state.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, DigestError> {
        Ok(self.len()? == 0)
    }

    /// Miss path: compute, publish to waiters, then store.
    fn fill<F>(
        &self,
        key: &str,
        flight: &Arc<Flight<V>>,
        compute: F,
    ) -> Result<Arc<V>, DigestError>
    where
        F: FnOnce() -> Result<V, DigestError>,
    {
        let result = compute().map(Arc::new);
        publish(flight, &result)?;
        let mut state = self.state.lock().map_err(|_| DigestError::Poisoned)?;
        state.flights.remove(key);
        if let Ok(value) = &result {
            self.store(&mut state, key, value.clone());
        }
        drop(state);
        result
    }

    /// Refresh-ahead path: this caller recomputes while the marked entry
    /// keeps serving other threads. Failure keeps the stale value.
    fn refresh<F>(&self, key: &str, stale: Arc<V>, compute: F) -> Result<Arc<V>, DigestError>
    where
        F: FnOnce() -> Result<V, DigestError>,
    {
        match compute() {
            Ok(value) => {
                let fresh = Arc::new(value);
                let mut state = self.state.lock().map_err(|_| DigestError::Poisoned)?;
                self.store(&mut state, key, fresh.clone());
                Ok(fresh)
            }
            Err(err) => {
                log::warn!("digest refresh for {key} failed ({err}), serving stale value");
                let mut state = self.state.lock().map_err(|_| DigestError::Poisoned)?;
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.refreshing = false;
                }
                Ok(stale)
            }
        }
    }

    fn store(&self, state: &mut CacheState<V>, key: &str, value: Arc<V>) {
        if !state.entries.contains_key(key) {
            while state.entries.len() >= self.config.max_entries.max(1) {
                let oldest = state
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.write_index)
                    .map(|(key, _)| key.clone());
                match oldest {
                    Some(key) => {
                        state.entries.remove(&key);
                    }
                    None => break,
                }
            }
        }
        state.write_counter += 1;
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                written: Instant::now(),
                write_index: state.write_counter,
                refreshing: false,
            },
        );
    }
}

fn await_flight<V>(flight: &Flight<V>) -> Result<Arc<V>, DigestError> {
    let mut done = flight.done.lock().map_err(|_| DigestError::Poisoned)?;
    loop {
        if let Some(result) = done.as_ref() {
            return result.clone();
        }
        done = flight
            .arrived
            .wait(done)
            .map_err(|_| DigestError::Poisoned)?;
    }
}

fn publish<V>(
    flight: &Flight<V>,
    result: &Result<Arc<V>, DigestError>,
) -> Result<(), DigestError> {
    let mut done = flight.done.lock().map_err(|_| DigestError::Poisoned)?;
    *done = Some(result.clone());
    flight.arrived.notify_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn config(max: usize, expiry_ms: u64, refresh_ms: u64) -> CacheConfig {
        CacheConfig {
            max_entries: max,
            expiry: Duration::from_millis(expiry_ms),
            refresh_after: Duration::from_millis(refresh_ms),
        }
    }

    #[test]
    fn concurrent_misses_share_one_computation() {
        let cache = DigestCache::new(CacheConfig::default());
        let calls = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let value = cache
                        .get_or_compute("k", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(42u32)
                        })
                        .unwrap();
                    assert_eq!(*value, 42);
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_computation_reaches_every_waiter_and_leaves_no_entry() {
        let cache: DigestCache<u32> = DigestCache::new(CacheConfig::default());
        let calls = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let result = cache.get_or_compute("bad", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Err(DigestError::UnparseableChord("?".into()))
                    });
                    assert!(result.is_err());
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().unwrap(), 0);

        let value = cache.get_or_compute("bad", || Ok(7)).unwrap();
        assert_eq!(*value, 7);
    }

    #[test]
    fn oldest_entry_is_evicted_at_capacity() {
        let cache = DigestCache::new(config(2, 10_000, 10_000));
        cache.get_or_compute("a", || Ok(1u32)).unwrap();
        cache.get_or_compute("b", || Ok(2)).unwrap();
        cache.get_or_compute("c", || Ok(3)).unwrap();
        assert_eq!(cache.len().unwrap(), 2);

        let recomputed = AtomicUsize::new(0);
        cache
            .get_or_compute("b", || {
                recomputed.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            })
            .unwrap();
        cache
            .get_or_compute("c", || {
                recomputed.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            })
            .unwrap();
        assert_eq!(recomputed.load(Ordering::SeqCst), 0);

        cache
            .get_or_compute("a", || {
                recomputed.fetch_add(1, Ordering::SeqCst);
                Ok(9)
            })
            .unwrap();
        assert_eq!(recomputed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn entries_expire_after_the_configured_interval() {
        let cache = DigestCache::new(config(4, 30, 30));
        let calls = AtomicUsize::new(0);
        let get = || {
            cache
                .get_or_compute("k", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(5u32)
                })
                .unwrap()
        };
        get();
        get();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        thread::sleep(Duration::from_millis(60));
        get();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn refresh_ahead_recomputes_before_expiry() {
        let cache = DigestCache::new(config(4, 10_000, 30));
        cache.get_or_compute("k", || Ok(1u32)).unwrap();
        thread::sleep(Duration::from_millis(60));
        let fresh = cache.get_or_compute("k", || Ok(2)).unwrap();
        assert_eq!(*fresh, 2);
        // The rewritten entry is young again.
        let hit = cache.get_or_compute("k", || Ok(3)).unwrap();
        assert_eq!(*hit, 2);
    }

    #[test]
    fn failed_refresh_serves_the_stale_value() {
        let cache = DigestCache::new(config(4, 10_000, 30));
        cache.get_or_compute("k", || Ok(1u32)).unwrap();
        thread::sleep(Duration::from_millis(60));
        let stale = cache
            .get_or_compute("k", || Err(DigestError::UnparseableChord("?".into())))
            .unwrap();
        assert_eq!(*stale, 1);
        // write time was not touched, so the next call retries the
        // refresh and succeeds.
        let fresh = cache.get_or_compute("k", || Ok(2)).unwrap();
        assert_eq!(*fresh, 2);
    }
}
