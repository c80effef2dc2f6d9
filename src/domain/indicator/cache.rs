//! Incremental cache for the cumulative indicators (sma, ema, rma, rsi, atr).
//!
//! Each call-site owns one [`CacheHandle`]. An entry remembers the indicator
//! identity, how many inputs it has consumed and the streaming state after
//! the last one. When the next call sees exactly one more input with the
//! same identity, only the newest input is fed (warm path). Anything else
//! replays the whole input from a fresh state (cold path), so a stale entry
//! can never leak into a result.

use std::collections::HashMap;

use tracing::trace;

use crate::domain::indicator::IndicatorKind;
use crate::domain::indicator::Incremental;
use crate::domain::indicator::atr::AtrState;
use crate::domain::indicator::ema::Recurrence;
use crate::domain::indicator::rsi::RsiState;
use crate::domain::indicator::sma::SmaState;

/// Cache identity of one indicator call-site, assigned at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheHandle(pub u32);

#[derive(Debug, Clone)]
pub enum CachedState {
    Sma(SmaState),
    Recurrence(Recurrence),
    Rsi(RsiState),
    Atr(AtrState),
}

/// Streaming states that can live in the cache.
pub trait CacheState: Incremental + Sized {
    fn wrap(self) -> CachedState;
    fn unwrap_mut(state: &mut CachedState) -> Option<&mut Self>;
}

macro_rules! cache_state {
    ($ty:ty, $variant:ident) => {
        impl CacheState for $ty {
            fn wrap(self) -> CachedState {
                CachedState::$variant(self)
            }

            fn unwrap_mut(state: &mut CachedState) -> Option<&mut Self> {
                match state {
                    CachedState::$variant(s) => Some(s),
                    _ => None,
                }
            }
        }
    };
}

cache_state!(SmaState, Sma);
cache_state!(Recurrence, Recurrence);
cache_state!(RsiState, Rsi);
cache_state!(AtrState, Atr);

#[derive(Debug, Clone)]
struct CacheEntry {
    kind: IndicatorKind,
    processed: usize,
    results: Vec<f64>,
    state: CachedState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub warm_hits: u64,
    /// Full recomputes over an existing entry. First-time fills are not counted.
    pub cold_recomputes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct IndicatorCache {
    entries: HashMap<CacheHandle, CacheEntry>,
    stats: CacheStats,
}

impl IndicatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every result produced so far for `handle`, oldest first.
    pub fn results(&self, handle: CacheHandle) -> Option<&[f64]> {
        self.entries.get(&handle).map(|e| e.results.as_slice())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Result at the newest of `len` inputs. `input_at(i)` reads input `i`
    /// in chronological order; the warm path only reads `len - 1`.
    pub fn evaluate<S: CacheState>(
        &mut self,
        handle: CacheHandle,
        kind: IndicatorKind,
        len: usize,
        input_at: impl Fn(usize) -> S::Input,
        init: impl FnOnce() -> S,
    ) -> f64 {
        if len == 0 {
            return f64::NAN;
        }

        if let Some(entry) = self.entries.get_mut(&handle) {
            if entry.kind == kind && entry.processed + 1 == len {
                if let Some(state) = S::unwrap_mut(&mut entry.state) {
                    let value = state.next(input_at(len - 1));
                    entry.results.push(value);
                    entry.processed = len;
                    self.stats.warm_hits += 1;
                    return value;
                }
            }
            trace!(
                handle = handle.0,
                %kind,
                cached_kind = %entry.kind,
                processed = entry.processed,
                len,
                "cache entry out of step, recomputing"
            );
            self.stats.cold_recomputes += 1;
        }

        let mut state = init();
        let results: Vec<f64> = (0..len).map(|i| state.next(input_at(i))).collect();
        let value = results.last().copied().unwrap_or(f64::NAN);
        self.entries.insert(
            handle,
            CacheEntry {
                kind,
                processed: len,
                results,
                state: state.wrap(),
            },
        );
        value
    }
}
