//! Shared mutable run state handed to the step function on every bar.

use std::sync::Arc;

use crate::domain::indicator::cache::IndicatorCache;
use crate::domain::market_data::{BarViews, MarketData};
use crate::domain::outputs::{Core, Outputs};
use crate::domain::run_result::RunResult;
use crate::domain::series::{Series, SeriesView};
use crate::domain::ta::Ta;

pub const DEFAULT_PRECISION: u32 = 10;

/// Rounds indicator results to a fixed number of decimals. NaN passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision(pub u32);

impl Default for Precision {
    fn default() -> Self {
        Self(DEFAULT_PRECISION)
    }
}

impl Precision {
    pub fn apply(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return value;
        }
        let scale = 10f64.powi(self.0 as i32);
        let rounded = (value * scale).round() / scale;
        if rounded.is_finite() { rounded } else { value }
    }
}

/// Largest lookback requested by any indicator call. Calls feed the per-bar
/// accumulator; the engine folds it into `max_period` once per bar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warmup {
    pending: usize,
    max_period: Option<usize>,
}

impl Warmup {
    pub fn observe(&mut self, lookback: usize) {
        self.pending = self.pending.max(lookback);
    }

    pub fn merge(&mut self) {
        if self.pending > 0 {
            self.max_period = Some(self.max_period.unwrap_or(0).max(self.pending));
        }
        self.pending = 0;
    }

    pub fn max_period(&self) -> Option<usize> {
        self.max_period
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Const,
    Var,
    Let,
    Params,
}

/// Slot of a persistent series inside one store, assigned by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

#[derive(Debug, Clone, Default)]
pub struct VarStore {
    slots: Vec<Series>,
}

impl VarStore {
    pub fn get(&self, id: VarId) -> Option<&Series> {
        self.slots.get(id.0 as usize)
    }

    /// Series for `id`, created empty on first access.
    pub fn get_mut(&mut self, id: VarId) -> &mut Series {
        let i = id.0 as usize;
        if i >= self.slots.len() {
            self.slots.resize_with(i + 1, Series::new);
        }
        &mut self.slots[i]
    }

    pub fn view(&self, id: VarId) -> SeriesView<'_> {
        self.get(id)
            .map(Series::full_view)
            .unwrap_or_else(|| SeriesView::from_chronological(&[]))
    }

    pub fn set(&mut self, id: VarId, value: f64) {
        self.get_mut(id).set_current(value);
    }

    /// Carries every written series one bar forward.
    pub fn shift(&mut self) {
        for series in &mut self.slots {
            series.shift();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Stores {
    pub consts: VarStore,
    pub vars: VarStore,
    pub lets: VarStore,
    pub params: VarStore,
}

impl Stores {
    pub fn get(&self, kind: StoreKind) -> &VarStore {
        match kind {
            StoreKind::Const => &self.consts,
            StoreKind::Var => &self.vars,
            StoreKind::Let => &self.lets,
            StoreKind::Params => &self.params,
        }
    }

    pub fn get_mut(&mut self, kind: StoreKind) -> &mut VarStore {
        match kind {
            StoreKind::Const => &mut self.consts,
            StoreKind::Var => &mut self.vars,
            StoreKind::Let => &mut self.lets,
            StoreKind::Params => &mut self.params,
        }
    }

    pub fn shift_all(&mut self) {
        self.consts.shift();
        self.vars.shift();
        self.lets.shift();
        self.params.shift();
    }
}

/// Run state. Created once per run and returned to the caller.
#[derive(Debug, Clone)]
pub struct Context {
    /// Absolute index of the bar being evaluated (0 = oldest loaded bar).
    pub idx: usize,
    pub data: BarViews,
    pub result: RunResult,
    pub stores: Stores,
    pub cache: IndicatorCache,
    pub warmup: Warmup,
    pub precision: Precision,
    pub use_cache: bool,
    pub outputs: Outputs,
}

impl Context {
    pub fn new(market: Arc<MarketData>) -> Self {
        Self {
            idx: 0,
            data: BarViews::new(market, 0),
            result: RunResult::default(),
            stores: Stores::default(),
            cache: IndicatorCache::new(),
            warmup: Warmup::default(),
            precision: Precision::default(),
            use_cache: true,
            outputs: Outputs::default(),
        }
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Points the context at absolute bar `idx`.
    pub fn set_bar(&mut self, idx: usize) {
        self.idx = idx;
        self.data = BarViews::new(Arc::clone(self.data.market()), idx);
    }

    /// Moves the context onto new market data, keeping all run state.
    pub fn set_market(&mut self, market: Arc<MarketData>) {
        self.data = BarViews::new(market, self.idx);
    }

    pub fn max_period(&self) -> Option<usize> {
        self.warmup.max_period()
    }

    pub fn ta(&mut self) -> Ta<'_> {
        Ta::new(
            &mut self.cache,
            &mut self.warmup,
            self.data.clone(),
            self.precision,
            self.use_cache,
        )
    }

    pub fn core(&mut self) -> Core<'_> {
        Core::new(&mut self.outputs, self.data.current_time())
    }

    /// Stores and the indicator facade borrowed side by side.
    pub fn split(&mut self) -> (&mut Stores, Ta<'_>) {
        let ta = Ta::new(
            &mut self.cache,
            &mut self.warmup,
            self.data.clone(),
            self.precision,
            self.use_cache,
        );
        (&mut self.stores, ta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_rounds_and_passes_nan() {
        let p = Precision(2);
        assert_eq!(p.apply(1.23456), 1.23);
        assert_eq!(p.apply(-1.235001), -1.24);
        assert!(p.apply(f64::NAN).is_nan());
        assert_eq!(Precision(10).apply(1e300), 1e300);
    }

    #[test]
    fn warmup_merges_per_bar() {
        let mut w = Warmup::default();
        assert_eq!(w.max_period(), None);
        w.observe(14);
        w.observe(20);
        assert_eq!(w.max_period(), None);
        w.merge();
        assert_eq!(w.max_period(), Some(20));
        w.observe(5);
        w.merge();
        assert_eq!(w.max_period(), Some(20));
    }

    #[test]
    fn shift_skips_unwritten_slots() {
        let mut store = VarStore::default();
        store.set(VarId(2), 7.0);
        store.shift();
        assert!(store.get(VarId(0)).unwrap().is_empty());
        let s = store.get(VarId(2)).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.get(1), Some(7.0));
    }

    #[test]
    fn value_written_is_visible_one_bar_later() {
        let mut stores = Stores::default();
        stores.vars.set(VarId(0), 1.0);
        stores.shift_all();
        stores.vars.set(VarId(0), 2.0);
        let view = stores.vars.view(VarId(0));
        assert_eq!(view.get(0), Some(2.0));
        assert_eq!(view.get(1), Some(1.0));
    }

    #[test]
    fn missing_slot_views_are_empty() {
        let stores = Stores::default();
        assert!(stores.get(StoreKind::Let).view(VarId(9)).is_empty());
    }
}
