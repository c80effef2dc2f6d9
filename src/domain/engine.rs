//! Bar-by-bar evaluation engine.
//!
//! For every processed bar, oldest first: point the context at the bar,
//! call the step function, collect its output, fold the bar's lookbacks into
//! `max_period`, then shift every persistent store one bar forward.

use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::context::{Context, Precision};
use crate::domain::error::PineError;
use crate::domain::market_data::MarketData;
use crate::domain::ohlcv::MarketBar;
use crate::domain::script::{AsyncScript, Compiler, Script, StepOutput};
use crate::ports::data_port::{DataPort, DataRequest};

/// Absolute indices of the `bars` most recent bars out of `total`.
/// `None` means all of them; larger counts are clamped.
pub fn bar_range(total: usize, bars: Option<usize>) -> Range<usize> {
    let n = match bars {
        None => total,
        Some(n) if n > total => {
            warn!(requested = n, available = total, "bar count exceeds loaded data, clamping");
            total
        }
        Some(n) => n,
    };
    total - n..total
}

fn finish_bar(ctx: &mut Context, output: StepOutput) -> Result<(), PineError> {
    ctx.result.push(ctx.idx, output)?;
    ctx.warmup.merge();
    ctx.stores.shift_all();
    Ok(())
}

/// Drives `script` over the most recent `bars` bars of the context's data.
/// On error, results collected so far stay in `ctx`.
pub fn run_script<S: Script + ?Sized>(
    script: &mut S,
    ctx: &mut Context,
    bars: Option<usize>,
) -> Result<(), PineError> {
    let range = bar_range(ctx.data.market().len(), bars);
    debug!(from = range.start, to = range.end, "run starting");
    for idx in range {
        ctx.set_bar(idx);
        let output = script.step(ctx)?;
        finish_bar(ctx, output)?;
    }
    debug!(rows = ctx.result.rows(), max_period = ?ctx.max_period(), "run finished");
    Ok(())
}

/// Like [`run_script`], awaiting each bar before the next one starts.
pub async fn run_async<S: AsyncScript>(
    script: &mut S,
    ctx: &mut Context,
    bars: Option<usize>,
) -> Result<(), PineError> {
    let range = bar_range(ctx.data.market().len(), bars);
    debug!(from = range.start, to = range.end, "async run starting");
    for idx in range {
        ctx.set_bar(idx);
        let output = script.step(ctx).await?;
        finish_bar(ctx, output)?;
    }
    debug!(rows = ctx.result.rows(), "async run finished");
    Ok(())
}

struct Compiled {
    source: String,
    script: Box<dyn Script>,
}

/// Owns loaded market data and the last compiled script.
pub struct Runner<C> {
    compiler: C,
    market: Arc<MarketData>,
    compiled: Option<Compiled>,
    use_cache: bool,
    precision: Precision,
}

impl<C: Compiler> Runner<C> {
    /// Bars may arrive in any order; they are sorted by open time.
    pub fn new(compiler: C, bars: Vec<MarketBar>) -> Self {
        let market = MarketData::from_bars(bars);
        debug!(bars = market.len(), "market data loaded");
        Self {
            compiler,
            market: Arc::new(market),
            compiled: None,
            use_cache: true,
            precision: Precision::default(),
        }
    }

    pub fn from_port(
        compiler: C,
        port: &dyn DataPort,
        request: &DataRequest,
    ) -> Result<Self, PineError> {
        let bars = port.fetch(request)?;
        if bars.is_empty() {
            return Err(PineError::NoData {
                ticker: request.ticker.clone(),
                timeframe: request.timeframe.clone(),
            });
        }
        Ok(Self::new(compiler, bars))
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Readiness check for callers that poll a data source before running.
    /// A `Runner` can only be built from loaded bars (`new` or a successful
    /// `from_port`), so this is always `true`; there is no loading state.
    pub fn ready(&self) -> bool {
        true
    }

    pub fn market(&self) -> &MarketData {
        &self.market
    }

    /// Validates `bar` and appends it as the new current bar. Does not run.
    pub fn update_data(&mut self, bar: MarketBar) -> Result<(), PineError> {
        Arc::make_mut(&mut self.market).push_bar(bar)
    }

    /// Compiles `source` unless it equals the last compiled source.
    pub fn compile(&mut self, source: &str) -> Result<(), PineError> {
        if let Some(compiled) = &self.compiled {
            if compiled.source == source {
                debug!("source unchanged, reusing compiled script");
                return Ok(());
            }
        }
        let script = self.compiler.compile(source)?;
        debug!(len = source.len(), "script compiled");
        self.compiled = Some(Compiled {
            source: source.to_string(),
            script,
        });
        Ok(())
    }

    /// Fresh context over the current data.
    pub fn context(&self) -> Context {
        Context::new(Arc::clone(&self.market))
            .with_cache(self.use_cache)
            .with_precision(self.precision)
    }

    /// Runs `source` (or the previously compiled script) over the most
    /// recent `bars` bars and returns the populated context.
    pub fn run(&mut self, source: Option<&str>, bars: Option<usize>) -> Result<Context, PineError> {
        let mut ctx = self.context();
        self.run_in(&mut ctx, source, bars)?;
        Ok(ctx)
    }

    /// Runs into a caller-owned context. Stores, cache and results already in
    /// `ctx` are continued, and on failure the partial results stay there.
    pub fn run_in(
        &mut self,
        ctx: &mut Context,
        source: Option<&str>,
        bars: Option<usize>,
    ) -> Result<(), PineError> {
        if let Some(source) = source {
            self.compile(source)?;
        }
        let compiled = self.compiled.as_mut().ok_or(PineError::NoScript)?;
        ctx.set_market(Arc::clone(&self.market));
        run_script(compiled.script.as_mut(), ctx, bars)
    }

    /// Runs an already-built step function instead of compiled source.
    pub fn run_script<S: Script + ?Sized>(
        &self,
        script: &mut S,
        bars: Option<usize>,
    ) -> Result<Context, PineError> {
        let mut ctx = self.context();
        run_script(script, &mut ctx, bars)?;
        Ok(ctx)
    }

    pub async fn run_async<S: AsyncScript>(
        &self,
        script: &mut S,
        bars: Option<usize>,
    ) -> Result<Context, PineError> {
        let mut ctx = self.context();
        run_async(script, &mut ctx, bars).await?;
        Ok(ctx)
    }
}
