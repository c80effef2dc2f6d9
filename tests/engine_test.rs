//! Engine-level properties exercised through hand-written step functions and
//! compiled scripts:
//! - Per-bar indexing and evaluation order
//! - Incremental cache equivalence, including live updates
//! - Warm-up, state shift and multi-output collection
//! - The async runner

mod common;

use common::*;
use pinerun::domain::context::{Context, StoreKind, VarId};
use pinerun::domain::engine::{Runner, run_async, run_script};
use pinerun::domain::error::PineError;
use pinerun::domain::indicator::cache::CacheHandle;
use pinerun::domain::script::{AsyncScript, Compiler, Script, StepOutput};
use pinerun::domain::script_eval::ScriptCompiler;
use proptest::prelude::*;

type StepResult = Result<StepOutput, PineError>;

/// Runs `step` over every bar with a compiler that is never used.
fn run_closure(
    bars: Vec<MarketBar>,
    use_cache: bool,
    mut step: impl FnMut(&mut Context) -> StepResult + Send,
) -> Context {
    Runner::new(ScriptCompiler, bars)
        .with_cache(use_cache)
        .run_script(&mut step, None)
        .unwrap()
}

mod indexing_and_order {
    use super::*;

    #[test]
    fn view_element_k_is_k_bars_earlier() {
        let closes: Vec<f64> = (0..10).map(|i| 10.0 * i as f64).collect();
        let mut checked = 0;
        run_closure(bars_from_closes(&closes), true, |ctx| {
            let i = ctx.idx;
            let close = ctx.data.close();
            assert_eq!(close.len(), i + 1);
            for k in 0..=i {
                assert_eq!(close.get(k), Some(closes[i - k]));
            }
            assert_eq!(close.get(i + 1), None);
            assert!(close.at(i + 1).is_nan());
            checked += 1;
            Ok(StepOutput::from(close.at(0)))
        });
        assert_eq!(checked, 10);
    }

    #[test]
    fn bars_strictly_increasing_and_result_length_is_n() {
        let runner = Runner::new(ScriptCompiler, wave_bars(30));
        let mut seen = Vec::new();
        let mut step = |ctx: &mut Context| -> StepResult {
            seen.push(ctx.idx);
            Ok(StepOutput::from(ctx.idx as f64))
        };
        let ctx = runner.run_script(&mut step, Some(12)).unwrap();
        assert_eq!(seen, (18..30).collect::<Vec<_>>());
        assert_eq!(ctx.result.rows(), 12);
        assert_eq!(ctx.result.scalar().unwrap().len(), 12);
    }

    #[test]
    fn oversized_bar_count_is_clamped() {
        let runner = Runner::new(ScriptCompiler, wave_bars(5));
        let mut step = |_: &mut Context| -> StepResult { Ok(StepOutput::from(1.0)) };
        let ctx = runner.run_script(&mut step, Some(500)).unwrap();
        assert_eq!(ctx.result.rows(), 5);
    }
}

mod cache_equivalence {
    use super::*;

    fn sma_column(ctx: &Context) -> Vec<f64> {
        ctx.result.column("ma").unwrap().to_vec()
    }

    #[test]
    fn live_update_matches_full_recompute() {
        let bars = wave_bars(100);
        let source = "return { ma: ta.sma(close, 14) }";

        let mut full_runner = Runner::new(ScriptCompiler, bars.clone());
        let full = full_runner.run(Some(source), None).unwrap();

        let mut live = Runner::new(ScriptCompiler, bars[..99].to_vec());
        let mut ctx = live.context();
        live.run_in(&mut ctx, Some(source), None).unwrap();
        assert_eq!(ctx.result.rows(), 99);

        live.update_data(bars[99]).unwrap();
        live.run_in(&mut ctx, None, Some(1)).unwrap();

        assert_eq!(ctx.result.rows(), 100);
        assert_same(&sma_column(&ctx), &sma_column(&full));
        assert!(ctx.cache.stats().warm_hits >= 99);
    }

    #[test]
    fn uncached_run_matches_cached_run() {
        let source = "return { ma: ta.sma(close, 14), e: ta.ema(close, 9), r: ta.rsi(close, 14), a: ta.atr(14), w: ta.rma(hl2, 7) }";
        let mut cached = Runner::new(ScriptCompiler, wave_bars(120));
        let mut uncached = Runner::new(ScriptCompiler, wave_bars(120)).with_cache(false);
        let c = cached.run(Some(source), None).unwrap();
        let u = uncached.run(Some(source), None).unwrap();
        for name in ["ma", "e", "r", "a", "w"] {
            assert_same(c.result.column(name).unwrap(), u.result.column(name).unwrap());
        }
        assert_eq!(c.cache.len(), 5);
        assert!(u.cache.is_empty());
    }

    #[test]
    fn skipped_bar_falls_back_to_cold_recompute() {
        // The indicator is only evaluated on even bars, so every call after
        // the first sees an input two bars longer than last time.
        let bars = wave_bars(40);
        let handle = Some(CacheHandle(0));
        let mut step_cached = |ctx: &mut Context| -> StepResult {
            let data = ctx.data.clone();
            let v = if ctx.idx % 2 == 0 {
                ctx.ta().ema(data.close(), 5, handle)
            } else {
                f64::NAN
            };
            Ok(StepOutput::from(v))
        };
        let cached = run_closure(bars.clone(), true, &mut step_cached);
        let uncached = run_closure(bars, false, step_cached);
        assert_same(cached.result.scalar().unwrap(), uncached.result.scalar().unwrap());
        assert!(cached.cache.stats().cold_recomputes > 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn cached_matches_replay(
            closes in prop::collection::vec(1.0f64..500.0, 1..80),
            period in 1usize..20,
        ) {
            let step = move |ctx: &mut Context| -> StepResult {
                let data = ctx.data.clone();
                let mut ta = ctx.ta();
                let sma = ta.sma(data.close(), period, Some(CacheHandle(0)));
                let ema = ta.ema(data.close(), period, Some(CacheHandle(1)));
                let rsi = ta.rsi(data.close(), period, Some(CacheHandle(2)));
                let atr = ta.atr(period, Some(CacheHandle(3)));
                Ok(StepOutput::named([("sma", sma), ("ema", ema), ("rsi", rsi), ("atr", atr)]))
            };
            let cached = run_closure(bars_from_closes(&closes), true, step);
            let uncached = run_closure(bars_from_closes(&closes), false, step);
            for name in ["sma", "ema", "rsi", "atr"] {
                let (c, u) = (cached.result.column(name).unwrap(), uncached.result.column(name).unwrap());
                for (a, b) in c.iter().zip(u) {
                    prop_assert!(
                        (a.is_nan() && b.is_nan()) || (a - b).abs() <= 1e-8 * b.abs().max(1.0),
                        "{}: {} vs {}", name, a, b
                    );
                }
            }
        }
    }
}

mod warmup_and_values {
    use super::*;

    #[test]
    fn sma_of_one_to_five() {
        let mut runner = Runner::new(ScriptCompiler, bars_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        let ctx = runner.run(Some("return ta.sma(close, 3)"), None).unwrap();
        let out = ctx.result.scalar().unwrap();
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_eq!(&out[2..], &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn warmup_prefix_is_nan_then_numeric() {
        let mut runner = Runner::new(ScriptCompiler, wave_bars(40));
        let ctx = runner
            .run(Some("return { s: ta.sma(close, 10), r: ta.rsi(close, 14) }"), None)
            .unwrap();
        let s = ctx.result.column("s").unwrap();
        assert!(s[..9].iter().all(|v| v.is_nan()));
        assert!(s[9..].iter().all(|v| v.is_finite()));
        let r = ctx.result.column("r").unwrap();
        assert!(r[..14].iter().all(|v| v.is_nan()));
        assert!(r[14..].iter().all(|v| v.is_finite()));
        assert_eq!(ctx.max_period(), Some(15));
    }

    #[test]
    fn rising_prices_pin_rsi_at_100() {
        let closes: Vec<f64> = (1..=40).map(f64::from).collect();
        let mut runner = Runner::new(ScriptCompiler, bars_from_closes(&closes));
        let ctx = runner.run(Some("return ta.rsi(close, 14)"), None).unwrap();
        let out = ctx.result.scalar().unwrap();
        assert!(out[14..].iter().all(|v| *v == 100.0), "{out:?}");
    }

    #[test]
    fn supertrend_flips_once_per_crossing() {
        let mut closes = vec![100.0; 6];
        closes.extend((1..=6).map(|i| 100.0 + 10.0 * i as f64));
        closes.extend([160.0; 4]);
        closes.extend((1..=6).map(|i| 160.0 - 15.0 * i as f64));
        let mut runner = Runner::new(ScriptCompiler, bars_from_closes(&closes));
        let ctx = runner
            .run(Some("[line, dir] = ta.supertrend(1, 3)\nreturn dir"), None)
            .unwrap();
        let dir = ctx.result.scalar().unwrap();
        let flips: Vec<usize> = dir
            .windows(2)
            .enumerate()
            .filter(|(_, w)| !w[0].is_nan() && !w[1].is_nan() && w[0] != w[1])
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(flips.len(), 2, "direction: {dir:?}");
        assert_eq!(dir[flips[0]], 1.0);
        assert_eq!(dir[flips[1]], -1.0);
    }
}

mod state_and_outputs {
    use super::*;

    #[test]
    fn value_written_at_bar_i_is_history_at_i_plus_1() {
        let id = VarId(0);
        let ctx = run_closure(wave_bars(10), true, |ctx| {
            let previous = ctx.stores.vars.view(id).at(1);
            if ctx.idx > 0 {
                let expected = ctx.data.close().at(1) * 2.0;
                assert_eq!(previous, expected);
            } else {
                assert!(previous.is_nan());
            }
            let v = ctx.data.close().at(0) * 2.0;
            ctx.stores.get_mut(StoreKind::Var).set(id, v);
            Ok(StepOutput::from(v))
        });
        let last = ctx.data.close().at(0) * 2.0;
        assert_eq!(ctx.stores.vars.get(id).unwrap().current(), Some(last));
    }

    #[test]
    fn named_outputs_become_columns() {
        let ctx = run_closure(wave_bars(8), true, |ctx| {
            let close = ctx.data.close().at(0);
            Ok(StepOutput::named([("a", close), ("b", close + 1.0)]))
        });
        assert_eq!(ctx.result.names(), vec!["a", "b"]);
        let a = ctx.result.column("a").unwrap();
        let b = ctx.result.column("b").unwrap();
        assert_eq!(a.len(), 8);
        assert_eq!(b.len(), 8);
        assert!(a.iter().zip(b).all(|(a, b)| b - a == 1.0));
    }

    #[test]
    fn shape_switch_is_an_error() {
        let runner = Runner::new(ScriptCompiler, wave_bars(4));
        let mut step = |ctx: &mut Context| -> StepResult {
            if ctx.idx < 2 {
                Ok(StepOutput::from(1.0))
            } else {
                Ok(StepOutput::named([("x", 1.0)]))
            }
        };
        let mut ctx = runner.context();
        let err = run_script(&mut step, &mut ctx, None).unwrap_err();
        assert!(matches!(err, PineError::ResultShape { bar: 2 }));
        assert_eq!(ctx.result.rows(), 2);
    }

    #[test]
    fn compiler_trait_object_runs() {
        let compiler: &dyn Compiler = &ScriptCompiler;
        let mut script: Box<dyn Script> = compiler.compile("return close").unwrap();
        let runner = Runner::new(ScriptCompiler, bars_from_closes(&[3.0, 4.0]));
        let ctx = runner.run_script(script.as_mut(), None).unwrap();
        assert_eq!(ctx.result.scalar(), Some(&[3.0, 4.0][..]));
    }
}

mod async_runner {
    use super::*;

    struct SlowSma {
        calls: usize,
    }

    impl AsyncScript for SlowSma {
        async fn step(&mut self, ctx: &mut Context) -> StepResult {
            tokio::task::yield_now().await;
            self.calls += 1;
            let data = ctx.data.clone();
            let v = ctx.ta().sma(data.close(), 3, Some(CacheHandle(0)));
            Ok(StepOutput::from(v))
        }
    }

    #[tokio::test]
    async fn async_steps_run_in_order() {
        let runner = Runner::new(ScriptCompiler, bars_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        let mut script = SlowSma { calls: 0 };
        let ctx = runner.run_async(&mut script, None).await.unwrap();
        assert_eq!(script.calls, 5);
        let out = ctx.result.scalar().unwrap();
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_eq!(&out[2..], &[2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn async_and_sync_agree() {
        let runner = Runner::new(ScriptCompiler, wave_bars(25));
        let mut script = SlowSma { calls: 0 };
        let mut async_ctx = runner.context();
        run_async(&mut script, &mut async_ctx, Some(20)).await.unwrap();

        let mut step = |ctx: &mut Context| -> StepResult {
            let data = ctx.data.clone();
            Ok(StepOutput::from(ctx.ta().sma(data.close(), 3, Some(CacheHandle(0)))))
        };
        let sync_ctx = runner.run_script(&mut step, Some(20)).unwrap();
        assert_same(
            async_ctx.result.scalar().unwrap(),
            sync_ctx.result.scalar().unwrap(),
        );
    }
}
