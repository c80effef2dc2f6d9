//! Script compiler and per-bar evaluator.
//!
//! Compilation resolves every name once. Variables get a [`VarId`] slot in
//! their store, each cached indicator call site gets a [`CacheHandle`], and
//! each computed series argument (`ta.sma(close * 2, 10)`) gets a `params`
//! slot that is written every bar before the indicator reads it. The
//! resulting [`CompiledScript`] walks the resolved tree once per bar.
//!
//! # Evaluation Semantics
//!
//! - Booleans are `1.0` / `0.0`; `na` and `0` are false
//! - Comparisons involving `na` are false; `x / 0` and `x % 0` are `na`
//! - `and` / `or` and the ternary evaluate lazily
//! - `var` and `const` initialisers run on the first evaluated bar only
//! - Without `return`, the step output is every plot's value keyed by title

use std::collections::HashMap;

use tracing::debug;

use crate::domain::context::{Context, StoreKind, Stores, VarId};
use crate::domain::error::PineError;
use crate::domain::indicator::cache::CacheHandle;
use crate::domain::market_data::{BarViews, Builtin, TimeField};
use crate::domain::outputs::{Ohlc, OptionValue, Options, color};
use crate::domain::script::{Compiler, Script, StepOutput, Value};
use crate::domain::script_ast::{
    Arg, BinaryOp, Call, DeclKind, Expr, Program, ReturnValue, Stmt, UnaryOp,
};
use crate::domain::script_parser::parse;
use crate::domain::series::SeriesView;

const NAN: f64 = f64::NAN;

fn compile_err(position: usize, reason: impl Into<String>) -> PineError {
    PineError::Compile {
        position,
        reason: reason.into(),
    }
}

fn truthy(v: f64) -> bool {
    !v.is_nan() && v != 0.0
}

fn bool_value(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Non-positive and non-finite lengths become 0, which indicators answer
/// with `na`.
fn length(v: f64) -> usize {
    if v.is_finite() && v >= 1.0 { v as usize } else { 0 }
}

fn expr_position(expr: &Expr) -> usize {
    match expr {
        Expr::Name { position, .. } | Expr::History { position, .. } => *position,
        Expr::Call(call) => call.position,
        Expr::Unary { expr, .. } => expr_position(expr),
        Expr::Binary { left, .. } => expr_position(left),
        Expr::Ternary { cond, .. } => expr_position(cond),
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Resolved tree
// ---------------------------------------------------------------------------

/// Where a series argument reads from.
#[derive(Debug, Clone)]
enum Source {
    Builtin(Builtin),
    Store(StoreKind, VarId),
    /// Computed every bar into a `params` slot.
    Param(VarId, Box<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MathFn {
    Abs,
    Max,
    Min,
    Sqrt,
    Log,
    Exp,
    Pow,
    Round,
    Floor,
    Ceil,
    Sign,
}

impl MathFn {
    /// Function and its accepted argument count range.
    fn lookup(name: &str) -> Option<(MathFn, usize, usize)> {
        Some(match name {
            "math.abs" => (MathFn::Abs, 1, 1),
            "math.max" => (MathFn::Max, 2, usize::MAX),
            "math.min" => (MathFn::Min, 2, usize::MAX),
            "math.sqrt" => (MathFn::Sqrt, 1, 1),
            "math.log" => (MathFn::Log, 1, 1),
            "math.exp" => (MathFn::Exp, 1, 1),
            "math.pow" => (MathFn::Pow, 2, 2),
            "math.round" => (MathFn::Round, 1, 2),
            "math.floor" => (MathFn::Floor, 1, 1),
            "math.ceil" => (MathFn::Ceil, 1, 1),
            "math.sign" => (MathFn::Sign, 1, 1),
            _ => return None,
        })
    }

    fn apply(self, args: &[f64]) -> f64 {
        let x = args.first().copied().unwrap_or(NAN);
        match self {
            MathFn::Abs => x.abs(),
            MathFn::Max | MathFn::Min => {
                if args.iter().any(|v| v.is_nan()) {
                    return NAN;
                }
                let pick = if self == MathFn::Max { f64::max } else { f64::min };
                args.iter().copied().fold(x, pick)
            }
            MathFn::Sqrt => x.sqrt(),
            MathFn::Log => {
                if x > 0.0 { x.ln() } else { NAN }
            }
            MathFn::Exp => x.exp(),
            MathFn::Pow => x.powf(args.get(1).copied().unwrap_or(NAN)),
            MathFn::Round => match args.get(1) {
                Some(&p) if p.is_finite() => {
                    let scale = 10f64.powi(p as i32);
                    (x * scale).round() / scale
                }
                Some(_) => NAN,
                None => x.round(),
            },
            MathFn::Floor => x.floor(),
            MathFn::Ceil => x.ceil(),
            MathFn::Sign => {
                if x.is_nan() || x == 0.0 { x } else { x.signum() }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaFn {
    Sma,
    Ema,
    Rma,
    Rsi,
    Atr,
    Wma,
    Hma,
    Vwma,
    Dema,
    Tema,
    Swma,
    Change,
    Mom,
    Roc,
    Stdev,
    Variance,
    Dev,
    Highest,
    Lowest,
    Median,
    Linreg,
    Supertrend,
    Vwap,
    Tr,
    Crossover,
    Crossunder,
}

impl TaFn {
    fn cached(self) -> bool {
        matches!(
            self,
            TaFn::Sma | TaFn::Ema | TaFn::Rma | TaFn::Rsi | TaFn::Atr
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum ParamKind {
    Series,
    Number,
    OptionalSeries,
    OptionalNumber,
    Default(f64),
}

struct ParamSpec {
    name: &'static str,
    kind: ParamKind,
}

const fn param(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec { name, kind }
}

const SOURCE: ParamSpec = param("source", ParamKind::Series);
const LENGTH: ParamSpec = param("length", ParamKind::Number);

const SIG_SOURCE_LENGTH: &[ParamSpec] = &[SOURCE, LENGTH];
const SIG_LENGTH: &[ParamSpec] = &[LENGTH];
const SIG_SOURCE: &[ParamSpec] = &[SOURCE];
const SIG_CHANGE: &[ParamSpec] = &[SOURCE, param("length", ParamKind::Default(1.0))];
const SIG_MOMENT: &[ParamSpec] = &[SOURCE, LENGTH, param("biased", ParamKind::Default(1.0))];
const SIG_LINREG: &[ParamSpec] = &[SOURCE, LENGTH, param("offset", ParamKind::Default(0.0))];
const SIG_SUPERTREND: &[ParamSpec] = &[
    param("factor", ParamKind::Number),
    param("atrPeriod", ParamKind::Number),
];
const SIG_VWAP: &[ParamSpec] = &[
    SOURCE,
    param("anchor", ParamKind::OptionalSeries),
    param("stdev_mult", ParamKind::OptionalNumber),
];
const SIG_TR: &[ParamSpec] = &[param("handle_na", ParamKind::Default(0.0))];
const SIG_CROSS: &[ParamSpec] = &[
    param("source1", ParamKind::Series),
    param("source2", ParamKind::Series),
];

fn ta_signature(name: &str) -> Option<(TaFn, &'static [ParamSpec])> {
    Some(match name {
        "ta.sma" => (TaFn::Sma, SIG_SOURCE_LENGTH),
        "ta.ema" => (TaFn::Ema, SIG_SOURCE_LENGTH),
        "ta.rma" => (TaFn::Rma, SIG_SOURCE_LENGTH),
        "ta.rsi" => (TaFn::Rsi, SIG_SOURCE_LENGTH),
        "ta.atr" => (TaFn::Atr, SIG_LENGTH),
        "ta.wma" => (TaFn::Wma, SIG_SOURCE_LENGTH),
        "ta.hma" => (TaFn::Hma, SIG_SOURCE_LENGTH),
        "ta.vwma" => (TaFn::Vwma, SIG_SOURCE_LENGTH),
        "ta.dema" => (TaFn::Dema, SIG_SOURCE_LENGTH),
        "ta.tema" => (TaFn::Tema, SIG_SOURCE_LENGTH),
        "ta.swma" => (TaFn::Swma, SIG_SOURCE),
        "ta.change" => (TaFn::Change, SIG_CHANGE),
        "ta.mom" => (TaFn::Mom, SIG_SOURCE_LENGTH),
        "ta.roc" => (TaFn::Roc, SIG_SOURCE_LENGTH),
        "ta.stdev" => (TaFn::Stdev, SIG_MOMENT),
        "ta.variance" => (TaFn::Variance, SIG_MOMENT),
        "ta.dev" => (TaFn::Dev, SIG_SOURCE_LENGTH),
        "ta.highest" => (TaFn::Highest, SIG_SOURCE_LENGTH),
        "ta.lowest" => (TaFn::Lowest, SIG_SOURCE_LENGTH),
        "ta.median" => (TaFn::Median, SIG_SOURCE_LENGTH),
        "ta.linreg" => (TaFn::Linreg, SIG_LINREG),
        "ta.supertrend" => (TaFn::Supertrend, SIG_SUPERTREND),
        "ta.vwap" => (TaFn::Vwap, SIG_VWAP),
        "ta.tr" => (TaFn::Tr, SIG_TR),
        "ta.crossover" => (TaFn::Crossover, SIG_CROSS),
        "ta.crossunder" => (TaFn::Crossunder, SIG_CROSS),
        _ => return None,
    })
}

#[derive(Debug, Clone)]
enum Bound {
    Series(Source),
    Number(Node),
    Absent,
}

#[derive(Debug, Clone)]
struct TaCall {
    func: TaFn,
    args: Vec<Bound>,
    handle: Option<CacheHandle>,
}

impl TaCall {
    /// Number of values the call returns.
    fn arity(&self) -> usize {
        match self.func {
            TaFn::Supertrend => 2,
            TaFn::Vwap if !matches!(self.args.get(2), Some(Bound::Absent) | None) => 3,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Const(f64),
    Read {
        source: Source,
        offset: Option<Box<Node>>,
    },
    Time {
        field: TimeField,
        offset: Option<Box<Node>>,
    },
    BarIndex,
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Ternary(Box<Node>, Box<Node>, Box<Node>),
    Ta(Box<TaCall>),
    Math(MathFn, Vec<Node>),
    IsNa(Box<Node>),
    Nz(Box<Node>, Box<Node>),
}

#[derive(Debug, Clone)]
enum OptionNode {
    Text(String),
    Bool(bool),
    Number(Node),
    Rgb(Vec<Node>),
    NewColor(Box<OptionNode>, Option<Node>),
}

type OptionList = Vec<(String, OptionNode)>;

#[derive(Debug, Clone)]
enum Output {
    Plot {
        value: Node,
        title: String,
        options: OptionList,
        char: bool,
    },
    Ohlc {
        values: Box<[Node; 4]>,
        title: String,
        options: OptionList,
        bar: bool,
    },
    Fill {
        plot1: String,
        plot2: String,
        options: OptionList,
    },
    HLine {
        price: Node,
        title: String,
        options: OptionList,
    },
    Indicator {
        title: Option<String>,
        shorttitle: Option<String>,
        overlay: Option<bool>,
    },
}

#[derive(Debug, Clone)]
enum Op {
    Set {
        store: StoreKind,
        id: VarId,
        value: Node,
    },
    /// Runs only while the slot has never been written.
    Init {
        store: StoreKind,
        id: VarId,
        value: Node,
    },
    Tuple {
        call: TaCall,
        targets: Vec<VarId>,
    },
    Eval(Node),
    Output(Output),
}

#[derive(Debug, Clone)]
enum Ret {
    Single(Node),
    Named(Vec<(String, Node)>),
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn view<'c>(source: &Source, data: &'c BarViews, stores: &'c Stores) -> SeriesView<'c> {
    match source {
        Source::Builtin(b) => data.get(*b),
        Source::Store(kind, id) => stores.get(*kind).view(*id),
        Source::Param(id, _) => stores.params.view(*id),
    }
}

fn arg_view<'c>(arg: Option<&Bound>, data: &'c BarViews, stores: &'c Stores) -> Option<SeriesView<'c>> {
    match arg {
        Some(Bound::Series(source)) => Some(view(source, data, stores)),
        _ => None,
    }
}

/// Writes the current value of a computed series argument.
fn prepare(source: &Source, ctx: &mut Context) -> Result<(), PineError> {
    if let Source::Param(id, node) = source {
        let value = eval(node, ctx)?;
        ctx.stores.params.set(*id, value);
    }
    Ok(())
}

/// `None` when the offset is `na`.
fn history_offset(value: f64, bar: usize) -> Result<Option<usize>, PineError> {
    if value.is_nan() {
        return Ok(None);
    }
    if value < 0.0 {
        return Err(PineError::script(
            bar,
            format!("history offset must not be negative, got {value}"),
        ));
    }
    Ok(Some(value as usize))
}

fn read_offset(offset: &Option<Box<Node>>, ctx: &mut Context) -> Result<Option<usize>, PineError> {
    match offset {
        None => Ok(Some(0)),
        Some(node) => history_offset(eval(node, ctx)?, ctx.idx),
    }
}

fn arith(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 { NAN } else { a / b }
        }
        BinaryOp::Mod => {
            if b == 0.0 { NAN } else { a % b }
        }
        BinaryOp::Eq => bool_value(a == b),
        BinaryOp::Ne => bool_value(!a.is_nan() && !b.is_nan() && a != b),
        BinaryOp::Lt => bool_value(a < b),
        BinaryOp::Le => bool_value(a <= b),
        BinaryOp::Gt => bool_value(a > b),
        BinaryOp::Ge => bool_value(a >= b),
        BinaryOp::And => bool_value(truthy(a) && truthy(b)),
        BinaryOp::Or => bool_value(truthy(a) || truthy(b)),
    }
}

fn eval(node: &Node, ctx: &mut Context) -> Result<f64, PineError> {
    Ok(match node {
        Node::Const(v) => *v,
        Node::Read { source, offset } => {
            let Some(k) = read_offset(offset, ctx)? else {
                return Ok(NAN);
            };
            prepare(source, ctx)?;
            view(source, &ctx.data, &ctx.stores).at(k)
        }
        Node::Time { field, offset } => {
            let Some(k) = read_offset(offset, ctx)? else {
                return Ok(NAN);
            };
            ctx.data
                .time(*field)
                .get(k)
                .map(|t| t as f64)
                .unwrap_or(NAN)
        }
        Node::BarIndex => ctx.idx as f64,
        Node::Unary(op, expr) => {
            let v = eval(expr, ctx)?;
            match op {
                UnaryOp::Neg => -v,
                UnaryOp::Not => bool_value(!truthy(v)),
            }
        }
        Node::Binary(BinaryOp::And, left, right) => {
            bool_value(truthy(eval(left, ctx)?) && truthy(eval(right, ctx)?))
        }
        Node::Binary(BinaryOp::Or, left, right) => {
            bool_value(truthy(eval(left, ctx)?) || truthy(eval(right, ctx)?))
        }
        Node::Binary(op, left, right) => {
            let a = eval(left, ctx)?;
            let b = eval(right, ctx)?;
            arith(*op, a, b)
        }
        Node::Ternary(cond, then, otherwise) => {
            if truthy(eval(cond, ctx)?) {
                eval(then, ctx)?
            } else {
                eval(otherwise, ctx)?
            }
        }
        Node::Ta(call) => call_ta(call, ctx)?[0],
        Node::Math(func, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, ctx)?);
            }
            func.apply(&values)
        }
        Node::IsNa(expr) => bool_value(eval(expr, ctx)?.is_nan()),
        Node::Nz(expr, replacement) => {
            let v = eval(expr, ctx)?;
            if v.is_nan() { eval(replacement, ctx)? } else { v }
        }
    })
}

/// Evaluates an indicator call. Unused trailing values are NaN.
fn call_ta(call: &TaCall, ctx: &mut Context) -> Result<[f64; 3], PineError> {
    let mut nums = [NAN; 3];
    for (i, arg) in call.args.iter().enumerate() {
        match arg {
            Bound::Series(source) => prepare(source, ctx)?,
            Bound::Number(node) => nums[i] = eval(node, ctx)?,
            Bound::Absent => {}
        }
    }

    let data = ctx.data.clone();
    let (stores, mut ta) = ctx.split();
    let stores: &Stores = stores;
    let series = |i: usize| {
        arg_view(call.args.get(i), &data, stores)
            .unwrap_or_else(|| SeriesView::from_chronological(&[]))
    };
    let len = |i: usize| length(nums[i]);
    let h = call.handle;
    let one = |v: f64| [v, NAN, NAN];

    Ok(match call.func {
        TaFn::Sma => one(ta.sma(series(0), len(1), h)),
        TaFn::Ema => one(ta.ema(series(0), len(1), h)),
        TaFn::Rma => one(ta.rma(series(0), len(1), h)),
        TaFn::Rsi => one(ta.rsi(series(0), len(1), h)),
        TaFn::Atr => one(ta.atr(len(0), h)),
        TaFn::Wma => one(ta.wma(series(0), len(1))),
        TaFn::Hma => one(ta.hma(series(0), len(1))),
        TaFn::Vwma => one(ta.vwma(series(0), len(1))),
        TaFn::Dema => one(ta.dema(series(0), len(1))),
        TaFn::Tema => one(ta.tema(series(0), len(1))),
        TaFn::Swma => one(ta.swma(series(0))),
        TaFn::Change => one(ta.change(series(0), len(1))),
        TaFn::Mom => one(ta.mom(series(0), len(1))),
        TaFn::Roc => one(ta.roc(series(0), len(1))),
        TaFn::Stdev => one(ta.stdev(series(0), len(1), truthy(nums[2]))),
        TaFn::Variance => one(ta.variance(series(0), len(1), truthy(nums[2]))),
        TaFn::Dev => one(ta.dev(series(0), len(1))),
        TaFn::Highest => one(ta.highest(series(0), len(1))),
        TaFn::Lowest => one(ta.lowest(series(0), len(1))),
        TaFn::Median => one(ta.median(series(0), len(1))),
        TaFn::Linreg => {
            let offset = if nums[2].is_finite() { nums[2] as i64 } else { 0 };
            one(ta.linreg(series(0), len(1), offset))
        }
        TaFn::Supertrend => {
            let (line, direction) = ta.supertrend(nums[0], len(1));
            [line, direction, NAN]
        }
        TaFn::Vwap => {
            let anchor = arg_view(call.args.get(1), &data, stores);
            if call.arity() == 3 {
                let (v, upper, lower) = ta.vwap_bands(series(0), anchor, nums[2]);
                [v, upper, lower]
            } else {
                one(ta.vwap(series(0), anchor))
            }
        }
        TaFn::Tr => one(ta.tr(truthy(nums[0]))),
        TaFn::Crossover => one(bool_value(ta.crossover(series(0), series(1)))),
        TaFn::Crossunder => one(bool_value(ta.crossunder(series(0), series(1)))),
    })
}

fn eval_option(option: &OptionNode, ctx: &mut Context) -> Result<OptionValue, PineError> {
    Ok(match option {
        OptionNode::Text(text) => OptionValue::Text(text.clone()),
        OptionNode::Bool(b) => OptionValue::Bool(*b),
        OptionNode::Number(node) => OptionValue::Number(eval(node, ctx)?),
        OptionNode::Rgb(channels) => {
            let mut v = [NAN; 4];
            for (slot, node) in v.iter_mut().zip(channels) {
                *slot = eval(node, ctx)?;
            }
            let alpha = (channels.len() == 4 && truthy(v[3])).then_some(v[3]);
            OptionValue::Text(color::rgb(v[0], v[1], v[2], alpha))
        }
        OptionNode::NewColor(base, alpha) => {
            let base = match eval_option(base, ctx)? {
                OptionValue::Text(text) => text,
                OptionValue::Number(n) => n.to_string(),
                OptionValue::Bool(b) => b.to_string(),
            };
            let alpha = match alpha {
                Some(node) => Some(eval(node, ctx)?).filter(|a| truthy(*a)),
                None => None,
            };
            OptionValue::Text(color::new(&base, alpha))
        }
    })
}

fn eval_options(list: &OptionList, ctx: &mut Context) -> Result<Options, PineError> {
    let mut options = Options::new();
    for (key, option) in list {
        options.insert(key.clone(), eval_option(option, ctx)?);
    }
    Ok(options)
}

fn emit(
    output: &Output,
    ctx: &mut Context,
    plotted: &mut Vec<(String, Value)>,
) -> Result<(), PineError> {
    match output {
        Output::Plot {
            value,
            title,
            options,
            char,
        } => {
            let v = eval(value, ctx)?;
            let options = eval_options(options, ctx)?;
            let mut core = ctx.core();
            if *char {
                core.plotchar(v, title, options);
            } else {
                core.plot(v, title, options);
            }
            plotted.push((title.clone(), Value::Scalar(v)));
        }
        Output::Ohlc {
            values,
            title,
            options,
            bar,
        } => {
            let ohlc = Ohlc {
                open: eval(&values[0], ctx)?,
                high: eval(&values[1], ctx)?,
                low: eval(&values[2], ctx)?,
                close: eval(&values[3], ctx)?,
            };
            let options = eval_options(options, ctx)?;
            let mut core = ctx.core();
            if *bar {
                core.plotbar(ohlc, title, options);
            } else {
                core.plotcandle(ohlc, title, options);
            }
        }
        Output::Fill {
            plot1,
            plot2,
            options,
        } => {
            let options = eval_options(options, ctx)?;
            ctx.core().fill(plot1, plot2, options);
        }
        Output::HLine {
            price,
            title,
            options,
        } => {
            let price = eval(price, ctx)?;
            let options = eval_options(options, ctx)?;
            ctx.core().hline(price, title, options);
        }
        Output::Indicator {
            title,
            shorttitle,
            overlay,
        } => {
            ctx.core()
                .indicator(title.as_deref(), shorttitle.as_deref(), *overlay);
        }
    }
    Ok(())
}

fn slot_is_empty(ctx: &Context, store: StoreKind, id: VarId) -> bool {
    ctx.stores
        .get(store)
        .get(id)
        .is_none_or(|series| series.is_empty())
}

fn exec(op: &Op, ctx: &mut Context, plotted: &mut Vec<(String, Value)>) -> Result<(), PineError> {
    match op {
        Op::Set { store, id, value } => {
            let v = eval(value, ctx)?;
            ctx.stores.get_mut(*store).set(*id, v);
        }
        Op::Init { store, id, value } => {
            if slot_is_empty(ctx, *store, *id) {
                let v = eval(value, ctx)?;
                ctx.stores.get_mut(*store).set(*id, v);
            }
        }
        Op::Tuple { call, targets } => {
            let values = call_ta(call, ctx)?;
            for (id, v) in targets.iter().zip(values) {
                ctx.stores.lets.set(*id, v);
            }
        }
        Op::Eval(node) => {
            eval(node, ctx)?;
        }
        Op::Output(output) => emit(output, ctx, plotted)?,
    }
    Ok(())
}

/// Slot and call-site counts of a compiled script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScriptSummary {
    pub statements: usize,
    pub variables: u32,
    pub params: u32,
    pub cache_sites: u32,
}

#[derive(Debug, Clone)]
pub struct CompiledScript {
    ops: Vec<Op>,
    ret: Option<Ret>,
    summary: ScriptSummary,
}

impl CompiledScript {
    pub fn summary(&self) -> ScriptSummary {
        self.summary
    }
}

impl Script for CompiledScript {
    fn step(&mut self, ctx: &mut Context) -> Result<StepOutput, PineError> {
        let mut plotted = Vec::new();
        for op in &self.ops {
            exec(op, ctx, &mut plotted)?;
        }
        match &self.ret {
            Some(Ret::Single(node)) => Ok(StepOutput::from(eval(node, ctx)?)),
            Some(Ret::Named(fields)) => {
                let mut out = Vec::with_capacity(fields.len());
                for (key, node) in fields {
                    out.push((key.clone(), Value::Scalar(eval(node, ctx)?)));
                }
                Ok(StepOutput::Named(out))
            }
            None if plotted.is_empty() => Ok(StepOutput::from(NAN)),
            None => Ok(StepOutput::Named(plotted)),
        }
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Binding {
    Series(StoreKind, VarId),
    /// `p = plot(...)`, usable only as a `fill` argument.
    Plot(String),
}

const OUTPUT_FUNCTIONS: &[&str] = &[
    "plot",
    "plotchar",
    "plotcandle",
    "plotbar",
    "fill",
    "hline",
    "indicator",
];

#[derive(Default)]
struct Resolver {
    names: HashMap<String, Binding>,
    next_slot: HashMap<StoreKind, u32>,
    next_handle: u32,
}

/// Call arguments matched to parameter names: one entry per parameter plus
/// any extra named arguments.
struct BoundArgs<'e> {
    slots: Vec<Option<&'e Expr>>,
    extra: Vec<(String, &'e Expr)>,
}

fn bind_args<'e>(
    call: &'e Call,
    params: &[&str],
    allow_extra: bool,
) -> Result<BoundArgs<'e>, PineError> {
    let mut slots: Vec<Option<&Expr>> = vec![None; params.len()];
    let mut extra = Vec::new();
    let mut next = 0;
    for Arg {
        name,
        value,
        position,
    } in &call.args
    {
        let index = match name {
            Some(name) => match params.iter().position(|p| *p == name.as_str()) {
                Some(i) => i,
                None if allow_extra => {
                    if extra.iter().any(|(k, _): &(String, &Expr)| k == name) {
                        return Err(compile_err(*position, format!("duplicate argument '{name}'")));
                    }
                    extra.push((name.clone(), value));
                    continue;
                }
                None => {
                    return Err(compile_err(
                        *position,
                        format!("'{}' has no parameter '{}'", call.name, name),
                    ));
                }
            },
            None => {
                let i = next;
                next += 1;
                if i >= params.len() {
                    return Err(compile_err(
                        *position,
                        format!(
                            "'{}' takes at most {} positional arguments",
                            call.name,
                            params.len()
                        ),
                    ));
                }
                i
            }
        };
        if slots[index].is_some() {
            return Err(compile_err(
                *position,
                format!("argument '{}' given twice", params[index]),
            ));
        }
        slots[index] = Some(value);
    }
    Ok(BoundArgs { slots, extra })
}

fn literal_string(expr: &Expr, what: &str) -> Result<String, PineError> {
    match expr {
        Expr::Str(s) => Ok(s.clone()),
        other => Err(compile_err(
            expr_position(other),
            format!("{what} must be a string literal"),
        )),
    }
}

impl Resolver {
    fn alloc(&mut self, store: StoreKind) -> VarId {
        let next = self.next_slot.entry(store).or_insert(0);
        let id = VarId(*next);
        *next += 1;
        id
    }

    fn slots(&self, store: StoreKind) -> u32 {
        self.next_slot.get(&store).copied().unwrap_or(0)
    }

    fn declare(&mut self, name: &str, position: usize, binding: Binding) -> Result<(), PineError> {
        if self.names.contains_key(name) {
            return Err(compile_err(
                position,
                format!("'{name}' is already declared, use := to reassign"),
            ));
        }
        self.names.insert(name.to_string(), binding);
        Ok(())
    }

    fn compile_program(mut self, program: &Program) -> Result<CompiledScript, PineError> {
        let mut ops = Vec::new();
        let mut ret = None;

        for stmt in &program.statements {
            if ret.is_some() {
                let position = match stmt {
                    Stmt::Decl { position, .. }
                    | Stmt::Reassign { position, .. }
                    | Stmt::Tuple { position, .. }
                    | Stmt::Return { position, .. } => *position,
                    Stmt::Expr(expr) => expr_position(expr),
                };
                return Err(compile_err(position, "unreachable statement after return"));
            }
            match stmt {
                Stmt::Decl {
                    kind,
                    name,
                    value,
                    position,
                } => {
                    if let (DeclKind::Let, Expr::Call(call)) = (kind, value) {
                        if call.name == "plot" || call.name == "plotchar" {
                            let output = self.compile_output(call)?;
                            if let Output::Plot { title, .. } = &output {
                                self.declare(name, *position, Binding::Plot(title.clone()))?;
                            }
                            ops.push(Op::Output(output));
                            continue;
                        }
                    }
                    let value = self.compile_expr(value)?;
                    let store = match kind {
                        DeclKind::Let => StoreKind::Let,
                        DeclKind::Var => StoreKind::Var,
                        DeclKind::Const => StoreKind::Const,
                    };
                    let id = self.alloc(store);
                    self.declare(name, *position, Binding::Series(store, id))?;
                    ops.push(match kind {
                        DeclKind::Let => Op::Set { store, id, value },
                        _ => Op::Init { store, id, value },
                    });
                }
                Stmt::Reassign {
                    name,
                    value,
                    position,
                } => {
                    let (store, id) = match self.names.get(name) {
                        Some(Binding::Series(StoreKind::Const, _)) => {
                            return Err(compile_err(
                                *position,
                                format!("cannot reassign constant '{name}'"),
                            ));
                        }
                        Some(Binding::Series(store, id)) => (*store, *id),
                        Some(Binding::Plot(_)) => {
                            return Err(compile_err(
                                *position,
                                format!("cannot reassign plot '{name}'"),
                            ));
                        }
                        None => {
                            return Err(compile_err(
                                *position,
                                format!("unknown variable '{name}'"),
                            ));
                        }
                    };
                    let value = self.compile_expr(value)?;
                    ops.push(Op::Set { store, id, value });
                }
                Stmt::Tuple {
                    names,
                    call,
                    position,
                } => {
                    let call = self.compile_ta_call(call)?;
                    if call.arity() != names.len() {
                        return Err(compile_err(
                            *position,
                            format!(
                                "call returns {} values but {} names are given",
                                call.arity(),
                                names.len()
                            ),
                        ));
                    }
                    let mut targets = Vec::with_capacity(names.len());
                    for name in names {
                        let id = self.alloc(StoreKind::Let);
                        self.declare(name, *position, Binding::Series(StoreKind::Let, id))?;
                        targets.push(id);
                    }
                    ops.push(Op::Tuple { call, targets });
                }
                Stmt::Expr(Expr::Call(call)) if OUTPUT_FUNCTIONS.contains(&call.name.as_str()) => {
                    ops.push(Op::Output(self.compile_output(call)?));
                }
                Stmt::Expr(expr) => ops.push(Op::Eval(self.compile_expr(expr)?)),
                Stmt::Return { value, .. } => {
                    ret = Some(match value {
                        ReturnValue::Single(expr) => Ret::Single(self.compile_expr(expr)?),
                        ReturnValue::Named(fields) => {
                            let mut out = Vec::with_capacity(fields.len());
                            for (key, expr) in fields {
                                out.push((key.clone(), self.compile_expr(expr)?));
                            }
                            Ret::Named(out)
                        }
                    });
                }
            }
        }

        let summary = ScriptSummary {
            statements: program.statements.len(),
            variables: self.slots(StoreKind::Const)
                + self.slots(StoreKind::Var)
                + self.slots(StoreKind::Let),
            params: self.slots(StoreKind::Params),
            cache_sites: self.next_handle,
        };
        Ok(CompiledScript { ops, ret, summary })
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<Node, PineError> {
        Ok(match expr {
            Expr::Number(n) => Node::Const(*n),
            Expr::Bool(b) => Node::Const(bool_value(*b)),
            Expr::Na => Node::Const(NAN),
            Expr::Str(_) => {
                return Err(compile_err(
                    0,
                    "strings are only allowed as titles and options",
                ));
            }
            Expr::Name { name, position } => self.compile_name(name, *position, None)?,
            Expr::History {
                target,
                offset,
                ..
            } => {
                let offset = Box::new(self.compile_expr(offset)?);
                match target.as_ref() {
                    Expr::Name { name, position } => {
                        self.compile_name(name, *position, Some(offset))?
                    }
                    other => {
                        let value = self.compile_expr(other)?;
                        let id = self.alloc(StoreKind::Params);
                        Node::Read {
                            source: Source::Param(id, Box::new(value)),
                            offset: Some(offset),
                        }
                    }
                }
            }
            Expr::Unary { op, expr } => Node::Unary(*op, Box::new(self.compile_expr(expr)?)),
            Expr::Binary { op, left, right } => Node::Binary(
                *op,
                Box::new(self.compile_expr(left)?),
                Box::new(self.compile_expr(right)?),
            ),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => Node::Ternary(
                Box::new(self.compile_expr(cond)?),
                Box::new(self.compile_expr(then)?),
                Box::new(self.compile_expr(otherwise)?),
            ),
            Expr::Call(call) => self.compile_call(call)?,
        })
    }

    fn compile_name(
        &mut self,
        name: &str,
        position: usize,
        offset: Option<Box<Node>>,
    ) -> Result<Node, PineError> {
        if let Some(binding) = self.names.get(name) {
            return match binding {
                Binding::Series(store, id) => Ok(Node::Read {
                    source: Source::Store(*store, *id),
                    offset,
                }),
                Binding::Plot(_) => Err(compile_err(
                    position,
                    format!("plot '{name}' can only be used as a fill argument"),
                )),
            };
        }
        if let Some(builtin) = Builtin::from_name(name) {
            return Ok(Node::Read {
                source: Source::Builtin(builtin),
                offset,
            });
        }
        let field = match name {
            "time" => Some(TimeField::OpenTime),
            "time_close" => Some(TimeField::CloseTime),
            _ => None,
        };
        if let Some(field) = field {
            return Ok(Node::Time { field, offset });
        }

        // Values without their own history go through a params slot.
        let value = match name {
            "bar_index" => Node::BarIndex,
            "ta.tr" => Node::Ta(Box::new(TaCall {
                func: TaFn::Tr,
                args: vec![Bound::Number(Node::Const(0.0))],
                handle: None,
            })),
            _ if name.starts_with("color.") => {
                return Err(compile_err(
                    position,
                    format!("'{name}' is a color and only allowed in options"),
                ));
            }
            _ => return Err(compile_err(position, format!("unknown name '{name}'"))),
        };
        Ok(match offset {
            None => value,
            Some(offset) => Node::Read {
                source: Source::Param(self.alloc(StoreKind::Params), Box::new(value)),
                offset: Some(offset),
            },
        })
    }

    /// A series argument: bare built-ins and variables are read in place,
    /// anything else is computed into a `params` slot.
    fn compile_source(&mut self, expr: &Expr) -> Result<Source, PineError> {
        if let Expr::Name { name, .. } = expr {
            if let Some(Binding::Series(store, id)) = self.names.get(name.as_str()) {
                return Ok(Source::Store(*store, *id));
            }
            if let Some(builtin) = Builtin::from_name(name) {
                if !self.names.contains_key(name.as_str()) {
                    return Ok(Source::Builtin(builtin));
                }
            }
        }
        let value = self.compile_expr(expr)?;
        Ok(Source::Param(self.alloc(StoreKind::Params), Box::new(value)))
    }

    fn compile_ta_call(&mut self, call: &Call) -> Result<TaCall, PineError> {
        let (func, params) = ta_signature(&call.name).ok_or_else(|| {
            compile_err(call.position, format!("unknown function '{}'", call.name))
        })?;
        let names: Vec<&str> = params.iter().map(|p| p.name).collect();
        let bound = bind_args(call, &names, false)?;

        let mut args = Vec::with_capacity(params.len());
        for (spec, arg) in params.iter().zip(bound.slots) {
            args.push(match (spec.kind, arg) {
                (ParamKind::Series | ParamKind::OptionalSeries, Some(expr)) => {
                    Bound::Series(self.compile_source(expr)?)
                }
                (
                    ParamKind::Number | ParamKind::OptionalNumber | ParamKind::Default(_),
                    Some(expr),
                ) => Bound::Number(self.compile_expr(expr)?),
                (ParamKind::Default(v), None) => Bound::Number(Node::Const(v)),
                (ParamKind::OptionalSeries | ParamKind::OptionalNumber, None) => Bound::Absent,
                (ParamKind::Series | ParamKind::Number, None) => {
                    return Err(compile_err(
                        call.position,
                        format!("'{}' is missing argument '{}'", call.name, spec.name),
                    ));
                }
            });
        }

        let handle = if func.cached() {
            let handle = CacheHandle(self.next_handle);
            self.next_handle += 1;
            Some(handle)
        } else {
            None
        };
        Ok(TaCall { func, args, handle })
    }

    fn positional(
        &mut self,
        call: &Call,
        min: usize,
        max: usize,
    ) -> Result<Vec<Node>, PineError> {
        if let Some(arg) = call.args.iter().find(|a| a.name.is_some()) {
            return Err(compile_err(
                arg.position,
                format!("'{}' takes positional arguments only", call.name),
            ));
        }
        let n = call.args.len();
        if n < min || n > max {
            let expected = if min == max {
                min.to_string()
            } else if max == usize::MAX {
                format!("at least {min}")
            } else {
                format!("{min} to {max}")
            };
            return Err(compile_err(
                call.position,
                format!("'{}' expects {} arguments, got {}", call.name, expected, n),
            ));
        }
        call.args
            .iter()
            .map(|a| self.compile_expr(&a.value))
            .collect()
    }

    fn compile_call(&mut self, call: &Call) -> Result<Node, PineError> {
        let name = call.name.as_str();
        if name.starts_with("ta.") {
            let ta = self.compile_ta_call(call)?;
            if ta.arity() != 1 {
                return Err(compile_err(
                    call.position,
                    format!(
                        "'{}' returns {} values, assign it with [a, b, ...] = {}(...)",
                        name,
                        ta.arity(),
                        name
                    ),
                ));
            }
            return Ok(Node::Ta(Box::new(ta)));
        }
        if let Some((func, min, max)) = MathFn::lookup(name) {
            return Ok(Node::Math(func, self.positional(call, min, max)?));
        }
        match name {
            "na" => {
                let mut args = self.positional(call, 1, 1)?;
                Ok(Node::IsNa(Box::new(args.remove(0))))
            }
            "nz" => {
                let mut args = self.positional(call, 1, 2)?;
                let replacement = if args.len() == 2 {
                    args.remove(1)
                } else {
                    Node::Const(0.0)
                };
                Ok(Node::Nz(Box::new(args.remove(0)), Box::new(replacement)))
            }
            _ if OUTPUT_FUNCTIONS.contains(&name) => Err(compile_err(
                call.position,
                format!("'{name}' can only be used as a statement"),
            )),
            _ if name.starts_with("color.") => Err(compile_err(
                call.position,
                format!("'{name}' is a color and only allowed in options"),
            )),
            _ => Err(compile_err(
                call.position,
                format!("unknown function '{name}'"),
            )),
        }
    }

    fn compile_option(&mut self, expr: &Expr) -> Result<OptionNode, PineError> {
        Ok(match expr {
            Expr::Str(s) => OptionNode::Text(s.clone()),
            Expr::Bool(b) => OptionNode::Bool(*b),
            Expr::Name { name, position } if name.starts_with("color.") => {
                let named = color::named(&name["color.".len()..])
                    .ok_or_else(|| compile_err(*position, format!("unknown color '{name}'")))?;
                OptionNode::Text(named.to_string())
            }
            Expr::Call(call) if call.name == "color.rgb" => {
                OptionNode::Rgb(self.positional(call, 3, 4)?)
            }
            Expr::Call(call) if call.name == "color.new" => {
                let bound = bind_args(call, &["color", "transp"], false)?;
                let base = bound.slots[0].ok_or_else(|| {
                    compile_err(call.position, "'color.new' is missing argument 'color'")
                })?;
                let base = self.compile_option(base)?;
                let alpha = match bound.slots[1] {
                    Some(expr) => Some(self.compile_expr(expr)?),
                    None => None,
                };
                OptionNode::NewColor(Box::new(base), alpha)
            }
            other => OptionNode::Number(self.compile_expr(other)?),
        })
    }

    /// Options from parameter slots at `from..` followed by extra named args.
    fn compile_options(
        &mut self,
        params: &[&str],
        bound: &BoundArgs<'_>,
        from: usize,
    ) -> Result<OptionList, PineError> {
        let mut options = Vec::new();
        for (name, slot) in params.iter().zip(&bound.slots).skip(from) {
            if let Some(expr) = slot {
                options.push((name.to_string(), self.compile_option(expr)?));
            }
        }
        for (name, expr) in &bound.extra {
            options.push((name.clone(), self.compile_option(expr)?));
        }
        Ok(options)
    }

    fn required<'e>(
        call: &Call,
        bound: &BoundArgs<'e>,
        params: &[&str],
        index: usize,
    ) -> Result<&'e Expr, PineError> {
        bound.slots[index].ok_or_else(|| {
            compile_err(
                call.position,
                format!("'{}' is missing argument '{}'", call.name, params[index]),
            )
        })
    }

    fn optional_title(
        bound: &BoundArgs<'_>,
        index: usize,
        default: &str,
    ) -> Result<String, PineError> {
        match bound.slots[index] {
            Some(expr) => literal_string(expr, "title"),
            None => Ok(default.to_string()),
        }
    }

    /// A `fill` argument: a plot bound by `p = plot(...)` or a title string.
    fn plot_ref(&self, expr: &Expr) -> Result<String, PineError> {
        match expr {
            Expr::Str(title) => Ok(title.clone()),
            Expr::Name { name, position } => match self.names.get(name) {
                Some(Binding::Plot(title)) => Ok(title.clone()),
                _ => Err(compile_err(*position, format!("'{name}' is not a plot"))),
            },
            other => Err(compile_err(
                expr_position(other),
                "fill needs a plot variable or a plot title",
            )),
        }
    }

    fn compile_output(&mut self, call: &Call) -> Result<Output, PineError> {
        match call.name.as_str() {
            "plot" | "plotchar" => {
                let char = call.name == "plotchar";
                let params: &[&str] = if char {
                    &["series", "title", "char", "location", "color"]
                } else {
                    &["series", "title", "color", "linewidth", "style"]
                };
                let bound = bind_args(call, params, true)?;
                let value = self.compile_expr(Self::required(call, &bound, params, 0)?)?;
                let title = Self::optional_title(&bound, 1, "Plot")?;
                let options = self.compile_options(params, &bound, 2)?;
                Ok(Output::Plot {
                    value,
                    title,
                    options,
                    char,
                })
            }
            "plotcandle" | "plotbar" => {
                let bar = call.name == "plotbar";
                let params: &[&str] = &["open", "high", "low", "close", "title", "color"];
                let bound = bind_args(call, params, true)?;
                let values = Box::new([
                    self.compile_expr(Self::required(call, &bound, params, 0)?)?,
                    self.compile_expr(Self::required(call, &bound, params, 1)?)?,
                    self.compile_expr(Self::required(call, &bound, params, 2)?)?,
                    self.compile_expr(Self::required(call, &bound, params, 3)?)?,
                ]);
                let title = Self::optional_title(&bound, 4, if bar { "Bars" } else { "Candles" })?;
                let options = self.compile_options(params, &bound, 5)?;
                Ok(Output::Ohlc {
                    values,
                    title,
                    options,
                    bar,
                })
            }
            "fill" => {
                let params: &[&str] = &["plot1", "plot2", "color"];
                let bound = bind_args(call, params, true)?;
                let plot1 = self.plot_ref(Self::required(call, &bound, params, 0)?)?;
                let plot2 = self.plot_ref(Self::required(call, &bound, params, 1)?)?;
                let options = self.compile_options(params, &bound, 2)?;
                Ok(Output::Fill {
                    plot1,
                    plot2,
                    options,
                })
            }
            "hline" => {
                let params: &[&str] = &["price", "title", "color", "linestyle", "linewidth"];
                let bound = bind_args(call, params, true)?;
                let price = self.compile_expr(Self::required(call, &bound, params, 0)?)?;
                let title = Self::optional_title(&bound, 1, "HLine")?;
                let options = self.compile_options(params, &bound, 2)?;
                Ok(Output::HLine {
                    price,
                    title,
                    options,
                })
            }
            "indicator" => {
                let params: &[&str] = &["title", "shorttitle", "overlay"];
                let bound = bind_args(call, params, false)?;
                let title = bound.slots[0]
                    .map(|e| literal_string(e, "title"))
                    .transpose()?;
                let shorttitle = bound.slots[1]
                    .map(|e| literal_string(e, "shorttitle"))
                    .transpose()?;
                let overlay = match bound.slots[2] {
                    None => None,
                    Some(Expr::Bool(b)) => Some(*b),
                    Some(other) => {
                        return Err(compile_err(
                            expr_position(other),
                            "overlay must be true or false",
                        ));
                    }
                };
                Ok(Output::Indicator {
                    title,
                    shorttitle,
                    overlay,
                })
            }
            other => Err(compile_err(
                call.position,
                format!("unknown function '{other}'"),
            )),
        }
    }
}

/// Parses and resolves `source`.
pub fn compile(source: &str) -> Result<CompiledScript, PineError> {
    let program = parse(source)?;
    let script = Resolver::default().compile_program(&program)?;
    debug!(
        statements = script.summary.statements,
        cache_sites = script.summary.cache_sites,
        "script resolved"
    );
    Ok(script)
}

/// The [`Compiler`] for pinerun's script language.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptCompiler;

impl Compiler for ScriptCompiler {
    fn compile(&self, source: &str) -> Result<Box<dyn Script>, PineError> {
        Ok(Box::new(compile(source)?))
    }
}
