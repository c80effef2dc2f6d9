//! Output sinks (plots, candles, bars, fills, hlines) and the core script
//! operations that fill them.
//!
//! Sinks are append-only within a run. Every point is stamped with the open
//! time of the bar being evaluated.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

pub type Options = BTreeMap<String, OptionValue>;

pub const DEFAULT_SCRIPT_TITLE: &str = "pinerun script";

#[derive(Debug, Clone, PartialEq)]
pub struct PlotPoint {
    pub time: i64,
    pub value: f64,
    pub options: Options,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plot {
    pub title: String,
    pub data: Vec<PlotPoint>,
    pub options: Options,
    pub pane: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcPoint {
    pub time: i64,
    pub ohlc: Ohlc,
    pub pane: u32,
    pub options: Options,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcPlot {
    pub title: String,
    pub data: Vec<OhlcPoint>,
    pub options: Options,
    pub pane: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub plot1: String,
    pub plot2: String,
    pub options: Options,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HLine {
    pub title: String,
    pub price: f64,
    pub options: Options,
    pub pane: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs {
    /// Set by `indicator()`; added as the `group` option of plots.
    pub title: Option<String>,
    /// 0 = price overlay, 1 = separate pane.
    pub pane: u32,
    pub plots: Vec<Plot>,
    pub candles: Vec<OhlcPlot>,
    pub bars: Vec<OhlcPlot>,
    pub fills: Vec<Fill>,
    pub hlines: Vec<HLine>,
}

impl Outputs {
    pub fn plot(&self, title: &str) -> Option<&Plot> {
        self.plots.iter().find(|p| p.title == title)
    }

    pub fn candle(&self, title: &str) -> Option<&OhlcPlot> {
        self.candles.iter().find(|p| p.title == title)
    }

    pub fn bar(&self, title: &str) -> Option<&OhlcPlot> {
        self.bars.iter().find(|p| p.title == title)
    }

    pub fn hline(&self, title: &str) -> Option<&HLine> {
        self.hlines.iter().find(|h| h.title == title)
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
            && self.candles.is_empty()
            && self.bars.is_empty()
            && self.fills.is_empty()
            && self.hlines.is_empty()
    }
}

fn plot_entry<'a>(
    plots: &'a mut Vec<Plot>,
    title: &str,
    options: &Options,
    pane: u32,
) -> &'a mut Plot {
    let pos = match plots.iter().position(|p| p.title == title) {
        Some(pos) => pos,
        None => {
            plots.push(Plot {
                title: title.to_string(),
                data: Vec::new(),
                options: options.clone(),
                pane,
            });
            plots.len() - 1
        }
    };
    &mut plots[pos]
}

fn ohlc_entry<'a>(
    plots: &'a mut Vec<OhlcPlot>,
    title: &str,
    options: &Options,
    pane: u32,
) -> &'a mut OhlcPlot {
    let pos = match plots.iter().position(|p| p.title == title) {
        Some(pos) => pos,
        None => {
            plots.push(OhlcPlot {
                title: title.to_string(),
                data: Vec::new(),
                options: options.clone(),
                pane,
            });
            plots.len() - 1
        }
    };
    &mut plots[pos]
}

/// Core operations bound to the current bar.
pub struct Core<'a> {
    outputs: &'a mut Outputs,
    time: i64,
}

impl<'a> Core<'a> {
    pub fn new(outputs: &'a mut Outputs, time: i64) -> Self {
        Self { outputs, time }
    }

    /// Names the script. `overlay` picks the pane when given.
    pub fn indicator(
        &mut self,
        title: Option<&str>,
        shorttitle: Option<&str>,
        overlay: Option<bool>,
    ) {
        let title = title.or(shorttitle).unwrap_or(DEFAULT_SCRIPT_TITLE);
        self.outputs.title = Some(title.to_string());
        if let Some(overlay) = overlay {
            self.outputs.pane = if overlay { 0 } else { 1 };
        }
    }

    fn grouped(&self, mut options: Options) -> Options {
        if let Some(title) = &self.outputs.title {
            options.insert("group".into(), OptionValue::Text(title.clone()));
        }
        options
    }

    pub fn plot(&mut self, value: f64, title: &str, options: Options) {
        let options = self.grouped(options);
        let pane = self.outputs.pane;
        let plot = plot_entry(&mut self.outputs.plots, title, &options, pane);
        plot.data.push(PlotPoint {
            time: self.time,
            value,
            options,
        });
    }

    pub fn plotchar(&mut self, value: f64, title: &str, options: Options) {
        let pane = self.outputs.pane;
        let plot = plot_entry(&mut self.outputs.plots, title, &options, pane);
        let mut point_options = options;
        point_options.insert("style".into(), OptionValue::Text("char".into()));
        plot.data.push(PlotPoint {
            time: self.time,
            value,
            options: point_options,
        });
    }

    pub fn plotcandle(&mut self, ohlc: Ohlc, title: &str, options: Options) {
        let options = self.grouped(options);
        let pane = self.outputs.pane;
        let time = self.time;
        let entry = ohlc_entry(&mut self.outputs.candles, title, &options, pane);
        entry.data.push(OhlcPoint {
            time,
            ohlc,
            pane,
            options,
        });
    }

    pub fn plotbar(&mut self, ohlc: Ohlc, title: &str, options: Options) {
        let options = self.grouped(options);
        let pane = self.outputs.pane;
        let time = self.time;
        let entry = ohlc_entry(&mut self.outputs.bars, title, &options, pane);
        entry.data.push(OhlcPoint {
            time,
            ohlc,
            pane,
            options,
        });
    }

    /// Registers a fill between two plots. The first registration for
    /// `plot1` wins; later calls are ignored.
    pub fn fill(&mut self, plot1: &str, plot2: &str, options: Options) {
        if self.outputs.fills.iter().any(|f| f.plot1 == plot1) {
            return;
        }
        self.outputs.fills.push(Fill {
            plot1: plot1.to_string(),
            plot2: plot2.to_string(),
            options,
        });
    }

    /// Sets a horizontal line. A repeated title overwrites price and options
    /// but keeps the original pane.
    pub fn hline(&mut self, price: f64, title: &str, options: Options) {
        match self.outputs.hlines.iter_mut().find(|h| h.title == title) {
            Some(line) => {
                line.price = price;
                line.options = options;
            }
            None => {
                let pane = self.outputs.pane;
                self.outputs.hlines.push(HLine {
                    title: title.to_string(),
                    price,
                    options,
                    pane,
                });
            }
        }
    }
}

pub fn na(value: f64) -> bool {
    value.is_nan()
}

pub fn nz(value: f64, replacement: f64) -> f64 {
    if value.is_nan() { replacement } else { value }
}

pub mod color {
    const NAMED: &[&str] = &[
        "aqua", "black", "blue", "fuchsia", "gray", "green", "lime", "maroon", "navy", "olive",
        "orange", "purple", "red", "silver", "teal", "white", "yellow",
    ];

    /// The value of a `color.<name>` constant: the name itself.
    pub fn named(name: &str) -> Option<&'static str> {
        NAMED.iter().find(|n| **n == name).copied()
    }

    pub fn rgb(r: f64, g: f64, b: f64, alpha: Option<f64>) -> String {
        match alpha {
            Some(a) => format!("rgba({}, {}, {}, {})", r, g, b, a),
            None => format!("rgb({}, {}, {})", r, g, b),
        }
    }

    /// Applies transparency to a `#rrggbb` color or an `r, g, b` triple.
    /// Anything else is returned unchanged when no alpha is given.
    pub fn new(color: &str, alpha: Option<f64>) -> String {
        if let Some(hex) = color.strip_prefix('#') {
            let channel = |i: usize| {
                hex.get(i..i + 2)
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
            };
            if let (Some(r), Some(g), Some(b)) = (channel(0), channel(2), channel(4)) {
                return rgb(r as f64, g as f64, b as f64, alpha);
            }
        }
        match alpha {
            Some(a) => format!("rgba({}, {})", color, a),
            None => color.to_string(),
        }
    }
}
