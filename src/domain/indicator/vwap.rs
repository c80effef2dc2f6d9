//! Anchored volume-weighted average price with optional deviation bands.
//!
//! VWAP[i] = sum(P*V) / sum(V) since the last anchor (or the first bar).
//! Bands: VWAP ± mult * stdev(P) over the same segment, unweighted
//! (population, clamped at zero before the square root).
//! No warmup. NaN inputs yield NaN and are left out of the running sums.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VwapBands {
    pub vwap: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

#[derive(Default)]
struct Segment {
    volume: f64,
    volume_price: f64,
    count: usize,
    sum: f64,
    sum_sq: f64,
}

impl Segment {
    fn add(&mut self, price: f64, volume: f64) {
        self.volume += volume;
        self.volume_price += price * volume;
        self.count += 1;
        self.sum += price;
        self.sum_sq += price * price;
    }

    fn vwap(&self) -> f64 {
        if self.volume == 0.0 {
            return f64::NAN;
        }
        self.volume_price / self.volume
    }

    fn stdev(&self) -> f64 {
        let n = self.count as f64;
        let mean = self.sum / n;
        (self.sum_sq / n - mean * mean).max(0.0).sqrt()
    }
}

/// Walks the aligned inputs and calls `emit(i, segment)` for each usable bar.
fn walk(
    src: &[f64],
    volume: &[f64],
    anchor: Option<&[bool]>,
    mut emit: impl FnMut(usize, &Segment),
) {
    let n = src.len().min(volume.len());
    let src = &src[src.len() - n..];
    let volume = &volume[volume.len() - n..];
    // Anchor flags are aligned on the newest bar too; missing flags are false.
    let anchor_at = |i: usize| -> bool {
        anchor
            .and_then(|a| (i + a.len()).checked_sub(n).and_then(|j| a.get(j)))
            .copied()
            .unwrap_or(false)
    };

    let mut segment = Segment::default();
    for i in 0..n {
        if anchor_at(i) {
            segment = Segment::default();
        }
        if src[i].is_nan() || volume[i].is_nan() {
            continue;
        }
        segment.add(src[i], volume[i]);
        emit(i, &segment);
    }
}

pub fn vwap(src: &[f64], volume: &[f64], anchor: Option<&[bool]>) -> Vec<f64> {
    let mut out = vec![f64::NAN; src.len().min(volume.len())];
    walk(src, volume, anchor, |i, seg| out[i] = seg.vwap());
    out
}

pub fn vwap_bands(
    src: &[f64],
    volume: &[f64],
    anchor: Option<&[bool]>,
    mult: f64,
) -> VwapBands {
    let n = src.len().min(volume.len());
    let mut out = VwapBands {
        vwap: vec![f64::NAN; n],
        upper: vec![f64::NAN; n],
        lower: vec![f64::NAN; n],
    };
    walk(src, volume, anchor, |i, seg| {
        let v = seg.vwap();
        let width = mult * seg.stdev();
        out.vwap[i] = v;
        out.upper[i] = v + width;
        out.lower[i] = v - width;
    });
    out
}
