//! Newest-first historical series and the per-bar view derived from it.
//!
//! A [`Series`] reads like a Pine series: `get(0)` is the current bar and
//! `get(k)` is the value `k` bars earlier. Values are stored oldest-first so
//! that adding a new bar is a push and a per-bar view is a borrowed prefix.

#[derive(Debug, Clone, PartialEq)]
pub struct Series<T = f64> {
    values: Vec<T>,
}

impl<T> Default for Series<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<T: Copy> Series<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a series from values ordered oldest → newest.
    pub fn from_chronological(values: Vec<T>) -> Self {
        Self { values }
    }

    /// Builds a series from values ordered newest → oldest.
    pub fn from_newest_first(values: impl IntoIterator<Item = T>) -> Self {
        let mut values: Vec<T> = values.into_iter().collect();
        values.reverse();
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value `k` bars ago, `None` beyond the oldest element.
    pub fn get(&self, k: usize) -> Option<T> {
        let len = self.values.len();
        if k >= len {
            return None;
        }
        Some(self.values[len - 1 - k])
    }

    pub fn current(&self) -> Option<T> {
        self.values.last().copied()
    }

    /// Prepends a new current element.
    pub fn push_bar(&mut self, value: T) {
        self.values.push(value);
    }

    /// Overwrites element 0, creating it when the series is empty.
    pub fn set_current(&mut self, value: T) {
        match self.values.last_mut() {
            Some(slot) => *slot = value,
            None => self.values.push(value),
        }
    }

    /// Duplicates element 0 so it becomes element 1 of the next bar.
    /// Returns `false` (and does nothing) on an empty series.
    pub fn shift(&mut self) -> bool {
        match self.values.last().copied() {
            Some(current) => {
                self.values.push(current);
                true
            }
            None => false,
        }
    }

    /// View of the series as it looked at absolute bar `bar`
    /// (0 = oldest). Equivalent to slicing off the `len - 1 - bar`
    /// newest elements. `None` when `bar` is past the newest element.
    pub fn view(&self, bar: usize) -> Option<SeriesView<'_, T>> {
        if bar < self.values.len() {
            Some(SeriesView {
                values: &self.values[..=bar],
            })
        } else {
            None
        }
    }

    /// View over the whole series, current element last in chronological order.
    pub fn full_view(&self) -> SeriesView<'_, T> {
        SeriesView {
            values: &self.values,
        }
    }

    pub fn chronological(&self) -> &[T] {
        &self.values
    }

    pub fn newest_first(&self) -> impl Iterator<Item = T> + '_ {
        self.values.iter().rev().copied()
    }
}

/// Per-bar suffix of a series: element 0 is the bar the view was taken at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesView<'a, T = f64> {
    values: &'a [T],
}

impl<'a, T: Copy> SeriesView<'a, T> {
    /// Wraps a chronological slice whose last element is "now".
    pub fn from_chronological(values: &'a [T]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, k: usize) -> Option<T> {
        let len = self.values.len();
        if k >= len {
            return None;
        }
        Some(self.values[len - 1 - k])
    }

    pub fn current(&self) -> Option<T> {
        self.values.last().copied()
    }

    /// Oldest → newest; the last element is the view's current bar.
    pub fn chronological(&self) -> &'a [T] {
        self.values
    }

    pub fn newest_first(&self) -> impl Iterator<Item = T> + 'a {
        self.values.iter().rev().copied()
    }
}

impl SeriesView<'_, f64> {
    /// Pine-style history access: NaN when `k` reaches past the view.
    pub fn at(&self, k: usize) -> f64 {
        self.get(k).unwrap_or(f64::NAN)
    }
}

impl Series<f64> {
    /// Pine-style history access: NaN when `k` reaches past the series.
    pub fn at(&self, k: usize) -> f64 {
        self.get(k).unwrap_or(f64::NAN)
    }
}
