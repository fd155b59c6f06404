use serde::{Deserialize, Serialize};

/// Paired x/y data, typically a normalised histogram.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Data1D {
    pub tag: String,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Data1D {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, x: f64, y: f64) {
        self.x.push(x);
        self.y.push(y);
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn scale(&mut self, factor: f64) {
        self.y.iter_mut().for_each(|y| *y *= factor);
    }

    /// Divides each value by the matching entry produced by `divisor(x_index)`.
    pub fn divide_by<F>(&mut self, mut divisor: F)
    where
        F: FnMut(usize) -> f64,
    {
        for (index, y) in self.y.iter_mut().enumerate() {
            let d = divisor(index);
            *y = if d != 0.0 { *y / d } else { 0.0 };
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }
}
