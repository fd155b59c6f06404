use serde::{Deserialize, Serialize};

/// Fixed-width one-dimensional histogram with explicit bin edges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Histogram1D {
    minimum: f64,
    maximum: f64,
    bin_width: f64,
    bins: Vec<u64>,
    n_binned: u64,
    n_missed: u64,
}

impl Histogram1D {
    pub fn new(minimum: f64, maximum: f64, bin_width: f64) -> Self {
        let mut histogram = Self::default();
        histogram.initialise(minimum, maximum, bin_width);
        histogram
    }

    /// Sets a new range and bin width, discarding all counts.
    pub fn initialise(&mut self, minimum: f64, maximum: f64, bin_width: f64) {
        let n_bins = if bin_width > 0.0 && maximum > minimum {
            ((maximum - minimum) / bin_width).ceil() as usize
        } else {
            0
        };
        self.minimum = minimum;
        self.maximum = minimum + n_bins as f64 * bin_width;
        self.bin_width = bin_width;
        self.bins = vec![0; n_bins];
        self.n_binned = 0;
        self.n_missed = 0;
    }

    /// Whether the histogram already covers exactly this range and width.
    pub fn has_layout(&self, minimum: f64, maximum: f64, bin_width: f64) -> bool {
        let expected = Self::new(minimum, maximum, bin_width);
        self.minimum == expected.minimum
            && self.maximum == expected.maximum
            && self.bin_width == expected.bin_width
    }

    pub fn zero_bins(&mut self) {
        self.bins.iter_mut().for_each(|bin| *bin = 0);
        self.n_binned = 0;
        self.n_missed = 0;
    }

    /// Adds a value; returns `false` if it fell outside the histogram range.
    pub fn bin(&mut self, value: f64) -> bool {
        if value < self.minimum || value >= self.maximum || self.bins.is_empty() {
            self.n_missed += 1;
            return false;
        }
        let index = ((value - self.minimum) / self.bin_width) as usize;
        match self.bins.get_mut(index) {
            Some(bin) => {
                *bin += 1;
                self.n_binned += 1;
                true
            }
            None => {
                self.n_missed += 1;
                false
            }
        }
    }

    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn n_binned(&self) -> u64 {
        self.n_binned
    }

    pub fn n_missed(&self) -> u64 {
        self.n_missed
    }

    /// Lower edge of the bin at `index`.
    pub fn bin_lower_edge(&self, index: usize) -> f64 {
        self.minimum + index as f64 * self.bin_width
    }

    pub fn bin_centre(&self, index: usize) -> f64 {
        self.bin_lower_edge(index) + 0.5 * self.bin_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialise_rounds_range_up_to_whole_bins() {
        let histogram = Histogram1D::new(0.0, 1.05, 0.1);
        assert_eq!(histogram.n_bins(), 11);
    }

    #[test]
    fn bin_counts_values_in_range_and_records_misses() {
        let mut histogram = Histogram1D::new(0.0, 1.0, 0.25);
        assert!(histogram.bin(0.1));
        assert!(histogram.bin(0.3));
        assert!(histogram.bin(0.3));
        assert!(!histogram.bin(1.0));
        assert!(!histogram.bin(-0.5));

        assert_eq!(histogram.bins(), &[1, 2, 0, 0]);
        assert_eq!(histogram.n_binned(), 3);
        assert_eq!(histogram.n_missed(), 2);
    }

    #[test]
    fn zero_bins_keeps_layout() {
        let mut histogram = Histogram1D::new(0.0, 1.0, 0.25);
        histogram.bin(0.5);
        histogram.zero_bins();
        assert_eq!(histogram.bins(), &[0, 0, 0, 0]);
        assert!(histogram.has_layout(0.0, 1.0, 0.25));
        assert!(!histogram.has_layout(0.0, 2.0, 0.25));
    }

    #[test]
    fn bin_centres_are_midpoints() {
        let histogram = Histogram1D::new(1.0, 2.0, 0.5);
        assert_eq!(histogram.bin_centre(0), 1.25);
        assert_eq!(histogram.bin_centre(1), 1.75);
    }
}
