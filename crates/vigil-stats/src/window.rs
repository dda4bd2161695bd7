use crate::{mad, mean, median, std_dev};

/// Fixed-capacity circular window of samples with robust O(n) statistics.
///
/// All statistics are computed over the currently stored values only; an
/// empty window answers 0.0 everywhere.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    values: Vec<f64>,
    head: usize,
    capacity: usize,
}

impl RollingWindow {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "rolling window capacity must be at least 1");
        Self {
            values: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn add(&mut self, value: f64) {
        if self.values.len() < self.capacity {
            self.values.push(value);
        } else {
            self.values[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Oldest-to-newest snapshot of the stored samples.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        let (front, back) = self.values.split_at(self.head);
        back.iter().chain(front.iter()).copied().collect()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.head = 0;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn median(&self) -> f64 {
        median(&self.values)
    }

    /// Median absolute deviation.
    #[must_use]
    pub fn mad(&self) -> f64 {
        mad(&self.values)
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        mean(&self.values)
    }

    /// Bessel-corrected sample standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        std_dev(&self.values)
    }

    #[must_use]
    pub fn min(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn empty_statistics_are_zero() {
        let window = RollingWindow::new(8);
        assert_relative_eq!(window.median(), 0.0);
        assert_relative_eq!(window.mad(), 0.0);
        assert_relative_eq!(window.mean(), 0.0);
        assert_relative_eq!(window.std_dev(), 0.0);
        assert_relative_eq!(window.min(), 0.0);
        assert_relative_eq!(window.max(), 0.0);
    }

    #[test]
    fn statistics_over_stored_values() {
        let mut window = RollingWindow::new(8);
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            window.add(v);
        }

        assert_relative_eq!(window.mean(), 5.0);
        assert_relative_eq!(window.median(), 4.5);
        assert_relative_eq!(window.min(), 2.0);
        assert_relative_eq!(window.max(), 9.0);
        assert_relative_eq!(window.std_dev(), 2.138_089_935, epsilon = 1e-9);
    }

    #[test]
    fn overwrite_drops_oldest_from_statistics() {
        let mut window = RollingWindow::new(3);
        window.add(100.0);
        window.add(1.0);
        window.add(2.0);
        window.add(3.0);

        assert_eq!(window.to_vec(), vec![1.0, 2.0, 3.0]);
        assert_relative_eq!(window.mean(), 2.0);
        assert_relative_eq!(window.max(), 3.0);
    }

    #[test]
    fn mad_is_robust_to_an_outlier() {
        let mut window = RollingWindow::new(8);
        for v in [10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 500.0] {
            window.add(v);
        }

        assert_relative_eq!(window.mad(), 0.0);
        assert!(window.std_dev() > 100.0);
    }
}
