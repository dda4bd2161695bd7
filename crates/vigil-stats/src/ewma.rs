/// Exponentially weighted moving average.
///
/// The first update adopts the sample exactly; later updates blend with
/// `alpha * sample + (1 - alpha) * previous`. Until the first update the
/// tracker reads as 0.0.
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    value: Option<f64>,
}

impl Ewma {
    /// `alpha` is clamped into `(0, 1]`; values at or below zero fall back
    /// to 1.0 (no smoothing) rather than freezing the tracker.
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha > 0.0 && alpha <= 1.0 { alpha } else { 1.0 };
        Self { alpha, value: None }
    }

    pub fn update(&mut self, sample: f64) {
        let next = match self.value {
            Some(previous) => self.alpha.mul_add(sample, (1.0 - self.alpha) * previous),
            None => sample,
        };
        self.value = Some(next);
    }

    #[must_use]
    pub fn get(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.value.is_some()
    }

    pub fn reset(&mut self) {
        self.value = None;
    }

    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn first_update_is_exact() {
        let mut ewma = Ewma::new(0.3);
        assert!(!ewma.is_initialized());
        assert_relative_eq!(ewma.get(), 0.0);

        ewma.update(42.5);
        assert!(ewma.is_initialized());
        assert_relative_eq!(ewma.get(), 42.5);
    }

    #[test]
    fn smoothing_converges_toward_samples() {
        let mut ewma = Ewma::new(0.3);
        ewma.update(0.0);

        let mut previous_gap = 10.0;
        for _ in 0..20 {
            ewma.update(10.0);
            let gap = (10.0 - ewma.get()).abs();
            assert!(gap <= previous_gap * 0.7 + 1e-12);
            previous_gap = gap;
        }
        assert!(previous_gap < 0.01);
    }

    #[test]
    fn reset_returns_to_uninitialized() {
        let mut ewma = Ewma::new(0.5);
        ewma.update(5.0);
        ewma.reset();

        assert!(!ewma.is_initialized());
        assert_relative_eq!(ewma.get(), 0.0);

        ewma.update(7.0);
        assert_relative_eq!(ewma.get(), 7.0);
    }

    #[test]
    fn out_of_range_alpha_falls_back_to_unsmoothed() {
        let mut ewma = Ewma::new(-2.0);
        ewma.update(1.0);
        ewma.update(9.0);
        assert_relative_eq!(ewma.get(), 9.0);
    }
}
