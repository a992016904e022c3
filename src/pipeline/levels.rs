use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTOUR_NUM: usize = 10;
pub const DEFAULT_CONTOUR_FACTOR: f64 = 1.2;

/// Geometric contour level sequence parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub count: usize,
    pub factor: f64,
}

impl Default for LevelSpec {
    fn default() -> Self {
        Self {
            count: DEFAULT_CONTOUR_NUM,
            factor: DEFAULT_CONTOUR_FACTOR,
        }
    }
}

impl LevelSpec {
    pub fn levels_from(&self, start: f64) -> Vec<f64> {
        levels(start, self.count, self.factor)
    }
}

/// `start * factor^i` for `i` in `0..count`.
///
/// Signs are not checked: a negative start yields negative levels and a
/// factor below one yields a descending sequence.
pub fn levels(start: f64, count: usize, factor: f64) -> Vec<f64> {
    (0..count).map(|i| start * factor.powi(i as i32)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubling_levels() {
        assert_eq!(levels(10.0, 5, 2.0), vec![10.0, 20.0, 40.0, 80.0, 160.0]);
    }

    #[test]
    fn test_unit_factor_repeats_start() {
        assert_eq!(levels(1.0, 3, 1.0), vec![1.0, 1.0, 1.0]);
        assert!(levels(5.0, 0, 1.2).is_empty());
    }

    #[test]
    fn test_default_spec() {
        let l = LevelSpec::default().levels_from(100.0);
        assert_eq!(l.len(), 10);
        assert_eq!(l[0], 100.0);
        assert!((l[9] - 100.0 * 1.2f64.powi(9)).abs() < 1e-9);
        assert!(l.windows(2).all(|w| w[1] > w[0]));
    }
}
