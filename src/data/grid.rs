/// Physical-unit extent of a 2D grid, in the order contour drawing expects:
/// the first column sits at `x_start`, the last at `x_end`; likewise rows.
///
/// For a spectrum the start values are the maxima (index 0 is the high-ppm
/// edge), so `x_start > x_end` and `y_start > y_end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub x_start: f64,
    pub x_end: f64,
    pub y_start: f64,
    pub y_end: f64,
}

impl Extent {
    pub fn x_min(&self) -> f64 {
        self.x_start.min(self.x_end)
    }

    pub fn x_max(&self) -> f64 {
        self.x_start.max(self.x_end)
    }

    pub fn y_min(&self) -> f64 {
        self.y_start.min(self.y_end)
    }

    pub fn y_max(&self) -> f64 {
        self.y_start.max(self.y_end)
    }

    /// Smallest extent covering both
    pub fn union(&self, other: &Extent) -> Extent {
        Extent {
            x_start: self.x_max().max(other.x_max()),
            x_end: self.x_min().min(other.x_min()),
            y_start: self.y_max().max(other.y_max()),
            y_end: self.y_min().min(other.y_min()),
        }
    }
}

/// Dense row-major 2D intensity grid
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f64>,
    pub extent: Extent,
}

impl Grid {
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[row * self.cols..(row + 1) * self.cols]
    }

    /// Same grid with every intensity negated
    pub fn negated(&self) -> Grid {
        Grid {
            values: self.values.iter().map(|v| -v).collect(),
            ..self.clone()
        }
    }

    /// Map a fractional (row, col) position to physical units.
    pub fn to_physical(&self, row: f64, col: f64) -> (f64, f64) {
        let frac = |pos: f64, n: usize| if n > 1 { pos / (n - 1) as f64 } else { 0.0 };
        let e = &self.extent;
        (
            e.x_start + frac(col, self.cols) * (e.x_end - e.x_start),
            e.y_start + frac(row, self.rows) * (e.y_end - e.y_start),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid {
            rows: 2,
            cols: 3,
            values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            extent: Extent {
                x_start: 10.0,
                x_end: 8.0,
                y_start: 120.0,
                y_end: 110.0,
            },
        }
    }

    #[test]
    fn test_row_access() {
        let g = grid();
        assert_eq!(g.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(g.get(0, 2), 3.0);
        assert_eq!(g.negated().get(1, 0), -4.0);
    }

    #[test]
    fn test_to_physical_corners() {
        let g = grid();
        assert_eq!(g.to_physical(0.0, 0.0), (10.0, 120.0));
        assert_eq!(g.to_physical(1.0, 2.0), (8.0, 110.0));
        assert_eq!(g.to_physical(0.5, 1.0), (9.0, 115.0));
    }

    #[test]
    fn test_extent_union() {
        let a = grid().extent;
        let b = Extent {
            x_start: 9.0,
            x_end: 6.5,
            y_start: 125.0,
            y_end: 112.0,
        };
        let u = a.union(&b);
        assert_eq!((u.x_max(), u.x_min()), (10.0, 6.5));
        assert_eq!((u.y_max(), u.y_min()), (125.0, 110.0));
    }
}
