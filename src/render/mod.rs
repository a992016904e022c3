pub mod colors;
pub mod contour;
pub mod export;
pub mod figure;
pub mod font;

use crate::data::grid::Grid;
use colors::Rgb;

/// Resolved stroke for one contour set. Colors cycle over the levels, so a
/// single color draws every level the same.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub colors: Vec<Rgb>,
    /// Line width in points
    pub width: f64,
}

impl StrokeStyle {
    pub fn solid(color: Rgb, width: f64) -> Self {
        Self {
            colors: vec![color],
            width,
        }
    }

    pub fn color_for_level(&self, index: usize) -> Rgb {
        if self.colors.is_empty() {
            Rgb::BLACK
        } else {
            self.colors[index % self.colors.len()]
        }
    }
}

/// Drawing target shared by every spectrum of an overlay.
pub trait PlotSurface {
    /// Contour `grid` at `levels`, placed over the grid's physical extent.
    fn contour(&mut self, grid: &Grid, levels: &[f64], style: &StrokeStyle);
    fn set_xlabel(&mut self, label: &str);
    fn set_ylabel(&mut self, label: &str);
    /// Legend row with a marker in `color`; nothing is drawn in the plot area.
    fn add_legend_entry(&mut self, label: &str, color: Rgb);
    /// Flip the x axis direction (toggles, like repeated calls on a plot axis)
    fn invert_xaxis(&mut self);
    fn invert_yaxis(&mut self);
}
