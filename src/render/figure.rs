use std::path::Path;

use super::colors::Rgb;
use super::contour::contour_lines;
use super::export::{self, Anchor, ExportError, Primitive, Scene};
use super::{PlotSurface, StrokeStyle};
use crate::data::grid::{Extent, Grid};

/// Figure width in points; exports scale fonts and strokes from it
const REFERENCE_WIDTH_PT: f64 = 460.8;
const TICK_FONT_PT: f64 = 10.0;
const LABEL_FONT_PT: f64 = 11.0;
const LEGEND_FONT_PT: f64 = 9.0;
const AXIS_COLOR: Rgb = Rgb(0x26, 0x26, 0x26);

/// One contour set in physical units
#[derive(Debug, Clone, PartialEq)]
struct Layer {
    lines: Vec<(Vec<(f64, f64)>, Rgb)>,
    width_pt: f64,
}

/// A single-axes contour figure that accumulates layers, then lays itself
/// out and exports on [`Figure::save`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Figure {
    layers: Vec<Layer>,
    legend: Vec<(String, Rgb)>,
    xlabel: String,
    ylabel: String,
    x_inverted: bool,
    y_inverted: bool,
    extent: Option<Extent>,
}

impl PlotSurface for Figure {
    fn contour(&mut self, grid: &Grid, levels: &[f64], style: &StrokeStyle) {
        let lines = contour_lines(grid, levels)
            .into_iter()
            .map(|line| {
                let level_index = levels.iter().position(|&l| l == line.level).unwrap_or(0);
                let points = line
                    .points
                    .iter()
                    .map(|p| grid.to_physical(p.row, p.col))
                    .collect();
                (points, style.color_for_level(level_index))
            })
            .collect::<Vec<_>>();
        log::debug!(
            "Contoured {}x{} grid at {} levels: {} polylines",
            grid.rows,
            grid.cols,
            levels.len(),
            lines.len()
        );
        self.extent = Some(match self.extent {
            Some(e) => e.union(&grid.extent),
            None => grid.extent,
        });
        self.layers.push(Layer {
            lines,
            width_pt: style.width,
        });
    }

    fn set_xlabel(&mut self, label: &str) {
        self.xlabel = label.to_string();
    }

    fn set_ylabel(&mut self, label: &str) {
        self.ylabel = label.to_string();
    }

    fn add_legend_entry(&mut self, label: &str, color: Rgb) {
        self.legend.push((label.to_string(), color));
    }

    fn invert_xaxis(&mut self) {
        self.x_inverted = !self.x_inverted;
    }

    fn invert_yaxis(&mut self) {
        self.y_inverted = !self.y_inverted;
    }
}

/// Round tick spacing (1, 2 or 5 × 10^k) giving about `target` ticks.
fn tick_step(range: f64, target: f64) -> f64 {
    let raw = range / target;
    let magnitude = 10f64.powf(raw.log10().floor());
    [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|&step| step >= raw)
        .unwrap_or(10.0 * magnitude)
}

fn ticks(lo: f64, hi: f64) -> (Vec<f64>, usize) {
    let step = tick_step(hi - lo, 6.0);
    let decimals = (-step.log10().floor()).max(0.0) as usize;
    let first = (lo / step).ceil() as i64;
    let last = (hi / step).floor() as i64;
    ((first..=last).map(|i| i as f64 * step).collect(), decimals)
}

fn padded(lo: f64, hi: f64) -> (f64, f64) {
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

impl Figure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Number of polylines across all layers
    pub fn line_count(&self) -> usize {
        self.layers.iter().map(|l| l.lines.len()).sum()
    }

    pub fn legend(&self) -> &[(String, Rgb)] {
        &self.legend
    }

    pub fn xlabel(&self) -> &str {
        &self.xlabel
    }

    pub fn ylabel(&self) -> &str {
        &self.ylabel
    }

    pub fn x_inverted(&self) -> bool {
        self.x_inverted
    }

    pub fn y_inverted(&self) -> bool {
        self.y_inverted
    }

    /// Union of every contoured grid's extent
    pub fn data_extent(&self) -> Option<Extent> {
        self.extent
    }

    /// Lay the figure out on a `width` × `height` pixel canvas.
    pub fn scene(&self, width: u32, height: u32) -> Scene {
        let (w, h) = (width as f64, height as f64);
        let k = w / REFERENCE_WIDTH_PT;
        let tick_px = TICK_FONT_PT * k;
        let label_px = LABEL_FONT_PT * k;
        let legend_px = LEGEND_FONT_PT * k;

        let left = tick_px * 6.0;
        let right = w * 0.04;
        let top = h * 0.05;
        let bottom = tick_px * 4.5;
        let plot_w = (w - left - right).max(1.0);
        let plot_h = (h - top - bottom).max(1.0);

        let (x_lo, x_hi, y_lo, y_hi) = match self.extent {
            Some(e) => {
                let (x_lo, x_hi) = padded(e.x_min(), e.x_max());
                let (y_lo, y_hi) = padded(e.y_min(), e.y_max());
                (x_lo, x_hi, y_lo, y_hi)
            }
            None => (0.0, 1.0, 0.0, 1.0),
        };
        let (x_inv, y_inv) = (self.x_inverted, self.y_inverted);
        let map_x = move |x: f64| {
            let f = (x - x_lo) / (x_hi - x_lo);
            let f = if x_inv { 1.0 - f } else { f };
            left + f * plot_w
        };
        let map_y = move |y: f64| {
            let f = (y - y_lo) / (y_hi - y_lo);
            // y grows upward unless inverted
            let f = if y_inv { f } else { 1.0 - f };
            top + f * plot_h
        };

        let mut prims = Vec::new();
        for layer in &self.layers {
            let width_px = (layer.width_pt * k).max(0.5);
            for (points, color) in &layer.lines {
                prims.push(Primitive::Polyline {
                    points: points.iter().map(|&(x, y)| (map_x(x), map_y(y))).collect(),
                    color: *color,
                    width: width_px,
                });
            }
        }

        prims.push(Primitive::Rect {
            x: left,
            y: top,
            w: plot_w,
            h: plot_h,
            stroke: AXIS_COLOR,
            fill: None,
        });

        let tick_len = tick_px * 0.4;
        let (xt, x_dec) = ticks(x_lo, x_hi);
        for t in xt {
            let px = map_x(t);
            prims.push(Primitive::Polyline {
                points: vec![(px, top + plot_h), (px, top + plot_h + tick_len)],
                color: AXIS_COLOR,
                width: k * 0.8,
            });
            prims.push(Primitive::Text {
                x: px,
                y: top + plot_h + tick_len + tick_px * 0.9,
                text: format!("{:.*}", x_dec, t),
                size: tick_px,
                anchor: Anchor::Middle,
                vertical: false,
                color: AXIS_COLOR,
            });
        }
        let (yt, y_dec) = ticks(y_lo, y_hi);
        for t in yt {
            let py = map_y(t);
            prims.push(Primitive::Polyline {
                points: vec![(left - tick_len, py), (left, py)],
                color: AXIS_COLOR,
                width: k * 0.8,
            });
            prims.push(Primitive::Text {
                x: left - tick_len - tick_px * 0.4,
                y: py,
                text: format!("{:.*}", y_dec, t),
                size: tick_px,
                anchor: Anchor::End,
                vertical: false,
                color: AXIS_COLOR,
            });
        }

        if !self.xlabel.is_empty() {
            prims.push(Primitive::Text {
                x: left + plot_w / 2.0,
                y: h - label_px * 1.2,
                text: self.xlabel.clone(),
                size: label_px,
                anchor: Anchor::Middle,
                vertical: false,
                color: AXIS_COLOR,
            });
        }
        if !self.ylabel.is_empty() {
            prims.push(Primitive::Text {
                x: label_px * 1.2,
                y: top + plot_h / 2.0,
                text: self.ylabel.clone(),
                size: label_px,
                anchor: Anchor::Middle,
                vertical: true,
                color: AXIS_COLOR,
            });
        }

        if !self.legend.is_empty() {
            let row_h = legend_px * 1.6;
            let swatch = legend_px * 2.0;
            let longest = self
                .legend
                .iter()
                .map(|(label, _)| label.chars().count())
                .max()
                .unwrap_or(0) as f64;
            let box_w = swatch + legend_px * (1.5 + 0.6 * longest);
            let box_h = row_h * self.legend.len() as f64 + legend_px * 0.6;
            let box_x = left + plot_w - box_w - legend_px;
            let box_y = top + legend_px;
            prims.push(Primitive::Rect {
                x: box_x,
                y: box_y,
                w: box_w,
                h: box_h,
                stroke: Rgb(0xcc, 0xcc, 0xcc),
                fill: Some(Rgb::WHITE),
            });
            for (i, (label, color)) in self.legend.iter().enumerate() {
                let cy = box_y + legend_px * 0.3 + row_h * (i as f64 + 0.5);
                let sx = box_x + legend_px * 0.5;
                prims.push(Primitive::Polyline {
                    points: vec![(sx, cy), (sx + swatch, cy)],
                    color: *color,
                    width: (1.5 * k).max(1.0),
                });
                prims.push(Primitive::Text {
                    x: sx + swatch + legend_px * 0.5,
                    y: cy,
                    text: label.clone(),
                    size: legend_px,
                    anchor: Anchor::Start,
                    vertical: false,
                    color: AXIS_COLOR,
                });
            }
        }

        Scene {
            width,
            height,
            px_per_pt: k,
            primitives: prims,
        }
    }

    /// Export by file extension: `.png`, `.svg` or `.pdf`.
    pub fn save(&self, path: &Path, width: u32, height: u32) -> Result<(), ExportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let scene = self.scene(width, height);
        match ext.as_str() {
            "png" => export::write_png(&scene, path)?,
            "svg" => export::write_svg(&scene, path)?,
            "pdf" => export::write_pdf(&scene, path)?,
            other => return Err(ExportError::UnsupportedFormat(format!(".{}", other))),
        }
        log::info!("Saved {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak_grid() -> Grid {
        let n = 9;
        let values = (0..n * n)
            .map(|i| {
                let (r, c) = ((i / n) as f64 - 4.0, (i % n) as f64 - 4.0);
                100.0 * (-(r * r + c * c) / 4.0).exp()
            })
            .collect();
        Grid {
            rows: n,
            cols: n,
            values,
            extent: Extent {
                x_start: 9.0,
                x_end: 7.0,
                y_start: 130.0,
                y_end: 110.0,
            },
        }
    }

    fn polylines(scene: &Scene) -> Vec<&Vec<(f64, f64)>> {
        scene
            .primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Polyline { points, .. } if points.len() > 2 => Some(points),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_contour_records_layer_and_extent() {
        let mut fig = Figure::new();
        fig.contour(&peak_grid(), &[10.0, 50.0], &StrokeStyle::solid(Rgb::BLACK, 0.5));
        assert_eq!(fig.layer_count(), 1);
        assert_eq!(fig.line_count(), 2);
        let e = fig.data_extent().unwrap();
        assert_eq!((e.x_min(), e.x_max()), (7.0, 9.0));
    }

    #[test]
    fn test_inversion_toggles() {
        let mut fig = Figure::new();
        fig.invert_xaxis();
        assert!(fig.x_inverted());
        fig.invert_xaxis();
        assert!(!fig.x_inverted());
        fig.invert_yaxis();
        assert!(fig.y_inverted());
    }

    #[test]
    fn test_inverted_x_puts_high_ppm_on_left() {
        // ridge along x = 8.5, right of center in ppm
        let mut grid = peak_grid();
        grid.values = (0..81).map(|i| if i % 9 >= 2 { 0.0 } else { 10.0 }).collect();
        let mut fig = Figure::new();
        fig.contour(&grid, &[5.0], &StrokeStyle::solid(Rgb::BLACK, 0.5));

        let plain = fig.scene(800, 600);
        fig.invert_xaxis();
        let flipped = fig.scene(800, 600);
        let x_of = |s: &Scene| polylines(s)[0][0].0;
        // column 1.5 of 0..8 is ppm 8.625; high ppm sits left once inverted
        assert!(x_of(&flipped) < 400.0);
        assert!(x_of(&plain) > 400.0);
    }

    #[test]
    fn test_legend_and_labels_in_scene() {
        let mut fig = Figure::new();
        fig.contour(&peak_grid(), &[10.0], &StrokeStyle::solid(Rgb(1, 2, 3), 0.5));
        fig.set_xlabel("1H ppm");
        fig.set_ylabel("13C ppm");
        fig.add_legend_entry("HSQC (cs=1.00e+01)", Rgb(1, 2, 3));
        let scene = fig.scene(1600, 1200);
        let texts: Vec<&str> = scene
            .primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(texts.contains(&"1H ppm"));
        assert!(texts.contains(&"13C ppm"));
        assert!(texts.contains(&"HSQC (cs=1.00e+01)"));
    }

    #[test]
    fn test_tick_step() {
        assert_eq!(tick_step(10.0, 5.0), 2.0);
        assert_eq!(tick_step(0.9, 6.0), 0.2);
        assert_eq!(tick_step(120.0, 6.0), 20.0);
        let (t, dec) = ticks(7.0, 9.0);
        assert_eq!(dec, 1);
        assert_eq!(t.first().copied(), Some(7.0));
    }

    #[test]
    fn test_save_rejects_unknown_extension() {
        let fig = Figure::new();
        let path = std::env::temp_dir().join("nmr_contour_fig.bmpx");
        assert!(matches!(
            fig.save(&path, 100, 100),
            Err(ExportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_save_svg_and_png() {
        let mut fig = Figure::new();
        fig.contour(&peak_grid(), &[20.0], &StrokeStyle::solid(Rgb::BLACK, 0.5));
        let dir = std::env::temp_dir();
        let svg = dir.join("nmr_contour_fig_test.svg");
        let png = dir.join("nmr_contour_fig_test.png");
        fig.save(&svg, 320, 240).unwrap();
        fig.save(&png, 320, 240).unwrap();
        assert!(std::fs::read_to_string(&svg).unwrap().contains("<polyline"));
        let img = image::open(&png).unwrap();
        assert_eq!((img.width(), img.height()), (320, 240));
        let _ = std::fs::remove_file(svg);
        let _ = std::fs::remove_file(png);
    }
}
