use std::str::FromStr;

use palette::{LinSrgb, Mix, Srgb};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of colors a cycle hands out before it is exhausted
pub const CYCLE_LEN: usize = 20;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ColorError {
    #[error("color cycle exhausted after {0} spectra; give explicit colors for the rest")]
    ColorCycleExhausted(usize),
    #[error("unknown colormap '{0}'")]
    UnknownColormap(String),
    #[error("cannot parse color '{0}' (expected #rrggbb, #rgb or a color name)")]
    InvalidColor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    const fn hex(v: u32) -> Rgb {
        Rgb((v >> 16) as u8, (v >> 8) as u8, v as u8)
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }

    /// Components scaled to 0..=1 (PDF color operators)
    pub fn to_unit(&self) -> (f64, f64, f64) {
        (
            self.0 as f64 / 255.0,
            self.1 as f64 / 255.0,
            self.2 as f64 / 255.0,
        )
    }

    fn linear(&self) -> LinSrgb<f32> {
        Srgb::new(self.0, self.1, self.2)
            .into_format::<f32>()
            .into_linear()
    }

    /// Blend toward `other` in linear light.
    fn mix(&self, other: &Rgb, t: f64) -> Rgb {
        let mixed = self.linear().mix(other.linear(), t as f32);
        Srgb::<f32>::from_linear(mixed).into_format::<u8>().into()
    }
}

impl From<Srgb<u8>> for Rgb {
    fn from(c: Srgb<u8>) -> Self {
        Rgb(c.red, c.green, c.blue)
    }
}

impl From<Rgb> for image::Rgb<u8> {
    fn from(c: Rgb) -> Self {
        image::Rgb([c.0, c.1, c.2])
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Parse `#rrggbb`, `#rgb`, a one-letter shorthand (`k`, `r`, ...) or a
/// CSS color name.
pub fn parse_color(text: &str) -> Result<Rgb, ColorError> {
    let t = text.trim();
    let invalid = || ColorError::InvalidColor(text.to_string());
    if t.starts_with('#') {
        return Srgb::<u8>::from_str(t).map(Rgb::from).map_err(|_| invalid());
    }
    let name = t.to_ascii_lowercase();
    let shorthand = match name.as_str() {
        "k" => Some(0x000000),
        "w" => Some(0xffffff),
        "r" => Some(0xff0000),
        "g" => Some(0x008000),
        "b" => Some(0x0000ff),
        "c" => Some(0x00bfbf),
        "m" => Some(0xbf00bf),
        "y" => Some(0xbfbf00),
        _ => None,
    };
    match shorthand {
        Some(v) => Ok(Rgb::hex(v)),
        None => palette::named::from_str(&name)
            .map(Rgb::from)
            .ok_or_else(invalid),
    }
}

const SET1: &[u32] = &[
    0xe41a1c, 0x377eb8, 0x4daf4a, 0x984ea3, 0xff7f00, 0xffff33, 0xa65628, 0xf781bf, 0x999999,
];
const SET2: &[u32] = &[
    0x66c2a5, 0xfc8d62, 0x8da0cb, 0xe78ac3, 0xa6d854, 0xffd92f, 0xe5c494, 0xb3b3b3,
];
const SET3: &[u32] = &[
    0x8dd3c7, 0xffffb3, 0xbebada, 0xfb8072, 0x80b1d3, 0xfdb462, 0xb3de69, 0xfccde5, 0xd9d9d9,
    0xbc80bd, 0xccebc5, 0xffed6f,
];
const DARK2: &[u32] = &[
    0x1b9e77, 0xd95f02, 0x7570b3, 0xe7298a, 0x66a61e, 0xe6ab02, 0xa6761d, 0x666666,
];
const PAIRED: &[u32] = &[
    0xa6cee3, 0x1f78b4, 0xb2df8a, 0x33a02c, 0xfb9a99, 0xe31a1c, 0xfdbf6f, 0xff7f00, 0xcab2d6,
    0x6a3d9a, 0xffff99, 0xb15928,
];
const ACCENT: &[u32] = &[
    0x7fc97f, 0xbeaed4, 0xfdc086, 0xffff99, 0x386cb0, 0xf0027f, 0xbf5b17, 0x666666,
];
const PASTEL1: &[u32] = &[
    0xfbb4ae, 0xb3cde3, 0xccebc5, 0xdecbe4, 0xfed9a6, 0xffffcc, 0xe5d8bd, 0xfddaec, 0xf2f2f2,
];
const TAB10: &[u32] = &[
    0x1f77b4, 0xff7f0e, 0x2ca02c, 0xd62728, 0x9467bd, 0x8c564b, 0xe377c2, 0x7f7f7f, 0xbcbd22,
    0x17becf,
];
const TAB20: &[u32] = &[
    0x1f77b4, 0xaec7e8, 0xff7f0e, 0xffbb78, 0x2ca02c, 0x98df8a, 0xd62728, 0xff9896, 0x9467bd,
    0xc5b0d5, 0x8c564b, 0xc49c94, 0xe377c2, 0xf7b6d2, 0x7f7f7f, 0xc7c7c7, 0xbcbd22, 0xdbdb8d,
    0x17becf, 0x9edae5,
];

// gradient stops, evenly spaced over [0, 1]
const VIRIDIS: &[u32] = &[
    0x440154, 0x482878, 0x3e4a89, 0x31688e, 0x26828e, 0x1f9e89, 0x35b779, 0x6ece58, 0xb5de2b,
    0xfde725,
];
const GREYS: &[u32] = &[
    0xffffff, 0xf0f0f0, 0xd9d9d9, 0xbdbdbd, 0x969696, 0x737373, 0x525252, 0x252525, 0x000000,
];
const BLUES: &[u32] = &[
    0xf7fbff, 0xdeebf7, 0xc6dbef, 0x9ecae1, 0x6baed6, 0x4292c6, 0x2171b5, 0x08519c, 0x08306b,
];
const REDS: &[u32] = &[
    0xfff5f0, 0xfee0d2, 0xfcbba1, 0xfc9272, 0xfb6a4a, 0xef3b2c, 0xcb181d, 0xa50f15, 0x67000d,
];
const GREENS: &[u32] = &[
    0xf7fcf5, 0xe5f5e0, 0xc7e9c0, 0xa1d99b, 0x74c476, 0x41ab5d, 0x238b45, 0x006d2c, 0x00441b,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColormapKind {
    /// Discrete table of distinct colors
    Listed,
    /// Continuous ramp through the stops
    Gradient,
}

/// A named colormap: either a qualitative table or a sequential gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    pub name: String,
    pub kind: ColormapKind,
    stops: Vec<Rgb>,
}

impl Colormap {
    pub fn by_name(name: &str) -> Result<Self, ColorError> {
        use ColormapKind::*;
        let (kind, table) = match name {
            "Set1" => (Listed, SET1),
            "Set2" => (Listed, SET2),
            "Set3" => (Listed, SET3),
            "Dark2" => (Listed, DARK2),
            "Paired" => (Listed, PAIRED),
            "Accent" => (Listed, ACCENT),
            "Pastel1" => (Listed, PASTEL1),
            "tab10" => (Listed, TAB10),
            "tab20" => (Listed, TAB20),
            "viridis" => (Gradient, VIRIDIS),
            "Greys" => (Gradient, GREYS),
            "Blues" => (Gradient, BLUES),
            "Reds" => (Gradient, REDS),
            "Greens" => (Gradient, GREENS),
            _ => return Err(ColorError::UnknownColormap(name.to_string())),
        };
        Ok(Self {
            name: name.to_string(),
            kind,
            stops: table.iter().map(|&v| Rgb::hex(v)).collect(),
        })
    }

    /// Number of distinct entries of a listed map
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Color at fraction `t` in [0, 1] (clamped). Listed maps pick the
    /// nearest-lower entry, gradients interpolate between stops.
    pub fn sample(&self, t: f64) -> Rgb {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let n = self.stops.len();
        match self.kind {
            ColormapKind::Listed => self.stops[((t * n as f64) as usize).min(n - 1)],
            ColormapKind::Gradient => {
                let pos = t * (n - 1) as f64;
                let i = (pos.floor() as usize).min(n - 2);
                self.stops[i].mix(&self.stops[i + 1], pos - i as f64)
            }
        }
    }

    /// `count` colors spread over the map, one per contour level.
    pub fn spread(&self, count: usize) -> Vec<Rgb> {
        match count {
            0 => Vec::new(),
            1 => vec![self.sample(0.5)],
            _ => (0..count)
                .map(|i| self.sample(i as f64 / (count - 1) as f64))
                .collect(),
        }
    }

    /// The `i`-th color of the fixed-length cycle palette.
    fn cycle_entry(&self, i: usize) -> Rgb {
        match self.kind {
            ColormapKind::Listed => self.stops[i % self.stops.len()],
            ColormapKind::Gradient => self.sample(i as f64 / (CYCLE_LEN - 1) as f64),
        }
    }
}

/// Request-scoped color generator: exactly [`CYCLE_LEN`] colors from one
/// colormap, then [`ColorError::ColorCycleExhausted`].
#[derive(Debug, Clone)]
pub struct ColorCycle {
    colormap: Colormap,
    position: usize,
}

impl ColorCycle {
    pub fn new(colormap: Colormap) -> Self {
        Self {
            colormap,
            position: 0,
        }
    }

    pub fn next(&mut self) -> Result<Rgb, ColorError> {
        if self.position >= CYCLE_LEN {
            return Err(ColorError::ColorCycleExhausted(CYCLE_LEN));
        }
        let color = self.colormap.cycle_entry(self.position);
        if self.colormap.kind == ColormapKind::Listed && self.position >= self.colormap.len() {
            log::warn!(
                "Colormap '{}' has only {} colors; reusing {} for spectrum {}",
                self.colormap.name,
                self.colormap.len(),
                color,
                self.position + 1
            );
        }
        self.position += 1;
        Ok(color)
    }

    /// Colors handed out so far
    pub fn position(&self) -> usize {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color_forms() {
        assert_eq!(parse_color("#1a4780").unwrap(), Rgb(0x1a, 0x47, 0x80));
        assert_eq!(parse_color("#fff").unwrap(), Rgb::WHITE);
        assert_eq!(parse_color("Red").unwrap(), Rgb(255, 0, 0));
        assert_eq!(parse_color(" k ").unwrap(), Rgb::BLACK);
        assert!(matches!(
            parse_color("#12345"),
            Err(ColorError::InvalidColor(_))
        ));
        assert!(parse_color("#gg0000").is_err());
        assert!(parse_color("chartreuse-ish").is_err());
        assert_eq!(parse_color("orange").unwrap(), Rgb(0xff, 0xa5, 0x00));
        assert_eq!(parse_color("steelblue").unwrap(), Rgb(0x46, 0x82, 0xb4));
    }

    #[test]
    fn test_gradient_midpoint_mixes_in_linear_light() {
        let greys = Colormap::by_name("Greys").unwrap();
        let two = Colormap {
            name: "bw".to_string(),
            kind: ColormapKind::Gradient,
            stops: vec![Rgb::WHITE, Rgb::BLACK],
        };
        // half intensity in linear light is ~188 in sRGB, not 128
        let mid = two.sample(0.5);
        assert_eq!(mid.0, mid.1);
        assert!((185..=190).contains(&mid.0), "{:?}", mid);
        assert_eq!(greys.sample(0.0), Rgb::WHITE);
    }

    #[test]
    fn test_unknown_colormap() {
        assert_eq!(
            Colormap::by_name("Jet2"),
            Err(ColorError::UnknownColormap("Jet2".to_string()))
        );
    }

    #[test]
    fn test_cycle_starts_with_set1_and_exhausts() {
        let mut cycle = ColorCycle::new(Colormap::by_name("Set1").unwrap());
        assert_eq!(cycle.next().unwrap(), Rgb(0xe4, 0x1a, 0x1c));
        assert_eq!(cycle.next().unwrap(), Rgb(0x37, 0x7e, 0xb8));
        for _ in 2..CYCLE_LEN {
            assert!(cycle.next().is_ok());
        }
        assert_eq!(cycle.position(), 20);
        assert_eq!(cycle.next(), Err(ColorError::ColorCycleExhausted(20)));
    }

    #[test]
    fn test_listed_cycle_wraps() {
        let mut cycle = ColorCycle::new(Colormap::by_name("Set1").unwrap());
        let colors: Vec<Rgb> = (0..10).map(|_| cycle.next().unwrap()).collect();
        assert_eq!(colors[9], colors[0]);
    }

    #[test]
    fn test_gradient_endpoints() {
        let greys = Colormap::by_name("Greys").unwrap();
        assert_eq!(greys.sample(0.0), Rgb::WHITE);
        assert_eq!(greys.sample(1.0), Rgb::BLACK);
        assert_eq!(greys.sample(7.0), Rgb::BLACK);
        let ramp = greys.spread(5);
        assert_eq!(ramp.len(), 5);
        assert!(ramp.windows(2).all(|w| w[1].0 <= w[0].0));
    }

    #[test]
    fn test_gradient_cycle_is_distinct() {
        let mut cycle = ColorCycle::new(Colormap::by_name("viridis").unwrap());
        let first = cycle.next().unwrap();
        let second = cycle.next().unwrap();
        assert_ne!(first, second);
        assert_eq!(first, Rgb(0x44, 0x01, 0x54));
    }
}
