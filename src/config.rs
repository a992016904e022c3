/// TOML overlay configuration
///
/// Deserialized with serde into plain structs (every table and most keys
/// optional, with the defaults below), then converted into an explicit
/// [`OverlayRequest`]. Unknown keys are rejected so typos surface.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::levels::{LevelSpec, DEFAULT_CONTOUR_FACTOR, DEFAULT_CONTOUR_NUM};
use crate::pipeline::overlay::{
    ColorSpec, ContourStyle, OutputSpec, OverlayRequest, SpectrumEntry, DEFAULT_CMAP,
    DEFAULT_LINEWIDTH,
};
use crate::pipeline::threshold::{ThresholdSpec, DEFAULT_NSTD};
use crate::render::colors::{parse_color, ColorError, Colormap, Rgb};

pub const SUPPORTED_FORMATS: [&str; 3] = [".pdf", ".png", ".svg"];
pub const DEFAULT_CONFIG_NAME: &str = "spectra.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("spectrum '{entry}': unknown threshold method '{value}' (use a number, \"auto-split\", \"otsu\" or \"statistical\")")]
    Threshold { entry: String, value: String },
    #[error("spectrum '{entry}': {source}")]
    Color {
        entry: String,
        #[source]
        source: ColorError,
    },
    #[error("[contour]: {0}")]
    Style(ColorError),
    #[error("unsupported output format '{0}' (supported: .pdf, .png, .svg)")]
    Format(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub contour: ContourConfig,
    #[serde(default)]
    pub spectra: Vec<SpectrumConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub fmt: Vec<String>,
    pub fname: String,
    pub width: u32,
    pub height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let spec = OutputSpec::default();
        Self {
            dir: spec.dir,
            fmt: spec.formats,
            fname: spec.fname,
            width: spec.width,
            height: spec.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContourConfig {
    pub linewidths: f64,
    pub cmap: String,
    pub contour_num: usize,
    pub contour_factor: f64,
    pub negative_contours: Option<NegativeContourConfig>,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            linewidths: DEFAULT_LINEWIDTH,
            cmap: DEFAULT_CMAP.to_string(),
            contour_num: DEFAULT_CONTOUR_NUM,
            contour_factor: DEFAULT_CONTOUR_FACTOR,
            negative_contours: None,
        }
    }
}

/// Style of negative contours; `colors` wins over `cmap`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NegativeContourConfig {
    pub colors: Option<Vec<String>>,
    pub cmap: Option<String>,
    pub linewidths: Option<f64>,
}

/// A threshold is either a number or a method name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdValue {
    Fixed(f64),
    Method(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpectrumConfig {
    pub path: PathBuf,
    pub name: Option<String>,
    pub query: Option<String>,
    pub pseudo_dim: Option<usize>,
    #[serde(default)]
    pub show_cs: bool,
    pub threshold: Option<ThresholdValue>,
    pub nstd: Option<f64>,
    pub colors: Option<Vec<String>>,
    pub contour_num: Option<usize>,
    pub contour_factor: Option<f64>,
}

impl SpectrumConfig {
    fn identity(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn threshold_spec(&self) -> Result<ThresholdSpec, ConfigError> {
        let spec = match &self.threshold {
            None => ThresholdSpec::AutoSplit,
            Some(ThresholdValue::Fixed(v)) => ThresholdSpec::Fixed(*v),
            Some(ThresholdValue::Method(m)) => match m.trim().to_ascii_lowercase().as_str() {
                "auto-split" | "otsu" => ThresholdSpec::AutoSplit,
                "statistical" => ThresholdSpec::Statistical {
                    nstd: self.nstd.unwrap_or(DEFAULT_NSTD),
                },
                _ => {
                    return Err(ConfigError::Threshold {
                        entry: self.identity(),
                        value: m.clone(),
                    })
                }
            },
        };
        if self.nstd.is_some() && !matches!(spec, ThresholdSpec::Statistical { .. }) {
            log::warn!(
                "{}: nstd only applies to the statistical threshold, ignoring",
                self.identity()
            );
        }
        Ok(spec)
    }
}

fn parse_colors(colors: &[String]) -> Result<Vec<Rgb>, ColorError> {
    colors.iter().map(|c| parse_color(c)).collect()
}

impl Config {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(io_error(path))?;
        let config = Self::parse(&text)?;
        log::debug!(
            "Loaded {} with {} spectra",
            path.display(),
            config.spectra.len()
        );
        Ok(config)
    }

    /// Resolve into a request; relative spectrum paths stay relative to the
    /// working directory.
    pub fn into_request(self) -> Result<OverlayRequest, ConfigError> {
        for fmt in &self.output.fmt {
            let normalized = if fmt.starts_with('.') {
                fmt.to_ascii_lowercase()
            } else {
                format!(".{}", fmt.to_ascii_lowercase())
            };
            if !SUPPORTED_FORMATS.contains(&normalized.as_str()) {
                return Err(ConfigError::Format(fmt.clone()));
            }
        }
        Colormap::by_name(&self.contour.cmap).map_err(ConfigError::Style)?;

        let levels = LevelSpec {
            count: self.contour.contour_num,
            factor: self.contour.contour_factor,
        };
        let negative = match &self.contour.negative_contours {
            Some(neg) => {
                let colors = match (&neg.colors, &neg.cmap) {
                    (Some(colors), _) => {
                        ColorSpec::Colors(parse_colors(colors).map_err(ConfigError::Style)?)
                    }
                    (None, Some(cmap)) => {
                        Colormap::by_name(cmap).map_err(ConfigError::Style)?;
                        ColorSpec::Colormap(cmap.clone())
                    }
                    (None, None) => ColorSpec::Colors(vec![Rgb::BLACK]),
                };
                Some(ContourStyle {
                    colors,
                    linewidth: neg.linewidths.unwrap_or(self.contour.linewidths),
                    levels,
                })
            }
            None => None,
        };

        let mut entries = Vec::with_capacity(self.spectra.len());
        for spectrum in &self.spectra {
            let colors = match &spectrum.colors {
                Some(colors) => Some(parse_colors(colors).map_err(|source| ConfigError::Color {
                    entry: spectrum.identity(),
                    source,
                })?),
                None => None,
            };
            entries.push(SpectrumEntry {
                path: spectrum.path.clone(),
                name: spectrum.name.clone(),
                pseudo_dim: spectrum.pseudo_dim,
                query: spectrum.query.clone(),
                threshold: spectrum.threshold_spec()?,
                show_cs: spectrum.show_cs,
                colors,
                negative: negative.clone(),
                contour_num: spectrum.contour_num,
                contour_factor: spectrum.contour_factor,
            });
        }
        if entries.is_empty() {
            log::warn!("No [[spectra]] entries; the figure will be empty");
        }

        Ok(OverlayRequest {
            entries,
            output: OutputSpec {
                dir: self.output.dir,
                formats: self.output.fmt,
                fname: self.output.fname,
                width: self.output.width,
                height: self.output.height,
            },
            style: ContourStyle {
                colors: ColorSpec::Colormap(self.contour.cmap),
                linewidth: self.contour.linewidths,
                levels,
            },
        })
    }
}

/// Starter configuration written by `new`.
pub fn template() -> &'static str {
    r#"[output]
dir = "./"
fmt = [".pdf", ".png"]
fname = "test"

[contour]
linewidths = 0.5
cmap = "Set1"
# contour_num = 10
# contour_factor = 1.2

# [contour.negative_contours]
# colors = ["red"]
# linewidths = 0.5

[[spectra]]
path = "test_pipe.ft2"
name = "Example 1"
query = "Z==0"
pseudo_dim = 0
show_cs = true

[[spectra]]
path = "test_pipe.ft2"
name = "Example 2"
query = "Z==0 & X_PPM > 8 & X_PPM < 9"
pseudo_dim = 0
show_cs = true
threshold = 1e7
"#
}

/// `<path>.backup`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

/// Write the template to `path`, first copying any existing file to its
/// backup path. Returns the backup path when one was made.
pub fn scaffold(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let backup = if path.exists() {
        let backup = backup_path(path);
        log::warn!("{} exists, copying to {}", path.display(), backup.display());
        fs::copy(path, &backup).map_err(io_error(&backup))?;
        Some(backup)
    } else {
        None
    };
    log::info!("Creating {}", path.display());
    fs::write(path, template()).map_err(io_error(path))?;
    Ok(backup)
}
