/// Multi-spectrum contour overlay
///
/// Runs every spectrum entry of a request through load → tabulate →
/// filter → threshold → levels → reshape → draw, onto one shared
/// [`PlotSurface`], in declared order. All mutable state (color cycle,
/// labels) lives inside a single [`compose`] call.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::levels::LevelSpec;
use super::threshold::{self, ThresholdError, ThresholdSpec};
use crate::data::nmrpipe_format::ReadError;
use crate::data::query::{Predicate, QueryError};
use crate::data::table::{GridError, SpectrumTable, TableError};
use crate::data::SpectrumSource;
use crate::render::colors::{ColorCycle, ColorError, Colormap, Rgb};
use crate::render::export::ExportError;
use crate::render::figure::Figure;
use crate::render::{PlotSurface, StrokeStyle};

pub const DEFAULT_LINEWIDTH: f64 = 0.5;
pub const DEFAULT_CMAP: &str = "Set1";

/// Failure while processing one spectrum entry.
#[derive(Error, Debug)]
pub enum EntryError {
    #[error("{0}")]
    Read(#[from] ReadError),
    #[error("{0}")]
    Table(#[from] TableError),
    #[error("{0}")]
    Query(#[from] QueryError),
    #[error("data has {rank} dimension(s); contour plots need 2D or 3D data")]
    Dimensionality { rank: usize },
    #[error("{0}")]
    Threshold(#[from] ThresholdError),
    #[error("no '{0}' column to place contours on (axis not calibrated, or declared pseudo-dimension)")]
    MissingUnitColumn(String),
    #[error("cannot reshape {rows} rows into a {ny} x {nx} grid; select a single plane with a query")]
    GridShape { rows: usize, ny: usize, nx: usize },
    #[error("{0}")]
    Color(#[from] ColorError),
    #[error("no rows to contour: query '{query}' matched nothing")]
    EmptySelection { query: String },
}

impl From<GridError> for EntryError {
    fn from(e: GridError) -> Self {
        match e {
            GridError::MissingUnitColumn(column) => EntryError::MissingUnitColumn(column),
            GridError::Shape { rows, ny, nx } => EntryError::GridShape { rows, ny, nx },
            GridError::Empty => EntryError::EmptySelection {
                query: String::new(),
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("spectrum '{entry}': {source}")]
    Entry {
        entry: String,
        #[source]
        source: EntryError,
    },
    #[error("contour colors: {0}")]
    Colormap(ColorError),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

impl OverlayError {
    /// Identity (display name, else path) of the failing entry
    pub fn entry(&self) -> Option<&str> {
        match self {
            OverlayError::Entry { entry, .. } => Some(entry.as_str()),
            _ => None,
        }
    }
}

/// Where contour colors come from: explicit colors win over a colormap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColorSpec {
    Colors(Vec<Rgb>),
    Colormap(String),
}

impl ColorSpec {
    /// Per-level colors for `count` levels.
    pub fn resolve(&self, count: usize) -> Result<Vec<Rgb>, ColorError> {
        match self {
            ColorSpec::Colors(colors) if !colors.is_empty() => Ok(colors.clone()),
            ColorSpec::Colors(_) => Ok(vec![Rgb::BLACK]),
            ColorSpec::Colormap(name) => Ok(Colormap::by_name(name)?.spread(count)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContourStyle {
    pub colors: ColorSpec,
    pub linewidth: f64,
    pub levels: LevelSpec,
}

impl Default for ContourStyle {
    fn default() -> Self {
        Self {
            colors: ColorSpec::Colormap(DEFAULT_CMAP.to_string()),
            linewidth: DEFAULT_LINEWIDTH,
            levels: LevelSpec::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumEntry {
    pub path: PathBuf,
    pub name: Option<String>,
    pub pseudo_dim: Option<usize>,
    pub query: Option<String>,
    pub threshold: ThresholdSpec,
    pub show_cs: bool,
    /// Explicit colors; skip the color cycle when set
    pub colors: Option<Vec<Rgb>>,
    /// Enables negative contours
    pub negative: Option<ContourStyle>,
    pub contour_num: Option<usize>,
    pub contour_factor: Option<f64>,
}

impl SpectrumEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
            pseudo_dim: None,
            query: None,
            threshold: ThresholdSpec::AutoSplit,
            show_cs: false,
            colors: None,
            negative: None,
            contour_num: None,
            contour_factor: None,
        }
    }

    /// Display name if set, else the data path
    pub fn identity(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn level_spec(&self, base: LevelSpec) -> LevelSpec {
        LevelSpec {
            count: self.contour_num.unwrap_or(base.count),
            factor: self.contour_factor.unwrap_or(base.factor),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub dir: PathBuf,
    /// Extensions including the dot, e.g. `.png`
    pub formats: Vec<String>,
    pub fname: String,
    pub width: u32,
    pub height: u32,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./"),
            formats: vec![".pdf".to_string(), ".png".to_string()],
            fname: "test".to_string(),
            width: 1600,
            height: 1200,
        }
    }
}

impl OutputSpec {
    /// `<dir>/<fname><ext>` for every requested format
    pub fn paths(&self) -> Vec<PathBuf> {
        self.formats
            .iter()
            .map(|ext| {
                let ext = if ext.starts_with('.') {
                    ext.clone()
                } else {
                    format!(".{}", ext)
                };
                self.dir.join(format!("{}{}", self.fname, ext))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRequest {
    pub entries: Vec<SpectrumEntry>,
    pub output: OutputSpec,
    /// Global style; its colormap seeds the color cycle
    pub style: ContourStyle,
}

/// What was drawn for one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedEntry {
    pub identity: String,
    pub path: PathBuf,
    pub query: Option<String>,
    pub rows: usize,
    pub threshold_method: String,
    pub threshold: f64,
    pub levels: Vec<f64>,
    pub color: Rgb,
    pub negative_threshold: Option<f64>,
    pub legend_label: Option<String>,
}

/// Scientific notation with a signed, zero-padded two-digit exponent
/// (`1.00e+07`), as used in contour-start legend labels.
pub fn format_sci(value: f64, precision: usize) -> String {
    let s = format!("{:.*e}", precision, value);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => s,
    }
}

/// Draw every entry of `request` onto `surface`, then invert both axes.
///
/// The first failing entry aborts the whole request.
pub fn compose<S, P>(
    request: &OverlayRequest,
    source: &S,
    surface: &mut P,
) -> Result<Vec<RenderedEntry>, OverlayError>
where
    S: SpectrumSource + ?Sized,
    P: PlotSurface + ?Sized,
{
    let cycle_map = match &request.style.colors {
        ColorSpec::Colormap(name) => name.as_str(),
        ColorSpec::Colors(_) => DEFAULT_CMAP,
    };
    let mut cycle = ColorCycle::new(Colormap::by_name(cycle_map).map_err(OverlayError::Colormap)?);
    let mut labelled = false;
    let mut rendered = Vec::with_capacity(request.entries.len());

    for (i, entry) in request.entries.iter().enumerate() {
        log::info!(
            "[{}/{}] {}",
            i + 1,
            request.entries.len(),
            entry.identity()
        );
        let drawn = draw_entry(entry, &request.style, source, surface, &mut cycle, &mut labelled)
            .map_err(|source| OverlayError::Entry {
                entry: entry.identity(),
                source,
            })?;
        rendered.push(drawn);
    }

    surface.invert_xaxis();
    surface.invert_yaxis();
    Ok(rendered)
}

fn draw_entry<S, P>(
    entry: &SpectrumEntry,
    style: &ContourStyle,
    source: &S,
    surface: &mut P,
    cycle: &mut ColorCycle,
    labelled: &mut bool,
) -> Result<RenderedEntry, EntryError>
where
    S: SpectrumSource + ?Sized,
    P: PlotSurface + ?Sized,
{
    let spectrum = source.load(&entry.path)?;
    let table = SpectrumTable::from_spectrum(&spectrum, entry.pseudo_dim)?;
    let table = match &entry.query {
        Some(q) => table.filter(&Predicate::parse(q)?)?,
        None => table,
    };
    if table.is_empty() {
        return Err(EntryError::EmptySelection {
            query: entry.query.clone().unwrap_or_default(),
        });
    }
    if table.rank() < 2 {
        return Err(EntryError::Dimensionality { rank: table.rank() });
    }

    let cs = threshold::resolve(table.intensity(), &entry.threshold)?;
    let level_spec = entry.level_spec(style.levels);
    let levels = level_spec.levels_from(cs);
    log::debug!(
        "{}: threshold {} -> {:.3e}, {} rows",
        entry.identity(),
        entry.threshold,
        cs,
        table.len()
    );
    let grid = table.ppm_grid()?;

    let negative_threshold = match &entry.negative {
        Some(neg_style) => {
            let negated = grid.negated();
            let neg_cs = threshold::resolve(&negated.values, &entry.threshold)?;
            let neg_levels = entry.level_spec(neg_style.levels).levels_from(neg_cs);
            let stroke = StrokeStyle {
                colors: neg_style.colors.resolve(neg_levels.len())?,
                width: neg_style.linewidth,
            };
            surface.contour(&negated, &neg_levels, &stroke);
            Some(neg_cs)
        }
        None => None,
    };

    let colors = match &entry.colors {
        Some(colors) if !colors.is_empty() => colors.clone(),
        _ => vec![cycle.next()?],
    };
    let color = colors[0];
    surface.contour(
        &grid,
        &levels,
        &StrokeStyle {
            colors,
            width: style.linewidth,
        },
    );

    if !*labelled {
        let label = |axis: &str| format!("{} ppm", table.axis_label(axis).unwrap_or(axis));
        surface.set_xlabel(&label("X"));
        surface.set_ylabel(&label("Y"));
        *labelled = true;
    }

    let legend_label = entry.name.as_ref().map(|name| {
        if entry.show_cs {
            format!("{} (cs={})", name, format_sci(cs, 2))
        } else {
            name.clone()
        }
    });
    if let Some(label) = &legend_label {
        surface.add_legend_entry(label, color);
    }

    Ok(RenderedEntry {
        identity: entry.identity(),
        path: entry.path.clone(),
        query: entry.query.clone(),
        rows: table.len(),
        threshold_method: entry.threshold.to_string(),
        threshold: cs,
        levels,
        color,
        negative_threshold,
        legend_label,
    })
}

/// Compose onto a fresh [`Figure`] and export every requested format.
///
/// Nothing is written unless every entry rendered.
pub fn render<S: SpectrumSource + ?Sized>(
    request: &OverlayRequest,
    source: &S,
) -> Result<(Figure, Vec<RenderedEntry>, Vec<PathBuf>), OverlayError> {
    let mut figure = Figure::new();
    let rendered = compose(request, source, &mut figure)?;
    let paths = request.output.paths();
    if !paths.is_empty() {
        std::fs::create_dir_all(&request.output.dir).map_err(|source| ExportError::Io {
            path: request.output.dir.display().to_string(),
            source,
        })?;
    }
    for path in &paths {
        figure.save(path, request.output.width, request.output.height)?;
    }
    Ok((figure, rendered, paths))
}

/// Load a spectrum for inspection outside an overlay.
pub fn load_table<S: SpectrumSource + ?Sized>(
    source: &S,
    path: &Path,
    pseudo_dim: Option<usize>,
) -> Result<SpectrumTable, EntryError> {
    let spectrum = source.load(path)?;
    Ok(SpectrumTable::from_spectrum(&spectrum, pseudo_dim)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::spectrum::{AxisCalibration, CalibrationError, SpectrumData};
    use std::collections::HashMap;

    struct MemorySource(HashMap<PathBuf, SpectrumData>);

    impl SpectrumSource for MemorySource {
        fn load(&self, path: &Path) -> Result<SpectrumData, ReadError> {
            self.0.get(path).cloned().ok_or_else(|| {
                ReadError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    path.display().to_string(),
                ))
            })
        }
    }

    fn cal(dim: usize, label: &str, n: usize, offset: f64) -> Result<AxisCalibration, CalibrationError> {
        AxisCalibration::new(dim, label, n, offset, 0.1)
    }

    /// Gaussian peak with a negative dip, `ny` × `nx`
    fn hsqc(ny: usize, nx: usize, height: f64) -> SpectrumData {
        let values = (0..ny * nx)
            .map(|i| {
                let (r, c) = ((i / nx) as f64, (i % nx) as f64);
                let peak = height * (-((r - 4.0).powi(2) + (c - 4.0).powi(2)) / 3.0).exp();
                let dip = -0.5 * height * (-((r - 10.0).powi(2) + (c - 10.0).powi(2)) / 3.0).exp();
                peak + dip
            })
            .collect();
        SpectrumData {
            source_path: PathBuf::from("hsqc.ft2"),
            shape: vec![ny, nx],
            values,
            calibrations: vec![cal(0, "13C", ny, 130.0), cal(1, "1H", nx, 9.0)],
        }
    }

    fn proton() -> SpectrumData {
        SpectrumData {
            source_path: PathBuf::from("proton.ft1"),
            shape: vec![8],
            values: (0..8).map(|i| i as f64).collect(),
            calibrations: vec![cal(0, "1H", 8, 9.0)],
        }
    }

    fn pseudo3d() -> SpectrumData {
        let plane = hsqc(14, 14, 100.0).values;
        let mut values = plane.clone();
        values.extend(plane.iter().map(|v| v * 0.5));
        SpectrumData {
            source_path: PathBuf::from("relax.ft3"),
            shape: vec![2, 14, 14],
            values,
            calibrations: vec![
                Err(CalibrationError::Missing { dim: 0 }),
                cal(1, "15N", 14, 125.0),
                cal(2, "1H", 14, 9.0),
            ],
        }
    }

    fn source() -> MemorySource {
        MemorySource(HashMap::from([
            (PathBuf::from("hsqc.ft2"), hsqc(14, 14, 1e7)),
            (PathBuf::from("proton.ft1"), proton()),
            (PathBuf::from("relax.ft3"), pseudo3d()),
        ]))
    }

    fn request(entries: Vec<SpectrumEntry>) -> OverlayRequest {
        OverlayRequest {
            entries,
            output: OutputSpec::default(),
            style: ContourStyle::default(),
        }
    }

    #[test]
    fn test_one_dimensional_entry_is_rejected_with_identity() {
        let mut proton_entry = SpectrumEntry::new("proton.ft1");
        proton_entry.name = Some("Proton".to_string());
        let req = request(vec![SpectrumEntry::new("hsqc.ft2"), proton_entry]);
        let mut fig = Figure::new();
        let err = compose(&req, &source(), &mut fig).unwrap_err();
        assert_eq!(err.entry(), Some("Proton"));
        assert!(matches!(
            err,
            OverlayError::Entry {
                source: EntryError::Dimensionality { rank: 1 },
                ..
            }
        ));
        assert!(err.to_string().contains("Proton"));
    }

    #[test]
    fn test_show_cs_appends_threshold_to_legend() {
        let mut entry = SpectrumEntry::new("hsqc.ft2");
        entry.name = Some("HSQC".to_string());
        entry.show_cs = true;
        entry.threshold = ThresholdSpec::Fixed(1e5);
        let mut fig = Figure::new();
        let out = compose(&request(vec![entry]), &source(), &mut fig).unwrap();
        assert_eq!(fig.legend().len(), 1);
        assert_eq!(fig.legend()[0].0, "HSQC (cs=1.00e+05)");
        assert_eq!(out[0].threshold, 1e5);
        assert_eq!(out[0].levels.len(), 10);
        assert!((out[0].levels[1] - 1.2e5).abs() < 1e-6);
    }

    #[test]
    fn test_unnamed_entry_has_no_legend() {
        let mut fig = Figure::new();
        compose(&request(vec![SpectrumEntry::new("hsqc.ft2")]), &source(), &mut fig).unwrap();
        assert!(fig.legend().is_empty());
        assert_eq!(fig.layer_count(), 1);
        assert!(fig.line_count() > 0);
    }

    #[test]
    fn test_cycle_colors_and_explicit_colors() {
        let mut a = SpectrumEntry::new("hsqc.ft2");
        a.name = Some("a".to_string());
        let mut b = SpectrumEntry::new("hsqc.ft2");
        b.name = Some("b".to_string());
        b.colors = Some(vec![Rgb(1, 2, 3)]);
        let mut c = SpectrumEntry::new("hsqc.ft2");
        c.name = Some("c".to_string());
        let mut fig = Figure::new();
        compose(&request(vec![a, b, c]), &source(), &mut fig).unwrap();
        let colors: Vec<Rgb> = fig.legend().iter().map(|(_, c)| *c).collect();
        // Set1 red, explicit, then Set1 blue: explicit colors leave the cycle alone
        assert_eq!(colors, vec![Rgb(0xe4, 0x1a, 0x1c), Rgb(1, 2, 3), Rgb(0x37, 0x7e, 0xb8)]);
    }

    #[test]
    fn test_cycle_exhaustion_aborts() {
        let entries = (0..21).map(|_| SpectrumEntry::new("hsqc.ft2")).collect();
        let mut fig = Figure::new();
        let err = compose(&request(entries), &source(), &mut fig).unwrap_err();
        assert!(matches!(
            err,
            OverlayError::Entry {
                source: EntryError::Color(ColorError::ColorCycleExhausted(20)),
                ..
            }
        ));
    }

    #[test]
    fn test_axes_inverted_and_labelled() {
        let mut fig = Figure::new();
        compose(&request(vec![SpectrumEntry::new("hsqc.ft2")]), &source(), &mut fig).unwrap();
        assert!(fig.x_inverted() && fig.y_inverted());
        assert_eq!(fig.xlabel(), "1H ppm");
        assert_eq!(fig.ylabel(), "13C ppm");
        let e = fig.data_extent().unwrap();
        assert!((e.x_max() - 9.0).abs() < 1e-12);
        assert!((e.x_min() - 7.7).abs() < 1e-9);
    }

    #[test]
    fn test_query_selects_plane_of_pseudo_3d() {
        let mut entry = SpectrumEntry::new("relax.ft3");
        entry.pseudo_dim = Some(0);
        entry.query = Some("Z==1".to_string());
        let mut fig = Figure::new();
        let out = compose(&request(vec![entry.clone()]), &source(), &mut fig).unwrap();
        assert_eq!(out[0].rows, 196);
        assert_eq!(fig.ylabel(), "15N ppm");

        entry.query = None;
        let err = compose(&request(vec![entry]), &source(), &mut Figure::new()).unwrap_err();
        assert!(matches!(
            err,
            OverlayError::Entry {
                source: EntryError::GridShape { rows: 392, ny: 14, nx: 14 },
                ..
            }
        ));
    }

    #[test]
    fn test_query_matching_nothing_is_reported() {
        let mut entry = SpectrumEntry::new("relax.ft3");
        entry.name = Some("T1 series".to_string());
        entry.pseudo_dim = Some(0);
        entry.query = Some("Z==7".to_string());
        let err = compose(&request(vec![entry]), &source(), &mut Figure::new()).unwrap_err();
        assert_eq!(err.entry(), Some("T1 series"));
        match err {
            OverlayError::Entry {
                source: EntryError::EmptySelection { query },
                ..
            } => assert_eq!(query, "Z==7"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_query_column_names_the_path() {
        let mut entry = SpectrumEntry::new("hsqc.ft2");
        entry.query = Some("W_PPM > 3".to_string());
        let err = compose(&request(vec![entry]), &source(), &mut Figure::new()).unwrap_err();
        assert_eq!(err.entry(), Some("hsqc.ft2"));
        assert!(matches!(
            err,
            OverlayError::Entry {
                source: EntryError::Query(QueryError::FilterColumn { .. }),
                ..
            }
        ));
    }

    #[test]
    fn test_negative_contours_get_own_threshold() {
        let mut entry = SpectrumEntry::new("hsqc.ft2");
        entry.threshold = ThresholdSpec::Statistical { nstd: 0.5 };
        entry.negative = Some(ContourStyle {
            colors: ColorSpec::Colors(vec![Rgb(255, 0, 0)]),
            ..ContourStyle::default()
        });
        let mut fig = Figure::new();
        let out = compose(&request(vec![entry]), &source(), &mut fig).unwrap();
        assert_eq!(fig.layer_count(), 2);
        let negated: Vec<f64> = hsqc(14, 14, 1e7).values.iter().map(|v| -v).collect();
        let neg = out[0].negative_threshold.unwrap();
        assert_eq!(neg, threshold::statistical(&negated, 0.5).unwrap());
        assert!(neg > 0.0);
    }

    #[test]
    fn test_missing_source_reports_read_error() {
        let err = compose(
            &request(vec![SpectrumEntry::new("nope.ft2")]),
            &source(),
            &mut Figure::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OverlayError::Entry {
                source: EntryError::Read(_),
                ..
            }
        ));
    }

    #[test]
    fn test_format_sci() {
        assert_eq!(format_sci(1e7, 2), "1.00e+07");
        assert_eq!(format_sci(12345.0, 2), "1.23e+04");
        assert_eq!(format_sci(0.00042, 2), "4.20e-04");
    }

    #[test]
    fn test_output_paths() {
        let out = OutputSpec {
            dir: PathBuf::from("plots"),
            formats: vec![".pdf".into(), "png".into()],
            fname: "hsqc".into(),
            ..OutputSpec::default()
        };
        assert_eq!(
            out.paths(),
            vec![PathBuf::from("plots/hsqc.pdf"), PathBuf::from("plots/hsqc.png")]
        );
    }

    #[test]
    fn test_render_writes_nothing_on_failure() {
        let dir = std::env::temp_dir().join(format!("nmr_contour_render_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut req = request(vec![SpectrumEntry::new("hsqc.ft2"), SpectrumEntry::new("proton.ft1")]);
        req.output.dir = dir.clone();
        req.output.formats = vec![".svg".to_string()];
        assert!(render(&req, &source()).is_err());
        assert!(!dir.join("test.svg").exists());

        req.entries.pop();
        req.output.width = 400;
        req.output.height = 300;
        let (_, rendered, paths) = render(&req, &source()).unwrap();
        assert_eq!(rendered.len(), 1);
        assert!(paths[0].exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
