/// Long-form spectrum table
///
/// One row per sample point of a 1D/2D/3D spectrum. Index columns are named
/// `Z`, `Y`, `X` (innermost axis always `X`), followed by `intensity` and one
/// `<axis>_PPM` column per calibrated, non-pseudo axis. Rows follow the
/// nested traversal Z → Y → X, so grouping by the outer indices and
/// reshaping `intensity` reproduces the original array.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use thiserror::Error;

use super::grid::{Extent, Grid};
use super::query::{Predicate, QueryError};
use super::spectrum::{AxisCalibration, CalibrationError, SpectrumData};

pub const INTENSITY: &str = "intensity";
pub const PPM_SUFFIX: &str = "_PPM";
const AXIS_NAMES: [&str; 3] = ["Z", "Y", "X"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("unsupported array rank {0}: only 1, 2 or 3 dimensions can be tabulated")]
    UnsupportedRank(usize),
    #[error("array holds {actual} values but its shape {shape:?} needs {expected}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// Why a table cannot be reshaped into a contourable grid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("table has no '{0}' column (axis not calibrated, or declared pseudo-dimension)")]
    MissingUnitColumn(String),
    #[error("cannot reshape {rows} rows into {ny} x {nx} grid; select a single plane with a query")]
    Shape { rows: usize, ny: usize, nx: usize },
    #[error("table is empty after filtering")]
    Empty,
}

/// Index-column names for an array of the given rank.
pub fn axis_names(rank: usize) -> &'static [&'static str] {
    &AXIS_NAMES[AXIS_NAMES.len() - rank.min(AXIS_NAMES.len())..]
}

/// Name of the ppm column for an axis, e.g. `X` → `X_PPM`.
pub fn ppm_column(axis: &str) -> String {
    format!("{}{}", axis, PPM_SUFFIX)
}

#[derive(Debug, Clone, PartialEq)]
enum ColumnData {
    Index(Vec<usize>),
    Float(Vec<f64>),
}

impl ColumnData {
    fn value(&self, row: usize) -> f64 {
        match self {
            ColumnData::Index(v) => v[row] as f64,
            ColumnData::Float(v) => v[row],
        }
    }

    fn select(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Index(v) => ColumnData::Index(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Float(v) => ColumnData::Float(rows.iter().map(|&r| v[r]).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Column {
    name: String,
    data: ColumnData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumTable {
    rank: usize,
    /// Shape of the originating array (unchanged by filtering)
    shape: Vec<usize>,
    pseudo_dim: Option<usize>,
    columns: Vec<Column>,
    /// Axis name → nucleus label, for calibrated axes only
    axis_labels: BTreeMap<String, String>,
    len: usize,
}

impl SpectrumTable {
    /// Flatten `values` (row-major, shape outermost first) into a table.
    ///
    /// `calibrations` has one slot per axis; a failed or missing slot just
    /// means that axis gets no ppm column.
    pub fn build(
        values: &[f64],
        shape: &[usize],
        calibrations: &[Result<AxisCalibration, CalibrationError>],
        pseudo_dim: Option<usize>,
    ) -> Result<Self, TableError> {
        let rank = shape.len();
        if !(1..=3).contains(&rank) {
            return Err(TableError::UnsupportedRank(rank));
        }
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(TableError::ShapeMismatch {
                shape: shape.to_vec(),
                expected,
                actual: values.len(),
            });
        }
        if let Some(p) = pseudo_dim.filter(|&p| p >= rank) {
            log::warn!(
                "pseudo_dim {} is out of range for a {}D spectrum, ignoring",
                p,
                rank
            );
        }

        let names = axis_names(rank);
        let mut columns = Vec::with_capacity(2 * rank + 1);
        let mut indices: Vec<Vec<usize>> = Vec::with_capacity(rank);

        // Nested traversal: stride of axis k is the product of the inner extents
        for dim in 0..rank {
            let stride: usize = shape[dim + 1..].iter().product();
            let extent = shape[dim];
            let idx: Vec<usize> = (0..expected).map(|row| (row / stride) % extent).collect();
            indices.push(idx);
        }
        for (dim, idx) in indices.iter().enumerate() {
            columns.push(Column {
                name: names[dim].to_string(),
                data: ColumnData::Index(idx.clone()),
            });
        }
        columns.push(Column {
            name: INTENSITY.to_string(),
            data: ColumnData::Float(values.to_vec()),
        });

        let mut axis_labels = BTreeMap::new();
        for (dim, idx) in indices.iter().enumerate() {
            let axis = names[dim];
            if pseudo_dim == Some(dim) {
                log::info!("Skipping pseudo dimension {} ({})", dim, axis);
                continue;
            }
            let calibration = match calibrations.get(dim) {
                Some(Ok(cal)) => cal,
                Some(Err(e)) => {
                    log::warn!("No {} column: {}", ppm_column(axis), e);
                    continue;
                }
                None => {
                    log::warn!(
                        "No {} column: {}",
                        ppm_column(axis),
                        CalibrationError::Missing { dim }
                    );
                    continue;
                }
            };
            let ppm: Vec<f64> = idx.iter().map(|&i| calibration.index_to_unit(i)).collect();
            columns.push(Column {
                name: ppm_column(axis),
                data: ColumnData::Float(ppm),
            });
            axis_labels.insert(axis.to_string(), calibration.label.clone());
        }

        Ok(Self {
            rank,
            shape: shape.to_vec(),
            pseudo_dim: pseudo_dim.filter(|&p| p < rank),
            columns,
            axis_labels,
            len: expected,
        })
    }

    pub fn from_spectrum(
        spectrum: &SpectrumData,
        pseudo_dim: Option<usize>,
    ) -> Result<Self, TableError> {
        Self::build(
            &spectrum.values,
            &spectrum.shape,
            &spectrum.calibrations,
            pseudo_dim,
        )
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Rank of the originating array
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn pseudo_dim(&self) -> Option<usize> {
        self.pseudo_dim
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Values of a column as floats
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let col = self.columns.iter().find(|c| c.name == name)?;
        Some(match &col.data {
            ColumnData::Index(v) => v.iter().map(|&i| i as f64).collect(),
            ColumnData::Float(v) => v.clone(),
        })
    }

    /// Values of an index column (`Z`, `Y`, `X`)
    pub fn index_column(&self, name: &str) -> Option<&[usize]> {
        match &self.columns.iter().find(|c| c.name == name)?.data {
            ColumnData::Index(v) => Some(v),
            ColumnData::Float(_) => None,
        }
    }

    pub fn intensity(&self) -> &[f64] {
        match self.columns.iter().find(|c| c.name == INTENSITY).map(|c| &c.data) {
            Some(ColumnData::Float(v)) => v,
            _ => &[],
        }
    }

    /// Nucleus label of a calibrated axis (`"X"`, `"Y"`, `"Z"`)
    pub fn axis_label(&self, axis: &str) -> Option<&str> {
        self.axis_labels.get(axis).map(|s| s.as_str())
    }

    /// Number of distinct values in a column (-0.0 and 0.0 count once).
    pub fn unique_count(&self, name: &str) -> Option<usize> {
        let values = self.column(name)?;
        let set: HashSet<u64> = values.iter().map(|v| (v + 0.0).to_bits()).collect();
        Some(set.len())
    }

    /// Rows for which `predicate` holds, as a new table with the same
    /// originating rank and shape.
    pub fn filter(&self, predicate: &Predicate) -> Result<SpectrumTable, QueryError> {
        let bound = predicate.bind(&self.column_names())?;
        let rows: Vec<usize> = (0..self.len)
            .filter(|&row| bound.matches(|c| self.columns[c].data.value(row)))
            .collect();
        log::debug!(
            "Query '{}' kept {} of {} rows",
            predicate.source(),
            rows.len(),
            self.len
        );
        Ok(SpectrumTable {
            rank: self.rank,
            shape: self.shape.clone(),
            pseudo_dim: self.pseudo_dim,
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.select(&rows),
                })
                .collect(),
            axis_labels: self.axis_labels.clone(),
            len: rows.len(),
        })
    }

    /// Reshape `intensity` into `unique(Y_PPM)` rows × `unique(X_PPM)`
    /// columns. Only valid because rows keep the Y-outer / X-inner order.
    pub fn ppm_grid(&self) -> Result<Grid, GridError> {
        let x_name = ppm_column("X");
        let y_name = ppm_column("Y");
        let x = self
            .column(&x_name)
            .ok_or_else(|| GridError::MissingUnitColumn(x_name.clone()))?;
        let y = self
            .column(&y_name)
            .ok_or_else(|| GridError::MissingUnitColumn(y_name.clone()))?;
        if self.is_empty() {
            return Err(GridError::Empty);
        }
        let nx = self.unique_count(&x_name).unwrap_or(0);
        let ny = self.unique_count(&y_name).unwrap_or(0);
        if nx * ny != self.len {
            return Err(GridError::Shape {
                rows: self.len,
                ny,
                nx,
            });
        }

        let (x_min, x_max) = min_max(&x);
        let (y_min, y_max) = min_max(&y);
        Ok(Grid {
            rows: ny,
            cols: nx,
            values: self.intensity().to_vec(),
            extent: Extent {
                x_start: x_max,
                x_end: x_min,
                y_start: y_max,
                y_end: y_min,
            },
        })
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, out: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(self.column_names())?;
        let mut record = Vec::with_capacity(self.columns.len());
        for row in 0..self.len {
            record.clear();
            record.extend(self.columns.iter().map(|col| match &col.data {
                ColumnData::Index(v) => v[row].to_string(),
                ColumnData::Float(v) => v[row].to_string(),
            }));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trivial(dim: usize, n: usize) -> Result<AxisCalibration, CalibrationError> {
        AxisCalibration::new(dim, "1H", n, 0.0, 1.0)
    }

    fn table_2x3() -> SpectrumTable {
        SpectrumTable::build(
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            &[2, 3],
            &[trivial(0, 2), trivial(1, 3)],
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_column_naming_per_rank() {
        let t1 = SpectrumTable::build(&[1.0, 2.0], &[2], &[], None).unwrap();
        assert_eq!(t1.column_names(), vec!["X", "intensity"]);

        let t2 = table_2x3();
        assert_eq!(t2.column_names(), vec!["Y", "X", "intensity", "Y_PPM", "X_PPM"]);

        let t3 = SpectrumTable::build(&[0.0; 8], &[2, 2, 2], &[], None).unwrap();
        assert_eq!(t3.column_names(), vec!["Z", "Y", "X", "intensity"]);
    }

    #[test]
    fn test_row_count_is_product_of_shape() {
        for shape in [vec![7], vec![3, 5], vec![2, 3, 4]] {
            let n: usize = shape.iter().product();
            let values: Vec<f64> = (0..n).map(|v| v as f64).collect();
            let t = SpectrumTable::build(&values, &shape, &[], None).unwrap();
            assert_eq!(t.len(), n);
            assert_eq!(t.intensity(), values.as_slice());
        }
    }

    #[test]
    fn test_unsupported_rank() {
        assert_eq!(
            SpectrumTable::build(&[0.0; 16], &[2, 2, 2, 2], &[], None),
            Err(TableError::UnsupportedRank(4))
        );
        assert_eq!(
            SpectrumTable::build(&[], &[], &[], None),
            Err(TableError::UnsupportedRank(0))
        );
        assert!(matches!(
            SpectrumTable::build(&[0.0; 5], &[2, 3], &[], None),
            Err(TableError::ShapeMismatch { expected: 6, .. })
        ));
    }

    #[test]
    fn test_reshape_round_trip() {
        let (ny, nx) = (4, 5);
        let values: Vec<f64> = (0..ny * nx).map(|v| (v * v) as f64 - 3.0).collect();
        let t = SpectrumTable::build(&values, &[ny, nx], &[], None).unwrap();

        let y = t.index_column("Y").unwrap();
        let mut rebuilt = vec![vec![0.0; nx]; ny];
        let mut counts = vec![0usize; ny];
        for (row, &v) in t.intensity().iter().enumerate() {
            rebuilt[y[row]][counts[y[row]]] = v;
            counts[y[row]] += 1;
        }
        for iy in 0..ny {
            assert_eq!(rebuilt[iy], values[iy * nx..(iy + 1) * nx].to_vec());
        }
    }

    #[test]
    fn test_end_to_end_2x3_grid() {
        let t = table_2x3();
        assert_eq!(t.len(), 6);
        let grid = t.ppm_grid().unwrap();
        assert_eq!((grid.rows, grid.cols), (2, 3));
        assert_eq!(grid.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(grid.row(1), &[4.0, 5.0, 6.0]);
        // offset 0, scale 1: X_PPM runs 0, -1, -2
        assert_eq!(grid.extent.x_start, 0.0);
        assert_eq!(grid.extent.x_end, -2.0);
        assert_eq!(grid.extent.y_end, -1.0);
    }

    #[test]
    fn test_ppm_columns_are_decreasing() {
        let t = table_2x3();
        let x = t.column("X_PPM").unwrap();
        assert_eq!(&x[..3], &[0.0, -1.0, -2.0]);
    }

    #[test]
    fn test_calibration_gap_omits_column() {
        let t = SpectrumTable::build(
            &[0.0; 6],
            &[2, 3],
            &[
                Err(CalibrationError::Missing { dim: 0 }),
                trivial(1, 3),
            ],
            None,
        )
        .unwrap();
        assert!(!t.has_column("Y_PPM"));
        assert!(t.has_column("X_PPM"));
        assert_eq!(t.axis_label("X"), Some("1H"));
        assert_eq!(
            t.ppm_grid(),
            Err(GridError::MissingUnitColumn("Y_PPM".into()))
        );
    }

    #[test]
    fn test_pseudo_dim_skipped() {
        let values: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let t = SpectrumTable::build(
            &values,
            &[2, 2, 3],
            &[trivial(0, 2), trivial(1, 2), trivial(2, 3)],
            Some(0),
        )
        .unwrap();
        assert_eq!(
            t.column_names(),
            vec!["Z", "Y", "X", "intensity", "Y_PPM", "X_PPM"]
        );
        assert_eq!(t.pseudo_dim(), Some(0));
    }

    #[test]
    fn test_filter_selects_plane() {
        let values: Vec<f64> = (0..24).map(|v| v as f64).collect();
        let t = SpectrumTable::build(
            &values,
            &[2, 3, 4],
            &[trivial(0, 2), trivial(1, 3), trivial(2, 4)],
            Some(0),
        )
        .unwrap();
        let plane = t.filter(&Predicate::parse("Z==0").unwrap()).unwrap();
        assert_eq!(plane.len(), 12);
        assert!(plane.index_column("Z").unwrap().iter().all(|&z| z == 0));
        assert_eq!(plane.rank(), 3);
        assert_eq!(plane.shape(), &[2, 3, 4]);

        let grid = plane.ppm_grid().unwrap();
        assert_eq!((grid.rows, grid.cols), (3, 4));
        assert_eq!(grid.row(2), &[8.0, 9.0, 10.0, 11.0]);

        // Unfiltered 3D table cannot be reshaped into one plane
        assert!(matches!(t.ppm_grid(), Err(GridError::Shape { rows: 24, .. })));
    }

    #[test]
    fn test_filter_on_missing_column() {
        let t = SpectrumTable::build(&[0.0; 6], &[2, 3], &[], None).unwrap();
        let err = t.filter(&Predicate::parse("X_PPM > 8").unwrap()).unwrap_err();
        assert!(matches!(err, QueryError::FilterColumn { ref column, .. } if column == "X_PPM"));
    }

    #[test]
    fn test_csv_export() {
        let t = table_2x3();
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "Y,X,intensity,Y_PPM,X_PPM");
        assert_eq!(lines[6], "1,2,6,-1,-2");
    }

    #[test]
    fn test_csv_export_reads_back() {
        let t = table_2x3();
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), t.column_names());
        let intensities: Vec<f64> = reader
            .records()
            .map(|r| r.unwrap()[2].parse().unwrap())
            .collect();
        assert_eq!(intensities, t.intensity());
    }
}
