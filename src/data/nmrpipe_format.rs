/// NMRPipe format reader/writer
///
/// NMRPipe uses a 2048-byte (512 float32) header followed by spectral data.
/// This module reads 1D, 2D and single-file 3D spectra (.ft1/.ft2/.ft3) into
/// an n-dimensional array with per-axis ppm calibration, and can write real
/// spectra back out.

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use std::io;
use std::path::Path;
use thiserror::Error;

use super::spectrum::{AxisCalibration, SpectrumData};
use super::SpectrumSource;

/// NMRPipe header size: 512 float32 values = 2048 bytes
const HEADER_FLOATS: usize = 512;
const HEADER_BYTES: usize = HEADER_FLOATS * 4;
const FD_ORDER_CONS: f32 = 2.345;
const FD_IEEE_CONS: u32 = 0xEEEE_EEEE;

/// Key header indices (0-based, each is a float32 slot)
mod idx {
    pub const FDFLTFORMAT: usize = 1;
    pub const FDFLTORDER: usize = 2;
    pub const FDDIMCOUNT: usize = 9;
    pub const FDDIMORDER: usize = 24;
    pub const FDPIPEFLAG: usize = 57;
    pub const FDREALSIZE: usize = 97;
    pub const FDSIZE: usize = 99;
    pub const FDQUADFLAG: usize = 106;
    pub const FDSPECNUM: usize = 219;
}

/// Per-dimension slots, indexed by physical dimension F2, F1, F3, F4
mod dim {
    pub const SW: [usize; 4] = [100, 229, 11, 29];
    pub const OBS: [usize; 4] = [119, 218, 10, 28];
    pub const ORIG: [usize; 4] = [101, 249, 12, 30];
    pub const LABEL: [usize; 4] = [16, 18, 20, 22];
    pub const QUADFLAG: [usize; 4] = [56, 55, 51, 54];
    pub const FTFLAG: [usize; 4] = [220, 222, 13, 31];
    /// Only F3/F4 carry their own size slot
    pub const SIZE: [Option<usize>; 4] = [None, None, Some(15), Some(32)];
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Data truncated: expected {expected} values, got {got}")]
    Truncated { expected: usize, got: usize },
}

/// Axis parameters as stored in the header, used when writing files.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeAxis {
    pub size: usize,
    pub sw_hz: f64,
    pub obs_mhz: f64,
    pub orig_hz: f64,
    pub label: String,
}

/// Reads spectra from NMRPipe files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct NmrPipeReader;

impl SpectrumSource for NmrPipeReader {
    fn load(&self, path: &Path) -> Result<SpectrumData, ReadError> {
        read_nmrpipe_file(path)
    }
}

/// Read an NMRPipe format file
pub fn read_nmrpipe_file(path: &Path) -> Result<SpectrumData, ReadError> {
    let bytes = std::fs::read(path)?;
    let spectrum = parse_nmrpipe(&bytes, path)?;
    log::info!(
        "Read {} ({}D, shape {:?})",
        path.display(),
        spectrum.ndim(),
        spectrum.shape
    );
    Ok(spectrum)
}

struct Header<'a> {
    floats: Vec<f32>,
    raw: &'a [u8],
    big_endian: bool,
}

impl<'a> Header<'a> {
    fn parse(bytes: &'a [u8]) -> Result<Self, ReadError> {
        if bytes.len() < HEADER_BYTES {
            return Err(ReadError::InvalidHeader(format!(
                "file too small for NMRPipe format ({} bytes)",
                bytes.len()
            )));
        }
        let raw = &bytes[..HEADER_BYTES];
        let mut floats = vec![0.0f32; HEADER_FLOATS];

        // Byte order check: FDFLTORDER should read back as 2.345
        LittleEndian::read_f32_into(raw, &mut floats);
        let mut big_endian = false;
        if (floats[idx::FDFLTORDER] - FD_ORDER_CONS).abs() > 0.01 {
            BigEndian::read_f32_into(raw, &mut floats);
            big_endian = true;
            if (floats[idx::FDFLTORDER] - FD_ORDER_CONS).abs() > 0.01 {
                return Err(ReadError::InvalidHeader(
                    "byte-order marker not found".to_string(),
                ));
            }
        }
        Ok(Self {
            floats,
            raw,
            big_endian,
        })
    }

    fn get(&self, slot: usize) -> f32 {
        self.floats[slot]
    }

    /// Physical dimension table index (F2=0, F1=1, F3=2, F4=3) for the
    /// current axis code (1 = X, 2 = Y, 3 = Z).
    fn phys_index(&self, axis_code: usize) -> usize {
        let phys = self.get(idx::FDDIMORDER + axis_code - 1) as i32;
        match phys {
            2 => 0,
            1 => 1,
            3 => 2,
            4 => 3,
            // unset dimension order: default 2 1 3 4
            _ => axis_code - 1,
        }
    }

    /// 8-byte label, read straight from the raw bytes (text has no byte order)
    fn label(&self, phys: usize) -> String {
        let start = dim::LABEL[phys] * 4;
        self.raw[start..start + 8]
            .iter()
            .copied()
            .take_while(|&b| b != 0)
            .filter(|b| b.is_ascii_graphic() || *b == b' ')
            .map(char::from)
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn size(&self, axis_code: usize) -> usize {
        let size = match axis_code {
            1 => self.get(idx::FDSIZE),
            2 => self.get(idx::FDSPECNUM),
            _ => match dim::SIZE[self.phys_index(axis_code)] {
                Some(slot) => self.get(slot),
                None => self.get(dim::SIZE[2].unwrap_or(15)),
            },
        };
        if size.is_finite() && size > 0.0 {
            size as usize
        } else {
            0
        }
    }
}

/// Parse an in-memory NMRPipe file.
pub fn parse_nmrpipe(bytes: &[u8], source: &Path) -> Result<SpectrumData, ReadError> {
    let header = Header::parse(bytes)?;
    let ndim = header.get(idx::FDDIMCOUNT) as usize;
    if !(1..=3).contains(&ndim) {
        return Err(ReadError::Unsupported(format!(
            "{}-dimensional data (only 1D, 2D and 3D are handled)",
            ndim
        )));
    }

    // Array axes outermost first: Z, Y, X → current axis codes 3, 2, 1
    let axis_codes: Vec<usize> = (1..=ndim).rev().collect();
    let shape: Vec<usize> = axis_codes.iter().map(|&c| header.size(c)).collect();
    if shape.iter().any(|&n| n == 0) {
        return Err(ReadError::InvalidHeader(format!(
            "zero-length axis in shape {:?}",
            shape
        )));
    }

    let x_phys = header.phys_index(1);
    let x_complex = header.get(dim::QUADFLAG[x_phys]) as i32 == 0
        && header.get(idx::FDQUADFLAG) as i32 == 0;
    if ndim >= 2 && header.get(dim::QUADFLAG[header.phys_index(2)]) as i32 == 0 {
        log::debug!("Indirect dimension flagged complex; rows are read as stored");
    }
    if (1..=ndim).any(|c| header.get(dim::FTFLAG[header.phys_index(c)]) as i32 == 0) {
        log::warn!(
            "{}: not every dimension is in the frequency domain",
            source.display()
        );
    }

    let too_large = || ReadError::InvalidHeader(format!("shape {:?} is too large", shape));
    let nx = shape[ndim - 1];
    let row_len = if x_complex { nx.checked_mul(2) } else { Some(nx) }.ok_or_else(too_large)?;
    let n_rows = shape[..ndim - 1]
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or_else(too_large)?;
    let expected = row_len
        .checked_mul(n_rows)
        .filter(|e| e.checked_mul(4).is_some())
        .ok_or_else(too_large)?;

    let data = &bytes[HEADER_BYTES..];
    let got = data.len() / 4;
    if got < expected {
        return Err(ReadError::Truncated { expected, got });
    }
    let mut floats = vec![0.0f32; expected];
    if header.big_endian {
        BigEndian::read_f32_into(&data[..expected * 4], &mut floats);
    } else {
        LittleEndian::read_f32_into(&data[..expected * 4], &mut floats);
    }

    let pipe_mode = header.get(idx::FDPIPEFLAG) as i32 == 1;
    let mut values = Vec::with_capacity(nx * n_rows);
    for row in floats.chunks_exact(row_len) {
        if x_complex && pipe_mode && ndim == 1 {
            // interleaved R, I, R, I, ...
            values.extend(row.iter().step_by(2).map(|&v| v as f64));
        } else {
            // real block first, imaginary block (if any) dropped
            values.extend(row[..nx].iter().map(|&v| v as f64));
        }
    }

    let calibrations = axis_codes
        .iter()
        .enumerate()
        .map(|(array_dim, &code)| {
            let phys = header.phys_index(code);
            let mut label = header.label(phys);
            if label.is_empty() {
                label = format!("F{}", [2, 1, 3, 4][phys]);
            }
            AxisCalibration::from_spectral(
                array_dim,
                label,
                shape[array_dim],
                header.get(dim::SW[phys]) as f64,
                header.get(dim::OBS[phys]) as f64,
                header.get(dim::ORIG[phys]) as f64,
            )
        })
        .collect();

    Ok(SpectrumData {
        source_path: source.to_path_buf(),
        shape,
        values,
        calibrations,
    })
}

/// Write a real-valued spectrum to NMRPipe format (little-endian).
///
/// `axes` are outermost first, matching the row-major layout of `values`.
pub fn write_nmrpipe_file(path: &Path, axes: &[PipeAxis], values: &[f64]) -> io::Result<()> {
    let ndim = axes.len();
    if !(1..=3).contains(&ndim) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot write {}-dimensional data", ndim),
        ));
    }
    let expected: usize = axes.iter().map(|a| a.size).product();
    if values.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("expected {} values, got {}", expected, values.len()),
        ));
    }

    let mut header = vec![0.0f32; HEADER_FLOATS];
    header[idx::FDFLTFORMAT] = FD_IEEE_CONS as f32;
    header[idx::FDFLTORDER] = FD_ORDER_CONS;
    header[idx::FDDIMCOUNT] = ndim as f32;
    for (i, phys) in [2.0, 1.0, 3.0, 4.0].iter().enumerate() {
        header[idx::FDDIMORDER + i] = *phys;
    }
    header[idx::FDQUADFLAG] = 1.0;

    // axes[ndim - 1] is X (F2), axes[ndim - 2] is Y (F1), axes[0] of a 3D is Z (F3)
    for (phys, axis) in axes.iter().rev().enumerate() {
        header[dim::SW[phys]] = axis.sw_hz as f32;
        header[dim::OBS[phys]] = axis.obs_mhz as f32;
        header[dim::ORIG[phys]] = axis.orig_hz as f32;
        header[dim::QUADFLAG[phys]] = 1.0;
        header[dim::FTFLAG[phys]] = 1.0;
        if let Some(slot) = dim::SIZE[phys] {
            header[slot] = axis.size as f32;
        }
    }
    let x = &axes[ndim - 1];
    header[idx::FDSIZE] = x.size as f32;
    header[idx::FDREALSIZE] = x.size as f32;
    header[idx::FDSPECNUM] = if ndim >= 2 { axes[ndim - 2].size as f32 } else { 1.0 };

    let mut bytes = Vec::with_capacity(HEADER_BYTES + values.len() * 4);
    for &h in &header {
        bytes.write_f32::<LittleEndian>(h)?;
    }
    for (phys, axis) in axes.iter().rev().enumerate() {
        let start = dim::LABEL[phys] * 4;
        let label = axis.label.as_bytes();
        let n = label.len().min(8);
        bytes[start..start + 8].fill(0);
        bytes[start..start + n].copy_from_slice(&label[..n]);
    }
    for &v in values {
        bytes.write_f32::<LittleEndian>(v as f32)?;
    }
    std::fs::write(path, bytes)
}
