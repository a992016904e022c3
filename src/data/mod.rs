pub mod grid;
pub mod nmrpipe_format;
pub mod query;
pub mod spectrum;
pub mod table;

use std::path::Path;

use nmrpipe_format::ReadError;
use spectrum::SpectrumData;

/// Anything that can turn a data source reference into a spectrum.
pub trait SpectrumSource {
    fn load(&self, path: &Path) -> Result<SpectrumData, ReadError>;
}
