//! Cooler back-end (spec §4.3): HDF5 dataset layout for `.cool`/`.mcool`/`.scool`.
//!
//! Generalizes the teacher's `hic-matrix` reader/writer/selector trio
//! (which only ever addressed a single `/resolutions/<R>` group) to the
//! three Cooler container flavors: plain `.cool` (root group), `.mcool`
//! (`/resolutions/<R>` children) and `.scool` (`/cells/<name>` children,
//! bins shared at the root).

pub mod reader;
pub mod selector;
pub mod writer;

use std::path::{Path, PathBuf};

use crate::error::{HictkError, Result};
use crate::reference::Reference;

pub use reader::{CoolerReader, GroupReader};
pub use selector::CoolerSelector;
pub use writer::CoolerWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoolerFlavor {
    Cool,
    Mcool,
    Scool,
}

/// An open Cooler-family container: owns the HDF5 file handle and knows
/// which of `.cool`/`.mcool`/`.scool` it is.
pub struct CoolerFile {
    path: PathBuf,
    flavor: CoolerFlavor,
    reader: CoolerReader,
}

impl CoolerFile {
    pub fn open(path: &Path) -> Result<CoolerFile> {
        let reader = CoolerReader::open(path)?;
        let flavor = reader.detect_flavor()?;
        Ok(CoolerFile { path: path.to_path_buf(), flavor, reader })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flavor(&self) -> CoolerFlavor {
        self.flavor
    }

    /// Available resolutions. A single-element vec for `.cool`/`.scool`.
    pub fn resolutions(&self) -> Result<Vec<u32>> {
        match self.flavor {
            CoolerFlavor::Mcool => self.reader.list_resolutions(),
            CoolerFlavor::Cool | CoolerFlavor::Scool => {
                Ok(vec![self.reader.group_reader("")?.bin_size()?])
            }
        }
    }

    /// Available cells; empty outside `.scool`.
    pub fn cells(&self) -> Result<Vec<String>> {
        match self.flavor {
            CoolerFlavor::Scool => self.reader.list_cells(),
            _ => Ok(Vec::new()),
        }
    }

    pub fn reference(&self, group: Option<&str>) -> Result<Reference> {
        self.reader.read_reference(group)
    }

    /// Opens the group reader for a given resolution/cell selector
    /// (resolution for `.mcool`, cell name for `.scool`, ignored for
    /// plain `.cool`).
    pub fn group_reader(&self, selector: Option<&str>) -> Result<GroupReader> {
        let path = match (self.flavor, selector) {
            (CoolerFlavor::Cool, _) => String::new(),
            (CoolerFlavor::Mcool, Some(resolution)) => format!("resolutions/{resolution}"),
            (CoolerFlavor::Mcool, None) => {
                return Err(HictkError::ConflictingQueryOptions {
                    reason: "a resolution is required to open an .mcool".into(),
                })
            }
            (CoolerFlavor::Scool, Some(cell)) => format!("cells/{cell}"),
            (CoolerFlavor::Scool, None) => {
                return Err(HictkError::ConflictingQueryOptions {
                    reason: "a cell name is required to open an .scool".into(),
                })
            }
        };
        self.reader.group_reader(&path)
    }

    pub fn reader(&self) -> &CoolerReader {
        &self.reader
    }
}
