use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for every engine operation (spec §7).
#[derive(Error, Debug)]
pub enum HictkError {
    #[error("{path}: not a recognized container (expected Cooler HDF5 or .hic magic bytes)")]
    BadFileFormat { path: PathBuf },

    #[error("bad bin table: {reason}")]
    BadBinTable { reason: String },

    #[error("bad genomic range {query:?}: {reason}")]
    BadRange { query: String, reason: String },

    #[error("unknown resolution {resolution} in {path}")]
    UnknownResolution { path: PathBuf, resolution: u32 },

    #[error("unknown normalization {name:?} at resolution {resolution}")]
    UnknownNormalization { name: String, resolution: u32 },

    #[error("unknown chromosome {name:?}")]
    UnknownChromosome { name: String },

    #[error("conflicting query options: {reason}")]
    ConflictingQueryOptions { reason: String },

    #[error("balancing failed to converge after {iters} iterations (strategy {strategy})")]
    BalancingDivergence { strategy: String, iters: usize },

    #[error("selector used before initialization")]
    SelectorUninit,

    #[error("index out of bounds: {reason}")]
    IndexOutOfBounds { reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("line {line}: {reason}")]
    BadIngestRecord { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, HictkError>;
