use std::path::PathBuf;

use thiserror::Error;

use crate::structs::Currency;

/* Structural failures: these abort the stage with a non-zero exit code. Everything recoverable goes through
StageWarning instead. */
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("input directory {0} does not exist")]
    MissingInputDirectory(PathBuf),

    #[error("no input files found in {0}")]
    NoInputFiles(PathBuf),

    #[error("none of the {0} input documents could be read")]
    NoReadableDocuments(usize),

    #[error("all {0} records of the batch are malformed")]
    AllRecordsMalformed(usize),

    #[error("output directory {path} is not writable: {source}")]
    OutputNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} was built in {found}, not {expected}: rebuild it with the ledger command or set the reporting currency to {found}")]
    CurrencyMismatch {
        path: PathBuf,
        found: Currency,
        expected: Currency,
    },

    #[error("invalid row in {path}: {message}")]
    InvalidRow { path: PathBuf, message: String },
}
