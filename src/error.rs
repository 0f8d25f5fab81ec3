use std::io;
use std::path::PathBuf;
use std::result;

/// An error found somewhere in the processing pipeline.
#[derive(Debug)]
pub enum Error {
    /// The source file is missing, empty or unreadable. Checked before any
    /// processing starts, so a run never begins on a bad source.
    SourceUnavailable(PathBuf),
    /// The tabular reader could not parse the source. Fatal, aborts the run.
    SourceFormat(csv::Error),
    /// The row-counting pre-scan failed. Recovered by the pipeline with a
    /// denominator of one batch.
    RowCount(io::Error),
    /// A batch processor failed unexpectedly. Fatal, no partial results are
    /// delivered.
    Worker { batch: usize, message: String },
    /// The report sink could not create its directory or file. Does not
    /// invalidate already-computed statistics.
    ReportWrite(io::Error),
}

pub type Result<T> = result::Result<T, Error>;

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Error {
        Error::SourceFormat(error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::SourceFormat(e) => Some(e),
            Error::RowCount(e) => Some(e),
            Error::ReportWrite(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Error::SourceUnavailable(ref p) => {
                write!(f, "source file {:?} is missing or empty", p)
            }
            Error::SourceFormat(ref e) => write!(f, "cannot parse source as CSV: {}", e),
            Error::RowCount(ref e) => write!(f, "row counting failed: {}", e),
            Error::Worker { batch, ref message } => {
                write!(f, "worker failed on batch {}: {}", batch, message)
            }
            Error::ReportWrite(ref e) => write!(f, "cannot write report: {}", e),
        }
    }
}
