//! Chunked, parallel aggregation over large taxi-trip CSV dumps.
//!
//! The source file is split into fixed-size batches, processed concurrently
//! by a pool of worker threads, and the partial results are folded back in
//! submission order so suspicious-trip ordering and progress percentages
//! are reproducible across runs. Presentation stays outside: callers get a
//! progress callback and a final [`FinalStats`] value.
//!
//! ```no_run
//! use tripstats::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! let stats = pipeline.run("trips.csv", |percent| eprintln!("{}%", percent))?;
//! println!("{} trips", stats.trip_count);
//! # Ok::<(), tripstats::Error>(())
//! ```

mod batch;
mod count;
mod error;
mod headers;
mod input;
mod pipeline;
mod process;
mod report;
mod stats;

pub use batch::Batch;
pub use count::count_rows;
pub use error::{Error, Result};
pub use headers::Headers;
pub use input::{ChunkReader, ReaderSource};
pub use pipeline::{Pipeline, PipelineConfig};
pub use process::{process_batch, AnomalyThresholds, REQUIRED_COLUMNS};
pub use report::{write_report, REPORT_DIR};
pub use stats::{FinalStats, PartialStats, RunningTotal, SuspiciousTrip};

type Row = csv::StringRecord;
