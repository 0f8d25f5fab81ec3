use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

/// Counts the data records in the source, excluding the header line.
///
/// A single linear scan over raw bytes, nothing is materialized. The count
/// is advisory: it only feeds the progress-percentage denominator, so the
/// caller recovers from failure by assuming a single batch.
pub fn count_rows<P: AsRef<Path>>(path: P) -> Result<u64> {
    let file = File::open(path.as_ref()).map_err(Error::RowCount)?;
    let mut reader = BufReader::new(file);
    let mut buffer = Vec::new();
    let mut lines = 0u64;

    loop {
        buffer.clear();
        let read = reader
            .read_until(b'\n', &mut buffer)
            .map_err(Error::RowCount)?;

        if read == 0 {
            break;
        }

        lines += 1;
    }

    Ok(lines.saturating_sub(1))
}
