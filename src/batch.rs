use std::sync::Arc;

use crate::headers::Headers;
use crate::Row;

/// A bounded, ordered slice of source rows processed as one unit.
///
/// Batches are immutable once produced and move wholesale to whichever
/// worker processes them. The header row is shared, rows are owned.
#[derive(Debug, Clone)]
pub struct Batch {
    headers: Arc<Headers>,
    rows: Vec<Row>,
}

impl Batch {
    pub fn new(headers: Arc<Headers>, rows: Vec<Row>) -> Batch {
        Batch { headers, rows }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
