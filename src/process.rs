//! The per-batch statistics pass. Pure: output depends only on the batch
//! content, never on worker identity or processing order, which is what
//! makes out-of-order parallel execution safe.

use crate::batch::Batch;
use crate::headers::Headers;
use crate::stats::{PartialStats, SuspiciousTrip};
use crate::Row;

/// Columns a record must have non-null values in to survive cleaning. A
/// batch whose schema has none of them produces a zeroed result instead of
/// an error.
pub const REQUIRED_COLUMNS: [&str; 4] =
    ["fare_amount", "tip_amount", "payment_type", "airport_fee"];

const PAYMENT_CARD: f64 = 1.0;
const PAYMENT_CASH: f64 = 2.0;

/// Thresholds of the tip-to-fare anomaly rule. Currency-unit dependent, so
/// they are configuration rather than literals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyThresholds {
    /// Minimum fare for a trip to qualify as suspicious.
    pub min_fare: f64,
    /// A trip is suspicious when `tip >= multiplier * fare`.
    pub tip_multiplier: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> AnomalyThresholds {
        AnomalyThresholds {
            min_fare: 40.0,
            tip_multiplier: 2.0,
        }
    }
}

fn numeric(headers: &Headers, row: &Row, name: &str) -> Option<f64> {
    headers.field(row, name).and_then(|value| value.parse().ok())
}

/// Cleans one batch and computes its partial statistics.
///
/// Cleaning drops rows that are null (or unparseable) in any required
/// column present in this batch's schema. The anomaly pass runs before the
/// distance filter, on the null-dropped rows, in row order.
pub fn process_batch(batch: &Batch, thresholds: &AnomalyThresholds) -> PartialStats {
    let headers = batch.headers();

    let present: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| headers.contains_key(column))
        .collect();

    if present.is_empty() {
        return PartialStats::zeroed();
    }

    let mut cleaned: Vec<&Row> = batch
        .rows()
        .iter()
        .filter(|row| {
            present
                .iter()
                .all(|column| numeric(headers, row, column).is_some())
        })
        .collect();

    let mut suspicious_trips = Vec::new();

    if headers.contains_key("fare_amount")
        && headers.contains_key("tip_amount")
        && headers.contains_key("payment_type")
    {
        for row in &cleaned {
            let values = (
                numeric(headers, row, "fare_amount"),
                numeric(headers, row, "tip_amount"),
                numeric(headers, row, "payment_type"),
            );
            let (fare, tip, payment) = match values {
                (Some(fare), Some(tip), Some(payment)) => (fare, tip, payment),
                _ => continue,
            };

            if payment == PAYMENT_CARD
                && fare > 0.0
                && tip >= fare * thresholds.tip_multiplier
                && fare >= thresholds.min_fare
            {
                suspicious_trips.push(SuspiciousTrip {
                    vendor_id: headers.field(row, "VendorID").unwrap_or("N/A").to_string(),
                    trip_distance: numeric(headers, row, "trip_distance").unwrap_or(0.0),
                    fare_amount: fare,
                    tip_amount: tip,
                    payment_type: payment as i64,
                });
            }
        }
    }

    if headers.contains_key("trip_distance") {
        cleaned.retain(|row| {
            numeric(headers, row, "trip_distance").map_or(false, |distance| distance > 0.0)
        });
    }

    let has_fare = headers.contains_key("fare_amount");
    let has_tip = headers.contains_key("tip_amount");
    let has_payment = headers.contains_key("payment_type");
    let has_airport = headers.contains_key("airport_fee");

    let mut stats = PartialStats::zeroed();
    stats.num_trips = cleaned.len() as u64;
    stats.suspicious_trips = suspicious_trips;

    for row in &cleaned {
        if has_fare {
            if let Some(fare) = numeric(headers, row, "fare_amount") {
                stats.sum_fare_amount += fare;
            }
        }

        let payment = if has_payment {
            numeric(headers, row, "payment_type")
        } else {
            None
        };

        match payment {
            Some(p) if p == PAYMENT_CARD => {
                stats.card_payments += 1;

                if has_tip {
                    if let Some(tip) = numeric(headers, row, "tip_amount") {
                        stats.sum_tip_amount += tip;
                    }
                }
            }
            Some(p) if p == PAYMENT_CASH => stats.cash_payments += 1,
            _ => {}
        }

        if has_airport {
            if let Some(fee) = numeric(headers, row, "airport_fee") {
                if fee > 0.0 {
                    stats.airport_fees_count += 1;
                }
            }
        }
    }

    stats
}
