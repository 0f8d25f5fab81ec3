//! Value types flowing through the aggregation pipeline and the fold that
//! combines them.

/// Snapshot of one record flagged by the tip-to-fare anomaly rule.
#[derive(Debug, Clone, PartialEq)]
pub struct SuspiciousTrip {
    pub vendor_id: String,
    pub trip_distance: f64,
    pub fare_amount: f64,
    pub tip_amount: f64,
    pub payment_type: i64,
}

/// The aggregate computed from a single batch.
///
/// Numeric fields combine by addition, the suspicious list by concatenation,
/// so merging is associative and commutative over everything except the order
/// of the suspicious list. The coordinator still folds in submission order to
/// keep that list deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialStats {
    pub num_trips: u64,
    pub sum_fare_amount: f64,
    pub sum_tip_amount: f64,
    pub card_payments: u64,
    pub cash_payments: u64,
    pub airport_fees_count: u64,
    pub suspicious_trips: Vec<SuspiciousTrip>,
}

impl PartialStats {
    /// The degraded-input result: all counts zero, no suspicious trips.
    pub fn zeroed() -> PartialStats {
        PartialStats::default()
    }

    pub fn merge(mut self, other: PartialStats) -> PartialStats {
        self.num_trips += other.num_trips;
        self.sum_fare_amount += other.sum_fare_amount;
        self.sum_tip_amount += other.sum_tip_amount;
        self.card_payments += other.card_payments;
        self.cash_payments += other.cash_payments;
        self.airport_fees_count += other.airport_fees_count;
        self.suspicious_trips.extend(other.suspicious_trips);

        self
    }
}

/// The single accumulator folding all partial statistics seen so far.
///
/// Has exactly one writer, the coordinator thread, and is consumed exactly
/// once by `finalize`.
#[derive(Debug, Default)]
pub struct RunningTotal {
    total: PartialStats,
}

impl RunningTotal {
    pub fn new() -> RunningTotal {
        RunningTotal::default()
    }

    pub fn fold(&mut self, partial: PartialStats) {
        let total = std::mem::take(&mut self.total);
        self.total = total.merge(partial);
    }

    pub fn num_trips(&self) -> u64 {
        self.total.num_trips
    }

    /// Derives the final averages and counts.
    ///
    /// `avg_tip_card_only` divides card-only tips by the count of *all*
    /// trips. That mix is inherited behaviour and is kept on purpose.
    pub fn finalize(self) -> FinalStats {
        let total = self.total;
        let trips = total.num_trips;

        let (avg_fare, avg_tip_card_only) = if trips > 0 {
            (
                total.sum_fare_amount / trips as f64,
                total.sum_tip_amount / trips as f64,
            )
        } else {
            (0.0, 0.0)
        };

        FinalStats {
            trip_count: trips,
            avg_fare,
            avg_tip_card_only,
            card_payment_count: total.card_payments,
            cash_payment_count: total.cash_payments,
            airport_fee_trip_count: total.airport_fees_count,
            suspicious_trips: total.suspicious_trips,
        }
    }
}

/// The result of a successful run, handed to presentation exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalStats {
    pub trip_count: u64,
    pub avg_fare: f64,
    pub avg_tip_card_only: f64,
    pub card_payment_count: u64,
    pub cash_payment_count: u64,
    pub airport_fee_trip_count: u64,
    pub suspicious_trips: Vec<SuspiciousTrip>,
}
