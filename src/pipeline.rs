//! The aggregation coordinator: fans batches out to a fixed pool of worker
//! threads, folds their partial results back in strict submission order and
//! emits progress after every batch.

use crossbeam_channel::{bounded, Receiver};
use encoding::all::UTF_8;
use encoding::EncodingRef;
use log::warn;
use std::collections::HashMap;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::thread;

use crate::batch::Batch;
use crate::count::count_rows;
use crate::error::{Error, Result};
use crate::input::{ChunkReader, ReaderSource};
use crate::process::{process_batch, AnomalyThresholds};
use crate::stats::{FinalStats, PartialStats, RunningTotal};

/// Tuning knobs for a pipeline run.
#[derive(Clone, Copy)]
pub struct PipelineConfig {
    /// Maximum records per batch.
    pub chunk_size: usize,
    /// Worker threads processing batches concurrently.
    pub workers: usize,
    /// Encoding the source bytes are decoded with.
    pub encoding: EncodingRef,
    pub thresholds: AnomalyThresholds,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            chunk_size: 10_000,
            workers: num_cpus::get(),
            encoding: UTF_8,
            thresholds: AnomalyThresholds::default(),
        }
    }
}

/// Drives a whole run: count, read, fan-out, ordered fan-in, finalize.
///
/// Holds no state across runs, so one `Pipeline` can be reused and a failed
/// run leaves nothing behind.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Pipeline {
        Pipeline { config }
    }

    /// Processes the file at `path`, invoking `progress` with a 0-100
    /// percentage after each completed batch. The progress values are
    /// non-decreasing within the run.
    ///
    /// All-or-nothing: the first fatal error from the reader or a worker
    /// aborts the run and no statistics are delivered.
    pub fn run<P, F>(&self, path: P, mut progress: F) -> Result<FinalStats>
    where
        P: AsRef<Path>,
        F: FnMut(u8),
    {
        let path = path.as_ref();

        match fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => {}
            _ => return Err(Error::SourceUnavailable(path.to_path_buf())),
        }

        let chunk_size = self.config.chunk_size.max(1);
        let total_batches = match count_rows(path) {
            Ok(rows) => ((rows + chunk_size as u64 - 1) / chunk_size as u64).max(1),
            Err(e) => {
                warn!("{}; degrading progress granularity to a single batch", e);
                1
            }
        };

        let source = ReaderSource::from_path(path, self.config.encoding)?;
        let reader = ChunkReader::new(source, chunk_size)?;

        let workers = self.config.workers.max(1);
        let (batch_tx, batch_rx) = bounded::<(usize, Result<Batch>)>(workers * 2);
        let (result_tx, result_rx) = bounded::<(usize, Result<PartialStats>)>(workers * 2);

        // Single producer, decoupled from worker availability by the
        // bounded channel. A send error means the consumers are gone and
        // the run is already aborting.
        let reader_handle = thread::spawn(move || {
            for (index, item) in reader.enumerate() {
                let fatal = item.is_err();

                if batch_tx.send((index, item)).is_err() || fatal {
                    break;
                }
            }
        });

        let thresholds = self.config.thresholds;
        let mut worker_handles = Vec::with_capacity(workers);

        for _ in 0..workers {
            let batch_rx = batch_rx.clone();
            let result_tx = result_tx.clone();

            worker_handles.push(thread::spawn(move || {
                while let Ok((index, item)) = batch_rx.recv() {
                    let outcome = match item {
                        Ok(batch) => {
                            catch_unwind(AssertUnwindSafe(|| process_batch(&batch, &thresholds)))
                                .map_err(|cause| Error::Worker {
                                    batch: index,
                                    message: panic_message(cause),
                                })
                        }
                        Err(e) => Err(e),
                    };
                    let failed = outcome.is_err();

                    if result_tx.send((index, outcome)).is_err() || failed {
                        break;
                    }
                }
            }));
        }

        drop(batch_rx);
        drop(result_tx);

        let outcome = collect_in_order(result_rx, total_batches, &mut progress);

        // The receiver is gone by now, so blocked producers unblock with
        // send errors and every thread winds down on its own.
        let _ = reader_handle.join();
        for handle in worker_handles {
            let _ = handle.join();
        }

        Ok(outcome?.finalize())
    }
}

/// Ordered fan-in: workers complete in any order, results are folded
/// strictly by batch index. Out-of-turn results wait in `pending` until
/// their predecessors have been consumed.
fn collect_in_order<F>(
    results: Receiver<(usize, Result<PartialStats>)>,
    total_batches: u64,
    progress: &mut F,
) -> Result<RunningTotal>
where
    F: FnMut(u8),
{
    let mut pending: HashMap<usize, Result<PartialStats>> = HashMap::new();
    let mut next_index = 0usize;
    let mut total = RunningTotal::new();
    let mut last_percent = 0u8;

    while let Ok((index, item)) = results.recv() {
        pending.insert(index, item);

        while let Some(item) = pending.remove(&next_index) {
            total.fold(item?);
            next_index += 1;

            last_percent = ((next_index as u64 * 100) / total_batches).min(100) as u8;
            progress(last_percent);
        }
    }

    // The batch estimate counts raw lines, so sources with lines the csv
    // reader skips would otherwise finish short of 100.
    if next_index > 0 && last_percent < 100 {
        progress(100);
    }

    Ok(total)
}

fn panic_message(cause: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{collect_in_order, panic_message, Error, Pipeline, PipelineConfig};
    use crate::stats::PartialStats;
    use crossbeam_channel::unbounded;
    use std::io::Write;

    fn pipeline(chunk_size: usize, workers: usize) -> Pipeline {
        Pipeline::new(PipelineConfig {
            chunk_size,
            workers,
            ..PipelineConfig::default()
        })
    }

    fn write_trips(rows: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "VendorID,trip_distance,fare_amount,tip_amount,payment_type,airport_fee"
        )
        .unwrap();
        for i in 0..rows {
            let payment = if i % 2 == 0 { 1 } else { 2 };
            writeln!(file, "1,2.5,10.0,1.0,{},0.0", payment).unwrap();
        }

        file
    }

    #[test]
    fn test_missing_source() {
        match pipeline(10, 2).run("no/such/file.csv", |_| {}) {
            Err(Error::SourceUnavailable(_)) => {}
            other => panic!("expected SourceUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_empty_source() {
        let file = tempfile::NamedTempFile::new().unwrap();

        match pipeline(10, 2).run(file.path(), |_| {}) {
            Err(Error::SourceUnavailable(_)) => {}
            other => panic!("expected SourceUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_end_to_end_25k_rows() {
        let file = write_trips(25_000);
        let mut reported = Vec::new();

        let stats = pipeline(10_000, 4)
            .run(file.path(), |percent| reported.push(percent))
            .unwrap();

        // three batches of 10k, 10k, 5k
        assert_eq!(reported, vec![33, 66, 100]);
        assert_eq!(stats.trip_count, 25_000);
        assert_eq!(stats.card_payment_count, 12_500);
        assert_eq!(stats.cash_payment_count, 12_500);
        assert_eq!(stats.avg_fare, 10.0);
        assert!(stats.suspicious_trips.is_empty());
    }

    #[test]
    fn test_progress_is_monotone_and_ends_at_100() {
        let file = write_trips(95);
        let mut reported = Vec::new();

        pipeline(10, 3)
            .run(file.path(), |percent| reported.push(percent))
            .unwrap();

        assert_eq!(reported.len(), 10);
        assert!(reported.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*reported.last().unwrap(), 100);
    }

    #[test]
    fn test_suspicious_trips_keep_source_order_across_batches() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "VendorID,trip_distance,fare_amount,tip_amount,payment_type,airport_fee"
        )
        .unwrap();
        for i in 0..40 {
            // every tenth trip is suspicious, vendor id encodes its position
            if i % 10 == 0 {
                writeln!(file, "{},2.5,50.0,120.0,1,0.0", i).unwrap();
            } else {
                writeln!(file, "{},2.5,10.0,1.0,1,0.0", i).unwrap();
            }
        }

        // chunk size 7 so flagged rows land in different batches
        let stats = pipeline(7, 4).run(file.path(), |_| {}).unwrap();

        let vendors: Vec<&str> = stats
            .suspicious_trips
            .iter()
            .map(|t| t.vendor_id.as_str())
            .collect();
        assert_eq!(vendors, vec!["0", "10", "20", "30"]);
    }

    #[test]
    fn test_malformed_source_aborts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fare_amount,tip_amount").unwrap();
        writeln!(file, "10.0,1.0").unwrap();
        writeln!(file, "10.0,1.0,extra,fields").unwrap();

        match pipeline(1, 2).run(file.path(), |_| {}) {
            Err(Error::SourceFormat(_)) => {}
            other => panic!("expected SourceFormat, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_header_only_source_finishes_with_zeroed_stats() {
        let file = write_trips(0);

        let stats = pipeline(10, 2).run(file.path(), |_| {}).unwrap();

        assert_eq!(stats.trip_count, 0);
        assert_eq!(stats.avg_fare, 0.0);
        assert_eq!(stats.avg_tip_card_only, 0.0);
    }

    fn partial(trips: u64, fare: f64) -> PartialStats {
        PartialStats {
            num_trips: trips,
            sum_fare_amount: fare,
            ..PartialStats::default()
        }
    }

    #[test]
    fn test_fallback_denominator_clamps_progress_at_100() {
        // a failed row count degrades the denominator to one batch; the
        // fold must still be correct, only granularity suffers
        let (tx, rx) = unbounded();
        for i in 0..3 {
            tx.send((i, Ok(partial(10, 100.0)))).unwrap();
        }
        drop(tx);

        let mut reported = Vec::new();
        let total = collect_in_order(rx, 1, &mut |p| reported.push(p)).unwrap();

        assert_eq!(reported, vec![100, 100, 100]);
        assert_eq!(total.num_trips(), 30);
    }

    #[test]
    fn test_out_of_turn_results_wait_for_their_predecessors() {
        let (tx, rx) = unbounded();
        tx.send((2, Ok(partial(1, 1.0)))).unwrap();
        tx.send((0, Ok(partial(2, 2.0)))).unwrap();
        tx.send((1, Ok(partial(4, 4.0)))).unwrap();
        drop(tx);

        let mut reported = Vec::new();
        let total = collect_in_order(rx, 3, &mut |p| reported.push(p)).unwrap();

        // nothing folds until batch 0 lands, then everything in order
        assert_eq!(reported, vec![33, 66, 100]);
        assert_eq!(total.num_trips(), 7);
    }

    #[test]
    fn test_worker_error_aborts_with_no_total() {
        let (tx, rx) = unbounded();
        tx.send((0, Ok(partial(5, 50.0)))).unwrap();
        tx.send((
            1,
            Err(Error::Worker {
                batch: 1,
                message: "corrupt record".to_string(),
            }),
        ))
        .unwrap();
        drop(tx);

        let mut reported = Vec::new();
        match collect_in_order(rx, 2, &mut |p| reported.push(p)) {
            Err(Error::Worker { batch, .. }) => assert_eq!(batch, 1),
            other => panic!(
                "expected Worker error, got {:?}",
                other.map(|t| t.num_trips())
            ),
        }
        // batch 0 had already folded, nothing after the failure
        assert_eq!(reported, vec![50]);
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("boom".to_string())), "boom");
        assert_eq!(panic_message(Box::new(42u32)), "worker panicked");
    }

    #[test]
    fn test_trailing_blank_lines_still_end_at_100() {
        // blank lines count toward the estimate but the csv reader skips
        // them, so the estimate overshoots the real batch count
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "VendorID,trip_distance,fare_amount,tip_amount,payment_type,airport_fee"
        )
        .unwrap();
        for _ in 0..10 {
            writeln!(file, "1,2.5,10.0,1.0,1,0.0").unwrap();
        }
        writeln!(file).unwrap();
        writeln!(file).unwrap();

        let mut reported = Vec::new();
        let stats = pipeline(5, 2)
            .run(file.path(), |p| reported.push(p))
            .unwrap();

        assert_eq!(stats.trip_count, 10);
        assert!(reported.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*reported.last().unwrap(), 100);
    }

    #[test]
    fn test_single_worker_matches_many_workers() {
        let file = write_trips(1_000);

        let one = pipeline(64, 1).run(file.path(), |_| {}).unwrap();
        let many = pipeline(64, 8).run(file.path(), |_| {}).unwrap();

        assert_eq!(one, many);
    }
}
