//! Writes the plain-text report for a finished run. Pure formatting plus
//! auto-numbered file placement, kept byte-compatible with the reports the
//! desktop build of this tool produced.

use chrono::Local;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::stats::FinalStats;

/// Default directory reports land in, created on demand.
pub const REPORT_DIR: &str = "Raporty";

/// Writes `stats` as `Raport_<N>.txt` under `directory`, picking the lowest
/// unused N starting at 1 so existing reports are never overwritten.
/// Returns the path of the new report.
pub fn write_report(
    stats: &FinalStats,
    source_name: Option<&str>,
    directory: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(directory).map_err(Error::ReportWrite)?;

    let path = next_report_path(directory);
    fs::write(&path, render(stats, source_name)).map_err(Error::ReportWrite)?;

    debug!("report written to {:?}", path);

    Ok(path)
}

fn next_report_path(directory: &Path) -> PathBuf {
    let mut number = 1u32;

    loop {
        let candidate = directory.join(format!("Raport_{}.txt", number));

        if !candidate.exists() {
            return candidate;
        }

        number += 1;
    }
}

fn render(stats: &FinalStats, source_name: Option<&str>) -> String {
    let mut out = String::new();

    out.push_str("--- RAPORT ANALIZY DANYCH TAXI ---\n");
    out.push_str(&format!(
        "Data wygenerowania: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    if let Some(name) = source_name {
        out.push_str(&format!("Plik źródłowy: {}\n", name));
    }
    out.push_str("----------------------------------\n\n");

    out.push_str(&format!("Liczba wszystkich kursów: {}\n", stats.trip_count));
    out.push_str(&format!(
        "Średnia opłata za przejazd: {:.2} USD\n",
        stats.avg_fare
    ));
    out.push_str(&format!(
        "Średnia kwota napiwku (tylko karty): {:.2} USD\n",
        stats.avg_tip_card_only
    ));
    out.push_str(&format!(
        "Liczba płatności kartą: {}\n",
        stats.card_payment_count
    ));
    out.push_str(&format!(
        "Liczba płatności gotówką: {}\n",
        stats.cash_payment_count
    ));
    out.push_str(&format!(
        "Liczba kursów z opłatą lotniskową: {}\n",
        stats.airport_fee_trip_count
    ));

    if stats.suspicious_trips.is_empty() {
        out.push_str("\n--- Brak podejrzanych przejazdów spełniających kryteria ---\n");
    } else {
        out.push_str(
            "\n--- PODEJRZANE PRZEJAZDY (Napiwek >= 200% kwoty przejazdu \
             i kwota przejazdu > 40 USD) ---\n",
        );
        for (i, trip) in stats.suspicious_trips.iter().enumerate() {
            out.push_str(&format!(
                "  {}. VendorID: {}, Dystans: {:.2} mil, Kwota przejazdu: {:.2} USD, \
                 Napiwek: {:.2} USD, Typ płatności: {}\n",
                i + 1,
                trip.vendor_id,
                trip.trip_distance,
                trip.fare_amount,
                trip.tip_amount,
                trip.payment_type,
            ));
        }
        out.push_str(&format!(
            "  Łącznie znaleziono: {} podejrzanych przejazdów.\n",
            stats.suspicious_trips.len()
        ));
    }

    out.push_str("\n--- Koniec Raportu ---\n");

    out
}
