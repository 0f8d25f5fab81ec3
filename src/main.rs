use clap::{App, Arg};
use log::warn;
use std::io::Write;
use std::path::Path;
use std::process;

use tripstats::{write_report, Pipeline, PipelineConfig, REPORT_DIR};

fn main() {
    env_logger::init();

    let matches = App::new("tripstats")
        .version("1.0")
        .about("Computes aggregate statistics over a taxi trip CSV dump in parallel chunks")
        .arg(
            Arg::with_name("input")
                .value_name("INPUT")
                .help("CSV file with taxi trip records")
                .required(true),
        )
        .arg(
            Arg::with_name("reports")
                .short("o")
                .long("reports")
                .value_name("DIR")
                .help("Directory the numbered reports are written to")
                .default_value(REPORT_DIR),
        )
        .get_matches();

    let input = matches.value_of("input").unwrap();
    let report_dir = matches.value_of("reports").unwrap();

    let pipeline = Pipeline::new(PipelineConfig::default());

    let stats = match pipeline.run(input, |percent| {
        eprint!("\rprocessing... {:>3}%", percent);
        let _ = std::io::stderr().flush();
    }) {
        Ok(stats) => {
            eprintln!();
            stats
        }
        Err(e) => {
            eprintln!("\nerror: {}", e);
            process::exit(1);
        }
    };

    println!("trips:                {}", stats.trip_count);
    println!("average fare:         {:.2}", stats.avg_fare);
    println!("average tip (card):   {:.2}", stats.avg_tip_card_only);
    println!("card payments:        {}", stats.card_payment_count);
    println!("cash payments:        {}", stats.cash_payment_count);
    println!("airport fee trips:    {}", stats.airport_fee_trip_count);
    println!("suspicious trips:     {}", stats.suspicious_trips.len());

    let source_name = Path::new(input)
        .file_name()
        .map(|n| n.to_string_lossy().to_string());

    match write_report(&stats, source_name.as_deref(), Path::new(report_dir)) {
        Ok(path) => println!("report written to {}", path.display()),
        Err(e) => warn!("statistics computed but the report was not written: {}", e),
    }
}
