use clap::{App, Arg};
use color_eyre::eyre::{eyre, Result};
use std::time::Duration;
use termdetect_sim::Cluster;
use tracing::info;

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = parse_args();
    match args.scenario.as_str() {
        "symmetric" => run_symmetric(args.numprocs),
        "in-flight" => run_in_flight(),
        _ => unreachable!("clap restricted possible_values"),
    }
}

struct Args {
    scenario: String,
    numprocs: u32,
}

fn parse_args() -> Args {
    let matches = App::new("termdetect-sim")
        .version("0.1")
        .author("Vitor Enes <vitorenesduarte@gmail.com>")
        .about("Runs a simulated cluster through a termination-detection scenario")
        .arg(
            Arg::with_name("scenario")
                .long("scenario")
                .takes_value(true)
                .possible_values(&["symmetric", "in-flight"])
                .default_value("symmetric")
                .help("which demo scenario to run"),
        )
        .arg(
            Arg::with_name("numprocs")
                .long("numprocs")
                .takes_value(true)
                .default_value("2")
                .help("number of simulated processes (symmetric scenario only)"),
        )
        .get_matches();

    let scenario = matches.value_of("scenario").unwrap().to_owned();
    let numprocs = matches
        .value_of("numprocs")
        .unwrap()
        .parse()
        .expect("numprocs must be a positive integer");

    Args { scenario, numprocs }
}

/// Every process starts with equal sent/received counters and all call
/// `done()` at once.
fn run_symmetric(numprocs: u32) -> Result<()> {
    if numprocs == 0 {
        return Err(eyre!("numprocs must be at least 1"));
    }
    let counters = vec![(5u64, 5u64); numprocs as usize];
    let cluster = Cluster::new(1, &counters)?;

    info!(numprocs, "starting symmetric-idle scenario");
    for p in 0..numprocs {
        cluster.engine(p).set_idle(true);
    }
    let handles: Vec<_> = (0..numprocs).map(|p| cluster.spawn_done(p)).collect();
    for (procid, handle) in handles.into_iter().enumerate() {
        let reached_consensus = handle.join().expect("worker thread panicked");
        info!(procid, reached_consensus, "process finished");
    }
    Ok(())
}

/// Global sent/received balance, but one message is still "in flight"
/// from process 0's point of view when the ring starts.
fn run_in_flight() -> Result<()> {
    let cluster = Cluster::new(1, &[(10, 9), (5, 6)])?;

    info!("starting in-flight-message scenario");
    let handles: Vec<_> = (0..cluster.numprocs()).map(|p| cluster.spawn_done(p)).collect();

    // Give the ring a moment to make its first lap before we report
    // progress; this is purely cosmetic for the demo, not part of the
    // protocol.
    std::thread::sleep(Duration::from_millis(10));

    for (procid, handle) in handles.into_iter().enumerate() {
        let reached_consensus = handle.join().expect("worker thread panicked");
        info!(procid, reached_consensus, "process finished");
    }
    Ok(())
}
