// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! pmu-client - PMU-30 protocol test-runner CLI
//!
//! Drives the critical-path scenario suite against a real device or the
//! `SIMULATOR` target and exits non-zero if anything failed.

use clap::Parser;
use pmu_client::runner::run_critical_tests;
use pmu_client::{open_target, DeviceClient, DeviceClientConfig};

/// Run the PMU-30 protocol test suite against a device or the emulator.
#[derive(Parser, Debug)]
#[command(name = "pmu-client")]
#[command(version = "0.1.0")]
#[command(about = "PMU-30 device client / protocol test-runner")]
struct Args {
    /// Serial port path, or SIMULATOR for the TCP emulator on the default port
    target: String,

    /// Number of times to run the full scenario suite
    #[arg(short, long, default_value_t = 1)]
    iterations: u32,

    /// Print every scenario result, not just failures
    #[arg(short, long)]
    verbose: bool,

    /// Serial baud rate (ignored for SIMULATOR)
    #[arg(long, default_value_t = pmu_proto::constants::DEFAULT_BAUD_RATE)]
    baud: u32,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let link = match open_target(&args.target, args.baud) {
        Ok(link) => link,
        Err(e) => {
            eprintln!("failed to open {}: {e}", args.target);
            std::process::exit(1);
        }
    };

    let cfg = DeviceClientConfig::default().with_env_overrides();
    let mut client = DeviceClient::new(link, cfg);

    println!("running PMU-30 critical protocol tests against {} ({} iteration(s))", args.target, args.iterations);

    let report = run_critical_tests(&mut client, args.iterations, |result| {
        if args.verbose || !result.passed() {
            match &result.error {
                Some(err) => println!("  [{:3}] {:<24} FAILED ({:.1?}): {err}", result.iteration, result.name, result.elapsed),
                None => println!("  [{:3}] {:<24} ok ({:.1?})", result.iteration, result.name, result.elapsed),
            }
        }
    });

    if report.all_passed() {
        println!("all {} scenario runs passed", report.results.len());
        std::process::exit(0);
    }

    let failures = report.failures();
    println!("{} of {} scenario runs failed", failures.len(), report.results.len());
    std::process::exit(1);
}
