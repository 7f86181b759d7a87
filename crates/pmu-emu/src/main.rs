// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! pmu-emu - PMU-30 device emulator
//!
//! A small multi-threaded TCP server that speaks the identical frame
//! protocol as a real device, serving as the `SIMULATOR` target for
//! `pmu-client` and for integration tests that exercise the T-MIN
//! retransmit path without real hardware.

mod error;
mod session;
mod state;

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use clap::Parser;
use pmu_proto::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_TCP_PORT};

use crate::state::DeviceState;

/// PMU-30 device emulator
#[derive(Parser, Debug)]
#[command(name = "pmu-emu")]
#[command(version = "0.1.0")]
#[command(about = "PMU-30 device emulator (SIMULATOR target)")]
struct Args {
    /// Address to bind the TCP server to
    #[arg(long, default_value_t = format!("127.0.0.1:{DEFAULT_TCP_PORT}"))]
    bind: String,

    /// Probability in [0,1] of dropping an outbound frame, to exercise the
    /// T-MIN retransmit path
    #[arg(long, default_value_t = 0.0)]
    drop_rate: f64,

    /// Config/binary transfer chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if !(0.0..=1.0).contains(&args.drop_rate) {
        eprintln!("--drop-rate must be within [0, 1], got {}", args.drop_rate);
        std::process::exit(1);
    }

    let listener = match TcpListener::bind(&args.bind) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind {}: {e}", args.bind);
            std::process::exit(1);
        }
    };

    log::info!("pmu-emu listening on {} (drop_rate={})", args.bind, args.drop_rate);

    let state = Arc::new(Mutex::new(DeviceState::default()));

    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let state = state.clone();
                let drop_rate = args.drop_rate;
                let chunk_size = args.chunk_size;
                thread::spawn(move || session::handle_connection(stream, state, drop_rate, chunk_size));
            }
            Err(e) => log::warn!("accept error: {e}"),
        }
    }
}
