// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte-stream transport the device client reads frames from and writes
//! frames to. [`Transport`](pmu_proto::Transport) is link-agnostic; this
//! module supplies the two concrete carriers named in spec.md §6.2.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use pmu_proto::constants::{DEFAULT_BAUD_RATE, DEFAULT_TCP_PORT};

/// A byte-oriented connection to a PMU-30 device or its emulator.
///
/// Deliberately narrower than `std::io::{Read, Write}` so both the serial
/// and TCP backings can share one non-blocking-ish polling contract: reads
/// time out rather than block forever, matching the device client's
/// cooperative event loop (spec.md §5).
pub trait Link {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

/// Serial link over the `serialport` crate: 8-N-1, no hardware flow control.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink {
    pub fn open(path: &str, baud: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(path, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(50))
            .open()?;
        Ok(Self { port })
    }

    pub fn open_default(path: &str) -> Result<Self, serialport::Error> {
        Self::open(path, DEFAULT_BAUD_RATE)
    }
}

impl Link for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// TCP link to the emulator (`SIMULATOR` target) or a networked device bridge.
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(Duration::from_millis(50)))?;
        Ok(Self { stream })
    }

    pub fn connect_simulator() -> io::Result<Self> {
        Self::connect("127.0.0.1", DEFAULT_TCP_PORT)
    }
}

impl Link for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))
    }
}

/// Opens a [`Link`] from a CLI-style target string: `SIMULATOR` (case
/// insensitive) for the TCP emulator on the default port, otherwise a
/// serial port path.
pub fn open_target(target: &str, baud: u32) -> Result<Box<dyn Link>, crate::error::ClientError> {
    if target.eq_ignore_ascii_case("simulator") {
        Ok(Box::new(TcpLink::connect_simulator()?))
    } else {
        Ok(Box::new(SerialLink::open(target, baud)?))
    }
}
