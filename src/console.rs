//! UART console capture
//!
//! Reads whatever the design prints on the board's `uart` resource for a
//! bounded period. The pin and header labels come from the board tables.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::board::{Board, QUICKFEATHER};

/// Default console baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Where a UART signal lands on the board headers
fn header_position(board: &Board, pin: &str) -> Option<String> {
    board.connectors.iter().find_map(|c| {
        c.wired()
            .find(|(_, p)| *p == pin)
            .map(|(pos, _)| format!("{}.{}", c.designator(), pos))
    })
}

/// Human readable wiring of the board's console UART, e.g.
/// `uart0: tx pin 8 (J3.2), rx pin 9 (J3.3)`
pub fn uart_description(board: &Board) -> Option<String> {
    let uart = board.resource("uart", 0)?;
    let signal = |name: &str| {
        uart.subsignal(name).map(|s| match header_position(board, s.pin) {
            Some(pos) => format!("{} pin {} ({})", name, s.pin, pos),
            None => format!("{} pin {}", name, s.pin),
        })
    };
    Some(format!("{}{}: {}, {}", uart.name, uart.number, signal("tx")?, signal("rx")?))
}

/// Open a serial port for console capture
pub fn open(port: &str, baud_rate: u32) -> tokio_serial::Result<tokio_serial::SerialStream> {
    debug!("Opening {} at {} baud ({:?})", port, baud_rate, uart_description(&QUICKFEATHER));
    tokio_serial::SerialStream::open(&tokio_serial::new(port, baud_rate))
}

/// Collect text from `reader` until EOF, a read error, or `duration` elapses
pub async fn capture<R: AsyncRead + Unpin>(mut reader: R, duration: Duration) -> String {
    let mut output = String::new();
    let mut buf = [0u8; 1024];
    let deadline = Instant::now() + duration;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, reader.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => output.push_str(&String::from_utf8_lossy(&buf[..n])),
            Ok(Err(e)) => {
                warn!("Console read error: {}", e);
                break;
            }
            Err(_) => break,
        }
    }

    output
}
