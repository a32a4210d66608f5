//! Modem attached to a host serial port
//!
//! Adapts a `serialport` handle to the `embedded-io` traits the modem driver
//! is written against. Reads time out after a short poll so the driver keeps
//! control of its own response window.

use std::io::{self, Read as _, Write as _};
use std::time::Duration;

use embedded_io::ErrorKind;
use serialport::SerialPort;

/// Blocking read timeout of the port, one driver poll step.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;
        Ok(Self { port })
    }
}

fn kind(e: &io::Error) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::TimedOut,
        io::ErrorKind::Interrupted => ErrorKind::Interrupted,
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
        _ => ErrorKind::Other,
    }
}

impl embedded_io::ErrorType for SerialLink {
    type Error = ErrorKind;
}

impl embedded_io_async::Write for SerialLink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        self.port.write(buf).map_err(|e| kind(&e))
    }

    async fn flush(&mut self) -> Result<(), ErrorKind> {
        self.port.flush().map_err(|e| kind(&e))
    }
}

impl embedded_io_async::Read for SerialLink {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(kind(&e)),
        }
    }
}

impl embedded_io::ReadReady for SerialLink {
    fn read_ready(&mut self) -> Result<bool, ErrorKind> {
        self.port
            .bytes_to_read()
            .map(|pending| pending > 0)
            .map_err(|_| ErrorKind::Other)
    }
}

/// Delay for real hardware: sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl embedded_hal_async::delay::DelayNs for ThreadDelay {
    async fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}
