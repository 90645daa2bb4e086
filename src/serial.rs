//! Serial transport implementation using the `serialport` crate.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use crate::traits::{CameraError, Result, Transport};

/// Serial port transport wrapping the `serialport` crate.
///
/// The port path and per-read timeout are fixed at construction; the baud
/// rate is chosen at each [`Transport::open`], which always tears down any
/// previous handle first.
pub struct SerialTransport {
    path: String,
    timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create a transport for the given port path. Nothing is opened yet.
    #[must_use]
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            port: None,
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| CameraError::Io(std::io::ErrorKind::NotConnected.into()))
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, baud: u32) -> Result<()> {
        self.close();
        let port = serialport::new(&self.path, baud)
            .timeout(self.timeout)
            .open()
            .map_err(|err| CameraError::Io(err.into()))?;
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let port = self.port_mut()?;
        let mut buf = vec![0u8; max_len];
        let mut filled = 0;
        // Accumulate until the request is satisfied or the port goes quiet;
        // a timeout is a short read, not an error.
        while filled < max_len {
            let Some(window) = buf.get_mut(filled..) else {
                break;
            };
            match port.read(window) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => break,
                Err(err) => return Err(err.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unopened_transport_rejects_io() {
        let mut transport = SerialTransport::new("/dev/null", Duration::from_millis(10));
        assert!(!transport.is_open());
        assert!(transport.write(&[0x56]).is_err());
        assert!(transport.read(4).is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut transport = SerialTransport::new("/dev/null", Duration::from_millis(10));
        transport.close();
        transport.close();
        assert!(!transport.is_open());
    }
}
