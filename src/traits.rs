//! Core transport abstraction and shared types for the VC0706 driver.

use std::time::Duration;

/// Abstraction over the serial byte channel the camera is attached to.
///
/// The protocol is strictly half-duplex: a command frame is written, then a
/// reply is read back before anything else touches the wire. Reads block up
/// to the transport's configured timeout; a timeout manifests as a short or
/// empty result, never as an error.
pub trait Transport {
    /// Open (or reopen) the channel at the given baud rate.
    ///
    /// A baud-rate change always goes through a full close/reopen cycle.
    fn open(&mut self, baud: u32) -> Result<()>;

    /// Close the channel. Closing an already-closed channel is a no-op.
    fn close(&mut self);

    /// Whether the channel is currently open.
    fn is_open(&self) -> bool;

    /// Write the whole byte sequence to the channel.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read up to `max_len` bytes, blocking until they arrive or the
    /// timeout elapses. Returns however many bytes made it (possibly none).
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>>;
}

/// Baud rates the VC0706 supports.
///
/// The closed set doubles as the auto-discovery candidate list; anything
/// else is rejected up front rather than sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaudRate {
    /// 9600 baud.
    Baud9600,
    /// 19200 baud.
    Baud19200,
    /// 38400 baud, the module's factory default.
    #[default]
    Baud38400,
    /// 57600 baud.
    Baud57600,
    /// 115200 baud.
    Baud115200,
}

impl BaudRate {
    /// Discovery candidates, probed in ascending order.
    pub const CANDIDATES: [Self; 5] = [
        Self::Baud9600,
        Self::Baud19200,
        Self::Baud38400,
        Self::Baud57600,
        Self::Baud115200,
    ];

    /// The rate in baud.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Baud9600 => 9600,
            Self::Baud19200 => 19200,
            Self::Baud38400 => 38400,
            Self::Baud57600 => 57600,
            Self::Baud115200 => 115_200,
        }
    }

    /// Parse a numeric rate, rejecting anything the module cannot do.
    pub fn from_u32(rate: u32) -> Result<Self> {
        Self::CANDIDATES
            .into_iter()
            .find(|candidate| candidate.as_u32() == rate)
            .ok_or(CameraError::UnsupportedBaudRate(rate))
    }

    /// UART divisor register pair sent with the set-port command.
    #[must_use]
    pub const fn divisor(self) -> [u8; 2] {
        match self {
            Self::Baud9600 => [0xAE, 0xC8],
            Self::Baud19200 => [0x56, 0xE4],
            Self::Baud38400 => [0x2A, 0xF2],
            Self::Baud57600 => [0x1C, 0x4C],
            Self::Baud115200 => [0x0D, 0xA6],
        }
    }
}

/// Image resolution, stored in the module's EEPROM-backed size register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    /// 640x480.
    #[default]
    Large,
    /// 320x240.
    Medium,
    /// 160x120.
    Small,
}

impl Resolution {
    /// Register value for this resolution.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Large => 0x00,
            Self::Medium => 0x11,
            Self::Small => 0x22,
        }
    }

    /// Map a register value back to a resolution.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Large),
            0x11 => Some(Self::Medium),
            0x22 => Some(Self::Small),
            _ => None,
        }
    }
}

/// Which of the module's two frame-buffer slots a capture targets.
///
/// A capture uses one slot throughout; the configuration fixes it up front
/// so length queries and buffer reads cannot diverge mid-sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameSlot {
    /// The slot holding the frame at the moment video was stopped.
    #[default]
    Current,
    /// The slot the module fills next.
    Next,
}

impl FrameSlot {
    /// Selector byte carried by length and read-buffer commands.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Current => 0x00,
            Self::Next => 0x01,
        }
    }
}

/// Frame-buffer-control actions. Issuing a stop action latches a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBufferAction {
    /// Stop updating the current-frame slot.
    StopCurrent,
    /// Stop updating the next-frame slot.
    StopNext,
    /// Resume live video.
    Resume,
    /// Step to the next frame.
    Step,
}

impl FrameBufferAction {
    /// Action byte carried by the frame-buffer-control command.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::StopCurrent => 0x00,
            Self::StopNext => 0x01,
            Self::Resume => 0x02,
            Self::Step => 0x03,
        }
    }
}

/// Everything one capture needs to know.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Serial port path (e.g. `/dev/ttyUSB0`).
    pub port: String,
    /// Baud rate the link is switched to after discovery.
    pub target_baud: BaudRate,
    /// Module id printed on the unit, 0 unless reassigned.
    pub device_id: u8,
    /// Capture resolution.
    pub resolution: Resolution,
    /// JPEG compression ratio register value.
    pub compression: u8,
    /// Bytes per buffer read; must be a positive multiple of 4.
    pub chunk_size: u32,
    /// Frame-buffer slot the capture drains.
    pub slot: FrameSlot,
    /// Per-read transport timeout.
    pub timeout: Duration,
}

impl CaptureConfig {
    /// Defaults matching the module out of the box: 38400 baud, id 0,
    /// 640x480, compression 0x35, 1 KiB chunks, current-frame slot.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            target_baud: BaudRate::default(),
            device_id: 0,
            resolution: Resolution::default(),
            compression: 0x35,
            chunk_size: 1024,
            slot: FrameSlot::default(),
            timeout: Duration::from_millis(500),
        }
    }

    /// Set the target baud rate.
    #[must_use]
    pub fn with_target_baud(mut self, baud: BaudRate) -> Self {
        self.target_baud = baud;
        self
    }

    /// Set the module id.
    #[must_use]
    pub fn with_device_id(mut self, device_id: u8) -> Self {
        self.device_id = device_id;
        self
    }

    /// Set the capture resolution.
    #[must_use]
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the compression ratio register value.
    #[must_use]
    pub fn with_compression(mut self, compression: u8) -> Self {
        self.compression = compression;
        self
    }

    /// Set the buffer-read chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the frame-buffer slot.
    #[must_use]
    pub fn with_slot(mut self, slot: FrameSlot) -> Self {
        self.slot = slot;
        self
    }

    /// Set the per-read transport timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject configurations the device cannot serve. The chunk size bounds
    /// each buffer read and the device requires it to be 4-byte aligned.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size % 4 != 0 {
            return Err(CameraError::InvalidChunkSize(self.chunk_size));
        }
        Ok(())
    }
}

/// Error type for camera operations.
///
/// Every variant is terminal for the capture in progress; there is no
/// partial-payload result.
#[derive(Debug)]
pub enum CameraError {
    /// No candidate baud rate produced a valid version reply.
    DeviceNotFound,
    /// The device rejected the port switch, or was unreachable at the new
    /// rate afterwards.
    ReconfigureFailed(BaudRate),
    /// A terminal configuration step returned an invalid reply.
    ConfigurationFailed(&'static str),
    /// The frame-buffer sequence never produced a readable frame.
    CaptureFailed,
    /// A full-length buffer-read reply failed header validation.
    ReadProtocolError {
        /// Frame-buffer offset of the failed read.
        offset: u32,
    },
    /// A buffer read stayed short after the retry budget was spent.
    TransportTimeout {
        /// Frame-buffer offset of the read that kept timing out.
        offset: u32,
    },
    /// The requested baud rate is outside the module's supported set.
    UnsupportedBaudRate(u32),
    /// Chunk size is zero or not a multiple of 4.
    InvalidChunkSize(u32),
    /// I/O error from the underlying transport.
    Io(std::io::Error),
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceNotFound => write!(f, "camera not found at any candidate baud rate"),
            Self::ReconfigureFailed(rate) => {
                write!(f, "device unreachable after switching to {} baud", rate.as_u32())
            }
            Self::ConfigurationFailed(step) => {
                write!(f, "device rejected configuration step: {step}")
            }
            Self::CaptureFailed => write!(f, "capture produced no frame data"),
            Self::ReadProtocolError { offset } => {
                write!(f, "invalid buffer-read reply at offset {offset}")
            }
            Self::TransportTimeout { offset } => {
                write!(f, "no complete reply at offset {offset} after retries")
            }
            Self::UnsupportedBaudRate(rate) => write!(f, "unsupported baud rate: {rate}"),
            Self::InvalidChunkSize(size) => {
                write!(f, "chunk size must be a positive multiple of 4, got {size}")
            }
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for CameraError {}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_ascending() {
        let rates: Vec<u32> = BaudRate::CANDIDATES.iter().map(|r| r.as_u32()).collect();
        let mut sorted = rates.clone();
        sorted.sort_unstable();
        assert_eq!(rates, sorted);
    }

    #[test]
    fn test_baud_rate_round_trip() {
        for rate in BaudRate::CANDIDATES {
            let parsed = BaudRate::from_u32(rate.as_u32()).expect("candidate should parse");
            assert_eq!(parsed, rate);
        }
    }

    #[test]
    fn test_baud_rate_rejects_unsupported() {
        for rate in [0, 300, 4800, 38401, 230_400] {
            assert!(matches!(
                BaudRate::from_u32(rate),
                Err(CameraError::UnsupportedBaudRate(r)) if r == rate
            ));
        }
    }

    #[test]
    fn test_divisor_table() {
        assert_eq!(BaudRate::Baud9600.divisor(), [0xAE, 0xC8]);
        assert_eq!(BaudRate::Baud19200.divisor(), [0x56, 0xE4]);
        assert_eq!(BaudRate::Baud38400.divisor(), [0x2A, 0xF2]);
        assert_eq!(BaudRate::Baud57600.divisor(), [0x1C, 0x4C]);
        assert_eq!(BaudRate::Baud115200.divisor(), [0x0D, 0xA6]);
    }

    #[test]
    fn test_resolution_codes() {
        for resolution in [Resolution::Large, Resolution::Medium, Resolution::Small] {
            assert_eq!(Resolution::from_code(resolution.code()), Some(resolution));
        }
        assert_eq!(Resolution::from_code(0x33), None);
    }

    #[test]
    fn test_config_rejects_bad_chunk_size() {
        let config = CaptureConfig::new("/dev/null").with_chunk_size(1022);
        assert!(matches!(
            config.validate(),
            Err(CameraError::InvalidChunkSize(1022))
        ));

        let config = CaptureConfig::new("/dev/null").with_chunk_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_accepts_aligned_chunk_size() {
        for chunk in [4, 512, 1024, 8192] {
            let config = CaptureConfig::new("/dev/null").with_chunk_size(chunk);
            assert!(config.validate().is_ok());
        }
    }
}
