//! Typed command set over the VC0706 wire protocol.
//!
//! Each method is one request/reply exchange. Protocol-level failures (a
//! reply that does not validate) surface as `false`, `0`, or `None` per the
//! device's own discipline; only transport I/O failures become errors.

use std::thread;
use std::time::Duration;

use log::debug;

use crate::protocol::{
    build_command, parse_buffer_length, validate_reply, CMD_DOWNSIZE_STATUS, CMD_FBUF_CTRL,
    CMD_GET_FBUF_LEN, CMD_GET_VERSION, CMD_READ_DATA, CMD_READ_FBUF, CMD_RESET, CMD_SET_PORT,
    CMD_TV_OUT_CTRL, CMD_WRITE_DATA, REPLY_HEADER_LEN,
};
use crate::traits::{BaudRate, FrameBufferAction, FrameSlot, Resolution, Result, Transport};

/// EEPROM register holding the resolution code.
const SIZE_REGISTER: [u8; 2] = [0x00, 0x19];
/// EEPROM register holding the compression ratio.
const COMPRESSION_REGISTER: [u8; 2] = [0x00, 0x1A];

/// Transfer-control mode byte carried by every buffer-read command.
const READ_CONTROL_MODE: u8 = 0x0A;
/// Inter-chunk delay sent with buffer reads, in units of 10 microseconds.
const READ_DELAY: u16 = 0x1000;

/// Wait before re-reading a frame-buffer-control reply; the module goes
/// quiet for up to a couple of seconds while it latches a frame.
const CONTROL_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// One camera module on one transport.
///
/// Owns the transport exclusively for the session; the device id travels in
/// every frame and is echoed back in every reply.
pub struct Camera<T: Transport> {
    transport: T,
    device_id: u8,
    retry_backoff: Duration,
}

impl<T: Transport> Camera<T> {
    /// Wrap a transport for the module with the given id (0 unless the unit
    /// was reassigned).
    pub fn new(transport: T, device_id: u8) -> Self {
        Self {
            transport,
            device_id,
            retry_backoff: CONTROL_RETRY_BACKOFF,
        }
    }

    /// Override the frame-buffer-control re-read backoff.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// The module id this session talks to.
    pub const fn device_id(&self) -> u8 {
        self.device_id
    }

    /// Access the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the session and return the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Write one command frame and read back up to `reply_len` bytes.
    fn exchange(&mut self, command: u8, data: &[u8], reply_len: usize) -> Result<Vec<u8>> {
        let frame = build_command(self.device_id, command, data);
        self.transport.write(&frame)?;
        self.transport.read(reply_len)
    }

    /// Exchange where only the reply header matters.
    fn simple_command(&mut self, command: u8, data: &[u8], reply_len: usize) -> Result<bool> {
        let reply = self.exchange(command, data, reply_len)?;
        Ok(validate_reply(&reply, self.device_id, command))
    }

    fn write_register(&mut self, register: [u8; 2], value: u8) -> Result<bool> {
        let [hi, lo] = register;
        self.simple_command(CMD_WRITE_DATA, &[0x04, 0x01, hi, lo, value], REPLY_HEADER_LEN)
    }

    fn read_register(&mut self, register: [u8; 2]) -> Result<Option<u8>> {
        let [hi, lo] = register;
        let reply = self.exchange(CMD_READ_DATA, &[0x04, 0x01, hi, lo], REPLY_HEADER_LEN + 1)?;
        if !validate_reply(&reply, self.device_id, CMD_READ_DATA) {
            return Ok(None);
        }
        Ok(reply.get(REPLY_HEADER_LEN).copied())
    }

    /// Probe the module and return its identification string
    /// (e.g. `"VC0706 1.00"`), or `None` if nothing valid came back.
    pub fn get_version(&mut self) -> Result<Option<String>> {
        let reply = self.exchange(CMD_GET_VERSION, &[], 16)?;
        if !validate_reply(&reply, self.device_id, CMD_GET_VERSION) {
            return Ok(None);
        }
        let version = reply
            .get(REPLY_HEADER_LEN..)
            .map(|tail| String::from_utf8_lossy(tail).trim().to_owned())
            .unwrap_or_default();
        Ok(Some(version))
    }

    /// Soft-reset the module.
    ///
    /// The module needs settling time on the order of seconds before it
    /// answers further commands; waiting is the caller's job.
    pub fn reset(&mut self) -> Result<bool> {
        // The module dumps boot text after the ack; drain generously.
        self.simple_command(CMD_RESET, &[], 100)
    }

    /// Ask the module to switch its UART to the given rate.
    ///
    /// On a valid reply the caller must close and reopen the transport at
    /// the new rate; the module switches as soon as it has answered.
    pub fn set_port(&mut self, baud: BaudRate) -> Result<bool> {
        let [hi, lo] = baud.divisor();
        self.simple_command(CMD_SET_PORT, &[0x01, hi, lo], REPLY_HEADER_LEN)
    }

    /// Write the resolution register.
    pub fn set_size(&mut self, resolution: Resolution) -> Result<bool> {
        self.write_register(SIZE_REGISTER, resolution.code())
    }

    /// Read the resolution register back.
    pub fn get_size(&mut self) -> Result<Option<Resolution>> {
        Ok(self.read_register(SIZE_REGISTER)?.and_then(Resolution::from_code))
    }

    /// Write the compression ratio register.
    pub fn set_compression(&mut self, ratio: u8) -> Result<bool> {
        self.write_register(COMPRESSION_REGISTER, ratio)
    }

    /// Read the compression ratio register back.
    pub fn get_compression(&mut self) -> Result<Option<u8>> {
        self.read_register(COMPRESSION_REGISTER)
    }

    /// Toggle the analog TV output.
    pub fn set_tv_output(&mut self, enabled: bool) -> Result<bool> {
        self.simple_command(CMD_TV_OUT_CTRL, &[u8::from(enabled)], REPLY_HEADER_LEN)
    }

    /// Issue a frame-buffer-control action. Stop actions latch a frame.
    ///
    /// A module caught mid-capture may miss the reply window; one empty
    /// read is tolerated, followed by a fixed backoff and a single re-read
    /// before the operation reports failure.
    pub fn frame_buffer_control(&mut self, action: FrameBufferAction) -> Result<bool> {
        let frame = build_command(self.device_id, CMD_FBUF_CTRL, &[action.code()]);
        self.transport.write(&frame)?;
        let mut reply = self.transport.read(REPLY_HEADER_LEN)?;
        if reply.is_empty() {
            debug!("frame buffer control: empty reply, re-reading after backoff");
            thread::sleep(self.retry_backoff);
            reply = self.transport.read(REPLY_HEADER_LEN)?;
        }
        Ok(validate_reply(&reply, self.device_id, CMD_FBUF_CTRL))
    }

    /// Byte length of the frame held in the given slot; 0 on any
    /// validation failure ("no data", never a valid empty frame).
    pub fn get_buffer_length(&mut self, slot: FrameSlot) -> Result<u32> {
        let reply = self.exchange(CMD_GET_FBUF_LEN, &[slot.code()], 10)?;
        Ok(parse_buffer_length(&reply, self.device_id))
    }

    /// Downsize status probe; only the reply header is interpreted.
    pub fn get_downsize_status(&mut self) -> Result<bool> {
        self.simple_command(CMD_DOWNSIZE_STATUS, &[], REPLY_HEADER_LEN)
    }

    /// Request one span of the frame buffer and return the raw reply.
    ///
    /// A complete reply is `5 + chunk + 5` bytes: header, payload, header
    /// echo. Whatever arrived within the timeout is returned as-is; the
    /// buffer reader decides whether it is usable.
    pub fn read_buffer(&mut self, slot: FrameSlot, offset: u32, chunk: u32) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(12);
        data.push(slot.code());
        data.push(READ_CONTROL_MODE);
        data.extend_from_slice(&offset.to_be_bytes());
        data.extend_from_slice(&chunk.to_be_bytes());
        data.extend_from_slice(&READ_DELAY.to_be_bytes());
        let reply_len = REPLY_HEADER_LEN + chunk as usize + REPLY_HEADER_LEN;
        self.exchange(CMD_READ_FBUF, &data, reply_len)
    }
}
