//! Mock camera module for testing without hardware.
//!
//! `MockCamera` sits behind the [`Transport`] interface and scripts a
//! VC0706: it answers only when the link is opened at the rate the
//! simulated device is configured for (which is what makes auto-baud
//! discovery testable), honors the device id, applies set-port switches,
//! and serves buffer reads from a configured image. Builder methods inject
//! the fault modes the driver has to survive.

use std::collections::VecDeque;

use crate::protocol::{
    CMD_DOWNSIZE_STATUS, CMD_FBUF_CTRL, CMD_GET_FBUF_LEN, CMD_GET_VERSION, CMD_READ_DATA,
    CMD_READ_FBUF, CMD_RESET, CMD_SET_PORT, CMD_TV_OUT_CTRL, CMD_WRITE_DATA, COMMAND_REPLY,
    COMMAND_SEND,
};
use crate::traits::{BaudRate, Result, Transport};

const VERSION_STRING: &[u8] = b"VC0706 1.00";

/// Simulated VC0706 module behind the [`Transport`] interface.
pub struct MockCamera {
    device_id: u8,
    device_baud: u32,
    link_baud: Option<u32>,
    image: Vec<u8>,
    resolution: u8,
    compression: u8,
    tv_out: bool,
    pending: VecDeque<u8>,
    /// Reply withheld until N reads have come back empty.
    delayed: Option<(u32, Vec<u8>)>,
    delayed_control_reads: u32,
    dropped_read_replies: u32,
    truncated_read_replies: u32,
    failing_commands: Vec<u8>,
    /// Every command frame decoded off the wire, in order.
    pub commands: Vec<Vec<u8>>,
    /// Every baud rate the host opened the link at, in order.
    pub probed_bauds: Vec<u32>,
}

impl MockCamera {
    /// A module with the given id, listening at the given baud rate.
    #[must_use]
    pub fn new(device_id: u8, device_baud: u32) -> Self {
        Self {
            device_id,
            device_baud,
            link_baud: None,
            image: Vec::new(),
            resolution: 0x00,
            compression: 0x35,
            tv_out: true,
            pending: VecDeque::new(),
            delayed: None,
            delayed_control_reads: 0,
            dropped_read_replies: 0,
            truncated_read_replies: 0,
            failing_commands: Vec::new(),
            commands: Vec::new(),
            probed_bauds: Vec::new(),
        }
    }

    /// Load the frame the module will serve.
    #[must_use]
    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = image;
        self
    }

    /// Hold every frame-buffer-control reply back until `reads` reads have
    /// returned empty (simulates a module busy latching a frame).
    #[must_use]
    pub fn with_delayed_control_replies(mut self, reads: u32) -> Self {
        self.delayed_control_reads = reads;
        self
    }

    /// Swallow the next `count` buffer-read replies entirely.
    #[must_use]
    pub fn with_dropped_read_replies(mut self, count: u32) -> Self {
        self.dropped_read_replies = count;
        self
    }

    /// Serve the next `count` buffer-read replies cut off mid-frame.
    #[must_use]
    pub fn with_truncated_read_replies(mut self, count: u32) -> Self {
        self.truncated_read_replies = count;
        self
    }

    /// Answer the given command with a non-zero status byte.
    #[must_use]
    pub fn with_failing_command(mut self, command: u8) -> Self {
        self.failing_commands.push(command);
        self
    }

    /// The baud rate the simulated module currently listens at.
    #[must_use]
    pub fn device_baud(&self) -> u32 {
        self.device_baud
    }

    /// Whether the simulated module's TV output is enabled.
    #[must_use]
    pub fn tv_out(&self) -> bool {
        self.tv_out
    }

    fn status_for(&self, command: u8) -> u8 {
        if self.failing_commands.contains(&command) {
            0x03
        } else {
            0x00
        }
    }

    fn ack(&self, command: u8) -> Vec<u8> {
        vec![
            COMMAND_REPLY,
            self.device_id,
            command,
            self.status_for(command),
            0x00,
        ]
    }

    fn register(&self, address: [u8; 2]) -> u8 {
        match address {
            [0x00, 0x19] => self.resolution,
            [0x00, 0x1A] => self.compression,
            _ => 0x00,
        }
    }

    fn dispatch(&mut self, command: u8, data: &[u8]) {
        let status = self.status_for(command);
        match command {
            CMD_GET_VERSION => {
                #[allow(clippy::cast_possible_truncation)]
                let mut reply = vec![
                    COMMAND_REPLY,
                    self.device_id,
                    command,
                    status,
                    VERSION_STRING.len() as u8,
                ];
                reply.extend_from_slice(VERSION_STRING);
                self.pending.extend(reply);
            }
            CMD_RESET | CMD_DOWNSIZE_STATUS => {
                let reply = self.ack(command);
                self.pending.extend(reply);
            }
            CMD_SET_PORT => {
                let reply = self.ack(command);
                self.pending.extend(reply);
                if status == 0x00 {
                    if let [0x01, hi, lo] = data {
                        if let Some(rate) = BaudRate::CANDIDATES
                            .into_iter()
                            .find(|rate| rate.divisor() == [*hi, *lo])
                        {
                            // Takes effect from the next reopen; the ack
                            // already went out at the old rate.
                            self.device_baud = rate.as_u32();
                        }
                    }
                }
            }
            CMD_WRITE_DATA => {
                if status == 0x00 {
                    if let [0x04, 0x01, hi, lo, value] = data {
                        match [*hi, *lo] {
                            [0x00, 0x19] => self.resolution = *value,
                            [0x00, 0x1A] => self.compression = *value,
                            _ => {}
                        }
                    }
                }
                let reply = self.ack(command);
                self.pending.extend(reply);
            }
            CMD_READ_DATA => {
                if let [0x04, 0x01, hi, lo] = data {
                    let value = self.register([*hi, *lo]);
                    self.pending.extend([
                        COMMAND_REPLY,
                        self.device_id,
                        command,
                        status,
                        0x01,
                        value,
                    ]);
                }
            }
            CMD_TV_OUT_CTRL => {
                if let [flag] = data {
                    self.tv_out = *flag != 0;
                }
                let reply = self.ack(command);
                self.pending.extend(reply);
            }
            CMD_FBUF_CTRL => {
                let reply = self.ack(command);
                if self.delayed_control_reads > 0 {
                    self.delayed = Some((self.delayed_control_reads, reply));
                } else {
                    self.pending.extend(reply);
                }
            }
            CMD_GET_FBUF_LEN => {
                #[allow(clippy::cast_possible_truncation)]
                let length = self.image.len() as u32;
                let mut reply = vec![COMMAND_REPLY, self.device_id, command, status, 0x04];
                reply.extend_from_slice(&length.to_be_bytes());
                self.pending.extend(reply);
            }
            CMD_READ_FBUF => {
                if self.dropped_read_replies > 0 {
                    self.dropped_read_replies -= 1;
                    return;
                }
                let [_slot, _mode, o0, o1, o2, o3, c0, c1, c2, c3, _d0, _d1] = data else {
                    return;
                };
                let offset = u32::from_be_bytes([*o0, *o1, *o2, *o3]) as usize;
                let chunk = u32::from_be_bytes([*c0, *c1, *c2, *c3]) as usize;
                let body = self.image.get(offset..offset + chunk).unwrap_or(&[]);

                let mut reply = vec![COMMAND_REPLY, self.device_id, command, status, 0x00];
                reply.extend_from_slice(body);
                reply.extend_from_slice(&[COMMAND_REPLY, self.device_id, command, 0x00, 0x00]);
                if self.truncated_read_replies > 0 {
                    self.truncated_read_replies -= 1;
                    reply.truncate(reply.len() / 2);
                }
                self.pending.extend(reply);
            }
            _ => {}
        }
    }
}

impl Transport for MockCamera {
    fn open(&mut self, baud: u32) -> Result<()> {
        self.probed_bauds.push(baud);
        self.link_baud = Some(baud);
        self.pending.clear();
        self.delayed = None;
        Ok(())
    }

    fn close(&mut self) {
        self.link_baud = None;
        self.pending.clear();
        self.delayed = None;
    }

    fn is_open(&self) -> bool {
        self.link_baud.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(link_baud) = self.link_baud else {
            return Err(std::io::Error::from(std::io::ErrorKind::NotConnected).into());
        };
        // At the wrong rate the module sees only line noise.
        if link_baud != self.device_baud {
            return Ok(());
        }
        self.commands.push(bytes.to_vec());
        if let [COMMAND_SEND, id, command, len, data @ ..] = bytes {
            if *id == self.device_id && *len as usize == data.len() {
                let command = *command;
                let data = data.to_vec();
                self.dispatch(command, &data);
            }
        }
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        if self.link_baud.is_none() {
            return Err(std::io::Error::from(std::io::ErrorKind::NotConnected).into());
        }
        if self.pending.is_empty() {
            if let Some((remaining, bytes)) = self.delayed.take() {
                if remaining > 1 {
                    self.delayed = Some((remaining - 1, bytes));
                } else {
                    self.pending.extend(bytes);
                }
            }
            return Ok(Vec::new());
        }
        let take = max_len.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }
}
