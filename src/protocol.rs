//! Wire framing for the VC0706 command/reply protocol.
//!
//! Commands go out as `[0x56, id, command, len, data...]`; replies come back
//! as `[0x76, id, command, status, payload...]`. Everything here is a pure
//! function over byte slices; nothing touches the transport.

/// Leading marker of every outbound command frame.
pub const COMMAND_SEND: u8 = 0x56;
/// Leading marker of every inbound reply frame.
pub const COMMAND_REPLY: u8 = 0x76;

/// Get firmware version / liveness probe.
pub const CMD_GET_VERSION: u8 = 0x11;
/// Switch the module's UART rate.
pub const CMD_SET_PORT: u8 = 0x24;
/// Soft-reset the module.
pub const CMD_RESET: u8 = 0x26;
/// Generic register read.
pub const CMD_READ_DATA: u8 = 0x30;
/// Generic register write.
pub const CMD_WRITE_DATA: u8 = 0x31;
/// Read a span of the frame buffer.
pub const CMD_READ_FBUF: u8 = 0x32;
/// Query the byte length of a frame-buffer slot.
pub const CMD_GET_FBUF_LEN: u8 = 0x34;
/// Stop/resume/step the frame buffer.
pub const CMD_FBUF_CTRL: u8 = 0x36;
/// Toggle the analog TV output.
pub const CMD_TV_OUT_CTRL: u8 = 0x44;
/// Downsize status probe.
pub const CMD_DOWNSIZE_STATUS: u8 = 0x54;

/// Length of the fixed reply header `[0x76, id, command, status, len]`.
pub const REPLY_HEADER_LEN: usize = 5;

/// Build an outbound command frame.
///
/// Rebuilding with identical arguments yields byte-identical frames. No
/// payload-size bound is enforced here; callers respect the device's
/// per-command limits.
#[must_use]
pub fn build_command(device_id: u8, command: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + data.len());
    #[allow(clippy::cast_possible_truncation)]
    frame.extend_from_slice(&[COMMAND_SEND, device_id, command, data.len() as u8]);
    frame.extend_from_slice(data);
    frame
}

/// Check a reply frame against the expected command echo.
///
/// A reply is valid iff its first four bytes are exactly
/// `[0x76, device_id, command, 0x00]`; anything trailing is ignored here.
/// Malformed input, short reads included, is a normal `false`.
#[must_use]
pub fn validate_reply(reply: &[u8], device_id: u8, command: u8) -> bool {
    match reply {
        [COMMAND_REPLY, id, cmd, 0x00, ..] => *id == device_id && *cmd == command,
        _ => false,
    }
}

/// Extract the frame length from a get-buffer-length reply.
///
/// Returns 0 on any validation failure; the caller treats 0 as "no data",
/// never as a valid empty frame.
#[must_use]
pub fn parse_buffer_length(reply: &[u8], device_id: u8) -> u32 {
    if !validate_reply(reply, device_id, CMD_GET_FBUF_LEN) {
        return 0;
    }
    match reply.get(4..9) {
        Some(&[0x04, b0, b1, b2, b3]) => u32::from_be_bytes([b0, b1, b2, b3]),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_layout() {
        let frame = build_command(0x00, CMD_GET_VERSION, &[]);
        assert_eq!(frame, vec![0x56, 0x00, 0x11, 0x00]);

        let frame = build_command(0x02, CMD_FBUF_CTRL, &[0x00]);
        assert_eq!(frame, vec![0x56, 0x02, 0x36, 0x01, 0x00]);
    }

    #[test]
    fn test_build_command_length_matches_data() {
        let data = [0x04, 0x01, 0x00, 0x19, 0x11];
        let frame = build_command(0x00, CMD_WRITE_DATA, &data);
        assert_eq!(frame[3] as usize, data.len());
        assert_eq!(&frame[4..], &data);
    }

    #[test]
    fn test_build_command_idempotent() {
        let a = build_command(0x01, CMD_READ_FBUF, &[0x00, 0x0A, 0x00, 0x00]);
        let b = build_command(0x01, CMD_READ_FBUF, &[0x00, 0x0A, 0x00, 0x00]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_reply_accepts_exact_header() {
        assert!(validate_reply(&[0x76, 0x00, 0x11, 0x00], 0x00, 0x11));
        // Trailing payload content is irrelevant.
        assert!(validate_reply(
            &[0x76, 0x00, 0x11, 0x00, 0x0B, 0xDE, 0xAD],
            0x00,
            0x11
        ));
    }

    #[test]
    fn test_validate_reply_rejects_deviations() {
        // Wrong marker.
        assert!(!validate_reply(&[0x56, 0x00, 0x11, 0x00], 0x00, 0x11));
        // Wrong device id.
        assert!(!validate_reply(&[0x76, 0x01, 0x11, 0x00], 0x00, 0x11));
        // Wrong command echo.
        assert!(!validate_reply(&[0x76, 0x00, 0x26, 0x00], 0x00, 0x11));
        // Non-zero status.
        assert!(!validate_reply(&[0x76, 0x00, 0x11, 0x03], 0x00, 0x11));
    }

    #[test]
    fn test_validate_reply_rejects_short_input() {
        assert!(!validate_reply(&[], 0x00, 0x11));
        assert!(!validate_reply(&[0x76], 0x00, 0x11));
        assert!(!validate_reply(&[0x76, 0x00, 0x11], 0x00, 0x11));
    }

    #[test]
    fn test_parse_buffer_length() {
        let reply = [0x76, 0x00, 0x34, 0x00, 0x04, 0x00, 0x00, 0xB6, 0xB8];
        assert_eq!(parse_buffer_length(&reply, 0x00), 46_776);
    }

    #[test]
    fn test_parse_buffer_length_invalid_is_zero() {
        // Invalid header.
        let reply = [0x76, 0x00, 0x34, 0x01, 0x04, 0x00, 0x00, 0xB6, 0xB8];
        assert_eq!(parse_buffer_length(&reply, 0x00), 0);
        // Wrong payload-size byte.
        let reply = [0x76, 0x00, 0x34, 0x00, 0x02, 0x00, 0x00, 0xB6, 0xB8];
        assert_eq!(parse_buffer_length(&reply, 0x00), 0);
        // Truncated payload.
        let reply = [0x76, 0x00, 0x34, 0x00, 0x04, 0x00];
        assert_eq!(parse_buffer_length(&reply, 0x00), 0);
        // Empty.
        assert_eq!(parse_buffer_length(&[], 0x00), 0);
    }
}
