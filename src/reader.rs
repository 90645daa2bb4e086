//! Chunked frame-buffer drain.
//!
//! The frame is pulled out of the module in bounded, 4-byte-aligned chunks.
//! A short read means the link timed out mid-reply; the same offset is
//! retried with an identical request, up to a fixed budget. A full-length
//! reply with a bad header is a protocol error and aborts the drain.

use log::{debug, trace};

use crate::camera::Camera;
use crate::protocol::{validate_reply, CMD_READ_FBUF, REPLY_HEADER_LEN};
use crate::traits::{CameraError, FrameSlot, Result, Transport};

/// Attempts per chunk before the drain is abandoned as a transport timeout.
pub const MAX_CHUNK_RETRIES: u32 = 8;

/// Retrieve exactly `total_length` bytes from the given frame-buffer slot.
///
/// The cursor starts at offset 0 and only advances on a fully validated
/// chunk, so the returned payload length always equals `total_length`.
/// `chunk_size` must be a positive multiple of 4 (validated upstream by
/// [`crate::traits::CaptureConfig::validate`]).
pub fn drain<T: Transport>(
    camera: &mut Camera<T>,
    slot: FrameSlot,
    total_length: u32,
    chunk_size: u32,
) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(total_length as usize);
    let mut offset = 0u32;

    while offset < total_length {
        // The last read may cover fewer bytes than a full chunk.
        let chunk = chunk_size.min(total_length - offset);
        let expected = REPLY_HEADER_LEN + chunk as usize + REPLY_HEADER_LEN;

        let mut attempts = 0u32;
        let reply = loop {
            let reply = camera.read_buffer(slot, offset, chunk)?;
            if reply.len() == expected {
                break reply;
            }
            attempts += 1;
            debug!(
                "short read at offset {offset}: {} of {expected} bytes (attempt {attempts})",
                reply.len()
            );
            if attempts >= MAX_CHUNK_RETRIES {
                return Err(CameraError::TransportTimeout { offset });
            }
        };

        if !validate_reply(&reply, camera.device_id(), CMD_READ_FBUF) {
            return Err(CameraError::ReadProtocolError { offset });
        }

        // Payload sits between the header and its trailing echo.
        match reply.get(REPLY_HEADER_LEN..REPLY_HEADER_LEN + chunk as usize) {
            Some(data) => payload.extend_from_slice(data),
            None => return Err(CameraError::ReadProtocolError { offset }),
        }

        offset += chunk;
        trace!("drained {offset} of {total_length} bytes");
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::MockCamera;
    use crate::protocol::{CMD_READ_FBUF as READ, COMMAND_SEND};
    use crate::traits::BaudRate;

    fn camera(mock: MockCamera) -> Camera<MockCamera> {
        let mut camera = Camera::new(mock, 0).with_retry_backoff(Duration::ZERO);
        camera
            .transport_mut()
            .open(BaudRate::Baud38400.as_u32())
            .expect("mock open should succeed");
        camera
    }

    fn read_requests(camera: &mut Camera<MockCamera>) -> Vec<Vec<u8>> {
        camera
            .transport_mut()
            .commands
            .iter()
            .filter(|frame| frame.get(2) == Some(&READ))
            .cloned()
            .collect()
    }

    fn request_offset(frame: &[u8]) -> u32 {
        let bytes: [u8; 4] = frame[6..10].try_into().expect("frame carries an offset");
        u32::from_be_bytes(bytes)
    }

    #[test]
    fn test_drain_chunk_sequence() {
        // 2050 bytes at 1024-byte chunks: reads of 1024, 1024, 2.
        let image: Vec<u8> = (0..2050u32).map(|i| (i % 251) as u8).collect();
        let mut camera = camera(MockCamera::new(0, 38400).with_image(image.clone()));

        let payload = drain(&mut camera, FrameSlot::Current, 2050, 1024)
            .expect("drain should succeed");
        assert_eq!(payload, image);

        let requests = read_requests(&mut camera);
        assert_eq!(requests.len(), 3);
        let offsets: Vec<u32> = requests.iter().map(|r| request_offset(r)).collect();
        assert_eq!(offsets, vec![0, 1024, 2048]);
        assert_eq!(requests[0][0], COMMAND_SEND);
    }

    #[test]
    fn test_drain_zero_length_is_empty() {
        let mut camera = camera(MockCamera::new(0, 38400).with_image(vec![1, 2, 3]));
        let payload =
            drain(&mut camera, FrameSlot::Current, 0, 1024).expect("drain should succeed");
        assert!(payload.is_empty());
        assert!(read_requests(&mut camera).is_empty());
    }

    #[test]
    fn test_short_read_retries_same_offset() {
        let image = vec![0x42; 64];
        let mock = MockCamera::new(0, 38400)
            .with_image(image.clone())
            .with_dropped_read_replies(1);
        let mut camera = camera(mock);

        let payload =
            drain(&mut camera, FrameSlot::Current, 64, 32).expect("drain should succeed");
        assert_eq!(payload, image);

        // First request got no reply; the same offset went out again,
        // byte-identical, before the cursor advanced.
        let requests = read_requests(&mut camera);
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(request_offset(&requests[2]), 32);
    }

    #[test]
    fn test_persistent_short_reads_time_out() {
        let mock = MockCamera::new(0, 38400)
            .with_image(vec![0x42; 64])
            .with_dropped_read_replies(MAX_CHUNK_RETRIES);
        let mut camera = camera(mock);

        let result = drain(&mut camera, FrameSlot::Current, 64, 32);
        assert!(matches!(
            result,
            Err(CameraError::TransportTimeout { offset: 0 })
        ));
    }

    #[test]
    fn test_truncated_reply_retries_then_recovers() {
        let image = vec![0x17; 128];
        let mock = MockCamera::new(0, 38400)
            .with_image(image.clone())
            .with_truncated_read_replies(2);
        let mut camera = camera(mock);

        let payload =
            drain(&mut camera, FrameSlot::Current, 128, 64).expect("drain should succeed");
        assert_eq!(payload, image);
    }

    #[test]
    fn test_bad_header_aborts_without_retry() {
        let mock = MockCamera::new(0, 38400)
            .with_image(vec![0x42; 64])
            .with_failing_command(READ);
        let mut camera = camera(mock);

        let result = drain(&mut camera, FrameSlot::Current, 64, 32);
        assert!(matches!(
            result,
            Err(CameraError::ReadProtocolError { offset: 0 })
        ));
        // A protocol error is not retried: exactly one request went out.
        assert_eq!(read_requests(&mut camera).len(), 1);
    }

    #[test]
    fn test_chunk_sizes_sum_to_total() {
        for (total, chunk) in [(4096u32, 1024u32), (100, 8), (7, 4), (1024, 1024)] {
            let image: Vec<u8> = (0..total).map(|i| (i % 256) as u8).collect();
            let mut camera = camera(MockCamera::new(0, 38400).with_image(image.clone()));
            let payload = drain(&mut camera, FrameSlot::Current, total, chunk)
                .expect("drain should succeed");
            assert_eq!(payload.len() as u32, total);
            assert_eq!(payload, image);
        }
    }
}
