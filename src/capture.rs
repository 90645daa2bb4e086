//! Capture orchestration: baud discovery, port reconfiguration, capture
//! settings, frame trigger, and the buffer drain.
//!
//! The sequence is linear; the only loop is auto-baud discovery. Any
//! terminal condition aborts the capture, and the transport is closed on
//! every exit path.

use log::{debug, info, warn};

use crate::camera::Camera;
use crate::reader;
use crate::traits::{
    BaudRate, CameraError, CaptureConfig, FrameBufferAction, FrameSlot, Result, Transport,
};

/// Run one complete capture and return the assembled image payload.
///
/// Takes ownership of the transport for the session. On success the
/// payload length equals the frame length the module announced; on failure
/// a specific [`CameraError`] explains which stage gave up. Either way the
/// transport ends up closed.
pub fn capture<T: Transport>(transport: T, config: &CaptureConfig) -> Result<Vec<u8>> {
    config.validate()?;
    let mut camera = Camera::new(transport, config.device_id);
    let result = run(&mut camera, config);
    camera.transport_mut().close();
    result
}

fn run<T: Transport>(camera: &mut Camera<T>, config: &CaptureConfig) -> Result<Vec<u8>> {
    let discovered = discover_baud(camera)?;
    reconfigure(camera, discovered, config.target_baud)?;
    apply_settings(camera, config)?;
    let total_length = trigger(camera, config.slot)?;
    info!("frame buffer holds {total_length} bytes");
    reader::drain(camera, config.slot, total_length, config.chunk_size)
}

/// Probe the candidate rates in ascending order; the first one the module
/// answers at wins.
fn discover_baud<T: Transport>(camera: &mut Camera<T>) -> Result<BaudRate> {
    for rate in BaudRate::CANDIDATES {
        debug!("probing {} baud", rate.as_u32());
        camera.transport_mut().close();
        camera.transport_mut().open(rate.as_u32())?;
        if let Some(version) = camera.get_version()? {
            info!("camera \"{version}\" found at {} baud", rate.as_u32());
            return Ok(rate);
        }
    }
    Err(CameraError::DeviceNotFound)
}

/// Move the link to the target rate, then confirm the module followed.
fn reconfigure<T: Transport>(
    camera: &mut Camera<T>,
    discovered: BaudRate,
    target: BaudRate,
) -> Result<()> {
    if discovered == target {
        return Ok(());
    }
    if !camera.set_port(target)? {
        return Err(CameraError::ReconfigureFailed(target));
    }
    camera.transport_mut().close();
    camera.transport_mut().open(target.as_u32())?;
    if camera.get_version()?.is_none() {
        return Err(CameraError::ReconfigureFailed(target));
    }
    debug!("link reconfigured to {} baud", target.as_u32());
    Ok(())
}

/// Apply capture settings. Size and compression are best-effort; TV-out and
/// the downsize probe must succeed, or the module is not responding sanely
/// mid-configuration.
fn apply_settings<T: Transport>(camera: &mut Camera<T>, config: &CaptureConfig) -> Result<()> {
    if !camera.set_size(config.resolution)? {
        warn!("device rejected resolution {:?}", config.resolution);
    }
    if !camera.set_compression(config.compression)? {
        warn!("device rejected compression ratio {:#04x}", config.compression);
    }
    if !camera.set_tv_output(false)? {
        return Err(CameraError::ConfigurationFailed("tv-out control"));
    }
    if !camera.get_downsize_status()? {
        return Err(CameraError::ConfigurationFailed("downsize status probe"));
    }
    Ok(())
}

/// Latch a frame into the configured slot and learn its length. A length
/// of 0 means the capture never happened.
fn trigger<T: Transport>(camera: &mut Camera<T>, slot: FrameSlot) -> Result<u32> {
    let (prime, stop) = match slot {
        FrameSlot::Current => (FrameBufferAction::Resume, FrameBufferAction::StopCurrent),
        FrameSlot::Next => (FrameBufferAction::Step, FrameBufferAction::StopNext),
    };
    if !camera.frame_buffer_control(prime)? || !camera.frame_buffer_control(stop)? {
        return Err(CameraError::CaptureFailed);
    }
    let total_length = camera.get_buffer_length(slot)?;
    if total_length == 0 {
        return Err(CameraError::CaptureFailed);
    }
    Ok(total_length)
}
