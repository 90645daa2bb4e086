//! Capture binary: grab one photo from a VC0706 camera and write it to disk.

use std::time::Instant;

use log::info;
use vc0706_capture::{capture, BaudRate, CaptureConfig, SerialTransport};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> vc0706_capture::Result<()> {
    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_owned());
    let target_baud = match args.next() {
        Some(rate) => BaudRate::from_u32(rate.parse().unwrap_or(0))?,
        None => BaudRate::default(),
    };

    let config = CaptureConfig::new(port).with_target_baud(target_baud);
    info!(
        "capturing from {} at {} baud",
        config.port,
        config.target_baud.as_u32()
    );

    let transport = SerialTransport::new(config.port.clone(), config.timeout);
    let started = Instant::now();
    let image = capture(transport, &config)?;

    let filename = format!("photo_{}.jpg", chrono::Local::now().format("%Y%m%d_%H%M%S"));
    std::fs::write(&filename, &image)?;
    info!(
        "wrote {} bytes to {filename} in {:.1?}",
        image.len(),
        started.elapsed()
    );
    Ok(())
}
