use super::{write_i420, FrameSink, OutputFrame};
use anyhow::{ensure, Context, Result};
use std::fs::File;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // Announce the I420 format before streaming raw planes into the node.
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let mut format = Output::format(&device).context("Failed to query output format")?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(b"YU12");
        Output::set_format(&device, &format).context("Failed to set output format")?;

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
        })
    }
}

impl FrameSink for V4L2Output {
    fn deliver(&mut self, frame: OutputFrame) -> Result<()> {
        ensure!(
            (frame.width, frame.height) == (self.width, self.height),
            "frame {}x{} does not match device format {}x{}",
            frame.width,
            frame.height,
            self.width,
            self.height
        );
        write_i420(&mut self.file, &frame).context("Failed to write frame to v4l2loopback device")?;
        Ok(())
    }
}
