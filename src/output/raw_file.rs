use super::{write_i420, FrameSink, OutputFrame};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Appends every frame as raw I420 to a file, e.g. for `ffplay -f rawvideo`.
pub struct RawFileSink {
    writer: BufWriter<File>,
    frames: u64,
}

impl RawFileSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Writing raw I420 output to {}", path.display());
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            frames: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for RawFileSink {
    fn deliver(&mut self, frame: OutputFrame) -> Result<()> {
        write_i420(&mut self.writer, &frame).context("Failed to write frame to output file")?;
        self.writer.flush().context("Failed to flush output file")?;
        self.frames += 1;
        Ok(())
    }
}
