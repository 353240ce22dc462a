use super::CaptureSource;
use crate::bitmap::PackedBitmap;
use crate::frame::yuv::packed_to_i420;
use crate::frame::I420Frame;
use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::time::Instant;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
    rotation: i32,
    started: Instant,
}

impl WebcamCapture {
    pub fn new(device_index: u32, width: u32, height: u32, rotation: i32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{}",
            device_index,
            width,
            height
        );

        let index = CameraIndex::Index(device_index);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = Camera::new(index, requested)
            .context("Failed to open camera")?;

        camera.open_stream()
            .context("Failed to open camera stream")?;

        tracing::info!("Webcam initialized successfully");

        Ok(Self {
            camera,
            width,
            height,
            rotation,
            started: Instant::now(),
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<I420Frame> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;
        let timestamp_ns = self.started.elapsed().as_nanos() as i64;

        let decoded = frame.decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;
        let (w, h) = (decoded.width(), decoded.height());
        // nokhwa may link its own `image` version, so go through raw bytes.
        let rgb = RgbImage::from_raw(w, h, decoded.into_raw())
            .context("Decoded frame has an unexpected buffer size")?;

        let rgba = DynamicImage::ImageRgb8(rgb).to_rgba8();
        let mut bitmap = PackedBitmap::from_rgba_image(&rgba);
        if bitmap.dimensions() != (self.width, self.height) {
            bitmap = bitmap.resize(self.width, self.height);
        }

        Ok(packed_to_i420(&bitmap, self.rotation, timestamp_ns))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
