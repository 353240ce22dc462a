use anyhow::{bail, Context, Result};
use backdrop::capture::{CaptureSource, TestPattern};
use backdrop::compose::BoxBlur;
use backdrop::output::{FrameSink, RawFileSink};
use backdrop::segmentation::ThreadedMaskService;
use backdrop::{
    BackgroundMode, FrameDecision, FrameScheduler, Orientation, PipelineConfig, SkippedFramePolicy,
};
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index (requires the `camera` feature)
    #[arg(short, long)]
    input_device: Option<u32>,

    /// Output v4l2loopback device path (requires the `camera` feature)
    #[arg(short, long)]
    output_device: Option<String>,

    /// Write raw I420 frames to this file instead of a device
    #[arg(long, default_value = "backdrop.yuv")]
    output_file: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Sensor rotation in degrees reported with every captured frame
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    rotation: i32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Stop after this many frames (runs until interrupted when unset)
    #[arg(long)]
    frames: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to segmentation model (ONNX file, requires the `onnx` feature)
    /// If not provided, runs in passthrough mode without segmentation
    #[arg(long)]
    model: Option<String>,

    /// Static background image used instead of the blurred frame
    #[arg(long)]
    background: Option<String>,

    /// Background blur radius, 0 < radius <= 25
    #[arg(long, default_value_t = 25.0)]
    blur_radius: f32,

    /// Request a mask on the first of every N frames
    #[arg(long, default_value_t = 3)]
    cycle: u32,

    /// Re-emit the last composite for frames between masks instead of dropping them
    #[arg(long)]
    replay_skipped: bool,

    /// Rotation stamped on output frames
    #[arg(long, default_value_t = 180, allow_hyphen_values = true)]
    output_rotation: i32,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Backdrop starting");
    tracing::info!("Target FPS: {}", args.fps);

    let mut capture = open_capture(&args).context("Failed to initialize capture")?;
    let (width, height) = capture.resolution();
    tracing::info!("Capture: {}x{}", width, height);
    let (out_w, out_h) = output_size(&args);
    tracing::info!("Output: {}x{}", out_w, out_h);
    let output = open_output(&args).context("Failed to initialize output")?;

    let Some(model_path) = &args.model else {
        tracing::info!("Running in passthrough mode (no segmentation)");
        return run_passthrough(capture.as_mut(), output, &args);
    };

    let config = pipeline_config(&args)?;
    let mask_service = open_mask_service(model_path)?;
    let scheduler = FrameScheduler::new(config, mask_service, Box::new(BoxBlur::default()), output)
        .context("Failed to start frame scheduler")?;

    run_pipeline(capture.as_mut(), scheduler, &args)
}

fn pipeline_config(args: &Args) -> Result<PipelineConfig> {
    let background = match &args.background {
        Some(path) => BackgroundMode::load_static(path)?,
        None => BackgroundMode::LiveBlur,
    };
    let skipped_frames = if args.replay_skipped {
        SkippedFramePolicy::ReplayLast
    } else {
        SkippedFramePolicy::Drop
    };
    let config = PipelineConfig {
        cycle_period: args.cycle,
        blur_radius: args.blur_radius,
        background,
        skipped_frames,
        drop_stale_results: true,
        output_rotation: args.output_rotation,
    };
    config.validate()?;
    Ok(config)
}

fn open_capture(args: &Args) -> Result<Box<dyn CaptureSource>> {
    match args.input_device {
        #[cfg(feature = "camera")]
        Some(index) => Ok(Box::new(backdrop::capture::WebcamCapture::new(
            index,
            args.capture_width,
            args.capture_height,
            args.rotation,
        )?)),
        #[cfg(not(feature = "camera"))]
        Some(_) => bail!("webcam capture needs the `camera` feature"),
        None => Ok(Box::new(TestPattern::new(
            args.capture_width,
            args.capture_height,
            args.rotation,
        ))),
    }
}

/// Size of the frames reaching the sink.
///
/// Composites come out oriented, so quarter turns swap the frame size.
/// Passthrough forwards captured frames untouched.
fn output_size(args: &Args) -> (u32, u32) {
    let (w, h) = (args.capture_width, args.capture_height);
    let oriented = args.model.is_some();
    if oriented && Orientation::from_degrees(args.rotation).swaps_dimensions() {
        (h, w)
    } else {
        (w, h)
    }
}

fn open_output(args: &Args) -> Result<Box<dyn FrameSink>> {
    match &args.output_device {
        #[cfg(feature = "camera")]
        Some(path) => {
            let (w, h) = output_size(args);
            Ok(Box::new(backdrop::output::V4L2Output::new(path, w, h)?))
        }
        #[cfg(not(feature = "camera"))]
        Some(_) => bail!("v4l2loopback output needs the `camera` feature"),
        None => Ok(Box::new(RawFileSink::create(&args.output_file)?)),
    }
}

#[cfg(feature = "onnx")]
fn open_mask_service(model_path: &str) -> Result<Arc<ThreadedMaskService>> {
    tracing::info!("Loading segmentation model from {}", model_path);
    let model = backdrop::segmentation::create_default_model(model_path)
        .context("Failed to load segmentation model")?;
    tracing::info!("Segmentation model loaded successfully");
    Ok(Arc::new(ThreadedMaskService::spawn(model, 1)?))
}

#[cfg(not(feature = "onnx"))]
fn open_mask_service(_model_path: &str) -> Result<Arc<ThreadedMaskService>> {
    bail!("segmentation models need the `onnx` feature")
}

fn run_passthrough(capture: &mut dyn CaptureSource, mut output: Box<dyn FrameSink>, args: &Args) -> Result<()> {
    let frame_duration = Duration::from_secs_f32(1.0 / args.fps.max(1) as f32);
    let mut frame_count = 0u64;

    while args.frames.map_or(true, |limit| frame_count < limit) {
        let loop_start = Instant::now();
        let frame = capture.capture_frame().context("Failed to capture frame")?;
        output.deliver(frame).context("Failed to write frame")?;
        frame_count += 1;

        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    tracing::info!("Passthrough finished after {} frames", frame_count);
    Ok(())
}

fn run_pipeline(
    capture: &mut dyn CaptureSource,
    mut scheduler: FrameScheduler<Box<dyn FrameSink>>,
    args: &Args,
) -> Result<()> {
    let frame_duration = Duration::from_secs_f32(1.0 / args.fps.max(1) as f32);
    let mut frame_count = 0u64;
    let mut submitted = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_schedule_time = Duration::ZERO;

    tracing::info!("Starting main pipeline loop");
    tracing::info!("Press Ctrl+C to stop");

    while args.frames.map_or(true, |limit| frame_count < limit) {
        let loop_start = Instant::now();

        let capture_start = Instant::now();
        let frame = capture
            .capture_frame()
            .context("Failed to capture frame")?;
        total_capture_time += capture_start.elapsed();

        let schedule_start = Instant::now();
        match scheduler.on_frame(&frame) {
            FrameDecision::Submitted { .. } => submitted += 1,
            FrameDecision::CaptureFailed => tracing::warn!("Dropped unreadable frame"),
            FrameDecision::Skipped | FrameDecision::Replayed => {}
        }
        total_schedule_time += schedule_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_schedule_ms = total_schedule_time.as_secs_f64() * 1000.0 / frame_count as f64;
            tracing::info!(
                "Frame {}: capture={:.1}ms, schedule={:.1}ms, masks submitted={}, pending={}",
                frame_count,
                avg_capture_ms,
                avg_schedule_ms,
                submitted,
                scheduler.outstanding()
            );
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    scheduler.finish()?;
    tracing::info!("Pipeline finished after {} frames", frame_count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let base = ["backdrop", "--capture-width", "640", "--capture-height", "480"];
        Args::parse_from(base.iter().chain(extra).copied())
    }

    #[test]
    fn passthrough_keeps_capture_size() {
        assert_eq!(output_size(&args(&["--rotation", "90"])), (640, 480));
        assert_eq!(output_size(&args(&["--rotation", "-90"])), (640, 480));
    }

    #[test]
    fn segmented_quarter_turns_swap_output_size() {
        assert_eq!(output_size(&args(&["--model", "rvm.onnx", "--rotation", "270"])), (480, 640));
        assert_eq!(output_size(&args(&["--model", "rvm.onnx", "--rotation", "-90"])), (480, 640));
        assert_eq!(output_size(&args(&["--model", "rvm.onnx", "--rotation", "180"])), (640, 480));
    }
}
