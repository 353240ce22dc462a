use backdrop::compose::BoxBlur;
use backdrop::frame::yuv::packed_to_i420;
use backdrop::segmentation::ThreadedMaskService;
use backdrop::{
    FrameDecision, FrameScheduler, FrameSink, I420Frame, MaskService, MaskTicket, OutputFrame,
    PackedBitmap, PipelineConfig, PlanarFrameBuffer, SegmentationMask, SegmentationModel,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingSink(Vec<OutputFrame>);

impl FrameSink for CollectingSink {
    fn deliver(&mut self, frame: OutputFrame) -> anyhow::Result<()> {
        self.0.push(frame);
        Ok(())
    }
}

/// Answers synchronously with a fixed foreground confidence.
struct UniformMasks {
    value: f32,
    submitted: Mutex<usize>,
}

impl UniformMasks {
    fn new(value: f32) -> Self {
        Self {
            value,
            submitted: Mutex::new(0),
        }
    }
}

impl MaskService for UniformMasks {
    fn submit(&self, ticket: MaskTicket) {
        *self.submitted.lock().unwrap() += 1;
        let image = ticket.image();
        ticket.complete(Ok(SegmentationMask::filled(image.width(), image.height(), self.value)));
    }
}

/// Never answers.
#[derive(Default)]
struct StalledMasks(Mutex<Vec<MaskTicket>>);

impl MaskService for StalledMasks {
    fn submit(&self, ticket: MaskTicket) {
        self.0.lock().unwrap().push(ticket);
    }
}

/// Fails every request.
struct BrokenMasks;

impl MaskService for BrokenMasks {
    fn submit(&self, ticket: MaskTicket) {
        ticket.complete(Err(anyhow::anyhow!("model crashed")));
    }
}

/// Foreground is the left half of the oriented frame, at quarter resolution.
struct LeftHalfModel;

impl SegmentationModel for LeftHalfModel {
    fn segment(&mut self, image: &PackedBitmap) -> anyhow::Result<SegmentationMask> {
        let (w, h) = ((image.width() / 4).max(1), (image.height() / 4).max(1));
        Ok(SegmentationMask::from_fn(w, h, |x, _| if x < w / 2 { 1.0 } else { 0.0 }))
    }

    fn input_size(&self) -> (u32, u32) {
        (16, 16)
    }
}

fn striped_frame(width: u32, height: u32, ts: i64) -> I420Frame {
    let mut frame = I420Frame::solid(width, height, 16, 128, 128).with_timestamp(ts);
    for (i, y) in frame.y.iter_mut().enumerate() {
        if (i % width as usize) % 4 < 2 {
            *y = 235;
        }
    }
    frame
}

/// What the pipeline would emit for `frame` if the whole frame were foreground.
fn untouched_output(frame: &I420Frame) -> OutputFrame {
    let buffer = PlanarFrameBuffer::new();
    buffer.load_from(frame, frame.timestamp_ns).unwrap();
    packed_to_i420(&buffer.to_packed_bitmap().unwrap(), 180, frame.timestamp_ns)
}

fn run<M: MaskService + 'static>(masks: Arc<M>, frames: &[I420Frame]) -> (Vec<FrameDecision>, Vec<OutputFrame>) {
    let mut scheduler = FrameScheduler::new(
        PipelineConfig::default(),
        masks,
        Box::new(BoxBlur::default()),
        CollectingSink::default(),
    )
    .unwrap();
    let decisions = frames.iter().map(|f| scheduler.on_frame(f)).collect();
    let sink = scheduler.finish().unwrap();
    (decisions, sink.0)
}

#[test]
fn one_mask_and_one_output_per_three_frames() {
    let masks = Arc::new(UniformMasks::new(1.0));
    let frames: Vec<_> = (0..9).map(|i| striped_frame(8, 4, i * 1000)).collect();
    let (decisions, out) = run(masks.clone(), &frames);

    assert_eq!(*masks.submitted.lock().unwrap(), 3);
    for cycle in decisions.chunks(3) {
        let submitted = cycle
            .iter()
            .filter(|d| matches!(d, FrameDecision::Submitted { .. }))
            .count();
        assert_eq!(submitted, 1);
    }
    let stamps: Vec<_> = out.iter().map(|f| f.timestamp_ns).collect();
    assert_eq!(stamps, vec![0, 3000, 6000]);
}

#[test]
fn foreground_mask_forwards_the_oriented_frame() {
    let frame = striped_frame(8, 4, 5);
    let (_, out) = run(Arc::new(UniformMasks::new(1.0)), &[frame.clone()]);
    let expected = untouched_output(&frame);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].y, expected.y);
    assert_eq!(out[0].u, expected.u);
    assert_eq!(out[0].v, expected.v);
    assert_eq!(out[0].timestamp_ns, 5);
}

#[test]
fn background_mask_replaces_the_frame_with_its_blur() {
    let frame = striped_frame(16, 8, 0);
    let (_, out) = run(Arc::new(UniformMasks::new(0.0)), &[frame.clone()]);
    let original = untouched_output(&frame);
    assert_eq!(out.len(), 1);
    assert_ne!(out[0].y, original.y);

    // The stripes are smoothed towards their mean.
    let spread = |plane: &[u8]| plane.iter().max().unwrap() - plane.iter().min().unwrap();
    assert!(spread(&out[0].y) < spread(&original.y));
}

#[test]
fn rotated_frames_come_out_with_swapped_dimensions() {
    let frame = striped_frame(8, 4, 0).with_rotation(-90);
    let (_, out) = run(Arc::new(UniformMasks::new(1.0)), &[frame]);
    assert_eq!((out[0].width, out[0].height), (4, 8));
}

#[test]
fn stalled_mask_service_forwards_nothing() {
    let masks = Arc::new(StalledMasks::default());
    let frames: Vec<_> = (0..3).map(|i| striped_frame(8, 4, i)).collect();
    let (decisions, out) = run(masks.clone(), &frames);
    assert_eq!(decisions[0], FrameDecision::Submitted { sequence: 1 });
    assert!(out.is_empty());
    assert_eq!(masks.0.lock().unwrap().len(), 1);
}

#[test]
fn failed_masks_drop_their_cycle() {
    let frames: Vec<_> = (0..6).map(|i| striped_frame(8, 4, i)).collect();
    let (_, out) = run(Arc::new(BrokenMasks), &frames);
    assert!(out.is_empty());
}

#[test]
fn threaded_model_composites_the_left_half_as_foreground() {
    let service = Arc::new(ThreadedMaskService::spawn(Box::new(LeftHalfModel), 1).unwrap());
    let mut scheduler = FrameScheduler::new(
        PipelineConfig::default(),
        service.clone(),
        Box::new(BoxBlur::default()),
        CollectingSink::default(),
    )
    .unwrap();

    let frame = striped_frame(16, 8, 42);
    scheduler.on_frame(&frame);
    // Wait for the worker before shutting the emitter down.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while scheduler.outstanding() > 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    let out = scheduler.finish().unwrap().0;

    assert_eq!(out.len(), 1);
    let original = untouched_output(&frame);
    let row = |plane: &[u8], y: usize| plane[y * 16..y * 16 + 16].to_vec();
    // Left columns keep the stripes, right columns are blurred away from them.
    assert_eq!(row(&out[0].y, 3)[..4], row(&original.y, 3)[..4]);
    assert_ne!(row(&out[0].y, 3)[12..], row(&original.y, 3)[12..]);
}
