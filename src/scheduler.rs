//! Per-frame throttling of the mask service and the output emitter.
//!
//! The first frame of every cycle is captured, converted and submitted for a
//! mask. The remaining frames of the cycle are dropped (or replayed, see
//! [`SkippedFramePolicy`]). A submitted frame is forwarded only once its mask
//! arrives, on the emitter thread, stamped with the frame's own timestamp.

use crate::compose::{BackdropRenderer, BlurEngine};
use crate::config::{PipelineConfig, SkippedFramePolicy};
use crate::error::{BackdropError, BackdropResult};
use crate::frame::yuv::packed_to_i420;
use crate::frame::{PlanarFrameBuffer, VideoFrame};
use crate::output::{FrameSink, OutputFrame};
use crate::segmentation::{MaskCompletion, MaskRequest, MaskService, MaskTicket};
use anyhow::{anyhow, Context};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Work for the emitter thread, processed strictly in arrival order.
#[derive(Debug)]
pub enum EmitterEvent {
    Mask(MaskCompletion),
    Replay { timestamp_ns: i64 },
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    AwaitingMask,
}

/// What the scheduler did with one incoming frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameDecision {
    Submitted { sequence: u64 },
    Skipped,
    Replayed,
    CaptureFailed,
}

pub struct FrameScheduler<S: FrameSink + 'static> {
    counter: u32,
    period: u32,
    skipped_frames: SkippedFramePolicy,
    sequence: u64,
    buffer: PlanarFrameBuffer,
    mask_service: Arc<dyn MaskService>,
    events: Sender<EmitterEvent>,
    outstanding: Arc<AtomicUsize>,
    emitter: Option<JoinHandle<S>>,
}

impl<S: FrameSink + 'static> FrameScheduler<S> {
    pub fn new(
        config: PipelineConfig,
        mask_service: Arc<dyn MaskService>,
        blur: Box<dyn BlurEngine>,
        sink: S,
    ) -> BackdropResult<Self> {
        config.validate()?;

        let (events, inbox) = unbounded();
        let emitter = Emitter {
            renderer: BackdropRenderer::new(&config, blur),
            sink,
            output_rotation: config.output_rotation,
            drop_stale_results: config.drop_stale_results,
            keep_last_output: config.skipped_frames == SkippedFramePolicy::ReplayLast,
            last_delivered_ns: None,
            last_output: None,
            delivered: 0,
            dropped: 0,
        };
        let handle = std::thread::Builder::new()
            .name("frame-emitter".into())
            .spawn(move || emitter.run(inbox))
            .context("Failed to spawn emitter thread")?;

        tracing::info!(
            "Frame scheduler started: mask every {} frames, skipped frames {:?}",
            config.cycle_period,
            config.skipped_frames
        );

        Ok(Self {
            counter: 0,
            period: config.cycle_period,
            skipped_frames: config.skipped_frames,
            sequence: 0,
            buffer: PlanarFrameBuffer::new(),
            mask_service,
            events,
            outstanding: Arc::new(AtomicUsize::new(0)),
            emitter: Some(handle),
        })
    }

    /// Handle one frame from the source. Never blocks on the mask service.
    pub fn on_frame(&mut self, frame: &dyn VideoFrame) -> FrameDecision {
        let decision = if self.counter == 0 {
            self.begin_cycle(frame)
        } else {
            self.skip(frame)
        };
        self.counter = (self.counter + 1) % self.period;
        decision
    }

    fn begin_cycle(&mut self, frame: &dyn VideoFrame) -> FrameDecision {
        let timestamp_ns = frame.timestamp_ns();
        if self.buffer.load_from(frame, timestamp_ns).is_err() {
            return FrameDecision::CaptureFailed;
        }
        let Some(bitmap) = self.buffer.to_packed_bitmap() else {
            return FrameDecision::CaptureFailed;
        };

        self.sequence += 1;
        let sequence = self.sequence;
        tracing::debug!("Submitting frame {} for segmentation", sequence);

        let request = MaskRequest {
            sequence,
            timestamp_ns,
            image: Arc::new(bitmap),
        };
        let ticket = MaskTicket::new(request, self.events.clone(), Arc::clone(&self.outstanding));
        self.mask_service.submit(ticket);
        FrameDecision::Submitted { sequence }
    }

    fn skip(&mut self, frame: &dyn VideoFrame) -> FrameDecision {
        match self.skipped_frames {
            SkippedFramePolicy::Drop => FrameDecision::Skipped,
            // A pending mask would land behind the replay and go out of order.
            SkippedFramePolicy::ReplayLast if self.outstanding() > 0 => {
                tracing::debug!("Mask pending, not replaying frame {}", frame.timestamp_ns());
                FrameDecision::Skipped
            }
            SkippedFramePolicy::ReplayLast => {
                let timestamp_ns = frame.timestamp_ns();
                if self.events.send(EmitterEvent::Replay { timestamp_ns }).is_err() {
                    tracing::warn!("Emitter stopped, cannot replay frame");
                }
                FrameDecision::Replayed
            }
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.outstanding() > 0 {
            SchedulerState::AwaitingMask
        } else {
            SchedulerState::Idle
        }
    }

    /// Mask requests submitted but not yet answered.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Stop after everything already queued for the emitter, then hand back the sink.
    ///
    /// Masks completing after this point are discarded.
    pub fn finish(mut self) -> BackdropResult<S> {
        self.shutdown()
            .ok_or_else(|| BackdropError::Other(anyhow!("emitter already stopped")))?
    }

    fn shutdown(&mut self) -> Option<BackdropResult<S>> {
        let handle = self.emitter.take()?;
        let _ = self.events.send(EmitterEvent::Shutdown);
        self.buffer.dispose();
        Some(
            handle
                .join()
                .map_err(|_| BackdropError::Other(anyhow!("emitter thread panicked"))),
        )
    }
}

impl<S: FrameSink + 'static> Drop for FrameScheduler<S> {
    fn drop(&mut self) {
        if let Some(Err(err)) = self.shutdown() {
            tracing::warn!("Frame scheduler shutdown failed: {}", err);
        }
    }
}

/// Runs on the sink's thread: composites finished masks and delivers frames.
struct Emitter<S> {
    renderer: BackdropRenderer,
    sink: S,
    output_rotation: i32,
    drop_stale_results: bool,
    keep_last_output: bool,
    /// Timestamp of the last frame handed to the sink, replays included.
    last_delivered_ns: Option<i64>,
    last_output: Option<OutputFrame>,
    delivered: u64,
    dropped: u64,
}

impl<S: FrameSink> Emitter<S> {
    fn run(mut self, inbox: Receiver<EmitterEvent>) -> S {
        for event in inbox.iter() {
            match event {
                EmitterEvent::Mask(completion) => self.on_mask(completion),
                EmitterEvent::Replay { timestamp_ns } => self.replay(timestamp_ns),
                EmitterEvent::Shutdown => break,
            }
        }
        tracing::info!(
            "Frame emitter stopped: {} delivered, {} dropped",
            self.delivered,
            self.dropped
        );
        self.sink
    }

    fn on_mask(&mut self, completion: MaskCompletion) {
        let MaskCompletion { request, result } = completion;
        let _span = tracing::debug_span!("composite", sequence = request.sequence).entered();

        let mask = match result {
            Ok(mask) => mask,
            Err(err) => {
                tracing::warn!("Mask request {} failed, dropping frame: {:#}", request.sequence, err);
                self.dropped += 1;
                return;
            }
        };

        if self.drop_stale_results {
            if let Some(last) = self.last_delivered_ns {
                if request.timestamp_ns < last {
                    tracing::warn!(
                        "Dropping stale mask result {} ({} < {})",
                        request.sequence,
                        request.timestamp_ns,
                        last
                    );
                    self.dropped += 1;
                    return;
                }
            }
        }

        let composite = match self.renderer.render(&request.image, mask) {
            Ok(composite) => composite,
            Err(err) => {
                tracing::warn!("Compositing frame {} failed: {}", request.sequence, err);
                self.dropped += 1;
                return;
            }
        };

        let frame = packed_to_i420(&composite, self.output_rotation, request.timestamp_ns);
        if self.keep_last_output {
            self.last_output = Some(frame.clone());
        }
        self.deliver(frame);
    }

    fn replay(&mut self, timestamp_ns: i64) {
        let Some(last) = &self.last_output else {
            tracing::debug!("No composite to replay yet");
            return;
        };
        if self.last_delivered_ns.is_some_and(|delivered| timestamp_ns < delivered) {
            tracing::debug!("Replay for {} would go backwards, skipping", timestamp_ns);
            return;
        }
        let mut frame = last.clone();
        frame.timestamp_ns = timestamp_ns;
        self.deliver(frame);
    }

    fn deliver(&mut self, frame: OutputFrame) {
        self.last_delivered_ns = Some(frame.timestamp_ns);
        match self.sink.deliver(frame) {
            Ok(()) => self.delivered += 1,
            Err(err) => {
                tracing::warn!("Sink rejected frame: {:#}", err);
                self.dropped += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::BoxBlur;
    use crate::frame::I420Frame;
    use crate::segmentation::SegmentationMask;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink(Vec<OutputFrame>);

    impl FrameSink for CollectingSink {
        fn deliver(&mut self, frame: OutputFrame) -> anyhow::Result<()> {
            self.0.push(frame);
            Ok(())
        }
    }

    /// Answers every request before `submit` returns.
    struct InstantMasks;

    impl MaskService for InstantMasks {
        fn submit(&self, ticket: MaskTicket) {
            let image = ticket.image();
            ticket.complete(Ok(SegmentationMask::filled(image.width(), image.height(), 1.0)));
        }
    }

    /// Holds tickets until told to answer them.
    #[derive(Default)]
    struct HeldMasks(Mutex<Vec<MaskTicket>>);

    impl MaskService for HeldMasks {
        fn submit(&self, ticket: MaskTicket) {
            self.0.lock().unwrap().push(ticket);
        }
    }

    impl HeldMasks {
        fn release_last_first(&self) {
            let tickets: Vec<_> = self.0.lock().unwrap().drain(..).collect();
            for ticket in tickets.into_iter().rev() {
                let image = ticket.image();
                ticket.complete(Ok(SegmentationMask::filled(image.width(), image.height(), 1.0)));
            }
        }
    }

    fn frame(ts: i64) -> I420Frame {
        I420Frame::solid(4, 2, 120, 100, 150).with_timestamp(ts)
    }

    fn scheduler(
        config: PipelineConfig,
        masks: Arc<dyn MaskService>,
    ) -> FrameScheduler<CollectingSink> {
        FrameScheduler::new(config, masks, Box::new(BoxBlur::default()), CollectingSink::default()).unwrap()
    }

    #[test]
    fn counter_cycles_through_submit_skip_skip() {
        let mut s = scheduler(PipelineConfig::default(), Arc::new(InstantMasks));
        let decisions: Vec<_> = (0..6).map(|i| s.on_frame(&frame(i))).collect();
        assert_eq!(
            decisions,
            vec![
                FrameDecision::Submitted { sequence: 1 },
                FrameDecision::Skipped,
                FrameDecision::Skipped,
                FrameDecision::Submitted { sequence: 2 },
                FrameDecision::Skipped,
                FrameDecision::Skipped,
            ]
        );
        let sink = s.finish().unwrap();
        let stamps: Vec<_> = sink.0.iter().map(|f| f.timestamp_ns).collect();
        assert_eq!(stamps, vec![0, 3]);
    }

    #[test]
    fn state_tracks_pending_masks() {
        let masks = Arc::new(HeldMasks::default());
        let mut s = scheduler(PipelineConfig::default(), masks.clone());
        assert_eq!(s.state(), SchedulerState::Idle);
        s.on_frame(&frame(0));
        assert_eq!(s.state(), SchedulerState::AwaitingMask);
        masks.release_last_first();
        assert_eq!(s.state(), SchedulerState::Idle);
    }

    #[test]
    fn capture_failure_still_advances_the_cycle() {
        let mut s = scheduler(PipelineConfig::default(), Arc::new(InstantMasks));
        let mut broken = frame(0);
        broken.y.clear();
        assert_eq!(s.on_frame(&broken), FrameDecision::CaptureFailed);
        assert_eq!(s.on_frame(&frame(1)), FrameDecision::Skipped);
        assert_eq!(s.on_frame(&frame(2)), FrameDecision::Skipped);
        assert_eq!(s.on_frame(&frame(3)), FrameDecision::Submitted { sequence: 1 });
        assert_eq!(s.finish().unwrap().0.len(), 1);
    }

    #[test]
    fn late_results_older_than_the_last_delivery_are_dropped() {
        let masks = Arc::new(HeldMasks::default());
        let mut s = scheduler(PipelineConfig::default(), masks.clone());
        for ts in 0..6 {
            s.on_frame(&frame(ts * 10));
        }
        // Newer result first; the older one is stale by then.
        masks.release_last_first();
        let sink = s.finish().unwrap();
        let stamps: Vec<_> = sink.0.iter().map(|f| f.timestamp_ns).collect();
        assert_eq!(stamps, vec![30]);
    }

    #[test]
    fn stale_results_pass_when_protection_is_off() {
        let masks = Arc::new(HeldMasks::default());
        let config = PipelineConfig {
            drop_stale_results: false,
            ..PipelineConfig::default()
        };
        let mut s = scheduler(config, masks.clone());
        for ts in 0..6 {
            s.on_frame(&frame(ts * 10));
        }
        masks.release_last_first();
        let stamps: Vec<_> = s.finish().unwrap().0.iter().map(|f| f.timestamp_ns).collect();
        assert_eq!(stamps, vec![30, 0]);
    }

    #[test]
    fn replay_policy_fills_skipped_frames() {
        let config = PipelineConfig {
            skipped_frames: SkippedFramePolicy::ReplayLast,
            ..PipelineConfig::default()
        };
        let mut s = scheduler(config, Arc::new(InstantMasks));
        for ts in 0..6 {
            s.on_frame(&frame(ts));
        }
        let sink = s.finish().unwrap();
        let stamps: Vec<_> = sink.0.iter().map(|f| f.timestamp_ns).collect();
        assert_eq!(stamps, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(sink.0[1].y, sink.0[0].y);
    }

    #[test]
    fn replays_wait_for_the_pending_mask() {
        let masks = Arc::new(HeldMasks::default());
        let config = PipelineConfig {
            skipped_frames: SkippedFramePolicy::ReplayLast,
            ..PipelineConfig::default()
        };
        let mut s = scheduler(config, masks.clone());
        s.on_frame(&frame(0));
        masks.release_last_first();
        let decisions: Vec<_> = (1..6).map(|i| s.on_frame(&frame(i * 10))).collect();
        assert_eq!(
            decisions,
            vec![
                FrameDecision::Replayed,
                FrameDecision::Replayed,
                FrameDecision::Submitted { sequence: 2 },
                FrameDecision::Skipped,
                FrameDecision::Skipped,
            ]
        );
        masks.release_last_first();

        let stamps: Vec<_> = s.finish().unwrap().0.iter().map(|f| f.timestamp_ns).collect();
        assert_eq!(stamps, vec![0, 10, 20, 30]);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "{stamps:?}");
    }

    #[test]
    fn replays_resume_after_the_mask_lands() {
        let masks = Arc::new(HeldMasks::default());
        let config = PipelineConfig {
            skipped_frames: SkippedFramePolicy::ReplayLast,
            ..PipelineConfig::default()
        };
        let mut s = scheduler(config, masks.clone());
        s.on_frame(&frame(0));
        assert_eq!(s.on_frame(&frame(1)), FrameDecision::Skipped);
        masks.release_last_first();
        assert_eq!(s.on_frame(&frame(2)), FrameDecision::Replayed);

        let stamps: Vec<_> = s.finish().unwrap().0.iter().map(|f| f.timestamp_ns).collect();
        assert_eq!(stamps, vec![0, 2]);
    }

    #[test]
    fn output_frames_carry_configured_rotation() {
        let mut s = scheduler(PipelineConfig::default(), Arc::new(InstantMasks));
        s.on_frame(&frame(7));
        let sink = s.finish().unwrap();
        assert_eq!(sink.0[0].rotation, 180);
        assert_eq!((sink.0[0].width, sink.0[0].height), (4, 2));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PipelineConfig {
            cycle_period: 0,
            ..PipelineConfig::default()
        };
        let result = FrameScheduler::new(
            config,
            Arc::new(InstantMasks),
            Box::new(BoxBlur::default()),
            CollectingSink::default(),
        );
        assert!(result.is_err());
    }
}
