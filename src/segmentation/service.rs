use super::{SegmentationMask, SegmentationModel};
use crate::bitmap::PackedBitmap;
use crate::scheduler::EmitterEvent;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// The frame a mask was requested for, carried through to compositing.
#[derive(Clone, Debug)]
pub struct MaskRequest {
    pub sequence: u64,
    pub timestamp_ns: i64,
    pub image: Arc<PackedBitmap>,
}

/// Outcome of one mask request.
#[derive(Debug)]
pub struct MaskCompletion {
    pub request: MaskRequest,
    pub result: Result<SegmentationMask>,
}

/// One-shot handle for answering a mask request from any thread.
///
/// Dropping a ticket without calling [`MaskTicket::complete`] abandons the
/// request and its frame.
pub struct MaskTicket {
    request: Option<MaskRequest>,
    reply: Sender<EmitterEvent>,
    outstanding: Arc<AtomicUsize>,
}

impl MaskTicket {
    pub(crate) fn new(
        request: MaskRequest,
        reply: Sender<EmitterEvent>,
        outstanding: Arc<AtomicUsize>,
    ) -> Self {
        outstanding.fetch_add(1, Ordering::SeqCst);
        Self {
            request: Some(request),
            reply,
            outstanding,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.request.as_ref().map_or(0, |r| r.sequence)
    }

    pub fn timestamp_ns(&self) -> i64 {
        self.request.as_ref().map_or(0, |r| r.timestamp_ns)
    }

    /// The oriented frame to segment.
    pub fn image(&self) -> Arc<PackedBitmap> {
        self.request
            .as_ref()
            .map(|r| Arc::clone(&r.image))
            .unwrap_or_else(|| Arc::new(PackedBitmap::new(0, 0)))
    }

    pub fn complete(mut self, result: Result<SegmentationMask>) {
        if let Some(request) = self.request.take() {
            let sequence = request.sequence;
            let completion = MaskCompletion { request, result };
            if self.reply.send(EmitterEvent::Mask(completion)).is_err() {
                tracing::debug!("Mask result {} arrived after shutdown", sequence);
            }
        }
    }
}

impl Drop for MaskTicket {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            tracing::warn!("Mask request {} abandoned without a result", request.sequence);
        }
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MaskTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskTicket")
            .field("sequence", &self.sequence())
            .field("timestamp_ns", &self.timestamp_ns())
            .finish()
    }
}

/// Asynchronous mask computation.
///
/// `submit` must not block; the ticket is completed later, on any thread.
pub trait MaskService: Send + Sync {
    fn submit(&self, ticket: MaskTicket);
}

/// Runs a blocking [`SegmentationModel`] on a dedicated worker thread.
///
/// Requests beyond `queue_depth` waiting tickets are failed immediately.
pub struct ThreadedMaskService {
    queue: Option<Sender<MaskTicket>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedMaskService {
    pub fn spawn(mut model: Box<dyn SegmentationModel + Send>, queue_depth: usize) -> Result<Self> {
        let (queue, requests) = crossbeam_channel::bounded::<MaskTicket>(queue_depth.max(1));
        let (w, h) = model.input_size();
        tracing::info!("Starting mask service (model input {}x{})", w, h);

        let worker = std::thread::Builder::new()
            .name("mask-service".into())
            .spawn(move || {
                for ticket in requests {
                    let _span = tracing::debug_span!("segment", sequence = ticket.sequence()).entered();
                    let image = ticket.image();
                    let result = model.segment(&image);
                    if let Err(err) = &result {
                        tracing::warn!("Segmentation failed: {:#}", err);
                    }
                    ticket.complete(result);
                }
                tracing::debug!("Mask service worker exiting");
            })
            .context("Failed to spawn mask service thread")?;

        Ok(Self {
            queue: Some(queue),
            worker: Some(worker),
        })
    }
}

impl MaskService for ThreadedMaskService {
    fn submit(&self, ticket: MaskTicket) {
        let Some(queue) = &self.queue else {
            ticket.complete(Err(anyhow!("mask service stopped")));
            return;
        };
        match queue.try_send(ticket) {
            Ok(()) => {}
            Err(TrySendError::Full(ticket)) => {
                tracing::debug!("Mask service busy, dropping request {}", ticket.sequence());
                ticket.complete(Err(anyhow!("mask service busy")));
            }
            Err(TrySendError::Disconnected(ticket)) => {
                ticket.complete(Err(anyhow!("mask service stopped")));
            }
        }
    }
}

impl Drop for ThreadedMaskService {
    fn drop(&mut self) {
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Mask service worker panicked");
            }
        }
    }
}
