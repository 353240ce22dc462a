use super::yuv::{semi_planar_chroma_stride, semi_planar_len, semi_planar_to_packed};
use super::{check_plane, chroma_dimensions, I420Planes, Orientation, VideoFrame};
use crate::bitmap::PackedBitmap;
use crate::error::{BackdropError, BackdropResult};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct PlanarStore {
    width: u32,
    height: u32,
    rotation_degree: i32,
    timestamp_ns: i64,
    /// Luma rows followed by interleaved V/U pairs; `None` once cleared.
    data: Option<Vec<u8>>,
}

impl PlanarStore {
    fn clear(&mut self) {
        self.data = None;
        self.width = 0;
        self.height = 0;
        self.rotation_degree = 0;
    }
}

/// Reusable semi-planar copy of the most recently captured frame.
///
/// Capture (`load_from`) and conversion (`to_packed_bitmap`) each hold the
/// internal lock for their whole critical section, so a capture from another
/// thread can never tear a buffer that is being converted.
#[derive(Debug, Default)]
pub struct PlanarFrameBuffer {
    store: Mutex<PlanarStore>,
}

impl PlanarFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PlanarStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy `frame` into the store. On failure the store is cleared.
    pub fn load_from(&self, frame: &dyn VideoFrame, timestamp_ns: i64) -> BackdropResult<()> {
        let mut store = self.lock();
        store.timestamp_ns = timestamp_ns;
        store.rotation_degree = frame.rotation();

        let result = match frame.planes() {
            Some(planes) => copy_planes(&mut store, frame.width(), frame.height(), planes),
            None => Err(BackdropError::plane_copy("frame has no pixel buffer")),
        };
        if let Err(err) = &result {
            tracing::warn!("Frame capture failed, clearing buffer: {}", err);
            store.clear();
        }
        result
    }

    /// Decode the stored frame to an oriented, mirrored ARGB bitmap.
    pub fn to_packed_bitmap(&self) -> Option<PackedBitmap> {
        let _span = tracing::debug_span!("to_packed_bitmap").entered();
        let mut store = self.lock();
        let data = store.data.as_deref()?;

        match semi_planar_to_packed(data, store.width, store.height) {
            Ok(bitmap) => Some(Orientation::from_degrees(store.rotation_degree).apply(&bitmap)),
            Err(err) => {
                tracing::warn!("Frame conversion failed, clearing buffer: {}", err);
                store.clear();
                None
            }
        }
    }

    /// Release the pixel store until the next `load_from`.
    pub fn dispose(&self) {
        self.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().data.is_none()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let store = self.lock();
        (store.width, store.height)
    }

    pub fn rotation_degree(&self) -> i32 {
        self.lock().rotation_degree
    }

    pub fn timestamp_ns(&self) -> i64 {
        self.lock().timestamp_ns
    }

    /// Size of the backing store in bytes, zero when cleared.
    pub fn len(&self) -> usize {
        self.lock().data.as_ref().map_or(0, Vec::len)
    }
}

fn copy_planes(
    store: &mut PlanarStore,
    width: u32,
    height: u32,
    planes: I420Planes<'_>,
) -> BackdropResult<()> {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = chroma_dimensions(width, height);

    check_plane("Y", planes.y, planes.stride_y, w, h)?;
    check_plane("U", planes.u, planes.stride_u, cw, ch)?;
    check_plane("V", planes.v, planes.stride_v, cw, ch)?;

    let size = semi_planar_len(width, height);
    let data = store.data.get_or_insert_with(Vec::new);
    if data.len() != size {
        *data = vec![0u8; size];
    }

    for row in 0..h {
        let src = &planes.y[row * planes.stride_y..row * planes.stride_y + w];
        data[row * w..(row + 1) * w].copy_from_slice(src);
    }

    let luma_size = w * h;
    let chroma_stride = semi_planar_chroma_stride(width);
    for row in 0..ch {
        let dst = &mut data[luma_size + row * chroma_stride..luma_size + (row + 1) * chroma_stride];
        for col in 0..cw {
            // V ahead of U in each pair.
            dst[2 * col] = planes.v[row * planes.stride_v + col];
            dst[2 * col + 1] = planes.u[row * planes.stride_u + col];
        }
    }

    store.width = width;
    store.height = height;
    Ok(())
}
