//! Bounded frame pool between the camera and the encoder
//!
//! The camera writes frames through an [`ImageWriter`] (the pool's capture
//! target). Every queued frame fires the image-available listener on the
//! writer's thread. Consumers lease frames out of the pool and must release
//! them before the pool can take more.
//!
//! A pool of capacity `n` never holds more than `n` frames, counting both
//! frames waiting in the queue and frames leased to the consumer. When it is
//! full the writer recycles the oldest waiting frame; when every slot is
//! leased out it blocks or rejects according to [`PoolPolicy`].

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::Surface;
use crate::error::{CamrecError, Result};
use crate::types::{Image, PixelFormat, Plane};

static POOL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Callback fired once per queued frame
pub type ImageAvailableListener = Arc<dyn Fn(&ImageConsumer) + Send + Sync>;

/// What the writer does when every slot is leased to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PoolPolicy {
    /// Wait until the consumer releases a slot
    Block,
    /// Drop the new frame and report [`CamrecError::PoolExhausted`]
    #[default]
    Reject,
}

impl std::str::FromStr for PoolPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "reject" | "drop" => Ok(Self::Reject),
            _ => Err(format!("Unknown pool policy: {}", s)),
        }
    }
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Frames waiting to be acquired
    pub queued: usize,
    /// Frames leased to the consumer
    pub acquired: usize,
    /// Frames accepted from the writer
    pub frames_queued: u64,
    /// Frames dropped without being acquired
    pub frames_skipped: u64,
    /// Frames the writer could not place
    pub frames_rejected: u64,
}

#[derive(Default)]
struct PoolState {
    queued: VecDeque<Image>,
    acquired: usize,
    closed: bool,
    frames_queued: u64,
    frames_skipped: u64,
    frames_rejected: u64,
}

struct ReaderShared {
    id: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    capacity: usize,
    policy: PoolPolicy,
    state: Mutex<PoolState>,
    slot_freed: Condvar,
    listener: Mutex<Option<ImageAvailableListener>>,
}

impl ReaderShared {
    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.acquired = state.acquired.saturating_sub(1);
        drop(state);
        self.slot_freed.notify_one();
    }

    fn acquire(self: &Arc<Self>, latest: bool) -> Result<Option<ImageLease>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CamrecError::invalid_sequence("acquire image", "closed"));
        }
        if state.acquired >= self.capacity {
            return Err(CamrecError::PoolExhausted {
                capacity: self.capacity,
            });
        }
        if latest {
            while state.queued.len() > 1 {
                state.queued.pop_front();
                state.frames_skipped += 1;
            }
        }
        let Some(image) = state.queued.pop_front() else {
            return Ok(None);
        };
        state.acquired += 1;
        drop(state);

        // Popping frees room for the writer even though the lease still counts
        self.slot_freed.notify_one();

        Ok(Some(ImageLease {
            image,
            shared: Arc::clone(self),
            released: false,
        }))
    }
}

/// Bounded pool of camera frames
pub struct ImageReader {
    shared: Arc<ReaderShared>,
}

impl ImageReader {
    /// Allocate a pool of `capacity` frame slots
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        capacity: usize,
        policy: PoolPolicy,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CamrecError::config(format!(
                "Invalid image reader size {}x{}",
                width, height
            )));
        }
        if capacity == 0 {
            return Err(CamrecError::config("Image reader capacity must be at least 1"));
        }

        let id = POOL_COUNTER.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Image reader {} created: {}x{} {:?}, {} slots, {:?}",
            id, width, height, format, capacity, policy
        );

        Ok(Self {
            shared: Arc::new(ReaderShared {
                id,
                width,
                height,
                format,
                capacity,
                policy,
                state: Mutex::new(PoolState::default()),
                slot_freed: Condvar::new(),
                listener: Mutex::new(None),
            }),
        })
    }

    /// The pool as a capture target
    pub fn surface(&self) -> Surface {
        Surface::Reader(self.writer())
    }

    /// Producer side of the pool
    pub fn writer(&self) -> ImageWriter {
        ImageWriter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Consumer side of the pool
    pub fn consumer(&self) -> ImageConsumer {
        ImageConsumer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Install the image-available listener, replacing any previous one
    pub fn set_on_image_available<F>(&self, listener: F)
    where
        F: Fn(&ImageConsumer) + Send + Sync + 'static,
    {
        *self.shared.listener.lock() = Some(Arc::new(listener));
    }

    /// Remove the image-available listener
    pub fn clear_listener(&self) {
        self.shared.listener.lock().take();
    }

    /// Lease the newest frame, dropping older waiting frames
    pub fn acquire_latest_image(&self) -> Result<Option<ImageLease>> {
        self.shared.acquire(true)
    }

    /// Lease the oldest waiting frame
    pub fn acquire_next_image(&self) -> Result<Option<ImageLease>> {
        self.shared.acquire(false)
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Frame size (width, height)
    pub fn size(&self) -> (u32, u32) {
        (self.shared.width, self.shared.height)
    }

    /// Current counters
    pub fn stats(&self) -> ReaderStats {
        let state = self.shared.state.lock();
        ReaderStats {
            queued: state.queued.len(),
            acquired: state.acquired,
            frames_queued: state.frames_queued,
            frames_skipped: state.frames_skipped,
            frames_rejected: state.frames_rejected,
        }
    }

    /// Whether the pool has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Close the pool: drop waiting frames, remove the listener and wake
    /// any blocked writer. Outstanding leases may still be released.
    pub fn close(&self) {
        self.clear_listener();
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let dropped = state.queued.len();
        state.queued.clear();
        drop(state);
        self.shared.slot_freed.notify_all();
        debug!(
            "Image reader {} closed ({} waiting frames dropped)",
            self.shared.id, dropped
        );
    }
}

impl Drop for ImageReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ImageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageReader")
            .field("id", &self.shared.id)
            .field("size", &(self.shared.width, self.shared.height))
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

/// Consumer view handed to image-available listeners
#[derive(Clone)]
pub struct ImageConsumer {
    shared: Arc<ReaderShared>,
}

impl ImageConsumer {
    /// Lease the newest frame, dropping older waiting frames
    pub fn acquire_latest_image(&self) -> Result<Option<ImageLease>> {
        self.shared.acquire(true)
    }

    /// Lease the oldest waiting frame
    pub fn acquire_next_image(&self) -> Result<Option<ImageLease>> {
        self.shared.acquire(false)
    }
}

/// Producer side of an [`ImageReader`]
#[derive(Clone)]
pub struct ImageWriter {
    shared: Arc<ReaderShared>,
}

impl ImageWriter {
    /// Queue a frame and notify the listener on the calling thread
    pub fn queue_image(&self, image: Image) -> Result<()> {
        let shared = &self.shared;
        if image.width != shared.width
            || image.height != shared.height
            || image.format != shared.format
        {
            return Err(CamrecError::camera(format!(
                "Frame {}x{} {:?} does not match image reader {}x{} {:?}",
                image.width, image.height, image.format, shared.width, shared.height, shared.format
            )));
        }

        {
            let mut state = shared.state.lock();
            loop {
                if state.closed {
                    return Err(CamrecError::invalid_sequence("queue image", "closed"));
                }
                if state.queued.len() + state.acquired < shared.capacity {
                    break;
                }
                if state.queued.pop_front().is_some() {
                    state.frames_skipped += 1;
                    break;
                }
                match shared.policy {
                    PoolPolicy::Reject => {
                        state.frames_rejected += 1;
                        trace!("Image reader {} full, frame rejected", shared.id);
                        return Err(CamrecError::PoolExhausted {
                            capacity: shared.capacity,
                        });
                    }
                    PoolPolicy::Block => shared.slot_freed.wait(&mut state),
                }
            }
            state.queued.push_back(image);
            state.frames_queued += 1;
        }

        let listener = shared.listener.lock().clone();
        if let Some(listener) = listener {
            listener(&ImageConsumer {
                shared: Arc::clone(shared),
            });
        }
        Ok(())
    }

    /// Frame size (width, height)
    pub fn size(&self) -> (u32, u32) {
        (self.shared.width, self.shared.height)
    }

    /// Frame pixel format
    pub fn format(&self) -> PixelFormat {
        self.shared.format
    }

    /// Whether the pool has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Whether both writers feed the same pool
    pub fn same_pool(&self, other: &ImageWriter) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl std::fmt::Debug for ImageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ImageWriter({})", self.shared.id)
    }
}

/// A frame leased from the pool
///
/// The slot goes back to the pool on [`ImageLease::release`] or on drop.
#[must_use = "a leased image holds a pool slot until released"]
pub struct ImageLease {
    image: Image,
    shared: Arc<ReaderShared>,
    released: bool,
}

impl ImageLease {
    /// The leased frame
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Capture timestamp in nanoseconds
    pub fn timestamp_ns(&self) -> u64 {
        self.image.timestamp_ns
    }

    /// Get a plane by index
    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.image.plane(index)
    }

    /// Give the slot back to the pool
    pub fn release(mut self) {
        self.return_slot();
    }

    fn return_slot(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.release_slot();
        }
    }
}

impl Drop for ImageLease {
    fn drop(&mut self) {
        self.return_slot();
    }
}

impl std::ops::Deref for ImageLease {
    type Target = Image;

    fn deref(&self) -> &Image {
        &self.image
    }
}
