use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug)]
pub struct EncodedFrame {
    version: u64,
    data: Vec<u8>,
}

impl EncodedFrame {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

struct Slot {
    latest: Option<Arc<EncodedFrame>>,
    next_version: u64,
}

/// Single-slot holder of the most recent encoded frame for one camera.
///
/// The lock only guards a pointer swap: encoding happens before `publish` and
/// readers clone the `Arc` out before touching the bytes.
pub struct FrameBuffer {
    camera_id: String,
    slot: RwLock<Slot>,
}

impl FrameBuffer {
    pub fn new(camera_id: String) -> Arc<Self> {
        Arc::new(Self {
            camera_id,
            slot: RwLock::new(Slot {
                latest: None,
                next_version: 1,
            }),
        })
    }

    /// Replaces the current frame. Versions start at 1 and increase by one per publish.
    pub fn publish(&self, data: Vec<u8>) -> u64 {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        let version = slot.next_version;
        slot.next_version += 1;
        slot.latest = Some(Arc::new(EncodedFrame {
            version,
            data,
        }));
        drop(slot);

        tracing::trace!(camera = %self.camera_id, version, "published frame");
        version
    }

    pub fn read(&self) -> Option<Arc<EncodedFrame>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .latest
            .clone()
    }

    pub fn latest_version(&self) -> Option<u64> {
        self.read().map(|frame| frame.version)
    }
}
