use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the link counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Frames queued for transmission.
    pub frames_sent: u64,
    /// Bytes handed to the transport.
    pub bytes_sent: u64,
    /// Frames decoded from the wire, strays included.
    pub frames_received: u64,
    /// Bad headers that forced a resynchronization.
    pub resyncs: u64,
    /// Bytes thrown away while resynchronizing.
    pub bytes_discarded: u64,
    /// Frames whose checksum did not match.
    pub crc_mismatches: u64,
    /// Frames dropped because they came from another device.
    pub stray_frames: u64,
    /// Frames dropped because their payload was too short to hold a sub-frame.
    pub short_frames: u64,
}

#[derive(Debug, Default)]
pub(crate) struct LinkCounters {
    pub frames_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub frames_received: AtomicU64,
    pub resyncs: AtomicU64,
    pub bytes_discarded: AtomicU64,
    pub crc_mismatches: AtomicU64,
    pub stray_frames: AtomicU64,
    pub short_frames: AtomicU64,
}

impl LinkCounters {
    pub fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        LinkStats {
            frames_sent: load(&self.frames_sent),
            bytes_sent: load(&self.bytes_sent),
            frames_received: load(&self.frames_received),
            resyncs: load(&self.resyncs),
            bytes_discarded: load(&self.bytes_discarded),
            crc_mismatches: load(&self.crc_mismatches),
            stray_frames: load(&self.stray_frames),
            short_frames: load(&self.short_frames),
        }
    }
}
