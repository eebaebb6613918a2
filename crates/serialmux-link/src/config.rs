use std::time::Duration;

use serialmux_frame::varuint::encoded_len;
use serialmux_frame::{
    CrcMode, FrameConfig, MAX_PAYLOAD, MAX_STREAM_CHUNK, STREAM_CLIENT_TO_SERVER,
};

/// Settings for a [`LinkManager`](crate::LinkManager).
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Address this host uses as the source of every frame. Default: 0.
    pub source_id: u8,
    /// Checksum policy for received frames. Default: ignore mismatches.
    pub crc_mode: CrcMode,
    /// Maximum number of pending bytes thrown away when resynchronizing.
    pub resync_window: usize,
    /// Largest payload accepted from the wire. Default: 255.
    pub max_payload_size: usize,
}

impl LinkConfig {
    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            crc_mode: self.crc_mode,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            source_id: 0,
            crc_mode: CrcMode::Ignore,
            resync_window: 8192,
            max_payload_size: MAX_PAYLOAD,
        }
    }
}

/// Settings for a [`Client`](crate::Client).
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Tunneled stream channel. Default: 1.
    pub channel: u32,
    /// Pause between poll rounds while a read is unsatisfied.
    pub poll_rate: Duration,
    /// How long to wait for the first reply frame of an exchange.
    pub timeout: Duration,
    /// How long to wait for each additional reply frame in a poll round.
    pub followup_timeout: Duration,
    /// Largest stream chunk placed in one frame. The sub-frame around it
    /// must still fit in a frame payload.
    pub max_write_chunk: usize,
}

impl ClientConfig {
    /// Size of the payload carrying a full `max_write_chunk` of stream data.
    pub fn max_stream_payload(&self) -> usize {
        let chunk = self.max_write_chunk.max(1);
        encoded_len(STREAM_CLIENT_TO_SERVER)
            + encoded_len(self.channel)
            + encoded_len(u32::try_from(chunk).unwrap_or(u32::MAX))
            + chunk
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel: 1,
            poll_rate: Duration::from_millis(100),
            timeout: Duration::from_millis(50),
            followup_timeout: Duration::from_micros(100),
            max_write_chunk: MAX_STREAM_CHUNK,
        }
    }
}
