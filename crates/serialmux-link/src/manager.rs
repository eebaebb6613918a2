use std::sync::{Mutex as SyncMutex, MutexGuard as SyncMutexGuard, PoisonError};

use bytes::{Buf, BytesMut};
use serialmux_frame::{
    check_magic, decode_frame, Frame, FrameError, VaruintDecoder, BROADCAST_ID, CRC_SIZE,
    HEADER_SIZE, MAX_PAYLOAD, MIN_SUBFRAME_PAYLOAD,
};
use serialmux_transport::{Transport, TransportError};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::config::LinkConfig;
use crate::error::{LinkError, ResyncReason, Result};
use crate::stats::{LinkCounters, LinkStats};

const DISCARD_CHUNK_SIZE: usize = 256;
const MAX_LENGTH_FIELD: usize = 5;

/// Owns one physical link and arbitrates it between clients.
///
/// Queuing bytes with [`write`](Self::write) or
/// [`write_frame`](Self::write_frame) needs no exclusive access. Putting them
/// on the wire and reading replies goes through the [`LinkGuard`] returned by
/// [`lock`](Self::lock), so only one transmit/await-reply exchange is ever in
/// flight. Dropping the guard releases the link, including when the task
/// holding it is cancelled.
#[derive(Debug)]
pub struct LinkManager<T> {
    link: Mutex<Link<T>>,
    outbound: SyncMutex<BytesMut>,
    config: LinkConfig,
    counters: LinkCounters,
}

#[derive(Debug)]
struct Link<T> {
    transport: T,
    // Bytes taken from `outbound` that the transport has not accepted yet.
    in_flight: BytesMut,
}

impl<T: Transport> LinkManager<T> {
    /// Create a manager with default configuration (source address 0).
    pub fn new(transport: T) -> Self {
        Self::build(transport, LinkConfig::default())
    }

    /// Create a manager with explicit configuration.
    pub fn with_config(transport: T, config: LinkConfig) -> Result<Self> {
        if config.source_id > BROADCAST_ID {
            return Err(FrameError::InvalidAddress(config.source_id).into());
        }
        Ok(Self::build(transport, config))
    }

    fn build(transport: T, config: LinkConfig) -> Self {
        Self {
            link: Mutex::new(Link {
                transport,
                in_flight: BytesMut::new(),
            }),
            outbound: SyncMutex::new(BytesMut::new()),
            config,
            counters: LinkCounters::default(),
        }
    }

    /// Address used as the source of every outgoing frame.
    pub fn source_id(&self) -> u8 {
        self.config.source_id
    }

    /// Current configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Append raw bytes to the outbound buffer. Nothing is transmitted until
    /// the next [`LinkGuard::drain`].
    pub fn write(&self, bytes: &[u8]) {
        self.outbound().extend_from_slice(bytes);
    }

    /// Encode a frame into the outbound buffer.
    pub fn write_frame(&self, frame: &Frame) -> Result<()> {
        let mut encoded = BytesMut::with_capacity(frame.wire_size());
        frame.encode(&mut encoded)?;
        trace!(
            source = frame.source,
            destination = frame.destination,
            len = frame.payload.len(),
            request_reply = frame.request_reply,
            "queue frame"
        );
        self.outbound().extend_from_slice(&encoded);
        LinkCounters::bump(&self.counters.frames_sent, 1);
        Ok(())
    }

    /// Number of queued bytes not yet handed to a drain.
    pub fn pending_write_len(&self) -> usize {
        self.outbound().len()
    }

    /// Acquire exclusive use of the link, waiting for any current holder.
    pub async fn lock(&self) -> LinkGuard<'_, T> {
        LinkGuard {
            manager: self,
            link: self.link.lock().await,
        }
    }

    /// Snapshot of the link counters.
    pub fn stats(&self) -> LinkStats {
        self.counters.snapshot()
    }

    fn outbound(&self) -> SyncMutexGuard<'_, BytesMut> {
        // A panic while appending cannot leave the buffer half-written in a
        // way later drains would misread, so poisoning is ignored.
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to the link. Released on drop.
#[derive(Debug)]
pub struct LinkGuard<'a, T> {
    manager: &'a LinkManager<T>,
    link: MutexGuard<'a, Link<T>>,
}

impl<T: Transport> LinkGuard<'_, T> {
    /// Transmit everything queued so far and wait until the transport has
    /// handed it to the device.
    ///
    /// Bytes left over from a drain that was cancelled part-way are sent
    /// first, so a transmit that has started always completes whole.
    pub async fn drain(&mut self) -> Result<()> {
        let link = &mut *self.link;
        {
            let mut outbound = self.manager.outbound();
            if !outbound.is_empty() {
                link.in_flight.unsplit(outbound.split());
            }
        }

        while !link.in_flight.is_empty() {
            let written = link.transport.write(&link.in_flight).await?;
            if written == 0 {
                return Err(TransportError::Closed.into());
            }
            link.in_flight.advance(written);
            LinkCounters::bump(&self.manager.counters.bytes_sent, written as u64);
        }
        link.transport.drain().await?;
        Ok(())
    }

    /// Read one frame from the link.
    ///
    /// Returns `Ok(None)` for frames that carry no usable data: frames from a
    /// source other than `only_from`, and payloads too short to hold a
    /// sub-frame. A header that cannot be trusted discards pending input and
    /// returns [`LinkError::Resynchronized`].
    pub async fn read_frame(&mut self, only_from: Option<u8>) -> Result<Option<Frame>> {
        let config = self.manager.config;
        let counters = &self.manager.counters;
        let link = &mut *self.link;

        let mut buf =
            BytesMut::with_capacity(HEADER_SIZE + MAX_LENGTH_FIELD + MAX_PAYLOAD + CRC_SIZE);
        read_exact_into(&mut link.transport, &mut buf, HEADER_SIZE).await?;
        if let Err(FrameError::InvalidMagic { found }) = check_magic([buf[0], buf[1]]) {
            return Err(resynchronize(
                &mut link.transport,
                counters,
                &config,
                ResyncReason::BadMagic(found),
            ));
        }

        let mut length = VaruintDecoder::new();
        let payload_len = loop {
            read_exact_into(&mut link.transport, &mut buf, 1).await?;
            if let Some(value) = length.push(buf[buf.len() - 1])? {
                break value as usize;
            }
        };
        if payload_len > config.max_payload_size {
            return Err(resynchronize(
                &mut link.transport,
                counters,
                &config,
                ResyncReason::OversizedLength(payload_len),
            ));
        }

        read_exact_into(&mut link.transport, &mut buf, payload_len + CRC_SIZE).await?;
        let frame = match decode_frame(&mut buf, &config.frame_config()) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(FrameError::CrcMismatch { expected, actual }) => {
                LinkCounters::bump(&counters.crc_mismatches, 1);
                warn!(expected, actual, "rejected frame with bad crc");
                return Err(FrameError::CrcMismatch { expected, actual }.into());
            }
            Err(err) => return Err(err.into()),
        };

        LinkCounters::bump(&counters.frames_received, 1);
        if !frame.crc_ok {
            LinkCounters::bump(&counters.crc_mismatches, 1);
            warn!(
                source = frame.source,
                received = frame.crc,
                "crc mismatch ignored"
            );
        }

        if let Some(expected) = only_from {
            if frame.source != expected {
                LinkCounters::bump(&counters.stray_frames, 1);
                debug!(source = frame.source, expected, "dropping stray frame");
                return Ok(None);
            }
        }
        if frame.payload.len() < MIN_SUBFRAME_PAYLOAD {
            LinkCounters::bump(&counters.short_frames, 1);
            debug!(
                source = frame.source,
                len = frame.payload.len(),
                "payload too short for a sub-frame"
            );
            return Ok(None);
        }

        trace!(
            source = frame.source,
            destination = frame.destination,
            len = frame.payload.len(),
            "received frame"
        );
        Ok(Some(frame))
    }

    /// Counters of the underlying manager.
    pub fn stats(&self) -> LinkStats {
        self.manager.stats()
    }
}

async fn read_exact_into<T: Transport>(
    transport: &mut T,
    buf: &mut BytesMut,
    len: usize,
) -> Result<()> {
    let start = buf.len();
    buf.resize(start + len, 0);
    let mut filled = start;
    while filled < buf.len() {
        let read = transport.read(&mut buf[filled..]).await?;
        if read == 0 {
            buf.truncate(filled);
            return Err(TransportError::Closed.into());
        }
        filled += read;
    }
    Ok(())
}

fn resynchronize<T: Transport>(
    transport: &mut T,
    counters: &LinkCounters,
    config: &LinkConfig,
    reason: ResyncReason,
) -> LinkError {
    let mut scratch = [0u8; DISCARD_CHUNK_SIZE];
    let mut discarded = 0;
    while discarded < config.resync_window {
        let want = (config.resync_window - discarded).min(scratch.len());
        match transport.try_read(&mut scratch[..want]) {
            Ok(0) => break,
            Ok(read) => discarded += read,
            Err(err) => return err.into(),
        }
    }

    LinkCounters::bump(&counters.resyncs, 1);
    LinkCounters::bump(&counters.bytes_discarded, discarded as u64);
    warn!(%reason, discarded, "re-synchronizing link");
    LinkError::Resynchronized { reason, discarded }
}
