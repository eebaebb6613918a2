use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use serialmux_frame::{
    parse_register_reply, parse_stream_subframe, stream_payload, subframe_name, Frame,
    FrameError, RegisterReply, RegisterRequest, BROADCAST_ID, MAX_PAYLOAD,
    STREAM_CLIENT_TO_SERVER, STREAM_SERVER_TO_CLIENT,
};
use serialmux_transport::Transport;
use tracing::{debug, trace};

use crate::clock::{Clock, TokioClock};
use crate::config::ClientConfig;
use crate::error::{LinkError, Result};
use crate::manager::LinkManager;

/// A session with one device on a shared link.
///
/// Offers a byte stream over one tunneled channel, emulated by polling, and
/// the register request/response protocol. Any number of clients may share a
/// [`LinkManager`]; their exchanges never interleave on the wire.
#[derive(Debug)]
pub struct Client<T, C = TokioClock> {
    manager: Arc<LinkManager<T>>,
    destination: u8,
    config: ClientConfig,
    clock: C,
    write_buf: BytesMut,
    read_buf: BytesMut,
}

impl<T: Transport> Client<T> {
    /// Create a client for `destination` with default configuration.
    pub fn new(manager: Arc<LinkManager<T>>, destination: u8) -> Result<Self> {
        Self::with_config(manager, destination, ClientConfig::default())
    }

    /// Create a client with explicit configuration.
    pub fn with_config(
        manager: Arc<LinkManager<T>>,
        destination: u8,
        config: ClientConfig,
    ) -> Result<Self> {
        if destination > BROADCAST_ID {
            return Err(FrameError::InvalidAddress(destination).into());
        }
        let size = config.max_stream_payload();
        if size > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: MAX_PAYLOAD,
            }
            .into());
        }
        Ok(Self {
            manager,
            destination,
            config,
            clock: TokioClock,
            write_buf: BytesMut::new(),
            read_buf: BytesMut::new(),
        })
    }
}

impl<T: Transport, C: Clock> Client<T, C> {
    /// Replace the time source used for timeouts and poll pacing.
    pub fn with_clock<D: Clock>(self, clock: D) -> Client<T, D> {
        Client {
            manager: self.manager,
            destination: self.destination,
            config: self.config,
            clock,
            write_buf: self.write_buf,
            read_buf: self.read_buf,
        }
    }

    pub fn destination(&self) -> u8 {
        self.destination
    }

    pub fn channel(&self) -> u32 {
        self.config.channel
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The shared link this client talks through.
    pub fn manager(&self) -> &Arc<LinkManager<T>> {
        &self.manager
    }

    /// Stream bytes received but not yet returned by a read.
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Buffer stream bytes locally. Nothing is sent until [`drain`](Self::drain).
    pub fn write(&mut self, data: &[u8]) {
        self.write_buf.extend_from_slice(data);
    }

    /// Send all buffered stream bytes, split into frames of at most
    /// `max_write_chunk` data bytes, within a single hold of the link.
    ///
    /// Bytes leave the local buffer only once their frame is queued.
    pub async fn drain(&mut self) -> Result<()> {
        let mut guard = self.manager.lock().await;
        let chunk_size = self.config.max_write_chunk.max(1);
        while !self.write_buf.is_empty() {
            let take = chunk_size.min(self.write_buf.len());
            let payload = stream_payload(
                STREAM_CLIENT_TO_SERVER,
                self.config.channel,
                &self.write_buf[..take],
            );
            self.manager.write_frame(&Frame::new(
                self.manager.source_id(),
                self.destination,
                payload,
            ))?;
            self.write_buf.advance(take);
        }
        guard.drain().await
    }

    /// Read exactly `size` stream bytes, polling until they arrive.
    ///
    /// There is no overall deadline; see [`read_within`](Self::read_within).
    pub async fn read(&mut self, size: usize) -> Result<Bytes> {
        let (session, read_buf) = self.split();
        session.read(read_buf, size).await
    }

    /// [`read`](Self::read) bounded by `limit`.
    ///
    /// On timeout, bytes received so far stay buffered for the next read.
    pub async fn read_within(&mut self, size: usize, limit: Duration) -> Result<Bytes> {
        let (session, read_buf) = self.split();
        session.bounded(limit, session.read(read_buf, size)).await
    }

    /// Read one line of stream data, ending at `\r` or `\n`.
    ///
    /// Empty lines are skipped and the terminator is not returned.
    pub async fn read_line(&mut self) -> Result<Bytes> {
        let (session, read_buf) = self.split();
        session.read_line(read_buf).await
    }

    /// [`read_line`](Self::read_line) bounded by `limit`.
    pub async fn read_line_within(&mut self, limit: Duration) -> Result<Bytes> {
        let (session, read_buf) = self.split();
        session.bounded(limit, session.read_line(read_buf)).await
    }

    /// Run one poll round: ask the device for queued stream data and collect
    /// every reply that arrives. Returns the number of bytes added to the
    /// read buffer.
    pub async fn poll(&mut self) -> Result<usize> {
        let (session, read_buf) = self.split();
        session.poll(read_buf).await
    }

    /// Send a register request and wait for the device's reply.
    ///
    /// A device that does not answer within the configured timeout yields an
    /// empty reply rather than an error.
    pub async fn register_query(&self, request: &RegisterRequest) -> Result<RegisterReply> {
        let mut guard = self.manager.lock().await;
        self.manager.write_frame(
            &Frame::new(
                self.manager.source_id(),
                self.destination,
                Bytes::copy_from_slice(request.as_bytes()),
            )
            .with_request_reply(true),
        )?;
        guard.drain().await?;

        let deadline = self.clock.now() + self.config.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(self.clock.now());
            let reply = within(&self.clock, remaining, guard.read_frame(Some(self.destination)));
            match reply.await {
                Some(Ok(Some(frame))) => return Ok(parse_register_reply(&frame.payload)?),
                Some(Ok(None)) if !remaining.is_zero() => continue,
                Some(Err(err)) if !err.is_transient() => return Err(err),
                Some(Err(err)) => {
                    debug!(destination = self.destination, error = %err, "register reply lost");
                    return Ok(RegisterReply::default());
                }
                Some(Ok(None)) | None => {
                    debug!(destination = self.destination, "no register reply");
                    return Ok(RegisterReply::default());
                }
            }
        }
    }

    /// Send a register request without waiting for a reply.
    pub async fn register_write(&self, request: &RegisterRequest) -> Result<()> {
        let mut guard = self.manager.lock().await;
        self.manager.write_frame(&Frame::new(
            self.manager.source_id(),
            self.destination,
            Bytes::copy_from_slice(request.as_bytes()),
        ))?;
        guard.drain().await
    }

    /// Send a request, waiting for a reply only if it asks for one.
    pub async fn register_request(
        &self,
        request: &RegisterRequest,
    ) -> Result<Option<RegisterReply>> {
        if request.expects_response() {
            self.register_query(request).await.map(Some)
        } else {
            self.register_write(request).await.map(|()| None)
        }
    }

    fn split(&mut self) -> (Session<'_, T, C>, &mut BytesMut) {
        let session = Session {
            manager: &self.manager,
            destination: self.destination,
            config: &self.config,
            clock: &self.clock,
        };
        (session, &mut self.read_buf)
    }
}

// Everything a stream read needs apart from the read buffer, so the buffer
// can be borrowed mutably alongside it.
struct Session<'a, T, C> {
    manager: &'a LinkManager<T>,
    destination: u8,
    config: &'a ClientConfig,
    clock: &'a C,
}

impl<T: Transport, C: Clock> Session<'_, T, C> {
    async fn read(&self, read_buf: &mut BytesMut, size: usize) -> Result<Bytes> {
        while read_buf.len() < size {
            self.poll(read_buf).await?;
            if read_buf.len() >= size {
                break;
            }
            self.clock.sleep(self.config.poll_rate).await;
        }
        Ok(read_buf.split_to(size).freeze())
    }

    async fn read_line(&self, read_buf: &mut BytesMut) -> Result<Bytes> {
        loop {
            if let Some(line) = take_line(read_buf) {
                return Ok(line);
            }
            self.poll(read_buf).await?;
            if let Some(line) = take_line(read_buf) {
                return Ok(line);
            }
            self.clock.sleep(self.config.poll_rate).await;
        }
    }

    async fn poll(&self, read_buf: &mut BytesMut) -> Result<usize> {
        let destination = self.destination;
        let mut guard = self.manager.lock().await;
        let poll = stream_payload(STREAM_CLIENT_TO_SERVER, self.config.channel, &[]);
        self.manager.write_frame(
            &Frame::new(self.manager.source_id(), destination, poll).with_request_reply(true),
        )?;
        guard.drain().await?;

        let mut received = 0;
        let mut deadline = self.clock.now() + self.config.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(self.clock.now());
            let reply = within(self.clock, remaining, guard.read_frame(Some(destination)));
            let frame = match reply.await {
                Some(Ok(Some(frame))) => frame,
                Some(Ok(None)) if !remaining.is_zero() => continue,
                Some(Ok(None)) | None => break,
                Some(Err(err)) if err.is_transient() => {
                    debug!(destination, error = %err, "poll round cut short");
                    break;
                }
                Some(Err(err)) => return Err(err),
            };

            let Some(chunk) = parse_stream_subframe(&frame.payload)? else {
                break;
            };
            if chunk.id != STREAM_SERVER_TO_CLIENT {
                debug!(
                    destination,
                    id = chunk.id,
                    kind = subframe_name(chunk.id),
                    "unexpected sub-frame in poll reply"
                );
                break;
            }
            if chunk.channel == self.config.channel {
                trace!(destination, len = chunk.data.len(), "stream data");
                received += chunk.data.len();
                read_buf.extend_from_slice(&chunk.data);
            } else {
                debug!(destination, channel = chunk.channel, "dropping data for another channel");
            }
            deadline = self.clock.now() + self.config.followup_timeout;
        }
        Ok(received)
    }

    async fn bounded<F>(&self, limit: Duration, fut: F) -> Result<Bytes>
    where
        F: Future<Output = Result<Bytes>>,
    {
        within(self.clock, limit, fut)
            .await
            .unwrap_or(Err(LinkError::Timeout(limit)))
    }
}

fn is_line_end(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

fn take_line(buf: &mut BytesMut) -> Option<Bytes> {
    let blank = buf.iter().take_while(|&&b| is_line_end(b)).count();
    buf.advance(blank);
    let end = buf.iter().position(|&b| is_line_end(b))?;
    let line = buf.split_to(end).freeze();
    buf.advance(1);
    Some(line)
}

/// Resolve `fut`, or `None` once `limit` has elapsed on `clock`.
///
/// A future that is already complete wins even with a zero limit.
async fn within<C: Clock, F: Future>(clock: &C, limit: Duration, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        output = fut => Some(output),
        () = clock.sleep(limit) => None,
    }
}
