use std::future::Future;
use std::io::ErrorKind;

use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, TransportError};

/// The minimal byte-level capability a link needs from its wire.
///
/// Implementations are expected to be half-duplex friendly: nothing here
/// assumes the remote side can talk unless it was asked to.
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes, suspending until at least one is available.
    ///
    /// Returns `Ok(0)` once the stream has been closed by the remote end.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Read whatever is already pending without suspending.
    ///
    /// Returns `Ok(0)` when nothing is immediately available.
    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Queue bytes for transmission, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Suspend until every queued byte has been handed to the device.
    fn drain(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Adapts any tokio byte stream into a [`Transport`].
#[derive(Debug)]
pub struct StreamTransport<T> {
    inner: T,
}

impl<T> StreamTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the adapter and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> Transport for StreamTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.inner.read(buf).await {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.inner.read(buf).now_or_never() {
            Some(Ok(n)) => Ok(n),
            Some(Err(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) =>
            {
                Ok(0)
            }
            Some(Err(err)) => Err(TransportError::Io(err)),
            None => Ok(0),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        loop {
            match self.inner.write(data).await {
                Ok(0) if !data.is_empty() => return Err(TransportError::Closed),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    async fn drain(&mut self) -> Result<()> {
        loop {
            match self.inner.flush().await {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}
