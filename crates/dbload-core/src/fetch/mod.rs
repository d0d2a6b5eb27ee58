//! Remote byte source for download tasks.
//!
//! A [`Fetcher`] opens a URL and hands back a [`ByteStream`]: a lazy, finite,
//! non-restartable sequence of body chunks, preceded by the declared length if
//! the server sent one. Producers push [`FetchEvent`]s into a bounded channel,
//! so a slow consumer (disk) throttles the producer (network).

mod curl_fetcher;
mod parse;

pub use self::curl_fetcher::CurlFetcher;
pub use self::parse::ResponseHead;

use thiserror::Error;
use tokio::sync::mpsc;

/// Channel capacity between a transfer and its consumer.
pub const STREAM_CAPACITY: usize = 16;

/// Errors raised while fetching the remote resource or writing it to staging.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transfer failed: {0}")]
    Curl(#[from] curl::Error),
    #[error("remote server returned HTTP {0}")]
    Http(u32),
    #[error("partial transfer: received {received} of {expected} bytes")]
    Partial { expected: u64, received: u64 },
    #[error("remote body exceeds its declared length of {0} bytes")]
    Overflow(u64),
    #[error("staging write failed: {0}")]
    Storage(#[from] std::io::Error),
    #[error("connection closed before the transfer completed")]
    Disconnected,
}

/// One step of a transfer, in order: `Start`, any number of `Chunk`s, then
/// `End` or `Failed`.
#[derive(Debug)]
pub enum FetchEvent {
    Start { content_length: Option<u64> },
    Chunk(Vec<u8>),
    End,
    Failed(TransferError),
}

/// Opens remote resources. Implementations must not block the caller; the
/// transfer itself runs elsewhere and reports through the stream.
pub trait Fetcher: Send + Sync {
    fn open(&self, url: &str) -> ByteStream;
}

/// Creates a connected (sender, stream) pair.
pub fn byte_stream(capacity: usize) -> (mpsc::Sender<FetchEvent>, ByteStream) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ByteStream::new(rx))
}

/// Consumer side of a transfer.
#[derive(Debug)]
pub struct ByteStream {
    rx: mpsc::Receiver<FetchEvent>,
    pending: Option<Vec<u8>>,
    started: bool,
    finished: bool,
}

impl ByteStream {
    pub fn new(rx: mpsc::Receiver<FetchEvent>) -> Self {
        Self {
            rx,
            pending: None,
            started: false,
            finished: false,
        }
    }

    /// Waits for the response head and returns the declared length, if any.
    /// A stream whose first event is already a chunk reports an unknown length.
    pub async fn open(&mut self) -> Result<Option<u64>, TransferError> {
        if self.started {
            return Ok(None);
        }
        self.started = true;
        match self.rx.recv().await {
            Some(FetchEvent::Start { content_length }) => Ok(content_length),
            Some(FetchEvent::Chunk(data)) => {
                self.pending = Some(data);
                Ok(None)
            }
            Some(FetchEvent::End) => {
                self.finished = true;
                Ok(None)
            }
            Some(FetchEvent::Failed(e)) => {
                self.finished = true;
                Err(e)
            }
            None => {
                self.finished = true;
                Err(TransferError::Disconnected)
            }
        }
    }

    /// Next body chunk; `Ok(None)` at a clean end of stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransferError> {
        if !self.started {
            self.open().await?;
        }
        if let Some(data) = self.pending.take() {
            return Ok(Some(data));
        }
        if self.finished {
            return Ok(None);
        }
        loop {
            match self.rx.recv().await {
                Some(FetchEvent::Chunk(data)) if data.is_empty() => continue,
                Some(FetchEvent::Chunk(data)) => return Ok(Some(data)),
                Some(FetchEvent::Start { .. }) => continue,
                Some(FetchEvent::End) => {
                    self.finished = true;
                    return Ok(None);
                }
                Some(FetchEvent::Failed(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                None => {
                    self.finished = true;
                    return Err(TransferError::Disconnected);
                }
            }
        }
    }
}
