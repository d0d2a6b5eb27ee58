//! Single-stream HTTP GET fetcher backed by libcurl.
//!
//! The transfer runs on a blocking thread; the write callback forwards each
//! body chunk into the stream's channel and blocks while the channel is full.

use std::cell::{Cell, RefCell};

use tokio::sync::mpsc;

use super::{byte_stream, ByteStream, FetchEvent, Fetcher, ResponseHead, TransferError, STREAM_CAPACITY};
use crate::config::FetchConfig;

/// [`Fetcher`] that performs a plain GET (redirects followed) per job.
#[derive(Debug, Clone, Default)]
pub struct CurlFetcher {
    opts: FetchConfig,
}

impl CurlFetcher {
    pub fn new(opts: FetchConfig) -> Self {
        Self { opts }
    }
}

impl Fetcher for CurlFetcher {
    fn open(&self, url: &str) -> ByteStream {
        let (tx, stream) = byte_stream(STREAM_CAPACITY);
        let url = url.to_string();
        let opts = self.opts.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = run_transfer(&url, &opts, &tx) {
                tracing::debug!(url = %url, "transfer failed: {}", e);
                let _ = tx.blocking_send(FetchEvent::Failed(e));
            }
        });
        stream
    }
}

/// Performs the GET, sending `Start`, `Chunk`s and `End` to `tx`.
/// Any error is returned for the caller to forward as `Failed`.
fn run_transfer(
    url: &str,
    opts: &FetchConfig,
    tx: &mpsc::Sender<FetchEvent>,
) -> Result<(), TransferError> {
    let head = RefCell::new(ResponseHead::default());
    let started = Cell::new(false);
    let rejected = Cell::new(None::<u32>);

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(opts.max_redirections)?;
    easy.connect_timeout(opts.connect_timeout())?;
    easy.low_speed_limit(opts.low_speed_limit)?;
    easy.low_speed_time(opts.low_speed_time())?;
    easy.timeout(opts.timeout())?;
    if let Some(sz) = opts.buffer_size {
        easy.buffer_size(sz)?;
    }
    easy.useragent(concat!("dbload/", env!("CARGO_PKG_VERSION")))?;

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|line| {
            head.borrow_mut().push_line(line);
            true
        })?;
        transfer.write_function(|data| {
            if !started.get() {
                let (ok, status, content_length) = {
                    let h = head.borrow();
                    (h.is_success(), h.status, h.content_length)
                };
                if !ok {
                    rejected.set(Some(status));
                    return Ok(0); // abort transfer
                }
                if tx
                    .blocking_send(FetchEvent::Start { content_length })
                    .is_err()
                {
                    return Ok(0);
                }
                started.set(true);
            }
            match tx.blocking_send(FetchEvent::Chunk(data.to_vec())) {
                Ok(()) => Ok(data.len()),
                Err(_) => Ok(0), // consumer gone
            }
        })?;
        transfer.perform()
    };

    if let Some(code) = rejected.get() {
        return Err(TransferError::Http(code));
    }
    performed?;

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }

    if !started.get() {
        let content_length = head.borrow().content_length;
        tx.blocking_send(FetchEvent::Start { content_length })
            .map_err(|_| TransferError::Disconnected)?;
    }
    tx.blocking_send(FetchEvent::End)
        .map_err(|_| TransferError::Disconnected)?;
    Ok(())
}
