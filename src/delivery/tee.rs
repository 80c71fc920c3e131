//! Splits live transcoder output between the client and the cache uploader.
//!
//! The client side drives the transcode: every chunk it pulls is copied to the
//! uploader. The upload stream only ends cleanly if the client side saw the
//! end of the output and the process completed successfully; in every other
//! case (failure, cancellation, client gone) it ends with an error, which
//! aborts the upload.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::cache::ByteStream;
use crate::transcode::Outcome;

#[derive(Debug)]
enum TeeEvent {
    Chunk(Bytes),
    Failed(String),
    End,
}

/// Client half of a tee. Passes every item through unchanged.
pub struct TeeStream<S> {
    inner: S,
    tx: Option<mpsc::UnboundedSender<TeeEvent>>,
}

impl<S> TeeStream<S> {
    fn emit(&mut self, event: TeeEvent) {
        if let Some(tx) = &self.tx {
            // The uploader may have given up already; the client is unaffected.
            let _ = tx.send(event);
        }
    }
}

impl<S> Stream for TeeStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let item = ready!(self.inner.poll_next_unpin(cx));
        match &item {
            Some(Ok(chunk)) => self.emit(TeeEvent::Chunk(chunk.clone())),
            Some(Err(e)) => {
                self.emit(TeeEvent::Failed(e.to_string()));
                self.tx = None;
            }
            None => {
                self.emit(TeeEvent::End);
                self.tx = None;
            }
        }
        Poll::Ready(item)
    }
}

/// Split `output` into a client stream and an upload stream.
///
/// `outcome` is the exit state of the process producing `output`.
pub fn tee<S>(output: S, outcome: watch::Receiver<Outcome>) -> (TeeStream<S>, ByteStream)
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let client = TeeStream {
        inner: output,
        tx: Some(tx),
    };
    (client, upload_stream(rx, outcome))
}

fn upload_stream(
    rx: mpsc::UnboundedReceiver<TeeEvent>,
    outcome: watch::Receiver<Outcome>,
) -> ByteStream {
    stream::unfold(Some((rx, outcome)), |state| async move {
        let (mut rx, mut outcome) = state?;
        match rx.recv().await {
            Some(TeeEvent::Chunk(chunk)) => Some((Ok(chunk), Some((rx, outcome)))),
            Some(TeeEvent::Failed(message)) => Some((Err(io::Error::other(message)), None)),
            Some(TeeEvent::End) => {
                let completed = match outcome.wait_for(|o| !o.is_running()).await {
                    Ok(o) => matches!(*o, Outcome::Completed),
                    Err(_) => false,
                };
                if completed {
                    None
                } else {
                    let error = io::Error::other("transcoder did not complete successfully");
                    Some((Err(error), None))
                }
            }
            None => {
                let error = io::Error::other("client went away before the output was complete");
                Some((Err(error), None))
            }
        }
    })
    .boxed()
}
