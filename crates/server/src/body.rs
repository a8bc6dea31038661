//! Response-observation body.
//!
//! Wraps a response body, counts the data bytes it yields, and completes the
//! request's log entry exactly once: at end of stream, on a body error, on a
//! panic while polling, or when the body is dropped early.

use axum::body::Body;
use axum::http::{Method, StatusCode};
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use reqlog_core::{EntryHandle, LogLevel};
use reqlog_core::error::ServerError;
use reqlog_core::panic::CapturedPanic;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

pub struct ObservedBody {
    inner: Body,
    // `None` once the entry has been completed.
    entry: Option<EntryHandle>,
    status: u16,
    bytes: u64,
    start: Instant,
    ended: bool,
    // HEAD and bodiless statuses: the server drops the body unread, so a drop
    // says nothing about the client.
    body_expected: bool,
}

impl ObservedBody {
    pub fn new(
        inner: Body,
        entry: EntryHandle,
        method: &Method,
        status: StatusCode,
        start: Instant,
    ) -> Self {
        Self {
            inner,
            entry: Some(entry),
            status: status.as_u16(),
            bytes: 0,
            start,
            ended: false,
            body_expected: *method != Method::HEAD && status_allows_body(status),
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    fn finish(&mut self) {
        self.ended = true;
        if let Some(entry) = self.entry.take() {
            entry.complete(self.status, self.bytes, self.start.elapsed());
        }
    }
}

fn status_allows_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

impl HttpBody for ObservedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        if this.ended {
            return Poll::Ready(None);
        }

        let polled = catch_unwind(AssertUnwindSafe(|| Pin::new(&mut this.inner).poll_frame(cx)));
        match polled {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(Some(Ok(frame)))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Ok(Poll::Ready(Some(Err(e)))) => {
                if let Some(entry) = &this.entry {
                    entry.add_field("body_error", e.to_string());
                    entry.raise_level(LogLevel::Error);
                }
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            Ok(Poll::Ready(None)) => {
                this.finish();
                Poll::Ready(None)
            }
            Err(payload) => {
                // Headers are already on the wire; all that is left is to end
                // the stream with an error.
                let captured = CapturedPanic::from_payload(payload);
                if let Some(entry) = &this.entry {
                    entry.record_panic(&captured);
                }
                this.finish();
                Poll::Ready(Some(Err(axum::Error::new(ServerError::Panic))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.ended || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ObservedBody {
    fn drop(&mut self) {
        if !self.ended
            && self.body_expected
            && !self.inner.is_end_stream()
            && let Some(entry) = &self.entry
        {
            entry.add_field("canceled", true);
            entry.raise_level(LogLevel::Warn);
        }
        self.finish();
    }
}
