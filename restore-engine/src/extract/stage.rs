//! Stage tagging for the reader chain.
//!
//! Every stage reader is wrapped in `Staged`, which stamps the first error it
//! sees with the stage's name. Errors that already carry a stamp from an
//! upstream stage pass through untouched, so the final error names the stage
//! where things actually broke.

use crate::utils::errors::{ExtractStage, RestoreError};
use std::error::Error;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Type-erased reader passed from one stage to the next
pub type BoxReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug)]
pub struct StageFailure {
    pub stage: ExtractStage,
    pub source: io::Error,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl Error for StageFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

pub struct Staged {
    stage: ExtractStage,
    inner: BoxReader,
}

impl Staged {
    pub fn new(stage: ExtractStage, inner: impl AsyncRead + Send + 'static) -> Self {
        Self {
            stage,
            inner: Box::pin(inner),
        }
    }
}

impl AsyncRead for Staged {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_read(cx, buf) {
            Poll::Ready(Err(e)) => Poll::Ready(Err(tag(this.stage, e))),
            other => other,
        }
    }
}

fn tag(stage: ExtractStage, err: io::Error) -> io::Error {
    if stage_of(&err).is_some() {
        return err;
    }
    io::Error::new(err.kind(), StageFailure { stage, source: err })
}

/// Find the stage stamp anywhere in the error chain. The tar unpacker wraps
/// reader errors in its own error type, so the stamp may be nested.
pub fn stage_of(err: &io::Error) -> Option<ExtractStage> {
    let mut current: Option<&(dyn Error + 'static)> =
        err.get_ref().map(|e| e as &(dyn Error + 'static));

    while let Some(e) = current {
        if let Some(failure) = e.downcast_ref::<StageFailure>() {
            return Some(failure.stage);
        }
        if let Some(inner) = e.downcast_ref::<io::Error>().and_then(|io| io.get_ref()) {
            current = Some(inner as &(dyn Error + 'static));
            continue;
        }
        current = e.source();
    }

    None
}

/// Convert a pipeline I/O error, falling back to `default` when no stage
/// stamped it.
pub fn into_restore_error(default: ExtractStage, err: io::Error) -> RestoreError {
    let stage = stage_of(&err).unwrap_or(default);
    RestoreError::extraction(stage, err.to_string())
}
