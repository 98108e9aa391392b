//! Re-encodes a fragment stream as protocol lines.

use std::pin::Pin;

use futures::{Stream, StreamExt, stream};
use tracing::{trace, warn};

use super::{CompletionFragment, ProtocolLine};
use crate::error::{LlmError, StreamError};

/// Lazy protocol-line sequence handed to the transport.
pub type ProtocolStream =
    Pin<Box<dyn Stream<Item = Result<ProtocolLine, StreamError>> + Send + 'static>>;

/// Map fragments to protocol lines, one fragment at a time.
///
/// - every `Delta` becomes one `Data` line, empty text included
/// - `Marker` fragments are skipped
/// - `Finish` becomes the single, final `Finish` line; the source is dropped
///   right after and never polled again
/// - a source error or a source that ends without `Finish` yields one `Err`
///   and ends the stream
///
/// Dropping the returned stream drops the source with it.
pub fn reframe<S>(fragments: S) -> ProtocolStream
where
    S: Stream<Item = Result<CompletionFragment, LlmError>> + Send + Unpin + 'static,
{
    let lines = stream::unfold(Some(fragments), |state| async move {
        let mut fragments = state?;
        loop {
            match fragments.next().await {
                Some(Ok(CompletionFragment::Delta { text })) => {
                    return Some((Ok(ProtocolLine::Data { text }), Some(fragments)));
                }
                Some(Ok(CompletionFragment::Marker { reason })) => {
                    trace!(%reason, "Skipping choice-level terminal marker");
                }
                Some(Ok(CompletionFragment::Finish { reason, usage })) => {
                    let line = ProtocolLine::Finish {
                        reason,
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                        is_continued: false,
                    };
                    return Some((Ok(line), None));
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Token source failed mid-stream");
                    return Some((Err(StreamError::Upstream(e)), None));
                }
                None => {
                    warn!("Token source ended without a finish event");
                    return Some((Err(StreamError::Incomplete), None));
                }
            }
        }
    });

    Box::pin(lines)
}
