//! # concat-body
//!
//! Concatenate in-memory bytes, files and readable streams into one body and
//! stream it, through a fixed-size buffer, to a sink driven by readiness
//! notifications.
//!
//! ## Core Concepts
//!
//! - **[`Aggregator`]**: Ordered sources plus the declared total length
//! - **[`BodyWriter`]**: The pump; reacts to [`SinkEvent`]s from the sink's reactor
//! - **[`BodyReader`]**: Pull-mode access as `std::io::Read` or a `Stream` of `Bytes`
//! - **[`Sink`]**: Destination abstraction; [`pipe`] builds an in-memory one
//! - **[`EventQueue`]**: Deterministic reactor used to drive a writer to completion
//!
//! ## Example - Collecting
//!
//! ```ignore
//! use concat_body::Aggregator;
//!
//! let mut body = Aggregator::new()?;
//! body.add_bytes("--boundary\r\n");
//! body.add_file("photo.jpg")?;
//! body.add_bytes("\r\n--boundary--\r\n");
//!
//! println!("declared: {}", body.declared_length());
//! let bytes = body.collect_all()?;
//! ```
//!
//! ## Example - Driving a Sink
//!
//! ```ignore
//! use concat_body::{Aggregator, Reaction, SinkEvent};
//!
//! let mut writer = body.open_with_sink(socket_sink);
//!
//! // Inside the reactor callback:
//! match writer.handle_readiness(SinkEvent::HasSpaceAvailable) {
//!     Reaction::Continue => {}
//!     Reaction::RetryAfter(delay) => schedule_again(delay),
//!     Reaction::Closed => {
//!         if let Some(err) = writer.current_error() {
//!             eprintln!("upload failed: {err}");
//!         }
//!     }
//! }
//! ```
//!
//! ## Example - Pull Mode
//!
//! ```ignore
//! use concat_body::Aggregator;
//! use futures::StreamExt;
//!
//! let mut chunks = body.into_reader();
//! while let Some(chunk) = chunks.next().await {
//!     upload(chunk?).await;
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod aggregator;
pub mod body;
pub mod buffer;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod reader;
pub mod sink;
pub mod source;
pub mod state;
pub mod writer;

// Re-exports
pub use aggregator::Aggregator;
pub use body::BodyReader;
pub use buffer::PumpBuffer;
pub use config::{
    AggregatorConfig, LengthCheck, RetryPolicy, DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_IDLE_POLLS,
    DEFAULT_RETRY_DELAY,
};
pub use error::{BodyError, BodyResult};
pub use event_loop::{run_until_closed, EventQueue};
pub use reader::{AggregateReader, ReadOutcome};
pub use sink::{pipe, PipeReader, PipeWriter, Reaction, Sink, SinkEvent};
pub use source::{ByteStream, DeclaredLength, Source, SourceList};
pub use state::{ErrorSlot, WriterState};
pub use writer::BodyWriter;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        Aggregator, AggregatorConfig, BodyError, BodyReader, BodyResult, BodyWriter,
        DeclaredLength, LengthCheck, Reaction, RetryPolicy, Sink, SinkEvent,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let config = AggregatorConfig::default();
        assert_eq!(config.length_check, LengthCheck::Warn);
        assert!(matches!(config.retry, RetryPolicy::Fixed { .. }));

        let body = Aggregator::with_config(config).unwrap();
        assert_eq!(body.declared_length(), DeclaredLength::Known(0));
    }
}
