//! In-memory duplex byte pipes for the Hermes framework.
//!
//! This crate provides the byte-level channel between a transport and the
//! application half of a connection. A [`duplex_pair`] yields two
//! [`DuplexPipe`] ends wired back to back: bytes written on one end's output
//! are read from the other end's input.
//!
//! # Design
//!
//! Each underlying pipe is a single-producer/single-consumer bounded byte
//! queue. The writer appends with backpressure; the reader inspects the
//! buffered bytes and advances a consumed cursor explicitly, which lets a
//! framing layer leave partial records in place. A write completes only once
//! the reader has consumed the written bytes, so a reader that terminates the
//! pipe mid-transfer (for example a transport whose send failed) surfaces the
//! terminating error to the writer that produced those bytes.
//!
//! # Example
//!
//! ```
//! use hermes_pipe::{duplex_pair, PipeOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), hermes_pipe::PipeError> {
//! let (transport, application) = duplex_pair(PipeOptions::default(), PipeOptions::default());
//!
//! let write = application.output.write(b"hello");
//! let read = transport.input.read();
//! let (write, read) = tokio::join!(write, read);
//! write?;
//! assert_eq!(read?.as_deref(), Some(&b"hello"[..]));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod pipe;

pub use error::{PipeError, PipeResult};
pub use pipe::{duplex_pair, DuplexPipe, PipeOptions, PipeReader, PipeWriter};
