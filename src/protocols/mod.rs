//! Connection handlers.
//!
//! A handler runs one exchange over one connected stream, from the first
//! byte to end of stream, and never touches another connection. Handlers
//! only see `&mut S`: closing the stream belongs to whoever owns it.
//!
//! - `echo`: line echo, bounded by the configured line capacity
//! - `greeting`: one short random message, then done

pub mod echo;
pub mod greeting;

use crate::config::ProtocolType;
use crate::runtime::IoError;
use std::io::{Read, Write};

/// Byte counts of a finished exchange.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    pub bytes_read: usize,
    pub bytes_written: usize,
}

/// Run the handler selected by `protocol` to completion.
pub fn handle<S: Read + Write>(
    protocol: ProtocolType,
    stream: &mut S,
    line_capacity: usize,
) -> Result<Exchange, IoError> {
    match protocol {
        ProtocolType::Echo => echo::handle(stream, line_capacity),
        ProtocolType::Greeting => greeting::handle(stream),
    }
}
