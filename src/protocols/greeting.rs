//! Greeting handler: sends a short random word and ends the exchange
//! without reading anything from the peer.

use super::Exchange;
use crate::runtime::{write_all, IoError};
use std::io::{Read, Write};

/// Longest word the greeting can contain.
pub const MAX_GREETING_LEN: usize = 10;

pub fn handle<S: Read + Write + ?Sized>(stream: &mut S) -> Result<Exchange, IoError> {
    let message = random_message(&mut fastrand::Rng::new());
    let bytes_written = write_all(stream, &message)?;
    Ok(Exchange {
        bytes_read: 0,
        bytes_written,
    })
}

/// 0 to `MAX_GREETING_LEN` lowercase letters followed by `\n`.
fn random_message(rng: &mut fastrand::Rng) -> Vec<u8> {
    let len = rng.usize(..=MAX_GREETING_LEN);
    let mut message: Vec<u8> = (0..len).map(|_| rng.u8(b'a'..=b'z')).collect();
    message.push(b'\n');
    message
}
