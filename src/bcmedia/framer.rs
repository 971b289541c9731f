use super::de;
use super::model::BcMedia;
use log::*;

/// Re-assembles BcMedia units out of the concatenated payload bytes of a
/// video stream
///
/// Media units do not align with message boundaries, so bytes accumulate
/// here until a whole unit is present. An unknown magic discards a single
/// byte at a time until the stream looks sane again; a correct stream only
/// needs a handful of such resync bytes after a binary-mode transition.
pub(crate) struct BcMediaFramer {
    buffer: Vec<u8>,
    skipped: usize,
}

impl BcMediaFramer {
    pub(crate) fn new() -> BcMediaFramer {
        BcMediaFramer {
            buffer: Vec::new(),
            skipped: 0,
        }
    }

    /// Append payload bytes from one video message
    pub(crate) fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pull the next complete unit out of the buffer
    ///
    /// Returns the unit and the number of bytes it occupied on the wire
    /// (header, payload and padding). `None` means the buffer holds no
    /// complete unit and more data is needed.
    pub(crate) fn next_frame(&mut self) -> Option<(BcMedia, usize)> {
        loop {
            if self.buffer.len() < 4 {
                return None;
            }
            match de::bcmedia(&self.buffer) {
                Ok((remaining, frame)) => {
                    let consumed = self.buffer.len() - remaining.len();
                    self.buffer.drain(..consumed);
                    if self.skipped > 0 {
                        debug!("Recovered media sync after {} bytes", self.skipped);
                        self.skipped = 0;
                    }
                    return Some((frame, consumed));
                }
                Err(nom::Err::Incomplete(_)) => return None,
                Err(_) => {
                    // One warning per desync burst, not per byte
                    if self.skipped == 0 {
                        warn!(
                            "Unknown media magic {:02x?}, resyncing",
                            &self.buffer[..4]
                        );
                    }
                    self.buffer.drain(..1);
                    self.skipped += 1;
                }
            }
        }
    }
}
