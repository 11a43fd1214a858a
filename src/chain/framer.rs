//! Record framing: byte stream in, delimited records out.
//!
//! A framer keeps a carry-over buffer across `feed` calls so that a record
//! split over any number of receive calls is assembled exactly once, and a
//! trailing fragment without its delimiter stays buffered until more bytes
//! arrive. Records are drained lazily with `next_record`.

use bytes::BytesMut;

/// Splits a continuous byte stream into discrete records.
///
/// Implementations are interchangeable: the chain only depends on this
/// contract, so swapping the delimiter scheme never touches the stages
/// above or below the framer.
pub trait Framer: Send {
    /// Append newly received bytes to the carry-over buffer.
    fn feed(&mut self, bytes: &[u8]);

    /// Drain the next complete record, with its delimiter stripped.
    ///
    /// Returns `None` once no complete record remains; any partial tail
    /// stays buffered for the next `feed`. An empty record (back-to-back
    /// delimiters) is yielded, not skipped.
    fn next_record(&mut self) -> Option<BytesMut>;

    /// Frame an outbound record by appending the configured delimiter.
    fn frame(&self, record: &[u8]) -> Vec<u8>;

    /// Number of buffered bytes not yet part of a complete record.
    fn pending(&self) -> usize;
}

/// Framer matching a single configurable delimiter byte (default `\n`).
pub struct LineFramer {
    carry: BytesMut,
    delimiter: u8,
}

impl LineFramer {
    pub fn new(delimiter: u8) -> Self {
        Self {
            carry: BytesMut::new(),
            delimiter,
        }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(b'\n')
    }
}

impl Framer for LineFramer {
    fn feed(&mut self, bytes: &[u8]) {
        self.carry.extend_from_slice(bytes);
    }

    fn next_record(&mut self) -> Option<BytesMut> {
        let pos = self.carry.iter().position(|&b| b == self.delimiter)?;
        let mut record = self.carry.split_to(pos + 1);
        record.truncate(pos);
        Some(record)
    }

    fn frame(&self, record: &[u8]) -> Vec<u8> {
        let mut framed = Vec::with_capacity(record.len() + 1);
        framed.extend_from_slice(record);
        framed.push(self.delimiter);
        framed
    }

    fn pending(&self) -> usize {
        self.carry.len()
    }
}

/// Framer matching the two-byte `\r\n` delimiter.
///
/// Drop-in substitute for [`LineFramer`]; same contract, different
/// delimiter width.
pub struct CrlfFramer {
    carry: BytesMut,
}

impl CrlfFramer {
    pub fn new() -> Self {
        Self {
            carry: BytesMut::new(),
        }
    }
}

impl Default for CrlfFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer for CrlfFramer {
    fn feed(&mut self, bytes: &[u8]) {
        self.carry.extend_from_slice(bytes);
    }

    fn next_record(&mut self) -> Option<BytesMut> {
        let pos = self
            .carry
            .windows(2)
            .position(|pair| pair == b"\r\n")?;
        let mut record = self.carry.split_to(pos + 2);
        record.truncate(pos);
        Some(record)
    }

    fn frame(&self, record: &[u8]) -> Vec<u8> {
        let mut framed = Vec::with_capacity(record.len() + 2);
        framed.extend_from_slice(record);
        framed.extend_from_slice(b"\r\n");
        framed
    }

    fn pending(&self) -> usize {
        self.carry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut dyn Framer) -> Vec<Vec<u8>> {
        let mut records = Vec::new();
        while let Some(record) = framer.next_record() {
            records.push(record.to_vec());
        }
        records
    }

    #[test]
    fn test_single_record() {
        let mut framer = LineFramer::default();
        framer.feed(b"PING\n");
        assert_eq!(drain(&mut framer), vec![b"PING".to_vec()]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_partial_then_complete() {
        let mut framer = LineFramer::default();
        framer.feed(b"PI");
        assert!(framer.next_record().is_none());
        assert_eq!(framer.pending(), 2);

        framer.feed(b"NG\n");
        assert_eq!(drain(&mut framer), vec![b"PING".to_vec()]);
    }

    #[test]
    fn test_multiple_records_one_feed() {
        let mut framer = LineFramer::default();
        framer.feed(b"one\ntwo\nthree\npartial");
        assert_eq!(
            drain(&mut framer),
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
        assert_eq!(framer.pending(), 7);
    }

    #[test]
    fn test_empty_record_is_yielded() {
        let mut framer = LineFramer::default();
        framer.feed(b"a\n\nb\n");
        assert_eq!(
            drain(&mut framer),
            vec![b"a".to_vec(), b"".to_vec(), b"b".to_vec()]
        );
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let input = b"alpha\nbeta\ngamma\n";
        let whole = {
            let mut framer = LineFramer::default();
            framer.feed(input);
            drain(&mut framer)
        };

        // Every split point must produce the identical record sequence.
        for split in 0..input.len() {
            let mut framer = LineFramer::default();
            framer.feed(&input[..split]);
            let mut records = drain(&mut framer);
            framer.feed(&input[split..]);
            records.extend(drain(&mut framer));
            assert_eq!(records, whole, "split at {split}");
        }
    }

    #[test]
    fn test_custom_delimiter() {
        let mut framer = LineFramer::new(b';');
        framer.feed(b"a;b;");
        assert_eq!(drain(&mut framer), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(framer.frame(b"ok"), b"ok;".to_vec());
    }

    #[test]
    fn test_frame_appends_delimiter() {
        let framer = LineFramer::default();
        assert_eq!(framer.frame(b"PONG"), b"PONG\n".to_vec());
        assert_eq!(framer.frame(b""), b"\n".to_vec());
    }

    #[test]
    fn test_crlf_framer() {
        let mut framer = CrlfFramer::new();
        framer.feed(b"PING\r\nEC");
        assert_eq!(drain(&mut framer), vec![b"PING".to_vec()]);
        assert_eq!(framer.pending(), 2);

        framer.feed(b"HO hi\r\n");
        assert_eq!(drain(&mut framer), vec![b"ECHO hi".to_vec()]);
        assert_eq!(framer.frame(b"PONG"), b"PONG\r\n".to_vec());
    }

    #[test]
    fn test_crlf_split_across_feeds() {
        let mut framer = CrlfFramer::new();
        framer.feed(b"PING\r");
        assert!(framer.next_record().is_none());
        framer.feed(b"\n");
        assert_eq!(drain(&mut framer), vec![b"PING".to_vec()]);
    }
}
