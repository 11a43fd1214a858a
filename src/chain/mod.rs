//! Protocol chain: ordered, substitutable transform stages.
//!
//! Stage boundaries are typed: bytes → records (framer) → text (codec) →
//! command/reply (dispatcher) → text → bytes. Each stage is a trait
//! object assembled at construction time; swapping a stage means
//! substituting another implementation of the same trait, never editing
//! its neighbors.

pub mod codec;
pub mod dispatch;
pub mod framer;

pub use codec::{Codec, Latin1Codec, Utf8Codec};
pub use dispatch::Dispatcher;
pub use framer::{CrlfFramer, Framer, LineFramer};

use crate::config::{Config, TextEncoding};
use bytes::BytesMut;
use std::sync::Arc;

/// One connection's protocol pipeline.
///
/// The framer and codec are owned per connection (the framer carries
/// partial-record state); the dispatcher is the shared startup table.
pub struct ProtocolChain {
    framer: Box<dyn Framer>,
    codec: Box<dyn Codec>,
    dispatcher: Arc<Dispatcher>,
}

impl ProtocolChain {
    pub fn new(
        framer: Box<dyn Framer>,
        codec: Box<dyn Codec>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            framer,
            codec,
            dispatcher,
        }
    }

    /// Build the chain configured by `config` for a new connection.
    ///
    /// The delimiter has already been validated at config load; anything
    /// unexpected falls back to newline framing.
    pub fn from_config(config: &Config, dispatcher: Arc<Dispatcher>) -> Self {
        let framer: Box<dyn Framer> = match config.delimiter.as_bytes() {
            b"\r\n" => Box::new(CrlfFramer::new()),
            [byte] => Box::new(LineFramer::new(*byte)),
            _ => Box::new(LineFramer::default()),
        };
        let codec: Box<dyn Codec> = match config.encoding {
            TextEncoding::Latin1 => Box::new(Latin1Codec),
            TextEncoding::Utf8 => Box::new(Utf8Codec),
        };
        Self::new(framer, codec, dispatcher)
    }

    /// Run newly received bytes through the inbound path and append any
    /// reply bytes to `out`.
    ///
    /// Every complete record is decoded, normalized (one trailing `\r`
    /// stripped — tolerant inbound) and dispatched; replies are encoded
    /// and framed with exactly the configured delimiter (strict
    /// outbound). A record that fails to decode gets a synthesized error
    /// reply; the chain keeps going.
    pub fn feed(&mut self, bytes: &[u8], out: &mut BytesMut) {
        self.framer.feed(bytes);

        while let Some(record) = self.framer.next_record() {
            let reply = match self.codec.decode(&record) {
                Ok(text) => {
                    let line = text.strip_suffix('\r').unwrap_or(&text);
                    self.dispatcher.dispatch(line)
                }
                Err(e) => Some(format!("ERROR {e}")),
            };

            if let Some(reply) = reply {
                let encoded = self.codec.encode(&reply);
                out.extend_from_slice(&self.framer.frame(&encoded));
            }
        }
    }

    /// Bytes buffered in the framer awaiting a delimiter.
    pub fn pending(&self) -> usize {
        self.framer.pending()
    }
}
