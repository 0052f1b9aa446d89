//! Permessage-deflate WebSocket compression extension (RFC 7692).
//!
//! Compressed output and inflated payloads are produced into a
//! [`BufferAccumulator`] so large messages are built from pooled buffers.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::{debug, trace};

use crate::buffer::{BufferAccumulator, SharedBufferPool};
use crate::config::Limits;
use crate::error::{Error, Result};
use crate::extensions::{
    Extension, ExtensionConfig, ExtensionParam, ExtensionResources, RsvBits,
};
use crate::protocol::{Frame, OpCode};
use crate::session::{Behavior, Callback, IncomingFrames, OutgoingFrames, SharedSession};

const MIN_WINDOW_BITS: u8 = 8;
const MAX_WINDOW_BITS: u8 = 15;
const DEFAULT_WINDOW_BITS: u8 = 15;
const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

const SERVER_NO_CONTEXT_TAKEOVER: &str = "server_no_context_takeover";
const CLIENT_NO_CONTEXT_TAKEOVER: &str = "client_no_context_takeover";
const SERVER_MAX_WINDOW_BITS: &str = "server_max_window_bits";
const CLIENT_MAX_WINDOW_BITS: &str = "client_max_window_bits";

/// Negotiable permessage-deflate parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeflateConfig {
    pub server_no_context_takeover: bool,
    pub client_no_context_takeover: bool,
    pub server_max_window_bits: u8,
    pub client_max_window_bits: u8,
    pub compression_level: u32,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            server_max_window_bits: DEFAULT_WINDOW_BITS,
            client_max_window_bits: DEFAULT_WINDOW_BITS,
            compression_level: 6,
        }
    }
}

impl DeflateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_no_context_takeover(mut self, value: bool) -> Self {
        self.server_no_context_takeover = value;
        self
    }

    pub fn client_no_context_takeover(mut self, value: bool) -> Self {
        self.client_no_context_takeover = value;
        self
    }

    pub fn server_max_window_bits(mut self, bits: u8) -> Result<Self> {
        self.server_max_window_bits = check_window_bits(SERVER_MAX_WINDOW_BITS, bits)?;
        Ok(self)
    }

    pub fn client_max_window_bits(mut self, bits: u8) -> Result<Self> {
        self.client_max_window_bits = check_window_bits(CLIENT_MAX_WINDOW_BITS, bits)?;
        Ok(self)
    }

    pub fn compression_level(mut self, level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidExtension(format!(
                "compression_level must be 0-9, got {}",
                level
            )));
        }
        self.compression_level = level;
        Ok(self)
    }

    /// Read negotiated parameters.
    ///
    /// `client_max_window_bits` may appear without a value in an offer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] for unknown parameters or window
    /// bits outside 8-15.
    pub fn from_params(params: &[ExtensionParam]) -> Result<Self> {
        let mut config = Self::default();
        for param in params {
            match param.name.as_str() {
                SERVER_NO_CONTEXT_TAKEOVER => config.server_no_context_takeover = true,
                CLIENT_NO_CONTEXT_TAKEOVER => config.client_no_context_takeover = true,
                SERVER_MAX_WINDOW_BITS => {
                    config.server_max_window_bits =
                        parse_window_bits(&param.name, param.value.as_deref())?;
                }
                CLIENT_MAX_WINDOW_BITS => {
                    if param.value.is_some() {
                        config.client_max_window_bits =
                            parse_window_bits(&param.name, param.value.as_deref())?;
                    }
                }
                _ => {
                    return Err(Error::InvalidExtension(format!(
                        "Unknown parameter: {}",
                        param.name
                    )));
                }
            }
        }
        Ok(config)
    }

    /// Parameters that differ from the defaults, in header order.
    pub fn params(&self) -> Vec<ExtensionParam> {
        let mut params = Vec::new();

        if self.server_no_context_takeover {
            params.push(ExtensionParam::flag(SERVER_NO_CONTEXT_TAKEOVER));
        }
        if self.client_no_context_takeover {
            params.push(ExtensionParam::flag(CLIENT_NO_CONTEXT_TAKEOVER));
        }
        if self.server_max_window_bits != DEFAULT_WINDOW_BITS {
            params.push(ExtensionParam::new(
                SERVER_MAX_WINDOW_BITS,
                self.server_max_window_bits.to_string(),
            ));
        }
        if self.client_max_window_bits != DEFAULT_WINDOW_BITS {
            params.push(ExtensionParam::new(
                CLIENT_MAX_WINDOW_BITS,
                self.client_max_window_bits.to_string(),
            ));
        }

        params
    }

    /// Extension config carrying these parameters.
    pub fn to_extension_config(&self) -> ExtensionConfig {
        ExtensionConfig::with_params(DeflateExtension::NAME, self.params())
    }
}

fn check_window_bits(name: &str, bits: u8) -> Result<u8> {
    if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
        return Err(Error::InvalidExtension(format!(
            "{} must be {}-{}, got {}",
            name, MIN_WINDOW_BITS, MAX_WINDOW_BITS, bits
        )));
    }
    Ok(bits)
}

fn parse_window_bits(name: &str, value: Option<&str>) -> Result<u8> {
    match value {
        Some(s) => {
            let bits: u8 = s.parse().map_err(|_| {
                Error::InvalidExtension(format!("Invalid window bits value: {}", s))
            })?;
            check_window_bits(name, bits)
        }
        None => Err(Error::InvalidExtension(format!("{} requires a value", name))),
    }
}

/// Outbound half: compressor state of the message being sent.
struct Deflater {
    compressor: Compress,
    pool: SharedBufferPool,
    allocation_size: usize,
    no_context_takeover: bool,
    /// Outbound message in progress is being compressed.
    deflating: bool,
}

impl Deflater {
    fn applies_to(&self, frame: &Frame) -> bool {
        !frame.opcode.is_control() && (frame.opcode != OpCode::Continuation || self.deflating)
    }

    fn compress(&mut self, mut input: &[u8], fin: bool) -> Result<Bytes> {
        let mut output = BufferAccumulator::new(Arc::clone(&self.pool));
        let chunk = self.allocation_size.max(input.len() / 2 + 16);

        loop {
            let tail = output.ensure_writable(chunk);
            let before_in = self.compressor.total_in();
            let before_out = self.compressor.total_out();

            let start = tail.len();
            let free = tail.capacity() - start;
            tail.resize(start + free, 0);
            let result = self
                .compressor
                .compress(input, &mut tail[start..], FlushCompress::Sync);
            let produced = (self.compressor.total_out() - before_out) as usize;
            tail.truncate(start + produced);
            result.map_err(|e| Error::Extension(format!("Compression failed: {}", e)))?;

            let consumed = (self.compressor.total_in() - before_in) as usize;
            input = &input[consumed..];

            if (input.is_empty() && produced < free) || (consumed == 0 && produced == 0) {
                break;
            }
        }

        let mut compressed = output.take_buffer();
        if fin && compressed.ends_with(&DEFLATE_TRAILER) {
            compressed.truncate(compressed.len() - DEFLATE_TRAILER.len());
        }
        Ok(compressed.freeze())
    }

    fn deflate_frame(&mut self, frame: &Frame) -> Result<Frame> {
        if frame.rsv1 {
            return Err(Error::Extension(
                "RSV1 already set on outbound frame".to_string(),
            ));
        }

        let first = frame.opcode != OpCode::Continuation;
        if first {
            self.deflating = true;
        }

        let compressed = self.compress(frame.payload(), frame.fin)?;
        trace!(
            len = frame.payload_len(),
            compressed = compressed.len(),
            "deflated frame"
        );

        let mut out = frame.with_payload(compressed);
        out.rsv1 = first;

        if frame.fin {
            self.deflating = false;
            if self.no_context_takeover {
                self.compressor.reset();
            }
        }
        Ok(out)
    }

    /// Drop the message in progress and start over with an empty context.
    fn abort(&mut self) {
        self.deflating = false;
        self.compressor.reset();
    }
}

/// Inbound half: decompressor state of the message being received.
struct Inflater {
    decompressor: Decompress,
    pool: SharedBufferPool,
    allocation_size: usize,
    limits: Limits,
    no_context_takeover: bool,
    /// Inbound message in progress is compressed.
    inflating: bool,
    inflated_size: usize,
}

impl Inflater {
    fn decompress(&mut self, payload: &[u8], fin: bool) -> Result<Bytes> {
        let mut output = BufferAccumulator::new(Arc::clone(&self.pool));
        let chunk = self.allocation_size.max(payload.len() * 2);

        let mut framed = BytesMut::new();
        let mut input: &[u8] = if fin {
            framed.reserve(payload.len() + DEFLATE_TRAILER.len());
            framed.extend_from_slice(payload);
            framed.extend_from_slice(&DEFLATE_TRAILER);
            &framed[..]
        } else {
            payload
        };

        loop {
            let tail = output.ensure_writable(chunk);
            let before_in = self.decompressor.total_in();
            let before_out = self.decompressor.total_out();

            let start = tail.len();
            let free = tail.capacity() - start;
            tail.resize(start + free, 0);
            let result = self
                .decompressor
                .decompress(input, &mut tail[start..], FlushDecompress::Sync);
            let produced = (self.decompressor.total_out() - before_out) as usize;
            tail.truncate(start + produced);
            let status =
                result.map_err(|e| Error::Extension(format!("Decompression failed: {}", e)))?;

            self.inflated_size += produced;
            self.limits.check_message_size(self.inflated_size)?;

            let consumed = (self.decompressor.total_in() - before_in) as usize;
            input = &input[consumed..];

            if status == Status::StreamEnd
                || (input.is_empty() && produced < free)
                || (consumed == 0 && produced == 0)
            {
                break;
            }
        }

        Ok(output.take_buffer().freeze())
    }

    fn inflate_frame(&mut self, frame: &Frame) -> Result<Frame> {
        let payload = self.decompress(frame.payload(), frame.fin)?;
        let mut out = frame.with_payload(payload);
        out.rsv1 = false;

        if frame.fin {
            self.inflating = false;
            self.inflated_size = 0;
            if self.no_context_takeover {
                self.decompressor.reset(false);
            }
        }
        Ok(out)
    }

    /// Decide whether an inbound frame belongs to a compressed message.
    fn should_inflate(&mut self, frame: &Frame) -> Result<bool> {
        if frame.opcode.is_control() {
            if frame.rsv1 {
                return Err(Error::Extension("RSV1 set on control frame".to_string()));
            }
            return Ok(false);
        }

        if frame.opcode == OpCode::Continuation {
            if frame.rsv1 {
                return Err(Error::Extension(
                    "RSV1 set on continuation frame".to_string(),
                ));
            }
            return Ok(self.inflating);
        }

        if self.inflating {
            debug!("new message before the compressed one finished, resetting inflater");
            self.decompressor.reset(false);
        }
        self.inflating = frame.rsv1;
        self.inflated_size = 0;
        Ok(self.inflating)
    }

    fn process(&mut self, frame: Frame) -> Result<Frame> {
        if self.should_inflate(&frame)? {
            self.inflate_frame(&frame)
        } else {
            Ok(frame)
        }
    }

    /// Drop the message in progress; the stream position is unknown after a failure.
    fn abort(&mut self) {
        self.inflating = false;
        self.inflated_size = 0;
        self.decompressor.reset(false);
    }
}

fn lock<T>(half: &Mutex<T>) -> MutexGuard<'_, T> {
    half.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-message compression with a persistent or per-message context.
///
/// Compression and decompression state live in separate halves, so a send
/// never waits on a receive. Window bits are recorded but compression always
/// uses a 15-bit window.
pub struct DeflateExtension {
    config: ExtensionConfig,
    deflate: DeflateConfig,
    behavior: Behavior,
    outgoing: Mutex<Deflater>,
    incoming: Mutex<Inflater>,
}

impl DeflateExtension {
    /// Registered extension name.
    pub const NAME: &'static str = "permessage-deflate";

    /// Create an instance from explicit parameters.
    pub fn new(resources: &ExtensionResources, deflate: DeflateConfig) -> Self {
        let allocation_size = resources.allocation_size.max(1);
        let mut extension = Self {
            config: deflate.to_extension_config(),
            behavior: Behavior::Server,
            outgoing: Mutex::new(Deflater {
                compressor: Compress::new(Compression::new(deflate.compression_level), false),
                pool: Arc::clone(&resources.buffer_pool),
                allocation_size,
                no_context_takeover: false,
                deflating: false,
            }),
            incoming: Mutex::new(Inflater {
                decompressor: Decompress::new(false),
                pool: Arc::clone(&resources.buffer_pool),
                allocation_size,
                limits: resources.limits,
                no_context_takeover: false,
                inflating: false,
                inflated_size: 0,
            }),
            deflate,
        };
        extension.apply_behavior(Behavior::Server);
        extension
    }

    /// Create an instance from a negotiated config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] if a parameter is unknown or invalid.
    pub fn from_config(resources: &ExtensionResources, config: ExtensionConfig) -> Result<Self> {
        let deflate = DeflateConfig::from_params(&config.params)?;
        let mut extension = Self::new(resources, deflate);
        extension.config = config;
        Ok(extension)
    }

    /// Negotiated parameters.
    pub fn deflate_config(&self) -> &DeflateConfig {
        &self.deflate
    }

    /// Pick which side's context takeover setting governs each direction.
    fn apply_behavior(&mut self, behavior: Behavior) {
        let (ours, theirs) = if behavior.is_server() {
            (
                self.deflate.server_no_context_takeover,
                self.deflate.client_no_context_takeover,
            )
        } else {
            (
                self.deflate.client_no_context_takeover,
                self.deflate.server_no_context_takeover,
            )
        };
        self.behavior = behavior;
        self.outgoing
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .no_context_takeover = ours;
        self.incoming
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .no_context_takeover = theirs;
    }
}

impl Extension for DeflateExtension {
    fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    fn rsv_bits(&self) -> RsvBits {
        RsvBits::RSV1
    }

    fn set_session(&mut self, session: SharedSession) {
        self.apply_behavior(session.behavior());
    }

    fn on_frame(&self, frame: Frame, callback: Callback, next: &mut dyn IncomingFrames) {
        let result = {
            let mut inflater = lock(&self.incoming);
            let result = inflater.process(frame);
            if result.is_err() {
                inflater.abort();
            }
            result
        };

        match result {
            Ok(frame) => next.on_frame(frame, callback),
            Err(err) => {
                debug!(error = %err, "permessage-deflate inbound failure");
                callback.failed(err);
            }
        }
    }

    fn send_frame(
        &self,
        frame: Frame,
        callback: Callback,
        batch: bool,
        next: &mut dyn OutgoingFrames,
    ) {
        let result = {
            let mut deflater = lock(&self.outgoing);
            if !deflater.applies_to(&frame) {
                Ok(frame)
            } else {
                let result = deflater.deflate_frame(&frame);
                if result.is_err() {
                    deflater.abort();
                }
                result
            }
        };

        match result {
            Ok(frame) => next.send_frame(frame, callback, batch),
            Err(err) => {
                debug!(error = %err, "permessage-deflate outbound failure");
                callback.failed(err);
            }
        }
    }
}

impl fmt::Debug for DeflateExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeflateExtension")
            .field("config", &self.deflate)
            .field("behavior", &self.behavior)
            .finish_non_exhaustive()
    }
}
