//! Shard configuration.
//!
//! [`ShardOptions`] carries everything a shard needs before it dials:
//! - where to connect and which protocol version to ask for
//! - the identify payload (token, intents, shard pair)
//! - send limits and the invalid-session back-off range
//! - optional hooks: per-packet inspection, raw frame mirroring and the
//!   dispatch event channel

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use shardline_proto::{Identify, ReceivePacket};
use tokio::sync::mpsc;
use url::Url;

use crate::error::{BoxError, ShardError};
use crate::events::DispatchEvent;

/// Gateway protocol version requested by default.
pub const DEFAULT_VERSION: &str = "10";
/// Sends allowed per window by default.
pub const DEFAULT_SEND_LIMIT: u32 = 120;
/// Default send window.
pub const DEFAULT_SEND_WINDOW: Duration = Duration::from_secs(60);
/// Shortest wait before re-identifying after a non-resumable invalid session.
pub const DEFAULT_INVALID_SESSION_MIN: Duration = Duration::from_secs(1);
/// Longest wait before re-identifying after a non-resumable invalid session.
pub const DEFAULT_INVALID_SESSION_MAX: Duration = Duration::from_secs(5);
/// The one transport compression scheme the connection can inflate.
pub const ZSTD_STREAM: &str = "zstd-stream";

/// Inspection hook called for every inbound packet before it is handled.
/// Returning an error aborts the current connection attempt.
pub type PacketHook = Arc<dyn Fn(&ReceivePacket) -> Result<(), BoxError> + Send + Sync>;

/// Destination for raw inbound frames.
pub trait FrameSink: Send + Sync {
    /// Write one raw frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be written.
    fn write_frame(&self, frame: &[u8]) -> std::io::Result<()>;
}

/// A [`FrameSink`] writing each frame on its own line.
#[derive(Debug)]
pub struct LineSink<W> {
    inner: Mutex<W>,
}

impl<W: Write + Send> LineSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W: Write + Send> FrameSink for LineSink<W> {
    fn write_frame(&self, frame: &[u8]) -> std::io::Result<()> {
        let mut writer = self.inner.lock();
        writer.write_all(frame)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

/// Configuration for a [`crate::Shard`].
#[derive(Clone)]
pub struct ShardOptions {
    /// Base gateway URL, e.g. `wss://gateway.example.com`.
    pub gateway_url: Option<String>,
    /// Identify payload; its token is reused for resumes.
    pub identify: Identify,
    /// Protocol version (`v` query parameter).
    pub version: String,
    /// Transport compression scheme (`compress` query parameter). Only
    /// [`ZSTD_STREAM`] is supported.
    pub compress: Option<String>,
    /// Sends allowed per window.
    pub send_limit: u32,
    /// Send window.
    pub send_window: Duration,
    /// Shortest back-off after a non-resumable invalid session.
    pub invalid_session_min: Duration,
    /// Longest back-off after a non-resumable invalid session.
    pub invalid_session_max: Duration,
    /// Per-packet inspection hook.
    pub on_packet: Option<PacketHook>,
    /// Raw frame mirror.
    pub output: Option<Arc<dyn FrameSink>>,
    /// Receives every dispatch event.
    pub dispatch: Option<mpsc::Sender<DispatchEvent>>,
}

impl ShardOptions {
    /// Options for a gateway URL and identify payload, defaults elsewhere.
    #[must_use]
    pub fn new(gateway_url: impl Into<String>, identify: Identify) -> Self {
        Self {
            gateway_url: Some(gateway_url.into()),
            ..Self::without_gateway(identify)
        }
    }

    /// Options with no gateway URL yet; connecting fails until one is set.
    #[must_use]
    pub fn without_gateway(identify: Identify) -> Self {
        Self {
            gateway_url: None,
            identify,
            version: DEFAULT_VERSION.to_string(),
            compress: None,
            send_limit: DEFAULT_SEND_LIMIT,
            send_window: DEFAULT_SEND_WINDOW,
            invalid_session_min: DEFAULT_INVALID_SESSION_MIN,
            invalid_session_max: DEFAULT_INVALID_SESSION_MAX,
            on_packet: None,
            output: None,
            dispatch: None,
        }
    }

    /// Set the protocol version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Request transport compression. Binary frames are then inflated as
    /// one zstd stream per connection.
    #[must_use]
    pub fn with_compress(mut self, scheme: impl Into<String>) -> Self {
        self.compress = Some(scheme.into());
        self
    }

    /// Set the send limit.
    #[must_use]
    pub const fn with_send_limit(mut self, limit: u32, window: Duration) -> Self {
        self.send_limit = limit;
        self.send_window = window;
        self
    }

    /// Set the invalid-session back-off range.
    #[must_use]
    pub const fn with_invalid_session_delay(mut self, min: Duration, max: Duration) -> Self {
        self.invalid_session_min = min;
        self.invalid_session_max = max;
        self
    }

    /// Install a per-packet inspection hook.
    #[must_use]
    pub fn with_packet_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ReceivePacket) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_packet = Some(Arc::new(hook));
        self
    }

    /// Mirror raw inbound frames to a sink.
    #[must_use]
    pub fn with_output(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.output = Some(sink);
        self
    }

    /// Deliver dispatch events on a channel.
    #[must_use]
    pub fn with_dispatch_channel(mut self, tx: mpsc::Sender<DispatchEvent>) -> Self {
        self.dispatch = Some(tx);
        self
    }

    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is unusable.
    pub fn validate(&self) -> Result<(), ShardError> {
        if self.identify.token.is_empty() {
            return Err(ShardError::Config("identify token cannot be empty".to_string()));
        }

        if self.version.is_empty() {
            return Err(ShardError::Config("protocol version cannot be empty".to_string()));
        }

        if self.send_limit == 0 {
            return Err(ShardError::Config("send limit must be at least 1".to_string()));
        }

        if self.send_window.is_zero() {
            return Err(ShardError::Config("send window cannot be zero".to_string()));
        }

        if self.invalid_session_min > self.invalid_session_max {
            return Err(ShardError::Config(format!(
                "invalid session delay range is inverted: {:?} > {:?}",
                self.invalid_session_min, self.invalid_session_max
            )));
        }

        if let Some(scheme) = self.compress.as_deref() {
            if scheme != ZSTD_STREAM {
                return Err(ShardError::Config(format!(
                    "unsupported compression scheme '{scheme}'"
                )));
            }
        }

        if self.gateway_url.is_some() {
            self.gateway_url()?;
        }

        Ok(())
    }

    /// Full connection URL with query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::GatewayAbsent`] without a base URL and
    /// [`ShardError::Config`] if it does not parse.
    pub fn gateway_url(&self) -> Result<Url, ShardError> {
        let base = self.gateway_url.as_deref().ok_or(ShardError::GatewayAbsent)?;
        let mut url = Url::parse(base)
            .map_err(|e| ShardError::Config(format!("invalid gateway URL '{base}': {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .clear()
                .append_pair("v", &self.version)
                .append_pair("encoding", "json");
            if let Some(scheme) = &self.compress {
                query.append_pair("compress", scheme);
            }
        }

        Ok(url)
    }

    /// Pick a back-off for a non-resumable invalid session, uniformly
    /// within the configured range.
    pub(crate) fn invalid_session_delay(&self) -> Duration {
        let min = self.invalid_session_min.as_millis() as u64;
        let max = self.invalid_session_max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl fmt::Debug for ShardOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardOptions")
            .field("gateway_url", &self.gateway_url)
            .field("identify", &self.identify)
            .field("version", &self.version)
            .field("compress", &self.compress)
            .field("send_limit", &self.send_limit)
            .field("send_window", &self.send_window)
            .field("invalid_session_min", &self.invalid_session_min)
            .field("invalid_session_max", &self.invalid_session_max)
            .field("on_packet", &self.on_packet.is_some())
            .field("output", &self.output.is_some())
            .field("dispatch", &self.dispatch.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ShardOptions {
        ShardOptions::new("wss://gateway.example.com", Identify::new("token"))
    }

    #[test]
    fn defaults() {
        let opts = options();
        assert_eq!(opts.version, "10");
        assert_eq!(opts.send_limit, 120);
        assert_eq!(opts.send_window, Duration::from_secs(60));
        assert_eq!(opts.invalid_session_min, Duration::from_secs(1));
        assert_eq!(opts.invalid_session_max, Duration::from_secs(5));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn gateway_url_query() {
        let url = options().gateway_url().expect("url");
        assert_eq!(url.as_str(), "wss://gateway.example.com/?v=10&encoding=json");
    }

    #[test]
    fn gateway_url_with_compression() {
        let url = options()
            .with_version("9")
            .with_compress(ZSTD_STREAM)
            .gateway_url()
            .expect("url");
        assert_eq!(
            url.as_str(),
            "wss://gateway.example.com/?v=9&encoding=json&compress=zstd-stream"
        );
    }

    #[test]
    fn gateway_url_replaces_existing_query() {
        let mut opts = options();
        opts.gateway_url = Some("wss://gateway.example.com/?v=6".to_string());
        let url = opts.gateway_url().expect("url");
        assert_eq!(url.as_str(), "wss://gateway.example.com/?v=10&encoding=json");
    }

    #[test]
    fn missing_gateway_url() {
        let opts = ShardOptions::without_gateway(Identify::new("token"));
        assert!(opts.validate().is_ok());
        assert!(matches!(opts.gateway_url(), Err(ShardError::GatewayAbsent)));
    }

    #[test]
    fn invalid_gateway_url() {
        let mut opts = options();
        opts.gateway_url = Some("not a url".to_string());
        assert!(matches!(opts.validate(), Err(ShardError::Config(_))));
    }

    #[test]
    fn empty_token_is_rejected() {
        let opts = ShardOptions::new("wss://gateway.example.com", Identify::new(""));
        let err = opts.validate().expect_err("empty token");
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn zero_send_limit_is_rejected() {
        let opts = options().with_send_limit(0, Duration::from_secs(60));
        assert!(matches!(opts.validate(), Err(ShardError::Config(_))));
    }

    #[test]
    fn unknown_compression_is_rejected() {
        assert!(options().with_compress(ZSTD_STREAM).validate().is_ok());
        let err = options()
            .with_compress("zlib-stream")
            .validate()
            .expect_err("zlib");
        assert!(err.to_string().contains("zlib-stream"));
    }

    #[test]
    fn inverted_delay_range_is_rejected() {
        let opts =
            options().with_invalid_session_delay(Duration::from_secs(5), Duration::from_secs(1));
        assert!(matches!(opts.validate(), Err(ShardError::Config(_))));
    }

    #[test]
    fn invalid_session_delay_stays_in_range() {
        let opts = options();
        for _ in 0..100 {
            let delay = opts.invalid_session_delay();
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn line_sink_appends_newlines() {
        let sink = LineSink::new(Vec::new());
        sink.write_frame(br#"{"op":11}"#).expect("write");
        sink.write_frame(br#"{"op":1}"#).expect("write");
        assert_eq!(sink.into_inner(), b"{\"op\":11}\n{\"op\":1}\n".to_vec());
    }

    #[test]
    fn debug_hides_hooks_and_token() {
        let opts = ShardOptions::new("wss://gateway.example.com", Identify::new("s3cr3t"))
            .with_packet_hook(|_| Ok(()));
        let debug = format!("{opts:?}");
        assert!(debug.contains("on_packet: true"));
        assert!(!debug.contains("s3cr3t"));
    }
}
