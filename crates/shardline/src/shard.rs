//! The gateway shard.
//!
//! A shard owns one session with the gateway. [`Shard::open`] runs connection
//! attempts back to back until one fails in a way that cannot be recovered:
//!
//! 1. dial and wait for hello, which starts the heartbeat watchdog
//! 2. identify (fresh session, then wait for `READY`) or resume
//! 3. read and handle packets until the connection fails
//!
//! The session id and sequence survive between attempts, so every reconnect
//! after the first `READY` resumes instead of identifying.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use shardline_proto::{
    CloseCode, GatewayOp, Hello, InvalidSession, ProtoError, ReceivePacket, Ready, Resumed,
    SendPacket, EVENT_READY, EVENT_RESUMED,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::connection::{self, FrameReader, FrameWriter};
use crate::error::{CloseReason, ShardError};
use crate::events::DispatchEvent;
use crate::heartbeat::{spawn_watchdog, Pulse};
use crate::limiter::Limiter;
use crate::options::ShardOptions;
use crate::pool::PacketPool;
use crate::session::Session;
use crate::state::{AtomicShardState, ShardState};

/// Close code sent when the shard closes a connection it intends to resume.
const RESUMABLE_CLOSE: CloseCode = CloseCode::UNKNOWN_ERROR;

/// Handle on one connection attempt.
///
/// Lets whoever notices a reason to close end the attempt's read, and tells
/// writers whether the attempt is still the one holding the socket.
#[derive(Debug)]
struct Closer {
    token: CancellationToken,
    reason: Mutex<Option<CloseReason>>,
    /// Cancelled once the attempt is over; also stops its watchdog.
    stop: CancellationToken,
}

impl Closer {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Mutex::new(None),
            stop: CancellationToken::new(),
        }
    }

    /// Whether the attempt has ended. Its writes must not reach the socket
    /// of a later attempt.
    fn ended(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Record the reason (first one wins) and wake the read loop.
    fn close(&self, reason: CloseReason) {
        self.reason.lock().get_or_insert(reason);
        self.token.cancel();
    }

    async fn closed(&self) -> CloseReason {
        self.token.cancelled().await;
        let reason = *self.reason.lock();
        reason.unwrap_or(CloseReason::Requested)
    }
}

/// Per-attempt state owned by the read loop.
struct Attempt {
    reader: FrameReader,
    closer: Arc<Closer>,
    acks: mpsc::Sender<()>,
    /// Handed to the watchdog when hello arrives.
    pending_acks: Option<mpsc::Receiver<()>>,
}

/// Which packet the handshake requires next.
#[derive(Debug, Clone, Copy)]
enum Expect {
    Any,
    Op(GatewayOp),
    Event(&'static str),
}

impl Expect {
    fn check(self, packet: &ReceivePacket) -> Result<(), ShardError> {
        match self {
            Self::Any => Ok(()),
            Self::Op(op) if packet.op != op => Err(ShardError::UnexpectedOp {
                expected: op,
                actual: packet.op,
            }),
            Self::Op(_) => Ok(()),
            Self::Event(event) => {
                if packet.op != GatewayOp::Dispatch {
                    return Err(ShardError::UnexpectedOp {
                        expected: GatewayOp::Dispatch,
                        actual: packet.op,
                    });
                }
                if packet.event != event {
                    return Err(ShardError::UnexpectedEvent {
                        expected: event,
                        actual: packet.event.clone(),
                    });
                }
                Ok(())
            }
        }
    }
}

struct Inner {
    opts: ShardOptions,
    limiter: Limiter,
    packets: PacketPool,
    session: Session,
    state: AtomicShardState,
    opening: AtomicBool,
    /// Set by `close` while no attempt is registered.
    close_pending: AtomicBool,
    writer: tokio::sync::Mutex<Option<FrameWriter>>,
    closer: Mutex<Option<Arc<Closer>>>,
}

/// Releases `open` however it ends, including when its future is dropped.
struct OpenGuard<'a>(&'a Inner);

impl Drop for OpenGuard<'_> {
    fn drop(&mut self) {
        self.0.close_pending.store(false, Ordering::SeqCst);
        self.0.state.store(ShardState::Closed);
        self.0.opening.store(false, Ordering::SeqCst);
    }
}

/// Ends a connection attempt however `connect` exits: stops the watchdog,
/// fences off late writes and unregisters the attempt.
struct AttemptGuard<'a> {
    inner: &'a Inner,
    closer: Arc<Closer>,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.closer.stop.cancel();

        let mut slot = self.inner.closer.lock();
        if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, &self.closer)) {
            slot.take();
        }
        drop(slot);

        // Best effort; `connect` also clears the slot on its normal path.
        if let Ok(mut writer) = self.inner.writer.try_lock() {
            writer.take();
        }
    }
}

/// A gateway shard.
///
/// Cloning is cheap and every clone drives the same shard, so one task can
/// sit in [`Shard::open`] while others send packets or close it.
#[derive(Clone)]
pub struct Shard {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .field("sequence", &self.sequence())
            .finish_non_exhaustive()
    }
}

impl Shard {
    /// Create a shard.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid.
    pub fn new(opts: ShardOptions) -> Result<Self, ShardError> {
        opts.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                limiter: Limiter::new(opts.send_limit, opts.send_window),
                opts,
                packets: PacketPool::default(),
                session: Session::new(),
                state: AtomicShardState::new(ShardState::Disconnected),
                opening: AtomicBool::new(false),
                close_pending: AtomicBool::new(false),
                writer: tokio::sync::Mutex::new(None),
                closer: Mutex::new(None),
            }),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ShardState {
        self.inner.state.load()
    }

    /// Session id from the last `READY`; empty before the first one.
    #[must_use]
    pub fn session_id(&self) -> String {
        self.inner.session.id()
    }

    /// Last dispatch sequence number seen.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.inner.session.sequence()
    }

    /// Forget the session so the next connection identifies from scratch.
    pub fn reset_session(&self) {
        self.inner.session.reset();
    }

    /// Run the shard until the session cannot be recovered.
    ///
    /// Recoverable failures reconnect immediately. Returns `Ok(())` once
    /// [`Shard::close`] ends the session.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the last connection attempt.
    pub async fn open(&self) -> Result<(), ShardError> {
        if self.inner.opening.swap(true, Ordering::SeqCst) {
            return Err(ShardError::AlreadyOpen);
        }
        let _open = OpenGuard(&self.inner);

        let err = loop {
            let err = self.connect().await;
            if !self.handle_close(&err) {
                break err;
            }
        };

        match err {
            ShardError::Closed(CloseReason::Requested) => Ok(()),
            err => Err(err),
        }
    }

    /// Close the current connection and stop reconnecting.
    ///
    /// Called while `open` is between connection attempts, it stops `open`
    /// before the next attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::NotConnected`] if the shard is not open.
    pub async fn close(&self) -> Result<(), ShardError> {
        self.close_with_reason(CloseReason::Requested).await
    }

    /// Close the current connection, logging `reason`. Whether the shard then
    /// reconnects depends on the reason.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::NotConnected`] if no connection attempt is running.
    pub async fn close_with_reason(&self, reason: CloseReason) -> Result<(), ShardError> {
        let closer = {
            let slot = self.inner.closer.lock();
            match slot.as_ref() {
                Some(closer) => Arc::clone(closer),
                None if reason == CloseReason::Requested
                    && self.inner.opening.load(Ordering::SeqCst) =>
                {
                    // Picked up by `connect` under the same lock.
                    self.inner.close_pending.store(true, Ordering::SeqCst);
                    debug!("close requested between connection attempts");
                    return Ok(());
                }
                None => return Err(ShardError::NotConnected),
            }
        };
        self.close_attempt(&closer, reason).await;
        Ok(())
    }

    /// Encode and send a packet, waiting for a send slot first.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded, no connection is
    /// open, or the write fails.
    pub async fn send_packet<T: Serialize>(&self, op: GatewayOp, data: T) -> Result<(), ShardError> {
        let closer = self.inner.closer.lock().clone();
        let closer = closer.ok_or(ShardError::NotConnected)?;
        self.send_on(&closer, op, data).await
    }

    /// Send on the connection owned by `attempt`, refusing once it has ended.
    async fn send_on<T: Serialize>(
        &self,
        attempt: &Closer,
        op: GatewayOp,
        data: T,
    ) -> Result<(), ShardError> {
        let frame = SendPacket::new(op, data).encode()?;
        debug!(op = %op, "sending packet");

        // Wait for the limiter before taking the write lock so other senders
        // are not held up behind us.
        self.inner.limiter.acquire().await;
        if attempt.ended() {
            return Err(ShardError::NotConnected);
        }

        let mut writer = self.inner.writer.lock().await;
        // The slot may hold the next attempt's writer by now.
        if attempt.ended() {
            return Err(ShardError::NotConnected);
        }
        let writer = writer.as_mut().ok_or(ShardError::NotConnected)?;
        writer.write(frame).await
    }

    // TODO: identify needs its own 1-per-5s limit on top of the send limiter
    // once several shards share a process.
    async fn send_identify(&self, attempt: &Closer) -> Result<(), ShardError> {
        self.send_on(attempt, GatewayOp::Identify, &self.inner.opts.identify)
            .await
    }

    async fn send_resume(&self, attempt: &Closer) -> Result<(), ShardError> {
        let resume = self.inner.session.resume(&self.inner.opts.identify.token);
        self.send_on(attempt, GatewayOp::Resume, &resume).await
    }

    async fn send_heartbeat(&self, attempt: &Closer) -> Result<(), ShardError> {
        self.send_on(attempt, GatewayOp::Heartbeat, self.inner.session.sequence())
            .await
    }

    fn set_state(&self, state: ShardState) {
        trace!(state = %state, "shard state changed");
        self.inner.state.store(state);
    }

    /// Run one connection attempt and return the error that ended it.
    async fn connect(&self) -> ShardError {
        self.set_state(ShardState::Connecting);
        if self.inner.close_pending.swap(false, Ordering::SeqCst) {
            return ShardError::Closed(CloseReason::Requested);
        }

        let url = match self.inner.opts.gateway_url() {
            Ok(url) => url,
            Err(e) => return e,
        };
        info!(url = %url, "connecting to gateway");

        let inflate = self.inner.opts.compress.is_some();
        let (reader, writer) = match connection::dial(url.as_str(), inflate).await {
            Ok(halves) => halves,
            Err(e) => return e,
        };
        *self.inner.writer.lock().await = Some(writer);

        let closer = Arc::new(Closer::new());
        let close_pending = {
            let mut slot = self.inner.closer.lock();
            *slot = Some(Arc::clone(&closer));
            self.inner.close_pending.swap(false, Ordering::SeqCst)
        };
        let guard = AttemptGuard {
            inner: &self.inner,
            closer: Arc::clone(&closer),
        };

        if close_pending {
            self.close_attempt(&closer, CloseReason::Requested).await;
        }

        let (acks, pending_acks) = mpsc::channel(1);
        let mut attempt = Attempt {
            reader,
            closer,
            acks,
            pending_acks: Some(pending_acks),
        };

        let err = match self.run(&mut attempt).await {
            Ok(()) => ShardError::ConnectionLost("read loop ended".to_string()),
            Err(e) => e,
        };

        drop(guard);
        self.inner.writer.lock().await.take();
        err
    }

    /// Handshake, then read until something fails.
    async fn run(&self, attempt: &mut Attempt) -> Result<(), ShardError> {
        self.set_state(ShardState::AwaitingHello);
        self.read_packet(attempt, Expect::Op(GatewayOp::Hello)).await?;

        if self.inner.session.is_fresh() {
            self.set_state(ShardState::Identifying);
            self.send_identify(&attempt.closer).await?;
            debug!("sent identify upon connecting");

            self.read_packet(attempt, Expect::Event(EVENT_READY)).await?;
            info!(session_id = %self.inner.session.id(), "received ready event");
        } else {
            self.set_state(ShardState::Resuming);
            self.send_resume(&attempt.closer).await?;
            debug!(
                session_id = %self.inner.session.id(),
                seq = self.inner.session.sequence(),
                "sent resume upon connecting"
            );
        }

        self.set_state(ShardState::Connected);
        debug!("beginning normal message consumption");
        loop {
            self.read_packet(attempt, Expect::Any).await?;
        }
    }

    /// Read one frame and run it through the packet pipeline.
    async fn read_packet(&self, attempt: &mut Attempt, expect: Expect) -> Result<(), ShardError> {
        let frame = tokio::select! {
            biased;
            reason = attempt.closer.closed() => return Err(ShardError::Closed(reason)),
            frame = attempt.reader.read() => frame?,
        };

        let mut packet = self.inner.packets.acquire();
        packet.decode_into(frame.as_bytes())?;
        debug!(op = %packet.op, event = %packet.event, seq = ?packet.seq, "received packet");

        expect.check(&packet)?;

        if let Some(hook) = &self.inner.opts.on_packet {
            hook(&*packet).map_err(ShardError::Hook)?;
        }

        if let Some(output) = &self.inner.opts.output {
            output.write_frame(frame.as_bytes()).map_err(ShardError::Output)?;
        }

        self.handle_packet(attempt, &packet).await
    }

    /// Route a packet by op code.
    async fn handle_packet(&self, attempt: &mut Attempt, packet: &ReceivePacket) -> Result<(), ShardError> {
        match packet.op {
            GatewayOp::Dispatch => self.handle_dispatch(packet).await?,

            GatewayOp::Heartbeat => self.send_heartbeat(&attempt.closer).await?,

            GatewayOp::Reconnect => {
                self.close_attempt(&attempt.closer, CloseReason::ReconnectRequested)
                    .await;
            }

            GatewayOp::InvalidSession => {
                let flag: InvalidSession = packet.payload()?;
                if flag.resumable() {
                    self.send_resume(&attempt.closer).await?;
                    debug!("sent resume in response to invalid resumable session");
                } else {
                    let delay = self.inner.opts.invalid_session_delay();
                    debug!(delay_ms = delay.as_millis() as u64, "session invalidated, re-identifying");
                    tokio::time::sleep(delay).await;
                    self.send_identify(&attempt.closer).await?;
                    debug!("sent identify in response to invalid non-resumable session");
                }
            }

            GatewayOp::HeartbeatAck => {
                if attempt.acks.try_send(()).is_err() {
                    trace!("heartbeat ack absorbed");
                }
            }

            GatewayOp::Hello => self.handle_hello(attempt, packet)?,

            op => debug!(op = %op, "ignoring packet"),
        }

        Ok(())
    }

    /// Start the watchdog at the interval hello asks for.
    fn handle_hello(&self, attempt: &mut Attempt, packet: &ReceivePacket) -> Result<(), ShardError> {
        let hello: Hello = packet.payload()?;
        log_trace("hello", &hello.trace);
        if hello.heartbeat_interval == 0 {
            return Err(ProtoError::Decoding(
                "hello carried a zero heartbeat interval".to_string(),
            )
            .into());
        }

        let Some(acks) = attempt.pending_acks.take() else {
            warn!("ignoring repeated hello");
            return Ok(());
        };

        let pulse = AttemptPulse {
            shard: self.clone(),
            closer: Arc::clone(&attempt.closer),
        };
        spawn_watchdog(pulse, hello.interval(), acks, attempt.closer.stop.clone());
        Ok(())
    }

    /// Update the session from dispatches the shard cares about, then hand
    /// the event to the owner.
    async fn handle_dispatch(&self, packet: &ReceivePacket) -> Result<(), ShardError> {
        if let Some(seq) = packet.seq {
            self.inner.session.observe(seq);
        }

        match packet.event.as_str() {
            EVENT_READY => {
                let ready: Ready = packet.payload()?;
                self.inner.session.set_id(ready.session_id);
                debug!(version = ready.version, "using gateway version");
                log_trace("ready", &ready.trace);
            }
            EVENT_RESUMED => {
                let resumed: Resumed = packet.payload()?;
                info!(seq = self.inner.session.sequence(), "session resumed");
                log_trace("resumed", &resumed.trace);
            }
            _ => {}
        }

        if let Some(tx) = &self.inner.opts.dispatch {
            if tx.send(DispatchEvent::from(packet)).await.is_err() {
                warn!(event = %packet.event, "dispatch receiver dropped");
            }
        }

        Ok(())
    }

    /// Send a close frame and end the attempt's read loop.
    async fn close_attempt(&self, closer: &Closer, reason: CloseReason) {
        warn!(reason = %reason, "closing connection");

        {
            let mut writer = self.inner.writer.lock().await;
            match writer.as_mut() {
                Some(writer) if !closer.ended() => {
                    if let Err(e) = writer.close(RESUMABLE_CLOSE, &reason.to_string()).await {
                        debug!(error = %e, "failed to send close frame");
                    }
                }
                _ => debug!("connection already gone, not sending close frame"),
            }
        }

        closer.close(reason);
    }

    /// Decide whether `open` should reconnect after `err`.
    fn handle_close(&self, err: &ShardError) -> bool {
        let recoverable = err.is_recoverable();
        if recoverable {
            error!(error = %err, "received recoverable close: reconnecting");
        } else if matches!(err, ShardError::Closed(CloseReason::Requested)) {
            info!("cleanly closed connection");
        } else {
            error!(error = %err, "received unrecoverable close");
        }
        recoverable
    }
}

/// The watchdog's view of one connection attempt.
struct AttemptPulse {
    shard: Shard,
    closer: Arc<Closer>,
}

impl Pulse for AttemptPulse {
    async fn beat(&self) -> Result<(), ShardError> {
        self.shard.send_heartbeat(&self.closer).await
    }

    async fn flatline(&self) {
        self.shard
            .close_attempt(&self.closer, CloseReason::HeartbeatUnacknowledged)
            .await;
    }
}

fn log_trace(stage: &str, trace: &[String]) {
    if !trace.is_empty() {
        debug!(stage, trace = ?trace, "gateway trace");
    }
}
