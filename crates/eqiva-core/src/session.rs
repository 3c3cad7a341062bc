//! Session engine for one thermostat link.
//!
//! A [`Session`] owns a [`Transport`], serializes commands onto it and turns
//! the notification stream into a cached [`DeviceState`]. At most one command
//! is in flight: the next frame is written only after the previous one got
//! its response, timed out for good, or was cancelled.
//!
//! # State machine
//!
//! ```text
//!  Disconnected --connect--> Connecting --ok--> Idle <--> AwaitingResponse
//!        ^                        |               |              |
//!        +-------- error ---------+--- link lost / disconnect ---+
//! ```
//!
//! Frames that arrive while no command waits (or that do not match the
//! waiting command) still update the cache. Frames that fail to decode are
//! logged and dropped without touching it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use eqiva_types::{
    Command, DaySchedule, DeviceConfig, DeviceInfo, EffectiveMode, Mode, Notification,
    StatusFlags, StatusReport, Temperature, Vacation, Weekday, codec, decode, encode, uuids,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::events::{DisconnectReason, EventDispatcher, EventReceiver, SessionEvent};
use crate::retry::{RetryConfig, with_retry_if};
use crate::transport::{Transport, TransportEvent};
use crate::util::hex;

/// Default time to wait for a command's response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default bound on opening the link and subscribing.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Idle,
    AwaitingResponse,
}

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long each attempt waits for its response.
    pub response_timeout: Duration,
    /// Resend policy for unanswered commands.
    pub retry: RetryConfig,
    /// Bound on connect plus notification subscription.
    pub connect_timeout: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            retry: RetryConfig::for_command(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            event_capacity: 100,
        }
    }
}

impl SessionConfig {
    /// Set the per-attempt response timeout.
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the resend policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Everything the session has learned about the device.
///
/// Created empty when a session starts and cleared when it is closed.
/// Only decoded device frames change it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Last status frame.
    pub status: Option<StatusReport>,
    /// Last configuration block; survives shorter status frames.
    pub config: Option<DeviceConfig>,
    /// Firmware and serial, once paired.
    pub info: Option<DeviceInfo>,
    /// Day programs in device order (Saturday first), when known.
    pub schedules: [Option<DaySchedule>; 7],
    /// When the last status frame was applied.
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl DeviceState {
    pub fn mode(&self) -> Option<Mode> {
        self.status.as_ref().map(|s| s.mode)
    }

    pub fn effective_mode(&self) -> Option<EffectiveMode> {
        self.mode().map(|m| m.effective())
    }

    pub fn target(&self) -> Option<Temperature> {
        self.status.as_ref().map(|s| s.target)
    }

    /// Valve opening in percent.
    pub fn valve(&self) -> Option<u8> {
        self.status.as_ref().map(|s| s.valve)
    }

    pub fn flags(&self) -> Option<StatusFlags> {
        self.status.as_ref().map(|s| s.flags)
    }

    pub fn vacation(&self) -> Option<Vacation> {
        self.status.as_ref().and_then(|s| s.vacation)
    }

    /// Cached program for `day`.
    pub fn schedule(&self, day: Weekday) -> Option<&DaySchedule> {
        self.schedules[usize::from(day.as_byte())].as_ref()
    }

    fn set_schedule(&mut self, day: Weekday, schedule: DaySchedule) {
        self.schedules[usize::from(day.as_byte())] = Some(schedule);
    }

    fn apply(&mut self, notification: &Notification) {
        match notification {
            Notification::Status(report) => {
                if report.config.is_some() {
                    self.config = report.config;
                }
                self.status = Some(report.clone());
                self.updated_at = Some(OffsetDateTime::now_utc());
            }
            Notification::Schedule { day, schedule } => self.set_schedule(*day, schedule.clone()),
            Notification::DeviceInfo(info) => self.info = Some(info.clone()),
            _ => {}
        }
    }
}

/// Which response completes a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Status,
    ScheduleConfirmed(Weekday),
    Schedule(Weekday),
    Info,
    Nothing,
}

impl Expect {
    fn for_command(command: &Command) -> Self {
        match command {
            Command::Pair => Self::Info,
            Command::SetSchedule { day, .. } => Self::ScheduleConfirmed(*day),
            Command::RequestSchedule(day) => Self::Schedule(*day),
            Command::FactoryReset => Self::Nothing,
            _ => Self::Status,
        }
    }

    fn matches(self, notification: &Notification) -> bool {
        match (self, notification) {
            (Self::Status, Notification::Status(_)) => true,
            (Self::ScheduleConfirmed(want), Notification::ScheduleConfirmed(day)) => want == *day,
            (Self::Schedule(want), Notification::Schedule { day, .. }) => want == *day,
            (Self::Info, Notification::DeviceInfo(_)) => true,
            _ => false,
        }
    }

    /// Whether an undecodable frame carries the header this command waits for.
    fn claims(self, frame: &[u8]) -> bool {
        match self {
            Self::Status => frame.starts_with(&[codec::notify::REPLY, codec::notify::REPLY_STATUS]),
            Self::ScheduleConfirmed(_) => {
                frame.starts_with(&[codec::notify::REPLY, codec::notify::REPLY_SCHEDULE_SAVED])
            }
            Self::Schedule(_) => frame.first() == Some(&codec::notify::SCHEDULE),
            Self::Info => frame.first() == Some(&codec::notify::INFO),
            Self::Nothing => false,
        }
    }
}

struct Pending {
    id: u64,
    expect: Expect,
    reply: oneshot::Sender<Result<Notification>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the session and its notification task.
struct Shared {
    address: String,
    state: Mutex<DeviceState>,
    pending: Mutex<Option<Pending>>,
    phase: watch::Sender<SessionState>,
    events: EventDispatcher,
}

impl Shared {
    fn phase(&self) -> SessionState {
        *self.phase.borrow()
    }

    /// Move from `from` to `to`; no-op if the session is elsewhere.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase == from {
                *phase = to;
                true
            } else {
                false
            }
        })
    }

    fn fail_pending(&self, err: Error) {
        if let Some(pending) = lock(&self.pending).take() {
            let _ = pending.reply.send(Err(err));
        }
    }

    fn handle_frame(&self, frame: &[u8]) {
        debug!("<<< {}: {}", self.address, hex(frame));
        match decode(frame) {
            Ok(notification) => {
                lock(&self.state).apply(&notification);
                self.publish(&notification);
                let mut slot = lock(&self.pending);
                if let Some(pending) = slot.take_if(|p| p.expect.matches(&notification)) {
                    let _ = pending.reply.send(Ok(notification));
                }
            }
            Err(err) => {
                warn!("Dropping malformed frame from {} ({}): {}", self.address, hex(frame), err);
                self.events.send(SessionEvent::DecodeFailed {
                    address: self.address.clone(),
                    error: err.to_string(),
                });
                let mut slot = lock(&self.pending);
                if let Some(pending) = slot.take_if(|p| p.expect.claims(frame)) {
                    let _ = pending.reply.send(Err(Error::Decoding(err)));
                }
            }
        }
    }

    fn publish(&self, notification: &Notification) {
        let address = self.address.clone();
        let event = match notification {
            Notification::Status(report) => SessionEvent::Status {
                address,
                report: report.clone(),
            },
            Notification::Schedule { day, .. } | Notification::ScheduleConfirmed(day) => {
                SessionEvent::Schedule { address, day: *day }
            }
            Notification::Unrecognized { opcode, payload } => {
                debug!("Ignoring frame with unknown opcode 0x{:02x}", opcode);
                SessionEvent::Unrecognized {
                    address,
                    opcode: *opcode,
                    payload: payload.clone(),
                }
            }
            _ => return,
        };
        self.events.send(event);
    }

    fn link_lost(&self) {
        let was = self.phase.send_replace(SessionState::Disconnected);
        if was == SessionState::Disconnected {
            return;
        }
        warn!("Link to {} lost", self.address);
        self.fail_pending(Error::connection_failed(
            Some(self.address.clone()),
            ConnectionFailureReason::LinkLost,
        ));
        self.events.send(SessionEvent::Disconnected {
            address: self.address.clone(),
            reason: DisconnectReason::LinkLost,
        });
    }
}

/// Clears the pending slot when an attempt ends, however it ends.
struct SlotGuard<'a> {
    shared: &'a Shared,
    id: Option<u64>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            let _ = lock(&self.shared.pending).take_if(|p| p.id == id);
        }
        self.shared
            .transition(SessionState::AwaitingResponse, SessionState::Idle);
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

async fn pump(shared: Arc<Shared>, mut rx: mpsc::Receiver<TransportEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            event = rx.recv() => event,
        };
        match event {
            Some(TransportEvent::Notification(frame)) => shared.handle_frame(&frame),
            Some(TransportEvent::Disconnected) | None => {
                shared.link_lost();
                return;
            }
        }
    }
}

/// One logical connection to one thermostat.
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    shared: Arc<Shared>,
    /// Held for the whole life of a command; tokio grants it in FIFO order.
    commands: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
    worker: Mutex<Option<Worker>>,
}

impl<T: Transport> Session<T> {
    /// Wrap a transport. Nothing is sent until [`Session::connect`].
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let shared = Shared {
            address: transport.address().to_string(),
            state: Mutex::new(DeviceState::default()),
            pending: Mutex::new(None),
            phase: watch::channel(SessionState::Disconnected).0,
            events: EventDispatcher::new(config.event_capacity),
        };
        Self {
            transport,
            config,
            shared: Arc::new(shared),
            commands: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(0),
            worker: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.shared.address
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn phase(&self) -> SessionState {
        self.shared.phase()
    }

    /// Watch lifecycle transitions.
    pub fn watch_phase(&self) -> watch::Receiver<SessionState> {
        self.shared.phase.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.phase(),
            SessionState::Idle | SessionState::AwaitingResponse
        )
    }

    /// Snapshot of the cached device state.
    pub fn state(&self) -> DeviceState {
        lock(&self.shared.state).clone()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// Open the link and subscribe to notifications.
    ///
    /// Connecting an open session is a no-op.
    #[tracing::instrument(level = "info", skip_all, fields(address = %self.address()))]
    pub async fn connect(&self) -> Result<()> {
        let mut current = SessionState::Disconnected;
        self.shared.phase.send_if_modified(|phase| {
            current = *phase;
            if *phase == SessionState::Disconnected {
                *phase = SessionState::Connecting;
                true
            } else {
                false
            }
        });
        match current {
            SessionState::Disconnected => {}
            SessionState::Connecting => {
                return Err(Error::connection_failed(
                    Some(self.address().to_string()),
                    ConnectionFailureReason::Other("connection already in progress".to_string()),
                ));
            }
            SessionState::Idle | SessionState::AwaitingResponse => return Ok(()),
        }

        let opened = tokio::time::timeout(self.config.connect_timeout, self.open_link())
            .await
            .unwrap_or_else(|_| {
                Err(Error::connection_failed(
                    Some(self.address().to_string()),
                    ConnectionFailureReason::Timeout,
                ))
            });
        let rx = match opened {
            Ok(rx) => rx,
            Err(e) => {
                self.shared.phase.send_replace(SessionState::Disconnected);
                if let Err(cleanup) = self.transport.disconnect().await {
                    debug!("Cleanup after failed connect: {}", cleanup);
                }
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pump(Arc::clone(&self.shared), rx, cancel.clone()));
        if let Some(old) = lock(&self.worker).replace(Worker { cancel, handle }) {
            old.cancel.cancel();
        }

        self.shared.phase.send_replace(SessionState::Idle);
        info!("Session open");
        self.shared.events.send(SessionEvent::Connected {
            address: self.address().to_string(),
        });
        Ok(())
    }

    async fn open_link(&self) -> Result<mpsc::Receiver<TransportEvent>> {
        self.transport.connect().await?;
        self.transport.subscribe(uuids::NOTIFY).await
    }

    /// Close the link.
    ///
    /// A command waiting for its response fails with [`Error::NotConnected`].
    /// The cached state is discarded.
    #[tracing::instrument(level = "info", skip_all, fields(address = %self.address()))]
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(worker) = lock(&self.worker).take() {
            worker.cancel.cancel();
        }
        let was = self.shared.phase.send_replace(SessionState::Disconnected);
        self.shared.fail_pending(Error::NotConnected);
        *lock(&self.shared.state) = DeviceState::default();

        let result = self.transport.disconnect().await;
        if was != SessionState::Disconnected {
            info!("Session closed");
            self.shared.events.send(SessionEvent::Disconnected {
                address: self.address().to_string(),
                reason: DisconnectReason::UserRequested,
            });
        }
        result
    }

    /// Send one command and wait for the response that completes it.
    ///
    /// The frame is encoded before anything touches the link, so invalid
    /// input fails with [`Error::Encoding`] and nothing is written. An
    /// unanswered command is resent per [`SessionConfig::retry`] and then
    /// fails with [`Error::CommandTimeout`]; the session stays open.
    ///
    /// Returns `None` for commands the device never answers.
    pub async fn send(&self, command: &Command) -> Result<Option<Notification>> {
        let frame = encode(command)?;
        let expect = Expect::for_command(command);
        let name = command.name();

        let _turn = self.commands.lock().await;
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let result = with_retry_if(
            &self.config.retry,
            name,
            |e| matches!(e, Error::CommandTimeout { .. }),
            || self.attempt(name, &frame, expect),
        )
        .await;

        match result {
            Ok(reply) => {
                if let (Command::SetSchedule { day, schedule }, Some(Notification::ScheduleConfirmed(_))) =
                    (command, &reply)
                {
                    lock(&self.shared.state).set_schedule(*day, schedule.clone());
                }
                Ok(reply)
            }
            Err(Error::CommandTimeout { command, timeout, .. }) => {
                warn!("{} to {} went unanswered", command, self.address());
                Err(Error::CommandTimeout {
                    command,
                    timeout,
                    attempts: self.config.retry.attempts(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn attempt(
        &self,
        name: &'static str,
        frame: &[u8],
        expect: Expect,
    ) -> Result<Option<Notification>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        // Armed before writing: the reply may beat the write acknowledgement.
        let reply = (expect != Expect::Nothing).then(|| {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            *lock(&self.shared.pending) = Some(Pending {
                id,
                expect,
                reply: tx,
            });
            (id, rx)
        });
        let _slot = SlotGuard {
            shared: &self.shared,
            id: reply.as_ref().map(|(id, _)| *id),
        };
        self.shared
            .transition(SessionState::Idle, SessionState::AwaitingResponse);

        debug!(">>> {}: {}", self.address(), hex(frame));
        self.transport.write(uuids::REQUEST, frame).await?;

        let Some((_, rx)) = reply else {
            return Ok(None);
        };
        match tokio::time::timeout(self.config.response_timeout, rx).await {
            Ok(Ok(outcome)) => outcome.map(Some),
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => {
                debug!("{} got no response within {:?}", name, self.config.response_timeout);
                Err(Error::CommandTimeout {
                    command: name,
                    timeout: self.config.response_timeout,
                    attempts: 1,
                })
            }
        }
    }

    /// Read a plain GATT characteristic, in turn with queued commands.
    pub async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let _turn = self.commands.lock().await;
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.transport.read(characteristic).await
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Some(worker) = lock(&self.worker).take() {
            worker.cancel.cancel();
            worker.handle.abort();
        }
    }
}
