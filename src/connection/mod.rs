//! Per-device connection state management.
//!
//! Every mesh device is battery powered and reachable only over a lossy
//! half-duplex radio link, so the controller cannot simply "open" a
//! connection. Instead it registers itself as a listener on the device and
//! keeps that registration alive:
//!
//! - a `connect` request schedules a registration send after a jittered
//!   first-attempt delay (so a whole house of devices does not retry in
//!   lock-step after a power event),
//! - an unanswered registration is retried forever with capped exponential
//!   backoff,
//! - an acknowledged registration becomes a lease that is renewed ahead of
//!   expiry; a missed renewal ack reports the device as disconnected.
//!
//! Reconnecting after a lost lease is deliberately left to the caller: the
//! machine reports the loss and stays down until `connect` is called again.

pub mod machine;

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use bytes::Bytes;

use crate::protocol::{Command, Envelope};
use crate::scheduler::{CancelToken, JitterSource, Scheduler, TimerHandle};
use crate::transport::Transport;
use crate::types::DeviceAddress;

pub use machine::{Action, Input, State};

/// Timing tunables for the connection engine. All durations.
#[derive(Debug, Clone, Copy)]
pub struct ConnectConfig {
    /// Base delay before the very first registration attempt.
    pub first_attempt_delay: Duration,
    /// Upper bound of the uniform jitter added to the first attempt.
    pub first_attempt_jitter: Duration,
    /// Delay before the second attempt; doubles per consecutive failure.
    pub attempt_delay: Duration,
    /// Cap for the doubled attempt delay.
    pub max_attempt_delay: Duration,
    /// How long to wait for a registration ack before declaring a timeout.
    pub register_timeout: Duration,
    /// Renewal interval once connected; shorter than the device's lease
    /// window so the registration never lapses on a healthy link.
    pub lease: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            first_attempt_delay: Duration::from_secs(5),
            first_attempt_jitter: Duration::from_secs(5),
            attempt_delay: Duration::from_secs(10),
            max_attempt_delay: Duration::from_secs(60 * 60),
            register_timeout: Duration::from_secs(5),
            lease: Duration::from_secs(5 * 60),
        }
    }
}

/// Callback invoked on connected/disconnected edges.
///
/// Receives the device address and the new connected flag. Listeners are
/// invoked in registration order, outside the machine lock, so they may
/// call back into the [`ConnectionState`].
pub type ConnectionListener = Arc<dyn Fn(&DeviceAddress, bool) + Send + Sync>;

struct Machine {
    state: State,
    attempt_delay: Duration,
    next_attempt_delay: Duration,
    attempt_timer: Option<TimerHandle>,
    timeout_timer: Option<TimerHandle>,
}

struct Shared {
    address: DeviceAddress,
    config: ConnectConfig,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    jitter: Arc<dyn JitterSource>,
    machine: Mutex<Machine>,
    listeners: Mutex<Vec<ConnectionListener>>,
}

/// Connection state machine for one device.
///
/// Cloning yields another handle to the same per-device machine. All event
/// application is serialized through an internal mutex; timer callbacks,
/// inbound acks and external `connect`/`disconnect` calls may arrive from
/// any thread.
#[derive(Clone)]
pub struct ConnectionState {
    shared: Arc<Shared>,
}

impl ConnectionState {
    /// Creates a new, disconnected machine for `address`.
    ///
    /// The scheduler and jitter source are injected so tests can substitute
    /// a virtual clock and a fixed jitter sequence.
    #[must_use]
    pub fn new(
        address: DeviceAddress,
        config: ConnectConfig,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
        jitter: Arc<dyn JitterSource>,
    ) -> Self {
        let machine = Machine {
            state: State::Disconnected,
            attempt_delay: config.first_attempt_delay,
            next_attempt_delay: config.attempt_delay,
            attempt_timer: None,
            timeout_timer: None,
        };
        Self {
            shared: Arc::new(Shared {
                address,
                config,
                transport,
                scheduler,
                jitter,
                machine: Mutex::new(machine),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the device address this machine manages.
    #[must_use]
    pub fn address(&self) -> &DeviceAddress {
        &self.shared.address
    }

    /// Starts connecting to the device.
    ///
    /// Schedules a registration send after the jittered first-attempt
    /// delay. A no-op unless the machine is disconnected.
    pub fn connect(&self) {
        Shared::apply(&self.shared, Input::Connect);
    }

    /// Stops the connection.
    ///
    /// From the connected state this first sends a best-effort
    /// remove-listener request; in any case all pending timers are
    /// cancelled and no further registration traffic is produced.
    pub fn disconnect(&self) {
        Shared::apply(&self.shared, Input::Disconnect);
    }

    /// Delivers a registration acknowledgment from the device.
    ///
    /// Invoked by the registry when a `Response|AddListener` frame arrives.
    pub fn connect_response(&self) {
        Shared::apply(&self.shared, Input::ConnectResponse);
    }

    /// Returns true if the registration lease is currently active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == State::Connected
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.shared.machine.lock().expect("machine lock").state
    }

    /// Registers a callback for connected/disconnected edges.
    ///
    /// Listeners fire once per edge: steady-state lease renewals do not
    /// re-notify. Delivery order is registration order.
    pub fn on_connection_changed(
        &self,
        listener: impl Fn(&DeviceAddress, bool) + Send + Sync + 'static,
    ) {
        self.shared
            .listeners
            .lock()
            .expect("listeners lock")
            .push(Arc::new(listener));
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("address", &self.shared.address)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Applies an input to the machine and runs the resulting actions.
    fn apply(shared: &Arc<Self>, input: Input) {
        let notify = {
            let mut m = shared.machine.lock().expect("machine lock");
            Self::dispatch(shared, &mut m, input)
        };
        if let Some(connected) = notify {
            shared.notify_listeners(connected);
        }
    }

    /// Transitions the machine under the lock. Returns the listener
    /// notification to deliver after the lock is released, if any.
    fn dispatch(shared: &Arc<Self>, m: &mut Machine, input: Input) -> Option<bool> {
        let (next, actions) = machine::transition(m.state, input);
        if actions.is_empty() {
            tracing::debug!(
                "device {}: {:?} ignored in state {:?}",
                shared.address,
                input,
                m.state
            );
            m.state = next;
            return None;
        }

        tracing::debug!(
            "device {}: {:?} in state {:?} -> {:?}",
            shared.address,
            input,
            m.state,
            next
        );
        m.state = next;

        let mut notify = None;
        for action in actions {
            match action {
                Action::PrimeFirstAttempt => {
                    m.attempt_delay = shared.config.first_attempt_delay
                        + shared.jitter.uniform(shared.config.first_attempt_jitter);
                    m.next_attempt_delay = shared.config.attempt_delay;
                    Self::schedule_attempt(shared, m);
                }
                Action::Backoff => {
                    m.attempt_delay = m.next_attempt_delay;
                    m.next_attempt_delay =
                        (m.next_attempt_delay * 2).min(shared.config.max_attempt_delay);
                    Self::schedule_attempt(shared, m);
                }
                Action::EnterConnected => {
                    Self::cancel_timeout(m);
                    m.attempt_delay = shared.config.lease;
                    m.next_attempt_delay = shared.config.attempt_delay;
                    Self::schedule_attempt(shared, m);
                    notify = Some(true);
                }
                Action::RenewLease => {
                    tracing::debug!("device {}: registration renewed", shared.address);
                    Self::cancel_timeout(m);
                    Self::schedule_attempt(shared, m);
                }
                Action::CancelPending => {
                    Self::cancel_attempt(m);
                    Self::cancel_timeout(m);
                }
                Action::Unregister => {
                    shared.send_command(Command::RemoveListener);
                }
                Action::DropConnection => {
                    tracing::debug!("device {}: registration lost", shared.address);
                    Self::cancel_attempt(m);
                    Self::cancel_timeout(m);
                    notify = Some(false);
                }
            }
        }
        notify
    }

    /// Schedules the next registration send after `attempt_delay`.
    ///
    /// Invariant: at most one attempt timer is outstanding per device.
    fn schedule_attempt(shared: &Arc<Self>, m: &mut Machine) {
        Self::cancel_attempt(m);
        tracing::debug!(
            "device {}: registration send in {:?}",
            shared.address,
            m.attempt_delay
        );
        let weak = Arc::downgrade(shared);
        let handle = shared.scheduler.after(
            m.attempt_delay,
            Box::new(move |token| {
                if let Some(shared) = weak.upgrade() {
                    Self::registration_due(&shared, token);
                }
            }),
        );
        m.attempt_timer = Some(handle);
    }

    /// Attempt timer fired: send the registration request and arm the
    /// response timeout.
    fn registration_due(shared: &Arc<Self>, token: &CancelToken) {
        let mut m = shared.machine.lock().expect("machine lock");
        // A cancellation that raced the timer wins once we hold the lock.
        if token.is_cancelled() {
            return;
        }
        if !matches!(m.state, State::AwaitingConnection | State::Connected) {
            return;
        }
        m.attempt_timer = None;

        tracing::debug!("device {}: sending registration request", shared.address);
        shared.send_command(Command::AddListener);

        Self::cancel_timeout(&mut m);
        let weak = Arc::downgrade(shared);
        let handle = shared.scheduler.after(
            shared.config.register_timeout,
            Box::new(move |token| {
                if let Some(shared) = weak.upgrade() {
                    Self::timeout_fired(&shared, token);
                }
            }),
        );
        m.timeout_timer = Some(handle);
    }

    /// Timeout timer fired: no ack arrived inside the window.
    fn timeout_fired(shared: &Arc<Self>, token: &CancelToken) {
        let notify = {
            let mut m = shared.machine.lock().expect("machine lock");
            if token.is_cancelled() {
                return;
            }
            m.timeout_timer = None;
            tracing::debug!("device {}: registration timed out", shared.address);
            Self::dispatch(shared, &mut m, Input::Timeout)
        };
        if let Some(connected) = notify {
            shared.notify_listeners(connected);
        }
    }

    fn cancel_attempt(m: &mut Machine) {
        if let Some(timer) = m.attempt_timer.take() {
            timer.cancel();
        }
    }

    fn cancel_timeout(m: &mut Machine) {
        if let Some(timer) = m.timeout_timer.take() {
            timer.cancel();
        }
    }

    /// Sends a single-byte request command, fire and forget.
    ///
    /// A failed send is only logged: the armed registration timeout treats
    /// it like any other lost frame and the backoff path recovers.
    fn send_command(&self, command: Command) {
        let message = Bytes::copy_from_slice(&[Envelope::request(command).encode()]);
        if let Err(e) = self.transport.send(&self.address, message) {
            tracing::warn!(
                "device {}: sending {:?} failed: {}",
                self.address,
                command,
                e
            );
        }
    }

    fn notify_listeners(&self, connected: bool) {
        // Snapshot so a listener may register further listeners.
        let listeners: Vec<ConnectionListener> = {
            let listeners = self.listeners.lock().expect("listeners lock");
            listeners.iter().map(Arc::clone).collect()
        };
        for listener in &listeners {
            listener(&self.address, connected);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Ok(m) = self.machine.get_mut() {
            if let Some(timer) = m.attempt_timer.take() {
                timer.cancel();
            }
            if let Some(timer) = m.timeout_timer.take() {
                timer.cancel();
            }
        }
    }
}
