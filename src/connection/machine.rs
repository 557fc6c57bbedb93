//! Transition table for the device connection lifecycle.
//!
//! The table is pure: it maps a `(state, input)` pair to the next state and
//! the side effects the executor must perform. Keeping it free of side
//! effects makes the lifecycle testable without timers or transports.

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No registration with the device exists or is being attempted.
    Disconnected,
    /// A registration request has been scheduled or sent; no ack yet.
    AwaitingConnection,
    /// The device acknowledged the registration and the lease is active.
    Connected,
}

/// Inputs applied to the connection machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Start connecting (external request).
    Connect,
    /// The device acknowledged a registration request.
    ConnectResponse,
    /// A registration request went unanswered for the timeout window.
    Timeout,
    /// Stop the connection (external request).
    Disconnect,
}

/// Side effects requested by a transition, executed in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Compute the jittered first-attempt delay and schedule the first
    /// registration send.
    PrimeFirstAttempt,
    /// Apply exponential backoff and schedule the next registration send.
    Backoff,
    /// Cancel the pending timeout, switch to the lease cadence, schedule
    /// the first renewal and notify listeners of the new connection.
    EnterConnected,
    /// Cancel the pending timeout and schedule the next lease renewal.
    RenewLease,
    /// Cancel any pending attempt and timeout timers.
    CancelPending,
    /// Send a best-effort remove-listener request to the device.
    Unregister,
    /// Cancel timers and notify listeners that the connection is gone.
    DropConnection,
}

/// Returns the next state and the actions for `input` in `state`.
#[must_use]
pub const fn transition(state: State, input: Input) -> (State, &'static [Action]) {
    match (state, input) {
        (State::Disconnected, Input::Connect) => {
            (State::AwaitingConnection, &[Action::PrimeFirstAttempt])
        }
        // Stray acks, stale timeouts and repeated disconnects are no-ops.
        (State::Disconnected, _) => (State::Disconnected, &[]),

        (State::AwaitingConnection, Input::ConnectResponse) => {
            (State::Connected, &[Action::EnterConnected])
        }
        // An unanswered attempt never drops us back to Disconnected; it
        // retries forever with backoff until told to stop.
        (State::AwaitingConnection, Input::Timeout) => {
            (State::AwaitingConnection, &[Action::Backoff])
        }
        (State::AwaitingConnection, Input::Disconnect) => {
            (State::Disconnected, &[Action::CancelPending])
        }
        (State::AwaitingConnection, Input::Connect) => (State::AwaitingConnection, &[]),

        (State::Connected, Input::ConnectResponse) => (State::Connected, &[Action::RenewLease]),
        (State::Connected, Input::Timeout) => (State::Disconnected, &[Action::DropConnection]),
        (State::Connected, Input::Disconnect) => {
            (State::Disconnected, &[Action::Unregister, Action::DropConnection])
        }
        (State::Connected, Input::Connect) => (State::Connected, &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_transitions() {
        assert_eq!(
            transition(State::Disconnected, Input::Connect),
            (State::AwaitingConnection, &[Action::PrimeFirstAttempt][..])
        );
        for input in [Input::ConnectResponse, Input::Timeout, Input::Disconnect] {
            assert_eq!(
                transition(State::Disconnected, input),
                (State::Disconnected, &[][..])
            );
        }
    }

    #[test]
    fn test_awaiting_transitions() {
        assert_eq!(
            transition(State::AwaitingConnection, Input::ConnectResponse),
            (State::Connected, &[Action::EnterConnected][..])
        );
        assert_eq!(
            transition(State::AwaitingConnection, Input::Timeout),
            (State::AwaitingConnection, &[Action::Backoff][..])
        );
        assert_eq!(
            transition(State::AwaitingConnection, Input::Disconnect),
            (State::Disconnected, &[Action::CancelPending][..])
        );
        assert_eq!(
            transition(State::AwaitingConnection, Input::Connect),
            (State::AwaitingConnection, &[][..])
        );
    }

    #[test]
    fn test_connected_transitions() {
        assert_eq!(
            transition(State::Connected, Input::ConnectResponse),
            (State::Connected, &[Action::RenewLease][..])
        );
        assert_eq!(
            transition(State::Connected, Input::Timeout),
            (State::Disconnected, &[Action::DropConnection][..])
        );
        assert_eq!(
            transition(State::Connected, Input::Disconnect),
            (
                State::Disconnected,
                &[Action::Unregister, Action::DropConnection][..]
            )
        );
        assert_eq!(
            transition(State::Connected, Input::Connect),
            (State::Connected, &[][..])
        );
    }
}
