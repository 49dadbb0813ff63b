use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Open {
        serial_ready: bool,
    },
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open { .. })
    }

    pub fn serial_ready(&self) -> bool {
        matches!(self, ConnectionState::Open { serial_ready: true })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Open {
                serial_ready: false,
            } => "connected",
            ConnectionState::Open { serial_ready: true } => "ready",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle signals from the transport's control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Opened,
    Closed,
    Errored,
}

/// Result of feeding one signal into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// True when an open connection was lost; the caller must drop history.
    pub fn lost(&self) -> bool {
        self.from.is_open() && !self.to.is_open()
    }
}

#[derive(Debug, Default)]
pub struct ConnectionMachine {
    state: ConnectionState,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn apply_control(&mut self, signal: ControlSignal) -> Transition {
        let from = self.state;
        self.state = match (from, signal) {
            (ConnectionState::Disconnected, ControlSignal::Opened) => ConnectionState::Open {
                serial_ready: false,
            },
            // A second open on a live channel keeps what the snapshots told us.
            (open @ ConnectionState::Open { .. }, ControlSignal::Opened) => open,
            (_, ControlSignal::Closed | ControlSignal::Errored) => ConnectionState::Disconnected,
        };
        Transition {
            from,
            to: self.state,
        }
    }

    /// Serial readiness carried by a state snapshot. Ignored while disconnected.
    pub fn apply_snapshot(&mut self, serial_available: bool) -> Transition {
        let from = self.state;
        if let ConnectionState::Open { .. } = from {
            self.state = ConnectionState::Open {
                serial_ready: serial_available,
            };
        }
        Transition {
            from,
            to: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTED: ConnectionState = ConnectionState::Open {
        serial_ready: false,
    };
    const READY: ConnectionState = ConnectionState::Open { serial_ready: true };

    #[test]
    fn open_then_close_round_trips_to_disconnected() {
        let mut machine = ConnectionMachine::new();
        assert_eq!(machine.state(), ConnectionState::Disconnected);

        let opened = machine.apply_control(ControlSignal::Opened);
        assert_eq!(opened.to, CONNECTED);
        assert!(opened.changed());
        assert!(!opened.lost());

        let closed = machine.apply_control(ControlSignal::Closed);
        assert_eq!(closed.to, ConnectionState::Disconnected);
        assert!(closed.lost());
    }

    #[test]
    fn error_counts_as_loss_from_any_open_state() {
        let mut machine = ConnectionMachine::new();
        machine.apply_control(ControlSignal::Opened);
        machine.apply_snapshot(true);

        let errored = machine.apply_control(ControlSignal::Errored);
        assert_eq!(errored.from, READY);
        assert_eq!(errored.to, ConnectionState::Disconnected);
        assert!(errored.lost());
    }

    #[test]
    fn snapshots_toggle_serial_readiness_while_open() {
        let mut machine = ConnectionMachine::new();
        machine.apply_control(ControlSignal::Opened);

        assert_eq!(machine.apply_snapshot(true).to, READY);
        assert!(!machine.apply_snapshot(true).changed());
        assert_eq!(machine.apply_snapshot(false).to, CONNECTED);
    }

    #[test]
    fn snapshot_does_not_open_a_disconnected_machine() {
        let mut machine = ConnectionMachine::new();
        let transition = machine.apply_snapshot(true);
        assert!(!transition.changed());
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn close_while_disconnected_is_not_a_loss() {
        let mut machine = ConnectionMachine::new();
        let transition = machine.apply_control(ControlSignal::Closed);
        assert!(!transition.changed());
        assert!(!transition.lost());
    }
}
