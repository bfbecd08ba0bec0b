//! Serial connection state machine.
//!
//! One [`StateMachine`] exists per process, owned by the
//! [`ConnectionManager`](crate::ConnectionManager). It decides whether incoming
//! bytes are accepted and records how the link got to where it is.
//!
//! # States
//!
//! - `Disconnected`: no device handle; the reconnect back-off may be armed
//! - `Discovering`: resolving a device path (enumeration or pinned path)
//! - `Open`: reading lines from the device
//! - `Closing`: shutting down; terminal
//!
//! # Valid Transitions
//!
//! ```text
//! Disconnected ──► Discovering ──► Open
//!      ▲               │            │
//!      └───────────────┴────────────┘   (discovery/open failure, read error, close)
//!
//! any non-terminal state ──► Closing
//! ```
//!
//! # Examples
//!
//! ```
//! use cardgate_serial::{ConnectionState, StateMachine};
//!
//! let mut machine = StateMachine::new();
//! assert_eq!(machine.current_state(), ConnectionState::Disconnected);
//!
//! machine.transition_to(ConnectionState::Discovering).unwrap();
//! machine.transition_to(ConnectionState::Open).unwrap();
//! assert!(machine.transition_to(ConnectionState::Discovering).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Result, SerialError};

/// Maximum number of state transitions kept in history.
///
/// A flapping cable produces four transitions per cycle, so this covers the
/// last dozen or so reconnects.
const MAX_HISTORY_SIZE: usize = 64;

/// Lifecycle state of the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No device handle is held.
    Disconnected,

    /// Looking for a device to open.
    Discovering,

    /// Device open; bytes are accepted.
    Open,

    /// Process shutdown; the device handle has been released.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Discovering => "Discovering",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
        };
        write!(f, "{}", state_str)
    }
}

impl ConnectionState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardgate_serial::ConnectionState;
    ///
    /// assert!(ConnectionState::Disconnected.can_transition_to(&ConnectionState::Discovering));
    /// assert!(!ConnectionState::Disconnected.can_transition_to(&ConnectionState::Open));
    /// assert!(ConnectionState::Open.can_transition_to(&ConnectionState::Closing));
    /// ```
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        matches!(
            (self, target),
            // From Disconnected
            (ConnectionState::Disconnected, ConnectionState::Discovering)
            // From Discovering
            | (ConnectionState::Discovering, ConnectionState::Open | ConnectionState::Disconnected)
            // From Open
            | (ConnectionState::Open, ConnectionState::Disconnected)
            // Shutdown from anywhere but Closing itself
            | (ConnectionState::Disconnected | ConnectionState::Discovering | ConnectionState::Open, ConnectionState::Closing)
        )
    }

    /// Whether bytes read in this state are handed to the normalizer.
    pub fn accepts_input(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closing)
    }
}

/// Represents a single state transition with timestamp.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// The state transitioned from.
    pub from: ConnectionState,

    /// The state transitioned to.
    pub to: ConnectionState,

    /// When the transition occurred.
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: ConnectionState, to: ConnectionState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }
}

/// State machine for the serial link lifecycle.
///
/// Enforces valid transitions and keeps a bounded transition history.
///
/// # Thread Safety
///
/// Not synchronized. The connection manager owns it exclusively and
/// publishes the current state to observers over a watch channel.
#[derive(Debug)]
pub struct StateMachine {
    /// Current state of the link.
    current_state: ConnectionState,

    /// When the current state was entered.
    state_entered_at: Instant,

    /// History of state transitions (limited to MAX_HISTORY_SIZE).
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    /// Create a new state machine in the `Disconnected` state.
    pub fn new() -> Self {
        Self {
            current_state: ConnectionState::Disconnected,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> ConnectionState {
        self.current_state
    }

    /// Get the time elapsed in the current state.
    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Number of times the link has reached `Open`, within the kept history.
    pub fn open_count(&self) -> usize {
        self.history
            .iter()
            .filter(|t| t.to == ConnectionState::Open)
            .count()
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns `SerialError::InvalidTransition` if the transition is not
    /// allowed from the current state. The state is left unchanged.
    pub fn transition_to(&mut self, new_state: ConnectionState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(SerialError::InvalidTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);

        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());

        self.current_state = new_state;
        self.state_entered_at = transition.timestamp;

        Ok(transition)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
