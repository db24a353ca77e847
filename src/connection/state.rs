//! Connection state machine

use crate::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state (socket open, nothing exchanged)
    Initial,

    /// Waiting for the server greeting
    Handshaking,

    /// SSLRequest sent, TLS handshake in progress
    NegotiatingTls,

    /// HandshakeResponse sent, authentication exchange in progress
    Authenticating,

    /// Idle (ready for a command)
    Idle,

    /// Command sent, awaiting the first response packet
    QueryInProgress,

    /// Reading a result set
    ReadingResults,

    /// Closed (terminal)
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Initial, Handshaking)
                | (Handshaking, NegotiatingTls)
                | (Handshaking, Authenticating)
                | (NegotiatingTls, Authenticating)
                | (Authenticating, Idle)
                | (Idle, QueryInProgress)
                | (QueryInProgress, ReadingResults)
                | (QueryInProgress, Idle)
                | (ReadingResults, Idle)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {}", self),
                actual: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::NegotiatingTls => write!(f, "negotiating_tls"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Idle => write!(f, "idle"),
            Self::QueryInProgress => write!(f, "query_in_progress"),
            Self::ReadingResults => write!(f, "reading_results"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
