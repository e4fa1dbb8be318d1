use thiserror::Error;

/// Error codes a list broker may return from any of its RPCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("ok")]
    Ok,
    #[error("internal broker error")]
    Internal,
    #[error("invalid list id")]
    InvalidId,
    #[error("invalid URI")]
    InvalidUri,
    #[error("inconsistent list state")]
    Inconsistent,
    #[error("requested range out of bounds")]
    OutOfRange,
    #[error("list is empty")]
    Empty,
    #[error("range overflow")]
    Overflown,
    #[error("range underflow")]
    Underflown,
    #[error("invalid stream URL")]
    InvalidStreamUrl,
    #[error("invalid strbo URL")]
    InvalidStrboUrl,
    #[error("not found")]
    NotFound,
    #[error("broker busy, retry after 500ms")]
    Busy500,
    #[error("broker busy, retry after 1000ms")]
    Busy1000,
    #[error("broker busy, retry after 1500ms")]
    Busy1500,
    #[error("broker busy, retry after 3000ms")]
    Busy3000,
    #[error("broker busy, retry after 5000ms")]
    Busy5000,
    #[error("broker busy")]
    Busy,
    #[error("interrupted")]
    Interrupted,
    #[error("physical media I/O error")]
    PhysicalMediaIo,
    #[error("network I/O error")]
    NetIo,
    #[error("protocol error")]
    Protocol,
    #[error("authentication failure")]
    Authentication,
    #[error("operation not supported")]
    NotSupported,
    #[error("permission denied")]
    PermissionDenied,
}

impl ListError {
    /// True for transient broker-busy conditions the cache should retry
    /// rather than surface.
    pub const fn is_busy(self) -> bool {
        matches!(
            self,
            ListError::Busy500
                | ListError::Busy1000
                | ListError::Busy1500
                | ListError::Busy3000
                | ListError::Busy5000
                | ListError::Busy
        )
    }

    /// Retry delay implied by a `BUSY_*` variant, if any.
    pub const fn busy_retry_delay_ms(self) -> Option<u64> {
        match self {
            ListError::Busy500 => Some(500),
            ListError::Busy1000 => Some(1000),
            ListError::Busy1500 => Some(1500),
            ListError::Busy3000 => Some(3000),
            ListError::Busy5000 => Some(5000),
            ListError::Busy => Some(1000),
            _ => None,
        }
    }

    /// "Hard" errors are the ones the crawler must surface as an operation
    /// failure rather than silently skip (spec §7 propagation policy).
    pub const fn is_hard(self) -> bool {
        matches!(
            self,
            ListError::Authentication
                | ListError::PermissionDenied
                | ListError::Protocol
                | ListError::Internal
                | ListError::InvalidId
        )
    }
}

/// Failure taxonomy surfaced by the async call envelope (C2) itself, as
/// opposed to broker-level `ListError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("call was cancelled locally")]
    Aborted,
    #[error("method called in the wrong envelope state")]
    BadState,
    #[error("no result available")]
    NoResult,
}

/// Outcome of pushing a URL onto the stream player's bounded queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlayerPushError {
    #[error("ok")]
    Ok,
    #[error("invalid stream id")]
    InvalidStreamId,
    #[error("no URI to push")]
    NoUri,
    #[error("broker failed to resolve the URI")]
    BrokerFailure,
    #[error("player FIFO failure")]
    FifoFailure,
    #[error("player FIFO is full")]
    FifoFull,
    #[error("playback failure")]
    PlaybackFailure,
}

impl PlayerPushError {
    /// `FIFO_FULL` is backpressure, not failure (spec §7): the coordinator
    /// suspends and retries instead of reverting.
    pub const fn is_backpressure(self) -> bool {
        matches!(self, PlayerPushError::FifoFull)
    }
}

/// Outcome of writing a configuration key (spec §6/§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigInsertError {
    #[error("updated")]
    Updated,
    #[error("unchanged")]
    Unchanged,
    #[error("unknown key")]
    KeyUnknown,
    #[error("value has the wrong type for this key")]
    ValueTypeInvalid,
    #[error("value is not valid for this key")]
    ValueInvalid,
    #[error("permission denied")]
    PermissionDenied,
}

impl ConfigInsertError {
    pub const fn is_success(self) -> bool {
        matches!(self, ConfigInsertError::Updated | ConfigInsertError::Unchanged)
    }
}

/// User-visible system error screen codes (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SystemErrorCode {
    #[error("network protocol error")]
    NetworkProtocol,
    #[error("DNS resolution failure")]
    NetworkDns,
    #[error("network connection failure")]
    NetworkConnection,
    #[error("network access denied")]
    NetworkDenied,
    #[error("network timeout")]
    NetworkTimeout,
    #[error("resource not found")]
    NetworkNotFound,
    #[error("incomplete network transfer")]
    NetworkIncomplete,
    #[error("generic network error")]
    NetworkError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_classification() {
        assert!(ListError::Busy1500.is_busy());
        assert_eq!(ListError::Busy1500.busy_retry_delay_ms(), Some(1500));
        assert!(!ListError::NotFound.is_busy());
    }

    #[test]
    fn hard_vs_soft() {
        assert!(ListError::Authentication.is_hard());
        assert!(!ListError::NotFound.is_hard());
    }

    #[test]
    fn fifo_full_is_backpressure() {
        assert!(PlayerPushError::FifoFull.is_backpressure());
        assert!(!PlayerPushError::BrokerFailure.is_backpressure());
    }
}
