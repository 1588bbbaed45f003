//! Error types for the Wi-Fi Display protocol library.

/// Errors that can occur in the Wi-Fi Display protocol library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Transport**: [`Io`](Self::Io) — socket/poll/timer failures,
///   [`PipeClosed`](Self::PipeClosed), [`Timeout`](Self::Timeout).
/// - **Protocol**: [`ProtocolMalformed`](Self::ProtocolMalformed) —
///   non-recoverable wire data (an RTSP `Content-Length` that cannot be
///   parsed, a supplicant reply that is not `OK`/`PONG`, a broken event
///   payload).
/// - **Lifecycle**: [`AlreadyOpen`](Self::AlreadyOpen),
///   [`NotOpen`](Self::NotOpen) on the supplicant control client.
/// - **Caller**: [`InvalidArgument`](Self::InvalidArgument).
/// - **Self-checks**: [`Internal`](Self::Internal) — a decoder
///   post-condition failed.
///
/// Note that an RTSP message of `Unknown` type is a valid decode result,
/// not an error: unparsable id-lines, methods, statuses and header lines
/// are carried through as data so that a buggy peer cannot force a
/// disconnect.
#[derive(Debug, thiserror::Error)]
pub enum WfdError {
    /// Underlying I/O, socket or timer error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller supplied an empty, null-like or out-of-range value, or
    /// used a decoder that died and was not reset.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// [`WpaCtrl::open`](crate::wpa::WpaCtrl::open) was called on a client
    /// that is already attached.
    #[error("control client already open")]
    AlreadyOpen,

    /// The operation requires an attached control client.
    #[error("control client not open")]
    NotOpen,

    /// A timed request or the liveness `PING` did not complete within its
    /// budget.
    #[error("request timed out")]
    Timeout,

    /// The peer hung up the control socket.
    #[error("control socket closed by peer")]
    PipeClosed,

    /// Wire data was malformed beyond recovery.
    #[error("malformed protocol data: {0}")]
    ProtocolMalformed(&'static str),

    /// A decoder self-consistency check failed.
    #[error("internal parser inconsistency")]
    Internal,
}

impl From<nix::errno::Errno> for WfdError {
    fn from(err: nix::errno::Errno) -> Self {
        WfdError::Io(std::io::Error::from_raw_os_error(err as i32))
    }
}

/// Convenience alias for `Result<T, WfdError>`.
pub type Result<T> = std::result::Result<T, WfdError>;
