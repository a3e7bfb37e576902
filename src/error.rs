//! Crate-wide error taxonomy.
//!
//! Protocol-level failures (bad fragments, undecodable state payloads,
//! stale ARP replies) never reach a caller — they're logged and the
//! offending input is dropped. The variants here are only the ones that
//! are ever returned from a public operation.

use std::fmt;

/// Errors surfaced from public engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A MAC address string did not parse as six hex octets.
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// The multiplexer could not bind its listen socket.
    #[error("failed to bind multiplexer socket: {0}")]
    Bind(#[source] std::io::Error),

    /// A `send_to` call failed at the socket layer.
    #[error("failed to send datagram: {0}")]
    Send(#[source] std::io::Error),

    /// An operation was attempted on a device that isn't registered with
    /// a multiplexer.
    #[error("device is not registered")]
    NotRegistered,

    /// A control mutation was attempted before the required route had
    /// ever been observed in a snapshot.
    #[error("control route unavailable for {0:?}: call get_state() first")]
    RoutesUnavailable(RouteKind),

    /// A brightness/hue/saturation argument fell outside `[0, 1]`.
    #[error("value {0} is out of range [0, 1]")]
    InvalidRange(f32),

    /// An effect id string didn't parse as `auto`, `scene:<n>`, or
    /// `manual:<n>`, or `set_effect_by_name` was called with a name not
    /// present in the device's current effect list.
    #[error("unknown effect id: {0}")]
    UnknownEffect(String),

    /// A suspending operation (snapshot fetch, discovery wait, IP
    /// resolution) exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The device was already registered when `register()` was called
    /// again.
    #[error("device is already registered")]
    AlreadyRegistered,
}

/// Which control route was missing when a `RoutesUnavailable` error fired.
///
/// Hue and saturation are split one pair per mode (spec's "per-mode
/// palette"): the firmware exposes a distinct route for each, since a
/// device's saved scene palette and its live manual-animation palette
/// are independent controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Power,
    Brightness,
    Mode,
    ActiveSceneIndex,
    ActiveAnimationIndex,
    AutoHue,
    AutoSaturation,
    SceneHue,
    SceneSaturation,
    ManualHue,
    ManualSaturation,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
