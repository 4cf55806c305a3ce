//! OVSDB protocol constants

/// IANA-assigned OVSDB port
pub const DEFAULT_PORT: u16 = 6640;

/// Upper bound on a single buffered inbound message (64 MiB).
///
/// OVSDB messages carry no length header, so a peer that never closes a JSON
/// value would otherwise grow the decode buffer without limit.
pub const MAX_MESSAGE_LENGTH: usize = 64 * 1024 * 1024;
