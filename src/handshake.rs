//! Accept-signal handshake for reliable-UDP sessions.
//!
//! A reliable-UDP engine reports a session as soon as its own handshake is
//! done, which says nothing about whether the peer application has started.
//! The dialing side therefore writes [`ACCEPT_SIGNAL`] once right after
//! connecting, and the accepting side reads it before handing the session to
//! the harness. TCP does not use this.

use crate::session::MeasuredSession;
use crate::{Error, Result};

/// Magic value written by the connecting side, little-endian on the wire.
pub const ACCEPT_SIGNAL: u32 = 1;

/// Size of the signal on the wire.
pub const SIGNAL_LEN: usize = 4;

/// Encodes [`ACCEPT_SIGNAL`].
pub fn encode_signal() -> [u8; SIGNAL_LEN] {
    ACCEPT_SIGNAL.to_le_bytes()
}

/// Checks bytes read from the peer against [`ACCEPT_SIGNAL`].
///
/// # Errors
///
/// Returns [`Error::Handshake`] when fewer than [`SIGNAL_LEN`] bytes arrived or
/// the value differs.
///
/// # Examples
///
/// ```
/// use rperf3_transport::handshake::{encode_signal, verify_signal, ACCEPT_SIGNAL};
///
/// assert_eq!(verify_signal(&encode_signal()).unwrap(), ACCEPT_SIGNAL);
/// assert!(verify_signal(&[1, 0]).is_err());
/// ```
pub fn verify_signal(bytes: &[u8]) -> Result<u32> {
    let raw: [u8; SIGNAL_LEN] = bytes.try_into().map_err(|_| {
        Error::Handshake(format!(
            "expected {SIGNAL_LEN} signal bytes, got {}",
            bytes.len()
        ))
    })?;
    let signal = u32::from_le_bytes(raw);
    if signal != ACCEPT_SIGNAL {
        return Err(Error::Handshake(format!(
            "unexpected accept signal {signal:#010x}"
        )));
    }
    Ok(signal)
}

/// Writes the accept signal on a freshly dialed session.
///
/// # Errors
///
/// Returns [`Error::Handshake`] if the write fails or is short.
pub async fn send_accept_signal(session: &mut dyn MeasuredSession) -> Result<()> {
    let signal = encode_signal();
    let n = session
        .write(&signal)
        .await
        .map_err(|e| Error::Handshake(format!("sending accept signal: {e}")))?;
    if n != SIGNAL_LEN {
        return Err(Error::Handshake(format!(
            "short accept signal write: {n} of {SIGNAL_LEN} bytes"
        )));
    }
    Ok(())
}

/// Reads and verifies the accept signal on a freshly accepted session.
///
/// Performs a single read, so a peer that splits the signal is reported as a
/// short read.
///
/// # Errors
///
/// Returns [`Error::Handshake`] on a failed read, a short read, or a value
/// mismatch.
pub async fn recv_accept_signal(session: &mut dyn MeasuredSession) -> Result<u32> {
    let mut buf = [0u8; SIGNAL_LEN];
    let n = session
        .read(&mut buf)
        .await
        .map_err(|e| Error::Handshake(format!("reading accept signal: {e}")))?;
    verify_signal(&buf[..n])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_is_little_endian() {
        assert_eq!(encode_signal(), [0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_verify_accepts_signal() {
        assert_eq!(verify_signal(&[1, 0, 0, 0]).unwrap(), ACCEPT_SIGNAL);
    }

    #[test]
    fn test_verify_rejects_corrupted_byte() {
        let mut bytes = encode_signal();
        bytes[3] ^= 0x80;
        match verify_signal(&bytes) {
            Err(Error::Handshake(msg)) => assert!(msg.contains("0x80000001")),
            other => panic!("expected handshake error, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_rejects_short_and_long() {
        assert!(verify_signal(&[]).is_err());
        assert!(verify_signal(&[1, 0, 0]).is_err());
        assert!(verify_signal(&[1, 0, 0, 0, 0]).is_err());
    }
}
