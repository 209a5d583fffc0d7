//! Health-probe I/O primitives (spec §4.2, §4.3).
//!
//! "Why probe by reading" (spec §4.2): the underlying socket API only
//! reports closure as a side effect of a readable-poll returning true with
//! nothing left to read. Tokio folds "poll + available + receive" into a
//! single non-blocking syscall via [`tokio::net::TcpStream::try_read`], so
//! the drain loop below uses that directly; [`is_socket_in_bad_state`]
//! still needs its own *non-destructive* peek, because it is also called
//! from `GetStream`'s liveness re-check (spec §4.1 step 2), where
//! consuming bytes would discard data the upper layer is owed.

use std::io;
use std::mem::MaybeUninit;

use bytes::Bytes;
use log::{trace, warn};
use socket2::SockRef;
use tokio::net::TcpStream;

use crate::buffer::InitialSocketData;
use crate::error::TransportError;

/// Largest single non-blocking read attempted per drain iteration.
/// Spec's `MaxInitialSocketBytes` default (16 KiB) bounds the *cumulative*
/// buffer; this bounds one syscall's worth of work per loop pass.
const DRAIN_CHUNK: usize = 8192;

/// Returns true if the socket is unusable (spec §4.3).
///
/// Non-destructive: uses a 1-byte `MSG_PEEK` so that any bytes genuinely
/// pending are left for the drain loop (or the upper layer) to consume.
pub fn is_socket_in_bad_state(stream: &TcpStream) -> bool {
    let readable = match stream.try_io(tokio::io::Interest::READABLE, || Ok(())) {
        Ok(()) => true,
        Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => false,
        Err(_) => return true,
    };
    if !readable {
        // Poll false: no pending data, not closed.
        return false;
    }

    let sock = SockRef::from(stream);
    let mut probe = [MaybeUninit::new(0u8); 1];
    match sock.peek(&mut probe) {
        Ok(0) => true,  // Available == 0: peer closed cleanly.
        Ok(_) => false, // Available > 0: readable and live.
        Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => false,
        Err(_) => true,
    }
}

/// Result of one drain pass over a parked socket.
pub struct DrainOutcome {
    /// True if the socket should be torn down after this pass.
    pub close_socket: bool,
    /// Set only when the pass failed for a reason worth surfacing as the
    /// transition's cause (buffer overrun or a hard I/O error).
    pub error: Option<TransportError>,
}

/// Drains any bytes currently pending on `stream` into `data`, stopping
/// when nothing more is immediately available, the peer has closed, the
/// bound is exceeded, or a hard error occurs (spec §4.2 step 2).
pub fn drain(stream: &TcpStream, data: &mut InitialSocketData, max_bytes: usize) -> DrainOutcome {
    loop {
        let bad_before_read = is_socket_in_bad_state(stream);

        let mut buf = [0u8; DRAIN_CHUNK];
        match stream.try_read(&mut buf) {
            Ok(0) => {
                return DrainOutcome {
                    close_socket: true,
                    error: None,
                };
            }
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                if let Err(would_be_total) = data.try_append(chunk, max_bytes) {
                    warn!(
                        "probe drain: peer sent {} bytes before attachment, exceeding the {} byte bound",
                        would_be_total, max_bytes
                    );
                    return DrainOutcome {
                        close_socket: true,
                        error: Some(TransportError::InitialBufferExceeded {
                            sent: would_be_total,
                            max: max_bytes,
                        }),
                    };
                }
                trace!("probe drain: buffered {} bytes ({} total)", n, data.len());
                // Spec: "continue while bytes were read" — loop again to
                // drain any further already-buffered data in one visit.
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                return DrainOutcome {
                    close_socket: bad_before_read,
                    error: None,
                };
            }
            Err(err) => {
                return DrainOutcome {
                    close_socket: true,
                    error: Some(TransportError::Io(err)),
                };
            }
        }
    }
}
