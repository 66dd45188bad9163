//! Interruptible wait primitive: block until the channel has data, a
//! timeout elapses, or another thread calls [`Interrupter::interrupt`].
//!
//! Built on a self-pipe polled alongside the channel fd, the same
//! non-blocking-fd idiom the rest of this crate's fd handling follows
//! (see `transport.rs`). This is the only piece of state a `Gateway`
//! exposes to another thread.

use std::io::Read;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::{pipe, read, write};

use crate::error::GatewayError;

/// Outcome of one [`Wait::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    DataAvailable,
    TimedOut,
    Interrupted,
}

/// A cloneable, `Send + Sync` handle that can interrupt a [`Wait`]
/// blocked in another thread. This is the one operation on a
/// [`crate::Gateway`] that is safe to call from a thread other than
/// the one that owns it.
#[derive(Clone)]
pub struct Interrupter {
    write_fd: Arc<OwnedFd>,
}

impl Interrupter {
    /// Wake up a blocked `wait`, or arm the next one if none is
    /// currently blocked. Idempotent while the interrupt is still
    /// pending — repeated calls before it's observed coalesce into a
    /// single `Interrupted` outcome.
    pub fn interrupt(&self) -> Result<(), GatewayError> {
        write(self.write_fd.as_fd(), &[1u8]).map_err(GatewayError::Interrupt)?;
        Ok(())
    }
}

pub(crate) fn set_nonblocking(fd: BorrowedFd<'_>) -> Result<(), nix::Error> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_retain(flags);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(fd, FcntlArg::F_SETFL(flags))?;
    Ok(())
}

pub(crate) struct Wait {
    read_fd: OwnedFd,
    write_fd: Arc<OwnedFd>,
}

impl Wait {
    pub(crate) fn new() -> Result<Self, GatewayError> {
        let (read_fd, write_fd) = pipe().map_err(GatewayError::Interrupt)?;
        set_nonblocking(read_fd.as_fd()).map_err(GatewayError::Interrupt)?;
        Ok(Self {
            read_fd,
            write_fd: Arc::new(write_fd),
        })
    }

    pub(crate) fn interrupter(&self) -> Interrupter {
        Interrupter {
            write_fd: Arc::clone(&self.write_fd),
        }
    }

    /// Drain every byte currently sitting in the interrupt pipe. Must
    /// be called after observing `Interrupted` so the next `wait`
    /// doesn't spuriously return it again, and before starting a fresh
    /// blocking operation so a stale, already-observed interrupt can't
    /// leak into it.
    pub(crate) fn drain_stale(&self) {
        let mut buf = [0u8; 64];
        loop {
            match read(self.read_fd.as_fd(), &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) if n < buf.len() => break,
                Ok(_) => continue,
            }
        }
    }

    /// Block on `channel` until it's readable, `timeout` elapses, or
    /// an interrupt arrives. `timeout` of zero returns immediately
    /// with whichever outcome is already true.
    ///
    /// `poll()` takes a native `int` millisecond timeout, but each
    /// internal call here is clamped to `u16::MAX` ms and re-issued
    /// against the real deadline — a single truncated-timeout `poll()`
    /// call must never be mistaken for the full requested wait, or a
    /// `timeout` longer than ~65.5s would return `TimedOut` far short
    /// of what the caller asked for.
    pub(crate) fn wait(
        &self,
        channel: BorrowedFd<'_>,
        timeout: Duration,
    ) -> Result<WaitOutcome, GatewayError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let chunk_ms = u16::try_from(remaining.as_millis()).unwrap_or(u16::MAX);
            let mut fds = [
                PollFd::new(channel, PollFlags::POLLIN),
                PollFd::new(self.read_fd.as_fd(), PollFlags::POLLIN),
            ];
            let n = loop {
                match poll(&mut fds, PollTimeout::from(chunk_ms)) {
                    Ok(n) => break n,
                    Err(nix::Error::EINTR) => continue,
                    Err(e) => return Err(GatewayError::Interrupt(e)),
                }
            };
            if n == 0 {
                if Instant::now() >= deadline {
                    return Ok(WaitOutcome::TimedOut);
                }
                continue;
            }
            let interrupted = fds[1]
                .revents()
                .unwrap_or(PollFlags::empty())
                .contains(PollFlags::POLLIN);
            if interrupted {
                self.drain_stale();
                return Ok(WaitOutcome::Interrupted);
            }
            return Ok(WaitOutcome::DataAvailable);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_out_with_no_data_and_no_interrupt() {
        let wait = Wait::new().unwrap();
        // A pipe we never write to: readable end always pending, never POLLIN.
        let (idle_r, _idle_w) = pipe().unwrap();
        let outcome = wait.wait(idle_r.as_fd(), Duration::from_millis(50)).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn interrupt_wakes_a_blocked_wait() {
        let wait = Wait::new().unwrap();
        let interrupter = wait.interrupter();
        interrupter.interrupt().unwrap();
        let (idle_r, _idle_w) = pipe().unwrap();
        let outcome = wait
            .wait(idle_r.as_fd(), Duration::from_millis(1000))
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Interrupted);
    }

    #[test]
    fn interrupt_is_observed_exactly_once() {
        let wait = Wait::new().unwrap();
        wait.interrupter().interrupt().unwrap();
        let (idle_r, _idle_w) = pipe().unwrap();
        assert_eq!(
            wait.wait(idle_r.as_fd(), Duration::from_millis(200)).unwrap(),
            WaitOutcome::Interrupted
        );
        assert_eq!(
            wait.wait(idle_r.as_fd(), Duration::from_millis(50)).unwrap(),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn data_available_on_channel_is_reported() {
        let wait = Wait::new().unwrap();
        let (r, w) = pipe().unwrap();
        write(w.as_fd(), b"x").unwrap();
        let outcome = wait.wait(r.as_fd(), Duration::from_millis(200)).unwrap();
        assert_eq!(outcome, WaitOutcome::DataAvailable);
    }
}
