//! Opening and configuring the byte channel: TCP connect or a raw,
//! non-blocking serial device.

use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;

use nix::sys::termios::{self, BaudRate, ControlFlags, FlushArg, SetArg, SpecialCharacterIndices};

use crate::error::GatewayError;
use crate::wait::set_nonblocking;

/// Closed set of baud rates the container protocol supports.
const ALLOWED_BAUDS: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400,
];

fn baud_rate(baud: u32) -> Result<BaudRate, GatewayError> {
    let rate = match baud {
        50 => BaudRate::B50,
        75 => BaudRate::B75,
        110 => BaudRate::B110,
        134 => BaudRate::B134,
        150 => BaudRate::B150,
        200 => BaudRate::B200,
        300 => BaudRate::B300,
        600 => BaudRate::B600,
        1200 => BaudRate::B1200,
        1800 => BaudRate::B1800,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        other => return Err(GatewayError::UnsupportedBaud(other)),
    };
    Ok(rate)
}

/// Raw mode, 8 data bits, no parity, 1 stop bit ("N81"), local,
/// receive-enabled, VMIN=1/VTIME=1 — matches the reference container's
/// serial framing exactly.
fn configure_serial(fd: BorrowedFd<'_>, baud: u32) -> Result<(), GatewayError> {
    let rate = baud_rate(baud)?;
    let mut tio = termios::tcgetattr(fd).map_err(GatewayError::Termios)?;
    termios::cfmakeraw(&mut tio);
    tio.control_flags.remove(ControlFlags::CSIZE);
    tio.control_flags
        .insert(ControlFlags::CS8 | ControlFlags::CREAD | ControlFlags::CLOCAL);
    tio.control_flags
        .remove(ControlFlags::PARENB | ControlFlags::CSTOPB);
    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 1;
    termios::cfsetspeed(&mut tio, rate).map_err(GatewayError::Termios)?;
    termios::tcsetattr(fd, SetArg::TCSANOW, &tio).map_err(GatewayError::Termios)?;
    termios::tcflush(fd, FlushArg::TCIOFLUSH).map_err(GatewayError::Termios)?;
    Ok(())
}

/// The open byte channel to the remote container: a TCP socket or a
/// raw serial device, both set non-blocking.
pub(crate) enum Channel {
    Tcp(TcpStream),
    Serial(std::fs::File),
}

impl Channel {
    pub(crate) fn connect_tcp(host: &str, port: u16) -> Result<Self, GatewayError> {
        let addr = format!("{host}:{port}");
        let stream =
            TcpStream::connect(&addr).map_err(|source| GatewayError::Connect {
                addr: addr.clone(),
                source,
            })?;
        stream
            .set_nonblocking(true)
            .map_err(|source| GatewayError::Connect { addr, source })?;
        Ok(Self::Tcp(stream))
    }

    /// Open a serial device at `path`, configured as described in
    /// [`configure_serial`]. Does not emit any protocol frames; that's
    /// the session machine's job.
    pub(crate) fn open_serial(path: &str, baud: u32) -> Result<Self, GatewayError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|source| GatewayError::SerialOpen {
                path: path.to_string(),
                source,
            })?;
        configure_serial(file.as_fd(), baud)?;
        set_nonblocking(file.as_fd()).map_err(GatewayError::Termios)?;
        Ok(Self::Serial(file))
    }

    /// Open the serial device and write a single wakeup byte, per
    /// `rs232_wakeup(dev, baud, "N81")`.
    pub(crate) fn rs232_wakeup(path: &str, baud: u32) -> Result<(), GatewayError> {
        let mut channel = Self::open_serial(path, baud)?;
        channel.write_all(b"A").map_err(GatewayError::Io)
    }

    pub(crate) fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Self::Tcp(s) => s.as_fd(),
            Self::Serial(f) => f.as_fd(),
        }
    }
}

impl Read for Channel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            Self::Serial(f) => f.read(buf),
        }
    }
}

impl Write for Channel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            Self::Serial(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            Self::Serial(f) => f.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baud_rate_accepts_every_listed_rate() {
        for &baud in ALLOWED_BAUDS {
            assert!(baud_rate(baud).is_ok(), "rate {baud} should be accepted");
        }
    }

    #[test]
    fn baud_rate_rejects_arbitrary_value() {
        assert!(baud_rate(31_250).is_err());
    }

    #[test]
    fn connect_tcp_surfaces_connection_refused() {
        // Nothing should be listening on this port in a test environment.
        let result = Channel::connect_tcp("127.0.0.1", 1);
        assert!(result.is_err());
    }
}
