//! Control-channel client for a `wpa_supplicant` daemon.
//!
//! The supplicant exposes a datagram-oriented ASCII protocol over Unix
//! sockets. A client needs two connections: one for commands and replies,
//! and one that is `ATTACH`ed so the daemon pushes asynchronous event
//! lines (`<priority>EVENT-NAME ...`) to it. Both are driven from a
//! single epoll set, together with a 10 s interval timer that probes
//! daemon liveness with `PING`/`PONG`.
//!
//! Everything is single-threaded and cooperative: the caller either calls
//! [`WpaCtrl::dispatch`] in its own loop or embeds
//! [`WpaCtrl::as_raw_fd`] into an external poll set and dispatches on
//! readiness.

use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, ppoll};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::sys::signal::SigSet;
use nix::sys::socket::{self, AddressFamily, MsgFlags, SockFlag, SockType, UnixAddr};
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use nix::unistd;

use crate::error::{Result, WfdError};

/// Maximum supplicant datagram, used for both send and receive buffers.
pub const REQ_REPLY_MAX: usize = 512;

/// Liveness probe interval and the hard ceiling for request timeouts.
const LIVENESS_INTERVAL: Duration = Duration::from_secs(10);

/// Prefix selecting the Linux abstract socket namespace in a control
/// path.
const ABSTRACT_PREFIX: &str = "@abstract:";

/// Process-local counter for bound socket names; the bound path also
/// carries the pid, so cross-process uniqueness is not needed.
static BOUND_COUNTER: AtomicU64 = AtomicU64::new(0);

const TOKEN_TIMER: u64 = 0;
const TOKEN_REQ: u64 = 1;
const TOKEN_EV: u64 = 2;

/// What the event callback wants done after handling a datagram.
///
/// Returning [`Close`](Self::Close) makes the client close itself and
/// abort the current drain — the supported replacement for re-entrantly
/// closing the client from inside the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Continue,
    Close,
}

type EventFn = Box<dyn FnMut(&[u8]) -> EventAction>;

/// One datagram socket bound to its own filesystem name.
struct BoundSocket {
    fd: OwnedFd,
    path: PathBuf,
}

struct Conn {
    req: BoundSocket,
    ev: BoundSocket,
}

/// Client for the supplicant control channel.
///
/// Construct with [`new`](Self::new), attach with [`open`](Self::open),
/// then drive [`dispatch`](Self::dispatch). Event datagrams are handed to
/// the callback in kernel arrival order; several may be delivered by one
/// `dispatch` call. Dropping the client closes and detaches it.
pub struct WpaCtrl {
    event_fn: EventFn,
    sigmask: SigSet,
    epoll: Epoll,
    timer: TimerFd,
    conn: Option<Conn>,
}

impl WpaCtrl {
    /// Create a closed client. `event_fn` receives every raw event
    /// datagram (starting with `<`) from the supplicant.
    pub fn new<F>(event_fn: F) -> Result<WpaCtrl>
    where
        F: FnMut(&[u8]) -> EventAction + 'static,
    {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
        let timer = TimerFd::new(
            ClockId::CLOCK_MONOTONIC,
            TimerFlags::TFD_CLOEXEC | TimerFlags::TFD_NONBLOCK,
        )?;
        epoll.add(
            &timer,
            EpollEvent::new(
                EpollFlags::EPOLLIN | EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR,
                TOKEN_TIMER,
            ),
        )?;

        Ok(WpaCtrl {
            event_fn: Box::new(event_fn),
            sigmask: SigSet::empty(),
            epoll,
            timer,
            conn: None,
        })
    }

    /// Connect both sockets to `ctrl_path` and subscribe to events.
    ///
    /// `ctrl_path` is a filesystem path, or an abstract-namespace name
    /// with the literal `@abstract:` prefix. The event socket must answer
    /// `ATTACH` with `OK` within the request ceiling, otherwise
    /// everything is torn down again.
    pub fn open(&mut self, ctrl_path: &str) -> Result<()> {
        if ctrl_path.is_empty() {
            return Err(WfdError::InvalidArgument("empty control path"));
        }
        if self.is_open() {
            return Err(WfdError::AlreadyOpen);
        }

        self.arm_timer()?;

        let req = match self.open_socket(ctrl_path, TOKEN_REQ) {
            Ok(sock) => sock,
            Err(e) => {
                self.disarm_timer();
                return Err(e);
            }
        };
        let ev = match self.open_socket(ctrl_path, TOKEN_EV) {
            Ok(sock) => sock,
            Err(e) => {
                self.close_socket(req);
                self.disarm_timer();
                return Err(e);
            }
        };

        if let Err(e) = request_on_fd_ok(&ev.fd, b"ATTACH", None, &self.sigmask) {
            let _ = request_on_fd_ok(&ev.fd, b"DETACH", None, &self.sigmask);
            self.close_socket(ev);
            self.close_socket(req);
            self.disarm_timer();
            return Err(e);
        }

        tracing::debug!(path = ctrl_path, "supplicant control channel attached");
        self.conn = Some(Conn { req, ev });
        Ok(())
    }

    /// Detach and close both sockets. A no-op on a closed client.
    pub fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        let _ = request_on_fd_ok(&conn.ev.fd, b"DETACH", None, &self.sigmask);
        self.close_socket(conn.ev);
        self.close_socket(conn.req);
        self.disarm_timer();
        tracing::debug!("supplicant control channel detached");
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Signal mask to install for the duration of every `ppoll` wait.
    pub fn set_sigmask(&mut self, mask: SigSet) {
        self.sigmask = mask;
    }

    /// Send `cmd` and wait for its reply, which is written to `reply`.
    /// Returns the reply length.
    ///
    /// `timeout` is clamped to a 10 s ceiling; `None` means the ceiling
    /// itself. Event datagrams that stray onto the request socket are
    /// skipped while waiting.
    pub fn request(
        &mut self,
        cmd: &[u8],
        reply: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize> {
        let Some(conn) = &self.conn else {
            return Err(WfdError::NotOpen);
        };
        request_on_fd(&conn.req.fd, cmd, reply, timeout, &self.sigmask)
    }

    /// [`request`](Self::request), requiring the exact reply `OK\n`.
    pub fn request_ok(&mut self, cmd: &[u8], timeout: Option<Duration>) -> Result<()> {
        let Some(conn) = &self.conn else {
            return Err(WfdError::NotOpen);
        };
        request_on_fd_ok(&conn.req.fd, cmd, timeout, &self.sigmask)
    }

    /// One pass over the readiness multiplexer: wait up to `timeout`
    /// (`None` blocks indefinitely), then run the handler of every ready
    /// descriptor. Stops at the first handler error.
    ///
    /// Errors mean: [`Timeout`](WfdError::Timeout)/
    /// [`ProtocolMalformed`](WfdError::ProtocolMalformed) — the liveness
    /// probe failed; [`PipeClosed`](WfdError::PipeClosed) — the daemon
    /// hung up; [`NotOpen`](WfdError::NotOpen) — the event callback asked
    /// for a close. The client stays open after an error (unless the
    /// callback closed it); closing is the caller's decision.
    pub fn dispatch(&mut self, timeout: Option<Duration>) -> Result<()> {
        if !self.is_open() {
            return Err(WfdError::NotOpen);
        }

        // The liveness timer wakes every wait within 10 s anyway, so
        // capping a single epoll pass at u16::MAX milliseconds is safe.
        let timeout = match timeout {
            None => EpollTimeout::NONE,
            Some(d) => EpollTimeout::from(u16::try_from(d.as_millis()).unwrap_or(u16::MAX)),
        };

        let mut ready = [EpollEvent::empty(); 2];
        let n = match self.epoll.wait(&mut ready, timeout) {
            Ok(n) => n,
            Err(Errno::EINTR) | Err(Errno::EAGAIN) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for event in &ready[..n] {
            match event.data() {
                TOKEN_EV => self.dispatch_event_socket(event.events())?,
                TOKEN_REQ => self.dispatch_request_socket(event.events())?,
                TOKEN_TIMER => self.dispatch_timer(event.events())?,
                _ => {}
            }
        }
        Ok(())
    }

    fn open_socket(&self, ctrl_path: &str, token: u64) -> Result<BoundSocket> {
        let fd = socket::socket(
            AddressFamily::Unix,
            SockType::Datagram,
            SockFlag::SOCK_CLOEXEC | SockFlag::SOCK_NONBLOCK,
            None,
        )?;

        let path = bind_socket(&fd)?;

        let cleanup_on = |e: WfdError| {
            let _ = std::fs::remove_file(&path);
            e
        };

        if let Err(e) = connect_socket(&fd, ctrl_path) {
            return Err(cleanup_on(e));
        }

        if let Err(e) = self.epoll.add(
            &fd,
            EpollEvent::new(
                EpollFlags::EPOLLIN | EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR,
                token,
            ),
        ) {
            return Err(cleanup_on(e.into()));
        }

        Ok(BoundSocket { fd, path })
    }

    fn close_socket(&self, sock: BoundSocket) {
        let _ = self.epoll.delete(&sock.fd);
        let _ = std::fs::remove_file(&sock.path);
        // fd closes on drop
    }

    fn arm_timer(&self) -> Result<()> {
        self.timer.set(
            Expiration::Interval(TimeSpec::from_duration(LIVENESS_INTERVAL)),
            TimerSetTimeFlags::empty(),
        )?;
        Ok(())
    }

    fn disarm_timer(&self) {
        let _ = self.timer.unset();
    }

    fn dispatch_event_socket(&mut self, revents: EpollFlags) -> Result<()> {
        if revents.contains(EpollFlags::EPOLLIN) {
            self.drain_events()?;
        }

        // handle HUP/ERR last so input is drained first
        if revents.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR) {
            return Err(WfdError::PipeClosed);
        }
        Ok(())
    }

    /// Read event datagrams until the socket is dry, invoking the
    /// callback for each. A callback-requested close aborts the drain.
    fn drain_events(&mut self) -> Result<()> {
        let mut buf = [0u8; REQ_REPLY_MAX];
        loop {
            let Some(conn) = &self.conn else {
                return Err(WfdError::NotOpen);
            };

            match socket::recv(conn.ev.fd.as_raw_fd(), &mut buf, MsgFlags::MSG_DONTWAIT) {
                Ok(0) => return Ok(()),
                Ok(len) => {
                    // only event messages ('<') belong on this socket
                    if buf[0] == b'<' && (self.event_fn)(&buf[..len]) == EventAction::Close {
                        self.close();
                        return Err(WfdError::NotOpen);
                    }
                }
                Err(Errno::EAGAIN) | Err(Errno::EINTR) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn dispatch_request_socket(&mut self, revents: EpollFlags) -> Result<()> {
        if revents.contains(EpollFlags::EPOLLIN) {
            // Spurious data on the request socket is of no interest
            // outside a pending request; drain and drop it.
            let mut buf = [0u8; REQ_REPLY_MAX];
            loop {
                let Some(conn) = &self.conn else {
                    return Err(WfdError::NotOpen);
                };
                match socket::recv(conn.req.fd.as_raw_fd(), &mut buf, MsgFlags::MSG_DONTWAIT) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(Errno::EAGAIN) | Err(Errno::EINTR) => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if revents.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR) {
            return Err(WfdError::PipeClosed);
        }
        Ok(())
    }

    fn dispatch_timer(&mut self, revents: EpollFlags) -> Result<()> {
        // A timer error should not happen; if it does, stop listening to
        // the timer but keep the client usable.
        if revents.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR) {
            let _ = self.epoll.delete(&self.timer);
            return Err(WfdError::Internal);
        }

        if revents.contains(EpollFlags::EPOLLIN) {
            if let Err(e) = self.liveness_probe() {
                tracing::warn!(error = %e, "supplicant liveness probe failed");
                let _ = self.epoll.delete(&self.timer);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Consume the timer expiration and probe the daemon with `PING`.
    fn liveness_probe(&mut self) -> Result<()> {
        let mut expirations = [0u8; 8];
        match unistd::read(self.timer.as_fd().as_raw_fd(), &mut expirations) {
            Ok(n) if n == expirations.len() => {}
            Ok(_) => return Ok(()),
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let Some(conn) = &self.conn else {
            return Err(WfdError::NotOpen);
        };

        let mut reply = [0u8; 16];
        let len = request_on_fd(&conn.req.fd, b"PING", &mut reply, None, &self.sigmask)?;
        if &reply[..len] != b"PONG\n" {
            return Err(WfdError::ProtocolMalformed("expected PONG reply"));
        }
        tracing::trace!("supplicant liveness probe acknowledged");
        Ok(())
    }
}

impl AsRawFd for WpaCtrl {
    /// The multiplexer descriptor, for embedding in an external event
    /// loop. Readable whenever [`dispatch`](WpaCtrl::dispatch) has work.
    fn as_raw_fd(&self) -> RawFd {
        self.epoll.0.as_raw_fd()
    }
}

impl Drop for WpaCtrl {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WpaCtrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WpaCtrl")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Bind `fd` to a fresh `/tmp/libwfd-wpa-ctrl-<pid>-<counter>` name.
///
/// The supplicant refuses (and old versions crash on) unbound clients, so
/// a real name is required. A stale name from a crashed process is
/// unlinked and retried once.
fn bind_socket(fd: &OwnedFd) -> Result<PathBuf> {
    let counter = BOUND_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = PathBuf::from(format!(
        "/tmp/libwfd-wpa-ctrl-{}-{}",
        process::id(),
        counter
    ));

    let addr = UnixAddr::new(&path)?;
    match socket::bind(fd.as_raw_fd(), &addr) {
        Ok(()) => Ok(path),
        Err(Errno::EADDRINUSE) => {
            let _ = std::fs::remove_file(&path);
            socket::bind(fd.as_raw_fd(), &addr)?;
            Ok(path)
        }
        Err(e) => Err(e.into()),
    }
}

fn connect_socket(fd: &OwnedFd, ctrl_path: &str) -> Result<()> {
    let addr = if let Some(name) = ctrl_path.strip_prefix(ABSTRACT_PREFIX) {
        UnixAddr::new_abstract(name.as_bytes())?
    } else {
        UnixAddr::new(Path::new(ctrl_path))?
    };
    socket::connect(fd.as_raw_fd(), &addr)?;
    Ok(())
}

/// Timed request/reply on one socket.
///
/// Used both for the public request API (on the request socket) and the
/// `ATTACH`/`DETACH` handshakes (on the event socket, before/after it is
/// subscribed).
fn request_on_fd(
    fd: &OwnedFd,
    cmd: &[u8],
    reply: &mut [u8],
    timeout: Option<Duration>,
    mask: &SigSet,
) -> Result<usize> {
    if cmd.is_empty() {
        return Err(WfdError::InvalidArgument("empty command"));
    }
    if reply.is_empty() {
        return Err(WfdError::InvalidArgument("empty reply buffer"));
    }

    let budget = timeout
        .unwrap_or(LIVENESS_INTERVAL)
        .min(LIVENESS_INTERVAL);
    let deadline = Instant::now() + budget;

    timed_send(fd, cmd, deadline, mask)?;
    timed_recv(fd, reply, deadline, mask)
}

fn request_on_fd_ok(
    fd: &OwnedFd,
    cmd: &[u8],
    timeout: Option<Duration>,
    mask: &SigSet,
) -> Result<()> {
    let mut reply = [0u8; REQ_REPLY_MAX];
    let len = request_on_fd(fd, cmd, &mut reply, timeout, mask)?;
    if &reply[..len] != b"OK\n" {
        return Err(WfdError::ProtocolMalformed("expected OK reply"));
    }
    Ok(())
}

/// Poll for write readiness until `deadline`, then send the datagram.
///
/// A short send is accepted: the kernel queues a datagram whole or not at
/// all, and if it could not be queued the peer's error reply surfaces the
/// problem.
fn timed_send(fd: &OwnedFd, cmd: &[u8], deadline: Instant, mask: &SigSet) -> Result<()> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut fds = [PollFd::new(
            fd.as_fd(),
            PollFlags::POLLOUT | PollFlags::POLLHUP | PollFlags::POLLERR,
        )];

        let n = match ppoll(&mut fds, Some(TimeSpec::from_duration(remaining)), Some(*mask)) {
            Ok(n) => n,
            Err(Errno::EAGAIN) => 0,
            Err(e) => return Err(e.into()),
        };

        if n > 0 {
            let revents = fds[0].revents().unwrap_or(PollFlags::empty());
            if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR) {
                return Err(WfdError::PipeClosed);
            }

            match socket::send(fd.as_raw_fd(), cmd, MsgFlags::MSG_NOSIGNAL) {
                Ok(len) if len > 0 => return Ok(()),
                Ok(_) => {}
                Err(Errno::EAGAIN) | Err(Errno::EINTR) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if Instant::now() >= deadline {
            return Err(WfdError::Timeout);
        }
    }
}

/// Poll for read readiness until `deadline` and take one reply datagram.
/// Event datagrams (`<`) never belong on a request exchange and are
/// skipped.
fn timed_recv(
    fd: &OwnedFd,
    reply: &mut [u8],
    deadline: Instant,
    mask: &SigSet,
) -> Result<usize> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut fds = [PollFd::new(
            fd.as_fd(),
            PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR,
        )];

        let n = match ppoll(&mut fds, Some(TimeSpec::from_duration(remaining)), Some(*mask)) {
            Ok(n) => n,
            Err(Errno::EAGAIN) => 0,
            Err(e) => return Err(e.into()),
        };

        if n > 0 {
            let revents = fds[0].revents().unwrap_or(PollFlags::empty());
            if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR) {
                return Err(WfdError::PipeClosed);
            }

            match socket::recv(fd.as_raw_fd(), reply, MsgFlags::MSG_DONTWAIT) {
                Ok(len) if len > 0 && reply[0] != b'<' => return Ok(len),
                Ok(_) => {}
                Err(Errno::EAGAIN) | Err(Errno::EINTR) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if Instant::now() >= deadline {
            return Err(WfdError::Timeout);
        }
    }
}
