//! Local terminal plumbing for the CLI: raw mode, window size, stdin, and a
//! surface per session that writes to stdout while it is in the foreground.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use shellgate_protocol::TerminalSize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::session::SessionId;
use crate::surface::TerminalSurface;

/// Output kept per background session
const BACKLOG_LIMIT: usize = 64 * 1024;

/// Restores the original termios on drop.
pub struct RawModeGuard {
    fd: RawFd,
    original: libc::termios,
}

impl RawModeGuard {
    pub fn enter() -> io::Result<Self> {
        let fd = io::stdin().as_raw_fd();

        let mut termios = std::mem::MaybeUninit::<libc::termios>::uninit();
        // SAFETY: tcgetattr fully initializes `termios` when it returns 0.
        if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let original = unsafe { termios.assume_init() };

        let mut raw = original;
        raw.c_iflag &= !(libc::BRKINT | libc::ICRNL | libc::INPCK | libc::ISTRIP | libc::IXON);
        raw.c_oflag &= !libc::OPOST;
        raw.c_cflag |= libc::CS8;
        raw.c_lflag &= !(libc::ECHO | libc::ICANON | libc::IEXTEN | libc::ISIG);
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;

        // SAFETY: `raw` is a valid termios derived from the current settings.
        if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        debug!(component = "tty", event = "tty.raw.enter", "Entered raw mode");
        Ok(Self { fd, original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        // SAFETY: restoring settings captured from the same fd.
        if unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &self.original) } != 0 {
            warn!(
                component = "tty",
                event = "tty.raw.restore_failed",
                error = %io::Error::last_os_error(),
                "Failed to restore terminal settings"
            );
        }
    }
}

/// Size of the controlling terminal, 80x24 when it cannot be queried.
pub fn terminal_size() -> TerminalSize {
    let fd = io::stdout().as_raw_fd();
    let mut winsize = std::mem::MaybeUninit::<libc::winsize>::uninit();
    // SAFETY: TIOCGWINSZ writes a winsize on success.
    if unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, winsize.as_mut_ptr()) } != 0 {
        return TerminalSize::default();
    }
    let winsize = unsafe { winsize.assume_init() };
    if winsize.ws_col == 0 || winsize.ws_row == 0 {
        return TerminalSize::default();
    }
    TerminalSize::new(winsize.ws_col, winsize.ws_row)
}

/// Read stdin on a blocking thread. The channel closes on EOF.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut buf = [0u8; 4096];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(component = "tty", event = "tty.stdin.error", error = %e, "stdin read failed");
                    break;
                }
            }
        }
        debug!(component = "tty", event = "tty.stdin.eof", "stdin closed");
    });
    rx
}

/// Routes each session's output to stdout or to its backlog.
#[derive(Clone, Default)]
pub struct Screen {
    foreground: Arc<ArcSwapOption<SessionId>>,
    backlogs: Arc<Mutex<HashMap<SessionId, Arc<Mutex<String>>>>>,
}

impl Screen {
    pub fn surface(&self, session_id: SessionId) -> TtySurface {
        let backlog = Arc::new(Mutex::new(String::new()));
        if let Ok(mut backlogs) = self.backlogs.lock() {
            backlogs.insert(session_id.clone(), Arc::clone(&backlog));
        }
        TtySurface {
            session_id,
            foreground: Arc::clone(&self.foreground),
            backlog,
            out: Box::new(io::stdout()),
        }
    }

    /// Bring a session to the foreground and replay what it wrote meanwhile.
    pub fn focus(&self, session_id: Option<&SessionId>) {
        let backlog = session_id.and_then(|id| {
            self.backlogs
                .lock()
                .ok()
                .and_then(|backlogs| backlogs.get(id).cloned())
        });
        let Some(backlog) = backlog else {
            self.foreground.store(session_id.cloned().map(Arc::new));
            return;
        };

        let Ok(mut pending) = backlog.lock() else {
            return;
        };
        self.foreground.store(session_id.cloned().map(Arc::new));
        if !pending.is_empty() {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(pending.as_bytes());
            let _ = stdout.flush();
            pending.clear();
        }
    }

    pub fn forget(&self, session_id: &SessionId) {
        if let Ok(mut backlogs) = self.backlogs.lock() {
            backlogs.remove(session_id);
        }
    }
}

pub struct TtySurface {
    session_id: SessionId,
    foreground: Arc<ArcSwapOption<SessionId>>,
    backlog: Arc<Mutex<String>>,
    out: Box<dyn Write + Send>,
}

impl TtySurface {
    fn is_foreground(&self) -> bool {
        self.foreground
            .load()
            .as_deref()
            .is_some_and(|id| id == &self.session_id)
    }
}

impl TerminalSurface for TtySurface {
    fn write(&mut self, data: &str) {
        let Ok(mut backlog) = self.backlog.lock() else {
            return;
        };
        if self.is_foreground() {
            let _ = self.out.write_all(data.as_bytes());
            let _ = self.out.flush();
            return;
        }

        backlog.push_str(data);
        if backlog.len() > BACKLOG_LIMIT {
            let mut cut = backlog.len() - BACKLOG_LIMIT;
            while !backlog.is_char_boundary(cut) {
                cut += 1;
            }
            backlog.drain(..cut);
        }
    }

    fn size(&self) -> TerminalSize {
        terminal_size()
    }
}
