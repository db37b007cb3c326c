//! Terminal surface seam
//!
//! The surface is whatever renders output and owns the screen buffer (a
//! terminal widget, or the local tty in the CLI). Keystrokes and resizes
//! flow the other way through `TransportHandle::input`/`resize`.

use shellgate_protocol::TerminalSize;

pub trait TerminalSurface: Send + 'static {
    /// Write raw gateway output. Called in arrival order.
    fn write(&mut self, data: &str);

    /// Current size in cells
    fn size(&self) -> TerminalSize;
}

impl TerminalSurface for Box<dyn TerminalSurface> {
    fn write(&mut self, data: &str) {
        (**self).write(data)
    }

    fn size(&self) -> TerminalSize {
        (**self).size()
    }
}
