//! Line-oriented response channel.
//!
//! The host process answers its caller with one JSON document per line on
//! stdout. Anything else written there while an external parser runs would
//! corrupt that channel, so the channel can be muted for the duration of a
//! call. Muting is scoped: the returned [`MuteGuard`] restores the channel
//! when dropped, on every exit path.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

struct ChannelState {
    writer: Box<dyn Write + Send>,
    mute_depth: usize,
}

/// Shared handle to the response channel. Clones write to the same sink.
#[derive(Clone)]
pub struct OutputChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl OutputChannel {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChannelState {
                writer: Box::new(writer),
                mute_depth: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Discard all writes until the guard is dropped. Guards nest.
    pub fn mute(&self) -> MuteGuard {
        self.lock().mute_depth += 1;
        MuteGuard {
            channel: self.clone(),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.lock().mute_depth > 0
    }

    /// Write one line. Silently dropped while muted.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut state = self.lock();
        if state.mute_depth > 0 {
            return Ok(());
        }
        state.writer.write_all(line.as_bytes())?;
        state.writer.write_all(b"\n")?;
        state.writer.flush()
    }

    pub fn write_json<T: Serialize>(&self, value: &T) -> io::Result<()> {
        let line = serde_json::to_string(value).map_err(io::Error::other)?;
        self.write_line(&line)
    }
}

/// Scoped mute of an [`OutputChannel`].
#[must_use = "the channel is unmuted as soon as the guard is dropped"]
pub struct MuteGuard {
    channel: OutputChannel,
}

impl Drop for MuteGuard {
    fn drop(&mut self) {
        let mut state = self.channel.lock();
        state.mute_depth = state.mute_depth.saturating_sub(1);
    }
}

/// In-memory writer whose contents can be inspected from another handle.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
