//! Engine gateway.
//!
//! `Terminal` owns the emulator state behind one mutex and mediates between
//! the feeder thread (child output) and consumer threads (input, rendering,
//! selection). Renderers poll `check_dirty` or block in `wait_dirty`; both
//! observe an edge-triggered flag that is armed whenever a lock holder
//! changed the state.

use std::io::{ErrorKind, Read, Write};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::TermError;
use crate::term::{Response, TerminalState, VtParser};

struct Inner {
    state: Mutex<TerminalState>,
    changed: Condvar,
    dirty: AtomicBool,
    child_exited: AtomicBool,
}

type ChildWriter = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

/// Thread-safe handle to a terminal emulator
pub struct Terminal {
    inner: Arc<Inner>,
    writer: ChildWriter,
    running: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
}

/// Exclusive access to the emulator state. Dropping the guard arms the
/// dirty flag and wakes waiters if the holder changed anything.
pub struct TerminalGuard<'a> {
    guard: MutexGuard<'a, TerminalState>,
    inner: &'a Inner,
}

impl Deref for TerminalGuard<'_> {
    type Target = TerminalState;

    fn deref(&self) -> &TerminalState {
        &self.guard
    }
}

impl DerefMut for TerminalGuard<'_> {
    fn deref_mut(&mut self) -> &mut TerminalState {
        &mut self.guard
    }
}

impl Drop for TerminalGuard<'_> {
    fn drop(&mut self) {
        if self.guard.take_dirty() {
            self.inner.dirty.store(true, Ordering::Release);
            self.inner.changed.notify_all();
        }
    }
}

impl Terminal {
    pub fn new(cols: u16, rows: u16) -> Result<Self, TermError> {
        if cols == 0 || rows == 0 {
            return Err(TermError::InvalidDimensions { cols, rows });
        }
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(TerminalState::new(cols, rows)),
                changed: Condvar::new(),
                dirty: AtomicBool::new(false),
                child_exited: AtomicBool::new(false),
            }),
            writer: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            feeder: None,
        })
    }

    pub fn with_scrollback(cols: u16, rows: u16, limit: usize) -> Result<Self, TermError> {
        let term = Self::new(cols, rows)?;
        *lock_state(&term.inner) = TerminalState::with_scrollback(cols, rows, limit);
        Ok(term)
    }

    /// Take the lock. All reads and mutations go through the returned guard.
    pub fn lock(&self) -> TerminalGuard<'_> {
        TerminalGuard {
            guard: lock_state(&self.inner),
            inner: &self.inner,
        }
    }

    /// Observe and clear the change flag.
    pub fn check_dirty(&self) -> bool {
        self.inner.dirty.swap(false, Ordering::AcqRel)
    }

    /// Block until the state changes or the timeout elapses. Clears the
    /// flag and returns whether a change was seen.
    pub fn wait_dirty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = lock_state(&self.inner);
        loop {
            if self.inner.dirty.swap(false, Ordering::AcqRel) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (g, _) = self
                .inner
                .changed
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            guard = g;
        }
    }

    /// Whether the feeder observed the child ending (EOF or read error).
    pub fn child_exited(&self) -> bool {
        self.inner.child_exited.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Attach child I/O and spawn the feeder thread. The reader is drained
    /// until EOF or error; parser responses (DSR, DA) are written straight
    /// back to the child. A previous attachment is torn down first.
    pub fn attach(
        &mut self,
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
    ) -> Result<(), TermError> {
        self.detach();

        *lock_writer(&self.writer) = Some(writer);
        self.inner.child_exited.store(false, Ordering::Release);
        self.running.store(true, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let out = Arc::clone(&self.writer);
        let running = Arc::clone(&self.running);
        let handle = thread::spawn(move || feeder_loop(reader, inner, out, running));
        self.feeder = Some(handle);
        debug!("feeder attached");
        Ok(())
    }

    /// Stop the feeder and drop the child writer.
    pub fn detach(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.feeder.take() {
            let _ = handle.join();
        }
        *lock_writer(&self.writer) = None;
    }

    /// Write raw bytes to the child (already-encoded input).
    pub fn write(&self, bytes: &[u8]) -> Result<(), TermError> {
        let mut writer = lock_writer(&self.writer);
        let Some(w) = writer.as_mut() else {
            return Err(TermError::NotAttached);
        };
        w.write_all(bytes)?;
        w.flush()?;
        Ok(())
    }

    /// Resize the grid. The caller is responsible for the matching PTY
    /// window-size ioctl.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), TermError> {
        self.lock().resize(cols, rows)
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.detach();
    }
}

fn lock_state(inner: &Inner) -> MutexGuard<'_, TerminalState> {
    inner.state.lock().unwrap_or_else(|e| e.into_inner())
}

fn lock_writer(writer: &ChildWriter) -> MutexGuard<'_, Option<Box<dyn Write + Send>>> {
    writer.lock().unwrap_or_else(|e| e.into_inner())
}

fn feeder_loop(
    mut reader: Box<dyn Read + Send>,
    inner: Arc<Inner>,
    out: ChildWriter,
    running: Arc<AtomicBool>,
) {
    let mut parser = VtParser::new();
    let mut buffer = vec![0u8; 4096];

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        match reader.read(&mut buffer) {
            Ok(0) => {
                debug!("child EOF");
                child_gone(&inner, &running);
                break;
            }
            Ok(n) => {
                trace!(bytes = n, "feed");
                let responses: Vec<Response> = {
                    let mut state = inner.state.lock().unwrap_or_else(|e| e.into_inner());
                    let responses = parser.feed(&buffer[..n], &mut state);
                    if state.take_dirty() {
                        inner.dirty.store(true, Ordering::Release);
                        inner.changed.notify_all();
                    }
                    responses
                };
                if !responses.is_empty() {
                    let mut writer = out.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(w) = writer.as_mut() {
                        for response in responses {
                            let _ = w.write_all(&response.to_bytes());
                        }
                        let _ = w.flush();
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => {
                debug!(error = %e, "child read failed");
                child_gone(&inner, &running);
                break;
            }
        }
    }
}

fn child_gone(inner: &Inner, running: &AtomicBool) {
    inner.child_exited.store(true, Ordering::Release);
    running.store(false, Ordering::SeqCst);
    inner.dirty.store(true, Ordering::Release);
    inner.changed.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    /// Route feeder log output through the test harness; honors RUST_LOG.
    fn init_tracing() {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn row_text(term: &Terminal, row: u16) -> String {
        let state = term.lock();
        let screen = state.active_screen();
        let row = &screen.rows[row as usize];
        row.cells
            .iter()
            .filter(|c| !c.is_continuation())
            .map(|c| c.display_str().to_string())
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(
            Terminal::new(0, 24),
            Err(TermError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn feeder_applies_output_and_reports_exit() {
        init_tracing();
        let mut term = Terminal::new(20, 4).unwrap();
        term.attach(
            Box::new(Cursor::new(b"hello".to_vec())),
            Box::new(SharedBuf::default()),
        )
        .unwrap();

        wait_for(|| term.child_exited());
        assert_eq!(row_text(&term, 0), "hello");
    }

    #[test]
    fn dirty_is_edge_triggered() {
        let term = Terminal::new(20, 4).unwrap();
        assert!(!term.check_dirty());
        term.lock().put_char('x');
        assert!(term.check_dirty());
        assert!(!term.check_dirty());
    }

    #[test]
    fn read_only_access_stays_clean() {
        let term = Terminal::new(20, 4).unwrap();
        {
            let state = term.lock();
            let _ = state.active_screen().total_lines();
        }
        assert!(!term.check_dirty());
    }

    #[test]
    fn wait_dirty_wakes_on_change() {
        let term = Arc::new(Terminal::new(20, 4).unwrap());
        let writer = Arc::clone(&term);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            writer.lock().put_char('x');
        });
        assert!(term.wait_dirty(Duration::from_secs(2)));
        handle.join().unwrap();
    }

    #[test]
    fn wait_dirty_times_out() {
        let term = Terminal::new(20, 4).unwrap();
        let start = Instant::now();
        assert!(!term.wait_dirty(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn responses_go_back_to_the_child() {
        init_tracing();
        let mut term = Terminal::new(20, 4).unwrap();
        let out = SharedBuf::default();
        term.attach(
            Box::new(Cursor::new(b"\x1b[6n".to_vec())),
            Box::new(out.clone()),
        )
        .unwrap();

        wait_for(|| term.child_exited());
        assert_eq!(out.contents(), b"\x1b[1;1R".to_vec());
    }

    #[test]
    fn write_requires_attachment() {
        let term = Terminal::new(20, 4).unwrap();
        assert!(matches!(term.write(b"ls"), Err(TermError::NotAttached)));
    }

    #[test]
    fn write_passes_through_unchanged() {
        let mut term = Terminal::new(20, 4).unwrap();
        let out = SharedBuf::default();
        term.attach(
            Box::new(Cursor::new(Vec::new())),
            Box::new(out.clone()),
        )
        .unwrap();
        term.write(b"ls\r").unwrap();
        assert_eq!(out.contents(), b"ls\r".to_vec());
    }

    #[test]
    fn resize_marks_dirty() {
        let term = Terminal::new(20, 4).unwrap();
        let _ = term.check_dirty();
        term.resize(30, 10).unwrap();
        assert!(term.check_dirty());
        assert_eq!(term.lock().cols, 30);
    }

    #[test]
    fn chunked_feed_matches_single_feed() {
        let payload = b"caf\xc3\xa9 \xe4\xb8\xad\xe6\x96\x87".to_vec();

        let mut whole = Terminal::new(20, 4).unwrap();
        whole
            .attach(
                Box::new(Cursor::new(payload.clone())),
                Box::new(SharedBuf::default()),
            )
            .unwrap();
        wait_for(|| whole.child_exited());

        // One byte per read via a reader that refuses larger chunks.
        struct ByteAtATime(Cursor<Vec<u8>>);
        impl Read for ByteAtATime {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.0.read(&mut buf[..1])
            }
        }
        let mut chunked = Terminal::new(20, 4).unwrap();
        chunked
            .attach(
                Box::new(ByteAtATime(Cursor::new(payload))),
                Box::new(SharedBuf::default()),
            )
            .unwrap();
        wait_for(|| chunked.child_exited());

        assert_eq!(row_text(&whole, 0), row_text(&chunked, 0));
        assert_eq!(row_text(&whole, 0), "café 中文");
    }
}
