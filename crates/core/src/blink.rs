//! Cursor blink timer
//!
//! Runs on a dedicated thread and periodically flips a visibility flag.
//! The flag is owned separately from the [`ConsoleGrid`](crate::ConsoleGrid)
//! so the timer never needs the grid lock and can never touch cell contents.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Default blink half-period.
pub const DEFAULT_BLINK_INTERVAL: Duration = Duration::from_millis(530);

/// Shared cursor visibility flag.
#[derive(Debug, Clone, Default)]
pub struct CursorBlink {
    visible: Arc<AtomicBool>,
}

impl CursorBlink {
    pub fn new() -> Self {
        CursorBlink {
            visible: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    pub fn toggle(&self) {
        self.visible.fetch_xor(true, Ordering::Relaxed);
    }
}

/// Handle to a running blink thread. Dropping it stops the thread.
pub struct BlinkTimer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BlinkTimer {
    pub fn start(blink: CursorBlink, interval: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("relic-blink".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::Relaxed) {
                    std::thread::park_timeout(interval);
                    if thread_stop.load(Ordering::Relaxed) {
                        break;
                    }
                    blink.toggle();
                }
            })?;
        Ok(BlinkTimer {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for BlinkTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{ConsoleGrid, ConsoleSink};

    #[test]
    fn test_toggle_flips_visibility() {
        let blink = CursorBlink::new();
        assert!(blink.is_visible());
        blink.toggle();
        assert!(!blink.is_visible());
        blink.toggle();
        assert!(blink.is_visible());
    }

    #[test]
    fn test_timer_never_touches_cells() {
        let grid = ConsoleGrid::shared(10, 2);
        grid.lock().unwrap().put_str("abc");
        let blink = CursorBlink::new();
        let mut timer = BlinkTimer::start(blink.clone(), Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        timer.stop();
        assert_eq!(grid.lock().unwrap().row_text(0), "abc");
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut timer = BlinkTimer::start(CursorBlink::new(), Duration::from_secs(60)).unwrap();
        timer.stop();
        timer.stop();
    }
}
