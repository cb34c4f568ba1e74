//! Cooperative pause handshake between the event thread and the render thread
//!
//! The event thread asks the render thread to park at its next checkpoint before
//! touching anything the render thread may be using. The wait for the acknowledgement
//! is bounded; a request that times out is withdrawn so the render thread never parks
//! with nobody left to resume it.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Pause tri-state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    /// Worker is drawing frames
    Running,
    /// A pause was requested; the worker has not reached its checkpoint yet
    PauseRequested,
    /// Worker is parked at its checkpoint
    Paused,
}

/// Result of [`PauseCoordinator::request_pause`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    /// The worker acknowledged and is parked
    Paused,
    /// The worker was already parked by an earlier request
    AlreadyPaused,
    /// No acknowledgement in time, or shutting down; nothing may be torn down
    TimedOut,
}

#[derive(Debug)]
struct Inner {
    state: PauseState,
    shutdown: bool,
}

/// Shared pause state plus the "swapchain recreated" flag
#[derive(Debug)]
pub struct PauseCoordinator {
    inner: Mutex<Inner>,
    paused: Condvar,
    resumed: Condvar,
    recreated: AtomicBool,
    timeout: Duration,
}

impl PauseCoordinator {
    /// Create with the bound on how long `request_pause` waits
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: PauseState::Running,
                shutdown: false,
            }),
            paused: Condvar::new(),
            resumed: Condvar::new(),
            recreated: AtomicBool::new(false),
            timeout,
        }
    }

    /// Ask the worker to park and wait for it to do so
    pub fn request_pause(&self) -> PauseOutcome {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return PauseOutcome::TimedOut;
        }
        if inner.state == PauseState::Paused {
            log::debug!("Pause requested while already paused");
            return PauseOutcome::AlreadyPaused;
        }

        inner.state = PauseState::PauseRequested;
        self.resumed.notify_all();
        log::debug!("Pause requested");

        let deadline = Instant::now() + self.timeout;
        while inner.state == PauseState::PauseRequested && !inner.shutdown {
            if self.paused.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }

        match inner.state {
            PauseState::Paused => {
                log::debug!("Render thread parked");
                PauseOutcome::Paused
            }
            _ => {
                inner.state = PauseState::Running;
                PauseOutcome::TimedOut
            }
        }
    }

    /// Worker checkpoint between frames; returns whether it parked
    pub fn checkpoint(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.shutdown || inner.state != PauseState::PauseRequested {
            return false;
        }

        inner.state = PauseState::Paused;
        self.paused.notify_all();

        while inner.state == PauseState::Paused && !inner.shutdown {
            self.resumed.wait(&mut inner);
        }
        log::debug!("Render thread resumed");
        true
    }

    /// Let a parked worker continue
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        if inner.state == PauseState::Running {
            log::warn!("Resume called while the render thread is already running");
        }
        inner.state = PauseState::Running;
        self.resumed.notify_all();
    }

    /// Record that the swapchain was rebuilt
    pub fn mark_recreated(&self) {
        self.recreated.store(true, Ordering::Release);
    }

    /// Consume the recreated flag
    pub fn take_recreated(&self) -> bool {
        self.recreated.swap(false, Ordering::AcqRel)
    }

    /// Release a parked worker for good; checkpoints stop blocking
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        inner.state = PauseState::Running;
        self.resumed.notify_all();
        self.paused.notify_all();
    }

    /// Whether the worker is parked
    pub fn is_paused(&self) -> bool {
        self.inner.lock().state == PauseState::Paused
    }

    /// Current tri-state
    pub fn state(&self) -> PauseState {
        self.inner.lock().state
    }
}

impl Default for PauseCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn spawn_worker(coordinator: &Arc<PauseCoordinator>) -> thread::JoinHandle<usize> {
        let coordinator = Arc::clone(coordinator);
        thread::spawn(move || {
            let mut parks = 0;
            let started = Instant::now();
            while started.elapsed() < Duration::from_secs(5) {
                if coordinator.checkpoint() {
                    parks += 1;
                }
                if coordinator.inner.lock().shutdown {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
            parks
        })
    }

    #[test]
    fn test_request_parks_worker_and_resume_releases_it() {
        let coordinator = Arc::new(PauseCoordinator::new(Duration::from_secs(2)));
        let worker = spawn_worker(&coordinator);

        assert_eq!(coordinator.request_pause(), PauseOutcome::Paused);
        assert!(coordinator.is_paused());

        coordinator.resume();
        assert_eq!(coordinator.state(), PauseState::Running);

        coordinator.shutdown();
        assert_eq!(worker.join().unwrap(), 1);
    }

    #[test]
    fn test_second_request_while_parked_does_not_block() {
        let coordinator = Arc::new(PauseCoordinator::new(Duration::from_secs(2)));
        let worker = spawn_worker(&coordinator);

        assert_eq!(coordinator.request_pause(), PauseOutcome::Paused);

        let started = Instant::now();
        assert_eq!(coordinator.request_pause(), PauseOutcome::AlreadyPaused);
        assert!(started.elapsed() < Duration::from_millis(50));

        coordinator.resume();
        coordinator.shutdown();
        worker.join().unwrap();
    }

    #[test]
    fn test_timeout_without_worker_withdraws_request() {
        let coordinator = PauseCoordinator::new(Duration::from_millis(20));

        let started = Instant::now();
        assert_eq!(coordinator.request_pause(), PauseOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(coordinator.state(), PauseState::Running);

        // A late checkpoint must not park
        assert!(!coordinator.checkpoint());
    }

    #[test]
    fn test_shutdown_releases_parked_worker() {
        let coordinator = Arc::new(PauseCoordinator::new(Duration::from_secs(2)));
        let worker = spawn_worker(&coordinator);

        assert_eq!(coordinator.request_pause(), PauseOutcome::Paused);
        coordinator.shutdown();
        assert_eq!(worker.join().unwrap(), 1);

        assert!(!coordinator.checkpoint());
        assert_eq!(coordinator.request_pause(), PauseOutcome::TimedOut);
    }

    #[test]
    fn test_recreated_flag_is_consumed_once() {
        let coordinator = PauseCoordinator::default();
        assert!(!coordinator.take_recreated());

        coordinator.mark_recreated();
        coordinator.mark_recreated();
        assert!(coordinator.take_recreated());
        assert!(!coordinator.take_recreated());
    }

    #[test]
    fn test_resume_while_running_is_harmless() {
        let coordinator = PauseCoordinator::default();
        coordinator.resume();
        assert_eq!(coordinator.state(), PauseState::Running);
        assert!(!coordinator.checkpoint());
    }
}
