//! The render thread

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::system::{FrameOutcome, GraphicsDevice, PauseCoordinator, Renderer};

/// Handle to the running render thread
pub struct RenderLoop {
    stop: Arc<AtomicBool>,
    coordinator: Arc<PauseCoordinator>,
    handle: Option<JoinHandle<VulkanResult<()>>>,
}

impl RenderLoop {
    /// Spawn the thread named `render`
    ///
    /// `wake` is called when the thread dies from a lost device, so an event loop blocked
    /// waiting for window events notices.
    pub fn spawn<D, W>(
        renderer: Arc<Mutex<Renderer<D>>>,
        coordinator: Arc<PauseCoordinator>,
        minimized_poll: Duration,
        wake: W,
    ) -> std::io::Result<Self>
    where
        D: GraphicsDevice + 'static,
        W: Fn() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            let coordinator = Arc::clone(&coordinator);
            thread::Builder::new()
                .name("render".to_string())
                .spawn(move || run(&renderer, &coordinator, &stop, minimized_poll, &wake))?
        };

        Ok(Self {
            stop,
            coordinator,
            handle: Some(handle),
        })
    }

    /// Stop the thread and return how it ended
    pub fn stop(&mut self) -> VulkanResult<()> {
        self.stop.store(true, Ordering::Release);
        self.coordinator.shutdown();

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle.join().map_err(|_| VulkanError::InvalidOperation {
            reason: "render thread panicked".to_string(),
        })?
    }

    /// Whether the thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Render thread ended with error: {e}");
        }
    }
}

fn run<D: GraphicsDevice>(
    renderer: &Mutex<Renderer<D>>,
    coordinator: &PauseCoordinator,
    stop: &AtomicBool,
    minimized_poll: Duration,
    wake: &dyn Fn(),
) -> VulkanResult<()> {
    log::debug!("Render thread started");
    let mut failed_without_chain = 0_u32;

    while !stop.load(Ordering::Acquire) {
        coordinator.checkpoint();
        if stop.load(Ordering::Acquire) {
            break;
        }

        let (outcome, has_live_chain) = {
            let mut renderer = renderer.lock();
            let outcome = renderer.draw_frame();
            (outcome, renderer.has_live_chain())
        };
        match outcome {
            Ok(FrameOutcome::Presented) => {}
            Ok(FrameOutcome::Recreated) => coordinator.mark_recreated(),
            Ok(FrameOutcome::Minimized) => thread::sleep(minimized_poll),
            Err(e) if e.is_device_lost() => {
                log::error!("Device lost, render thread exiting: {e}");
                wake();
                return Err(e);
            }
            Err(e) if has_live_chain => log::error!("Frame failed: {e}"),
            Err(e) => {
                // Nothing to draw until recreation succeeds; retry at the minimized pace
                if failed_without_chain == 0 {
                    log::error!("Swapchain recreation failed, retrying: {e}");
                } else {
                    log::debug!("Swapchain recreation failed again ({failed_without_chain}): {e}");
                }
                failed_without_chain = failed_without_chain.saturating_add(1);
                thread::sleep(minimized_poll);
                continue;
            }
        }
        failed_without_chain = 0;
    }

    log::debug!("Render thread stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::VulkanRendererConfig;
    use crate::input::SpinControl;
    use crate::render::system::testing::{Kind, MockDevice};
    use crate::render::system::{FramebufferExtent, PauseOutcome};
    use ash::vk;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn shared_renderer(width: u32, height: u32) -> (Arc<Mutex<Renderer<MockDevice>>>, MockDevice) {
        let device = MockDevice::new();
        let renderer = Renderer::new(
            device.clone(),
            &VulkanRendererConfig::default(),
            Arc::new(SpinControl::default()),
            Arc::new(FramebufferExtent::new(width, height)),
        );
        (Arc::new(Mutex::new(renderer)), device)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_thread_draws_until_stopped() {
        let (renderer, device) = shared_renderer(600, 600);
        let coordinator = Arc::new(PauseCoordinator::default());
        let mut render_loop =
            RenderLoop::spawn(renderer, Arc::clone(&coordinator), Duration::from_millis(1), || {}).unwrap();

        assert!(wait_for(|| device.journal().count("present") >= 10));
        assert!(!render_loop.is_finished());

        render_loop.stop().unwrap();
        assert!(render_loop.is_finished());
    }

    #[test]
    fn test_per_frame_error_does_not_stop_thread() {
        let (renderer, device) = shared_renderer(600, 600);
        device.fail_next("submit");
        let mut render_loop = RenderLoop::spawn(
            renderer,
            Arc::new(PauseCoordinator::default()),
            Duration::from_millis(1),
            || {},
        )
        .unwrap();

        assert!(wait_for(|| device.journal().count("present") >= 5));
        render_loop.stop().unwrap();
    }

    #[test]
    fn test_device_lost_ends_thread_and_wakes_event_loop() {
        let (renderer, device) = shared_renderer(600, 600);
        device.fail_next_with("submit", vk::Result::ERROR_DEVICE_LOST);

        let wakes = Arc::new(AtomicUsize::new(0));
        let wake = {
            let wakes = Arc::clone(&wakes);
            move || {
                wakes.fetch_add(1, Ordering::SeqCst);
            }
        };
        let mut render_loop =
            RenderLoop::spawn(renderer, Arc::new(PauseCoordinator::default()), Duration::from_millis(1), wake)
                .unwrap();

        assert!(wait_for(|| render_loop.is_finished()));
        assert_eq!(wakes.load(Ordering::SeqCst), 1);
        assert!(render_loop.stop().unwrap_err().is_device_lost());
    }

    #[test]
    fn test_failing_recreation_is_retried_at_poll_interval() {
        let (renderer, device) = shared_renderer(600, 600);
        for _ in 0..10_000 {
            device.fail_next("create_pipeline");
        }
        let mut render_loop = RenderLoop::spawn(
            Arc::clone(&renderer),
            Arc::new(PauseCoordinator::default()),
            Duration::from_millis(20),
            || {},
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        render_loop.stop().unwrap();

        let attempts = device.journal().created(Kind::Chain).len();
        assert!(attempts >= 1);
        assert!(attempts <= 10, "{attempts} recreation attempts");
        assert!(!renderer.lock().has_live_chain());
        assert_eq!(device.journal().count("submit"), 0);
    }

    #[test]
    fn test_minimized_thread_idles_and_parks_on_request() {
        let (renderer, device) = shared_renderer(0, 0);
        let coordinator = Arc::new(PauseCoordinator::default());
        let mut render_loop =
            RenderLoop::spawn(renderer, Arc::clone(&coordinator), Duration::from_millis(2), || {}).unwrap();

        thread::sleep(Duration::from_millis(20));
        assert_eq!(device.journal().count("submit"), 0);

        assert_ne!(coordinator.request_pause(), PauseOutcome::TimedOut);
        coordinator.resume();
        render_loop.stop().unwrap();
        assert_eq!(device.journal().total_live(), 0);
    }
}
