//! Main-thread side of the resize handshake

use parking_lot::Mutex;
use std::sync::Arc;

use crate::render::system::{FramebufferExtent, GraphicsDevice, PauseCoordinator, PauseOutcome, Renderer};

/// What a framebuffer resize ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// The swapchain was rebuilt for the new size
    Recreated,
    /// The render thread had already rebuilt it
    AlreadyRecreated,
    /// Zero-sized; the render thread stays parked until the next resize
    Minimized,
    /// The render thread did not park in time; nothing was touched
    TimedOut,
    /// Recreation failed; the render thread was resumed and will retry
    Failed,
}

/// Bound context for `FramebufferSize` events
pub struct ResizeHandler<D: GraphicsDevice> {
    renderer: Arc<Mutex<Renderer<D>>>,
    coordinator: Arc<PauseCoordinator>,
    extent: Arc<FramebufferExtent>,
}

impl<D: GraphicsDevice> ResizeHandler<D> {
    /// Create a handler sharing the render thread's state
    pub fn new(
        renderer: Arc<Mutex<Renderer<D>>>,
        coordinator: Arc<PauseCoordinator>,
        extent: Arc<FramebufferExtent>,
    ) -> Self {
        Self {
            renderer,
            coordinator,
            extent,
        }
    }

    /// Park the render thread and rebuild the swapchain for `width` x `height`
    pub fn on_framebuffer_resize(&self, width: u32, height: u32) -> ResizeOutcome {
        self.extent.publish(width, height);
        let minimized = self.extent.is_minimized();

        match self.coordinator.request_pause() {
            PauseOutcome::TimedOut => {
                log::warn!("Render thread did not pause in time; resize to {width}x{height} left to the render thread");
                return ResizeOutcome::TimedOut;
            }
            PauseOutcome::Paused | PauseOutcome::AlreadyPaused => {}
        }

        if minimized {
            log::debug!("Framebuffer is {width}x{height}; render thread stays parked");
            return ResizeOutcome::Minimized;
        }

        if self.coordinator.take_recreated() {
            let renderer = self.renderer.lock();
            let current = renderer.swapchain().extent();
            if renderer.has_live_chain() && (current.width, current.height) == (width, height) {
                drop(renderer);
                log::debug!("Swapchain already rebuilt by the render thread");
                self.coordinator.resume();
                return ResizeOutcome::AlreadyRecreated;
            }
        }

        let result = self.renderer.lock().recreate();
        self.coordinator.take_recreated();
        self.coordinator.resume();

        match result {
            Ok(_) => ResizeOutcome::Recreated,
            Err(e) => {
                log::error!("Swapchain recreation for {width}x{height} failed: {e}");
                ResizeOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::VulkanRendererConfig;
    use crate::input::SpinControl;
    use crate::render::system::testing::{Kind, MockDevice};
    use crate::render::system::{PauseState, RenderLoop};
    use ash::vk;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    struct Harness {
        renderer: Arc<Mutex<Renderer<MockDevice>>>,
        coordinator: Arc<PauseCoordinator>,
        handler: ResizeHandler<MockDevice>,
        device: MockDevice,
    }

    fn harness(timeout: Duration) -> Harness {
        let device = MockDevice::new();
        let extent = Arc::new(FramebufferExtent::new(600, 600));
        let renderer = Arc::new(Mutex::new(Renderer::new(
            device.clone(),
            &VulkanRendererConfig::default(),
            Arc::new(SpinControl::default()),
            Arc::clone(&extent),
        )));
        let coordinator = Arc::new(PauseCoordinator::new(timeout));
        let handler = ResizeHandler::new(Arc::clone(&renderer), Arc::clone(&coordinator), extent);
        Harness {
            renderer,
            coordinator,
            handler,
            device,
        }
    }

    /// Worker that only honours checkpoints, so the renderer is not touched after a resume
    fn checkpoint_worker(coordinator: &Arc<PauseCoordinator>, stop: &Arc<AtomicBool>) -> thread::JoinHandle<usize> {
        let coordinator = Arc::clone(coordinator);
        let stop = Arc::clone(stop);
        thread::spawn(move || {
            let mut parks = 0;
            while !stop.load(Ordering::Acquire) {
                if coordinator.checkpoint() {
                    parks += 1;
                }
                thread::sleep(Duration::from_millis(1));
            }
            parks
        })
    }

    fn finish(coordinator: &PauseCoordinator, stop: &AtomicBool, worker: thread::JoinHandle<usize>) -> usize {
        stop.store(true, Ordering::Release);
        coordinator.shutdown();
        worker.join().unwrap()
    }

    #[test]
    fn test_resize_rebuilds_chain_for_new_size() {
        let h = harness(Duration::from_secs(2));
        for _ in 0..4 {
            h.renderer.lock().draw_frame().unwrap();
        }
        let stop = Arc::new(AtomicBool::new(false));
        let worker = checkpoint_worker(&h.coordinator, &stop);

        assert_eq!(h.handler.on_framebuffer_resize(300, 300), ResizeOutcome::Recreated);
        assert_eq!(h.coordinator.state(), PauseState::Running);

        {
            let renderer = h.renderer.lock();
            assert_eq!(renderer.frame_index(), 0);
            assert_eq!(renderer.swapchain().framebuffer_count(), 3);
            for i in 0..3 {
                let framebuffer = renderer.swapchain().framebuffer(i).unwrap();
                assert_eq!(framebuffer.extent, vk::Extent2D { width: 300, height: 300 });
            }
        }

        let journal = h.device.journal();
        let chains = journal.created(Kind::Chain);
        assert_eq!(chains.len(), 2);
        assert!(journal.position("create:Chain", chains[1]) < journal.position("destroy:Chain", chains[0]));
        assert_eq!(journal.count("violation"), 0);

        assert_eq!(finish(&h.coordinator, &stop, worker), 1);
    }

    #[test]
    fn test_timeout_touches_nothing() {
        let h = harness(Duration::from_millis(20));
        h.renderer.lock().draw_frame().unwrap();

        assert_eq!(h.handler.on_framebuffer_resize(300, 300), ResizeOutcome::TimedOut);
        assert_eq!(h.coordinator.state(), PauseState::Running);
        assert_eq!(h.device.journal().created(Kind::Chain).len(), 1);

        // The render thread picks the new size up on its next recreation
        h.renderer.lock().recreate().unwrap();
        assert_eq!(
            h.renderer.lock().swapchain().extent(),
            vk::Extent2D { width: 300, height: 300 }
        );
    }

    #[test]
    fn test_minimize_keeps_worker_parked_until_restored() {
        let h = harness(Duration::from_secs(2));
        h.renderer.lock().draw_frame().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let worker = checkpoint_worker(&h.coordinator, &stop);

        assert_eq!(h.handler.on_framebuffer_resize(0, 0), ResizeOutcome::Minimized);
        assert!(h.coordinator.is_paused());
        assert_eq!(h.device.journal().created(Kind::Chain).len(), 1);

        assert_eq!(h.handler.on_framebuffer_resize(500, 400), ResizeOutcome::Recreated);
        assert!(!h.coordinator.is_paused());
        assert_eq!(
            h.renderer.lock().swapchain().extent(),
            vk::Extent2D { width: 500, height: 400 }
        );

        assert_eq!(finish(&h.coordinator, &stop, worker), 1);
    }

    #[test]
    fn test_skips_rebuild_when_render_thread_already_did_it() {
        let h = harness(Duration::from_secs(2));
        h.renderer.lock().draw_frame().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let worker = checkpoint_worker(&h.coordinator, &stop);

        h.coordinator.mark_recreated();
        assert_eq!(h.handler.on_framebuffer_resize(600, 600), ResizeOutcome::AlreadyRecreated);
        assert_eq!(h.device.journal().created(Kind::Chain).len(), 1);

        // A stale flag for another size does not skip the rebuild
        h.coordinator.mark_recreated();
        assert_eq!(h.handler.on_framebuffer_resize(300, 300), ResizeOutcome::Recreated);
        assert_eq!(h.device.journal().created(Kind::Chain).len(), 2);
        assert!(!h.coordinator.take_recreated());

        finish(&h.coordinator, &stop, worker);
    }

    #[test]
    fn test_surface_extent_overrides_framebuffer_size() {
        let h = harness(Duration::from_secs(2));
        let fixed = vk::Extent2D { width: 800, height: 600 };
        h.device.set_fixed_extent(Some(fixed));
        h.renderer.lock().draw_frame().unwrap();
        assert_eq!(h.renderer.lock().swapchain().extent(), fixed);

        let stop = Arc::new(AtomicBool::new(false));
        let worker = checkpoint_worker(&h.coordinator, &stop);

        // The chain is 800x600, so a recreated flag does not cover a 600x600 request
        h.coordinator.mark_recreated();
        assert_eq!(h.handler.on_framebuffer_resize(600, 600), ResizeOutcome::Recreated);
        assert_eq!(h.device.journal().created(Kind::Chain).len(), 2);
        assert_eq!(h.renderer.lock().swapchain().extent(), fixed);

        h.coordinator.mark_recreated();
        assert_eq!(h.handler.on_framebuffer_resize(800, 600), ResizeOutcome::AlreadyRecreated);
        assert_eq!(h.device.journal().created(Kind::Chain).len(), 2);

        finish(&h.coordinator, &stop, worker);
    }

    #[test]
    fn test_failed_recreation_still_resumes() {
        let h = harness(Duration::from_secs(2));
        h.renderer.lock().draw_frame().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let worker = checkpoint_worker(&h.coordinator, &stop);

        h.device.fail_next("create_pipeline");
        assert_eq!(h.handler.on_framebuffer_resize(300, 300), ResizeOutcome::Failed);
        assert_eq!(h.coordinator.state(), PauseState::Running);
        assert_eq!(h.device.journal().live(Kind::Chain), 0);

        finish(&h.coordinator, &stop, worker);
    }

    #[test]
    fn test_back_to_back_resizes_with_live_render_thread() {
        let h = harness(Duration::from_secs(2));
        let mut render_loop = RenderLoop::spawn(
            Arc::clone(&h.renderer),
            Arc::clone(&h.coordinator),
            Duration::from_millis(1),
            || {},
        )
        .unwrap();

        for (width, height) in [(400, 400), (300, 300), (0, 0), (640, 480), (300, 300)] {
            let outcome = h.handler.on_framebuffer_resize(width, height);
            assert!(
                !matches!(outcome, ResizeOutcome::TimedOut | ResizeOutcome::Failed),
                "{width}x{height}: {outcome:?}"
            );
        }

        render_loop.stop().unwrap();
        assert_eq!(
            h.renderer.lock().swapchain().extent(),
            vk::Extent2D { width: 300, height: 300 }
        );
        assert_eq!(h.device.journal().count("violation"), 0);
    }
}
