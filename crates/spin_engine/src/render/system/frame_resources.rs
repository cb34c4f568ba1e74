//! Frames in flight
//!
//! Each slot carries the two semaphores and the fence for one pending submission.
//! Swapchain images are tracked separately: an image remembers which slot last rendered
//! into it, so the image's command buffer and uniform block are never rewritten while
//! that slot's submission is still executing.

use crate::render::backends::vulkan::VulkanResult;
use crate::render::system::GraphicsDevice;

/// Synchronization objects for one frame in flight
pub struct FrameSlot<D: GraphicsDevice> {
    /// Signaled when the acquired image is ready to be rendered into
    pub image_available: D::Semaphore,
    /// Signaled when rendering finished; presentation waits on it
    pub render_finished: D::Semaphore,
    /// Signaled when the slot's submission completed on the GPU
    pub in_flight: D::Fence,
    /// A submission using this slot may still be executing
    pub pending: bool,
}

/// The ring of frame slots plus the image ownership table
pub struct FrameResourceSet<D: GraphicsDevice> {
    slots: Vec<FrameSlot<D>>,
    current: usize,
    image_owners: Vec<Option<usize>>,
}

impl<D: GraphicsDevice> Default for FrameResourceSet<D> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            current: 0,
            image_owners: Vec::new(),
        }
    }
}

impl<D: GraphicsDevice> FrameResourceSet<D> {
    /// Create `frames` slots with signaled fences for a chain of `image_count` images
    pub fn create(device: &D, frames: usize, image_count: usize) -> VulkanResult<Self> {
        let slots = (0..frames)
            .map(|_| {
                Ok(FrameSlot {
                    image_available: device.create_semaphore()?,
                    render_finished: device.create_semaphore()?,
                    in_flight: device.create_fence(true)?,
                    pending: false,
                })
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self {
            slots,
            current: 0,
            image_owners: vec![None; image_count],
        })
    }

    /// No slots exist (minimized or before the first chain)
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot the next frame uses
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The slot the next frame uses
    ///
    /// # Panics
    ///
    /// Panics if the set is empty; callers check [`Self::is_empty`] first.
    pub fn current(&self) -> &FrameSlot<D> {
        &self.slots[self.current]
    }

    /// Move to the next slot
    pub fn advance(&mut self) {
        if !self.slots.is_empty() {
            self.current = (self.current + 1) % self.slots.len();
        }
    }

    /// Wait until the current slot's previous submission has finished
    ///
    /// A slot whose last submission was rejected has nothing to wait for; its fence
    /// would never signal.
    pub fn wait_current(&mut self, device: &D, timeout_ns: u64) -> VulkanResult<()> {
        let slot = &mut self.slots[self.current];
        if slot.pending {
            device.wait_for_fence(&slot.in_flight, timeout_ns)?;
            slot.pending = false;
        }
        Ok(())
    }

    /// Wait for the slot that last rendered into `image_index`, if it is another slot
    pub fn wait_for_image_owner(&mut self, device: &D, image_index: usize, timeout_ns: u64) -> VulkanResult<()> {
        let Some(Some(owner)) = self.image_owners.get(image_index).copied() else {
            return Ok(());
        };
        if owner == self.current {
            return Ok(());
        }

        let slot = &mut self.slots[owner];
        if slot.pending {
            device.wait_for_fence(&slot.in_flight, timeout_ns)?;
            slot.pending = false;
        }
        Ok(())
    }

    /// Record that the current slot renders into `image_index`
    pub fn claim_image(&mut self, image_index: usize) {
        if let Some(owner) = self.image_owners.get_mut(image_index) {
            *owner = Some(self.current);
        }
    }

    /// Unsignal the current fence right before it is handed to a submission
    pub fn arm_current(&mut self, device: &D) -> VulkanResult<()> {
        let slot = &mut self.slots[self.current];
        device.reset_fence(&slot.in_flight)?;
        slot.pending = true;
        Ok(())
    }

    /// Clear `pending` on the current slot after its submission was rejected
    pub fn disarm_current(&mut self) {
        if let Some(slot) = self.slots.get_mut(self.current) {
            slot.pending = false;
        }
    }

    /// Number of slots that may still have GPU work in flight
    pub fn outstanding(&self) -> usize {
        self.slots.iter().filter(|slot| slot.pending).count()
    }

    /// Empty the set, handing back the availability semaphores
    ///
    /// Those semaphores may still be referenced by an acquire on the chain being
    /// replaced, so the caller keeps them until that chain is gone. Everything else is
    /// dropped here; the device must be idle.
    pub fn retire(&mut self) -> Vec<D::Semaphore> {
        self.current = 0;
        self.image_owners.clear();
        self.slots.drain(..).map(|slot| slot.image_available).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::system::testing::{Kind, MockDevice};

    #[test]
    fn test_create_starts_signaled_and_idle() {
        let device = MockDevice::new();
        let frames = FrameResourceSet::create(&device, 3, 4).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames.current_index(), 0);
        assert_eq!(frames.outstanding(), 0);
        assert_eq!(device.journal().live(Kind::Semaphore), 6);
        assert_eq!(device.journal().live(Kind::Fence), 3);
        assert!(device.is_signaled(&frames.current().in_flight));
    }

    #[test]
    fn test_advance_wraps() {
        let device = MockDevice::new();
        let mut frames = FrameResourceSet::create(&device, 2, 3).unwrap();
        frames.advance();
        assert_eq!(frames.current_index(), 1);
        frames.advance();
        assert_eq!(frames.current_index(), 0);

        let mut empty = FrameResourceSet::<MockDevice>::default();
        empty.advance();
        assert_eq!(empty.current_index(), 0);
    }

    #[test]
    fn test_arm_then_wait_round_trip() {
        let device = MockDevice::new();
        let mut frames = FrameResourceSet::create(&device, 2, 2).unwrap();

        frames.arm_current(&device).unwrap();
        assert_eq!(frames.outstanding(), 1);
        assert!(!device.is_signaled(&frames.current().in_flight));

        device.submit_fence(&frames.current().in_flight);
        frames.wait_current(&device, u64::MAX).unwrap();
        assert_eq!(frames.outstanding(), 0);
        assert_eq!(device.journal().count("wait_fence"), 1);
    }

    #[test]
    fn test_rejected_submission_is_not_waited_on() {
        let device = MockDevice::new();
        let mut frames = FrameResourceSet::create(&device, 2, 2).unwrap();

        frames.arm_current(&device).unwrap();
        frames.disarm_current();

        // The fence stays unsignaled forever; waiting on it would fail
        frames.wait_current(&device, 1_000).unwrap();
        frames.arm_current(&device).unwrap();
        assert_eq!(device.journal().count("wait_fence"), 0);
    }

    #[test]
    fn test_image_owner_wait_only_for_other_pending_slot() {
        let device = MockDevice::new();
        let mut frames = FrameResourceSet::create(&device, 2, 3).unwrap();

        frames.claim_image(1);
        frames.arm_current(&device).unwrap();
        device.submit_fence(&frames.current().in_flight);
        frames.advance();

        // Slot 1 reuses image 1 while slot 0 still renders into it
        frames.wait_for_image_owner(&device, 1, u64::MAX).unwrap();
        assert_eq!(frames.outstanding(), 0);
        assert_eq!(device.journal().count("wait_fence"), 1);

        // Unowned images need no wait
        frames.wait_for_image_owner(&device, 2, u64::MAX).unwrap();
        assert_eq!(device.journal().count("wait_fence"), 1);
    }

    #[test]
    fn test_retire_keeps_only_availability_semaphores() {
        let device = MockDevice::new();
        let mut frames = FrameResourceSet::create(&device, 3, 3).unwrap();

        let kept = frames.retire();
        assert!(frames.is_empty());
        assert_eq!(kept.len(), 3);
        assert_eq!(device.journal().live(Kind::Semaphore), 3);
        assert_eq!(device.journal().live(Kind::Fence), 0);

        drop(kept);
        assert_eq!(device.journal().live(Kind::Semaphore), 0);
    }
}
