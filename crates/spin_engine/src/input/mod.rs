//! Keyboard input
//!
//! Maps GLFW key events to application actions and carries the user-controlled spin
//! offset from the event thread to the render thread.

use glfw::{Action, Key, Modifiers};
use std::sync::atomic::{AtomicU32, Ordering};

/// What a key event asks the application to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Close the window and shut down
    Quit,
    /// Spin faster (counter-clockwise on screen)
    RotateRight,
    /// Spin slower / reverse
    RotateLeft,
    /// Switch between windowed and fullscreen
    ToggleFullscreen,
}

impl KeyAction {
    /// Translate a raw key event
    ///
    /// Rotation keys honour key repeat; the others only fire on the initial press.
    pub fn from_key(key: Key, action: Action, mods: Modifiers) -> Option<Self> {
        let pressed = action == Action::Press;
        let held = pressed || action == Action::Repeat;

        match key {
            Key::Escape if pressed => Some(Self::Quit),
            Key::Q if held => Some(Self::RotateRight),
            Key::E if held => Some(Self::RotateLeft),
            Key::Enter | Key::KpEnter if pressed && mods.contains(Modifiers::Alt) => {
                Some(Self::ToggleFullscreen)
            }
            _ => None,
        }
    }
}

/// Rotation-rate offset shared between the event and render threads
///
/// Stored as the bit pattern of an `f32` so both sides can access it without a lock.
#[derive(Debug)]
pub struct SpinControl {
    offset_bits: AtomicU32,
    step: f32,
}

impl Default for SpinControl {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl SpinControl {
    /// Create with a per-press step in degrees per second
    pub fn new(step: f32) -> Self {
        Self {
            offset_bits: AtomicU32::new(0.0_f32.to_bits()),
            step,
        }
    }

    /// Current offset in degrees per second
    pub fn offset(&self) -> f32 {
        f32::from_bits(self.offset_bits.load(Ordering::Relaxed))
    }

    /// Add `delta` degrees per second
    pub fn adjust(&self, delta: f32) -> f32 {
        let mut current = self.offset_bits.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + delta).to_bits();
            match self
                .offset_bits
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return f32::from_bits(next),
                Err(actual) => current = actual,
            }
        }
    }

    /// Speed up by one step
    pub fn rotate_right(&self) -> f32 {
        self.adjust(self.step)
    }

    /// Slow down by one step
    pub fn rotate_left(&self) -> f32 {
        self.adjust(-self.step)
    }

    /// Apply a key action; returns `true` if it was a rotation action
    pub fn apply(&self, action: KeyAction) -> bool {
        match action {
            KeyAction::RotateRight => {
                let offset = self.rotate_right();
                log::trace!("Spin offset now {offset:.2}");
                true
            }
            KeyAction::RotateLeft => {
                let offset = self.rotate_left();
                log::trace!("Spin offset now {offset:.2}");
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn test_key_mapping() {
        let none = Modifiers::empty();
        assert_eq!(KeyAction::from_key(Key::Escape, Action::Press, none), Some(KeyAction::Quit));
        assert_eq!(KeyAction::from_key(Key::Escape, Action::Repeat, none), None);
        assert_eq!(KeyAction::from_key(Key::Q, Action::Repeat, none), Some(KeyAction::RotateRight));
        assert_eq!(KeyAction::from_key(Key::E, Action::Press, none), Some(KeyAction::RotateLeft));
        assert_eq!(KeyAction::from_key(Key::E, Action::Release, none), None);
        assert_eq!(KeyAction::from_key(Key::Enter, Action::Press, none), None);
        assert_eq!(
            KeyAction::from_key(Key::Enter, Action::Press, Modifiers::Alt),
            Some(KeyAction::ToggleFullscreen)
        );
    }

    #[test]
    fn test_spin_steps() {
        let spin = SpinControl::new(0.1);
        spin.rotate_right();
        spin.rotate_right();
        spin.rotate_left();
        assert_relative_eq!(spin.offset(), 0.1, epsilon = 1e-6);

        assert!(spin.apply(KeyAction::RotateLeft));
        assert!(!spin.apply(KeyAction::Quit));
        assert_relative_eq!(spin.offset(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_concurrent_adjustments_are_not_lost() {
        let spin = Arc::new(SpinControl::new(1.0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let spin = Arc::clone(&spin);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        spin.rotate_right();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_relative_eq!(spin.offset(), 400.0, epsilon = 1e-3);
    }
}
