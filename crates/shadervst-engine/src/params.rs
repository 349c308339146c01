use std::sync::atomic::{AtomicI32, Ordering};

use atomic_float::AtomicF32;

/// Number of host-automatable parameters of each kind.
pub const PARAM_COUNT: usize = 256;

pub const FLOAT_RANGE: (f32, f32) = (0.0, 1.0);
pub const INT_RANGE: (i32, i32) = (0, 100);

/// Host parameter surface: `float0..255` in [0,1] and `int0..255` in [0,100].
///
/// Stored as atomics so the host may automate from any thread while the
/// render thread reads every frame without locking.
#[derive(Debug)]
pub struct ParameterBank {
    floats: [AtomicF32; PARAM_COUNT],
    ints: [AtomicI32; PARAM_COUNT],
}

impl Default for ParameterBank {
    fn default() -> Self {
        Self {
            floats: std::array::from_fn(|_| AtomicF32::new(0.0)),
            ints: std::array::from_fn(|_| AtomicI32::new(0)),
        }
    }
}

impl ParameterBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Out-of-range indices read as 0.
    pub fn float(&self, index: usize) -> f32 {
        self.floats
            .get(index)
            .map(|a| a.load(Ordering::Relaxed))
            .unwrap_or(0.0)
    }

    pub fn int(&self, index: usize) -> i32 {
        self.ints
            .get(index)
            .map(|a| a.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Set `float<index>`, clamped to [0,1]. NaN is stored as 0.
    pub fn set_float(&self, index: usize, value: f32) {
        if let Some(slot) = self.floats.get(index) {
            let v = if value.is_nan() {
                0.0
            } else {
                value.clamp(FLOAT_RANGE.0, FLOAT_RANGE.1)
            };
            slot.store(v, Ordering::Relaxed);
        }
    }

    /// Set `int<index>`, clamped to [0,100].
    pub fn set_int(&self, index: usize, value: i32) {
        if let Some(slot) = self.ints.get(index) {
            slot.store(value.clamp(INT_RANGE.0, INT_RANGE.1), Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_zero() {
        let bank = ParameterBank::new();
        assert_eq!(bank.float(0), 0.0);
        assert_eq!(bank.int(255), 0);
    }

    #[test]
    fn clamps_to_declared_ranges() {
        let bank = ParameterBank::new();
        bank.set_float(3, 1.7);
        bank.set_float(4, -0.2);
        bank.set_float(5, f32::NAN);
        bank.set_int(6, 250);
        bank.set_int(7, -4);
        assert_eq!(bank.float(3), 1.0);
        assert_eq!(bank.float(4), 0.0);
        assert_eq!(bank.float(5), 0.0);
        assert_eq!(bank.int(6), 100);
        assert_eq!(bank.int(7), 0);
    }

    #[test]
    fn out_of_range_indices_are_ignored() {
        let bank = ParameterBank::new();
        bank.set_float(PARAM_COUNT, 0.5);
        assert_eq!(bank.float(PARAM_COUNT), 0.0);
    }

    #[test]
    fn values_written_on_one_thread_are_visible_on_another() {
        let bank = std::sync::Arc::new(ParameterBank::new());
        let writer = bank.clone();
        std::thread::spawn(move || writer.set_float(12, 0.25))
            .join()
            .unwrap();
        assert_eq!(bank.float(12), 0.25);
    }
}
