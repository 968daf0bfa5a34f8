//! Frame timing for the color balance animation.
//!
//! An animation moves from the hardware's current balance to a target over
//! `5 ms` per balance unit. It is sampled every frame through the
//! accelerate/decelerate curve, and intermediate values truncate toward
//! the start value. The last frame always lands exactly on the target.

use crate::constants::{ANIMATION_FRAME_MS, BALANCE_STEP_DURATION_MS};
use crate::utils::accelerate_decelerate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceAnimation {
    pub from: i32,
    pub to: i32,
    pub duration_ms: u64,
}

impl BalanceAnimation {
    /// `None` when there is nothing to animate.
    pub fn new(from: i32, to: i32) -> Option<Self> {
        if from == to {
            return None;
        }
        Some(Self {
            from,
            to,
            duration_ms: BALANCE_STEP_DURATION_MS * from.abs_diff(to) as u64,
        })
    }

    /// Number of frames including the first (at 0 ms) and the last.
    pub fn frame_count(&self) -> usize {
        self.duration_ms.div_ceil(ANIMATION_FRAME_MS) as usize + 1
    }

    /// Elapsed time at which `frame` is shown.
    pub fn frame_time_ms(&self, frame: usize) -> u64 {
        (frame as u64 * ANIMATION_FRAME_MS).min(self.duration_ms)
    }

    /// Animated value after `elapsed_ms`.
    pub fn value_at(&self, elapsed_ms: u64) -> i32 {
        if self.duration_ms == 0 || elapsed_ms >= self.duration_ms {
            return self.to;
        }
        let fraction = accelerate_decelerate(elapsed_ms as f32 / self.duration_ms as f32);
        // Wide enough for any pair of i32 bounds; the result stays between them
        let delta = i64::from(self.to) - i64::from(self.from);
        let offset = (f64::from(fraction) * delta as f64) as i64;
        (i64::from(self.from) + offset) as i32
    }

    pub fn frame_value(&self, frame: usize) -> i32 {
        self.value_at(self.frame_time_ms(frame))
    }

    pub fn is_last_frame(&self, frame: usize) -> bool {
        frame + 1 >= self.frame_count()
    }

    /// All frame values in order.
    pub fn values(&self) -> Vec<i32> {
        (0..self.frame_count()).map(|frame| self.frame_value(frame)).collect()
    }
}
