//! Limit-price escalation across retries and slices.
//!
//! Each retry moves the limit further in the fill direction (up for buys,
//! down for sells) by a fixed step, capped at a maximum slippage. Slices of
//! one decision start from progressively wider base tolerances.

use crate::domain::OrderSide;
use crate::sizing::round_price;

/// Slippage schedule for one order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlippageSchedule {
    pub base_pct: f64,
    pub step_pct: f64,
    pub max_pct: f64,
}

impl SlippageSchedule {
    /// Slippage tolerance for 0-based `attempt`.
    pub fn pct_for_attempt(&self, attempt: u32) -> f64 {
        (self.base_pct + self.step_pct * attempt as f64)
            .min(self.max_pct)
            .max(0.0)
    }

    /// Limit price for `attempt`, relative to `reference`.
    pub fn limit_price(&self, reference: f64, side: OrderSide, attempt: u32) -> f64 {
        round_price(reference * (1.0 + side.sign() * self.pct_for_attempt(attempt)))
    }

    /// Same schedule starting from the base tolerance of slice `index`.
    pub fn for_slice(&self, index: usize, slices: usize) -> Self {
        Self {
            base_pct: slice_base_slippage(self.base_pct, index, slices).min(self.max_pct),
            ..*self
        }
    }
}

/// `base * (1 + i / (n - 1))`: the first slice uses `base`, the last `2 * base`.
pub fn slice_base_slippage(base: f64, index: usize, slices: usize) -> f64 {
    if slices <= 1 {
        return base;
    }
    base * (1.0 + index as f64 / (slices - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> SlippageSchedule {
        SlippageSchedule {
            base_pct: 0.001,
            step_pct: 0.002,
            max_pct: 0.004,
        }
    }

    #[test]
    fn escalates_then_caps() {
        let s = schedule();
        assert!((s.pct_for_attempt(0) - 0.001).abs() < 1e-15);
        assert!((s.pct_for_attempt(1) - 0.003).abs() < 1e-15);
        assert_eq!(s.pct_for_attempt(2), 0.004);
        assert_eq!(s.pct_for_attempt(10), 0.004);
    }

    #[test]
    fn buys_move_up_sells_move_down() {
        let s = schedule();
        assert_eq!(s.limit_price(100.0, OrderSide::Buy, 0), 100.1);
        assert_eq!(s.limit_price(100.0, OrderSide::Sell, 0), 99.9);
        assert!(s.limit_price(100.0, OrderSide::Buy, 1) > s.limit_price(100.0, OrderSide::Buy, 0));
        assert!(s.limit_price(100.0, OrderSide::Sell, 1) < s.limit_price(100.0, OrderSide::Sell, 0));
    }

    #[test]
    fn slice_bases_widen_linearly() {
        assert_eq!(slice_base_slippage(0.002, 0, 1), 0.002);
        assert_eq!(slice_base_slippage(0.002, 0, 3), 0.002);
        assert!((slice_base_slippage(0.002, 1, 3) - 0.003).abs() < 1e-15);
        assert!((slice_base_slippage(0.002, 2, 3) - 0.004).abs() < 1e-15);
    }

    #[test]
    fn slice_base_respects_cap() {
        let s = schedule().for_slice(3, 4);
        assert_eq!(s.base_pct, 0.002);
        let wide = SlippageSchedule {
            base_pct: 0.003,
            ..schedule()
        }
        .for_slice(3, 4);
        assert_eq!(wide.base_pct, 0.004);
    }
}
