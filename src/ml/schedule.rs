// ============================================================
// Layer 5 — Learning Rate Schedule
// ============================================================
// Learning rate as a pure function of the optimizer step.
//
// "linear" (the default):
//
//   lr │      ╱╲
//      │     ╱   ╲
//      │    ╱      ╲
//      │   ╱         ╲
//    0 └──┴───────────┴──▶ step
//        0  warmup    max_steps
//
//   step < warmup : lr · step / warmup
//   otherwise     : lr · (max_steps - step) / (max_steps - warmup)
//
// "constant": the same warmup ramp, then flat at lr.
//
// `step` is the 0-based index of the optimizer update about to
// happen, so with warmup the very first update uses lr = 0 and
// the rate reaches 0 again at step = max_steps.
//
// Reference: HuggingFace transformers get_linear_schedule_with_warmup

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Linear,
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrSchedule {
    pub kind:         ScheduleKind,
    pub base_lr:      f64,
    pub warmup_steps: usize,
    pub max_steps:    usize,
}

impl LrSchedule {
    pub fn new(kind: ScheduleKind, base_lr: f64, warmup_steps: usize, max_steps: usize) -> Self {
        Self { kind, base_lr, warmup_steps, max_steps }
    }

    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.base_lr * step as f64 / self.warmup_steps.max(1) as f64;
        }
        match self.kind {
            ScheduleKind::Constant => self.base_lr,
            ScheduleKind::Linear => {
                let remaining = self.max_steps.saturating_sub(step) as f64;
                let decay_len = self.max_steps.saturating_sub(self.warmup_steps).max(1) as f64;
                self.base_lr * (remaining / decay_len).max(0.0)
            }
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-15
    }

    #[test]
    fn test_warmup_ramps_from_zero_to_peak() {
        let s = LrSchedule::new(ScheduleKind::Linear, 2e-4, 5, 30);
        assert_eq!(s.lr_at(0), 0.0);
        assert!(close(s.lr_at(1), 0.4e-4));
        assert!(close(s.lr_at(4), 1.6e-4));
        assert!(close(s.lr_at(5), 2e-4));
    }

    #[test]
    fn test_linear_decay_reaches_zero_at_max_steps() {
        let s = LrSchedule::new(ScheduleKind::Linear, 2e-4, 5, 30);
        assert!(close(s.lr_at(15), 2e-4 * 15.0 / 25.0));
        assert!(close(s.lr_at(29), 2e-4 / 25.0));
        assert_eq!(s.lr_at(30), 0.0);
        assert_eq!(s.lr_at(40), 0.0);
    }

    #[test]
    fn test_monotone_after_warmup() {
        let s = LrSchedule::new(ScheduleKind::Linear, 1.0, 5, 30);
        for step in 5..30 {
            assert!(s.lr_at(step + 1) <= s.lr_at(step));
        }
    }

    #[test]
    fn test_no_warmup_starts_at_peak() {
        let s = LrSchedule::new(ScheduleKind::Linear, 1e-3, 0, 10);
        assert_eq!(s.lr_at(0), 1e-3);
    }

    #[test]
    fn test_constant_after_warmup() {
        let s = LrSchedule::new(ScheduleKind::Constant, 1e-3, 2, 10);
        assert_eq!(s.lr_at(1), 0.5e-3);
        assert_eq!(s.lr_at(9), 1e-3);
    }
}
