//! Shared utility functions

use crate::hal::Clock;

/// Fold a heading in degrees into (-180, 180]
#[inline]
pub fn simplify_angle(angle: f64) -> f64 {
    let a = angle % 360.0;
    if a > 180.0 {
        a - 360.0
    } else if a <= -180.0 {
        a + 360.0
    } else {
        a
    }
}

/// Sleep away whatever is left of a fixed period that started at `last_ms`.
///
/// If the period is already used up, logs the overrun and yields for 1 ms
/// instead of sleeping a negative amount.
pub fn wait_delay(clock: &dyn Clock, period_ms: u64, last_ms: u64) {
    let elapsed = clock.now_ms().saturating_sub(last_ms);
    if elapsed >= period_ms {
        tracing::warn!(
            "wait_delay unable to keep up: {}ms elapsed of a {}ms period",
            elapsed,
            period_ms
        );
        clock.sleep_ms(1);
        return;
    }
    clock.sleep_ms(period_ms - elapsed);
}
