use crate::core::status::BatteryStatus;

/// One-way sink for the polled statuses.
///
/// Implementations must return promptly and swallow their own failures:
/// the controller neither waits for nor looks at the outcome.
pub trait StatusObserver: Send + Sync {
    fn observe(&self, battery: &str, status: &BatteryStatus);
}
