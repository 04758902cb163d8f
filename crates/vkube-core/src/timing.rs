use std::time::Duration;

/// Human-scale rendering of an elapsed time: whole milliseconds under one
/// second, whole seconds otherwise. Always truncates.
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(1) {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{}s", elapsed.as_secs())
    }
}
