use std::fmt::Display;

pub const DEFAULT_ATTEMPTS: usize = 3;

/// Run `operation` up to `max_attempts` times, one after another.
///
/// Failures before the last attempt are logged with `log_prefix` and
/// dropped. The last failure is returned as is. No delay between attempts.
pub fn run_with_retry<T, E, F>(mut operation: F, max_attempts: usize, log_prefix: &str) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Display,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                tracing::warn!(attempt, attempts, "{log_prefix}: {err}");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Wrap `operation` so every call goes through [`run_with_retry`].
pub fn with_retry<T, E, F>(
    mut operation: F,
    max_attempts: usize,
    log_prefix: impl Into<String>,
) -> impl FnMut() -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Display,
{
    let log_prefix = log_prefix.into();
    move || run_with_retry(&mut operation, max_attempts, &log_prefix)
}
