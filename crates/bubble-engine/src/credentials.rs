use std::env;
use std::fmt;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::{Arc, OnceLock};

use crate::error::GatewayError;

type SecretFn = dyn Fn() -> Result<String, GatewayError> + Send + Sync;

/// Lazily resolved API secret.
///
/// The lookup runs on first use, not at construction, so a missing key only
/// matters once a request is actually made. The first successful value is
/// kept for the rest of the process.
#[derive(Clone)]
pub struct CredentialResolver {
    inner: Arc<CredentialInner>,
}

struct CredentialInner {
    label: String,
    resolve: Box<SecretFn>,
    cached: OnceLock<String>,
}

impl CredentialResolver {
    pub fn new(
        label: impl Into<String>,
        resolve: impl Fn() -> Result<String, GatewayError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(CredentialInner {
                label: label.into(),
                resolve: Box::new(resolve),
                cached: OnceLock::new(),
            }),
        }
    }

    pub fn fixed(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        Self::new("fixed", move || Ok(secret.clone()))
    }

    /// First non-empty environment variable among `keys`, else an
    /// interactive prompt on stderr when stdin is a terminal.
    pub fn env_or_prompt(keys: &[String], label: &str) -> Self {
        let keys = keys.to_vec();
        let prompt_label = label.to_string();
        Self::new(label, move || {
            if let Some(value) = first_non_empty_env(&keys) {
                return Ok(value);
            }
            prompt_secret(&prompt_label, &keys)
        })
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn resolve(&self) -> Result<String, GatewayError> {
        if let Some(value) = self.inner.cached.get() {
            return Ok(value.clone());
        }
        let value = (self.inner.resolve)()?;
        let _ = self.inner.cached.set(value.clone());
        Ok(value)
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("label", &self.inner.label)
            .field("resolved", &self.inner.cached.get().is_some())
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn first_non_empty_env(keys: &[String]) -> Option<String> {
    keys.iter().find_map(|key| non_empty_env(key))
}

fn prompt_secret(label: &str, keys: &[String]) -> Result<String, GatewayError> {
    let missing = || GatewayError::Credential(format!("{label} API key not set ({})", keys.join(" or ")));
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Err(missing());
    }
    let mut stderr = io::stderr();
    write!(stderr, "API key ({label}): ")
        .and_then(|_| stderr.flush())
        .map_err(|err| GatewayError::Credential(format!("prompt failed: {err}")))?;
    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .map_err(|err| GatewayError::Credential(format!("prompt failed: {err}")))?;
    let secret = line.trim().to_string();
    if secret.is_empty() {
        return Err(missing());
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::CredentialResolver;
    use crate::error::{ErrorKind, GatewayError};

    #[test]
    fn resolver_runs_lazily_and_caches_the_first_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let resolver = CredentialResolver::new("test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("sk-test".to_string())
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.resolve().ok().as_deref(), Some("sk-test"));
        assert_eq!(resolver.clone().resolve().ok().as_deref(), Some("sk-test"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!format!("{resolver:?}").contains("sk-test"));
    }

    #[test]
    fn failures_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let resolver = CredentialResolver::new("test", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(GatewayError::Credential("not yet".to_string()));
            }
            Ok("late".to_string())
        });
        assert_eq!(
            resolver.resolve().err().map(|err| err.kind()),
            Some(ErrorKind::Credential)
        );
        assert_eq!(resolver.resolve().ok().as_deref(), Some("late"));
    }

    #[test]
    fn env_lookup_skips_blank_values() {
        std::env::set_var("BUBBLE_TEST_KEY_BLANK", "   ");
        std::env::set_var("BUBBLE_TEST_KEY_SET", " sk-env ");
        let resolver = CredentialResolver::env_or_prompt(
            &[
                "BUBBLE_TEST_KEY_MISSING".to_string(),
                "BUBBLE_TEST_KEY_BLANK".to_string(),
                "BUBBLE_TEST_KEY_SET".to_string(),
            ],
            "Test",
        );
        assert_eq!(resolver.label(), "Test");
        assert_eq!(resolver.resolve().ok().as_deref(), Some("sk-env"));
    }
}
