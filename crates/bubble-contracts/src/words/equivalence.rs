use super::index::{SurfaceIndex, Target};

/// Appended to every failed guess in a hint line.
pub const FAILURE_MARKER: char = '×';

/// Number of failed guesses after which the concept hint is revealed.
pub const HINT_REVEAL_AFTER: usize = 2;

impl SurfaceIndex {
    /// A guess is a bingo only when it resolves to the target concept in the
    /// target language. Unknown guesses are plain misses.
    pub fn is_match(&self, concept: &str, language: &str, guess: &str) -> bool {
        match self.resolve(guess) {
            Ok(resolved) => resolved.concept == concept && resolved.language == language,
            Err(_) => false,
        }
    }

    pub fn is_bingo(&self, target: &Target, guess: &str) -> bool {
        self.is_match(&target.concept, &target.language, guess)
    }

    /// Hint line shown after failed attempts, e.g. `"云× 树× 某个天体?"`.
    ///
    /// Empty when there are no prior attempts. The concept hint is appended
    /// once at least two attempts have failed; an unknown concept contributes
    /// no hint text.
    pub fn build_hint<S: AsRef<str>>(&self, concept: &str, prior_attempts: &[S]) -> String {
        if prior_attempts.is_empty() {
            return String::new();
        }
        let mut parts: Vec<String> = prior_attempts
            .iter()
            .map(|attempt| format!("{}{FAILURE_MARKER}", attempt.as_ref()))
            .collect();
        if prior_attempts.len() >= HINT_REVEAL_AFTER {
            if let Some(hint) = self.hint_of(concept) {
                parts.push(format!("{hint}?"));
            }
        }
        parts.join(" ")
    }
}
