use std::sync::Arc;

use bubble_contracts::messages::{InlineImage, Message, Part};
use bubble_contracts::words::{SurfaceIndex, Target};

use crate::error::GatewayError;
use crate::provider::VisionProvider;
use crate::retry::run_with_retry;
use crate::stream::FragmentStream;
use crate::transport::truncate_text;

pub const RECOGNITION_ATTEMPTS: usize = 3;
pub const RECOGNITION_LOG_PREFIX: &str = "Cannot ask for recognition";
/// Answers up to this many characters are accepted without bold markup.
pub const SHORT_ANSWER_MAX_CHARS: usize = 8;

const TASK_INSTRUCTION: &str = "这张图描绘了一种人们所熟知的事物，通常是常见的物品、动物或植物。\
它是人类尝试用水滴绘制出的图案外形，所以可能不准确。\
你可以尽力猜猜原本想画的是什么吗？请在回答的最后用粗体（**词语**）给出你所猜的词。";
const EMPHASIS: &str = "**";
const TRAILING_PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ':', ';', '。', '，', '！', '？', '：', '；', '、', '"', '\'', '“', '”',
    '「', '」', '《', '》',
];

/// One request to identify a drawing.
#[derive(Debug, Clone)]
pub struct RecognitionAttempt {
    pub image: InlineImage,
    pub target: Target,
    /// Earlier wrong guesses, most recent last.
    pub prior_attempts: Vec<String>,
}

pub struct Recognizer {
    provider: Box<dyn VisionProvider>,
    index: Arc<SurfaceIndex>,
    max_attempts: usize,
}

impl Recognizer {
    pub fn new(provider: Box<dyn VisionProvider>, index: Arc<SurfaceIndex>) -> Self {
        Self {
            provider,
            index,
            max_attempts: RECOGNITION_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn provider(&self) -> &dyn VisionProvider {
        self.provider.as_ref()
    }

    pub fn index(&self) -> &SurfaceIndex {
        &self.index
    }

    pub fn build_messages<S: AsRef<str>>(
        &self,
        image: &InlineImage,
        target: &Target,
        prior_attempts: &[S],
    ) -> Vec<Message> {
        let mut content = vec![Part::Image(image.clone()), Part::text(TASK_INSTRUCTION)];
        let hint = self.index.build_hint(&target.concept, prior_attempts);
        if !hint.is_empty() {
            content.push(Part::text(format!("已经猜错的答案与提示：{hint}")));
        }
        if target.language != self.index.default_language() {
            let name = self
                .index
                .language(&target.language)
                .map(|spec| spec.name.as_str())
                .unwrap_or(target.language.as_str());
            content.push(Part::text(format!("请用{name}回答。")));
        }
        vec![Message::user(content)]
    }

    /// Ask the model what the drawing shows and return its guessed word.
    pub fn recognize<S: AsRef<str>>(
        &self,
        image: &InlineImage,
        target: &Target,
        prior_attempts: &[S],
    ) -> Result<String, GatewayError> {
        let messages = self.build_messages(image, target, prior_attempts);
        let result = run_with_retry(
            || {
                let response = self.provider.complete(&messages)?;
                let guess = extract_guess(&response.text)?;
                Ok(self.normalize_guess(&guess, &target.language))
            },
            self.max_attempts,
            RECOGNITION_LOG_PREFIX,
        );
        match result {
            Ok(guess) => {
                tracing::info!(
                    model = self.provider.model(),
                    concept = %target.concept,
                    guess = %guess,
                    "recognized drawing"
                );
                Ok(guess)
            }
            Err(err) => {
                tracing::debug!(attempts = self.max_attempts, "recognition gave up");
                Err(GatewayError::ExhaustedRetries {
                    operation: "recognition".to_string(),
                    attempts: self.max_attempts,
                    last_error: Box::new(err),
                })
            }
        }
    }

    pub fn recognize_attempt(&self, attempt: &RecognitionAttempt) -> Result<String, GatewayError> {
        self.recognize(&attempt.image, &attempt.target, &attempt.prior_attempts)
    }

    /// Stream the model's answer for display. Not retried, and no guess is
    /// extracted from it.
    pub fn recognize_stream<S: AsRef<str>>(
        &self,
        image: &InlineImage,
        target: &Target,
        prior_attempts: &[S],
    ) -> Result<FragmentStream, GatewayError> {
        let messages = self.build_messages(image, target, prior_attempts);
        self.provider.complete_stream(&messages)
    }

    fn normalize_guess(&self, guess: &str, language: &str) -> String {
        let title_case = self
            .index
            .language(language)
            .map(|spec| spec.title_case)
            .unwrap_or(false);
        if title_case {
            to_title_case(guess)
        } else {
            guess.to_string()
        }
    }
}

/// The guessed word in a free-text model answer: the content of the last
/// `**bold**` span, or the whole answer when it is short and unmarked.
pub fn extract_guess(answer: &str) -> Result<String, GatewayError> {
    if let Some(span) = last_bold_span(answer) {
        let guess = clean_guess(span);
        if !guess.is_empty() {
            return Ok(guess.to_string());
        }
    }
    let whole = clean_guess(answer);
    if !whole.is_empty() && whole.chars().count() <= SHORT_ANSWER_MAX_CHARS {
        return Ok(whole.to_string());
    }
    Err(GatewayError::MalformedResponse {
        message: format!("no bold guess in answer: {}", truncate_text(answer, 80)),
        answer: answer.to_string(),
    })
}

fn last_bold_span(answer: &str) -> Option<&str> {
    let mut spans = Vec::new();
    let mut rest = answer;
    while let Some(open) = rest.find(EMPHASIS) {
        let after_open = &rest[open + EMPHASIS.len()..];
        let Some(close) = after_open.find(EMPHASIS) else {
            break;
        };
        spans.push(&after_open[..close]);
        rest = &after_open[close + EMPHASIS.len()..];
    }
    spans
        .into_iter()
        .rev()
        .find(|span| !clean_guess(span).is_empty())
}

/// Strips whitespace, punctuation and stray emphasis markers from both ends.
fn clean_guess(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '*' || TRAILING_PUNCTUATION.contains(&c))
}

/// Upper-case the first letter of each whitespace-separated word and
/// lower-case the rest.
pub fn to_title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
