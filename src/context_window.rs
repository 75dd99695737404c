//! Context-window management: token estimation and history-shrinking
//! strategies.
//!
//! The default [`CharCountTokenCounter`] generalizes the teacher's
//! `estimate_tokens` (character-based approximation, 1 token ≈ 4
//! characters) to the new `ResponseInputItem`/`Content` model, additionally
//! scoring `Content::Image` at its fixed per-detail-level cost rather than
//! ignoring images entirely. [`SlidingWindow`] and [`Summarization`]
//! generalize the teacher's `truncate_messages`/`is_approaching_limit` into
//! pluggable [`ContextStrategy`] implementations.

use crate::error::Result;
use crate::types::{Content, ResponseInputItem, Role};
use async_trait::async_trait;

/// Estimates token usage of conversation history. Implementations need not
/// be exact — the context-window manager only needs a conservative,
/// monotonic-with-content estimate to decide when to shrink history.
pub trait TokenCounter: Send + Sync {
    fn count(&self, history: &[ResponseInputItem]) -> usize;
}

/// Character-based approximation, the teacher's default strategy
/// generalized to the new content model: images are charged their fixed
/// per-detail-level token cost instead of being silently uncounted.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharCountTokenCounter;

impl TokenCounter for CharCountTokenCounter {
    fn count(&self, history: &[ResponseInputItem]) -> usize {
        if history.is_empty() {
            return 0;
        }

        let mut total_chars = 0usize;
        let mut image_tokens = 0usize;

        for item in history {
            total_chars += 8; // role/item-type framing overhead
            match item {
                ResponseInputItem::Message { contents, .. } => {
                    for content in contents {
                        match content {
                            Content::Text { text } => total_chars += text.len(),
                            Content::Image { detail, .. } => image_tokens += detail.token_cost(),
                        }
                    }
                }
                ResponseInputItem::FunctionToolCall { name, arguments_json, .. } => {
                    total_chars += name.len() + arguments_json.len();
                }
                ResponseInputItem::FunctionToolCallOutput { output, .. } => {
                    total_chars += output.len();
                }
            }
        }

        total_chars += 16; // conversation-level overhead
        let text_tokens = (total_chars + 3) / 4; // ceiling division
        text_tokens + image_tokens
    }
}

/// Whether `history` is within `margin` (0.0-1.0) of `limit` tokens, per a
/// given counter.
pub fn is_approaching_limit(counter: &dyn TokenCounter, history: &[ResponseInputItem], limit: usize, margin: f32) -> bool {
    let estimated = counter.count(history);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}

/// A pluggable strategy for shrinking history once it approaches the
/// context window limit.
#[async_trait]
pub trait ContextStrategy: Send + Sync {
    async fn shrink(&self, history: &[ResponseInputItem], counter: &dyn TokenCounter, limit: usize) -> Result<Vec<ResponseInputItem>>;
}

/// Keep the oldest developer message (if present) and the most recent
/// `keep` items, dropping everything in between. Direct generalization of
/// the teacher's `truncate_messages`.
#[derive(Debug, Clone, Copy)]
pub struct SlidingWindow {
    pub keep: usize,
    pub preserve_developer_message: bool,
}

impl SlidingWindow {
    pub fn new(keep: usize) -> Self {
        Self { keep, preserve_developer_message: true }
    }
}

#[async_trait]
impl ContextStrategy for SlidingWindow {
    async fn shrink(&self, history: &[ResponseInputItem], _counter: &dyn TokenCounter, _limit: usize) -> Result<Vec<ResponseInputItem>> {
        if history.is_empty() || history.len() <= self.keep {
            return Ok(history.to_vec());
        }

        let has_developer = self.preserve_developer_message
            && matches!(history.first(), Some(ResponseInputItem::Message { role: Role::Developer, .. }));

        if has_developer {
            let mut result = vec![history[0].clone()];
            if self.keep > 0 && history.len() > 1 {
                let start = history.len().saturating_sub(self.keep);
                result.extend_from_slice(&history[start.max(1)..]);
            }
            Ok(result)
        } else if self.keep > 0 {
            let start = history.len().saturating_sub(self.keep);
            Ok(history[start..].to_vec())
        } else {
            Ok(Vec::new())
        }
    }
}

/// Replace everything before the most recent `keep_recent` items with a
/// single synthetic developer message produced by `summarize`. The
/// summarizer is injected rather than hard-coded to an LLM call, so tests
/// and offline strategies can supply a deterministic stand-in.
pub struct Summarization {
    pub keep_recent: usize,
    pub summarize: Box<dyn Fn(&[ResponseInputItem]) -> String + Send + Sync>,
}

impl Summarization {
    pub fn new(keep_recent: usize, summarize: impl Fn(&[ResponseInputItem]) -> String + Send + Sync + 'static) -> Self {
        Self { keep_recent, summarize: Box::new(summarize) }
    }
}

#[async_trait]
impl ContextStrategy for Summarization {
    async fn shrink(&self, history: &[ResponseInputItem], _counter: &dyn TokenCounter, _limit: usize) -> Result<Vec<ResponseInputItem>> {
        if history.len() <= self.keep_recent {
            return Ok(history.to_vec());
        }
        let split = history.len() - self.keep_recent;
        let (older, recent) = history.split_at(split);
        let summary_text = (self.summarize)(older);
        let mut result = vec![ResponseInputItem::developer_text(summary_text)];
        result.extend_from_slice(recent);
        Ok(result)
    }
}

/// Ties a counter and a strategy together: check, then shrink only if
/// needed.
pub struct ContextWindowManager {
    pub counter: Box<dyn TokenCounter>,
    pub strategy: Box<dyn ContextStrategy>,
    pub limit: usize,
    pub margin: f32,
}

impl ContextWindowManager {
    pub fn new(limit: usize) -> Self {
        Self {
            counter: Box::new(CharCountTokenCounter),
            strategy: Box::new(SlidingWindow::new(20)),
            limit,
            margin: 0.9,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn ContextStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_counter(mut self, counter: Box<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Shrink `history` only if it's approaching `limit`; otherwise return
    /// it unchanged.
    pub async fn maybe_shrink(&self, history: &[ResponseInputItem]) -> Result<Vec<ResponseInputItem>> {
        if is_approaching_limit(self.counter.as_ref(), history, self.limit, self.margin) {
            self.strategy.shrink(history, self.counter.as_ref(), self.limit).await
        } else {
            Ok(history.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageDetail;

    #[test]
    fn test_char_count_empty() {
        assert_eq!(CharCountTokenCounter.count(&[]), 0);
    }

    #[test]
    fn test_char_count_text() {
        let history = vec![ResponseInputItem::user_text("Hello world")];
        let tokens = CharCountTokenCounter.count(&history);
        assert!(tokens >= 3 && tokens <= 10);
    }

    #[test]
    fn test_char_count_includes_image_cost() {
        let history = vec![ResponseInputItem::message(
            Role::User,
            vec![Content::image_url("https://example.com/a.png", ImageDetail::High)],
        )];
        let tokens = CharCountTokenCounter.count(&history);
        assert!(tokens >= 765);
    }

    #[test]
    fn test_is_approaching_limit() {
        let history = vec![ResponseInputItem::user_text("x".repeat(1000))];
        let counter = CharCountTokenCounter;
        assert!(!is_approaching_limit(&counter, &history, 1000, 0.9));
        assert!(is_approaching_limit(&counter, &history, 200, 0.9));
    }

    #[tokio::test]
    async fn test_sliding_window_preserves_developer_message() {
        let history = vec![
            ResponseInputItem::developer_text("system prompt"),
            ResponseInputItem::user_text("1"),
            ResponseInputItem::user_text("2"),
            ResponseInputItem::user_text("3"),
            ResponseInputItem::user_text("4"),
        ];
        let strategy = SlidingWindow::new(2);
        let result = strategy.shrink(&history, &CharCountTokenCounter, 0).await.unwrap();
        assert_eq!(result.len(), 3);
        assert!(matches!(&result[0], ResponseInputItem::Message { role: Role::Developer, .. }));
    }

    #[tokio::test]
    async fn test_summarization_replaces_older_items() {
        let history = vec![
            ResponseInputItem::user_text("1"),
            ResponseInputItem::user_text("2"),
            ResponseInputItem::user_text("3"),
            ResponseInputItem::user_text("4"),
        ];
        let strategy = Summarization::new(2, |items| format!("summary of {} items", items.len()));
        let result = strategy.shrink(&history, &CharCountTokenCounter, 0).await.unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].text().unwrap(), "summary of 2 items");
    }

    #[tokio::test]
    async fn test_manager_only_shrinks_when_needed() {
        let manager = ContextWindowManager::new(1_000_000);
        let history = vec![ResponseInputItem::user_text("small")];
        let result = manager.maybe_shrink(&history).await.unwrap();
        assert_eq!(result.len(), 1);
    }
}
