//! Comment moderation: field bounds and the publish/hold decision.

use std::ops::RangeInclusive;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
};

/// Accepted author name length, in characters after trimming.
pub const AUTHOR_NAME_LEN: RangeInclusive<usize> = 2..=50;

/// Accepted comment body length, in characters after trimming.
pub const BODY_LEN: RangeInclusive<usize> = 3..=500;

/// Verdict
///
/// Outcome of moderating a new comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Published,
    PendingReview,
}

impl Verdict {
    pub fn approved(self) -> bool {
        matches!(self, Verdict::Published)
    }

    pub fn message(self) -> &'static str {
        match self {
            Verdict::Published => "Comment published",
            Verdict::PendingReview => "Comment received and awaiting moderation",
        }
    }
}

/// ReviewedComment
///
/// A comment that passed validation, trimmed, with its verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewedComment {
    pub author_name: String,
    pub body: String,
    pub verdict: Verdict,
}

/// ModerationPolicy
///
/// Evaluated once per comment at creation time. With `auto_approve` every valid comment
/// is published immediately; otherwise it is stored unapproved and hidden from
/// listings.
#[derive(Debug, Clone, Copy)]
pub struct ModerationPolicy {
    auto_approve: bool,
}

impl ModerationPolicy {
    pub fn new(auto_approve: bool) -> Self {
        Self { auto_approve }
    }

    pub fn review(&self, author_name: &str, body: &str) -> AppResult<ReviewedComment> {
        let author_name = bounded("authorName", author_name, AUTHOR_NAME_LEN)?;
        let body = bounded("body", body, BODY_LEN)?;

        let verdict = if self.auto_approve {
            Verdict::Published
        } else {
            Verdict::PendingReview
        };

        Ok(ReviewedComment {
            author_name,
            body,
            verdict,
        })
    }
}

impl From<&AppConfig> for ModerationPolicy {
    fn from(config: &AppConfig) -> Self {
        Self::new(config.comments_auto_approve)
    }
}

fn bounded(field: &str, value: &str, range: RangeInclusive<usize>) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("field '{field}' is required")));
    }
    let len = value.chars().count();
    if !range.contains(&len) {
        return Err(AppError::validation(format!(
            "field '{field}' must be between {} and {} characters (got {len})",
            range.start(),
            range.end()
        )));
    }
    Ok(value.to_string())
}
