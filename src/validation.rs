//! Input checks run before a unit of work starts.

use crate::config::Limits;
use crate::error::{BountyError, Result};
use crate::types::{BountyPatch, NewBounty};

pub fn validate_amount(amount: u64, limits: &Limits) -> Result<()> {
    if amount == 0 {
        return Err(BountyError::validation("amount must be at least 1"));
    }
    if amount > limits.max_bounty_amount {
        return Err(BountyError::validation(format!(
            "amount {} exceeds maximum {}",
            amount, limits.max_bounty_amount
        )));
    }
    Ok(())
}

pub fn validate_title(title: &str, limits: &Limits) -> Result<()> {
    let len = title.trim().chars().count();
    if len == 0 {
        return Err(BountyError::validation("title must not be empty"));
    }
    if len > limits.max_title_len {
        return Err(BountyError::validation(format!(
            "title longer than {} characters",
            limits.max_title_len
        )));
    }
    Ok(())
}

pub fn validate_text(field: &str, text: Option<&str>, limits: &Limits) -> Result<()> {
    if let Some(text) = text {
        if text.chars().count() > limits.max_message_len {
            return Err(BountyError::validation(format!(
                "{} longer than {} characters",
                field, limits.max_message_len
            )));
        }
    }
    Ok(())
}

pub fn validate_tags(tags: &[String], limits: &Limits) -> Result<()> {
    if tags.len() > limits.max_tags {
        return Err(BountyError::validation(format!(
            "at most {} tags allowed",
            limits.max_tags
        )));
    }
    for tag in tags {
        let len = tag.trim().chars().count();
        if len == 0 || len > limits.max_tag_len {
            return Err(BountyError::validation(format!("invalid tag: {:?}", tag)));
        }
    }
    Ok(())
}

pub fn validate_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !url.chars().any(char::is_whitespace) => Ok(()),
        _ => Err(BountyError::validation(format!("invalid proof url: {}", url))),
    }
}

pub fn validate_new_bounty(data: &NewBounty, limits: &Limits) -> Result<()> {
    validate_title(&data.title, limits)?;
    validate_text("description", data.description.as_deref(), limits)?;
    validate_amount(data.amount, limits)?;
    validate_tags(&data.tags, limits)?;
    Ok(())
}

pub fn validate_patch(patch: &BountyPatch, limits: &Limits) -> Result<()> {
    if patch.is_empty() {
        return Err(BountyError::validation("patch changes nothing"));
    }
    if let Some(title) = &patch.title {
        validate_title(title, limits)?;
    }
    validate_text("description", patch.description.as_deref(), limits)?;
    if let Some(amount) = patch.amount {
        validate_amount(amount, limits)?;
    }
    if let Some(tags) = &patch.tags {
        validate_tags(tags, limits)?;
    }
    Ok(())
}

/// Trim and drop duplicate tags, keeping first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BountyStatus;

    fn limits() -> Limits {
        Limits::default()
    }

    #[test]
    fn test_amount_bounds() {
        assert!(validate_amount(1, &limits()).is_ok());
        assert!(validate_amount(0, &limits()).is_err());
        assert!(validate_amount(limits().max_bounty_amount + 1, &limits()).is_err());
    }

    #[test]
    fn test_new_bounty() {
        let mut data = NewBounty {
            title: "Port the CLI".to_string(),
            description: None,
            amount: 500,
            tags: vec!["rust".to_string()],
            status: BountyStatus::Open,
        };
        assert!(validate_new_bounty(&data, &limits()).is_ok());

        data.title = "   ".to_string();
        assert!(matches!(
            validate_new_bounty(&data, &limits()),
            Err(BountyError::Validation(_))
        ));
    }

    #[test]
    fn test_tags() {
        let too_many: Vec<String> = (0..11).map(|i| format!("t{}", i)).collect();
        assert!(validate_tags(&too_many, &limits()).is_err());
        assert!(validate_tags(&["".to_string()], &limits()).is_err());
        assert_eq!(
            normalize_tags(&[" Rust".to_string(), "rust".to_string(), "cli".to_string()]),
            vec!["rust".to_string(), "cli".to_string()]
        );
    }

    #[test]
    fn test_url() {
        assert!(validate_url("https://github.com/org/repo/pull/1").is_ok());
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("https://").is_err());
        assert!(validate_url("https://exa mple.com").is_err());
    }

    #[test]
    fn test_empty_patch_rejected() {
        assert!(validate_patch(&BountyPatch::default(), &limits()).is_err());
        let patch = BountyPatch {
            amount: Some(10),
            ..Default::default()
        };
        assert!(validate_patch(&patch, &limits()).is_ok());
    }
}
