// Small shared helpers

/// Lowercase, alphanumerics kept, everything else collapsed to single
/// underscores. Used for artifact filenames.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_was_separator = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_separator = false;
        } else if !last_was_separator {
            slug.push('_');
            last_was_separator = true;
        }
    }
    let trimmed = slug.trim_end_matches('_');
    if trimmed.is_empty() {
        "report".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Audit Summary Report"), "audit_summary_report");
    }

    #[test]
    fn test_slugify_collapses_punctuation() {
        assert_eq!(slugify("Q3 -- Review!! (final)"), "q3_review_final");
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify("!!!"), "report");
    }
}
