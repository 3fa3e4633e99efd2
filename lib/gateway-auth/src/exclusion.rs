//! Excluded-path matching
//!
//! A pattern ending in `/**` matches the base path and everything under it;
//! any other pattern matches by exact equality or literal prefix.

/// Set of path patterns that bypass JWT validation.
#[derive(Debug, Clone, Default)]
pub struct PathExclusions {
    patterns: Vec<String>,
}

impl PathExclusions {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    /// Whether the given request path is excluded from authentication.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| Self::matches(pattern, path))
    }

    fn matches(pattern: &str, path: &str) -> bool {
        if let Some(base) = pattern.strip_suffix("/**") {
            return path == base || path.starts_with(&format!("{}/", base));
        }
        path == pattern || path.starts_with(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exclusions() -> PathExclusions {
        PathExclusions::new(vec![
            "/api/auth/login".to_string(),
            "/api/auth/register".to_string(),
            "/actuator/**".to_string(),
            "/fallback/**".to_string(),
        ])
    }

    #[test]
    fn test_exact_match() {
        let ex = exclusions();
        assert!(ex.is_excluded("/api/auth/login"));
        assert!(ex.is_excluded("/api/auth/register"));
        assert!(!ex.is_excluded("/api/reports"));
    }

    #[test]
    fn test_literal_prefix_match() {
        let ex = exclusions();
        // Non-wildcard patterns also match as literal prefixes.
        assert!(ex.is_excluded("/api/auth/login/extra"));
    }

    #[test]
    fn test_wildcard_subtree_match() {
        let ex = exclusions();
        assert!(ex.is_excluded("/actuator"));
        assert!(ex.is_excluded("/actuator/health"));
        assert!(ex.is_excluded("/fallback/lab1"));
        assert!(!ex.is_excluded("/actuators"));
    }

    #[test]
    fn test_empty_set_excludes_nothing() {
        let ex = PathExclusions::default();
        assert!(!ex.is_excluded("/anything"));
    }
}
