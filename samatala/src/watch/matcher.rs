//! File-name predicates for watched artifacts.

/// Decides whether a directory entry is the awaited artifact.
pub trait ArtifactMatcher: Send + Sync {
    fn matches(&self, file_name: &str) -> bool;

    /// Human-readable pattern for logs and timeout errors.
    fn describe(&self) -> String {
        "<predicate>".to_string()
    }
}

/// Matches names that start with `prefix` and end with `suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixSuffixMatcher {
    prefix: String,
    suffix: String,
}

impl PrefixSuffixMatcher {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }
}

impl ArtifactMatcher for PrefixSuffixMatcher {
    fn matches(&self, file_name: &str) -> bool {
        file_name.len() >= self.prefix.len() + self.suffix.len()
            && file_name.starts_with(&self.prefix)
            && file_name.ends_with(&self.suffix)
    }

    fn describe(&self) -> String {
        format!("{}*{}", self.prefix, self.suffix)
    }
}

impl<F> ArtifactMatcher for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn matches(&self, file_name: &str) -> bool {
        self(file_name)
    }
}
