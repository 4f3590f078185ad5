//! Indexability policy: extension allowlist plus ignore patterns.

use std::collections::BTreeSet;
use vault_sync_config::DocumentsConfig;
use vault_sync_domain::DocumentPath;

/// Decides which vault paths are indexable without touching the filesystem.
///
/// Ignore patterns come in two shapes:
/// - `dir/` (trailing slash) skips any path whose directory segments contain
///   the pattern's segments in sequence, at any depth (`.git/`, `archive/old/`).
/// - anything else is a root-anchored segment prefix (`drafts` skips
///   `drafts/...`, `notes/private.md` skips exactly that document).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPolicy {
    extensions: BTreeSet<String>,
    directory_patterns: Vec<Vec<String>>,
    prefix_patterns: Vec<Vec<String>>,
    max_file_size_bytes: u64,
}

impl DocumentPolicy {
    /// Build a policy from raw extension and pattern lists.
    pub fn new<E, P>(extensions: E, ignore_patterns: P, max_file_size_bytes: u64) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        let mut directory_patterns = Vec::new();
        let mut prefix_patterns = Vec::new();
        for pattern in ignore_patterns {
            let normalized = pattern.as_ref().trim().replace('\\', "/");
            let segments = split_segments(&normalized);
            if segments.is_empty() {
                continue;
            }
            if normalized.ends_with('/') {
                directory_patterns.push(segments);
            } else {
                prefix_patterns.push(segments);
            }
        }
        directory_patterns.sort();
        directory_patterns.dedup();
        prefix_patterns.sort();
        prefix_patterns.dedup();

        Self {
            extensions,
            directory_patterns,
            prefix_patterns,
            max_file_size_bytes,
        }
    }

    /// Build from the validated `documents` config section.
    #[must_use]
    pub fn from_documents_config(config: &DocumentsConfig) -> Self {
        Self::new(
            config.allowed_extensions.iter(),
            config.ignore_patterns.iter(),
            config.max_file_size_bytes,
        )
    }

    /// Upper bound on document size; larger files are not enumerated.
    #[must_use]
    pub const fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_bytes
    }

    /// True when an ignore pattern matches `path`.
    #[must_use]
    pub fn is_ignored(&self, path: &DocumentPath) -> bool {
        let segments: Vec<&str> = path.segments().collect();
        let directories = segments.split_last().map_or(&[][..], |(_, dirs)| dirs);

        starts_with_any(&segments, &self.prefix_patterns)
            || self
                .directory_patterns
                .iter()
                .any(|pattern| contains_window(directories, pattern))
    }

    /// True when the extension is allowed and no ignore pattern matches.
    #[must_use]
    pub fn should_index(&self, path: &DocumentPath) -> bool {
        path.extension()
            .is_some_and(|extension| self.extensions.contains(&extension))
            && !self.is_ignored(path)
    }

    /// True when a directory (vault-relative, `/`-separated) can be skipped
    /// during enumeration.
    #[must_use]
    pub fn skips_directory(&self, relative_dir: &str) -> bool {
        let segments = split_segments(relative_dir);
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        if segments.is_empty() {
            return false;
        }
        self.directory_patterns
            .iter()
            .any(|pattern| contains_window(&segments, pattern))
            || starts_with_any(&segments, &self.prefix_patterns)
    }
}

fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .map(str::to_owned)
        .collect()
}

fn starts_with_any(segments: &[&str], patterns: &[Vec<String>]) -> bool {
    patterns.iter().any(|pattern| {
        pattern.len() <= segments.len()
            && pattern.iter().zip(segments).all(|(want, got)| want == got)
    })
}

fn contains_window(haystack: &[&str], pattern: &[String]) -> bool {
    if pattern.is_empty() || pattern.len() > haystack.len() {
        return false;
    }
    haystack
        .windows(pattern.len())
        .any(|window| window.iter().zip(pattern).all(|(got, want)| got == want))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(value: &str) -> DocumentPath {
        DocumentPath::parse(value).expect("valid path")
    }

    fn policy() -> DocumentPolicy {
        DocumentPolicy::new(
            ["md", ".PDF"],
            [".git/", "archive/old/", "drafts", "notes/private.md"],
            1024,
        )
    }

    #[test]
    fn extension_allowlist_is_case_insensitive() {
        let policy = policy();
        assert!(policy.should_index(&path("notes/a.md")));
        assert!(policy.should_index(&path("papers/B.Pdf")));
        assert!(!policy.should_index(&path("notes/a.txt")));
        assert!(!policy.should_index(&path("notes/README")));
    }

    #[test]
    fn directory_patterns_match_at_any_depth() {
        let policy = policy();
        assert!(policy.is_ignored(&path(".git/config.md")));
        assert!(policy.is_ignored(&path("nested/.git/x.md")));
        assert!(policy.is_ignored(&path("x/archive/old/y.md")));
        assert!(!policy.is_ignored(&path("archive/new/y.md")));
        // Directory patterns never match the file name itself.
        assert!(!policy.is_ignored(&path("notes/.git")));
    }

    #[test]
    fn prefix_patterns_are_root_anchored() {
        let policy = policy();
        assert!(policy.is_ignored(&path("drafts/today.md")));
        assert!(!policy.is_ignored(&path("notes/drafts/today.md")));
        assert!(policy.is_ignored(&path("notes/private.md")));
        assert!(!policy.is_ignored(&path("notes/private.md.bak")));
    }

    #[test]
    fn skips_ignored_directories_during_walk() {
        let policy = policy();
        assert!(policy.skips_directory(".git"));
        assert!(policy.skips_directory("drafts"));
        assert!(policy.skips_directory("a/archive/old"));
        assert!(!policy.skips_directory("archive"));
        assert!(!policy.skips_directory(""));
    }

    #[test]
    fn builds_from_documents_config_with_state_dir() {
        let policy = DocumentPolicy::from_documents_config(&DocumentsConfig::default());
        assert!(!policy.should_index(&path(".vault-sync/index-cache.md")));
        assert!(policy.should_index(&path("inbox/idea.md")));
        assert_eq!(policy.max_file_size_bytes(), 20_000_000);
    }
}
