//! Git URL normalization and `gh@owner/repo` shorthand parsing

use regex::Regex;
use std::sync::LazyLock;

static SHORTHAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^gh@([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?(?:/(.+))?$")
        .expect("Invalid shorthand regex")
});

/// A `gh@owner/repo[/subpath]` reference expanded to a clone URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitShorthand {
    /// Full HTTPS clone URL.
    pub url: String,
    /// Path inside the repository, if one was given.
    pub subpath: Option<String>,
}

/// Expand a GitHub shorthand reference.
///
/// Returns `None` when `input` is not in shorthand form.
///
/// ```
/// use opkg_git::parse_shorthand;
///
/// let parsed = parse_shorthand("gh@acme/agent-rules/packages/core").unwrap();
/// assert_eq!(parsed.url, "https://github.com/acme/agent-rules.git");
/// assert_eq!(parsed.subpath.as_deref(), Some("packages/core"));
/// ```
pub fn parse_shorthand(input: &str) -> Option<GitShorthand> {
    let caps = SHORTHAND.captures(input.trim())?;
    let owner = caps.get(1)?.as_str();
    let repo = caps.get(2)?.as_str();
    let subpath = caps
        .get(3)
        .map(|m| m.as_str().trim_matches('/').to_string())
        .filter(|s| !s.is_empty());

    Some(GitShorthand {
        url: format!("https://github.com/{owner}/{repo}.git"),
        subpath,
    })
}

/// Canonical form of a git URL used for identity comparison.
///
/// Trailing slashes and a trailing `.git` are dropped and the scheme and
/// host are lowercased, so `https://GitHub.com/a/b.git/` and
/// `https://github.com/a/b` compare equal. Paths keep their case.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
            if path.is_empty() {
                format!("{}://{}", scheme.to_lowercase(), host.to_lowercase())
            } else {
                format!("{}://{}/{}", scheme.to_lowercase(), host.to_lowercase(), path)
            }
        }
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://github.com/acme/rules.git", "https://github.com/acme/rules")]
    #[case("https://GitHub.com/acme/rules/", "https://github.com/acme/rules")]
    #[case("https://github.com/acme/Rules.git/", "https://github.com/acme/Rules")]
    #[case("/srv/git/rules.git", "/srv/git/rules")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_url(input), expected);
    }

    #[test]
    fn shorthand_without_subpath() {
        let parsed = parse_shorthand("gh@acme/rules").unwrap();
        assert_eq!(parsed.url, "https://github.com/acme/rules.git");
        assert!(parsed.subpath.is_none());
    }

    #[test]
    fn shorthand_strips_git_suffix() {
        let parsed = parse_shorthand("gh@acme/rules.git").unwrap();
        assert_eq!(parsed.url, "https://github.com/acme/rules.git");
    }

    #[test]
    fn non_shorthand_is_rejected() {
        assert!(parse_shorthand("https://github.com/acme/rules").is_none());
        assert!(parse_shorthand("gh@acme").is_none());
        assert!(parse_shorthand("rules").is_none());
    }
}
