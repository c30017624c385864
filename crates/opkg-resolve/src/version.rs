//! Version range parsing and matching.
//!
//! Ranges use npm-style syntax on top of [`semver::VersionReq`]:
//!
//! - `^1.2.0`, `~1.2`, `>=1.0.0 <2.0.0`, `1.x`
//! - a bare version (`1.2.0`, `v1.2.0`) means exactly that version
//! - `*`, `latest` and the empty string are trivial and parse to `None`
//!
//! Prerelease versions only satisfy a range when the range itself names a
//! prerelease on the same `major.minor.patch` (semver's opt-in rule) or
//! when the caller allows prereleases, in which case plain precedence
//! ordering is used for every comparator.
//!
//! # Examples
//!
//! ```
//! use opkg_resolve::version::VersionConstraint;
//! use semver::Version;
//!
//! let c = VersionConstraint::parse("^1.2.0").unwrap().unwrap();
//! assert!(c.matches(&Version::new(1, 3, 0), false));
//! assert!(!c.matches(&Version::new(2, 0, 0), false));
//!
//! let beta = Version::parse("1.4.0-beta.1").unwrap();
//! assert!(!c.matches(&beta, false));
//! assert!(c.matches(&beta, true));
//!
//! assert!(VersionConstraint::parse("latest").unwrap().is_none());
//! ```

use semver::{BuildMetadata, Comparator, Op, Prerelease, Version, VersionReq};

use crate::error::{Error, Result};

/// A parsed, non-trivial version range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    req: VersionReq,
    /// The original range string for display.
    raw: String,
}

impl VersionConstraint {
    /// Parse a version range. Trivial ranges return `Ok(None)`.
    pub fn parse(raw: &str) -> Result<Option<Self>> {
        let trimmed = raw.trim();
        if is_trivial(trimmed) {
            return Ok(None);
        }

        let normalized = normalize_range(trimmed);
        let req = VersionReq::parse(&normalized).map_err(|e| Error::VersionConstraint {
            constraint: raw.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Some(Self {
            req,
            raw: trimmed.to_string(),
        }))
    }

    /// Whether `version` satisfies this range.
    pub fn matches(&self, version: &Version, allow_prerelease: bool) -> bool {
        if self.req.matches(version) {
            return true;
        }
        if version.pre.is_empty() || !allow_prerelease {
            return false;
        }
        let bare = Version {
            build: BuildMetadata::EMPTY,
            ..version.clone()
        };
        self.req
            .comparators
            .iter()
            .all(|c| comparator_matches(c, &bare))
    }

    /// Whether the range names a prerelease, opting into prerelease matches.
    pub fn opts_into_prerelease(&self) -> bool {
        self.req.comparators.iter().any(|c| !c.pre.is_empty())
    }

    /// Whether the range pins one exact version.
    pub fn exact_version(&self) -> Option<Version> {
        match self.req.comparators.as_slice() {
            [c] if c.op == Op::Exact => Some(Version {
                major: c.major,
                minor: c.minor?,
                patch: c.patch?,
                pre: c.pre.clone(),
                build: BuildMetadata::EMPTY,
            }),
            _ => None,
        }
    }

    /// Return the original range string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_trivial(range: &str) -> bool {
    range.is_empty() || range == "*" || range.eq_ignore_ascii_case("latest")
}

/// Rewrite npm-style input into `semver::VersionReq` syntax.
///
/// - `v1.2.0` / `1.2.0` -> `=1.2.0`
/// - `>=1.0.0 <2.0.0` -> `>=1.0.0, <2.0.0`
/// - `>= 1.0.0` -> `>=1.0.0`
fn normalize_range(range: &str) -> String {
    if range.contains(',') {
        return range.to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in range.split_whitespace() {
        let is_op = token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^'));
        if is_op {
            pending_op = Some(token);
            continue;
        }
        let token = token.strip_prefix('v').unwrap_or(token);
        match pending_op.take() {
            Some(op) => parts.push(format!("{op}{token}")),
            None => parts.push(token.to_string()),
        }
    }

    let parts: Vec<String> = parts
        .into_iter()
        .map(|p| {
            if p.starts_with(|c: char| c.is_ascii_digit()) && Version::parse(&p).is_ok() {
                format!("={p}")
            } else {
                strip_v_after_op(&p)
            }
        })
        .collect();

    parts.join(", ")
}

fn strip_v_after_op(part: &str) -> String {
    let op_len = part
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
        .unwrap_or(part.len());
    let (op, rest) = part.split_at(op_len);
    format!("{op}{}", rest.strip_prefix('v').unwrap_or(rest))
}

/// Evaluate one comparator by plain precedence, prereleases included.
///
/// Exclusive upper bounds use the `-0` prerelease floor so `^1.0.0` admits
/// `1.9.0-rc.1` but not `2.0.0-rc.1`.
fn comparator_matches(c: &Comparator, v: &Version) -> bool {
    let lower = Version {
        major: c.major,
        minor: c.minor.unwrap_or(0),
        patch: c.patch.unwrap_or(0),
        pre: c.pre.clone(),
        build: BuildMetadata::EMPTY,
    };
    let full = c.minor.is_some() && c.patch.is_some();

    match c.op {
        Op::Exact if full => *v == lower,
        Op::Exact | Op::Wildcard => *v >= lower && *v < partial_upper(c),
        Op::Greater if full => *v > lower,
        Op::Greater => *v >= partial_upper(c),
        Op::GreaterEq => *v >= lower,
        Op::Less if full => *v < lower,
        Op::Less => *v < floor(c.major, c.minor.unwrap_or(0), c.patch.unwrap_or(0)),
        Op::LessEq if full => *v <= lower,
        Op::LessEq => *v < partial_upper(c),
        Op::Tilde => *v >= lower && *v < tilde_upper(c),
        Op::Caret => *v >= lower && *v < caret_upper(c),
        _ => false,
    }
}

fn floor(major: u64, minor: u64, patch: u64) -> Version {
    Version {
        pre: Prerelease::new("0").unwrap_or_default(),
        ..Version::new(major, minor, patch)
    }
}

fn partial_upper(c: &Comparator) -> Version {
    match (c.minor, c.patch) {
        (None, _) => floor(c.major.saturating_add(1), 0, 0),
        (Some(minor), None) => floor(c.major, minor.saturating_add(1), 0),
        (Some(minor), Some(patch)) => floor(c.major, minor, patch.saturating_add(1)),
    }
}

fn tilde_upper(c: &Comparator) -> Version {
    match c.minor {
        None => floor(c.major.saturating_add(1), 0, 0),
        Some(minor) => floor(c.major, minor.saturating_add(1), 0),
    }
}

fn caret_upper(c: &Comparator) -> Version {
    match (c.major, c.minor, c.patch) {
        (0, None, _) => floor(1, 0, 0),
        (0, Some(0), Some(patch)) => floor(0, 0, patch.saturating_add(1)),
        (0, Some(minor), _) => floor(0, minor.saturating_add(1), 0),
        (major, _, _) => floor(major.saturating_add(1), 0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn c(s: &str) -> VersionConstraint {
        VersionConstraint::parse(s).unwrap().unwrap()
    }

    #[rstest]
    #[case("")]
    #[case("*")]
    #[case("latest")]
    #[case("  LATEST ")]
    fn trivial_ranges_parse_to_none(#[case] raw: &str) {
        assert!(VersionConstraint::parse(raw).unwrap().is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            VersionConstraint::parse(">=abc"),
            Err(Error::VersionConstraint { .. })
        ));
    }

    #[rstest]
    #[case("^1.0.0", "1.3.0", true)]
    #[case("^1.0.0", "2.0.0", false)]
    #[case("~1.2.0", "1.2.9", true)]
    #[case("~1.2.0", "1.3.0", false)]
    #[case(">=1.0.0 <2.0.0", "1.9.9", true)]
    #[case(">= 1.0.0 < 2.0.0", "2.0.0", false)]
    #[case("1.2.0", "1.2.0", true)]
    #[case("1.2.0", "1.3.0", false)]
    #[case("v1.2.0", "1.2.0", true)]
    #[case("1.x", "1.7.0", true)]
    #[case("^0.2.3", "0.3.0", false)]
    fn stable_matching(#[case] range: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(c(range).matches(&v(version), false), expected);
    }

    #[test]
    fn prerelease_excluded_by_default() {
        assert!(!c("^1.0.0").matches(&v("1.5.0-beta.1"), false));
    }

    #[test]
    fn prerelease_opt_in_by_range() {
        let range = c("^1.5.0-beta.0");
        assert!(range.opts_into_prerelease());
        assert!(range.matches(&v("1.5.0-beta.1"), false));
    }

    #[rstest]
    #[case("^1.0.0", "1.5.0-beta.1", true)]
    #[case("^1.0.0", "2.0.0-rc.1", false)]
    #[case("^1.0.0", "1.0.0-alpha", false)]
    #[case("<2.0", "2.0.0-rc.1", false)]
    #[case(">1.2", "1.3.0-alpha", true)]
    #[case("~1.2", "1.2.5-rc.1", true)]
    fn prerelease_allowed_uses_precedence(
        #[case] range: &str,
        #[case] version: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(c(range).matches(&v(version), true), expected);
    }

    #[test]
    fn maximal_components_saturate_upper_bound() {
        let max = u64::MAX;
        assert!(c(&format!("^{max}.0.0")).matches(&v(&format!("{max}.0.1")), true));
        assert!(!c(&format!("^{max}.0.0")).matches(&v(&format!("{max}.2.0-rc.1")), true));
        assert!(c(&format!("~1.{max}")).matches(&v(&format!("1.{max}.3")), true));
        assert!(!c(&format!("=1.{max}")).matches(&v(&format!("1.{max}.4-rc.1")), true));
    }

    #[test]
    fn exact_version_detection() {
        assert_eq!(c("1.2.3").exact_version(), Some(v("1.2.3")));
        assert_eq!(c("^1.2.3").exact_version(), None);
        assert_eq!(c("=1.2").exact_version(), None);
    }

    #[test]
    fn display_keeps_original_text() {
        assert_eq!(c(">=1.0.0 <2.0.0").to_string(), ">=1.0.0 <2.0.0");
    }
}
