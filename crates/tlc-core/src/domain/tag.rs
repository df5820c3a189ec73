//! Tag classification.
//!
//! Parses release tags of the form `vMAJOR.MINOR.PATCH[-CHANNEL.N]`, maps
//! them onto a deployment [`Tier`], and orders them by release precedence.
//! Parsing is pure and allocation-light; nothing here performs I/O.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Channel / Tier
// ---------------------------------------------------------------------------

/// Pre-release channel. Declaration order is precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Feature,
    Dev,
    Beta,
    Rc,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Dev => "dev",
            Self::Beta => "beta",
            Self::Rc => "rc",
        }
    }

    /// Tier a tag on this channel deploys to.
    pub fn tier(&self) -> Tier {
        match self {
            Self::Feature => Tier::Feature,
            Self::Dev => Tier::Dev,
            Self::Beta => Tier::Beta,
            Self::Rc => Tier::Rc,
        }
    }
}

impl FromStr for Channel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "feature" => Ok(Self::Feature),
            "dev" => Ok(Self::Dev),
            "beta" => Ok(Self::Beta),
            "rc" => Ok(Self::Rc),
            other => Err(PipelineError::Format(format!(
                "unknown pre-release channel '{other}'"
            ))),
        }
    }
}

/// Deployment tier a release targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Feature,
    Dev,
    Beta,
    Rc,
    #[serde(alias = "stable")]
    Release,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Feature,
        Tier::Dev,
        Tier::Beta,
        Tier::Rc,
        Tier::Release,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Dev => "dev",
            Self::Beta => "beta",
            Self::Rc => "rc",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = PipelineError;

    /// Accepts the tier names plus `stable` as an alias of `release`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "feature" => Ok(Self::Feature),
            "dev" => Ok(Self::Dev),
            "beta" => Ok(Self::Beta),
            "rc" => Ok(Self::Rc),
            "release" | "stable" => Ok(Self::Release),
            other => Err(PipelineError::Format(format!("unknown tier '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsed tag
// ---------------------------------------------------------------------------

/// Pre-release suffix: `-CHANNEL.N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prerelease {
    pub channel: Channel,
    pub number: u64,
}

/// A tag that matched the release grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedTag {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<Prerelease>,
    pub raw: String,
}

impl ParsedTag {
    /// Parse `input`, failing with [`PipelineError::Format`] on any deviation
    /// from `vMAJOR.MINOR.PATCH[-CHANNEL.N]`.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || {
            PipelineError::Format(format!(
                "'{input}' is not a release tag (expected vMAJOR.MINOR.PATCH[-CHANNEL.N])"
            ))
        };

        let rest = input.strip_prefix('v').ok_or_else(invalid)?;
        let (version, suffix) = match rest.split_once('-') {
            Some((version, suffix)) => (version, Some(suffix)),
            None => (rest, None),
        };

        let mut parts = version.split('.');
        let major = parse_number(parts.next()).ok_or_else(invalid)?;
        let minor = parse_number(parts.next()).ok_or_else(invalid)?;
        let patch = parse_number(parts.next()).ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let prerelease = match suffix {
            None => None,
            Some(suffix) => {
                let (channel, number) = suffix.split_once('.').ok_or_else(invalid)?;
                let channel = channel.parse::<Channel>().map_err(|_| invalid())?;
                let number = parse_number(Some(number)).ok_or_else(invalid)?;
                Some(Prerelease { channel, number })
            }
        };

        Ok(Self {
            major,
            minor,
            patch,
            prerelease,
            raw: input.to_string(),
        })
    }

    /// Tier this tag deploys to. Tags without a suffix are production releases.
    pub fn tier(&self) -> Tier {
        self.prerelease
            .map(|pre| pre.channel.tier())
            .unwrap_or(Tier::Release)
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// The production tag for the same version (`v1.2.0-rc.3` -> `v1.2.0`).
    pub fn release_tag(&self) -> String {
        format!("v{}.{}.{}", self.major, self.minor, self.patch)
    }

    /// Release precedence: numeric version first, then a release outranks
    /// every pre-release of the same version, then channel, then number.
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        let tuple_cmp =
            (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch));
        if tuple_cmp != Ordering::Equal {
            return tuple_cmp;
        }
        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => (a.channel, a.number).cmp(&(b.channel, b.number)),
        }
    }
}

impl fmt::Display for ParsedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_number(part: Option<&str>) -> Option<u64> {
    let part = part?;
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Whether `input` matches the release tag grammar.
pub fn is_valid_tag(input: &str) -> bool {
    ParsedTag::parse(input).is_ok()
}

/// Compare two tags by release precedence.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    Ok(ParsedTag::parse(a)?.cmp_precedence(&ParsedTag::parse(b)?))
}

/// Sort parsed tags newest first.
pub fn sort_descending(tags: &mut [ParsedTag]) {
    tags.sort_by(|a, b| b.cmp_precedence(a));
}

/// Compile a configured `tagPattern` (`*`, `?`, `[...]`, `[!...]`).
pub fn compile_pattern(pattern: &str) -> Result<glob::Pattern> {
    glob::Pattern::new(pattern)
        .map_err(|e| PipelineError::Format(format!("malformed tag pattern '{pattern}': {e}")))
}

/// Whether `tag` matches the configured glob `pattern`.
pub fn matches_pattern(tag: &str, pattern: &str) -> Result<bool> {
    Ok(compile_pattern(pattern)?.matches(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_tag() {
        let tag = ParsedTag::parse("v1.2.3").unwrap();
        assert_eq!((tag.major, tag.minor, tag.patch), (1, 2, 3));
        assert!(tag.prerelease.is_none());
        assert_eq!(tag.tier(), Tier::Release);
        assert_eq!(tag.to_string(), "v1.2.3");
    }

    #[test]
    fn parses_each_channel() {
        for (raw, tier) in [
            ("v1.0.0-feature.1", Tier::Feature),
            ("v1.0.0-dev.2", Tier::Dev),
            ("v1.0.0-beta.3", Tier::Beta),
            ("v1.0.0-rc.4", Tier::Rc),
        ] {
            let tag = ParsedTag::parse(raw).unwrap();
            assert_eq!(tag.tier(), tier, "{raw}");
            assert!(tag.is_prerelease());
        }
    }

    #[test]
    fn rejects_malformed_tags() {
        for raw in [
            "",
            "1.0.0",
            "v1.0",
            "v1.0.0.0",
            "v1.0.0-",
            "v1.0.0-rc",
            "v1.0.0-rc.",
            "v1.0.0-rc.x",
            "v1.0.0-alpha.1",
            "v1.0.0-rc.1.2",
            "v1.-1.0",
            "V1.0.0",
            "v99999999999999999999.0.0",
        ] {
            assert!(!is_valid_tag(raw), "{raw} should be rejected");
        }
    }

    #[test]
    fn malformed_tag_is_format_error() {
        let err = ParsedTag::parse("release-1").unwrap_err();
        assert_eq!(err.kind(), "format");
    }

    #[test]
    fn release_outranks_prereleases() {
        assert_eq!(
            compare_versions("v1.0.0", "v1.0.0-rc.9").unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            compare_versions("v1.0.0-rc.1", "v1.0.0-beta.7").unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            compare_versions("v1.0.0-beta.1", "v1.0.0-dev.1").unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            compare_versions("v1.0.0-dev.1", "v1.0.0-feature.3").unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            compare_versions("v1.0.0-rc.2", "v1.0.0-rc.10").unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare_versions("v1.10.0-dev.1", "v1.9.0").unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn compare_rejects_invalid_operand() {
        assert!(compare_versions("v1.0.0", "latest").is_err());
    }

    #[test]
    fn sort_descending_orders_newest_first() {
        let mut tags: Vec<ParsedTag> = ["v1.0.0-rc.1", "v1.0.0", "v0.9.0", "v1.0.0-beta.2"]
            .iter()
            .map(|t| ParsedTag::parse(t).unwrap())
            .collect();
        sort_descending(&mut tags);
        let raw: Vec<&str> = tags.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raw, vec!["v1.0.0", "v1.0.0-rc.1", "v1.0.0-beta.2", "v0.9.0"]);
    }

    #[test]
    fn release_tag_strips_suffix() {
        let tag = ParsedTag::parse("v2.4.1-rc.3").unwrap();
        assert_eq!(tag.release_tag(), "v2.4.1");
    }

    #[test]
    fn stable_is_release_alias() {
        assert_eq!("stable".parse::<Tier>().unwrap(), Tier::Release);
        let tier: Tier = serde_json::from_str("\"stable\"").unwrap();
        assert_eq!(tier, Tier::Release);
        assert!("prod".parse::<Tier>().is_err());
    }

    #[test]
    fn glob_patterns() {
        assert!(matches_pattern("v1.2.3", "v*").unwrap());
        assert!(!matches_pattern("release-1", "v*").unwrap());
        assert!(matches_pattern("v1.2.3", "v?.?.?").unwrap());
        assert!(matches_pattern("v1.2.3-rc.1", "v1.[0-2].*").unwrap());
        assert!(!matches_pattern("v1.5.0", "v1.[!5].*").unwrap());
        assert!(matches_pattern("v1.2.3", "v1.2.3").unwrap());
    }

    #[test]
    fn malformed_glob_is_rejected() {
        assert!(compile_pattern("v[1-2").is_err());
        assert!(compile_pattern("v[]").is_err());
        assert!(matches!(
            matches_pattern("v1.0.0", "v[0-9"),
            Err(PipelineError::Format(_))
        ));
    }
}
