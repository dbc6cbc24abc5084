//! Engine version strings.
//!
//! Published engine versions look like `MAJOR.MINOR.PATCH[-label][-SNAPSHOT][-build]`
//! where `label` is lowercase ASCII letters and `build` is decimal digits.
//! Only `MAJOR.MINOR.PATCH[-label]` identifies the artifacts to fetch.

use std::fmt;

use crate::error::{NativeError, Result};

/// A parsed engine version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub label: Option<String>,
    raw: String,
}

impl EngineVersion {
    pub fn parse(version: &str) -> Result<Self> {
        let invalid = || NativeError::InvalidVersionFormat {
            version: version.to_string(),
        };
        let parsed = semver::Version::parse(&strip_leading_zeros(version)).map_err(|_| invalid())?;
        if !parsed.build.is_empty() {
            return Err(invalid());
        }

        let pre = parsed.pre.as_str();
        let mut parts = (!pre.is_empty())
            .then(|| pre.split('-'))
            .into_iter()
            .flatten()
            .peekable();
        let label = parts
            .next_if(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_lowercase()))
            .map(str::to_string);
        parts.next_if_eq(&"SNAPSHOT");
        parts.next_if(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()));
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major: parsed.major,
            minor: parsed.minor,
            patch: parsed.patch,
            label,
            raw: version.to_string(),
        })
    }

    /// `MAJOR.MINOR.PATCH[-label]`
    pub fn canonical(&self) -> String {
        match &self.label {
            Some(label) => format!("{}.{}.{}-{label}", self.major, self.minor, self.patch),
            None => format!("{}.{}.{}", self.major, self.minor, self.patch),
        }
    }

    /// The string this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `prefix` is a leading substring of the full version string.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.raw.starts_with(prefix)
    }

    /// Whether bundled artifacts live under `{engine}/{flavor}/{classifier}`
    /// rather than the legacy `native/lib` prefix.
    pub fn uses_engine_path_prefix(&self) -> bool {
        self.major > 1 || self.minor > 10 || (self.minor == 10 && self.patch == 2)
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Drop leading zeros from purely numeric parts (`01.8.1-007` becomes
/// `1.8.1-7`), which published build numbers may carry but semver rejects.
fn strip_leading_zeros(version: &str) -> String {
    fn trim(part: &str) -> &str {
        if part.len() > 1 && part.bytes().all(|b| b.is_ascii_digit()) {
            let trimmed = part.trim_start_matches('0');
            if trimmed.is_empty() {
                "0"
            } else {
                trimmed
            }
        } else {
            part
        }
    }

    let (core, rest) = match version.split_once('-') {
        Some((core, rest)) => (core, Some(rest)),
        None => (version, None),
    };
    let mut out = core.split('.').map(trim).collect::<Vec<_>>().join(".");
    if let Some(rest) = rest {
        for part in rest.split('-') {
            out.push('-');
            out.push_str(trim(part));
        }
    }
    out
}

/// Strip snapshot and build suffixes from a version string.
pub fn canonical_version(version: &str) -> Result<String> {
    EngineVersion::parse(version).map(|v| v.canonical())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_forms() {
        let cases = [
            ("1.10.2", "1.10.2"),
            ("1.10.2-xyz", "1.10.2-xyz"),
            ("1.10.2-xyz-SNAPSHOT-7", "1.10.2-xyz"),
            ("1.10.2-SNAPSHOT", "1.10.2"),
            ("1.8.1-20210421", "1.8.1"),
            ("2.1.1-SNAPSHOT-3", "2.1.1"),
            ("0.0.1-rc", "0.0.1-rc"),
        ];
        for (input, expected) in cases {
            assert_eq!(canonical_version(input).unwrap(), expected, "{input}");
        }
    }

    #[test]
    fn leading_zeros_are_accepted() {
        assert_eq!(canonical_version("1.8.1-007").unwrap(), "1.8.1");
        assert_eq!(canonical_version("1.8.1-SNAPSHOT-0042").unwrap(), "1.8.1");
        let v = EngineVersion::parse("01.08.1").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 8, 1));
        assert_eq!(v.canonical(), "1.8.1");
        assert_eq!(v.as_str(), "01.08.1");
        assert_eq!(strip_leading_zeros("1.10.0-000"), "1.10.0-0");
    }

    #[test]
    fn rejects_other_shapes() {
        for input in [
            "",
            "1.10",
            "v1.10.2",
            "1.10.2-RC1",
            "1.10.2-xyz-abc",
            "1.10.2-7-SNAPSHOT",
            "1.10.2-xyz.1",
            "1.10.2+build",
            "1.10.2-xyz--7",
            "1.10.2--xyz",
            "1.10.2.4",
        ] {
            assert!(
                matches!(
                    canonical_version(input),
                    Err(NativeError::InvalidVersionFormat { .. })
                ),
                "{input}"
            );
        }
    }

    #[test]
    fn components_and_prefix() {
        let v = EngineVersion::parse("1.8.1-20210421").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 8, 1));
        assert!(v.matches_prefix("1.8.1"));
        assert!(v.matches_prefix("1.8"));
        assert!(!v.matches_prefix("1.9"));
        assert_eq!(v.to_string(), "1.8.1-20210421");
    }

    #[test]
    fn artifact_path_prefix_rule() {
        let uses = |s: &str| EngineVersion::parse(s).unwrap().uses_engine_path_prefix();
        assert!(!uses("1.9.1"));
        assert!(!uses("1.10.0"));
        assert!(uses("1.10.2"));
        assert!(uses("1.11.0"));
        assert!(uses("2.0.1"));
    }
}
