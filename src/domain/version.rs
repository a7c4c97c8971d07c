//! Configuration versions, include version requirements and the pluggable
//! compatibility policy.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::DomainError;

/// Version declared by a configuration header (`major.minor[.patch]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidVersion(s.to_string());
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid());
        }
        let mut nums = [0u64; 3];
        for (slot, part) in nums.iter_mut().zip(parts.iter()) {
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Ok(Version::new(nums[0], nums[1], nums[2]))
    }
}

/// Version an including configuration expects from an include.
///
/// Components left open (`x`, `*` or omitted) match anything:
/// `1.x`, `1`, `1.3`, `1.3.x`, `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionRequirement {
    pub major: Option<u64>,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
}

impl VersionRequirement {
    pub fn any() -> Self {
        Self::default()
    }

    /// True when every pinned component equals the actual version's.
    pub fn matches(&self, actual: &Version) -> bool {
        self.major.map_or(true, |m| m == actual.major)
            && self.minor.map_or(true, |m| m == actual.minor)
            && self.patch.map_or(true, |p| p == actual.patch)
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let comp = |c: Option<u64>| c.map_or_else(|| "x".to_string(), |v| v.to_string());
        match (self.major, self.minor, self.patch) {
            (None, None, None) => f.write_str("*"),
            (_, _, None) => write!(f, "{}.{}", comp(self.major), comp(self.minor)),
            _ => write!(
                f,
                "{}.{}.{}",
                comp(self.major),
                comp(self.minor),
                comp(self.patch)
            ),
        }
    }
}

impl FromStr for VersionRequirement {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }
        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() > 3 {
            return Err(DomainError::InvalidVersion(s.to_string()));
        }
        let mut comps: [Option<u64>; 3] = [None; 3];
        let mut open = false;
        for (slot, part) in comps.iter_mut().zip(parts.iter()) {
            if *part == "x" || *part == "X" || *part == "*" {
                open = true;
                continue;
            }
            // a pinned component after a wildcard ("1.x.3") is meaningless
            if open {
                return Err(DomainError::InvalidVersion(s.to_string()));
            }
            *slot = Some(
                part.parse()
                    .map_err(|_| DomainError::InvalidVersion(s.to_string()))?,
            );
        }
        Ok(Self {
            major: comps[0],
            minor: comps[1],
            patch: comps[2],
        })
    }
}

/// Decides whether an included configuration satisfies the including one.
pub trait VersionPolicy: Send + Sync {
    fn is_compatible(&self, required: &VersionRequirement, actual: &Version) -> bool;
}

/// Default policy: only the major version has to agree.
#[derive(Debug, Default, Clone, Copy)]
pub struct SameMajorPolicy;

impl VersionPolicy for SameMajorPolicy {
    fn is_compatible(&self, required: &VersionRequirement, actual: &Version) -> bool {
        required.major.map_or(true, |m| m == actual.major)
    }
}

/// Every component pinned by the requirement has to agree.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactPolicy;

impl VersionPolicy for ExactPolicy {
    fn is_compatible(&self, required: &VersionRequirement, actual: &Version) -> bool {
        required.matches(actual)
    }
}
