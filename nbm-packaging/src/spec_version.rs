// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Module specification version handling.

A specification version is a dot-delimited sequence of non-negative integers,
e.g. `1.2.3`. Versions sort lexicographically by their integer components. When
one version is a prefix of the other, the shorter version sorts first, so `1.1`
is older than `1.1.1` and `1.2` is older than `1.2.0`.

This module also implements the policies used to bump versions on trunk and
release branches. Trunk builds always bump to a version that sorts above every
branch version derived from the same base.
*/

use {
    crate::error::{NbmError, Result},
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// A parsed specification version.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SpecificationVersion {
    digits: Vec<u64>,
}

fn parse_segment(full: &str, segment: &str, canonical: bool) -> Result<u64> {
    if segment.is_empty() {
        return Err(NbmError::MalformedVersion(
            full.to_string(),
            "empty version segment",
        ));
    }

    if !segment.chars().all(|c| c.is_ascii_digit()) {
        return Err(NbmError::MalformedVersion(
            full.to_string(),
            "version segment has non-digit characters",
        ));
    }

    if canonical && segment.len() > 1 && segment.starts_with('0') {
        return Err(NbmError::MalformedVersion(
            full.to_string(),
            "version segment is not a canonical integer",
        ));
    }

    u64::from_str(segment).map_err(|_| {
        NbmError::MalformedVersion(full.to_string(), "version segment does not fit an integer")
    })
}

impl SpecificationVersion {
    /// Construct an instance by parsing a version string.
    ///
    /// Leading zeros in segments are tolerated.
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_with(s, false)
    }

    /// Parse a version string, rejecting segments with leading zeros.
    ///
    /// This is the validator used when composing new versions from a base
    /// value: `050123` is refused instead of being read as `50123`.
    pub fn parse_canonical(s: &str) -> Result<Self> {
        Self::parse_with(s, true)
    }

    /// Parse an OSGi `Bundle-Version`.
    ///
    /// Only the first 3 segments are numeric. A trailing qualifier is ignored.
    pub fn parse_osgi(s: &str) -> Result<Self> {
        let digits = s
            .trim()
            .split('.')
            .take(3)
            .map(|segment| parse_segment(s, segment, false))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { digits })
    }

    fn parse_with(s: &str, canonical: bool) -> Result<Self> {
        let s_trimmed = s.trim();

        if s_trimmed.is_empty() {
            return Err(NbmError::MalformedVersion(s.to_string(), "empty version"));
        }

        let digits = s_trimmed
            .split('.')
            .map(|segment| parse_segment(s, segment, canonical))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { digits })
    }

    /// The integer components of this version.
    pub fn digits(&self) -> &[u64] {
        &self.digits
    }

    /// Whether this version, as installed, satisfies a required version.
    pub fn satisfies(&self, required: &Self) -> bool {
        self >= required
    }

    fn digit(&self, index: usize) -> u64 {
        self.digits.get(index).copied().unwrap_or(0)
    }

    /// The digit at `index` plus 1.
    fn bumped(&self, index: usize) -> Result<u64> {
        self.digit(index).checked_add(1).ok_or_else(|| {
            NbmError::MalformedVersion(self.to_string(), "segment too large to increment")
        })
    }
}

impl FromStr for SpecificationVersion {
    type Err = NbmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for SpecificationVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.digits
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(".")
        )
    }
}

impl PartialOrd<Self> for SpecificationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SpecificationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.digits.iter().zip(other.digits.iter()) {
            match a.cmp(b) {
                Ordering::Equal => {}
                res => {
                    return res;
                }
            }
        }

        self.digits.len().cmp(&other.digits.len())
    }
}

/// Compare 2 versions, returning `-1`, `0` or `1`.
pub fn compare(a: &SpecificationVersion, b: &SpecificationVersion) -> i32 {
    match a.cmp(b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Whether an installed version satisfies a required version.
pub fn satisfies(installed: &SpecificationVersion, required: &SpecificationVersion) -> bool {
    installed.satisfies(required)
}

/// Compute the next trunk version.
///
/// Manifest style versions have 2 segments: `x.y` becomes `x.(y+1)`. A bare `N`
/// becomes `N.1` and longer versions are truncated to 2 segments.
///
/// Property style versions have 3 segments ending in `0`: `x.y.0` becomes
/// `x.(y+1).0`. Any other shape is widened to `x.(y+1).0`, which sorts above
/// every branch increment of the same base.
pub fn increment_trunk(old: &str, manifest_style: bool) -> Result<SpecificationVersion> {
    let v = SpecificationVersion::parse_canonical(old)?;

    let digits = if manifest_style {
        match v.digits.len() {
            1 => vec![v.digit(0), 1],
            _ => vec![v.digit(0), v.bumped(1)?],
        }
    } else {
        match v.digits.len() {
            1 => vec![v.digit(0), 1, 0],
            _ => vec![v.digit(0), v.bumped(1)?, 0],
        }
    };

    Ok(SpecificationVersion { digits })
}

/// Compute the next release branch version.
///
/// The result always has 3 segments: `x.y.z` becomes `x.y.(z+1)`, `x.y` becomes
/// `x.y.1` and `N` becomes `N.0.1`. Longer versions are truncated to 3 segments.
///
/// Manifest and property styles agree on branches. The flag is kept so callers
/// can pass the same style to both increment policies.
pub fn increment_branch(old: &str, manifest_style: bool) -> Result<SpecificationVersion> {
    let v = SpecificationVersion::parse_canonical(old)?;

    let digits = match (v.digits.len(), manifest_style) {
        (1, _) => vec![v.digit(0), 0, 1],
        (2, _) => vec![v.digit(0), v.digit(1), 1],
        (_, _) => vec![v.digit(0), v.digit(1), v.bumped(2)?],
    };

    Ok(SpecificationVersion { digits })
}

/// Highest segment index [increment_sticky] accepts.
pub const MAX_STICKY_LEVEL: usize = 16;

/// Increment the digit at position `sticky_level`.
///
/// Digits after the position are dropped. Missing digits before it are filled
/// with `0`.
pub fn increment_sticky(old: &str, sticky_level: usize) -> Result<SpecificationVersion> {
    if !(1..=MAX_STICKY_LEVEL).contains(&sticky_level) {
        return Err(NbmError::InvalidStickyLevel(sticky_level));
    }

    let v = SpecificationVersion::parse_canonical(old)?;

    let mut digits = (0..sticky_level).map(|i| v.digit(i)).collect::<Vec<_>>();
    digits.push(v.bumped(sticky_level)?);

    Ok(SpecificationVersion { digits })
}

#[cfg(test)]
mod test {
    use super::*;

    fn v(s: &str) -> SpecificationVersion {
        SpecificationVersion::parse(s).unwrap()
    }

    #[test]
    fn parse() -> Result<()> {
        assert_eq!(v("1.2.3").digits(), &[1, 2, 3]);
        assert_eq!(v("7").digits(), &[7]);
        assert_eq!(v("1.05").digits(), &[1, 5]);

        for bad in ["", "1.", ".1", "1..2", "1.x", "1.2beta", "-12", "1.-2"] {
            assert!(
                matches!(
                    SpecificationVersion::parse(bad),
                    Err(NbmError::MalformedVersion(..))
                ),
                "{} should not parse",
                bad
            );
        }

        Ok(())
    }

    #[test]
    fn parse_canonical() {
        assert!(SpecificationVersion::parse_canonical("1.0.10").is_ok());
        assert!(SpecificationVersion::parse("050123").is_ok());
        assert!(matches!(
            SpecificationVersion::parse_canonical("050123"),
            Err(NbmError::MalformedVersion(..))
        ));
        assert!(SpecificationVersion::parse_canonical("-12").is_err());
    }

    #[test]
    fn parse_osgi() -> Result<()> {
        assert_eq!(
            SpecificationVersion::parse_osgi("1.2.3.v20100101")?.digits(),
            &[1, 2, 3]
        );
        assert_eq!(SpecificationVersion::parse_osgi("2.0")?.digits(), &[2, 0]);
        assert!(SpecificationVersion::parse_osgi("1.x").is_err());

        Ok(())
    }

    #[test]
    fn format() {
        for s in ["1", "1.2", "1.2.3", "10.0.0"] {
            assert_eq!(format!("{}", v(s)), s);
        }
        assert_eq!(format!("{}", v("1.05")), "1.5");
    }

    #[test]
    fn compare_versions() {
        assert_eq!(compare(&v("1.1"), &v("1.1.1")), -1);
        assert_eq!(compare(&v("1.2"), &v("1.2.0")), -1);
        assert_eq!(compare(&v("1.2.0"), &v("1.2")), 1);
        assert_eq!(compare(&v("1.10"), &v("1.9")), 1);
        assert_eq!(compare(&v("2"), &v("1.99.99")), 1);
        assert_eq!(compare(&v("1.05"), &v("1.5")), 0);
    }

    #[test]
    fn ordering_is_total() {
        let versions = ["1", "1.0", "1.0.0", "1.0.1", "1.1", "1.1.1", "1.2", "2", "10"]
            .iter()
            .map(|s| v(s))
            .collect::<Vec<_>>();

        for a in &versions {
            for b in &versions {
                assert_eq!(compare(a, b), -compare(b, a));
                for c in &versions {
                    if a <= b && b <= c {
                        assert!(a <= c);
                    }
                }
            }
        }

        let mut sorted = versions.clone();
        sorted.reverse();
        sorted.sort();
        assert_eq!(sorted, versions);
    }

    #[test]
    fn satisfies_versions() {
        for s in ["1", "1.0", "3.4.5"] {
            assert!(satisfies(&v(s), &v(s)));
        }

        assert!(satisfies(&v("2.0"), &v("1.9")));
        assert!(!satisfies(&v("1.0"), &v("2.0")));
        assert!(!satisfies(&v("1.2"), &v("1.2.0")));
    }

    #[test]
    fn trunk_increments() -> Result<()> {
        assert_eq!(increment_trunk("1.0", true)?, v("1.1"));
        assert_eq!(increment_trunk("5", true)?, v("5.1"));
        assert_eq!(increment_trunk("1.2.3", true)?, v("1.3"));

        assert_eq!(increment_trunk("1.1.0", false)?, v("1.2.0"));
        assert_eq!(increment_trunk("1.1.3", false)?, v("1.2.0"));
        assert_eq!(increment_trunk("1.1", false)?, v("1.2.0"));
        assert_eq!(increment_trunk("4", false)?, v("4.1.0"));

        assert!(increment_trunk("050123", true).is_err());

        Ok(())
    }

    #[test]
    fn branch_increments() -> Result<()> {
        assert_eq!(increment_branch("1.2.3", true)?, v("1.2.4"));
        assert_eq!(increment_branch("1.2", true)?, v("1.2.1"));
        assert_eq!(increment_branch("1", true)?, v("1.0.1"));
        assert_eq!(increment_branch("1.2.3.4", true)?, v("1.2.4"));
        assert_eq!(increment_branch("1.2.0", false)?, v("1.2.1"));

        Ok(())
    }

    #[test]
    fn trunk_sorts_above_branch() -> Result<()> {
        for base in ["1", "1.2", "1.2.0", "1.2.3", "3.0.7"] {
            for manifest in [true, false] {
                let trunk = increment_trunk(base, manifest)?;
                let branch = increment_branch(base, manifest)?;
                assert!(trunk > branch, "{} vs {} from {}", trunk, branch, base);
                assert!(trunk > v(base));
                assert!(branch > v(base));
            }
        }

        Ok(())
    }

    #[test]
    fn sticky_increments() -> Result<()> {
        assert_eq!(increment_sticky("1.2.3", 1)?, v("1.3"));
        assert_eq!(increment_sticky("1.2.3", 2)?, v("1.2.4"));
        assert_eq!(increment_sticky("1.2", 2)?, v("1.2.1"));
        assert_eq!(increment_sticky("1", 3)?, v("1.0.0.1"));

        assert!(matches!(
            increment_sticky("1.2", 0),
            Err(NbmError::InvalidStickyLevel(0))
        ));
        assert!(increment_sticky("1.2", MAX_STICKY_LEVEL).is_ok());
        assert!(matches!(
            increment_sticky("1.2", usize::MAX),
            Err(NbmError::InvalidStickyLevel(usize::MAX))
        ));

        Ok(())
    }

    #[test]
    fn increment_overflow() -> Result<()> {
        let max = u64::MAX.to_string();

        for res in [
            increment_trunk(&format!("1.{}", max), true),
            increment_trunk(&format!("1.{}.0", max), false),
            increment_branch(&format!("1.2.{}", max), true),
            increment_sticky(&format!("1.{}", max), 1),
        ] {
            assert!(matches!(res, Err(NbmError::MalformedVersion(_, _))));
        }

        // Only the incremented segment matters.
        assert_eq!(increment_sticky(&max, 1)?.digits(), &[u64::MAX, 1]);

        Ok(())
    }
}
