//! Structural release version handling.
//!
//! Release manifests published next to update artifacts carry plain dotted
//! version numbers (`1.2.3`, `2.0.0.17`, occasionally `v1.4` or `1.5.0-rc.1`).
//! They are compared component by component, never as strings: `1.9.0` is
//! older than `1.10.0`.
//!
//! # Accepted Formats
//!
//! - One to four numeric components separated by dots (`1`, `1.2`, `1.2.3`, `1.2.3.4`)
//! - An optional leading `v` or `V`
//! - An optional pre-release suffix after `-`, ordered with semver rules
//!   (`1.0.0-alpha < 1.0.0-beta.2 < 1.0.0`)
//! - Build metadata after `+` is accepted and ignored for ordering and equality
//!
//! Missing trailing components count as zero for ordering, so `1.2` sorts
//! level with `1.2.0`. Deciding whether an update applies needs an exact
//! match instead, see [`ReleaseVersion::is_same_release`].
//!
//! # Examples
//!
//! ```rust
//! use oss_update::version::ReleaseVersion;
//!
//! let old: ReleaseVersion = "1.9.0".parse().unwrap();
//! let new: ReleaseVersion = "1.10.0".parse().unwrap();
//! assert!(old < new);
//!
//! let short: ReleaseVersion = "v2.1".parse().unwrap();
//! assert_eq!(short, "2.1.0".parse::<ReleaseVersion>().unwrap());
//! ```

use semver::Prerelease;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of numeric components in a release version.
pub const MAX_COMPONENTS: usize = 4;

/// Reasons a version string can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    /// The input was empty (after trimming and prefix removal).
    #[error("version string is empty")]
    Empty,

    /// A component was empty or not a non-negative integer.
    #[error("invalid version component '{component}' in '{input}'")]
    InvalidComponent {
        /// The offending component
        component: String,
        /// The full input string
        input: String,
    },

    /// More than [`MAX_COMPONENTS`] numeric components were given.
    #[error("version '{input}' has more than {MAX_COMPONENTS} components")]
    TooManyComponents {
        /// The full input string
        input: String,
    },

    /// The pre-release suffix is not a valid semver pre-release.
    #[error("invalid pre-release '{pre}' in '{input}'")]
    InvalidPrerelease {
        /// The pre-release text after `-`
        pre: String,
        /// The full input string
        input: String,
    },
}

/// A parsed dotted release version.
///
/// Ordering and equality compare numeric components. Trailing zeros are
/// insignificant and a pre-release sorts before the matching release.
#[derive(Debug, Clone)]
pub struct ReleaseVersion {
    components: Vec<u64>,
    pre: Prerelease,
    original: String,
}

impl ReleaseVersion {
    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns a [`VersionParseError`] describing the first problem found.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let trimmed = input.trim();
        let unprefixed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let without_build = unprefixed.split_once('+').map_or(unprefixed, |(core, _)| core);

        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) => {
                let pre = Prerelease::new(pre).map_err(|_| VersionParseError::InvalidPrerelease {
                    pre: pre.to_string(),
                    input: input.to_string(),
                })?;
                if pre.is_empty() {
                    return Err(VersionParseError::InvalidPrerelease {
                        pre: String::new(),
                        input: input.to_string(),
                    });
                }
                (core, pre)
            }
            None => (without_build, Prerelease::EMPTY),
        };

        if core.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let components = core
            .split('.')
            .map(|part| {
                // u64::from_str accepts a leading '+', which is not a version digit
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(VersionParseError::InvalidComponent {
                        component: part.to_string(),
                        input: input.to_string(),
                    });
                }
                part.parse::<u64>().map_err(|_| VersionParseError::InvalidComponent {
                    component: part.to_string(),
                    input: input.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if components.len() > MAX_COMPONENTS {
            return Err(VersionParseError::TooManyComponents {
                input: input.to_string(),
            });
        }

        Ok(Self {
            components,
            pre,
            original: trimmed.to_string(),
        })
    }

    /// Numeric components exactly as written (no zero padding).
    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Component at `index`, zero when the version is shorter.
    #[must_use]
    pub fn component(&self, index: usize) -> u64 {
        self.components.get(index).copied().unwrap_or(0)
    }

    /// Whether the version carries a pre-release suffix.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Whether both versions name the same release exactly.
    ///
    /// Unlike `==`, the number of components matters: `1.0` and `1.0.0`
    /// order equally but are different releases. Build metadata is still
    /// ignored.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use oss_update::version::ReleaseVersion;
    ///
    /// let short: ReleaseVersion = "1.0".parse().unwrap();
    /// let long: ReleaseVersion = "1.0.0".parse().unwrap();
    /// assert_eq!(short, long);
    /// assert!(!short.is_same_release(&long));
    /// assert!(long.is_same_release(&"v1.0.0+build.3".parse().unwrap()));
    /// ```
    #[must_use]
    pub fn is_same_release(&self, other: &Self) -> bool {
        self.components == other.components && self.pre == other.pre
    }

    /// The string this version was parsed from, trimmed.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.original
    }
}

impl FromStr for ReleaseVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (0..MAX_COMPONENTS)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReleaseVersion {}
