//! `name[@version]` command-line argument.

use crate::error::VerifyError;
use std::fmt;
use std::str::FromStr;

/// A package name with an optional version or dist-tag.
///
/// Scoped names keep their leading `@`; only a later `@` separates the
/// version.
///
/// # Examples
///
/// ```
/// use tbv::package_spec::PackageSpec;
///
/// let spec: PackageSpec = "@scope/pkg@2.1.0".parse()?;
/// assert_eq!(spec.name, "@scope/pkg");
/// assert_eq!(spec.version.as_deref(), Some("2.1.0"));
/// # Ok::<(), tbv::error::VerifyError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Package name, including any scope.
    pub name: String,
    /// Requested version or dist-tag.
    pub version: Option<String>,
}

impl FromStr for PackageSpec {
    type Err = VerifyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let split = value
            .char_indices()
            .skip(1)
            .filter(|(_, c)| *c == '@')
            .map(|(index, _)| index)
            .last();
        let (name, version) = match split {
            Some(index) => (&value[..index], Some(&value[index + 1..])),
            None => (value, None),
        };

        if name.is_empty() || name == "@" {
            return Err(VerifyError::Parse {
                reason: format!("missing package name in `{value}`"),
            });
        }
        if version.is_some_and(str::is_empty) {
            return Err(VerifyError::Parse {
                reason: format!("missing version after `@` in `{value}`"),
            });
        }

        Ok(Self {
            name: name.to_owned(),
            version: version.map(str::to_owned),
        })
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{version}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("left-pad", "left-pad", None)]
    #[case("left-pad@1.3.0", "left-pad", Some("1.3.0"))]
    #[case("left-pad@next", "left-pad", Some("next"))]
    #[case("@types/node", "@types/node", None)]
    #[case("@types/node@20.1.0", "@types/node", Some("20.1.0"))]
    fn parses(#[case] input: &str, #[case] name: &str, #[case] version: Option<&str>) {
        let spec: PackageSpec = input.parse().expect("valid spec");
        assert_eq!(spec.name, name);
        assert_eq!(spec.version.as_deref(), version);
        assert_eq!(spec.to_string(), input);
    }

    #[rstest]
    #[case("")]
    #[case("@")]
    #[case("left-pad@")]
    fn rejects(#[case] input: &str) {
        assert!(matches!(
            input.parse::<PackageSpec>(),
            Err(VerifyError::Parse { .. })
        ));
    }
}
