use std::{fmt::Display, path::Path, str::FromStr};

use anyhow::Context;
use tpcdi_config::WorkflowContext;

/// A clap argument provided as a key/value pair separated by `SEPARATOR`, which by default is a
/// '='. Everything after the first separator is the value.
#[derive(Debug, Clone)]
pub(crate) struct SeparatedKeyValue<K, V, const SEPARATOR: char = '='>(pub(crate) (K, V));

impl<K, V, const SEPARATOR: char> FromStr for SeparatedKeyValue<K, V, SEPARATOR>
where
    K: FromStr<Err: Into<anyhow::Error>>,
    V: FromStr<Err: Into<anyhow::Error>>,
{
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| anyhow::anyhow!("missing value, expected key{SEPARATOR}value"))?;
        if key.is_empty() {
            anyhow::bail!("missing key");
        }

        Ok(Self((
            key.parse().map_err(Into::into)?,
            value.parse().map_err(Into::into)?,
        )))
    }
}

/// Outcome line of a command driven by the workflow, `SUCCESS: ...` or `FAILED: ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Status {
    Success(String),
    Failed(String),
}

impl Status {
    pub(crate) fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success(msg) => write!(f, "SUCCESS: {msg}"),
            Self::Failed(msg) => write!(f, "FAILED: {msg}"),
        }
    }
}

pub(crate) fn load_context(path: &Path) -> anyhow::Result<WorkflowContext> {
    WorkflowContext::from_path(path)
        .with_context(|| format!("loading workflow context {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn key_values() {
        let SeparatedKeyValue((k, v)) = "HR.schema=a INT COMMENT 'x=y'"
            .parse::<SeparatedKeyValue<String, String>>()
            .unwrap();
        assert_eq!(k, "HR.schema");
        assert_eq!(v, "a INT COMMENT 'x=y'");

        let SeparatedKeyValue((k, v)) = "HR.header="
            .parse::<SeparatedKeyValue<String, String>>()
            .unwrap();
        assert_eq!((k.as_str(), v.as_str()), ("HR.header", ""));

        assert!("scale_factor".parse::<SeparatedKeyValue<String, String>>().is_err());
        assert!("=10".parse::<SeparatedKeyValue<String, String>>().is_err());
        assert!("sf=ten".parse::<SeparatedKeyValue<String, u32>>().is_err());
    }

    #[test]
    fn status_lines() {
        assert_eq!(
            Status::Success("Batch 2 prepared at /tmp/x".to_owned()).to_string(),
            "SUCCESS: Batch 2 prepared at /tmp/x"
        );
        let failed = Status::Failed("Error preparing batch 9: nope".to_owned());
        assert!(failed.is_failure());
        assert_eq!(failed.to_string(), "FAILED: Error preparing batch 9: nope");
    }
}
