use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One interactive prompt of the generator and the line written back to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptExchange {
    /// Text the generator prints when it waits for input
    pub expect: String,
    /// Line written to stdin, without the trailing newline
    pub response: String,
}

/// The ordered prompts a generator version asks before it starts producing data.
///
/// Protocols are versioned so a transcript that no longer matches can be reported against the
/// version the answers were written for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptProtocol {
    pub name: String,
    pub version: u32,
    pub exchanges: Vec<PromptExchange>,
}

impl PromptProtocol {
    /// DIGen asks to press ENTER to read the license, then to type YES to accept it.
    pub fn digen_v1() -> Self {
        Self {
            name: "digen".to_owned(),
            version: 1,
            exchanges: vec![
                PromptExchange {
                    expect: "ENTER".to_owned(),
                    response: String::new(),
                },
                PromptExchange {
                    expect: "YES".to_owned(),
                    response: "YES".to_owned(),
                },
            ],
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::ReadProtocol {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Responses in the order they are written to the generator.
    pub fn responses(&self) -> impl Iterator<Item = &str> {
        self.exchanges.iter().map(|e| e.response.as_str())
    }

    /// The first exchange whose prompt does not show up in `transcript` after the prompts
    /// before it, if any.
    pub fn first_unmatched(&self, transcript: &str) -> Option<&PromptExchange> {
        let mut rest = transcript;
        for exchange in &self.exchanges {
            match rest.find(&exchange.expect) {
                Some(pos) => rest = &rest[pos + exchange.expect.len()..],
                None => return Some(exchange),
            }
        }
        None
    }
}

impl fmt::Display for PromptProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TRANSCRIPT: &str = "\
TPC-DI Data Generator
Please press ENTER to display the license
...
Type YES to accept the license terms
Generating data
";

    #[test]
    fn digen_answers_in_order() {
        let protocol = PromptProtocol::digen_v1();
        assert_eq!(protocol.responses().collect::<Vec<_>>(), vec!["", "YES"]);
        assert_eq!(protocol.to_string(), "digen v1");
    }

    #[test]
    fn transcript_matching() {
        let protocol = PromptProtocol::digen_v1();
        assert_eq!(protocol.first_unmatched(TRANSCRIPT), None);

        let missing_license = "Please press ENTER\nGenerating data\n";
        assert_eq!(
            protocol.first_unmatched(missing_license).unwrap().expect,
            "YES"
        );

        // prompts out of order
        let reordered = "Type YES\nthen press ENTER\n";
        assert_eq!(protocol.first_unmatched(reordered).unwrap().expect, "YES");

        assert_eq!(protocol.first_unmatched("").unwrap().expect, "ENTER");
    }

    #[test]
    fn load_from_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("digen_v2.json");
        std::fs::write(
            &path,
            r#"{
                "name": "digen",
                "version": 2,
                "exchanges": [
                    {"expect": "ENTER", "response": ""},
                    {"expect": "YES", "response": "YES"},
                    {"expect": "Continue?", "response": "y"}
                ]
            }"#,
        )
        .unwrap();

        let protocol = PromptProtocol::from_path(&path).unwrap();
        assert_eq!(protocol.version, 2);
        assert_eq!(
            protocol.responses().collect::<Vec<_>>(),
            vec!["", "YES", "y"]
        );

        assert!(matches!(
            PromptProtocol::from_json("{\"name\": \"digen\"}"),
            Err(Error::ParseProtocol(_))
        ));
        assert!(matches!(
            PromptProtocol::from_path(dir.path().join("missing.json")),
            Err(Error::ReadProtocol { .. })
        ));
    }
}
