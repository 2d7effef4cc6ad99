//! Flat key/value pipeline configuration, in the shape of a pipeline definition's
//! `configuration` object.

use std::{collections::BTreeMap, path::Path};

use serde_json::Value;

use crate::{Error, Result};

/// Name of the setting listing every raw table, comma separated.
pub const RAW_TABLES: &str = "raw_tables";
pub const FILES_DIRECTORY: &str = "files_directory";
pub const SCALE_FACTOR: &str = "scale_factor";
/// Name of the setting listing the tables whose rows carry the batch they were loaded from.
pub const TABLES_WITH_BATCHID: &str = "tables_with_batchid";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSettings {
    values: BTreeMap<String, String>,
}

impl PipelineSettings {
    /// Parse settings from a JSON object.
    ///
    /// Either the settings object itself or a whole pipeline definition holding it under
    /// `configuration` is accepted. Numbers and booleans are kept in their JSON text form.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let object = match value {
            Value::Object(mut map) => match map.remove("configuration") {
                Some(Value::Object(configuration)) => configuration,
                Some(other) => {
                    map.insert("configuration".to_owned(), other);
                    map
                }
                None => map,
            },
            _ => return Err(Error::SettingsNotAnObject),
        };

        let mut values = BTreeMap::new();
        for (key, value) in object {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(Error::InvalidSetting {
                        key,
                        value: other.to_string(),
                        reason: "expected a string, number or boolean".to_owned(),
                    });
                }
            };
            values.insert(key, value);
        }
        Ok(Self { values })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::ReadSettings {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Apply `key=value` overrides on top of the loaded settings.
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in overrides {
            self.set(k, v);
        }
        self
    }

    pub fn get(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingKey(key.to_owned()))
    }

    pub fn get_opt(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// A comma separated list with all spaces removed; empty entries are dropped.
    pub fn get_list(&self, key: &str) -> Result<Vec<String>> {
        Ok(split_list(self.get(key)?))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get(key)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(Error::InvalidSetting {
                key: key.to_owned(),
                value: value.to_owned(),
                reason: "expected true or false".to_owned(),
            }),
        }
    }

    pub fn raw_tables(&self) -> Result<Vec<String>> {
        self.get_list(RAW_TABLES)
    }

    /// Tables whose rows get a `batchid` column; none when the setting is absent.
    pub fn tables_with_batchid(&self) -> Vec<String> {
        self.get_opt(TABLES_WITH_BATCHID)
            .map(split_list)
            .unwrap_or_default()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .replace(' ', "")
        .split(',')
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
