use std::{collections::HashMap, num::NonZeroUsize};

use datafusion::{error::DataFusionError, prelude::SessionConfig};

/// Session options for the embedded engine that builds the bronze tables.
#[derive(Debug, Default, clap::Parser, Clone)]
pub struct DataFusionConfig {
    /// Number of partitions the engine splits scans and repartitions into.
    ///
    /// Defaults to the number of logical cores on the system.
    #[clap(
        long = "datafusion-target-partitions",
        env = "TPCDI_DATAFUSION_TARGET_PARTITIONS",
        action
    )]
    pub target_partitions: Option<NonZeroUsize>,

    /// Provide custom configuration to DataFusion as a comma-separated list of key:value pairs.
    ///
    /// # Example
    /// ```text
    /// --datafusion-config "datafusion.execution.batch_size:4096, datafusion.catalog.information_schema:true"
    /// ```
    #[clap(
    long = "datafusion-config",
    env = "TPCDI_DATAFUSION_CONFIG",
    default_value = "",
    value_parser = parse_datafusion_config,
    action
    )]
    pub datafusion_config: HashMap<String, String>,
}

impl DataFusionConfig {
    /// Build the [`SessionConfig`] for a bronze run.
    ///
    /// Keys passed through `--datafusion-config` are applied last, so they win over the
    /// dedicated flags.
    pub fn session_config(&self) -> Result<SessionConfig, DataFusionError> {
        let mut config = SessionConfig::new();
        if let Some(n) = self.target_partitions {
            config = config.with_target_partitions(n.get());
        }
        for (k, v) in &self.datafusion_config {
            config.options_mut().set(k, v)?;
        }
        Ok(config)
    }
}

fn parse_datafusion_config(
    s: &str,
) -> Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync + 'static>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(HashMap::with_capacity(0));
    }

    let mut out = HashMap::new();
    for part in s.split(',') {
        let kv = part.trim().splitn(2, ':').collect::<Vec<_>>();
        match kv.as_slice() {
            [key, value] => {
                let key_owned = key.trim().to_owned();
                let value_owned = value.trim().to_owned();
                let existed = out.insert(key_owned, value_owned).is_some();
                if existed {
                    return Err(format!("key '{key}' passed multiple times").into());
                }
            }
            _ => {
                return Err(
                    format!("Invalid key value pair - expected 'KEY:VALUE' got '{s}'").into(),
                );
            }
        }
    }

    Ok(out)
}
