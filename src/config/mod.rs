use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::transform::{
    DEFAULT_NODE_FUNCTION, DEFAULT_RELATION_FUNCTION, DEFAULT_RELATION_MEMBER_FUNCTION,
    DEFAULT_WAY_FUNCTION, FunctionNames,
};

pub const ENV_PREFIX: &str = "TAGXFORM";

/// Rule set configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TransformConfig {
    pub script_path: PathBuf,
    #[serde(default = "default_node_function")]
    pub node_function: String,
    #[serde(default = "default_way_function")]
    pub way_function: String,
    #[serde(default = "default_relation_function")]
    pub relation_function: String,
    #[serde(default = "default_relation_member_function")]
    pub relation_member_function: String,
    /// Append `osm_*` provenance tags before calling the rule set.
    #[serde(default)]
    pub extra_attributes: bool,
    /// Script operation budget per call, 0 for unlimited.
    #[serde(default)]
    pub max_operations: u64,
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Default, Clone)]
pub struct TransformOverrides {
    pub script_path: Option<PathBuf>,
    pub extra_attributes: bool,
}

impl TransformConfig {
    pub fn new(script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            node_function: default_node_function(),
            way_function: default_way_function(),
            relation_function: default_relation_function(),
            relation_member_function: default_relation_member_function(),
            extra_attributes: false,
            max_operations: 0,
        }
    }

    /// Layer the optional config file, `TAGXFORM_*` environment variables
    /// and command line overrides.
    pub fn load(path: Option<&Path>, overrides: &TransformOverrides) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        let settings = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX))
            .set_override_option(
                "script_path",
                overrides
                    .script_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )?
            .set_override_option("extra_attributes", overrides.extra_attributes.then_some(true))?
            .build()?;

        settings.try_deserialize().map_err(|err| {
            anyhow::anyhow!("Config: invalid tag transform configuration: {}", err)
        })
    }

    pub fn function_names(&self) -> FunctionNames {
        FunctionNames {
            node: self.node_function.clone(),
            way: self.way_function.clone(),
            relation: self.relation_function.clone(),
            relation_member: self.relation_member_function.clone(),
        }
    }
}

fn default_node_function() -> String {
    DEFAULT_NODE_FUNCTION.to_string()
}

fn default_way_function() -> String {
    DEFAULT_WAY_FUNCTION.to_string()
}

fn default_relation_function() -> String {
    DEFAULT_RELATION_FUNCTION.to_string()
}

fn default_relation_member_function() -> String {
    DEFAULT_RELATION_MEMBER_FUNCTION.to_string()
}

/// Host pipeline settings.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Worker threads for the filter pass; `None` uses every core.
    pub threads: Option<usize>,
    /// Abort on the first per-entity failure instead of skipping the entity.
    pub strict: bool,
    /// Write decisions for dropped entities too.
    pub include_dropped: bool,
}
