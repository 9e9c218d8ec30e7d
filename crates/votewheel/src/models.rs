use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use crcon::models::Environment;
use crcon::ServerConnectionDetails;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MAX_LABEL_LEN: usize = 10;
const MAX_NAME_LEN: usize = 100;

/// A group of maps sharing selection weight and repeat decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMapGroup")]
pub struct MapGroup {
    pub weight: u32,
    pub repeat_decay: f64,
    pub maps: Vec<String>,
}

#[derive(Deserialize)]
struct RawMapGroup {
    weight: u32,
    repeat_decay: f64,
    #[serde(default)]
    maps: Vec<String>,
}

impl TryFrom<RawMapGroup> for MapGroup {
    type Error = Error;

    fn try_from(raw: RawMapGroup) -> Result<Self> {
        MapGroup::new(raw.weight, raw.repeat_decay, raw.maps)
    }
}

impl MapGroup {
    pub fn new(weight: u32, repeat_decay: f64, maps: Vec<String>) -> Result<Self> {
        validate_weight(weight)?;
        validate_decay(repeat_decay)?;
        Ok(Self {
            weight,
            repeat_decay,
            maps,
        })
    }
}

/// A category of environments sharing selection weight and repeat decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvironmentGroup")]
pub struct EnvironmentGroup {
    pub weight: u32,
    pub repeat_decay: f64,
    pub environments: Vec<Environment>,
}

#[derive(Deserialize)]
struct RawEnvironmentGroup {
    weight: u32,
    repeat_decay: f64,
    #[serde(default)]
    environments: Vec<Environment>,
}

impl TryFrom<RawEnvironmentGroup> for EnvironmentGroup {
    type Error = Error;

    fn try_from(raw: RawEnvironmentGroup) -> Result<Self> {
        EnvironmentGroup::new(raw.weight, raw.repeat_decay, raw.environments)
    }
}

impl EnvironmentGroup {
    pub fn new(weight: u32, repeat_decay: f64, environments: Vec<Environment>) -> Result<Self> {
        validate_weight(weight)?;
        validate_decay(repeat_decay)?;
        Ok(Self {
            weight,
            repeat_decay,
            environments,
        })
    }
}

fn validate_weight(weight: u32) -> Result<()> {
    if weight > 100 {
        return Err(Error::validation(format!(
            "weight {weight} is out of range 0..=100"
        )));
    }
    Ok(())
}

fn validate_decay(decay: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&decay) {
        return Err(Error::validation(format!(
            "repeat_decay {decay} is out of range 0.0..=1.0"
        )));
    }
    Ok(())
}

/// Per-server selection tuning: map groups and environment categories.
///
/// Every map id appears in at most one group and every environment in at
/// most one category; violations fail at construction, never at selection
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeightingParameters")]
pub struct WeightingParameters {
    pub groups: HashMap<String, MapGroup>,
    pub environments: HashMap<String, EnvironmentGroup>,
}

#[derive(Deserialize)]
struct RawWeightingParameters {
    groups: HashMap<String, MapGroup>,
    environments: HashMap<String, EnvironmentGroup>,
}

impl TryFrom<RawWeightingParameters> for WeightingParameters {
    type Error = Error;

    fn try_from(raw: RawWeightingParameters) -> Result<Self> {
        WeightingParameters::new(raw.groups, raw.environments)
    }
}

impl WeightingParameters {
    pub fn new(
        groups: HashMap<String, MapGroup>,
        environments: HashMap<String, EnvironmentGroup>,
    ) -> Result<Self> {
        let mut seen_maps = HashSet::new();
        for group in groups.values() {
            for map_id in &group.maps {
                if !seen_maps.insert(map_id.clone()) {
                    return Err(Error::validation(format!(
                        "map '{map_id}' appears in more than one group"
                    )));
                }
            }
        }
        let mut seen_environments = HashSet::new();
        for category in environments.values() {
            for environment in &category.environments {
                if !seen_environments.insert(*environment) {
                    return Err(Error::validation(format!(
                        "environment '{environment}' appears in more than one category"
                    )));
                }
            }
        }
        Ok(Self {
            groups,
            environments,
        })
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| Error::validation(format!("invalid settings file: {e}")))
    }
}

/// What a controller needs to run one managed server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerParameters {
    pub label: String,
    pub connection: ServerConnectionDetails,
}

/// The persisted record of a managed server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub label: String,
    pub name: String,
    pub connection: ServerConnectionDetails,
    #[serde(default)]
    pub votemap_enabled: bool,
    #[serde(default)]
    pub weighting_parameters: Option<WeightingParameters>,
}

impl ServerRecord {
    pub fn new(label: impl Into<String>, name: impl Into<String>, connection: ServerConnectionDetails) -> Result<Self> {
        let record = Self {
            label: label.into(),
            name: name.into(),
            connection,
            votemap_enabled: false,
            weighting_parameters: None,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.is_empty() || self.label.len() > MAX_LABEL_LEN {
            return Err(Error::validation(format!(
                "label must be 1..={MAX_LABEL_LEN} characters"
            )));
        }
        if self.name.is_empty() || self.name.len() > MAX_NAME_LEN {
            return Err(Error::validation(format!(
                "name must be 1..={MAX_NAME_LEN} characters"
            )));
        }
        Ok(())
    }

    pub fn parameters(&self) -> ServerParameters {
        ServerParameters {
            label: self.label.clone(),
            connection: self.connection.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VipInfo {
    pub player_id: String,
    pub player_name: String,
    pub vip_expiry: Option<DateTime<Utc>>,
}
