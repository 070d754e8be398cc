use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Key of the synthetic environment tag that matches every catalog entry.
pub const ALL_ENVIRONMENTS: &str = "all";

/// Title shown for the synthetic tag unless `CATALOG_ALL_TITLE` overrides it.
pub const DEFAULT_ALL_TITLE: &str = "Todos";

/// Opaque catalog identifier. The remote service may send numbers or strings;
/// both are normalised to their string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PlantId(String);

impl PlantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PlantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => PlantId(s),
            RawId::Number(n) => PlantId(n.to_string()),
        })
    }
}

/// A plant card as returned by the remote catalog. Read-only to this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: PlantId,
    pub name: String,
    pub about: String,
    /// URI of the plant's vector image; resolved by the UI.
    #[serde(rename = "photo")]
    pub photo_ref: String,
    pub water_tips: String,
    pub environments: Vec<String>,
}

impl CatalogEntry {
    pub fn grows_in(&self, environment: &str) -> bool {
        self.environments.iter().any(|e| e == environment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentTag {
    pub key: String,
    pub title: String,
}

impl EnvironmentTag {
    /// The locally injected tag placed ahead of the remote list.
    pub fn all(title: impl Into<String>) -> Self {
        Self {
            key: ALL_ENVIRONMENTS.to_string(),
            title: title.into(),
        }
    }
}

/// A catalog entry the user adopted, plus the time they want to be reminded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPlant {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    #[serde(rename = "dateTimeNotification")]
    pub reminder_at: DateTime<Utc>,
}

impl StoredPlant {
    pub fn id(&self) -> &PlantId {
        &self.entry.id
    }
}

#[cfg(test)]
pub(crate) fn sample_entry(id: &str, name: &str, environments: &[&str]) -> CatalogEntry {
    CatalogEntry {
        id: PlantId::new(id),
        name: name.to_string(),
        about: format!("{name} is easy to care for."),
        photo_ref: format!("https://plants.test/{id}.svg"),
        water_tips: "Keep the soil moist.".to_string(),
        environments: environments.iter().map(|e| e.to_string()).collect(),
    }
}
