use crate::dataset::blob_store::BlobStore;
use crate::dataset::model::Dimension;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One monitored property and its overrides. spec.md §3. The wire shape
/// mirrors spec.md §6's `config/properties.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyConfigWire {
    pub property_id: String,
    #[serde(default)]
    pub dataset_id: String,
    pub client_name: String,
    #[serde(default)]
    pub domain: String,
    /// Comma-separated, per spec.md §6.
    #[serde(default)]
    pub conversion_events: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub is_configured: bool,
    #[serde(default)]
    pub suppressed_dimensions: Vec<String>,
    #[serde(default)]
    pub volume_overrides: VolumeOverrides,
}

/// Per-property overrides of the default volume floors each detector applies
/// (spec.md §3: "optional volume overrides").
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VolumeOverrides {
    pub disaster_min_sessions: Option<f64>,
    pub spam_min_sessions_overall: Option<f64>,
    pub spam_min_sessions_dimension: Option<f64>,
    pub record_min_mean_sessions: Option<f64>,
    pub trend_min_mean_sessions: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PropertyConfig {
    pub property_id: String,
    pub display_name: String,
    pub domain: String,
    pub conversion_events: Vec<String>,
    suppressed_dimensions: BTreeSet<Dimension>,
    pub volume_overrides: VolumeOverrides,
}

impl PropertyConfig {
    pub fn dimension_enabled(&self, dimension: Dimension) -> bool {
        !self.suppressed_dimensions.contains(&dimension)
    }

    /// A minimal, all-dimensions-enabled fixture for detector unit tests.
    #[cfg(test)]
    pub fn test_fixture(property_id: &str) -> Self {
        Self {
            property_id: property_id.to_string(),
            display_name: property_id.to_string(),
            domain: format!("{property_id}.example.com"),
            conversion_events: vec!["signup".to_string()],
            suppressed_dimensions: BTreeSet::new(),
            volume_overrides: VolumeOverrides::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PropertiesFile {
    properties: Vec<PropertyConfigWire>,
}

/// Enumerates monitored properties and their per-property overrides.
/// spec.md §2 leaf 2. Only `is_configured=true` properties are processed
/// (spec.md §6).
pub struct PropertyRegistry {
    properties: Vec<PropertyConfig>,
}

fn parse_dimension(name: &str) -> Option<Dimension> {
    match name {
        "overall" => Some(Dimension::Overall),
        "geography" => Some(Dimension::Geography),
        "device" => Some(Dimension::Device),
        "traffic_source" => Some(Dimension::TrafficSource),
        "landing_page" => Some(Dimension::LandingPage),
        _ => None,
    }
}

impl PropertyRegistry {
    pub fn from_wire(file: PropertiesFile) -> Result<Self, ConfigError> {
        let mut properties = Vec::new();
        for wire in file.properties {
            if !wire.is_configured {
                continue;
            }
            let suppressed_dimensions = wire
                .suppressed_dimensions
                .iter()
                .filter_map(|s| parse_dimension(s))
                .collect();
            let conversion_events = wire
                .conversion_events
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            properties.push(PropertyConfig {
                property_id: wire.property_id,
                display_name: wire.client_name,
                domain: wire.domain,
                conversion_events,
                suppressed_dimensions,
                volume_overrides: wire.volume_overrides,
            });
        }
        if properties.is_empty() {
            return Err(ConfigError::EmptyEnabledSet);
        }
        Ok(Self { properties })
    }

    pub async fn load(store: Arc<dyn BlobStore>, key: &str) -> Result<Self, ConfigError> {
        let bytes = store.get(key).await.map_err(|_| ConfigError::RegistryMissing(key.to_string()))?;
        let file: PropertiesFile = serde_json::from_slice(&bytes).map_err(|source| ConfigError::RegistryMalformed { path: key.to_string(), source })?;
        Self::from_wire(file)
    }

    pub fn enabled_properties(&self) -> &[PropertyConfig] {
        &self.properties
    }

    /// Restricts the registry to the given property ids, preserving the
    /// CLI's `--properties=id,id` filter (spec.md §6).
    pub fn filter(mut self, ids: Option<&[String]>) -> Self {
        if let Some(ids) = ids {
            self.properties.retain(|p| ids.contains(&p.property_id));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(is_configured: bool) -> PropertiesFile {
        PropertiesFile {
            properties: vec![PropertyConfigWire {
                property_id: "p1".into(),
                dataset_id: "".into(),
                client_name: "Acme".into(),
                domain: "acme.com".into(),
                conversion_events: "signup, purchase".into(),
                notes: "".into(),
                is_configured,
                suppressed_dimensions: vec!["device".into()],
                volume_overrides: VolumeOverrides::default(),
            }],
        }
    }

    #[test]
    fn only_configured_properties_survive() {
        let registry = PropertyRegistry::from_wire(wire(true)).unwrap();
        assert_eq!(registry.enabled_properties().len(), 1);
        let err = PropertyRegistry::from_wire(wire(false)).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyEnabledSet));
    }

    #[test]
    fn suppressed_dimension_is_disabled() {
        let registry = PropertyRegistry::from_wire(wire(true)).unwrap();
        let p = &registry.enabled_properties()[0];
        assert!(!p.dimension_enabled(Dimension::Device));
        assert!(p.dimension_enabled(Dimension::Overall));
    }

    #[test]
    fn conversion_events_are_split_and_trimmed() {
        let registry = PropertyRegistry::from_wire(wire(true)).unwrap();
        assert_eq!(registry.enabled_properties()[0].conversion_events, vec!["signup", "purchase"]);
    }
}
