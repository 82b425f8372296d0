use super::blob_store::BlobStore;
use super::model::{CleanDataset, CleanDatasetWire, Dimension, MetricPoint, WirePoint};
use crate::errors::LoadError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Largest window any detector requests (trend: yesterday + 182 prior days +
/// margin). spec.md §4.8 step 3.
pub const MAX_LOOKBACK_DAYS: i64 = 193;

/// Given a property and a lookback horizon, returns a typed `CleanDataset`.
/// spec.md §2 leaf 3.
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    async fn load(&self, property_id: &str, reference_date: NaiveDate, lookback_days: i64) -> Result<CleanDataset, LoadError>;
}

/// Reads `clean_dataset/{property_id}/{YYYY-MM-DD}.json` blobs, normalizing
/// the wire shape (spec.md §6) into a `CleanDataset` and rejecting malformed
/// or out-of-range values at this boundary — per spec.md §9's redesign flag
/// ("isolate at the Dataset Loader boundary; the core sees only normalized
/// data").
pub struct BlobDatasetLoader {
    store: Arc<dyn BlobStore>,
}

impl BlobDatasetLoader {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    fn key(property_id: &str, reference_date: NaiveDate) -> String {
        format!("clean_dataset/{property_id}/{}.json", reference_date.format("%Y-%m-%d"))
    }
}

#[async_trait]
impl DatasetLoader for BlobDatasetLoader {
    async fn load(&self, property_id: &str, reference_date: NaiveDate, lookback_days: i64) -> Result<CleanDataset, LoadError> {
        let key = Self::key(property_id, reference_date);
        let bytes = self.store.get(&key).await.map_err(|source| {
            if matches!(source, crate::errors::BlobError::NotFound(_)) {
                LoadError::NotFound { property_id: property_id.to_string(), key: key.clone() }
            } else {
                LoadError::Blob { property_id: property_id.to_string(), source }
            }
        })?;

        parse_and_validate(property_id, &bytes, lookback_days)
    }
}

/// Parses a raw `clean_dataset` blob and validates it into a `CleanDataset`,
/// rejecting malformed or out-of-range values at this boundary (spec.md §9:
/// "isolate at the Dataset Loader boundary; the core sees only normalized
/// data"). Shared by `BlobDatasetLoader::load` and the CLI's `verify`
/// subcommand, which runs the identical check against a local file without
/// going through a `BlobStore`.
pub fn parse_and_validate(property_id: &str, bytes: &[u8], lookback_days: i64) -> Result<CleanDataset, LoadError> {
    let wire: CleanDatasetWire =
        serde_json::from_slice(bytes).map_err(|source| LoadError::Malformed { property_id: property_id.to_string(), source })?;

    let mut dataset = CleanDataset::new(wire.property_id.clone(), wire.reference_date);
    for (dimension, points) in [
        (Dimension::Overall, &wire.overall),
        (Dimension::Geography, &wire.geography),
        (Dimension::Device, &wire.device),
        (Dimension::TrafficSource, &wire.traffic_source),
        (Dimension::LandingPage, &wire.landing_page),
    ] {
        for point in points {
            validate_point(property_id, point)?;
            dataset.insert_point(
                dimension,
                MetricPoint {
                    date: point.date,
                    dimension_value: point.dimension_value.clone(),
                    metric: point.metric,
                    value: point.value,
                },
            );
        }
    }
    dataset.finalize();

    // A short history is not fatal by itself: individual detectors apply
    // their own minimum-sample guards (spec.md §4.1) and simply produce
    // no signal for windows they can't fill. We only reject datasets with
    // essentially no history to analyze at all.
    let span = dataset.date_range().map(|(earliest, latest)| (latest - earliest).num_days() + 1).unwrap_or(0);
    if span < 2 {
        return Err(LoadError::InsufficientHistory {
            property_id: property_id.to_string(),
            needed: lookback_days,
            found: span,
        });
    }

    Ok(dataset)
}

fn validate_point(property_id: &str, point: &WirePoint) -> Result<(), LoadError> {
    if point.value.is_nan() || point.value.is_infinite() {
        return Err(LoadError::InvalidValue {
            property_id: property_id.to_string(),
            detail: format!("{:?} on {} is NaN/infinite", point.metric, point.date),
        });
    }
    if point.value < 0.0 {
        return Err(LoadError::InvalidValue {
            property_id: property_id.to_string(),
            detail: format!("{:?} on {} is negative ({})", point.metric, point.date, point.value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::blob_store::LocalFsBlobStore;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn loads_and_normalizes_wire_points() {
        let dir = std::env::temp_dir().join(format!("sentinel-loader-{}", uuid::Uuid::new_v4()));
        let store: Arc<dyn BlobStore> = Arc::new(LocalFsBlobStore::new(&dir));
        let json = serde_json::json!({
            "property_id": "p1",
            "reference_date": "2026-07-23",
            "overall": [
                {"date": "2026-07-22", "dimension_value": "", "metric": "sessions", "value": 500},
                {"date": "2026-07-23", "dimension_value": "", "metric": "sessions", "value": 480}
            ],
            "geography": [],
            "device": [],
            "traffic_source": [],
            "landing_page": []
        });
        store
            .put_atomic("clean_dataset/p1/2026-07-23.json", json.to_string().as_bytes())
            .await
            .unwrap();

        let loader = BlobDatasetLoader::new(store);
        let dataset = loader.load("p1", d(2026, 7, 23), 193).await.unwrap();
        assert_eq!(dataset.property_id, "p1");
        let series = dataset.trailing(Dimension::Overall, "", crate::dataset::model::Metric::Sessions, 4);
        assert_eq!(series.len(), 2);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_dataset_is_not_found() {
        let dir = std::env::temp_dir().join(format!("sentinel-loader-{}", uuid::Uuid::new_v4()));
        let store: Arc<dyn BlobStore> = Arc::new(LocalFsBlobStore::new(&dir));
        let loader = BlobDatasetLoader::new(store);
        let err = loader.load("ghost", d(2026, 7, 23), 193).await.unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));
    }

    #[tokio::test]
    async fn negative_value_is_load_error() {
        let dir = std::env::temp_dir().join(format!("sentinel-loader-{}", uuid::Uuid::new_v4()));
        let store: Arc<dyn BlobStore> = Arc::new(LocalFsBlobStore::new(&dir));
        let json = serde_json::json!({
            "property_id": "p1",
            "reference_date": "2026-07-23",
            "overall": [{"date": "2026-07-23", "dimension_value": "", "metric": "sessions", "value": -5}],
            "geography": [], "device": [], "traffic_source": [], "landing_page": []
        });
        store.put_atomic("clean_dataset/p1/2026-07-23.json", json.to_string().as_bytes()).await.unwrap();
        let loader = BlobDatasetLoader::new(store);
        let err = loader.load("p1", d(2026, 7, 23), 193).await.unwrap_err();
        assert!(matches!(err, LoadError::InvalidValue { .. }));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
