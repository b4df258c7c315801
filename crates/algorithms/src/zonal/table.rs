//! Result table: zone statistics joined back onto their zones

use super::aggregate::{Statistic, ZoneStatistic};
use geozonal_core::vector::AttributeValue;
use geozonal_core::{FeatureId, GeometryStore, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Attribute holding the number of contributing samples
pub const SAMPLE_COUNT_ATTRIBUTE: &str = "n_samples";
/// Attribute holding the number of nodata samples
pub const NODATA_COUNT_ATTRIBUTE: &str = "n_nodata";

/// One zone's statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneRow {
    pub zone_id: FeatureId,
    /// Values aligned with [`ResultTable::statistics`]; `None` when absent
    pub values: Vec<Option<f64>>,
    pub count: usize,
    pub nodata_count: usize,
}

/// One row per zone, in geometry store order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    statistics: Vec<Statistic>,
    rows: Vec<ZoneRow>,
}

impl ResultTable {
    /// Join records onto the zones of `store`.
    ///
    /// Every feature gets a row, whether or not a record exists for it.
    /// Records for zones not in the store are dropped with a warning.
    pub fn join(records: &[ZoneStatistic], store: &GeometryStore) -> Self {
        let mut statistics: Vec<Statistic> = Vec::new();
        for r in records {
            if !statistics.contains(&r.statistic) {
                statistics.push(r.statistic);
            }
        }

        let index: HashMap<&FeatureId, usize> =
            store.iter().enumerate().map(|(i, f)| (f.id(), i)).collect();

        let mut rows: Vec<ZoneRow> = store
            .iter()
            .map(|f| ZoneRow {
                zone_id: f.id().clone(),
                values: vec![None; statistics.len()],
                count: 0,
                nodata_count: 0,
            })
            .collect();

        for r in records {
            let Some(&i) = index.get(&r.zone_id) else {
                tracing::warn!("dropping {} record for unknown zone {}", r.statistic, r.zone_id);
                continue;
            };
            let column = statistics.iter().position(|s| *s == r.statistic).unwrap_or_default();
            let row = &mut rows[i];
            row.values[column] = r.value;
            row.count = r.count;
            row.nodata_count = r.nodata_count;
        }

        Self { statistics, rows }
    }

    pub fn statistics(&self) -> &[Statistic] {
        &self.statistics
    }

    pub fn rows(&self) -> &[ZoneRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, zone_id: &FeatureId) -> Option<&ZoneRow> {
        self.rows.iter().find(|r| &r.zone_id == zone_id)
    }

    /// Value of `statistic` for one zone; `None` if absent or not computed
    pub fn value(&self, zone_id: &FeatureId, statistic: Statistic) -> Option<f64> {
        let column = self.statistics.iter().position(|s| *s == statistic)?;
        self.row(zone_id)?.values[column]
    }

    /// One column in row order, for statistical libraries
    pub fn column(&self, statistic: Statistic) -> Option<Vec<Option<f64>>> {
        let column = self.statistics.iter().position(|s| *s == statistic)?;
        Some(self.rows.iter().map(|r| r.values[column]).collect())
    }

    /// Attach statistics to the zones as attributes.
    ///
    /// Each statistic becomes an attribute named after it (null when
    /// absent), alongside [`SAMPLE_COUNT_ATTRIBUTE`] and
    /// [`NODATA_COUNT_ATTRIBUTE`].
    pub fn into_geometry_store(self, store: &GeometryStore) -> Result<GeometryStore> {
        let by_id: HashMap<FeatureId, ZoneRow> =
            self.rows.into_iter().map(|r| (r.zone_id.clone(), r)).collect();

        let features = store
            .iter()
            .cloned()
            .map(|mut feature| {
                if let Some(row) = by_id.get(feature.id()) {
                    for (stat, value) in self.statistics.iter().zip(&row.values) {
                        feature.set_property(stat.name(), AttributeValue::from(*value));
                    }
                    feature.set_property(SAMPLE_COUNT_ATTRIBUTE, AttributeValue::Int(row.count as i64));
                    feature.set_property(NODATA_COUNT_ATTRIBUTE, AttributeValue::Int(row.nodata_count as i64));
                }
                feature
            })
            .collect();

        GeometryStore::new(store.crs().clone(), features)
    }
}
