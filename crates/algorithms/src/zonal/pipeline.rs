//! End-to-end zonal run: membership, aggregation, result table

use super::aggregate::{Statistic, ZoneStatistic, ZoneValues};
use super::predicate::{membership, MembershipParams, Predicate, TieBreak};
use super::table::ResultTable;
use geozonal_core::{Algorithm, Error, Field, GeometryStore, Result};
use geozonal_parallel::{CancellationToken, ParallelStrategy, ProcessingMode};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Parameters for a zonal run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZonalParams {
    pub predicate: Predicate,
    pub tie_break: TieBreak,
    /// Statistics to compute, in output column order
    pub statistics: Vec<Statistic>,
    /// Attribute holding values when the field is a point set
    pub value_attribute: Option<String>,
    /// Reproject zones into the field CRS before matching
    pub reproject_zones: bool,
    pub mode: ProcessingMode,
}

impl Default for ZonalParams {
    fn default() -> Self {
        Self {
            predicate: Predicate::default(),
            tie_break: TieBreak::default(),
            statistics: vec![Statistic::Mean],
            value_attribute: None,
            reproject_zones: false,
            mode: ProcessingMode::default(),
        }
    }
}

/// Records produced by one run.
///
/// A cancelled run keeps the records of every zone it finished; zones it
/// never reached have no records.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonalRun {
    /// Zone-major, statistics in configured order
    pub records: Vec<ZoneStatistic>,
    /// Zones whose records are present
    pub completed: usize,
    pub total: usize,
}

impl ZonalRun {
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }

    /// All records, or [`Error::Cancelled`] if the run stopped early
    pub fn into_records(self) -> Result<Vec<ZoneStatistic>> {
        if self.is_complete() {
            Ok(self.records)
        } else {
            Err(Error::Cancelled {
                completed: self.completed,
                total: self.total,
            })
        }
    }
}

type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Configured zonal run, optionally cancellable
#[derive(Clone, Default)]
pub struct ZonalPipeline {
    params: ZonalParams,
    cancel: Option<CancellationToken>,
    progress: Option<ProgressFn>,
}

impl fmt::Debug for ZonalPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZonalPipeline")
            .field("params", &self.params)
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ZonalPipeline {
    pub fn new(params: ZonalParams) -> Self {
        Self {
            params,
            cancel: None,
            progress: None,
        }
    }

    /// Check `token` before each zone, during membership and aggregation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Call `f(completed, total)` each time a zone's records are done
    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(f));
        self
    }

    pub fn params(&self) -> &ZonalParams {
        &self.params
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Run and join the records onto `zones`; a cancelled run is an error
    pub fn run(&self, zones: &GeometryStore, field: &Field) -> Result<ResultTable> {
        let records = self.run_records(zones, field)?.into_records()?;
        Ok(ResultTable::join(&records, zones))
    }

    /// Run and return the raw records, keeping those of finished zones on cancellation
    pub fn run_records(&self, zones: &GeometryStore, field: &Field) -> Result<ZonalRun> {
        let params = &self.params;
        if params.statistics.is_empty() {
            return Err(Error::InvalidParameter {
                name: "statistics",
                value: "[]".into(),
                reason: "at least one statistic is required".into(),
            });
        }
        if matches!(field, Field::Points(_)) && params.value_attribute.is_none() {
            return Err(Error::InvalidParameter {
                name: "value_attribute",
                value: "none".into(),
                reason: "point fields need the attribute holding sample values".into(),
            });
        }

        let total = zones.len();
        let nothing_done = ZonalRun {
            records: Vec::new(),
            completed: 0,
            total,
        };
        if self.is_cancelled() {
            return Ok(nothing_done);
        }

        let start = Instant::now();
        let zones: Cow<'_, GeometryStore> = match (params.reproject_zones, field.crs()) {
            (true, Some(target)) if !zones.crs().is_equivalent(target) => {
                tracing::debug!("reprojecting zones {} -> {}", zones.crs(), target);
                Cow::Owned(zones.reproject(target)?)
            }
            _ => Cow::Borrowed(zones),
        };

        let memberships = match membership(
            &zones,
            field,
            &MembershipParams {
                predicate: params.predicate,
                tie_break: params.tie_break,
                mode: params.mode,
                cancel: self.cancel.clone(),
            },
        ) {
            Err(Error::Cancelled { .. }) => return Ok(nothing_done),
            other => other?,
        };

        let completed = AtomicUsize::new(0);
        let per_zone = params.mode.try_par_map(0..memberships.len(), |i| -> Result<Option<Vec<ZoneStatistic>>> {
            if self.is_cancelled() {
                return Ok(None);
            }
            let set = &memberships[i];
            let values = ZoneValues::collect(set, field, params.value_attribute.as_deref())?;
            let records: Vec<ZoneStatistic> = params
                .statistics
                .iter()
                .map(|&stat| values.record(&set.zone_id, stat))
                .collect();
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(progress) = &self.progress {
                progress(done, total);
            }
            Ok(Some(records))
        })?;

        let completed = completed.into_inner();
        let records: Vec<ZoneStatistic> = per_zone.into_iter().flatten().flatten().collect();
        if completed < total {
            tracing::debug!("zonal run cancelled after {} of {} zones", completed, total);
        }
        tracing::debug!(
            "zonal run: {} zones x {} statistics in {:.2?}",
            completed,
            params.statistics.len(),
            start.elapsed()
        );
        Ok(ZonalRun {
            records,
            completed,
            total,
        })
    }
}

/// Zonal statistics algorithm
#[derive(Debug, Clone, Default)]
pub struct ZonalStatistics;

impl Algorithm for ZonalStatistics {
    type Input = (GeometryStore, Field);
    type Output = ResultTable;
    type Params = ZonalParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Zonal Statistics"
    }

    fn description(&self) -> &'static str {
        "Aggregate field values within each zone of a geometry store"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (zones, field) = input;
        ZonalPipeline::new(params).run(&zones, &field)
    }
}

/// Run a zonal aggregation with `params`
pub fn zonal_statistics(zones: &GeometryStore, field: &Field, params: ZonalParams) -> Result<ResultTable> {
    ZonalPipeline::new(params).run(zones, field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{polygon, Geometry};
    use geozonal_core::{Feature, FeatureId, GeoTransform, Raster, CRS};

    fn field() -> Field {
        let raster = Raster::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2)
            .unwrap()
            .with_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0))
            .with_crs(CRS::from_epsg(3857));
        Field::Grid(raster)
    }

    fn zones() -> GeometryStore {
        let rect = |x0: f64, y0: f64, x1: f64, y1: f64| {
            Geometry::Polygon(polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)])
        };
        GeometryStore::new(
            CRS::from_epsg(3857),
            vec![
                Feature::new(1, rect(0.0, 1.0, 2.0, 2.0)).unwrap(),
                Feature::new(2, rect(0.0, 0.0, 2.0, 1.0)).unwrap(),
                Feature::new(3, rect(5.0, 5.0, 6.0, 6.0)).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn default_params_are_mean_center_inside() {
        let p = ZonalParams::default();
        assert_eq!(p.statistics, vec![Statistic::Mean]);
        assert_eq!(p.predicate, Predicate::CenterInside);
        assert_eq!(p.tie_break, TieBreak::LowestId);
    }

    #[test]
    fn params_from_partial_json() {
        let p: ZonalParams = serde_json::from_str(
            r#"{"statistics": ["sum", "std_dev"], "predicate": {"within_distance": 2.5}, "mode": "sequential"}"#,
        )
        .unwrap();
        assert_eq!(p.statistics, vec![Statistic::Sum, Statistic::StdDev]);
        assert_eq!(p.predicate, Predicate::WithinDistance(2.5));
        assert_eq!(p.mode, ProcessingMode::Sequential);
        assert_eq!(p.tie_break, TieBreak::LowestId);
    }

    #[test]
    fn records_are_zone_major() {
        let params = ZonalParams {
            statistics: vec![Statistic::Sum, Statistic::Count],
            ..Default::default()
        };
        let run = ZonalPipeline::new(params).run_records(&zones(), &field()).unwrap();
        assert!(run.is_complete());
        let records = run.records;
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].zone_id, FeatureId::Int(1));
        assert_eq!(records[0].statistic, Statistic::Sum);
        assert_relative_eq!(records[0].value.unwrap(), 3.0);
        assert_eq!(records[1].statistic, Statistic::Count);
        assert_relative_eq!(records[3].value.unwrap(), 2.0);
        assert_eq!(records[4].value, None);
    }

    #[test]
    fn algorithm_trait_runs_pipeline() {
        let table = ZonalStatistics.execute_default((zones(), field())).unwrap();
        assert_eq!(table.value(&FeatureId::Int(1), Statistic::Mean), Some(1.5));
        assert_eq!(table.value(&FeatureId::Int(2), Statistic::Mean), Some(3.5));
        assert_eq!(table.value(&FeatureId::Int(3), Statistic::Mean), None);
    }

    #[test]
    fn empty_statistics_rejected() {
        let params = ZonalParams {
            statistics: vec![],
            ..Default::default()
        };
        assert!(matches!(
            zonal_statistics(&zones(), &field(), params),
            Err(Error::InvalidParameter { name: "statistics", .. })
        ));
    }

    #[test]
    fn cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let err = ZonalPipeline::default()
            .with_cancellation(token)
            .run(&zones(), &field())
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { completed: 0, total: 3 }));
    }

    #[test]
    fn cancelled_mid_run_keeps_finished_zones() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let params = ZonalParams {
            statistics: vec![Statistic::Sum, Statistic::Count],
            mode: ProcessingMode::Sequential,
            ..Default::default()
        };
        let pipeline = ZonalPipeline::new(params)
            .with_cancellation(token)
            .with_progress(move |done, _| {
                if done == 1 {
                    trigger.cancel();
                }
            });

        let run = pipeline.run_records(&zones(), &field()).unwrap();
        assert!(!run.is_complete());
        assert_eq!((run.completed, run.total), (1, 3));
        assert_eq!(run.records.len(), 2);
        assert!(run.records.iter().all(|r| r.zone_id == FeatureId::Int(1)));
        assert_relative_eq!(run.records[0].value.unwrap(), 3.0);

        let err = run.into_records().unwrap_err();
        assert!(matches!(err, Error::Cancelled { completed: 1, total: 3 }));
    }

    #[test]
    fn progress_reports_every_zone() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let pipeline = ZonalPipeline::default().with_progress(move |_, total| {
            assert_eq!(total, 3);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        pipeline.run(&zones(), &field()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
