//! Conversion of decoded warehouse rows into protocol time series.
//!
//! A scalar row becomes a single-sample series. A histogram row expands into
//! one cumulative `_bucket` series per bound (plus `+Inf`), a `_sum` series and
//! a `_count` series, filtered by the requested family and `le` value.

use std::collections::{BTreeMap, HashMap};

use crate::classify::{BUCKET_BOUND_LABEL, METRIC_NAME_LABEL, MetricKind};
use crate::model::{HistogramRow, ScalarRow, nanos_to_millis};
use crate::proto::{Label, Sample, TimeSeries};

const INF_BOUND: &str = "+Inf";

/// Render a bucket bound the way Prometheus exporters do: the shortest
/// representation that round-trips, switching to exponent form below `1e-4`
/// and from `1e6` up (`1e+06`, `2.5e-05`).
pub fn format_bound(bound: f64) -> String {
    if bound.is_nan() {
        return "NaN".to_string();
    }
    if bound.is_infinite() {
        return if bound > 0.0 { INF_BOUND } else { "-Inf" }.to_string();
    }

    let scientific = format!("{:e}", bound);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return bound.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return bound.to_string();
    };
    if (-4..6).contains(&exponent) {
        bound.to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

/// One series with a single sample for a scalar row.
pub fn scalar_series(row: &ScalarRow) -> TimeSeries {
    TimeSeries {
        labels: into_labels(label_map(&row.attributes, &row.metric_name)),
        samples: vec![Sample {
            value: row.value,
            timestamp: nanos_to_millis(row.ts_ns),
        }],
    }
}

/// Expand a histogram row into the series `kind` asks for.
///
/// Buckets are accumulated in stored order. A bucket past the end of
/// `explicit_bounds` is the `+Inf` bucket. With `le_filter` set, only the
/// bucket whose formatted bound equals it exactly is kept.
pub fn histogram_series(
    row: &HistogramRow,
    kind: MetricKind,
    le_filter: Option<&str>,
) -> Vec<TimeSeries> {
    let timestamp = nanos_to_millis(row.ts_ns);
    let sample = |value: f64| vec![Sample { value, timestamp }];
    let mut series = Vec::new();

    if kind.wants_buckets() {
        let bucket_name = format!("{}_bucket", row.metric_name);
        let mut cumulative: u64 = 0;
        for (i, count) in row.bucket_counts.iter().enumerate() {
            cumulative = cumulative.saturating_add(*count);
            let le = row
                .explicit_bounds
                .get(i)
                .map_or_else(|| INF_BOUND.to_string(), |b| format_bound(*b));
            if le_filter.is_some_and(|wanted| wanted != le) {
                continue;
            }
            series.push(TimeSeries {
                labels: histogram_labels(&row.attributes, &bucket_name, Some(le.as_str())),
                samples: sample(cumulative as f64),
            });
        }
    }

    if kind.wants_sum() {
        series.push(TimeSeries {
            labels: histogram_labels(&row.attributes, &format!("{}_sum", row.metric_name), None),
            samples: sample(row.sum),
        });
    }

    if kind.wants_count() {
        series.push(TimeSeries {
            labels: histogram_labels(&row.attributes, &format!("{}_count", row.metric_name), None),
            samples: sample(row.count as f64),
        });
    }

    series
}

/// Attributes plus `__name__`, which replaces a same-named attribute.
fn label_map(attributes: &BTreeMap<String, String>, name: &str) -> BTreeMap<String, String> {
    let mut merged = attributes.clone();
    merged.insert(METRIC_NAME_LABEL.to_string(), name.to_string());
    merged
}

/// Labels of a histogram family series. Buckets carry the synthesized `le`;
/// `_sum` and `_count` carry none, even when the row stored one.
fn histogram_labels(
    attributes: &BTreeMap<String, String>,
    name: &str,
    le: Option<&str>,
) -> Vec<Label> {
    let mut merged = label_map(attributes, name);
    match le {
        Some(le) => {
            merged.insert(BUCKET_BOUND_LABEL.to_string(), le.to_string());
        }
        None => {
            merged.remove(BUCKET_BOUND_LABEL);
        }
    }
    into_labels(merged)
}

fn into_labels(merged: BTreeMap<String, String>) -> Vec<Label> {
    merged
        .into_iter()
        .map(|(name, value)| Label { name, value })
        .collect()
}

/// Series of one query result, merged by label set.
///
/// Series keep the order in which their label set was first seen; samples of
/// a merged series are ordered by timestamp.
#[derive(Debug, Default)]
pub struct SeriesSet {
    index: HashMap<Vec<Label>, usize>,
    series: Vec<TimeSeries>,
}

impl SeriesSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, series: TimeSeries) {
        match self.index.get(&series.labels) {
            Some(&i) => self.series[i].samples.extend(series.samples),
            None => {
                self.index.insert(series.labels.clone(), self.series.len());
                self.series.push(series);
            }
        }
    }

    pub fn extend(&mut self, series: impl IntoIterator<Item = TimeSeries>) {
        for s in series {
            self.push(s);
        }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn into_series(self) -> Vec<TimeSeries> {
        let mut series = self.series;
        for s in &mut series {
            s.samples.sort_by_key(|sample| sample.timestamp);
        }
        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn histogram_row(bucket_counts: Vec<u64>, explicit_bounds: Vec<f64>) -> HistogramRow {
        HistogramRow {
            metric_name: "task_duration".to_string(),
            attributes: BTreeMap::from([("service_name".to_string(), "api".to_string())]),
            ts_ns: 1_700_000_000_123_456_789,
            sum: 12.5,
            count: 6,
            bucket_counts,
            explicit_bounds,
        }
    }

    fn buckets(series: &[TimeSeries]) -> Vec<(String, f64)> {
        series
            .iter()
            .filter(|s| s.label("__name__") == Some("task_duration_bucket"))
            .map(|s| (s.label("le").unwrap().to_string(), s.samples[0].value))
            .collect()
    }

    #[rstest]
    #[case::integer(1.0, "1")]
    #[case::fraction(2.5, "2.5")]
    #[case::below_exponent_threshold(100000.0, "100000")]
    #[case::at_exponent_threshold(1000000.0, "1e+06")]
    #[case::large_mantissa(1500000.0, "1.5e+06")]
    #[case::small(0.0001, "0.0001")]
    #[case::tiny(0.00001, "1e-05")]
    #[case::tiny_mantissa(0.000025, "2.5e-05")]
    #[case::huge_exponent(1e100, "1e+100")]
    #[case::negative(-0.5, "-0.5")]
    #[case::zero(0.0, "0")]
    #[case::infinity(f64::INFINITY, "+Inf")]
    fn should_format_bound(#[case] bound: f64, #[case] expected: &str) {
        assert_eq!(format_bound(bound), expected);
    }

    #[test]
    fn should_accumulate_bucket_counts_with_inf_bucket() {
        // given
        let row = histogram_row(vec![2, 3, 1], vec![1.0, 5.0]);

        // when
        let series = histogram_series(&row, MetricKind::Bucket, None);

        // then
        assert_eq!(
            buckets(&series),
            vec![
                ("1".to_string(), 2.0),
                ("5".to_string(), 5.0),
                ("+Inf".to_string(), 6.0),
            ]
        );
        assert_eq!(series.len(), 3);
    }

    #[rstest]
    #[case::matching_bound("5", vec![("5".to_string(), 5.0)])]
    #[case::inf_bound("+Inf", vec![("+Inf".to_string(), 6.0)])]
    #[case::unknown_bound("7", vec![])]
    fn should_filter_buckets_by_le(#[case] le: &str, #[case] expected: Vec<(String, f64)>) {
        // given
        let row = histogram_row(vec![2, 3, 1], vec![1.0, 5.0]);

        // when
        let series = histogram_series(&row, MetricKind::Bucket, Some(le));

        // then
        assert_eq!(buckets(&series), expected);
    }

    #[test]
    fn should_treat_missing_bounds_as_inf() {
        // given
        let row = histogram_row(vec![1, 1, 1, 1], vec![1.0]);

        // when
        let series = histogram_series(&row, MetricKind::Bucket, None);

        // then
        let les: Vec<String> = buckets(&series).into_iter().map(|(le, _)| le).collect();
        assert_eq!(les, vec!["1", "+Inf", "+Inf", "+Inf"]);
    }

    #[test]
    fn should_ignore_extra_bounds() {
        // given
        let row = histogram_row(vec![4], vec![1.0, 2.0, 3.0]);

        // when
        let series = histogram_series(&row, MetricKind::Bucket, None);

        // then
        assert_eq!(buckets(&series), vec![("1".to_string(), 4.0)]);
    }

    #[test]
    fn should_emit_only_sum_for_sum_kind() {
        // given
        let row = histogram_row(vec![2, 3, 1], vec![1.0, 5.0]);

        // when
        let series = histogram_series(&row, MetricKind::Sum, None);

        // then
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].label("__name__"), Some("task_duration_sum"));
        assert_eq!(series[0].label("le"), None);
        assert_eq!(series[0].samples, vec![Sample { value: 12.5, timestamp: 1_700_000_000_123 }]);
    }

    #[test]
    fn should_emit_only_count_for_count_kind() {
        // given
        let row = histogram_row(vec![2, 3, 1], vec![1.0, 5.0]);

        // when
        let series = histogram_series(&row, MetricKind::Count, Some("5"));

        // then
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].label("__name__"), Some("task_duration_count"));
        assert_eq!(series[0].samples[0].value, 6.0);
    }

    #[test]
    fn should_emit_every_family_for_scalar_kind() {
        // given
        let row = histogram_row(vec![2, 3, 1], vec![1.0, 5.0]);

        // when
        let series = histogram_series(&row, MetricKind::Scalar, None);

        // then
        assert_eq!(series.len(), 5);
        assert_eq!(series[3].label("__name__"), Some("task_duration_sum"));
        assert_eq!(series[4].label("__name__"), Some("task_duration_count"));
    }

    #[test]
    fn should_override_reserved_attribute_names() {
        // given
        let mut row = histogram_row(vec![1], vec![]);
        row.attributes
            .insert("__name__".to_string(), "spoofed".to_string());
        row.attributes.insert("le".to_string(), "0.1".to_string());

        // when
        let series = histogram_series(&row, MetricKind::Scalar, None);

        // then
        let bucket = &series[0];
        assert_eq!(bucket.label("__name__"), Some("task_duration_bucket"));
        assert_eq!(bucket.label("le"), Some("+Inf"));
        assert_eq!(bucket.labels.iter().filter(|l| l.name == "le").count(), 1);
        assert_eq!(series[1].label("le"), None);
    }

    #[test]
    fn should_sort_labels_by_name() {
        // given
        let row = ScalarRow {
            metric_name: "up".to_string(),
            attributes: BTreeMap::from([
                ("zone".to_string(), "b".to_string()),
                ("Host".to_string(), "a".to_string()),
            ]),
            ts_ns: 2_000_000,
            value: 1.0,
        };

        // when
        let series = scalar_series(&row);

        // then
        let names: Vec<&str> = series.labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Host", "__name__", "zone"]);
        assert_eq!(series.samples, vec![Sample { value: 1.0, timestamp: 2 }]);
    }

    #[test]
    fn should_keep_every_stored_attribute_on_scalar_series() {
        // given
        let row = ScalarRow {
            metric_name: "legacy_bucket_total".to_string(),
            attributes: BTreeMap::from([
                ("job".to_string(), "api".to_string()),
                ("le".to_string(), "0.5".to_string()),
            ]),
            ts_ns: 10_000_000,
            value: 10.0,
        };

        // when
        let series = scalar_series(&row);

        // then
        assert_eq!(
            series.labels,
            vec![
                Label::new("__name__", "legacy_bucket_total"),
                Label::new("job", "api"),
                Label::new("le", "0.5"),
            ]
        );
    }

    #[test]
    fn should_not_merge_scalar_rows_that_differ_only_in_le() {
        // given
        let row = |le: &str| ScalarRow {
            metric_name: "legacy_bucket_total".to_string(),
            attributes: BTreeMap::from([("le".to_string(), le.to_string())]),
            ts_ns: 10_000_000,
            value: 10.0,
        };
        let mut set = SeriesSet::new();

        // when
        set.push(scalar_series(&row("0.5")));
        set.push(scalar_series(&row("1")));
        let series = set.into_series();

        // then
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].label("le"), Some("0.5"));
        assert_eq!(series[1].label("le"), Some("1"));
        assert!(series.iter().all(|s| s.samples.len() == 1));
    }

    #[test]
    fn should_merge_series_with_identical_labels() {
        // given
        let row = |ts_ms: i64, job: &str| ScalarRow {
            metric_name: "up".to_string(),
            attributes: BTreeMap::from([("job".to_string(), job.to_string())]),
            ts_ns: ts_ms * 1_000_000,
            value: ts_ms as f64,
        };
        let mut set = SeriesSet::new();

        // when
        set.push(scalar_series(&row(30, "a")));
        set.push(scalar_series(&row(10, "b")));
        set.push(scalar_series(&row(20, "a")));
        let series = set.into_series();

        // then
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].label("job"), Some("a"));
        let timestamps: Vec<i64> = series[0].samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![20, 30]);
        assert_eq!(series[1].label("job"), Some("b"));
    }
}
