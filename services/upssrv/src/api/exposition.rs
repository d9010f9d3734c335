//! Text exposition of one scrape cycle
//!
//! Measurements are grouped into gauge families in catalogue order and
//! rendered with the Prometheus text encoder. The families are built by hand
//! rather than through a registry so that duplicate targets keep their
//! duplicate series.

use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{Encoder, TextEncoder};

use crate::core::catalogue::{Catalogue, MetricDescriptor};
use crate::core::measurement::Measurement;
use crate::error::{Result, UpsSrvError};

/// Content type of [`encode_text`] output
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

fn metric(descriptor: &MetricDescriptor, measurement: &Measurement) -> Metric {
    let mut gauge = Gauge::default();
    gauge.set_value(measurement.value);

    let mut metric = Metric::default();
    for (name, value) in descriptor.labels.iter().zip(&measurement.labels) {
        let mut pair = LabelPair::default();
        pair.set_name((*name).to_string());
        pair.set_value(value.clone());
        metric.mut_label().push(pair);
    }
    metric.set_gauge(gauge);
    metric
}

/// Build the metric families; kinds without samples are left out
pub fn build_families(catalogue: &Catalogue, measurements: &[Measurement]) -> Vec<MetricFamily> {
    catalogue
        .iter()
        .filter_map(|descriptor| {
            let mut family = MetricFamily::default();
            for measurement in measurements.iter().filter(|m| m.kind == descriptor.kind) {
                family.mut_metric().push(metric(descriptor, measurement));
            }
            if family.get_metric().is_empty() {
                return None;
            }
            family.set_name(descriptor.name.clone());
            family.set_help(descriptor.help.to_string());
            family.set_field_type(MetricType::GAUGE);
            Some(family)
        })
        .collect()
}

/// Render measurements in the text exposition format
pub fn encode_text(catalogue: &Catalogue, measurements: &[Measurement]) -> Result<String> {
    let families = build_families(catalogue, measurements);
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| UpsSrvError::Encoding(e.to_string()))
}
