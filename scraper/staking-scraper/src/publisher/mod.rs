//! A registry of the scraper's gauges.
//!
//! Gauges are kept in memory for the pull interface and forwarded to the
//! `metrics` facade, which the Prometheus exporter serves.

use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};

use alloy::primitives::U256;

use crate::utils::u256_to_f64;

pub mod labels;

/// A gauge value produced by a scan and published once it is committed
#[derive(Clone, Debug, PartialEq)]
pub struct GaugeValue {
    /// The metric name
    pub name: String,
    /// The label name and value, if any
    pub label: Option<(String, String)>,
    /// The gauge value
    pub value: f64,
}

impl GaugeValue {
    /// An unlabeled gauge value
    pub fn new(name: &str, value: f64) -> Self {
        Self { name: name.to_string(), label: None, value }
    }

    /// A gauge value carrying one label
    pub fn labeled(name: &str, label: &str, label_value: &str, value: f64) -> Self {
        Self { name: name.to_string(), label: Some((label.to_string(), label_value.to_string())), value }
    }

    /// A token amount gauge value carrying one label
    pub fn labeled_amount(name: &str, label: &str, label_value: &str, amount: U256) -> Self {
        Self::labeled(name, label, label_value, u256_to_f64(amount))
    }

    /// An unlabeled token amount gauge value
    pub fn amount(name: &str, amount: U256) -> Self {
        Self::new(name, u256_to_f64(amount))
    }
}

/// The gauge registry
pub struct Publisher {
    /// The prefix applied to every name forwarded to the facade
    prefix: String,
    /// The latest value of every gauge, keyed by rendered name
    gauges: RwLock<BTreeMap<String, f64>>,
}

impl Publisher {
    /// Create a new publisher
    pub fn new<T: Into<String>>(prefix: T) -> Self {
        Self { prefix: prefix.into(), gauges: RwLock::new(BTreeMap::new()) }
    }

    /// Set an unlabeled gauge
    pub fn set_gauge(&self, name: &str, value: f64) {
        metrics::gauge!(format!("{}{name}", self.prefix)).set(value);
        self.store(name.to_string(), value);
    }

    /// Set an unlabeled gauge from a token amount
    pub fn set_amount(&self, name: &str, amount: U256) {
        self.set_gauge(name, u256_to_f64(amount));
    }

    /// Set a gauge carrying one label
    pub fn set_labeled_gauge(&self, name: &str, label: &str, label_value: &str, value: f64) {
        let tags = vec![(label.to_string(), label_value.to_string())];
        metrics::gauge!(format!("{}{name}", self.prefix), &tags).set(value);
        self.store(render_key(name, label, label_value), value);
    }

    /// Set every given gauge value
    pub fn publish_all(&self, values: &[GaugeValue]) {
        for gauge in values {
            match &gauge.label {
                Some((label, label_value)) => {
                    self.set_labeled_gauge(&gauge.name, label, label_value, gauge.value);
                },
                None => self.set_gauge(&gauge.name, gauge.value),
            }
        }
    }

    /// A snapshot of every gauge, keyed `name` or `name{label="value"}`
    pub fn current_metrics(&self) -> BTreeMap<String, f64> {
        self.gauges.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The current value of a gauge by its rendered key
    pub fn get(&self, key: &str) -> Option<f64> {
        self.gauges.read().unwrap_or_else(PoisonError::into_inner).get(key).copied()
    }

    /// Record a gauge value in the registry
    fn store(&self, key: String, value: f64) {
        self.gauges.write().unwrap_or_else(PoisonError::into_inner).insert(key, value);
    }
}

/// Render the registry key of a labeled gauge
pub fn render_key(name: &str, label: &str, label_value: &str) -> String {
    format!("{name}{{{label}=\"{label_value}\"}}")
}
