use crate::Error;
use kube::core::admission::Operation;
use prometheus::{histogram_opts, opts, HistogramVec, IntCounterVec, Registry};
use tokio::time::Instant;

use crate::webhooks::operation_label;

#[derive(Clone)]
pub struct Metrics {
    pub requests: IntCounterVec,
    pub rejections: IntCounterVec,
    pub admission_duration: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        let admission_duration = HistogramVec::new(
            histogram_opts!(
                "shoot_admission_duration_seconds",
                "The duration of admission requests in seconds"
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.]),
            &["webhook"],
        )
        .unwrap();
        let rejections = IntCounterVec::new(
            opts!(
                "shoot_admission_rejections_total",
                "rejected admission requests",
            ),
            &["webhook", "reason"],
        )
        .unwrap();
        let requests = IntCounterVec::new(
            opts!("shoot_admission_requests_total", "admission requests"),
            &["webhook", "operation"],
        )
        .unwrap();
        Metrics {
            requests,
            rejections,
            admission_duration,
        }
    }
}

impl Metrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.admission_duration.clone()))?;
        registry.register(Box::new(self.rejections.clone()))?;
        registry.register(Box::new(self.requests.clone()))?;
        Ok(self)
    }

    pub fn rejection(&self, webhook: &'static str, e: &Error) {
        self.rejections
            .with_label_values(&[webhook, e.metric_label()])
            .inc()
    }

    pub fn count_and_measure(
        &self,
        webhook: &'static str,
        operation: &Operation,
    ) -> AdmissionMeasurer {
        self.requests
            .with_label_values(&[webhook, operation_label(operation)])
            .inc();
        AdmissionMeasurer {
            start: Instant::now(),
            webhook,
            metric: self.admission_duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct AdmissionMeasurer {
    start: Instant,
    webhook: &'static str,
    metric: HistogramVec,
}

impl Drop for AdmissionMeasurer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.metric
            .with_label_values(&[self.webhook])
            .observe(duration);
    }
}
