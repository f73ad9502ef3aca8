//! Delivery, HTTP and domain counters, registered on a Prometheus registry.
//!
//! - `booking_system_messages_produced_total{topic}`
//! - `booking_system_messages_consumed_total{topic}`
//! - `booking_system_message_errors_total{topic,kind}`
//! - `booking_system_handler_duration_seconds{topic,message_type}`
//! - `booking_system_http_requests_total{method,path,status}`
//! - `booking_system_http_request_duration_seconds{method,path}`
//! - `booking_system_http_requests_in_flight`
//! - `booking_system_users_created_total`, `booking_system_users_deleted_total`
//! - `booking_system_bookings_total{status}`

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::error::ErrorKind;

const NAMESPACE: &str = "booking_system";

pub struct Metrics {
    registry: Registry,
    produced: IntCounterVec,
    consumed: IntCounterVec,
    errors: IntCounterVec,
    handler_duration: HistogramVec,
    http_requests: IntCounterVec,
    http_duration: HistogramVec,
    http_in_flight: IntGauge,
    users_created: IntCounter,
    users_deleted: IntCounter,
    bookings: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let produced = IntCounterVec::new(
            Opts::new("messages_produced_total", "Messages acknowledged by the broker")
                .namespace(NAMESPACE),
            &["topic"],
        )?;
        let consumed = IntCounterVec::new(
            Opts::new("messages_consumed_total", "Messages handled successfully")
                .namespace(NAMESPACE),
            &["topic"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("message_errors_total", "Produce and consume failures by kind")
                .namespace(NAMESPACE),
            &["topic", "kind"],
        )?;
        let handler_duration = HistogramVec::new(
            HistogramOpts::new("handler_duration_seconds", "Time spent in one handler attempt")
                .namespace(NAMESPACE),
            &["topic", "message_type"],
        )?;

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by route and status").namespace(NAMESPACE),
            &["method", "path", "status"],
        )?;
        let http_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency")
                .namespace(NAMESPACE),
            &["method", "path"],
        )?;
        let http_in_flight = IntGauge::with_opts(
            Opts::new("http_requests_in_flight", "HTTP requests currently being served")
                .namespace(NAMESPACE),
        )?;
        let users_created = IntCounter::with_opts(
            Opts::new("users_created_total", "Users created").namespace(NAMESPACE),
        )?;
        let users_deleted = IntCounter::with_opts(
            Opts::new("users_deleted_total", "Users deleted").namespace(NAMESPACE),
        )?;
        let bookings = IntCounterVec::new(
            Opts::new("bookings_total", "Bookings entering each status").namespace(NAMESPACE),
            &["status"],
        )?;

        registry.register(Box::new(produced.clone()))?;
        registry.register(Box::new(consumed.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(handler_duration.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_duration.clone()))?;
        registry.register(Box::new(http_in_flight.clone()))?;
        registry.register(Box::new(users_created.clone()))?;
        registry.register(Box::new(users_deleted.clone()))?;
        registry.register(Box::new(bookings.clone()))?;

        Ok(Self {
            registry,
            produced,
            consumed,
            errors,
            handler_duration,
            http_requests,
            http_duration,
            http_in_flight,
            users_created,
            users_deleted,
            bookings,
        })
    }

    pub fn record_produced(&self, topic: &str) {
        self.produced.with_label_values(&[topic]).inc();
    }

    pub fn record_consumed(&self, topic: &str) {
        self.consumed.with_label_values(&[topic]).inc();
    }

    pub fn record_error(&self, topic: &str, kind: ErrorKind) {
        self.errors.with_label_values(&[topic, kind.as_str()]).inc();
    }

    pub fn observe_handler(&self, topic: &str, message_type: &str, seconds: f64) {
        self.handler_duration
            .with_label_values(&[topic, message_type])
            .observe(seconds);
    }

    pub fn http_request_started(&self) {
        self.http_in_flight.inc();
    }

    /// Closes out a request opened with [`Metrics::http_request_started`].
    pub fn http_request_finished(&self, method: &str, path: &str, status: u16, seconds: f64) {
        self.http_in_flight.dec();
        let status = status.to_string();
        self.http_requests
            .with_label_values(&[method, path, status.as_str()])
            .inc();
        self.http_duration
            .with_label_values(&[method, path])
            .observe(seconds);
    }

    pub fn record_user_created(&self) {
        self.users_created.inc();
    }

    pub fn record_user_deleted(&self) {
        self.users_deleted.inc();
    }

    pub fn record_booking(&self, status: &str) {
        self.bookings.with_label_values(&[status]).inc();
    }

    pub fn http_request_count(&self, method: &str, path: &str, status: u16) -> u64 {
        let status = status.to_string();
        self.http_requests
            .with_label_values(&[method, path, status.as_str()])
            .get()
    }

    pub fn http_in_flight(&self) -> i64 {
        self.http_in_flight.get()
    }

    pub fn users_created_count(&self) -> u64 {
        self.users_created.get()
    }

    pub fn users_deleted_count(&self) -> u64 {
        self.users_deleted.get()
    }

    pub fn booking_count(&self, status: &str) -> u64 {
        self.bookings.with_label_values(&[status]).get()
    }

    pub fn produced_count(&self, topic: &str) -> u64 {
        self.produced.with_label_values(&[topic]).get()
    }

    pub fn consumed_count(&self, topic: &str) -> u64 {
        self.consumed.with_label_values(&[topic]).get()
    }

    pub fn error_count(&self, topic: &str, kind: ErrorKind) -> u64 {
        self.errors.with_label_values(&[topic, kind.as_str()]).get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format for `GET /metrics`.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
