//! Metrics collection.
//!
//! # Metrics
//! - `confstack_writes_total` (counter): writes by outcome (`resolved`, `shadowed`)
//! - `confstack_notifications_total` (counter): changes by mode (`dispatched`, `queued`)
//! - `confstack_layer_resets_total` (counter): resets by layer
//! - `confstack_layer_reloads_total` (counter): reloads by layer
//! - `confstack_resolved_keys` (gauge): keys currently in the resolution cache

/// Record one `set_value` call.
pub fn record_write(outcome: &'static str) {
    ::metrics::counter!("confstack_writes_total", "outcome" => outcome).increment(1);
}

/// Record one effective-value change.
pub fn record_notification(mode: &'static str) {
    ::metrics::counter!("confstack_notifications_total", "mode" => mode).increment(1);
}

pub fn record_layer_reset(layer: &str) {
    ::metrics::counter!("confstack_layer_resets_total", "layer" => layer.to_string()).increment(1);
}

pub fn record_layer_reload(layer: &str) {
    ::metrics::counter!("confstack_layer_reloads_total", "layer" => layer.to_string()).increment(1);
}

pub fn record_resolved_keys(count: usize) {
    ::metrics::gauge!("confstack_resolved_keys").set(count as f64);
}
