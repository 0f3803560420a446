//! Shared helpers for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::aggregator::ResponseHooks;
use crate::types::ThreatEvent;

/// Hooks that count every dispatched action class.
#[derive(Default)]
pub(crate) struct CountingHooks {
    pub terminate: AtomicUsize,
    pub disable: AtomicUsize,
    pub purge: AtomicUsize,
    pub restrict: AtomicUsize,
    pub restart: AtomicUsize,
    pub reload: AtomicUsize,
    pub max_restriction: AtomicUsize,
    pub abort_network: AtomicUsize,
}

impl ResponseHooks for CountingHooks {
    fn terminate_process(&self, _e: &ThreatEvent) {
        self.terminate.fetch_add(1, Ordering::SeqCst);
    }
    fn disable_sensitive_features(&self, _e: &ThreatEvent) {
        self.disable.fetch_add(1, Ordering::SeqCst);
    }
    fn purge_sensitive_data(&self, _e: &ThreatEvent) {
        self.purge.fetch_add(1, Ordering::SeqCst);
    }
    fn restrict_functionality(&self, _e: &ThreatEvent) {
        self.restrict.fetch_add(1, Ordering::SeqCst);
    }
    fn restart_critical_components(&self, _e: &ThreatEvent) {
        self.restart.fetch_add(1, Ordering::SeqCst);
    }
    fn reload_security_state(&self, _e: &ThreatEvent) {
        self.reload.fetch_add(1, Ordering::SeqCst);
    }
    fn activate_maximum_restriction(&self, _e: &ThreatEvent) {
        self.max_restriction.fetch_add(1, Ordering::SeqCst);
    }
    fn abort_network_operation(&self, _e: &ThreatEvent) {
        self.abort_network.fetch_add(1, Ordering::SeqCst);
    }
}
