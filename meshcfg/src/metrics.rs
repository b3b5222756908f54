use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ManagerMetrics {
    pub(crate) proxies: Gauge,
    pub(crate) registrations: Counter,
    pub(crate) failures: Counter,
}

impl ManagerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let proxies = Gauge::default();
        prom.register(
            "proxies",
            "Gauge of the number of registered proxies",
            proxies.clone(),
        );

        let registrations = Counter::default();
        prom.register(
            "proxy_registrations",
            "Count of proxy registrations",
            registrations.clone(),
        );

        let failures = Counter::default();
        prom.register(
            "proxy_failures",
            "Count of proxy snapshot tasks that ended with an error",
            failures.clone(),
        );

        Self {
            proxies,
            registrations,
            failures,
        }
    }
}
