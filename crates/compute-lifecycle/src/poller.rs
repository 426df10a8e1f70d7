//! Load balancer address discovery
//!
//! After provisioning, the cloud controller assigns the service an external
//! address at some unknown later time. The poller asks for it on a fixed interval
//! until it shows up or the deadline passes. It is fire-and-forget: nothing is
//! persisted, so a restart mid-poll leaves discovery to the next reconcile.

use compute_kube::ResourceGateway;
use compute_store::ContainerStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// How a poll run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Assigned(String),
    TimedOut,
}

pub struct EndpointPoller<G, S> {
    gateway: Arc<G>,
    store: Arc<S>,
    interval: Duration,
}

impl<G, S> EndpointPoller<G, S>
where
    G: ResourceGateway,
    S: ContainerStore,
{
    pub fn new(gateway: Arc<G>, store: Arc<S>, interval: Duration) -> Self {
        Self {
            gateway,
            store,
            interval,
        }
    }

    /// Poll until an address is observed or `deadline` passes.
    ///
    /// The first query happens one interval after the start. Query errors count as
    /// "not yet assigned". When a tick and the deadline coincide, the deadline wins.
    pub async fn run(&self, container_id: &str, namespace: &str, deadline: Instant) -> PollOutcome {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                biased;

                _ = &mut expiry => {
                    tracing::warn!(container = %container_id, "timed out waiting for external address");
                    return PollOutcome::TimedOut;
                }

                _ = ticker.tick() => {
                    let query = self.gateway.service_external_address(namespace);
                    match tokio::time::timeout_at(deadline, query).await {
                        Ok(Ok(Some(address))) => {
                            self.record(container_id, &address).await;
                            return PollOutcome::Assigned(address);
                        }
                        Ok(Ok(None)) => {
                            tracing::debug!(container = %container_id, "external address not assigned yet");
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(container = %container_id, error = %e, "failed to query external address");
                        }
                        Err(_) => {
                            tracing::warn!(container = %container_id, "timed out waiting for external address");
                            return PollOutcome::TimedOut;
                        }
                    }
                }
            }
        }
    }

    async fn record(&self, container_id: &str, address: &str) {
        match self.store.set_external_address(container_id, address).await {
            Ok(true) => {
                tracing::info!(container = %container_id, ip = %address, "external address assigned");
            }
            Ok(false) => {
                tracing::debug!(container = %container_id, "external address already recorded");
            }
            Err(e) => {
                tracing::error!(container = %container_id, error = %e, "failed to record external address");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compute_core::Container;
    use compute_kube::{AddressResponse, GatewayOp, MockGateway, NamespaceOwner};
    use compute_store::MockStore;

    const NS: &str = "compute-1-abcd1234";

    async fn setup() -> (Arc<MockGateway>, Arc<MockStore>, EndpointPoller<MockGateway, MockStore>) {
        let gateway = Arc::new(MockGateway::new());
        gateway
            .create_namespace(NS, &NamespaceOwner::new(1, "abcd1234"))
            .await
            .unwrap();
        gateway.create_service(NS).await.unwrap();
        gateway.reset_counts();

        let store = Arc::new(MockStore::new());
        store
            .create(&Container::with_id("abcd1234", 1, "dev1", 512, 5, "img"))
            .await
            .unwrap();

        let poller = EndpointPoller::new(gateway.clone(), store.clone(), Duration::from_secs(5));
        (gateway, store, poller)
    }

    fn queries(gateway: &MockGateway) -> usize {
        gateway.operation_counts().get(GatewayOp::GetServiceAddress)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_first_address() {
        let (gateway, store, poller) = setup().await;
        gateway.script_addresses([
            AddressResponse::Pending,
            AddressResponse::Pending,
            AddressResponse::Assigned("203.0.113.10".to_string()),
        ]);

        let start = Instant::now();
        let outcome = poller
            .run("abcd1234", NS, start + Duration::from_secs(300))
            .await;

        assert_eq!(outcome, PollOutcome::Assigned("203.0.113.10".to_string()));
        assert_eq!(start.elapsed(), Duration::from_secs(15));
        assert_eq!(queries(&gateway), 3);
        assert_eq!(
            store.peek("abcd1234").unwrap().external_ip.as_deref(),
            Some("203.0.113.10")
        );

        // Nothing else runs after the address is recorded
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(queries(&gateway), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_count_as_not_yet_assigned() {
        let (gateway, _store, poller) = setup().await;
        gateway.script_addresses([
            AddressResponse::Error("connection refused".to_string()),
            AddressResponse::Assigned("203.0.113.11".to_string()),
        ]);

        let outcome = poller
            .run("abcd1234", NS, Instant::now() + Duration::from_secs(300))
            .await;
        assert_eq!(outcome, PollOutcome::Assigned("203.0.113.11".to_string()));
        assert_eq!(queries(&gateway), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_assigned_stops_at_deadline() {
        let (gateway, store, poller) = setup().await;

        let start = Instant::now();
        let outcome = poller
            .run("abcd1234", NS, start + Duration::from_secs(300))
            .await;

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(300));
        // Ticks at 5s..295s; the tick at 300s loses to the deadline
        assert_eq!(queries(&gateway), 59);
        assert!(store.peek("abcd1234").unwrap().external_ip.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_query_ends_at_deadline() {
        let (gateway, _store, poller) = setup().await;
        gateway.hang_on(GatewayOp::GetServiceAddress);

        let start = Instant::now();
        let outcome = poller
            .run("abcd1234", NS, start + Duration::from_secs(300))
            .await;
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(300));
        assert_eq!(queries(&gateway), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_still_ends_polling() {
        let (gateway, store, poller) = setup().await;
        gateway.assign_address(NS, "203.0.113.12");
        store.fail_on("set_external_address");

        let outcome = poller
            .run("abcd1234", NS, Instant::now() + Duration::from_secs(300))
            .await;
        assert_eq!(outcome, PollOutcome::Assigned("203.0.113.12".to_string()));
        assert_eq!(queries(&gateway), 1);
        assert!(store.peek("abcd1234").unwrap().external_ip.is_none());
    }
}
