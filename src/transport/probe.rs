//! Bounded fan-out over a list of hosts.
//!
//! Both discovery scans (registry-to-registry and node-to-registry) contact
//! every candidate address and keep whatever answered. A probe that fails,
//! times out or panics counts as "not present" and never aborts the scan.

use log::debug;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Extra time granted to a probe on top of its own transport timeout.
pub const PROBE_GRACE: Duration = Duration::from_millis(500);

/// Run `probe` against every host with at most `min(workers, hosts.len())`
/// probes in flight, and collect the `(name, ip)` pairs that came back.
///
/// Each probe is cut off after `deadline`.
pub async fn probe_hosts<F, Fut>(
    hosts: &[Ipv4Addr],
    workers: usize,
    deadline: Duration,
    probe: F,
) -> BTreeMap<String, String>
where
    F: Fn(Ipv4Addr) -> Fut,
    Fut: Future<Output = Option<(String, String)>> + Send + 'static,
{
    let mut found = BTreeMap::new();
    if hosts.is_empty() {
        return found;
    }

    let limit = workers.min(hosts.len()).max(1);
    let slots = Arc::new(Semaphore::new(limit));
    let mut probes = JoinSet::new();

    for &host in hosts {
        let permit = match slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let attempt = probe(host);
        probes.spawn(async move {
            let _permit = permit;
            tokio::time::timeout(deadline, attempt).await.ok().flatten()
        });
    }

    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok(Some((name, ip))) => {
                found.insert(name, ip);
            }
            Ok(None) => {}
            Err(e) => debug!("Probe task failed: {}", e),
        }
    }

    found
}
