//! Load prober: parallel fan-out of load queries to random peers.
//!
//! A failed query contributes no figure. When every query fails the
//! report carries no loads and callers must not guess a value.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::task::JoinSet;
use tracing::debug;

use p2pfaas_core::{DiscoveryError, LoadSource, PeerDirectory};

/// Loads reported by one round of probing, aligned with `machines`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub machines: Vec<String>,
    pub loads: Vec<Option<u32>>,
}

impl ProbeReport {
    /// Number of probe messages sent.
    pub fn messages(&self) -> u32 {
        self.machines.len() as u32
    }

    /// Smallest reported load, `None` if every probe failed.
    pub fn min_load(&self) -> Option<u32> {
        self.loads.iter().flatten().copied().min()
    }

    /// Indices of peers whose load is at most `current_load`.
    ///
    /// Peers with a load equal to ours are eligible too, which spreads
    /// pressure across all of them instead of a single minimum.
    pub fn eligible(&self, current_load: u32) -> Vec<usize> {
        self.loads
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.filter(|l| *l <= current_load).map(|_| i))
            .collect()
    }

    /// Pick a forwarding target against our own load.
    ///
    /// `None` (execute locally) when no probe answered or the least loaded
    /// peer is not below `current_load`; otherwise a uniformly random
    /// choice among the eligible peers.
    pub fn pick_target(&self, current_load: u32) -> Option<String> {
        let min = self.min_load()?;
        if min >= current_load {
            return None;
        }
        let eligible = self.eligible(current_load);
        let idx = eligible.choose(&mut rand::thread_rng())?;
        self.machines.get(*idx).cloned()
    }
}

/// Probes peer loads through a `LoadSource`.
#[derive(Clone)]
pub struct LoadProber {
    directory: Arc<dyn PeerDirectory>,
    source: Arc<dyn LoadSource>,
}

impl LoadProber {
    pub fn new(directory: Arc<dyn PeerDirectory>, source: Arc<dyn LoadSource>) -> Self {
        Self { directory, source }
    }

    /// Sample `n` distinct peers and probe them all concurrently.
    pub async fn probe_random(&self, n: usize, cached: bool) -> Result<ProbeReport, DiscoveryError> {
        let machines = self.directory.random_machines(n, cached).await?;
        Ok(self.probe(machines).await)
    }

    /// Probe the given peers concurrently; returns once all have answered
    /// or failed.
    pub async fn probe(&self, machines: Vec<String>) -> ProbeReport {
        let mut set = JoinSet::new();
        for (i, machine) in machines.iter().cloned().enumerate() {
            let source = self.source.clone();
            set.spawn(async move { (i, source.load(&machine).await) });
        }

        let mut loads = vec![None; machines.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, Ok(load))) => loads[i] = Some(load.total()),
                Ok((i, Err(e))) => {
                    debug!(peer = %machines[i], error = %e, "load probe failed");
                }
                Err(e) => debug!(error = %e, "load probe task aborted"),
            }
        }

        debug!(?loads, "probing done");
        ProbeReport { machines, loads }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use async_trait::async_trait;
    use p2pfaas_core::PeerLoad;

    fn report(loads: &[Option<u32>]) -> ProbeReport {
        ProbeReport {
            machines: (0..loads.len()).map(|i| format!("10.0.0.{i}")).collect(),
            loads: loads.to_vec(),
        }
    }

    #[test]
    fn tie_break_picks_only_from_loads_at_most_ours() {
        let r = report(&[Some(5), Some(3), Some(3), Some(8)]);
        assert_eq!(r.eligible(4), vec![1, 2]);

        let mut picked = HashSet::new();
        for _ in 0..200 {
            picked.insert(r.pick_target(4).unwrap());
        }
        let expected: HashSet<String> = ["10.0.0.1", "10.0.0.2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(picked, expected);
    }

    #[test]
    fn equal_load_peer_is_eligible() {
        // One peer strictly below and one exactly at our load: both may be chosen.
        let r = report(&[Some(4), Some(2)]);
        assert_eq!(r.eligible(4), vec![0, 1]);
        let mut picked = HashSet::new();
        for _ in 0..200 {
            picked.insert(r.pick_target(4).unwrap());
        }
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn stays_local_when_no_peer_is_less_loaded() {
        let r = report(&[Some(4), Some(6)]);
        assert_eq!(r.pick_target(4), None);
    }

    #[test]
    fn stays_local_when_all_probes_fail() {
        let r = report(&[None, None, None]);
        assert_eq!(r.min_load(), None);
        assert_eq!(r.pick_target(10), None);
        assert_eq!(r.messages(), 3);
    }

    #[test]
    fn failed_probes_are_not_counted_as_zero() {
        let r = report(&[None, Some(5)]);
        assert_eq!(r.min_load(), Some(5));
        assert_eq!(r.pick_target(3), None);
    }

    struct StaticPeers(Vec<String>);

    #[async_trait]
    impl PeerDirectory for StaticPeers {
        async fn machines(&self, _cached: bool) -> Result<Vec<String>, DiscoveryError> {
            Ok(self.0.clone())
        }
    }

    struct MapLoads(HashMap<String, Option<u32>>);

    #[async_trait]
    impl LoadSource for MapLoads {
        async fn load(&self, machine: &str) -> anyhow::Result<PeerLoad> {
            // Stagger replies so completion order differs from probe order.
            let delay = 20 - machine.len() as u64 % 20;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            match self.0.get(machine).copied().flatten() {
                Some(running) => Ok(PeerLoad {
                    running,
                    queue_length: 1,
                    max_running: None,
                }),
                None => anyhow::bail!("unreachable"),
            }
        }
    }

    #[tokio::test]
    async fn probe_aligns_loads_with_machines() {
        let loads: HashMap<String, Option<u32>> = [
            ("a".to_string(), Some(1)),
            ("bb".to_string(), None),
            ("ccc".to_string(), Some(7)),
        ]
        .into_iter()
        .collect();
        let prober = LoadProber::new(
            Arc::new(StaticPeers(vec!["a".into(), "bb".into(), "ccc".into()])),
            Arc::new(MapLoads(loads)),
        );

        let r = prober.probe(vec!["a".into(), "bb".into(), "ccc".into()]).await;
        // Load is running plus queue length.
        assert_eq!(r.loads, vec![Some(2), None, Some(8)]);

        let r = prober.probe_random(2, true).await.unwrap();
        assert_eq!(r.machines.len(), 2);
        assert_eq!(r.loads.len(), 2);
    }

    #[tokio::test]
    async fn probe_random_without_peers_is_an_error() {
        let prober = LoadProber::new(
            Arc::new(StaticPeers(vec![])),
            Arc::new(MapLoads(HashMap::new())),
        );
        assert_eq!(
            prober.probe_random(1, true).await.unwrap_err(),
            DiscoveryError::NoPeers
        );
    }
}
