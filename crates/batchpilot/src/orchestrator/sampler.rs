//! Background sampling of the node states of the pool into a CSV file.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::orchestrator::config::get_sampler_interval;
use crate::remote::ComputeClient;
use crate::remote::model::{ComputeNode, ComputeNodeState, ListOptions};

pub const CSV_HEADER: &str = "timestamp,total,idle,running,preparing,leaving,other";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UtilizationSample {
    pub total: usize,
    pub idle: usize,
    pub running: usize,
    pub preparing: usize,
    pub leaving: usize,
    pub other: usize,
}

impl UtilizationSample {
    pub fn from_nodes(nodes: &[ComputeNode]) -> Self {
        let mut sample = Self {
            total: nodes.len(),
            ..Default::default()
        };
        for node in nodes {
            match node.state {
                ComputeNodeState::Idle => sample.idle += 1,
                ComputeNodeState::Running => sample.running += 1,
                ComputeNodeState::LeavingPool => sample.leaving += 1,
                state if state.is_preparing() => sample.preparing += 1,
                _ => sample.other += 1,
            }
        }
        sample
    }

    pub fn to_csv_line(&self, timestamp: DateTime<Utc>) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.total,
            self.idle,
            self.running,
            self.preparing,
            self.leaving,
            self.other
        )
    }
}

/// Handle of a running sampler. It has to be stopped explicitly with [`UtilizationSampler::stop`].
pub struct UtilizationSampler {
    stop_sender: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl UtilizationSampler {
    /// Spawns the sampler on the current `LocalSet`.
    pub fn start(
        client: Rc<dyn ComputeClient>,
        pool_id: String,
        path: PathBuf,
    ) -> crate::Result<Self> {
        Self::start_with_interval(client, pool_id, path, get_sampler_interval())
    }

    pub fn start_with_interval(
        client: Rc<dyn ComputeClient>,
        pool_id: String,
        path: PathBuf,
        interval: Duration,
    ) -> crate::Result<Self> {
        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{CSV_HEADER}")?;
        writer.flush()?;
        log::info!(
            "Sampling node utilization of pool {pool_id} into {}",
            path.display()
        );

        let (stop_sender, stop_receiver) = oneshot::channel();
        let handle = tokio::task::spawn_local(sampler_process(
            client,
            pool_id,
            writer,
            interval,
            stop_receiver,
        ));
        Ok(Self {
            stop_sender,
            handle,
        })
    }

    /// Signals the sampler to stop and waits until it finishes.
    pub async fn stop(self) {
        let _ = self.stop_sender.send(());
        if let Err(error) = self.handle.await {
            log::warn!("Utilization sampler has crashed: {error}");
        }
    }
}

async fn sampler_process(
    client: Rc<dyn ComputeClient>,
    pool_id: String,
    mut writer: BufWriter<File>,
    interval: Duration,
    mut stop_receiver: oneshot::Receiver<()>,
) {
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = &mut stop_receiver => break,
            _ = interval.tick() => {
                let nodes = match client
                    .list_compute_nodes(&pool_id, ListOptions::default().select("state"))
                    .await
                {
                    Ok(nodes) => nodes,
                    Err(error) => {
                        log::debug!("Cannot sample utilization of pool {pool_id}: {error}");
                        continue;
                    }
                };
                let line = UtilizationSample::from_nodes(&nodes).to_csv_line(Utc::now());
                if let Err(error) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
                    log::warn!("Cannot write utilization sample: {error}");
                    break;
                }
            }
        }
    }
    log::debug!("Utilization sampler of pool {pool_id} has stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio::task::LocalSet;

    use crate::orchestrator::sampler::{CSV_HEADER, UtilizationSample, UtilizationSampler};
    use crate::remote::model::ComputeNodeState;
    use crate::tests::client::TestClient;
    use crate::tests::utils::{POOL_ID, as_client, node, output_dir};

    #[test]
    fn sample_counts() {
        let sample = UtilizationSample::from_nodes(&[
            node("n1", ComputeNodeState::Idle),
            node("n2", ComputeNodeState::Running),
            node("n3", ComputeNodeState::Running),
            node("n4", ComputeNodeState::WaitingForStartTask),
            node("n5", ComputeNodeState::LeavingPool),
            node("n6", ComputeNodeState::Unusable),
        ]);
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(
            sample.to_csv_line(timestamp),
            "2024-01-01T10:00:00Z,6,1,2,1,1,1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sampler_writes_until_stopped() {
        let client = TestClient::new();
        client.get_mut().nodes.push(vec![
            node("n1", ComputeNodeState::Idle),
            node("n2", ComputeNodeState::Running),
        ]);
        let dir = output_dir();
        let path = dir.path().join("utilization.csv");

        LocalSet::new()
            .run_until(async {
                let sampler = UtilizationSampler::start_with_interval(
                    as_client(&client),
                    POOL_ID.to_string(),
                    path.clone(),
                    Duration::from_secs(60),
                )
                .unwrap();
                // Samples at 0, 60 and 120 seconds
                tokio::time::sleep(Duration::from_secs(150)).await;
                sampler.stop().await;
                let listings = client.get().node_listings.len();
                tokio::time::sleep(Duration::from_secs(300)).await;
                assert_eq!(client.get().node_listings.len(), listings);
            })
            .await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 4);
        assert!(lines[1].ends_with(",2,1,1,0,0,0"));
    }
}
