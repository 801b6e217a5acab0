use futures::future::join_all;
use tracing::{info, warn};

use super::{Agent, AgentRequest, AgentResponse, AgentState, Outcome};
use crate::cache::RequestKey;
use crate::error::{AgentError, Result};

impl Agent {
    /// Populates the asset partition from the install manifest.
    ///
    /// All-or-nothing: every entry is fetched before anything is written, and
    /// one failed entry fails the install.
    pub(crate) async fn install(&self) -> Result<Outcome> {
        let partition_name = self.config.asset_partition();
        info!(
            partition = %partition_name,
            entries = self.config.install_manifest.len(),
            "Installing"
        );

        let requests = self
            .config
            .install_manifest
            .iter()
            .map(|entry| self.config.resolve(entry).map(AgentRequest::get))
            .collect::<Result<Vec<_>>>()?;

        let fetched = join_all(requests.iter().map(|r| self.fetch_manifest_entry(r))).await;

        let mut entries = Vec::with_capacity(requests.len());
        for (request, result) in requests.iter().zip(fetched) {
            let response = result.map_err(|source| {
                warn!(url = %request.url, error = %source, "Install manifest entry failed");
                AgentError::PartialManifestFailure {
                    url: request.url.to_string(),
                    source: Box::new(source),
                }
            })?;
            entries.push((request.key(), response));
        }

        let cached = entries.len();
        let partition = self.storage.open(&partition_name).await?;
        partition.put_all(entries).await?;

        self.set_state(AgentState::Installed).await;
        info!(partition = %partition_name, cached, "Install complete, skipping wait");
        Ok(Outcome::Installed {
            cached,
            skip_waiting: true,
        })
    }

    /// Checks that the current asset partition already holds every manifest
    /// entry, as left behind by an earlier successful install.
    ///
    /// Returns the entry count, or `NotFoundInCache` naming the first gap.
    pub async fn verify_install(&self) -> Result<usize> {
        let partition_name = self.config.asset_partition();
        if !self.storage.has(&partition_name).await? {
            return Err(AgentError::NotFoundInCache(partition_name));
        }

        let partition = self.storage.open(&partition_name).await?;
        for entry in &self.config.install_manifest {
            let key = RequestKey::get(&self.config.resolve(entry)?);
            if !partition.contains(&key).await? {
                return Err(AgentError::NotFoundInCache(key.to_string()));
            }
        }
        Ok(self.config.install_manifest.len())
    }

    async fn fetch_manifest_entry(&self, request: &AgentRequest) -> Result<AgentResponse> {
        let response = self.fetcher.fetch(request).await?;
        if !response.status().is_success() {
            return Err(AgentError::UpstreamStatus {
                status: response.status(),
                url: request.url.to_string(),
            });
        }
        Ok(response.with_kind(request.response_kind(&self.config.origin)))
    }

    /// Drops every partition not named for the current version, then takes
    /// control of all clients.
    pub(crate) async fn activate(&self) -> Result<Outcome> {
        let keep = [self.config.asset_partition(), self.config.video_partition()];
        info!(keep = ?keep, "Activating");

        let mut removed = Vec::new();
        for name in self.storage.keys().await? {
            if keep.contains(&name) {
                continue;
            }
            if self.storage.delete(&name).await? {
                info!(partition = %name, "Deleted stale partition");
                removed.push(name);
            }
        }

        self.set_state(AgentState::Activated).await;
        info!(removed = removed.len(), "Activation complete, clients claimed");
        Ok(Outcome::Activated { removed })
    }
}
