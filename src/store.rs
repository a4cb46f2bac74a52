use std::fs;
use std::path::{Path, PathBuf};

use handle_market_sdk::{DeploymentStore, Error, Network, Result, ScriptDeploymentRecord};

/// Deployment history kept as `<dir>/<network>-deployed.json`, a JSON array
/// of records in deployment order. Saving demotes the previous `latest`.
#[derive(Debug, Clone)]
pub struct FileDeploymentStore {
    dir: PathBuf,
}

impl FileDeploymentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, network: Network) -> PathBuf {
        self.dir.join(format!("{network}-deployed.json"))
    }

    /// Every record ever saved for `network`, oldest first.
    pub fn history(&self, network: Network) -> Result<Vec<ScriptDeploymentRecord>> {
        read_records(&self.path(network))
    }
}

fn read_records(path: &Path) -> Result<Vec<ScriptDeploymentRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let json = fs::read_to_string(path)
        .map_err(|e| Error::Store(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&json)
        .map_err(|e| Error::Store(format!("failed to parse {}: {e}", path.display())))
}

impl DeploymentStore for FileDeploymentStore {
    fn latest(&self, network: Network) -> Result<Option<ScriptDeploymentRecord>> {
        Ok(self
            .history(network)?
            .into_iter()
            .rev()
            .find(|record| record.latest))
    }

    fn save(&self, network: Network, record: &ScriptDeploymentRecord) -> Result<()> {
        let path = self.path(network);
        let mut records = read_records(&path)?;
        for previous in &mut records {
            previous.latest = false;
        }
        records.push(ScriptDeploymentRecord {
            latest: true,
            ..record.clone()
        });

        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Store(format!("failed to create {}: {e}", self.dir.display())))?;
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| Error::Store(format!("failed to serialize records: {e}")))?;
        fs::write(&path, json)
            .map_err(|e| Error::Store(format!("failed to write {}: {e}", path.display())))?;
        log::info!(
            "saved {network} deployment {} to {}",
            record.validator_hash,
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handle_market_sdk::testing::{MockVm, deployed_marketplace};

    #[test]
    fn empty_directory_has_no_deployment() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDeploymentStore::new(dir.path().join("missing"));
        assert_eq!(store.latest(Network::Preprod).unwrap(), None);
    }

    #[test]
    fn newest_save_is_latest_and_history_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDeploymentStore::new(dir.path());
        let (first, _) = deployed_marketplace(&MockVm::default());
        let second = ScriptDeploymentRecord {
            validator_hash: "00".repeat(28),
            ..first.clone()
        };

        store.save(Network::Preprod, &first).unwrap();
        store.save(Network::Preprod, &second).unwrap();

        assert_eq!(store.latest(Network::Preprod).unwrap(), Some(second));
        let history = store.history(Network::Preprod).unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].latest);
        assert_eq!(history[0].validator_hash, first.validator_hash);

        assert!(dir.path().join("preprod-deployed.json").exists());
        assert_eq!(store.latest(Network::Mainnet).unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDeploymentStore::new(dir.path());
        fs::write(store.path(Network::Preview), "{not json").unwrap();
        assert!(matches!(
            store.latest(Network::Preview),
            Err(Error::Store(_))
        ));
    }
}
