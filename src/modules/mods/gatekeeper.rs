use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

use crate::modules::server::panel::PanelClient;
use crate::storage::{sanitize_file_name, ModStorage, StorageError};

use super::database::{HistoryAction, HistoryHandler};

#[derive(Error, Debug)]
pub enum GateError {
    #[error("only .jar files are accepted")]
    InvalidFileType,
    #[error("upload cooldown active, retry in {0}s")]
    CooldownActive(u64),
    #[error("failed to download the attachment: {0}")]
    Fetch(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One attachment offered through the upload command. Consumed exactly
/// once: uploaded or discarded.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    pub file_name: String,
    pub source_url: String,
    pub requester_id: u64,
    pub requester_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Upload,
    NeedsApproval,
}

#[derive(Debug, Clone)]
pub struct GatePolicy {
    /// Filename keywords that skip human review.
    pub allow_list: Vec<String>,
    pub cooldown: Duration,
    pub case_sensitive: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            allow_list: vec![
                "examplemod".to_string(),
                "forge".to_string(),
                "fabric".to_string(),
            ],
            cooldown: Duration::from_secs(300),
            case_sensitive: false,
        }
    }
}

impl GatePolicy {
    fn allows(&self, file_name: &str) -> bool {
        if self.case_sensitive {
            self.allow_list.iter().any(|k| file_name.contains(k.as_str()))
        } else {
            let lowered = file_name.to_lowercase();
            self.allow_list
                .iter()
                .any(|k| lowered.contains(&k.to_lowercase()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadReport {
    pub file_name: String,
    pub restarted: bool,
}

/// Decides the fate of every upload candidate and executes the accepted
/// path. Owns the per-requester cooldown state; entries are written only
/// after a confirmed transfer and are never pruned.
#[derive(Debug)]
pub struct Gatekeeper {
    storage: Arc<dyn ModStorage>,
    history: HistoryHandler,
    panel: Option<Arc<PanelClient>>,
    http: reqwest::Client,
    policy: GatePolicy,
    restart_after_change: bool,
    cooldowns: DashMap<u64, Instant>,
}

impl Gatekeeper {
    pub fn new(
        storage: Arc<dyn ModStorage>,
        history: HistoryHandler,
        panel: Option<Arc<PanelClient>>,
        policy: GatePolicy,
        restart_after_change: bool,
    ) -> Self {
        Self {
            storage,
            history,
            panel,
            http: reqwest::Client::new(),
            policy,
            restart_after_change,
            cooldowns: DashMap::new(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn ModStorage> {
        &self.storage
    }

    pub fn history(&self) -> &HistoryHandler {
        &self.history
    }

    /// Gate order is fixed: extension, then cooldown, then the allow list.
    /// The first failing gate wins.
    pub fn check(&self, candidate: &UploadCandidate) -> Result<Disposition, GateError> {
        self.check_at(candidate, Instant::now())
    }

    fn check_at(&self, candidate: &UploadCandidate, now: Instant) -> Result<Disposition, GateError> {
        if !candidate.file_name.to_ascii_lowercase().ends_with(".jar") {
            return Err(GateError::InvalidFileType);
        }

        if let Some(remaining) = self.cooldown_remaining(candidate.requester_id, now) {
            let secs = (remaining.as_millis() as u64).div_ceil(1000);
            return Err(GateError::CooldownActive(secs));
        }

        if self.policy.allows(&candidate.file_name) {
            Ok(Disposition::Upload)
        } else {
            Ok(Disposition::NeedsApproval)
        }
    }

    fn cooldown_remaining(&self, requester_id: u64, now: Instant) -> Option<Duration> {
        let last = *self.cooldowns.get(&requester_id)?;
        let elapsed = now.duration_since(last);
        if elapsed < self.policy.cooldown {
            Some(self.policy.cooldown - elapsed)
        } else {
            None
        }
    }

    /// Fetch the attachment and hand it to the backend. The cooldown entry
    /// and the history record are written only after the backend confirms
    /// the transfer; a failed transfer must leave retries open.
    pub async fn upload(&self, candidate: &UploadCandidate) -> Result<UploadReport, GateError> {
        let file_name = sanitize_file_name(&candidate.file_name);

        let bytes = self.fetch(&candidate.source_url).await?;
        self.storage.put(&file_name, bytes).await?;

        self.cooldowns
            .insert(candidate.requester_id, Instant::now());

        if let Err(e) = self
            .history
            .record(
                HistoryAction::Add,
                &file_name,
                candidate.requester_id,
                &candidate.requester_name,
            )
            .await
        {
            error!("Failed to record upload history: {}", e);
        }

        let restarted = self
            .announce_and_restart(&format!("New mod installed: {}", file_name))
            .await;

        info!(
            "Uploaded {} on behalf of {}",
            file_name, candidate.requester_name
        );
        Ok(UploadReport {
            file_name,
            restarted,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, GateError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| GateError::Fetch(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GateError::Fetch(format!(
                "download returned {}",
                resp.status()
            )));
        }

        Ok(resp
            .bytes()
            .await
            .map_err(|e| GateError::Fetch(e.to_string()))?
            .to_vec())
    }

    /// Broadcast a chat line and trigger a restart when a panel is
    /// configured. Failures are logged only; the mods folder has already
    /// changed at this point.
    pub async fn announce_and_restart(&self, message: &str) -> bool {
        let Some(panel) = &self.panel else {
            return false;
        };

        if let Err(e) = panel.send_command(&format!("say {}", message)).await {
            error!("Failed to broadcast '{}': {}", message, e);
        }

        if !self.restart_after_change {
            return false;
        }

        match panel.restart().await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to restart server: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::storage::testing::MemoryStorage;

    async fn gatekeeper_with(
        storage: Arc<MemoryStorage>,
        dir: &tempfile::TempDir,
        policy: GatePolicy,
    ) -> Gatekeeper {
        let history = Database::open(dir.path().join("history.json")).await.unwrap();
        Gatekeeper::new(storage, history, None, policy, true)
    }

    fn candidate(name: &str, requester_id: u64) -> UploadCandidate {
        UploadCandidate {
            file_name: name.to_string(),
            source_url: "http://unused.invalid/mod.jar".to_string(),
            requester_id,
            requester_name: "tester".to_string(),
        }
    }

    #[tokio::test]
    async fn rejects_non_jar_without_touching_backend() {
        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let gate = gatekeeper_with(storage.clone(), &dir, GatePolicy::default()).await;

        let err = gate.check(&candidate("virus.exe", 1)).unwrap_err();
        assert!(matches!(err, GateError::InvalidFileType));
        assert_eq!(storage.put_calls(), 0);
    }

    #[tokio::test]
    async fn jar_extension_check_is_case_insensitive() {
        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let gate = gatekeeper_with(storage, &dir, GatePolicy::default()).await;

        assert_eq!(
            gate.check(&candidate("Forge-Mod.JAR", 1)).unwrap(),
            Disposition::Upload
        );
    }

    #[tokio::test]
    async fn allow_listed_name_goes_straight_to_upload() {
        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let gate = gatekeeper_with(storage, &dir, GatePolicy::default()).await;

        assert_eq!(
            gate.check(&candidate("forge-installer.jar", 1)).unwrap(),
            Disposition::Upload
        );
    }

    #[tokio::test]
    async fn unlisted_name_routes_to_approval() {
        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let gate = gatekeeper_with(storage.clone(), &dir, GatePolicy::default()).await;

        assert_eq!(
            gate.check(&candidate("mystery.jar", 2)).unwrap(),
            Disposition::NeedsApproval
        );
        assert_eq!(storage.put_calls(), 0);
    }

    #[tokio::test]
    async fn pending_candidate_only_lands_after_an_approval() {
        use crate::modules::mods::approvals::ApprovalRegistry;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/mods/mystery.jar")
            .with_status(200)
            .with_body("bytes")
            .create_async()
            .await;

        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let gate = gatekeeper_with(storage.clone(), &dir, GatePolicy::default()).await;

        let mut c = candidate("mystery.jar", 11);
        c.source_url = format!("{}/mods/mystery.jar", server.url());
        assert_eq!(gate.check(&c).unwrap(), Disposition::NeedsApproval);

        let registry = ApprovalRegistry::new();
        registry.create_pending(1, c.clone(), 99);
        assert_eq!(storage.put_calls(), 0);

        // A reject simply discards the resolved entry; nothing is uploaded.
        let rejected = registry.resolve(1).unwrap();
        drop(rejected);
        assert_eq!(storage.put_calls(), 0);

        // An approve runs the stored candidate through the upload step.
        registry.create_pending(2, c.clone(), 99);
        let approved = registry.resolve(2).unwrap();
        gate.upload(&approved.candidate).await.unwrap();
        assert!(storage.contains("mystery.jar"));
    }

    #[tokio::test]
    async fn allow_list_case_sensitivity_is_a_policy_switch() {
        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().unwrap();

        let strict = GatePolicy {
            allow_list: vec!["Forge".to_string()],
            case_sensitive: true,
            ..GatePolicy::default()
        };
        let gate = gatekeeper_with(storage.clone(), &dir, strict).await;
        assert_eq!(
            gate.check(&candidate("forge-mod.jar", 1)).unwrap(),
            Disposition::NeedsApproval
        );

        let lenient = GatePolicy {
            allow_list: vec!["Forge".to_string()],
            case_sensitive: false,
            ..GatePolicy::default()
        };
        let gate = gatekeeper_with(storage, &dir, lenient).await;
        assert_eq!(
            gate.check(&candidate("forge-mod.jar", 1)).unwrap(),
            Disposition::Upload
        );
    }

    #[tokio::test]
    async fn cooldown_reports_ceiled_remaining_seconds() {
        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let gate = gatekeeper_with(storage.clone(), &dir, GatePolicy::default()).await;

        let base = Instant::now();
        gate.cooldowns.insert(1, base);

        let err = gate
            .check_at(&candidate("forge-a.jar", 1), base + Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, GateError::CooldownActive(240)));
        assert_eq!(storage.put_calls(), 0);

        // 239.5s remaining rounds up to a full 240.
        let err = gate
            .check_at(
                &candidate("forge-a.jar", 1),
                base + Duration::from_millis(60_500),
            )
            .unwrap_err();
        assert!(matches!(err, GateError::CooldownActive(240)));

        let ok = gate
            .check_at(&candidate("forge-a.jar", 1), base + Duration::from_secs(301))
            .unwrap();
        assert_eq!(ok, Disposition::Upload);
    }

    #[tokio::test]
    async fn cooldown_only_applies_to_the_same_requester() {
        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let gate = gatekeeper_with(storage, &dir, GatePolicy::default()).await;

        let base = Instant::now();
        gate.cooldowns.insert(1, base);

        assert!(gate
            .check_at(&candidate("forge-a.jar", 2), base + Duration::from_secs(10))
            .is_ok());
    }

    #[tokio::test]
    async fn successful_upload_sets_cooldown_and_records_history() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/mods/Example.jar")
            .with_status(200)
            .with_body("jar bytes")
            .create_async()
            .await;

        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let gate = gatekeeper_with(storage.clone(), &dir, GatePolicy::default()).await;

        let mut c = candidate("ExampleMod-1.0.jar", 9);
        c.source_url = format!("{}/mods/Example.jar", server.url());

        let report = gate.upload(&c).await.unwrap();
        assert_eq!(report.file_name, "ExampleMod-1.0.jar");
        assert!(!report.restarted);
        assert_eq!(
            storage.bytes_of("ExampleMod-1.0.jar").unwrap(),
            b"jar bytes"
        );

        // Cooldown armed by the confirmed upload.
        assert!(matches!(
            gate.check(&c).unwrap_err(),
            GateError::CooldownActive(_)
        ));

        let recent = gate.history().recent(5).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].action, HistoryAction::Add);
        assert_eq!(recent[0].file_name, "ExampleMod-1.0.jar");
    }

    #[tokio::test]
    async fn failed_transfer_leaves_cooldown_unset() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/mods/bad.jar")
            .with_status(200)
            .with_body("bytes")
            .create_async()
            .await;

        let storage = Arc::new(MemoryStorage::new());
        storage.set_failing(true);
        let dir = tempfile::tempdir().unwrap();
        let gate = gatekeeper_with(storage.clone(), &dir, GatePolicy::default()).await;

        let mut c = candidate("forge-bad.jar", 5);
        c.source_url = format!("{}/mods/bad.jar", server.url());

        let err = gate.upload(&c).await.unwrap_err();
        assert!(matches!(err, GateError::Storage(StorageError::Transfer(_))));

        // The user is not penalized for an infrastructure failure.
        assert_eq!(gate.check(&c).unwrap(), Disposition::Upload);
        assert!(gate.history().recent(5).await.is_empty());
    }

    #[tokio::test]
    async fn failed_download_never_reaches_the_backend() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/mods/missing.jar")
            .with_status(404)
            .create_async()
            .await;

        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let gate = gatekeeper_with(storage.clone(), &dir, GatePolicy::default()).await;

        let mut c = candidate("forge-missing.jar", 5);
        c.source_url = format!("{}/mods/missing.jar", server.url());

        let err = gate.upload(&c).await.unwrap_err();
        assert!(matches!(err, GateError::Fetch(_)));
        assert_eq!(storage.put_calls(), 0);
        assert_eq!(gate.check(&c).unwrap(), Disposition::Upload);
    }

    #[tokio::test]
    async fn upload_sanitizes_traversal_attempts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/mods/sneaky.jar")
            .with_status(200)
            .with_body("bytes")
            .create_async()
            .await;

        let storage = Arc::new(MemoryStorage::new());
        let dir = tempfile::tempdir().unwrap();
        let policy = GatePolicy {
            allow_list: vec!["passwd".to_string()],
            ..GatePolicy::default()
        };
        let gate = gatekeeper_with(storage.clone(), &dir, policy).await;

        let mut c = candidate("../../etc/passwd.jar", 5);
        c.source_url = format!("{}/mods/sneaky.jar", server.url());

        let report = gate.upload(&c).await.unwrap();
        assert_eq!(report.file_name, "......etcpasswd.jar");
        assert!(storage.contains("......etcpasswd.jar"));
        assert!(!storage.contains("../../etc/passwd.jar"));
    }
}
