use dashmap::DashMap;
use std::time::{Duration, SystemTime};

use super::gatekeeper::UploadCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub candidate: UploadCandidate,
    pub created_at: SystemTime,
    /// Channel the upload command was invoked in; outcomes are reported here.
    pub origin_channel_id: u64,
    /// Moderation notice carrying the approve/reject buttons, once posted.
    pub notice: Option<(u64, u64)>,
}

/// Pending upload approvals keyed by the originating interaction id.
/// `resolve` is a single atomic take, so two moderators racing on the same
/// request leave exactly one winner.
#[derive(Debug, Default)]
pub struct ApprovalRegistry {
    pending: DashMap<u64, PendingApproval>,
}

impl ApprovalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_pending(
        &self,
        request_id: u64,
        candidate: UploadCandidate,
        origin_channel_id: u64,
    ) {
        self.pending.insert(
            request_id,
            PendingApproval {
                candidate,
                created_at: SystemTime::now(),
                origin_channel_id,
                notice: None,
            },
        );
    }

    pub fn set_notice(&self, request_id: u64, channel_id: u64, message_id: u64) {
        if let Some(mut entry) = self.pending.get_mut(&request_id) {
            entry.notice = Some((channel_id, message_id));
        }
    }

    /// Remove and return the entry. `None` means the id is unknown or was
    /// already resolved by someone else.
    pub fn resolve(&self, request_id: u64) -> Option<PendingApproval> {
        self.pending.remove(&request_id).map(|(_, entry)| entry)
    }

    pub fn expire_older_than(&self, ttl: Duration) -> Vec<(u64, PendingApproval)> {
        let now = SystemTime::now();
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|entry| {
                now.duration_since(entry.created_at)
                    .map(|age| age >= ttl)
                    .unwrap_or(false)
            })
            .map(|entry| *entry.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    fn backdate(&self, request_id: u64, by: Duration) {
        if let Some(mut entry) = self.pending.get_mut(&request_id) {
            entry.created_at -= by;
        }
    }
}
