//! Enrol direct-message senders into the configured groups.

use std::sync::Arc;

use crate::error::Result;
use crate::transport::{Conversation, GroupHandle, Transport};

use super::replies;

/// Per-group outcome of one enrolment pass, by group name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrollmentReport {
    pub added: Vec<String>,
    pub already: Vec<String>,
    pub failed: Vec<String>,
}

pub struct MembershipSync {
    transport: Arc<dyn Transport>,
    groups: Vec<GroupHandle>,
}

impl MembershipSync {
    pub fn new(transport: Arc<dyn Transport>, groups: Vec<GroupHandle>) -> Self {
        Self { transport, groups }
    }

    /// Make sure `sender` is in every target group. Never adds twice.
    pub async fn enroll(&self, sender: &str) -> EnrollmentReport {
        let mut report = EnrollmentReport::default();

        for group in &self.groups {
            match self.ensure_member(group, sender).await {
                Ok(true) => {
                    tracing::info!("Added {} to {}", sender, group.name);
                    report.added.push(group.name.clone());
                }
                Ok(false) => {
                    tracing::debug!("{} already in {}", sender, group.name);
                    report.already.push(group.name.clone());
                }
                Err(e) => {
                    tracing::error!("Failed to add {} to {}: {}", sender, group.name, e);
                    report.failed.push(group.name.clone());
                }
            }
        }

        report
    }

    /// Returns `true` if the sender was added.
    async fn ensure_member(&self, group: &GroupHandle, sender: &str) -> Result<bool> {
        let members = self.transport.list_members(group).await?;
        if members.iter().any(|m| m.matches(sender)) {
            return Ok(false);
        }
        self.transport
            .add_members(group, &[sender.to_string()])
            .await?;
        Ok(true)
    }

    /// Enrol the sender of a direct message and confirm once. Group messages are ignored.
    pub async fn handle(&self, sender: &str, origin: &Conversation) -> Result<()> {
        if origin.is_group() {
            tracing::debug!("Skipping enrolment for group message in {}", origin.id);
            return Ok(());
        }

        let report = self.enroll(sender).await;
        let text = replies::enrollment_confirmation(&report);
        self.transport.send(&origin.id, &text).await?;
        Ok(())
    }
}
