//! Resolve configured groups to live conversations at startup.

use crate::config::{GroupConfig, Settings};
use crate::error::{Error, Result};
use crate::transport::{GroupHandle, Transport};

/// Groups the bot works with after bootstrap.
#[derive(Debug, Clone)]
pub struct ResolvedGroups {
    /// Receives confessions, guess results and anonymous relays.
    pub confession: GroupHandle,
    /// Direct-message senders are added to these.
    pub enroll: Vec<GroupHandle>,
}

/// Find each configured group by id, then by name, creating it if absent.
/// Configured admins are added and promoted in every resolved group.
pub async fn bootstrap(transport: &dyn Transport, settings: &Settings) -> Result<ResolvedGroups> {
    let existing = transport.list_groups().await?;
    let mut confession = None;
    let mut enroll = Vec::new();

    for config in &settings.groups {
        let is_confession = config.name == settings.confession_group;

        let handle = match resolve(transport, config, &existing).await {
            Ok(handle) => handle,
            Err(e) if is_confession => return Err(e),
            Err(e) => {
                tracing::error!("Skipping group {}: {}", config.name, e);
                continue;
            }
        };

        ensure_admins(transport, &handle, &settings.admins).await;

        if config.enroll {
            enroll.push(handle.clone());
        }
        if is_confession {
            confession = Some(handle);
        }
    }

    let confession = confession.ok_or_else(|| {
        Error::Config(format!(
            "confession group '{}' not configured",
            settings.confession_group
        ))
    })?;

    tracing::info!(
        "Groups ready: confessions in {} ({}), enrolling into {}",
        confession.name,
        confession.id,
        enroll.len()
    );

    Ok(ResolvedGroups { confession, enroll })
}

async fn resolve(
    transport: &dyn Transport,
    config: &GroupConfig,
    existing: &[GroupHandle],
) -> Result<GroupHandle> {
    if let Some(id) = &config.id {
        match transport.get_conversation(id).await? {
            Some(conversation) => {
                if let Some(group) = conversation.as_group() {
                    let mut handle = group.clone();
                    if handle.name.is_empty() {
                        handle.name = config.name.clone();
                    }
                    return Ok(handle);
                }
                tracing::warn!("Conversation {} is not a group, looking up {} by name", id, config.name);
            }
            None => {
                tracing::warn!("Group id {} not found, looking up {} by name", id, config.name);
            }
        }
    }

    if let Some(handle) = existing.iter().find(|g| g.name == config.name) {
        tracing::debug!("Found group {} ({})", handle.name, handle.id);
        return Ok(handle.clone());
    }

    let handle = transport.create_group(&config.name).await?;
    tracing::info!("Created group {} ({})", handle.name, handle.id);
    Ok(handle)
}

async fn ensure_admins(transport: &dyn Transport, group: &GroupHandle, admins: &[String]) {
    if admins.is_empty() {
        return;
    }
    if let Err(e) = try_ensure_admins(transport, group, admins).await {
        tracing::warn!("Admin setup incomplete for {}: {}", group.name, e);
    }
}

async fn try_ensure_admins(
    transport: &dyn Transport,
    group: &GroupHandle,
    admins: &[String],
) -> Result<()> {
    let members = transport.list_members(group).await?;
    let missing: Vec<String> = admins
        .iter()
        .filter(|a| !members.iter().any(|m| m.matches(a)))
        .cloned()
        .collect();
    if !missing.is_empty() {
        transport.add_members(group, &missing).await?;
    }

    let super_admins = transport.list_super_admins(group).await?;
    for admin in admins {
        if !super_admins.iter().any(|s| s.eq_ignore_ascii_case(admin)) {
            transport.add_super_admin(group, admin).await?;
            tracing::info!("Promoted {} to super admin of {}", admin, group.name);
        }
    }
    Ok(())
}
