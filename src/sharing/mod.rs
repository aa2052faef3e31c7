//! Sharing - invite codes and membership management
//!
//! Joining a list is never optimistic: membership is confirmed remotely
//! before the shared list becomes visible, so a user cannot see a list
//! they do not actually have access to yet. Leaving a list removes it
//! locally at once.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::domain::{List, MemberRole, Membership, NewInvite, NewMembership};
use crate::error::{Result, SyncError};
use crate::events::{EngineEvent, EventBus};
use crate::remote::RemoteStore;
use crate::replica::Replica;

/// Invite-code lifecycle and membership CRUD on top of the remote store
pub struct SharingManager {
	remote: Arc<dyn RemoteStore>,
	replica: Arc<RwLock<Replica>>,
	events: Arc<EventBus>,

	/// Invite lifetime; `None` creates codes that never expire
	invite_ttl_hours: Option<u32>,
}

impl SharingManager {
	pub fn new(
		remote: Arc<dyn RemoteStore>,
		replica: Arc<RwLock<Replica>>,
		events: Arc<EventBus>,
		invite_ttl_hours: Option<u32>,
	) -> Self {
		Self {
			remote,
			replica,
			events,
			invite_ttl_hours,
		}
	}

	async fn current_user(&self) -> Result<Uuid> {
		self.replica
			.read()
			.await
			.current_user()
			.ok_or(SyncError::NotAuthenticated)
	}

	/// Create an invite for a list; returns the server-assigned code
	pub async fn create_invite_code(&self, list_id: Uuid) -> Result<String> {
		let created_by = self.current_user().await?;
		let expires_at = self
			.invite_ttl_hours
			.map(|hours| Utc::now() + Duration::hours(i64::from(hours)));

		let invite = self
			.remote
			.create_invite(NewInvite {
				list_id,
				created_by,
				expires_at,
			})
			.await?;

		info!(%list_id, "invite code created");
		Ok(invite.code)
	}

	/// Redeem an invite code: look the invite up, verify it has not
	/// expired, create the membership, then fetch the list. The list
	/// becomes visible only after the membership is confirmed.
	pub async fn join_list_by_code(&self, code: &str) -> Result<List> {
		let user_id = self.current_user().await?;

		let invite = self
			.remote
			.invite_by_code(code.trim())
			.await?
			.ok_or_else(|| SyncError::NotFound("invite".into()))?;

		if invite.is_expired(Utc::now()) {
			return Err(SyncError::Expired);
		}

		self.remote
			.create_membership(NewMembership {
				list_id: invite.list_id,
				user_id,
				role: MemberRole::Editor,
				invited_by: Some(invite.created_by),
			})
			.await?;

		let list = self.remote.fetch_list(invite.list_id).await?;
		{
			let mut replica = self.replica.write().await;
			replica.upsert_list(list.clone());
			replica.grant_visibility(list.id);
		}
		self.events.emit(EngineEvent::ListJoined { list_id: list.id });
		self.events.emit(EngineEvent::ReplicaChanged);
		info!(list_id = %list.id, "joined list by invite code");
		Ok(list)
	}

	/// Members of a list (the owner is implicit and has no row)
	pub async fn members_of(&self, list_id: Uuid) -> Result<Vec<Membership>> {
		self.remote.memberships_for_list(list_id).await
	}

	/// Invite a user directly by email: resolve the profile, then create
	/// the membership
	pub async fn invite_user_by_email(&self, list_id: Uuid, email: &str) -> Result<Membership> {
		let invited_by = self.current_user().await?;

		let profile = self
			.remote
			.profile_by_email(email.trim())
			.await?
			.ok_or_else(|| SyncError::NotFound("profile".into()))?;

		self.remote
			.create_membership(NewMembership {
				list_id,
				user_id: profile.id,
				role: MemberRole::Editor,
				invited_by: Some(invited_by),
			})
			.await
	}

	/// Revoke one membership row (owner removing a member)
	pub async fn remove_member(&self, membership_id: Uuid) -> Result<()> {
		self.remote.delete_membership(membership_id).await
	}

	/// Leave a shared list: delete our membership row, then drop the list
	/// from the replica immediately
	pub async fn leave_list(&self, list_id: Uuid) -> Result<()> {
		let user_id = self.current_user().await?;

		self.remote
			.delete_membership_for(list_id, user_id)
			.await?;

		self.replica.write().await.remove_list(list_id);
		self.events.emit(EngineEvent::ReplicaChanged);
		info!(%list_id, "left list");
		Ok(())
	}
}
