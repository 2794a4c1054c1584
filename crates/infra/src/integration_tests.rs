//! Integration tests for the service layer over the in-memory adapters.
//!
//! Tests: session → identity → tenancy → evaluator, and the invitation
//! lifecycle end to end.
//!
//! Verifies:
//! - Tenant isolation holds for every organization-scoped operation
//! - Tokens rotate on resend and the throttle holds
//! - Accept is idempotent and promotes bare-default users
//! - Losing a compare-and-set against a concurrent resend or accept is reported, never merged
//! - Every sensitive transition leaves an audit entry

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use atelier_audit::{AuditAction, AuditFilter, AuditLog, InMemoryAuditLog};
    use atelier_auth::{ApprovalStatus, GlobalRole, MembershipRole, Organization, User, catalog};
    use atelier_core::{InvitationId, ManualClock, MembershipId, OrganizationId, UserId};
    use atelier_invitations::{InvalidReason, Invitation, InvitationPolicy, InvitationStatus};

    use crate::notifier::{InMemoryNotifier, Notification, Notifier, NotifyError};
    use crate::services::{ServiceDeps, ServiceError, Services};
    use crate::session::JwtSessionService;
    use crate::store::{
        AcceptInvitation, AcceptOutcome, DirectoryStore, InMemoryStore, InvitationStore, StoreError,
    };

    const SECRET: &[u8] = b"test-secret";

    struct Harness {
        services: Services,
        store: Arc<InMemoryStore>,
        notifier: Arc<InMemoryNotifier>,
        audit_log: Arc<InMemoryAuditLog>,
        clock: Arc<ManualClock>,
        sessions: Arc<JwtSessionService>,
        admin: User,
    }

    impl Harness {
        async fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let notifier = Arc::new(InMemoryNotifier::new());
            Self::with_notifier(store, notifier.clone(), notifier).await
        }

        async fn with_notifier(
            store: Arc<InMemoryStore>,
            outbox: Arc<InMemoryNotifier>,
            notifier: Arc<dyn Notifier>,
        ) -> Self {
            Self::build(store.clone(), store, outbox, notifier).await
        }

        /// Invitations go through a [`RacingStore`] so a test can slip a
        /// competing write in front of the service's own.
        async fn racing() -> (Self, Arc<RacingStore>) {
            let store = Arc::new(InMemoryStore::new());
            let racing = Arc::new(RacingStore::new(store.clone()));
            let notifier = Arc::new(InMemoryNotifier::new());
            let h = Self::build(store, racing.clone(), notifier.clone(), notifier).await;
            (h, racing)
        }

        async fn build(
            store: Arc<InMemoryStore>,
            invitations: Arc<dyn InvitationStore>,
            outbox: Arc<InMemoryNotifier>,
            notifier: Arc<dyn Notifier>,
        ) -> Self {
            let audit_log = Arc::new(InMemoryAuditLog::new());
            let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()));
            let sessions = Arc::new(JwtSessionService::new(SECRET));
            let services = Services::new(ServiceDeps {
                directory: store.clone(),
                invitations,
                audit_log: audit_log.clone(),
                sessions: sessions.clone(),
                notifier,
                clock: clock.clone(),
                policy: InvitationPolicy::default(),
                public_base_url: "https://atelier.test".to_string(),
                notifier_timeout: StdDuration::from_millis(200),
            });
            let admin = services.onboarding.bootstrap_admin("ops@atelier.test").await.unwrap();
            Self {
                services,
                store,
                notifier: outbox,
                audit_log,
                clock,
                sessions,
                admin,
            }
        }

        /// Register and approve an owner; returns the owner (re-read) and the org.
        async fn owner(&self, email: &str, org_name: &str) -> (User, Organization) {
            let owner = self
                .services
                .onboarding
                .register(email, "Owner", GlobalRole::Owner)
                .await
                .unwrap();
            let org = self
                .services
                .onboarding
                .approve_owner(&self.admin, owner.id, org_name)
                .await
                .unwrap();
            let owner = self.reload(&owner).await;
            (owner, org)
        }

        async fn client(&self, email: &str) -> User {
            self.services
                .onboarding
                .register(email, "Client", GlobalRole::Client)
                .await
                .unwrap()
        }

        async fn reload(&self, user: &User) -> User {
            self.store.find_user(user.id).await.unwrap().unwrap()
        }

        fn token_for(&self, email: &str) -> String {
            let url = self.notifier.last_accept_url(email).expect("no invitation sent");
            url.split_once("token=").map(|(_, t)| t.to_string()).unwrap()
        }

        fn advance(&self, by: Duration) {
            self.clock.advance(by);
        }

        async fn actions(&self) -> Vec<AuditAction> {
            self.audit_log
                .list(AuditFilter::new())
                .await
                .unwrap()
                .into_iter()
                .map(|e| e.action)
                .collect()
        }

        /// Invite `email` into the owner's org and accept it as `member`.
        async fn join(&self, owner: &User, member: &User, role: MembershipRole) -> MembershipId {
            self.services
                .invitations
                .create(owner, None, &member.email, role)
                .await
                .unwrap();
            let token = self.token_for(&member.email);
            let accepted = self
                .services
                .invitations
                .accept(Some(member), &token)
                .await
                .unwrap();
            accepted.membership.id
        }
    }

    #[tokio::test]
    async fn ama_invites_a_worker_who_needs_an_explicit_grant() {
        let h = Harness::new().await;
        let (ama, o1) = h.owner("ama@atelier.test", "Ama Couture").await;
        assert_eq!(ama.status, ApprovalStatus::Approved);

        let summary = h
            .services
            .invitations
            .create(&ama, None, "Worker@X.com", MembershipRole::Worker)
            .await
            .unwrap();
        assert_eq!(summary.email, "worker@x.com");
        assert_eq!(summary.organization_id, o1.id);
        assert_eq!(summary.status, InvitationStatus::Pending);
        assert_eq!(summary.expires_at, summary.created_at + Duration::days(7));

        let token = h.token_for("worker@x.com");
        assert!(h.services.invitations.validate(&token).await.unwrap().valid);

        let worker = h.client("worker@x.com").await;
        let accepted = h
            .services
            .invitations
            .accept(Some(&worker), &token)
            .await
            .unwrap();
        assert!(accepted.created);
        assert_eq!(accepted.organization_id, o1.id);
        assert_eq!(accepted.membership.role, MembershipRole::Worker);
        assert!(accepted.membership.permissions.is_empty());

        let worker = h.reload(&worker).await;
        assert_eq!(worker.global_role, GlobalRole::Worker);

        let validity = h.services.invitations.validate(&token).await.unwrap();
        assert!(!validity.valid);
        assert_eq!(validity.reason, Some(InvalidReason::NotPending));

        let denied = h
            .services
            .tenancy
            .authorize(&worker, None, &catalog::ORDERS_WRITE)
            .await;
        assert_eq!(denied.unwrap_err(), ServiceError::Forbidden);

        h.services
            .members
            .update_member(
                &ama,
                None,
                accepted.membership.id,
                MembershipRole::Worker,
                &["orders:write".to_string()],
            )
            .await
            .unwrap();

        let scope = h
            .services
            .tenancy
            .authorize(&worker, None, &catalog::ORDERS_WRITE)
            .await
            .unwrap();
        assert_eq!(scope.organization_id(), o1.id);

        // Grants are exact: write does not imply read.
        let read = h
            .services
            .tenancy
            .authorize(&worker, None, &catalog::ORDERS_READ)
            .await;
        assert_eq!(read.unwrap_err(), ServiceError::Forbidden);

        let actions = h.actions().await;
        for expected in [
            AuditAction::OwnerApprove,
            AuditAction::OrganizationCreate,
            AuditAction::InvitationCreate,
            AuditAction::InvitationAccept,
            AuditAction::MembershipUpdate,
        ] {
            assert!(actions.contains(&expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn owner_is_allowed_everything_in_their_own_organization() {
        let h = Harness::new().await;
        let (ama, o1) = h.owner("ama@atelier.test", "Ama Couture").await;

        for permission in catalog::ALL {
            let scope = h
                .services
                .tenancy
                .authorize(&ama, Some(o1.id), permission)
                .await
                .unwrap();
            assert!(scope.is_owner());
        }
    }

    #[tokio::test]
    async fn other_tenants_cannot_see_or_touch_an_organization() {
        let h = Harness::new().await;
        let (ama, o1) = h.owner("ama@atelier.test", "Ama Couture").await;
        let (bo, _) = h.owner("bo@atelier.test", "Bo Tailoring").await;

        let invitation = h
            .services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        h.advance(Duration::seconds(61));

        let err = h.services.invitations.resend(&bo, invitation.id).await.unwrap_err();
        assert_eq!(err, ServiceError::Forbidden);

        // Unknown ids look exactly like foreign ones.
        let err = h
            .services
            .invitations
            .resend(&bo, InvitationId::new())
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Forbidden);

        let err = h
            .services
            .invitations
            .list(&bo, Some(o1.id))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::NoOrganizationContext);

        // Without an explicit org, Bo resolves to Bo's own organization only.
        let listed = h.services.invitations.list(&bo, None).await.unwrap();
        assert!(listed.is_empty());

        let stranger = h.client("stranger@x.com").await;
        let err = h
            .services
            .tenancy
            .authorize(&stranger, Some(o1.id), &catalog::ORDERS_READ)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::NoOrganizationContext);
    }

    #[tokio::test]
    async fn resend_rotates_the_token_and_is_throttled() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;

        let invitation = h
            .services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let first = h.token_for("worker@x.com");

        let err = h.services.invitations.resend(&ama, invitation.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::TooSoon { retry_after_secs } if retry_after_secs == 60));

        h.advance(Duration::seconds(61));
        let resent = h.services.invitations.resend(&ama, invitation.id).await.unwrap();
        let second = h.token_for("worker@x.com");
        assert_ne!(first, second);
        assert_eq!(resent.created_at, h.clock_now());
        assert_eq!(resent.expires_at, resent.created_at + Duration::days(7));

        let old = h.services.invitations.validate(&first).await.unwrap();
        assert_eq!(old.reason, Some(InvalidReason::NotFound));
        assert!(h.services.invitations.validate(&second).await.unwrap().valid);

        h.advance(Duration::seconds(10));
        let err = h.services.invitations.resend(&ama, invitation.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::TooSoon { retry_after_secs } if retry_after_secs == 50));
        assert_eq!(h.token_for("worker@x.com"), second);
        assert!(h.services.invitations.validate(&second).await.unwrap().valid);

        let resends = h
            .audit_log
            .list(AuditFilter::new().action(AuditAction::InvitationResend))
            .await
            .unwrap();
        assert_eq!(resends.len(), 1);
        let details = &resends[0].details;
        assert_ne!(details["old_token"], details["new_token"]);
        assert!(!details.to_string().contains(&second));
    }

    #[tokio::test]
    async fn accepted_invitations_cannot_be_resent() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let worker = h.client("worker@x.com").await;
        h.join(&ama, &worker, MembershipRole::Worker).await;

        let invitation = h.services.invitations.list(&ama, None).await.unwrap().remove(0);
        h.advance(Duration::seconds(61));
        let err = h.services.invitations.resend(&ama, invitation.id).await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidState);
    }

    #[tokio::test]
    async fn accept_guards_run_in_order() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;

        h.services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let token = h.token_for("worker@x.com");

        let err = h.services.invitations.accept(None, &token).await.unwrap_err();
        assert_eq!(err, ServiceError::AuthenticationRequired);

        let err = h.services.invitations.accept(Some(&ama), &token).await.unwrap_err();
        assert_eq!(err, ServiceError::SelfInvitation);

        let someone = h.client("someone@x.com").await;
        let err = h.services.invitations.accept(Some(&someone), &token).await.unwrap_err();
        assert_eq!(err, ServiceError::EmailMismatch);

        let err = h
            .services
            .invitations
            .accept(Some(&someone), "not-a-token")
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::InvalidOrExpired);

        // Nothing was written by the failed attempts.
        assert!(h.services.members.list_members(&ama, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn self_invite_is_rejected_even_when_the_email_matches() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let worker = h.client("worker@x.com").await;
        h.join(&ama, &worker, MembershipRole::Manager).await;
        let manager = h.reload(&worker).await;

        // A manager invites an address that later turns out to be their own login.
        h.services
            .invitations
            .create(&manager, None, "worker2@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let token = h.token_for("worker2@x.com");

        let renamed = User {
            email: "worker2@x.com".to_string(),
            ..manager.clone()
        };
        let err = h.services.invitations.accept(Some(&renamed), &token).await.unwrap_err();
        assert_eq!(err, ServiceError::SelfInvitation);
    }

    #[tokio::test]
    async fn accepting_twice_is_idempotent() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        h.services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let token = h.token_for("worker@x.com");
        let worker = h.client("worker@x.com").await;

        let first = h.services.invitations.accept(Some(&worker), &token).await.unwrap();
        let worker = h.reload(&worker).await;
        let second = h.services.invitations.accept(Some(&worker), &token).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.membership.id, second.membership.id);
        assert_eq!(h.services.members.list_members(&ama, None).await.unwrap().len(), 1);

        let accepts = h
            .audit_log
            .list(AuditFilter::new().action(AuditAction::InvitationAccept))
            .await
            .unwrap();
        assert_eq!(accepts.len(), 1);

        // The replay is only for the invitee.
        let other = h.client("other@x.com").await;
        let err = h.services.invitations.accept(Some(&other), &token).await.unwrap_err();
        assert_eq!(err, ServiceError::EmailMismatch);
    }

    #[tokio::test]
    async fn invitations_expire_after_seven_days_and_can_be_revived() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let invitation = h
            .services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let token = h.token_for("worker@x.com");
        let worker = h.client("worker@x.com").await;

        h.advance(Duration::days(7) - Duration::seconds(1));
        assert!(h.services.invitations.validate(&token).await.unwrap().valid);

        h.advance(Duration::seconds(1));
        let validity = h.services.invitations.validate(&token).await.unwrap();
        assert_eq!(validity.reason, Some(InvalidReason::Expired));
        let err = h.services.invitations.accept(Some(&worker), &token).await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidOrExpired);

        assert_eq!(h.services.invitations.expire_overdue().await.unwrap(), 1);
        assert_eq!(h.services.invitations.expire_overdue().await.unwrap(), 0);
        let listed = h.services.invitations.list(&ama, None).await.unwrap();
        assert_eq!(listed[0].status, InvitationStatus::Expired);

        let revived = h.services.invitations.resend(&ama, invitation.id).await.unwrap();
        assert_eq!(revived.status, InvitationStatus::Pending);
        let fresh = h.token_for("worker@x.com");
        assert!(h.services.invitations.validate(&fresh).await.unwrap().valid);
        assert!(h.services.invitations.accept(Some(&worker), &fresh).await.unwrap().created);
    }

    #[tokio::test]
    async fn create_rejects_duplicates_and_existing_members() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;

        h.services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let err = h
            .services
            .invitations
            .create(&ama, None, " WORKER@x.com ", MembershipRole::Manager)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::DuplicatePendingInvitation);

        let err = h
            .services
            .invitations
            .create(&ama, None, "ama@atelier.test", MembershipRole::Worker)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::AlreadyMember);

        let member = h.client("member@x.com").await;
        h.join(&ama, &member, MembershipRole::Worker).await;
        let err = h
            .services
            .invitations
            .create(&ama, None, "member@x.com", MembershipRole::Worker)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::AlreadyMember);

        let err = h
            .services
            .invitations
            .create(&ama, None, "not-an-email", MembershipRole::Worker)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn workers_need_workers_manage_to_invite() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let worker = h.client("worker@x.com").await;
        let membership = h.join(&ama, &worker, MembershipRole::Worker).await;
        let worker = h.reload(&worker).await;

        let err = h
            .services
            .invitations
            .create(&worker, None, "friend@x.com", MembershipRole::Worker)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Forbidden);

        h.services
            .members
            .update_member(
                &ama,
                None,
                membership,
                MembershipRole::Worker,
                &[catalog::WORKERS_MANAGE.to_string()],
            )
            .await
            .unwrap();
        h.services
            .invitations
            .create(&worker, None, "friend@x.com", MembershipRole::Worker)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn members_cannot_modify_or_remove_themselves() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let manager = h.client("manager@x.com").await;
        let manager_membership = h.join(&ama, &manager, MembershipRole::Manager).await;
        let manager = h.reload(&manager).await;
        let worker = h.client("worker@x.com").await;
        let worker_membership = h.join(&ama, &worker, MembershipRole::Worker).await;

        let err = h
            .services
            .members
            .update_member(&manager, None, manager_membership, MembershipRole::Manager, &[])
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::SelfModification);

        let err = h
            .services
            .members
            .remove_member(&manager, None, manager_membership)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::SelfModification);

        let err = h
            .services
            .members
            .update_member(
                &manager,
                None,
                worker_membership,
                MembershipRole::Worker,
                &["orders:delete".to_string()],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        h.services
            .members
            .remove_member(&manager, None, worker_membership)
            .await
            .unwrap();
        let members = h.services.members.list_members(&ama, None).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].email, "manager@x.com");

        let err = h
            .services
            .members
            .remove_member(&manager, None, worker_membership)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::NotFound);
        assert!(h.actions().await.contains(&AuditAction::MembershipRemove));
    }

    #[tokio::test]
    async fn membership_ids_from_other_organizations_are_not_found() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let (bo, _) = h.owner("bo@atelier.test", "Bo Tailoring").await;
        let worker = h.client("worker@x.com").await;
        let membership = h.join(&ama, &worker, MembershipRole::Worker).await;

        let err = h
            .services
            .members
            .update_member(&bo, None, membership, MembershipRole::Manager, &[])
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::NotFound);
        let err = h.services.members.remove_member(&bo, None, membership).await.unwrap_err();
        assert_eq!(err, ServiceError::NotFound);
    }

    #[tokio::test]
    async fn owner_onboarding_is_admin_only() {
        let h = Harness::new().await;
        let pending = h
            .services
            .onboarding
            .register("tailor@atelier.test", "Tailor", GlobalRole::Owner)
            .await
            .unwrap();
        assert_eq!(pending.status, ApprovalStatus::Pending);

        let listed = h.services.onboarding.list_pending_owners(&h.admin).await.unwrap();
        assert_eq!(listed.len(), 1);

        let err = h
            .services
            .onboarding
            .approve_owner(&pending, pending.id, "Tailor Shop")
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Forbidden);

        let rejected = h
            .services
            .onboarding
            .reject_owner(&h.admin, pending.id, Some("incomplete profile".to_string()))
            .await
            .unwrap();
        assert_eq!(rejected.status, ApprovalStatus::Rejected);

        let err = h
            .services
            .onboarding
            .approve_owner(&h.admin, pending.id, "Tailor Shop")
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::InvalidState);
        let err = h
            .services
            .onboarding
            .reject_owner(&h.admin, pending.id, None)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::InvalidState);

        assert!(matches!(
            h.notifier.sent().last(),
            Some(Notification::OwnerRejected { .. })
        ));
        assert!(h.actions().await.contains(&AuditAction::OwnerReject));
    }

    #[tokio::test]
    async fn organization_slugs_stay_unique() {
        let h = Harness::new().await;
        let (_, first) = h.owner("a@atelier.test", "Ama Couture").await;
        let (_, second) = h.owner("b@atelier.test", "Ama  Couture!").await;
        assert_eq!(first.slug, "ama-couture");
        assert_eq!(second.slug, "ama-couture-2");
    }

    #[tokio::test]
    async fn email_registration_is_case_insensitively_unique() {
        let h = Harness::new().await;
        h.client("kofi@x.com").await;
        let err = h
            .services
            .onboarding
            .register(" KOFI@X.COM", "Kofi", GlobalRole::Client)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn identity_resolution_requires_an_active_account() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let now = h.clock_now();

        let token = h.sessions.issue(ama.id, now, Duration::hours(1)).unwrap();
        let resolved = h.services.identity.resolve_identity(&token).await.unwrap();
        assert_eq!(resolved.id, ama.id);

        assert_eq!(
            h.services.identity.resolve_identity("garbage").await.unwrap_err(),
            ServiceError::Unauthenticated
        );
        assert_eq!(h.services.identity.resolve_optional(None).await.unwrap(), None);

        h.advance(Duration::hours(2));
        assert_eq!(
            h.services.identity.resolve_identity(&token).await.unwrap_err(),
            ServiceError::Unauthenticated
        );

        let pending = h
            .services
            .onboarding
            .register("tailor@atelier.test", "Tailor", GlobalRole::Owner)
            .await
            .unwrap();
        h.services
            .onboarding
            .reject_owner(&h.admin, pending.id, None)
            .await
            .unwrap();
        let token = h.sessions.issue(pending.id, h.clock_now(), Duration::hours(1)).unwrap();
        assert_eq!(
            h.services.identity.resolve_identity(&token).await.unwrap_err(),
            ServiceError::Unauthenticated
        );
    }

    struct Unreachable;

    #[async_trait]
    impl Notifier for Unreachable {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp down".to_string()))
        }
    }

    #[tokio::test]
    async fn notifier_failures_do_not_roll_back_invitations() {
        let store = Arc::new(InMemoryStore::new());
        let h = Harness::with_notifier(store, Arc::new(InMemoryNotifier::new()), Arc::new(Unreachable)).await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;

        let created = h
            .services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let listed = h.services.invitations.list(&ama, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
    }

    #[tokio::test]
    async fn audit_trail_is_scoped_to_the_resolved_organization() {
        let h = Harness::new().await;
        let (ama, o1) = h.owner("ama@atelier.test", "Ama Couture").await;
        let (bo, _) = h.owner("bo@atelier.test", "Bo Tailoring").await;
        h.services
            .invitations
            .create(&bo, None, "someone@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        h.services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();

        let trail = h.services.audit_trail(&ama, None, Some(10)).await.unwrap();
        assert!(!trail.is_empty());
        assert!(trail.iter().all(|e| e.organization_id == Some(o1.id)));
        assert_eq!(trail[0].action, AuditAction::InvitationCreate);
    }

    /// A write another request commits just before ours reaches the store.
    enum Interleave {
        /// A resend rotated the token at `at`.
        Resend { at: DateTime<Utc> },
        /// Another submit by `user_id` accepted the invitation.
        Accept { user_id: UserId },
    }

    struct RacingStore {
        inner: Arc<InMemoryStore>,
        before_rotate: Mutex<Option<Interleave>>,
        before_accept: Mutex<Option<Interleave>>,
    }

    impl RacingStore {
        fn new(inner: Arc<InMemoryStore>) -> Self {
            Self {
                inner,
                before_rotate: Mutex::new(None),
                before_accept: Mutex::new(None),
            }
        }

        fn before_rotate(&self, step: Interleave) {
            *self.before_rotate.lock().unwrap() = Some(step);
        }

        fn before_accept(&self, step: Interleave) {
            *self.before_accept.lock().unwrap() = Some(step);
        }

        async fn run(&self, id: InvitationId, slot: &Mutex<Option<Interleave>>) {
            let step = slot.lock().unwrap().take();
            let Some(step) = step else { return };
            let current = self.inner.find_invitation(id).await.unwrap().unwrap();
            match step {
                Interleave::Resend { at } => {
                    let rotated = current.rotated(&InvitationPolicy::default(), at);
                    assert!(self.inner.rotate_invitation(&current, &rotated).await.unwrap());
                }
                Interleave::Accept { user_id } => {
                    let outcome = self
                        .inner
                        .accept_invitation(&AcceptInvitation {
                            invitation_id: current.id,
                            token: current.token.clone(),
                            organization_id: current.organization_id,
                            user_id,
                            role: current.role,
                            promote_to: None,
                            now: current.updated_at,
                        })
                        .await
                        .unwrap();
                    assert!(matches!(outcome, AcceptOutcome::Accepted { created: true, .. }));
                }
            }
        }
    }

    #[async_trait]
    impl InvitationStore for RacingStore {
        async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StoreError> {
            self.inner.insert_invitation(invitation).await
        }

        async fn find_invitation(&self, id: InvitationId) -> Result<Option<Invitation>, StoreError> {
            self.inner.find_invitation(id).await
        }

        async fn find_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>, StoreError> {
            self.inner.find_invitation_by_token(token).await
        }

        async fn find_pending_invitation(
            &self,
            organization_id: OrganizationId,
            email: &str,
        ) -> Result<Option<Invitation>, StoreError> {
            self.inner.find_pending_invitation(organization_id, email).await
        }

        async fn list_invitations(&self, organization_id: OrganizationId) -> Result<Vec<Invitation>, StoreError> {
            self.inner.list_invitations(organization_id).await
        }

        async fn rotate_invitation(&self, current: &Invitation, rotated: &Invitation) -> Result<bool, StoreError> {
            self.run(current.id, &self.before_rotate).await;
            self.inner.rotate_invitation(current, rotated).await
        }

        async fn accept_invitation(&self, accept: &AcceptInvitation) -> Result<AcceptOutcome, StoreError> {
            self.run(accept.invitation_id, &self.before_accept).await;
            self.inner.accept_invitation(accept).await
        }

        async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
            self.inner.expire_overdue(now).await
        }
    }

    #[tokio::test]
    async fn resend_that_loses_to_a_concurrent_resend_is_throttled() {
        let (h, racing) = Harness::racing().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let invitation = h
            .services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let stale = h.store.find_invitation(invitation.id).await.unwrap().unwrap();

        h.advance(Duration::seconds(61));
        racing.before_rotate(Interleave::Resend { at: h.clock_now() });
        let err = h.services.invitations.resend(&ama, invitation.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::TooSoon { retry_after_secs } if retry_after_secs == 60));

        // Only the winner's token is live and only the original mail went out.
        let winner = h.store.find_invitation(invitation.id).await.unwrap().unwrap();
        assert_ne!(winner.token, stale.token);
        assert_eq!(h.notifier.sent().len(), 1);
        assert!(!h.actions().await.contains(&AuditAction::InvitationResend));

        // The stale snapshot can never win afterwards.
        let late = stale.rotated(&InvitationPolicy::default(), h.clock_now());
        assert!(!h.store.rotate_invitation(&stale, &late).await.unwrap());
        let stored = h.store.find_invitation(invitation.id).await.unwrap().unwrap();
        assert_eq!(stored.token, winner.token);
    }

    #[tokio::test]
    async fn lost_rotation_past_the_cooldown_asks_for_a_prompt_retry() {
        let (h, racing) = Harness::racing().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let invitation = h
            .services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();

        h.advance(Duration::seconds(200));
        racing.before_rotate(Interleave::Resend {
            at: invitation.updated_at + Duration::seconds(100),
        });
        let err = h.services.invitations.resend(&ama, invitation.id).await.unwrap_err();
        assert_eq!(err, ServiceError::TooSoon { retry_after_secs: 1 });

        // The retry then goes through.
        assert!(h.services.invitations.resend(&ama, invitation.id).await.is_ok());
    }

    #[tokio::test]
    async fn resend_that_loses_to_an_accept_is_an_invalid_state() {
        let (h, racing) = Harness::racing().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let invitation = h
            .services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let token = h.token_for("worker@x.com");
        let worker = h.client("worker@x.com").await;

        h.advance(Duration::seconds(61));
        racing.before_rotate(Interleave::Accept { user_id: worker.id });
        let err = h.services.invitations.resend(&ama, invitation.id).await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidState);

        let validity = h.services.invitations.validate(&token).await.unwrap();
        assert_eq!(validity.reason, Some(InvalidReason::NotPending));
        assert_eq!(h.services.members.list_members(&ama, None).await.unwrap().len(), 1);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_double_submit_resolves_to_one_membership() {
        let (h, racing) = Harness::racing().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        h.services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let token = h.token_for("worker@x.com");
        let worker = h.client("worker@x.com").await;

        racing.before_accept(Interleave::Accept { user_id: worker.id });
        let accepted = h.services.invitations.accept(Some(&worker), &token).await.unwrap();
        assert!(!accepted.created);

        let members = h.services.members.list_members(&ama, None).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, accepted.membership.id);

        // The submit that claimed the row owns the audit entry; the loser adds none.
        assert!(!h.actions().await.contains(&AuditAction::InvitationAccept));
    }

    #[tokio::test]
    async fn accept_with_a_token_rotated_mid_flight_fails() {
        let (h, racing) = Harness::racing().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let invitation = h
            .services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let old = h.token_for("worker@x.com");
        let worker = h.client("worker@x.com").await;

        h.advance(Duration::seconds(61));
        racing.before_accept(Interleave::Resend { at: h.clock_now() });
        let err = h.services.invitations.accept(Some(&worker), &old).await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidOrExpired);
        assert!(h.services.members.list_members(&ama, None).await.unwrap().is_empty());

        let current = h.store.find_invitation(invitation.id).await.unwrap().unwrap();
        assert_eq!(current.status, InvitationStatus::Pending);
        let accepted = h
            .services
            .invitations
            .accept(Some(&worker), current.token.expose())
            .await
            .unwrap();
        assert!(accepted.created);
    }

    #[tokio::test]
    async fn expired_invitations_are_not_revived_for_existing_members() {
        let h = Harness::new().await;
        let (ama, _) = h.owner("ama@atelier.test", "Ama Couture").await;
        let stale = h
            .services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        h.advance(Duration::days(8));
        assert_eq!(h.services.invitations.expire_overdue().await.unwrap(), 1);

        let worker = h.client("worker@x.com").await;
        h.join(&ama, &worker, MembershipRole::Worker).await;
        let sent = h.notifier.sent().len();

        let err = h.services.invitations.resend(&ama, stale.id).await.unwrap_err();
        assert_eq!(err, ServiceError::AlreadyMember);
        assert_eq!(h.notifier.sent().len(), sent);
        let stored = h.store.find_invitation(stale.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvitationStatus::Expired);
    }

    #[tokio::test]
    async fn claiming_an_invitation_is_audited_even_when_the_membership_exists() {
        let h = Harness::new().await;
        let (ama, o1) = h.owner("ama@atelier.test", "Ama Couture").await;
        h.services
            .invitations
            .create(&ama, None, "worker@x.com", MembershipRole::Worker)
            .await
            .unwrap();
        let token = h.token_for("worker@x.com");
        let worker = h.client("worker@x.com").await;

        // The worker already joined through a different invitation.
        let other = Invitation::issue(
            o1.id,
            "alias@x.com",
            MembershipRole::Worker,
            ama.id,
            &InvitationPolicy::default(),
            h.clock_now(),
        )
        .unwrap();
        h.store.insert_invitation(&other).await.unwrap();
        let outcome = h
            .store
            .accept_invitation(&AcceptInvitation {
                invitation_id: other.id,
                token: other.token.clone(),
                organization_id: o1.id,
                user_id: worker.id,
                role: MembershipRole::Worker,
                promote_to: None,
                now: h.clock_now(),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, AcceptOutcome::Accepted { created: true, .. }));

        let accepted = h.services.invitations.accept(Some(&worker), &token).await.unwrap();
        assert!(!accepted.created);

        let accepts = h
            .audit_log
            .list(AuditFilter::new().action(AuditAction::InvitationAccept))
            .await
            .unwrap();
        assert_eq!(accepts.len(), 1);
        assert_eq!(accepts[0].details["membership_created"], false);
        assert_eq!(accepts[0].details["membership_id"], serde_json::json!(accepted.membership.id));
    }

    impl Harness {
        fn clock_now(&self) -> chrono::DateTime<Utc> {
            use atelier_core::Clock;
            self.clock.now()
        }
    }
}
