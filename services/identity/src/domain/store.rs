use std::future::Future;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use warden_core::Ctx;
use warden_domain::link::LinkType;
use warden_domain::oauth::OAuthResource;
use warden_domain::pagination::PageRequest;

use crate::domain::types::{Accounts, DomainBlacklistEntry, Link, Profile, Token, User};
use crate::error::StoreError;

/// Persistence port for the identity store.
///
/// Every operation takes the caller's [`Ctx`]; a cancelled context or a
/// passed deadline aborts the in-flight call with [`StoreError::Interrupted`].
/// Lookups that match nothing return [`StoreError::NotFound`].
pub trait IdentityStore: Send + Sync {
    /// Port handed to a unit of work. Same contract, bound to one transaction.
    type Tx: IdentityStore;

    // ── Users ────────────────────────────────────────────────────────────────

    /// Non-deleted user with this login.
    fn get_user_by_login(
        &self,
        ctx: &Ctx,
        login: &str,
    ) -> impl Future<Output = Result<User, StoreError>> + Send;

    fn get_user_by_id(
        &self,
        ctx: &Ctx,
        id: Uuid,
    ) -> impl Future<Output = Result<User, StoreError>> + Send;

    /// Insert `user` and assign its id. A live user with the same login is a
    /// [`StoreError::ConstraintViolation`].
    fn create_user(
        &self,
        ctx: &Ctx,
        user: &mut User,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replace every mutable column of the user with this id.
    fn update_user(
        &self,
        ctx: &Ctx,
        user: &User,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_blacklisted_users(
        &self,
        ctx: &Ctx,
        page: PageRequest,
    ) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send;

    /// Mark the user blacklisted, stamp the profile and deactivate every
    /// token, all in one transaction.
    fn blacklist_user(
        &self,
        ctx: &Ctx,
        user: &mut User,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Soft delete: mark the user deleted, stamp the profile and deactivate
    /// every token and link, all in one transaction.
    fn delete_user(
        &self,
        ctx: &Ctx,
        user: &mut User,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // ── Profiles ─────────────────────────────────────────────────────────────

    /// Insert `profile`, assigning `id` and `created_at`. Data that cannot be
    /// encoded fails with [`StoreError::Serialization`] before any write.
    fn create_profile<D>(
        &self,
        ctx: &Ctx,
        profile: &mut Profile<D>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send
    where
        D: Serialize + Send + Sync;

    fn get_profile_by_id<D>(
        &self,
        ctx: &Ctx,
        id: Uuid,
    ) -> impl Future<Output = Result<Profile<D>, StoreError>> + Send
    where
        D: DeserializeOwned + Send;

    fn get_profile_by_user<D>(
        &self,
        ctx: &Ctx,
        user: &User,
    ) -> impl Future<Output = Result<Profile<D>, StoreError>> + Send
    where
        D: DeserializeOwned + Send;

    /// Replace `referral`, `access` and `data` of the profile with this id.
    fn update_profile<D>(
        &self,
        ctx: &Ctx,
        profile: &Profile<D>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send
    where
        D: Serialize + Send + Sync;

    /// One page of profiles ordered by creation time. Empty when the page is
    /// past the end.
    fn get_all_profiles<D>(
        &self,
        ctx: &Ctx,
        page: PageRequest,
    ) -> impl Future<Output = Result<Vec<Profile<D>>, StoreError>> + Send
    where
        D: DeserializeOwned + Send;

    // ── Accounts ─────────────────────────────────────────────────────────────

    fn get_user_by_bound_account(
        &self,
        ctx: &Ctx,
        provider: OAuthResource,
        account_id: &str,
    ) -> impl Future<Output = Result<User, StoreError>> + Send;

    fn get_user_bound_accounts(
        &self,
        ctx: &Ctx,
        user: &User,
    ) -> impl Future<Output = Result<Accounts, StoreError>> + Send;

    /// Bind `account_id` at `provider` to the user, creating the accounts row
    /// on first use and replacing a previous binding for that provider.
    fn bind_account(
        &self,
        ctx: &Ctx,
        user: &User,
        provider: OAuthResource,
        account_id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // ── Domain blacklist ─────────────────────────────────────────────────────

    /// Idempotent.
    fn blacklist_domain(
        &self,
        ctx: &Ctx,
        domain: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn unblacklist_domain(
        &self,
        ctx: &Ctx,
        domain: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn is_domain_blacklisted(
        &self,
        ctx: &Ctx,
        domain: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn get_blacklisted_domains(
        &self,
        ctx: &Ctx,
        page: PageRequest,
    ) -> impl Future<Output = Result<Vec<DomainBlacklistEntry>, StoreError>> + Send;

    // ── Links ────────────────────────────────────────────────────────────────

    /// Issue a fresh link of `kind` valid for `lifetime`, deactivating the
    /// user's previous active link of that kind in the same transaction.
    fn create_link(
        &self,
        ctx: &Ctx,
        kind: LinkType,
        lifetime: chrono::Duration,
        user: &User,
    ) -> impl Future<Output = Result<Link, StoreError>> + Send;

    /// The user's active, unexpired link of `kind`.
    fn get_link_for_user(
        &self,
        ctx: &Ctx,
        kind: LinkType,
        user: &User,
    ) -> impl Future<Output = Result<Link, StoreError>> + Send;

    /// Active, unexpired link by its opaque value.
    fn get_link_from_string(
        &self,
        ctx: &Ctx,
        link: &str,
    ) -> impl Future<Output = Result<Link, StoreError>> + Send;

    /// Replace `is_active`, `expired_at` and `sent_at`.
    fn update_link(
        &self,
        ctx: &Ctx,
        link: &Link,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every link of the user, newest first.
    fn get_user_links(
        &self,
        ctx: &Ctx,
        user: &User,
    ) -> impl Future<Output = Result<Vec<Link>, StoreError>> + Send;

    // ── Tokens ───────────────────────────────────────────────────────────────

    fn get_token_object(
        &self,
        ctx: &Ctx,
        token: &str,
    ) -> impl Future<Output = Result<Token, StoreError>> + Send;

    /// Issue a token for `session_id`, replacing any token the session held.
    fn create_token(
        &self,
        ctx: &Ctx,
        user: &User,
        session_id: &str,
    ) -> impl Future<Output = Result<Token, StoreError>> + Send;

    fn get_token_by_session_id(
        &self,
        ctx: &Ctx,
        session_id: &str,
    ) -> impl Future<Output = Result<Token, StoreError>> + Send;

    fn delete_token(
        &self,
        ctx: &Ctx,
        token: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replace `is_active` and `session_id`.
    fn update_token(
        &self,
        ctx: &Ctx,
        token: &Token,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // ── Transactions ─────────────────────────────────────────────────────────

    /// Run `work` inside one transaction.
    ///
    /// Commits when `work` returns `Ok`; otherwise rolls back and returns the
    /// error `work` produced. Begin, commit and rollback failures surface as
    /// the matching `Transaction*` variants. Called on a transaction-scoped
    /// port it nests with the same semantics.
    fn transactional<T, F>(
        &self,
        ctx: &Ctx,
        work: F,
    ) -> impl Future<Output = Result<T, StoreError>> + Send
    where
        T: Send,
        F: for<'t> FnOnce(&'t Ctx, &'t Self::Tx) -> BoxFuture<'t, Result<T, StoreError>> + Send;
}
