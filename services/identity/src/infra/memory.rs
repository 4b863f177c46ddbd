//! In-process [`IdentityStore`] with the same constraints as the relational
//! backend. Handy as a fake for callers and as a second implementation the
//! store's contract tests run against.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use warden_core::Ctx;
use warden_domain::email::normalize_domain;
use warden_domain::link::LinkType;
use warden_domain::oauth::OAuthResource;
use warden_domain::pagination::PageRequest;

use crate::domain::store::IdentityStore;
use crate::domain::types::{Accounts, DomainBlacklistEntry, Link, Profile, Token, User};
use crate::error::{Entity, StoreError};
use crate::infra::secret::generate_secret;

#[derive(Debug, Clone)]
struct ProfileRow {
    id: Uuid,
    referral: String,
    access: String,
    created_at: DateTime<Utc>,
    blacklist_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    user_id: Uuid,
    data: String,
}

#[derive(Debug, Clone)]
struct AccountsRow {
    id: Uuid,
    github: Option<String>,
    facebook: Option<String>,
    google: Option<String>,
}

impl AccountsRow {
    fn slot(&mut self, provider: OAuthResource) -> &mut Option<String> {
        match provider {
            OAuthResource::Github => &mut self.github,
            OAuthResource::Facebook => &mut self.facebook,
            OAuthResource::Google => &mut self.google,
        }
    }

    fn get(&self, provider: OAuthResource) -> Option<&str> {
        match provider {
            OAuthResource::Github => self.github.as_deref(),
            OAuthResource::Facebook => self.facebook.as_deref(),
            OAuthResource::Google => self.google.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
struct LinkRow {
    kind: LinkType,
    created_at: DateTime<Utc>,
    expired_at: DateTime<Utc>,
    is_active: bool,
    sent_at: Option<DateTime<Utc>>,
    user_id: Uuid,
}

#[derive(Debug, Clone)]
struct TokenRow {
    created_at: DateTime<Utc>,
    is_active: bool,
    session_id: String,
    user_id: Uuid,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<Uuid, User>,
    profiles: BTreeMap<Uuid, ProfileRow>,
    /// Keyed by user id.
    accounts: BTreeMap<Uuid, AccountsRow>,
    links: BTreeMap<String, LinkRow>,
    tokens: BTreeMap<String, TokenRow>,
    domains: BTreeMap<String, DateTime<Utc>>,
}

impl Tables {
    fn user(&self, id: Uuid) -> Result<&User, StoreError> {
        self.users.get(&id).ok_or(StoreError::NotFound(Entity::User))
    }

    fn require_user(&self, op: &'static str, id: Uuid) -> Result<(), StoreError> {
        if self.users.contains_key(&id) {
            return Ok(());
        }
        Err(StoreError::ConstraintViolation {
            op,
            detail: format!("user {id} does not exist"),
        })
    }

    fn check_login_free(
        &self,
        op: &'static str,
        login: &str,
        except: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let taken = self
            .users
            .values()
            .any(|u| !u.is_deleted && u.login == login && Some(u.id) != except);
        if taken {
            return Err(StoreError::ConstraintViolation {
                op,
                detail: format!("login `{login}` is taken"),
            });
        }
        Ok(())
    }

    fn profile<D: DeserializeOwned>(&self, row: &ProfileRow) -> Result<Profile<D>, StoreError> {
        Ok(Profile {
            id: row.id,
            referral: row.referral.clone(),
            access: row.access.clone(),
            created_at: row.created_at,
            blacklist_at: row.blacklist_at,
            deleted_at: row.deleted_at,
            user: self.user(row.user_id)?.clone(),
            data: serde_json::from_str(&row.data)?,
        })
    }

    fn link(&self, link: &str, row: &LinkRow) -> Result<Link, StoreError> {
        Ok(Link {
            link: link.to_owned(),
            kind: row.kind,
            created_at: row.created_at,
            expired_at: row.expired_at,
            is_active: row.is_active,
            sent_at: row.sent_at,
            user: self.user(row.user_id)?.clone(),
        })
    }

    fn token(&self, token: &str, row: &TokenRow) -> Result<Token, StoreError> {
        Ok(Token {
            token: token.to_owned(),
            created_at: row.created_at,
            is_active: row.is_active,
            session_id: row.session_id.clone(),
            user: self.user(row.user_id)?.clone(),
        })
    }

    fn deactivate_tokens(&mut self, user_id: Uuid) {
        self.tokens
            .values_mut()
            .filter(|t| t.user_id == user_id)
            .for_each(|t| t.is_active = false);
    }

    fn deactivate_links(&mut self, user_id: Uuid, kind: Option<LinkType>) {
        self.links
            .values_mut()
            .filter(|l| l.user_id == user_id && kind.is_none_or(|k| l.kind == k))
            .for_each(|l| l.is_active = false);
    }
}

/// Identity store held in process memory.
///
/// Writers are serialized through an async gate. A transaction holds the gate
/// until it settles and works on a snapshot of the tables that replaces the
/// shared tables on commit and is dropped on rollback.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(
        &self,
        ctx: &Ctx,
        f: impl FnOnce(&Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        ctx.check()?;
        f(&self.tables())
    }

    async fn write<T>(
        &self,
        ctx: &Ctx,
        f: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        ctx.check()?;
        let _gate = ctx.run(self.gate.lock()).await?;
        let mut tables = self.tables();
        f(&mut tables)
    }
}

fn page_of<T>(items: impl Iterator<Item = T>, page: PageRequest) -> impl Iterator<Item = T> {
    let PageRequest { per_page, offset } = page.clamped();
    items
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(per_page).unwrap_or(usize::MAX))
}

impl IdentityStore for MemoryStore {
    type Tx = MemoryStore;

    async fn get_user_by_login(&self, ctx: &Ctx, login: &str) -> Result<User, StoreError> {
        debug!(login, "get user by login");
        self.read(ctx, |t| {
            t.users
                .values()
                .find(|u| !u.is_deleted && u.login == login)
                .cloned()
                .ok_or(StoreError::NotFound(Entity::User))
        })
    }

    async fn get_user_by_id(&self, ctx: &Ctx, id: Uuid) -> Result<User, StoreError> {
        debug!(%id, "get user by id");
        self.read(ctx, |t| t.user(id).cloned())
    }

    async fn create_user(&self, ctx: &Ctx, user: &mut User) -> Result<(), StoreError> {
        debug!(login = %user.login, "create user");
        let id = Uuid::now_v7();
        let row = User { id, ..user.clone() };
        self.write(ctx, |t| {
            if !row.is_deleted {
                t.check_login_free("create user", &row.login, None)?;
            }
            t.users.insert(id, row);
            Ok(())
        })
        .await?;
        user.id = id;
        Ok(())
    }

    async fn update_user(&self, ctx: &Ctx, user: &User) -> Result<(), StoreError> {
        debug!(id = %user.id, "update user");
        self.write(ctx, |t| {
            t.user(user.id)?;
            if !user.is_deleted {
                t.check_login_free("update user", &user.login, Some(user.id))?;
            }
            t.users.insert(user.id, user.clone());
            Ok(())
        })
        .await
    }

    async fn get_blacklisted_users(
        &self,
        ctx: &Ctx,
        page: PageRequest,
    ) -> Result<Vec<User>, StoreError> {
        debug!(?page, "get blacklisted users");
        self.read(ctx, |t| {
            let mut users: Vec<&User> = t.users.values().filter(|u| u.is_in_blacklist).collect();
            users.sort_by(|a, b| a.login.cmp(&b.login).then(a.id.cmp(&b.id)));
            Ok(page_of(users.into_iter(), page).cloned().collect())
        })
    }

    async fn blacklist_user(&self, ctx: &Ctx, user: &mut User) -> Result<(), StoreError> {
        let user_id = user.id;
        debug!(id = %user_id, "blacklist user");
        self.write(ctx, |t| {
            let row = t
                .users
                .get_mut(&user_id)
                .ok_or(StoreError::NotFound(Entity::User))?;
            row.is_in_blacklist = true;
            let now = Utc::now();
            t.profiles
                .values_mut()
                .filter(|p| p.user_id == user_id)
                .for_each(|p| p.blacklist_at = Some(now));
            t.deactivate_tokens(user_id);
            Ok(())
        })
        .await?;
        user.is_in_blacklist = true;
        Ok(())
    }

    async fn delete_user(&self, ctx: &Ctx, user: &mut User) -> Result<(), StoreError> {
        let user_id = user.id;
        debug!(id = %user_id, "delete user");
        self.write(ctx, |t| {
            let row = t
                .users
                .get_mut(&user_id)
                .ok_or(StoreError::NotFound(Entity::User))?;
            row.is_deleted = true;
            let now = Utc::now();
            t.profiles
                .values_mut()
                .filter(|p| p.user_id == user_id)
                .for_each(|p| p.deleted_at = Some(now));
            t.deactivate_tokens(user_id);
            t.deactivate_links(user_id, None);
            Ok(())
        })
        .await?;
        user.is_deleted = true;
        Ok(())
    }

    async fn create_profile<D>(&self, ctx: &Ctx, profile: &mut Profile<D>) -> Result<(), StoreError>
    where
        D: Serialize + Send + Sync,
    {
        debug!(user_id = %profile.user.id, "create profile");
        let row = ProfileRow {
            id: Uuid::now_v7(),
            referral: profile.referral.clone(),
            access: profile.access.clone(),
            created_at: Utc::now(),
            blacklist_at: profile.blacklist_at,
            deleted_at: profile.deleted_at,
            user_id: profile.user.id,
            data: serde_json::to_string(&profile.data)?,
        };
        let (id, created_at) = (row.id, row.created_at);
        self.write(ctx, |t| {
            t.require_user("create profile", row.user_id)?;
            if t.profiles.values().any(|p| p.user_id == row.user_id) {
                return Err(StoreError::ConstraintViolation {
                    op: "create profile",
                    detail: format!("user {} already has a profile", row.user_id),
                });
            }
            t.profiles.insert(row.id, row);
            Ok(())
        })
        .await?;
        profile.id = id;
        profile.created_at = created_at;
        Ok(())
    }

    async fn get_profile_by_id<D>(&self, ctx: &Ctx, id: Uuid) -> Result<Profile<D>, StoreError>
    where
        D: DeserializeOwned + Send,
    {
        debug!(%id, "get profile by id");
        self.read(ctx, |t| {
            let row = t
                .profiles
                .get(&id)
                .ok_or(StoreError::NotFound(Entity::Profile))?;
            t.profile(row)
        })
    }

    async fn get_profile_by_user<D>(&self, ctx: &Ctx, user: &User) -> Result<Profile<D>, StoreError>
    where
        D: DeserializeOwned + Send,
    {
        debug!(user_id = %user.id, "get profile by user");
        self.read(ctx, |t| {
            let row = t
                .profiles
                .values()
                .find(|p| p.user_id == user.id)
                .ok_or(StoreError::NotFound(Entity::Profile))?;
            t.profile(row)
        })
    }

    async fn update_profile<D>(&self, ctx: &Ctx, profile: &Profile<D>) -> Result<(), StoreError>
    where
        D: Serialize + Send + Sync,
    {
        debug!(id = %profile.id, "update profile");
        let data = serde_json::to_string(&profile.data)?;
        self.write(ctx, |t| {
            let row = t
                .profiles
                .get_mut(&profile.id)
                .ok_or(StoreError::NotFound(Entity::Profile))?;
            row.referral = profile.referral.clone();
            row.access = profile.access.clone();
            row.data = data;
            Ok(())
        })
        .await
    }

    async fn get_all_profiles<D>(
        &self,
        ctx: &Ctx,
        page: PageRequest,
    ) -> Result<Vec<Profile<D>>, StoreError>
    where
        D: DeserializeOwned + Send,
    {
        debug!(?page, "get all profiles");
        self.read(ctx, |t| {
            let mut rows: Vec<&ProfileRow> = t.profiles.values().collect();
            rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            page_of(rows.into_iter(), page)
                .map(|row| t.profile(row))
                .collect()
        })
    }

    async fn get_user_by_bound_account(
        &self,
        ctx: &Ctx,
        provider: OAuthResource,
        account_id: &str,
    ) -> Result<User, StoreError> {
        debug!(%provider, account_id, "get user by bound account");
        self.read(ctx, |t| {
            let (user_id, _) = t
                .accounts
                .iter()
                .find(|(_, a)| a.get(provider) == Some(account_id))
                .ok_or(StoreError::NotFound(Entity::User))?;
            t.user(*user_id).cloned()
        })
    }

    async fn get_user_bound_accounts(&self, ctx: &Ctx, user: &User) -> Result<Accounts, StoreError> {
        debug!(user_id = %user.id, "get user bound accounts");
        self.read(ctx, |t| {
            let row = t
                .accounts
                .get(&user.id)
                .ok_or(StoreError::NotFound(Entity::Accounts))?;
            Ok(Accounts {
                id: row.id,
                github: row.github.clone(),
                facebook: row.facebook.clone(),
                google: row.google.clone(),
                user: user.clone(),
            })
        })
    }

    async fn bind_account(
        &self,
        ctx: &Ctx,
        user: &User,
        provider: OAuthResource,
        account_id: &str,
    ) -> Result<(), StoreError> {
        debug!(user_id = %user.id, %provider, "bind account");
        self.write(ctx, |t| {
            t.require_user("bind account", user.id)?;
            let taken = t
                .accounts
                .iter()
                .any(|(owner, a)| *owner != user.id && a.get(provider) == Some(account_id));
            if taken {
                return Err(StoreError::ConstraintViolation {
                    op: "bind account",
                    detail: format!("{provider} account is bound to another user"),
                });
            }
            let row = t.accounts.entry(user.id).or_insert_with(|| AccountsRow {
                id: Uuid::now_v7(),
                github: None,
                facebook: None,
                google: None,
            });
            *row.slot(provider) = Some(account_id.to_owned());
            Ok(())
        })
        .await
    }

    async fn blacklist_domain(&self, ctx: &Ctx, domain: &str) -> Result<(), StoreError> {
        let domain = normalize_domain(domain);
        debug!(%domain, "blacklist domain");
        self.write(ctx, |t| {
            t.domains.entry(domain).or_insert_with(Utc::now);
            Ok(())
        })
        .await
    }

    async fn unblacklist_domain(&self, ctx: &Ctx, domain: &str) -> Result<(), StoreError> {
        let domain = normalize_domain(domain);
        debug!(%domain, "unblacklist domain");
        self.write(ctx, |t| {
            t.domains
                .remove(&domain)
                .map(drop)
                .ok_or(StoreError::NotFound(Entity::BlacklistedDomain))
        })
        .await
    }

    async fn is_domain_blacklisted(&self, ctx: &Ctx, domain: &str) -> Result<bool, StoreError> {
        let domain = normalize_domain(domain);
        debug!(%domain, "is domain blacklisted");
        self.read(ctx, |t| Ok(t.domains.contains_key(&domain)))
    }

    async fn get_blacklisted_domains(
        &self,
        ctx: &Ctx,
        page: PageRequest,
    ) -> Result<Vec<DomainBlacklistEntry>, StoreError> {
        debug!(?page, "get blacklisted domains");
        self.read(ctx, |t| {
            Ok(page_of(t.domains.iter(), page)
                .map(|(domain, created_at)| DomainBlacklistEntry {
                    domain: domain.clone(),
                    created_at: *created_at,
                })
                .collect())
        })
    }

    async fn create_link(
        &self,
        ctx: &Ctx,
        kind: LinkType,
        lifetime: chrono::Duration,
        user: &User,
    ) -> Result<Link, StoreError> {
        debug!(user_id = %user.id, %kind, "create link");
        let now = Utc::now();
        let link = Link {
            link: generate_secret(),
            kind,
            created_at: now,
            expired_at: now + lifetime,
            is_active: true,
            sent_at: None,
            user: user.clone(),
        };
        self.write(ctx, |t| {
            t.require_user("create link", user.id)?;
            t.deactivate_links(user.id, Some(kind));
            t.links.insert(
                link.link.clone(),
                LinkRow {
                    kind,
                    created_at: link.created_at,
                    expired_at: link.expired_at,
                    is_active: true,
                    sent_at: None,
                    user_id: user.id,
                },
            );
            Ok(())
        })
        .await?;
        Ok(link)
    }

    async fn get_link_for_user(
        &self,
        ctx: &Ctx,
        kind: LinkType,
        user: &User,
    ) -> Result<Link, StoreError> {
        debug!(user_id = %user.id, %kind, "get link for user");
        let now = Utc::now();
        self.read(ctx, |t| {
            let (link, row) = t
                .links
                .iter()
                .filter(|(_, l)| {
                    l.user_id == user.id && l.kind == kind && l.is_active && now < l.expired_at
                })
                .max_by_key(|(_, l)| l.created_at)
                .ok_or(StoreError::NotFound(Entity::Link))?;
            t.link(link, row)
        })
    }

    async fn get_link_from_string(&self, ctx: &Ctx, link: &str) -> Result<Link, StoreError> {
        debug!("get link from string");
        let now = Utc::now();
        self.read(ctx, |t| {
            let row = t
                .links
                .get(link)
                .filter(|l| l.is_active && now < l.expired_at)
                .ok_or(StoreError::NotFound(Entity::Link))?;
            t.link(link, row)
        })
    }

    async fn update_link(&self, ctx: &Ctx, link: &Link) -> Result<(), StoreError> {
        debug!(user_id = %link.user.id, kind = %link.kind, "update link");
        self.write(ctx, |t| {
            let (user_id, kind) = t
                .links
                .get(&link.link)
                .map(|row| (row.user_id, row.kind))
                .ok_or(StoreError::NotFound(Entity::Link))?;
            if link.is_active && has_other_active_link(&t.links, &link.link, user_id, kind) {
                return Err(StoreError::ConstraintViolation {
                    op: "update link",
                    detail: format!("user {user_id} already has an active {kind} link"),
                });
            }
            let row = t
                .links
                .get_mut(&link.link)
                .ok_or(StoreError::NotFound(Entity::Link))?;
            row.is_active = link.is_active;
            row.expired_at = link.expired_at;
            row.sent_at = link.sent_at;
            Ok(())
        })
        .await
    }

    async fn get_user_links(&self, ctx: &Ctx, user: &User) -> Result<Vec<Link>, StoreError> {
        debug!(user_id = %user.id, "get user links");
        self.read(ctx, |t| {
            let mut links: Vec<(&String, &LinkRow)> =
                t.links.iter().filter(|(_, l)| l.user_id == user.id).collect();
            links.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
            links.into_iter().map(|(link, row)| t.link(link, row)).collect()
        })
    }

    async fn get_token_object(&self, ctx: &Ctx, token: &str) -> Result<Token, StoreError> {
        debug!("get token object");
        self.read(ctx, |t| {
            let row = t
                .tokens
                .get(token)
                .filter(|row| row.is_active)
                .ok_or(StoreError::NotFound(Entity::Token))?;
            t.token(token, row)
        })
    }

    async fn create_token(
        &self,
        ctx: &Ctx,
        user: &User,
        session_id: &str,
    ) -> Result<Token, StoreError> {
        debug!(user_id = %user.id, session_id, "create token");
        let token = Token {
            token: generate_secret(),
            created_at: Utc::now(),
            is_active: true,
            session_id: session_id.to_owned(),
            user: user.clone(),
        };
        self.write(ctx, |t| {
            t.require_user("create token", user.id)?;
            t.tokens.retain(|_, row| row.session_id != session_id);
            t.tokens.insert(
                token.token.clone(),
                TokenRow {
                    created_at: token.created_at,
                    is_active: true,
                    session_id: token.session_id.clone(),
                    user_id: user.id,
                },
            );
            Ok(())
        })
        .await?;
        Ok(token)
    }

    async fn get_token_by_session_id(
        &self,
        ctx: &Ctx,
        session_id: &str,
    ) -> Result<Token, StoreError> {
        debug!(session_id, "get token by session id");
        self.read(ctx, |t| {
            let (token, row) = t
                .tokens
                .iter()
                .find(|(_, row)| row.session_id == session_id && row.is_active)
                .ok_or(StoreError::NotFound(Entity::Token))?;
            t.token(token, row)
        })
    }

    async fn delete_token(&self, ctx: &Ctx, token: &str) -> Result<(), StoreError> {
        debug!("delete token");
        self.write(ctx, |t| {
            t.tokens
                .remove(token)
                .map(drop)
                .ok_or(StoreError::NotFound(Entity::Token))
        })
        .await
    }

    async fn update_token(&self, ctx: &Ctx, token: &Token) -> Result<(), StoreError> {
        debug!(session_id = %token.session_id, "update token");
        self.write(ctx, |t| {
            let clash = t
                .tokens
                .iter()
                .any(|(key, row)| *key != token.token && row.session_id == token.session_id);
            let row = t
                .tokens
                .get_mut(&token.token)
                .ok_or(StoreError::NotFound(Entity::Token))?;
            if clash {
                return Err(StoreError::ConstraintViolation {
                    op: "update token",
                    detail: format!("session `{}` already has a token", token.session_id),
                });
            }
            row.is_active = token.is_active;
            row.session_id = token.session_id.clone();
            Ok(())
        })
        .await
    }

    async fn transactional<T, F>(&self, ctx: &Ctx, work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t Ctx, &'t Self::Tx) -> BoxFuture<'t, Result<T, StoreError>> + Send,
    {
        let _gate = ctx.run(self.gate.lock()).await?;
        let snapshot = self.tables().clone();
        let tx = MemoryStore {
            tables: Arc::new(Mutex::new(snapshot)),
            gate: Arc::default(),
        };
        debug!("transaction begun");

        let value = match work(ctx, &tx).await {
            Ok(value) => value,
            Err(err) => {
                debug!(reason = %err, "transaction rolled back");
                return Err(err);
            }
        };
        let committed = std::mem::take(&mut *tx.tables());
        *self.tables() = committed;
        debug!("transaction committed");
        Ok(value)
    }
}

fn has_other_active_link(
    links: &BTreeMap<String, LinkRow>,
    except: &str,
    user_id: Uuid,
    kind: LinkType,
) -> bool {
    links
        .iter()
        .any(|(key, l)| key != except && l.user_id == user_id && l.kind == kind && l.is_active)
}
