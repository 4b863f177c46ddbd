use chrono::Utc;
use futures::future::BoxFuture;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
    sea_query::{Expr, OnConflict, SimpleExpr},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use warden_core::Ctx;
use warden_domain::email::normalize_domain;
use warden_domain::link::LinkType;
use warden_domain::oauth::OAuthResource;
use warden_domain::pagination::PageRequest;
use warden_domain::user::UserRole;
use warden_identity_schema::{accounts, domain_blacklist, links, profiles, tokens, users};

use crate::config::StoreConfig;
use crate::domain::store::IdentityStore;
use crate::domain::types::{Accounts, DomainBlacklistEntry, Link, Profile, Token, User};
use crate::error::{Entity, StoreError};
use crate::infra::secret::generate_secret;
use crate::infra::tx::OpenTx;

/// Relational implementation of [`IdentityStore`].
///
/// `C` is either the pooled [`DatabaseConnection`] or, inside
/// `transactional`, the [`DatabaseTransaction`] owned by the coordinator.
#[derive(Clone)]
pub struct SeaStore<C = DatabaseConnection> {
    conn: C,
}

impl<C> SeaStore<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub(crate) fn into_inner(self) -> C {
        self.conn
    }
}

impl SeaStore<DatabaseConnection> {
    /// Open the connection pool described by `config`.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(config.database_url.clone());
        opt.max_connections(config.db_max_connections)
            .min_connections(config.db_min_connections)
            .connect_timeout(config.connect_timeout())
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(config.idle_timeout())
            .sqlx_logging(config.db_sqlx_logging);

        let conn = Database::connect(opt).await.op("connect")?;

        info!(
            "Identity store connected (pool: {}-{})",
            config.db_min_connections, config.db_max_connections
        );

        Ok(Self { conn })
    }

    /// Close the pool. In-flight operations on clones fail afterwards.
    pub async fn close(self) -> Result<(), StoreError> {
        self.conn.close().await.op("close")?;
        info!("Identity store closed");
        Ok(())
    }
}

// ── Error classification ────────────────────────────────────────────────────

trait DbResultExt<T> {
    fn op(self, op: &'static str) -> Result<T, StoreError>;
}

impl<T> DbResultExt<T> for Result<T, DbErr> {
    fn op(self, op: &'static str) -> Result<T, StoreError> {
        self.map_err(|err| StoreError::from_db(op, err))
    }
}

fn expect_affected(rows_affected: u64, entity: Entity) -> Result<(), StoreError> {
    if rows_affected == 0 {
        return Err(StoreError::NotFound(entity));
    }
    Ok(())
}

// ── Multi-row helpers used inside transactions ──────────────────────────────

impl<C> SeaStore<C>
where
    C: ConnectionTrait + Sync,
{
    async fn set_user_flag(
        &self,
        ctx: &Ctx,
        op: &'static str,
        user_id: Uuid,
        column: users::Column,
    ) -> Result<(), StoreError> {
        let result = ctx
            .run(
                users::Entity::update_many()
                    .col_expr(column, Expr::value(true))
                    .filter(users::Column::Id.eq(user_id))
                    .exec(&self.conn),
            )
            .await?
            .op(op)?;
        expect_affected(result.rows_affected, Entity::User)
    }

    async fn stamp_profile(
        &self,
        ctx: &Ctx,
        op: &'static str,
        user_id: Uuid,
        column: profiles::Column,
    ) -> Result<(), StoreError> {
        ctx.run(
            profiles::Entity::update_many()
                .col_expr(column, Expr::value(Utc::now()))
                .filter(profiles::Column::UserId.eq(user_id))
                .exec(&self.conn),
        )
        .await?
        .op(op)?;
        Ok(())
    }

    async fn deactivate_tokens(&self, ctx: &Ctx, user_id: Uuid) -> Result<(), StoreError> {
        ctx.run(
            tokens::Entity::update_many()
                .col_expr(tokens::Column::IsActive, Expr::value(false))
                .filter(tokens::Column::UserId.eq(user_id))
                .filter(tokens::Column::IsActive.eq(true))
                .exec(&self.conn),
        )
        .await?
        .op("deactivate user tokens")?;
        Ok(())
    }

    async fn deactivate_links(&self, ctx: &Ctx, condition: SimpleExpr) -> Result<(), StoreError> {
        ctx.run(
            links::Entity::update_many()
                .col_expr(links::Column::IsActive, Expr::value(false))
                .filter(condition)
                .filter(links::Column::IsActive.eq(true))
                .exec(&self.conn),
        )
        .await?
        .op("deactivate links")?;
        Ok(())
    }
}

// ── IdentityStore ───────────────────────────────────────────────────────────

impl<C> IdentityStore for SeaStore<C>
where
    C: ConnectionTrait + TransactionTrait + Send + Sync,
{
    type Tx = SeaStore<DatabaseTransaction>;

    async fn get_user_by_login(&self, ctx: &Ctx, login: &str) -> Result<User, StoreError> {
        debug!(login, "get user by login");
        let model = ctx
            .run(
                users::Entity::find()
                    .filter(users::Column::Login.eq(login))
                    .filter(users::Column::IsDeleted.eq(false))
                    .one(&self.conn),
            )
            .await?
            .op("get user by login")?
            .ok_or(StoreError::NotFound(Entity::User))?;
        user_from_model(model)
    }

    async fn get_user_by_id(&self, ctx: &Ctx, id: Uuid) -> Result<User, StoreError> {
        debug!(%id, "get user by id");
        let model = ctx
            .run(users::Entity::find_by_id(id).one(&self.conn))
            .await?
            .op("get user by id")?
            .ok_or(StoreError::NotFound(Entity::User))?;
        user_from_model(model)
    }

    async fn create_user(&self, ctx: &Ctx, user: &mut User) -> Result<(), StoreError> {
        debug!(login = %user.login, "create user");
        let id = Uuid::now_v7();
        let am = users::ActiveModel {
            id: Set(id),
            login: Set(user.login.clone()),
            password_hash: Set(user.password_hash.clone()),
            salt: Set(user.salt.clone()),
            role: Set(user.role.as_str().to_owned()),
            is_active: Set(user.is_active),
            is_deleted: Set(user.is_deleted),
            is_in_blacklist: Set(user.is_in_blacklist),
        };
        ctx.run(am.insert(&self.conn)).await?.op("create user")?;
        user.id = id;
        Ok(())
    }

    async fn update_user(&self, ctx: &Ctx, user: &User) -> Result<(), StoreError> {
        debug!(id = %user.id, "update user");
        let result = ctx
            .run(
                users::Entity::update_many()
                    .set(users::ActiveModel {
                        login: Set(user.login.clone()),
                        password_hash: Set(user.password_hash.clone()),
                        salt: Set(user.salt.clone()),
                        role: Set(user.role.as_str().to_owned()),
                        is_active: Set(user.is_active),
                        is_deleted: Set(user.is_deleted),
                        is_in_blacklist: Set(user.is_in_blacklist),
                        ..Default::default()
                    })
                    .filter(users::Column::Id.eq(user.id))
                    .exec(&self.conn),
            )
            .await?
            .op("update user")?;
        expect_affected(result.rows_affected, Entity::User)
    }

    async fn get_blacklisted_users(
        &self,
        ctx: &Ctx,
        page: PageRequest,
    ) -> Result<Vec<User>, StoreError> {
        let PageRequest { per_page, offset } = page.clamped();
        debug!(per_page, offset, "get blacklisted users");
        let models = ctx
            .run(
                users::Entity::find()
                    .filter(users::Column::IsInBlacklist.eq(true))
                    .order_by_asc(users::Column::Login)
                    .order_by_asc(users::Column::Id)
                    .limit(per_page)
                    .offset(offset)
                    .all(&self.conn),
            )
            .await?
            .op("get blacklisted users")?;
        models.into_iter().map(user_from_model).collect()
    }

    async fn blacklist_user(&self, ctx: &Ctx, user: &mut User) -> Result<(), StoreError> {
        let user_id = user.id;
        debug!(id = %user_id, "blacklist user");
        self.transactional(ctx, move |ctx, tx| {
            Box::pin(async move {
                tx.set_user_flag(ctx, "blacklist user", user_id, users::Column::IsInBlacklist)
                    .await?;
                tx.stamp_profile(
                    ctx,
                    "stamp profile blacklist time",
                    user_id,
                    profiles::Column::BlacklistAt,
                )
                .await?;
                tx.deactivate_tokens(ctx, user_id).await
            })
        })
        .await?;
        user.is_in_blacklist = true;
        Ok(())
    }

    async fn delete_user(&self, ctx: &Ctx, user: &mut User) -> Result<(), StoreError> {
        let user_id = user.id;
        debug!(id = %user_id, "delete user");
        self.transactional(ctx, move |ctx, tx| {
            Box::pin(async move {
                tx.set_user_flag(ctx, "delete user", user_id, users::Column::IsDeleted)
                    .await?;
                tx.stamp_profile(
                    ctx,
                    "stamp profile deletion time",
                    user_id,
                    profiles::Column::DeletedAt,
                )
                .await?;
                tx.deactivate_tokens(ctx, user_id).await?;
                tx.deactivate_links(ctx, links::Column::UserId.eq(user_id))
                    .await
            })
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
        let data = serde_json::to_string(&profile.data)?;
        let id = Uuid::now_v7();
        let created_at = Utc::now();
        let am = profiles::ActiveModel {
            id: Set(id),
            referral: Set(profile.referral.clone()),
            access: Set(profile.access.clone()),
            created_at: Set(created_at),
            blacklist_at: Set(profile.blacklist_at),
            deleted_at: Set(profile.deleted_at),
            user_id: Set(profile.user.id),
            data: Set(data),
        };
        ctx.run(am.insert(&self.conn)).await?.op("create profile")?;
        profile.id = id;
        profile.created_at = created_at;
        Ok(())
    }

    async fn get_profile_by_id<D>(&self, ctx: &Ctx, id: Uuid) -> Result<Profile<D>, StoreError>
    where
        D: DeserializeOwned + Send,
    {
        debug!(%id, "get profile by id");
        let (profile, user) = ctx
            .run(
                profiles::Entity::find_by_id(id)
                    .find_also_related(users::Entity)
                    .one(&self.conn),
            )
            .await?
            .op("get profile by id")?
            .ok_or(StoreError::NotFound(Entity::Profile))?;
        profile_from_model(profile, joined_user(user)?)
    }

    async fn get_profile_by_user<D>(&self, ctx: &Ctx, user: &User) -> Result<Profile<D>, StoreError>
    where
        D: DeserializeOwned + Send,
    {
        debug!(user_id = %user.id, "get profile by user");
        let (profile, user) = ctx
            .run(
                profiles::Entity::find()
                    .filter(profiles::Column::UserId.eq(user.id))
                    .find_also_related(users::Entity)
                    .one(&self.conn),
            )
            .await?
            .op("get profile by user")?
            .ok_or(StoreError::NotFound(Entity::Profile))?;
        profile_from_model(profile, joined_user(user)?)
    }

    async fn update_profile<D>(&self, ctx: &Ctx, profile: &Profile<D>) -> Result<(), StoreError>
    where
        D: Serialize + Send + Sync,
    {
        debug!(id = %profile.id, "update profile");
        let data = serde_json::to_string(&profile.data)?;
        let result = ctx
            .run(
                profiles::Entity::update_many()
                    .set(profiles::ActiveModel {
                        referral: Set(profile.referral.clone()),
                        access: Set(profile.access.clone()),
                        data: Set(data),
                        ..Default::default()
                    })
                    .filter(profiles::Column::Id.eq(profile.id))
                    .exec(&self.conn),
            )
            .await?
            .op("update profile")?;
        expect_affected(result.rows_affected, Entity::Profile)
    }

    async fn get_all_profiles<D>(
        &self,
        ctx: &Ctx,
        page: PageRequest,
    ) -> Result<Vec<Profile<D>>, StoreError>
    where
        D: DeserializeOwned + Send,
    {
        let PageRequest { per_page, offset } = page.clamped();
        debug!(per_page, offset, "get all profiles");
        let rows = ctx
            .run(
                profiles::Entity::find()
                    .find_also_related(users::Entity)
                    .order_by_asc(profiles::Column::CreatedAt)
                    .order_by_asc(profiles::Column::Id)
                    .limit(per_page)
                    .offset(offset)
                    .all(&self.conn),
            )
            .await?
            .op("get all profiles")?;
        rows.into_iter()
            .map(|(profile, user)| profile_from_model(profile, joined_user(user)?))
            .collect()
    }

    async fn get_user_by_bound_account(
        &self,
        ctx: &Ctx,
        provider: OAuthResource,
        account_id: &str,
    ) -> Result<User, StoreError> {
        debug!(%provider, account_id, "get user by bound account");
        let (_, user) = ctx
            .run(
                accounts::Entity::find()
                    .filter(provider_column(provider).eq(account_id))
                    .find_also_related(users::Entity)
                    .one(&self.conn),
            )
            .await?
            .op("get user by bound account")?
            .ok_or(StoreError::NotFound(Entity::User))?;
        joined_user(user)
    }

    async fn get_user_bound_accounts(&self, ctx: &Ctx, user: &User) -> Result<Accounts, StoreError> {
        debug!(user_id = %user.id, "get user bound accounts");
        let model = ctx
            .run(
                accounts::Entity::find()
                    .filter(accounts::Column::UserId.eq(user.id))
                    .one(&self.conn),
            )
            .await?
            .op("get user bound accounts")?
            .ok_or(StoreError::NotFound(Entity::Accounts))?;
        Ok(Accounts {
            id: model.id,
            github: model.github,
            facebook: model.facebook,
            google: model.google,
            user: user.clone(),
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
        let mut am = accounts::ActiveModel {
            id: Set(Uuid::now_v7()),
            user_id: Set(user.id),
            github: Set(None),
            facebook: Set(None),
            google: Set(None),
        };
        let bound = Set(Some(account_id.to_owned()));
        match provider {
            OAuthResource::Github => am.github = bound,
            OAuthResource::Facebook => am.facebook = bound,
            OAuthResource::Google => am.google = bound,
        }
        ctx.run(
            accounts::Entity::insert(am)
                .on_conflict(
                    OnConflict::column(accounts::Column::UserId)
                        .update_column(provider_column(provider))
                        .to_owned(),
                )
                .exec_without_returning(&self.conn),
        )
        .await?
        .op("bind account")?;
        Ok(())
    }

    async fn blacklist_domain(&self, ctx: &Ctx, domain: &str) -> Result<(), StoreError> {
        let domain = normalize_domain(domain);
        debug!(%domain, "blacklist domain");
        ctx.run(
            domain_blacklist::Entity::insert(domain_blacklist::ActiveModel {
                domain: Set(domain),
                created_at: Set(Utc::now()),
            })
            .on_conflict(
                OnConflict::column(domain_blacklist::Column::Domain)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.conn),
        )
        .await?
        .op("blacklist domain")?;
        Ok(())
    }

    async fn unblacklist_domain(&self, ctx: &Ctx, domain: &str) -> Result<(), StoreError> {
        let domain = normalize_domain(domain);
        debug!(%domain, "unblacklist domain");
        let result = ctx
            .run(domain_blacklist::Entity::delete_by_id(domain).exec(&self.conn))
            .await?
            .op("unblacklist domain")?;
        expect_affected(result.rows_affected, Entity::BlacklistedDomain)
    }

    async fn is_domain_blacklisted(&self, ctx: &Ctx, domain: &str) -> Result<bool, StoreError> {
        let domain = normalize_domain(domain);
        debug!(%domain, "is domain blacklisted");
        let model = ctx
            .run(domain_blacklist::Entity::find_by_id(domain).one(&self.conn))
            .await?
            .op("is domain blacklisted")?;
        Ok(model.is_some())
    }

    async fn get_blacklisted_domains(
        &self,
        ctx: &Ctx,
        page: PageRequest,
    ) -> Result<Vec<DomainBlacklistEntry>, StoreError> {
        let PageRequest { per_page, offset } = page.clamped();
        debug!(per_page, offset, "get blacklisted domains");
        let models = ctx
            .run(
                domain_blacklist::Entity::find()
                    .order_by_asc(domain_blacklist::Column::Domain)
                    .limit(per_page)
                    .offset(offset)
                    .all(&self.conn),
            )
            .await?
            .op("get blacklisted domains")?;
        Ok(models
            .into_iter()
            .map(|m| DomainBlacklistEntry {
                domain: m.domain,
                created_at: m.created_at,
            })
            .collect())
    }

    async fn create_link(
        &self,
        ctx: &Ctx,
        kind: LinkType,
        lifetime: chrono::Duration,
        user: &User,
    ) -> Result<Link, StoreError> {
        debug!(user_id = %user.id, %kind, "create link");
        let user = user.clone();
        self.transactional(ctx, move |ctx, tx| {
            Box::pin(async move {
                tx.deactivate_links(
                    ctx,
                    links::Column::UserId
                        .eq(user.id)
                        .and(links::Column::LinkType.eq(kind.as_str())),
                )
                .await?;

                let now = Utc::now();
                let link = Link {
                    link: generate_secret(),
                    kind,
                    created_at: now,
                    expired_at: now + lifetime,
                    is_active: true,
                    sent_at: None,
                    user,
                };
                let am = links::ActiveModel {
                    link: Set(link.link.clone()),
                    link_type: Set(kind.as_str().to_owned()),
                    created_at: Set(link.created_at),
                    expired_at: Set(link.expired_at),
                    is_active: Set(true),
                    sent_at: Set(None),
                    user_id: Set(link.user.id),
                };
                ctx.run(am.insert(&tx.conn)).await?.op("create link")?;
                Ok(link)
            })
        })
        .await
    }

    async fn get_link_for_user(
        &self,
        ctx: &Ctx,
        kind: LinkType,
        user: &User,
    ) -> Result<Link, StoreError> {
        debug!(user_id = %user.id, %kind, "get link for user");
        let (link, user) = ctx
            .run(
                links::Entity::find()
                    .filter(links::Column::UserId.eq(user.id))
                    .filter(links::Column::LinkType.eq(kind.as_str()))
                    .filter(links::Column::IsActive.eq(true))
                    .filter(links::Column::ExpiredAt.gt(Utc::now()))
                    .order_by_desc(links::Column::CreatedAt)
                    .find_also_related(users::Entity)
                    .one(&self.conn),
            )
            .await?
            .op("get link for user")?
            .ok_or(StoreError::NotFound(Entity::Link))?;
        link_from_model(link, joined_user(user)?)
    }

    async fn get_link_from_string(&self, ctx: &Ctx, link: &str) -> Result<Link, StoreError> {
        debug!("get link from string");
        let (link, user) = ctx
            .run(
                links::Entity::find_by_id(link.to_owned())
                    .filter(links::Column::IsActive.eq(true))
                    .filter(links::Column::ExpiredAt.gt(Utc::now()))
                    .find_also_related(users::Entity)
                    .one(&self.conn),
            )
            .await?
            .op("get link from string")?
            .ok_or(StoreError::NotFound(Entity::Link))?;
        link_from_model(link, joined_user(user)?)
    }

    async fn update_link(&self, ctx: &Ctx, link: &Link) -> Result<(), StoreError> {
        debug!(user_id = %link.user.id, kind = %link.kind, "update link");
        let result = ctx
            .run(
                links::Entity::update_many()
                    .set(links::ActiveModel {
                        is_active: Set(link.is_active),
                        expired_at: Set(link.expired_at),
                        sent_at: Set(link.sent_at),
                        ..Default::default()
                    })
                    .filter(links::Column::Link.eq(link.link.as_str()))
                    .exec(&self.conn),
            )
            .await?
            .op("update link")?;
        expect_affected(result.rows_affected, Entity::Link)
    }

    async fn get_user_links(&self, ctx: &Ctx, user: &User) -> Result<Vec<Link>, StoreError> {
        debug!(user_id = %user.id, "get user links");
        let models = ctx
            .run(
                links::Entity::find()
                    .filter(links::Column::UserId.eq(user.id))
                    .order_by_desc(links::Column::CreatedAt)
                    .all(&self.conn),
            )
            .await?
            .op("get user links")?;
        models
            .into_iter()
            .map(|m| link_from_model(m, user.clone()))
            .collect()
    }

    async fn get_token_object(&self, ctx: &Ctx, token: &str) -> Result<Token, StoreError> {
        debug!("get token object");
        let (token, user) = ctx
            .run(
                tokens::Entity::find_by_id(token.to_owned())
                    .filter(tokens::Column::IsActive.eq(true))
                    .find_also_related(users::Entity)
                    .one(&self.conn),
            )
            .await?
            .op("get token object")?
            .ok_or(StoreError::NotFound(Entity::Token))?;
        Ok(token_from_model(token, joined_user(user)?))
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
        ctx.run(
            tokens::Entity::insert(tokens::ActiveModel {
                token: Set(token.token.clone()),
                created_at: Set(token.created_at),
                is_active: Set(true),
                session_id: Set(token.session_id.clone()),
                user_id: Set(user.id),
            })
            .on_conflict(
                OnConflict::column(tokens::Column::SessionId)
                    .update_columns([
                        tokens::Column::Token,
                        tokens::Column::CreatedAt,
                        tokens::Column::IsActive,
                        tokens::Column::UserId,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.conn),
        )
        .await?
        .op("create token")?;
        Ok(token)
    }

    async fn get_token_by_session_id(
        &self,
        ctx: &Ctx,
        session_id: &str,
    ) -> Result<Token, StoreError> {
        debug!(session_id, "get token by session id");
        let (token, user) = ctx
            .run(
                tokens::Entity::find()
                    .filter(tokens::Column::SessionId.eq(session_id))
                    .filter(tokens::Column::IsActive.eq(true))
                    .find_also_related(users::Entity)
                    .one(&self.conn),
            )
            .await?
            .op("get token by session id")?
            .ok_or(StoreError::NotFound(Entity::Token))?;
        Ok(token_from_model(token, joined_user(user)?))
    }

    async fn delete_token(&self, ctx: &Ctx, token: &str) -> Result<(), StoreError> {
        debug!("delete token");
        let result = ctx
            .run(tokens::Entity::delete_by_id(token.to_owned()).exec(&self.conn))
            .await?
            .op("delete token")?;
        expect_affected(result.rows_affected, Entity::Token)
    }

    async fn update_token(&self, ctx: &Ctx, token: &Token) -> Result<(), StoreError> {
        debug!(session_id = %token.session_id, "update token");
        let result = ctx
            .run(
                tokens::Entity::update_many()
                    .set(tokens::ActiveModel {
                        is_active: Set(token.is_active),
                        session_id: Set(token.session_id.clone()),
                        ..Default::default()
                    })
                    .filter(tokens::Column::Token.eq(token.token.as_str()))
                    .exec(&self.conn),
            )
            .await?
            .op("update token")?;
        expect_affected(result.rows_affected, Entity::Token)
    }

    async fn transactional<T, F>(&self, ctx: &Ctx, work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t Ctx, &'t Self::Tx) -> BoxFuture<'t, Result<T, StoreError>> + Send,
    {
        let tx = OpenTx::begin(&self.conn, ctx).await?;
        let outcome = work(ctx, tx.store()).await;
        tx.settle(outcome).await
    }
}

// ── Row mapping ─────────────────────────────────────────────────────────────

fn user_from_model(model: users::Model) -> Result<User, StoreError> {
    let role = model
        .role
        .parse::<UserRole>()
        .map_err(|err| StoreError::invalid_row(Entity::User, err))?;
    Ok(User {
        id: model.id,
        login: model.login,
        password_hash: model.password_hash,
        salt: model.salt,
        role,
        is_active: model.is_active,
        is_deleted: model.is_deleted,
        is_in_blacklist: model.is_in_blacklist,
    })
}

/// The user half of a `find_also_related` row. Foreign keys make a missing
/// user impossible unless the row was deleted out of band.
fn joined_user(model: Option<users::Model>) -> Result<User, StoreError> {
    model
        .ok_or(StoreError::NotFound(Entity::User))
        .and_then(user_from_model)
}

fn profile_from_model<D>(model: profiles::Model, user: User) -> Result<Profile<D>, StoreError>
where
    D: DeserializeOwned,
{
    Ok(Profile {
        id: model.id,
        referral: model.referral,
        access: model.access,
        created_at: model.created_at,
        blacklist_at: model.blacklist_at,
        deleted_at: model.deleted_at,
        user,
        data: serde_json::from_str(&model.data)?,
    })
}

fn link_from_model(model: links::Model, user: User) -> Result<Link, StoreError> {
    let kind = model
        .link_type
        .parse::<LinkType>()
        .map_err(|err| StoreError::invalid_row(Entity::Link, err))?;
    Ok(Link {
        link: model.link,
        kind,
        created_at: model.created_at,
        expired_at: model.expired_at,
        is_active: model.is_active,
        sent_at: model.sent_at,
        user,
    })
}

fn token_from_model(model: tokens::Model, user: User) -> Token {
    Token {
        token: model.token,
        created_at: model.created_at,
        is_active: model.is_active,
        session_id: model.session_id,
        user,
    }
}

fn provider_column(provider: OAuthResource) -> accounts::Column {
    match provider {
        OAuthResource::Github => accounts::Column::Github,
        OAuthResource::Facebook => accounts::Column::Facebook,
        OAuthResource::Google => accounts::Column::Google,
    }
}
