use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use warden_domain::link::LinkType;
use warden_domain::oauth::OAuthResource;
use warden_domain::user::UserRole;

/// Default free-form profile document: a string-keyed JSON map.
pub type ProfileData = BTreeMap<String, serde_json::Value>;

/// Registered user. Never physically deleted; soft state lives in the flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    /// Opaque to the store; hashing is the caller's concern.
    pub password_hash: String,
    pub salt: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_deleted: bool,
    pub is_in_blacklist: bool,
}

impl User {
    /// Unsaved, not yet activated user. `create_user` assigns the id.
    pub fn new(
        login: impl Into<String>,
        password_hash: impl Into<String>,
        salt: impl Into<String>,
        role: UserRole,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            login: login.into(),
            password_hash: password_hash.into(),
            salt: salt.into(),
            role,
            is_active: false,
            is_deleted: false,
            is_in_blacklist: false,
        }
    }

    pub fn can_authenticate(&self) -> bool {
        self.is_active && !self.is_deleted && !self.is_in_blacklist
    }
}

/// Profile metadata, exactly one per user.
///
/// `data` is whatever document the caller keeps on the profile. The store
/// encodes it as JSON at the storage boundary and never inspects it.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile<D = ProfileData> {
    pub id: Uuid,
    pub referral: String,
    pub access: String,
    pub created_at: DateTime<Utc>,
    pub blacklist_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub user: User,
    pub data: D,
}

impl<D> Profile<D> {
    /// Unsaved profile. `create_profile` overwrites `id` and `created_at`.
    pub fn new(user: User, referral: impl Into<String>, access: impl Into<String>, data: D) -> Self {
        Self {
            id: Uuid::nil(),
            referral: referral.into(),
            access: access.into(),
            created_at: Utc::now(),
            blacklist_at: None,
            deleted_at: None,
            user,
            data,
        }
    }
}

/// OAuth bindings of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accounts {
    pub id: Uuid,
    pub github: Option<String>,
    pub facebook: Option<String>,
    pub google: Option<String>,
    pub user: User,
}

impl Accounts {
    pub fn account(&self, provider: OAuthResource) -> Option<&str> {
        match provider {
            OAuthResource::Github => self.github.as_deref(),
            OAuthResource::Facebook => self.facebook.as_deref(),
            OAuthResource::Google => self.google.as_deref(),
        }
    }

    pub fn is_bound(&self, provider: OAuthResource) -> bool {
        self.account(provider).is_some()
    }
}

/// Single-use, time-bounded link sent to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub link: String,
    pub kind: LinkType,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
    pub is_active: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub user: User,
}

impl Link {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expired_at
    }

    pub fn is_usable(&self) -> bool {
        self.is_usable_at(Utc::now())
    }
}

/// Session token, one per session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub session_id: String,
    pub user: User,
}

impl Token {
    pub fn is_usable(&self) -> bool {
        self.is_active && self.user.can_authenticate()
    }
}

/// Email domain barred from registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainBlacklistEntry {
    pub domain: String,
    pub created_at: DateTime<Utc>,
}
