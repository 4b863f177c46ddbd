use std::sync::Once;

use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;

use warden_core::Ctx;
use warden_domain::user::UserRole;
use warden_identity::{IdentityStore, MemoryStore, Profile, ProfileData, SeaStore, StoreConfig, User};
use warden_identity_migration::Migrator;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let mut config = StoreConfig::for_url("sqlite::memory:");
        config.log_level = "warden_identity=debug".to_owned();
        config.init_tracing();
    });
}

// ── Stores ───────────────────────────────────────────────────────────────────

/// Fresh SQLite in-memory store with the full schema applied.
///
/// Pinned to one connection: every in-memory SQLite connection is its own
/// database.
pub async fn sqlite_store() -> SeaStore<DatabaseConnection> {
    init_tracing();
    let mut config = StoreConfig::for_url("sqlite::memory:");
    config.db_max_connections = 1;
    config.db_min_connections = 1;
    let store = SeaStore::connect(&config).await.unwrap();
    Migrator::up(store.connection(), None).await.unwrap();
    store
}

pub async fn memory_store() -> MemoryStore {
    init_tracing();
    MemoryStore::new()
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub fn ctx() -> Ctx {
    Ctx::background()
}

/// Unsaved, active user.
pub fn new_user(login: &str) -> User {
    User {
        is_active: true,
        ..User::new(login, "aGFzaA==", "c2FsdA==", UserRole::User)
    }
}

pub async fn saved_user<S: IdentityStore>(store: &S, login: &str) -> User {
    let mut user = new_user(login);
    store.create_user(&ctx(), &mut user).await.unwrap();
    user
}

pub fn data(pairs: &[(&str, &str)]) -> ProfileData {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), serde_json::Value::from(*v)))
        .collect()
}

pub async fn saved_profile<S: IdentityStore>(store: &S, user: &User) -> Profile {
    let mut profile = Profile::new(user.clone(), "ref", "rw", data(&[("k", "v")]));
    store.create_profile(&ctx(), &mut profile).await.unwrap();
    profile
}
