use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    models::Package,
    notify::Notifier,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// The package catalog is read-mostly; serve it from a short-lived
/// per-replica cache and drop the cache on admin writes.
const PACKAGE_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub notifier: Arc<dyn Notifier>,
    pub jwt: JwtService,
    package_cache: Arc<Mutex<Option<(Instant, Vec<Package>)>>>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        notifier: Arc<dyn Notifier>,
        jwt: JwtService,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            notifier,
            jwt,
            package_cache: Arc::new(Mutex::new(None)),
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool.get().map_err(AppError::service_unavailable)
    }

    pub fn cached_packages(&self) -> Option<Vec<Package>> {
        let guard = self.package_cache.lock().ok()?;
        match guard.as_ref() {
            Some((stored_at, packages)) if stored_at.elapsed() < PACKAGE_CACHE_TTL => {
                Some(packages.clone())
            }
            _ => None,
        }
    }

    pub fn store_packages(&self, packages: Vec<Package>) {
        if let Ok(mut guard) = self.package_cache.lock() {
            *guard = Some((Instant::now(), packages));
        }
    }

    pub fn invalidate_packages(&self) {
        if let Ok(mut guard) = self.package_cache.lock() {
            *guard = None;
        }
    }
}
