//! Keyed JSON configuration rows. Every reader falls back to documented
//! defaults when the row is absent or does not decode, so a missing or
//! half-migrated settings table never breaks a request.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::Setting;
use crate::schema::settings;

pub const REVISION_PURCHASE_KEY: &str = "revision_purchase";

pub const DEFAULT_PRICE_PER_REVISION: i64 = 100;
pub const DEFAULT_MAX_PER_PURCHASE: i32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionPurchaseConfig {
    #[serde(default = "default_price")]
    pub price_per_revision: i64,
    #[serde(default = "default_max")]
    pub max_per_purchase: i32,
}

fn default_price() -> i64 {
    DEFAULT_PRICE_PER_REVISION
}

fn default_max() -> i32 {
    DEFAULT_MAX_PER_PURCHASE
}

impl Default for RevisionPurchaseConfig {
    fn default() -> Self {
        Self {
            price_per_revision: DEFAULT_PRICE_PER_REVISION,
            max_per_purchase: DEFAULT_MAX_PER_PURCHASE,
        }
    }
}

pub fn revision_purchase_config(conn: &mut PgConnection) -> AppResult<RevisionPurchaseConfig> {
    let row: Option<Setting> = settings::table
        .filter(settings::key.eq(REVISION_PURCHASE_KEY))
        .order(settings::updated_at.desc())
        .first(conn)
        .optional()?;

    let config = match row {
        Some(setting) => serde_json::from_value(setting.value).unwrap_or_default(),
        None => RevisionPurchaseConfig::default(),
    };

    Ok(config)
}
