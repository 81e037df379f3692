//! Tunable parameters. Every knob can be overridden with an environment
//! variable when the server starts; mutable server state (like
//! `file_per_table`) lives in [`Settings`] instead so DDL can save and
//! restore it.

use std::{
    env,
    fmt::Debug,
    str::FromStr,
    sync::LazyLock,
};

pub fn env_config<T: Debug + FromStr>(name: &str, default: T) -> T
where
    <T as FromStr>::Err: Debug,
{
    let raw = match env::var(name) {
        Ok(s) => s,
        Err(env::VarError::NotPresent) => return default,
        Err(env::VarError::NotUnicode(..)) => {
            tracing::warn!("Invalid value for {name}, falling back to {default:?}.");
            return default;
        },
    };
    match T::from_str(&raw) {
        Ok(v) => {
            tracing::info!("Overriding {name} to {v:?} from environment");
            v
        },
        Err(e) => {
            tracing::warn!("Invalid value {raw} for {name}, falling back to {default:?}: {e:?}");
            default
        },
    }
}

/// Page size of every tablespace, fixed at server start.
pub static PAGE_SIZE: LazyLock<u32> = LazyLock::new(|| env_config("ROWAN_PAGE_SIZE", 16384));

/// When true, a schema change whose *maximum* record size exceeds the
/// overflow threshold is rejected, not just one whose minimum does.
pub static STRICT_SIZE_CHECKS: LazyLock<bool> =
    LazyLock::new(|| env_config("ROWAN_STRICT_SIZE_CHECKS", false));

/// Mutable engine settings, passed down explicitly rather than read from
/// globals so DDL paths can snapshot and restore them.
#[derive(Clone, Debug)]
pub struct Settings {
    /// New tables get a tablespace of their own.
    pub file_per_table: bool,
    /// The server was started read-only; bootstrap must not create
    /// missing system tables.
    pub read_only: bool,
    pub page_size: u32,
    pub strict_size_checks: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            file_per_table: true,
            read_only: false,
            page_size: *PAGE_SIZE,
            strict_size_checks: *STRICT_SIZE_CHECKS,
        }
    }
}
