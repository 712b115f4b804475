use std::{env, time::Duration};

use escrow_trade_engine::{
    api::{DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_UPSTREAM_TIMEOUT},
    db_types::{Address, AssetSpec},
    TradeFlowConfig,
};
use etg_common::{parse_boolean_flag, Secret, MAX_ASSET_DECIMALS};
use log::*;

const DEFAULT_ETG_HOST: &str = "127.0.0.1";
const DEFAULT_ETG_PORT: u16 = 8370;
const DEFAULT_ORACLE_URL: &str = "http://127.0.0.1:8380";
const DEFAULT_RELEASE_URL: &str = "http://127.0.0.1:8381";
const DEFAULT_DEPOSIT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The escrow-controlled address that buyers fund. Every new trade captures the value current at creation.
    pub escrow_address: Address,
    pub asset: AssetSpec,
    /// Base URL of the ledger oracle. `POST {oracle_url}/verify-transfer` is called for every deposit check.
    pub oracle_url: String,
    /// Base URL of the release endpoint. `POST {release_url}/release` is called when a buyer settles.
    pub release_url: String,
    /// Upper bound on every oracle and release call.
    pub upstream_timeout: Duration,
    /// How often the deposit worker re-checks trades that are waiting on a deposit.
    pub deposit_poll_interval: Duration,
    pub max_message_bytes: usize,
    pub caller_auth: CallerAuthConfig,
}

/// How the upstream session gateway vouches for the caller's address.
///
/// The gateway sends the authenticated address in `etg_caller_address` and `base64(HMAC-SHA256(secret, address))` in
/// `etg_caller_hmac`. With `hmac_checks` off, the address header is trusted as is. **Only do this in development.**
#[derive(Clone, Debug)]
pub struct CallerAuthConfig {
    pub hmac_secret: Secret<String>,
    pub hmac_checks: bool,
}

impl Default for CallerAuthConfig {
    fn default() -> Self {
        Self { hmac_secret: Secret::default(), hmac_checks: true }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ETG_HOST.to_string(),
            port: DEFAULT_ETG_PORT,
            database_url: String::default(),
            escrow_address: Address::new(""),
            asset: AssetSpec::default(),
            oracle_url: DEFAULT_ORACLE_URL.to_string(),
            release_url: DEFAULT_RELEASE_URL.to_string(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            deposit_poll_interval: DEFAULT_DEPOSIT_POLL_INTERVAL,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            caller_auth: CallerAuthConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("ETG_HOST").ok().unwrap_or_else(|| DEFAULT_ETG_HOST.into());
        let port = env::var("ETG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for ETG_PORT. {e} Using the default, {DEFAULT_ETG_PORT}, instead."
                    );
                    DEFAULT_ETG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_ETG_PORT);
        let database_url = env::var("ETG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ ETG_DATABASE_URL is not set. Please set it to the URL for the escrow trade database.");
            String::default()
        });
        let escrow_address = env::var("ETG_ESCROW_ADDRESS").map(Address::new).unwrap_or_else(|_| {
            error!(
                "🚨️ ETG_ESCROW_ADDRESS is not set. Buyers will not be able to fund trades until it is set to the \
                 escrow-controlled ledger address."
            );
            Address::new("")
        });
        let asset = configure_asset();
        let oracle_url = env::var("ETG_ORACLE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ ETG_ORACLE_URL is not set. Using the default, {DEFAULT_ORACLE_URL}.");
            DEFAULT_ORACLE_URL.into()
        });
        let release_url = env::var("ETG_RELEASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ ETG_RELEASE_URL is not set. Using the default, {DEFAULT_RELEASE_URL}.");
            DEFAULT_RELEASE_URL.into()
        });
        let upstream_timeout = seconds_from_env("ETG_UPSTREAM_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT);
        let deposit_poll_interval = seconds_from_env("ETG_DEPOSIT_POLL_INTERVAL_SECS", DEFAULT_DEPOSIT_POLL_INTERVAL);
        let max_message_bytes = env::var("ETG_MAX_MESSAGE_BYTES")
            .ok()
            .and_then(|s| {
                s.parse::<usize>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for ETG_MAX_MESSAGE_BYTES. {e}"))
                    .ok()
            })
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES);
        let caller_auth = CallerAuthConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            escrow_address,
            asset,
            oracle_url,
            release_url,
            upstream_timeout,
            deposit_poll_interval,
            max_message_bytes,
            caller_auth,
        }
    }

    pub fn trade_flow_config(&self) -> TradeFlowConfig {
        TradeFlowConfig {
            asset: self.asset.clone(),
            escrow_address: self.escrow_address.clone(),
            upstream_timeout: self.upstream_timeout,
        }
    }
}

impl CallerAuthConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_checks = parse_boolean_flag(env::var("ETG_CALLER_HMAC_CHECKS").ok(), true);
        let hmac_secret = match env::var("ETG_CALLER_HMAC_SECRET") {
            Ok(s) if !s.is_empty() => Secret::new(s),
            _ if hmac_checks => {
                error!(
                    "🚨️ ETG_CALLER_HMAC_SECRET is not set but caller HMAC checks are enabled. Every authenticated \
                     request will be refused."
                );
                Secret::default()
            },
            _ => Secret::default(),
        };
        if !hmac_checks {
            warn!(
                "🚨️🚨️🚨️ Caller HMAC checks are DISABLED. Anyone can act as any address by setting the \
                 etg_caller_address header. DO NOT run production like this. 🚨️🚨️🚨️"
            );
        }
        Self { hmac_secret, hmac_checks }
    }
}

fn configure_asset() -> AssetSpec {
    let default = AssetSpec::default();
    let code = env::var("ETG_ASSET_CODE").ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| {
        info!("🪛️ ETG_ASSET_CODE is not set. Using the default asset, {}.", default.code);
        default.code.clone()
    });
    let decimals = env::var("ETG_ASSET_DECIMALS")
        .map_err(|_| info!("🪛️ ETG_ASSET_DECIMALS is not set. Using {} decimal places.", default.decimals))
        .and_then(|s| {
            s.parse::<u32>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for ETG_ASSET_DECIMALS. {e}"))
                .and_then(|d| {
                    if d > MAX_ASSET_DECIMALS {
                        warn!("🪛️ ETG_ASSET_DECIMALS cannot be more than {MAX_ASSET_DECIMALS}.");
                        Err(())
                    } else {
                        Ok(d)
                    }
                })
        })
        .unwrap_or(default.decimals);
    AssetSpec::new(code, decimals)
}

fn seconds_from_env(name: &str, default: Duration) -> Duration {
    env::var(name)
        .map_err(|_| info!("🪛️ {name} is not set. Using the default value of {}s.", default.as_secs()))
        .and_then(|s| s.parse::<u64>().map_err(|e| warn!("🪛️ Invalid configuration value for {name}. {e}")))
        .ok()
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default)
}
