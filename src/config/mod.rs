//! Settings resolution.
//!
//! [`Settings::resolve`] turns an [`EnvSnapshot`] into the immutable
//! configuration the rest of the launcher is built from. The profile supplies
//! base values, then a fixed sequence of overrides is applied:
//!
//! 1. serving forces `debug` off
//! 2. session policy from `LD_SESSION_CONTRAL` / `LD_SESSION_AGE`
//! 3. reverse proxy and HSTS policy (fixed)
//! 4. `DJANGO_ALLOWED_HOSTS`
//! 5. `LD_CSRF_TRUSTED_ORIGINS`
//! 6. `LD_SECRET_KEY` (required)
//! 7. static files
//!
//! Manage options are resolved alongside. Server options are only resolved
//! when serving, so listener tuning never blocks an administrative command.

use crate::environment::EnvSnapshot;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod profile;
pub mod server;
pub mod static_files;

pub use profile::Profile;
pub use server::{ServerOptions, TrustedProxy};
pub use static_files::StaticFiles;

pub const DEFAULT_ALLOWED_HOSTS: [&str; 5] = [
    "linkding.localhost",
    "127.0.0.1",
    "192.168.50.2",
    "linkding.local:9095",
    "192.168.50.2:9095",
];

pub const DEFAULT_CSRF_TRUSTED_ORIGINS: [&str; 4] = [
    "https://linkding.localhost:9095",
    "https://linkding.local:9095",
    "https://192.168.50.2:9095",
    "https://127.0.0.1:9095",
];

pub const DEFAULT_SESSION_AGE: u64 = 3600;

/// One year, in seconds.
pub const HSTS_SECONDS: u64 = 31_536_000;

/// A configuration problem which prevents the launcher from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("LD_SECRET_KEY is not set in the environment")]
    MissingSecretKey,
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which entry point the settings are resolved for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchMode {
    /// Serving requests. Debug is always forced off.
    Serve,
    /// Running an administrative command. Debug stays as the profile sets it.
    Manage,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey(***)")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionPolicy {
    pub expire_at_browser_close: bool,
    /// Maximal session age in seconds.
    pub cookie_age: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HstsPolicy {
    pub seconds: u64,
    pub include_subdomains: bool,
    pub preload: bool,
}

impl HstsPolicy {
    /// Renders the `Strict-Transport-Security` header value.
    pub fn header_value(&self) -> String {
        let mut value = format!("max-age={}", self.seconds);
        if self.include_subdomains {
            value.push_str("; includeSubDomains");
        }
        if self.preload {
            value.push_str("; preload");
        }

        value
    }
}

/// A request is considered secure if `header` carries `value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProxySslHeader {
    pub header: &'static str,
    pub value: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecurityPolicy {
    pub use_x_forwarded_host: bool,
    pub proxy_ssl_header: ProxySslHeader,
    /// TLS is terminated by the proxy in front of us, so this stays off.
    pub ssl_redirect: bool,
    pub hsts: HstsPolicy,
}

impl SecurityPolicy {
    fn behind_tls_proxy() -> SecurityPolicy {
        SecurityPolicy {
            use_x_forwarded_host: true,
            proxy_ssl_header: ProxySslHeader {
                header: "x-forwarded-proto",
                value: "https",
            },
            ssl_redirect: false,
            hsts: HstsPolicy {
                seconds: HSTS_SECONDS,
                include_subdomains: true,
                preload: true,
            },
        }
    }
}

/// How administrative commands are executed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManageOptions {
    pub program: String,
    pub script: PathBuf,
}

/// The fully resolved launcher configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    pub profile: Profile,
    pub debug: bool,
    pub secret_key: SecretKey,
    pub allowed_hosts: Vec<String>,
    pub csrf_trusted_origins: Vec<String>,
    pub session: SessionPolicy,
    pub security: SecurityPolicy,
    pub static_files: StaticFiles,
    /// Listener settings, only resolved for [`LaunchMode::Serve`].
    pub server: Option<ServerOptions>,
    pub manage: ManageOptions,
    pub base_dir: PathBuf,
}

impl Settings {
    /// Resolves the settings for `profile` and `mode` from `env`.
    ///
    /// Paths are derived from `base_dir`, the project root.
    pub fn resolve(
        env: &EnvSnapshot,
        base_dir: &Path,
        profile: Profile,
        mode: LaunchMode,
    ) -> Result<Settings, ConfigError> {
        let debug = match mode {
            LaunchMode::Serve => false,
            LaunchMode::Manage => profile.debug(),
        };

        let session = SessionPolicy {
            expire_at_browser_close: env
                .get("LD_SESSION_CONTRAL")
                .map(|value| value.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            cookie_age: parse_number(env, "LD_SESSION_AGE", DEFAULT_SESSION_AGE)?,
        };

        let allowed_hosts = list_or_default(env, "DJANGO_ALLOWED_HOSTS", &DEFAULT_ALLOWED_HOSTS);
        let csrf_trusted_origins = list_or_default(
            env,
            "LD_CSRF_TRUSTED_ORIGINS",
            &DEFAULT_CSRF_TRUSTED_ORIGINS,
        );

        let secret_key = env
            .get_non_empty("LD_SECRET_KEY")
            .map(|key| SecretKey(key.to_owned()))
            .ok_or(ConfigError::MissingSecretKey)?;

        let server = match mode {
            LaunchMode::Serve => Some(ServerOptions::resolve(env)?),
            LaunchMode::Manage => None,
        };

        Ok(Settings {
            profile,
            debug,
            secret_key,
            allowed_hosts,
            csrf_trusted_origins,
            session,
            security: SecurityPolicy::behind_tls_proxy(),
            static_files: StaticFiles::resolve(env, base_dir),
            server,
            manage: ManageOptions {
                program: env.get_or("LD_MANAGE_PROGRAM", "python").to_owned(),
                script: base_dir.join("manage.py"),
            },
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Logs the effective configuration, keeping the secret key out of the output.
    pub fn log_summary(&self) {
        tracing::info!("Settings profile: {} ({})", self.profile, self.profile.settings_module());
        tracing::info!("DEBUG: {}", self.debug);
        tracing::info!(
            "SESSION_EXPIRE_AT_BROWSER_CLOSE: {}",
            self.session.expire_at_browser_close
        );
        tracing::info!("SESSION_COOKIE_AGE: {}", self.session.cookie_age);
        tracing::info!("USE_X_FORWARDED_HOST: {}", self.security.use_x_forwarded_host);
        tracing::info!(
            "SECURE_PROXY_SSL_HEADER: ({}, {})",
            self.security.proxy_ssl_header.header,
            self.security.proxy_ssl_header.value
        );
        tracing::info!("SECURE_SSL_REDIRECT: {}", self.security.ssl_redirect);
        tracing::info!("Strict-Transport-Security: {}", self.security.hsts.header_value());
        tracing::info!("ALLOWED_HOSTS: {:?}", self.allowed_hosts);
        tracing::info!("CSRF_TRUSTED_ORIGINS: {:?}", self.csrf_trusted_origins);
        tracing::info!("SECRET_KEY: set");
        tracing::info!("STATICFILES_DIRS: {:?}", self.static_files.source_dirs);
        tracing::info!("STATIC_URL: {}", self.static_files.url);
        tracing::info!("STATIC_ROOT: {}", self.static_files.root.display());
        tracing::info!("STATICFILES_STORAGE: {}", static_files::STATIC_STORAGE);
        if let Some(server) = &self.server {
            tracing::info!(
                "Server: {}:{} ({} worker threads)",
                server.host,
                server.port,
                server.threads
            );
        }

        self.static_files.report_missing_directories();
    }
}

/// Splits a comma separated list, trimming entries and dropping empty ones.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

fn list_or_default(env: &EnvSnapshot, key: &str, default: &[&str]) -> Vec<String> {
    let entries = env.get(key).map(parse_list).unwrap_or_default();
    if entries.is_empty() {
        tracing::debug!("{} is not set, using the built-in defaults", key);
        default.iter().map(|entry| entry.to_string()).collect()
    } else {
        entries
    }
}

pub(crate) fn parse_number<T>(
    env: &EnvSnapshot,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env.get(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| ConfigError::InvalidValue {
                key,
                value: value.to_owned(),
                reason: err.to_string(),
            }),
        None => Ok(default),
    }
}
