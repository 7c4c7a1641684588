use crate::environment::EnvSnapshot;
use std::fmt::{Display, Formatter};

/// Environment variable selecting the settings profile.
pub const PROFILE_VARIABLE: &str = "LD_ENV";

/// A named bundle of configuration defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
}

impl Profile {
    /// Maps a raw flag onto a profile.
    ///
    /// Only the exact string `production` selects [`Profile::Production`]; any
    /// other present value selects [`Profile::Development`]. `default` applies
    /// when the flag is absent.
    pub fn from_flag(flag: Option<&str>, default: Profile) -> Profile {
        match flag {
            Some("production") => Profile::Production,
            Some(_) => Profile::Development,
            None => default,
        }
    }

    /// Profile for a plain settings import, defaulting to development.
    ///
    /// This is what the bookmark application itself picks when it loads its
    /// settings without going through the launcher, e.g. a bare `manage.py`
    /// run. The launcher uses [`Profile::for_launcher`] instead.
    pub fn from_env(env: &EnvSnapshot) -> Profile {
        Profile::from_flag(env.get(PROFILE_VARIABLE), Profile::Development)
    }

    /// Profile for the serving launcher, defaulting to production.
    pub fn for_launcher(env: &EnvSnapshot) -> Profile {
        Profile::from_flag(env.get(PROFILE_VARIABLE), Profile::Production)
    }

    /// Debug flag before any launcher override.
    pub fn debug(self) -> bool {
        matches!(self, Profile::Development)
    }

    /// The Django settings module administrative commands should load.
    pub fn settings_module(self) -> &'static str {
        match self {
            Profile::Development => "bookmarks.settings.dev",
            Profile::Production => "bookmarks.settings.prod",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Profile::Development => "development",
            Profile::Production => "production",
        }
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
