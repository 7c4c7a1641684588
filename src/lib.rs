//! Launcher for the linkding bookmark service.
//!
//! Loads an optional `.env` file, resolves the settings profile, and then
//! either serves the request pipeline over HTTP or runs an administrative
//! command (`linkding-launcher manage <command> [args...]`).
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LD_ENV` | `production` selects the production profile, anything else development | `production` |
//! | `LD_SECRET_KEY` | Secret key, required | |
//! | `DJANGO_ALLOWED_HOSTS` | Comma separated allowed hosts | see [`config::DEFAULT_ALLOWED_HOSTS`] |
//! | `LD_CSRF_TRUSTED_ORIGINS` | Comma separated trusted origins | see [`config::DEFAULT_CSRF_TRUSTED_ORIGINS`] |
//! | `LD_SESSION_CONTRAL` | `true` expires sessions when the browser closes | `true` |
//! | `LD_SESSION_AGE` | Session cookie age in seconds | `3600` |
//! | `LD_CONTEXT_PATH` | Prefix of the static URL | |
//! | `LD_HOST` / `LD_PORT` | Listen address | `127.0.0.1` / `9090` |
//! | `LD_THREADS` | Worker threads | `4` |
//! | `WAITRESS_TRUSTED_PROXY` | Proxy (IP, CIDR or `*`) allowed to set forwarded headers | `127.0.0.1` |
//! | `LD_MANAGE_PROGRAM` | Interpreter running `manage.py` | `python` |
//! | `HTTP_PROXY` / `HTTPS_PROXY` / `NO_PROXY` | Copied to their lower-case names | |
//! | `RUST_LOG` | Log filter | `info,linkding_launcher=debug` |

pub mod command;
pub mod config;
pub mod environment;
pub mod launcher;
pub mod logging;
pub mod tools;
pub mod web;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
