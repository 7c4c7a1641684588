//! Process entry logic: load the environment, resolve settings and either
//! run an administrative command or serve HTTP.

use crate::command::{Invocation, ManageScript, run_management_command};
use crate::config::{Profile, Settings};
use crate::environment::{EnvLoader, EnvSnapshot};
use crate::web::application::base_application;
use crate::web::into_service;
use crate::web::pipeline::Pipeline;
use crate::web::server::run_webserver;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Marks a directory as the project root.
const PROJECT_MARKER: &str = "manage.py";

/// Runs the launcher for the given arguments (without the program name).
pub fn run(args: Vec<String>) -> anyhow::Result<()> {
    tracing::info!("Starting {} {}", crate::APP_NAME, crate::APP_VERSION);

    let working_dir =
        std::env::current_dir().context("Failed to determine the working directory")?;
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    tracing::info!("Working directory: {}", working_dir.display());
    tracing::info!(
        "Executable directory: {}",
        exe_dir
            .as_deref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| "unknown".to_owned())
    );

    let base_dir = project_dir(exe_dir.as_deref(), &working_dir);
    tracing::info!("Project directory: {}", base_dir.display());

    let env = load_environment(&base_dir);
    let invocation = Invocation::parse(args)?;

    let profile = Profile::for_launcher(&env);
    let settings = Settings::resolve(&env, &base_dir, profile, invocation.mode())
        .context("Failed to resolve settings")?;
    settings.log_summary();

    match invocation {
        Invocation::Manage(command) => {
            let runner = ManageScript::new(&settings, &env);
            tracing::debug!("Dispatching to {}", runner.script().display());
            run_management_command(&runner, &command)
        }
        Invocation::Serve => serve(&settings),
    }
}

/// The directory holding the launcher binary if it contains `manage.py`,
/// else the working directory.
///
/// All project paths (`.env`, static directories, `manage.py`) are resolved
/// against it, so the launcher behaves the same wherever it is started from.
pub fn project_dir(exe_dir: Option<&Path>, working_dir: &Path) -> PathBuf {
    match exe_dir {
        Some(dir) if dir.join(PROJECT_MARKER).is_file() => dir.to_path_buf(),
        _ => working_dir.to_path_buf(),
    }
}

/// Builds the environment snapshot for a launch from `base_dir`.
pub fn load_environment(base_dir: &Path) -> EnvSnapshot {
    let loader = EnvLoader::for_launcher(base_dir);
    tracing::debug!("Looking for .env files in {:?}", loader.candidates());

    let loaded = loader.load();
    if loaded.skipped_lines > 0 {
        tracing::warn!(
            "{} line(s) of {} could not be parsed",
            loaded.skipped_lines,
            loaded
                .env_file
                .as_deref()
                .map(|path| path.display().to_string())
                .unwrap_or_default()
        );
    }

    loaded.snapshot.with_proxy_aliases()
}

fn serve(settings: &Settings) -> anyhow::Result<()> {
    tracing::info!("Starting HTTP server...");

    let server = settings
        .server
        .as_ref()
        .context("Server options are not resolved for this launch")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(server.threads)
        .enable_all()
        .build()
        .context("Failed to build the async runtime")?;

    runtime.block_on(async {
        let pipeline = Pipeline::assemble(settings, into_service(base_application(settings)));
        run_webserver(server, pipeline).await
    })
}

#[cfg(test)]
mod tests {
    use super::{load_environment, project_dir};
    use std::fs;

    #[test]
    fn project_dir_follows_executable_location() {
        let install = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        fs::write(install.path().join("manage.py"), "").unwrap();

        assert_eq!(project_dir(Some(install.path()), elsewhere.path()), install.path());
    }

    #[test]
    fn project_dir_falls_back_to_working_directory() {
        let build = tempfile::tempdir().unwrap();
        let checkout = tempfile::tempdir().unwrap();

        assert_eq!(project_dir(Some(build.path()), checkout.path()), checkout.path());
        assert_eq!(project_dir(None, checkout.path()), checkout.path());
    }

    #[test]
    fn parent_env_file_is_used_as_fallback() {
        let root = tempfile::tempdir().unwrap();
        let base_dir = root.path().join("linkding");
        fs::create_dir(&base_dir).unwrap();
        fs::write(
            root.path().join(".env"),
            "LD_TEST_LAUNCHER_MARKER=parent\nHTTPS_PROXY=http://proxy.internal:3128\n",
        )
        .unwrap();

        let env = load_environment(&base_dir);

        assert_eq!(env.get("LD_TEST_LAUNCHER_MARKER"), Some("parent"));
        assert_eq!(env.get("https_proxy"), Some("http://proxy.internal:3128"));
    }

    #[test]
    fn base_env_file_takes_precedence() {
        let root = tempfile::tempdir().unwrap();
        let base_dir = root.path().join("linkding");
        fs::create_dir(&base_dir).unwrap();
        fs::write(root.path().join(".env"), "LD_TEST_LAUNCHER_ORIGIN=parent\n").unwrap();
        fs::write(base_dir.join(".env"), "LD_TEST_LAUNCHER_ORIGIN=base\n").unwrap();

        let env = load_environment(&base_dir);

        assert_eq!(env.get("LD_TEST_LAUNCHER_ORIGIN"), Some("base"));
    }
}
