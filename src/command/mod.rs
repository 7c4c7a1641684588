//! Command line dispatch.
//!
//! `linkding-launcher manage <command> [args...]` runs an administrative
//! command of the bookmark application, everything else starts the server.
//! Administrative commands are executed by a [`CommandRunner`]; the default
//! one, [`ManageScript`], runs `manage.py` in a child process.

use crate::config::{LaunchMode, Settings};
use crate::environment::EnvSnapshot;
use anyhow::{Context, bail};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const MANAGE_KEYWORD: &str = "manage";
pub const SETTINGS_MODULE_VARIABLE: &str = "DJANGO_SETTINGS_MODULE";

/// Its first argument is the backup file, whose directory is created on demand.
const BACKUP_COMMAND: &str = "full_backup";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invocation {
    Serve,
    Manage(ManagementCommand),
}

impl Invocation {
    /// Interprets the process arguments, without the program name.
    pub fn parse<I, S>(args: I) -> anyhow::Result<Invocation>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);

        match args.next() {
            Some(first) if first == MANAGE_KEYWORD => {
                let Some(name) = args.next() else {
                    bail!("Usage: linkding-launcher manage <command> [args...]");
                };
                Ok(Invocation::Manage(ManagementCommand {
                    name,
                    args: args.collect(),
                }))
            }
            _ => Ok(Invocation::Serve),
        }
    }

    pub fn mode(&self) -> LaunchMode {
        match self {
            Invocation::Serve => LaunchMode::Serve,
            Invocation::Manage(_) => LaunchMode::Manage,
        }
    }
}

/// An administrative command and its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagementCommand {
    pub name: String,
    pub args: Vec<String>,
}

impl ManagementCommand {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ManagementCommand {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Display for ManagementCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Executes administrative commands.
pub trait CommandRunner {
    fn run(&self, command: &ManagementCommand) -> anyhow::Result<()>;
}

/// Runs `<program> <base>/manage.py <command> [args...]` in the project directory.
///
/// The child sees exactly the environment snapshot, plus
/// `DJANGO_SETTINGS_MODULE` for the active profile unless it is already set.
#[derive(Clone, Debug)]
pub struct ManageScript {
    program: String,
    script: PathBuf,
    working_dir: PathBuf,
    env: Vec<(String, String)>,
}

impl ManageScript {
    pub fn new(settings: &Settings, env: &EnvSnapshot) -> Self {
        let mut vars: Vec<(String, String)> = env
            .iter()
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect();
        if !env.contains(SETTINGS_MODULE_VARIABLE) {
            vars.push((
                SETTINGS_MODULE_VARIABLE.to_owned(),
                settings.profile.settings_module().to_owned(),
            ));
        }

        ManageScript {
            program: settings.manage.program.clone(),
            script: settings.manage.script.clone(),
            working_dir: settings.base_dir.clone(),
            env: vars,
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    fn command(&self, command: &ManagementCommand) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.script)
            .arg(&command.name)
            .args(&command.args)
            .current_dir(&self.working_dir)
            .env_clear()
            .envs(self.env.iter().map(|(key, value)| (key, value)));
        cmd
    }
}

impl CommandRunner for ManageScript {
    fn run(&self, command: &ManagementCommand) -> anyhow::Result<()> {
        let status = self
            .command(command)
            .status()
            .with_context(|| {
                format!("Failed to start {} {}", self.program, self.script.display())
            })?;

        if !status.success() {
            bail!("manage.py {} exited with {}", command.name, status);
        }

        Ok(())
    }
}

/// Runs `command` with `runner`, preparing the backup directory for `full_backup` first.
pub fn run_management_command(
    runner: &dyn CommandRunner,
    command: &ManagementCommand,
) -> anyhow::Result<()> {
    tracing::info!("Running management command: {}", command);

    ensure_backup_directory(command)?;

    runner
        .run(command)
        .with_context(|| format!("Management command '{}' failed", command.name))?;

    tracing::info!("Management command '{}' completed successfully", command.name);
    Ok(())
}

fn ensure_backup_directory(command: &ManagementCommand) -> anyhow::Result<()> {
    if command.name != BACKUP_COMMAND {
        return Ok(());
    }

    let Some(dir) = command
        .args
        .first()
        .and_then(|target| Path::new(target).parent())
        .filter(|dir| !dir.as_os_str().is_empty())
    else {
        return Ok(());
    };

    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create backup directory '{}'", dir.display()))?;
        tracing::info!("Created backup directory: {}", dir.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CommandRunner, Invocation, ManageScript, ManagementCommand, run_management_command};
    use crate::config::{LaunchMode, Profile, Settings};
    use crate::environment::EnvSnapshot;
    use std::cell::RefCell;
    use std::ffi::OsStr;
    use std::path::Path;

    #[derive(Default)]
    struct RecordingRunner {
        calls: RefCell<Vec<ManagementCommand>>,
        fail: bool,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, command: &ManagementCommand) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(command.clone());
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn settings(base_dir: &Path, env: &EnvSnapshot) -> Settings {
        Settings::resolve(env, base_dir, Profile::for_launcher(env), LaunchMode::Manage).unwrap()
    }

    #[test]
    fn parses_invocations() {
        assert_eq!(Invocation::parse(Vec::<String>::new()).unwrap(), Invocation::Serve);
        assert_eq!(Invocation::parse(["--verbose"]).unwrap(), Invocation::Serve);
        assert_eq!(
            Invocation::parse(["manage", "migrate", "--noinput"]).unwrap(),
            Invocation::Manage(ManagementCommand::new("migrate", ["--noinput"]))
        );
        assert_eq!(
            Invocation::parse(["manage", "migrate"]).unwrap().mode(),
            LaunchMode::Manage
        );
        assert!(Invocation::parse(["manage"]).is_err());
    }

    #[test]
    fn runner_receives_name_and_args() {
        let runner = RecordingRunner::default();
        let command = ManagementCommand::new("createsuperuser", ["--username", "admin"]);

        run_management_command(&runner, &command).unwrap();

        assert_eq!(runner.calls.borrow().as_slice(), [command]);
    }

    #[test]
    fn runner_failure_is_reported() {
        let runner = RecordingRunner {
            fail: true,
            ..Default::default()
        };

        let command = ManagementCommand::new("migrate", Vec::<String>::new());
        let err = run_management_command(&runner, &command).unwrap_err();

        assert!(format!("{:#}", err).contains("Management command 'migrate' failed: boom"));
    }

    #[test]
    fn full_backup_creates_target_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("backups").join("2026").join("linkding.zip");
        let runner = RecordingRunner::default();

        run_management_command(
            &runner,
            &ManagementCommand::new("full_backup", [target.to_string_lossy()]),
        )
        .unwrap();

        assert!(tmp.path().join("backups").join("2026").is_dir());
        assert_eq!(runner.calls.borrow().len(), 1);
    }

    #[test]
    fn other_commands_leave_filesystem_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("exports").join("bookmarks.html");

        run_management_command(
            &RecordingRunner::default(),
            &ManagementCommand::new("export", [target.to_string_lossy()]),
        )
        .unwrap();

        assert!(!tmp.path().join("exports").exists());
    }

    #[test]
    fn backup_directory_failure_skips_runner() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("occupied");
        std::fs::write(&blocker, "not a directory").unwrap();
        let runner = RecordingRunner::default();

        let target = blocker.join("nested").join("backup.zip");
        let result = run_management_command(
            &runner,
            &ManagementCommand::new("full_backup", [target.to_string_lossy()]),
        );

        assert!(result.is_err());
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn manage_script_uses_snapshot_environment() {
        let env = EnvSnapshot::from_pairs([("LD_SECRET_KEY", "s3cr3t"), ("LD_ENV", "development")]);
        let script = ManageScript::new(&settings(Path::new("/srv/linkding"), &env), &env);

        let cmd = script.command(&ManagementCommand::new("migrate", ["--noinput"]));
        let args: Vec<_> = cmd.get_args().collect();
        let envs: Vec<_> = cmd.get_envs().collect();

        assert_eq!(cmd.get_program(), "python");
        assert_eq!(
            args,
            [
                OsStr::new("/srv/linkding/manage.py"),
                OsStr::new("migrate"),
                OsStr::new("--noinput")
            ]
        );
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/srv/linkding")));
        assert!(envs.contains(&(
            OsStr::new("DJANGO_SETTINGS_MODULE"),
            Some(OsStr::new("bookmarks.settings.dev"))
        )));
        assert!(envs.contains(&(OsStr::new("LD_SECRET_KEY"), Some(OsStr::new("s3cr3t")))));
    }

    #[test]
    fn explicit_settings_module_is_kept() {
        let env = EnvSnapshot::from_pairs([
            ("LD_SECRET_KEY", "s3cr3t"),
            ("DJANGO_SETTINGS_MODULE", "bookmarks.settings.custom"),
        ]);
        let script = ManageScript::new(&settings(Path::new("/srv/linkding"), &env), &env);

        let cmd = script.command(&ManagementCommand::new("check", Vec::<String>::new()));
        let modules: Vec<_> = cmd
            .get_envs()
            .filter(|(key, _)| *key == "DJANGO_SETTINGS_MODULE")
            .collect();

        assert_eq!(
            modules,
            [(
                OsStr::new("DJANGO_SETTINGS_MODULE"),
                Some(OsStr::new("bookmarks.settings.custom"))
            )]
        );
    }

    #[test]
    fn manage_script_reports_exit_status() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("manage.py"), "test \"$1\" = check\n").unwrap();
        let env = EnvSnapshot::from_pairs([
            ("LD_SECRET_KEY", "s3cr3t"),
            ("LD_MANAGE_PROGRAM", "/bin/sh"),
        ]);
        let script = ManageScript::new(&settings(tmp.path(), &env), &env);

        assert!(script.run(&ManagementCommand::new("check", Vec::<String>::new())).is_ok());
        assert!(script.run(&ManagementCommand::new("migrate", Vec::<String>::new())).is_err());
    }
}
