//! First-run setup: make PyMOL load the socket plugin at startup.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::{
    error::{BridgeError, Result},
    settings::Settings,
    store::ConfigStore,
};

/// Markers that show `.pymolrc` already loads the plugin.
const RC_MARKERS: &[&str] = &["molbridge", "claude_socket_plugin"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RcChange {
    AlreadyConfigured,
    Appended,
    Created,
}

#[derive(Debug, Clone)]
pub struct SetupReport {
    pub plugin: PathBuf,
    pub pymolrc: PathBuf,
    pub rc_change: RcChange,
    pub python: Option<String>,
    pub wrapper: PathBuf,
}

pub fn is_configured(pymolrc: &Path) -> bool {
    fs::read_to_string(pymolrc)
        .is_ok_and(|content| RC_MARKERS.iter().any(|marker| content.contains(marker)))
}

/// Configure PyMOL, record the interpreter and install the wrapper script.
pub fn run(
    settings: &Settings,
    store: &ConfigStore,
    plugin: &Path,
    python: Option<String>,
    exe: &Path,
) -> Result<SetupReport> {
    if !plugin.is_file() {
        return Err(BridgeError::PluginMissing {
            path: plugin.to_path_buf(),
        }
        .into());
    }

    let pymolrc = settings.pymolrc();
    let rc_change = register_plugin(&pymolrc, plugin)?;
    tracing::info!("{}: {rc_change:?}", pymolrc.display());

    if let Some(python) = &python {
        store.set_python_path(python)?;
    }

    let wrapper = settings.wrapper_path();
    write_wrapper(&wrapper, exe)?;

    Ok(SetupReport {
        plugin: plugin.to_path_buf(),
        pymolrc,
        rc_change,
        python,
        wrapper,
    })
}

fn register_plugin(pymolrc: &Path, plugin: &Path) -> Result<RcChange> {
    if is_configured(pymolrc) {
        return Ok(RcChange::AlreadyConfigured);
    }

    let run_command = format!("# molbridge: socket bridge\nrun {}\n", plugin.display());
    if pymolrc.exists() {
        let mut file = OpenOptions::new().append(true).open(pymolrc)?;
        write!(file, "\n{run_command}")?;
        Ok(RcChange::Appended)
    } else {
        fs::write(pymolrc, run_command)?;
        Ok(RcChange::Created)
    }
}

fn write_wrapper(wrapper: &Path, exe: &Path) -> Result<()> {
    if let Some(parent) = wrapper.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(
        wrapper,
        format!("#!/bin/sh\nexec \"{}\" \"$@\"\n", exe.display()),
    )?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut perms = fs::metadata(wrapper)?.permissions();
        perms.set_mode(perms.mode() | 0o111);
        fs::set_permissions(wrapper, perms)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: Settings,
        store: ConfigStore,
        plugin: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            home: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let store = ConfigStore::new(settings.config_file());
        let plugin = settings.plugin_path();
        fs::create_dir_all(plugin.parent().unwrap()).unwrap();
        fs::write(&plugin, "# plugin\n").unwrap();
        Fixture {
            _dir: dir,
            settings,
            store,
            plugin,
        }
    }

    #[test]
    fn test_creates_pymolrc_and_wrapper() {
        let fx = fixture();
        let report = run(
            &fx.settings,
            &fx.store,
            &fx.plugin,
            Some("/usr/bin/python3".to_string()),
            Path::new("/opt/molbridge"),
        )
        .unwrap();

        assert_eq!(report.rc_change, RcChange::Created);
        let rc = fs::read_to_string(fx.settings.pymolrc()).unwrap();
        assert!(rc.starts_with("# molbridge"));
        assert!(rc.contains(&format!("run {}", fx.plugin.display())));

        let wrapper = fs::read_to_string(&report.wrapper).unwrap();
        assert_eq!(wrapper, "#!/bin/sh\nexec \"/opt/molbridge\" \"$@\"\n");
        assert_eq!(fx.store.python_path().as_deref(), Some("/usr/bin/python3"));
    }

    #[test]
    fn test_appends_to_existing_pymolrc_once() {
        let fx = fixture();
        fs::write(fx.settings.pymolrc(), "set ray_trace_mode, 1\n").unwrap();

        let first = run(&fx.settings, &fx.store, &fx.plugin, None, Path::new("/x")).unwrap();
        let second = run(&fx.settings, &fx.store, &fx.plugin, None, Path::new("/x")).unwrap();

        assert_eq!(first.rc_change, RcChange::Appended);
        assert_eq!(second.rc_change, RcChange::AlreadyConfigured);
        let rc = fs::read_to_string(fx.settings.pymolrc()).unwrap();
        assert!(rc.starts_with("set ray_trace_mode, 1\n"));
        assert_eq!(rc.matches("run ").count(), 1);
    }

    #[test]
    fn test_legacy_plugin_line_counts_as_configured() {
        let fx = fixture();
        fs::write(fx.settings.pymolrc(), "run /somewhere/claude_socket_plugin.py\n").unwrap();
        assert!(is_configured(&fx.settings.pymolrc()));
    }

    #[test]
    fn test_missing_plugin_is_an_error() {
        let fx = fixture();
        let err = run(
            &fx.settings,
            &fx.store,
            &fx.settings.home.join("nope.py"),
            None,
            Path::new("/x"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Bridge(BridgeError::PluginMissing { .. })
        ));
        assert!(!fx.settings.pymolrc().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_wrapper_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let fx = fixture();
        let report = run(&fx.settings, &fx.store, &fx.plugin, None, Path::new("/x")).unwrap();
        let mode = fs::metadata(report.wrapper).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
