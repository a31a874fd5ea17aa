//! Subcommand implementations. Each returns whether it succeeded.

use std::{
    env,
    io::{self, IsTerminal, Read},
    path::{Path, PathBuf},
};

use crate::{
    bridge::Connection,
    error::{BridgeError, Result},
    launch::{find_in_path, DetachedSpawner, Discovery, LaunchCommand, Launcher, Locator, SpawnedProcess},
    settings::Settings,
    setup::{self, RcChange},
    store::ConfigStore,
};

const TEST_CODE: &str = "print('molbridge connection test')";

fn store(settings: &Settings) -> ConfigStore {
    ConfigStore::new(settings.config_file())
}

fn discovery(settings: &Settings, store: &ConfigStore) -> Discovery {
    Discovery::from_env(&settings.home, store.python_path())
}

async fn find_pymol(settings: &Settings, store: &ConfigStore) -> Option<LaunchCommand> {
    discovery(settings, store).locate().await.ok()
}

pub async fn setup(settings: &Settings, plugin: Option<PathBuf>, python: Option<String>) -> Result<bool> {
    let store = store(settings);
    let plugin = plugin.unwrap_or_else(|| settings.plugin_path());
    let python = python.or_else(default_python);
    let exe = env::current_exe()?;

    let report = setup::run(settings, &store, &plugin, python, &exe)?;

    match report.rc_change {
        RcChange::AlreadyConfigured => println!("PyMOL already configured for molbridge."),
        RcChange::Appended => println!("Added molbridge plugin to existing {}", report.pymolrc.display()),
        RcChange::Created => println!("Created {} with molbridge plugin", report.pymolrc.display()),
    }
    println!("Plugin: {}", report.plugin.display());
    if report.rc_change != RcChange::AlreadyConfigured {
        println!("\nSetup complete! The plugin will auto-load when you start PyMOL.");
    }

    if let Err(e) = discovery(settings, &store).locate().await {
        println!("\nNote: {e}");
    }

    match &report.python {
        Some(python) => println!("Saved Python path: {python}"),
        None => println!("No Python interpreter found on PATH; python_path not saved"),
    }
    println!("Wrapper script: {}", report.wrapper.display());
    Ok(true)
}

pub async fn status(settings: &Settings) -> Result<bool> {
    println!("Checking PyMOL status...");
    let store = store(settings);

    if let Some(python) = store.python_path() {
        println!("Configured Python: {python}");
    }

    match find_pymol(settings, &store).await {
        Some(command) => println!("PyMOL found: {command}"),
        None => {
            println!("PyMOL not found in PATH");
            return Ok(false);
        }
    }

    let mut conn = Connection::new(settings.endpoint());
    match conn.connect(settings.probe_timeout).await {
        Ok(()) => {
            println!("Socket connection: OK (port {})", conn.endpoint().port);
            conn.disconnect();
            Ok(true)
        }
        Err(e) => {
            tracing::debug!("Status probe failed: {e}");
            println!("Socket connection: Not available");
            println!("  (PyMOL may not be running, or plugin not loaded)");
            Ok(false)
        }
    }
}

pub async fn test(settings: &Settings) -> Result<bool> {
    let mut conn = Connection::new(settings.endpoint());
    if let Err(e) = conn.connect(settings.probe_timeout).await {
        eprintln!("Connection failed: {e}");
        eprintln!("\nMake sure PyMOL is running with the socket plugin.");
        eprintln!("Run: molbridge setup, then start PyMOL.");
        return Ok(false);
    }

    let result = conn.execute(TEST_CODE).await;
    conn.disconnect();
    let response = result?;
    println!("Connection test: OK");
    println!("Response: {response}");
    Ok(true)
}

pub async fn info(settings: &Settings) {
    let store = store(settings);
    let plugin = settings.plugin_path();
    let pymolrc = settings.pymolrc();

    println!("molbridge installation info:");
    println!("  Plugin: {}", plugin.display());
    println!("  Plugin exists: {}", plugin.exists());
    println!("  .pymolrc: {}", pymolrc.display());
    println!("  .pymolrc exists: {}", pymolrc.exists());
    if pymolrc.exists() {
        println!("  Configured in .pymolrc: {}", setup::is_configured(&pymolrc));
    }

    let command = find_pymol(settings, &store).await;
    println!(
        "  PyMOL command: {}",
        command.map_or_else(|| "not found".to_string(), |c| c.to_string())
    );

    println!("  Config file: {}", store.path().display());
    match store.load() {
        Ok(config) if !config.is_empty() => {
            for (key, value) in config.entries() {
                println!("  Config {key}: {value}");
            }
        }
        Ok(_) => println!("  Config: not set (run 'molbridge setup' to configure)"),
        Err(e) => println!("  Config: unreadable ({e})"),
    }

    let wrapper = settings.wrapper_path();
    println!("  Wrapper script: {}", wrapper.display());
    println!("  Wrapper exists: {}", wrapper.exists());
}

pub async fn launch(settings: &Settings, file: Option<&Path>) -> Result<bool> {
    let store = store(settings);
    let launcher = Launcher::new(
        settings.endpoint(),
        discovery(settings, &store),
        DetachedSpawner::new(settings.log_dir()),
        settings.launch_policy(),
    );

    let mut launched = launcher.connect_or_launch(file).await?;
    match &launched.process {
        Some(process) => match process.id() {
            Some(pid) => println!("Launched PyMOL (pid {pid})"),
            None => println!("Launched PyMOL"),
        },
        None => println!("Connected to existing PyMOL instance"),
    }
    launched.connection.disconnect();
    Ok(true)
}

pub async fn exec(settings: &Settings, code: Option<String>) -> Result<bool> {
    let code = match code {
        Some(code) => code,
        None if !io::stdin().is_terminal() => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
        None => {
            eprintln!("Error: No code provided. Pass as argument or pipe via stdin.");
            eprintln!("  molbridge exec \"cmd.fetch('1ubq')\"");
            eprintln!("  echo \"cmd.fetch('1ubq')\" | molbridge exec");
            return Ok(false);
        }
    };

    if code.trim().is_empty() {
        eprintln!("Error: Empty code.");
        return Ok(false);
    }

    let mut conn = Connection::new(settings.endpoint());
    if let Err(e) = conn.connect(settings.probe_timeout).await {
        tracing::debug!("exec connect failed: {e}");
        eprintln!("Error: Cannot connect to PyMOL. Is it running?");
        eprintln!("  Run: molbridge launch");
        return Ok(false);
    }

    let result = conn.execute(&code).await;
    conn.disconnect();
    match result {
        Ok(output) => {
            print_output(&output);
            Ok(true)
        }
        Err(e @ BridgeError::Remote { .. }) => {
            eprintln!("Error: {e}");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    if output.ends_with('\n') {
        print!("{output}");
    } else {
        println!("{output}");
    }
}

/// Interpreter to record during setup when none is given.
fn default_python() -> Option<String> {
    let search_path = env::var_os("PATH")?;
    ["python3", "python"]
        .iter()
        .find_map(|name| find_in_path(name, &search_path))
        .map(|path| path.display().to_string())
}
