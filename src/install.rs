//! Best-effort installer behind `--install`
//!
//! Makes sure the external programs the services need are present and puts a
//! copy of the devserve binary on the user's PATH. Every step is independent:
//! a failure is logged and reported in the summary, and the remaining steps
//! still run.

use crate::config::Toolchain;
use crate::constants::PROXY_PACKAGE;
use crate::error::{DevServeError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// System package managers the installer knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Pacman,
    Brew,
    Winget,
}

/// A runtime the services depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    /// Python, for the standard static file server
    Python,
    /// Node.js with npm/npx, for the TLS proxy
    Node,
}

impl PackageManager {
    /// Probe order for the current platform
    fn candidates() -> &'static [PackageManager] {
        if cfg!(target_os = "macos") {
            &[PackageManager::Brew]
        } else if cfg!(windows) {
            &[PackageManager::Winget]
        } else {
            &[PackageManager::Apt, PackageManager::Dnf, PackageManager::Pacman, PackageManager::Brew]
        }
    }

    /// First package manager found on this machine
    pub fn detect() -> Option<Self> {
        Self::candidates()
            .iter()
            .copied()
            .find(|manager| command_available(manager.program(), "--version"))
    }

    pub fn program(self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Pacman => "pacman",
            PackageManager::Brew => "brew",
            PackageManager::Winget => "winget",
        }
    }

    /// Arguments that install `dependency` non-interactively
    pub fn install_args(self, dependency: Dependency) -> Vec<&'static str> {
        match (self, dependency) {
            (PackageManager::Apt, Dependency::Python) => vec!["install", "-y", "python3"],
            (PackageManager::Apt, Dependency::Node) => vec!["install", "-y", "nodejs", "npm"],
            (PackageManager::Dnf, Dependency::Python) => vec!["install", "-y", "python3"],
            (PackageManager::Dnf, Dependency::Node) => vec!["install", "-y", "nodejs", "npm"],
            (PackageManager::Pacman, Dependency::Python) => vec!["-S", "--noconfirm", "python"],
            (PackageManager::Pacman, Dependency::Node) => vec!["-S", "--noconfirm", "nodejs", "npm"],
            (PackageManager::Brew, Dependency::Python) => vec!["install", "python"],
            (PackageManager::Brew, Dependency::Node) => vec!["install", "node"],
            (PackageManager::Winget, Dependency::Python) => {
                vec!["install", "--exact", "--silent", "--id", "Python.Python.3.12"]
            }
            (PackageManager::Winget, Dependency::Node) => {
                vec!["install", "--exact", "--silent", "--id", "OpenJS.NodeJS.LTS"]
            }
        }
    }
}

/// Outcome of one installer step
#[derive(Debug)]
pub struct StepOutcome {
    pub step: &'static str,
    pub result: Result<String>,
}

/// Summary of an install run
#[derive(Debug, Default)]
pub struct InstallReport {
    pub steps: Vec<StepOutcome>,
}

impl InstallReport {
    fn record(&mut self, step: &'static str, result: Result<String>) {
        match &result {
            Ok(detail) => info!(step, "{}", detail),
            Err(e) => warn!(step, error = %e, "install step failed"),
        }
        self.steps.push(StepOutcome { step, result });
    }

    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|outcome| outcome.result.is_err()).count()
    }

    /// Print a per-step summary
    pub fn print(&self) {
        println!();
        println!("Install summary:");
        for outcome in &self.steps {
            match &outcome.result {
                Ok(detail) => println!("  ✅ {}: {}", outcome.step, detail),
                Err(e) => println!("  ❌ {}: {}", outcome.step, e),
            }
        }
        if self.failures() > 0 {
            println!("Some steps failed; devserve still works for whatever is installed.");
        }
    }
}

/// Run every install step. Never fails; see the returned report.
pub fn run_install(toolchain: &Toolchain) -> InstallReport {
    let mut report = InstallReport::default();
    let manager = PackageManager::detect();
    match manager {
        Some(manager) => info!(manager = manager.program(), "package manager detected"),
        None => warn!("no supported package manager found"),
    }

    report.record(
        "python",
        ensure_dependency(Dependency::Python, &toolchain.python, manager),
    );
    report.record("node", ensure_dependency(Dependency::Node, &toolchain.npm, manager));
    report.record("proxy", prefetch_proxy(&toolchain.npm));
    report.record("launcher", launcher_dir().and_then(|dir| install_launcher(&dir)));

    report
}

/// Run `program <arg>` quietly and report whether it succeeded
pub fn command_available(program: &str, arg: &str) -> bool {
    Command::new(program)
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn ensure_dependency(
    dependency: Dependency,
    program: &str,
    manager: Option<PackageManager>,
) -> Result<String> {
    let step = match dependency {
        Dependency::Python => "python",
        Dependency::Node => "node",
    };

    if command_available(program, "--version") {
        return Ok(format!("{} already installed", program));
    }

    let manager = manager.ok_or_else(|| DevServeError::Install {
        step,
        message: format!("{} is missing and no package manager is available", program),
    })?;

    println!("📦 Installing {:?} with {}...", dependency, manager.program());
    run_step(step, manager.program(), &manager.install_args(dependency))?;
    Ok(format!("installed with {}", manager.program()))
}

fn prefetch_proxy(npm: &str) -> Result<String> {
    println!("📦 Installing {} with npm...", PROXY_PACKAGE);
    run_step("proxy", npm, &["install", "-g", PROXY_PACKAGE])?;
    Ok(format!("{} installed", PROXY_PACKAGE))
}

fn run_step(step: &'static str, program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .map_err(|e| DevServeError::Install {
            step,
            message: format!("cannot run {}: {}", program, e),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(DevServeError::Install {
            step,
            message: format!("{} {} exited with {}", program, args.join(" "), status),
        })
    }
}

/// Directory the launcher is installed into
pub fn launcher_dir() -> Result<PathBuf> {
    if let Some(dir) = dirs::executable_dir() {
        return Ok(dir);
    }
    if cfg!(windows) {
        if let Some(dir) = dirs::data_local_dir() {
            return Ok(dir.join("devserve").join("bin"));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".local").join("bin"))
        .ok_or_else(|| DevServeError::Install {
            step: "launcher",
            message: "could not determine a bin directory".to_string(),
        })
}

/// Copy the running executable into `dir`
pub fn install_launcher(dir: &Path) -> Result<String> {
    let exe = std::env::current_exe().map_err(DevServeError::CurrentExe)?;
    fs::create_dir_all(dir)?;

    let target = dir.join(format!("devserve{}", std::env::consts::EXE_SUFFIX));
    if exe == target {
        return Ok(format!("{} already in place", target.display()));
    }
    fs::copy(&exe, &target)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;
    }

    if !on_path(dir) {
        println!("💡 Add {} to your PATH to run devserve from anywhere", dir.display());
    }
    Ok(format!("installed {}", target.display()))
}

fn on_path(dir: &Path) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|entry| entry == dir))
        .unwrap_or(false)
}
