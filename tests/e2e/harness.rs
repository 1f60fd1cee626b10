//! Runs the built `swift-package-info` binary inside throwaway sandboxes

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

const BIN_NAME: &str = "swift-package-info";

pub struct TestContext {
    bin_path: PathBuf,
}

/// Isolated HOME and XDG config dir; removed when dropped
pub struct Sandbox {
    _dir: TempDir,
    pub root: PathBuf,
    pub home: PathBuf,
    pub xdg_config: PathBuf,
}

pub struct RunOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl TestContext {
    pub fn new() -> Result<Self, String> {
        if let Some(path) = std::env::var_os("CARGO_BIN_EXE_swift-package-info") {
            return Ok(Self {
                bin_path: PathBuf::from(path),
            });
        }

        let manifest_dir = std::env::var_os("CARGO_MANIFEST_DIR")
            .map(PathBuf::from)
            .ok_or_else(|| "CARGO_MANIFEST_DIR not set".to_string())?;
        let bin_path = manifest_dir.join("target").join("debug").join(BIN_NAME);
        if !bin_path.exists() {
            let status = Command::new("cargo")
                .arg("build")
                .current_dir(&manifest_dir)
                .status()
                .map_err(|e| format!("Failed to run cargo build: {}", e))?;
            if !status.success() {
                return Err("cargo build failed".to_string());
            }
        }
        Ok(Self { bin_path })
    }

    pub fn sandbox(&self, name: &str) -> Result<Sandbox, String> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", BIN_NAME, name))
            .tempdir()
            .map_err(|e| format!("Failed to create sandbox: {}", e))?;
        let root = dir.path().to_path_buf();
        let home = root.join("home");
        let xdg_config = home.join(".config");
        fs::create_dir_all(&xdg_config).map_err(|e| format!("Failed to create config dir: {}", e))?;

        Ok(Sandbox {
            _dir: dir,
            root,
            home,
            xdg_config,
        })
    }

    /// Run the tool from the sandbox root
    pub fn run_tool(&self, sandbox: &Sandbox, args: &[&str]) -> Result<RunOutput, String> {
        self.run(&self.bin_path, args, &sandbox.root, sandbox)
    }

    pub fn run<P: AsRef<Path>>(
        &self,
        program: P,
        args: &[&str],
        cwd: &Path,
        sandbox: &Sandbox,
    ) -> Result<RunOutput, String> {
        if std::env::var_os("SWIFT_PACKAGE_INFO_E2E_LOG").is_some() {
            eprintln!("    $ {} {}", program.as_ref().display(), args.join(" "));
        }
        let output = Command::new(program.as_ref())
            .args(args)
            .current_dir(cwd)
            .env("HOME", &sandbox.home)
            .env("XDG_CONFIG_HOME", &sandbox.xdg_config)
            .env_remove("RUST_LOG")
            .output()
            .map_err(|e| format!("Failed to run {}: {}", program.as_ref().display(), e))?;

        Ok(RunOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Whether `program --version` can be launched
    pub fn has_tool(&self, program: &str) -> bool {
        let found = Command::new(program).arg("--version").output().is_ok();
        if !found {
            eprintln!("    skipped: {} not available", program);
        }
        found
    }
}

impl RunOutput {
    pub fn expect_status(&self, expected: i32) -> Result<&Self, String> {
        if self.status == expected {
            Ok(self)
        } else {
            Err(format!(
                "Expected exit {}, got {}.\nstdout: {}\nstderr: {}",
                expected, self.status, self.stdout, self.stderr
            ))
        }
    }

    pub fn expect_failure(&self) -> Result<&Self, String> {
        if self.status != 0 {
            Ok(self)
        } else {
            Err(format!("Expected failure, got success.\nstdout: {}", self.stdout))
        }
    }

    pub fn expect_stdout(&self, needle: &str) -> Result<&Self, String> {
        if self.stdout.contains(needle) {
            Ok(self)
        } else {
            Err(format!("stdout lacks '{}'.\nstdout: {}", needle, self.stdout))
        }
    }

    pub fn expect_stderr(&self, needle: &str) -> Result<&Self, String> {
        if self.stderr.contains(needle) {
            Ok(self)
        } else {
            Err(format!("stderr lacks '{}'.\nstderr: {}", needle, self.stderr))
        }
    }

    pub fn json(&self) -> Result<serde_json::Value, String> {
        serde_json::from_str(&self.stdout)
            .map_err(|e| format!("Invalid JSON output: {}\nstdout: {}", e, self.stdout))
    }
}

pub fn write_file(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create parent dirs: {}", e))?;
    }
    fs::write(path, content).map_err(|e| format!("Failed to write file: {}", e))
}
