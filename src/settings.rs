// settings.rs - Fixed provisioning parameters and their command-line overrides

use std::path::{Path, PathBuf};

// ═══════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════

pub const ADMIN_LISTEN_URL: &str = "0.0.0.0:3333";
pub const PHISH_LISTEN_URL: &str = "0.0.0.0:443";
pub const DEFAULT_CERT_PATH: &str = "example.crt";
pub const DEFAULT_KEY_PATH: &str = "example.key";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const EXECUTABLE_NAME: &str = "gophish";

const RELEASE_BASE_URL: &str = "https://github.com/gophish/gophish/releases/download";
const DEFAULT_RELEASE_VERSION: &str = "v0.12.1";
const DEFAULT_WORKDIR: &str = "gophish";

/// A prerequisite tool checked on PATH and installed through the package manager
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prerequisite {
    pub binary: String,
    pub package: String,
}

impl Prerequisite {
    fn same(name: &str) -> Self {
        Self {
            binary: name.to_string(),
            package: name.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProvisionSettings {
    /// Directory the release is downloaded and unpacked into
    pub workdir: PathBuf,
    pub release_version: String,
    /// Prefix package-manager commands with sudo
    pub escalate: bool,
    pub skip_upgrade: bool,
    pub launch: bool,
    pub prerequisites: Vec<Prerequisite>,
    /// Pre-answered certificate path (skips the prompt)
    pub cert_path: Option<String>,
    /// Pre-answered key path (skips the prompt)
    pub key_path: Option<String>,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from(DEFAULT_WORKDIR),
            release_version: DEFAULT_RELEASE_VERSION.to_string(),
            escalate: true,
            skip_upgrade: false,
            launch: true,
            prerequisites: vec![Prerequisite::same("unzip"), Prerequisite::same("certbot")],
            cert_path: None,
            key_path: None,
        }
    }
}

impl ProvisionSettings {
    pub fn archive_name(&self) -> String {
        format!("gophish-{}-linux-64bit.zip", self.release_version)
    }

    pub fn release_url(&self) -> String {
        format!("{}/{}/{}", RELEASE_BASE_URL, self.release_version, self.archive_name())
    }

    pub fn archive_path(&self) -> PathBuf {
        self.workdir.join(self.archive_name())
    }

    pub fn executable_path(&self) -> PathBuf {
        self.workdir.join(EXECUTABLE_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.workdir.join(CONFIG_FILE_NAME)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn privileged(&self, command: &str) -> String {
        if self.escalate {
            format!("sudo {}", command)
        } else {
            command.to_string()
        }
    }

    pub fn update_command(&self) -> String {
        self.privileged("apt update")
    }

    pub fn upgrade_command(&self) -> String {
        self.privileged("apt upgrade -y")
    }

    pub fn install_command(&self, package: &str) -> String {
        self.privileged(&format!("apt install {} -y", package))
    }

    /// Unpack command, run with the working directory as cwd
    pub fn unpack_command(&self) -> String {
        format!("unzip -o {}", self.archive_name())
    }
}
