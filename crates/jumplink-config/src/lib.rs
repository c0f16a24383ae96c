//! Declarative YAML configuration: one document describes the SSH jump
//! host, the tunnel, and whether this process sends or receives.

mod error;

use std::path::{Path, PathBuf};

use serde::Deserialize;

pub use error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    pub jump_server: String,
    pub jump_user: String,
    #[serde(default = "default_jump_port")]
    pub jump_port: u16,
    #[serde(default)]
    pub use_password: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
}

fn default_jump_port() -> u16 {
    22
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    pub local_port: u16,
    pub remote_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    File,
    Message,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SenderConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiverConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default)]
    pub use_adaptive_transfer: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressConfig {
    #[serde(default)]
    pub use_progress_observer: bool,
    #[serde(default)]
    pub use_rich_progress: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ssh: SshConfig,
    pub transfer: TransferConfig,
    pub mode: Mode,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Config {
    /// Read, parse, and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Enforce the declarative validation rules: exactly one of
    /// sender/receiver enabled, a sender needs a file, required SSH
    /// fields are non-empty, and a receiver's output dir is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssh.jump_server.trim().is_empty() {
            return Err(ConfigError::MissingField("ssh.jump_server"));
        }
        if self.ssh.jump_user.trim().is_empty() {
            return Err(ConfigError::MissingField("ssh.jump_user"));
        }
        if self.ssh.use_password && self.ssh.password.is_none() {
            return Err(ConfigError::MissingField("ssh.password"));
        }
        if !self.ssh.use_password && self.ssh.identity_file.is_none() {
            return Err(ConfigError::MissingField("ssh.identity_file"));
        }

        if self.sender.enabled == self.receiver.enabled {
            return Err(ConfigError::ExactlyOneOf("sender.enabled", "receiver.enabled"));
        }
        if self.mode == Mode::File && self.sender.enabled && self.sender.file.is_none() {
            return Err(ConfigError::MissingField("sender.file"));
        }
        if self.receiver.enabled {
            if let Some(dir) = &self.receiver.output_dir {
                std::fs::create_dir_all(dir).map_err(|source| ConfigError::CreateOutputDir {
                    path: dir.display().to_string(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const BASE: &str = r#"
ssh:
  jump_server: jump.example.com
  jump_user: alice
  identity_file: /home/alice/.ssh/id_ed25519
transfer:
  local_port: 9000
  remote_port: 9001
mode: file
"#;

    #[test]
    fn rejects_both_sender_and_receiver_enabled() {
        let yaml = format!(
            "{BASE}\nsender:\n  enabled: true\n  file: /tmp/a\nreceiver:\n  enabled: true\n"
        );
        let file = write_yaml(&yaml);
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ExactlyOneOf(..)));
    }

    #[test]
    fn rejects_neither_sender_nor_receiver_enabled() {
        let file = write_yaml(BASE);
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ExactlyOneOf(..)));
    }

    #[test]
    fn rejects_sender_without_a_file() {
        let yaml = format!("{BASE}\nsender:\n  enabled: true\n");
        let file = write_yaml(&yaml);
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("sender.file")));
    }

    #[test]
    fn receiver_output_dir_is_created_if_missing() {
        let out_dir = tempfile::tempdir().unwrap();
        let target = out_dir.path().join("nested").join("received");
        let yaml = format!(
            "{BASE}\nreceiver:\n  enabled: true\n  output_dir: {}\n",
            target.display()
        );
        let file = write_yaml(&yaml);
        Config::load(file.path()).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn a_message_mode_sender_does_not_need_a_file() {
        let yaml = r#"
ssh:
  jump_server: jump.example.com
  jump_user: alice
  identity_file: /home/alice/.ssh/id_ed25519
transfer:
  local_port: 9000
  remote_port: 9001
mode: message
sender:
  enabled: true
"#;
        let file = write_yaml(yaml);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.mode, Mode::Message);
    }

    #[test]
    fn a_valid_sender_config_loads_cleanly() {
        let yaml = format!("{BASE}\nsender:\n  enabled: true\n  file: /tmp/a.bin\n");
        let file = write_yaml(&yaml);
        let config = Config::load(file.path()).unwrap();
        assert!(config.sender.enabled);
        assert_eq!(config.ssh.jump_port, 22);
    }
}
