// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the sync configuration file that dotmirror uses to
//! determine what to watch, and where to mirror it. The core components only
//! ever see a fully validated [`SyncConfig`]; they never touch the file
//! format themselves.
//!
//! # General Layout
//!
//! A sync configuration is a small YAML file composed of two basic parts:
//! remote settings and a watched file listing. The remote settings name the
//! git remote to mirror against, and the credential to authenticate with.
//! The watched file listing names every local file whose content should be
//! tracked. For example:
//!
//! ```yaml
//! git:
//!   url: git@github.com:awkless/dotfiles.git
//!   ssh_key: ~/.ssh/id_ed25519
//!   branch: main
//!   remote: origin
//! mirror_path: ~/.local/share/dotmirror/mirror
//! files:
//!   - ~/.vimrc
//!   - ~/.bashrc
//! ```
//!
//! Branch and remote may be omitted, in which case they default to "main"
//! and "origin". The mirror path may be omitted as well, falling back to the
//! XDG data directory through [`default_mirror_dir`].
//!
//! [`default_mirror_dir`]: crate::path::default_mirror_dir

use crate::path::default_mirror_dir;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs,
    path::PathBuf,
    str::FromStr,
};

/// Sync configuration layout.
///
/// Names the remote mirror, the credential used to reach it, and the set of
/// watched files to keep synchronized.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Remote mirror settings.
    pub git: GitSettings,

    /// Mirror working tree location. Defaults to the XDG data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_path: Option<PathBuf>,

    /// Watched file listing. Blank entries are skipped during indexing.
    #[serde(default)]
    pub files: Vec<String>,
}

impl SyncConfig {
    /// Load and validate sync configuration from target file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file is not valid YAML.
    /// - Return [`ConfigError::MissingRemoteUrl`] if no remote URL is given.
    /// - Return [`ConfigError::MissingKeyFile`] if the credential file does
    ///   not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            source,
            path: path.clone(),
        })?;
        let config: SyncConfig = data.parse()?;
        config.validate()?;

        Ok(config)
    }

    /// Check that validated invariants hold.
    ///
    /// Callers of the core components rely on the URL being non-empty, and
    /// on the credential file existing, before any git operation starts.
    pub fn validate(&self) -> Result<()> {
        if self.git.url.is_empty() {
            return Err(ConfigError::MissingRemoteUrl);
        }

        if !self.git.ssh_key.exists() {
            return Err(ConfigError::MissingKeyFile {
                path: self.git.ssh_key.clone(),
            });
        }

        Ok(())
    }

    /// Determine mirror root to use for this run.
    pub fn mirror_root(&self) -> crate::path::Result<PathBuf> {
        match &self.mirror_path {
            Some(path) => Ok(path.clone()),
            None => default_mirror_dir(),
        }
    }
}

impl FromStr for SyncConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: SyncConfig =
            serde_yaml::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every user supplied path.
        config.git.ssh_key = PathBuf::from(
            shellexpand::full(config.git.ssh_key.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );
        if let Some(path) = config.mirror_path.take() {
            config.mirror_path = Some(PathBuf::from(
                shellexpand::full(path.to_string_lossy().as_ref())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            ));
        }
        config.files = config
            .files
            .into_iter()
            .map(|file| {
                shellexpand::full(&file)
                    .map(|expanded| expanded.into_owned())
                    .map_err(ConfigError::ShellExpansion)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(config)
    }
}

impl Display for SyncConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(serde_yaml::to_string(self).map_err(|_| FmtError)?.as_str())
    }
}

/// Remote mirror settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GitSettings {
    /// URL of remote to mirror against.
    pub url: String,

    /// Path to SSH private key used to authenticate against the remote.
    pub ssh_key: PathBuf,

    /// Branch to converge with.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Remote name to fetch from and push to.
    #[serde(default = "default_remote")]
    pub remote: String,
}

fn default_branch() -> String {
    "main".into()
}

fn default_remote() -> String {
    "origin".into()
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read sync configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] serde_yaml::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// No remote URL supplied.
    #[error("sync configuration names no remote url")]
    MissingRemoteUrl,

    /// Credential file does not exist.
    #[error("credential file {:?} does not exist", path.display())]
    MissingKeyFile { path: PathBuf },
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn deserialize_sync_config() -> anyhow::Result<()> {
        let result: SyncConfig = indoc! {r#"
            git:
              url: git@blah.org:blah/dotfiles.git
              ssh_key: $BLAH/.ssh/id_ed25519
              branch: trunk
              remote: backup
            mirror_path: $BLAH/mirror
            files:
              - $BLAH/.vimrc
              - $BLAH/.bashrc
        "#}
        .parse()?;

        let expect = SyncConfig {
            git: GitSettings {
                url: "git@blah.org:blah/dotfiles.git".into(),
                ssh_key: "/home/blah/.ssh/id_ed25519".into(),
                branch: "trunk".into(),
                remote: "backup".into(),
            },
            mirror_path: Some("/home/blah/mirror".into()),
            files: vec!["/home/blah/.vimrc".into(), "/home/blah/.bashrc".into()],
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn branch_and_remote_default_when_omitted() -> anyhow::Result<()> {
        let result: SyncConfig = indoc! {r#"
            git:
              url: git@blah.org:blah/dotfiles.git
              ssh_key: /home/blah/.ssh/id_ed25519
        "#}
        .parse()?;

        assert_eq!(result.git.branch, "main");
        assert_eq!(result.git.remote, "origin");
        assert_eq!(result.mirror_path, None);
        assert!(result.files.is_empty());

        Ok(())
    }

    #[test]
    fn validate_rejects_empty_remote_url() -> anyhow::Result<()> {
        let config: SyncConfig = indoc! {r#"
            git:
              url: ""
              ssh_key: /home/blah/.ssh/id_ed25519
        "#}
        .parse()?;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRemoteUrl)
        ));

        Ok(())
    }

    #[sealed_test]
    fn validate_rejects_missing_key_file() -> anyhow::Result<()> {
        let config: SyncConfig = indoc! {r#"
            git:
              url: git@blah.org:blah/dotfiles.git
              ssh_key: no_such_key
        "#}
        .parse()?;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingKeyFile { .. })
        ));

        Ok(())
    }

    #[sealed_test]
    fn load_accepts_valid_config_on_disk() -> anyhow::Result<()> {
        std::fs::write("id_ed25519", "not really a key")?;
        std::fs::write(
            "config.yml",
            indoc! {r#"
                git:
                  url: git@blah.org:blah/dotfiles.git
                  ssh_key: id_ed25519
                files:
                  - .vimrc
            "#},
        )?;

        let config = SyncConfig::load("config.yml")?;
        assert_eq!(config.git.url, "git@blah.org:blah/dotfiles.git");
        assert_eq!(config.files, vec![".vimrc".to_string()]);

        Ok(())
    }
}
