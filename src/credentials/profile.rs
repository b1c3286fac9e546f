//! Credentials from the shared AWS profile files.

use super::{AwsCredentials, CredentialProvider};
use crate::credentials::error::CredentialError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::{env, fs};

pub const DEFAULT_PROFILE: &str = "default";

pub const AWS_PROFILE: &str = "AWS_PROFILE";

pub const AWS_SHARED_CREDENTIALS_FILE: &str = "AWS_SHARED_CREDENTIALS_FILE";

pub const AWS_CONFIG_FILE: &str = "AWS_CONFIG_FILE";

type Profiles = HashMap<String, HashMap<String, String>>;

/// Loads a named profile from `~/.aws/credentials` and `~/.aws/config`.
///
/// Keys in the config file supplement the credentials file. A profile that
/// only names a `source_profile` borrows that profile's static keys.
#[derive(Debug, Clone)]
pub struct ProfileCredentialProvider {
    profile_name: String,
    credentials_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl ProfileCredentialProvider {
    /// Profile named by `AWS_PROFILE`, else `default`.
    pub fn new() -> Self {
        let profile = env::var(AWS_PROFILE)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        Self::with_profile(profile)
    }

    pub fn with_profile(profile_name: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
            credentials_path: None,
            config_path: None,
        }
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    fn resolve_path(explicit: &Option<PathBuf>, env_key: &str, file_name: &str) -> PathBuf {
        if let Some(path) = explicit {
            return path.clone();
        }

        if let Ok(path) = env::var(env_key) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|home| home.join(".aws").join(file_name))
            .unwrap_or_else(|| PathBuf::from("~/.aws").join(file_name))
    }

    fn parse_profile_file(content: &str) -> Profiles {
        let mut profiles = Profiles::new();
        let mut current: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = line[1..line.len() - 1].trim();
                let name = name.strip_prefix("profile ").unwrap_or(name).trim();
                profiles.entry(name.to_string()).or_default();
                current = Some(name.to_string());
                continue;
            }

            if let (Some(profile), Some((key, value))) = (&current, line.split_once('=')) {
                profiles
                    .entry(profile.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        profiles
    }

    fn load_profiles(&self) -> Profiles {
        let credentials_path =
            Self::resolve_path(&self.credentials_path, AWS_SHARED_CREDENTIALS_FILE, "credentials");
        let config_path = Self::resolve_path(&self.config_path, AWS_CONFIG_FILE, "config");

        let mut merged = Profiles::new();
        for path in [credentials_path, config_path] {
            if let Ok(content) = fs::read_to_string(&path) {
                for (name, values) in Self::parse_profile_file(&content) {
                    merged.entry(name).or_default().extend(values);
                }
            }
        }
        merged
    }

    fn credentials_from(
        &self,
        profiles: &Profiles,
        name: &str,
        visited: &mut HashSet<String>,
    ) -> Result<AwsCredentials, CredentialError> {
        if !visited.insert(name.to_string()) {
            return Err(CredentialError::ProfileError {
                message: format!("source_profile cycle detected at '{}'", name),
            });
        }

        let profile = profiles.get(name).ok_or_else(|| CredentialError::ProfileError {
            message: format!("Profile '{}' not found", name),
        })?;

        let access_key_id = profile.get("aws_access_key_id");
        let secret_access_key = profile.get("aws_secret_access_key");

        match (access_key_id, secret_access_key) {
            (Some(key), Some(secret)) => Ok(AwsCredentials::new(key, secret)
                .with_optional_session_token(profile.get("aws_session_token").cloned())),
            (None, None) if profile.contains_key("source_profile") => {
                let source = &profile["source_profile"];
                self.credentials_from(profiles, source, visited)
            }
            (None, _) => Err(CredentialError::ProfileError {
                message: format!("aws_access_key_id not found in profile '{}'", name),
            }),
            (_, None) => Err(CredentialError::ProfileError {
                message: format!("aws_secret_access_key not found in profile '{}'", name),
            }),
        }
    }
}

impl Default for ProfileCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for ProfileCredentialProvider {
    async fn credentials(&self) -> Result<AwsCredentials, CredentialError> {
        let profiles = self.load_profiles();
        self.credentials_from(&profiles, &self.profile_name, &mut HashSet::new())
    }
}
