use std::path::Path;

use crate::error::SettingsError;

const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

/// Credentials and model ids for OpenAI-hosted clients.
///
/// Read from the process environment; `from_env_file` first loads a
/// dotenv-style file without overriding variables that are already set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAISettings {
    pub api_key: String,
    pub base_url: Option<String>,
    pub chat_model_id: Option<String>,
    pub responses_model_id: Option<String>,
    pub org_id: Option<String>,
}

impl OpenAISettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        load_env_file(path.as_ref())?;
        Self::from_env()
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        Ok(Self {
            api_key: required(&lookup, "OPENAI_API_KEY")?,
            base_url: optional(&lookup, "OPENAI_BASE_URL"),
            chat_model_id: optional(&lookup, "OPENAI_CHAT_MODEL_ID"),
            responses_model_id: optional(&lookup, "OPENAI_RESPONSES_MODEL_ID"),
            org_id: optional(&lookup, "OPENAI_ORG_ID"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureOpenAISettings {
    pub api_key: String,
    pub endpoint: String,
    pub chat_deployment_name: String,
    pub api_version: String,
}

impl AzureOpenAISettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        load_env_file(path.as_ref())?;
        Self::from_env()
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        Ok(Self {
            api_key: required(&lookup, "AZURE_OPENAI_API_KEY")?,
            endpoint: required(&lookup, "AZURE_OPENAI_ENDPOINT")?,
            chat_deployment_name: required(&lookup, "AZURE_OPENAI_CHAT_DEPLOYMENT_NAME")?,
            api_version: optional(&lookup, "AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        })
    }
}

fn load_env_file(path: &Path) -> Result<(), SettingsError> {
    dotenvy::from_path(path).map_err(|err| SettingsError::EnvFile {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    tracing::debug!(path = %path.display(), "loaded env file");
    Ok(())
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, SettingsError> {
    optional(lookup, name).ok_or(SettingsError::Missing(name))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn openai_settings_require_api_key() {
        let err = OpenAISettings::from_lookup(lookup_from(&[("OPENAI_CHAT_MODEL_ID", "gpt-4o")]))
            .expect_err("missing key");
        assert!(matches!(err, SettingsError::Missing("OPENAI_API_KEY")));
    }

    #[test]
    fn openai_settings_treat_blank_values_as_unset() {
        let settings = OpenAISettings::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "  "),
            ("OPENAI_RESPONSES_MODEL_ID", "gpt-5-nano"),
        ]))
        .expect("settings load");

        assert_eq!(settings.api_key, "sk-test");
        assert_eq!(settings.base_url, None);
        assert_eq!(settings.responses_model_id.as_deref(), Some("gpt-5-nano"));
    }

    #[test]
    fn azure_settings_default_api_version() {
        let settings = AzureOpenAISettings::from_lookup(lookup_from(&[
            ("AZURE_OPENAI_API_KEY", "key"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
            ("AZURE_OPENAI_CHAT_DEPLOYMENT_NAME", "gpt-4o"),
        ]))
        .expect("settings load");

        assert_eq!(settings.api_version, DEFAULT_AZURE_API_VERSION);
    }

    #[test]
    fn missing_env_file_is_reported() {
        let err = OpenAISettings::from_env_file("/nonexistent/agent-orchestra/.env")
            .expect_err("file missing");
        assert!(matches!(err, SettingsError::EnvFile { .. }));
    }
}
