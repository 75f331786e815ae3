use std::path::Path;

use crate::{Config, TemplateName};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured or a provider's
    /// settings are contradictory
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.llm.providers.is_empty() {
            anyhow::bail!("at least one LLM provider must be configured");
        }

        self.llm.transport.connect_timeout()?;
        self.llm.transport.request_timeout()?;
        validate_retry(&self.llm.retry, "llm.retry")?;

        for (id, provider) in &self.llm.providers {
            if id.trim().is_empty() {
                anyhow::bail!("provider ids must not be empty");
            }

            if let Some(ref retry) = provider.retry {
                validate_retry(retry, &format!("provider '{id}' retry"))?;
            }

            match (provider.template, &provider.custom_template) {
                (Some(TemplateName::Custom), None) => {
                    anyhow::bail!("provider '{id}' uses template \"custom\" but has no [custom_template] table");
                }
                (Some(template), Some(_)) if template != TemplateName::Custom => {
                    anyhow::bail!("provider '{id}' sets custom_template but template is \"{template}\"");
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn validate_retry(retry: &crate::RetryConfig, scope: &str) -> anyhow::Result<()> {
    retry
        .initial_delay()
        .map_err(|e| anyhow::anyhow!("{scope}: {e}"))?;

    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        anyhow::bail!("{scope}: backoff_multiplier must be at least 1.0");
    }

    Ok(())
}
