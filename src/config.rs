use std::time::Duration;

use serde::Deserialize;

use crate::types::{AeTitle, AE};
use crate::DEFAULT_AET;

/// Runtime configuration of the dispatch core.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScpConfig {
	/// The AE title this provider presents, used as the move originator AE
	/// title of C-MOVE sub-operations.
	pub aet: AE,
	/// Time budget for transmitting a single response primitive, in
	/// milliseconds.
	pub response_timeout: u64,
	/// Time budget for one C-STORE sub-operation, in milliseconds.
	pub sub_operation_timeout: u64,
	/// Time budget for establishing the outbound C-MOVE association, in
	/// milliseconds.
	pub associate_timeout: u64,
}

impl Default for ScpConfig {
	fn default() -> Self {
		Self {
			aet: AE::from(DEFAULT_AET),
			response_timeout: 30_000,
			sub_operation_timeout: 60_000,
			associate_timeout: 30_000,
		}
	}
}

impl ScpConfig {
	/// Loads the configuration from the following sources:
	/// 1. Defaults (defined in `defaults.toml`)
	/// 2. `dimse-scp.toml` in the working directory
	/// 3. Environment variables, prefixed with `DIMSE_SCP`
	/// # Errors
	/// Returns a [`config::ConfigError`] if source collection fails.
	pub fn new() -> Result<Self, config::ConfigError> {
		use config::{Config, Environment, File, FileFormat};
		Config::builder()
			.add_source(File::from_str(
				include_str!("defaults.toml"),
				FileFormat::Toml,
			))
			.add_source(File::with_name("dimse-scp.toml").required(false))
			.add_source(Environment::with_prefix("DIMSE_SCP").separator("_"))
			.build()?
			.try_deserialize()
	}

	pub const fn response_timeout(&self) -> Duration {
		Duration::from_millis(self.response_timeout)
	}

	pub const fn sub_operation_timeout(&self) -> Duration {
		Duration::from_millis(self.sub_operation_timeout)
	}

	pub const fn associate_timeout(&self) -> Duration {
		Duration::from_millis(self.associate_timeout)
	}

	/// The configured AE title in wire form. Falls back to [`DEFAULT_AET`]
	/// when the configured value is not a valid AE title.
	pub fn ae_title(&self) -> AeTitle {
		AeTitle::new(&self.aet).unwrap_or_else(|_| {
			AeTitle::new(DEFAULT_AET).expect("the default AE title should be valid")
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn embedded_defaults_deserialize() {
		let config = ScpConfig::new().expect("defaults should deserialize");
		assert_eq!(config.aet, DEFAULT_AET);
		assert_eq!(config.response_timeout(), Duration::from_secs(30));
		assert_eq!(config.sub_operation_timeout(), Duration::from_secs(60));
	}

	#[test]
	fn default_matches_embedded_defaults() {
		let config = ScpConfig::default();
		assert_eq!(config.aet, DEFAULT_AET);
		assert_eq!(config.associate_timeout(), Duration::from_secs(30));
	}
}
