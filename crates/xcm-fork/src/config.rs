// SPDX-License-Identifier: GPL-3.0

//! Layered fork configuration.
//!
//! Options come from three layers, highest precedence first:
//!
//! 1. call-site [`ForkOptions`] passed by the scenario,
//! 2. environment variables ([`ForkOptions::from_env`]),
//! 3. the documented defaults of a [`NetworkProfile`].
//!
//! [`ForkOptions::layer`] merges them into a total [`ForkParams`]. Invalid values
//! supplied at the call site are errors; invalid environment values are logged and
//! ignored.

use crate::{
	error::ConfigError,
	message::ChannelLimits,
	runtime::RuntimeConfig,
	strings::config::{defaults, env, networks},
};
use std::path::PathBuf;
use subxt::config::substrate::H256;
use url::Url;

/// Connection and fork options of one network, every field optional.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ForkOptions {
	/// Endpoints to try, in order.
	pub endpoints: Option<Vec<String>>,
	pub block_number: Option<u32>,
	pub block_hash: Option<H256>,
	/// Local runtime replacing the on-chain `:code`.
	pub wasm_override: Option<PathBuf>,
	/// SQLite file for the storage cache.
	pub database: Option<PathBuf>,
	/// Use an in-memory cache even if a database is configured.
	pub without_database: Option<bool>,
	pub mock_signature_host: Option<bool>,
	pub runtime_log_level: Option<u32>,
	/// Skip chain detection and treat the chain as this parachain.
	pub para_id: Option<u32>,
	pub channel_limits: Option<ChannelLimits>,
	pub slot_duration_ms: Option<u64>,
}

/// Where the fork starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForkPoint {
	/// The finalized head at connection time.
	#[default]
	Finalized,
	Number(u32),
	Hash(H256),
}

/// Fully resolved fork parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ForkParams {
	pub endpoints: Vec<Url>,
	pub fork_point: ForkPoint,
	pub wasm_override: Option<PathBuf>,
	/// `None` keeps the cache in memory.
	pub database: Option<PathBuf>,
	pub runtime: RuntimeConfig,
	pub para_id: Option<u32>,
	pub channel_limits: ChannelLimits,
	/// `None` uses the chain kind's default.
	pub slot_duration_ms: Option<u64>,
}

impl ForkParams {
	/// Parameters for a fork of `endpoint` at its finalized head, without a database.
	pub fn new(endpoint: Url) -> Self {
		Self {
			endpoints: vec![endpoint],
			fork_point: ForkPoint::Finalized,
			wasm_override: None,
			database: None,
			runtime: RuntimeConfig::default(),
			para_id: None,
			channel_limits: ChannelLimits::default(),
			slot_duration_ms: None,
		}
	}
}

fn env_value(name: &str) -> Option<String> {
	std::env::var(name)
		.ok()
		.map(|value| value.trim().to_string())
		.filter(|value| !value.is_empty())
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ConfigError> {
	Url::parse(endpoint.trim()).map_err(|e| ConfigError::InvalidEndpoint {
		endpoint: endpoint.to_string(),
		message: e.to_string(),
	})
}

impl ForkOptions {
	/// Read the environment layer for the variable prefix `prefix` (e.g. `POLKADOT`).
	///
	/// Reads `<PREFIX>_ENDPOINT` (comma separated), `<PREFIX>_BLOCK_NUMBER`,
	/// `<PREFIX>_WASM` and `RUN_TESTS_WITHOUT_DB`. Empty values count as unset.
	pub fn from_env(prefix: &str) -> Self {
		let mut options = ForkOptions::default();

		let name = format!("{prefix}{}", env::ENDPOINT_SUFFIX);
		if let Some(value) = env_value(&name) {
			let endpoints: Vec<String> = value
				.split(',')
				.map(str::trim)
				.filter(|endpoint| !endpoint.is_empty())
				.map(str::to_string)
				.collect();
			match endpoints.iter().try_for_each(|endpoint| parse_endpoint(endpoint).map(|_| ())) {
				Ok(()) if !endpoints.is_empty() => options.endpoints = Some(endpoints),
				Ok(()) => {},
				Err(e) => log::warn!("Ignoring {name}: {e}"),
			}
		}

		let name = format!("{prefix}{}", env::BLOCK_NUMBER_SUFFIX);
		if let Some(value) = env_value(&name) {
			match value.parse::<u32>() {
				Ok(number) => options.block_number = Some(number),
				Err(e) => log::warn!("Ignoring {name}={value}: {e}"),
			}
		}

		let name = format!("{prefix}{}", env::WASM_SUFFIX);
		options.wasm_override = env_value(&name).map(PathBuf::from);

		if env_value(env::RUN_TESTS_WITHOUT_DB).is_some() {
			options.without_database = Some(true);
		}
		options
	}

	/// Merge `call_site` over `env` over `defaults`.
	///
	/// # Errors
	///
	/// - [`ConfigError::AmbiguousForkPoint`] if one layer gives both a block number
	///   and a block hash.
	/// - [`ConfigError::InvalidEndpoint`] if the chosen endpoint list has an invalid URL.
	/// - [`ConfigError::ZeroLimit`] if the chosen channel limits can never drain.
	pub fn layer(
		call_site: &ForkOptions,
		env: &ForkOptions,
		defaults: &ForkOptions,
	) -> Result<ForkParams, ConfigError> {
		let layers = [call_site, env, defaults];

		let mut fork_point = ForkPoint::Finalized;
		for layer in layers {
			match (layer.block_number, layer.block_hash) {
				(Some(_), Some(_)) => return Err(ConfigError::AmbiguousForkPoint),
				(Some(number), None) => fork_point = ForkPoint::Number(number),
				(None, Some(hash)) => fork_point = ForkPoint::Hash(hash),
				(None, None) => continue,
			}
			break;
		}

		let endpoints = pick(&layers, |l| l.endpoints.clone().filter(|e| !e.is_empty()))
			.unwrap_or_default()
			.iter()
			.map(|endpoint| parse_endpoint(endpoint))
			.collect::<Result<Vec<_>, _>>()?;

		// A layer disabling the database also hides the paths of the layers below it.
		let database = pick(&layers, |l| match l.without_database {
			Some(true) => Some(None),
			_ => l.database.clone().map(Some),
		})
		.flatten();

		let channel_limits = pick(&layers, |l| l.channel_limits).unwrap_or_default();
		channel_limits.validate()?;

		Ok(ForkParams {
			endpoints,
			fork_point,
			wasm_override: pick(&layers, |l| l.wasm_override.clone()),
			database,
			runtime: RuntimeConfig {
				mock_signature_host: pick(&layers, |l| l.mock_signature_host).unwrap_or_default(),
				log_level: pick(&layers, |l| l.runtime_log_level).unwrap_or_default(),
			},
			para_id: pick(&layers, |l| l.para_id),
			channel_limits,
			slot_duration_ms: pick(&layers, |l| l.slot_duration_ms),
		})
	}
}

/// First value found, from the highest precedence layer down.
fn pick<T>(layers: &[&ForkOptions], value: impl Fn(&ForkOptions) -> Option<T>) -> Option<T> {
	layers.iter().find_map(|layer| value(layer))
}

/// Documented defaults of a known network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkProfile {
	pub name: &'static str,
	/// Prefix of the network's environment variables.
	pub env_prefix: &'static str,
	pub endpoints: &'static [&'static str],
	pub block_number: u32,
	/// Database file name, relative to the working directory.
	pub database: &'static str,
	pub mock_signature_host: bool,
	pub runtime_log_level: u32,
}

impl NetworkProfile {
	pub fn polkadot() -> Self {
		Self {
			name: networks::POLKADOT,
			env_prefix: "POLKADOT",
			endpoints: &[defaults::POLKADOT_ENDPOINT],
			block_number: defaults::POLKADOT_BLOCK,
			database: defaults::POLKADOT_DATABASE,
			mock_signature_host: false,
			runtime_log_level: 0,
		}
	}

	pub fn asset_hub() -> Self {
		Self {
			name: networks::ASSET_HUB,
			env_prefix: "ASSET_HUB",
			endpoints: &[defaults::ASSET_HUB_ENDPOINT],
			block_number: defaults::ASSET_HUB_BLOCK,
			database: defaults::ASSET_HUB_DATABASE,
			mock_signature_host: false,
			runtime_log_level: defaults::VERBOSE_RUNTIME_LOG_LEVEL,
		}
	}

	pub fn frequency() -> Self {
		Self {
			name: networks::FREQUENCY,
			env_prefix: "FREQUENCY",
			endpoints: &[defaults::FREQUENCY_ENDPOINT],
			block_number: defaults::FREQUENCY_BLOCK,
			database: defaults::FREQUENCY_DATABASE,
			mock_signature_host: true,
			runtime_log_level: defaults::VERBOSE_RUNTIME_LOG_LEVEL,
		}
	}

	/// The built-in profile called `name`.
	pub fn by_name(name: &str) -> Option<Self> {
		match name {
			networks::POLKADOT => Some(Self::polkadot()),
			networks::ASSET_HUB => Some(Self::asset_hub()),
			networks::FREQUENCY => Some(Self::frequency()),
			_ => None,
		}
	}

	/// The defaults layer.
	pub fn defaults(&self) -> ForkOptions {
		ForkOptions {
			endpoints: Some(self.endpoints.iter().map(|e| e.to_string()).collect()),
			block_number: Some(self.block_number),
			database: Some(PathBuf::from(self.database)),
			mock_signature_host: Some(self.mock_signature_host),
			runtime_log_level: Some(self.runtime_log_level),
			..Default::default()
		}
	}

	/// Resolve `call_site` over the current environment and this profile's defaults.
	pub fn resolve(&self, call_site: &ForkOptions) -> Result<ForkParams, ConfigError> {
		ForkOptions::layer(call_site, &ForkOptions::from_env(self.env_prefix), &self.defaults())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::ChannelLimit;

	const ENV_VARS: [&str; 4] =
		["POLKADOT_ENDPOINT", "POLKADOT_BLOCK_NUMBER", "POLKADOT_WASM", env::RUN_TESTS_WITHOUT_DB];

	fn unset() -> Vec<(&'static str, Option<&'static str>)> {
		ENV_VARS.iter().map(|name| (*name, None)).collect()
	}

	#[test]
	fn defaults_apply_without_overrides() {
		temp_env::with_vars(unset(), || {
			let params = NetworkProfile::polkadot().resolve(&ForkOptions::default()).unwrap();
			assert_eq!(params.endpoints, vec![Url::parse(defaults::POLKADOT_ENDPOINT).unwrap()]);
			assert_eq!(params.fork_point, ForkPoint::Number(defaults::POLKADOT_BLOCK));
			assert_eq!(params.database, Some(PathBuf::from("polkadot-db.sqlite")));
			assert_eq!(params.wasm_override, None);
			assert_eq!(params.runtime, RuntimeConfig::default());
			assert_eq!(params.channel_limits, ChannelLimits::default());
		});
	}

	#[test]
	fn environment_overrides_defaults() {
		temp_env::with_vars(
			[
				("POLKADOT_ENDPOINT", Some("ws://a:9944, ws://b:9944")),
				("POLKADOT_BLOCK_NUMBER", Some("42")),
				("POLKADOT_WASM", Some("/tmp/runtime.wasm")),
				(env::RUN_TESTS_WITHOUT_DB, Some("1")),
			],
			|| {
				let params = NetworkProfile::polkadot().resolve(&ForkOptions::default()).unwrap();
				assert_eq!(params.endpoints.len(), 2);
				assert_eq!(params.endpoints[1].as_str(), "ws://b:9944/");
				assert_eq!(params.fork_point, ForkPoint::Number(42));
				assert_eq!(params.wasm_override, Some(PathBuf::from("/tmp/runtime.wasm")));
				assert_eq!(params.database, None);
			},
		);
	}

	#[test]
	fn empty_without_db_flag_keeps_the_database() {
		temp_env::with_vars([(env::RUN_TESTS_WITHOUT_DB, Some(""))], || {
			assert_eq!(ForkOptions::from_env("POLKADOT").without_database, None);
		});
		temp_env::with_vars(
			[("POLKADOT_ENDPOINT", None), (env::RUN_TESTS_WITHOUT_DB, Some(""))],
			|| {
				let params = NetworkProfile::polkadot().resolve(&ForkOptions::default()).unwrap();
				assert_eq!(params.database, Some(PathBuf::from("polkadot-db.sqlite")));
			},
		);
	}

	#[test]
	fn call_site_overrides_environment() {
		temp_env::with_vars([("POLKADOT_BLOCK_NUMBER", Some("42"))], || {
			let call_site = ForkOptions {
				block_hash: Some(H256::repeat_byte(1)),
				endpoints: Some(vec!["ws://local:9944".to_string()]),
				database: Some(PathBuf::from("custom.sqlite")),
				..Default::default()
			};
			let params = NetworkProfile::polkadot().resolve(&call_site).unwrap();
			assert_eq!(params.fork_point, ForkPoint::Hash(H256::repeat_byte(1)));
			assert_eq!(params.endpoints[0].as_str(), "ws://local:9944/");
			assert_eq!(params.database, Some(PathBuf::from("custom.sqlite")));
		});
	}

	#[test]
	fn invalid_environment_values_fall_back() {
		temp_env::with_vars(
			[
				("POLKADOT_ENDPOINT", Some("not a url")),
				("POLKADOT_BLOCK_NUMBER", Some("latest")),
				("POLKADOT_WASM", Some("")),
				(env::RUN_TESTS_WITHOUT_DB, None),
			],
			|| {
				let env = ForkOptions::from_env("POLKADOT");
				assert_eq!(env, ForkOptions::default());
				let params = NetworkProfile::polkadot().resolve(&ForkOptions::default()).unwrap();
				assert_eq!(params.fork_point, ForkPoint::Number(defaults::POLKADOT_BLOCK));
			},
		);
	}

	#[test]
	fn invalid_call_site_values_are_errors() {
		let empty = ForkOptions::default();
		let bad_endpoint =
			ForkOptions { endpoints: Some(vec!["nope".to_string()]), ..Default::default() };
		assert!(matches!(
			ForkOptions::layer(&bad_endpoint, &empty, &empty),
			Err(ConfigError::InvalidEndpoint { .. })
		));

		let ambiguous = ForkOptions {
			block_number: Some(1),
			block_hash: Some(H256::zero()),
			..Default::default()
		};
		assert!(matches!(
			ForkOptions::layer(&ambiguous, &empty, &empty),
			Err(ConfigError::AmbiguousForkPoint)
		));

		let zero = ForkOptions {
			channel_limits: Some(ChannelLimits::uniform(ChannelLimit {
				max_messages: 0,
				max_bytes: 1,
			})),
			..Default::default()
		};
		assert!(matches!(ForkOptions::layer(&zero, &empty, &empty), Err(ConfigError::ZeroLimit(_))));
	}

	#[test]
	fn empty_layers_resolve_to_absent_values() {
		let empty = ForkOptions::default();
		let params = ForkOptions::layer(&empty, &empty, &empty).unwrap();
		assert!(params.endpoints.is_empty());
		assert_eq!(params.fork_point, ForkPoint::Finalized);
		assert_eq!(params.database, None);
		assert_eq!(params.slot_duration_ms, None);
	}

	#[test]
	fn profiles_carry_documented_defaults() {
		let frequency = NetworkProfile::by_name("frequency").unwrap();
		assert!(frequency.mock_signature_host);
		assert_eq!(frequency.runtime_log_level, 5);
		assert_eq!(frequency.database, "frequency-db.sqlite");
		assert_eq!(NetworkProfile::by_name("asset_hub").unwrap().database, "asset-hub-db.sqlite");
		assert_eq!(NetworkProfile::by_name("kusama"), None);
	}
}
