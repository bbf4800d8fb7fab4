// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-wide configuration entries.
//!
//! All tunables of the optimizer arrive as string key/value entries from a
//! single configuration object in the hosting cluster. Keys are
//! SCREAMING_SNAKE_CASE on the wire; unrecognized keys are rejected so a
//! typo in the configuration object surfaces as an error instead of a
//! silently ignored entry.

use std::collections::HashMap;
use std::time::Duration;

use paste::paste;

use crate::error::{Error, Result};
use crate::model::{Accelerator, ServiceClass};

/// Default optimization interval when `GLOBAL_OPT_INTERVAL` is unset.
pub const DEFAULT_OPT_INTERVAL: Duration = Duration::from_secs(60);

macro_rules! for_all_entries {
    ($macro:ident) => {
        $macro! {
            { global_opt_interval },
            { experimental_model_tuner_enabled },
            { experimental_auto_guess_initial_state },
            { metrics_base_url },
            { metrics_bearer_token },
            { metrics_tls_insecure_skip_verify },
            { saturation_policy },
            { delayed_best_effort },
            { accel_penalty },
            { accelerator_cost_table },
            { service_class_table },
        }
    };
}

/// Define `<FIELD>_KEY` constants for use of other modules.
macro_rules! def_key {
    ($({ $field:ident },)*) => {
        paste! {
            $(
                pub const [<$field:upper _KEY>]: &str = stringify!([<$field:upper>]);
            )*

            pub const ALL_KEYS: &[&str] = &[
                $(stringify!([<$field:upper>]),)*
            ];
        }
    };
}

for_all_entries!(def_key);

/// Parsed configuration entries. Every entry has a default so a fresh
/// installation works with an empty configuration object; the accelerator
/// and service-class tables are validated separately by the engine, which
/// fails the tick when they are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Requeue period of the optimization loop.
    pub global_opt_interval: Duration,
    pub experimental_model_tuner_enabled: bool,
    pub experimental_auto_guess_initial_state: bool,
    /// Base URL of the metrics backend, e.g. `http://prometheus:9090`.
    pub metrics_base_url: Option<String>,
    /// Bearer token for the metrics backend. Credential wiring is owned by
    /// the hosting runtime; the entry is only carried through.
    pub metrics_bearer_token: Option<String>,
    pub metrics_tls_insecure_skip_verify: bool,
    /// String form of the saturated-allocation policy, parsed by the solver.
    pub saturation_policy: String,
    pub delayed_best_effort: bool,
    /// Transition-penalty factor for moving a variant across accelerator
    /// types.
    pub accel_penalty: f64,
    /// JSON document mapping accelerator type to its cost attributes.
    pub accelerator_cost_table: Option<String>,
    /// JSON document listing service classes and their per-model SLOs.
    pub service_class_table: Option<String>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            global_opt_interval: DEFAULT_OPT_INTERVAL,
            experimental_model_tuner_enabled: false,
            experimental_auto_guess_initial_state: false,
            metrics_base_url: None,
            metrics_bearer_token: None,
            metrics_tls_insecure_skip_verify: false,
            saturation_policy: "None".to_owned(),
            delayed_best_effort: false,
            accel_penalty: 0.1,
            accelerator_cost_table: None,
            service_class_table: None,
        }
    }
}

impl OptimizerConfig {
    /// Build a config from raw entries. Unrecognized keys and unparsable
    /// values are errors; absent keys fall back to defaults.
    pub fn from_kv<K, V>(kvs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (k, v) in kvs {
            let (k, v) = (k.as_ref(), v.as_ref());
            match k {
                GLOBAL_OPT_INTERVAL_KEY => {
                    config.global_opt_interval = parse_duration(k, v)?;
                }
                EXPERIMENTAL_MODEL_TUNER_ENABLED_KEY => {
                    config.experimental_model_tuner_enabled = parse_bool(k, v)?;
                }
                EXPERIMENTAL_AUTO_GUESS_INITIAL_STATE_KEY => {
                    config.experimental_auto_guess_initial_state = parse_bool(k, v)?;
                }
                METRICS_BASE_URL_KEY => {
                    config.metrics_base_url = Some(v.to_owned());
                }
                METRICS_BEARER_TOKEN_KEY => {
                    config.metrics_bearer_token = Some(v.to_owned());
                }
                METRICS_TLS_INSECURE_SKIP_VERIFY_KEY => {
                    config.metrics_tls_insecure_skip_verify = parse_bool(k, v)?;
                }
                SATURATION_POLICY_KEY => {
                    config.saturation_policy = v.to_owned();
                }
                DELAYED_BEST_EFFORT_KEY => {
                    config.delayed_best_effort = parse_bool(k, v)?;
                }
                ACCEL_PENALTY_KEY => {
                    config.accel_penalty = parse_f64(k, v)?;
                }
                ACCELERATOR_COST_TABLE_KEY => {
                    config.accelerator_cost_table = Some(v.to_owned());
                }
                SERVICE_CLASS_TABLE_KEY => {
                    config.service_class_table = Some(v.to_owned());
                }
                _ => {
                    return Err(Error::ConfigInvalid {
                        key: k.to_owned(),
                        message: "unrecognized configuration entry".to_owned(),
                    });
                }
            }
        }
        Ok(config)
    }

    /// Parse the accelerator cost table, keyed by accelerator type.
    pub fn accelerator_table(&self) -> Result<HashMap<String, Accelerator>> {
        let raw = self
            .accelerator_cost_table
            .as_deref()
            .ok_or_else(|| Error::ConfigMissing(ACCELERATOR_COST_TABLE_KEY.to_owned()))?;
        let accelerators: Vec<Accelerator> =
            serde_json::from_str(raw).map_err(|e| Error::ConfigInvalid {
                key: ACCELERATOR_COST_TABLE_KEY.to_owned(),
                message: e.to_string(),
            })?;
        Ok(accelerators
            .into_iter()
            .map(|acc| (acc.name.clone(), acc))
            .collect())
    }

    /// Parse the service-class table, keyed by class name.
    pub fn service_class_table(&self) -> Result<HashMap<String, ServiceClass>> {
        let raw = self
            .service_class_table
            .as_deref()
            .ok_or_else(|| Error::ConfigMissing(SERVICE_CLASS_TABLE_KEY.to_owned()))?;
        let classes: Vec<ServiceClass> =
            serde_json::from_str(raw).map_err(|e| Error::ConfigInvalid {
                key: SERVICE_CLASS_TABLE_KEY.to_owned(),
                message: e.to_string(),
            })?;
        for class in &classes {
            class.validate().map_err(|message| Error::ConfigInvalid {
                key: SERVICE_CLASS_TABLE_KEY.to_owned(),
                message,
            })?;
        }
        Ok(classes
            .into_iter()
            .map(|class| (class.name.clone(), class))
            .collect())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value.parse().map_err(|_| Error::ConfigInvalid {
        key: key.to_owned(),
        message: format!("expected a boolean, got {value:?}"),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64> {
    value.parse().map_err(|_| Error::ConfigInvalid {
        key: key.to_owned(),
        message: format!("expected a number, got {value:?}"),
    })
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| Error::ConfigInvalid {
        key: key.to_owned(),
        message: e.to_string(),
    })
}
