// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Raspberry Pi firmware sensors read through `vcgencmd`. Every reading is `null` on hosts
//! without the tool.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use crate::collectors::Collector;
use crate::command::{run_command, COMMAND_TIMEOUT};
use crate::error::CollectError;

const VCGENCMD_PATH: &str = "/usr/bin/vcgencmd";

const UNDERVOLT: u64 = 0x1;
const ARM_FREQ_CAPPED: u64 = 0x2;
const THROTTLED: u64 = 0x4;
const SOFT_TEMP_LIMIT: u64 = 0x8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SensorsStats {
    /// Celsius
    pub temp: Option<f64>,
    /// Core volts
    pub voltage: Option<f64>,
    pub throttled: Option<Throttled>,
}

/// Decoded `get_throttled` bitmask. Only the "currently active" bits are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Throttled {
    pub raw: u64,
    pub current_undervolt: bool,
    pub current_throttled: bool,
    pub current_soft_temp: bool,
    pub current_arm_freq_capped: bool,
}

impl Throttled {
    pub fn from_raw(raw: u64) -> Self {
        Self {
            raw,
            current_undervolt: raw & UNDERVOLT != 0,
            current_throttled: raw & THROTTLED != 0,
            current_soft_temp: raw & SOFT_TEMP_LIMIT != 0,
            current_arm_freq_capped: raw & ARM_FREQ_CAPPED != 0,
        }
    }
}

pub struct SensorsCollector {
    program: PathBuf,
}

impl Default for SensorsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorsCollector {
    pub fn new() -> Self {
        Self::with_program(VCGENCMD_PATH)
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn query<T>(
        &self,
        args: &[&str],
        parse: fn(&str) -> Result<T, CollectError>,
    ) -> Option<T> {
        let result = match run_command(&self.program, args, COMMAND_TIMEOUT).await {
            Ok(stdout) => parse(&stdout),
            Err(e) => Err(e.into()),
        };
        result
            .map_err(|e| debug!("vcgencmd {}: {e}", args.join(" ")))
            .ok()
    }
}

/// Returns the text after `=` in replies such as `temp=48.3'C`.
fn reply_value(stdout: &str) -> Result<&str, CollectError> {
    stdout
        .trim()
        .split_once('=')
        .map(|(_, value)| value.trim())
        .ok_or_else(|| CollectError::Parse(format!("unexpected vcgencmd reply: {}", stdout.trim())))
}

fn parse_number(value: &str) -> Result<f64, CollectError> {
    value
        .parse::<f64>()
        .map_err(|_| CollectError::Parse(format!("not a number: {value}")))
}

fn parse_temp(stdout: &str) -> Result<f64, CollectError> {
    let value = reply_value(stdout)?;
    parse_number(value.trim_end_matches('C').trim_end_matches('\''))
}

fn parse_volts(stdout: &str) -> Result<f64, CollectError> {
    parse_number(reply_value(stdout)?.trim_end_matches('V'))
}

fn parse_throttled(stdout: &str) -> Result<Throttled, CollectError> {
    let value = reply_value(stdout)?;
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map(Throttled::from_raw)
        .map_err(|_| CollectError::Parse(format!("not a hex mask: {value}")))
}

#[async_trait]
impl Collector for SensorsCollector {
    type Output = SensorsStats;

    fn name(&self) -> &'static str {
        "sensors"
    }

    async fn collect(&self) -> SensorsStats {
        let (temp, voltage, throttled) = tokio::join!(
            self.query(&["measure_temp"], parse_temp),
            self.query(&["measure_volts", "core"], parse_volts),
            self.query(&["get_throttled"], parse_throttled),
        );
        SensorsStats {
            temp,
            voltage,
            throttled,
        }
    }
}
