// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel configuration.
//!
//! This is the `[kernel]` table of an application's TOML description. Every
//! field has a default, so an empty table (or `Config::default()`) describes
//! a working system.

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub pll: PllConfig,
    /// Stack size substituted for tasks that ask for the default (0).
    #[serde(default = "default_stack_size")]
    pub default_stack_size: usize,
    #[serde(default)]
    pub unbound_irq: UnboundIrq,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pll: PllConfig::default(),
            default_stack_size: default_stack_size(),
            unbound_irq: UnboundIrq::default(),
        }
    }
}

fn default_stack_size() -> usize {
    1024
}

/// Clock tree, in Hz.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PllConfig {
    pub source_clock_hz: i64,
    pub cpu_clock_hz: i64,
}

impl Default for PllConfig {
    fn default() -> Self {
        Self {
            source_clock_hz: 8_000_000,
            cpu_clock_hz: 168_000_000,
        }
    }
}

/// What to do when a source with no handler fires.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum UnboundIrq {
    /// Record it in the trace and leave the source as it is.
    #[default]
    Report,
    /// Record it and mask the source so it cannot fire again until a
    /// handler is bound.
    Mask,
}
