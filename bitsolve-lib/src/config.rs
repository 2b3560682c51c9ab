// BSD 2-Clause License
//
// Copyright (c) 2019, 2020 Alasdair Armstrong
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
// 1. Redistributions of source code must retain the above copyright
// notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright
// notice, this list of conditions and the following disclaimer in the
// documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! This module loads a TOML file containing the solver
//! configuration. Every option has a default, so an empty file (or
//! [SolverConfig::default]) gives a usable configuration.
//!
//! ```toml
//! [normalize]
//! share_aware = true
//!
//! [quant]
//! synth = "el"
//! synth_limit = 10000
//! synth_qi = true
//! synth_ite_complete = false
//! dual_solver = true
//!
//! [log]
//! flags = ["quant", "normalize"]
//! ```

use serde::Serialize;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use toml::Value;

use crate::log;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SynthMode {
    /// Never synthesize terms, always use the if-then-else model.
    None,
    /// Enumerate terms that match the input/output examples.
    El,
}

#[derive(Clone, Debug, Serialize)]
pub struct SolverConfig {
    pub share_aware: bool,
    pub synth: SynthMode,
    pub synth_limit: u32,
    pub synth_qi: bool,
    pub synth_ite_complete: bool,
    pub dual_solver: bool,
    pub log_flags: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            share_aware: true,
            synth: SynthMode::El,
            synth_limit: 10000,
            synth_qi: true,
            synth_ite_complete: false,
            dual_solver: true,
            log_flags: 0,
        }
    }
}

fn get_table_bool(config: &Value, table: &str, key: &str, default: bool) -> Result<bool, String> {
    match config.get(table).and_then(|t| t.get(key)) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(_) => Err(format!("Configuration option {}.{} must be a boolean", table, key)),
        None => Ok(default),
    }
}

fn get_table_u32(config: &Value, table: &str, key: &str, default: u32) -> Result<u32, String> {
    match config.get(table).and_then(|t| t.get(key)) {
        Some(Value::Integer(i)) if *i > 0 && *i <= u32::MAX as i64 => Ok(*i as u32),
        Some(_) => Err(format!("Configuration option {}.{} must be a positive integer", table, key)),
        None => Ok(default),
    }
}

fn get_synth_mode(config: &Value) -> Result<SynthMode, String> {
    match config.get("quant").and_then(|t| t.get("synth")) {
        Some(Value::String(mode)) => match mode.as_str() {
            "none" => Ok(SynthMode::None),
            "el" => Ok(SynthMode::El),
            _ => Err(format!("Unknown synthesis mode {}, expected \"none\" or \"el\"", mode)),
        },
        Some(_) => Err("Configuration option quant.synth must be a string".to_string()),
        None => Ok(SynthMode::El),
    }
}

fn get_log_flags(config: &Value) -> Result<u32, String> {
    match config.get("log").and_then(|t| t.get("flags")) {
        Some(Value::Array(flags)) => flags.iter().try_fold(0, |acc, v| {
            let name = v.as_str().ok_or_else(|| "Each log flag must be a string value".to_string())?;
            let flag = log::flag_from_name(name).ok_or_else(|| format!("Unknown log flag {}", name))?;
            Ok(acc | flag)
        }),
        Some(_) => Err("Configuration option log.flags must be an array".to_string()),
        None => Ok(0),
    }
}

impl SolverConfig {
    pub fn parse(contents: &str) -> Result<Self, String> {
        let config = match contents.parse::<Value>() {
            Ok(config) => config,
            Err(e) => return Err(format!("Error when parsing configuration: {}", e)),
        };

        Ok(SolverConfig {
            share_aware: get_table_bool(&config, "normalize", "share_aware", true)?,
            synth: get_synth_mode(&config)?,
            synth_limit: get_table_u32(&config, "quant", "synth_limit", 10000)?,
            synth_qi: get_table_bool(&config, "quant", "synth_qi", true)?,
            synth_ite_complete: get_table_bool(&config, "quant", "synth_ite_complete", false)?,
            dual_solver: get_table_bool(&config, "quant", "dual_solver", true)?,
            log_flags: get_log_flags(&config)?,
        })
    }

    pub fn from_file<P>(path: P) -> Result<Self, String>
    where
        P: AsRef<Path>,
    {
        let mut contents = String::new();
        match File::open(&path) {
            Ok(mut handle) => match handle.read_to_string(&mut contents) {
                Ok(_) => (),
                Err(e) => return Err(format!("Unexpected failure while reading config: {}", e)),
            },
            Err(e) => return Err(format!("Error when loading config '{}': {}", path.as_ref().display(), e)),
        };
        Self::parse(&contents)
    }
}
