// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! SHDR line tokenizer.
//!
//! Splits `timestamp|key|value|key|value...` lines on unquoted pipes.
//! Protocol command lines (`* key: value`) short-circuit into a
//! [`DeviceCommand`] instead of the token path.

use std::collections::VecDeque;

use super::transform::{DeviceCommand, PipelineData, Tokens, Transform};
use super::PipelineContext;

pub struct ShdrTokenizer;

impl ShdrTokenizer {
    pub fn new() -> Self {
        Self
    }

    /// Split on `|`, honoring single/double quotes and `\`-escapes so
    /// quoted values may contain pipes.
    pub fn tokenize(line: &str) -> VecDeque<String> {
        let mut tokens = VecDeque::new();
        let mut current = String::new();
        let mut quote: Option<char> = None;
        let mut escaped = false;

        for c in line.chars() {
            if escaped {
                current.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '\'' | '"' => {
                    match quote {
                        None => quote = Some(c),
                        Some(q) if q == c => quote = None,
                        Some(_) => {}
                    }
                    current.push(c);
                }
                '|' if quote.is_none() => {
                    tokens.push_back(current.trim().to_string());
                    current = String::new();
                }
                _ => current.push(c),
            }
        }
        tokens.push_back(current.trim().to_string());
        tokens
    }
}

impl Default for ShdrTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for ShdrTokenizer {
    fn name(&self) -> &str {
        "ShdrTokenizer"
    }

    fn accepts(&self, data: &PipelineData) -> bool {
        matches!(data, PipelineData::Raw(_))
    }

    fn apply(&self, data: PipelineData, _ctx: &PipelineContext) -> Option<PipelineData> {
        let PipelineData::Raw(line) = data else {
            return None;
        };
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        // `* key: value` adapter protocol commands bypass tokenization.
        if let Some(rest) = line.strip_prefix('*') {
            let (key, value) = match rest.split_once(':') {
                Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
                None => (rest.trim().to_string(), String::new()),
            };
            // A pushed device model takes the device side channel.
            if key == "device" || key == "devices" {
                return Some(PipelineData::DeviceModel(value));
            }
            return Some(PipelineData::Command(DeviceCommand::Protocol { key, value }));
        }

        Some(PipelineData::Tokens(Tokens {
            tokens: Self::tokenize(line),
        }))
    }
}
