use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::{BotConfig, Config, MAX_SCHEDULE_HOURS};
use crate::error::ConfigError;
use crate::filter::KeywordFilter;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    log::debug!("Loaded config with {} bots", config.bots.len());
    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let mut usernames = HashSet::new();
    for bot in &config.bots {
        if !usernames.insert(bot.username.to_lowercase()) {
            return Err(ConfigError::Validation {
                message: format!("Duplicate bot username: {}", bot.username),
            });
        }
        validate_bot(bot)?;
    }

    Ok(())
}

fn validate_bot(bot: &BotConfig) -> Result<(), ConfigError> {
    for keyword in bot.negative_keywords.iter().chain(&bot.positive_keywords) {
        if let Err(e) = KeywordFilter::pattern(keyword) {
            return Err(ConfigError::InvalidPattern {
                bot: bot.username.clone(),
                keyword: keyword.clone(),
                reason: e.to_string(),
            });
        }
    }

    let probabilities = [
        ("image_post_frequency", Some(bot.image_post_frequency)),
        ("reply_probability", bot.reply_probability),
    ];
    let thresholds = bot
        .toxicity_thresholds
        .iter()
        .map(|(label, value)| (label.as_str(), Some(*value)));
    for (name, value) in probabilities.into_iter().chain(thresholds) {
        if let Some(value) = value {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Validation {
                    message: format!("{}: {} must be within [0, 1], got {}", bot.username, name, value),
                });
            }
        }
    }

    for entry in &bot.new_post_schedule {
        if !(1..=MAX_SCHEDULE_HOURS).contains(&entry.every_hours) {
            return Err(ConfigError::Validation {
                message: format!(
                    "{}: schedule for '{}' must repeat every 1 to {} hours, got {}",
                    bot.username, entry.subject, MAX_SCHEDULE_HOURS, entry.every_hours
                ),
            });
        }
    }

    Ok(())
}
