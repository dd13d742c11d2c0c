use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use serde_json::json;
use taskquest_core::Config;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Section {
    Rewards,
    League,
    TimeWindows,
    Profile,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value by dotted key
    Get {
        /// e.g. "rewards.task_reward", "time_windows.utc_offset_hours"
        key: String,
    },
    /// Change one value and save it
    Set { key: String, value: String },
    /// Print the whole config, or one section of it, as JSON
    #[command(visible_alias = "list")]
    Show {
        #[arg(long, value_enum)]
        section: Option<Section>,
    },
    /// Report which achievement windows an hour falls in
    Windows {
        /// Local hour 0-23; defaults to the current hour at the configured offset
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
        hour: Option<u32>,
    },
    /// Print the config file location
    Path,
    /// Overwrite the config file with defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let value = Config::load()?
                .get(&key)
                .ok_or_else(|| format!("unknown key: {key}"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            // Echo the parsed value, which may differ in form from the input.
            println!("{key} = {}", config.get(&key).unwrap_or(value));
        }
        ConfigAction::Show { section } => {
            let config = Config::load()?;
            let shown = match section {
                None => serde_json::to_value(&config)?,
                Some(Section::Rewards) => serde_json::to_value(&config.rewards)?,
                Some(Section::League) => serde_json::to_value(&config.league)?,
                Some(Section::TimeWindows) => serde_json::to_value(&config.time_windows)?,
                Some(Section::Profile) => serde_json::to_value(&config.profile)?,
            };
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        ConfigAction::Windows { hour } => {
            let windows = Config::load()?.time_windows;
            let hour = hour.unwrap_or_else(|| windows.local_hour(Utc::now()));
            let class = windows.classify_hour(hour);
            let report = json!({
                "hour": hour,
                "utc_offset_hours": windows.utc_offset_hours,
                "night_owl": class.night_owl,
                "early_bird": class.early_bird,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ConfigAction::Path => println!("{}", Config::path()?.display()),
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
