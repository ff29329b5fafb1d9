use std::sync::Arc;

use anyhow::{Context, bail};
use aqi_core::{CityResolver, CompletionPolicy, Config, Status, ViewController};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Select, Text};

use crate::report;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "aqi", version, about = "Air quality CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the WAQI token, default city and overlap policy.
    Configure,

    /// Show air quality for a city.
    Show {
        /// City name; the configured default city when absent.
        city: Option<String>,

        /// Print the view model as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List cities with known map coordinates.
    Cities,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;

        match self.command {
            Command::Configure => configure(&mut config),
            Command::Show { city, json } => show(&config, city.as_deref(), json).await,
            Command::Cities => {
                let table = config.city_table()?;
                print!("{}", report::render_cities(&table));
                Ok(())
            }
        }
    }
}

fn configure(config: &mut Config) -> anyhow::Result<()> {
    let token = Password::new("WAQI API token (blank for the public demo token):")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API token")?;

    if !token.trim().is_empty() {
        config.set_token(token.trim().to_string());
    }

    let current = config.default_city()?.to_string();
    let city = Text::new("Default city:")
        .with_default(&current)
        .prompt()
        .context("Failed to read default city")?;
    config.set_default_city(&city)?;

    let policies = vec![
        CompletionPolicy::LastResolvedWins,
        CompletionPolicy::LatestIssuedWins,
    ];
    let cursor = policies
        .iter()
        .position(|p| *p == config.completion_policy)
        .unwrap_or(0);
    config.completion_policy = Select::new("When queries overlap, keep:", policies)
        .with_starting_cursor(cursor)
        .prompt()
        .context("Failed to read completion policy")?;

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show(config: &Config, city: Option<&str>, json: bool) -> anyhow::Result<()> {
    let client = config.feed_client()?;
    let resolver: Arc<dyn CityResolver> = Arc::new(config.city_table()?);
    let settings = config.controller_settings()?;

    let pending = match city {
        Some(city) => {
            let controller = ViewController::new(client, resolver, settings);
            let handle = controller.submit(city)?;
            (controller, handle)
        }
        None => ViewController::launch(client, resolver, settings),
    };
    let (controller, handle) = pending;
    handle.await.context("Air-quality query task failed")?;

    let view = controller.view();
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", report::render_view(&view));
    }

    if view.status == Status::Error {
        bail!(view.error.unwrap_or_else(|| "Air-quality query failed".to_string()));
    }

    Ok(())
}
