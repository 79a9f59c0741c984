use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use skycast_core::{
    Config, DisplayState, FileStore, OpenWeatherClient, Orchestrator, Query, Snapshot, Unit,
    WeatherCache,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skycast", version, about = "Weather dashboard CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key.
    Configure,

    /// Show current conditions and the short-term forecast.
    Show {
        /// City name to search for. Without one the location resolver runs
        /// and falls back to its default city.
        city: Option<String>,

        /// Display temperatures in Fahrenheit.
        #[arg(long)]
        fahrenheit: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { city, fahrenheit } => show(city, fahrenheit).await,
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = inquire::Text::new("OpenWeather API key:")
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }

    config.set_api_key(api_key.trim().to_string());
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show(city: Option<String>, fahrenheit: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let api_key = config.resolved_api_key().ok_or_else(|| {
        anyhow!(
            "No API key configured.\n\
             Hint: run `skycast configure` or set the OPENWEATHER_API_KEY environment variable."
        )
    })?;

    let cache = WeatherCache::new(Box::new(FileStore::open_default()?));
    let orchestrator = Orchestrator::new(Arc::new(OpenWeatherClient::new(api_key)), cache);

    if fahrenheit {
        orchestrator.set_unit(Unit::Fahrenheit);
    }

    println!("Loading weather data...");

    match city {
        Some(city) => {
            orchestrator.resolve(Query::city(city.trim())).await;
        }
        // No terminal geolocation capability: the resolver falls back to
        // its default city.
        None => {
            orchestrator.initial(None).await;
        }
    }

    render(&orchestrator.snapshot())
}

fn render(snapshot: &Snapshot) -> anyhow::Result<()> {
    let model = match &snapshot.state {
        DisplayState::Success(model) => model,
        DisplayState::Error(message) => return Err(anyhow!("{message}")),
        DisplayState::Idle | DisplayState::Loading => {
            return Err(anyhow!("No weather data available"));
        }
    };

    let unit = snapshot.unit;
    let symbol = match unit {
        Unit::Celsius => "°C",
        Unit::Fahrenheit => "°F",
    };

    println!();
    println!("{}, {} - {}", model.city, model.country, model.datetime);
    println!(
        "{} ({}), {}{symbol}, feels like {}{symbol}",
        model.weather_main,
        model.weather_description,
        model.current_temp(unit),
        model.feels_like(unit),
    );
    println!(
        "Sunrise {}  Sunset {}  Day length {}",
        model.sunrise, model.sunset, model.day_duration
    );
    println!(
        "Humidity {}%  Pressure {} hPa  Visibility {} km  Wind {} km/h",
        model.humidity, model.air_pressure, model.visibility, model.wind_speed
    );

    if !model.hourly.is_empty() {
        println!();
        println!("Forecast:");
        for entry in &model.hourly {
            println!(
                "  {:>8}  {}{symbol}, feels like {}{symbol}",
                entry.time,
                match unit {
                    Unit::Celsius => entry.temp_c,
                    Unit::Fahrenheit => entry.temp_f,
                },
                match unit {
                    Unit::Celsius => entry.feels_like_c,
                    Unit::Fahrenheit => entry.feels_like_f,
                },
            );
        }
    }

    Ok(())
}
