use std::{collections::BTreeSet, fmt, path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use cityweather_core::{
    AppError, CityCatalog, CityWeatherApp, Config, OpenWeatherProvider, RoundReport,
    WeatherSnapshot,
    config::{read_api_key, write_api_key},
    provider::provider_from_config,
};
use inquire::{InquireError, MultiSelect, Password, Select, Text};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cityweather", version, about = "Browse cities, keep a My List, see the weather")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key.
    Configure {
        /// Where to keep the key file; defaults to the config directory.
        #[arg(long)]
        key_file: Option<PathBuf>,
    },

    /// List catalog cities and My List.
    List,

    /// Show current weather for cities, looking up ones not in the catalog.
    Show {
        /// City names; with `--all`, every catalog city.
        cities: Vec<String>,

        #[arg(long)]
        all: bool,
    },

    /// Move catalog cities into My List.
    Favorite {
        #[arg(required = true)]
        cities: Vec<String>,
    },

    /// Move cities out of My List back into the catalog.
    Unfavorite {
        #[arg(required = true)]
        cities: Vec<String>,
    },

    /// Menu-driven session mirroring the desktop app's buttons.
    Interactive,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::load()?;

        match self.command {
            Command::Configure { key_file } => configure(config, key_file),
            Command::List => {
                let app = open_app(&config).await?;
                print_lists(&app);
                Ok(())
            }
            Command::Show { cities, all } => {
                let app = open_app(&config).await?;
                show(&app, cities, all).await
            }
            Command::Favorite { cities } => {
                let app = open_app(&config).await?;
                for name in &cities {
                    if let Err(e) = app.catalog().set_selected(name, true) {
                        eprintln!("{name}: {}", e.user_message());
                    }
                }
                let moved = app.add_selected_to_favorites().map_err(user_error)?;
                println!("Added to My List: {}", join(&moved));
                Ok(())
            }
            Command::Unfavorite { cities } => {
                let app = open_app(&config).await?;
                let names: BTreeSet<String> = cities.into_iter().collect();
                let moved = app.remove_from_favorites(&names).await.map_err(user_error)?;
                println!("Removed from My List: {}", join(&moved));
                Ok(())
            }
            Command::Interactive => {
                let app = open_app(&config).await?;
                interactive(&app).await
            }
        }
    }
}

fn configure(mut config: Config, key_file: Option<PathBuf>) -> anyhow::Result<()> {
    if key_file.is_some() {
        config.api_key_file = key_file;
    }
    let path = config.api_key_path()?;

    let key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    write_api_key(&path, &key)?;
    config.save()?;

    println!("API key saved to {}", path.display());
    Ok(())
}

async fn open_app(config: &Config) -> anyhow::Result<CityWeatherApp> {
    let api_key = read_api_key(&config.api_key_path()?)?;
    let provider: Arc<OpenWeatherProvider> = Arc::new(provider_from_config(config, api_key)?);
    CityWeatherApp::bootstrap(provider, config).await
}

async fn show(app: &CityWeatherApp, cities: Vec<String>, all: bool) -> anyhow::Result<()> {
    let mut targets = BTreeSet::new();

    if all {
        targets.extend(app.catalog().cities().into_iter().map(|c| c.name));
    }
    for name in cities {
        if app.catalog().contains(&name) {
            targets.insert(name);
            continue;
        }
        match app.add_place(&name).await {
            Ok(place) => {
                targets.insert(place.name);
            }
            Err(e) => eprintln!("{name}: {}", e.user_message()),
        }
    }

    let report = app.fetch(&targets).await.map_err(user_error)?;
    print_report(app, &report);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    SeeWeather,
    SelectCities,
    AddToMyList,
    RemoveFromMyList,
    AddPlace,
    AddRandomCity,
    DeleteCity,
    Quit,
}

impl Action {
    const ALL: [Action; 8] = [
        Action::SeeWeather,
        Action::SelectCities,
        Action::AddToMyList,
        Action::RemoveFromMyList,
        Action::AddPlace,
        Action::AddRandomCity,
        Action::DeleteCity,
        Action::Quit,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::SeeWeather => "See Weather",
            Action::SelectCities => "Select Cities",
            Action::AddToMyList => "Add to My List",
            Action::RemoveFromMyList => "Remove from My List",
            Action::AddPlace => "Add Place",
            Action::AddRandomCity => "Add Random City",
            Action::DeleteCity => "Delete City",
            Action::Quit => "Quit",
        })
    }
}

async fn interactive(app: &CityWeatherApp) -> anyhow::Result<()> {
    loop {
        let selected = app.catalog().selected_names();
        println!();
        println!("Selected: {}", join(&selected));
        println!("My List (can not get weather from here): {}", join(&app.catalog().favorites()));

        let action = match cancellable(Select::new("What next?", Action::ALL.to_vec()).prompt())? {
            Some(action) => action,
            None => return Ok(()),
        };

        // Multi-select prompts refuse an empty option list.
        if let Some(warning) = unavailable(action, app.catalog()) {
            println!("Warning: {warning}");
            continue;
        }

        let outcome = match action {
            Action::SeeWeather => app
                .fetch_selected()
                .await
                .map(|report| print_report(app, &report)),
            Action::SelectCities => {
                select_cities(app)?;
                Ok(())
            }
            Action::AddToMyList => app
                .add_selected_to_favorites()
                .map(|moved| println!("Added to My List: {}", join(&moved))),
            Action::RemoveFromMyList => {
                let favorites: Vec<String> = app.catalog().favorites().into_iter().collect();
                match cancellable(MultiSelect::new("Remove from My List:", favorites).prompt())? {
                    Some(picked) => {
                        let picked: BTreeSet<String> = picked.into_iter().collect();
                        app.remove_from_favorites(&picked)
                            .await
                            .map(|moved| println!("Removed from My List: {}", join(&moved)))
                    }
                    None => Ok(()),
                }
            }
            Action::AddPlace => {
                let prompt = Text::new("Enter the name of the city to add:").prompt();
                match cancellable(prompt)? {
                    Some(name) => app
                        .add_place(&name)
                        .await
                        .map(|place| println!("City added: {}", place.name)),
                    None => Ok(()),
                }
            }
            Action::AddRandomCity => app
                .add_random_city()
                .await
                .map(|place| println!("City added: {}", place.name)),
            Action::DeleteCity => {
                let deleted = app.delete_selected();
                println!("Deleted: {}", join(&deleted));
                Ok(())
            }
            Action::Quit => return Ok(()),
        };

        if let Err(e) = outcome {
            tracing::debug!("action failed: {e}");
            println!("Warning: {}", e.user_message());
        }
    }
}

fn unavailable(action: Action, catalog: &CityCatalog) -> Option<&'static str> {
    match action {
        Action::SelectCities if catalog.is_empty() => {
            Some("There are no cities in the list. Add a place first.")
        }
        Action::RemoveFromMyList if catalog.favorites().is_empty() => Some("My List is empty."),
        _ => None,
    }
}

fn select_cities(app: &CityWeatherApp) -> anyhow::Result<()> {
    let cities = app.catalog().cities();
    let defaults: Vec<usize> = cities
        .iter()
        .enumerate()
        .filter(|(_, c)| c.selected)
        .map(|(i, _)| i)
        .collect();
    let names: Vec<String> = cities.into_iter().map(|c| c.name).collect();

    let Some(picked) = cancellable(
        MultiSelect::new("Select cities to get weather:", names)
            .with_default(&defaults)
            .prompt(),
    )?
    else {
        return Ok(());
    };

    app.catalog().deselect_all();
    for name in picked {
        app.catalog().set_selected(&name, true)?;
    }
    Ok(())
}

/// Map Esc / Ctrl-C on a prompt to `None`.
fn cancellable<T>(res: Result<T, InquireError>) -> anyhow::Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn user_error(e: AppError) -> anyhow::Error {
    anyhow::anyhow!("{}\n({e})", e.user_message())
}

fn print_lists(app: &CityWeatherApp) {
    println!("Cities:");
    for city in app.catalog().cities() {
        println!(
            "  {:<20} lat {:>8.4}  lon {:>9.4}",
            city.name, city.coords.lat, city.coords.lon
        );
    }
    println!("My List:");
    for name in app.catalog().favorites() {
        println!("  {name}");
    }
}

fn print_report(app: &CityWeatherApp, report: &RoundReport) {
    println!("Weather at {}", Local::now().format("%Y-%m-%d %H:%M"));
    println!();
    for name in &report.succeeded {
        if let Some(snapshot) = app.catalog().weather_of(name) {
            println!("{}", format_snapshot(name, &snapshot));
        }
    }
    for (name, reason) in &report.failed {
        println!("{name}: no weather ({reason})");
        println!("----------------------------------------");
    }
}

fn format_snapshot(name: &str, s: &WeatherSnapshot) -> String {
    format!(
        "{name}:\n\
         Weather: {} ({})\n\
         Temperature: {:.2}°C\n\
         Humidity: {}%\n\
         Wind Speed: {:.2} m/s\n\
         Sunrise: {}\n\
         Sunset: {}\n\
         ----------------------------------------",
        s.description,
        s.category,
        s.temperature_c(),
        s.humidity_pct,
        s.wind_speed_mps,
        s.sunrise_hhmm(),
        s.sunset_hhmm(),
    )
}

fn join<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    let joined = names.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined
    }
}
