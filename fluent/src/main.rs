//! Native messaging host for the Fluent browser extension.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use fluent_lib::prompt::Tone;
use fluent_lib::settings::{FileSettingsStore, Settings, SettingsStore, validate_settings};
use fluent_lib::{init_logging, open_settings_store, run_native_host};

#[derive(Parser)]
#[command(name = "fluent-host")]
#[command(about = "Grammar correction and text explanation host for the Fluent extension")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, env = "FLUENT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Caller origin passed by the browser when it launches the host
    #[arg(hide = true)]
    origin: Option<String>,

    /// Extension id passed by some browsers after the manifest path
    #[arg(hide = true)]
    extension_id: Option<String>,

    #[arg(long = "parent-window", hide = true)]
    parent_window: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer native messages on stdin/stdout (default)
    Serve,

    /// Print the stored settings with the API key masked
    Show,

    /// Store the Gemini API key
    SetKey {
        /// Gemini API key
        key: String,
    },

    /// Enable or disable the extension on one site
    Site {
        /// Hostname, e.g. app.slack.com
        host: String,

        #[arg(long, conflicts_with = "disable", required_unless_present = "disable")]
        enable: bool,

        #[arg(long)]
        disable: bool,
    },

    /// Change a single setting
    Set {
        field: SettingField,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SettingField {
    Language,
    NativeLanguage,
    Tone,
    TextImprovement,
    Fluentify,
    Explain,
}

#[tokio::main]
async fn main() {
    if let Err(err) = init_logging() {
        eprintln!("{err}");
    }

    if let Err(err) = run(Cli::parse()).await {
        error!("fluent-host failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let store = open_settings_store(cli.config).context("failed to open settings")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            if let Some(origin) = cli.origin.as_deref() {
                info!(
                    origin,
                    extension_id = cli.extension_id.as_deref(),
                    parent_window = cli.parent_window.as_deref(),
                    "launched by browser"
                );
            }
            run_native_host(store).await?;
        }
        Commands::Show => show(&store)?,
        Commands::SetKey { key } => {
            let mut settings = store.load()?;
            settings.set_api_key(key);
            let settings = validate_settings(settings)?;
            store.save(&settings)?;
            println!("API key saved");
        }
        Commands::Site { host, enable, .. } => {
            let settings = store.update(&mut |settings: &mut Settings| {
                settings.set_site_enabled(&host, enable)
            })?;
            let state = if settings.is_site_disabled(host.trim()) {
                "disabled"
            } else {
                "enabled"
            };
            println!("{} {state}", host.trim());
        }
        Commands::Set { field, value } => {
            let mut settings = store.load()?;
            apply_field(&mut settings, field, &value)?;
            store.save(&settings)?;
            println!("{field:?} updated");
        }
    }

    Ok(())
}

fn show(store: &FileSettingsStore) -> anyhow::Result<()> {
    let mut settings = store.load()?;
    settings.gemini_api_key = mask_key(&settings.gemini_api_key);
    println!("{}", store.path().display());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn apply_field(settings: &mut Settings, field: SettingField, value: &str) -> anyhow::Result<()> {
    let value = value.trim();
    match field {
        SettingField::Language => {
            if value.is_empty() {
                bail!("language must not be empty");
            }
            settings.language = value.to_string();
        }
        SettingField::NativeLanguage => {
            settings.native_language = (!value.is_empty()).then(|| value.to_string());
        }
        SettingField::Tone => {
            settings.tone = value.parse::<Tone>().map_err(anyhow::Error::msg)?;
        }
        SettingField::TextImprovement => settings.text_improvement_enabled = parse_switch(value)?,
        SettingField::Fluentify => settings.fluentify_enabled = parse_switch(value)?,
        SettingField::Explain => settings.explain_enabled = parse_switch(value)?,
    }
    Ok(())
}

fn parse_switch(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => bail!("expected on/off, got `{other}`"),
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    match chars.len() {
        0 => String::new(),
        1..=4 => "****".to_string(),
        len => format!("****{}", chars[len - 4..].iter().collect::<String>()),
    }
}
