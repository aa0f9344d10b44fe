//! Sleep Daypoint CLI
//!
//! Drives the daypoint engine against the JSON journal store and a scripted
//! sensor file kept under the configured data directory.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sleep_daypoint::{
    config::Config,
    core::{EngineSettings, HistoryQuery, JournalCoordinator},
    notify::UiNotifier,
    record::{AttributeDef, EventKind, IntegratedRecord, LifeStage},
    sensor::{ScriptedSensor, SensorSource, SensorState},
    store::JsonFileStore,
    VERSION,
};
use tracing_subscriber::EnvFilter;

type Engine = JournalCoordinator<JsonFileStore, ScriptedSensor>;

#[derive(Parser)]
#[command(name = "sleep-daypoint")]
#[command(version = VERSION)]
#[command(about = "Reconcile a sleep journal with headband recordings", long_about = None)]
struct Cli {
    /// Work on last night instead of tonight
    #[arg(long, global = true)]
    prior: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the daypoint window and sensor status
    Status,

    /// List nights from the journal and the sensor
    History {
        /// Only nights starting after this RFC 3339 instant
        #[arg(long)]
        since: Option<String>,

        /// List sensor records alone
        #[arg(long)]
        sensor_only: bool,

        /// Include sensor records with no sleep
        #[arg(long)]
        include_dead: bool,
    },

    /// Print the summary of the selected night
    Summary,

    /// Record a journal event now
    Event {
        /// Event kind (in-bed, going-to-sleep, still-awake, woke-up, done, ...)
        kind: String,

        /// Life-stage of the event; defaults to the kind's usual stage
        #[arg(long)]
        stage: Option<String>,

        /// Free text attached to the event
        #[arg(long)]
        info: Option<String>,
    },

    /// Store or remove a journal attribute
    Attribute {
        name: String,

        /// Value to store; omit together with --remove
        value: Option<String>,

        /// Life-stage of the attribute
        #[arg(long, default_value = "before")]
        stage: String,

        /// Likert rating of the value
        #[arg(long, default_value = "0")]
        likert: f32,

        /// Remove the attribute instead of storing it
        #[arg(long)]
        remove: bool,
    },

    /// Move the scripted sensor to a new state
    Sensor {
        /// idle, starting, recording or ending
        state: String,

        /// Active sensor record id
        #[arg(long)]
        record: Option<u64>,
    },

    /// Report a sensor probe with no state change
    Probe {
        /// Highest battery reading
        #[arg(long)]
        high: Option<u32>,

        /// Lowest battery reading
        #[arg(long)]
        low: Option<u32>,
    },

    /// Amend the selected night against its sensor record
    Amend {
        /// Amend again even if already checked
        #[arg(long)]
        recheck: bool,
    },

    /// Show configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;

    if let Commands::Config = cli.command {
        cmd_config(&config);
        return Ok(());
    }

    let (notifier, signals) = UiNotifier::channel(config.notification_capacity);
    let mut engine = open_engine(&config, notifier)?;
    if cli.prior {
        engine.step_cursor_back();
    }

    match cli.command {
        Commands::Status => cmd_status(&engine),
        Commands::History {
            since,
            sensor_only,
            include_dead,
        } => cmd_history(&engine, since.as_deref(), sensor_only, include_dead)?,
        Commands::Summary => cmd_summary(&engine),
        Commands::Event { kind, stage, info } => {
            cmd_event(&mut engine, &kind, stage.as_deref(), info.as_deref())?
        }
        Commands::Attribute {
            name,
            value,
            stage,
            likert,
            remove,
        } => cmd_attribute(&mut engine, &name, value.as_deref(), &stage, likert, remove)?,
        Commands::Sensor { state, record } => cmd_sensor(&mut engine, &state, record)?,
        Commands::Probe { high, low } => cmd_probe(&mut engine, high, low),
        Commands::Amend { recheck } => cmd_amend(&mut engine, recheck),
        Commands::Config => {}
    }

    for signal in signals.try_iter() {
        tracing::debug!(?signal, "UI refresh requested");
    }

    engine
        .sensor()
        .save(&config.sensor_path())
        .with_context(|| format!("Failed to save sensor state to {:?}", config.sensor_path()))?;
    Ok(())
}

fn open_engine(config: &Config, notifier: UiNotifier) -> Result<Engine> {
    config
        .ensure_directories()
        .context("Failed to create data directory")?;

    let journal_path = config.journal_path();
    let store = JsonFileStore::open(&journal_path)
        .with_context(|| format!("Failed to open journal store {journal_path:?}"))?;
    let sensor_path = config.sensor_path();
    let sensor = ScriptedSensor::load(&sensor_path)
        .with_context(|| format!("Failed to load sensor state {sensor_path:?}"))?;
    let settings = EngineSettings::from_config(config).context("Invalid configuration")?;

    let mut engine = JournalCoordinator::new(store, sensor, notifier, settings);
    engine.resynchronize();
    Ok(engine)
}

fn one_line(label: &str) -> String {
    label.replace('\n', " ")
}

fn cmd_status(engine: &Engine) {
    let status = engine.status();

    println!("Sleep Daypoint Status");
    println!("=====================");
    println!();
    println!("Previous: {}", one_line(&status.previous_slot_label()));
    println!("Selected: {}", one_line(&status.current_slot_label()));
    println!("Next:     {}", one_line(&status.next_slot_label()));
    println!();
    match engine.sensor().active_record_id() {
        Some(id) => println!("Sensor:  {} (record {id})", status.sensor_status_label()),
        None => println!("Sensor:  {}", status.sensor_status_label()),
    }
    println!("Journal: {}", status.journal_status_label());
}

fn cmd_history(
    engine: &Engine,
    since: Option<&str>,
    sensor_only: bool,
    include_dead: bool,
) -> Result<()> {
    let after = since
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("Invalid --since timestamp {s:?}"))
        })
        .transpose()?;
    let query = HistoryQuery {
        after,
        sensor_only,
        include_dead,
    };

    let history = engine.history(&query);
    if history.is_empty() {
        println!("No nights recorded.");
        return Ok(());
    }
    let tz = engine.settings().tz;
    for night in &history {
        println!("{}", history_line(night, tz));
    }
    println!();
    println!("Total nights: {}", history.len());
    Ok(())
}

fn history_line(night: &IntegratedRecord, tz: chrono_tz::Tz) -> String {
    let when = night.timestamp.with_timezone(&tz).format("%Y-%m-%d %a %H:%M");
    let journal = match &night.journal {
        Some(j) => format!(
            "journal {} {}",
            j.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            j.status_code().label()
        ),
        None => "no journal".to_string(),
    };
    let sensor = match &night.external {
        Some(e) => format!("sensor {} {:.0} min, score {}", e.id, e.total_sleep_min, e.quality_score),
        None => "no sensor".to_string(),
    };
    format!("{when}  {journal}  {sensor}")
}

fn cmd_summary(engine: &Engine) {
    for line in engine.status().daypoint_summary() {
        println!("{line}");
    }
}

fn cmd_event(
    engine: &mut Engine,
    kind: &str,
    stage: Option<&str>,
    info: Option<&str>,
) -> Result<()> {
    let Some(kind) = EventKind::parse(kind) else {
        bail!("Unknown event kind {kind:?}");
    };
    let stage = match stage {
        Some(s) => parse_stage(s)?,
        None => kind.default_stage(),
    };

    if engine.record_event(stage, kind, info) {
        println!("Recorded: {}", kind.label());
    } else if let Some(reason) = engine.stage_entry_block(stage) {
        println!("Not recorded: {reason}");
    } else {
        println!("Not recorded: {} was just entered", kind.label());
    }
    Ok(())
}

fn cmd_attribute(
    engine: &mut Engine,
    name: &str,
    value: Option<&str>,
    stage: &str,
    likert: f32,
    remove: bool,
) -> Result<()> {
    let def = AttributeDef::new(name, parse_stage(stage)?);

    if remove {
        if engine.remove_attribute(&def) {
            println!("Removed {name}");
        } else {
            println!("No {name} recorded");
        }
        return Ok(());
    }

    let Some(value) = value else {
        bail!("A value is required unless --remove is given");
    };
    if engine.record_attribute(&def, value, likert) {
        println!("Stored {name}={value}");
    } else if let Some(reason) = engine.stage_entry_block(def.stage) {
        println!("Not stored: {reason}");
    }
    Ok(())
}

fn cmd_sensor(engine: &mut Engine, state: &str, record: Option<u64>) -> Result<()> {
    let Some(state) = SensorState::parse(state) else {
        bail!("Unknown sensor state {state:?}");
    };
    let record = record.or_else(|| {
        // Keep the session id across Recording and Ending unless told otherwise
        engine
            .sensor()
            .active_record_id()
            .filter(|_| state > SensorState::Idle)
    });

    engine.sensor_mut().transition(state, record);
    engine.on_state_changed();
    cmd_status(engine);
    Ok(())
}

fn cmd_probe(engine: &mut Engine, high: Option<u32>, low: Option<u32>) {
    if high.is_some() || low.is_some() {
        let current = engine.sensor().battery_extremes();
        engine
            .sensor_mut()
            .set_battery(high.unwrap_or(current.high), low.unwrap_or(current.low));
    }
    engine.on_probed_same_state();
    println!("Sensor: {}", engine.status().sensor_status_label());
}

fn cmd_amend(engine: &mut Engine, recheck: bool) {
    if engine.amend_active(recheck) {
        println!("Journal record updated.");
    } else {
        println!("Nothing to amend.");
    }
    cmd_summary(engine);
}

fn cmd_config(config: &Config) {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn parse_stage(s: &str) -> Result<LifeStage> {
    LifeStage::parse(s).with_context(|| format!("Unknown life-stage {s:?}"))
}
