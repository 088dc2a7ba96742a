use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

use kepler_core::persistence::load_records;
use kepler_core::selectors;
use kepler_core::Action;
use kepler_core::AddDataToMapPayload;
use kepler_core::CompositionBuilder;
use kepler_core::CoreConfig;
use kepler_core::CoreReducer;
use kepler_core::MergeMode;
use kepler_core::ReceiveMapConfigPayload;
use kepler_core::RootState;
use kepler_core::SavedMapConfig;
use kepler_core::Selectors;
use kepler_core::dataset::DatasetPayload;

#[derive(Parser)]
#[command(name = "kepler", version, about = "Replay map sessions and merge saved map configs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Core configuration (TOML). Defaults to <config dir>/kepler/core.toml.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log reducer activity at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the map state recorded in a session log.
    Replay {
        #[arg(value_name = "LOG")]
        log: PathBuf,
    },
    /// Merge a saved map config into a fresh map, optionally after loading
    /// datasets.
    Merge {
        #[arg(value_name = "CONFIG")]
        config_file: PathBuf,

        #[arg(long, value_enum, default_value = "merge")]
        mode: ModeArg,

        /// Dataset payload (JSON) to load first; may repeat.
        #[arg(long = "data", value_name = "DATASET")]
        data: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Merge,
    Replace,
}

impl From<ModeArg> for MergeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Merge => MergeMode::Merge,
            ModeArg::Replace => MergeMode::Replace,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().or_else(default_config_path);
    let config = match config_path.as_deref() {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("loading core config from {}", path.display()))?,
        None => CoreConfig::default(),
    };
    tracing::debug!(path = ?config_path, "core config resolved");
    let core = CompositionBuilder::new(config).build();

    match cli.command {
        Command::Replay { log } => replay(&core, &log),
        Command::Merge {
            config_file,
            mode,
            data,
        } => merge(&core, &config_file, mode.into(), &data),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{default_level},kepler_core={default_level},kepler={default_level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kepler").join("core.toml"))
}

fn replay(core: &CoreReducer, log: &Path) -> Result<()> {
    if !log.exists() {
        anyhow::bail!("session log {} does not exist", log.display());
    }
    let records = load_records(log).with_context(|| format!("reading {}", log.display()))?;
    let replayed = kepler_core::replay(core, &records);
    println!(
        "replayed {} actions ({} rolled back, {} diagnostics)",
        replayed.actions, replayed.rolled_back, replayed.diagnostics
    );
    print_summary(&replayed.root);
    Ok(())
}

fn merge(core: &CoreReducer, config_file: &Path, mode: MergeMode, data: &[PathBuf]) -> Result<()> {
    let saved = read_saved_config(config_file)?;
    let mut root = core.initial_state();

    if !data.is_empty() {
        let datasets = data
            .iter()
            .map(|path| read_dataset(path))
            .collect::<Result<Vec<_>>>()?;
        let action = Action::AddDataToMap(AddDataToMapPayload {
            datasets,
            ..AddDataToMapPayload::default()
        });
        root = reduce_or_fail(core, &root, &action)?;
    }

    let action = Action::ReceiveMapConfig(ReceiveMapConfigPayload {
        config: saved,
        mode: Some(mode),
        ..ReceiveMapConfigPayload::default()
    });
    let root = reduce_or_fail(core, &root, &action)?;
    print_summary(&root);
    Ok(())
}

fn reduce_or_fail(core: &CoreReducer, root: &RootState, action: &Action) -> Result<RootState> {
    let reduction = core.reduce(root, action);
    for diagnostic in reduction.diagnostics.iter() {
        println!(
            "{} [{}] {}: {}",
            diagnostic.level.label(),
            diagnostic.slice,
            diagnostic.kind.label(),
            diagnostic.message
        );
    }
    if let Some(err) = reduction.error {
        return Err(err).with_context(|| format!("{} rolled back", action.label()));
    }
    Ok(reduction.root)
}

fn read_saved_config(path: &Path) -> Result<SavedMapConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    );
    let saved = if yaml {
        SavedMapConfig::from_yaml_str(&content)
    } else {
        SavedMapConfig::from_json_str(&content)
    };
    saved.with_context(|| format!("parsing {}", path.display()))
}

fn read_dataset(path: &Path) -> Result<DatasetPayload> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing dataset {}", path.display()))
}

fn print_summary(root: &RootState) {
    let vis = root.vis_state();
    let map = root.map_state();
    let selectors = Selectors::new();

    println!("datasets:");
    for (data_id, dataset) in &vis.datasets {
        println!(
            "  {data_id}: {} rows, {} after filters, {} layers",
            dataset.row_count(),
            selectors.filtered_row_count(root, data_id),
            selectors::layers_for_dataset(root, data_id).len()
        );
    }
    println!("layers (top first):");
    for layer in selectors.layer_order(root).iter() {
        let marker = if layer.is_visible() { "*" } else { " " };
        println!(
            "  {marker} {} ({}) on {}",
            layer.id,
            layer.layer_type.label(),
            layer.data_id()
        );
    }
    println!("filters: {}", vis.filters.len());
    println!(
        "pending: {} layers, {} filters",
        vis.pending.layers.len(),
        selectors::pending_filter_count(root)
    );
    println!(
        "viewport: {:.4}, {:.4} zoom {:.2}{}",
        map.latitude,
        map.longitude,
        map.zoom,
        if selectors::is_split(root) { " (split)" } else { "" }
    );
    println!("style: {}", root.map_style().style_type);
}
