use clap::{Args, Parser, Subcommand, ValueEnum};
use parcel_core::config::CliConfigOverrides;
use std::path::PathBuf;

/// Parcel - land-parcel boundary import
#[derive(Parser, Debug)]
#[command(name = "parcel")]
#[command(about = "Parse, deduplicate and import land-parcel boundaries", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: SettingsArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings that override the configuration file and environment
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Smallest plausible parcel area in hectares
    #[arg(long, global = true)]
    pub min_area_ha: Option<f64>,

    /// Largest plausible parcel area in hectares
    #[arg(long, global = true)]
    pub max_area_ha: Option<f64>,

    /// Upload size limit in megabytes
    #[arg(long, global = true)]
    pub max_upload_mb: Option<u64>,

    /// Process features on a single thread
    #[arg(long, global = true)]
    pub sequential: bool,
}

impl SettingsArgs {
    pub fn to_overrides(&self) -> CliConfigOverrides {
        CliConfigOverrides {
            min_area_ha: self.min_area_ha,
            max_area_ha: self.max_area_ha,
            max_upload_mb: self.max_upload_mb,
            parallel_parse: self.sequential.then_some(false),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a file and show the import preview
    Inspect(InspectArgs),

    /// Parse a file and apply it to a fresh store
    Import(ImportArgs),

    /// Import a file and list the parcels intersecting a bounding box
    Bbox(BboxArgs),

    /// Show resolved configuration and where each value came from
    Config,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Shapefile ZIP, KML or GeoJSON file
    pub path: PathBuf,

    /// Attribute used for feature labels
    #[arg(long)]
    pub label_field: Option<String>,

    /// Show every feature instead of the first 20
    #[arg(long)]
    pub all: bool,
}

/// Apply mode as typed on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Attach every parcel to one existing farmer
    Assign,
    /// Create parcels without an owner
    Orphan,
    /// Create farmers from an attribute and attach parcels to them
    AutoCreate,
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// Shapefile ZIP, KML or GeoJSON file
    pub path: PathBuf,

    /// How parcels get their owner
    #[arg(long, value_enum)]
    pub mode: ModeArg,

    /// Farmer to assign parcels to (assign mode)
    #[arg(long)]
    pub farmer_id: Option<u64>,

    /// Register a farmer in the fresh store before applying (repeatable).
    /// Farmers get ids 1, 2, ... in the order given.
    #[arg(long = "farmer", value_name = "NAME")]
    pub farmers: Vec<String>,

    /// Attribute holding the farmer name (auto-create mode)
    #[arg(long)]
    pub farmer_field: Option<String>,

    #[command(flatten)]
    pub mapping: MappingArgs,

    /// Conformity status for parcels without a recognised mapped value
    #[arg(long)]
    pub conformity: Option<String>,

    /// Tolerant matching of mapped conformity values
    #[arg(long)]
    pub auto_detect_conformity: bool,

    /// Certification for every created parcel (repeatable)
    #[arg(long = "certification", value_name = "CERT")]
    pub certifications: Vec<String>,

    /// Previously imported boundaries to deduplicate against
    #[arg(long, value_name = "FILE")]
    pub existing: Option<PathBuf>,

    /// Accept coordinates that look projected
    #[arg(long)]
    pub confirm_projected: bool,
}

#[derive(Args, Debug, Default)]
pub struct MappingArgs {
    /// Attribute used as parcel label
    #[arg(long)]
    pub label_field: Option<String>,

    /// Attribute used as parcel code
    #[arg(long)]
    pub code_field: Option<String>,

    /// Attribute used as village name
    #[arg(long)]
    pub village_field: Option<String>,

    /// Attribute holding a conformity status
    #[arg(long)]
    pub conformity_field: Option<String>,
}

#[derive(Parser, Debug)]
pub struct BboxArgs {
    /// Shapefile ZIP, KML or GeoJSON file
    pub path: PathBuf,

    /// Box as minLng,minLat,maxLng,maxLat
    #[arg(allow_hyphen_values = true)]
    pub bbox: String,

    /// Map zoom; geometry is simplified below the configured threshold
    #[arg(long)]
    pub zoom: Option<u8>,
}
