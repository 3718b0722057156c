//! Command-line front end for the map layer copier.
//!
//! # Responsibility
//! - Parse arguments, resolve configuration and open a session.
//! - Print what the core returns; carry no invariants of its own.
//!
//! # Invariants
//! - Every reported error exits with a non-zero status.

use clap::{Parser, Subcommand};
use maplayer_core::db::{open_db_with_timeout, DbError};
use maplayer_core::{
    init_logging_from_config, load_config, CollectionId, ConfigError, CoreConfig, LayerError,
    RecordDraft, RecordStore, SchemaProfile, Session, Side, SqliteRecordStore, StoreError,
};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const DEFAULT_DB_FILE_NAME: &str = "maplayer.sqlite3";

#[derive(Debug, Parser)]
#[command(name = "maplayer", version, about = "Copy map layers between maps")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// SQLite database; overrides `store.path` from the configuration.
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or migrate the database.
    Init,
    /// Create a map.
    AddMap { name: String },
    /// Create a layer in a map.
    AddLayer {
        map_id: i64,
        name: String,
        /// Attribute as `key=value`; JSON values are parsed, anything else is text.
        #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_attribute)]
        attributes: Vec<(String, Value)>,
    },
    /// List maps.
    Maps,
    /// List the visible layers of a map with their indices.
    Layers { map_id: i64 },
    /// Copy the layer at `index` of one map into another map.
    Copy {
        from_map_id: i64,
        index: usize,
        to_map_id: i64,
    },
}

#[derive(Debug)]
enum CliError {
    Config(ConfigError),
    Db(DbError),
    Store(StoreError),
    Layer(LayerError),
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Db(_) => "db",
            Self::Store(_) => "store",
            Self::Layer(err) => err.code(),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Layer(err) => write!(f, "{err}"),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<StoreError> for CliError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<LayerError> for CliError {
    fn from(value: LayerError) -> Self {
        Self::Layer(value)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error code={} message={err}", err.code());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match cli.config.as_deref() {
        Some(path) => load_config(path)?,
        None => CoreConfig::default(),
    };
    if let Err(err) = init_logging_from_config(&config.logging) {
        eprintln!("warning: logging disabled: {err}");
    }
    let profile = config.schema_profile()?;
    let db_path = cli
        .db
        .or_else(|| config.store.path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE_NAME));

    match cli.command {
        Command::Init => {
            open_db_with_timeout(&db_path, config.store.busy_timeout())?;
            println!("initialized db={}", db_path.display());
        }
        Command::AddMap { name } => {
            let store = open_store(&db_path, &config)?;
            let id = store.create_collection(&name)?;
            println!("created map_id={id}");
        }
        Command::AddLayer {
            map_id,
            name,
            attributes,
        } => {
            let mut store = open_store(&db_path, &config)?;
            let draft = attributes
                .into_iter()
                .fold(RecordDraft::new(CollectionId(map_id), name), |draft, (field, value)| {
                    draft.with_attribute(field, value)
                });
            let record = store.create_record(draft, &profile.key_fields)?;
            println!("created layer_id={}", record.id);
        }
        Command::Maps => {
            let store = open_store(&db_path, &config)?;
            for collection in store.query_collections()? {
                println!("{}\t{}", collection.id, collection.display_name);
            }
        }
        Command::Layers { map_id } => {
            let session = connect(&db_path, &config, profile)?;
            let view = session.view_of(CollectionId(map_id))?;
            println!("map={} count={}", view.display_name, view.count());
            for item in view.items {
                println!("{}\t{}", item.index, item.label);
            }
        }
        Command::Copy {
            from_map_id,
            index,
            to_map_id,
        } => {
            let mut session = connect(&db_path, &config, profile)?;
            session.select_collection(Side::Left, CollectionId(from_map_id))?;
            session.select_collection(Side::Right, CollectionId(to_map_id))?;
            session.select_record(Side::Left, index)?;
            let transferred = session.transfer(Side::Left, Side::Right)?;
            println!(
                "copied layer_id={} new_id={} map_id={}",
                transferred.source_id, transferred.new_id, to_map_id
            );
        }
    }
    Ok(())
}

fn open_store(db_path: &Path, config: &CoreConfig) -> Result<SqliteRecordStore, CliError> {
    let conn = open_db_with_timeout(db_path, config.store.busy_timeout())?;
    Ok(SqliteRecordStore::new(conn))
}

fn connect(
    db_path: &Path,
    config: &CoreConfig,
    profile: SchemaProfile,
) -> Result<Session<SqliteRecordStore>, CliError> {
    let mut session = Session::new(profile);
    session.connect_sqlite(db_path, config.store.busy_timeout())?;
    Ok(session)
}

fn parse_attribute(raw: &str) -> Result<(String, Value), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("attribute name is empty in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((field.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::{parse_attribute, Cli};
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn attribute_values_parse_as_json_or_text() {
        assert_eq!(parse_attribute("type=xyz").unwrap(), ("type".to_string(), json!("xyz")));
        assert_eq!(parse_attribute("opacity=0.5").unwrap().1, json!(0.5));
        assert_eq!(parse_attribute("url=http://a?b=c").unwrap().1, json!("http://a?b=c"));
        assert!(parse_attribute("novalue").is_err());
        assert!(parse_attribute("=x").is_err());
    }
}
