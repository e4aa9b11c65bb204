use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use template_curator::config::CuratorConfig;
use template_curator::db;
use template_curator::services::accessor::TemplateService;
use template_curator::services::catalog::CategoryCatalog;
use template_curator::services::duplicates::{self, CleanupOptions, DuplicateError};
use template_curator::services::import::{self, ImportError};
use template_curator::services::playground::{self, Playground, PlaygroundError};
use template_curator::services::upload::{self, LocalMediaStore, MediaFile, UploadError};
use template_curator::store::{CategoryUpdate, MemoryTemplateStore, PgTemplateStore, StoreError};
use template_curator::template::TemplateRecord;

const DEFAULT_ACTOR: &str = "curator-cli";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing database URL; pass --database-url, set DATABASE_URL, or use --input")]
    MissingDatabaseUrl,
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Duplicates(#[from] DuplicateError),
    #[error(transparent)]
    Playground(#[from] PlaygroundError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("template not found: {0}")]
    NotFound(String),
}

#[derive(Parser, Debug)]
#[command(name = "curator", about = "Template catalog curation CLI")]
struct Cli {
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(
        long,
        help = "Run against a JSON snapshot in memory instead of Postgres; changes are written back to the file"
    )]
    input: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List templates, optionally only one exact category value.
    List {
        #[arg(long)]
        category: Option<String>,
    },
    /// Show templates partitioned into catalog groups.
    Groups,
    Duplicates(DuplicatesCommand),
    /// Import templates from a JSON file, skipping duplicates.
    Import { file: PathBuf },
    /// Upload media files and create a template for each success.
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        category: String,
    },
    /// Write the grouped catalog to a JSON file.
    Export { file: PathBuf },
    /// Reassign one template's category.
    Move {
        id: String,
        category: String,
        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },
    /// Map every category value to its best catalog label.
    Recategorize {
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },
    /// Delete templates by id or `<category>|||<id>` key.
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct DuplicatesCommand {
    #[command(subcommand)]
    command: DuplicatesSubcommand,
}

#[derive(Subcommand, Debug)]
enum DuplicatesSubcommand {
    Scan {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    Clean {
        #[arg(long)]
        backup: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

/// Service plus the snapshot file to write back, when running in memory.
struct Backend {
    service: TemplateService,
    snapshot: Option<(PathBuf, Arc<MemoryTemplateStore>)>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = CuratorConfig::from_env();
    let backend = open_backend(&cli, config).await?;
    let mutates = !matches!(
        cli.command,
        Command::List { .. } | Command::Groups | Command::Export { .. } | Command::Duplicates(DuplicatesCommand {
            command: DuplicatesSubcommand::Scan { .. }
        })
    );

    run(&backend.service, cli.command).await?;

    if mutates {
        if let Some((path, store)) = &backend.snapshot {
            write_json(path, &serde_json::to_value(store.snapshot().await)?).await?;
            tracing::info!(path = %path.display(), "snapshot written");
        }
    }
    Ok(())
}

async fn open_backend(cli: &Cli, config: CuratorConfig) -> Result<Backend, CliError> {
    if let Some(path) = &cli.input {
        let records = read_snapshot(path).await?;
        tracing::info!(path = %path.display(), count = records.len(), "loaded snapshot");
        let store = Arc::new(MemoryTemplateStore::with_records(records));
        let service = TemplateService::new(store.clone(), config);
        return Ok(Backend { service, snapshot: Some((path.clone(), store)) });
    }

    let url = cli.database_url.as_deref().ok_or(CliError::MissingDatabaseUrl)?;
    let pool = db::init_pool(url, config.db_max_connections).await?;
    let service = TemplateService::new(Arc::new(PgTemplateStore::new(pool)), config);
    Ok(Backend { service, snapshot: None })
}

async fn run(service: &TemplateService, command: Command) -> Result<(), CliError> {
    match command {
        Command::List { category } => {
            let records = match category {
                Some(category) => service.list_by_category(&category).await?,
                None => service.list().await?,
            };
            print_json(&serde_json::to_value(records)?)
        }
        Command::Groups => {
            let pg = load_playground(service).await?;
            let groups: Vec<Value> = pg
                .groups()
                .iter()
                .map(|g| serde_json::json!({ "id": g.id, "label": g.label, "count": g.templates.len() }))
                .collect();
            print_json(&Value::Array(groups))
        }
        Command::Duplicates(dup) => run_duplicates(service, dup).await,
        Command::Import { file } => {
            let json = read_text(&file).await?;
            let report = import::import_templates(service, &json).await?;
            print_json(&serde_json::to_value(report)?)
        }
        Command::Upload { files, category } => run_upload(service, files, &category).await,
        Command::Export { file } => {
            let pg = load_playground(service).await?;
            write_json(&file, &pg.export_json()).await?;
            println!("exported {} templates to {}", pg.total_templates(), file.display());
            Ok(())
        }
        Command::Move { id, category, actor } => {
            let record = find_record(service, &id).await?;
            let change = service.update_category(&record.id, &category, &actor).await?;
            print_json(&serde_json::to_value(change)?)
        }
        Command::Recategorize { dry_run, actor } => run_recategorize(service, dry_run, &actor).await,
        Command::Delete { keys } => {
            let mut pg = load_playground(service).await?;
            let keys: Vec<String> = keys.iter().map(|raw| key_for(&pg, raw)).collect();
            if let [key] = keys.as_slice() {
                let outcome = pg.delete_template(service, key).await?;
                return print_json(&serde_json::to_value(outcome)?);
            }
            let report = pg.bulk_delete(service, &keys).await;
            print_json(&serde_json::to_value(report)?)
        }
    }
}

async fn run_duplicates(service: &TemplateService, dup: DuplicatesCommand) -> Result<(), CliError> {
    let records = service.list().await?;
    let report = duplicates::detect(&records);

    match dup.command {
        DuplicatesSubcommand::Scan { json } => {
            if json {
                return print_json(&serde_json::to_value(&report)?);
            }
            println!(
                "scanned {} templates: {} exact groups ({} removable), {} potential groups",
                report.scanned,
                report.duplicates.len(),
                report.removable(),
                report.potential.len()
            );
            for group in report.duplicates.iter().chain(report.potential.iter()) {
                println!(
                    "  [{:?} {:.2}] keep {} \"{}\" remove {}",
                    group.kind,
                    group.score,
                    group.keep.id,
                    group.keep.title,
                    group.remove.iter().map(|r| r.id.as_str()).collect::<Vec<_>>().join(", ")
                );
            }
            Ok(())
        }
        DuplicatesSubcommand::Clean { backup, dry_run } => {
            let options = CleanupOptions { backup_path: backup, dry_run };
            let outcome = duplicates::cleanup(service, &report, &options).await?;
            print_json(&serde_json::to_value(outcome)?)
        }
    }
}

async fn run_upload(service: &TemplateService, files: Vec<PathBuf>, category: &str) -> Result<(), CliError> {
    let mut rejected = Vec::new();
    let mut media = Vec::new();
    for path in files {
        match MediaFile::from_path(&path) {
            Ok(file) => media.push(file),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "skipping file");
                rejected.push(serde_json::json!({ "path": path.display().to_string(), "error": e.to_string() }));
            }
        }
    }

    let uploader = LocalMediaStore::from_config(service.config());
    let outcomes = upload::upload_all(&uploader, &media, &service.config().upload).await;

    let mut created = Vec::new();
    let mut errors = Vec::new();
    for new in upload::templates_from_uploads(&outcomes, category) {
        let title = new.title.clone();
        match service.create(new).await {
            Ok(record) => created.push(record),
            Err(e) => errors.push(serde_json::json!({ "title": title, "error": e.to_string() })),
        }
    }

    print_json(&serde_json::json!({
        "rejected": rejected,
        "uploads": outcomes,
        "created": created,
        "errors": errors,
    }))
}

async fn run_recategorize(service: &TemplateService, dry_run: bool, actor: &str) -> Result<(), CliError> {
    let catalog = CategoryCatalog::default();
    let records = service.list().await?;
    let updates: Vec<CategoryUpdate> = records
        .iter()
        .filter_map(|r| {
            let label = catalog.best_match(&r.category)?;
            (label != r.category).then(|| CategoryUpdate {
                id: r.id.clone(),
                category: label.to_owned(),
                actor: actor.to_owned(),
            })
        })
        .collect();

    if dry_run {
        let plan: Vec<Value> = updates
            .iter()
            .filter_map(|u| {
                let from = records.iter().find(|r| r.id == u.id)?;
                Some(serde_json::json!({ "id": u.id, "from": from.category, "to": u.category }))
            })
            .collect();
        return print_json(&serde_json::json!({ "dry_run": true, "planned": plan }));
    }

    let report = service.bulk_update_categories(updates).await;
    print_json(&serde_json::json!({
        "succeeded": report.succeeded(),
        "failed": report.failed(),
        "chunks": report.chunks,
        "outcomes": report.outcomes,
    }))
}

async fn load_playground(service: &TemplateService) -> Result<Playground, CliError> {
    let mut pg = Playground::new(CategoryCatalog::default());
    pg.load_from(service).await?;
    Ok(pg)
}

async fn find_record(service: &TemplateService, id: &str) -> Result<TemplateRecord, CliError> {
    let resolved = service.resolve_id(id, "", "").await?;
    let Some(resolved) = resolved else {
        return Err(CliError::NotFound(id.to_owned()));
    };
    service.get(&resolved).await?.ok_or_else(|| CliError::NotFound(id.to_owned()))
}

/// Accept either a composite key or a bare template id.
fn key_for(pg: &Playground, raw: &str) -> String {
    if playground::parse_key(raw).is_some() {
        return raw.to_owned();
    }
    pg.groups()
        .iter()
        .find(|g| g.position(raw).is_some())
        .map_or_else(|| raw.to_owned(), |g| playground::composite_key(&g.id, raw))
}

async fn read_text(path: &Path) -> Result<String, CliError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Io { path: path.to_path_buf(), source })
}

async fn read_snapshot(path: &Path) -> Result<Vec<TemplateRecord>, CliError> {
    let text = read_text(path).await?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&text)?)
}

async fn write_json(path: &Path, value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, rendered)
        .await
        .map_err(|source| CliError::Io { path: path.to_path_buf(), source })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
