use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use partsdb::config::{Config, StorageProvider};
use partsdb::core::Part;
use partsdb::migration::{self, RelationalStore};
use partsdb::store::PartStore;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "partsdb", version, about = "Parts inventory store")]
struct Cli {
    /// 配置文件（toml）；缺省使用内置默认
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// 覆盖 storage.path
    #[arg(long)]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 检测数据文件是否需要迁移
    Detect,
    /// 把旧快照迁移到 SQLite（原文件位置）
    Migrate,
    /// 新增零件
    Add {
        part_number: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,
        #[arg(long, default_value_t = 0)]
        quantity: i64,
        #[arg(long, default_value = "")]
        bin: String,
    },
    /// 关键字排名搜索
    Find {
        #[arg(required = true)]
        keywords: Vec<String>,
    },
    /// 按零件号（或 --id）查询
    Get {
        key: String,
        #[arg(long)]
        id: bool,
    },
    /// 按 id 删除
    Delete { id: u64 },
    /// 打印统计
    Stats {
        #[arg(long)]
        json: bool,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = match &cli.config {
        Some(p) => Config::load(p).with_context(|| format!("loading {}", p.display()))?,
        None => Config::default(),
    };
    if let Some(p) = &cli.path {
        cfg.storage.path = p.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    let path = cfg.storage.path.clone();

    match cli.command {
        Command::Detect => {
            let plan = migration::detect(cfg.storage.provider, &path)
                .with_context(|| format!("detecting {}", path.display()))?;
            print_json(&plan)?;
        }
        Command::Migrate => {
            let report = migration::migrate_legacy(&path, &cfg.migration)
                .with_context(|| format!("migrating {}", path.display()))?;
            print_json(&report)?;
        }
        Command::Stats { json } if cfg.storage.provider == StorageProvider::Sqlite => {
            migration::prepare_storage(&cfg)?;
            let db = RelationalStore::open(&path)?;
            let mut counts = serde_json::Map::new();
            for table in migration::relational::TABLES {
                counts.insert(table.to_string(), db.count(table)?.into());
            }
            counts.insert("schema_version".into(), db.schema_version()?.into());
            if json {
                print_json(&counts)?;
            } else {
                for (k, v) in counts {
                    println!("{:<28} {}", k, v);
                }
            }
        }
        Command::Get { key, id: false } if cfg.storage.provider == StorageProvider::Sqlite => {
            migration::prepare_storage(&cfg)?;
            let db = RelationalStore::open(&path)?;
            match db.get_part_by_number(&key)? {
                Some(p) => print_json(&p)?,
                None => bail!("no part numbered {}", key),
            }
        }
        _ if cfg.storage.provider == StorageProvider::Sqlite => {
            bail!("this command needs storage.provider = \"binary\"");
        }
        command => {
            let store = PartStore::open(&cfg)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            let result = run_store_command(&store, command).await;
            store.close().await.context("final flush")?;
            result?;
        }
    }

    info!("Done");
    Ok(())
}

async fn run_store_command(store: &PartStore, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Add {
            part_number,
            description,
            keywords,
            quantity,
            bin,
        } => {
            let part = Part::new(part_number)
                .with_description(description)
                .with_keywords(keywords.into_iter().filter(|k| !k.is_empty()))
                .with_quantity(quantity)
                .with_bins(bin, "");
            let added = store.add_part(part).await?;
            print_json(&added)?;
        }
        Command::Find { keywords } => {
            let results = store.find_parts(&keywords.join(" ")).await?;
            print_json(&results)?;
        }
        Command::Get { key, id } => {
            let part = if id {
                let id: u64 = key.parse().with_context(|| format!("invalid id {}", key))?;
                store.get_part_by_id(id).await
            } else {
                store.get_part_by_number(&key).await
            };
            match part {
                Some(p) => print_json(&p)?,
                None => bail!("no part matching {}", key),
            }
        }
        Command::Delete { id } => {
            if !store.delete_part(id).await {
                bail!("no part with id {}", id);
            }
            println!("deleted {}", id);
        }
        Command::Stats { json } => {
            let stats = store.stats().await;
            if json {
                print_json(&stats)?;
            } else {
                print!("{}", stats);
            }
        }
        Command::Detect | Command::Migrate => bail!("command does not operate on an open store"),
    }
    Ok(())
}
