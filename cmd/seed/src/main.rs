//! Admin tooling: loads catalogue data, issues membership serial batches
//! and creates accounts directly against the PostgreSQL store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tm_auth_simple::SimpleAuthProvider;
use tm_core::{Category, MembershipTier, Region, SpecialOffer, Venue, VenueRepo};
use tm_db_postgres::PgStore;
use tm_services::accounts::NewUser;
use tm_services::membership::SerialBatch;
use tm_services::{AccountService, MembershipService, VenueService};
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "TASTEMAP__DATABASE__URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a top-level category.
    CreateCategory {
        #[arg(long)]
        key: String,
        #[arg(long)]
        name: String,
        /// Comma-separated subcategory keys
        #[arg(long, value_delimiter = ',')]
        sub: Vec<String>,
    },
    /// Loads venues from a JSON array; each entry names its category by key.
    ImportVenues { path: PathBuf },
    /// Creates unused serial numbers and prints one code per line.
    IssueSerials {
        #[arg(long)]
        tier: MembershipTier,
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Days until the codes expire; omit for codes that never expire
        #[arg(long)]
        days: Option<i64>,
    },
    /// Creates an account with an argon2-hashed password.
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SEED_PASSWORD")]
        password: String,
        #[arg(long, default_value = "")]
        name: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VenueImport {
    name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    description: String,
    category: String,
    sub_category: Option<String>,
    latitude: f64,
    longitude: f64,
    #[serde(flatten)]
    region: Region,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    special_offers: Vec<SpecialOffer>,
    #[serde(default)]
    images: Vec<String>,
}

impl VenueImport {
    fn into_venue(self, category_id: Uuid) -> Venue {
        Venue {
            id: Uuid::now_v7(),
            name: self.name,
            address: self.address,
            description: self.description,
            category_id,
            sub_category: self.sub_category,
            latitude: self.latitude,
            longitude: self.longitude,
            rating: 0.0,
            region: self.region,
            tags: self.tags,
            special_offers: self.special_offers,
            images: self.images,
            created_at: Utc::now(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let store = Arc::new(PgStore::connect(&args.database_url, 2, Duration::from_secs(10)).await?);
    store.migrate().await?;

    match args.command {
        Command::CreateCategory { key, name, sub } => {
            let service = VenueService::new(store.clone(), store);
            let category = service
                .create_category(Category {
                    id: Uuid::now_v7(),
                    key,
                    name,
                    sub_categories: sub,
                })
                .await?;
            info!(key = %category.key, "category created");
            println!("{}", category.id);
        }
        Command::ImportVenues { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let rows: Vec<VenueImport> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            let service = VenueService::new(store.clone(), store.clone());

            let mut imported = 0usize;
            for row in rows {
                let category = store
                    .find_category(&row.category)
                    .await?
                    .with_context(|| format!("unknown category `{}` for {}", row.category, row.name))?;
                service.create(row.into_venue(category.id)).await?;
                imported += 1;
            }
            info!(imported, "venues imported");
        }
        Command::IssueSerials { tier, count, days } => {
            let service = MembershipService::new(store.clone(), store);
            let batch = SerialBatch {
                tier,
                count,
                valid_for: days.map(chrono::Duration::days),
            };
            let serials = service.issue_batch(batch, Utc::now()).await?;
            info!(count = serials.len(), %tier, "serials issued");
            for serial in serials {
                println!("{}", serial.code);
            }
        }
        Command::CreateUser { email, password, name } => {
            // Only hashing is used here; the throwaway key never signs a session.
            let auth = Arc::new(SimpleAuthProvider::new(
                Uuid::new_v4().as_bytes(),
                chrono::Duration::hours(1),
            )?);
            let service = AccountService::new(store, auth);
            let user = service
                .register(
                    NewUser {
                        email,
                        password,
                        name,
                        ..Default::default()
                    },
                    Utc::now(),
                )
                .await?;
            info!(user_id = %user.id, email = %user.email, "user created");
            println!("{}", user.id);
        }
    }

    Ok(())
}
