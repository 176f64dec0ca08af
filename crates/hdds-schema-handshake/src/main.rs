// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS schema store CLI
//!
//! Inspects and seeds the durable schema store used by the handshake.
//!
//! # Usage
//!
//! ```bash
//! # List persisted schemas
//! hdds-schema-store --db hdds_schemas.db list
//!
//! # Register a definition under its fingerprint ID
//! hdds-schema-store import point.idl
//!
//! # Write a definition back out
//! hdds-schema-store export 3f2a9c0d11e4b7a8 point.idl
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use hdds_schema_handshake::{Schema, SchemaCache, SchemaId, SchemaStore, SqliteSchemaStore};

#[derive(Parser, Debug)]
#[command(name = "hdds-schema-store")]
#[command(about = "HDDS schema store - inspect and seed persisted schemas", long_about = None)]
struct Args {
    /// Database path (SQLite file)
    #[arg(short, long, default_value = "hdds_schemas.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List persisted schemas
    List,
    /// Show statistics
    Stats,
    /// Print a schema definition
    Show {
        /// Schema ID (hex)
        id: String,
    },
    /// Register a definition file under its fingerprint ID
    Import {
        /// Definition file
        file: PathBuf,
    },
    /// Write a schema definition to a file
    Export {
        /// Schema ID (hex)
        id: String,
        /// Output file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let store = Arc::new(
        SqliteSchemaStore::new(&args.db)
            .with_context(|| format!("cannot open schema store {}", args.db.display()))?,
    );
    let cache = SchemaCache::open(store.clone())?;

    handle_command(args.command, &store, &cache)
}

fn handle_command(cmd: Commands, store: &SqliteSchemaStore, cache: &SchemaCache) -> Result<()> {
    match cmd {
        Commands::List => {
            let ids = cache.known_ids();
            println!("{} schema(s):", ids.len());
            for id in ids {
                let schema = cache.get(id)?;
                println!("  {}  {} bytes", id, schema.len());
            }
        }
        Commands::Stats => {
            println!("Schemas:      {}", store.count());
            println!("Stored bytes: {}", store.total_bytes()?);
        }
        Commands::Show { id } => {
            let schema = cache.get(parse_id(&id)?)?;
            println!("Schema {} ({} bytes):", schema.id(), schema.len());
            println!("{}", String::from_utf8_lossy(schema.bytes()));
        }
        Commands::Import { file } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("cannot read {}", file.display()))?;
            let schema = Schema::from_definition(bytes);
            let id = schema.id();
            if cache.register(schema)? {
                println!("Imported {} as schema {}", file.display(), id);
            } else {
                println!("Schema {} already present", id);
            }
        }
        Commands::Export { id, file } => {
            let schema = cache.get(parse_id(&id)?)?;
            std::fs::write(&file, schema.bytes())
                .with_context(|| format!("cannot write {}", file.display()))?;
            println!("Exported schema {} to {}", schema.id(), file.display());
        }
    }

    Ok(())
}

fn parse_id(raw: &str) -> Result<SchemaId> {
    SchemaId::parse_hex(raw).ok_or_else(|| anyhow!("invalid schema ID '{}'", raw))
}
