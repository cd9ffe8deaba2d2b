//! `hashcloud`: drive the object service against the configured local stores.

mod cli;

use crate::cli::{Cli, Command, Credentials};
use clap::Parser;
use hashcloud_acl::AclDelta;
use hashcloud_auth::{Action, CanonicalMessage, Principal, Signer};
use hashcloud_catalog::{Database, Repository};
use hashcloud_config::Config;
use hashcloud_service::{ObjectService, Payload};
use hashcloud_storage::backend::LocalBackend;
use miette::{IntoDiagnostic, Result, miette};
use serde::Serialize;
use std::fmt::Debug;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Turns an `exn` error tree into a report, keeping the whole tree.
trait Report<T> {
    fn report(self, context: &str) -> Result<T>;
}

impl<T, E: Debug> Report<T> for std::result::Result<T, E> {
    fn report(self, context: &str) -> Result<T> {
        self.map_err(|e| miette!("{context}: {e:?}"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).report("failed to load configuration")?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Address { key } => {
            let signer = Signer::from_hex(&key).report("invalid private key")?;
            println!("{}", signer.principal());
            Ok(())
        },
        Command::Sign { key, action, params } => {
            let signer = Signer::from_hex(&key).report("invalid private key")?;
            let message = CanonicalMessage::new(action.into(), &params);
            let signature = signer.sign(message.as_str()).report("signing failed")?;
            println!("{}", signature.to_hex());
            Ok(())
        },
        command => run(command, &config).await,
    }
}

async fn open(config: &Config) -> Result<(ObjectService, Database)> {
    let backend = LocalBackend::new(&config.storage.name, &config.storage.root).report("failed to open storage")?;
    if let Some(parent) = config.catalog.path.parent() {
        tokio::fs::create_dir_all(parent).await.into_diagnostic()?;
    }
    let db = Database::connect(&config.catalog.path).await.report("failed to open catalog")?;
    let service = ObjectService::new(Arc::new(backend), Repository::from(&db));
    Ok((service, db))
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let (service, db) = open(config).await?;
    let result = dispatch(&service, command).await;
    db.close().await;
    result
}

async fn dispatch(service: &ObjectService, command: Command) -> Result<()> {
    match command {
        Command::Upload {
            credentials,
            content_type,
            files,
        } => {
            let mut payloads = Vec::with_capacity(files.len());
            for path in &files {
                let data = tokio::fs::read(path).await.into_diagnostic()?;
                payloads.push(Payload::new(file_name(path), content_type.as_str(), data));
            }
            let digests: Vec<_> = payloads.iter().map(Payload::digest).collect();
            let (principal, signature) = credentials.resolve(&CanonicalMessage::new(Action::Upload, &digests))?;
            let created = service.ingest(&principal, &signature, None, payloads).await.report("upload failed")?;
            print_json(&created)
        },
        Command::List { credentials } => {
            let (principal, signature) = credentials.resolve_with(|principal| {
                CanonicalMessage::new(Action::List, [principal])
            })?;
            let listing = service.list(&principal, &signature).await.report("listing failed")?;
            print_json(&listing)
        },
        Command::Download {
            credentials,
            digest,
            output,
        } => {
            let (principal, signature) = credentials.resolve(&CanonicalMessage::new(Action::Download, [digest]))?;
            let download = service.fetch(&digest, &principal, &signature).await.report("download failed")?;
            let mut content = download.content;
            tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
                match output {
                    Some(path) => std::io::copy(&mut content, &mut std::fs::File::create(path)?),
                    None => std::io::copy(&mut content, &mut std::io::stdout().lock()),
                }
            })
            .await
            .into_diagnostic()?
            .into_diagnostic()?;
            Ok(())
        },
        Command::Share {
            credentials,
            digest,
            grants,
            delta,
        } => {
            let mut merged = match delta {
                Some(json) => serde_json::from_str::<AclDelta>(&json).into_diagnostic()?,
                None => AclDelta::new(),
            };
            for (principal, role) in grants {
                merged = merged.with(principal, role);
            }
            if merged.is_empty() {
                return Err(miette!("nothing to share: pass --grant or --delta"));
            }
            let (principal, signature) = credentials.resolve(&CanonicalMessage::new(Action::Share, [digest]))?;
            let outcomes = service.share(&digest, &principal, &signature, &merged).await.report("share failed")?;
            print_json(&outcomes)
        },
        Command::Delete { credentials, digest } => {
            let (principal, signature) = credentials.resolve(&CanonicalMessage::new(Action::Delete, [digest]))?;
            service.delete(&digest, &principal, &signature).await.report("delete failed")?;
            Ok(())
        },
        Command::Reconcile => {
            let report = service.reconcile().await.report("reconcile failed")?;
            print_json(&report)
        },
        Command::Address { .. } | Command::Sign { .. } => unreachable!("handled before the stores are opened"),
    }
}

impl Credentials {
    /// The requesting principal and its signature over `message`.
    fn resolve(self, message: &CanonicalMessage) -> Result<(Principal, Vec<u8>)> {
        self.resolve_with(|_| message.clone())
    }

    /// Like [`resolve`](Self::resolve) for messages that name the principal.
    fn resolve_with(self, message: impl FnOnce(&Principal) -> CanonicalMessage) -> Result<(Principal, Vec<u8>)> {
        match (self.key, self.principal, self.signature) {
            (Some(key), _, _) => {
                let signer = Signer::from_hex(&key).report("invalid private key")?;
                let principal = signer.principal();
                let signature = signer.sign(message(&principal).as_str()).report("signing failed")?;
                Ok((principal, signature.to_bytes().to_vec()))
            },
            (None, Some(principal), Some(signature)) => {
                let digits = signature.trim().trim_start_matches("0x");
                Ok((principal, hex::decode(digits).into_diagnostic()?))
            },
            _ => Err(miette!("pass --key, or both --principal and --signature")),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).into_diagnostic()?;
    writeln!(stdout).into_diagnostic()
}
