//! CLI command implementations.
//!
//! Results go to stdout; progress and summaries meant for a human go to
//! stderr. `receive` prints each replayed part to stdout as the console
//! "page" submits it.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use url::Url;

use botbranch_core::models::Site;
use botbranch_core::store::KvStore;

use crate::config::Config;
use crate::error::BranchError;
use crate::file_store::FileStore;
use crate::gateway::PersistenceGateway;
use crate::progress::{ProgressReporter, TriggerControl};
use crate::receive::{ReceiveOutcome, ReceiveReport, Receiver};
use crate::sites::{profile, ConsoleAdapter, SnapshotAdapter};
use crate::transfer::{ExportReport, Exporter};

fn open_gateway(cfg: &Config) -> PersistenceGateway {
    let store: Arc<dyn KvStore> = Arc::new(FileStore::new(
        &cfg.storage.path,
        cfg.storage.quota_bytes,
    ));
    PersistenceGateway::from_config(store, &cfg.storage)
}

/// Attach the user-facing message to a pipeline error.
fn user_facing(err: BranchError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

pub fn list_sites(show_selectors: bool) {
    println!("{:<10} {:<10} {:<32} DESTINATIONS", "SITE", "NAME", "URL");
    for site in Site::ALL {
        let destinations: Vec<&str> = site.destinations().iter().map(|s| s.id()).collect();
        println!(
            "{:<10} {:<10} {:<32} {}",
            site.id(),
            site.display_name(),
            site.home_url(),
            destinations.join(", ")
        );
        if show_selectors {
            let p = profile(site);
            println!("    input:  {}", p.input.join(" | "));
            println!("    send:   {}", p.send.join(" | "));
            println!("    scroll: {}", p.scroll.join(" | "));
        }
    }
}

/// Harvest a saved page and store the transfer.
pub async fn run_export(
    cfg: &Config,
    page: &Path,
    source: Site,
    target: Site,
    progress: &dyn ProgressReporter,
    json: bool,
) -> Result<ExportReport> {
    if source == target {
        bail!("source and target are both {}", source.display_name());
    }
    let html = tokio::fs::read_to_string(page)
        .await
        .with_context(|| format!("Failed to read page snapshot: {}", page.display()))?;

    let adapter = SnapshotAdapter::parse(source, &html);
    let gateway = open_gateway(cfg);
    let trigger = TriggerControl::new();
    let report = Exporter::new(&adapter, &gateway, cfg, &trigger)
        .export(target, progress)
        .await
        .map_err(user_facing)?;

    if json {
        let obj = serde_json::json!({
            "id": report.id,
            "source": report.source,
            "target": report.target,
            "url": report.url.as_str(),
            "messages": report.messages,
            "parts": report.parts,
            "used_fallback": report.used_fallback,
            "appended_draft": report.appended_draft,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
    } else {
        println!(
            "Stored {} ({} messages in {} part(s)) for {}",
            report.id,
            report.messages,
            report.parts,
            report.target.display_name()
        );
        println!("{}", report.url);
    }
    Ok(report)
}

/// Run the receiving side for a page opened at `page_url`.
pub async fn run_receive(
    cfg: &Config,
    page_url: &str,
    site: Option<Site>,
    progress: &dyn ProgressReporter,
) -> Result<ReceiveReport> {
    let url = Url::parse(page_url).with_context(|| format!("Invalid URL: {}", page_url))?;
    let site = match site.or_else(|| url.host_str().and_then(Site::for_host)) {
        Some(site) => site,
        None => bail!("cannot tell which site {} belongs to; pass --site", page_url),
    };

    let adapter = ConsoleAdapter::stdout(site);
    let gateway = open_gateway(cfg);
    let receiver = Receiver::new(&adapter, &gateway, cfg);
    let report = receiver
        .receive(&url, progress)
        .await
        .map_err(user_facing)?;

    match &report.outcome {
        ReceiveOutcome::Replayed { id, report: replay } => eprintln!(
            "received {}: {}/{} part(s) delivered",
            id,
            replay.delivered(),
            replay.total
        ),
        ReceiveOutcome::PayloadMissing { id } => eprintln!("no payload stored for {}", id),
        ReceiveOutcome::Prefilled => eprintln!("prompt prefilled"),
        ReceiveOutcome::InputNotReady => {
            return Err(user_facing(BranchError::Timeout(format!(
                "the {} input control",
                site.display_name()
            ))))
        }
        ReceiveOutcome::NothingPending | ReceiveOutcome::AlreadyHandled => {
            eprintln!("no transfer pending for {}", site.display_name())
        }
    }
    eprintln!("{}", report.url);
    Ok(report)
}

/// Print a stored payload.
pub async fn inspect(cfg: &Config, id: &str, json: bool) -> Result<()> {
    let gateway = open_gateway(cfg);
    let Some(payload) = gateway.load(id).await.map_err(user_facing)? else {
        return Err(user_facing(BranchError::NotFound(format!("transfer '{}'", id))));
    };

    let messages = payload.decode_messages().map_err(BranchError::from).map_err(user_facing)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    println!(
        "{}  {} part(s), {} message(s)",
        id,
        payload.part_count(),
        messages.len()
    );
    for (i, part) in payload.parts().iter().enumerate() {
        println!("PART {}/{}  {} chars", i + 1, payload.part_count(), part.chars().count());
    }
    for msg in &messages {
        let preview: String = msg.content.chars().take(80).collect();
        let ellipsis = if msg.char_len() > 80 { "..." } else { "" };
        println!(
            "  [{}] {}{}",
            msg.role,
            preview.replace('\n', " "),
            ellipsis
        );
    }
    Ok(())
}

/// Print the pending pointer and whether a receiver would still honour it.
pub async fn show_pending(cfg: &Config) -> Result<()> {
    let gateway = open_gateway(cfg);
    let Some(pointer) = gateway.load_pending_pointer_raw().await.map_err(user_facing)? else {
        println!("No pending transfer.");
        return Ok(());
    };

    let now = Utc::now();
    let age_secs = (now.timestamp_millis() - pointer.timestamp) / 1000;
    let status = if pointer.is_expired(now, gateway.pointer_ttl()) {
        "EXPIRED"
    } else {
        "VALID"
    };
    println!("{:<24} {:<10} {:<8} STATUS", "ID", "TARGET", "AGE");
    println!(
        "{:<24} {:<10} {:<8} {}",
        pointer.id,
        pointer.target.id(),
        format!("{}s", age_secs),
        status
    );
    Ok(())
}
