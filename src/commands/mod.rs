pub mod clean;
pub mod config;
pub mod scan;
pub mod stats;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::api::GmailFeed;
use crate::cli::ScanArgs;
use crate::context::AppContext;
use crate::engine::aggregate::{Aggregation, collect_feed};
use crate::engine::classify::{Classification, Classifier, Thresholds};
use crate::engine::feed::ScanDepth;
use crate::error::AppResult;

/// Everything one scan produced, ready for reporting or selection.
#[derive(Debug)]
pub struct ScanResult {
    pub depth: ScanDepth,
    pub thresholds: Thresholds,
    pub aggregation: Aggregation,
    pub classification: Classification,
}

/// Reads the mailbox, folds it by sender and classifies it.
pub async fn scan_mailbox(
    ctx: &AppContext,
    args: &ScanArgs,
    access_token: &str,
) -> AppResult<ScanResult> {
    let mut settings = ctx.settings.clone();
    if let Some(query) = args.q.as_deref() {
        settings.scan.query = Some(query.to_string());
    }
    args.apply_thresholds(&mut settings.thresholds);
    settings.validate()?;

    let depth = args.depth.unwrap_or(settings.scan.depth);
    info!(depth = %depth, "scanning mailbox");

    let mut feed = GmailFeed::new(
        ctx.gmail_client.clone(),
        access_token,
        depth.limit(),
        &settings.scan,
    );
    let aggregation =
        collect_feed(&mut feed, depth.limit(), &settings.rules.label_hints).await?;

    if let Some(incomplete) = &aggregation.incomplete {
        warn!("{incomplete}");
    }
    for rejected in &aggregation.rejected {
        debug!("skipped record: {rejected}");
    }

    let classifier = Classifier::new(settings.thresholds, settings.rules);
    let classification = classifier.classify(&aggregation, Utc::now());

    Ok(ScanResult {
        depth,
        thresholds: settings.thresholds,
        aggregation,
        classification,
    })
}
