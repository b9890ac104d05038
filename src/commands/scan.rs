use std::fmt::Write as _;

use serde::Serialize;

use crate::cli::ScanCommandArgs;
use crate::context::AppContext;
use crate::engine::aggregate::SenderStats;
use crate::engine::classify::Category;
use crate::error::{AppError, AppResult};

use super::{ScanResult, scan_mailbox};

pub async fn run(ctx: &AppContext, args: ScanCommandArgs) -> AppResult<()> {
    if args.limit == 0 {
        return Err(AppError::InvalidInput(
            "--limit must be greater than 0".to_string(),
        ));
    }

    let access_token = ctx.access_token()?;
    let result = scan_mailbox(ctx, &args.scan, &access_token).await?;
    let report = ReviewReport::from_scan(&result);

    ctx.output.emit(&render_report(&report, args.limit), &report)
}

#[derive(Debug, Clone, Serialize)]
pub struct SenderLine {
    pub address: String,
    pub display_name: String,
    /// Messages from this sender in the surrounding view.
    pub messages: usize,
    pub total: usize,
    pub unread: usize,
    pub read_rate_percent: f64,
    /// Why the sender's mail looked like marketing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SenderLine {
    pub fn new(stats: &SenderStats, messages: usize) -> Self {
        Self {
            address: stats.address.clone(),
            display_name: stats.display_name.clone(),
            messages,
            total: stats.total_count,
            unread: stats.unread_count,
            read_rate_percent: (stats.read_rate() * 1000.0).round() / 10.0,
            reason: None,
        }
    }

    pub fn label(&self) -> String {
        if self.display_name.is_empty() || self.display_name == self.address {
            return self.address.clone();
        }
        format!("{} <{}>", self.display_name, self.address)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    pub category: Category,
    pub title: String,
    pub description: String,
    pub message_count: usize,
    pub sender_count: usize,
    pub senders: Vec<SenderLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    pub depth: String,
    pub scanned: usize,
    pub rejected: usize,
    pub partial: Option<String>,
    pub categories: Vec<CategoryReport>,
    /// Distinct messages flagged by at least one category.
    pub unique_flagged: usize,
}

impl ReviewReport {
    pub fn from_scan(result: &ScanResult) -> Self {
        let aggregation = &result.aggregation;
        let classification = &result.classification;

        let categories = classification
            .non_empty()
            .map(|(category, group)| CategoryReport {
                category,
                title: category.title().to_string(),
                description: category.describe(&result.thresholds),
                message_count: group.message_count(),
                sender_count: group.senders.len(),
                senders: group
                    .senders
                    .iter()
                    .filter_map(|address| {
                        let stats = aggregation.sender(address)?;
                        let ids = group.sender_message_ids(address);
                        let mut line = SenderLine::new(stats, ids.len());
                        if category == Category::Marketing {
                            line.reason = ids
                                .iter()
                                .find_map(|id| classification.marketing_signals.get(id))
                                .map(ToString::to_string);
                        }
                        Some(line)
                    })
                    .collect(),
            })
            .collect();

        Self {
            depth: result.depth.to_string(),
            scanned: aggregation.messages.len(),
            rejected: aggregation.rejected.len(),
            partial: aggregation
                .incomplete
                .as_ref()
                .map(ToString::to_string),
            categories,
            unique_flagged: classification.flagged_message_ids().len(),
        }
    }
}

pub fn render_report(report: &ReviewReport, limit: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Scanned {} messages (depth {})",
        report.scanned, report.depth
    );
    if let Some(partial) = report.partial.as_deref() {
        let _ = writeln!(out, "warning: partial results, {partial}");
    }
    if report.rejected > 0 {
        let _ = writeln!(out, "{} malformed records skipped", report.rejected);
    }

    if report.categories.is_empty() {
        let _ = write!(out, "\nNothing to clean up.");
        return out;
    }

    for category in &report.categories {
        let _ = writeln!(
            out,
            "\n{} ({} messages from {} senders)",
            category.title, category.message_count, category.sender_count
        );
        let _ = writeln!(out, "   {}", category.description);

        for (index, sender) in category.senders.iter().take(limit).enumerate() {
            let _ = writeln!(
                out,
                "   {:>2}. {}: {} messages, {} unread, {:.0}% read",
                index + 1,
                sender.label(),
                sender.messages,
                sender.unread,
                sender.read_rate_percent
            );
            if let Some(reason) = sender.reason.as_deref() {
                let _ = writeln!(out, "       flagged by {reason}");
            }
        }
        let hidden = category.senders.len().saturating_sub(limit);
        if hidden > 0 {
            let _ = writeln!(out, "   ... and {hidden} more senders");
        }
    }

    let _ = write!(
        out,
        "\nTotal: {} unique messages flagged for cleanup",
        report.unique_flagged
    );
    out
}
