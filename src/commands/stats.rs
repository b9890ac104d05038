use std::fmt::Write as _;

use serde::Serialize;

use crate::cli::StatsArgs;
use crate::context::AppContext;
use crate::engine::aggregate::Aggregation;
use crate::error::{AppError, AppResult};

use super::scan::SenderLine;
use super::scan_mailbox;

pub async fn run(ctx: &AppContext, args: StatsArgs) -> AppResult<()> {
    if args.top == 0 {
        return Err(AppError::InvalidInput(
            "--top must be greater than 0".to_string(),
        ));
    }

    let access_token = ctx.access_token()?;
    let result = scan_mailbox(ctx, &args.scan, &access_token).await?;
    let stats = InboxStats::from_aggregation(&result.aggregation, args.top);

    ctx.output.emit(&render_stats(&stats), &stats)
}

#[derive(Debug, Clone, Serialize)]
pub struct InboxStats {
    pub total_messages: usize,
    pub unread: usize,
    pub unique_senders: usize,
    pub rejected: usize,
    pub partial: Option<String>,
    pub top_senders: Vec<SenderLine>,
}

impl InboxStats {
    pub fn from_aggregation(aggregation: &Aggregation, top: usize) -> Self {
        Self {
            total_messages: aggregation.messages.len(),
            unread: aggregation.total_unread(),
            unique_senders: aggregation.senders.len(),
            rejected: aggregation.rejected.len(),
            partial: aggregation
                .incomplete
                .as_ref()
                .map(ToString::to_string),
            top_senders: aggregation
                .top_senders(top)
                .into_iter()
                .map(|stats| SenderLine::new(stats, stats.total_count))
                .collect(),
        }
    }
}

pub fn render_stats(stats: &InboxStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Total messages analysed: {}", stats.total_messages);
    let _ = writeln!(out, "Unread: {}", stats.unread);
    let _ = writeln!(out, "Unique senders: {}", stats.unique_senders);
    if stats.rejected > 0 {
        let _ = writeln!(out, "Malformed records skipped: {}", stats.rejected);
    }
    if let Some(partial) = stats.partial.as_deref() {
        let _ = writeln!(out, "warning: partial results, {partial}");
    }

    if stats.top_senders.is_empty() {
        return out.trim_end().to_string();
    }

    let _ = write!(out, "\nTop senders by volume:");
    for (index, sender) in stats.top_senders.iter().enumerate() {
        let _ = write!(
            out,
            "\n   {:>2}. {}: {} messages, {} unread",
            index + 1,
            sender.label(),
            sender.total,
            sender.unread
        );
    }
    out
}
