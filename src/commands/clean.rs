use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::api::GmailTrashStore;
use crate::cli::CleanArgs;
use crate::context::AppContext;
use crate::engine::batch::{BatchCoordinator, BatchOutcome, HaltReason};
use crate::engine::selection::Selection;
use crate::error::{AppError, AppResult};
use crate::output::OutputMode;

use super::scan_mailbox;

const FAILED_SHOWN: usize = 20;

pub async fn run(ctx: &AppContext, args: CleanArgs) -> AppResult<()> {
    let selection = selection_from_args(&args)?;
    let access_token = if args.dry_run {
        ctx.access_token()?
    } else {
        ctx.modify_token()?
    };

    let result = scan_mailbox(ctx, &args.scan, &access_token).await?;
    if let Some(partial) = result.aggregation.incomplete.as_ref() {
        warn!("selecting from partial results: {partial}");
    }

    let ids = selection.resolve(&result.classification);
    if ids.is_empty() {
        let plan = CleanPlan {
            dry_run: args.dry_run,
            selected: 0,
            ids: Vec::new(),
        };
        return ctx
            .output
            .emit("No flagged messages match the selection.", &plan);
    }

    if args.dry_run {
        let text = format!("Dry run: {} messages would move to trash.", ids.len());
        let plan = CleanPlan {
            dry_run: true,
            selected: ids.len(),
            ids: ids.into_vec(),
        };
        return ctx.output.emit(&text, &plan);
    }

    if !args.yes {
        if ctx.output.mode() == OutputMode::Json {
            return Err(AppError::InvalidInput(
                "--json cleanup needs --yes to skip the confirmation prompt".to_string(),
            ));
        }
        if !confirm(ids.len())? {
            return ctx.output.emit("Cancelled. Nothing was moved.", &CleanPlan {
                dry_run: false,
                selected: ids.len(),
                ids: Vec::new(),
            });
        }
    }

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing batches already in flight");
                cancel.cancel();
            }
        }
    });

    let store = GmailTrashStore::new(ctx.gmail_client.clone(), access_token);
    let outcome = BatchCoordinator::new(&store, ctx.settings.batch)
        .trash(ids, &cancel)
        .await;
    interrupt.abort();

    let summary = CleanSummary {
        categories_found: result.classification.non_empty().count(),
        outcome: &outcome,
    };
    ctx.output.emit(&render_outcome(&summary), &summary)?;

    match outcome.halted {
        Some(reason @ HaltReason::StoreUnreachable { .. }) => Err(AppError::Halted(reason)),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Serialize)]
struct CleanPlan {
    dry_run: bool,
    selected: usize,
    ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CleanSummary<'a> {
    categories_found: usize,
    #[serde(flatten)]
    outcome: &'a BatchOutcome,
}

fn selection_from_args(args: &CleanArgs) -> AppResult<Selection> {
    let selection = Selection {
        categories: args.categories.clone(),
        senders: args.senders.clone(),
        all_flagged: args.all,
    };
    if selection.is_empty() {
        return Err(AppError::InvalidInput(
            "choose what to trash with --category, --sender or --all".to_string(),
        ));
    }
    Ok(selection)
}

fn confirm(count: usize) -> AppResult<bool> {
    let mut stderr = io::stderr();
    write!(
        stderr,
        "Move {count} messages to trash? They stay recoverable from Trash. Type 'yes' to confirm: "
    )?;
    stderr.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_confirmed(&answer))
}

fn is_confirmed(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

fn render_outcome(summary: &CleanSummary<'_>) -> String {
    let outcome = summary.outcome;
    let mut out = String::new();
    let _ = writeln!(out, "Categories found: {}", summary.categories_found);
    let _ = write!(
        out,
        "Moved {} of {} messages to trash",
        outcome.succeeded, outcome.attempted
    );
    if outcome.already_trashed > 0 {
        let _ = write!(out, " ({} were already gone)", outcome.already_trashed);
    }

    if !outcome.failed.is_empty() {
        let _ = write!(out, "\nFailed: {}", outcome.failed.len());
        for failed in outcome.failed.iter().take(FAILED_SHOWN) {
            let _ = write!(out, "\n   {}: {}", failed.id, failed.reason);
        }
        let hidden = outcome.failed.len().saturating_sub(FAILED_SHOWN);
        if hidden > 0 {
            let _ = write!(out, "\n   ... and {hidden} more");
        }
    }
    if outcome.skipped > 0 {
        let _ = write!(out, "\nNot attempted: {}", outcome.skipped);
    }
    if let Some(reason) = outcome.halted {
        let _ = write!(out, "\nStopped early: {reason}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::batch::FailedMessage;
    use crate::engine::classify::Category;

    fn args() -> CleanArgs {
        CleanArgs {
            scan: Default::default(),
            categories: Vec::new(),
            senders: Vec::new(),
            all: false,
            yes: false,
            dry_run: false,
        }
    }

    #[test]
    fn requires_some_selection() {
        assert!(matches!(
            selection_from_args(&args()),
            Err(AppError::InvalidInput(_))
        ));

        let selection = selection_from_args(&CleanArgs {
            categories: vec![Category::Marketing],
            senders: vec!["news@shop.com".to_string()],
            ..args()
        })
        .expect("selection");
        assert_eq!(selection.categories, [Category::Marketing]);
        assert_eq!(selection.senders, ["news@shop.com"]);
        assert!(!selection.all_flagged);
    }

    #[test]
    fn only_typed_yes_confirms() {
        assert!(is_confirmed("yes\n"));
        assert!(is_confirmed("  YES "));
        assert!(!is_confirmed("y"));
        assert!(!is_confirmed(""));
    }

    #[test]
    fn outcome_lists_failures_and_halt() {
        let outcome = BatchOutcome {
            attempted: 3,
            succeeded: 2,
            already_trashed: 1,
            failed: vec![FailedMessage {
                id: "m3".to_string(),
                reason: "permission denied: read only".to_string(),
            }],
            skipped: 1000,
            batches: Vec::new(),
            halted: Some(HaltReason::StoreUnreachable {
                consecutive_failed_batches: 3,
            }),
        };

        let text = render_outcome(&CleanSummary {
            categories_found: 4,
            outcome: &outcome,
        });
        assert!(text.starts_with(
            "Categories found: 4\nMoved 2 of 3 messages to trash (1 were already gone)"
        ));
        assert!(text.contains("m3: permission denied: read only"));
        assert!(text.contains("Not attempted: 1000"));
        assert!(text.contains("Stopped early: mail store unreachable"));

        let json = serde_json::to_value(CleanSummary {
            categories_found: 4,
            outcome: &outcome,
        })
        .expect("json");
        assert_eq!(json["categories_found"], 4);
        assert_eq!(json["succeeded"], 2);
    }
}
