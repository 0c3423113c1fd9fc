//! The `poll` command.

use std::io::Write;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use wsconnect_google::{Connector, EventFeed, PollResult};

use crate::cli::PollArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Polls the requested feed and prints the result as JSON.
pub async fn run(args: PollArgs, config: &CliConfig, cancel: CancellationToken) -> CliResult<()> {
    let connector = Connector::new(config.to_connector_config()?)?;
    let feed = connector.feed(args.feed.into());

    let result = collect(&feed, &args, &cancel).await?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &result)?;
    writeln!(stdout)?;
    Ok(())
}

/// Polls once, or until the window is exhausted with `--all`.
///
/// Events from every page are concatenated; the cursor is the last one.
pub async fn collect(
    feed: &EventFeed,
    args: &PollArgs,
    cancel: &CancellationToken,
) -> CliResult<PollResult> {
    let mut cursor = args.cursor.clone();
    let mut events = Vec::new();
    let mut pages = 0usize;

    loop {
        let page = match feed.poll(&cursor, args.page_size, args.start, cancel).await {
            Ok(page) => page,
            Err(_) if cancel.is_cancelled() => return Err(CliError::Interrupted),
            Err(err) => return Err(err.into()),
        };
        pages += 1;
        events.extend(page.events);
        cursor = page.cursor;

        if !(args.all && page.has_more) {
            debug!(feed = %feed.kind(), pages, events = events.len(), "poll finished");
            return Ok(PollResult {
                events,
                cursor,
                has_more: page.has_more,
            });
        }
    }
}
