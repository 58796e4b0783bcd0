use log::{info, warn};
use teloxide::{prelude::*, utils::command::BotCommands};

use crate::state::AppState;
use crate::stock::format::{EmptyState, format_detail, format_empty_state, format_quote_list};
use crate::stock::{AddOutcome, ListView, RefreshOutcome};
use crate::sync::SyncDispatch;

const UNAVAILABLE: &str = "⚙️ Stock data is temporarily unavailable. Please try again later.";

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
pub enum Command {
    #[command(description = "display this text.")]
    Help,
    #[command(description = "show your watchlist with the latest quotes.")]
    List,
    #[command(description = "show price history for a stock - use '/detail AAPL'.")]
    Detail(String),
    #[command(description = "add a stock to your watchlist - use '/add AAPL'.")]
    Add(String),
    #[command(description = "remove a stock from your watchlist - use '/remove AAPL'.")]
    Remove(String),
    #[command(description = "switch between absolute and percentage change.")]
    Mode,
    #[command(description = "fetch fresh quotes now.")]
    Refresh,
    #[command(description = "show the compact widget view.")]
    Widget,
}

fn usage(command: &str) -> String {
    format!("Please provide a stock symbol. Example: /{command} AAPL")
}

/// Text reply for a parsed command
pub async fn respond(state: &AppState, cmd: Command) -> String {
    let service = &state.service;

    match cmd {
        Command::Help => Command::descriptions().to_string(),
        Command::List => match service.list().await {
            Ok(ListView::Quotes { records, mode }) => format_quote_list(&records, mode),
            Ok(ListView::Empty(empty)) => format_empty_state(empty),
            Err(e) => {
                warn!("❌ Listing quotes failed: {e}");
                UNAVAILABLE.to_string()
            }
        },
        Command::Detail(symbol) => {
            if symbol.trim().is_empty() {
                return usage("detail");
            }
            match service.detail(&symbol).await {
                Ok(Some((record, mode))) => format_detail(&record, mode),
                Ok(None) => {
                    let symbol = symbol.trim().to_uppercase();
                    format!("No data for {symbol} yet. Add it with /add {symbol} or try /refresh.")
                }
                Err(e) => {
                    warn!("❌ Detail for '{symbol}' failed: {e}");
                    UNAVAILABLE.to_string()
                }
            }
        }
        Command::Add(symbol) => {
            if symbol.trim().is_empty() {
                return usage("add");
            }
            match service.add_stock(&symbol).await {
                Ok(AddOutcome::Accepted {
                    symbol,
                    newly_added,
                    dispatch,
                }) => match (dispatch, newly_added) {
                    (SyncDispatch::Deferred, _) => format!(
                        "✅ {symbol} added. No network right now, quotes will refresh once you're back online."
                    ),
                    (SyncDispatch::Immediate(_), true) => {
                        format!("✅ {symbol} added. Fetching quotes, check /list in a moment.")
                    }
                    (SyncDispatch::Immediate(_), false) => {
                        format!("{symbol} is already on your watchlist. Refreshing quotes.")
                    }
                },
                Ok(AddOutcome::Rejected) => {
                    format!("❌ \"{}\" is not a valid stock symbol.", symbol.trim())
                }
                Err(e) => {
                    warn!("❌ Adding '{symbol}' failed: {e}");
                    UNAVAILABLE.to_string()
                }
            }
        }
        Command::Remove(symbol) => {
            if symbol.trim().is_empty() {
                return usage("remove");
            }
            let display = symbol.trim().to_uppercase();
            match service.remove_stock(&symbol).await {
                Ok(true) => format!("🗑️ {display} removed from your watchlist."),
                Ok(false) => format!("{display} is not on your watchlist."),
                Err(e) => {
                    warn!("❌ Removing '{symbol}' failed: {e}");
                    UNAVAILABLE.to_string()
                }
            }
        }
        Command::Mode => match service.toggle_display_mode().await {
            Ok(mode) => format!("Now showing {mode} change. Use /list to see your watchlist."),
            Err(e) => {
                warn!("❌ Toggling display mode failed: {e}");
                UNAVAILABLE.to_string()
            }
        },
        Command::Refresh => match service.refresh().await {
            RefreshOutcome::Started(_) => "🔄 Refreshing quotes, check /list in a moment.".to_string(),
            RefreshOutcome::Offline => format_empty_state(EmptyState::NoNetwork),
        },
        Command::Widget => state.widget.text().await,
    }
}

pub async fn answer(bot: Bot, msg: Message, cmd: Command, state: AppState) -> ResponseResult<()> {
    let username = msg
        .from
        .as_ref()
        .and_then(|user| user.username.as_deref())
        .unwrap_or("<no_username>");

    info!("💬 Processing command {cmd:?} from @{username} in chat {}", msg.chat.id);

    if matches!(cmd, Command::Refresh | Command::Add(_) | Command::Detail(_)) {
        bot.send_chat_action(msg.chat.id, teloxide::types::ChatAction::Typing)
            .await?;
    }

    let response = respond(&state, cmd).await;
    info!(
        "📤 Sending response to chat {} (length: {} chars)",
        msg.chat.id,
        response.len()
    );
    bot.send_message(msg.chat.id, response).await?;

    Ok(())
}
