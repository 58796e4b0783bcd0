use log::info;
use teloxide::{prelude::*, utils::command::BotCommands};

use crate::commands::{Command, answer};
use crate::state::AppState;

/// What to do with an incoming text message
#[derive(Debug, PartialEq)]
enum Route {
    /// Group chatter not addressed to the bot
    Ignore,
    Command(Command),
    UnknownCommand(String),
    Greeting,
}

fn route(text: &str, bot_username: &str, is_private_chat: bool) -> Route {
    let mention = format!("@{bot_username}");
    let is_mentioned = text.contains(&mention);

    if !is_private_chat && !is_mentioned {
        return Route::Ignore;
    }

    let text = text.replace(&mention, "");
    let text = text.trim();

    match Command::parse(text, "") {
        Ok(cmd) => Route::Command(cmd),
        Err(_) if text.starts_with('/') => Route::UnknownCommand(text.to_string()),
        Err(_) => Route::Greeting,
    }
}

pub async fn handle_message(bot: Bot, msg: Message, state: AppState) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        info!("📷 Received non-text message");
        return Ok(());
    };

    let me = bot.get_me().await?;
    let bot_username = me.username.as_deref().unwrap_or("bot");
    let route = route(text, bot_username, msg.chat.is_private());
    info!("📝 Message in chat {}: '{text}' -> {route:?}", msg.chat.id);

    if route == Route::Ignore {
        return Ok(());
    }

    if state.chats.remember(msg.chat.id).await {
        info!("👋 Chat {} will receive sync notices", msg.chat.id);
    }

    match route {
        Route::Command(cmd) => answer(bot, msg, cmd, state).await?,
        Route::UnknownCommand(text) => {
            let response = format!(
                "Unknown command: {text}\n\nAvailable commands:\n{}",
                Command::descriptions()
            );
            bot.send_message(msg.chat.id, response).await?;
        }
        Route::Greeting => {
            let response = format!(
                "Hello! I keep an eye on your stock watchlist.\n\n{}",
                Command::descriptions()
            );
            bot.send_message(msg.chat.id, response).await?;
        }
        Route::Ignore => {}
    }

    Ok(())
}
