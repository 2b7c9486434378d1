//! Echo Bot Example
//!
//! Shows the three ways a handler talks back:
//!
//! - quick reply (`/ping`), answered inline on the event's own transport
//! - explicit actions (`/echo <text>`, `/info`) through the bot's emitter
//! - a conversation (`/guess`) that keeps reading the same user's messages
//!
//! Every private message first passes a logging middleware that calls
//! `next()` to hand over to the command handler.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --config demos/echo_bot/brass.toml
//! ```

use std::cmp::Ordering;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use brass::prelude::*;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about = "Echo bot for the Brass framework")]
struct Args {
    /// Configuration file; searched for as brass.toml / brass.yaml when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`.
    #[arg(short, long)]
    profile: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Logs the message, then hands over to the rest of the chain.
fn log_private<'a>(ctx: &'a mut Context<PrivateMessage>) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let msg = ctx.data();
        info!(
            self_id = ctx.self_id(),
            user_id = msg.user_id,
            text = %msg.message.plain_text(),
            "Private message"
        );
        ctx.next().await;
    })
}

fn ping<'a>(ctx: &'a mut Context<PrivateMessage>) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        if let Err(e) = ctx.reply(QuickOperation::reply("Pong!")).await {
            warn!(error = %e, "Quick reply failed");
        }
    })
}

fn echo<'a>(ctx: &'a mut Context<PrivateMessage>) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let Some(text) = ctx.data().first_text() else {
            return;
        };
        let content = text.text.trim().trim_start_matches("/echo").trim();
        if content.is_empty() {
            return;
        }
        let user_id = ctx.data().user_id;
        if let Err(e) = ctx.emitter().send_private_msg(user_id, content).await {
            error!(error = %e, "Failed to send echo");
        }
    })
}

fn info_cmd<'a>(ctx: &'a mut Context<PrivateMessage>) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let user_id = ctx.data().user_id;
        let emitter = ctx.emitter().clone();

        let nickname = match emitter.get_stranger_info(user_id, false).await {
            Ok(info) => info.nickname,
            Err(e) => {
                warn!(error = %e, "Stranger lookup failed");
                "unknown".to_string()
            }
        };
        let text = MessageChain::new()
            .text(format!("You are {nickname} ({user_id})"))
            .br()
            .text(format!("Message ID: {}", ctx.data().message_id));
        if let Err(e) = emitter.send_private_msg(user_id, text).await {
            error!(error = %e, "Failed to send info");
        }
    })
}

/// Number guessing over several messages from the same user.
fn guess<'a>(
    ctx: &'a mut Context<PrivateMessage>,
    session: &'a mut Session<PrivateMessage>,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let started = ctx
            .data()
            .first_text()
            .is_some_and(|t| t.command("/") == Some("guess"));
        if !started {
            return;
        }

        let user_id = ctx.data().user_id;
        let emitter = ctx.emitter().clone();
        let say = |text: String| {
            let emitter = emitter.clone();
            async move {
                if let Err(e) = emitter.send_private_msg(user_id, text).await {
                    warn!(error = %e, "Failed to send");
                }
            }
        };

        let secret = ctx.time().rem_euclid(100) + 1;
        say("I'm thinking of a number between 1 and 100. You have 7 tries.".into()).await;

        for attempt in 1..=7 {
            let answer = match session.next_within(Duration::from_secs(60), &[]).await {
                Ok(answer) => answer,
                Err(e) => {
                    say(format!("Game over: {e}")).await;
                    return;
                }
            };
            let number = answer
                .data()
                .first_text()
                .and_then(|t| t.text.trim().parse::<i64>().ok());
            let Some(number) = number else {
                say("Numbers only, please.".into()).await;
                continue;
            };
            match number.cmp(&secret) {
                Ordering::Less => say("Higher.".into()).await,
                Ordering::Greater => say("Lower.".into()).await,
                Ordering::Equal => {
                    say(format!("Got it in {attempt}!")).await;
                    return;
                }
            }
        }
        say(format!("Out of tries, it was {secret}.")).await;
    })
}

fn group_ping<'a>(ctx: &'a mut Context<GroupMessage>) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        if let Err(e) = ctx.reply(QuickOperation::reply("Pong!")).await {
            warn!(error = %e, "Quick reply failed");
        }
    })
}

/// Accepts every friend request, inline when the transport allows it.
fn accept_friend<'a>(ctx: &'a mut Context<FriendRequest>) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let request = ctx.data();
        info!(user_id = request.user_id, comment = %request.comment, "Friend request");
        let result = if ctx.can_reply() {
            ctx.reply(QuickOperation::approve(true, "")).await.map_err(anyhow::Error::from)
        } else {
            ctx.emitter()
                .set_friend_add_request(&request.flag, true, "")
                .await
                .map_err(anyhow::Error::from)
        };
        if let Err(e) = result {
            error!(error = %e, "Failed to accept friend request");
        }
    })
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = BrassRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }
    let mut runtime = builder.build().await?;

    let private = runtime.on_event::<PrivateMessage>();
    let mut logged = private.compose([]);
    logged.middleware(handler(log_private));
    logged
        .handle(handler(ping), [on_command("/", ["ping"])])
        .handle(handler(echo), [on_command("/", ["echo"])])
        .handle(handler(info_cmd), [on_command("/", ["info"])])
        .handle(conversation(guess), []);

    runtime
        .on_event::<GroupMessage>()
        .handle(handler(group_ping), [on_command("/", ["ping"])]);

    runtime
        .on_event::<FriendRequest>()
        .handle(handler(accept_friend), []);

    runtime.run().await?;
    Ok(())
}
