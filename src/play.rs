//! Terminal play loop: the boundary where every failure becomes a status line.

use anyhow::Result;
use castle_chess::{
    BoardRenderer, ClientConfig, ConnectionState, GameDocument, MoveError, SessionContext,
    SessionId, SessionStore, ShakmatyValidator, Square, StoreError, Submitted, TextRenderer,
    board_text, open_store, reset_game,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// One line of player input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Move directly from one square to another.
    Move(Square, Square),
    /// Pick up a piece, or drop the selected one on a highlighted square.
    Square(Square),
    /// Redraw the board.
    Board,
    /// Show the status line.
    Status,
    /// Show the command summary.
    Help,
    /// Leave the game.
    Quit,
}

const HELP: &str = "Commands: e2e4 | e2 e4 | e2 (select, then target) | board | status | help | quit";

impl Input {
    /// Parses a line of input. `None` if it is not understood.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim().to_ascii_lowercase();
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["board"] | ["b"] => Some(Input::Board),
            ["status"] => Some(Input::Status),
            ["help"] | ["?"] => Some(Input::Help),
            ["quit"] | ["exit"] | ["q"] => Some(Input::Quit),
            ["select", square] => square.parse().ok().map(Input::Square),
            [from, to] => Some(Input::Move(from.parse().ok()?, to.parse().ok()?)),
            [word] if word.len() == 4 && word.is_ascii() => Some(Input::Move(
                word[..2].parse().ok()?,
                word[2..].parse().ok()?,
            )),
            [word] => word.parse().ok().map(Input::Square),
            _ => None,
        }
    }
}

/// Joins the configured game and plays until the user quits.
#[instrument(skip(config), fields(game_id = %config.game_id()))]
pub async fn run(config: ClientConfig) -> Result<()> {
    let validator = Arc::new(ShakmatyValidator::new());
    let mut ctx = match connect(&config).await {
        Some(ctx) => ctx,
        None => {
            println!("Playing offline. You control both sides.");
            SessionContext::offline(config.game_id().clone(), validator)
        }
    };
    info!(session_id = %ctx.session_id(), "Session started");

    let mut renderer = TextRenderer::new(std::io::stdout());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (published_tx, mut published_rx) = mpsc::channel::<Result<(), StoreError>>(4);

    println!("{}", HELP);
    renderer.render(ctx.position(), &[]);

    loop {
        tokio::select! {
            snapshot = ctx.next_snapshot() => {
                let Some(snapshot) = snapshot else {
                    warn!("Store subscription ended");
                    println!("Lost connection to the game store.");
                    ctx.disconnect();
                    continue;
                };
                let before = ctx.position().to_string();
                println!("{}", ctx.handle_snapshot(snapshot).await);
                if ctx.position() != before {
                    renderer.render(ctx.position(), &[]);
                }
            }
            Some(result) = published_rx.recv() => {
                let before = ctx.position().to_string();
                if let Some(message) = ctx.finish_publish(result) {
                    println!("{}", message);
                }
                if ctx.position() != before {
                    renderer.render(ctx.position(), &[]);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let Some(input) = Input::parse(&line) else {
                    println!("Unrecognized input. {}", HELP);
                    continue;
                };
                if input == Input::Quit {
                    break;
                }
                handle_input(&mut ctx, input, &mut renderer, &published_tx);
            }
        }
    }

    ctx.disconnect();
    info!("Session ended");
    Ok(())
}

/// Opens the store and subscribes. `None` means fall back to offline play.
async fn connect(config: &ClientConfig) -> Option<SessionContext> {
    let store = match open_store(config).await {
        Ok(Some(store)) => store,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "Cannot open store");
            println!("Cannot reach the game store ({}).", e.message);
            return None;
        }
    };

    if let Err(e) = store.fetch(config.game_id()).await {
        if e.is_unavailable() {
            warn!(error = %e, "Store unavailable");
            println!("Cannot reach the game store ({}).", e.message);
            return None;
        }
    }

    let validator = Arc::new(ShakmatyValidator::new());
    match SessionContext::connect(
        SessionId::generate(),
        config.game_id().clone(),
        store,
        validator,
    )
    .await
    {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            warn!(error = %e, "Subscription failed");
            println!("Cannot subscribe to the game ({}).", e.message);
            None
        }
    }
}

fn handle_input<W: std::io::Write>(
    ctx: &mut SessionContext,
    input: Input,
    renderer: &mut TextRenderer<W>,
    published_tx: &mpsc::Sender<Result<(), StoreError>>,
) {
    match input {
        Input::Board => {
            let highlights = ctx
                .selection()
                .map(|s| s.targets.clone())
                .unwrap_or_default();
            renderer.render(ctx.position(), &highlights);
        }
        Input::Status => println!("{}", status_line(ctx)),
        Input::Help => println!("{}", HELP),
        Input::Quit => {}
        Input::Move(from, to) => {
            let result = ctx.submit_move(from, to);
            report_move(ctx, result, renderer, published_tx);
        }
        Input::Square(square) => {
            let drop_here = ctx
                .selection()
                .is_some_and(|s| s.targets.contains(&square));
            if drop_here {
                let result = ctx.move_selected(square);
                report_move(ctx, result, renderer, published_tx);
                return;
            }
            match ctx.select(square) {
                Ok(targets) if targets.is_empty() => println!("Nothing to move from {}.", square),
                Ok(targets) => {
                    renderer.render(ctx.position(), &targets);
                    let list: Vec<String> = targets.iter().map(Square::to_string).collect();
                    println!("Selected {}. Moves: {}", square, list.join(" "));
                }
                Err(e) => println!("{}", e),
            }
        }
    }
}

fn report_move<W: std::io::Write>(
    ctx: &SessionContext,
    result: Result<Submitted, MoveError>,
    renderer: &mut TextRenderer<W>,
    published_tx: &mpsc::Sender<Result<(), StoreError>>,
) {
    match result {
        Ok(Submitted { accepted, publish }) => {
            renderer.render(ctx.position(), &[]);
            println!("{}", accepted.status_message());
            if let Some(publish) = publish {
                let tx = published_tx.clone();
                tokio::spawn(async move {
                    let result = publish.send().await;
                    if tx.send(result).await.is_err() {
                        debug!("Play loop gone before publish finished");
                    }
                });
            }
        }
        Err(e) => println!("{}", e),
    }
}

fn status_line(ctx: &SessionContext) -> String {
    let role = ctx
        .role()
        .map(|role| role.to_string())
        .unwrap_or_else(|| "unassigned".to_string());
    let turn = ctx
        .turn()
        .map(|side| side.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let indicator = match ctx.turn_indicator() {
        Some(indicator) => format!(" ({})", indicator),
        None => String::new(),
    };
    let link = match ctx.connection_state() {
        ConnectionState::Connected => String::new(),
        state => format!(" [{}]", state),
    };
    format!(
        "You are {}. Status: {}. Turn: {}{}.{}",
        role,
        ctx.status(),
        turn,
        indicator,
        link
    )
}

/// Prints the stored document and board.
#[instrument(skip(config), fields(game_id = %config.game_id()))]
pub async fn show(config: ClientConfig) -> Result<()> {
    let store = require_store(&config).await?;
    match store.fetch(config.game_id()).await? {
        None => println!("No game stored under '{}'.", config.game_id()),
        Some(record) => {
            let document = GameDocument::try_from(&record)?;
            println!("{}", serde_json::to_string_pretty(&document)?);
            match board_text(record.position(), &[]) {
                Some(board) => println!("{}", board),
                None => println!("ERROR: Invalid Game State."),
            }
        }
    }
    Ok(())
}

/// Replaces the stored game with a fresh one.
#[instrument(skip(config), fields(game_id = %config.game_id()))]
pub async fn reset(config: ClientConfig, force: bool) -> Result<()> {
    let store = require_store(&config).await?;
    reset_game(store.as_ref(), config.game_id(), force).await?;
    println!("Game '{}' reset.", config.game_id());
    Ok(())
}

async fn require_store(config: &ClientConfig) -> Result<Arc<dyn SessionStore>> {
    open_store(config)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No store configured; the offline store holds no games"))
}
