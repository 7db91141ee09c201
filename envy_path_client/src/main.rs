// CLI entry point for the Envy Path client.
//
// A headless terminal client over the library API. `menu` performs the
// identity handshake and lists active rooms; `play <room>` joins a room and
// reads commands from stdin while the channel is pumped between lines.
// Board cells are drawn with the same palette the graphical client uses.
//
// Usage:
//   envy-client [OPTIONS] <COMMAND>
//     menu                      Fetch identity and list active rooms
//     play <ROOM>               Join a room
//   Options (each also read from the environment):
//     --config <FILE>           JSON config file      (ENVY_PATH_CONFIG)
//     --server-url <URL>        Server base URL       (ENVY_PATH_SERVER_URL)
//     --token-path <FILE>       Player token file     (ENVY_PATH_TOKEN_PATH)
//     --timeout-secs <N>        Menu handshake wait   (ENVY_PATH_TIMEOUT_SECS)
//
// Logging goes to stderr through `tracing`; set RUST_LOG to adjust.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use clap::{Parser, Subcommand};
use envy_path_client::palette::{object_color, rgb};
use envy_path_client::{
    ClientConfig, ClientError, FileTokenStore, MenuSession, RoomSession, RoomState, RoomStatus,
    TokenStore, WebSocketTransport,
};
use envy_path_protocol::{PlayerToken, RoomToken};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "envy-client", version, about = "Terminal client for Envy Path rooms")]
struct Cli {
    #[arg(long, env = "ENVY_PATH_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "ENVY_PATH_SERVER_URL")]
    server_url: Option<String>,
    #[arg(long, env = "ENVY_PATH_TOKEN_PATH")]
    token_path: Option<PathBuf>,
    #[arg(long, env = "ENVY_PATH_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch (or create) the player identity and list active rooms.
    Menu,
    /// Join a room and play from stdin.
    Play { room: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "envy-client failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ClientError> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = cli.server_url {
        config.server_url = url;
    }
    if let Some(path) = cli.token_path {
        config.token_path = path;
    }
    let timeout = Duration::from_secs(cli.timeout_secs);

    match cli.command {
        Command::Menu => {
            let menu = menu_handshake(&config, timeout)?;
            let state = menu.state();
            if let Some(token) = state.player_token() {
                println!("player: {token}");
            }
            if let Some(next) = state.next_room_token() {
                println!("next room: {next}");
            }
            if state.rooms().is_empty() {
                println!("no active rooms");
            }
            for room in state.rooms() {
                println!("  {} ({} connected)", room.token, room.connected_count);
            }
            menu.close()
        }
        Command::Play { room } => {
            let store = FileTokenStore::new(&config.token_path);
            let token = match store.load()? {
                Some(token) => token,
                None => {
                    let menu = menu_handshake(&config, timeout)?;
                    let token = menu.state().player_token().cloned();
                    menu.close()?;
                    token.ok_or(ClientError::MissingPlayerToken)?
                }
            };
            play(&config, RoomToken(room), token)
        }
    }
}

fn menu_handshake(config: &ClientConfig, timeout: Duration) -> Result<MenuSession, ClientError> {
    let store = Box::new(FileTokenStore::new(&config.token_path));
    let mut menu = MenuSession::open(config, store, WebSocketTransport::new(config.read_poll()))?;
    if !menu.wait_for_context(timeout) {
        menu.close()?;
        return Err(ClientError::Config(format!(
            "no reply from {} within {}s",
            config.server_url,
            timeout.as_secs()
        )));
    }
    Ok(menu)
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn play(config: &ClientConfig, room: RoomToken, token: PlayerToken) -> Result<(), ClientError> {
    let transport = WebSocketTransport::new(config.read_poll());
    let mut session = RoomSession::open(config, room.clone(), token, transport)?;
    println!("joined room {room}; commands: ready, select <actor> <slot>, board, quit");

    let lines = spawn_stdin_reader();
    let mut shown = session.state().status();
    loop {
        session.pump(config.read_poll());
        let status = session.state().status();
        if status != shown {
            println!("status: {status}");
            if status != RoomStatus::Loading {
                print_board(session.state());
            }
            shown = status;
        }

        let line = match lines.try_recv() {
            Ok(line) => line,
            Err(TryRecvError::Empty) => continue,
            Err(TryRecvError::Disconnected) => break,
        };
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["quit"] | ["exit"] => break,
            ["ready"] => {
                if !session.set_ready() {
                    println!("not sent (already ready, or not connected)");
                }
            }
            ["board"] => print_board(session.state()),
            ["select", actor, slot] => match (actor.parse::<usize>(), slot.parse::<usize>()) {
                (Ok(actor), Ok(slot)) => match session.select(actor, slot) {
                    Ok(submitted) => {
                        print_board(session.state());
                        if submitted {
                            println!("solution submitted");
                        }
                    }
                    Err(e) => println!("{e}"),
                },
                _ => println!("usage: select <actor> <slot>"),
            },
            _ => println!("commands: ready, select <actor> <slot>, board, quit"),
        }
    }
    session.close()
}

fn paint(hex: &str, text: &str) -> String {
    match rgb(hex) {
        Some((r, g, b)) => format!("\x1b[48;2;{r};{g};{b}m{text}\x1b[0m"),
        None => {
            warn!(hex, "bad palette entry");
            text.to_owned()
        }
    }
}

fn print_board(state: &RoomState) {
    let Some(instance) = state.instance() else {
        println!("(no instance yet)");
        return;
    };
    for (actor, row) in instance.values.iter().enumerate() {
        let picked = state.selection().get(&actor).copied();
        let cells: String = row
            .iter()
            .enumerate()
            .map(|(slot, &value)| {
                let selected = picked == Some(slot);
                let mark = if selected { '*' } else { ' ' };
                paint(
                    object_color(value, selected, state.status()),
                    &format!("{mark}{value:>3} "),
                )
            })
            .collect();
        let envy = if state.envy().get(&actor).copied().unwrap_or(false) {
            " envious"
        } else {
            ""
        };
        println!("{actor:>3} {cells}{envy}");
    }
}
