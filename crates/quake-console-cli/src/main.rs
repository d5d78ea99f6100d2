//! quake-console
//!
//! Spawns a dedicated server, mirrors its console output, and feeds
//! typed commands through the remote console. A few local directives:
//! `/status` prints the polled server state, `/snapshot` captures and
//! decodes the world entity list, `/quit` shuts everything down.

use anyhow::Result;
use clap::Parser;
use fteqw_bridge::{
    FsSnapshotStore, RconClient, RconConfig, RconTransport, ServerSupervisor, SpawnConfig,
};
use quake_console::{ConsoleSession, SessionConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, broadcast};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "Console for a supervised Quake dedicated server", long_about = None)]
struct Args {
    /// Quake base directory containing the engine and game data
    #[arg(long)]
    basedir: PathBuf,

    /// Game subdirectory (mod) to load
    #[arg(long, default_value = "id1")]
    game: String,

    /// Map to load on startup
    #[arg(long)]
    map: Option<String>,

    /// Server executable name, resolved under the base directory
    #[arg(long, default_value = "fteqwsv64")]
    engine: String,

    /// rcon_password set on the server and used for commands
    #[arg(long)]
    rcon_password: Option<String>,

    /// UDP port the server listens on
    #[arg(long, default_value_t = fteqw_bridge::rcon::DEFAULT_PORT)]
    port: u16,

    /// Print captured snapshot entities as JSON
    #[arg(long)]
    json: bool,

    /// Disable the periodic status poll
    #[arg(long)]
    no_poll: bool,
}

/// Print supervisor output lines until the channel closes.
fn print_output(mut rx: broadcast::Receiver<String>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(line) => println!("{line}"),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let supervisor = Arc::new(ServerSupervisor::new());
    let printer = print_output(supervisor.subscribe());

    let spawn_config = SpawnConfig {
        base_dir: args.basedir.clone(),
        game_dir: args.game.clone(),
        map: args.map.clone(),
        executable: args.engine.clone(),
        rcon_password: args.rcon_password.clone(),
        port: args.port,
        ..Default::default()
    };
    supervisor.spawn(&spawn_config).await;

    let rcon = Arc::new(
        RconClient::connect(RconConfig::local(
            args.port,
            args.rcon_password.clone().unwrap_or_default(),
        ))
        .await?,
    );
    let transport = Arc::new(RconTransport::new(rcon.clone(), supervisor.clone()));
    let session = Arc::new(Mutex::new(ConsoleSession::new(
        transport,
        SessionConfig::for_game(&args.game),
    )));

    // Server output also lands in the session transcript
    let feeder = {
        let session = session.clone();
        let mut rx = supervisor.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(line) => session.lock().await.push_output(line),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    let poll = if args.no_poll {
        None
    } else {
        Some(ConsoleSession::start_polling(session.clone()).await)
    };

    let store = FsSnapshotStore::new(args.basedir.clone());

    info!("console ready; /status, /snapshot, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        match line.as_str() {
            "" => continue,
            "/quit" => break,
            "/status" => {
                let session = session.lock().await;
                let status = session.status();
                println!("map: {}  players: {}", status.map, status.players);
            }
            "/snapshot" => {
                let mut session = session.lock().await;
                for out in session.capture_snapshot(&store).await {
                    println!("{out}");
                }
                if args.json {
                    println!("{}", serde_json::to_string_pretty(session.entities())?);
                } else {
                    for entity in session.entities() {
                        println!("{:4}  {}", entity.index, entity.classname);
                    }
                }
            }
            command => {
                let mut session = session.lock().await;
                for out in session.issue_command(command).await {
                    println!("{out}");
                }
            }
        }
    }

    if let Some(poll) = poll {
        poll.stop();
    }
    feeder.abort();
    rcon.close();
    supervisor.kill().await;
    printer.abort();

    Ok(())
}
