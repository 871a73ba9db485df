use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use client::{ClientConfig, LocalEdit, Reconciler, SceneChange, Transport, TransportError, Update, run_session};
use frames::{CodecError, ServerMessage, Vec3, VoxelObject};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] client::config::ConfigError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("health check failed: HTTP {0}")]
    Unhealthy(u16),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("connection closed by server")]
    Closed,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("server error: {message}")]
    Server { message: String },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
}

#[derive(Parser, Debug)]
#[command(name = "voxel-cli", about = "Voxel room server websocket CLI")]
struct Cli {
    /// WebSocket URL; derived from VOXEL_SERVER_HOST / VOXEL_SERVER_PORT when absent.
    #[arg(long, env = "VOXEL_WS_URL")]
    url: Option<String>,

    /// HTTP base URL for `ping`; derived like `--url` when absent.
    #[arg(long, env = "VOXEL_BASE_URL")]
    base_url: Option<String>,

    /// Seconds to wait for each expected server reply.
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the server is up.
    Ping,
    /// Create a room, print its id, and serve the scene to joiners.
    Host {
        /// Snapshot file to start the room with.
        #[arg(long)]
        scene: Option<PathBuf>,
    },
    /// Join a room and print scene and membership events.
    Watch { room_id: String },
    /// Join a room and print the scene the owner uploads, as JSON.
    Export {
        room_id: String,
        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace a room's scene with a snapshot file.
    Import { room_id: String, file: PathBuf },
    /// Add one voxel to a room.
    Add {
        room_id: String,
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
        #[arg(allow_negative_numbers = true)]
        z: f64,
        #[arg(long, default_value = "#ff0000")]
        color: String,
        #[arg(long, default_value_t = frames::voxel::DEFAULT_CUBE_SIZE)]
        size: f64,
    },
}

struct CliContext {
    ws_url: String,
    base_url: String,
    timeout: Duration,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    let ctx = CliContext {
        ws_url: cli.url.unwrap_or_else(|| config.ws_url()),
        base_url: cli.base_url.unwrap_or_else(|| config.http_url()),
        timeout: Duration::from_secs(cli.timeout_secs),
    };

    match cli.command {
        Command::Ping => run_ping(&ctx).await,
        Command::Host { scene } => run_host(&ctx, scene.as_deref()).await,
        Command::Watch { room_id } => run_watch(&ctx, &room_id).await,
        Command::Export { room_id, out } => run_export(&ctx, &room_id, out.as_deref()).await,
        Command::Import { room_id, file } => run_import(&ctx, &room_id, &file).await,
        Command::Add { room_id, x, y, z, color, size } => {
            let object = VoxelObject::new(Vec3::new(x, y, z), Vec3::splat(size), color);
            run_add(&ctx, &room_id, object).await
        }
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

async fn run_ping(ctx: &CliContext) -> Result<(), CliError> {
    let url = format!("{}/healthz", ctx.base_url.trim_end_matches('/'));
    let status = reqwest::get(url).await?.status();
    if !status.is_success() {
        return Err(CliError::Unhealthy(status.as_u16()));
    }
    println!("ok");
    Ok(())
}

async fn run_host(ctx: &CliContext, scene: Option<&Path>) -> Result<(), CliError> {
    let (mut reconciler, mut inbound) = connect(ctx).await?;
    if let Some(path) = scene {
        let snapshot = frames::SceneSnapshot::from_json(&read_file(path).await?)?;
        reconciler.restore(snapshot);
    }

    reconciler.create_room();
    loop {
        let msg = recv_next(&mut inbound, ctx.timeout, "createRoom reply").await?;
        let created = matches!(msg, ServerMessage::RoomCreated(_));
        if let Update::ServerError(err) = reconciler.handle(msg) {
            return Err(CliError::Server { message: err.message });
        }
        if created {
            break;
        }
    }
    if let Some(room_id) = &reconciler.status().room_id {
        println!("{room_id}");
    }
    eprintln!("hosting {} objects; waiting for participants", reconciler.scene().len());

    stream_updates(reconciler, inbound).await;
    Ok(())
}

async fn run_watch(ctx: &CliContext, room_id: &str) -> Result<(), CliError> {
    let (mut reconciler, mut inbound) = connect(ctx).await?;
    join(ctx, &mut reconciler, &mut inbound, room_id).await?;
    eprintln!("joined {room_id} ({} participants)", reconciler.status().participant_count);
    stream_updates(reconciler, inbound).await;
    Ok(())
}

async fn run_export(ctx: &CliContext, room_id: &str, out: Option<&Path>) -> Result<(), CliError> {
    let (mut reconciler, mut inbound) = connect(ctx).await?;
    join(ctx, &mut reconciler, &mut inbound, room_id).await?;

    // The owner answers our join with its scene.
    loop {
        let msg = recv_next(&mut inbound, ctx.timeout, "the room owner's scene").await?;
        if let Update::Scene(SceneChange::Replaced { .. }) = reconciler.handle(msg) {
            break;
        }
    }

    let json = reconciler.export_json()?;
    match out {
        Some(path) => {
            tokio::fs::write(path, json).await.map_err(|source| CliError::Io { path: path.to_owned(), source })?;
            eprintln!("exported {} objects to {}", reconciler.scene().len(), path.display());
        }
        None => println!("{json}"),
    }
    finish(reconciler, inbound).await;
    Ok(())
}

async fn run_import(ctx: &CliContext, room_id: &str, file: &Path) -> Result<(), CliError> {
    let text = read_file(file).await?;
    let snapshot = frames::SceneSnapshot::from_json(&text)?;

    let (mut reconciler, mut inbound) = connect(ctx).await?;
    join(ctx, &mut reconciler, &mut inbound, room_id).await?;
    await_owner_snapshot(ctx, &mut reconciler, &mut inbound).await?;
    reconciler.load_snapshot(snapshot)?;
    eprintln!("uploaded {} objects to {room_id}", reconciler.scene().len());
    finish(reconciler, inbound).await;
    Ok(())
}

async fn run_add(ctx: &CliContext, room_id: &str, object: VoxelObject) -> Result<(), CliError> {
    let (mut reconciler, mut inbound) = connect(ctx).await?;
    join(ctx, &mut reconciler, &mut inbound, room_id).await?;
    await_owner_snapshot(ctx, &mut reconciler, &mut inbound).await?;
    let change = reconciler.add(object)?;
    eprintln!("{}", describe(&Update::Scene(change)));
    finish(reconciler, inbound).await;
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

type Session = (Reconciler<Transport>, mpsc::Receiver<ServerMessage>);

async fn connect(ctx: &CliContext) -> Result<Session, CliError> {
    let (transport, inbound) = Transport::connect(&ctx.ws_url).await?;
    Ok((Reconciler::new(transport), inbound))
}

/// Join `room_id` and wait for the confirmation.
async fn join(
    ctx: &CliContext,
    reconciler: &mut Reconciler<Transport>,
    inbound: &mut mpsc::Receiver<ServerMessage>,
    room_id: &str,
) -> Result<(), CliError> {
    reconciler.join_room(room_id);
    loop {
        let msg = recv_next(inbound, ctx.timeout, "joinRoom reply").await?;
        let joined = matches!(msg, ServerMessage::Joined(_));
        match reconciler.handle(msg) {
            Update::ServerError(err) => return Err(CliError::Server { message: err.message }),
            _ if joined => return Ok(()),
            _ => {}
        }
    }
}

/// Wait for the owner's answer to our join before editing.
///
/// The owner uploads its scene when we join; an edit sent before that upload
/// is relayed would be wiped by it at every other member. Alone in the room
/// there is no owner to wait for. Gives up after the timeout with a warning.
async fn await_owner_snapshot(
    ctx: &CliContext,
    reconciler: &mut Reconciler<Transport>,
    inbound: &mut mpsc::Receiver<ServerMessage>,
) -> Result<(), CliError> {
    if reconciler.status().participant_count <= 1 {
        return Ok(());
    }
    let deadline = tokio::time::Instant::now() + ctx.timeout;
    loop {
        let Ok(msg) = tokio::time::timeout_at(deadline, inbound.recv()).await else {
            tracing::warn!("no scene from the room owner; editing anyway");
            return Ok(());
        };
        match reconciler.handle(msg.ok_or(CliError::Closed)?) {
            Update::Scene(SceneChange::Replaced { .. }) => return Ok(()),
            Update::ServerError(err) => return Err(CliError::Server { message: err.message }),
            _ => {}
        }
    }
}

async fn recv_next(
    inbound: &mut mpsc::Receiver<ServerMessage>,
    timeout: Duration,
    waiting_for: &'static str,
) -> Result<ServerMessage, CliError> {
    tokio::time::timeout(timeout, inbound.recv())
        .await
        .map_err(|_| CliError::Timeout(waiting_for))?
        .ok_or(CliError::Closed)
}

/// Run the session until the server closes, printing every update.
async fn stream_updates(reconciler: Reconciler<Transport>, inbound: mpsc::Receiver<ServerMessage>) {
    // Held open so the session keeps reading edits for its whole life.
    let (_edits_tx, edits_rx) = mpsc::channel::<LocalEdit>(1);
    let (updates_tx, mut updates_rx) = mpsc::channel(64);
    let session = tokio::spawn(run_session(reconciler, inbound, edits_rx, Some(updates_tx)));

    while let Some(update) = updates_rx.recv().await {
        println!("{}", describe(&update));
    }
    task_finished(session.await, "session");
}

/// Close the socket after queued messages are written, then drain.
async fn finish(reconciler: Reconciler<Transport>, mut inbound: mpsc::Receiver<ServerMessage>) {
    reconciler.outbox().close().await;
    let drain = async { while inbound.recv().await.is_some() {} };
    if tokio::time::timeout(Duration::from_secs(2), drain).await.is_err() {
        tracing::warn!("server did not acknowledge close");
    }
}

/// Log a task that panicked or was cancelled. True when it ran to completion.
fn task_finished<T>(joined: Result<T, tokio::task::JoinError>, task: &'static str) -> bool {
    match joined {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(task, error = %e, "task failed");
            false
        }
    }
}

async fn read_file(path: &Path) -> Result<String, CliError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Io { path: path.to_owned(), source })
}

/// One line per update, for terminal output.
fn describe(update: &Update) -> String {
    match update {
        Update::Room(status) => format!(
            "room {} participants={}",
            status.room_id.as_deref().unwrap_or("-"),
            status.participant_count
        ),
        Update::SnapshotSent { objects, delivered } => {
            format!("snapshot sent objects={objects} delivered={delivered}")
        }
        Update::ServerError(err) => format!("error {}: {}", err.code.as_deref().unwrap_or("-"), err.message),
        Update::Scene(change) => match change {
            SceneChange::Added(o) => format!("add {} at {}", o.color, position(&o.position)),
            SceneChange::Removed(o) => format!("remove at {}", position(&o.position)),
            SceneChange::Recolored { object, previous } => {
                format!("recolor {} -> {} at {}", previous, object.color, position(&object.position))
            }
            SceneChange::Unchanged => "remove missed".to_owned(),
            SceneChange::Unmatched(target) => format!("recolor missed at {}", position(&target.position)),
            SceneChange::Cleared(dropped) => format!("clear ({} removed)", dropped.len()),
            SceneChange::Replaced { count, .. } => format!("scene replaced objects={count}"),
        },
    }
}

fn position(p: &Vec3) -> String {
    format!("({}, {}, {})", p.x, p.y, p.z)
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
