use fruit_arena_server::admission::ConnectionRegistry;
use fruit_arena_server::config::ServerConfig;
use fruit_arena_server::error::ServerError;
use fruit_arena_server::game_loop::{run_game_loop, GameCommand};
use fruit_arena_server::routes::build_router;
use fruit_arena_server::state::GameBroadcast;
use fruit_arena_server::ws::AppState;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env().map_err(ServerError::Config)?;

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        tracing::error!("Invalid server configuration: {}", e);
        return Err(ServerError::Config(e));
    }

    let listen_addr = config.listen_addr.clone();

    let (game_tx, game_rx) = mpsc::channel::<GameCommand>(256);
    let (broadcast_tx, _) = broadcast::channel::<GameBroadcast>(256);
    let registry = ConnectionRegistry::new();

    // Spawn game loop
    let loop_registry = registry.clone();
    let loop_config = config.clone();
    tokio::spawn(async move {
        run_game_loop(game_rx, broadcast_tx, loop_registry, loop_config).await;
    });

    let app_state = AppState { game_tx, registry };
    let app = build_router(app_state, &config);

    tracing::info!("Starting fruit arena server on {}", listen_addr);
    tracing::info!("Admin page at /{}", config.admin_uri);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
