use tracing::info;
use types::ids::GameId;
use viewer::manager::{ManagerConfig, TransportManager, ViewerEvent};
use viewer::poll::HttpPoller;
use viewer::ws::WsConnector;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let base_url =
        std::env::var("ODDSWIRE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    // http -> ws, https -> wss
    let ws_url = format!("{}/v1/ws", base_url.replacen("http", "ws", 1));

    let mut games: Vec<GameId> = std::env::args().skip(1).filter_map(GameId::try_new).collect();
    if games.is_empty() {
        games = vec![
            GameId::new("game1"),
            GameId::new("game2"),
            GameId::new("game3"),
        ];
    }

    info!(relay = %base_url, games = games.len(), "starting oddswire viewer");

    let poller = HttpPoller::new(base_url.clone()).map_err(anyhow::Error::new)?;
    let (manager, handle, mut events) =
        TransportManager::new(WsConnector::new(ws_url), poller, games, ManagerConfig::default());
    let runner = tokio::spawn(manager.run());

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
        handle.shutdown().await;
    });

    while let Some(event) = events.recv().await {
        match event {
            ViewerEvent::Transport(state) => info!(state = ?state, "transport"),
            ViewerEvent::GameUpdated(game) => info!(
                game = %game.id,
                fixture = format!("{} vs {}", game.home_team, game.away_team),
                score = format!("{}-{}", game.home_score, game.away_score),
                home = %game.home_odds,
                away = %game.away_odds,
                draw = %game.draw_odds,
                "odds"
            ),
            ViewerEvent::GameRemoved(id) => info!(game = %id, "removed"),
        }
    }

    let _ = runner.await;
    Ok(())
}
