use std::time::Duration;

use agora::prelude::*;

/// Seeded questions cycled through by the demo traffic loop.
const QUESTIONS: &[&str] = &[
    "What does Send actually guarantee?",
    "When should I reach for Arc<Mutex<T>>?",
    "Is select! cancellation safe?",
];

/// Posts a question, reacts to it twice, withdraws one reaction, and
/// marks it answered. Each step reaches every subscriber of the room.
async fn demo_round(
    service: &RoomService<MemoryStore>,
    room_id: RoomId,
    question: &str,
) -> Result<Message, AgoraError> {
    let rid = room_id.to_string();
    let message = service.create_message(&rid, question).await?;
    let mid = message.id.to_string();
    service.react_to_message(&rid, &mid).await?;
    service.react_to_message(&rid, &mid).await?;
    service.remove_reaction(&rid, &mid).await?;
    service.mark_answered(&rid, &mid).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = ServerConfig::from_env()?;
    let server = AgoraServerBuilder::new()
        .config(config)
        .build(MemoryStore::new())
        .await?;

    let service = server.service();
    let room = service.create_room("Lobby", "general").await?;
    let addr = server.local_addr()?;
    tracing::info!(room_id = %room.id, "subscribe at ws://{addr}/subscribe/{}", room.id);

    if std::env::var("AGORA_DEMO_TRAFFIC").is_ok() {
        let shutdown = server.shutdown_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(3));
            for question in QUESTIONS.iter().cycle() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = demo_round(&service, room.id, question).await {
                    tracing::warn!(error = %e, "demo round failed");
                }
            }
        });
    }

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
