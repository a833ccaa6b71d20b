use gigflow_api::{app, AppState};
use gigflow_order::{OrderEngine, Outbox, OutboxDispatcher};
use gigflow_store::collaborators::{DirectoryIdentity, InProcessConversations, TracingNotifier};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gigflow_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = gigflow_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Gigflow API on port {}", config.server.port);

    let db = gigflow_store::DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let store = Arc::new(gigflow_store::PgOrderStore::new(db.pool.clone()));
    let identity = Arc::new(DirectoryIdentity::default());
    let conversations = Arc::new(InProcessConversations::new());
    let notifications = Arc::new(TracingNotifier);

    let (outbox, outbox_rx) = Outbox::channel();
    let engine = Arc::new(OrderEngine::new(
        store,
        identity,
        outbox,
        config.business_rules.engine_policy(),
    ));
    let dispatcher = OutboxDispatcher::new(outbox_rx, engine.clone(), conversations, notifications);
    tokio::spawn(dispatcher.run());

    let app = app(AppState { engine });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
