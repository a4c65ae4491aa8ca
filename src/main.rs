mod app;
mod component;
mod connection;
mod container;
mod demo;
mod protocol;
mod routes;
mod session;
mod state;
mod transaction;
mod update;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");
    let window_scoped = std::env::var("WINDOW_SCOPED_SESSIONS")
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(true);

    let state = state::AppState::new(demo::factory(), window_scoped);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, window_scoped, "weft listening");
    axum::serve(listener, app).await.expect("server failed");
}
