use axum::{http::StatusCode, routing::get, Json, Router};
use multiplex_stats::errors::FetchError;
use multiplex_stats::quilt::{HeroQuilt, PosterClient, QuiltConfig};
use serde_json::{json, Value};
use std::net::SocketAddr;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind poster server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn poster_list() -> Json<Value> {
    Json(json!({
        "posters": [
            { "poster_url": "https://img.example/p1.jpg", "title": "Arrival" },
            { "poster_url": "https://img.example/p2.jpg" },
        ]
    }))
}

#[tokio::test]
async fn quilt_loads_posters_once() {
    let addr = serve(Router::new().route("/posters", get(poster_list))).await;
    let client = PosterClient::new(format!("http://{addr}/posters"));

    let posters = client.fetch().await.unwrap();
    assert_eq!(posters.len(), 2);
    assert_eq!(posters[0].title.as_deref(), Some("Arrival"));
    assert_eq!(posters[1].title, None);

    let quilt = HeroQuilt::load(QuiltConfig::default(), &client).await;
    let view = quilt.layout(900.0, 420.0);
    assert_eq!(view.tiles.len(), view.layout.tile_count);
    assert_eq!(view.tiles[2].poster_url, "https://img.example/p1.jpg");
    assert_eq!(view.tiles[3].poster_url, "https://img.example/p2.jpg");
}

#[tokio::test]
async fn non_success_status_leaves_quilt_empty() {
    let app = Router::new().route(
        "/posters",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
    );
    let addr = serve(app).await;
    let client = PosterClient::new(format!("http://{addr}/posters"));

    match client.fetch().await {
        Err(FetchError::Status { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected status error, got {other:?}"),
    }

    let quilt = HeroQuilt::load(QuiltConfig::default(), &client).await;
    assert!(quilt.posters().is_empty());
    assert!(quilt.layout(1280.0, 600.0).tiles.is_empty());
}

#[tokio::test]
async fn malformed_body_is_a_request_error() {
    let app = Router::new().route("/posters", get(|| async { "not json" }));
    let addr = serve(app).await;
    let client = PosterClient::new(format!("http://{addr}/posters"));

    assert!(matches!(
        client.fetch().await,
        Err(FetchError::Request { .. })
    ));
    let quilt = HeroQuilt::load(QuiltConfig::default(), &client).await;
    assert!(quilt.posters().is_empty());
}
