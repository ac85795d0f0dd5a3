//! Dashboard — Axum web server for real-time monitoring.
//!
//! Serves a REST API and a self-contained HTML dashboard.
//! CORS enabled for local development.

pub mod routes;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    response::Html,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

pub use routes::{AppState, DashboardState};

/// The dashboard page. Self-contained: fetches the JSON API and renders
/// without external assets.
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>FAIRWAY Dashboard</title>
<style>
  body { font-family: -apple-system, 'Segoe UI', sans-serif; background: #0d1117; color: #c9d1d9; margin: 0; padding: 2rem; }
  h1 { color: #3fb950; letter-spacing: 0.2em; }
  .cards { display: flex; gap: 1rem; flex-wrap: wrap; margin-bottom: 2rem; }
  .card { background: #161b22; border: 1px solid #30363d; border-radius: 8px; padding: 1rem 1.5rem; min-width: 10rem; }
  .card .label { font-size: 0.75rem; text-transform: uppercase; color: #8b949e; }
  .card .value { font-size: 1.6rem; font-weight: 600; }
  table { width: 100%; border-collapse: collapse; margin-bottom: 2rem; }
  th, td { text-align: left; padding: 0.4rem 0.8rem; border-bottom: 1px solid #21262d; }
  th { color: #8b949e; font-size: 0.75rem; text-transform: uppercase; }
  .pos { color: #3fb950; } .neg { color: #f85149; }
</style>
</head>
<body>
<h1>FAIRWAY</h1>
<div class="cards">
  <div class="card"><div class="label">Tournament</div><div class="value" id="active">–</div></div>
  <div class="card"><div class="label">Cycles</div><div class="value" id="cycles">–</div></div>
  <div class="card"><div class="label">Open</div><div class="value" id="open">–</div></div>
  <div class="card"><div class="label">Closed</div><div class="value" id="closed">–</div></div>
  <div class="card"><div class="label">Win rate</div><div class="value" id="winrate">–</div></div>
  <div class="card"><div class="label">Realized P&amp;L</div><div class="value" id="pnl">–</div></div>
</div>
<h2>Positions</h2>
<table id="positions"><thead><tr>
  <th>Ticker</th><th>Player</th><th>Market</th><th>Entry</th><th>Edge</th><th>Status</th><th>Exit</th>
</tr></thead><tbody></tbody></table>
<h2>Recent opportunities</h2>
<table id="opps"><thead><tr>
  <th>Detected</th><th>Player</th><th>Market</th><th>Model</th><th>Implied</th><th>Edge</th><th>Spread</th>
</tr></thead><tbody></tbody></table>
<script>
async function refresh() {
  const status = await (await fetch('/api/status')).json();
  document.getElementById('active').textContent = status.tournament_active ? 'LIVE' : 'IDLE';
  document.getElementById('cycles').textContent = status.cycle_count;
  document.getElementById('open').textContent = status.open_positions;
  document.getElementById('closed').textContent = status.closed_positions;
  document.getElementById('winrate').textContent = (status.win_rate * 100).toFixed(0) + '%';
  const pnl = document.getElementById('pnl');
  pnl.textContent = (status.total_realized_pnl >= 0 ? '+' : '') + status.total_realized_pnl.toFixed(0) + '¢';
  pnl.className = 'value ' + (status.total_realized_pnl >= 0 ? 'pos' : 'neg');

  const positions = await (await fetch('/api/positions')).json();
  document.querySelector('#positions tbody').innerHTML = positions.map(p => `<tr>
    <td>${p.ticker}</td><td>${p.player}</td><td>${p.category}</td>
    <td>${p.entry_price.toFixed(0)}¢</td><td>${p.entry_edge_pct.toFixed(1)}%</td>
    <td>${p.status}</td><td>${p.exit_price != null ? p.exit_price.toFixed(0) + '¢' : '–'}</td>
  </tr>`).join('');

  const opps = await (await fetch('/api/opportunities')).json();
  document.querySelector('#opps tbody').innerHTML = opps.slice(-50).reverse().map(o => `<tr>
    <td>${o.detected_at}</td><td>${o.player}</td><td>${o.category}</td>
    <td>${(o.model_prob * 100).toFixed(0)}%</td><td>${(o.implied_prob * 100).toFixed(0)}%</td>
    <td>${o.edge_pct.toFixed(1)}%</td><td>${o.spread.toFixed(0)}¢</td>
  </tr>`).join('');
}
refresh();
setInterval(refresh, 15000);
</script>
</body>
</html>
"#;

/// Start the dashboard web server.
///
/// This spawns a background task — it doesn't block.
pub fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "Dashboard server starting on http://localhost:{port}");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind dashboard port");

        axum::serve(listener, app)
            .await
            .expect("Dashboard server error");
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // API routes
        .route("/api/status", get(routes::get_status))
        .route("/api/positions", get(routes::get_positions))
        .route("/api/opportunities", get(routes::get_opportunities))
        .route("/api/cycles", get(routes::get_cycles))
        .route("/health", get(routes::health))
        // Dashboard HTML
        .route("/", get(serve_dashboard))
        .layer(cors)
        .with_state(state)
}

/// Serve the embedded HTML dashboard.
async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
