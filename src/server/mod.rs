//! Read-only HTTP viewer for briefings.

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;

use crate::db::{format_period_display, Briefing, Store};
use crate::error::Result;

/// Shared handler state.
#[derive(Clone)]
struct AppContext {
    store: Store,
}

/// Builds the viewer router.
pub fn router(store: Store) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/briefing/:period_id", get(briefing_page))
        .route("/api/briefings", get(api_briefings))
        .route("/api/briefing/:period_id", get(api_briefing))
        .with_state(AppContext { store })
}

/// Serves the viewer until the task is dropped.
pub async fn serve(store: Store, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("viewer listening on http://{}", addr);
    axum::serve(listener, router(store)).await?;
    Ok(())
}

async fn index(State(ctx): State<AppContext>) -> std::result::Result<Html<String>, StatusCode> {
    let briefings = ctx
        .store
        .all_briefings()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut rows = String::new();
    for b in &briefings {
        rows.push_str(&format!(
            "<li><a href=\"/briefing/{}\">{}</a> — {} storylines, {} articles</li>\n",
            escape(&b.period_id),
            escape(&format_period_display(&b.period_id)),
            b.storyline_count,
            b.article_count
        ));
    }
    if briefings.is_empty() {
        rows.push_str("<li>No briefings yet. Run <code>aicrawler run</code>.</li>");
    }

    Ok(Html(page(
        "Briefings",
        &format!("<h1>Briefings</h1>\n<ul>\n{rows}</ul>"),
    )))
}

async fn briefing_page(
    State(ctx): State<AppContext>,
    Path(period_id): Path<String>,
) -> std::result::Result<Html<String>, StatusCode> {
    let briefing = ctx
        .store
        .briefing(period_id.clone())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let title = format_period_display(&briefing.period_id);
    let tldr_items: String = briefing
        .tldr
        .lines()
        .map(|line| format!("<li>{}</li>\n", escape(line.trim_start_matches("- "))))
        .collect();

    let body = format!(
        "<p><a href=\"/\">&larr; all briefings</a></p>\n\
         <h1>{}</h1>\n\
         <h2>TL;DR</h2>\n<ul>\n{}</ul>\n\
         <pre class=\"briefing-body\">{}</pre>",
        escape(&title),
        tldr_items,
        escape(&briefing.body_markdown)
    );

    Ok(Html(page(&title, &body)))
}

async fn api_briefings(
    State(ctx): State<AppContext>,
) -> std::result::Result<Json<Vec<Briefing>>, StatusCode> {
    let briefings = ctx
        .store
        .all_briefings()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(briefings))
}

async fn api_briefing(
    State(ctx): State<AppContext>,
    Path(period_id): Path<String>,
) -> std::result::Result<Json<Briefing>, StatusCode> {
    let briefing = ctx
        .store
        .briefing(period_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(briefing))
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{} — aicrawler</title>\n\
         <style>\n\
         body {{ max-width: 46rem; margin: 2rem auto; padding: 0 1rem; font-family: system-ui, sans-serif; line-height: 1.5; }}\n\
         pre.briefing-body {{ white-space: pre-wrap; background: #f6f6f4; padding: 1rem; border-radius: 6px; }}\n\
         </style>\n</head>\n<body>\n{}\n</body>\n</html>",
        escape(title),
        body
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_neutralizes_markup() {
        assert_eq!(escape("<b>&\"x\"</b>"), "&lt;b&gt;&amp;&quot;x&quot;&lt;/b&gt;");
    }

    #[test]
    fn page_embeds_title_and_body() {
        let html = page("Feb 06, 2026", "<h1>ok</h1>");
        assert!(html.contains("<title>Feb 06, 2026 — aicrawler</title>"));
        assert!(html.contains("<h1>ok</h1>"));
    }
}
