//! WebApp frontend: title injection and the `/` entry page

use axum::extract::{Request, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use lazy_regex::regex;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::state::WebAppState;

const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Puts `title` into the document's `<title>`.
///
/// Replaces the first `<title>` element, otherwise inserts one before
/// `</head>`, otherwise prepends a minimal head.
pub fn inject_title(html: &str, title: &str) -> String {
    let element = format!("<title>{}</title>", escape_html(title));

    if let Some(m) = regex!(r"(?is)<title[^>]*>.*?</title>").find(html) {
        return format!("{}{}{}", &html[..m.start()], element, &html[m.end()..]);
    }

    if let Some(m) = regex!(r"(?i)</head>").find(html) {
        return format!("{}{}{}", &html[..m.start()], element, &html[m.start()..]);
    }

    format!("<head>{}</head>{}", element, html)
}

/// Script that re-applies the title after the frontend bundle sets its own
fn title_script(title: &str) -> String {
    let literal = serde_json::to_string(title)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/");
    format!(
        "<script>(function(){{var t={};document.title=t;\
         window.addEventListener('load',function(){{document.title=t;}});}})();</script>",
        literal
    )
}

/// Title plus override script, for pages served from `/`
pub fn render_index(html: &str, title: &str) -> String {
    let html = inject_title(html, title);
    let script = title_script(title);

    match regex!(r"(?i)</body>").find(&html) {
        Some(m) => format!("{}{}{}", &html[..m.start()], script, &html[m.start()..]),
        None => format!("{}{}", html, script),
    }
}

/// Writes the title into `index.html` on disk so `/app/` serves it too.
///
/// The first modification keeps a copy at `index.html.bak`.
///
/// # Returns
/// `true` if the file changed.
pub fn apply_title_to_index(static_dir: &Path, title: &str) -> std::io::Result<bool> {
    let index = static_dir.join("index.html");
    if !index.is_file() {
        return Ok(false);
    }

    let html = fs::read_to_string(&index)?;
    let updated = inject_title(&html, title);
    if updated == html {
        return Ok(false);
    }

    let backup = static_dir.join("index.html.bak");
    if !backup.exists() {
        fs::copy(&index, &backup)?;
        log::info!("Saved original index.html to {}", backup.display());
    }
    fs::write(&index, updated)?;
    log::info!("Applied WebApp title '{}' to {}", title, index.display());
    Ok(true)
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET / - index.html with the configured title, or a redirect to /app/
pub async fn index(State(state): State<Arc<WebAppState>>) -> Response {
    let settings = &state.ctx.settings;
    let path = settings.webapp_static_dir.join("index.html");

    let html = match tokio::fs::read_to_string(&path).await {
        Ok(html) => html,
        Err(_) => return Redirect::temporary("/app/").into_response(),
    };
    let html = match &settings.webapp_title {
        Some(title) => render_index(&html, title),
        None => html,
    };

    ([(CACHE_CONTROL, NO_STORE)], Html(html)).into_response()
}

/// Middleware in front of the `/app` file service.
///
/// Requests for the index page get the same title and script as `/`; every
/// other path falls through to the files on disk.
pub async fn app_index(State(state): State<Arc<WebAppState>>, request: Request, next: Next) -> Response {
    let settings = &state.ctx.settings;
    let is_index = matches!(request.uri().path(), "" | "/" | "/index.html");

    if let (true, true, Some(title)) = (is_index, request.method() == Method::GET, &settings.webapp_title) {
        let path = settings.webapp_static_dir.join("index.html");
        if let Ok(html) = tokio::fs::read_to_string(&path).await {
            return Html(render_index(&html, title)).into_response();
        }
    }

    next.run(request).await
}

/// HEAD / - liveness for proxies
pub async fn index_head() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_inject_replaces_first_title() {
        let html = "<html><head><title>Vite App</title></head><body></body></html>";
        assert_eq!(
            inject_title(html, "My <Media>"),
            "<html><head><title>My &lt;Media&gt;</title></head><body></body></html>"
        );
    }

    #[test]
    fn test_inject_inserts_into_head_or_prepends() {
        assert_eq!(
            inject_title("<html><HEAD></HEAD></html>", "T"),
            "<html><HEAD><title>T</title></HEAD></html>"
        );
        assert_eq!(inject_title("<p>x</p>", "T"), "<head><title>T</title></head><p>x</p>");
    }

    #[test]
    fn test_render_index_adds_script_before_body_end() {
        let rendered = render_index("<head></head><body><div id=app></div></body>", "A \"B\"");
        assert!(rendered.contains("<title>A &quot;B&quot;</title>"));
        assert!(rendered.contains(r#"var t="A \"B\"""#));
        assert!(rendered.ends_with("</script></body>"));
    }

    #[test]
    fn test_apply_title_keeps_one_backup() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("index.html");
        fs::write(&index, "<head><title>Old</title></head>").unwrap();

        assert!(apply_title_to_index(dir.path(), "New").unwrap());
        assert!(!apply_title_to_index(dir.path(), "New").unwrap());
        assert!(apply_title_to_index(dir.path(), "Newer").unwrap());

        assert_eq!(fs::read_to_string(&index).unwrap(), "<head><title>Newer</title></head>");
        assert_eq!(
            fs::read_to_string(dir.path().join("index.html.bak")).unwrap(),
            "<head><title>Old</title></head>"
        );
    }

    #[test]
    fn test_apply_title_without_index() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!apply_title_to_index(dir.path(), "T").unwrap());
    }
}
