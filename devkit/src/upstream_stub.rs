/*!
Stub du site upstream pour tests sans réseau

Démarre un vrai serveur HTTP local (port éphémère) qui répond sur
`/hamp{id}.aspx` avec la page configurée pour chaque laverie.
Enregistre le nombre de requêtes reçues par page pour les assertions.
*/

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Réponse servie pour une laverie
#[derive(Debug, Clone)]
pub enum StubPage {
    Html(String),
    Bytes(Vec<u8>),
    Status(u16),
}

#[derive(Clone)]
pub struct UpstreamStub {
    addr: SocketAddr,
    pages: Arc<Mutex<HashMap<String, StubPage>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl UpstreamStub {
    /// Démarre le stub sur 127.0.0.1 avec un port libre
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stub = Self {
            addr,
            pages: Arc::new(Mutex::new(HashMap::new())),
            hits: Arc::new(Mutex::new(HashMap::new())),
        };

        let app = Router::new()
            .route("/{page}", get(serve_page))
            .with_state(stub.clone());

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[STUB] upstream stub stopped: {}", e);
            }
        });

        log::info!("[STUB] upstream stub listening on {}", addr);
        Ok(stub)
    }

    /// Template d'URL à injecter dans la config upstream du kernel
    pub fn url_template(&self) -> String {
        format!("http://{}/hamp{{id}}.aspx", self.addr)
    }

    pub fn set(&self, id: &str, page: StubPage) {
        self.pages.lock().insert(id.to_string(), page);
    }

    pub fn set_page<S: Into<String>>(&self, id: &str, html: S) {
        self.set(id, StubPage::Html(html.into()));
    }

    pub fn set_bytes(&self, id: &str, bytes: Vec<u8>) {
        self.set(id, StubPage::Bytes(bytes));
    }

    pub fn set_status(&self, id: &str, status: u16) {
        self.set(id, StubPage::Status(status));
    }

    /// Nombre de requêtes reçues pour une laverie
    pub fn hits(&self, id: &str) -> usize {
        self.hits.lock().get(id).copied().unwrap_or(0)
    }

    pub fn clear(&self) {
        self.pages.lock().clear();
        self.hits.lock().clear();
    }
}

/// "hampdakink.aspx" -> "dakink"
fn page_id(page: &str) -> Option<&str> {
    page.strip_prefix("hamp")?.strip_suffix(".aspx")
}

async fn serve_page(State(stub): State<UpstreamStub>, Path(page): Path<String>) -> Response {
    let Some(id) = page_id(&page) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    *stub.hits.lock().entry(id.to_string()).or_insert(0) += 1;

    let configured = stub.pages.lock().get(id).cloned();
    match configured {
        Some(StubPage::Html(html)) => {
            ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
        }
        Some(StubPage::Bytes(bytes)) => {
            ([(header::CONTENT_TYPE, "text/html")], bytes).into_response()
        }
        Some(StubPage::Status(code)) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
