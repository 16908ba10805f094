//! Render collaborator interface.

use std::future::Future;

use smol_str::SmolStr;
use tokio::time::Instant;
use weaver_preview_core::SourceMessage;

use crate::error::RenderError;

/// Per-pass information handed to the renderer.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub doc_name: SmolStr,
    pub round: u64,
    pub started: Instant,
}

/// Result of a local render.
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    /// Rendered markup.
    pub content: String,
    /// Label definitions, one JSON object per line.
    pub labels: Option<String>,
    pub links: Option<String>,
    /// Render again right away (e.g. references resolved on this pass).
    pub run_again: bool,
    /// Parts of the document need the server stage.
    pub run_on_server: bool,
    /// Identity of the server-dependent content; the server stage only
    /// reruns when it changes.
    pub math_fingerprint: Option<String>,
    /// Rolling average render time reported by the renderer.
    pub avg_time_ms: u64,
    pub diagnostics: Vec<SourceMessage>,
}

/// Result of a server render.
#[derive(Debug, Clone, Default)]
pub struct ServerOutput {
    pub diagnostics: Vec<SourceMessage>,
}

pub trait Renderer: Send + Sync + 'static {
    fn render_local(
        &self,
        text: &str,
        ctx: &RenderContext,
    ) -> impl Future<Output = Result<RenderOutput, RenderError>> + Send;

    /// Render the server-dependent parts. Whatever the server produces
    /// (images, bibliographies) is picked up by the following local pass.
    fn render_server(
        &self,
        text: &str,
        ctx: &RenderContext,
    ) -> impl Future<Output = Result<ServerOutput, RenderError>> + Send;

    /// Render a standalone document for export.
    fn render_local_static(
        &self,
        name: &str,
        text: &str,
    ) -> impl Future<Output = Result<String, RenderError>> + Send;
}
