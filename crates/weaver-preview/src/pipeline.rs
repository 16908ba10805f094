//! Two-stage recompute pipeline.
//!
//! The local stage renders the document on a short debounce and patches the
//! preview. Content that needs the server (math, bibliographies) is handed
//! to the server stage, but only when its fingerprint changed since the
//! last hand-off. Each finished server pass forces one more local pass so
//! its output shows up. Both stages run on their own [`DebouncedRunner`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use futures_util::future::BoxFuture;
use tokio::time::Instant;

use crate::adapter::{Activity, Notice};
use crate::busy::BusyIndicator;
use crate::config::PreviewConfig;
use crate::error::PreviewError;
use crate::render::{RenderContext, Renderer};
use crate::runner::{DebouncedRunner, RunResult, RunnerConfig, RunnerHandle, RunnerTask};
use crate::session::Session;
use crate::storage::RemoteStorage;

pub struct RecomputePipeline<R, S> {
    shared: Arc<Shared<R, S>>,
    local: DebouncedRunner,
    server: DebouncedRunner,
}

struct Shared<R, S> {
    session: Arc<Session<S>>,
    renderer: Arc<R>,
    config: PreviewConfig,
    server_enabled: AtomicBool,
    /// Fingerprint of the server-dependent content last handed off.
    last_fingerprint: Mutex<Option<String>>,
    /// Newest local round whose output reached the view.
    last_applied_round: AtomicU64,
    local: OnceLock<RunnerHandle>,
    server: OnceLock<RunnerHandle>,
}

impl<R: Renderer, S: RemoteStorage> RecomputePipeline<R, S> {
    /// Start both stages. Must be called from within a tokio runtime.
    pub fn new(session: Arc<Session<S>>, renderer: Arc<R>) -> Self {
        let config = session.config().clone();
        let shared = Arc::new(Shared {
            server_enabled: AtomicBool::new(!config.disable_server),
            session: Arc::clone(&session),
            renderer,
            last_fingerprint: Mutex::new(None),
            last_applied_round: AtomicU64::new(0),
            local: OnceLock::new(),
            server: OnceLock::new(),
            config: config.clone(),
        });

        let local = DebouncedRunner::new(
            Arc::new(LocalPass(Arc::clone(&shared))),
            RunnerConfig::new("local", config.refresh_rate())
                .busy(busy_for(&session, Activity::View, &config))
                .on_error(report_to(&session))
                .paused(config.disable_auto_update),
        );
        let server = DebouncedRunner::new(
            Arc::new(ServerPass(Arc::clone(&shared))),
            RunnerConfig::new("server", config.server_refresh_rate())
                .busy(busy_for(&session, Activity::Server, &config))
                .on_error(report_to(&session)),
        );
        // Both cells are fresh; neither set can fail.
        let _ = shared.local.set(local.handle());
        let _ = shared.server.set(server.handle());

        Self {
            shared,
            local,
            server,
        }
    }

    pub fn session(&self) -> &Arc<Session<S>> {
        &self.shared.session
    }

    pub fn local(&self) -> &DebouncedRunner {
        &self.local
    }

    pub fn server(&self) -> &DebouncedRunner {
        &self.server
    }

    /// Request a local render on the next tick.
    pub fn set_stale(&self) {
        self.shared.session.set_stale();
    }

    /// Render locally right away. Returns the round that ran.
    pub async fn run_now(&self) -> u64 {
        self.local.run_now().await
    }

    /// Pause or resume automatic local passes.
    pub fn set_auto_update(&self, enabled: bool) {
        if enabled {
            self.local.resume(None);
        } else {
            self.local.pause();
        }
    }

    pub fn set_server_enabled(&self, enabled: bool) {
        self.shared.server_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn last_fingerprint(&self) -> Option<String> {
        self.shared
            .last_fingerprint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn shutdown(&self) {
        self.local.shutdown();
        self.server.shutdown();
    }
}

fn busy_for<S: RemoteStorage>(
    session: &Session<S>,
    activity: Activity,
    config: &PreviewConfig,
) -> BusyIndicator {
    let delay = match activity {
        Activity::Server => config.server_busy_delay(),
        _ => config.view_busy_delay(),
    };
    let notices = session.notices();
    BusyIndicator::new(delay, move |visible| notices.busy(activity, visible))
}

fn report_to<S: RemoteStorage>(
    session: &Arc<Session<S>>,
) -> impl Fn(&PreviewError) + Send + Sync + 'static {
    let session = Arc::clone(session);
    move |err| session.report_error(err)
}

struct LocalPass<R, S>(Arc<Shared<R, S>>);

impl<R: Renderer, S: RemoteStorage> RunnerTask for LocalPass<R, S> {
    fn should_run(&self) -> bool {
        let shared = &self.0;
        if !shared.session.absorb_edits() {
            return false;
        }
        if shared.config.delayed_update
            && shared
                .session
                .last_edit()
                .is_some_and(|at| at.elapsed() < shared.config.delayed_update_threshold())
        {
            return false;
        }
        true
    }

    fn run(&self, round: u64) -> BoxFuture<'_, RunResult> {
        Box::pin(async move {
            let shared = &self.0;
            let session = &shared.session;
            session.local_save(true).await?;
            let (doc_name, text) = session.take_render_input();
            let ctx = RenderContext {
                doc_name,
                round,
                started: Instant::now(),
            };
            let output = shared.renderer.render_local(&text, &ctx).await?;

            let newest = shared.last_applied_round.fetch_max(round, Ordering::SeqCst);
            if newest > round {
                tracing::debug!(round, newest, "discarding superseded render");
                return Ok(None);
            }

            let quick = session.view_html(output.content);
            session.update_labels(output.labels.as_deref(), output.links);
            session.show_errors(&output.diagnostics, "warning");

            if output.run_again {
                session.set_stale();
            }
            if output.run_on_server && shared.server_enabled.load(Ordering::SeqCst) {
                let fingerprint = output.math_fingerprint.unwrap_or_default();
                let mut last = shared
                    .last_fingerprint
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if last.as_deref() != Some(fingerprint.as_str()) {
                    *last = Some(fingerprint);
                    drop(last);
                    if let Some(server) = shared.server.get() {
                        server.set_stale();
                    }
                }
            }

            if !output.run_again && !output.run_on_server && !session.is_stale() {
                session.notify(Notice::status("ready"));
                session.remove_decorations(false, Some("error"));
            }
            session.remove_decorations(false, Some(weaver_preview_core::MERGE_KIND));

            metrics::gauge!("preview_render_avg_ms").set(output.avg_time_ms as f64);
            Ok(Some(format!(
                "update: {round}{} avg: {}ms",
                if quick { " (quick view update)" } else { "" },
                output.avg_time_ms,
            )))
        })
    }
}

struct ServerPass<R, S>(Arc<Shared<R, S>>);

impl<R: Renderer, S: RemoteStorage> RunnerTask for ServerPass<R, S> {
    fn run(&self, round: u64) -> BoxFuture<'_, RunResult> {
        Box::pin(async move {
            let shared = &self.0;
            let session = &shared.session;
            let doc = session.document();
            let ctx = RenderContext {
                doc_name: doc.name.clone(),
                round,
                started: Instant::now(),
            };
            let output = shared.renderer.render_server(&doc.text, &ctx).await?;
            session.show_errors(&output.diagnostics, "error");

            // Show what the server produced.
            if let Some(local) = shared.local.get() {
                local.run_now().await;
            }
            Ok(Some(format!("server update: {round}")))
        })
    }
}
