use crate::error::AppError;
use crate::session::store::SessionStore;
use crate::session::{dump_scope, ClientSession};
use crate::ui::event::{Args, Request};
use crate::ui::page::{Page, PageSnapshot};
use async_trait::async_trait;
use serde::Serialize;
use std::backtrace::Backtrace;
use tokio::sync::OnceCell;
use tracing::{error, info};

pub mod crash;
pub mod retention;
pub mod site;

use crash::{crash_card, stack_trace, CrashReport, CRASH_CARD};
use site::Site;

/// Per-request context handed to an app: the three state scopes, the
/// client's page, the request arguments and the site file broker.
pub struct Query<'a, H: Handler> {
    pub app: &'a H::App,
    pub user: &'a mut H::User,
    pub client: &'a mut H::Client,
    pub page: &'a mut Page,
    pub args: Args,
    pub events: Args,
    pub site: &'a Site,
    pub client_id: &'a str,
}

#[async_trait]
pub trait Handler: Sized + Send + Sync + 'static {
    type App: Serialize + Send + Sync + 'static;
    type User: Serialize + Default + Send + 'static;
    type Client: Serialize + Default + Send + 'static;

    fn name(&self) -> &'static str;

    async fn initialize_app(&self, site: &Site) -> Result<Self::App, AppError>;

    async fn initialize_client(&self, q: &mut Query<'_, Self>) -> Result<(), AppError>;

    async fn serve(&self, q: &mut Query<'_, Self>) -> Result<(), AppError>;

    /// Cards cleared before the crash report is shown.
    fn cards(app: &Self::App) -> &[String];
}

pub struct Server<H: Handler> {
    handler: H,
    site: Site,
    issue_url: String,
    app: OnceCell<H::App>,
    sessions: SessionStore<H::User, H::Client>,
}

impl<H: Handler> Server<H> {
    pub fn new(handler: H, site: Site, issue_url: impl Into<String>) -> Self {
        Self {
            handler,
            site,
            issue_url: issue_url.into(),
            app: OnceCell::new(),
            sessions: SessionStore::new(),
        }
    }

    #[cfg(test)]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    #[cfg(test)]
    pub async fn user_snapshot(&self, user_id: &str) -> H::User
    where
        H::User: Clone,
    {
        self.sessions.user(user_id).await.lock().await.state.clone()
    }

    pub async fn disconnect(&self, client_id: &str) {
        if self.sessions.remove_client(client_id).await {
            info!(client = %client_id, "client disconnected");
        }
    }

    /// Handles one client interaction and returns the page to show. Errors
    /// never escape: they turn into a crash report on the client's page.
    pub async fn serve(&self, user_id: &str, client_id: &str, request: Request) -> PageSnapshot {
        info!(
            app = self.handler.name(),
            client = %client_id,
            user = %user_id,
            args = %request.args.to_log_line(),
            "serving request"
        );

        let client = self.sessions.client(client_id).await;
        let mut client = client.lock().await;
        let user = self.sessions.user(user_id).await;
        let mut user = user.lock().await;
        client.log_events(&request.events);

        if let Err(err) = self
            .dispatch(&mut user.state, &mut client, client_id, request.clone())
            .await
        {
            let backtrace = Backtrace::force_capture();
            error!(client = %client_id, error = %err, "request failed");
            self.report(&err, &backtrace, &user.state, &mut client, &request);
        }

        client.page.save()
    }

    async fn dispatch(
        &self,
        user: &mut H::User,
        client: &mut ClientSession<H::Client>,
        client_id: &str,
        request: Request,
    ) -> Result<(), AppError> {
        let app = self
            .app
            .get_or_try_init(|| async {
                info!(app = self.handler.name(), "initializing app");
                self.handler.initialize_app(&self.site).await
            })
            .await?;

        let ClientSession {
            initialized,
            state,
            page,
            ..
        } = client;
        let mut q = Query {
            app,
            user,
            client: state,
            page,
            args: request.args,
            events: request.events,
            site: &self.site,
            client_id,
        };

        if !*initialized {
            info!(client = %client_id, "initializing client");
            self.handler.initialize_client(&mut q).await?;
            *initialized = true;
        }

        self.handler.serve(&mut q).await
    }

    fn report(
        &self,
        err: &AppError,
        backtrace: &Backtrace,
        user: &H::User,
        client: &mut ClientSession<H::Client>,
        request: &Request,
    ) {
        let app_dump = match self.app.get() {
            Some(app) => {
                client.page.clear(H::cards(app));
                let mut lines = vec!["initialized: true".to_string()];
                lines.extend(dump_scope(app));
                lines
            }
            None => vec!["initialized: false".to_string()],
        };
        let mut client_dump = vec![format!("initialized: {}", client.initialized)];
        client_dump.extend(dump_scope(&client.state));

        let report = CrashReport {
            app_name: self.handler.name().to_string(),
            issue_url: self.issue_url.clone(),
            stack_trace: stack_trace(err, backtrace),
            scopes: vec![
                ("q.app", app_dump),
                ("q.user", dump_scope(user)),
                ("q.client", client_dump),
                ("q.events", client.events.iter().cloned().collect()),
                ("q.args", dump_scope(&request.args)),
            ],
        };

        if let Err(err) = client.page.set(CRASH_CARD, crash_card(&report)) {
            error!(error = %err, "crash report card rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::card::{Button, Card, FormCard, FormItem, Justify};
    use crate::ui::event::ArgValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counting {
        app_inits: AtomicUsize,
        client_inits: AtomicUsize,
    }

    #[derive(Serialize, Default)]
    struct Visits {
        count: u32,
    }

    #[async_trait]
    impl Handler for Counting {
        type App = Vec<String>;
        type User = Visits;
        type Client = Visits;

        fn name(&self) -> &'static str {
            "Counting"
        }

        async fn initialize_app(&self, _site: &Site) -> Result<Self::App, AppError> {
            tokio::task::yield_now().await;
            self.app_inits.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["main".to_string()])
        }

        async fn initialize_client(&self, q: &mut Query<'_, Self>) -> Result<(), AppError> {
            self.client_inits.fetch_add(1, Ordering::SeqCst);
            q.page.set(
                "main",
                Card::Form(FormCard {
                    zone: "main".to_string(),
                    items: vec![FormItem::buttons(
                        vec![Button::primary("boom", "Boom")],
                        Justify::Start,
                    )],
                }),
            )?;
            Ok(())
        }

        async fn serve(&self, q: &mut Query<'_, Self>) -> Result<(), AppError> {
            q.user.count += 1;
            q.client.count += 1;
            if q.args.flag("reload") {
                q.page.remove(CRASH_CARD);
                return self.initialize_client(q).await;
            }
            if q.args.flag("boom") {
                return Err(AppError::Input {
                    field: "boom",
                    message: "exploded".to_string(),
                });
            }
            Ok(())
        }

        fn cards(app: &Self::App) -> &[String] {
            app
        }
    }

    fn server() -> Arc<Server<Counting>> {
        Arc::new(Server::new(
            Counting::default(),
            Site::new("/nonexistent/site", "/nonexistent"),
            "https://example.org/repo",
        ))
    }

    fn boom() -> Request {
        Request::new(Args::new().with("boom", ArgValue::Bool(true)))
    }

    #[tokio::test]
    async fn initializers_run_once_per_process_and_per_client() {
        let server = server();
        let mut tasks = Vec::new();
        for i in 0..8 {
            let server = server.clone();
            tasks.push(tokio::spawn(async move {
                let client = format!("tab-{}", i % 2);
                server.serve("ada", &client, Request::default()).await
            }));
        }
        for task in tasks {
            task.await.expect("request task should finish");
        }

        assert_eq!(server.handler().app_inits.load(Ordering::SeqCst), 1);
        assert_eq!(server.handler().client_inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_renders_crash_report_with_every_scope() {
        let server = server();
        server.serve("ada", "tab-1", Request::default()).await;
        let page = server.serve("ada", "tab-1", boom()).await;

        assert!(page.card("main").is_none());
        let Some(Card::Form(card)) = page.card(CRASH_CARD) else {
            panic!("crash card should be rendered");
        };
        let FormItem::Expander { items, .. } = &card.items[4] else {
            panic!("crash card should end with the details expander");
        };
        let FormItem::Text { content, .. } = &items[3] else {
            panic!("details should hold the dump");
        };
        assert!(content.contains("Error: invalid value for `boom`: exploded"));
        for scope in crash::SCOPE_NAMES {
            assert!(content.contains(&format!("### {scope}")));
        }
        assert!(content.contains("boom: true"));
    }

    #[tokio::test]
    async fn crash_report_lists_the_client_event_log() {
        let server = server();
        server
            .serve(
                "ada",
                "tab-1",
                Request::default().with_event("annotator", "draw"),
            )
            .await;
        let page = server.serve("ada", "tab-1", boom().with_event("boom", "click")).await;

        let Some(Card::Form(card)) = page.card(CRASH_CARD) else {
            panic!("crash card should be rendered");
        };
        let FormItem::Expander { items, .. } = &card.items[4] else {
            panic!("crash card should end with the details expander");
        };
        let FormItem::Text { content, .. } = &items[3] else {
            panic!("details should hold the dump");
        };
        let events = content
            .split("### q.events")
            .nth(1)
            .and_then(|rest| rest.split("### q.args").next())
            .expect("dump should have an events section");
        assert!(events.contains("annotator: draw"));
        assert!(events.contains("boom: click"));
    }

    #[tokio::test]
    async fn reload_after_crash_reinitializes_client() {
        let server = server();
        server.serve("ada", "tab-1", Request::default()).await;
        server.serve("ada", "tab-1", boom()).await;

        let page = server
            .serve(
                "ada",
                "tab-1",
                Request::new(Args::new().with("reload", ArgValue::Bool(true))),
            )
            .await;

        assert_eq!(server.handler().client_inits.load(Ordering::SeqCst), 2);
        assert!(page.card(CRASH_CARD).is_none());
        assert!(page.card("main").is_some());
    }

    #[tokio::test]
    async fn disconnected_client_is_initialized_again() {
        let server = server();
        server.serve("ada", "tab-1", Request::default()).await;
        server.disconnect("tab-1").await;
        server.serve("ada", "tab-1", Request::default()).await;

        assert_eq!(server.handler().client_inits.load(Ordering::SeqCst), 2);
        assert_eq!(server.handler().app_inits.load(Ordering::SeqCst), 1);
    }
}
