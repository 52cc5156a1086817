use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{
    get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use schema_listener::controller::State;
use schema_listener::discovery::ClientDiscoveryFactory;
use schema_listener::metrics::ControllerId;
use schema_listener::reconcile::SchemaReconciler;
use schema_listener::store::fs::FileStore;
use schema_listener::store::memory::InMemoryStore;
use schema_listener::store::SchemaStore;
use schema_listener::telemetry;
use schema_listener::virtualworkspace::reconcile::VirtualWorkspaceManager;
use schema_listener::{anchor, clusteraccess, namespace, virtualworkspace, workspace};
use schema_listener_k8s_util::client::instrumented_client;

use clap::{crate_authors, crate_description, crate_version, Parser};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use kube::Config;
use prometheus_client::registry::Registry;
use tokio_util::sync::CancellationToken;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    match c.metrics() {
        Ok(metrics) => HttpResponse::Ok()
            .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
            .body(metrics),
        Err(e) => {
            tracing::error!("Failed to get metrics: {:?}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

/// Streams the current schema snapshot followed by live change events, one
/// JSON document per line, until the client disconnects.
#[get("/subscribe")]
async fn subscribe(events: Data<Option<Arc<InMemoryStore>>>, _req: HttpRequest) -> impl Responder {
    let Some(store) = events.get_ref().as_ref() else {
        // the filesystem store has no event bus
        return HttpResponse::NotFound().json("event streaming requires the in-memory store");
    };
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let stream = store.subscribe(cancel).map(move |event| {
        let _ = &guard;
        Ok::<_, actix_web::Error>(event.to_ndjson())
    });
    HttpResponse::Ok()
        .content_type("application/x-ndjson")
        .streaming(stream)
}

#[derive(Parser, Debug)]
#[command(
    name="schema-listener",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen on given port
    #[arg(short, long, default_value_t = 8080, env)]
    port: u32,

    /// Set logging filter directive for `tracing_subscriber::filter::EnvFilter`. Example: "info,kube=debug,schema-listener=debug"
    #[arg(long, default_value = "info", env)]
    log_filter: String,

    /// Set log format
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint.
    ///
    /// This optional argument specifies the URL to which traces will be sent using
    /// OpenTelemetry. If not provided, tracing will be disabled.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing.
    ///
    /// Specifies the ratio of traces to sample. A value of `1.0` will sample all traces,
    /// while a lower value will sample fewer traces. The default is `0.1`, meaning 10%
    /// of traces are sampled.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,

    /// Persist schemas as files under this directory instead of serving
    /// them over the event stream
    #[arg(long, env)]
    schemas_dir: Option<PathBuf>,

    /// Buffer size of each event-stream subscriber
    #[arg(long, default_value_t = 256, env)]
    event_buffer: usize,

    /// Watch ClusterAccess resources
    #[arg(long, default_value_t = false, env)]
    enable_cluster_access: bool,

    /// Watch the namespace with this name as a schema-generation anchor
    #[arg(long, env)]
    anchor_namespace: Option<String>,

    /// apiVersion of the anchor resource type, e.g. "ui.platform-mesh.io/v1alpha1"
    #[arg(long, env, requires = "anchor_kind")]
    anchor_api_version: Option<String>,

    /// Kind of the anchor resource type
    #[arg(long, env, requires = "anchor_api_version")]
    anchor_kind: Option<String>,

    /// CEL predicate over the anchor `object`; non-matching objects are ignored
    #[arg(long, default_value = "true", env)]
    anchor_predicate: String,

    /// Reconcile kcp workspaces carrying this initializer
    #[arg(long, env)]
    kcp_initializer: Option<String>,

    /// Hot-reloadable virtual workspace configuration file
    #[arg(long, env)]
    virtual_workspaces_config: Option<PathBuf>,

    /// Schema key prefix for virtual workspaces
    #[arg(long, default_value = "virtualworkspace", env)]
    virtual_workspace_prefix: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    telemetry::init(
        &args.log_filter,
        args.log_format,
        args.tracing_url.as_deref(),
        args.sample_ratio,
    )
    .await?;

    let mut registry = Registry::with_prefix("schema_listener");
    let config = Config::infer().await?;
    let client = instrumented_client(config.clone(), &mut registry).await?;

    let (store, events): (Arc<dyn SchemaStore>, Option<Arc<InMemoryStore>>) =
        match &args.schemas_dir {
            Some(dir) => (Arc::new(FileStore::new(dir.clone())?), None),
            None => {
                let memory = Arc::new(InMemoryStore::new(args.event_buffer));
                (memory.clone(), Some(memory))
            }
        };
    let schemas = Arc::new(SchemaReconciler::new(
        store,
        Arc::new(ClientDiscoveryFactory),
    ));

    let mut controllers: Vec<ControllerId> = vec![virtualworkspace::CONTROLLER_ID];
    if args.enable_cluster_access {
        controllers.push(clusteraccess::controller::CONTROLLER_ID);
    }
    if args.anchor_namespace.is_some() {
        controllers.push(namespace::controller::CONTROLLER_ID);
    }
    if args.anchor_kind.is_some() {
        controllers.push(anchor::controller::CONTROLLER_ID);
    }
    if args.kcp_initializer.is_some() {
        controllers.push(workspace::controller::CONTROLLER_ID);
    }
    let state = State::new(registry, &controllers);

    let mut tasks: Vec<BoxFuture<'static, ()>> = Vec::new();
    if args.enable_cluster_access {
        tasks.push(
            clusteraccess::controller::run(
                state.clone(),
                client.clone(),
                config.clone(),
                schemas.clone(),
            )
            .boxed(),
        );
    }
    if let Some(anchor_namespace) = args.anchor_namespace.clone() {
        tasks.push(
            namespace::controller::run(
                state.clone(),
                client.clone(),
                config.clone(),
                schemas.clone(),
                anchor_namespace,
            )
            .boxed(),
        );
    }
    if let (Some(api_version), Some(kind)) =
        (args.anchor_api_version.clone(), args.anchor_kind.clone())
    {
        let state = state.clone();
        let client = client.clone();
        let config = config.clone();
        let schemas = schemas.clone();
        let predicate = args.anchor_predicate.clone();
        tasks.push(
            async move {
                if let Err(e) = anchor::controller::run(
                    state, client, config, schemas, api_version, kind, predicate,
                )
                .await
                {
                    tracing::error!("anchor controller failed to start: {e}");
                    std::process::exit(1);
                }
            }
            .boxed(),
        );
    }
    if let Some(initializer) = args.kcp_initializer.clone() {
        tasks.push(
            workspace::controller::run(
                state.clone(),
                client.clone(),
                config.clone(),
                schemas.clone(),
                initializer,
            )
            .boxed(),
        );
    }

    let cancel = CancellationToken::new();
    {
        // controllers shut down on signal by themselves; the manager needs
        // its cancellation token fired
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        });
    }
    let manager = Arc::new(VirtualWorkspaceManager::new(
        schemas.clone(),
        state.controller_metrics(virtualworkspace::CONTROLLER_ID),
        args.virtual_workspace_prefix.clone(),
    ));
    {
        let manager = manager.clone();
        let file = args.virtual_workspaces_config.clone();
        let cancel = cancel.clone();
        tasks.push(
            async move {
                if let Err(e) = manager.run(file, cancel).await {
                    tracing::error!("virtual workspace manager failed: {e}");
                }
            }
            .boxed(),
        );
    }

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .app_data(Data::new(events.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(health)
            .service(metrics)
            .service(subscribe)
    })
    .bind(format!("0.0.0.0:{}", args.port))?
    .shutdown_timeout(5);

    // Both runtimes implement graceful shutdown, so poll until both are done
    tokio::join!(futures::future::join_all(tasks), server.run()).1?;
    Ok(())
}
