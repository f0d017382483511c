use std::net::TcpListener;

use actix_web::{App, HttpServer, dev::Server, web};
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use evreg::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use evreg::leadership::LeaderOutcome;
use evreg::reconciler::Reconciler;
use evreg::slots::SlotService;
use evreg::store::cache::RedisSlotCache;
use evreg::store::events::PgEventStore;

use crate::config::ApiConfig;
use crate::routes::{
    ErrorMessage,
    cache::{
        ConsistencyStatusResponse, ReadCacheKeyResponse, ReinitializationStatusResponse,
        ReinitializeCacheResponse, read_cache_key, read_consistency_status,
        read_reinitialization_status, reinitialize_cache,
    },
    events::{
        CreateRegistrationRequest, CreateRegistrationResponse, ReadSlotsResponse,
        create_registration, read_slots,
    },
    health_check::{HealthCheckResponse, health_check},
};

/// Concrete slot service wired to the production stores.
pub type AppSlotService = SlotService<RedisSlotCache, PgEventStore>;

/// evreg API application server wrapper.
///
/// Owns the HTTP server plus the background maintenance tasks (startup
/// population and the consistency reconciler) and the shutdown channel that
/// stops them.
pub struct Application {
    port: u16,
    server: Server,
    shutdown_tx: ShutdownTx,
}

impl Application {
    /// Builds and configures the API application server.
    ///
    /// Connects to the cache and the events database, spawns startup
    /// population and the reconciler loop, and binds the HTTP server.
    pub async fn build(config: ApiConfig) -> anyhow::Result<Self> {
        let events = PgEventStore::connect_lazy(&config.database);
        let cache = RedisSlotCache::connect(&config.cache).await?;
        let service = AppSlotService::new(cache.clone(), events.clone(), &config.cache, &config.slots);

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        spawn_startup_population(service.clone(), shutdown_rx.clone());

        let reconciler = Reconciler::new(
            cache,
            events,
            service.instance_id().to_string(),
            &config.cache,
            &config.slots,
        );
        let reconciler_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            reconciler.run(reconciler_shutdown).await;
        });

        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let server = run(listener, service, shutdown_rx)?;

        Ok(Self {
            port,
            server,
            shutdown_tx,
        })
    }

    /// Runs database migrations using the provided configuration.
    ///
    /// Applies all pending SQLx migrations from the migrations directory.
    pub async fn migrate_database(
        config: evreg_config::shared::PgConnectionConfig,
    ) -> anyhow::Result<()> {
        let events = PgEventStore::connect_lazy(&config);

        sqlx::migrate!("./migrations").run(events.pool()).await?;

        Ok(())
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Runs the server until it stops, then signals the background tasks.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        let result = self.server.await;
        self.shutdown_tx.shutdown();

        result
    }
}

fn spawn_startup_population(service: AppSlotService, shutdown: ShutdownRx) {
    tokio::spawn(async move {
        match service.populate(&shutdown).await {
            Ok(LeaderOutcome::Led(written)) => {
                info!(written, "startup slot cache population finished");
            }
            Ok(LeaderOutcome::NotLeader) => {
                info!("startup slot cache population skipped, another instance is populating");
            }
            Err(err) => {
                // Reads fall back to the database until the reconciler or the
                // next population run repairs the cache.
                warn!(error = %err, "startup slot cache population failed");
            }
        }
    });
}

/// Creates and configures the HTTP server with all routes and middleware.
pub fn run(
    listener: TcpListener,
    service: AppSlotService,
    shutdown: ShutdownRx,
) -> Result<Server, anyhow::Error> {
    let service = web::Data::new(service);
    let shutdown = web::Data::new(shutdown);

    #[derive(OpenApi)]
    #[openapi(
        paths(crate::routes::health_check::health_check),
        components(schemas(
            ErrorMessage,
            HealthCheckResponse,
            ReadSlotsResponse,
            CreateRegistrationRequest,
            CreateRegistrationResponse,
            ReinitializeCacheResponse,
            ReinitializationStatusResponse,
            ConsistencyStatusResponse,
            ReadCacheKeyResponse,
        )),
        nest(
            (path = "/v1", api = ApiV1)
        )
    )]
    struct ApiDoc;

    #[derive(OpenApi)]
    #[openapi(paths(
        crate::routes::events::read_slots,
        crate::routes::events::create_registration,
        crate::routes::cache::reinitialize_cache,
        crate::routes::cache::read_reinitialization_status,
        crate::routes::cache::read_consistency_status,
        crate::routes::cache::read_cache_key,
    ))]
    struct ApiV1;

    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .service(health_check)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
            .service(
                web::scope("v1")
                    // events
                    .service(read_slots)
                    .service(create_registration)
                    // cache
                    .service(reinitialize_cache)
                    .service(read_reinitialization_status)
                    .service(read_consistency_status)
                    .service(read_cache_key),
            )
            .app_data(service.clone())
            .app_data(shutdown.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
