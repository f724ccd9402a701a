pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use handlers::orders::SharedOrderService;

pub use config::Config;
pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::create_order,
        handlers::orders::update_order,
        handlers::orders::delete_order,
    ),
    components(schemas(
        handlers::orders::OrderRequest,
        handlers::orders::OrderLineRequest,
        handlers::orders::OrderResponse,
        handlers::orders::OrderLineResponse,
        handlers::orders::ListOrdersResponse,
        handlers::orders::ValidationErrorResponse,
    )),
    tags((name = "orders", description = "Order administration"))
)]
pub struct ApiDoc;

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    log::info!("applied {} migration(s)", applied.len());
    Ok(())
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    service: SharedOrderService,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let service = web::Data::new(service);
    let openapi = ApiDoc::openapi();

    Ok(HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(Logger::default())
            .service(
                web::scope("/orders")
                    .route("", web::get().to(handlers::orders::list_orders))
                    .route("", web::post().to(handlers::orders::create_order))
                    .route("/{id}", web::get().to(handlers::orders::get_order))
                    .route("/{id}", web::put().to(handlers::orders::update_order))
                    .route("/{id}", web::delete().to(handlers::orders::delete_order)),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind((host.to_string(), port))?
    .run())
}
