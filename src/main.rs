use dotenvy::dotenv;
use order_admin::application::order_service::OrderService;
use order_admin::domain::ports::OrderRepository;
use order_admin::infrastructure::memory_repo::InMemoryOrderRepository;
use order_admin::infrastructure::order_repo::DieselOrderRepository;
use order_admin::{build_server, create_pool, run_migrations, Config};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env()?;

    let repo: Box<dyn OrderRepository> = match &config.database_url {
        Some(database_url) => {
            let pool = create_pool(database_url)?;
            run_migrations(&pool)?;
            Box::new(DieselOrderRepository::new(pool))
        }
        None => {
            log::warn!("DATABASE_URL not set, orders are kept in memory");
            Box::new(InMemoryOrderRepository::new())
        }
    };

    log::info!(
        "Starting server at http://{}:{} (free shipping from {}, flat fee {})",
        config.host,
        config.port,
        config.pricing.free_shipping_threshold,
        config.pricing.flat_delivery_fee
    );

    let service = OrderService::new(repo, config.pricing);
    build_server(service, &config.host, config.port)?.await?;
    Ok(())
}
