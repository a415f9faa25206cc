use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    services::role_service,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    role_service::ensure_default_roles(&orm).await?;
    println!("Migrations applied");
    Ok(())
}
