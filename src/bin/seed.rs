use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    entity::enums::RoleName,
    services::{auth_service::hash_password, role_service},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    role_service::ensure_default_roles(&orm).await?;

    let admin_role = role_service::role_by_name(&orm, RoleName::Admin).await?;
    let customer_role = role_service::role_by_name(&orm, RoleName::Customer).await?;

    let admin_id = ensure_user(
        &pool,
        "Administrator",
        &config.admin_email,
        &config.admin_password,
        admin_role.id,
    )
    .await?;
    let customer_id = ensure_user(
        &pool,
        "Demo Customer",
        "cliente@example.com",
        "cliente123",
        customer_role.id,
    )
    .await?;
    seed_products(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, Customer ID: {customer_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    role_id: Uuid,
) -> anyhow::Result<Uuid> {
    let email = email.trim().to_lowercase();
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let inserted: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(&email)
    .bind(password_hash)
    .bind(role_id)
    .fetch_optional(pool)
    .await?;

    let user_id = match inserted {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(&email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email}");
    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    // (name, description, price in cents, category, stock)
    let products = vec![
        ("Taza artesanal", "Taza de ceramica pintada a mano", 1_250_i64, "cocina", 40),
        ("Remera estampada", "Remera de algodon con estampa", 4_500, "ropa", 25),
        ("Cuaderno A5", "Cuaderno de tapa dura, 120 hojas", 1_800, "papeleria", 60),
        ("Lampara de mesa", "Lampara LED regulable", 9_900, "hogar", 8),
        ("Mochila urbana", "Mochila impermeable de 20 litros", 12_000, "accesorios", 0),
    ];

    for (name, description, price, category, stock) in products {
        let status = if stock == 0 { "agotado" } else { "disponible" };
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, category, stock, status)
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE NOT EXISTS (SELECT 1 FROM products WHERE name = $2)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(category)
        .bind(stock)
        .bind(status)
        .execute(pool)
        .await?;
    }

    println!("Seeded demo products");
    Ok(())
}
