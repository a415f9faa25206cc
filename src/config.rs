use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_expire_hours: i64,
    pub jwt_refresh_expire_days: i64,
    pub admin_email: String,
    pub admin_password: String,
    pub cors_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let jwt_refresh_secret = env::var("JWT_REFRESH_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_REFRESH_SECRET is not set"))?;
        let jwt_expire_hours = env::var("JWT_EXPIRE_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(24);
        let jwt_refresh_expire_days = env::var("JWT_REFRESH_EXPIRE_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(7);
        let admin_email =
            env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@ecommerce.com".to_string());
        let admin_password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".to_string());
        let cors_origin = env::var("CORS_ORIGIN").ok().filter(|v| !v.is_empty());

        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            jwt_refresh_secret,
            jwt_expire_hours,
            jwt_refresh_expire_days,
            admin_email,
            admin_password,
            cors_origin,
        })
    }
}
