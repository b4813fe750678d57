use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    /// Required only for the postgres backend.
    pub database_url: Option<String>,
    /// `postgres` or `memory`.
    pub store_backend: String,
    pub host: String,
    pub port: u16,

    pub stripe_webhook_secret: String,
    pub revenuecat_webhook_secret: String,

    pub free_tier_item_limit: i64,
    pub monthly_price_minor: i64,
    pub annual_price_minor: i64,
    pub currency: String,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let store_backend =
            env::var("STORE_BACKEND").unwrap_or_else(|_| "postgres".to_string());
        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == "postgres" && database_url.is_none() {
            return Err("DATABASE_URL is required when STORE_BACKEND=postgres".into());
        }

        Ok(Self {
            database_url,
            store_backend,

            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT").unwrap_or_else(|_| "8080".to_string()).parse()?,

            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .unwrap_or_else(|_| "whsec_dev_secret".to_string()),
            revenuecat_webhook_secret: env::var("REVENUECAT_WEBHOOK_SECRET")
                .unwrap_or_else(|_| "rc_dev_secret".to_string()),

            free_tier_item_limit: env::var("FREE_TIER_ITEM_LIMIT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            monthly_price_minor: env::var("MONTHLY_PRICE_MINOR")
                .unwrap_or_else(|_| "999".to_string())
                .parse()?,
            annual_price_minor: env::var("ANNUAL_PRICE_MINOR")
                .unwrap_or_else(|_| "9900".to_string())
                .parse()?,
            currency: env::var("CURRENCY").unwrap_or_else(|_| "USD".to_string()),
        })
    }
}
