use serde::Deserialize;
use std::env;

/// Which `DocumentStore` implementation the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSettings {
    pub key_id: String,
    pub key_secret: String,
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
    pub bcrypt_cost: u32,
    pub payment: PaymentSettings,
    pub bind_addr: String,
    pub superuser_seed_file: Option<String>,
    pub seed_demo_users: bool,
}

impl Default for Config {
    /// Local development settings: in-memory store, no Redis, dev secrets.
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "coursehub".to_string(),
            redis_uri: None,
            jwt_secret: "dev-secret-only-for-local-testing".to_string(),
            token_ttl_seconds: 86_400,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            payment: PaymentSettings {
                key_id: "rzp_test_key".to_string(),
                key_secret: "dev-payment-secret".to_string(),
                api_url: "https://api.razorpay.com/v1".to_string(),
            },
            bind_addr: "0.0.0.0:8081".to_string(),
            superuser_seed_file: None,
            seed_demo_users: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (repo layout), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
        let is_prod = app_env == "prod";

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let store_backend = match settings
            .get_string("database.backend")
            .or_else(|_| env::var("STORE_BACKEND"))
            .unwrap_or_else(|_| "mongo".to_string())
            .to_lowercase()
            .as_str()
        {
            "mongo" | "mongodb" => StoreBackend::Mongo,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(config::ConfigError::Message(format!(
                    "unknown store backend '{}', expected 'mongo' or 'memory'",
                    other
                )))
            }
        };

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or(defaults.mongo_uri);

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .ok()
            .filter(|uri| !uri.trim().is_empty());

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if is_prod => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                defaults.jwt_secret
            }
        };

        let token_ttl_seconds = settings
            .get_int("auth.token_ttl_seconds")
            .ok()
            .or_else(|| env::var("JWT_TTL_SECONDS").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(defaults.token_ttl_seconds);

        let bcrypt_cost = settings
            .get_int("auth.bcrypt_cost")
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.bcrypt_cost);

        let key_id = settings
            .get_string("payment.key_id")
            .or_else(|_| env::var("RAZORPAY_KEY_ID"))
            .unwrap_or(defaults.payment.key_id);

        let key_secret = match settings
            .get_string("payment.key_secret")
            .or_else(|_| env::var("RAZORPAY_KEY_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if is_prod => {
                return Err(config::ConfigError::Message(
                    "RAZORPAY_KEY_SECRET must be set in production".to_string(),
                ))
            }
            Err(_) => {
                eprintln!("WARNING: Using default payment secret (dev mode only!)");
                defaults.payment.key_secret
            }
        };

        let api_url = settings
            .get_string("payment.api_url")
            .or_else(|_| env::var("RAZORPAY_API_URL"))
            .unwrap_or(defaults.payment.api_url);

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        let superuser_seed_file = settings
            .get_string("seed.superuser_file")
            .or_else(|_| env::var("SUPERUSER_SEED_FILE"))
            .ok();

        let seed_demo_users = settings
            .get_bool("seed.demo_users")
            .ok()
            .or_else(|| {
                env::var("SEED_DEMO_USERS")
                    .ok()
                    .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            })
            .unwrap_or(false);

        Ok(Config {
            store_backend,
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            token_ttl_seconds,
            bcrypt_cost,
            payment: PaymentSettings {
                key_id,
                key_secret,
                api_url,
            },
            bind_addr,
            superuser_seed_file,
            seed_demo_users,
        })
    }
}
