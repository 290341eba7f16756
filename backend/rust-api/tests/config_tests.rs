// Environment-driven configuration. Tests mutate process env, so they run serially.
use coursehub_api::config::{Config, StoreBackend};
use std::env;

const VARS: [&str; 6] = [
    "APP_ENV",
    "STORE_BACKEND",
    "JWT_SECRET",
    "RAZORPAY_KEY_SECRET",
    "SEED_DEMO_USERS",
    "REDIS_URI",
];

fn clear_env() {
    env::set_var("SKIP_ROOT_ENV", "1");
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial_test::serial]
fn memory_backend_from_env() {
    clear_env();
    env::set_var("STORE_BACKEND", "memory");
    env::set_var("JWT_SECRET", "from-env");
    env::set_var("SEED_DEMO_USERS", "true");
    env::set_var("REDIS_URI", "  ");

    let config = Config::load().unwrap();
    assert_eq!(config.store_backend, StoreBackend::Memory);
    assert_eq!(config.jwt_secret, "from-env");
    assert!(config.seed_demo_users);
    assert!(config.redis_uri.is_none());

    clear_env();
}

#[test]
#[serial_test::serial]
fn unknown_backend_is_rejected() {
    clear_env();
    env::set_var("STORE_BACKEND", "sqlite");

    assert!(Config::load().is_err());

    clear_env();
}

#[test]
#[serial_test::serial]
fn production_requires_secrets() {
    clear_env();
    env::set_var("APP_ENV", "prod");
    env::set_var("STORE_BACKEND", "memory");

    let err = Config::load().unwrap_err().to_string();
    assert!(err.contains("JWT_SECRET"), "{err}");

    env::set_var("JWT_SECRET", "prod-jwt");
    let err = Config::load().unwrap_err().to_string();
    assert!(err.contains("RAZORPAY_KEY_SECRET"), "{err}");

    env::set_var("RAZORPAY_KEY_SECRET", "prod-payment");
    let config = Config::load().unwrap();
    assert_eq!(config.payment.key_secret, "prod-payment");

    clear_env();
}
