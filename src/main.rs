#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod pricing;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use api::{
    api_admin_customers, api_admin_order_detail, api_admin_orders, api_create_order,
    api_create_recipe, api_delete_recipe, api_get_ingredient, api_get_order, api_get_recipe,
    api_list_ingredients, api_list_orders, api_list_recipes, api_login, api_logout, api_me,
    api_me_unauthorized, api_register, api_update_recipe, health,
};
use auth::{NewUser, Role, forbidden_api, unauthorized_api};
use db::clean_expired_sessions;
use error::AppError;
use once_cell::sync::Lazy;
use rocket::{Build, Rocket, tokio};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;
use std::sync::Mutex;
use telemetry::{OtelGuard, TelemetryFairing};
use tracing::{error, info};

pub static TELEMETRY_GUARD: Lazy<Mutex<Option<OtelGuard>>> = Lazy::new(|| Mutex::new(None));

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    *TELEMETRY_GUARD.lock().unwrap() = telemetry::init_tracing();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:bakery.db".to_string());

    let options = SqliteConnectOptions::from_str(&database_url)
        .expect("Invalid DATABASE_URL")
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options)
        .await
        .expect("Failed to connect to SQLite database");

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    if let Err(e) = bootstrap_admin(&pool).await {
        error!("Failed to bootstrap admin account: {}", e);
    }

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    init_rocket(pool).await
}

/// Creates the admin account from ADMIN_USERNAME/ADMIN_PASSWORD when it
/// does not exist yet. Registration itself never grants the admin role.
async fn bootstrap_admin(pool: &SqlitePool) -> Result<(), AppError> {
    let (username, password) = match (
        std::env::var("ADMIN_USERNAME"),
        std::env::var("ADMIN_PASSWORD"),
    ) {
        (Ok(username), Ok(password)) => (username, password),
        _ => return Ok(()),
    };

    if db::find_user_by_username(pool, &username).await?.is_some() {
        return Ok(());
    }

    let email =
        std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| format!("{}@localhost", username));

    let admin = NewUser {
        username: username.clone(),
        password,
        business_name: "ナチュラルベーカリー".to_string(),
        business_type: "bakery".to_string(),
        owner_name: username.clone(),
        email,
        phone: None,
        address: None,
        role: Role::Admin,
    };

    db::create_user(pool, &admin).await?;
    info!(username = %username, "Bootstrapped admin account");

    Ok(())
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting natural bakery server");

    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                api_list_recipes,
                api_get_recipe,
                api_create_recipe,
                api_update_recipe,
                api_delete_recipe,
                api_list_ingredients,
                api_get_ingredient,
                api_create_order,
                api_list_orders,
                api_get_order,
                api_login,
                api_logout,
                api_me,
                api_me_unauthorized,
                api_register,
                api_admin_customers,
                api_admin_orders,
                api_admin_order_detail,
            ],
        )
        .register("/api", catchers![unauthorized_api, forbidden_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
}
