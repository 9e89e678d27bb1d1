#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{figment::Figment, Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing};
use crate::logging::LoggerFairing;
use crate::model::store::SharedStore;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod service;

/// The production server: config from `Rocket.toml`/`ROCKET_*`, backed by
/// MongoDB.
pub fn build() -> Rocket<Build> {
    assemble(rocket::build()).attach(DatabaseFairing)
}

/// A server backed by the given store rather than the configured database.
pub fn rocket_for_store(figment: Figment, store: SharedStore) -> Rocket<Build> {
    assemble(rocket::custom(figment)).manage(store)
}

fn assemble(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

#[cfg(test)]
pub(crate) fn test_figment() -> Figment {
    rocket::Config::figment()
        .merge(("jwt_secret", "test-jwt-secret"))
        .merge(("auth_ttl", 3600))
}

#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string());
    mongodb::Client::with_uri_str(db_uri).await.unwrap()
}

/// A fresh database name, so tests don't see each other's data.
#[cfg(test)]
pub(crate) fn database() -> String {
    format!("test{}", rand::random::<u32>())
}

/// A local client for a server backed by the given in-memory store.
#[cfg(test)]
pub(crate) async fn memory_client(
    store: &model::store::MemoryStore,
) -> rocket::local::asynchronous::Client {
    let store: SharedStore = std::sync::Arc::new(store.clone());
    rocket::local::asynchronous::Client::tracked(rocket_for_store(test_figment(), store))
        .await
        .unwrap()
}
