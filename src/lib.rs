// Exposes modules to the binary and the integration tests

pub mod config;
pub mod control;
pub mod device_ids;
pub mod models;
pub mod naming;
pub mod portainer_repo;
pub mod routes;
pub mod stats_worker;
pub mod topology_worker;
pub mod version;
