pub mod bootstrap;
pub mod proxy_engine;
pub mod relay;
pub mod state;
pub mod upstream_client;
