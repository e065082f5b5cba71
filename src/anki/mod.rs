pub mod client;
pub mod config;
pub mod connect;
pub mod default_model;
pub mod state;
pub mod validate;


pub use client::{
    AnkiClient,
    Note,
};
pub use config::{
    AnkiConfig,
    Endpoint,
    FieldTemplate,
};
pub use connect::{
    AnkiConnect,
    HttpAnkiConnect,
    Permission,
};
pub use state::{
    AnkiState,
    Snapshot,
};
