pub mod integrations;

pub use integrations::AppState;
