pub mod api;
pub mod config;
pub mod error;
pub mod lock;
pub mod logger;
pub mod model;
pub mod store;
pub mod time;

pub trait Located {
    fn location(&self) -> snafu::Location;
}
