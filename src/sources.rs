pub mod tmdb_api;

pub use tmdb_api::TmdbAPI;
