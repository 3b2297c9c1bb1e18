//! External service integrations

pub mod radarr;
pub mod rate_limiter;
pub mod removal;
pub mod resolver;
pub mod servarr;
pub mod sonarr;
pub mod tmdb;

pub use radarr::RadarrClient;
pub use removal::{RemoteRemover, RemovalError, RemovalOutcome};
pub use servarr::{HttpClientFactory, ServarrClientFactory, ServarrRemover, ServarrSettings};
pub use sonarr::SonarrClient;
pub use tmdb::{SeriesMetadata, TmdbClient, UnconfiguredMetadata};
