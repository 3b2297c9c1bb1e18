//! Media purge - removes media nobody has touched in a while from
//! Radarr/Sonarr and from the local catalog.

pub mod cli;
pub mod config;
pub mod db;
pub mod jobs;
pub mod services;
