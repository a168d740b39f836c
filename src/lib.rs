//! Password-gated web dashboard for the RGPH5 census enumeration zones.
//!
//! Boundaries are loaded once at start-up ([`data::load_data`]), then every
//! request resolves the session's region/cercle/commune/area selection
//! ([`filter::resolve`]) and renders the matching polygons
//! ([`render::dashboard`]).

pub mod auth;
pub mod config;
pub mod crs;
pub mod data;
pub mod error;
pub mod filter;
pub mod html;
pub mod logo;
pub mod overlay;
pub mod render;
pub mod server;
pub mod session;
pub mod types;

pub use server::{app, AppState};
