//! Peer-Tutoring Marketplace Backend
//!
//! The booking-and-messaging core: availability slots, a double-booking-proof
//! booking ledger, and a conversation ledger with live WebSocket delivery,
//! all over SQLite persistence.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod scheduling;
mod ws;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use ws::DeliveryChannel;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub channel: Arc<DeliveryChannel>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PeerTutor Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (TUTOR_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Live delivery channel for online users
    let channel = Arc::new(DeliveryChannel::new());

    // Create application state
    let state = AppState {
        repo,
        channel,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Tags
        .route("/tags", get(api::list_tags))
        .route("/tags", post(api::create_tag))
        // Tutors
        .route("/tutors", post(api::create_tutor))
        .route("/tutors/{tid}", get(api::get_tutor))
        .route("/tutors/{tid}/tags", put(api::set_tutor_tags))
        // Availability
        .route("/tutors/{tid}/availability", get(api::list_slots))
        .route("/tutors/{tid}/availability", put(api::set_slots))
        .route("/tutors/{tid}/availability", post(api::add_slot))
        .route("/availability/{slot_id}", delete(api::remove_slot))
        .route("/tutors/{tid}/bookable-times", get(api::bookable_times))
        .route("/tutors/{tid}/bookable", get(api::check_bookable))
        // Bookings
        .route("/bookings", post(api::create_booking))
        .route("/bookings/{id}", get(api::get_booking))
        .route("/bookings/{id}/start", put(api::start_booking))
        .route("/bookings/{id}/conclude", put(api::conclude_booking))
        .route("/users/{uid}/bookings", get(api::list_student_bookings))
        .route("/tutors/{tid}/bookings", get(api::list_tutor_bookings))
        // Messaging
        .route("/messages/can-message/{a}/{b}", get(api::can_message))
        .route("/messages", post(api::send_message))
        .route("/messages/{a}/{b}", get(api::get_conversation))
        .route("/users/{uid}/conversations", get(api::recent_conversations))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    // Live delivery socket; browsers cannot attach headers to the upgrade
    let ws_routes = Router::new().route("/ws/{uid}", get(ws::ws_handler));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(ws_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
