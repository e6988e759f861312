use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aggregation;
mod auth;
mod aws_clients;
mod config;
mod domain;
mod errors;
mod handlers;
mod models;
mod rating;
mod repositories;
mod routes;
mod selection;
mod startup;
#[cfg(test)]
mod testing;

use crate::aggregation::AggregationService;
use crate::config::Config;
use crate::domain::{MemeRepository, RatingRepository, TemplateRepository, UserRepository};
use crate::errors::AppError;
use crate::rating::RatingEngine;
use crate::repositories::{
    DynamoDbMemeRepository, DynamoDbRatingRepository, DynamoDbTemplateRepository, DynamoDbUserRepository,
};
use crate::selection::SelectionService;

/// AppState holds shared resources for the web server: the repository
/// handles and the core services built on top of them.
pub struct AppState {
    pub config: Config,
    pub templates: Arc<dyn TemplateRepository>,
    pub memes: Arc<dyn MemeRepository>,
    pub ratings: Arc<dyn RatingRepository>,
    pub users: Arc<dyn UserRepository>,
    pub rating_engine: RatingEngine,
    pub aggregation: AggregationService,
    pub selection: SelectionService,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "memegen_api=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    tracing::info!("Initializing AWS DynamoDB client...");
    let sdk_config = aws_clients::create_sdk_config(&config).await;
    let db_client = aws_clients::create_dynamodb_client(&sdk_config);

    startup::init_resources(&db_client).await?;

    let call_timeout = config.store_timeout;
    let templates: Arc<dyn TemplateRepository> =
        Arc::new(DynamoDbTemplateRepository::new(db_client.clone(), call_timeout));
    let memes: Arc<dyn MemeRepository> = Arc::new(DynamoDbMemeRepository::new(db_client.clone(), call_timeout));
    let ratings: Arc<dyn RatingRepository> = Arc::new(DynamoDbRatingRepository::new(db_client.clone(), call_timeout));
    let users: Arc<dyn UserRepository> = Arc::new(DynamoDbUserRepository::new(db_client, call_timeout));

    let state = Arc::new(AppState {
        rating_engine: RatingEngine::new(memes.clone(), ratings.clone()),
        aggregation: AggregationService::new(memes.clone(), ratings.clone()),
        selection: SelectionService::new(memes.clone()),
        config: config.clone(),
        templates,
        memes,
        ratings,
        users,
    });

    let app = routes::create_router(state);

    tracing::info!("Server listening on http://{}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
