use crate::errors::AppError;
use crate::repositories::{MEMES_TABLE, RATINGS_TABLE, TEMPLATES_TABLE, TOKENS_TABLE, USERS_TABLE};
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
    Client as DynamoDbClient,
};

fn attribute(name: &str) -> Result<AttributeDefinition, AppError> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(|e| AppError::InitError(format!("Failed to build attribute definition for '{}': {}", name, e)))
}

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement, AppError> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
        .map_err(|e| AppError::InitError(format!("Failed to build key schema for '{}': {}", name, e)))
}

/// Creates one DynamoDB table if it doesn't exist. A composite range key
/// makes the key pair itself the uniqueness constraint (used by the
/// ratings table).
async fn create_table_if_missing(
    client: &DynamoDbClient,
    name: &str,
    hash_key: &str,
    range_key: Option<&str>,
) -> Result<(), AppError> {
    let mut request = client
        .create_table()
        .table_name(name)
        .attribute_definitions(attribute(hash_key)?)
        .key_schema(key_element(hash_key, KeyType::Hash)?);
    if let Some(range) = range_key {
        request = request
            .attribute_definitions(attribute(range)?)
            .key_schema(key_element(range, KeyType::Range)?);
    }

    let result = request.billing_mode(BillingMode::PayPerRequest).send().await;
    match result {
        Ok(_) => {
            tracing::info!("Startup: table '{}' created successfully or setup initiated.", name);
            Ok(())
        }
        Err(e) => {
            if let SdkError::ServiceError(service_err) = &e {
                if service_err.err().is_resource_in_use_exception() {
                    tracing::info!("Startup: table '{}' already exists, no action needed.", name);
                    return Ok(());
                }
            }
            let context = format!("Startup: failed to create DynamoDB table '{}'", name);
            tracing::error!("{}: {}", context, e);
            Err(AppError::InitError(format!("{}: {}", context, e)))
        }
    }
}

/// Initializes the DynamoDB tables backing the record store.
pub async fn init_resources(client: &DynamoDbClient) -> Result<(), AppError> {
    tracing::info!("Startup: initializing DynamoDB tables...");
    create_table_if_missing(client, TEMPLATES_TABLE, "template_id", None).await?;
    create_table_if_missing(client, MEMES_TABLE, "meme_id", None).await?;
    create_table_if_missing(client, RATINGS_TABLE, "meme_id", Some("user_id")).await?;
    create_table_if_missing(client, USERS_TABLE, "user_id", None).await?;
    create_table_if_missing(client, TOKENS_TABLE, "token", None).await?;
    tracing::info!("Startup: DynamoDB table initialization complete.");
    Ok(())
}
