use crate::{
    domain::{MemeRepository, RatingRepository, RatingUpsert, TemplateRepository, UserRepository},
    errors::RepoError,
    models::{Meme, MemeTemplate, Rating, User},
};
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{AttributeValue, ReturnValue},
    Client as DynamoDbClient,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub const TEMPLATES_TABLE: &str = "meme_templates";
pub const MEMES_TABLE: &str = "memes";
pub const RATINGS_TABLE: &str = "meme_ratings";
pub const USERS_TABLE: &str = "users";
pub const TOKENS_TABLE: &str = "auth_tokens";

/// Optional projection for a scan/query: the expression plus its
/// placeholder-to-attribute bindings.
type Projection = Option<(&'static str, &'static [(&'static str, &'static str)])>;

const MEME_ID_PROJECTION: Projection = Some(("#m", &[("#m", "meme_id")]));
const SCORE_PROJECTION: Projection = Some(("#s", &[("#s", "score")]));
const MEME_SCORE_PROJECTION: Projection = Some(("#m, #s", &[("#m", "meme_id"), ("#s", "score")]));
const RATING_KEY_PROJECTION: Projection = Some(("#m, #u", &[("#m", "meme_id"), ("#u", "user_id")]));

/// Caps a single store call so a stalled backend cannot pin a request
/// handler. A timed-out call surfaces as `Unavailable`.
async fn bounded<T>(
    limit: Duration,
    table: &str,
    fut: impl Future<Output = Result<T, RepoError>>,
) -> Result<T, RepoError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RepoError::Unavailable(anyhow::anyhow!(
            "call to table '{}' exceeded {}ms",
            table,
            limit.as_millis()
        ))),
    }
}

/// Splits SDK failures into transient unavailability (timeouts, dispatch
/// failures) and everything else.
fn classify_sdk<E>(err: SdkError<E>, context: String) -> RepoError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let transient = matches!(err, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_));
    let wrapped = anyhow::Error::new(err).context(context);
    if transient {
        RepoError::Unavailable(wrapped)
    } else {
        RepoError::Backend(wrapped)
    }
}

/// Scans a whole table, following `LastEvaluatedKey` pagination. Each
/// page request is individually bounded.
async fn scan_all(
    client: &DynamoDbClient,
    table: &'static str,
    call_timeout: Duration,
    projection: Projection,
) -> Result<Vec<HashMap<String, AttributeValue>>, RepoError> {
    let mut items = Vec::new();
    let mut last_key: Option<HashMap<String, AttributeValue>> = None;

    loop {
        let mut req = client.scan().table_name(table);
        if let Some((expr, names)) = projection {
            req = req.projection_expression(expr);
            for (placeholder, attr) in names {
                req = req.expression_attribute_names(*placeholder, *attr);
            }
        }
        if let Some(key) = last_key.take() {
            req = req.set_exclusive_start_key(Some(key));
        }

        let resp = bounded(call_timeout, table, async {
            req.send()
                .await
                .map_err(|e| classify_sdk(e, format!("DynamoDB: failed to scan table '{}'", table)))
        })
        .await?;

        items.extend(resp.items.unwrap_or_default());
        last_key = resp.last_evaluated_key;
        if last_key.is_none() {
            break;
        }
        tracing::debug!(table, "DynamoDB scan: continuing with LastEvaluatedKey");
    }

    Ok(items)
}

// --- Attribute extraction helpers ---

fn get_s(item: &HashMap<String, AttributeValue>, name: &str) -> Option<String> {
    item.get(name)?.as_s().ok().map(|s| s.to_string())
}

fn get_uuid(item: &HashMap<String, AttributeValue>, name: &str) -> Option<Uuid> {
    item.get(name)?.as_s().ok().and_then(|s| Uuid::parse_str(s).ok())
}

fn get_i32(item: &HashMap<String, AttributeValue>, name: &str) -> Option<i32> {
    item.get(name)?.as_n().ok().and_then(|n| n.parse().ok())
}

fn get_ts(item: &HashMap<String, AttributeValue>, name: &str) -> Option<DateTime<Utc>> {
    item.get(name)?
        .as_s()
        .ok()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn item_to_template(item: &HashMap<String, AttributeValue>) -> Option<MemeTemplate> {
    Some(MemeTemplate {
        id: get_uuid(item, "template_id")?,
        name: get_s(item, "name")?,
        image_url: get_s(item, "image_url")?,
        default_top_text: get_s(item, "default_top_text")?,
        default_bottom_text: get_s(item, "default_bottom_text")?,
    })
}

fn item_to_meme(item: &HashMap<String, AttributeValue>) -> Option<Meme> {
    Some(Meme {
        id: get_uuid(item, "meme_id")?,
        template_id: get_uuid(item, "template_id")?,
        top_text: get_s(item, "top_text")?,
        bottom_text: get_s(item, "bottom_text")?,
        created_by: get_uuid(item, "created_by")?,
        created_at: get_ts(item, "created_at")?,
    })
}

fn item_to_rating(item: &HashMap<String, AttributeValue>) -> Option<Rating> {
    Some(Rating {
        id: get_uuid(item, "rating_id")?,
        meme_id: get_uuid(item, "meme_id")?,
        user_id: get_uuid(item, "user_id")?,
        score: get_i32(item, "score")?,
        created_at: get_ts(item, "created_at")?,
    })
}

fn corrupt(table: &str, what: &str) -> RepoError {
    tracing::error!(table, what, "DynamoDB: retrieved item but failed to parse it");
    RepoError::Corrupt(format!("failed to parse {} from table '{}'", what, table))
}

// --- Template repository ---

#[derive(Debug, Clone)]
pub struct DynamoDbTemplateRepository {
    client: DynamoDbClient,
    call_timeout: Duration,
}

impl DynamoDbTemplateRepository {
    pub fn new(client: DynamoDbClient, call_timeout: Duration) -> Self {
        Self { client, call_timeout }
    }

    fn put_request(&self, template: &MemeTemplate) -> aws_sdk_dynamodb::operation::put_item::builders::PutItemFluentBuilder {
        self.client
            .put_item()
            .table_name(TEMPLATES_TABLE)
            .item("template_id", AttributeValue::S(template.id.to_string()))
            .item("name", AttributeValue::S(template.name.clone()))
            .item("image_url", AttributeValue::S(template.image_url.clone()))
            .item("default_top_text", AttributeValue::S(template.default_top_text.clone()))
            .item("default_bottom_text", AttributeValue::S(template.default_bottom_text.clone()))
    }
}

#[async_trait]
impl TemplateRepository for DynamoDbTemplateRepository {
    async fn create(&self, template: &MemeTemplate) -> Result<(), RepoError> {
        let id = template.id;
        let req = self
            .put_request(template)
            .condition_expression("attribute_not_exists(template_id)");
        bounded(self.call_timeout, TEMPLATES_TABLE, async {
            req.send().await.map_err(|e| {
                if matches!(&e, SdkError::ServiceError(s) if s.err().is_conditional_check_failed_exception()) {
                    RepoError::AlreadyExists(format!("template {}", id))
                } else {
                    classify_sdk(e, format!("DynamoDB (table: {}): failed to put template {}", TEMPLATES_TABLE, id))
                }
            })
        })
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemeTemplate>, RepoError> {
        let req = self
            .client
            .get_item()
            .table_name(TEMPLATES_TABLE)
            .key("template_id", AttributeValue::S(id.to_string()));
        let resp = bounded(self.call_timeout, TEMPLATES_TABLE, async {
            req.send().await.map_err(|e| {
                classify_sdk(e, format!("DynamoDB (table: {}): failed to get template {}", TEMPLATES_TABLE, id))
            })
        })
        .await?;

        match resp.item {
            Some(item) => item_to_template(&item)
                .map(Some)
                .ok_or_else(|| corrupt(TEMPLATES_TABLE, "template")),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<MemeTemplate>, RepoError> {
        let items = scan_all(&self.client, TEMPLATES_TABLE, self.call_timeout, None).await?;
        items
            .iter()
            .map(|item| item_to_template(item).ok_or_else(|| corrupt(TEMPLATES_TABLE, "template")))
            .collect()
    }

    async fn update(&self, template: &MemeTemplate) -> Result<(), RepoError> {
        // Plain overwrite; the handler has already verified existence.
        let id = template.id;
        let req = self.put_request(template);
        bounded(self.call_timeout, TEMPLATES_TABLE, async {
            req.send().await.map_err(|e| {
                classify_sdk(e, format!("DynamoDB (table: {}): failed to update template {}", TEMPLATES_TABLE, id))
            })
        })
        .await?;
        Ok(())
    }
}

// --- Meme repository ---

#[derive(Debug, Clone)]
pub struct DynamoDbMemeRepository {
    client: DynamoDbClient,
    call_timeout: Duration,
}

impl DynamoDbMemeRepository {
    pub fn new(client: DynamoDbClient, call_timeout: Duration) -> Self {
        info!(table = MEMES_TABLE, "Initializing DynamoDbMemeRepository");
        Self { client, call_timeout }
    }
}

#[async_trait]
impl MemeRepository for DynamoDbMemeRepository {
    async fn create(&self, meme: &Meme) -> Result<(), RepoError> {
        let id = meme.id;
        let req = self
            .client
            .put_item()
            .table_name(MEMES_TABLE)
            .item("meme_id", AttributeValue::S(meme.id.to_string()))
            .item("template_id", AttributeValue::S(meme.template_id.to_string()))
            .item("top_text", AttributeValue::S(meme.top_text.clone()))
            .item("bottom_text", AttributeValue::S(meme.bottom_text.clone()))
            .item("created_by", AttributeValue::S(meme.created_by.to_string()))
            .item("created_at", AttributeValue::S(meme.created_at.to_rfc3339()))
            .condition_expression("attribute_not_exists(meme_id)");
        bounded(self.call_timeout, MEMES_TABLE, async {
            req.send().await.map_err(|e| {
                if matches!(&e, SdkError::ServiceError(s) if s.err().is_conditional_check_failed_exception()) {
                    RepoError::AlreadyExists(format!("meme {}", id))
                } else {
                    classify_sdk(e, format!("DynamoDB (table: {}): failed to put meme {}", MEMES_TABLE, id))
                }
            })
        })
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Meme>, RepoError> {
        let req = self
            .client
            .get_item()
            .table_name(MEMES_TABLE)
            .key("meme_id", AttributeValue::S(id.to_string()));
        let resp = bounded(self.call_timeout, MEMES_TABLE, async {
            req.send()
                .await
                .map_err(|e| classify_sdk(e, format!("DynamoDB (table: {}): failed to get meme {}", MEMES_TABLE, id)))
        })
        .await?;

        match resp.item {
            Some(item) => item_to_meme(&item).map(Some).ok_or_else(|| corrupt(MEMES_TABLE, "meme")),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<Meme>, RepoError> {
        let items = scan_all(&self.client, MEMES_TABLE, self.call_timeout, None).await?;
        let memes: Result<Vec<Meme>, RepoError> = items
            .iter()
            .map(|item| item_to_meme(item).ok_or_else(|| corrupt(MEMES_TABLE, "meme")))
            .collect();
        let memes = memes?;
        tracing::debug!(count = memes.len(), "DynamoDB: listed memes");
        Ok(memes)
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>, RepoError> {
        let items = scan_all(&self.client, MEMES_TABLE, self.call_timeout, MEME_ID_PROJECTION).await?;
        items
            .iter()
            .map(|item| get_uuid(item, "meme_id").ok_or_else(|| corrupt(MEMES_TABLE, "meme id")))
            .collect()
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        // DeleteItem succeeds even if the item is already gone.
        let req = self
            .client
            .delete_item()
            .table_name(MEMES_TABLE)
            .key("meme_id", AttributeValue::S(id.to_string()));
        bounded(self.call_timeout, MEMES_TABLE, async {
            req.send()
                .await
                .map_err(|e| classify_sdk(e, format!("DynamoDB (table: {}): failed to delete meme {}", MEMES_TABLE, id)))
        })
        .await?;
        tracing::debug!(meme_id = %id, "DynamoDB: meme delete request sent");
        Ok(())
    }
}

// --- Rating repository ---

#[derive(Debug, Clone)]
pub struct DynamoDbRatingRepository {
    client: DynamoDbClient,
    call_timeout: Duration,
}

impl DynamoDbRatingRepository {
    pub fn new(client: DynamoDbClient, call_timeout: Duration) -> Self {
        info!(table = RATINGS_TABLE, "Initializing DynamoDbRatingRepository");
        Self { client, call_timeout }
    }

    /// Queries every rating item for one meme, following pagination.
    async fn query_for_meme(
        &self,
        meme_id: Uuid,
        projection: Projection,
    ) -> Result<Vec<HashMap<String, AttributeValue>>, RepoError> {
        let mut items = Vec::new();
        let mut last_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut req = self
                .client
                .query()
                .table_name(RATINGS_TABLE)
                .key_condition_expression("#m = :meme")
                .expression_attribute_names("#m", "meme_id")
                .expression_attribute_values(":meme", AttributeValue::S(meme_id.to_string()));
            if let Some((expr, names)) = projection {
                req = req.projection_expression(expr);
                for (placeholder, attr) in names {
                    req = req.expression_attribute_names(*placeholder, *attr);
                }
            }
            if let Some(key) = last_key.take() {
                req = req.set_exclusive_start_key(Some(key));
            }

            let resp = bounded(self.call_timeout, RATINGS_TABLE, async {
                req.send().await.map_err(|e| {
                    classify_sdk(
                        e,
                        format!("DynamoDB (table: {}): failed to query ratings for meme {}", RATINGS_TABLE, meme_id),
                    )
                })
            })
            .await?;

            items.extend(resp.items.unwrap_or_default());
            last_key = resp.last_evaluated_key;
            if last_key.is_none() {
                break;
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl RatingRepository for DynamoDbRatingRepository {
    /// One atomic UpdateItem against the (meme_id, user_id) primary key.
    /// The key schema is the uniqueness constraint: two concurrent
    /// submissions for the same pair land on the same item, never on two.
    /// `if_not_exists` keeps the rating id and timestamp from the first
    /// insert across later overwrites.
    async fn upsert(&self, meme_id: Uuid, user_id: Uuid, score: i32) -> Result<RatingUpsert, RepoError> {
        let req = self
            .client
            .update_item()
            .table_name(RATINGS_TABLE)
            .key("meme_id", AttributeValue::S(meme_id.to_string()))
            .key("user_id", AttributeValue::S(user_id.to_string()))
            .update_expression("SET #s = :score, #id = if_not_exists(#id, :id), #c = if_not_exists(#c, :now)")
            .expression_attribute_names("#s", "score")
            .expression_attribute_names("#id", "rating_id")
            .expression_attribute_names("#c", "created_at")
            .expression_attribute_values(":score", AttributeValue::N(score.to_string()))
            .expression_attribute_values(":id", AttributeValue::S(Uuid::new_v4().to_string()))
            .expression_attribute_values(":now", AttributeValue::S(Utc::now().to_rfc3339()))
            .return_values(ReturnValue::AllOld);

        let resp = bounded(self.call_timeout, RATINGS_TABLE, async {
            req.send().await.map_err(|e| {
                classify_sdk(
                    e,
                    format!(
                        "DynamoDB (table: {}): failed to upsert rating for meme {} by user {}",
                        RATINGS_TABLE, meme_id, user_id
                    ),
                )
            })
        })
        .await?;

        let created = resp.attributes.is_none_or(|old| old.is_empty());
        Ok(RatingUpsert { score, created })
    }

    async fn scores_for_meme(&self, meme_id: Uuid) -> Result<Vec<i32>, RepoError> {
        let items = self.query_for_meme(meme_id, SCORE_PROJECTION).await?;
        items
            .iter()
            .map(|item| get_i32(item, "score").ok_or_else(|| corrupt(RATINGS_TABLE, "score")))
            .collect()
    }

    async fn scores_by_meme(&self) -> Result<Vec<(Uuid, i32)>, RepoError> {
        let items = scan_all(&self.client, RATINGS_TABLE, self.call_timeout, MEME_SCORE_PROJECTION).await?;
        items
            .iter()
            .map(|item| {
                let meme_id = get_uuid(item, "meme_id").ok_or_else(|| corrupt(RATINGS_TABLE, "meme id"))?;
                let score = get_i32(item, "score").ok_or_else(|| corrupt(RATINGS_TABLE, "score"))?;
                Ok((meme_id, score))
            })
            .collect()
    }

    async fn list_all(&self) -> Result<Vec<Rating>, RepoError> {
        let items = scan_all(&self.client, RATINGS_TABLE, self.call_timeout, None).await?;
        items
            .iter()
            .map(|item| item_to_rating(item).ok_or_else(|| corrupt(RATINGS_TABLE, "rating")))
            .collect()
    }

    async fn delete_for_meme(&self, meme_id: Uuid) -> Result<(), RepoError> {
        let keys = self.query_for_meme(meme_id, RATING_KEY_PROJECTION).await?;
        let count = keys.len();

        for key in keys {
            let user_id = get_uuid(&key, "user_id").ok_or_else(|| corrupt(RATINGS_TABLE, "user id"))?;
            let req = self
                .client
                .delete_item()
                .table_name(RATINGS_TABLE)
                .key("meme_id", AttributeValue::S(meme_id.to_string()))
                .key("user_id", AttributeValue::S(user_id.to_string()));
            bounded(self.call_timeout, RATINGS_TABLE, async {
                req.send().await.map_err(|e| {
                    classify_sdk(
                        e,
                        format!(
                            "DynamoDB (table: {}): failed to delete rating for meme {} by user {}",
                            RATINGS_TABLE, meme_id, user_id
                        ),
                    )
                })
            })
            .await?;
        }

        tracing::debug!(meme_id = %meme_id, count, "DynamoDB: cascade-deleted ratings");
        Ok(())
    }
}

// --- User repository ---

#[derive(Debug, Clone)]
pub struct DynamoDbUserRepository {
    client: DynamoDbClient,
    call_timeout: Duration,
}

impl DynamoDbUserRepository {
    pub fn new(client: DynamoDbClient, call_timeout: Duration) -> Self {
        Self { client, call_timeout }
    }
}

#[async_trait]
impl UserRepository for DynamoDbUserRepository {
    async fn create(&self, user: &User) -> Result<(), RepoError> {
        let id = user.id;
        let req = self
            .client
            .put_item()
            .table_name(USERS_TABLE)
            .item("user_id", AttributeValue::S(user.id.to_string()))
            .item("username", AttributeValue::S(user.username.clone()))
            .item("email", AttributeValue::S(user.email.clone()))
            .condition_expression("attribute_not_exists(user_id)");
        bounded(self.call_timeout, USERS_TABLE, async {
            req.send().await.map_err(|e| {
                if matches!(&e, SdkError::ServiceError(s) if s.err().is_conditional_check_failed_exception()) {
                    RepoError::AlreadyExists(format!("user {}", id))
                } else {
                    classify_sdk(e, format!("DynamoDB (table: {}): failed to put user {}", USERS_TABLE, id))
                }
            })
        })
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let req = self
            .client
            .get_item()
            .table_name(USERS_TABLE)
            .key("user_id", AttributeValue::S(id.to_string()));
        let resp = bounded(self.call_timeout, USERS_TABLE, async {
            req.send()
                .await
                .map_err(|e| classify_sdk(e, format!("DynamoDB (table: {}): failed to get user {}", USERS_TABLE, id)))
        })
        .await?;

        match resp.item {
            Some(item) => {
                let user = User {
                    id: get_uuid(&item, "user_id").ok_or_else(|| corrupt(USERS_TABLE, "user id"))?,
                    username: get_s(&item, "username").ok_or_else(|| corrupt(USERS_TABLE, "username"))?,
                    email: get_s(&item, "email").ok_or_else(|| corrupt(USERS_TABLE, "email"))?,
                };
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn store_token(&self, token: &str, user_id: Uuid) -> Result<(), RepoError> {
        let req = self
            .client
            .put_item()
            .table_name(TOKENS_TABLE)
            .item("token", AttributeValue::S(token.to_string()))
            .item("user_id", AttributeValue::S(user_id.to_string()));
        bounded(self.call_timeout, TOKENS_TABLE, async {
            req.send().await.map_err(|e| {
                classify_sdk(e, format!("DynamoDB (table: {}): failed to store token for user {}", TOKENS_TABLE, user_id))
            })
        })
        .await?;
        Ok(())
    }

    async fn user_for_token(&self, token: &str) -> Result<Option<User>, RepoError> {
        let req = self
            .client
            .get_item()
            .table_name(TOKENS_TABLE)
            .key("token", AttributeValue::S(token.to_string()));
        let resp = bounded(self.call_timeout, TOKENS_TABLE, async {
            req.send()
                .await
                .map_err(|e| classify_sdk(e, format!("DynamoDB (table: {}): failed to look up token", TOKENS_TABLE)))
        })
        .await?;

        let Some(item) = resp.item else {
            return Ok(None);
        };
        let user_id = get_uuid(&item, "user_id").ok_or_else(|| corrupt(TOKENS_TABLE, "user id"))?;
        self.get_by_id(user_id).await
    }
}
