use crate::{
    auth::{self, AuthUser},
    errors::AppError,
    models::{Meme, MemeTemplate, User},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

// --- Users ---

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
}

/// POST /api/users — provisions a user and, as an explicit second step,
/// issues the auth token that future requests authenticate with.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if body.username.trim().is_empty() {
        return Err(AppError::InvalidInput("username must not be empty".to_string()));
    }
    if body.email.trim().is_empty() {
        return Err(AppError::InvalidInput("email must not be empty".to_string()));
    }

    let user = User {
        id: Uuid::new_v4(),
        username: body.username,
        email: body.email,
    };
    state.users.create(&user).await?;

    let token = auth::issue_token();
    state.users.store_token(&token, user.id).await?;

    tracing::info!(user_id = %user.id, "User provisioned with auth token");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": user.id,
            "username": user.username,
            "email": user.email,
            "token": token,
        })),
    ))
}

// --- Templates ---

#[derive(Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    pub image_url: String,
    #[serde(default)]
    pub default_top_text: String,
    #[serde(default)]
    pub default_bottom_text: String,
}

fn validate_template(body: &TemplateRequest) -> Result<(), AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::InvalidInput("name must not be empty".to_string()));
    }
    Url::parse(&body.image_url)
        .map_err(|e| AppError::InvalidInput(format!("image_url is not a valid URL: {}", e)))?;
    Ok(())
}

/// POST /api/templates
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TemplateRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_template(&body)?;

    let template = MemeTemplate {
        id: Uuid::new_v4(),
        name: body.name,
        image_url: body.image_url,
        default_top_text: body.default_top_text,
        default_bottom_text: body.default_bottom_text,
    };
    state.templates.create(&template).await?;

    tracing::info!(template_id = %template.id, "Template created");
    Ok((StatusCode::CREATED, Json(template)))
}

/// GET /api/templates
pub async fn list_templates(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let mut templates = state.templates.list_all().await?;
    templates.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(Json(templates))
}

/// GET /api/templates/{id}
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let template_id = Uuid::parse_str(&id_str)?;
    match state.templates.get_by_id(template_id).await? {
        Some(template) => Ok(Json(template)),
        None => Err(AppError::TemplateNotFound(template_id)),
    }
}

/// PUT /api/templates/{id} — the one sanctioned way a template changes
/// after creation.
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Json(body): Json<TemplateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let template_id = Uuid::parse_str(&id_str)?;
    validate_template(&body)?;

    if state.templates.get_by_id(template_id).await?.is_none() {
        return Err(AppError::TemplateNotFound(template_id));
    }

    let template = MemeTemplate {
        id: template_id,
        name: body.name,
        image_url: body.image_url,
        default_top_text: body.default_top_text,
        default_bottom_text: body.default_bottom_text,
    };
    state.templates.update(&template).await?;

    tracing::info!(template_id = %template_id, "Template updated");
    Ok(Json(template))
}

// --- Memes ---

#[derive(Deserialize)]
pub struct CreateMemeRequest {
    pub template: Uuid,
    pub top_text: Option<String>,
    pub bottom_text: Option<String>,
    pub created_by: Option<Uuid>,
}

/// POST /api/memes — captions default to the template's defaults when
/// omitted; the creator defaults to the authenticated caller.
pub async fn create_meme(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Json(body): Json<CreateMemeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let template = state
        .templates
        .get_by_id(body.template)
        .await?
        .ok_or_else(|| AppError::InvalidInput(format!("template {} does not exist", body.template)))?;

    let created_by = match body.created_by {
        Some(id) => {
            state
                .users
                .get_by_id(id)
                .await?
                .ok_or_else(|| AppError::InvalidInput(format!("created_by {} does not exist", id)))?
                .id
        }
        None => caller.id,
    };

    let meme = Meme {
        id: Uuid::new_v4(),
        template_id: template.id,
        top_text: body.top_text.unwrap_or(template.default_top_text),
        bottom_text: body.bottom_text.unwrap_or(template.default_bottom_text),
        created_by,
        created_at: Utc::now(),
    };
    state.memes.create(&meme).await?;

    tracing::info!(meme_id = %meme.id, "Meme created");
    Ok((StatusCode::CREATED, Json(meme)))
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct Page<T> {
    pub count: usize,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

/// Slices a fully ordered listing into a one-based page. A page past the
/// end is a 404, matching the source API's pagination contract.
fn paginate<T>(items: Vec<T>, page: u32, page_size: u32) -> Result<Page<T>, AppError> {
    let count = items.len();
    let pages = (count as u64).div_ceil(page_size as u64).max(1) as u32;
    if page == 0 || page > pages {
        return Err(AppError::InvalidPage);
    }

    let start = (page - 1) as usize * page_size as usize;
    let results: Vec<T> = items.into_iter().skip(start).take(page_size as usize).collect();
    Ok(Page {
        count,
        next: (page < pages).then_some(page + 1),
        previous: (page > 1).then_some(page - 1),
        results,
    })
}

/// GET /api/memes — paginated, ordered by creation time then id so pages
/// are stable across requests.
pub async fn list_memes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(state.config.default_page_size);
    if page_size == 0 {
        return Err(AppError::InvalidInput("page_size must be at least 1".to_string()));
    }

    let mut memes = state.memes.list_all().await?;
    memes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    Ok(Json(paginate(memes, page, page_size)?))
}

/// GET /api/memes/{id}
pub async fn get_meme(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    match state.memes.get_by_id(meme_id).await? {
        Some(meme) => Ok(Json(meme)),
        None => Err(AppError::MemeNotFound(meme_id)),
    }
}

/// DELETE /api/memes/{id} — removes the meme and cascades to its ratings.
pub async fn delete_meme(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    AuthUser(_caller): AuthUser,
) -> Result<StatusCode, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;

    // 1. Verify the meme exists so an unknown id is a 404, not a silent no-op.
    if state.memes.get_by_id(meme_id).await?.is_none() {
        return Err(AppError::MemeNotFound(meme_id));
    }

    // 2. Ratings go first so they never point at a missing meme.
    state.ratings.delete_for_meme(meme_id).await?;

    // 3. Then the meme record itself.
    state.memes.delete(meme_id).await?;

    tracing::info!(%meme_id, "Meme deleted with its ratings");
    Ok(StatusCode::NO_CONTENT)
}

// --- Rating / aggregation / selection ---

#[derive(Deserialize)]
pub struct RateRequest {
    pub rating: i32,
}

/// POST /api/memes/{id}/rate
pub async fn rate_meme(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    AuthUser(caller): AuthUser,
    Json(body): Json<RateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    let receipt = state.rating_engine.submit(meme_id, caller.id, body.rating).await?;
    tracing::debug!(meme_id = %receipt.meme_id, created = receipt.created, "Rating response sent");

    Ok(Json(json!({
        "status": "rated successfully",
        "meme_id": receipt.meme_id,
        "rating": receipt.score,
    })))
}

/// GET /api/memes/random
pub async fn random_meme(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let meme = state.selection.random_meme().await?;
    Ok(Json(meme))
}

#[derive(Deserialize)]
pub struct TopQuery {
    pub count: Option<usize>,
}

/// GET /api/memes/top — defaults to the top 10. When fewer memes qualify
/// than were asked for, the list is wrapped with an explanatory message.
pub async fn top_memes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopQuery>,
) -> Result<Response, AppError> {
    let count = query.count.unwrap_or(10);
    if count == 0 {
        return Err(AppError::InvalidInput("count must be at least 1".to_string()));
    }

    let ranked = state.aggregation.top_rated(count).await?;
    if ranked.len() < count {
        return Ok(Json(json!({
            "message": format!("There are only {} rated memes available.", ranked.len()),
            "data": ranked,
        }))
        .into_response());
    }
    Ok(Json(ranked).into_response())
}

/// GET /api/ratings — diagnostic listing of every stored rating.
pub async fn list_ratings(
    State(state): State<Arc<AppState>>,
    AuthUser(_caller): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let ratings = state.ratings.list_all().await?;
    Ok(Json(ratings))
}
