use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use diesel::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::authz::require_membership;
use crate::error::{AppError, AppResult};
use crate::models::{Comment, NewComment, NewNotification, Notification, RiskFlag, Script, User};
use crate::schema::{comments, notifications, risk_flags, scripts, users};
use crate::state::AppState;

use super::projects::format_timestamp;

const MENTION_PREVIEW_CHARS: usize = 80;

#[derive(Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

#[derive(Serialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub risk_flag_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub risk_flag_id: Option<Uuid>,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id,
            risk_flag_id: notification.risk_flag_id,
            message: notification.message,
            is_read: notification.is_read,
            created_at: format_timestamp(notification.created_at),
        }
    }
}

pub async fn add_comment(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
    Path(risk_id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> AppResult<(StatusCode, Json<CommentResponse>)> {
    let body = payload.body.trim().to_string();
    if body.is_empty() {
        return Err(AppError::bad_request("comment body must not be empty"));
    }

    let mut conn = state.db()?;
    let flag = find_risk_flag(&mut conn, risk_id)?;

    // Commenting is open to every member of the owning project, any role.
    let script: Script = scripts::table.find(flag.script_id).first(&mut conn)?;
    require_membership(&mut conn, script.project_id, requester.user_id)?;

    let new_comment = NewComment {
        id: Uuid::new_v4(),
        risk_flag_id: flag.id,
        author_id: requester.user_id,
        body: body.clone(),
    };
    diesel::insert_into(comments::table)
        .values(&new_comment)
        .execute(&mut conn)?;

    info!(author = %requester.username, risk_id = %flag.id, "comment added");

    notify_mentions(&mut conn, &body, &requester, &flag)?;

    let comment: Comment = comments::table.find(new_comment.id).first(&mut conn)?;
    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            id: comment.id,
            risk_flag_id: comment.risk_flag_id,
            author_id: comment.author_id,
            author_username: requester.username,
            body: comment.body,
            created_at: format_timestamp(comment.created_at),
        }),
    ))
}

pub async fn list_comments(
    State(state): State<AppState>,
    _requester: AuthenticatedUser,
    Path(risk_id): Path<Uuid>,
) -> AppResult<Json<Vec<CommentResponse>>> {
    let mut conn = state.db()?;
    let flag = find_risk_flag(&mut conn, risk_id)?;

    let rows: Vec<(Comment, User)> = comments::table
        .inner_join(users::table)
        .filter(comments::risk_flag_id.eq(flag.id))
        .order(comments::created_at.asc())
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(comment, author)| CommentResponse {
                id: comment.id,
                risk_flag_id: comment.risk_flag_id,
                author_id: comment.author_id,
                author_username: author.username,
                body: comment.body,
                created_at: format_timestamp(comment.created_at),
            })
            .collect(),
    ))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
) -> AppResult<Json<Vec<NotificationResponse>>> {
    let mut conn = state.db()?;
    let rows: Vec<Notification> = notifications::table
        .filter(notifications::recipient_id.eq(requester.user_id))
        .order(notifications::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn unread_count(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
) -> AppResult<Json<UnreadCountResponse>> {
    let mut conn = state.db()?;
    let unread: i64 = notifications::table
        .filter(notifications::recipient_id.eq(requester.user_id))
        .filter(notifications::is_read.eq(false))
        .count()
        .get_result(&mut conn)?;

    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    diesel::update(
        notifications::table
            .filter(notifications::recipient_id.eq(requester.user_id))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(&mut conn)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Scans comment text for `@username` tokens and creates one unread
/// notification per distinct mentioned existing user. Authors never notify
/// themselves. Notifications are only ever created here, as a side effect.
fn notify_mentions(
    conn: &mut PgConnection,
    body: &str,
    author: &AuthenticatedUser,
    flag: &RiskFlag,
) -> AppResult<()> {
    let mut notified: Vec<String> = Vec::new();

    for username in mentioned_usernames(body) {
        if username.eq_ignore_ascii_case(&author.username) {
            continue;
        }
        if notified.iter().any(|seen| seen.eq_ignore_ascii_case(&username)) {
            continue;
        }

        let mentioned: Option<User> = users::table
            .filter(users::username.eq(&username))
            .first(conn)
            .optional()?;
        let Some(mentioned) = mentioned else {
            continue;
        };

        let message = format!(
            "@{} mentioned you in a comment on risk {} ({}): \"{}\"",
            author.username,
            flag.id,
            flag.entity_name.as_deref().unwrap_or("Unknown"),
            preview(body, MENTION_PREVIEW_CHARS),
        );

        diesel::insert_into(notifications::table)
            .values(&NewNotification {
                id: Uuid::new_v4(),
                recipient_id: mentioned.id,
                risk_flag_id: Some(flag.id),
                message,
                is_read: false,
            })
            .execute(conn)?;

        info!(
            mentioned = %mentioned.username,
            author = %author.username,
            "mention notification created"
        );
        notified.push(username);
    }

    Ok(())
}

fn mentioned_usernames(body: &str) -> Vec<String> {
    let pattern = Regex::new(r"@(\w+)").expect("mention pattern is valid");
    pattern
        .captures_iter(body)
        .map(|capture| capture[1].to_string())
        .collect()
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(max_chars).collect();
    shortened.push_str("...");
    shortened
}

fn find_risk_flag(conn: &mut PgConnection, risk_id: Uuid) -> AppResult<RiskFlag> {
    let flag: Option<RiskFlag> = risk_flags::table
        .find(risk_id)
        .first(conn)
        .optional()?;
    flag.ok_or_else(|| AppError::not_found_entity("risk flag", risk_id))
}
