use axum::extract::{Json, Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::analysis;
use crate::auth::AuthenticatedUser;
use crate::authz::{require_capability, require_membership, ProjectAction};
use crate::error::{AppError, AppResult};
use crate::export;
use crate::models::{NewScript, Project, RiskFlag, Script};
use crate::schema::{projects, risk_flags, scripts};
use crate::state::AppState;
use crate::taxonomy::{ClearanceStatus, ScriptStatus};

use super::projects::{find_project, format_timestamp};

#[derive(Serialize)]
pub struct RiskFlagResponse {
    pub id: Uuid,
    pub category: String,
    pub sub_category: String,
    pub severity: String,
    pub status: String,
    pub entity_name: Option<String>,
    pub snippet: Option<String>,
    pub reason: Option<String>,
    pub suggestion: Option<String>,
    pub comments: Option<String>,
    pub restrictions: Option<String>,
    pub page_number: i32,
    pub is_redacted: bool,
    pub created_at: String,
}

impl From<RiskFlag> for RiskFlagResponse {
    fn from(flag: RiskFlag) -> Self {
        Self {
            id: flag.id,
            category: flag.category,
            sub_category: flag.sub_category,
            severity: flag.severity,
            status: flag.status,
            entity_name: flag.entity_name,
            snippet: flag.snippet,
            reason: flag.reason,
            suggestion: flag.suggestion,
            comments: flag.comments,
            restrictions: flag.restrictions,
            page_number: flag.page_number,
            is_redacted: flag.is_redacted,
            created_at: format_timestamp(flag.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct ScriptResponse {
    pub id: Uuid,
    pub filename: String,
    pub version_name: Option<String>,
    pub status: String,
    pub total_pages: i32,
    pub risk_count: i32,
    pub project_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: String,
    pub deleted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risks: Option<Vec<RiskFlagResponse>>,
}

impl ScriptResponse {
    fn summary(script: Script) -> Self {
        Self::build(script, None)
    }

    fn with_risks(script: Script, risks: Vec<RiskFlag>) -> Self {
        let risks = risks.into_iter().map(RiskFlagResponse::from).collect();
        Self::build(script, Some(risks))
    }

    fn build(script: Script, risks: Option<Vec<RiskFlagResponse>>) -> Self {
        Self {
            id: script.id,
            filename: script.filename,
            version_name: script.version_name,
            status: script.status,
            total_pages: script.total_pages,
            risk_count: script.risk_count,
            project_id: script.project_id,
            uploaded_by: script.uploaded_by,
            uploaded_at: format_timestamp(script.uploaded_at),
            deleted_at: script.deleted_at.map(format_timestamp),
            risks,
        }
    }
}

#[derive(Deserialize)]
pub struct RenameVersionRequest {
    pub version_name: String,
}

#[derive(Deserialize)]
pub struct RiskUpdateRequest {
    pub status: Option<String>,
    pub comments: Option<String>,
    pub restrictions: Option<String>,
    pub is_redacted: Option<bool>,
}

pub async fn list_scripts(
    State(state): State<AppState>,
    _requester: AuthenticatedUser,
) -> AppResult<Json<Vec<ScriptResponse>>> {
    let mut conn = state.db()?;
    let rows: Vec<Script> = scripts::table
        .filter(scripts::deleted_at.is_null())
        .order(scripts::uploaded_at.desc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(ScriptResponse::summary).collect()))
}

pub async fn get_script(
    State(state): State<AppState>,
    _requester: AuthenticatedUser,
    Path(script_id): Path<Uuid>,
) -> AppResult<Json<ScriptResponse>> {
    let mut conn = state.db()?;
    let script = find_script(&mut conn, script_id)?;
    let risks = load_sorted_risks(&mut conn, script.id)?;
    Ok(Json(ScriptResponse::with_risks(script, risks)))
}

/// Zero-retention scan: the uploaded bytes exist only inside the pipeline's
/// scratch file for the duration of this request.
pub async fn scan_script(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<Json<ScriptResponse>> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name = "script.pdf".to_string();
    let mut project_id: Option<Uuid> = None;
    let mut version_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart payload: {err}")))?
    {
        match field.name() {
            Some("file") => {
                if let Some(name) = field.file_name() {
                    original_name = name.to_string();
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("failed to read file: {err}")))?;
                file_bytes = Some(bytes.to_vec());
            }
            Some("project_id") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid project_id: {err}")))?;
                let parsed = raw
                    .trim()
                    .parse()
                    .map_err(|_| AppError::bad_request("project_id must be a UUID"))?;
                project_id = Some(parsed);
            }
            Some("version_name") => {
                let raw = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid version_name: {err}"))
                })?;
                version_name = Some(raw);
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| AppError::bad_request("missing file field"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("uploaded file is empty"));
    }
    let project_id = project_id.ok_or_else(|| AppError::bad_request("missing project_id field"))?;

    let script_id = {
        let mut conn = state.db()?;
        let project = find_project(&mut conn, project_id)?;

        let (_, role) = require_membership(&mut conn, project.id, requester.user_id)?;
        require_capability(role, ProjectAction::Upload).map_err(AppError::from)?;

        let version_name = match version_name.filter(|name| !name.trim().is_empty()) {
            Some(name) => name.trim().to_string(),
            None => synthesize_version_name(&mut conn, &project)?,
        };

        let new_script = NewScript {
            id: Uuid::new_v4(),
            filename: original_name.clone(),
            total_pages: 0,
            risk_count: 0,
            status: ScriptStatus::Processing.as_str().to_string(),
            version_name: Some(version_name),
            project_id: project.id,
            uploaded_by: Some(requester.user_id),
        };
        diesel::insert_into(scripts::table)
            .values(&new_script)
            .execute(&mut conn)?;

        info!(
            script = %original_name,
            project = %project.name,
            user = %requester.username,
            "script received for analysis"
        );
        new_script.id
    };

    let mut risks = analysis::run_analysis(&state, script_id, bytes).await?;
    export::sort_for_report(&mut risks);

    let mut conn = state.db()?;
    let script: Script = scripts::table.find(script_id).first(&mut conn)?;
    Ok(Json(ScriptResponse::with_risks(script, risks)))
}

pub async fn delete_script(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
    Path(script_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let script = find_script(&mut conn, script_id)?;

    let (_, role) = require_membership(&mut conn, script.project_id, requester.user_id)?;
    require_capability(role, ProjectAction::DeleteScript).map_err(AppError::from)?;

    diesel::update(scripts::table.find(script.id))
        .set(scripts::deleted_at.eq(Utc::now().naive_utc()))
        .execute(&mut conn)?;

    info!(script = %script.filename, user = %requester.username, "script soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rename_version(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
    Path(script_id): Path<Uuid>,
    Json(payload): Json<RenameVersionRequest>,
) -> AppResult<Json<ScriptResponse>> {
    let mut conn = state.db()?;
    let script = find_script(&mut conn, script_id)?;

    let (_, role) = require_membership(&mut conn, script.project_id, requester.user_id)?;
    require_capability(role, ProjectAction::RenameVersion).map_err(AppError::from)?;

    let new_name = if payload.version_name.trim().is_empty() {
        let project: Project = projects::table
            .find(script.project_id)
            .first(&mut conn)?;
        synthesize_version_name(&mut conn, &project)?
    } else {
        payload.version_name.trim().to_string()
    };

    diesel::update(scripts::table.find(script.id))
        .set(scripts::version_name.eq(&new_name))
        .execute(&mut conn)?;

    let script: Script = scripts::table.find(script.id).first(&mut conn)?;
    Ok(Json(ScriptResponse::summary(script)))
}

pub async fn update_risk(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
    Path(risk_id): Path<Uuid>,
    Json(payload): Json<RiskUpdateRequest>,
) -> AppResult<Json<RiskFlagResponse>> {
    let mut conn = state.db()?;

    let flag: Option<RiskFlag> = risk_flags::table
        .find(risk_id)
        .first(&mut conn)
        .optional()?;
    let flag = flag.ok_or_else(|| AppError::not_found_entity("risk flag", risk_id))?;

    let script: Script = scripts::table.find(flag.script_id).first(&mut conn)?;
    let (_, role) = require_membership(&mut conn, script.project_id, requester.user_id)?;
    require_capability(role, ProjectAction::EditFinding).map_err(AppError::from)?;

    if let Some(status) = &payload.status {
        let resolved = ClearanceStatus::from_str_exact(status.trim())
            .ok_or_else(|| AppError::bad_request(format!("unknown clearance status '{status}'")))?;
        diesel::update(risk_flags::table.find(flag.id))
            .set(risk_flags::status.eq(resolved.as_str()))
            .execute(&mut conn)?;
    }
    if let Some(comments) = payload.comments {
        diesel::update(risk_flags::table.find(flag.id))
            .set(risk_flags::comments.eq(comments))
            .execute(&mut conn)?;
    }
    if let Some(restrictions) = payload.restrictions {
        diesel::update(risk_flags::table.find(flag.id))
            .set(risk_flags::restrictions.eq(restrictions))
            .execute(&mut conn)?;
    }
    if let Some(redacted) = payload.is_redacted {
        diesel::update(risk_flags::table.find(flag.id))
            .set(risk_flags::is_redacted.eq(redacted))
            .execute(&mut conn)?;
        info!(
            risk_id = %flag.id,
            redacted,
            entity = flag.entity_name.as_deref().unwrap_or("Unknown"),
            "redaction toggled on risk flag"
        );
    }

    let flag: RiskFlag = risk_flags::table.find(flag.id).first(&mut conn)?;
    Ok(Json(flag.into()))
}

pub async fn export_script(
    State(state): State<AppState>,
    _requester: AuthenticatedUser,
    Path(script_id): Path<Uuid>,
) -> AppResult<(HeaderMap, Vec<u8>)> {
    let mut conn = state.db()?;
    let script = find_script(&mut conn, script_id)?;
    let risks = load_sorted_risks(&mut conn, script.id)?;

    let redacted_rows = risks.iter().filter(|risk| risk.is_redacted).count();
    let workbook = export::generate_report(&script, &risks)?;

    info!(
        script = %script.filename,
        risks = risks.len(),
        redacted_rows,
        "clearance report exported"
    );

    let filename = export::export_filename(&script);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
            .map_err(|err| AppError::internal(format!("invalid export filename: {err}")))?,
    );

    Ok((headers, workbook))
}

/// Blank labels synthesize as `Draft n`, where n counts only active versions
/// and is recomputed from the database at use time.
fn synthesize_version_name(conn: &mut PgConnection, project: &Project) -> AppResult<String> {
    let active: i64 = scripts::table
        .filter(scripts::project_id.eq(project.id))
        .filter(scripts::deleted_at.is_null())
        .count()
        .get_result(conn)?;
    Ok(format!("Draft {}", active + 1))
}

fn find_script(conn: &mut PgConnection, script_id: Uuid) -> AppResult<Script> {
    let script: Option<Script> = scripts::table
        .find(script_id)
        .first(conn)
        .optional()?;
    script.ok_or_else(|| AppError::not_found_entity("script", script_id))
}

fn load_sorted_risks(conn: &mut PgConnection, script_id: Uuid) -> AppResult<Vec<RiskFlag>> {
    let mut risks: Vec<RiskFlag> = risk_flags::table
        .filter(risk_flags::script_id.eq(script_id))
        .load(conn)?;
    export::sort_for_report(&mut risks);
    Ok(risks)
}
