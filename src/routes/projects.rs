use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::authz::{require_capability, require_membership, AuthzError, ProjectAction, ProjectRole};
use crate::error::{AppError, AppResult};
use crate::models::{NewProject, NewProjectMember, Project, ProjectMember, Script, User};
use crate::schema::{project_members, projects, risk_flags, scripts, users};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct MemberInvite {
    pub user_id: Uuid,
    pub project_role: String,
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub studio_name: Option<String>,
    pub director: Option<String>,
    pub producer: Option<String>,
    pub production_email: Option<String>,
    pub production_phone: Option<String>,
    pub genre: Option<String>,
    pub logline: Option<String>,
    pub expected_release: Option<String>,
    pub imdb_link: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberInvite>,
}

/// Patch semantics: absent fields are left untouched.
#[derive(Deserialize, AsChangeset)]
#[diesel(table_name = projects)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub studio_name: Option<String>,
    pub director: Option<String>,
    pub producer: Option<String>,
    pub production_email: Option<String>,
    pub production_phone: Option<String>,
    pub genre: Option<String>,
    pub logline: Option<String>,
    pub expected_release: Option<String>,
    pub imdb_link: Option<String>,
    pub notes: Option<String>,
}

impl UpdateProjectRequest {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.studio_name.is_none()
            && self.director.is_none()
            && self.producer.is_none()
            && self.production_email.is_none()
            && self.production_phone.is_none()
            && self.genre.is_none()
            && self.logline.is_none()
            && self.expected_release.is_none()
            && self.imdb_link.is_none()
            && self.notes.is_none()
    }
}

#[derive(Serialize)]
pub struct MemberResponse {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub project_role: String,
    pub joined_at: String,
}

#[derive(Serialize)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub name: String,
    pub studio_name: Option<String>,
    pub director: Option<String>,
    pub producer: Option<String>,
    pub production_email: Option<String>,
    pub production_phone: Option<String>,
    pub genre: Option<String>,
    pub logline: Option<String>,
    pub expected_release: Option<String>,
    pub imdb_link: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: String,
    pub deleted_at: Option<String>,
    pub members: Vec<MemberResponse>,
}

#[derive(Serialize)]
pub struct TimelineEntry {
    pub script_id: Uuid,
    pub filename: String,
    pub version_name: Option<String>,
    pub status: String,
    pub total_pages: i32,
    pub risk_count: i32,
    pub high_count: i64,
    pub uploaded_at: String,
}

#[derive(Serialize)]
pub struct ProjectTimeline {
    pub project_id: Uuid,
    pub project_name: String,
    pub studio_name: Option<String>,
    pub versions: Vec<TimelineEntry>,
    pub total_versions: usize,
    pub total_high_risks: i64,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub id: Uuid,
}

pub async fn create_project(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
    Json(payload): Json<CreateProjectRequest>,
) -> AppResult<(StatusCode, Json<ProjectResponse>)> {
    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("project name must not be empty"));
    }

    for invite in &payload.members {
        if ProjectRole::from_str_exact(&invite.project_role).is_none() {
            return Err(AppError::bad_request(format!(
                "unknown project role '{}'",
                invite.project_role
            )));
        }
    }

    let mut conn = state.db()?;

    let new_project = NewProject {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        studio_name: payload.studio_name,
        director: payload.director,
        producer: payload.producer,
        production_email: payload.production_email,
        production_phone: payload.production_phone,
        genre: payload.genre,
        logline: payload.logline,
        expected_release: payload.expected_release,
        imdb_link: payload.imdb_link,
        notes: payload.notes,
        created_by: Some(requester.user_id),
    };

    diesel::insert_into(projects::table)
        .values(&new_project)
        .execute(&mut conn)?;

    // The creator is always a member, always as ATTORNEY.
    diesel::insert_into(project_members::table)
        .values(&NewProjectMember {
            id: Uuid::new_v4(),
            project_id: new_project.id,
            user_id: requester.user_id,
            project_role: ProjectRole::Attorney.as_str().to_string(),
        })
        .execute(&mut conn)?;

    for invite in payload
        .members
        .iter()
        .filter(|invite| invite.user_id != requester.user_id)
    {
        let exists: i64 = users::table
            .find(invite.user_id)
            .count()
            .get_result(&mut conn)?;
        if exists == 0 {
            continue;
        }

        let already: i64 = project_members::table
            .filter(project_members::project_id.eq(new_project.id))
            .filter(project_members::user_id.eq(invite.user_id))
            .count()
            .get_result(&mut conn)?;
        if already > 0 {
            continue;
        }

        diesel::insert_into(project_members::table)
            .values(&NewProjectMember {
                id: Uuid::new_v4(),
                project_id: new_project.id,
                user_id: invite.user_id,
                project_role: invite.project_role.clone(),
            })
            .execute(&mut conn)?;
    }

    let project: Project = projects::table.find(new_project.id).first(&mut conn)?;
    info!(project = %project.name, creator = %requester.username, "project created");

    let response = project_response(&mut conn, project)?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_projects(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
) -> AppResult<Json<Vec<ProjectResponse>>> {
    let mut conn = state.db()?;

    let rows: Vec<Project> = projects::table
        .inner_join(project_members::table)
        .filter(project_members::user_id.eq(requester.user_id))
        .filter(projects::deleted_at.is_null())
        .order(projects::created_at.desc())
        .select(projects::all_columns)
        .load(&mut conn)?;

    let mut responses = Vec::with_capacity(rows.len());
    for project in rows {
        responses.push(project_response(&mut conn, project)?);
    }
    Ok(Json(responses))
}

pub async fn get_project(
    State(state): State<AppState>,
    _requester: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<ProjectResponse>> {
    let mut conn = state.db()?;
    let project = find_project(&mut conn, project_id)?;
    let response = project_response(&mut conn, project)?;
    Ok(Json(response))
}

pub async fn get_timeline(
    State(state): State<AppState>,
    _requester: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<ProjectTimeline>> {
    let mut conn = state.db()?;
    let project = find_project(&mut conn, project_id)?;

    let versions: Vec<Script> = scripts::table
        .filter(scripts::project_id.eq(project.id))
        .filter(scripts::deleted_at.is_null())
        .order(scripts::uploaded_at.desc())
        .load(&mut conn)?;

    let script_ids: Vec<Uuid> = versions.iter().map(|script| script.id).collect();
    let high_flags: Vec<Uuid> = risk_flags::table
        .filter(risk_flags::script_id.eq_any(&script_ids))
        .filter(risk_flags::severity.eq("HIGH"))
        .select(risk_flags::script_id)
        .load(&mut conn)?;

    let entries: Vec<TimelineEntry> = versions
        .into_iter()
        .map(|script| {
            let high_count = high_flags.iter().filter(|id| **id == script.id).count() as i64;
            TimelineEntry {
                script_id: script.id,
                filename: script.filename,
                version_name: script.version_name,
                status: script.status,
                total_pages: script.total_pages,
                risk_count: script.risk_count,
                high_count,
                uploaded_at: format_timestamp(script.uploaded_at),
            }
        })
        .collect();

    let total_high_risks = entries.iter().map(|entry| entry.high_count).sum();

    Ok(Json(ProjectTimeline {
        project_id: project.id,
        project_name: project.name,
        studio_name: project.studio_name,
        total_versions: entries.len(),
        total_high_risks,
        versions: entries,
    }))
}

pub async fn update_project(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> AppResult<Json<ProjectResponse>> {
    let mut conn = state.db()?;
    let project = find_project(&mut conn, project_id)?;

    let (_, role) = require_membership(&mut conn, project.id, requester.user_id)?;
    require_capability(role, ProjectAction::EditFinding).map_err(AppError::from)?;

    let mut payload = payload;
    if let Some(name) = payload.name.take() {
        let trimmed = name.trim().to_string();
        if trimmed.is_empty() {
            return Err(AppError::bad_request("project name must not be empty"));
        }
        payload.name = Some(trimmed);
    }

    if !payload.is_empty() {
        diesel::update(projects::table.find(project.id))
            .set(&payload)
            .execute(&mut conn)?;
    }

    let project: Project = projects::table.find(project.id).first(&mut conn)?;
    let response = project_response(&mut conn, project)?;
    Ok(Json(response))
}

pub async fn delete_project(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<DeleteResponse>> {
    let mut conn = state.db()?;
    let project = find_project(&mut conn, project_id)?;

    let (_, role) = require_membership(&mut conn, project.id, requester.user_id)?;
    require_capability(role, ProjectAction::DeleteProject).map_err(AppError::from)?;

    // Same instant for the project and every script under it.
    let now = Utc::now().naive_utc();
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::update(projects::table.find(project.id))
            .set(projects::deleted_at.eq(now))
            .execute(conn)?;
        diesel::update(scripts::table.filter(scripts::project_id.eq(project.id)))
            .set(scripts::deleted_at.eq(now))
            .execute(conn)?;
        Ok(())
    })?;

    info!(project = %project.name, user = %requester.username, "project soft-deleted");

    Ok(Json(DeleteResponse {
        message: "Project deleted successfully".to_string(),
        id: project.id,
    }))
}

pub async fn add_member(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
    Json(invite): Json<MemberInvite>,
) -> AppResult<(StatusCode, Json<MemberResponse>)> {
    let mut conn = state.db()?;
    let project = find_project(&mut conn, project_id)?;

    let invited_role = ProjectRole::from_str_exact(&invite.project_role).ok_or_else(|| {
        AppError::bad_request(format!("unknown project role '{}'", invite.project_role))
    })?;

    let (_, role) = require_membership(&mut conn, project.id, requester.user_id)?;
    require_capability(role, ProjectAction::ManageMembers).map_err(AppError::from)?;
    if invited_role == ProjectRole::Viewer {
        require_capability(role, ProjectAction::AddViewer).map_err(AppError::from)?;
    }

    let target: Option<User> = users::table.find(invite.user_id).first(&mut conn).optional()?;
    let target = target.ok_or_else(|| AppError::not_found_entity("user", invite.user_id))?;

    let already: i64 = project_members::table
        .filter(project_members::project_id.eq(project.id))
        .filter(project_members::user_id.eq(target.id))
        .count()
        .get_result(&mut conn)?;
    if already > 0 {
        return Err(AuthzError::AlreadyMember.into());
    }

    let new_member = NewProjectMember {
        id: Uuid::new_v4(),
        project_id: project.id,
        user_id: target.id,
        project_role: invited_role.as_str().to_string(),
    };
    diesel::insert_into(project_members::table)
        .values(&new_member)
        .execute(&mut conn)?;

    let member: ProjectMember = project_members::table.find(new_member.id).first(&mut conn)?;

    Ok((
        StatusCode::CREATED,
        Json(MemberResponse {
            user_id: target.id,
            username: target.username,
            email: target.email,
            project_role: member.project_role,
            joined_at: format_timestamp(member.joined_at),
        }),
    ))
}

pub async fn remove_member(
    State(state): State<AppState>,
    requester: AuthenticatedUser,
    Path((project_id, target_user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let project = find_project(&mut conn, project_id)?;

    let (_, role) = require_membership(&mut conn, project.id, requester.user_id)?;
    require_capability(role, ProjectAction::ManageMembers).map_err(AppError::from)?;

    if project.created_by == Some(target_user_id) {
        return Err(AuthzError::CannotRemoveCreator.into());
    }

    diesel::delete(
        project_members::table
            .filter(project_members::project_id.eq(project.id))
            .filter(project_members::user_id.eq(target_user_id)),
    )
    .execute(&mut conn)?;

    info!(project = %project.name, user_id = %target_user_id, "member removed");

    Ok(StatusCode::NO_CONTENT)
}

pub(super) fn find_project(
    conn: &mut PgConnection,
    project_id: Uuid,
) -> AppResult<Project> {
    let project: Option<Project> = projects::table
        .find(project_id)
        .filter(projects::deleted_at.is_null())
        .first(conn)
        .optional()?;
    project.ok_or_else(|| AppError::not_found_entity("project", project_id))
}

pub(super) fn format_timestamp(value: NaiveDateTime) -> String {
    value.and_utc().to_rfc3339()
}

fn project_response(conn: &mut PgConnection, project: Project) -> AppResult<ProjectResponse> {
    let members: Vec<(ProjectMember, User)> = project_members::table
        .inner_join(users::table)
        .filter(project_members::project_id.eq(project.id))
        .order(project_members::joined_at.asc())
        .load(conn)?;

    Ok(ProjectResponse {
        id: project.id,
        name: project.name,
        studio_name: project.studio_name,
        director: project.director,
        producer: project.producer,
        production_email: project.production_email,
        production_phone: project.production_phone,
        genre: project.genre,
        logline: project.logline,
        expected_release: project.expected_release,
        imdb_link: project.imdb_link,
        notes: project.notes,
        created_by: project.created_by,
        created_at: format_timestamp(project.created_at),
        deleted_at: project.deleted_at.map(format_timestamp),
        members: members
            .into_iter()
            .map(|(member, user)| MemberResponse {
                user_id: user.id,
                username: user.username,
                email: user.email,
                project_role: member.project_role,
                joined_at: format_timestamp(member.joined_at),
            })
            .collect(),
    })
}
