use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = projects)]
pub struct Project {
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
    pub created_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = projects)]
pub struct NewProject {
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
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = project_members)]
#[diesel(belongs_to(Project))]
#[diesel(belongs_to(User))]
pub struct ProjectMember {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub project_role: String,
    pub joined_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = project_members)]
pub struct NewProjectMember {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub project_role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = scripts)]
#[diesel(belongs_to(Project))]
pub struct Script {
    pub id: Uuid,
    pub filename: String,
    pub total_pages: i32,
    pub risk_count: i32,
    pub status: String,
    pub version_name: Option<String>,
    pub project_id: Uuid,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = scripts)]
pub struct NewScript {
    pub id: Uuid,
    pub filename: String,
    pub total_pages: i32,
    pub risk_count: i32,
    pub status: String,
    pub version_name: Option<String>,
    pub project_id: Uuid,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = risk_flags)]
#[diesel(belongs_to(Script))]
pub struct RiskFlag {
    pub id: Uuid,
    pub script_id: Uuid,
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
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = risk_flags)]
pub struct NewRiskFlag {
    pub id: Uuid,
    pub script_id: Uuid,
    pub category: String,
    pub sub_category: String,
    pub severity: String,
    pub status: String,
    pub entity_name: Option<String>,
    pub snippet: Option<String>,
    pub reason: Option<String>,
    pub suggestion: Option<String>,
    pub page_number: i32,
    pub is_redacted: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = comments)]
#[diesel(belongs_to(RiskFlag))]
pub struct Comment {
    pub id: Uuid,
    pub risk_flag_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment {
    pub id: Uuid,
    pub risk_flag_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub risk_flag_id: Option<Uuid>,
    pub message: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub risk_flag_id: Option<Uuid>,
    pub message: String,
    pub is_read: bool,
}
