use crate::storage::schema::{
    families, notifications, point_awards, profiles, redemptions, rewards, sessions, tasks,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use familytask_shared::auth::Role;

use super::StorageError;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = families)]
pub struct Family {
    pub id: String,
    pub owner_id: String,
    pub premium_until: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = families)]
pub struct NewFamily<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub family_id: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Profile {
    pub fn role(&self) -> Result<Role, StorageError> {
        self.role
            .parse::<Role>()
            .map_err(|e| StorageError::Corrupt(format!("profile {}: {}", self.id, e)))
    }
}

#[derive(Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub role: &'a str,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A task row. Also the record type held by the in-memory task repository.
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Insertable)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: String,
    pub family_id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub completed: bool,
    pub approved: bool,
    pub due_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = point_awards)]
pub struct NewPointAward<'a> {
    pub child_id: &'a str,
    pub task_id: &'a str,
    pub points: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable)]
#[diesel(table_name = rewards)]
pub struct Reward {
    pub id: String,
    pub family_id: String,
    pub title: String,
    pub description: Option<String>,
    pub points_required: i32,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable)]
#[diesel(table_name = redemptions)]
pub struct Redemption {
    pub id: String,
    pub reward_id: String,
    pub child_id: String,
    pub points_spent: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub family_id: Option<String>,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub user_id: &'a str,
}
