use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::domain::NotificationKind;

pub mod endpoints;

pub const API_PREFIX: &str = "/api";

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResp {
    pub success: bool,
}

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginReq {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterReq {
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
    pub user_id: String,
    pub role: Role,
}

// Profile
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileDto {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub family_id: Option<String>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateProfileReq {
    pub full_name: Option<String>,
    pub profile_image: Option<String>,
}

// Family
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateFamilyReq {
    pub family_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateFamilyResp {
    pub success: bool,
    pub family_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkFamilyReq {
    pub user_id: Option<String>,
    pub family_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkFamilyResp {
    pub success: bool,
    pub user_id: String,
    pub family_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateFamilyReq {
    pub family_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateFamilyResp {
    pub valid: bool,
    pub parent_count: i64,
    pub parent_slots_left: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FamilyMemberDto {
    pub id: String,
    pub full_name: String,
    pub role: Role,
    pub profile_image: Option<String>,
}

// Tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDto {
    pub id: String,
    pub family_id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub completed: bool,
    pub approved: bool,
    pub due_date: Option<String>, // YYYY-MM-DD
    pub created_at: String,       // RFC3339 UTC
    pub updated_at: String,       // RFC3339 UTC
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateTaskReq {
    pub title: Option<String>,
    pub points: Option<i32>,
    pub description: Option<String>,
    pub assigned_to: Option<String>,
    pub due_date: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateTaskReq {
    pub id: Option<String>,
    pub title: Option<String>,
    pub points: Option<i32>,
    pub description: Option<String>,
    pub assigned_to: Option<String>,
    pub due_date: Option<String>,
    pub completed: Option<bool>,
    pub approved: Option<bool>,
}

// Rewards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardDto {
    pub id: String,
    pub family_id: String,
    pub title: String,
    pub description: Option<String>,
    pub points_required: i32,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateRewardReq {
    pub title: Option<String>,
    pub points_required: Option<i32>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemResp {
    pub success: bool,
    pub redemption_id: String,
    pub points_spent: i32,
    pub balance: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedemptionDto {
    pub id: String,
    pub reward_id: String,
    pub reward_title: String,
    pub child_id: String,
    pub points_spent: i32,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PointsDto {
    pub child_id: String,
    pub balance: i64,
}

// Notifications
#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationDto {
    pub id: String,
    pub user_id: String,
    pub family_id: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationCountDto {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResp {
    pub success: bool,
    pub updated: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminNotificationReq {
    pub user_id: Option<String>,
    pub family_id: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<NotificationKind>,
}

// Account status
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationLimitDto {
    pub allowed: bool,
    pub current_count: Option<i64>,
    pub max_users: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PremiumDto {
    pub is_premium: bool,
    pub family_id: Option<String>,
    pub premium_until: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CheckoutReq {
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResp {
    pub session_id: String,
    pub url: String,
}

// Health
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub database: bool,
    pub jwt_secret: bool,
    pub service_role_key: bool,
    pub payments: bool,
}
