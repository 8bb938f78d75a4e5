use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::API_PREFIX;

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn api(base: &str, suffix: &str) -> String {
    base_join(base, &format!("{}/{}", API_PREFIX, suffix))
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn health(base: &str) -> String {
    api(base, "health")
}
pub fn auth_login(base: &str) -> String {
    api(base, "auth/login")
}
pub fn auth_register(base: &str) -> String {
    api(base, "auth/register")
}
pub fn auth_logout(base: &str) -> String {
    api(base, "auth/logout")
}
pub fn profile(base: &str) -> String {
    api(base, "profile")
}

pub fn family_create(base: &str) -> String {
    api(base, "family/create")
}
pub fn family_link_child(base: &str) -> String {
    api(base, "family/link-child")
}
pub fn family_link_parent(base: &str) -> String {
    api(base, "family/link-parent")
}
pub fn family_validate(base: &str) -> String {
    api(base, "family/validate")
}
pub fn family_members(base: &str) -> String {
    api(base, "family/members")
}

pub fn tasks(base: &str) -> String {
    api(base, "tasks")
}
pub fn rewards(base: &str) -> String {
    api(base, "rewards")
}
pub fn reward_redeem(base: &str, reward_id: &str) -> String {
    api(base, &format!("rewards/{}/redeem", enc(reward_id)))
}
pub fn redemptions(base: &str) -> String {
    api(base, "redemptions")
}
pub fn child_points(base: &str, child_id: &str) -> String {
    api(base, &format!("children/{}/points", enc(child_id)))
}

pub fn notifications(base: &str) -> String {
    api(base, "notifications")
}
pub fn notifications_count(base: &str) -> String {
    api(base, "notifications/count")
}
pub fn notification_read(base: &str, notification_id: &str) -> String {
    api(base, &format!("notifications/{}/read", enc(notification_id)))
}
pub fn notifications_read_all(base: &str) -> String {
    api(base, "notifications/read-all")
}
pub fn admin_notifications(base: &str) -> String {
    api(base, "admin/notifications")
}

pub fn registration_limit(base: &str) -> String {
    api(base, "check-registration-limit")
}
pub fn premium(base: &str) -> String {
    api(base, "check-premium")
}
pub fn checkout(base: &str) -> String {
    api(base, "checkout")
}
