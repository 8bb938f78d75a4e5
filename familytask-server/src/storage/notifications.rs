use chrono::Utc;
use diesel::prelude::*;
use familytask_shared::auth::Role;
use familytask_shared::domain::NotificationKind;

use super::models::Notification;
use super::{Store, StorageError, new_id, schema};

#[derive(Debug, Clone)]
pub struct NewNotificationInput {
    pub user_id: String,
    pub family_id: Option<String>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

/// A notification addressed to every parent of a family.
pub(crate) struct ParentNotice<'a> {
    pub family_id: &'a str,
    pub exclude: Option<&'a str>,
    pub kind: NotificationKind,
    pub title: &'a str,
    pub message: &'a str,
}

pub(crate) fn insert_for_parents(
    conn: &mut SqliteConnection,
    notice: &ParentNotice<'_>,
) -> Result<usize, StorageError> {
    use schema::profiles::dsl as p;
    let parents: Vec<String> = p::profiles
        .filter(p::family_id.eq(notice.family_id))
        .filter(p::role.eq(Role::Parent.as_str()))
        .select(p::id)
        .load(conn)?;
    let now = Utc::now().naive_utc();
    let rows: Vec<Notification> = parents
        .into_iter()
        .filter(|id| Some(id.as_str()) != notice.exclude)
        .map(|user_id| Notification {
            id: new_id(),
            user_id,
            family_id: Some(notice.family_id.to_string()),
            title: notice.title.to_string(),
            message: notice.message.to_string(),
            kind: notice.kind.as_str().to_string(),
            is_read: false,
            created_at: now,
        })
        .collect();
    if rows.is_empty() {
        return Ok(0);
    }
    Ok(diesel::insert_into(schema::notifications::table)
        .values(&rows)
        .execute(conn)?)
}

impl Store {
    /// Writes a single notification row. No deduplication.
    pub async fn insert_notification(
        &self,
        input: NewNotificationInput,
    ) -> Result<Notification, StorageError> {
        let row = Notification {
            id: new_id(),
            user_id: input.user_id,
            family_id: input.family_id,
            title: input.title,
            message: input.message,
            kind: input.kind.as_str().to_string(),
            is_read: false,
            created_at: Utc::now().naive_utc(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(schema::notifications::table)
                .values(&row)
                .execute(conn)?;
            Ok(row)
        })
        .await
    }

    /// Notifies every parent of `family` except `exclude`. Returns rows written.
    pub async fn notify_parents(
        &self,
        family: &str,
        exclude: Option<&str>,
        kind: NotificationKind,
        title: &str,
        message: &str,
    ) -> Result<usize, StorageError> {
        let fid = family.to_string();
        let ex = exclude.map(|s| s.to_string());
        let title = title.to_string();
        let message = message.to_string();
        self.with_conn(move |conn| {
            insert_for_parents(
                conn,
                &ParentNotice {
                    family_id: &fid,
                    exclude: ex.as_deref(),
                    kind,
                    title: &title,
                    message: &message,
                },
            )
        })
        .await
    }

    pub async fn list_notifications(
        &self,
        user: &str,
        unread_only: bool,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<Notification>, StorageError> {
        use schema::notifications::dsl as n;
        let uid = user.to_string();
        let (limit, offset) = super::page_window(page, per_page);
        self.with_conn(move |conn| {
            let mut query = n::notifications.filter(n::user_id.eq(&uid)).into_boxed();
            if unread_only {
                query = query.filter(n::is_read.eq(false));
            }
            Ok(query
                .order(n::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load::<Notification>(conn)?)
        })
        .await
    }

    pub async fn unread_count(&self, user: &str) -> Result<i64, StorageError> {
        use schema::notifications::dsl as n;
        let uid = user.to_string();
        self.with_conn(move |conn| {
            Ok(n::notifications
                .filter(n::user_id.eq(&uid))
                .filter(n::is_read.eq(false))
                .count()
                .get_result(conn)?)
        })
        .await
    }

    /// Marks one of `user`'s notifications read. `false` if it is not theirs or absent.
    pub async fn mark_read(&self, user: &str, notification: &str) -> Result<bool, StorageError> {
        use schema::notifications::dsl as n;
        let uid = user.to_string();
        let nid = notification.to_string();
        self.with_conn(move |conn| {
            let updated = diesel::update(
                n::notifications
                    .filter(n::id.eq(&nid))
                    .filter(n::user_id.eq(&uid)),
            )
            .set(n::is_read.eq(true))
            .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }

    pub async fn mark_all_read(&self, user: &str) -> Result<usize, StorageError> {
        use schema::notifications::dsl as n;
        let uid = user.to_string();
        self.with_conn(move |conn| {
            Ok(diesel::update(
                n::notifications
                    .filter(n::user_id.eq(&uid))
                    .filter(n::is_read.eq(false)),
            )
            .set(n::is_read.eq(true))
            .execute(conn)?)
        })
        .await
    }
}
