use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use familytask_shared::auth::Role;
use familytask_shared::domain::MAX_PARENTS_PER_FAMILY;

use super::models::{Family, NewFamily, NewProfile, Profile};
use super::{Store, StorageError, new_id, schema};

#[derive(Debug, Clone)]
pub struct NewProfileInput {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
}

/// Counts parents of `family`, leaving out `except` when given.
fn parent_count(
    conn: &mut SqliteConnection,
    family: &str,
    except: Option<&str>,
) -> Result<i64, StorageError> {
    use schema::profiles::dsl as p;
    let mut query = p::profiles
        .filter(p::family_id.eq(family))
        .filter(p::role.eq(Role::Parent.as_str()))
        .into_boxed();
    if let Some(uid) = except {
        query = query.filter(p::id.ne(uid));
    }
    Ok(query.count().get_result(conn)?)
}

impl Store {
    pub async fn create_profile(&self, input: NewProfileInput) -> Result<Profile, StorageError> {
        use schema::profiles::dsl as p;
        self.with_conn(move |conn| {
            let id = new_id();
            let now = Utc::now().naive_utc();
            let row = NewProfile {
                id: &id,
                email: &input.email,
                password_hash: &input.password_hash,
                full_name: &input.full_name,
                role: input.role.as_str(),
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(p::profiles)
                .values(&row)
                .execute(conn)
                .map_err(|e| StorageError::unique_as_conflict(e, "email"))?;
            Ok(p::profiles.filter(p::id.eq(&id)).first::<Profile>(conn)?)
        })
        .await
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StorageError> {
        use schema::profiles::dsl as p;
        let uid = user_id.to_string();
        self.with_conn(move |conn| {
            Ok(p::profiles
                .filter(p::id.eq(&uid))
                .first::<Profile>(conn)
                .optional()?)
        })
        .await
    }

    pub async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StorageError> {
        use schema::profiles::dsl as p;
        let mail = email.to_string();
        self.with_conn(move |conn| {
            Ok(p::profiles
                .filter(p::email.eq(&mail))
                .first::<Profile>(conn)
                .optional()?)
        })
        .await
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        full_name: Option<String>,
        profile_image: Option<Option<String>>,
    ) -> Result<Option<Profile>, StorageError> {
        use schema::profiles::dsl as p;
        let uid = user_id.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<Option<Profile>, StorageError> {
                let Some(current) = p::profiles
                    .filter(p::id.eq(&uid))
                    .first::<Profile>(conn)
                    .optional()?
                else {
                    return Ok(None);
                };
                let name = full_name.unwrap_or(current.full_name);
                let image = profile_image.unwrap_or(current.profile_image);
                diesel::update(p::profiles.filter(p::id.eq(&uid)))
                    .set((
                        p::full_name.eq(&name),
                        p::profile_image.eq(image.as_deref()),
                        p::updated_at.eq(Utc::now().naive_utc()),
                    ))
                    .execute(conn)?;
                Ok(Some(p::profiles.filter(p::id.eq(&uid)).first::<Profile>(conn)?))
            })
        })
        .await
    }

    /// Total number of registered profiles.
    pub async fn count_profiles(&self) -> Result<i64, StorageError> {
        use schema::profiles::dsl as p;
        self.with_conn(|conn| Ok(p::profiles.count().get_result(conn)?))
            .await
    }

    pub async fn list_family_members(&self, family: &str) -> Result<Vec<Profile>, StorageError> {
        use schema::profiles::dsl as p;
        let fid = family.to_string();
        self.with_conn(move |conn| {
            Ok(p::profiles
                .filter(p::family_id.eq(&fid))
                .order((p::role.desc(), p::full_name.asc()))
                .load::<Profile>(conn)?)
        })
        .await
    }

    pub async fn get_family(&self, family: &str) -> Result<Option<Family>, StorageError> {
        use schema::families::dsl as f;
        let fid = family.to_string();
        self.with_conn(move |conn| {
            Ok(f::families
                .filter(f::id.eq(&fid))
                .first::<Family>(conn)
                .optional()?)
        })
        .await
    }

    pub async fn count_parents(&self, family: &str) -> Result<i64, StorageError> {
        let fid = family.to_string();
        self.with_conn(move |conn| parent_count(conn, &fid, None))
            .await
    }

    /// Inserts the family and links its owner in one transaction; either both
    /// rows change or neither does.
    pub async fn create_family(
        &self,
        owner: &str,
        family: Option<&str>,
    ) -> Result<Family, StorageError> {
        use schema::families::dsl as f;
        use schema::profiles::dsl as p;
        let owner = owner.to_string();
        let fid = family.map(|s| s.to_string()).unwrap_or_else(new_id);
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<Family, StorageError> {
                let profile = p::profiles
                    .filter(p::id.eq(&owner))
                    .first::<Profile>(conn)
                    .optional()?
                    .ok_or(StorageError::NotFound("profile"))?;
                if profile.role()? != Role::Parent {
                    return Err(StorageError::InvalidInput(
                        "only parents can create a family".into(),
                    ));
                }
                if let Some(existing) = &profile.family_id {
                    return Err(StorageError::Conflict(format!(
                        "profile already belongs to family {existing}"
                    )));
                }
                let now = Utc::now().naive_utc();
                diesel::insert_into(f::families)
                    .values(&NewFamily {
                        id: &fid,
                        owner_id: &owner,
                        created_at: now,
                    })
                    .execute(conn)
                    .map_err(|e| StorageError::unique_as_conflict(e, "family"))?;
                diesel::update(p::profiles.filter(p::id.eq(&owner)))
                    .set((p::family_id.eq(Some(fid.as_str())), p::updated_at.eq(now)))
                    .execute(conn)?;
                Ok(f::families.filter(f::id.eq(&fid)).first::<Family>(conn)?)
            })
        })
        .await
    }

    /// Points `user`'s profile at `family`.
    ///
    /// The profile must carry `role`. For parents the two-parent cap is checked
    /// and the write performed under one `BEGIN IMMEDIATE`, so concurrent
    /// joins are serialized by SQLite's write lock.
    pub async fn link_to_family(
        &self,
        user: &str,
        family: &str,
        role: Role,
    ) -> Result<Profile, StorageError> {
        use schema::families::dsl as f;
        use schema::profiles::dsl as p;
        let uid = user.to_string();
        let fid = family.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<Profile, StorageError> {
                let exists: i64 = f::families
                    .filter(f::id.eq(&fid))
                    .count()
                    .get_result(conn)?;
                if exists == 0 {
                    return Err(StorageError::NotFound("family"));
                }
                let profile = p::profiles
                    .filter(p::id.eq(&uid))
                    .first::<Profile>(conn)
                    .optional()?
                    .ok_or(StorageError::NotFound("profile"))?;
                if profile.role()? != role {
                    return Err(StorageError::InvalidInput(format!(
                        "profile is not a {}",
                        role
                    )));
                }
                if role == Role::Parent
                    && parent_count(conn, &fid, Some(&uid))? >= MAX_PARENTS_PER_FAMILY
                {
                    return Err(StorageError::CapacityExceeded(fid.clone()));
                }
                diesel::update(p::profiles.filter(p::id.eq(&uid)))
                    .set((
                        p::family_id.eq(Some(fid.as_str())),
                        p::updated_at.eq(Utc::now().naive_utc()),
                    ))
                    .execute(conn)?;
                Ok(p::profiles.filter(p::id.eq(&uid)).first::<Profile>(conn)?)
            })
        })
        .await
    }

    /// Sets the end of a family's premium window. Returns `false` for unknown families.
    pub async fn set_premium_until(
        &self,
        family: &str,
        until: Option<NaiveDateTime>,
    ) -> Result<bool, StorageError> {
        use schema::families::dsl as f;
        let fid = family.to_string();
        self.with_conn(move |conn| {
            let updated = diesel::update(f::families.filter(f::id.eq(&fid)))
                .set(f::premium_until.eq(until))
                .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }
}
