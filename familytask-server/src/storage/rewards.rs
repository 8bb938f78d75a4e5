use chrono::Utc;
use diesel::dsl::sum;
use diesel::prelude::*;
use familytask_shared::domain::NotificationKind;

use super::models::{Redemption, Reward};
use super::notifications::{ParentNotice, insert_for_parents};
use super::{Store, StorageError, new_id, schema};

#[derive(Debug, Clone)]
pub struct NewRewardInput {
    pub family_id: String,
    pub title: String,
    pub description: Option<String>,
    pub points_required: i32,
    pub created_by: String,
}

/// Earned minus spent. May not go negative through redemptions, but older
/// rows patched by hand can leave it below zero; the value is reported as is.
fn balance_of(conn: &mut SqliteConnection, child: &str) -> Result<i64, StorageError> {
    use schema::point_awards::dsl as pa;
    use schema::redemptions::dsl as rd;
    let earned: Option<i64> = pa::point_awards
        .filter(pa::child_id.eq(child))
        .select(sum(pa::points))
        .first::<Option<i64>>(conn)?;
    let spent: Option<i64> = rd::redemptions
        .filter(rd::child_id.eq(child))
        .select(sum(rd::points_spent))
        .first::<Option<i64>>(conn)?;
    Ok(earned.unwrap_or(0) - spent.unwrap_or(0))
}

impl Store {
    pub async fn list_rewards(&self, family: &str) -> Result<Vec<Reward>, StorageError> {
        use schema::rewards::dsl as r;
        let fid = family.to_string();
        self.with_conn(move |conn| {
            Ok(r::rewards
                .filter(r::family_id.eq(&fid))
                .order((r::points_required.asc(), r::title.asc()))
                .load::<Reward>(conn)?)
        })
        .await
    }

    pub async fn create_reward(&self, input: NewRewardInput) -> Result<Reward, StorageError> {
        let reward = Reward {
            id: new_id(),
            family_id: input.family_id,
            title: input.title,
            description: input.description,
            points_required: input.points_required,
            created_by: input.created_by,
            created_at: Utc::now().naive_utc(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(schema::rewards::table)
                .values(&reward)
                .execute(conn)?;
            Ok(reward)
        })
        .await
    }

    pub async fn points_balance(&self, child: &str) -> Result<i64, StorageError> {
        let cid = child.to_string();
        self.with_conn(move |conn| balance_of(conn, &cid)).await
    }

    /// Spends `child`'s points on a reward of `family` and tells the parents.
    ///
    /// Balance check, redemption insert and notification fan-out share one
    /// immediate transaction. Returns the redemption and the balance after it.
    pub async fn redeem_reward(
        &self,
        family: &str,
        child: &str,
        child_name: &str,
        reward: &str,
    ) -> Result<(Redemption, Reward, i64), StorageError> {
        use schema::rewards::dsl as r;
        let fid = family.to_string();
        let cid = child.to_string();
        let name = child_name.to_string();
        let rid = reward.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(Redemption, Reward, i64), StorageError> {
                let reward = r::rewards
                    .filter(r::id.eq(&rid))
                    .filter(r::family_id.eq(&fid))
                    .first::<Reward>(conn)
                    .optional()?
                    .ok_or(StorageError::NotFound("reward"))?;
                let balance = balance_of(conn, &cid)?;
                if balance < i64::from(reward.points_required) {
                    return Err(StorageError::InvalidInput(format!(
                        "insufficient points: {} available, {} required",
                        balance, reward.points_required
                    )));
                }
                let now = Utc::now().naive_utc();
                let redemption = Redemption {
                    id: new_id(),
                    reward_id: reward.id.clone(),
                    child_id: cid.clone(),
                    points_spent: reward.points_required,
                    created_at: now,
                };
                diesel::insert_into(schema::redemptions::table)
                    .values(&redemption)
                    .execute(conn)?;
                insert_for_parents(
                    conn,
                    &ParentNotice {
                        family_id: &fid,
                        exclude: None,
                        kind: NotificationKind::RewardRedeemed,
                        title: "Reward redeemed",
                        message: &format!(
                            "{} redeemed \"{}\" for {} points",
                            name, reward.title, reward.points_required
                        ),
                    },
                )?;
                let after = balance - i64::from(reward.points_required);
                Ok((redemption, reward, after))
            })
        })
        .await
    }

    /// Redemptions in `family`, newest first. Pages start at 1.
    pub async fn list_redemptions(
        &self,
        family: &str,
        child: Option<&str>,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<(Redemption, String)>, StorageError> {
        use schema::redemptions::dsl as rd;
        use schema::rewards::dsl as r;
        let fid = family.to_string();
        let cid = child.map(|s| s.to_string());
        let (limit, offset) = super::page_window(page, per_page);
        self.with_conn(move |conn| {
            let mut query = rd::redemptions
                .inner_join(r::rewards)
                .filter(r::family_id.eq(&fid))
                .select((
                    (
                        rd::id,
                        rd::reward_id,
                        rd::child_id,
                        rd::points_spent,
                        rd::created_at,
                    ),
                    r::title,
                ))
                .into_boxed();
            if let Some(c) = &cid {
                query = query.filter(rd::child_id.eq(c));
            }
            Ok(query
                .order(rd::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load::<(Redemption, String)>(conn)?)
        })
        .await
    }
}
