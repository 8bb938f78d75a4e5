//! Consistency checks over rows that the request path cannot reach on its own:
//! profiles pointing at deleted families, families nobody belongs to, data
//! imported before the parent cap existed, and expired sessions.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use familytask_shared::auth::Role;
use familytask_shared::domain::MAX_PARENTS_PER_FAMILY;
use serde::Serialize;

use super::{Store, StorageError, schema};

#[derive(Debug, Default, Serialize)]
pub struct DiagnosticReport {
    /// Families with no member profile.
    pub orphaned_families: Vec<String>,
    /// `(profile_id, family_id)` pairs whose family row is missing.
    pub dangling_family_refs: Vec<(String, String)>,
    /// `(family_id, parent_count)` above the cap.
    pub over_capacity_families: Vec<(String, i64)>,
    /// Tasks assigned to a profile outside the task's family.
    pub misassigned_tasks: Vec<String>,
    /// Sessions idle longer than the cutoff.
    pub stale_sessions: i64,
}

impl DiagnosticReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_families.is_empty()
            && self.dangling_family_refs.is_empty()
            && self.over_capacity_families.is_empty()
            && self.misassigned_tasks.is_empty()
            && self.stale_sessions == 0
    }
}

#[derive(Debug, Default, Serialize)]
pub struct RepairSummary {
    pub cleared_family_refs: usize,
    pub deleted_families: usize,
    pub unassigned_tasks: usize,
    pub purged_sessions: usize,
}

fn scan(conn: &mut SqliteConnection, idle_days: i64) -> Result<DiagnosticReport, StorageError> {
    use schema::families::dsl as f;
    use schema::profiles::dsl as p;
    use schema::sessions::dsl as s;
    use schema::tasks::dsl as t;

    let family_ids: HashSet<String> = f::families
        .select(f::id)
        .load::<String>(conn)?
        .into_iter()
        .collect();
    let members: Vec<(String, String, Option<String>)> = p::profiles
        .select((p::id, p::role, p::family_id))
        .load(conn)?;

    let mut report = DiagnosticReport::default();
    let mut member_family: HashMap<String, String> = HashMap::new();
    let mut populated: HashSet<String> = HashSet::new();
    let mut parents: HashMap<String, i64> = HashMap::new();
    for (id, role, family) in members {
        let Some(family) = family else { continue };
        if !family_ids.contains(&family) {
            report.dangling_family_refs.push((id, family));
            continue;
        }
        if role == Role::Parent.as_str() {
            *parents.entry(family.clone()).or_default() += 1;
        }
        populated.insert(family.clone());
        member_family.insert(id, family);
    }

    let mut orphaned: Vec<String> = family_ids.difference(&populated).cloned().collect();
    orphaned.sort();
    report.orphaned_families = orphaned;

    let mut over: Vec<(String, i64)> = parents
        .into_iter()
        .filter(|(_, n)| *n > MAX_PARENTS_PER_FAMILY)
        .collect();
    over.sort();
    report.over_capacity_families = over;

    let assigned: Vec<(String, String, Option<String>)> = t::tasks
        .filter(t::assigned_to.is_not_null())
        .select((t::id, t::family_id, t::assigned_to))
        .load(conn)?;
    for (task_id, family, assignee) in assigned {
        let Some(assignee) = assignee else { continue };
        if member_family.get(&assignee) != Some(&family) {
            report.misassigned_tasks.push(task_id);
        }
    }

    let cutoff = (Utc::now() - Duration::days(idle_days)).naive_utc();
    report.stale_sessions = s::sessions
        .filter(s::last_used_at.lt(cutoff))
        .count()
        .get_result(conn)?;
    Ok(report)
}

impl Store {
    pub async fn diagnose(&self, idle_days: i64) -> Result<DiagnosticReport, StorageError> {
        self.with_conn(move |conn| scan(conn, idle_days)).await
    }

    /// Fixes what [`Store::diagnose`] finds, except over-capacity families,
    /// which need a person to decide who leaves. With `dry_run` the
    /// transaction is rolled back after counting.
    pub async fn repair(
        &self,
        idle_days: i64,
        dry_run: bool,
    ) -> Result<RepairSummary, StorageError> {
        use schema::families::dsl as f;
        use schema::profiles::dsl as p;
        use schema::sessions::dsl as s;
        use schema::tasks::dsl as t;

        self.with_conn(move |conn| {
            let mut summary = RepairSummary::default();
            let outcome = conn.immediate_transaction(|conn| -> Result<(), StorageError> {
                let report = scan(conn, idle_days)?;
                for (profile, _) in &report.dangling_family_refs {
                    summary.cleared_family_refs +=
                        diesel::update(p::profiles.filter(p::id.eq(profile)))
                            .set(p::family_id.eq(None::<String>))
                            .execute(conn)?;
                }
                for family in &report.orphaned_families {
                    summary.deleted_families +=
                        diesel::delete(f::families.filter(f::id.eq(family))).execute(conn)?;
                }
                for task in &report.misassigned_tasks {
                    summary.unassigned_tasks += diesel::update(t::tasks.filter(t::id.eq(task)))
                        .set(t::assigned_to.eq(None::<String>))
                        .execute(conn)?;
                }
                let cutoff = (Utc::now() - Duration::days(idle_days)).naive_utc();
                summary.purged_sessions = diesel::delete(
                    s::sessions.filter(s::last_used_at.lt(cutoff)),
                )
                .execute(conn)?;
                if dry_run {
                    return Err(DieselError::RollbackTransaction.into());
                }
                Ok(())
            });
            match outcome {
                Ok(()) => Ok(summary),
                Err(StorageError::Database(DieselError::RollbackTransaction)) if dry_run => {
                    Ok(summary)
                }
                Err(e) => Err(e),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{profile, temp_store};

    #[tokio::test]
    async fn repair_clears_dangling_refs_and_orphans() {
        let (_dir, store) = temp_store().await;
        let owner = profile(&store, "owner@x", Role::Parent).await;
        store.create_family(&owner, Some("F1")).await.unwrap();
        let stray = profile(&store, "stray@x", Role::Child).await;
        let lonely = profile(&store, "lonely@x", Role::Parent).await;
        store.create_family(&lonely, Some("F2")).await.unwrap();

        let sid = stray.clone();
        let lid = lonely.clone();
        store
            .with_conn(move |conn| {
                use schema::profiles::dsl as p;
                diesel::update(p::profiles.filter(p::id.eq(&sid)))
                    .set(p::family_id.eq(Some("GONE")))
                    .execute(conn)?;
                diesel::update(p::profiles.filter(p::id.eq(&lid)))
                    .set(p::family_id.eq(None::<String>))
                    .execute(conn)?;
                Ok(())
            })
            .await
            .unwrap();

        let report = store.diagnose(14).await.unwrap();
        assert_eq!(
            report.dangling_family_refs,
            vec![(stray.clone(), "GONE".to_string())]
        );
        assert_eq!(report.orphaned_families, vec!["F2".to_string()]);
        assert!(!report.is_clean());

        let dry = store.repair(14, true).await.unwrap();
        assert_eq!(dry.cleared_family_refs, 1);
        assert_eq!(dry.deleted_families, 1);
        assert!(!store.diagnose(14).await.unwrap().is_clean());

        store.repair(14, false).await.unwrap();
        assert!(store.diagnose(14).await.unwrap().is_clean());
        assert!(store.get_family("F2").await.unwrap().is_none());
        assert!(store.get_family("F1").await.unwrap().is_some());
    }
}
