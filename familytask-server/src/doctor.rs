//! Offline maintenance commands run against the database file.

use chrono::{Duration, Utc};
use familytask_server::server::auth::SESSION_IDLE_DAYS;
use familytask_server::storage::Store;
use familytask_server::storage::notifications::NewNotificationInput;
use familytask_shared::domain::NotificationKind;

use crate::cli::Command;

pub async fn run(store: &Store, cmd: Command) -> Result<(), String> {
    match cmd {
        Command::Doctor { json } => {
            let report = store
                .diagnose(SESSION_IDLE_DAYS)
                .await
                .map_err(|e| e.to_string())?;
            if json {
                let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
                println!("{text}");
            } else if report.is_clean() {
                println!("No problems found.");
            } else {
                for fid in &report.orphaned_families {
                    println!("orphaned family: {fid}");
                }
                for (uid, fid) in &report.dangling_family_refs {
                    println!("profile {uid} points at missing family {fid}");
                }
                for (fid, n) in &report.over_capacity_families {
                    println!("family {fid} has {n} parents");
                }
                for tid in &report.misassigned_tasks {
                    println!("task {tid} is assigned outside its family");
                }
                if report.stale_sessions > 0 {
                    println!("{} stale sessions", report.stale_sessions);
                }
            }
            Ok(())
        }
        Command::Repair { dry_run } => {
            let summary = store
                .repair(SESSION_IDLE_DAYS, dry_run)
                .await
                .map_err(|e| e.to_string())?;
            let verb = if dry_run { "would change" } else { "changed" };
            println!(
                "{verb}: {} family links cleared, {} families deleted, {} tasks unassigned, {} sessions purged",
                summary.cleared_family_refs,
                summary.deleted_families,
                summary.unassigned_tasks,
                summary.purged_sessions
            );
            Ok(())
        }
        Command::Notify {
            user,
            title,
            message,
            kind,
            family,
        } => {
            let profile = store
                .get_profile(&user)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("profile not found: {user}"))?;
            let kind = kind.parse::<NotificationKind>().unwrap_or(NotificationKind::System);
            let row = store
                .insert_notification(NewNotificationInput {
                    user_id: profile.id,
                    family_id: family.or(profile.family_id),
                    kind,
                    title,
                    message,
                })
                .await
                .map_err(|e| e.to_string())?;
            println!("notification {} created", row.id);
            Ok(())
        }
        Command::GrantPremium { family, days } => {
            if days < 0 {
                return Err("days must not be negative".into());
            }
            let until = (days > 0).then(|| (Utc::now() + Duration::days(days)).naive_utc());
            let found = store
                .set_premium_until(&family, until)
                .await
                .map_err(|e| e.to_string())?;
            if !found {
                return Err(format!("family not found: {family}"));
            }
            match until {
                Some(u) => println!("family {family} is premium until {u}"),
                None => println!("premium revoked for family {family}"),
            }
            Ok(())
        }
    }
}
