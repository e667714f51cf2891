//! Sync run history listing.

/// Prints the most recent sync runs, newest first.
pub async fn list(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = catsync_db::list_sync_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no sync runs recorded yet");
        return Ok(());
    }

    for run in runs {
        println!(
            "{} [{}] trigger={} seen={} synced={} failed={}{}",
            run.public_id,
            run.status,
            run.trigger_source,
            run.offers_seen,
            run.offers_synced,
            run.offers_failed,
            run.error_message
                .as_deref()
                .map(|m| format!(" error={m}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}
