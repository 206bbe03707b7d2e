//! Script analysis pipeline: scratch copy, page extraction, parallel
//! per-page classification, aggregation, and lifecycle transitions.

use diesel::prelude::*;
use futures_util::{stream, StreamExt};
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{NewRiskFlag, RiskFlag};
use crate::schema::{risk_flags, scripts};
use crate::state::AppState;
use crate::taxonomy::ScriptStatus;

pub mod chat;
pub mod classifier;
pub mod extract;
pub mod scratch;

use classifier::RiskClassifier;
use scratch::ScratchFile;

/// Runs the full analysis for a script already persisted in `PROCESSING`
/// state. The uploaded bytes live only in a scratch file that is erased on
/// every exit path; on extraction or persistence failure the script is
/// marked `FAILED` and the error propagates after cleanup.
pub async fn run_analysis(
    state: &AppState,
    script_id: Uuid,
    bytes: Vec<u8>,
) -> AppResult<Vec<RiskFlag>> {
    let scratch = ScratchFile::create(&state.config.scratch_dir, &bytes)?;
    drop(bytes);

    let result = analyze_document(state, script_id, &scratch).await;
    scratch.erase();

    match result {
        Ok(flags) => Ok(flags),
        Err(err) => {
            error!(script_id = %script_id, error = %err, "analysis failed");
            mark_failed(state, script_id);
            Err(err)
        }
    }
}

async fn analyze_document(
    state: &AppState,
    script_id: Uuid,
    scratch: &ScratchFile,
) -> AppResult<Vec<RiskFlag>> {
    let extractor = state.extractor.clone();
    let path = scratch.path().to_path_buf();
    let pages = task::spawn_blocking(move || extractor.extract_pages(&path))
        .await
        .map_err(|join_err| AppError::internal(format!("extraction task panicked: {join_err}")))?
        .map_err(AppError::from)?;

    let total_pages = pages.len();
    let non_blank_pages = pages.iter().filter(|page| !page.trim().is_empty()).count();
    info!(script_id = %script_id, pages = total_pages, "pages extracted");

    {
        let mut conn = state.db()?;
        diesel::update(scripts::table.find(script_id))
            .set(scripts::total_pages.eq(total_pages as i32))
            .execute(&mut conn)?;
    }

    // One classification task per page, no ordering dependency. A page that
    // fails classification yields an empty set without touching siblings;
    // the collect below is the barrier before any status transition.
    let classifier = RiskClassifier::new(state.chat.clone());
    let concurrency = state.config.analysis_concurrency.max(1);
    let per_page: Vec<Vec<NewRiskFlag>> = stream::iter(
        pages
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let classifier = classifier.clone();
                async move {
                    classifier
                        .classify_page(script_id, (index + 1) as i32, &text)
                        .await
                }
            }),
    )
    .buffer_unordered(concurrency)
    .collect()
    .await;

    let flags: Vec<NewRiskFlag> = per_page.into_iter().flatten().collect();

    if flags.is_empty() && non_blank_pages > 0 {
        // Policy: the script still completes; make the outcome observable.
        warn!(
            script_id = %script_id,
            pages = non_blank_pages,
            "classification produced no findings on any page"
        );
    }

    let stored = {
        let mut conn = state.db()?;
        if !flags.is_empty() {
            diesel::insert_into(risk_flags::table)
                .values(&flags)
                .execute(&mut conn)?;
        }

        diesel::update(scripts::table.find(script_id))
            .set((
                scripts::risk_count.eq(flags.len() as i32),
                scripts::status.eq(ScriptStatus::Complete.as_str()),
            ))
            .execute(&mut conn)?;

        risk_flags::table
            .filter(risk_flags::script_id.eq(script_id))
            .load::<RiskFlag>(&mut conn)?
    };

    info!(
        script_id = %script_id,
        risks = stored.len(),
        "analysis complete"
    );

    Ok(stored)
}

fn mark_failed(state: &AppState, script_id: Uuid) {
    let Ok(mut conn) = state.db() else {
        error!(script_id = %script_id, "could not mark script failed: no database connection");
        return;
    };

    if let Err(err) = diesel::update(scripts::table.find(script_id))
        .set(scripts::status.eq(ScriptStatus::Failed.as_str()))
        .execute(&mut conn)
    {
        error!(script_id = %script_id, error = %err, "could not mark script failed");
    }
}
