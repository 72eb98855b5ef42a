use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::services::grading::Graders;
use crate::tasks::grading;

const STALE_CLAIM_SWEEP_SECONDS: u64 = 300;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let graders = state.graders().clone();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let exam_settings = state.settings().exam().clone();
    let mut handles = Vec::with_capacity(exam_settings.grading_workers + 2);

    handles.push(tokio::spawn(close_expired_loop(state.clone(), shutdown_rx.clone())));

    if state.settings().ai().is_configured() {
        for _ in 0..exam_settings.grading_workers {
            handles.push(tokio::spawn(grading_worker(
                state.clone(),
                graders.clone(),
                shutdown_rx.clone(),
            )));
        }
        handles.push(tokio::spawn(release_stale_loop(state.clone(), shutdown_rx.clone())));
    } else {
        tracing::warn!("AI evaluation is not configured; grading workers are disabled");
    }

    tracing::info!(
        grading_workers = exam_settings.grading_workers,
        close_interval_seconds = exam_settings.close_interval_seconds,
        "Background worker started"
    );

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn grading_worker(state: AppState, graders: Graders, mut shutdown: watch::Receiver<bool>) {
    let poll = Duration::from_secs(state.settings().exam().grading_poll_seconds);

    loop {
        if *shutdown.borrow() {
            break;
        }

        match grading::grade_next_pending(&state, &graders).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => tracing::error!(error = %err, "Grading worker iteration failed"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(poll) => {}
        }
    }
}

async fn close_expired_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_secs(state.settings().exam().close_interval_seconds));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = grading::close_expired_exams(&state).await {
                    tracing::error!(error = %err, "close_expired_exams failed");
                }
            }
        }
    }
}

async fn release_stale_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_secs(STALE_CLAIM_SWEEP_SECONDS));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = grading::release_stale_claims(&state).await {
                    tracing::error!(error = %err, "release_stale_claims failed");
                }
            }
        }
    }
}
