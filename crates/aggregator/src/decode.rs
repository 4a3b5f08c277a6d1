//! Decoding of status payloads into [`PhaseStatus`].
//!
//! Each phase endpoint answers with its own JSON shape. Decoding folds them
//! into one record so a single poller can drive every phase.

use aipscan_core::{state_literal, PhaseKind, PhaseStatus, TaskState};
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::types::{IndexingStatusBody, MetsBatchItem, MetsStatusBody, PackageListStatusBody};

/// Decode a status body for `phase`.
///
/// With `strict` set, state literals outside the known set are rejected
/// instead of being read as success.
pub fn decode_status(phase: PhaseKind, body: Value, strict: bool) -> Result<PhaseStatus> {
    match phase {
        PhaseKind::PackageList => decode_package_list(body, strict),
        PhaseKind::MetsDownload => decode_mets(body, strict),
        PhaseKind::IndexRefresh => decode_indexing(body, strict),
    }
}

fn map_state(literal: &str, strict: bool) -> Result<TaskState> {
    if strict {
        TaskState::parse_strict(literal)
            .ok_or_else(|| ClientError::InvalidResponse(format!("unknown state {literal:?}")))
    } else {
        Ok(TaskState::from_literal(literal))
    }
}

fn decode_package_list(body: Value, strict: bool) -> Result<PhaseStatus> {
    let body: PackageListStatusBody = serde_json::from_value(body)?;
    let state = map_state(&body.state, strict)?;

    let mut status = PhaseStatus::new(PhaseKind::PackageList, body.state, state);
    status.message = match state {
        TaskState::Failed => body.status.or(body.message),
        _ => body.message,
    };
    status.coordinator_id = body.coordinator_id;
    Ok(status)
}

fn decode_mets(body: Value, strict: bool) -> Result<PhaseStatus> {
    match serde_json::from_value(body)? {
        MetsStatusBody::State { state: literal } => {
            let state = map_state(&literal, strict)?;
            Ok(PhaseStatus::new(PhaseKind::MetsDownload, literal, state))
        }
        MetsStatusBody::Batch(items) => fold_batch(items, strict),
    }
}

/// A batch is always in progress: the endpoint reports completion with a
/// bare `COMPLETED` state once nothing is left to drain.
fn fold_batch(items: Vec<MetsBatchItem>, strict: bool) -> Result<PhaseStatus> {
    if strict {
        for item in &items {
            map_state(&item.state, strict)?;
        }
    }

    let Some(last) = items.last() else {
        return Ok(PhaseStatus::new(
            PhaseKind::MetsDownload,
            state_literal::IN_PROGRESS,
            TaskState::InProgress,
        ));
    };

    let mut status = PhaseStatus::new(
        PhaseKind::MetsDownload,
        last.state.clone(),
        TaskState::InProgress,
    );
    status.processed = Some(last.total_aips);
    status.unit = Some(last.package.clone());
    status.progress = items.iter().map(MetsBatchItem::display_line).collect();
    Ok(status)
}

fn decode_indexing(body: Value, strict: bool) -> Result<PhaseStatus> {
    let body: IndexingStatusBody = serde_json::from_value(body)?;
    let state = map_state(&body.state, strict)?;

    let mut status = PhaseStatus::new(PhaseKind::IndexRefresh, body.state, state);
    status.message = body.message;
    status.progress.extend(body.progress);
    Ok(status)
}
