use crate::crd::analysis_run::{AnalysisRun, AnalysisRunStatus};
use kube::api::{Api, Patch, PatchParams};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::reconcile::ReconcileError;

/// RFC 7386 merge patch turning `old` into `new`
///
/// Objects are diffed key by key: removed keys become `null`, changed leaves
/// and arrays are sent whole. Returns None when the documents are equal.
pub fn merge_patch_diff(old: &Value, new: &Value) -> Option<Value> {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();

            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }

            for (key, new_value) in new_map {
                match old_map.get(key) {
                    Some(old_value) => {
                        if let Some(diff) = merge_patch_diff(old_value, new_value) {
                            patch.insert(key.clone(), diff);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }

            if patch.is_empty() {
                None
            } else {
                Some(Value::Object(patch))
            }
        }
        _ if old == new => None,
        _ => Some(new.clone()),
    }
}

/// Status patch for the run, or None when nothing changed
pub fn status_merge_patch(
    old: Option<&AnalysisRunStatus>,
    new: &AnalysisRunStatus,
) -> Result<Option<Value>, ReconcileError> {
    let old = match old {
        Some(status) => serde_json::to_value(status),
        None => Ok(Value::Object(Map::new())),
    }
    .map_err(|e| ReconcileError::SerializationError(e.to_string()))?;
    let new =
        serde_json::to_value(new).map_err(|e| ReconcileError::SerializationError(e.to_string()))?;

    Ok(merge_patch_diff(&old, &new))
}

/// Write the status subresource if it changed
///
/// Returns whether a patch was sent.
pub async fn persist_status(
    api: &Api<AnalysisRun>,
    run: &AnalysisRun,
    name: &str,
    new_status: &AnalysisRunStatus,
) -> Result<bool, ReconcileError> {
    let Some(patch) = status_merge_patch(run.status.as_ref(), new_status)? else {
        debug!(run = %name, "Status unchanged, skipping patch");
        return Ok(false);
    };

    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(&serde_json::json!({ "status": patch })),
    )
    .await?;

    info!(run = %name, phase = ?new_status.phase, "Status updated");
    Ok(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::controller::analysis::test_support::*;
    use crate::crd::analysis_run::{AnalysisStatus, MetricResult};
    use serde_json::json;

    #[test]
    fn test_equal_documents_produce_no_patch() {
        let doc = json!({"phase": "Running", "metricResults": {"a": {"count": 1}}});
        assert_eq!(merge_patch_diff(&doc, &doc.clone()), None);
    }

    #[test]
    fn test_changed_and_removed_keys() {
        let old = json!({"phase": "Running", "message": "waiting", "startedAt": "t0"});
        let new = json!({"phase": "Failed", "startedAt": "t0"});

        assert_eq!(
            merge_patch_diff(&old, &new),
            Some(json!({"phase": "Failed", "message": null}))
        );
    }

    #[test]
    fn test_nested_objects_are_diffed_and_arrays_replaced() {
        let old = json!({
            "metricResults": {
                "a": {"count": 1, "measurements": [{"status": "Successful"}]},
                "b": {"count": 2}
            }
        });
        let new = json!({
            "metricResults": {
                "a": {"count": 2, "measurements": [{"status": "Successful"}, {"status": "Failed"}]},
                "b": {"count": 2}
            }
        });

        assert_eq!(
            merge_patch_diff(&old, &new),
            Some(json!({
                "metricResults": {
                    "a": {"count": 2, "measurements": [{"status": "Successful"}, {"status": "Failed"}]}
                }
            }))
        );
    }

    #[test]
    fn test_status_patch_from_empty_is_whole_status() {
        let status = AnalysisRunStatus {
            phase: Some(AnalysisStatus::Pending),
            message: None,
            started_at: Some(fixed_now().to_rfc3339()),
            metric_results: Default::default(),
        };

        let patch = status_merge_patch(None, &status).unwrap().unwrap();
        assert_eq!(patch["phase"], "Pending");
        assert_eq!(patch["startedAt"], fixed_now().to_rfc3339());
        assert!(patch.get("metricResults").is_none());
    }

    #[test]
    fn test_unchanged_status_skips_patch() {
        let run = run_with_results(
            vec![once_metric("a")],
            vec![("a", MetricResult::default())],
        );
        let status = run.status.clone().unwrap();

        assert_eq!(status_merge_patch(run.status.as_ref(), &status).unwrap(), None);
    }
}
