// tests/publish_verification.rs

mod common;
use crate::common::fakes::FakeZeroState;
use crate::common::unit;

use std::path::Path;

use rapid_batch::engine::PostRunReconciler;
use rapid_batch::errors::BatchError;
use rapid_batch::exec::LocalArtifact;
use rapid_batch::store::MemoryGate;
use rapid_batch::units::{ArtifactRef, SimulationUnit};

async fn write_outputs(scratch: &Path, u: &SimulationUnit) -> Vec<LocalArtifact> {
    let qout = ArtifactRef::output_series(u);
    let qfinal = ArtifactRef::final_state(u);
    let qout_path = qout.local_path(scratch);
    let qfinal_path = qfinal.local_path(scratch);
    tokio::fs::write(&qout_path, b"discharge series").await.unwrap();
    tokio::fs::write(&qfinal_path, b"final state").await.unwrap();
    vec![
        LocalArtifact::new(qout, qout_path),
        LocalArtifact::new(qfinal, qfinal_path),
    ]
}

#[tokio::test]
async fn size_mismatch_keeps_local_files_and_stops_before_the_state() {
    let scratch = tempfile::tempdir().unwrap();
    let gate = MemoryGate::new();
    let zero = FakeZeroState::new();
    let u = unit("1980-05");
    let outputs = write_outputs(scratch.path(), &u).await;
    let qout_key = ArtifactRef::output_series(&u).remote_key();
    gate.skew_size(qout_key.clone(), -1);

    let reconciler = PostRunReconciler::new(&gate, &zero, scratch.path());
    let err = reconciler.publish(&u, &outputs, false).await.unwrap_err();

    match err {
        BatchError::PublishVerification {
            key,
            local_size,
            remote_size,
        } => {
            assert_eq!(key, qout_key);
            assert_eq!(local_size, 16);
            assert_eq!(remote_size, Some(15));
        }
        other => panic!("Expected PublishVerification, got: {other:?}"),
    }

    for output in &outputs {
        assert!(output.path.exists(), "{} was deleted", output.path.display());
    }
    assert!(gate.deleted_local().is_empty());
    assert!(!gate.contains(&ArtifactRef::carried_state(&u).remote_key()));
}

#[tokio::test]
async fn empty_output_is_reported_before_any_upload() {
    let scratch = tempfile::tempdir().unwrap();
    let gate = MemoryGate::new();
    let zero = FakeZeroState::new();
    let u = unit("1980-05");
    let outputs = write_outputs(scratch.path(), &u).await;
    tokio::fs::write(&outputs[1].path, b"").await.unwrap();

    let reconciler = PostRunReconciler::new(&gate, &zero, scratch.path());
    let err = reconciler.publish(&u, &outputs, false).await.unwrap_err();

    assert!(matches!(err, BatchError::MissingOutput { .. }));
    assert!(gate.uploads().is_empty());
}

#[tokio::test]
async fn successful_publish_hands_the_state_on_and_cleans_scratch() {
    let scratch = tempfile::tempdir().unwrap();
    let gate = MemoryGate::new();
    let zero = FakeZeroState::new();
    let u = unit("1980-12");
    let outputs = write_outputs(scratch.path(), &u).await;

    let reconciler = PostRunReconciler::new(&gate, &zero, scratch.path());
    let report = reconciler.publish(&u, &outputs, false).await.unwrap();

    let carried = ArtifactRef::carried_state(&u);
    assert_eq!(
        carried.remote_key(),
        "pfaf_74/GLDAS/VIC/3H/1981-01/Qinit_pfaf_74_GLDAS_VIC_3H_1981-01.nc"
    );
    assert_eq!(
        report.published,
        vec![ArtifactRef::output_series(&u), carried.clone()]
    );
    assert_eq!(report.bytes, 16 + 11);
    assert_eq!(gate.object(&carried.remote_key()), Some(b"final state".to_vec()));
    assert!(zero.calls().is_empty());

    for output in &outputs {
        assert!(!output.path.exists());
    }
    assert!(!carried.local_path(scratch.path()).exists());
    assert_eq!(gate.deleted_local().len(), 3);
}

#[tokio::test]
async fn credential_expiry_during_publish_is_fatal() {
    let scratch = tempfile::tempdir().unwrap();
    let gate = MemoryGate::new();
    let zero = FakeZeroState::new();
    let u = unit("1980-05");
    let outputs = write_outputs(scratch.path(), &u).await;
    // upload succeeds, the size read-back does not
    gate.expire_credentials_after(1);

    let reconciler = PostRunReconciler::new(&gate, &zero, scratch.path());
    let err = reconciler.publish(&u, &outputs, false).await.unwrap_err();

    assert!(err.is_fatal(), "{err:?}");
    assert!(outputs[0].path.exists());
}
