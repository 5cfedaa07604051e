mod common;

use common::{file, FakeStorage, FakeTransport, MIB};
use s3resume_core::{
    ChunkPlan, ChunkPolicy, ChunkProgressFn, ErrorKind, TransferExecutor, UploadError,
};
use std::sync::{Arc, Mutex};

fn executor(storage: &Arc<FakeStorage>, transport: &Arc<FakeTransport>) -> TransferExecutor {
    TransferExecutor::new(storage.clone(), transport.clone())
}

fn recorder() -> (ChunkProgressFn, Arc<Mutex<Vec<(u32, u64)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let on_progress: ChunkProgressFn = Arc::new(move |number, loaded| {
        sink.lock().unwrap().push((number, loaded));
    });
    (on_progress, seen)
}

#[tokio::test]
async fn batch_returns_parts_sorted_by_number() {
    let storage = Arc::new(FakeStorage::default());
    let transport = Arc::new(FakeTransport::new(Arc::clone(&storage)));
    let source = file("data.bin", 12 * MIB as usize);
    let plan = ChunkPlan::new(12 * MIB, &[], ChunkPolicy::default());
    let (on_progress, seen) = recorder();

    let parts = executor(&storage, &transport)
        .send_batch("k.bin", "u-1", source.as_ref(), plan.chunks(), on_progress)
        .await
        .unwrap();

    let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(parts[2].etag, "\"etag-3\"");
    assert_eq!(storage.stored_part_numbers("u-1"), vec![1, 2, 3]);

    let seen = seen.lock().unwrap().clone();
    assert!(seen.contains(&(1, 5 * MIB)));
    assert!(seen.contains(&(3, 2 * MIB)));
}

#[tokio::test]
async fn one_failed_chunk_fails_the_batch_after_all_settle() {
    let storage = Arc::new(FakeStorage::default());
    let transport = Arc::new(FakeTransport::new(Arc::clone(&storage)));
    transport.failing_parts.lock().unwrap().insert(2);
    let source = file("data.bin", 12 * MIB as usize);
    let plan = ChunkPlan::new(12 * MIB, &[], ChunkPolicy::default());
    let (on_progress, _) = recorder();

    let err = executor(&storage, &transport)
        .send_batch("k.bin", "u-1", source.as_ref(), plan.chunks(), on_progress)
        .await
        .unwrap_err();

    match &err {
        UploadError::BatchTransfer { parts, reason } => {
            assert_eq!(parts, &vec![1, 2, 3]);
            assert!(reason.contains("part 2 rejected"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::BatchTransfer);
    // The other chunks were still sent to completion.
    assert_eq!(transport.calls().len(), 3);
    assert_eq!(storage.stored_part_numbers("u-1"), vec![1, 3]);
}
