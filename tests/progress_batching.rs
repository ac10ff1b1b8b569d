mod common;

use std::time::Duration;

use common::{memory_rig, sequential_document};
use prompt_store::{
    codec, Document, MemoryBlobHost, PackKind, ProgressRecord, SaveOptions, StoreSettings,
};

fn stored_document(host: &MemoryBlobHost) -> Document {
    Document::from_value(codec::decode(host.blob().unwrap())).unwrap()
}

#[tokio::test(start_paused = true)]
async fn a_burst_of_updates_is_written_once_with_the_final_state() {
    let rig = memory_rig(MemoryBlobHost::new(), StoreSettings::default()).await;
    let document = sequential_document("Daily");
    let pack_id = document.packs[0].id.clone();
    rig.app
        .store()
        .save(&document, SaveOptions::default())
        .await
        .unwrap();
    let writes_before = rig.host.write_count();

    let progress = rig.app.progress();
    for i in 0..25u32 {
        let mut record = ProgressRecord::for_kind(PackKind::Sequential);
        record.current_index = Some(i);
        progress.update(&pack_id, record).await.unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;
    }
    assert_eq!(rig.host.write_count(), writes_before);

    tokio::time::sleep(rig.app.settings().flush_delay() * 2).await;
    assert_eq!(rig.host.write_count(), writes_before + 1);

    let stored = stored_document(&rig.host);
    assert_eq!(stored.packs[0].progress.current_index, Some(24));
    rig.app.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_pending_progress() {
    let rig = memory_rig(MemoryBlobHost::new(), StoreSettings::default()).await;
    let document = sequential_document("Daily");
    let pack_id = document.packs[0].id.clone();
    let item_id = document.packs[0].items[0].id.clone();
    rig.app
        .store()
        .save(&document, SaveOptions::default())
        .await
        .unwrap();

    rig.app
        .progress()
        .mark_completed(&pack_id, &item_id)
        .await
        .unwrap();
    let touched = rig.app.progress().record_access(&pack_id).await.unwrap();
    assert!(touched.is_completed(&item_id));
    assert_eq!(rig.app.progress().pending_count().await, 1);

    rig.app.shutdown().await;
    let stored = stored_document(&rig.host);
    assert!(stored.packs[0].progress.is_completed(&item_id));
}

#[tokio::test]
async fn archived_progress_can_be_listed_per_pack() {
    let rig = memory_rig(MemoryBlobHost::new(), StoreSettings::default()).await;
    let mut document = sequential_document("One");
    document.packs.extend(sequential_document("Two").packs);
    let first = document.packs[0].id.clone();
    let second = document.packs[1].id.clone();
    let item = document.packs[0].items[1].id.clone();
    rig.app
        .store()
        .save(&document, SaveOptions::default())
        .await
        .unwrap();

    rig.app.progress().mark_completed(&first, &item).await.unwrap();
    rig.app.progress().archive(&first).await.unwrap();
    rig.app.progress().archive(&second).await.unwrap();

    let vault = rig.app.vault();
    assert_eq!(vault.list_archives(None).await.unwrap().len(), 2);
    let archived = vault.list_archives(Some(first.as_str())).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].pack_name, "One");
    assert!(archived[0].progress.is_completed(&item));

    let reset = rig.app.progress().get(&first).await.unwrap();
    assert_eq!(reset.current_index, Some(0));
    assert!(reset.completed_ids.is_empty());
    rig.app.shutdown().await;
}
