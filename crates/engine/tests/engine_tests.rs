mod common;

use adchain_core::config::EngineConfig;
use adchain_core::{Link, Metadata, Multihash};
use adchain_engine::{
    CallbackError, EngineError, GossipAnnouncer, LATEST_ADV_KEY, callback_fn, to_callback,
};
use adchain_signer::{AdvertisementSigner, Signer};
use adchain_storage::{Datastore, FilesystemBackend, MemoryBackend};
use common::{
    FailingAnnouncer, FlakyAnnouncer, RecordingAnnouncer, engine_with, md, multihashes, small_config,
};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

async fn started_engine() -> adchain_engine::Engine {
    let engine = engine_with(EngineConfig::default(), None, None);
    engine.start().await.unwrap();
    engine
        .register_callback(callback_fn(|ctx| Ok(multihashes(ctx, 3))))
        .await;
    engine
}

#[tokio::test]
async fn test_latest_on_fresh_engine_is_none() {
    let engine = started_engine().await;
    assert!(engine.get_latest_advertisement().await.unwrap().is_none());
    assert!(engine.chain(usize::MAX).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeat_put_with_same_metadata() {
    let engine = started_engine().await;
    let first = engine.notify_put(b"ctx", md(b"v1")).await.unwrap();

    assert!(matches!(
        engine.notify_put(b"ctx", md(b"v1")).await,
        Err(EngineError::AlreadyAdvertised)
    ));
    assert_eq!(engine.head().await.unwrap(), Some(first));
    assert_eq!(engine.chain(usize::MAX).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remove_unknown_context_keeps_head() {
    let engine = started_engine().await;
    assert!(matches!(
        engine.notify_remove(b"missing").await,
        Err(EngineError::ContextIdNotFound)
    ));
    assert!(engine.head().await.unwrap().is_none());

    let head = engine.notify_put(b"ctx", md(b"v1")).await.unwrap();
    assert!(matches!(
        engine.notify_remove(b"missing").await,
        Err(EngineError::ContextIdNotFound)
    ));
    assert_eq!(engine.head().await.unwrap(), Some(head));
}

#[tokio::test]
async fn test_chain_has_one_node_per_successful_call() {
    let engine = started_engine().await;
    let mut ids = Vec::new();
    for i in 0..5u8 {
        ids.push(engine.notify_put(&[b'c', i], md(b"v1")).await.unwrap());
    }
    ids.push(engine.notify_put(&[b'c', 0], md(b"v2")).await.unwrap());
    ids.push(engine.notify_remove(&[b'c', 1]).await.unwrap());
    // Failures append nothing.
    let _ = engine.notify_put(&[b'c', 2], md(b"v1")).await.unwrap_err();
    let _ = engine.notify_remove(&[b'c', 1]).await.unwrap_err();

    let chain = engine.chain(usize::MAX).await.unwrap();
    assert_eq!(chain.len(), ids.len());

    let walked: Vec<Link> = chain.iter().map(|(link, _)| *link).collect();
    let mut newest_first = ids.clone();
    newest_first.reverse();
    assert_eq!(walked, newest_first);

    let unique: HashSet<_> = walked.iter().collect();
    assert_eq!(unique.len(), walked.len());
    assert!(chain.last().unwrap().1.previous.is_none());

    assert_eq!(engine.chain(2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_put_update_remove_scenario() {
    let engine = started_engine().await;

    let id1 = engine.notify_put(b"A", md(b"md1")).await.unwrap();
    assert!(matches!(
        engine.notify_put(b"A", md(b"md1")).await,
        Err(EngineError::AlreadyAdvertised)
    ));
    assert_eq!(engine.chain(usize::MAX).await.unwrap().len(), 1);

    let id2 = engine.notify_put(b"A", md(b"md2")).await.unwrap();
    let ad1 = engine.get_advertisement(&id1).await.unwrap();
    let ad2 = engine.get_advertisement(&id2).await.unwrap();
    assert_eq!(engine.chain(usize::MAX).await.unwrap().len(), 2);
    assert_eq!(ad2.entries, ad1.entries);
    assert_eq!(ad2.previous, Some(id1));
    assert_eq!(ad2.metadata, md(b"md2"));
    assert!(!ad2.is_rm);

    let id3 = engine.notify_remove(b"A").await.unwrap();
    let ad3 = engine.get_advertisement(&id3).await.unwrap();
    assert_eq!(engine.chain(usize::MAX).await.unwrap().len(), 3);
    assert!(ad3.is_rm);
    assert_eq!(ad3.entries, Link::no_entries());
    assert_eq!(ad3.metadata, Metadata::removal());
    assert_eq!(ad3.context_id, b"A".to_vec());
    assert_eq!(ad3.previous, Some(id2));

    assert!(matches!(
        engine.notify_remove(b"A").await,
        Err(EngineError::ContextIdNotFound)
    ));
    assert_eq!(engine.head().await.unwrap(), Some(id3));

    let (latest, ad) = engine.get_latest_advertisement().await.unwrap().unwrap();
    assert_eq!(latest, id3);
    assert_eq!(ad, ad3);
}

#[tokio::test]
async fn test_put_after_remove_readvertises() {
    let engine = started_engine().await;
    engine.notify_put(b"A", md(b"md1")).await.unwrap();
    engine.notify_remove(b"A").await.unwrap();

    let id = engine.notify_put(b"A", md(b"md1")).await.unwrap();
    let ad = engine.get_advertisement(&id).await.unwrap();
    assert!(!ad.is_rm);
    assert_eq!(engine.entries(&ad.entries).await.unwrap(), multihashes(b"A", 3));
}

#[tokio::test]
async fn test_publish_local_is_idempotent() {
    let engine = started_engine().await;
    let ad = engine
        .new_advertisement(b"ctx", Link::compute(b"entries"), md(b"v1"), false)
        .await
        .unwrap();

    let a = engine.publish_local(&ad).await.unwrap();
    let b = engine.publish_local(&ad).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(engine.head().await.unwrap(), Some(a));
    assert_eq!(engine.get_advertisement(&a).await.unwrap(), ad);
}

#[tokio::test]
async fn test_advertisements_are_signed_by_the_provider() {
    let signer = Arc::new(AdvertisementSigner::generate("provider"));
    let engine = engine_with(small_config(16, 4), None, Some(signer.clone()));
    engine.start().await.unwrap();
    engine
        .register_callback(to_callback(multihashes(b"x", 2)))
        .await;

    let id = engine.notify_put(b"ctx", md(b"v1")).await.unwrap();
    let ad = engine.get_advertisement(&id).await.unwrap();
    assert_eq!(ad.provider, signer.provider_id());
    assert_eq!(ad.addresses, vec!["/ip4/127.0.0.1/tcp/3104".to_string()]);
    engine
        .verify_advertisement(&ad, Some(signer.public_key()))
        .unwrap();

    let mut forged = ad.clone();
    forged.context_id = b"other".to_vec();
    assert!(matches!(
        engine.verify_advertisement(&forged, None),
        Err(EngineError::Signature(_))
    ));
}

#[tokio::test]
async fn test_announcer_receives_every_head_in_order() {
    let announcer = Arc::new(RecordingAnnouncer::default());
    let engine = engine_with(EngineConfig::default(), None, None).with_announcer(announcer.clone());
    engine.start().await.unwrap();
    engine
        .register_callback(callback_fn(|ctx| Ok(multihashes(ctx, 1))))
        .await;

    let a = engine.notify_put(b"a", md(b"1")).await.unwrap();
    let _ = engine.notify_put(b"a", md(b"1")).await.unwrap_err();
    let b = engine.notify_put(b"b", md(b"1")).await.unwrap();
    let c = engine.notify_remove(b"a").await.unwrap();
    assert_eq!(announcer.heads(), vec![a, b, c]);

    engine.publish_latest().await.unwrap();
    assert_eq!(announcer.heads(), vec![a, b, c, c]);

    engine.shutdown().await.unwrap();
    assert!(announcer.is_closed());
}

#[tokio::test]
async fn test_gossip_subscribers_see_announcements() {
    let signer: Arc<dyn Signer> = Arc::new(AdvertisementSigner::generate("provider"));
    let gossip = Arc::new(GossipAnnouncer::new(
        "/indexer/ingest/test",
        None,
        16,
        signer.provider_id(),
        vec![],
    ));
    let mut rx = gossip.subscribe();

    let engine = engine_with(EngineConfig::default(), None, Some(signer.clone()))
        .with_announcer(gossip.clone());
    engine.start().await.unwrap();
    engine
        .register_callback(to_callback(multihashes(b"x", 1)))
        .await;

    let id = engine.notify_put(b"ctx", md(b"1")).await.unwrap();
    let announcement = rx.recv().await.unwrap();
    assert_eq!(announcement.head, id);
    assert_eq!(announcement.provider, signer.provider_id());
}

#[tokio::test]
async fn test_announce_failure_still_commits() {
    let engine = engine_with(EngineConfig::default(), None, None)
        .with_announcer(Arc::new(FailingAnnouncer));
    engine.start().await.unwrap();
    engine
        .register_callback(to_callback(multihashes(b"x", 1)))
        .await;

    assert!(matches!(
        engine.notify_put(b"ctx", md(b"1")).await,
        Err(EngineError::Announce(_))
    ));

    let (head, ad) = engine.get_latest_advertisement().await.unwrap().unwrap();
    assert_eq!(ad.context_id, b"ctx".to_vec());
    assert_eq!(engine.chain(usize::MAX).await.unwrap().len(), 1);
    assert!(matches!(
        engine.notify_put(b"ctx", md(b"1")).await,
        Err(EngineError::AlreadyAdvertised)
    ));
    assert_eq!(engine.head().await.unwrap(), Some(head));

    match engine.shutdown().await {
        Err(EngineError::Shutdown(errors)) => assert_eq!(errors.len(), 1),
        other => panic!("unexpected shutdown result: {other:?}"),
    }
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_publish_latest_after_restart() {
    let temp = TempDir::new().unwrap();
    let signer: Arc<dyn Signer> = Arc::new(AdvertisementSigner::generate("provider"));

    let head = {
        let store: Arc<dyn Datastore> =
            Arc::new(FilesystemBackend::new(temp.path()).await.unwrap());
        let engine = engine_with(EngineConfig::default(), Some(store), Some(signer.clone()));
        engine.start().await.unwrap();
        engine
            .register_callback(to_callback(multihashes(b"x", 4)))
            .await;
        let head = engine.notify_put(b"ctx", md(b"1")).await.unwrap();
        engine.shutdown().await.unwrap();
        head
    };

    let store: Arc<dyn Datastore> = Arc::new(FilesystemBackend::new(temp.path()).await.unwrap());
    assert!(store.exists(LATEST_ADV_KEY).await.unwrap());

    let announcer = Arc::new(RecordingAnnouncer::default());
    let engine = engine_with(EngineConfig::default(), Some(store), Some(signer))
        .with_announcer(announcer.clone());
    engine.start().await.unwrap();
    assert_eq!(announcer.heads(), vec![head]);

    // The index survived too.
    engine
        .register_callback(to_callback(multihashes(b"x", 4)))
        .await;
    assert!(matches!(
        engine.notify_put(b"ctx", md(b"1")).await,
        Err(EngineError::AlreadyAdvertised)
    ));
    let next = engine.notify_put(b"ctx", md(b"2")).await.unwrap();
    let ad = engine.get_advertisement(&next).await.unwrap();
    assert_eq!(ad.previous, Some(head));
}

#[tokio::test]
async fn test_entries_split_above_chunk_size() {
    let engine = engine_with(small_config(3, 8), None, None);
    engine.start().await.unwrap();
    engine
        .register_callback(callback_fn(|ctx| Ok(multihashes(ctx, 10))))
        .await;

    let id = engine.notify_put(b"big", md(b"1")).await.unwrap();
    let ad = engine.get_advertisement(&id).await.unwrap();
    assert_eq!(engine.entries(&ad.entries).await.unwrap(), multihashes(b"big", 10));

    // Walk the raw chunks: 10 entries in chunks of 3 give four segments.
    let mut segments = 0;
    let mut next = Some(ad.entries);
    while let Some(link) = next {
        let bytes = engine.load_block(&link).await.unwrap().unwrap();
        let chunk = adchain_core::EntryChunk::from_bytes(&bytes).unwrap();
        assert!(chunk.entries.len() <= 3);
        next = chunk.next;
        segments += 1;
    }
    assert_eq!(segments, 4);
}

#[tokio::test]
async fn test_load_block_regenerates_evicted_entries() {
    let engine = engine_with(small_config(2, 1), None, None);
    engine.start().await.unwrap();
    engine
        .register_callback(callback_fn(|ctx| Ok(multihashes(ctx, 5))))
        .await;

    let a = engine.notify_put(b"A", md(b"1")).await.unwrap();
    let a_entries = engine.get_advertisement(&a).await.unwrap().entries;
    // A second list pushes the first out of the one-slot cache.
    engine.notify_put(b"B", md(b"1")).await.unwrap();

    let bytes = engine.load_block(&a_entries).await.unwrap().unwrap();
    assert_eq!(Link::compute(&bytes), a_entries);
    assert_eq!(engine.entries(&a_entries).await.unwrap(), multihashes(b"A", 5));

    // Advertisements are served from the same source.
    let ad_bytes = engine.load_block(&a).await.unwrap().unwrap();
    assert_eq!(Link::compute(&ad_bytes), a);

    // Lists nobody references are not regenerated.
    assert!(engine.load_block(&Link::compute(b"unknown")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_removed_context_is_not_regenerated() {
    let engine = engine_with(small_config(2, 1), None, None);
    engine.start().await.unwrap();
    engine
        .register_callback(callback_fn(|ctx| Ok(multihashes(ctx, 3))))
        .await;

    let a = engine.notify_put(b"A", md(b"1")).await.unwrap();
    let a_entries = engine.get_advertisement(&a).await.unwrap().entries;
    engine.notify_remove(b"A").await.unwrap();
    engine.notify_put(b"B", md(b"1")).await.unwrap();

    assert!(engine.load_block(&a_entries).await.unwrap().is_none());
}

#[tokio::test]
async fn test_callback_failures() {
    let engine = engine_with(EngineConfig::default(), None, None);
    engine.start().await.unwrap();

    assert!(matches!(
        engine.notify_put(b"ctx", md(b"1")).await,
        Err(EngineError::NoCallbackRegistered)
    ));

    engine
        .register_callback(callback_fn(|_| Err(CallbackError::UnknownContext)))
        .await;
    assert!(matches!(
        engine.notify_put(b"ctx", md(b"1")).await,
        Err(EngineError::Callback(CallbackError::UnknownContext))
    ));

    engine.register_callback(to_callback(Vec::new())).await;
    assert!(matches!(
        engine.notify_put(b"ctx", md(b"1")).await,
        Err(EngineError::Chunker(_))
    ));

    assert!(engine.head().await.unwrap().is_none());
}

#[tokio::test]
async fn test_stream_error_is_iterator_error() {
    use adchain_engine::{Callback, MultihashStream};
    use async_trait::async_trait;

    struct Broken;

    #[async_trait]
    impl Callback for Broken {
        async fn lookup(&self, _context_id: &[u8]) -> Result<MultihashStream, CallbackError> {
            let items: Vec<Result<Multihash, CallbackError>> = vec![
                Ok(Multihash::sha256(b"1")),
                Err(CallbackError::Failed("disk gone".to_string())),
            ];
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    let engine = engine_with(EngineConfig::default(), None, None);
    engine.start().await.unwrap();
    engine.register_callback(Arc::new(Broken)).await;

    assert!(matches!(
        engine.notify_put(b"ctx", md(b"1")).await,
        Err(EngineError::Iterator(CallbackError::Failed(_)))
    ));
    assert!(engine.head().await.unwrap().is_none());
    // Nothing was recorded for the context, so removal finds nothing.
    assert!(matches!(
        engine.notify_remove(b"ctx").await,
        Err(EngineError::ContextIdNotFound)
    ));
}

#[tokio::test]
async fn test_missing_metadata_record_produces_new_ad() {
    let store = Arc::new(MemoryBackend::new());
    let engine = engine_with(EngineConfig::default(), Some(store.clone()), None);
    engine.start().await.unwrap();
    engine
        .register_callback(to_callback(multihashes(b"x", 1)))
        .await;

    engine.notify_put(b"ctx", md(b"1")).await.unwrap();
    for key in store.list("map/keyMD/").await.unwrap() {
        store.delete(&key).await.unwrap();
    }

    engine.notify_put(b"ctx", md(b"1")).await.unwrap();
    assert_eq!(engine.chain(usize::MAX).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_puts_form_a_single_chain() {
    let engine = Arc::new(started_engine().await);

    let mut handles = Vec::new();
    for i in 0..16u8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let key = [b'k', i];
            engine.notify_put(&key, md(b"1")).await
        }));
    }
    // The same key raced from two tasks yields exactly one node.
    for _ in 0..2 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.notify_put(b"same", md(b"1")).await
        }));
    }

    let mut committed = 0;
    let mut already = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(EngineError::AlreadyAdvertised) => already += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(committed, 17);
    assert_eq!(already, 1);
    assert_eq!(engine.chain(usize::MAX).await.unwrap().len(), 17);
}

#[tokio::test]
async fn test_purge_cache_on_start() {
    let store: Arc<MemoryBackend> = Arc::new(MemoryBackend::new());
    {
        let engine = engine_with(EngineConfig::default(), Some(store.clone()), None);
        engine.start().await.unwrap();
        engine
            .register_callback(to_callback(multihashes(b"x", 3)))
            .await;
        engine.notify_put(b"ctx", md(b"1")).await.unwrap();
        engine.shutdown().await.unwrap();
    }
    assert!(!store.list("cache/links/").await.unwrap().is_empty());

    let config = EngineConfig {
        purge_cache: true,
        ..EngineConfig::default()
    };
    let engine = engine_with(config, Some(store.clone()), None);
    engine.start().await.unwrap();
    assert!(store.list("cache/links/").await.unwrap().is_empty());
    // The chain itself is untouched.
    assert!(engine.head().await.unwrap().is_some());
}

#[tokio::test]
async fn test_publish_requires_start_but_publish_local_does_not() {
    let engine = engine_with(EngineConfig::default(), None, None);
    let ad = engine
        .new_advertisement(b"ctx", Link::compute(b"e"), md(b"1"), false)
        .await
        .unwrap();

    assert!(matches!(engine.publish(&ad).await, Err(EngineError::NotStarted)));
    let id = engine.publish_local(&ad).await.unwrap();
    assert_eq!(engine.head().await.unwrap(), Some(id));

    engine.start().await.unwrap();
    let next = engine
        .new_advertisement(b"ctx", Link::compute(b"e"), md(b"2"), false)
        .await
        .unwrap();
    assert_eq!(next.previous, Some(id));
    assert_eq!(engine.publish(&next).await.unwrap(), next.link().unwrap());
}

#[tokio::test]
async fn test_get_advertisement_errors() {
    let store = Arc::new(MemoryBackend::new());
    let engine = engine_with(EngineConfig::default(), Some(store.clone()), None);

    let missing = Link::compute(b"missing");
    assert!(matches!(
        engine.get_advertisement(&missing).await,
        Err(EngineError::NotFound(link)) if link == missing
    ));

    let links = adchain_storage::LinkStore::new(store);
    let junk = links.store(bytes::Bytes::from_static(b"not an ad")).await.unwrap();
    assert!(matches!(
        engine.get_advertisement(&junk).await,
        Err(EngineError::MalformedAdvertisement { .. })
    ));
}

#[tokio::test]
async fn test_long_context_id_on_filesystem_store() {
    let temp = TempDir::new().unwrap();
    let store: Arc<dyn Datastore> = Arc::new(FilesystemBackend::new(temp.path()).await.unwrap());
    let engine = engine_with(EngineConfig::default(), Some(store), None);
    engine.start().await.unwrap();
    engine
        .register_callback(to_callback(multihashes(b"long", 3)))
        .await;

    let context_id = vec![7u8; 1024];
    let first = engine.notify_put(&context_id, md(b"v1")).await.unwrap();
    assert!(matches!(
        engine.notify_put(&context_id, md(b"v1")).await,
        Err(EngineError::AlreadyAdvertised)
    ));

    let ad = engine.get_advertisement(&first).await.unwrap();
    assert_eq!(engine.entries(&ad.entries).await.unwrap(), multihashes(b"long", 3));

    let removal = engine.notify_remove(&context_id).await.unwrap();
    assert_eq!(engine.head().await.unwrap(), Some(removal));
    assert!(matches!(
        engine.notify_remove(&context_id).await,
        Err(EngineError::ContextIdNotFound)
    ));
}

#[tokio::test]
async fn test_start_retry_reuses_supplied_announcer() {
    let store: Arc<dyn Datastore> = Arc::new(MemoryBackend::new());
    let seed = engine_with(EngineConfig::default(), Some(store.clone()), None);
    let ad = seed
        .new_advertisement(b"ctx", Link::compute(b"entries"), md(b"1"), false)
        .await
        .unwrap();
    let head = seed.publish_local(&ad).await.unwrap();

    let announcer = Arc::new(FlakyAnnouncer::new(1));
    let engine =
        engine_with(EngineConfig::default(), Some(store), None).with_announcer(announcer.clone());

    assert!(matches!(engine.start().await, Err(EngineError::Announce(_))));
    assert!(!announcer.recorder.is_closed());

    engine.start().await.unwrap();
    assert_eq!(announcer.recorder.heads(), vec![head]);
}
