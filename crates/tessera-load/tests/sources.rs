mod common;

use std::rc::Rc;

use common::{ARCHIVE, CHUNKED, Harness, IMAGE};
use rstest::rstest;
use tessera_core::{
    ErrorCode, FetchError, LoadError, MockUrlRegistry, SourceKind, SourceOptions, TransportKind,
};
use tessera_load::{Pipeline, PipelineConfig, Services};
use tessera_test_utils::{
    ArchiveBuilder, ChunkedBuilder, MemoryFetcher, MemorySurface, RecordingListener, pattern,
};

fn chunked_pack() -> bytes::Bytes {
    ChunkedBuilder::new()
        .master("bg", 4, 4, &pattern(4, 4, 4, 1))
        .master("icon", 2, 2, &pattern(2, 2, 4, 2))
        .build()
}

fn archive_pack() -> bytes::Bytes {
    ArchiveBuilder::v1()
        .master("bg", 4, 4, &pattern(4, 4, 4, 1))
        .master("icon", 2, 2, &pattern(2, 2, 4, 2))
        .build()
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(8)]
fn concurrent_requests_share_one_load(#[case] consumers: usize) {
    let h = Harness::new();
    h.serve(CHUNKED, chunked_pack());

    let listeners: Vec<_> = (0..consumers)
        .map(|_| {
            let (id, listener) = h.consumer();
            assert!(h.pipeline.load_source(id, CHUNKED, SourceKind::Chunked, SourceOptions::default()));
            listener
        })
        .collect();
    h.settle();

    assert_eq!(h.fetcher.call_count(CHUNKED), 1);
    for listener in listeners {
        assert_eq!(
            listener.source_successes(CHUNKED),
            vec![vec!["bg".to_string(), "icon".to_string()]]
        );
    }
}

#[rstest]
#[case(SourceKind::Chunked, CHUNKED)]
#[case(SourceKind::Archive, ARCHIVE)]
fn repeated_request_does_not_duplicate_waiter(#[case] kind: SourceKind, #[case] source: &str) {
    let h = Harness::new();
    h.serve(CHUNKED, chunked_pack());
    h.serve(ARCHIVE, archive_pack());
    let (id, listener) = h.consumer();

    h.pipeline.load_source(id, source, kind, SourceOptions::default());
    h.pipeline.load_source(id, source, kind, SourceOptions::default());
    h.settle();

    assert_eq!(listener.source_successes(source).len(), 1);
    assert_eq!(listener.outcomes().len(), 1);
}

#[rstest]
#[case(SourceKind::Chunked, CHUNKED)]
#[case(SourceKind::Archive, ARCHIVE)]
fn cached_source_notifies_on_a_later_tick(#[case] kind: SourceKind, #[case] source: &str) {
    let h = Harness::new();
    h.serve(CHUNKED, chunked_pack());
    h.serve(ARCHIVE, archive_pack());
    let (first, _) = h.consumer();
    h.pipeline.load_source(first, source, kind, SourceOptions::default());
    h.settle();

    let (second, listener) = h.consumer();
    assert!(h.pipeline.load_source(second, source, kind, SourceOptions::default()));
    assert!(listener.is_empty(), "hit must not be delivered inline");

    h.pipeline.tick();
    assert_eq!(listener.source_successes(source).len(), 1);
    assert_eq!(h.fetcher.call_count(source), 1);
}

#[test]
fn unregistered_source_is_refused() {
    let h = Harness::new();
    let (id, listener) = h.consumer();

    assert!(!h.pipeline.load_source(id, ARCHIVE, SourceKind::Archive, SourceOptions::default()));
    h.settle();

    assert!(listener.is_empty());
    assert_eq!(h.fetcher.total_calls(), 0);
}

#[test]
fn unknown_consumer_is_refused() {
    let h = Harness::new();
    h.serve(ARCHIVE, archive_pack());
    let (id, _) = h.consumer();
    h.pipeline.unregister_consumer(id);

    assert!(!h.pipeline.load_source(id, ARCHIVE, SourceKind::Archive, SourceOptions::default()));
}

#[test]
fn registered_but_unresolvable_source_fails() {
    let h = Harness::new();
    h.registry.register_unresolved(ARCHIVE);
    let (id, listener) = h.consumer();

    assert!(h.pipeline.load_source(id, ARCHIVE, SourceKind::Archive, SourceOptions::default()));
    h.settle();

    let errors = listener.source_errors(ARCHIVE);
    assert_eq!(errors, vec![LoadError::UnregisteredUrl(ARCHIVE.to_string())]);
    assert_eq!(errors[0].code(), ErrorCode::Unregistered);
}

#[test]
fn resolution_goes_through_the_registry() {
    let mut registry = MockUrlRegistry::new();
    registry
        .expect_is_registered()
        .withf(|source| source == "pack-7")
        .return_const(true);
    registry
        .expect_resolve()
        .withf(|source| source == "pack-7")
        .times(1)
        .returning(|_| Some(url::Url::parse(CHUNKED).unwrap()));

    let surface = Rc::new(MemorySurface::new());
    let fetcher = Rc::new(MemoryFetcher::new());
    fetcher.serve(CHUNKED, chunked_pack());
    let services = Services::new(Rc::new(registry), surface).with_fetcher(fetcher.clone());
    let pipeline = Pipeline::new(PipelineConfig::default(), services);
    let listener = Rc::new(RecordingListener::new());
    let id = pipeline.register_consumer(listener.clone());

    assert!(pipeline.load_source(id, "pack-7", SourceKind::Chunked, SourceOptions::default()));
    pipeline.run_until_idle(100);

    assert_eq!(listener.source_successes("pack-7").len(), 1);
    assert_eq!(fetcher.call_count(CHUNKED), 1);
}

#[test]
fn missing_fetcher_is_an_integration_error() {
    let registry = Rc::new(tessera_test_utils::StaticRegistry::new());
    registry.register(CHUNKED);
    let services = Services::new(registry, Rc::new(MemorySurface::new()));
    let pipeline = Pipeline::new(PipelineConfig::default(), services);
    let listener = Rc::new(RecordingListener::new());
    let id = pipeline.register_consumer(listener.clone());

    pipeline.load_source(id, CHUNKED, SourceKind::Chunked, SourceOptions::default());
    pipeline.run_until_idle(100);

    let errors = listener.source_errors(CHUNKED);
    assert_eq!(errors, vec![LoadError::NotConfigured("fetcher")]);
    assert_eq!(errors[0].code(), ErrorCode::NotConfigured);
}

#[test]
fn fetch_failure_fans_out_without_retry() {
    let h = Harness::new();
    h.registry.register(ARCHIVE);
    h.fetcher.fail(ARCHIVE, FetchError::new(429, "slow down"));
    let (a, la) = h.consumer();
    let (b, lb) = h.consumer();

    h.pipeline.load_source(a, ARCHIVE, SourceKind::Archive, SourceOptions::default());
    h.pipeline.load_source(b, ARCHIVE, SourceKind::Archive, SourceOptions::default());
    h.settle();

    for listener in [&la, &lb] {
        let errors = listener.source_errors(ARCHIVE);
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            LoadError::Transport(t) => assert_eq!(t.kind, TransportKind::RateLimited),
            other => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(h.fetcher.call_count(ARCHIVE), 1);

    h.fetcher.serve(ARCHIVE, archive_pack());
    h.pipeline.load_source(a, ARCHIVE, SourceKind::Archive, SourceOptions::default());
    h.settle();
    assert_eq!(h.fetcher.call_count(ARCHIVE), 2);
    assert_eq!(la.source_successes(ARCHIVE).len(), 1);
}

#[rstest]
#[case::version(2, None, ErrorCode::UnsupportedManifest)]
#[case::feature(1, Some("hdr"), ErrorCode::UnsupportedManifest)]
#[case::format_feature(1, Some("format:yuv420"), ErrorCode::UnsupportedManifest)]
fn unsupported_manifest_fails_whole_source(
    #[case] version: u64,
    #[case] feature: Option<&str>,
    #[case] code: ErrorCode,
) {
    let h = Harness::new();
    let mut chunked = ChunkedBuilder::new()
        .manifest_version(version)
        .master("bg", 4, 4, &pattern(4, 4, 4, 1));
    let mut archive = ArchiveBuilder::v1()
        .manifest_version(version)
        .master("bg", 4, 4, &pattern(4, 4, 4, 1));
    if let Some(feature) = feature {
        chunked = chunked.require(feature);
        archive = archive.require(feature);
    }
    h.serve(CHUNKED, chunked.build());
    h.serve(ARCHIVE, archive.build());
    let (id, listener) = h.consumer();

    h.pipeline.load_source(id, CHUNKED, SourceKind::Chunked, SourceOptions::default());
    h.pipeline.load_source(id, ARCHIVE, SourceKind::Archive, SourceOptions::default());
    h.settle();

    for source in [CHUNKED, ARCHIVE] {
        let errors = listener.source_errors(source);
        assert_eq!(errors.len(), 1, "{source}");
        assert_eq!(errors[0].code(), code);
        assert!(h.pipeline.cache().file_names(source).is_empty());
        assert!(!h.pipeline.load_file(id, source, "bg", 0, None));
    }
    assert_eq!(h.surface.live(), 0);
}

#[test]
fn image_source_yields_one_file() {
    let h = Harness::new();
    h.registry.register(IMAGE);
    h.images.serve(IMAGE, 5, 3);
    let (id, listener) = h.consumer();

    h.pipeline.load_source(id, IMAGE, SourceKind::Image, SourceOptions::default());
    h.settle();

    assert_eq!(listener.source_successes(IMAGE), vec![vec!["hero.png".to_string()]]);
    assert_eq!(h.pipeline.references(id, IMAGE, "hero.png"), 1);
    let texture = h.pipeline.cache().peek(IMAGE, "hero.png").unwrap();
    let desc = h.surface.desc(texture).unwrap();
    assert_eq!((desc.width, desc.height), (5, 3));
}

#[test]
fn image_decode_failure_is_reported() {
    let h = Harness::new();
    h.registry.register(IMAGE);
    let (id, listener) = h.consumer();

    h.pipeline.load_source(id, IMAGE, SourceKind::Image, SourceOptions::default());
    h.settle();

    let errors = listener.source_errors(IMAGE);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), ErrorCode::Decode);
}

#[rstest]
#[case("file:///assets/poster.png", Ok("poster.png"))]
#[case("https://cdn.example/poster.png", Err("https"))]
fn local_source_requires_file_scheme(#[case] source: &str, #[case] expected: Result<&str, &str>) {
    let h = Harness::new();
    h.registry.register(source);
    h.images.serve(source, 2, 2);
    let (id, listener) = h.consumer();

    h.pipeline.load_source(id, source, SourceKind::Local, SourceOptions::default());
    h.settle();

    match expected {
        Ok(file) => assert_eq!(listener.source_successes(source), vec![vec![file.to_string()]]),
        Err(scheme) => assert_eq!(
            listener.source_errors(source),
            vec![LoadError::UnsupportedScheme(scheme.to_string())]
        ),
    }
}

#[test]
fn unload_releases_every_reference() {
    let h = Harness::new();
    h.serve(ARCHIVE, archive_pack());
    let (id, _) = h.consumer();
    h.pipeline.load_source(id, ARCHIVE, SourceKind::Archive, SourceOptions::default());
    h.settle();

    assert_eq!(h.pipeline.references(id, ARCHIVE, "bg"), 1);
    assert_eq!(h.pipeline.cache().source_used_count(ARCHIVE), Some(2));
    assert_eq!(h.surface.live(), 2);

    h.pipeline.unload_source(id, ARCHIVE);

    assert!(!h.pipeline.cache().has_source(ARCHIVE));
    assert_eq!(h.pipeline.references(id, ARCHIVE, "bg"), 0);
    assert_eq!(h.surface.live(), 0);
    assert_eq!(h.pipeline.cache().raw_len(), 0);
}

#[test]
fn shared_source_survives_one_unload() {
    let h = Harness::new();
    h.serve(ARCHIVE, archive_pack());
    let (a, _) = h.consumer();
    let (b, lb) = h.consumer();
    h.pipeline.load_source(a, ARCHIVE, SourceKind::Archive, SourceOptions::default());
    h.pipeline.load_source(b, ARCHIVE, SourceKind::Archive, SourceOptions::default());
    h.settle();

    h.pipeline.unload_source(a, ARCHIVE);

    assert!(h.pipeline.cache().has_file(ARCHIVE, "bg"));
    assert_eq!(h.pipeline.cache().file_used_count(ARCHIVE, "bg"), Some(1));
    assert_eq!(lb.source_successes(ARCHIVE).len(), 1);

    h.pipeline.unregister_consumer(b);
    assert!(!h.pipeline.cache().has_source(ARCHIVE));
}

#[test]
fn unloaded_waiter_is_not_notified() {
    let h = Harness::new();
    h.serve(ARCHIVE, archive_pack());
    let (a, la) = h.consumer();
    let (b, lb) = h.consumer();
    h.pipeline.load_source(a, ARCHIVE, SourceKind::Archive, SourceOptions::default());
    h.pipeline.load_source(b, ARCHIVE, SourceKind::Archive, SourceOptions::default());
    h.pipeline.tick();

    h.pipeline.unload_source(a, ARCHIVE);
    h.settle();

    assert!(la.outcomes().is_empty());
    assert_eq!(lb.source_successes(ARCHIVE).len(), 1);
    assert_eq!(h.fetcher.call_count(ARCHIVE), 1);
}

#[test]
fn source_reloads_after_being_evicted() {
    let h = Harness::new();
    h.serve(ARCHIVE, archive_pack());
    let (id, listener) = h.consumer();
    h.pipeline.load_source(id, ARCHIVE, SourceKind::Archive, SourceOptions::default());
    h.settle();
    h.pipeline.unload_source(id, ARCHIVE);

    h.pipeline.load_source(id, ARCHIVE, SourceKind::Archive, SourceOptions::default());
    h.settle();

    assert_eq!(h.fetcher.call_count(ARCHIVE), 2);
    assert_eq!(listener.source_successes(ARCHIVE).len(), 2);
    assert_eq!(h.pipeline.references(id, ARCHIVE, "icon"), 1);
}
