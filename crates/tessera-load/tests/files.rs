mod common;

use std::rc::Rc;

use bytes::Bytes;
use common::{CHUNKED, Harness, overwrite};
use rstest::rstest;
use serde_json::json;
use tessera_core::{Channel, ConsumerId, ErrorCode, LoadError, Rect, SourceKind, SourceOptions};
use tessera_load::{Pipeline, PipelineConfig, Services};
use tessera_test_utils::{
    ChunkedBuilder, MemoryFetcher, MemorySurface, Recorded, RecordingListener, StaticRegistry,
    pattern,
};

const W: u32 = 8;
const H: u32 = 6;

fn master() -> Vec<u8> {
    pattern(W, H, 4, 3)
}

fn patch_stream() -> Vec<u8> {
    pattern(4, 2, 4, 200)
}

/// `m` (master 8x6), `p` patching `m` at (2,3,4,2), `q` patching `p`.
fn layered_pack() -> Bytes {
    let stream = patch_stream();
    let corner = pattern(1, 1, 4, 90);
    ChunkedBuilder::new()
        .master("m", W, H, &master())
        .patch("p", "m", W, H, &[(Rect::new(2, 3, 4, 2), stream.as_slice())])
        .patch("q", "p", W, H, &[(Rect::new(0, 0, 1, 1), corner.as_slice())])
        .build()
}

fn loaded(pack: Bytes) -> (Harness, ConsumerId, Rc<RecordingListener>) {
    let h = Harness::new();
    h.serve(CHUNKED, pack);
    let (id, listener) = h.consumer();
    h.pipeline.load_source(id, CHUNKED, SourceKind::Chunked, SourceOptions::default());
    h.settle();
    listener.clear();
    (h, id, listener)
}

fn loaded_files(listener: &RecordingListener) -> Vec<String> {
    listener.file_successes().into_iter().map(|(f, _)| f).collect()
}

#[test]
fn chunked_source_decodes_nothing_up_front() {
    let (h, _, _) = loaded(layered_pack());

    assert_eq!(h.decompressor.calls(), 0);
    assert!(h.pipeline.cache().file_names(CHUNKED).is_empty());
}

#[test]
fn patch_overwrites_declared_rows_of_base() {
    let (h, id, listener) = loaded(layered_pack());

    assert!(h.pipeline.load_file(id, CHUNKED, "p", 0, Some(Channel(7))));
    h.settle();

    assert_eq!(listener.file_successes(), vec![("p".to_string(), Some(Channel(7)))]);
    let expected = overwrite(&master(), W, (2, 3, 4, 2), &patch_stream());
    let raw = h.pipeline.cache().file_raw(CHUNKED, "p").unwrap();
    assert_eq!(&raw[..], expected.as_slice());

    let texture = h.pipeline.cache().peek(CHUNKED, "p").unwrap();
    assert_eq!(h.surface.pixels(texture).unwrap(), expected);
    assert_eq!(
        h.pipeline.cache().metadata(CHUNKED, "p").unwrap().dependency.as_deref(),
        Some("m")
    );
    assert_eq!(h.pipeline.references(id, CHUNKED, "p"), 1);
    assert_eq!(h.pipeline.references(id, CHUNKED, "m"), 0);
}

#[test]
fn two_level_chain_resolves_in_order() {
    let (h, id, listener) = loaded(layered_pack());

    h.pipeline.load_file(id, CHUNKED, "q", 0, None);
    h.pipeline.load_file(id, CHUNKED, "m", 0, None);
    h.pipeline.load_file(id, CHUNKED, "p", 0, None);

    assert_eq!(h.pipeline.file_priority(CHUNKED, "q"), Some(0));
    assert_eq!(h.pipeline.file_priority(CHUNKED, "p"), Some(1));
    assert_eq!(h.pipeline.file_priority(CHUNKED, "m"), Some(2));
    h.settle();

    assert_eq!(loaded_files(&listener), vec!["m", "p", "q"]);
    let q = h.pipeline.cache().file_raw(CHUNKED, "q").unwrap();
    let p = h.pipeline.cache().file_raw(CHUNKED, "p").unwrap();
    assert_eq!(&q[4..], &p[4..]);
    assert_eq!(&q[..4], pattern(1, 1, 4, 90).as_slice());
}

#[test]
fn base_gets_higher_priority_and_loads_first() {
    let pack = ChunkedBuilder::new()
        .master("b", W, H, &master())
        .patch("a", "b", W, H, &[(Rect::new(0, 0, 4, 2), patch_stream().as_slice())])
        .build();
    let (h, id, listener) = loaded(pack);

    h.pipeline.load_file(id, CHUNKED, "a", 1, None);
    let a = h.pipeline.file_priority(CHUNKED, "a").unwrap();
    let b = h.pipeline.file_priority(CHUNKED, "b").unwrap();
    assert!(b > a, "base priority {b} must exceed dependent {a}");

    h.pipeline.load_file(id, CHUNKED, "b", 0, None);
    assert_eq!(h.pipeline.file_priority(CHUNKED, "b"), Some(b));
    h.settle();

    assert_eq!(loaded_files(&listener), vec!["b", "a"]);
}

#[test]
fn higher_priority_request_in_same_tick_goes_first() {
    let pack = ChunkedBuilder::new()
        .master("low", 2, 2, &pattern(2, 2, 4, 1))
        .master("high", 2, 2, &pattern(2, 2, 4, 2))
        .master("mid", 2, 2, &pattern(2, 2, 4, 3))
        .build();
    let (h, id, listener) = loaded(pack);

    h.pipeline.load_file(id, CHUNKED, "low", 1, None);
    h.pipeline.load_file(id, CHUNKED, "high", 9, None);
    h.pipeline.load_file(id, CHUNKED, "mid", 5, None);
    h.settle();

    assert_eq!(loaded_files(&listener), vec!["high", "mid", "low"]);
}

#[test]
fn equal_priorities_keep_request_order() {
    let pack = ChunkedBuilder::new()
        .master("one", 2, 2, &pattern(2, 2, 4, 1))
        .master("two", 2, 2, &pattern(2, 2, 4, 2))
        .master("three", 2, 2, &pattern(2, 2, 4, 3))
        .build();
    let (h, id, listener) = loaded(pack);

    for file in ["one", "two", "three"] {
        h.pipeline.load_file(id, CHUNKED, file, 4, None);
    }
    h.settle();

    assert_eq!(loaded_files(&listener), vec!["one", "two", "three"]);
}

#[rstest]
#[case(5, 1, 5)]
#[case(1, 9, 9)]
#[case(3, 3, 3)]
fn priority_is_raised_never_lowered(#[case] first: i32, #[case] second: i32, #[case] expected: i32) {
    let (h, id, _) = loaded(layered_pack());

    h.pipeline.load_file(id, CHUNKED, "m", first, None);
    h.pipeline.load_file(id, CHUNKED, "m", second, None);

    assert_eq!(h.pipeline.file_priority(CHUNKED, "m"), Some(expected));
}

#[test]
fn raising_a_dependent_reboosts_its_bases() {
    let (h, id, _) = loaded(layered_pack());

    h.pipeline.load_file(id, CHUNKED, "q", 0, None);
    h.pipeline.load_file(id, CHUNKED, "q", 10, None);

    assert_eq!(h.pipeline.file_priority(CHUNKED, "q"), Some(10));
    assert_eq!(h.pipeline.file_priority(CHUNKED, "p"), Some(11));
    assert_eq!(h.pipeline.file_priority(CHUNKED, "m"), Some(12));
}

#[test]
fn same_waiter_is_notified_once() {
    let (h, id, listener) = loaded(layered_pack());

    h.pipeline.load_file(id, CHUNKED, "m", 0, Some(Channel(1)));
    h.pipeline.load_file(id, CHUNKED, "m", 0, Some(Channel(1)));
    h.pipeline.load_file(id, CHUNKED, "m", 0, Some(Channel(2)));
    h.settle();

    assert_eq!(
        listener.file_successes(),
        vec![
            ("m".to_string(), Some(Channel(1))),
            ("m".to_string(), Some(Channel(2))),
        ]
    );
    assert_eq!(h.decompressor.calls(), 1);
}

#[test]
fn cached_file_is_delivered_on_a_later_tick() {
    let (h, id, listener) = loaded(layered_pack());
    h.pipeline.load_file(id, CHUNKED, "m", 0, None);
    h.settle();
    listener.clear();

    assert!(h.pipeline.load_file(id, CHUNKED, "m", 0, Some(Channel(3))));
    assert!(listener.is_empty());
    h.pipeline.tick();

    assert_eq!(listener.file_successes(), vec![("m".to_string(), Some(Channel(3)))]);
    assert_eq!(h.pipeline.references(id, CHUNKED, "m"), 2);
    assert_eq!(h.decompressor.calls(), 1);
}

#[test]
fn invalidated_texture_is_rebuilt_from_shadow() {
    let (h, id, _) = loaded(layered_pack());
    h.pipeline.load_file(id, CHUNKED, "p", 0, None);
    h.settle();
    let before = h.pipeline.cache().peek(CHUNKED, "p").unwrap();
    let pixels = h.surface.pixels(before).unwrap();
    let fetches = h.fetcher.total_calls();
    let decodes = h.decompressor.calls();

    h.surface.invalidate(before);
    let after = h.pipeline.acquire(id, CHUNKED, "p").unwrap();

    assert_ne!(after, before);
    assert_eq!(h.surface.pixels(after).unwrap(), pixels);
    assert_eq!(h.fetcher.total_calls(), fetches);
    assert_eq!(h.decompressor.calls(), decodes);
}

#[test]
fn released_file_is_gone() {
    let (h, id, _) = loaded(layered_pack());
    h.pipeline.load_file(id, CHUNKED, "m", 0, None);
    h.settle();
    let texture = h.pipeline.cache().peek(CHUNKED, "m").unwrap();

    h.pipeline.release_file(id, CHUNKED, "m");

    assert_eq!(h.pipeline.references(id, CHUNKED, "m"), 0);
    assert!(h.surface.pixels(texture).is_none());
    assert!(h.pipeline.acquire(id, CHUNKED, "m").is_none());
}

/// `m` and `x` (independent masters) and `p` patching `m`.
fn sibling_pack() -> Bytes {
    ChunkedBuilder::new()
        .master("m", W, H, &master())
        .master("x", W, H, &pattern(W, H, 4, 60))
        .patch("p", "m", W, H, &[(Rect::new(2, 3, 4, 2), patch_stream().as_slice())])
        .build()
}

#[test]
fn released_file_misses_while_a_sibling_is_held() {
    let (h, id, listener) = loaded(sibling_pack());
    h.pipeline.load_file(id, CHUNKED, "m", 0, None);
    h.pipeline.load_file(id, CHUNKED, "x", 0, None);
    h.settle();
    let texture = h.pipeline.cache().peek(CHUNKED, "m").unwrap();

    h.pipeline.release_file(id, CHUNKED, "m");

    assert!(h.pipeline.cache().has_source(CHUNKED));
    assert!(!h.pipeline.cache().has_file(CHUNKED, "m"));
    assert!(h.pipeline.cache().file_raw(CHUNKED, "m").is_none());
    assert!(h.surface.pixels(texture).is_none());
    assert!(h.pipeline.acquire(id, CHUNKED, "m").is_none());
    assert!(h.pipeline.acquire(id, CHUNKED, "x").is_some());

    listener.clear();
    h.pipeline.load_file(id, CHUNKED, "m", 0, None);
    h.settle();
    assert_eq!(loaded_files(&listener), vec!["m"]);
    assert_eq!(h.decompressor.calls(), 3);
}

#[rstest]
#[case::before_patch_starts(0)]
#[case::while_patch_decompresses(1)]
fn base_evicted_under_queued_patch_is_decoded_again(#[case] ticks_after_base: usize) {
    let h = Harness::new();
    h.serve(CHUNKED, sibling_pack());
    let (holder, _) = h.consumer();
    let (reader, listener) = h.consumer();
    for id in [holder, reader] {
        h.pipeline.load_source(id, CHUNKED, SourceKind::Chunked, SourceOptions::default());
    }
    h.settle();
    h.pipeline.load_file(holder, CHUNKED, "x", 0, None);
    h.settle();
    listener.clear();

    h.pipeline.load_file(reader, CHUNKED, "p", 0, None);
    let mut ticks = 0;
    while !h.pipeline.cache().has_file(CHUNKED, "m") {
        assert!(ticks < 100, "base never stored");
        h.pipeline.tick();
        ticks += 1;
    }
    for _ in 0..ticks_after_base {
        h.pipeline.tick();
    }
    h.pipeline.release_file(holder, CHUNKED, "x");
    assert!(!h.pipeline.cache().has_source(CHUNKED));
    h.settle();

    assert_eq!(listener.file_errors(), vec![]);
    assert_eq!(loaded_files(&listener), vec!["p"]);
    let expected = overwrite(&master(), W, (2, 3, 4, 2), &patch_stream());
    let raw = h.pipeline.cache().file_raw(CHUNKED, "p").unwrap();
    assert_eq!(&raw[..], expected.as_slice());
    assert_eq!(h.pipeline.references(reader, CHUNKED, "p"), 1);
}

#[test]
fn failed_base_is_not_decoded_again_for_its_patch() {
    let (h, id, listener) = loaded(layered_pack());
    h.decompressor.fail_next();

    h.pipeline.load_file(id, CHUNKED, "p", 0, None);
    h.settle();

    let errors = listener.file_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "p");
    assert_eq!(errors[0].1.code(), ErrorCode::UnresolvedBase);
    assert_eq!(h.decompressor.calls(), 2);
}

#[test]
fn file_decode_without_decompressor_is_not_configured() {
    common::init_tracing();
    let registry = Rc::new(StaticRegistry::new());
    let surface = Rc::new(MemorySurface::new());
    let fetcher = Rc::new(MemoryFetcher::new());
    registry.register(CHUNKED);
    fetcher.serve(CHUNKED, layered_pack());
    let services = Services::new(registry, surface)
        .with_fetcher(fetcher)
        .without_decompressor();
    let pipeline = Pipeline::new(PipelineConfig::default(), services);
    let listener = Rc::new(RecordingListener::new());
    let id = pipeline.register_consumer(listener.clone());

    pipeline.load_source(id, CHUNKED, SourceKind::Chunked, SourceOptions::default());
    pipeline.run_until_idle(100);
    assert_eq!(listener.source_successes(CHUNKED).len(), 1);

    pipeline.load_file(id, CHUNKED, "m", 0, None);
    pipeline.run_until_idle(100);
    assert_eq!(
        listener.file_errors(),
        vec![("m".to_string(), LoadError::NotConfigured("decompressor"))]
    );
}

#[test]
fn out_of_range_rect_fails_only_that_file() {
    let pack = ChunkedBuilder::new()
        .master("m", W, H, &master())
        .patch("bad", "m", W, H, &[(Rect::new(6, 5, 4, 2), patch_stream().as_slice())])
        .build();
    let (h, id, listener) = loaded(pack);

    h.pipeline.load_file(id, CHUNKED, "bad", 0, None);
    h.pipeline.load_file(id, CHUNKED, "m", 0, None);
    h.settle();

    assert_eq!(loaded_files(&listener), vec!["m"]);
    let errors = listener.file_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "bad");
    assert_eq!(errors[0].1.code(), ErrorCode::BadPatch);
    assert!(!h.pipeline.cache().has_file(CHUNKED, "bad"));
}

#[test]
fn patch_without_rects_fails() {
    let pack = ChunkedBuilder::new()
        .master("m", W, H, &master())
        .patch("empty", "m", W, H, &[])
        .build();
    let (h, id, listener) = loaded(pack);

    h.pipeline.load_file(id, CHUNKED, "empty", 0, Some(Channel(4)));
    h.settle();

    assert_eq!(
        listener.outcomes(),
        vec![Recorded::FileFailed {
            source: CHUNKED.to_string(),
            file: "empty".to_string(),
            channel: Some(Channel(4)),
            error: LoadError::MissingPatchRect { file: "empty".into() },
        }]
    );
}

#[test]
fn missing_base_fails_the_request() {
    let pack = ChunkedBuilder::new()
        .patch("orphan", "ghost", W, H, &[(Rect::new(0, 0, 4, 2), patch_stream().as_slice())])
        .build();
    let (h, id, listener) = loaded(pack);

    h.pipeline.load_file(id, CHUNKED, "orphan", 0, None);
    assert!(listener.is_empty());
    h.settle();

    let errors = listener.file_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1.code(), ErrorCode::UnresolvedBase);
    assert_eq!(h.decompressor.calls(), 0);
}

#[test]
fn unknown_and_rejected_entries_fail_on_a_later_tick() {
    let pack = ChunkedBuilder::new()
        .master("m", W, H, &master())
        .file(json!({
            "name": "broken",
            "format": "rgba32",
            "height": 2,
            "chunk": { "offset": 0, "length": 1, "size": 1 },
        }))
        .build();
    let (h, id, listener) = loaded(pack);

    assert!(h.pipeline.load_file(id, CHUNKED, "broken", 0, None));
    assert!(h.pipeline.load_file(id, CHUNKED, "nope", 0, None));
    assert!(listener.is_empty());
    h.settle();

    let errors = listener.file_errors();
    assert_eq!(
        errors,
        vec![
            (
                "broken".to_string(),
                LoadError::MissingField { entry: "broken".into(), field: "width" }
            ),
            (
                "nope".to_string(),
                LoadError::UnknownFile { source_url: CHUNKED.into(), file: "nope".into() }
            ),
        ]
    );
}

#[test]
fn decompress_failure_is_not_retried() {
    let (h, id, listener) = loaded(layered_pack());
    h.decompressor.fail_next();

    h.pipeline.load_file(id, CHUNKED, "m", 0, None);
    h.settle();

    let errors = listener.file_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].1, LoadError::Decompress(_)));
    assert_eq!(h.decompressor.calls(), 1);

    h.pipeline.load_file(id, CHUNKED, "m", 0, None);
    h.settle();
    assert_eq!(loaded_files(&listener), vec!["m"]);
}

#[test]
fn file_request_before_source_is_refused() {
    let h = Harness::new();
    h.serve(CHUNKED, layered_pack());
    let (id, listener) = h.consumer();

    assert!(!h.pipeline.load_file(id, CHUNKED, "m", 0, None));
    h.pipeline.load_source(id, CHUNKED, SourceKind::Chunked, SourceOptions::default());
    assert!(!h.pipeline.load_file(id, CHUNKED, "m", 0, None));
    h.settle();

    assert!(listener.file_errors().is_empty());
    assert!(listener.file_successes().is_empty());
}

#[test]
fn unloading_consumer_stops_its_notifications_only() {
    let h = Harness::new();
    h.serve(CHUNKED, layered_pack());
    let (a, la) = h.consumer();
    let (b, lb) = h.consumer();
    for id in [a, b] {
        h.pipeline.load_source(id, CHUNKED, SourceKind::Chunked, SourceOptions::default());
    }
    h.settle();

    h.pipeline.load_file(a, CHUNKED, "p", 0, None);
    h.pipeline.load_file(b, CHUNKED, "p", 0, None);
    h.pipeline.tick();
    h.pipeline.unload_source(a, CHUNKED);
    h.settle();

    assert!(la.file_successes().is_empty());
    assert_eq!(loaded_files(&lb), vec!["p"]);
    assert_eq!(h.pipeline.references(b, CHUNKED, "p"), 1);
}

#[test]
fn last_unload_drops_decoded_entries() {
    let (h, id, _) = loaded(layered_pack());
    h.pipeline.load_file(id, CHUNKED, "q", 0, None);
    h.settle();
    assert_eq!(h.pipeline.cache().file_names(CHUNKED), vec!["m", "p", "q"]);

    h.pipeline.unload_source(id, CHUNKED);

    assert!(!h.pipeline.cache().has_source(CHUNKED));
    assert_eq!(h.surface.live(), 0);
    assert!(!h.pipeline.load_file(id, CHUNKED, "q", 0, None));
}
