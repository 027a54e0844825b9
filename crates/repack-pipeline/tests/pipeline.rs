use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use repack_archive::{ArchiveWriter, extract, list_entries};
use repack_pipeline::{
    Batch, DEFAULT_MARKER_CONTENT, DEFAULT_MARKER_NAME, LevelSpec, LocateRule, MarkerTransform, NestingSchema,
    Pipeline, PipelineError, SearchMode, Transform, TransformError,
};
use repack_verify::{FindingKind, verify_archive};

const BUNDLE: &str = "コネクト_v1.0.0";
const THIRD_PARTY: &str = "コネクト_3rd_v1.0.0.zip";

fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ArchiveWriter::new(Vec::new());
    for (name, data) in files {
        writer.add_file(name, data, None).unwrap();
    }
    writer.finish().unwrap().0
}

fn framework(name: &str) -> Vec<u8> {
    let plist = format!("<plist><string>{name}</string></plist>\n");
    let binary = format!("binary of {name}\n").repeat(16);
    zip_bytes(&[
        (&format!("{name}.xcframework/Info.plist"), plist.as_bytes()),
        (&format!("{name}.xcframework/ios-arm64/{name}.framework/{name}"), binary.as_bytes()),
    ])
}

fn third_party() -> Vec<u8> { zip_bytes(&[("lib/libthird.a", b"third party payload")]) }

fn bundle() -> Vec<u8> {
    let aaa = framework("aaa");
    let bbb = framework("bbb");
    zip_bytes(&[
        (&format!("{BUNDLE}/{BUNDLE}/README.txt"), b"bundle readme"),
        (&format!("{BUNDLE}/{BUNDLE}/aaa.xcframework.zip"), &aaa),
        (&format!("{BUNDLE}/{BUNDLE}/nested/bbb.xcframework.zip"), &bbb),
    ])
}

/// `20260105.zip` with one bundle to process and one third-party bundle to leave alone.
fn root_archive(dir: &Path) -> PathBuf {
    let bundle = bundle();
    let third = third_party();
    let path = dir.join("20260105.zip");
    std::fs::write(
        &path,
        zip_bytes(&[
            (&format!("connect/バイナリ/{BUNDLE}.zip"), &bundle),
            (&format!("connect/バイナリ/{THIRD_PARTY}"), &third),
            ("docs/リリースノート.txt", b"notes"),
        ]),
    )
    .unwrap();
    path
}

fn pipeline(output: &Path, work_root: &Path) -> Pipeline {
    Pipeline::new(NestingSchema::default(), output)
        .work_root(work_root)
        .transform(MarkerTransform::default())
}

fn is_empty_dir(path: &Path) -> bool { std::fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true) }

fn unpack(archive: &Path, into: &Path) -> PathBuf {
    extract(archive, into).unwrap();
    into.to_path_buf()
}

#[test]
fn nested_archive_is_signed_and_rewrapped() {
    let dir = tempfile::tempdir().unwrap();
    let input = root_archive(dir.path());
    let output_dir = dir.path().join("signed");
    let work_root = dir.path().join("work");

    let outcome = pipeline(&output_dir, &work_root).process(&input).unwrap();

    let connect = format!("20260105.zip!/connect/バイナリ/{BUNDLE}.zip");
    assert_eq!(outcome.output, output_dir.join("20260105.zip"));
    assert_eq!(outcome.leaves, [
        format!("{connect}!/{BUNDLE}/{BUNDLE}/aaa.xcframework.zip"),
        format!("{connect}!/{BUNDLE}/{BUNDLE}/nested/bbb.xcframework.zip"),
    ]);
    assert_eq!(outcome.excluded, [format!("20260105.zip!/connect/バイナリ/{THIRD_PARTY}")]);
    assert_eq!(outcome.recompressed, 4);
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    assert!(is_empty_dir(&work_root));

    // Walk back down through the output.
    let root = unpack(&outcome.output, &dir.path().join("check/root"));
    assert_eq!(std::fs::read(root.join("docs/リリースノート.txt")).unwrap(), b"notes");
    assert_eq!(std::fs::read(root.join(format!("connect/バイナリ/{THIRD_PARTY}"))).unwrap(), third_party());

    let connect_dir = unpack(
        &root.join(format!("connect/バイナリ/{BUNDLE}.zip")),
        &dir.path().join("check/connect"),
    );
    let inner = connect_dir.join(BUNDLE).join(BUNDLE);
    assert_eq!(std::fs::read(inner.join("README.txt")).unwrap(), b"bundle readme");

    for (zip, name) in [("aaa.xcframework.zip", "aaa"), ("nested/bbb.xcframework.zip", "bbb")] {
        let leaf = unpack(&inner.join(zip), &dir.path().join(format!("check/{name}")));
        assert_eq!(std::fs::read_to_string(leaf.join(DEFAULT_MARKER_NAME)).unwrap(), DEFAULT_MARKER_CONTENT);
        assert!(leaf.join(format!("{name}.xcframework/Info.plist")).is_file());

        let names: Vec<_> = list_entries(inner.join(zip)).unwrap().into_iter().map(|e| e.path).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&DEFAULT_MARKER_NAME.to_string()));
    }
}

#[test]
fn every_rewrapped_archive_carries_utf8_flags() {
    let dir = tempfile::tempdir().unwrap();
    let input = root_archive(dir.path());
    let outcome = pipeline(&dir.path().join("signed"), &dir.path().join("work"))
        .process(&input)
        .unwrap();

    let root = unpack(&outcome.output, &dir.path().join("check/root"));
    let connect = root.join(format!("connect/バイナリ/{BUNDLE}.zip"));
    let connect_dir = unpack(&connect, &dir.path().join("check/connect"));
    let leaf = connect_dir.join(BUNDLE).join(BUNDLE).join("aaa.xcframework.zip");

    for archive in [outcome.output.clone(), connect, leaf] {
        let report = verify_archive(&archive).unwrap();
        assert!(report.is_ok(), "{}: {:?}", archive.display(), report.errors());
        assert!(!report.has_warning(FindingKind::MissingUtf8Flag));
        assert!(report.details().entries.iter().all(|e| e.flags.is_some_and(|f| f & 0x0800 != 0)));
    }
}

#[test]
fn processing_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let input = root_archive(dir.path());

    let first = pipeline(&dir.path().join("one"), &dir.path().join("work"))
        .process(&input)
        .unwrap();
    let second = pipeline(&dir.path().join("two"), &dir.path().join("work"))
        .process(&input)
        .unwrap();
    assert_eq!(std::fs::read(first.output).unwrap(), std::fs::read(second.output).unwrap());
}

#[test]
fn corrupt_inner_archive_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("20260105.zip");
    std::fs::write(
        &input,
        zip_bytes(&[(&format!("connect/バイナリ/{BUNDLE}.zip"), b"this is not a zip archive at all")]),
    )
    .unwrap();
    let output_dir = dir.path().join("signed");
    let work_root = dir.path().join("work");

    let failure = pipeline(&output_dir, &work_root).process(&input).unwrap_err();
    assert_eq!(failure.internal_path, format!("20260105.zip!/connect/バイナリ/{BUNDLE}.zip"));
    assert!(failure.source.is_corrupt_input(), "{:?}", failure.source);
    assert!(failure.structure.contains(&format!("connect/バイナリ/{BUNDLE}.zip")));
    assert!(!output_dir.join("20260105.zip").exists());
    assert!(is_empty_dir(&work_root));
}

#[test]
fn traversal_in_leaf_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let evil = zip_bytes(&[("../../escape.txt", b"nope")]);
    let bundle = zip_bytes(&[(&format!("{BUNDLE}/evil.xcframework.zip"), &evil)]);
    let input = dir.path().join("20260105.zip");
    std::fs::write(&input, zip_bytes(&[(&format!("connect/バイナリ/{BUNDLE}.zip"), &bundle)])).unwrap();

    let work_root = dir.path().join("work");
    let failure = pipeline(&dir.path().join("signed"), &work_root)
        .process(&input)
        .unwrap_err();
    assert!(matches!(
        failure.source,
        PipelineError::Archive(repack_archive::Error::PathEscape { .. })
    ));
    assert!(failure.internal_path.ends_with("/evil.xcframework.zip"));
    assert!(is_empty_dir(&work_root));
    assert!(!dir.path().join("escape.txt").exists());
}

#[test]
fn missing_container_is_a_schema_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("20260105.zip");
    std::fs::write(&input, zip_bytes(&[("unexpected/layout.txt", b"x")])).unwrap();

    let failure = pipeline(&dir.path().join("signed"), &dir.path().join("work"))
        .process(&input)
        .unwrap_err();
    match &failure.source {
        PipelineError::SchemaMismatch { expected, found, .. } => {
            assert_eq!(expected, "connect/バイナリ");
            assert_eq!(found, &["unexpected", "unexpected/layout.txt"]);
        }
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
    assert_eq!(failure.internal_path, "20260105.zip");
    assert_eq!(failure.structure, ["unexpected", "unexpected/layout.txt"]);
}

#[test]
fn fallback_location_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = bundle();
    let input = dir.path().join("20260105.zip");
    std::fs::write(
        &input,
        zip_bytes(&[(&format!("release/connect/新バイナリ/{BUNDLE}.zip"), &bundle)]),
    )
    .unwrap();

    let outcome = pipeline(&dir.path().join("signed"), &dir.path().join("work"))
        .process(&input)
        .unwrap();
    assert_eq!(outcome.leaves.len(), 2);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("release/connect/新バイナリ"));
}

/// Records each leaf stage it is applied to, together with whether the
/// stages of the leaves seen before it still exist on disk.
#[derive(Clone, Default)]
struct StageRecorder(Arc<Mutex<Vec<(PathBuf, Vec<bool>)>>>);

impl Transform for StageRecorder {
    fn name(&self) -> &str { "stage-recorder" }

    fn apply(&self, leaf: &Path) -> Result<(), TransformError> {
        let mut seen = self.0.lock().unwrap();
        let earlier = seen.iter().map(|(stage, _)| stage.exists()).collect();
        seen.push((leaf.to_path_buf(), earlier));
        Ok(())
    }
}

#[test]
fn leaf_stage_is_removed_before_next_sibling_is_extracted() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("root.zip");
    let a = zip_bytes(&[("a.txt", b"a")]);
    let b = zip_bytes(&[("b.txt", b"b")]);
    std::fs::write(&input, zip_bytes(&[("a.pkg.zip", &a), ("b.pkg.zip", &b)])).unwrap();

    let schema = NestingSchema {
        levels: vec![LevelSpec {
            name:    "root".into(),
            locate:  LocateRule::default(),
            targets: "*.pkg.zip".into(),
            search:  SearchMode::Direct,
            exclude: Vec::new(),
        }],
    };
    let recorder = StageRecorder::default();
    let work_root = dir.path().join("work");
    let outcome = Pipeline::new(schema, dir.path().join("signed"))
        .work_root(&work_root)
        .transform(recorder.clone())
        .process(&input)
        .unwrap();
    assert_eq!(outcome.leaves, ["root.zip!/a.pkg.zip", "root.zip!/b.pkg.zip"]);

    let seen = recorder.0.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].1.is_empty());
    assert_eq!(seen[1].1, [false], "stage of {} outlived its rewrap", seen[0].0.display());
    assert!(!seen[1].0.exists());
    assert!(is_empty_dir(&work_root));
}

#[test]
fn batch_continues_past_failures() {
    let dir = tempfile::tempdir().unwrap();
    let inputs_dir = dir.path().join("unsign");
    std::fs::create_dir(&inputs_dir).unwrap();
    let good = root_archive(&inputs_dir);
    let bad = inputs_dir.join("broken.zip");
    std::fs::write(&bad, b"garbage").unwrap();

    let inputs = repack_pipeline::collect_inputs(&inputs_dir).unwrap();
    assert_eq!(inputs, [good.clone(), bad.clone()]);

    let output_dir = dir.path().join("signed");
    let pipeline = pipeline(&output_dir, &dir.path().join("work"));
    let report = Batch::new(&pipeline).run(&inputs);
    assert!(!report.is_success());
    assert_eq!(report.total(), 2);
    assert_eq!(report.succeeded[0].input, good);
    assert_eq!(report.failed[0].input, bad);
    assert!(output_dir.join("20260105.zip").is_file());
    assert!(!output_dir.join("broken.zip").exists());
}
