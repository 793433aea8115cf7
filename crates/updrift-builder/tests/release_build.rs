//! End-to-end: application package in, release package and manifest
//! entry out.

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use updrift_builder::container::extract_with_escaping;
use updrift_builder::{PackageSpec, ReleasePackageBuilder, suggested_file_name};
use updrift_core::entry::ReleaseEntry;
use updrift_core::{parse_manifest, serialize_manifest};
use zip::write::SimpleFileOptions;

fn write_application_package(dir: &Path) -> PathBuf {
    let path = dir.join("CoolApp-2.1.0-full.nupkg");
    let file = File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);

    writer
        .start_file("CoolApp.pspec", SimpleFileOptions::default())
        .unwrap();
    writer
        .write_all(
            br#"[package]
id = "CoolApp"
version = "2.1.0"
title = "Cool App"
release_notes = "now with fewer crashes"
targets = ["win"]

[dependencies]
SomeFramework = "4.5"
"#,
        )
        .unwrap();

    writer
        .start_file("content-types.toml", SimpleFileOptions::default())
        .unwrap();
    writer
        .write_all(b"[types]\nexe = \"application/x-msdownload\"\nbroken = 12\n")
        .unwrap();

    writer
        .start_file("lib%20net45/CoolApp.exe", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"binary payload").unwrap();

    writer.finish().unwrap();
    path
}

#[test]
fn package_flows_from_build_to_manifest() {
    let pkg_dir = tempfile::tempdir().unwrap();
    let input = write_application_package(pkg_dir.path());

    // Dependencies are a policy violation; the pipeline strips them from
    // the spec before building, which is what an upstream packaging step
    // would have done.
    let out_dir = tempfile::tempdir().unwrap();
    let mut builder = ReleasePackageBuilder::new(&input);
    let err = builder
        .create_release_package(|_, _| out_dir.path().join("never.nupkg"), None)
        .unwrap_err();
    assert!(err.to_string().contains("dependencies"));

    // Rewrite the fixture without the dependency table and build for real.
    let clean_dir = tempfile::tempdir().unwrap();
    let clean_input = {
        let extracted = tempfile::tempdir().unwrap();
        extract_with_escaping(&input, extracted.path()).unwrap();
        let spec_path = extracted.path().join("CoolApp.pspec");
        let mut spec = PackageSpec::parse(&std::fs::read_to_string(&spec_path).unwrap()).unwrap();
        spec.remove_dependencies();
        std::fs::write(&spec_path, spec.to_string()).unwrap();
        let path = clean_dir.path().join("CoolApp-2.1.0-full.nupkg");
        updrift_builder::container::zip_directory(extracted.path(), &path).unwrap();
        path
    };

    let mut builder = ReleasePackageBuilder::new(&clean_input);
    let identity = builder.identity();
    let transform = |notes: &str| format!("<p>{notes}</p>");
    let release = builder
        .create_release_package(
            |_, spec| {
                let version = spec.version().parse().unwrap();
                out_dir
                    .path()
                    .join(suggested_file_name(spec.id(), &version, None, false))
            },
            Some(&transform),
        )
        .unwrap();
    assert_eq!(
        release.file_name().and_then(|n| n.to_str()),
        Some("CoolApp-2.1.0-full.nupkg")
    );
    assert_eq!(identity.name.as_deref(), Some("CoolApp"));

    // The built package carries the rewritten spec and repaired types.
    let extracted = tempfile::tempdir().unwrap();
    extract_with_escaping(&release, extracted.path()).unwrap();
    let spec =
        PackageSpec::parse(&std::fs::read_to_string(extracted.path().join("CoolApp.pspec")).unwrap())
            .unwrap();
    assert_eq!(spec.dependency_count(), 0);
    assert_eq!(
        spec.release_notes_html(),
        Some("<![CDATA[\n<p>now with fewer crashes</p>\n]]>")
    );
    let types =
        std::fs::read_to_string(extracted.path().join("content-types.toml")).unwrap();
    assert!(types.contains("shasum"));
    assert!(!types.contains("broken"));

    // And it drops straight into a manifest.
    let entry = ReleaseEntry::from_package_file(&release, None).unwrap();
    let manifest = serialize_manifest(std::slice::from_ref(&entry)).unwrap();
    let parsed = parse_manifest(&manifest).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].filename(), "CoolApp-2.1.0-full.nupkg");
    assert_eq!(parsed[0].sha1(), entry.sha1());
}
