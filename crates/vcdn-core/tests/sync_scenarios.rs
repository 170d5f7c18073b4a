//! End-to-end runs of the sync engine against a mocked GitHub.

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tempfile::TempDir;
use vcdn_core::build::{CommandOutcome, CommandSpec};
use vcdn_core::integrity::{self, sri_sha384};
use vcdn_core::{
    AdapterContext, BuildStep, CommandRunner, GitHubClient, Layout, NullReporter, SyncOptions,
    SyncState, Syncer,
};
use vcdn_schema::{
    AssetSource, BundleManifest, Channel, GlobalIndex, Status, SyncReport, Target, VersionIndex,
    VersionManifest, parse_sources,
};

struct Harness {
    server: ServerGuard,
    out: TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self {
            server: Server::new_async().await,
            out: TempDir::new().expect("failed to create output dir"),
        }
    }

    fn layout(&self) -> Layout {
        Layout::new(self.out.path())
    }

    async fn json(&mut self, path: &str, body: &Value) -> Mock {
        self.server
            .mock("GET", path)
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    async fn file(&mut self, path: &str, body: impl AsRef<[u8]>) -> Mock {
        self.server
            .mock("GET", path)
            .with_body(body)
            .create_async()
            .await
    }

    fn release(&self, tag: &str, prerelease: bool, published_at: &str, assets: &[&str]) -> Value {
        let url = self.server.url();
        json!({
            "tag_name": tag,
            "draft": false,
            "prerelease": prerelease,
            "html_url": format!("https://github.com/x/y/releases/tag/{tag}"),
            "published_at": published_at,
            "assets": assets.iter().map(|name| json!({
                "name": name,
                "browser_download_url": format!("{url}/dl/{tag}/{name}"),
                "size": 0
            })).collect::<Vec<_>>()
        })
    }

    async fn sync(&self, sources: &Value) -> SyncReport {
        self.sync_with(sources, SyncOptions::default(), BuildStep::default())
            .await
    }

    async fn sync_with(&self, sources: &Value, options: SyncOptions, builder: BuildStep) -> SyncReport {
        let url = self.server.url();
        let client = GitHubClient::new(None)
            .expect("client")
            .with_bases(Some(&url), Some(&url));
        let ctx = AdapterContext {
            host: Arc::new(client),
            builder,
        };
        let layout = self.layout();
        let mut state = SyncState::load(&layout.state_json());
        let syncer = Syncer::new(layout, &ctx, options, NullReporter);
        let entries = parse_sources(&json!({ "sources": sources }).to_string()).expect("document");
        syncer.run(entries, &mut state).await.expect("sync run")
    }

    fn path(&self, rel: &str) -> std::path::PathBuf {
        self.out.path().join(rel)
    }

    fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    fn bytes(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.path(rel)).unwrap_or_else(|e| panic!("reading {rel}: {e}"))
    }

    fn read<T: DeserializeOwned>(&self, rel: &str) -> T {
        serde_json::from_slice(&self.bytes(rel)).unwrap_or_else(|e| panic!("parsing {rel}: {e}"))
    }

    fn manifest(&self, dir: &str) -> VersionManifest {
        self.read(&format!("{dir}/manifest.json"))
    }
}

fn foo_source() -> Value {
    json!([{
        "package": "foo",
        "type": "release-assets-semver",
        "repo": "x/y",
        "asset_regex": "\\.min\\.js$",
        "meta": {"description": "Foo widgets"}
    }])
}

#[tokio::test]
async fn test_semver_release_round_trip_and_rerun_is_noop() {
    let mut h = Harness::new().await;
    let v140 = h.release("v1.4.0", false, "2024-05-01T00:00:00Z", &["foo.min.js"]);
    h.json("/repos/x/y/releases", &json!([v140])).await;
    h.json("/repos/x/y/releases/latest", &v140).await;
    let download = h
        .server
        .mock("GET", "/dl/v1.4.0/foo.min.js")
        .with_body("console.log(1)")
        .expect(1)
        .create_async()
        .await;

    let report = h.sync(&foo_source()).await;
    assert!(report.changed);
    assert_eq!(report.rows.len(), 1);
    let row = &report.rows[0];
    assert_eq!(row.status, Status::Ok);
    assert_eq!(row.action, "publish @latest,@stable v1.4.0");
    assert!(row.detail.contains("@beta"), "{}", row.detail);

    assert_eq!(h.bytes("foo/v1.4.0/foo.min.js"), b"console.log(1)");
    let manifest = h.manifest("foo/v1.4.0");
    assert_eq!(manifest.version, "v1.4.0");
    assert_eq!(manifest.channel, Some(Channel::Stable));
    assert_eq!(manifest.upstream.tag.as_deref(), Some("v1.4.0"));
    assert_eq!(manifest.upstream.asset_source, AssetSource::ReleaseAssets);
    assert_eq!(manifest.upstream.published_at.as_deref(), Some("2024-05-01T00:00:00Z"));
    let entry = &manifest.files["foo.min.js"];
    assert_eq!(entry.integrity, sri_sha384(b"console.log(1)"));
    assert_eq!(entry.bytes, 14);

    for pointer in ["@latest", "@stable", "v1", "v1.4"] {
        assert_eq!(h.manifest(&format!("foo/{pointer}")), manifest, "{pointer}");
        assert_eq!(h.bytes(&format!("foo/{pointer}/foo.min.js")), b"console.log(1)");
    }
    assert!(!h.exists("foo/@beta"));

    let versions: VersionIndex = h.read("foo/versions.json");
    assert_eq!(versions.len(), 1);
    assert_eq!(versions.entries[0].version, "v1.4.0");

    let index: GlobalIndex = h.read("_index/index.json");
    let summary = index.get("foo").expect("foo in index");
    assert_eq!(summary.last_stable.as_ref().map(|e| e.version.as_str()), Some("v1.4.0"));
    assert!(summary.last_beta.is_none());
    assert_eq!(
        summary.meta.as_ref().and_then(|m| m.get("description")),
        Some(&json!("Foo widgets"))
    );

    let bundle: BundleManifest = h.read("_index/bundle-manifest.json");
    assert_eq!(bundle.manifest_count(), 1);
    assert_eq!(bundle.packages["foo"]["v1.4.0"], manifest);

    let written: SyncReport = h.read("_index/sync-report.json");
    assert_eq!(written.rows, report.rows);

    let state = SyncState::load(&h.layout().state_json());
    assert!(state.prior_identity("foo", Target::Latest).is_some());
    assert!(state.prior_identity("foo", Target::Beta).is_none());

    let before = h.bytes("foo/v1.4.0/manifest.json");
    let report = h.sync(&foo_source()).await;
    assert!(!report.changed);
    assert_eq!(report.rows[0].status, Status::Skip);
    assert_eq!(report.rows[0].action, "check");
    assert_eq!(h.bytes("foo/v1.4.0/manifest.json"), before);
    download.assert_async().await;
}

#[tokio::test]
async fn test_new_prerelease_only_touches_beta() {
    let mut h = Harness::new().await;
    let v140 = h.release("v1.4.0", false, "2024-05-01T00:00:00Z", &["foo.min.js"]);
    let list = h.json("/repos/x/y/releases", &json!([v140])).await;
    h.json("/repos/x/y/releases/latest", &v140).await;
    h.file("/dl/v1.4.0/foo.min.js", "stable").await;
    h.sync(&foo_source()).await;

    let frozen: Vec<(String, Vec<u8>)> = ["@latest", "@stable", "v1", "v1.4", "v1.4.0"]
        .iter()
        .map(|dir| {
            let rel = format!("foo/{dir}/manifest.json");
            let bytes = h.bytes(&rel);
            (rel, bytes)
        })
        .collect();
    let stable_entry = h
        .read::<VersionIndex>("foo/versions.json")
        .get("v1.4.0")
        .cloned();

    list.remove_async().await;
    let beta = h.release("v2.0.0-beta.1", true, "2024-06-01T00:00:00Z", &["foo.min.js"]);
    h.json("/repos/x/y/releases", &json!([beta, v140])).await;
    h.file("/dl/v2.0.0-beta.1/foo.min.js", "beta").await;

    let report = h.sync(&foo_source()).await;
    assert_eq!(report.rows[0].status, Status::Ok);
    assert_eq!(report.rows[0].action, "publish @beta v2.0.0-beta.1");

    assert_eq!(h.bytes("foo/@beta/foo.min.js"), b"beta");
    assert_eq!(h.manifest("foo/@beta").channel, Some(Channel::Beta));
    assert!(!h.exists("foo/v2"), "prereleases never get aliases");
    for (rel, bytes) in frozen {
        assert_eq!(h.bytes(&rel), bytes, "{rel} changed");
    }

    let versions: VersionIndex = h.read("foo/versions.json");
    assert_eq!(versions.len(), 2);
    assert_eq!(versions.get("v1.4.0").cloned(), stable_entry);

    let index: GlobalIndex = h.read("_index/index.json");
    let summary = index.get("foo").expect("foo in index");
    assert_eq!(summary.last_stable.as_ref().map(|e| e.version.as_str()), Some("v1.4.0"));
    assert_eq!(
        summary.last_beta.as_ref().map(|e| e.version.as_str()),
        Some("v2.0.0-beta.1")
    );
}

#[tokio::test]
async fn test_aliases_track_most_recently_published_stable() {
    let mut h = Harness::new().await;
    let v231 = h.release("v2.3.1", false, "2024-01-01T00:00:00Z", &["foo.min.js"]);
    let v232 = h.release("v2.3.2", false, "2024-02-01T00:00:00Z", &["foo.min.js"]);
    let v229 = h.release("v2.2.9", false, "2024-03-01T00:00:00Z", &["foo.min.js"]);
    h.file("/dl/v2.3.1/foo.min.js", "2.3.1").await;
    h.file("/dl/v2.3.2/foo.min.js", "2.3.2").await;
    h.file("/dl/v2.2.9/foo.min.js", "2.2.9").await;

    let list = h.json("/repos/x/y/releases", &json!([v231])).await;
    let latest = h.json("/repos/x/y/releases/latest", &v231).await;
    h.sync(&foo_source()).await;
    assert_eq!(h.bytes("foo/v2/foo.min.js"), b"2.3.1");

    list.remove_async().await;
    latest.remove_async().await;
    let list = h.json("/repos/x/y/releases", &json!([v232, v231])).await;
    let latest = h.json("/repos/x/y/releases/latest", &v232).await;
    h.sync(&foo_source()).await;

    for alias in ["v2", "v2.3"] {
        assert_eq!(h.bytes(&format!("foo/{alias}/foo.min.js")), b"2.3.2", "{alias}");
        assert_eq!(h.manifest(&format!("foo/{alias}")), h.manifest("foo/v2.3.2"));
    }
    assert_eq!(h.bytes("foo/v2.3.1/foo.min.js"), b"2.3.1");

    // A maintenance release of an older line, published after 2.3.2.
    list.remove_async().await;
    latest.remove_async().await;
    h.json("/repos/x/y/releases", &json!([v229, v232, v231])).await;
    h.json("/repos/x/y/releases/latest", &v229).await;
    let report = h.sync(&foo_source()).await;
    assert_eq!(report.rows[0].action, "publish @latest v2.2.9");

    // Aliases follow the most recently published stable version; the line
    // alias of the newer minor is left alone.
    assert_eq!(h.bytes("foo/v2/foo.min.js"), b"2.2.9");
    assert_eq!(h.bytes("foo/v2.2/foo.min.js"), b"2.2.9");
    assert_eq!(h.bytes("foo/v2.3/foo.min.js"), b"2.3.2");
    assert_eq!(h.bytes("foo/@stable/foo.min.js"), b"2.3.2");
    assert_eq!(h.bytes("foo/@latest/foo.min.js"), b"2.2.9");
}

#[tokio::test]
async fn test_raw_file_is_pinned_to_resolved_commit() {
    const FIRST: &str = "1111111aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const SECOND: &str = "2222222bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    let sources = json!([{
        "package": "lib",
        "type": "raw-file",
        "repo": "x/z",
        "ref": "main",
        "paths": ["dist/lib.js", "LICENSE"]
    }]);

    let mut h = Harness::new().await;
    let moving = h
        .server
        .mock("GET", "/x/z/main/dist/lib.js")
        .expect(0)
        .create_async()
        .await;
    let head = h.json("/repos/x/z/commits/main", &json!({"sha": FIRST})).await;
    h.file(&format!("/x/z/{FIRST}/dist/lib.js"), "one").await;
    h.file(&format!("/x/z/{FIRST}/LICENSE"), "MIT").await;

    let report = h.sync(&sources).await;
    assert_eq!(report.rows[0].status, Status::Ok);
    assert_eq!(h.bytes("lib/v1111111/lib.js"), b"one");
    assert_eq!(h.bytes("lib/v1111111/LICENSE"), b"MIT");
    let manifest = h.manifest("lib/v1111111");
    assert_eq!(manifest.channel, None);
    assert_eq!(manifest.upstream.commit.as_deref(), Some(FIRST));
    assert_eq!(manifest.upstream.git_ref.as_deref(), Some("main"));
    assert_eq!(manifest.upstream.asset_source, AssetSource::RawFiles);
    assert_eq!(h.manifest("lib/@latest"), manifest);
    assert!(!h.exists("lib/@stable"));

    let report = h.sync(&sources).await;
    assert_eq!(report.rows[0].status, Status::Skip);

    head.remove_async().await;
    h.json("/repos/x/z/commits/main", &json!({"sha": SECOND})).await;
    h.file(&format!("/x/z/{SECOND}/dist/lib.js"), "two").await;
    h.file(&format!("/x/z/{SECOND}/LICENSE"), "MIT").await;

    let report = h.sync(&sources).await;
    assert_eq!(report.rows[0].status, Status::Ok);
    assert_eq!(h.bytes("lib/v2222222/lib.js"), b"two");
    assert_eq!(h.bytes("lib/v1111111/lib.js"), b"one");
    assert_eq!(h.bytes("lib/@latest/lib.js"), b"two");
    assert_eq!(h.read::<VersionIndex>("lib/versions.json").len(), 2);
    moving.assert_async().await;
}

type Script = Box<dyn Fn(&CommandSpec) + Send + Sync>;

struct ScriptedRunner {
    lines: Mutex<Vec<String>>,
    script: Script,
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutcome> {
        self.lines.lock().unwrap().push(spec.program_line.clone());
        (self.script)(spec);
        Ok(CommandOutcome {
            status: Some(0),
            timed_out: false,
            output_tail: String::new(),
        })
    }
}

fn snapshot(top: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{top}/{name}"), body.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[tokio::test]
async fn test_tag_fallback_builds_from_snapshot() {
    const SHA: &str = "c0ffee0000000000000000000000000000000000";
    let sources = json!([{
        "package": "widget",
        "type": "release-assets-semver",
        "repo": "x/w",
        "build": {
            "enable": true,
            "install": "true",
            "run": "make",
            "outputs": [{"glob": "dist/*.js"}]
        }
    }]);

    let mut h = Harness::new().await;
    h.json("/repos/x/w/releases", &json!([])).await;
    h.json(
        "/repos/x/w/tags",
        &json!([
            {"name": "v0.9.0", "commit": {"sha": "0000000000000000000000000000000000000009"}},
            {"name": "v1.0.0", "commit": {"sha": SHA}},
            {"name": "nightly", "commit": {"sha": "0000000000000000000000000000000000000001"}}
        ]),
    )
    .await;
    let tarball = h
        .server
        .mock("GET", format!("/repos/x/w/tarball/{SHA}").as_str())
        .with_body(snapshot("x-w-c0ffee", &[("package.json", "{}"), ("src/index.js", "src")]))
        .expect(1)
        .create_async()
        .await;

    let runner = Arc::new(ScriptedRunner {
        lines: Mutex::new(Vec::new()),
        script: Box::new(|spec| {
            if spec.program_line == "make" {
                let dist = spec.cwd.join("dist");
                std::fs::create_dir_all(&dist).unwrap();
                std::fs::write(dist.join("widget.js"), "built").unwrap();
            }
        }),
    });
    let report = h
        .sync_with(&sources, SyncOptions::default(), BuildStep::new(runner.clone()))
        .await;

    assert_eq!(report.rows[0].status, Status::Ok, "{}", report.rows[0].detail);
    assert_eq!(report.rows[0].action, "publish @latest,@stable v1.0.0");
    assert_eq!(*runner.lines.lock().unwrap(), vec!["true", "make"]);

    assert_eq!(h.bytes("widget/v1.0.0/widget.js"), b"built");
    let manifest = h.manifest("widget/v1.0.0");
    assert_eq!(manifest.upstream.asset_source, AssetSource::SourceBuild);
    assert_eq!(manifest.upstream.commit.as_deref(), Some(SHA));
    for pointer in ["@latest", "@stable", "v1", "v1.0"] {
        assert!(h.exists(&format!("widget/{pointer}/widget.js")), "{pointer}");
    }
    tarball.assert_async().await;
}

#[tokio::test]
async fn test_tag_without_build_or_paths_fails_loudly() {
    let mut h = Harness::new().await;
    h.json("/repos/x/b/releases", &json!([])).await;
    h.json(
        "/repos/x/b/tags",
        &json!([{"name": "v1.0.0", "commit": {"sha": "abc"}}]),
    )
    .await;

    let options = SyncOptions {
        strict: true,
        ..SyncOptions::default()
    };
    let sources = json!([{"package": "bare", "type": "release-assets-semver", "repo": "x/b"}]);
    let report = h.sync_with(&sources, options, BuildStep::default()).await;

    let row = &report.rows[0];
    assert_eq!(row.status, Status::Fail);
    assert!(row.detail.contains("no build or paths"), "{}", row.detail);
    assert_eq!(report.exit_code(), 1);
    assert!(!report.changed);
    assert!(!h.exists("bare"));
    assert!(h.exists("_index/sync-report.json"));
    assert!(!h.exists("_index/external-state.json"));
}

fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_zip_extract_invalid_entry_and_only_filter() {
    let mut h = Harness::new().await;
    let release = h.release("v3.1.0", false, "2024-04-01T00:00:00Z", &["icons.zip", "icons.tar.gz"]);
    h.json("/repos/x/i/releases/latest", &release).await;
    h.file(
        "/dl/v3.1.0/icons.zip",
        zip_of(&[
            ("icons-3.1.0/dist/icons.css", ".i{}"),
            ("icons-3.1.0/dist/fonts/icons.woff2", "font"),
            ("icons-3.1.0/README.md", "readme"),
        ]),
    )
    .await;
    let skipped = h
        .server
        .mock("GET", Matcher::Regex("^/repos/x/s/".into()))
        .expect(0)
        .create_async()
        .await;

    let sources = json!([
        {
            "package": "icons",
            "type": "release-asset",
            "repo": "x/i",
            "asset_regex": "\\.zip$",
            "extract": [
                {"glob": "**/dist/*.css"},
                {"glob": "**/fonts/*.woff2", "rename": "fonts/icons.woff2"}
            ]
        },
        {"package": "broken", "type": "ftp-mirror", "repo": "x/q"},
        {"package": "other", "type": "release-asset", "repo": "x/s", "asset_regex": "js$"}
    ]);
    let options = SyncOptions {
        only: vec!["icons".into(), "broken".into()],
        ..SyncOptions::default()
    };
    let report = h.sync_with(&sources, options, BuildStep::default()).await;

    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.rows[0].package, "icons");
    assert_eq!(report.rows[0].status, Status::Ok, "{}", report.rows[0].detail);
    assert_eq!(report.rows[1].package, "broken");
    assert_eq!(report.rows[1].status, Status::Fail);
    assert_eq!(report.rows[1].action, "load");
    assert_eq!(report.exit_code(), 0);

    let manifest = h.manifest("icons/v3.1.0");
    let names: Vec<&str> = manifest.files.keys().map(String::as_str).collect();
    assert_eq!(names, ["fonts/icons.woff2", "icons.css"]);
    assert_eq!(h.bytes("icons/@latest/fonts/icons.woff2"), b"font");
    assert!(h.path("icons/v3").is_dir());
    skipped.assert_async().await;
}

#[tokio::test]
async fn test_missing_asset_lists_available_names() {
    let mut h = Harness::new().await;
    let release = h.release("v1.0.0", false, "2024-04-01T00:00:00Z", &["foo.js", "foo.css"]);
    h.json("/repos/x/y/releases/latest", &release).await;

    let sources = json!([{
        "package": "foo",
        "type": "release-asset",
        "repo": "x/y",
        "asset_regex": "\\.min\\.js$"
    }]);
    let report = h.sync(&sources).await;

    let row = &report.rows[0];
    assert_eq!(row.status, Status::Fail);
    assert!(row.detail.contains("available: foo.js, foo.css"), "{}", row.detail);
    assert!(!h.exists("foo/v1.0.0"));
}

fn release_asset_source(asset_regex: &str) -> Value {
    json!([{
        "package": "foo",
        "type": "release-asset",
        "repo": "x/y",
        "asset_regex": asset_regex
    }])
}

#[tokio::test]
async fn test_release_asset_round_trip() {
    let mut h = Harness::new().await;
    let release = h.release("v1.4.0", false, "2024-05-01T00:00:00Z", &["foo.js"]);
    h.json("/repos/x/y/releases/latest", &release).await;
    h.file("/dl/v1.4.0/foo.js", "export default 1").await;

    let report = h.sync(&release_asset_source("\\.js$")).await;
    assert_eq!(report.rows[0].status, Status::Ok, "{}", report.rows[0].detail);
    assert_eq!(h.bytes("foo/v1.4.0/foo.js"), b"export default 1");
    assert_eq!(h.bytes("foo/@latest/foo.js"), b"export default 1");

    let versions: VersionIndex = h.read("foo/versions.json");
    let listed: Vec<(&str, Option<Channel>)> = versions
        .entries
        .iter()
        .map(|e| (e.version.as_str(), e.channel))
        .collect();
    assert_eq!(listed, [("v1.4.0", Some(Channel::Stable))]);

    let index: GlobalIndex = h.read("_index/index.json");
    let summary = index.get("foo").expect("foo in index");
    assert_eq!(
        summary.last_latest.as_ref().map(|e| e.version.as_str()),
        Some("v1.4.0")
    );
}

#[tokio::test]
async fn test_index_latest_follows_versions_order() {
    let mut h = Harness::new().await;
    let sources = release_asset_source("\\.js$");
    let mut previous: Option<Mock> = None;

    for (tag, published_at) in [
        ("v1.0.0", "2024-01-01T00:00:00Z"),
        ("v1.1.0", "2024-02-01T00:00:00Z"),
        ("v2.0.0-rc.1", "2024-03-01T00:00:00Z"),
    ] {
        if let Some(mock) = previous.take() {
            mock.remove_async().await;
        }
        let release = h.release(tag, tag.contains('-'), published_at, &["foo.js"]);
        previous = Some(h.json("/repos/x/y/releases/latest", &release).await);
        h.file(&format!("/dl/{tag}/foo.js"), tag).await;

        let report = h.sync(&sources).await;
        assert_eq!(report.rows[0].status, Status::Ok, "{tag}: {}", report.rows[0].detail);

        let versions: VersionIndex = h.read("foo/versions.json");
        let index: GlobalIndex = h.read("_index/index.json");
        let summary = index.get("foo").expect("foo in index");
        assert_eq!(versions.entries[0].version, tag);
        assert_eq!(summary.last_latest.as_ref(), versions.entries.first(), "{tag}");
    }

    let versions: VersionIndex = h.read("foo/versions.json");
    let order: Vec<&str> = versions.entries.iter().map(|e| e.version.as_str()).collect();
    assert_eq!(order, ["v2.0.0-rc.1", "v1.1.0", "v1.0.0"]);
    let index: GlobalIndex = h.read("_index/index.json");
    let summary = index.get("foo").expect("foo in index");
    assert_eq!(summary.last_stable.as_ref().map(|e| e.version.as_str()), Some("v1.1.0"));
    assert_eq!(summary.last_beta.as_ref().map(|e| e.version.as_str()), Some("v2.0.0-rc.1"));
}

#[tokio::test]
async fn test_pointer_files_match_manifest_integrity() {
    let mut h = Harness::new().await;
    let release = h.release(
        "v1.4.0",
        false,
        "2024-05-01T00:00:00Z",
        &["foo.js", "foo.css", "notes.txt"],
    );
    h.json("/repos/x/y/releases/latest", &release).await;
    h.file("/dl/v1.4.0/foo.js", "export default 1").await;
    h.file("/dl/v1.4.0/foo.css", ".foo{color:red}").await;

    let report = h.sync(&release_asset_source("^foo\\.")).await;
    assert_eq!(report.rows[0].status, Status::Ok, "{}", report.rows[0].detail);

    for dir in ["v1.4.0", "@latest", "v1", "v1.4"] {
        let manifest = h.manifest(&format!("foo/{dir}"));
        let names: Vec<&str> = manifest.files.keys().map(String::as_str).collect();
        assert_eq!(names, ["foo.css", "foo.js"], "{dir}");
        for (name, entry) in &manifest.files {
            let data = h.bytes(&format!("foo/{dir}/{name}"));
            assert!(integrity::verify(&data, entry), "{dir}/{name}");
        }
    }
}

#[tokio::test]
async fn test_nested_tag_fails_without_writing() {
    let mut h = Harness::new().await;
    let release = h.release("foo/v1.0.0", false, "2024-05-01T00:00:00Z", &["foo.js"]);
    h.json("/repos/x/y/releases/latest", &release).await;
    let download = h
        .server
        .mock("GET", Matcher::Regex("^/dl/".into()))
        .expect(0)
        .create_async()
        .await;

    let report = h.sync(&release_asset_source("\\.js$")).await;

    let row = &report.rows[0];
    assert_eq!(row.status, Status::Fail);
    assert!(row.detail.contains("foo/v1.0.0"), "{}", row.detail);
    assert!(row.detail.contains("single path segment"), "{}", row.detail);
    assert!(!report.changed);
    assert!(!h.exists("foo"));
    download.assert_async().await;
}
