//! End-to-end runs of the build against a directory-backed store.

use sitepush::build::{BuildError, Builder};
use sitepush::config::PublishConfig;
use sitepush::store::{DirectoryStore, DryRunStore, ObjectStore};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Site {
    tmp: TempDir,
}

impl Site {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
        copy_dir(&fixtures, tmp.path());
        Self { tmp }
    }

    fn config(&self) -> PublishConfig {
        let mut config = PublishConfig {
            markdown_dir: self.tmp.path().join("markdown"),
            css_dir: self.tmp.path().join("css"),
            output_dir: self.tmp.path().join("build"),
            ..PublishConfig::default()
        };
        config.upload.directory = Some(self.bucket());
        config.upload.concurrency = 3;
        config
    }

    fn bucket(&self) -> PathBuf {
        self.tmp.path().join("bucket")
    }

    fn publish(&self) -> sitepush::build::BuildReport {
        Builder::new(self.config(), Box::new(DirectoryStore::new(self.bucket())))
            .run()
            .unwrap()
    }

    fn output(&self, key: &str) -> String {
        fs::read_to_string(self.tmp.path().join("build").join(key)).unwrap()
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.tmp.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

fn copy_dir(src: &Path, dst: &Path) {
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            fs::create_dir_all(&target).unwrap();
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn sorted(mut keys: Vec<String>) -> Vec<String> {
    keys.sort();
    keys
}

#[test]
fn first_run_publishes_everything() {
    let site = Site::new();
    let report = site.publish();

    assert_eq!(
        sorted(report.uploaded.clone()),
        vec!["about.html", "css/site.css", "index.html", "notes/first-post.html"]
    );
    assert!(report.failed.is_empty());

    let store = DirectoryStore::new(site.bucket());
    for key in &report.uploaded {
        assert_eq!(
            store.get(key).unwrap(),
            site.output(key).into_bytes(),
            "published bytes of {key} differ from local output"
        );
    }
}

#[test]
fn second_run_uploads_nothing() {
    let site = Site::new();
    site.publish();
    let report = site.publish();

    assert!(report.uploaded.is_empty());
    assert_eq!(report.unchanged.len(), 4);
    assert_eq!(report.remote_objects, 4);
}

#[test]
fn edited_page_is_the_only_upload() {
    let site = Site::new();
    site.publish();
    site.write("markdown/about.md", "# About\n\nRewritten.\n");

    let report = site.publish();
    assert_eq!(report.uploaded, vec!["about.html"]);
    assert!(site.output("about.html").contains("Rewritten."));
}

#[test]
fn edited_stylesheet_is_the_only_upload() {
    let site = Site::new();
    site.publish();
    site.write("css/site.css", "body { color: navy; }\n");

    let report = site.publish();
    assert_eq!(report.uploaded, vec!["css/site.css"]);
}

#[test]
fn object_removed_from_store_is_restored() {
    let site = Site::new();
    site.publish();
    fs::remove_file(site.bucket().join("index.html")).unwrap();

    let report = site.publish();
    assert_eq!(report.uploaded, vec!["index.html"]);
}

#[test]
fn dry_run_leaves_store_untouched() {
    let site = Site::new();
    let mut config = site.config();
    config.upload.enabled = false;
    let store = DryRunStore::new(DirectoryStore::new(site.bucket()));

    let report = Builder::new(config, Box::new(store)).run().unwrap();
    assert_eq!(report.uploaded.len(), 4);
    assert!(!site.bucket().exists());
    assert!(site.output("index.html").contains("<h1"));
}

#[test]
fn pages_link_stylesheets_relative_to_their_depth() {
    let site = Site::new();
    site.publish();

    assert!(site.output("index.html").contains(r#"href="css/site.css""#));
    assert!(
        site.output("notes/first-post.html")
            .contains(r#"href="../css/site.css""#)
    );
}

#[test]
fn pages_carry_metadata_and_rewritten_links() {
    let site = Site::new();
    site.publish();
    let index = site.output("index.html");

    assert!(!index.contains("created: 2024"));
    assert!(index.contains(r#"<time datetime="2024-03-01T09:30">"#));
    assert!(index.contains("<li class=\"tag\">home</li>"));
    assert!(index.contains(r#"href="notes/first-post.html#intro""#));
    assert!(index.contains(r#"href="https://example.com/readme.md""#));
    assert!(index.contains("<hr"));

    let post = site.output("notes/first-post.html");
    assert!(post.contains(r#"href="../index.html""#));
    assert!(post.contains("<li class=\"tag\">rust</li>"));
}

#[test]
fn malformed_created_date_fails_the_run() {
    let site = Site::new();
    site.write("markdown/broken.md", "---\ncreated: March 1st\n---\n# Broken\n");

    let err = Builder::new(site.config(), Box::new(DirectoryStore::new(site.bucket())))
        .run()
        .unwrap_err();
    assert!(matches!(err, BuildError::FrontMatter { .. }));
}

#[test]
fn unterminated_front_matter_renders_as_body() {
    let site = Site::new();
    site.write("markdown/open.md", "---\ntags:\n  - lost\n\n# Open\n");
    site.publish();

    let page = site.output("open.html");
    assert!(!page.contains("class=\"tag\""));
    assert!(page.contains("<h1"));
}
