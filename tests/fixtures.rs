//! Refresh fixtures.
//!
//! Each file in `tests/fixtures/refresh/` holds a style, the ids of the
//! library entries, a document and the document expected after a refresh.

mod common;

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use wordref::Style;

use common::{build_library, completed, synchronizer};

#[derive(Debug, Deserialize)]
struct Fixture {
    style: String,
    library: Vec<String>,
    document: String,
    expected: String,
}

fn fixture_paths() -> Vec<PathBuf> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/refresh");
    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();
    paths
}

#[tokio::test]
async fn test_refresh_fixtures() {
    let paths = fixture_paths();
    assert!(!paths.is_empty(), "no fixtures found");

    for path in paths {
        let fixture: Fixture = toml::from_str(&fs::read_to_string(&path).unwrap())
            .unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
        let style: Style = fixture.style.parse().unwrap();
        let ids: Vec<&str> = fixture.library.iter().map(String::as_str).collect();
        let sync = synchronizer(&fixture.document, build_library(&ids));

        completed(sync.refresh_all(style).await.unwrap());
        let first = sync.host().to_text();
        completed(sync.refresh_all(style).await.unwrap());

        assert_eq!(first, fixture.expected, "fixture {}", path.display());
        assert_eq!(
            sync.host().to_text(),
            first,
            "second refresh changed {}",
            path.display()
        );
    }
}
