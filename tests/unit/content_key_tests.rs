/*!
 * Tests for content keys, scopes and artifact locations
 */

use subflow::artifacts::{ArtifactStore, FsArtifactStore, Placeholder, PROCESSING_MESSAGE};
use subflow::content::{ContentKey, MediaKind, RequesterScope};
use subflow::database::Repository;
use tempfile::TempDir;

#[test]
fn test_fromPassword_withBlankPassword_shouldBeAnonymous() {
    assert_eq!(RequesterScope::from_password(None), RequesterScope::Anonymous);
    assert_eq!(RequesterScope::from_password(Some("")), RequesterScope::Anonymous);
    assert_eq!(RequesterScope::from_password(Some("   ")), RequesterScope::Anonymous);
    assert_ne!(
        RequesterScope::from_password(Some("a")),
        RequesterScope::from_password(Some("b"))
    );
}

#[test]
fn test_mediaKind_shouldNeedSeasonAndEpisode() {
    let movie = ContentKey::movie("tt0111161", "fr", RequesterScope::Anonymous);
    let episode = ContentKey::episode("tt0944947", 3, 9, "fr", RequesterScope::Anonymous);
    let partial = ContentKey::new("tt0944947", Some(3), None, "fr", RequesterScope::Anonymous);

    assert_eq!(movie.media_kind(), MediaKind::Movie);
    assert_eq!(episode.media_kind(), MediaKind::Series);
    assert_eq!(partial.media_kind(), MediaKind::Movie);
    assert_eq!(movie.canonical(), "tt0111161:::fr:anonymous");
    assert_eq!(episode.to_string(), "tt0944947:3:9:fr:anonymous");
}

#[test]
fn test_canonical_withEquivalentLanguageCodes_shouldBeEqual() {
    let a = ContentKey::movie("tt1", "fre", RequesterScope::Anonymous);
    let b = ContentKey::movie("tt1", "FR", RequesterScope::Anonymous);

    assert_eq!(a, b);
    assert_eq!(a.canonical(), b.canonical());
}

#[test]
fn test_artifactLocator_withCredentialScope_shouldUseHashDirectory() {
    let scope = RequesterScope::from_password(Some("hunter2"));
    let hash = scope.key_part().to_string();
    let key = ContentKey::movie("tt0111161", "es", scope);

    let locator = key.artifact_locator();

    assert_eq!(
        locator.as_str(),
        format!("{}/es/tt0111161/tt0111161-translated-1.srt", hash)
    );
}

#[tokio::test]
async fn test_fromJob_shouldRebuildTheSameKey() {
    let repo = Repository::new_in_memory().unwrap();
    let key = ContentKey::episode(
        "tt0944947",
        1,
        4,
        "pt-br",
        RequesterScope::from_password(Some("secret")),
    );

    let (job, created) = repo
        .create_job_if_absent(&key.to_new_job(Some("openai".to_string()), None))
        .await
        .unwrap();

    assert!(created);
    assert_eq!(ContentKey::from_job(&job), key);
    assert_eq!(job.content_key, key.canonical());
    assert_eq!(job.media_kind, "series");
}

#[test]
fn test_fsArtifactStore_shouldWriteNestedLocators() {
    let dir = TempDir::new().unwrap();
    let store = FsArtifactStore::new(dir.path());
    let key = ContentKey::episode("tt0944947", 2, 1, "de", RequesterScope::Anonymous);
    let locator = key.artifact_locator();

    store.write_placeholder(&locator, Placeholder::Processing).unwrap();

    assert!(store.resolve(&locator).exists());
    let document = store.read(&locator).unwrap().unwrap();
    assert!(document.contains(PROCESSING_MESSAGE));
    assert!(
        store
            .resolve(&locator)
            .ends_with("translated-de/de/tt0944947/season2/tt0944947-translated-1-1.srt")
    );
}
