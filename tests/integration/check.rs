use anyhow::Result;
use predicates::prelude::*;

use crate::common::ReleaseFixture;

#[test]
fn test_check_reports_available_update() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    let older = fixture.publish("1.1.0", "1.1.0.zip", b"old", "2024-02-01T00:00:00Z")?;
    let newer = fixture.publish("1.2.0", "1.2.0.zip", b"new", "2024-03-01T00:00:00Z")?;
    fixture.write_manifest(&[newer, older])?;
    fixture.write_config("1.0.0", "app", 0)?;

    fixture
        .command()
        .args(["check", "--pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Update available"))
        .stdout(predicate::str::contains("1.0.0 -> 1.2.0"))
        .stdout(predicate::str::contains("1.1.0"));

    // check never downloads artifacts
    assert!(!fixture.downloads.join("update.zip").exists());
    Ok(())
}

#[test]
fn test_check_up_to_date() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    let entry = fixture.publish("2.0.0", "2.0.0.zip", b"same", "2024-03-01T00:00:00Z")?;
    fixture.write_manifest(&[entry])?;
    fixture.write_config("2.0.0", "app", 0)?;

    fixture
        .command()
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("is up to date"));
    Ok(())
}

#[test]
fn test_check_shorter_version_spelling_is_an_update() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    let entry = fixture.publish("2.0.0", "2.0.0.zip", b"same", "2024-03-01T00:00:00Z")?;
    fixture.write_manifest(&[entry])?;
    fixture.write_config("2.0", "app", 0)?;

    fixture
        .command()
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("2.0 -> 2.0.0"));
    Ok(())
}

#[test]
fn test_check_current_version_flag() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    let entry = fixture.publish("2.0.0", "2.0.0.zip", b"same", "2024-03-01T00:00:00Z")?;
    fixture.write_manifest(&[entry])?;
    fixture.write_config("1.0.0", "app", 0)?;

    fixture
        .command()
        .args(["--current-version", "2.0.0", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is up to date"));
    Ok(())
}

#[test]
fn test_check_missing_manifest_fails() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    fixture.write_config("1.0.0", "app", 0)?;

    fixture
        .command()
        .arg("check")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to fetch release manifest"));
    Ok(())
}

#[test]
fn test_check_invalid_manifest_fails() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    std::fs::write(fixture.releases.join("versions.json"), "null")?;
    fixture.write_config("1.0.0", "app", 0)?;

    fixture
        .command()
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid release manifest"));
    Ok(())
}
