use anyhow::Result;
use predicates::prelude::*;

use crate::common::ReleaseFixture;

#[test]
fn test_config_init_writes_example() -> Result<()> {
    let fixture = ReleaseFixture::new()?;

    fixture
        .command()
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration"));

    let written = std::fs::read_to_string(&fixture.config_path)?;
    assert!(written.contains("base_url"));
    assert!(written.contains("[deploy]"));
    Ok(())
}

#[test]
fn test_config_init_refuses_to_overwrite() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    fixture.write_config("1.0.0", "app", 0)?;
    let before = std::fs::read_to_string(&fixture.config_path)?;

    fixture
        .command()
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
    assert_eq!(std::fs::read_to_string(&fixture.config_path)?, before);

    fixture.command().args(["config", "init", "--force"]).assert().success();
    assert_ne!(std::fs::read_to_string(&fixture.config_path)?, before);
    Ok(())
}

#[test]
fn test_config_path_prints_override() -> Result<()> {
    let fixture = ReleaseFixture::new()?;

    fixture
        .command()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
    Ok(())
}

#[test]
fn test_config_show_reports_validity() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    fixture.write_config("1.0.0", "app", 0)?;

    fixture
        .command()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("unpack-relaunch"))
        .stdout(predicate::str::contains("configuration is valid"));

    fixture
        .command()
        .args(["--current-version", "not-a-version", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("current_version 'not-a-version'"));
    Ok(())
}

#[test]
fn test_config_show_rejects_broken_toml() -> Result<()> {
    let fixture = ReleaseFixture::new()?;
    std::fs::write(&fixture.config_path, "base_url = [unterminated")?;

    fixture
        .command()
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse configuration"));
    Ok(())
}
