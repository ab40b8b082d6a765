//! Config load validation tests for quickfile-config.
// crates/quickfile-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards, defaults, and account resolution.
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use quickfile_config::ConfigError;
use quickfile_config::QuickfileConfig;
use quickfile_store::SqliteStoreConfig;
use quickfile_store::SqliteStoreMode;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<QuickfileConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn ensure(condition: bool, message: &str) -> TestResult {
    if condition { Ok(()) } else { Err(message.to_string()) }
}

fn write_config(content: &str) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content.as_bytes()).map_err(|err| err.to_string())?;
    Ok(file)
}

// ============================================================================
// SECTION: Load Guards
// ============================================================================

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(QuickfileConfig::load(Some(Path::new(&long_path))), "path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        QuickfileConfig::load(Some(Path::new(&long_component))),
        "path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&vec![b'#'; 1_048_577]).map_err(|err| err.to_string())?;
    assert_invalid(QuickfileConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(QuickfileConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_rejects_missing_explicit_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    match QuickfileConfig::load(Some(&path)) {
        Err(ConfigError::Io(_)) => Ok(()),
        Err(error) => Err(format!("expected io error, got {error}")),
        Ok(_) => Err("expected missing file to fail".to_string()),
    }
}

#[test]
fn load_rejects_unknown_keys() -> TestResult {
    let file = write_config("[limits]\nmax_tags = 3\n")?;
    match QuickfileConfig::load(Some(file.path())) {
        Err(ConfigError::Parse(_)) => Ok(()),
        Err(error) => Err(format!("expected parse error, got {error}")),
        Ok(_) => Err("expected unknown key to fail".to_string()),
    }
}

// ============================================================================
// SECTION: Values
// ============================================================================

#[test]
fn empty_file_yields_defaults() -> TestResult {
    let file = write_config("")?;
    let config = QuickfileConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    ensure(config == QuickfileConfig::default(), "empty config should equal defaults")?;
    let policy = config.upload_policy();
    ensure(policy.accounts.is_empty(), "no accounts by default")?;
    ensure(
        policy.mime_type_redirect.get("text/html").map(String::as_str) == Some("text/plain"),
        "html redirect present by default",
    )?;
    ensure(config.default_expire() == Duration::from_secs(86_400), "default expiry is one day")
}

#[test]
fn store_section_uses_store_defaults() -> TestResult {
    let config = QuickfileConfig::from_toml_str("[store]\n").map_err(|err| err.to_string())?;
    ensure(config.store_config() == SqliteStoreConfig::default(), "store defaults")?;
    ensure(config.store.path == Path::new("quickfile.db"), "default database path")?;
    match QuickfileConfig::from_toml_str("[store]\nwal = true\n") {
        Err(ConfigError::Parse(_)) => Ok(()),
        Err(error) => Err(format!("expected parse error, got {error}")),
        Ok(_) => Err("expected unknown store key to fail".to_string()),
    }
}

#[test]
fn full_config_resolves_store_and_accounts() -> TestResult {
    let file = write_config(
        r#"
[store]
path = "data/files.db"
journal_mode = "delete"
read_pool_size = 2

[limits]
total_upload_limit = 5000
upload_limit = 1000
file_limit = 5
min_expire_secs = 60
max_expire_secs = 3600
default_expire_secs = 600

[mime]
deny = ["application/x-"]

[maintenance]
interval_secs = 30
vacuum_threshold = 0

[accounts.alice]

[accounts.bob]
upload_limit = 4000
max_expire_secs = 7200
"#,
    )?;
    let config = QuickfileConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    let store = config.store_config();
    ensure(store.path == Path::new("data/files.db"), "store path")?;
    ensure(store.journal_mode == SqliteStoreMode::Delete, "journal mode")?;
    ensure(store.read_pool_size == 2, "read pool size")?;
    ensure(config.maintenance_interval() == Duration::from_secs(30), "maintenance interval")?;

    let policy = config.upload_policy();
    ensure(policy.total_upload_limit == 5000, "total limit")?;
    ensure(policy.denied_mime_types == vec!["application/x-".to_string()], "deny list")?;
    let alice = policy.account("alice").ok_or("alice missing")?;
    ensure(alice.upload_limit == 1000 && alice.file_limit == 5, "alice takes defaults")?;
    ensure(alice.max_expire == Duration::from_secs(3600), "alice max expire")?;
    let bob = policy.account("bob").ok_or("bob missing")?;
    ensure(bob.upload_limit == 4000, "bob override")?;
    ensure(bob.min_expire == Duration::from_secs(60), "bob min expire default")?;
    ensure(bob.max_expire == Duration::from_secs(7200), "bob max expire override")
}

#[test]
fn account_overrides_replace_defaults_even_when_smaller() -> TestResult {
    let content = r#"
[limits]
upload_limit = 1000
file_limit = 50

[accounts.carol]
upload_limit = 10
file_limit = 2
"#;
    let config = QuickfileConfig::from_toml_str(content).map_err(|err| err.to_string())?;
    let policy = config.upload_policy();
    let carol = policy.account("carol").ok_or("carol missing")?;
    ensure(carol.upload_limit == 10, "smaller byte override wins")?;
    ensure(carol.file_limit == 2, "smaller file override wins")
}

#[test]
fn validation_rejects_out_of_range_values() -> TestResult {
    let cases = [
        ("[store]\nread_pool_size = 0\n", "read_pool_size"),
        ("[store]\npath = \"\"\n", "store.path"),
        ("[limits]\ntotal_upload_limit = 0\n", "total_upload_limit"),
        (
            "[limits]\nmin_expire_secs = 100\nmax_expire_secs = 50\ndefault_expire_secs = 60\n",
            "min_expire_secs",
        ),
        ("[limits]\ndefault_expire_secs = 1\n", "default_expire_secs"),
        ("[mime]\nallow = [\" \"]\n", "mime.allow"),
        ("[maintenance]\ninterval_secs = 0\n", "interval_secs"),
        ("[accounts.carol]\nfile_limit = -1\n", "accounts.carol.file_limit"),
        ("[accounts.dave]\nmin_expire_secs = 999999999\n", "accounts.dave"),
    ];
    for (content, needle) in cases {
        assert_invalid(QuickfileConfig::from_toml_str(content), needle)?;
    }
    Ok(())
}
