use super::*;
use tempfile::TempDir;

const SAMPLE: &str = r#"
[[tenants]]
id = "tenant-a"
github_token = "ghs_aaa"

[[tenants]]
id = "tenant-b"
notion_api_key = "secret_bbb"
notion_database_id = "db-123"
"#;

fn write_tenants(content: &str) -> (TempDir, TomlTenantDirectory) {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let path = temp_dir.path().join("tenants.toml");
    std::fs::write(&path, content).expect("can write tenants file");
    let directory = TomlTenantDirectory::new(&path);
    (temp_dir, directory)
}

#[test]
fn loads_all_tenants() {
    let (_guard, directory) = write_tenants(SAMPLE);
    let tenants = directory.load_all().expect("can load tenants");

    assert_eq!(tenants.len(), 2);
    assert_eq!(tenants[0].id, "tenant-a");
    assert!(tenants[0].has_github());
    assert!(!tenants[0].has_notion());
    assert!(tenants[1].has_notion());
}

#[test]
fn find_by_id() {
    let (_guard, directory) = write_tenants(SAMPLE);

    let tenant = directory
        .find("tenant-b")
        .expect("can query tenants")
        .expect("tenant exists");
    assert_eq!(tenant.notion_database_id.as_deref(), Some("db-123"));

    assert!(
        directory
            .find("missing")
            .expect("can query tenants")
            .is_none()
    );
}

#[test]
fn namespace_equals_tenant_id() {
    let (_guard, directory) = write_tenants(SAMPLE);
    let tenant = directory
        .find("tenant-a")
        .expect("can query tenants")
        .expect("tenant exists");

    assert_eq!(tenant.namespace(), "tenant-a");
}

#[test]
fn empty_file_has_no_tenants() {
    let (_guard, directory) = write_tenants("");
    assert!(directory.load_all().expect("can load tenants").is_empty());
}

#[test]
fn missing_file_is_an_error() {
    let directory = TomlTenantDirectory::new("/nonexistent/tenants.toml");
    assert!(directory.load_all().is_err());
}

#[test]
fn notion_requires_both_key_and_database() {
    let (_guard, directory) = write_tenants(
        r#"
[[tenants]]
id = "half"
notion_api_key = "secret_x"
"#,
    );

    let tenant = directory
        .find("half")
        .expect("can query tenants")
        .expect("tenant exists");
    assert!(!tenant.has_notion());
}
