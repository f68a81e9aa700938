use fieldtrip_common::{Locator, ViewportPolicy};
use fieldtrip_config::{Step, TripPlanLoader};
use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;

/// Helper to write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

#[test]
#[serial]
fn loads_a_complete_careers_plan() {
    let tmp = TempDir::new().unwrap();

    let file_yaml = r#"
version: "1"
site:
  base_url: "https://careers.example.com/"
  viewport: maximize
  consent:
    target: { by: attr, name: id, value: "cookie-decline" }
    timeout_ms: 4000
report:
  title: "Careers Site Survey"
  prefix: "careers_survey"
  out_dir: "${HOME}/surveys"
defaults:
  wait_timeout_ms: 15000
  poll_interval_ms: 500
scenarios:
  - name: locations
    steps:
      - action: click
        label: "Locations tab"
        target: { by: link_text, text: "Locations" }
      - action: extract_list
        name: locations
        target: { by: class_name, name: "header-locations" }
        exclude: ["View all locations"]
  - name: product-blurb
    steps:
      - action: scroll_down
        pages: 3
      - action: extract_text
        name: casino_description
        target: { by: xpath, expr: "//div[contains(@class, 'product-card')]//h4[text()='Casino']/following-sibling::p" }
"#;
    let p = write_yaml(&tmp, "fieldtrip.yaml", file_yaml);

    let plan = TripPlanLoader::new()
        .with_file(p)
        .load()
        .expect("load trip plan");

    assert_eq!(plan.version.as_deref(), Some("1"));
    assert_eq!(plan.site.base_url.host_str(), Some("careers.example.com"));
    assert_eq!(plan.site.viewport, ViewportPolicy::Maximize);

    let consent = plan.site.consent.as_ref().expect("consent block");
    assert_eq!(consent.target, Locator::attr("id", "cookie-decline"));
    assert_eq!(consent.timeout_ms, 4000);

    assert_eq!(plan.report.title, "Careers Site Survey");
    // ${HOME} must be expanded before the typed model materialises.
    assert!(!plan.report.out_dir.to_string_lossy().contains("${"));

    assert_eq!(plan.scenarios.len(), 2);
    let locations = plan.scenario("locations").expect("locations scenario");
    match &locations.steps[1] {
        Step::ExtractList { name, exclude, .. } => {
            assert_eq!(name, "locations");
            assert_eq!(exclude, &["View all locations".to_string()]);
        }
        other => panic!("expected extract_list, got {other:?}"),
    }
    assert!(plan.scenario("missing").is_none());
}

#[test]
#[serial]
fn environment_overrides_take_precedence() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(
        &tmp,
        "fieldtrip.yaml",
        r#"
version: "file"
site:
  base_url: "https://example.com/"
scenarios: []
"#,
    );

    temp_env::with_var("FIELDTRIP__VERSION", Some("env"), || {
        let plan = TripPlanLoader::new()
            .with_file(&p)
            .load()
            .expect("load trip plan");
        assert_eq!(plan.version.as_deref(), Some("env"));
    });
}

#[test]
#[serial]
fn fixed_viewport_parses() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(
        &tmp,
        "fieldtrip.yaml",
        r#"
site:
  base_url: "https://example.com/"
  viewport:
    fixed: { width: 1920, height: 1080 }
scenarios: []
"#,
    );

    let plan = TripPlanLoader::new()
        .with_file(p)
        .load()
        .expect("load trip plan");
    assert_eq!(
        plan.site.viewport,
        ViewportPolicy::Fixed {
            width: 1920,
            height: 1080
        }
    );
}
